//! Core module trait and types

use crate::error::Result;
use crate::host::HostCapability;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Core module trait that every loadable module implements
///
/// Hooks are synchronous and run on the thread that called the loader.
/// Returning `Err` and panicking are both treated as a fault by the loader.
pub trait Module: Send + fmt::Debug {
    /// Module name (must be unique among loaded modules)
    fn name(&self) -> &str;

    /// Module version (free-form)
    fn version(&self) -> &str;

    /// Module description
    fn description(&self) -> &str {
        ""
    }

    /// Initialize the module
    ///
    /// Called once, right after the factory created the instance. The host
    /// capability is the only channel to host services.
    fn initialize(&mut self, host: HostCapability) -> Result<()>;

    /// Shut the module down
    ///
    /// Called once before the instance is destroyed. The library stays
    /// mapped until this returns.
    fn shutdown(&mut self) -> Result<()>;

    /// Get module metadata
    fn metadata(&self) -> ModuleMetadata {
        ModuleMetadata {
            name: self.name().to_string(),
            version: self.version().to_string(),
            description: self.description().to_string(),
        }
    }
}

/// Module metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleMetadata {
    /// Module name
    pub name: String,

    /// Module version
    pub version: String,

    /// Module description
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl fmt::Display for ModuleMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.version)
    }
}
