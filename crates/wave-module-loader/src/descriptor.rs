//! Module descriptors and the snapshots handed out to callers

use crate::instance::ModuleInstance;
use crate::library::LibraryHandle;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Residency of a registered module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleState {
    /// Instance alive and library mapped
    Active,
    /// Instance torn down but the platform refused to unmap the library
    Resident,
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleState::Active => write!(f, "active"),
            ModuleState::Resident => write!(f, "resident"),
        }
    }
}

/// Copy of a descriptor's identity, safe to keep after the module is gone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleSnapshot {
    /// Name reported by the module (empty if it was never read)
    pub name: String,

    /// Version reported by the module
    pub version: String,

    /// Description reported by the module
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    /// Path the library was loaded from
    pub path: PathBuf,

    /// Whether the library exports a destructor symbol
    pub has_destructor: bool,

    /// Residency at the time of the snapshot
    pub state: ModuleState,

    /// When the module finished loading
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loaded_at: Option<DateTime<Utc>>,
}

impl ModuleSnapshot {
    /// Snapshot for a module that never made it into the registry
    ///
    /// Either field may be empty when it is unknown at the point of failure.
    pub fn partial(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            version: String::new(),
            description: String::new(),
            path: path.into(),
            has_destructor: false,
            state: ModuleState::Active,
            loaded_at: None,
        }
    }

    /// Whether the module instance was alive when the snapshot was taken
    pub fn is_active(&self) -> bool {
        self.state == ModuleState::Active
    }
}

impl fmt::Display for ModuleSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} ({}) [{}]",
            self.name,
            self.version,
            self.path.display(),
            self.state
        )
    }
}

/// The loader's record of one loaded module
///
/// Owns the library handle and, while the module is active, the instance.
/// Only the lifecycle controller creates, mutates or drops descriptors.
pub(crate) struct ModuleDescriptor {
    pub(crate) name: String,
    pub(crate) version: String,
    pub(crate) description: String,
    pub(crate) path: PathBuf,
    pub(crate) library: Box<dyn LibraryHandle>,
    /// `None` once the instance was destroyed but the library could not be closed
    pub(crate) instance: Option<ModuleInstance>,
    pub(crate) has_destructor: bool,
    pub(crate) loaded_at: DateTime<Utc>,
}

impl ModuleDescriptor {
    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn state(&self) -> ModuleState {
        if self.instance.is_some() {
            ModuleState::Active
        } else {
            ModuleState::Resident
        }
    }

    pub(crate) fn snapshot(&self) -> ModuleSnapshot {
        ModuleSnapshot {
            name: self.name.clone(),
            version: self.version.clone(),
            description: self.description.clone(),
            path: self.path.clone(),
            has_destructor: self.has_destructor,
            state: self.state(),
            loaded_at: Some(self.loaded_at),
        }
    }
}

impl fmt::Debug for ModuleDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleDescriptor")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("path", &self.path)
            .field("state", &self.state())
            .field("loaded_at", &self.loaded_at)
            .finish()
    }
}
