//! # Echo Module
//!
//! Minimal Wave module. It reports name `Echo` and version `1.0.0`, reads
//! the host's [`HostInfo`] when one is supplied, and echoes messages back
//! with a prefix naming the host.
//!
//! Build it as a shared library and hand the path to the loader:
//!
//! ```text
//! cargo build -p wave-echo --release
//! wave inspect target/release/libecho.so
//! ```

use tracing::{debug, info};
use wave_module_api::prelude::*;

/// Echo module
#[derive(Debug, Default)]
pub struct Echo {
    prefix: Option<String>,
    echoed: usize,
}

impl Echo {
    /// Create a new, uninitialized echo module
    pub fn new() -> Self {
        Self::default()
    }

    /// Echo `message` back, prefixed with the host name once initialized
    pub fn echo(&mut self, message: &str) -> String {
        self.echoed += 1;
        match &self.prefix {
            Some(prefix) => format!("[{prefix}] {message}"),
            None => message.to_string(),
        }
    }

    /// Whether `initialize` has run
    pub fn is_initialized(&self) -> bool {
        self.prefix.is_some()
    }
}

impl Module for Echo {
    fn name(&self) -> &str {
        "Echo"
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn description(&self) -> &str {
        "Echoes messages back to the caller"
    }

    fn initialize(&mut self, host: HostCapability) -> Result<(), ModuleError> {
        let prefix = match host.downcast_ref::<HostInfo>() {
            Some(info) => format!("{} {}", info.app_name, info.app_version),
            None => "echo".to_string(),
        };

        info!(module = "Echo", prefix = %prefix, "Echo module initialized");
        self.prefix = Some(prefix);
        Ok(())
    }

    fn shutdown(&mut self) -> Result<(), ModuleError> {
        debug!(module = "Echo", echoed = self.echoed, "Echo module shutting down");
        self.prefix = None;
        Ok(())
    }
}

declare_module!(Echo, Echo::new);
