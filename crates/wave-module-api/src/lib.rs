//! # Wave Module API
//!
//! This crate provides the SDK for writing modules that the Wave module
//! loader can load at runtime from shared libraries.
//!
//! A module is a type implementing [`Module`], exported from a `cdylib`
//! with [`declare_module!`]. The macro generates the two C-linkage entry
//! points the loader resolves: a factory (`create_module_instance`) and a
//! destructor (`destroy_module_instance`).
//!
//! ## Example
//!
//! ```rust,ignore
//! use wave_module_api::prelude::*;
//!
//! #[derive(Debug, Default)]
//! struct Echo;
//!
//! impl Module for Echo {
//!     fn name(&self) -> &str { "Echo" }
//!     fn version(&self) -> &str { "1.0.0" }
//!
//!     fn initialize(&mut self, _host: HostCapability) -> Result<(), ModuleError> {
//!         Ok(())
//!     }
//!
//!     fn shutdown(&mut self) -> Result<(), ModuleError> {
//!         Ok(())
//!     }
//! }
//!
//! declare_module!(Echo, Echo::default);
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod error;
pub mod ffi;
pub mod host;
pub mod module;

#[cfg(feature = "testing")]
pub mod testing;

// Re-export commonly used types
pub use error::{ModuleError, Result};
pub use ffi::{CreateModuleFn, DestroyModuleFn, CREATE_MODULE_SYMBOL, DESTROY_MODULE_SYMBOL};
pub use host::{HostCapability, HostInfo};
pub use module::{Module, ModuleMetadata};

/// Prelude module with commonly used types
pub mod prelude {
    pub use crate::declare_module;
    pub use crate::error::ModuleError;
    pub use crate::host::{HostCapability, HostInfo};
    pub use crate::module::{Module, ModuleMetadata};
}
