//! # Wave Module Loader
//!
//! Runtime loading, reloading and unloading of Wave modules from shared
//! libraries.
//!
//! ## Features
//!
//! - **Lifecycle Controller**: load, unload, reload and teardown under one lock
//! - **Registry**: unique module names and source paths
//! - **Lifecycle Events**: synchronous fan-out to subscribers
//! - **Fault Isolation**: errors and panics raised by module code become
//!   [`LoaderError`] values
//! - **Hot Reload**: reload a module when its library is rebuilt (feature `hot-reload`)
//!
//! ## Example
//!
//! ```rust,no_run
//! use wave_module_loader::prelude::*;
//!
//! # fn example() -> Result<(), LoaderError> {
//! let loader = ModuleLoader::new(HostCapability::none());
//!
//! loader.subscribe(|event| println!("{event}"));
//!
//! let echo = loader.load("target/release/libecho.so")?;
//! println!("loaded {} {}", echo.name, echo.version);
//!
//! loader.reload(&echo.name)?;
//! loader.unload(&echo.name)?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod config;
pub mod descriptor;
pub mod error;
pub mod event;
#[cfg(feature = "hot-reload")]
pub mod hot_reload;
pub mod library;
pub mod loader;
pub mod static_backend;

mod instance;
mod notifier;
mod registry;

pub use config::{ConfigError, ConfigFormat, LoaderConfig, ReloadStrategy, WatchConfig};
pub use descriptor::{ModuleSnapshot, ModuleState};
pub use error::{ErrorKind, LoaderError, OperationStatus, ReloadPhase, Result};
pub use event::{LifecycleEvent, LifecycleEventKind};
#[cfg(feature = "hot-reload")]
pub use hot_reload::{ModuleWatcher, WatchError};
pub use library::{
    discover_libraries, is_library_path, CloseError, LibraryBackend, LibraryError, LibraryHandle,
    NativeBackend, NativeLibrary,
};
pub use loader::{ModuleLoader, ModuleLoaderBuilder};
pub use notifier::SubscriptionId;
pub use static_backend::{StaticBackend, StaticLibrary};

// Re-export module API types for convenience
pub use wave_module_api::{HostCapability, HostInfo, Module, ModuleError, ModuleMetadata};

/// Prelude module with commonly used types
pub mod prelude {
    pub use crate::config::{LoaderConfig, ReloadStrategy};
    pub use crate::descriptor::ModuleSnapshot;
    pub use crate::error::{LoaderError, OperationStatus};
    pub use crate::event::{LifecycleEvent, LifecycleEventKind};
    pub use crate::loader::ModuleLoader;
    pub use wave_module_api::prelude::*;
}
