//! Module loader error types

use crate::descriptor::ModuleSnapshot;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Error returned by the public loader operations
///
/// Every fault raised by module code or by the platform loader is converted
/// into one of these variants; nothing unwinds across the public surface.
#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    /// A module from this path is already loaded
    #[error("Module from this path is already loaded: {}", .path.display())]
    AlreadyLoaded {
        /// Requested path
        path: PathBuf,
        /// The module currently loaded from that path
        existing: Box<ModuleSnapshot>,
    },

    /// The platform could not open or link the library
    #[error("Failed to load library: {} ({reason})", .path.display())]
    LoadFailure {
        /// Library path
        path: PathBuf,
        /// Platform diagnostic
        reason: String,
    },

    /// A required symbol is missing from the library
    #[error("Failed to find '{symbol}' in {} ({reason})", .path.display())]
    SymbolNotFound {
        /// Library path
        path: PathBuf,
        /// Missing symbol name
        symbol: String,
        /// Platform diagnostic
        reason: String,
    },

    /// The factory faulted or returned a null instance
    #[error("Module factory failed for {}: {reason}", .path.display())]
    ConstructionFailure {
        /// Library path
        path: PathBuf,
        /// What went wrong
        reason: String,
    },

    /// The module's initializer faulted
    #[error("Module {name} initialize() failed: {reason}")]
    InitializationFailure {
        /// Name reported by the module, if it could be read
        name: String,
        /// Library path
        path: PathBuf,
        /// What went wrong
        reason: String,
    },

    /// Another loaded module already reports this name
    #[error("Module with name '{name}' already loaded from {}. Module names must be unique.", .existing_path.display())]
    DuplicateName {
        /// Colliding name
        name: String,
        /// Path of the rejected library
        path: PathBuf,
        /// Path of the module that owns the name
        existing_path: PathBuf,
    },

    /// No module is loaded under this name
    #[error("Module not found: {0}")]
    NotFound(String),

    /// The module's shutdown hook faulted (non-fatal)
    #[error("Module {name} shutdown() faulted: {reason}")]
    ShutdownFault {
        /// Module name
        name: String,
        /// What went wrong
        reason: String,
    },

    /// The destructor symbol faulted (non-fatal)
    #[error("destroy_module_instance faulted for module {name}: {reason}")]
    DestructorFault {
        /// Module name
        name: String,
        /// What went wrong
        reason: String,
    },

    /// The platform refused to unmap the library; the module stays registered
    #[error("Failed to free library for module {} ({reason})", .module.name)]
    UnloadFailure {
        /// The module, still resident
        module: Box<ModuleSnapshot>,
        /// Platform diagnostic
        reason: String,
    },

    /// A reload failed in one of its two phases
    #[error("Reload of {name} failed during {phase} phase: {source}")]
    ReloadFailed {
        /// Module name
        name: String,
        /// Phase that failed
        phase: ReloadPhase,
        /// Underlying failure
        #[source]
        source: Box<LoaderError>,
    },
}

/// Result type for loader operations
pub type Result<T> = std::result::Result<T, LoaderError>;

/// Plain discriminant of [`LoaderError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// See [`LoaderError::AlreadyLoaded`]
    AlreadyLoaded,
    /// See [`LoaderError::LoadFailure`]
    LoadFailure,
    /// See [`LoaderError::SymbolNotFound`]
    SymbolNotFound,
    /// See [`LoaderError::ConstructionFailure`]
    ConstructionFailure,
    /// See [`LoaderError::InitializationFailure`]
    InitializationFailure,
    /// See [`LoaderError::DuplicateName`]
    DuplicateName,
    /// See [`LoaderError::NotFound`]
    NotFound,
    /// See [`LoaderError::ShutdownFault`]
    ShutdownFault,
    /// See [`LoaderError::DestructorFault`]
    DestructorFault,
    /// See [`LoaderError::UnloadFailure`]
    UnloadFailure,
    /// See [`LoaderError::ReloadFailed`]
    ReloadFailed,
}

/// Coarse outcome of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    /// The operation completed
    Success,
    /// The named module is not loaded
    NotFound,
    /// Any other failure
    Error,
}

/// Phase of a reload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReloadPhase {
    /// Tearing the old instance down
    Unload,
    /// Loading the library again
    Load,
}

impl fmt::Display for ReloadPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReloadPhase::Unload => write!(f, "unload"),
            ReloadPhase::Load => write!(f, "load"),
        }
    }
}

impl LoaderError {
    /// Get the error kind
    pub fn kind(&self) -> ErrorKind {
        match self {
            LoaderError::AlreadyLoaded { .. } => ErrorKind::AlreadyLoaded,
            LoaderError::LoadFailure { .. } => ErrorKind::LoadFailure,
            LoaderError::SymbolNotFound { .. } => ErrorKind::SymbolNotFound,
            LoaderError::ConstructionFailure { .. } => ErrorKind::ConstructionFailure,
            LoaderError::InitializationFailure { .. } => ErrorKind::InitializationFailure,
            LoaderError::DuplicateName { .. } => ErrorKind::DuplicateName,
            LoaderError::NotFound(_) => ErrorKind::NotFound,
            LoaderError::ShutdownFault { .. } => ErrorKind::ShutdownFault,
            LoaderError::DestructorFault { .. } => ErrorKind::DestructorFault,
            LoaderError::UnloadFailure { .. } => ErrorKind::UnloadFailure,
            LoaderError::ReloadFailed { .. } => ErrorKind::ReloadFailed,
        }
    }

    /// Map to the coarse operation status
    pub fn status(&self) -> OperationStatus {
        match self {
            LoaderError::NotFound(_) => OperationStatus::NotFound,
            _ => OperationStatus::Error,
        }
    }

    /// Module snapshot attached to the error, if any
    pub fn snapshot(&self) -> Option<&ModuleSnapshot> {
        match self {
            LoaderError::AlreadyLoaded { existing, .. } => Some(existing.as_ref()),
            LoaderError::UnloadFailure { module, .. } => Some(module.as_ref()),
            LoaderError::ReloadFailed { source, .. } => source.snapshot(),
            _ => None,
        }
    }

    /// Whether the library may still be mapped after this error
    ///
    /// Only a refused unmap leaves the library resident.
    pub fn leaves_library_resident(&self) -> bool {
        match self {
            LoaderError::UnloadFailure { .. } => true,
            LoaderError::ReloadFailed { source, .. } => source.leaves_library_resident(),
            _ => false,
        }
    }

    /// Create a new not found error
    pub fn not_found(name: impl fmt::Display) -> Self {
        Self::NotFound(name.to_string())
    }

    pub(crate) fn reload(name: impl Into<String>, phase: ReloadPhase, source: LoaderError) -> Self {
        Self::ReloadFailed {
            name: name.into(),
            phase,
            source: Box::new(source),
        }
    }
}
