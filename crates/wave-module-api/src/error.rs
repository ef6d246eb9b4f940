//! Module error types

use std::fmt;

/// Error a module reports from one of its lifecycle hooks
#[derive(Debug, thiserror::Error)]
pub enum ModuleError {
    /// Initialization failed
    #[error("Initialization failed: {0}")]
    InitError(String),

    /// Shutdown failed
    #[error("Shutdown failed: {0}")]
    ShutdownError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Host capability missing or of an unexpected type
    #[error("Host capability unavailable: {0}")]
    HostUnavailable(String),

    /// Runtime error
    #[error("Runtime error: {0}")]
    RuntimeError(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}

/// Result type for module hooks
pub type Result<T> = std::result::Result<T, ModuleError>;

impl ModuleError {
    /// Create a new initialization error
    pub fn init(msg: impl fmt::Display) -> Self {
        Self::InitError(msg.to_string())
    }

    /// Create a new shutdown error
    pub fn shutdown(msg: impl fmt::Display) -> Self {
        Self::ShutdownError(msg.to_string())
    }

    /// Create a new configuration error
    pub fn config(msg: impl fmt::Display) -> Self {
        Self::ConfigError(msg.to_string())
    }

    /// Create a new host-unavailable error
    pub fn host_unavailable(msg: impl fmt::Display) -> Self {
        Self::HostUnavailable(msg.to_string())
    }

    /// Create a new runtime error
    pub fn runtime(msg: impl fmt::Display) -> Self {
        Self::RuntimeError(msg.to_string())
    }
}
