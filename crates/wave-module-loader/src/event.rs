//! Lifecycle events

use crate::descriptor::ModuleSnapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of lifecycle transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEventKind {
    /// A module was loaded and registered
    Loaded,
    /// A module was unloaded and removed
    Unloaded,
    /// A module was reloaded from its path
    Reloaded,
    /// A load failed
    ErrorLoading,
    /// An unload failed or a module faulted while shutting down
    ErrorUnloading,
}

impl LifecycleEventKind {
    /// Whether this kind reports a failure
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            LifecycleEventKind::ErrorLoading | LifecycleEventKind::ErrorUnloading
        )
    }
}

impl fmt::Display for LifecycleEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LifecycleEventKind::Loaded => "loaded",
            LifecycleEventKind::Unloaded => "unloaded",
            LifecycleEventKind::Reloaded => "reloaded",
            LifecycleEventKind::ErrorLoading => "error_loading",
            LifecycleEventKind::ErrorUnloading => "error_unloading",
        };
        f.write_str(s)
    }
}

/// A lifecycle transition observed by subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    /// What happened
    pub kind: LifecycleEventKind,

    /// Copy of the module at the time of the event
    pub module: ModuleSnapshot,

    /// Human-readable detail
    pub message: String,

    /// When the event was emitted
    pub timestamp: DateTime<Utc>,
}

impl LifecycleEvent {
    /// Create a new event stamped with the current time
    pub fn new(kind: LifecycleEventKind, module: ModuleSnapshot, message: impl Into<String>) -> Self {
        Self {
            kind,
            module,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = if self.module.name.is_empty() {
            self.module.path.display().to_string()
        } else {
            self.module.name.clone()
        };
        write!(f, "[{}] {}: {}", self.kind, name, self.message)
    }
}
