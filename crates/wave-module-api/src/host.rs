//! Opaque host capability handed to modules on initialization

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Opaque handle through which a module reaches host services.
///
/// The host builds one value (typically a struct exposing logging,
/// configuration, command registration and an event bus) and wraps it
/// here. The loader never looks inside; it clones the handle into every
/// module's [`initialize`](crate::Module::initialize). Modules recover the
/// concrete type with [`downcast_ref`](Self::downcast_ref).
#[derive(Clone, Default)]
pub struct HostCapability {
    inner: Option<Arc<dyn Any + Send + Sync>>,
}

impl HostCapability {
    /// Wrap a host services value
    pub fn new<T: Any + Send + Sync>(services: T) -> Self {
        Self {
            inner: Some(Arc::new(services) as Arc<dyn Any + Send + Sync>),
        }
    }

    /// Wrap an already shared host services value
    pub fn from_arc<T: Any + Send + Sync>(services: Arc<T>) -> Self {
        Self {
            inner: Some(services as Arc<dyn Any + Send + Sync>),
        }
    }

    /// A handle that exposes no services
    pub fn none() -> Self {
        Self { inner: None }
    }

    /// Whether the host supplied any services at all
    pub fn is_present(&self) -> bool {
        self.inner.is_some()
    }

    /// Borrow the host services as `T`, if that is what the host supplied
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.as_deref()?.downcast_ref::<T>()
    }

    /// Whether two handles point at the same host services value
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (&self.inner, &other.inner) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }
}

/// Basic facts about the host application
///
/// Hosts that have nothing richer to offer can hand this to
/// [`HostCapability::new`]; modules read it with
/// `host.downcast_ref::<HostInfo>()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostInfo {
    /// Host application name
    pub app_name: String,
    /// Host application version
    pub app_version: String,
}

impl HostInfo {
    /// Create host info
    pub fn new(app_name: impl Into<String>, app_version: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            app_version: app_version.into(),
        }
    }
}

impl fmt::Debug for HostCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostCapability")
            .field("present", &self.is_present())
            .finish()
    }
}
