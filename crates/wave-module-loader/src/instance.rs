//! Owned module instances across the FFI boundary

use std::any::Any;
use std::ffi::c_void;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::ptr::NonNull;
use wave_module_api::{
    CreateModuleFn, DestroyModuleFn, HostCapability, Module, ModuleError, ModuleMetadata,
};

/// A fault raised by module-supplied code
#[derive(Debug, thiserror::Error)]
pub(crate) enum ModuleFault {
    /// The hook returned an error
    #[error("{0}")]
    Error(#[from] ModuleError),

    /// The hook panicked
    #[error("panicked: {0}")]
    Panic(String),

    /// The factory returned a null instance
    #[error("factory returned a null instance")]
    NullInstance,
}

impl ModuleFault {
    fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        ModuleFault::Panic(message)
    }
}

fn guarded<T>(f: impl FnOnce() -> T) -> Result<T, ModuleFault> {
    catch_unwind(AssertUnwindSafe(f)).map_err(ModuleFault::from_panic)
}

/// Reinterpret a resolved factory address.
///
/// # Safety
///
/// `symbol` must be the address of a function with the [`CreateModuleFn`]
/// signature. This cannot be checked; a mismatch is undefined behavior.
pub(crate) unsafe fn factory_from_symbol(symbol: NonNull<c_void>) -> CreateModuleFn {
    // SAFETY: guaranteed by the caller.
    unsafe { std::mem::transmute::<*mut c_void, CreateModuleFn>(symbol.as_ptr()) }
}

/// Reinterpret a resolved destructor address.
///
/// # Safety
///
/// `symbol` must be the address of a function with the [`DestroyModuleFn`]
/// signature.
pub(crate) unsafe fn destructor_from_symbol(symbol: NonNull<c_void>) -> DestroyModuleFn {
    // SAFETY: guaranteed by the caller.
    unsafe { std::mem::transmute::<*mut c_void, DestroyModuleFn>(symbol.as_ptr()) }
}

/// Unique owner of a module created by a library factory
///
/// The token is consumed by [`destroy`](Self::destroy), so an instance can
/// be handed back to its library at most once. Dropping the token without
/// destroying it leaks the instance; the owning library's code must still
/// be mapped for any call made through it.
pub(crate) struct ModuleInstance {
    raw: NonNull<Box<dyn Module>>,
}

// SAFETY: the pointee is a `Box<dyn Module>` and `Module: Send`. The token is
// the only owner of the pointer.
unsafe impl Send for ModuleInstance {}

impl ModuleInstance {
    /// Invoke `factory` and take ownership of what it returns.
    ///
    /// # Safety
    ///
    /// `factory` must honor the [`CreateModuleFn`] contract and its library
    /// must stay mapped for as long as the returned instance is used.
    pub(crate) unsafe fn create(factory: CreateModuleFn) -> Result<Self, ModuleFault> {
        // SAFETY: calling the factory is sound by the caller's guarantee.
        let raw = guarded(|| unsafe { factory() })?;
        let raw = NonNull::new(raw.cast::<Box<dyn Module>>()).ok_or(ModuleFault::NullInstance)?;
        Ok(Self { raw })
    }

    fn module(&mut self) -> &mut dyn Module {
        // SAFETY: `raw` came from the factory contract and is exclusively
        // owned by this token until `destroy`.
        unsafe { &mut **self.raw.as_ptr() }
    }

    /// Run the module's initializer
    pub(crate) fn initialize(&mut self, host: HostCapability) -> Result<(), ModuleFault> {
        let module = self.module();
        guarded(|| module.initialize(host))?.map_err(ModuleFault::from)
    }

    /// Run the module's shutdown hook
    pub(crate) fn shutdown(&mut self) -> Result<(), ModuleFault> {
        let module = self.module();
        guarded(|| module.shutdown())?.map_err(ModuleFault::from)
    }

    /// Read the identity the module reports
    pub(crate) fn metadata(&mut self) -> Result<ModuleMetadata, ModuleFault> {
        let module = self.module();
        guarded(|| module.metadata())
    }

    /// Hand the instance back to its library.
    ///
    /// Without a destructor the instance is released without being freed,
    /// ownership staying with the library.
    pub(crate) fn destroy(self, destructor: Option<DestroyModuleFn>) -> Result<(), ModuleFault> {
        let Some(destructor) = destructor else {
            return Ok(());
        };
        let raw = self.raw.as_ptr().cast::<c_void>();
        // SAFETY: `raw` was produced by the matching factory and this token
        // is consumed here, so it is passed back exactly once.
        guarded(|| unsafe { destructor(raw) })
    }
}

impl fmt::Debug for ModuleInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleInstance")
            .field("raw", &self.raw)
            .finish()
    }
}
