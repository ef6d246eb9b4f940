//! Binary contract between a module library and the loader
//!
//! A module library exports two unmangled symbols:
//!
//! - [`CREATE_MODULE_SYMBOL`]: a [`CreateModuleFn`] returning an owning
//!   pointer to a freshly built module, or null on failure.
//! - [`DESTROY_MODULE_SYMBOL`] (optional): a [`DestroyModuleFn`] taking that
//!   pointer back and releasing it.
//!
//! The pointer is a thin `*mut Box<dyn Module>` erased to `*mut c_void`.
//! Both functions use the `C-unwind` ABI so a panic inside them reaches the
//! loader, which catches it instead of aborting the host. The host and the
//! module must be built by the same compiler since `dyn Module` crosses the
//! boundary.
//!
//! Use [`declare_module!`](crate::declare_module) rather than writing the
//! symbols by hand.

use std::ffi::c_void;

/// Name of the factory symbol
pub const CREATE_MODULE_SYMBOL: &str = "create_module_instance";

/// Name of the destructor symbol
pub const DESTROY_MODULE_SYMBOL: &str = "destroy_module_instance";

/// Factory entry point.
///
/// # Safety
///
/// A non-null return value must come from
/// `Box::into_raw(Box::new(module))` where `module: Box<dyn Module>`.
pub type CreateModuleFn = unsafe extern "C-unwind" fn() -> *mut c_void;

/// Destructor entry point.
///
/// # Safety
///
/// The pointer must have been produced by the matching [`CreateModuleFn`]
/// of the same library and must not be used afterwards.
pub type DestroyModuleFn = unsafe extern "C-unwind" fn(*mut c_void);

/// Export a module type from a `cdylib`.
///
/// Takes the module type and a path to a zero-argument constructor
/// returning it. Generates `create_module_instance` and
/// `destroy_module_instance`.
///
/// ```rust,ignore
/// declare_module!(ClipboardModule, ClipboardModule::new);
/// ```
#[macro_export]
macro_rules! declare_module {
    ($module_type:ty, $constructor:path) => {
        #[no_mangle]
        pub extern "C-unwind" fn create_module_instance() -> *mut ::std::ffi::c_void {
            let module: $module_type = $constructor();
            let boxed: ::std::boxed::Box<dyn $crate::Module> = ::std::boxed::Box::new(module);
            ::std::boxed::Box::into_raw(::std::boxed::Box::new(boxed)).cast::<::std::ffi::c_void>()
        }

        #[no_mangle]
        #[allow(unused_unsafe)]
        pub unsafe extern "C-unwind" fn destroy_module_instance(instance: *mut ::std::ffi::c_void) {
            if instance.is_null() {
                return;
            }
            // SAFETY: the loader only passes back pointers produced by
            // `create_module_instance` above, exactly once.
            let boxed = unsafe {
                ::std::boxed::Box::from_raw(
                    instance.cast::<::std::boxed::Box<dyn $crate::Module>>(),
                )
            };
            ::std::mem::drop(boxed);
        }
    };
}
