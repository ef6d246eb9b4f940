//! Shared fixtures for loader integration tests
//!
//! Module "libraries" are served by a `StaticBackend`; their factory and
//! destructor symbols are real `extern "C-unwind"` functions defined here.

#![allow(dead_code)]

use parking_lot::Mutex;
use std::ffi::c_void;
use std::sync::{Arc, OnceLock};
use wave_module_api::testing::{Behavior, MockCalls, MockModule};
use wave_module_api::Module;
use wave_module_loader::{
    LifecycleEvent, LifecycleEventKind, ModuleLoader, ReloadStrategy, StaticBackend,
    StaticLibrary,
};

fn into_raw(module: Box<dyn Module>) -> *mut c_void {
    Box::into_raw(Box::new(module)).cast()
}

/// Defines a factory building `$module` and a shared call tracker for it
macro_rules! mock_factory {
    ($factory:ident, $calls:ident, $module:expr) => {
        pub fn $calls() -> Arc<MockCalls> {
            static CALLS: OnceLock<Arc<MockCalls>> = OnceLock::new();
            Arc::clone(CALLS.get_or_init(|| Arc::new(MockCalls::default())))
        }

        pub unsafe extern "C-unwind" fn $factory() -> *mut c_void {
            into_raw(Box::new($module.with_calls($calls())))
        }
    };
}

mock_factory!(create_echo, echo_calls, MockModule::new("Echo"));
mock_factory!(create_round_trip, round_trip_calls, MockModule::new("RoundTrip"));
mock_factory!(create_echo_v2, echo_v2_calls, MockModule::new("Echo").with_version("2.0.0"));
mock_factory!(create_probe, probe_calls, MockModule::new("HostProbe"));
mock_factory!(create_alpha, alpha_calls, MockModule::new("Alpha"));
mock_factory!(create_beta, beta_calls, MockModule::new("Beta"));
mock_factory!(create_clash, clash_calls, MockModule::new("Clash"));
mock_factory!(create_racer, racer_calls, MockModule::new("Racer"));
mock_factory!(create_resident, resident_calls, MockModule::new("Resident"));
mock_factory!(create_teardown_a, teardown_a_calls, MockModule::new("TeardownA"));
mock_factory!(
    create_teardown_b,
    teardown_b_calls,
    MockModule::new("TeardownB").on_shutdown(Behavior::Panic)
);
mock_factory!(
    create_failing_init,
    failing_init_calls,
    MockModule::new("FailingInit").on_initialize(Behavior::Fail)
);
mock_factory!(
    create_panicking_init,
    panicking_init_calls,
    MockModule::new("PanickingInit").on_initialize(Behavior::Panic)
);
mock_factory!(
    create_faulty_shutdown,
    faulty_shutdown_calls,
    MockModule::new("FaultyShutdown").on_shutdown(Behavior::Fail)
);
mock_factory!(
    create_leaky,
    leaky_calls,
    MockModule::new("Leaky")
);

/// Build an untracked "Alpha" for property tests
pub unsafe extern "C-unwind" fn create_plain_alpha() -> *mut c_void {
    into_raw(Box::new(MockModule::new("Alpha")))
}

/// Build an untracked "Beta" for property tests
pub unsafe extern "C-unwind" fn create_plain_beta() -> *mut c_void {
    into_raw(Box::new(MockModule::new("Beta")))
}

/// Build an untracked "Gamma" whose initializer fails
pub unsafe extern "C-unwind" fn create_plain_gamma() -> *mut c_void {
    into_raw(Box::new(
        MockModule::new("Gamma").on_initialize(Behavior::Fail),
    ))
}

pub unsafe extern "C-unwind" fn create_null() -> *mut c_void {
    std::ptr::null_mut()
}

pub unsafe extern "C-unwind" fn create_panicking() -> *mut c_void {
    panic!("factory exploded")
}

pub unsafe extern "C-unwind" fn destroy_module(instance: *mut c_void) {
    if instance.is_null() {
        return;
    }
    drop(unsafe { Box::from_raw(instance.cast::<Box<dyn Module>>()) });
}

pub unsafe extern "C-unwind" fn destroy_panicking(instance: *mut c_void) {
    drop(unsafe { Box::from_raw(instance.cast::<Box<dyn Module>>()) });
    panic!("destructor exploded")
}

/// A loader over a fresh static backend
pub fn loader_with(strategy: ReloadStrategy) -> (Arc<ModuleLoader>, StaticBackend) {
    let backend = StaticBackend::new();
    let loader = ModuleLoader::builder()
        .backend(backend.clone())
        .reload_strategy(strategy)
        .build();
    (Arc::new(loader), backend)
}

/// Register a module library with the tracking destructor
pub fn register(backend: &StaticBackend, path: &str, factory: wave_module_api::CreateModuleFn) {
    backend.register(path, StaticLibrary::module(factory, Some(destroy_module)));
}

/// Records every lifecycle event a loader emits
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<LifecycleEvent>>>,
}

impl EventLog {
    pub fn attach(loader: &ModuleLoader) -> Self {
        let log = Self::default();
        let events = Arc::clone(&log.events);
        loader.subscribe(move |event| events.lock().push(event.clone()));
        log
    }

    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events.lock().clone()
    }

    pub fn kinds(&self) -> Vec<LifecycleEventKind> {
        self.events.lock().iter().map(|e| e.kind).collect()
    }

    pub fn count(&self, kind: LifecycleEventKind) -> usize {
        self.events.lock().iter().filter(|e| e.kind == kind).count()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}
