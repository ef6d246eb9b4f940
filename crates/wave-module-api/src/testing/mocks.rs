//! Mock implementations for testing

use crate::error::Result;
use crate::host::HostCapability;
use crate::module::Module;
use crate::ModuleError;
use std::sync::{Arc, Mutex};

/// How a mock hook behaves when called
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Behavior {
    /// Return `Ok(())`
    #[default]
    Succeed,
    /// Return an error
    Fail,
    /// Panic
    Panic,
}

/// Calls recorded by a [`MockModule`], shared with the test
#[derive(Debug, Default)]
pub struct MockCalls {
    initialize: Mutex<usize>,
    shutdown: Mutex<usize>,
    dropped: Mutex<usize>,
    last_host: Mutex<Option<HostCapability>>,
}

impl MockCalls {
    /// Number of `initialize` calls
    pub fn initialize_count(&self) -> usize {
        *self.initialize.lock().unwrap()
    }

    /// Number of `shutdown` calls
    pub fn shutdown_count(&self) -> usize {
        *self.shutdown.lock().unwrap()
    }

    /// Number of instances dropped
    pub fn drop_count(&self) -> usize {
        *self.dropped.lock().unwrap()
    }

    /// Host capability received by the last `initialize` call
    pub fn last_host(&self) -> Option<HostCapability> {
        self.last_host.lock().unwrap().clone()
    }
}

/// Mock module for testing
#[derive(Debug)]
pub struct MockModule {
    name: String,
    version: String,
    on_initialize: Behavior,
    on_shutdown: Behavior,
    calls: Arc<MockCalls>,
}

impl MockModule {
    /// Create a new mock module reporting `name` and version `1.0.0`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: "1.0.0".to_string(),
            on_initialize: Behavior::Succeed,
            on_shutdown: Behavior::Succeed,
            calls: Arc::new(MockCalls::default()),
        }
    }

    /// Set the reported version
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Set how `initialize` behaves
    pub fn on_initialize(mut self, behavior: Behavior) -> Self {
        self.on_initialize = behavior;
        self
    }

    /// Set how `shutdown` behaves
    pub fn on_shutdown(mut self, behavior: Behavior) -> Self {
        self.on_shutdown = behavior;
        self
    }

    /// Record calls into an existing tracker
    pub fn with_calls(mut self, calls: Arc<MockCalls>) -> Self {
        self.calls = calls;
        self
    }

    /// Get the call tracker
    pub fn calls(&self) -> Arc<MockCalls> {
        Arc::clone(&self.calls)
    }
}

impl Module for MockModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn initialize(&mut self, host: HostCapability) -> Result<()> {
        *self.calls.initialize.lock().unwrap() += 1;
        *self.calls.last_host.lock().unwrap() = Some(host);
        match self.on_initialize {
            Behavior::Succeed => Ok(()),
            Behavior::Fail => Err(ModuleError::init(format!("{} refused to start", self.name))),
            Behavior::Panic => panic!("{} panicked in initialize", self.name),
        }
    }

    fn shutdown(&mut self) -> Result<()> {
        *self.calls.shutdown.lock().unwrap() += 1;
        match self.on_shutdown {
            Behavior::Succeed => Ok(()),
            Behavior::Fail => Err(ModuleError::shutdown(format!("{} left work behind", self.name))),
            Behavior::Panic => panic!("{} panicked in shutdown", self.name),
        }
    }
}

impl Drop for MockModule {
    fn drop(&mut self) {
        if let Ok(mut dropped) = self.calls.dropped.lock() {
            *dropped += 1;
        }
    }
}
