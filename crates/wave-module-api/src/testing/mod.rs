//! Testing utilities for module and host developers
//!
//! This module provides a configurable mock module that records the hooks
//! the loader drives.

pub mod mocks;

pub use mocks::{Behavior, MockCalls, MockModule};
