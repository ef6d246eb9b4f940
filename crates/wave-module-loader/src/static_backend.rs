//! In-process library backend
//!
//! Serves "libraries" whose symbols are functions linked into the host
//! binary. Used to embed modules statically and to drive the controller in
//! tests without building shared objects.

use crate::library::{CloseError, LibraryBackend, LibraryError, LibraryHandle};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::ffi::c_void;
use std::fmt;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use std::sync::Arc;
use wave_module_api::{CreateModuleFn, DestroyModuleFn, CREATE_MODULE_SYMBOL, DESTROY_MODULE_SYMBOL};

/// Definition of one in-process library
#[derive(Debug, Clone, Default)]
pub struct StaticLibrary {
    symbols: HashMap<String, usize>,
    refused_closes: usize,
}

impl StaticLibrary {
    /// A library exporting no symbols
    pub fn empty() -> Self {
        Self::default()
    }

    /// A library exporting the factory and, optionally, the destructor
    pub fn module(create: CreateModuleFn, destroy: Option<DestroyModuleFn>) -> Self {
        let library = Self::empty().with_symbol(CREATE_MODULE_SYMBOL, create as usize);
        match destroy {
            Some(destroy) => library.with_symbol(DESTROY_MODULE_SYMBOL, destroy as usize),
            None => library,
        }
    }

    /// Export `address` under `name`
    pub fn with_symbol(mut self, name: impl Into<String>, address: usize) -> Self {
        self.symbols.insert(name.into(), address);
        self
    }

    /// Refuse the next `count` close attempts
    pub fn refuse_close(mut self, count: usize) -> Self {
        self.refused_closes = count;
        self
    }
}

#[derive(Debug, Default)]
struct Inner {
    libraries: HashMap<PathBuf, StaticLibrary>,
    open: HashMap<PathBuf, usize>,
}

/// Backend resolving paths to registered [`StaticLibrary`] definitions
///
/// Clones share the same set of libraries.
#[derive(Debug, Clone, Default)]
pub struct StaticBackend {
    inner: Arc<Mutex<Inner>>,
}

impl StaticBackend {
    /// Create an empty backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `library` available under `path`, replacing any previous definition
    pub fn register(&self, path: impl Into<PathBuf>, library: StaticLibrary) {
        self.inner.lock().libraries.insert(path.into(), library);
    }

    /// Forget the library at `path`; open handles stay valid
    pub fn remove(&self, path: impl AsRef<Path>) -> bool {
        self.inner.lock().libraries.remove(path.as_ref()).is_some()
    }

    /// Number of handles currently open for `path`
    pub fn open_handles(&self, path: impl AsRef<Path>) -> usize {
        self.inner
            .lock()
            .open
            .get(path.as_ref())
            .copied()
            .unwrap_or(0)
    }

    /// Total number of open handles
    pub fn total_open_handles(&self) -> usize {
        self.inner.lock().open.values().sum()
    }
}

impl LibraryBackend for StaticBackend {
    fn open(&self, path: &Path) -> Result<Box<dyn LibraryHandle>, LibraryError> {
        let mut inner = self.inner.lock();
        let library = inner.libraries.get(path).cloned().ok_or_else(|| {
            LibraryError::Open(format!(
                "{}: no static library registered at this path",
                path.display()
            ))
        })?;

        *inner.open.entry(path.to_path_buf()).or_insert(0) += 1;

        Ok(Box::new(StaticHandle {
            path: path.to_path_buf(),
            symbols: library.symbols,
            backend: Arc::clone(&self.inner),
        }))
    }
}

struct StaticHandle {
    path: PathBuf,
    symbols: HashMap<String, usize>,
    backend: Arc<Mutex<Inner>>,
}

impl fmt::Debug for StaticHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticHandle")
            .field("path", &self.path)
            .field("symbols", &self.symbols.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl LibraryHandle for StaticHandle {
    fn resolve(&self, symbol: &str) -> Result<NonNull<c_void>, LibraryError> {
        self.symbols
            .get(symbol)
            .and_then(|&address| NonNull::new(address as *mut c_void))
            .ok_or_else(|| {
                LibraryError::Symbol(format!(
                    "{}: undefined symbol: {symbol}",
                    self.path.display()
                ))
            })
    }

    fn close(self: Box<Self>) -> Result<(), CloseError> {
        let refused = {
            let mut inner = self.backend.lock();
            let refused = match inner.libraries.get_mut(&self.path) {
                Some(library) if library.refused_closes > 0 => {
                    library.refused_closes -= 1;
                    true
                }
                _ => false,
            };

            if !refused {
                if let Some(count) = inner.open.get_mut(&self.path) {
                    *count = count.saturating_sub(1);
                }
            }
            refused
        };

        if refused {
            let error = LibraryError::Close(format!(
                "{}: library is still in use",
                self.path.display()
            ));
            return Err(CloseError {
                handle: self,
                error,
            });
        }

        Ok(())
    }
}
