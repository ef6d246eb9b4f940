//! Dynamic library handle abstraction
//!
//! [`LibraryBackend`] opens libraries and [`LibraryHandle`] resolves symbols
//! out of an open library and closes it. The lifecycle controller only ever
//! talks to these traits; [`NativeBackend`] is the `libloading` implementation
//! used in production.

use std::ffi::c_void;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use tracing::debug;

/// Error raised by a library backend
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LibraryError {
    /// The library could not be opened or linked
    #[error("{0}")]
    Open(String),

    /// The symbol is not exported by the library
    #[error("{0}")]
    Symbol(String),

    /// The platform refused to unmap the library
    #[error("{0}")]
    Close(String),
}

/// A failed close, handing the still-open library back to the caller
pub struct CloseError {
    /// The handle that could not be closed
    pub handle: Box<dyn LibraryHandle>,
    /// Platform diagnostic
    pub error: LibraryError,
}

impl fmt::Debug for CloseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloseError")
            .field("handle", &self.handle)
            .field("error", &self.error)
            .finish()
    }
}

impl fmt::Display for CloseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.error.fmt(f)
    }
}

impl std::error::Error for CloseError {}

/// Opens libraries by path
pub trait LibraryBackend: Send + Sync + fmt::Debug {
    /// Open the library at `path`
    fn open(&self, path: &Path) -> Result<Box<dyn LibraryHandle>, LibraryError>;
}

/// An open library
pub trait LibraryHandle: Send + fmt::Debug {
    /// Resolve an exported symbol to its address
    ///
    /// Nothing about the symbol's type can be checked here.
    fn resolve(&self, symbol: &str) -> Result<NonNull<c_void>, LibraryError>;

    /// Unmap the library
    ///
    /// On failure the handle is returned inside the error and must stay
    /// tracked by the caller.
    fn close(self: Box<Self>) -> Result<(), CloseError>;
}

/// Backend built on the platform dynamic loader
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeBackend;

impl NativeBackend {
    /// Create a new native backend
    pub fn new() -> Self {
        Self
    }
}

impl LibraryBackend for NativeBackend {
    fn open(&self, path: &Path) -> Result<Box<dyn LibraryHandle>, LibraryError> {
        // SAFETY: opening a library runs its initializers. Module libraries
        // are trusted to run with full host privilege.
        let library = unsafe { libloading::Library::new(path) }
            .map_err(|e| LibraryError::Open(e.to_string()))?;

        debug!(path = %path.display(), "Library opened");

        Ok(Box::new(NativeLibrary {
            path: path.to_path_buf(),
            library: Some(library),
        }))
    }
}

/// A library opened through [`NativeBackend`]
pub struct NativeLibrary {
    path: PathBuf,
    /// `None` after a failed close, since `libloading` consumes the library
    library: Option<libloading::Library>,
}

impl NativeLibrary {
    /// Path the library was opened from
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Debug for NativeLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeLibrary")
            .field("path", &self.path)
            .field("released", &self.library.is_none())
            .finish()
    }
}

impl LibraryHandle for NativeLibrary {
    fn resolve(&self, symbol: &str) -> Result<NonNull<c_void>, LibraryError> {
        let library = self.library.as_ref().ok_or_else(|| {
            LibraryError::Symbol(format!(
                "{}: library handle was released by a failed close",
                self.path.display()
            ))
        })?;

        // SAFETY: the symbol is read as an untyped address; callers cast it to
        // the contract type before use.
        let address = unsafe { library.get::<*mut c_void>(symbol.as_bytes()) }
            .map(|sym| *sym)
            .map_err(|e| LibraryError::Symbol(e.to_string()))?;

        debug!(path = %self.path.display(), symbol, "Symbol resolved");

        NonNull::new(address)
            .ok_or_else(|| LibraryError::Symbol(format!("symbol '{symbol}' resolved to null")))
    }

    fn close(mut self: Box<Self>) -> Result<(), CloseError> {
        let Some(library) = self.library.take() else {
            let error = LibraryError::Close(format!(
                "{}: library handle was already released by a failed close",
                self.path.display()
            ));
            return Err(CloseError {
                handle: self,
                error,
            });
        };

        match library.close() {
            Ok(()) => {
                debug!(path = %self.path.display(), "Library closed");
                Ok(())
            }
            Err(e) => Err(CloseError {
                error: LibraryError::Close(e.to_string()),
                handle: self,
            }),
        }
    }
}

/// List the dynamic libraries directly inside `dir`
///
/// Matches the current platform's library extension and returns the
/// paths sorted.
pub fn discover_libraries(dir: impl AsRef<Path>) -> io::Result<Vec<PathBuf>> {
    let mut libraries = Vec::new();

    for entry in fs::read_dir(dir.as_ref())? {
        let path = entry?.path();
        if path.is_file() && is_library_path(&path) {
            libraries.push(path);
        }
    }

    libraries.sort();
    Ok(libraries)
}

/// Whether `path` carries the current platform's library extension
pub fn is_library_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext == std::env::consts::DLL_EXTENSION)
        .unwrap_or(false)
}
