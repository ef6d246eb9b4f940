//! Lifecycle controller: load, unload, reload and teardown

use crate::config::{LoaderConfig, ReloadStrategy};
use crate::descriptor::{ModuleDescriptor, ModuleSnapshot};
use crate::error::{LoaderError, ReloadPhase, Result};
use crate::event::{LifecycleEvent, LifecycleEventKind};
use crate::instance::{destructor_from_symbol, factory_from_symbol, ModuleInstance};
use crate::library::{LibraryBackend, LibraryHandle, NativeBackend};
use crate::notifier::{EventNotifier, SubscriptionId};
use crate::registry::ModuleRegistry;
use chrono::Utc;
use parking_lot::{Mutex, MutexGuard};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use wave_module_api::{DestroyModuleFn, HostCapability, CREATE_MODULE_SYMBOL, DESTROY_MODULE_SYMBOL};

const LOADED: &str = "Module loaded successfully.";
const UNLOADED: &str = "Module unloaded successfully.";
const RELOADED: &str = "Module reloaded successfully.";
const NOT_FOUND_FOR_UNLOAD: &str = "Module not found for unloading.";

/// Loads, reloads and unloads modules from shared libraries
///
/// Every operation runs under one lock guarding the registry. Lifecycle
/// events are delivered synchronously on the calling thread while that lock
/// is held, so a callback sees the registry exactly as the event describes
/// it. Callbacks must therefore not call back into the loader; doing so
/// deadlocks.
///
/// Dropping the loader tears down every remaining module.
pub struct ModuleLoader {
    backend: Box<dyn LibraryBackend>,
    host: HostCapability,
    registry: Mutex<ModuleRegistry>,
    notifier: EventNotifier,
    reload_strategy: ReloadStrategy,
}

/// Builder for [`ModuleLoader`]
pub struct ModuleLoaderBuilder {
    backend: Box<dyn LibraryBackend>,
    host: HostCapability,
    reload_strategy: ReloadStrategy,
}

impl ModuleLoaderBuilder {
    /// Host capability forwarded to every module's `initialize`
    pub fn host(mut self, host: HostCapability) -> Self {
        self.host = host;
        self
    }

    /// Library backend (defaults to [`NativeBackend`])
    pub fn backend(mut self, backend: impl LibraryBackend + 'static) -> Self {
        self.backend = Box::new(backend);
        self
    }

    /// Reload strategy (defaults to [`ReloadStrategy::Atomic`])
    pub fn reload_strategy(mut self, strategy: ReloadStrategy) -> Self {
        self.reload_strategy = strategy;
        self
    }

    /// Build the loader
    pub fn build(self) -> ModuleLoader {
        ModuleLoader {
            backend: self.backend,
            host: self.host,
            registry: Mutex::new(ModuleRegistry::new()),
            notifier: EventNotifier::new(),
            reload_strategy: self.reload_strategy,
        }
    }
}

impl Default for ModuleLoaderBuilder {
    fn default() -> Self {
        Self {
            backend: Box::new(NativeBackend::new()),
            host: HostCapability::none(),
            reload_strategy: ReloadStrategy::default(),
        }
    }
}

impl fmt::Debug for ModuleLoaderBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleLoaderBuilder")
            .field("backend", &self.backend)
            .field("host", &self.host)
            .field("reload_strategy", &self.reload_strategy)
            .finish()
    }
}

impl ModuleLoader {
    /// Create a loader using the platform dynamic loader
    pub fn new(host: HostCapability) -> Self {
        Self::builder().host(host).build()
    }

    /// Start building a loader
    pub fn builder() -> ModuleLoaderBuilder {
        ModuleLoaderBuilder::default()
    }

    /// Create a native loader configured from `config`
    ///
    /// Modules listed in the configuration are not loaded; see
    /// [`load_all`](Self::load_all).
    pub fn from_config(config: &LoaderConfig, host: HostCapability) -> Self {
        Self::builder()
            .host(host)
            .reload_strategy(config.reload_strategy)
            .build()
    }

    /// The host capability forwarded to modules
    pub fn host(&self) -> &HostCapability {
        &self.host
    }

    /// The configured reload strategy
    pub fn reload_strategy(&self) -> ReloadStrategy {
        self.reload_strategy
    }

    /// Load the module library at `path`
    pub fn load(&self, path: impl AsRef<Path>) -> Result<ModuleSnapshot> {
        let mut registry = self.registry.lock();
        self.load_locked(&mut registry, path.as_ref())
    }

    /// Load several libraries in order, continuing past failures
    pub fn load_all<I, P>(&self, paths: I) -> Vec<(PathBuf, Result<ModuleSnapshot>)>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        paths
            .into_iter()
            .map(|path| {
                let path = path.as_ref().to_path_buf();
                let result = self.load(&path);
                (path, result)
            })
            .collect()
    }

    /// Unload the module named `name`
    ///
    /// A shutdown or destructor fault is reported as an event and does not
    /// stop the unload. If the platform refuses to unmap the library the
    /// module stays registered as resident and
    /// [`LoaderError::UnloadFailure`] is returned. Calling `unload` again
    /// retries the close where the backend supports it; a [`NativeBackend`]
    /// library whose close failed has been consumed by the platform loader,
    /// so such a module stays resident for the life of the process.
    pub fn unload(&self, name: &str) -> Result<ModuleSnapshot> {
        let mut registry = self.registry.lock();
        self.unload_locked(&mut registry, name, true)
    }

    /// Unload `name` and load it again from the same path
    ///
    /// Emits one `Reloaded` event on success, plus the `Loaded` event of the
    /// inner load; the inner unload emits no `Unloaded` event. Under
    /// [`ReloadStrategy::ReleaseLock`] the lock is handed to any waiting
    /// thread between the two halves, so others may observe the module as
    /// absent or load its path themselves.
    pub fn reload(&self, name: &str) -> Result<ModuleSnapshot> {
        let mut registry = self.registry.lock();

        let path = match registry.find(name) {
            Some(descriptor) => descriptor.path.clone(),
            None => return Err(LoaderError::not_found(name)),
        };

        info!(module = %name, path = %path.display(), strategy = ?self.reload_strategy, "Reloading module");

        if let Err(e) = self.unload_locked(&mut registry, name, false) {
            let snapshot = e
                .snapshot()
                .cloned()
                .unwrap_or_else(|| ModuleSnapshot::partial(name, &path));
            error!(module = %name, error = %e, "Failed to unload module during reload");
            self.emit(
                LifecycleEventKind::ErrorUnloading,
                snapshot,
                format!("Failed to unload module during reload: {e}"),
            );
            return Err(LoaderError::reload(name, ReloadPhase::Unload, e));
        }

        let loaded = match self.reload_strategy {
            ReloadStrategy::Atomic => self.load_locked(&mut registry, &path),
            ReloadStrategy::ReleaseLock => {
                MutexGuard::unlocked_fair(&mut registry, || self.load(&path))
            }
        };

        match loaded {
            Ok(snapshot) => {
                info!(module = %snapshot.name, version = %snapshot.version, "Module reloaded");
                self.emit(LifecycleEventKind::Reloaded, snapshot.clone(), RELOADED);
                Ok(snapshot)
            }
            Err(e) => {
                error!(module = %name, error = %e, "Failed to load module during reload");
                self.emit(
                    LifecycleEventKind::ErrorLoading,
                    ModuleSnapshot::partial(name, &path),
                    format!("Failed to load module during reload: {e}"),
                );
                Err(LoaderError::reload(name, ReloadPhase::Load, e))
            }
        }
    }

    /// Snapshot of every loaded module, sorted by name
    pub fn list_all(&self) -> Vec<ModuleSnapshot> {
        self.registry.lock().list_all()
    }

    /// Snapshot of one module
    pub fn get(&self, name: &str) -> Option<ModuleSnapshot> {
        self.registry.lock().find(name).map(ModuleDescriptor::snapshot)
    }

    /// Snapshot of the module loaded from `path`
    pub fn find_by_path(&self, path: impl AsRef<Path>) -> Option<ModuleSnapshot> {
        self.registry
            .lock()
            .find_by_path(path.as_ref())
            .map(ModuleDescriptor::snapshot)
    }

    /// Whether a module named `name` is loaded
    pub fn contains(&self, name: &str) -> bool {
        self.registry.lock().find(name).is_some()
    }

    /// Number of loaded modules
    pub fn len(&self) -> usize {
        self.registry.lock().len()
    }

    /// Whether no module is loaded
    pub fn is_empty(&self) -> bool {
        self.registry.lock().is_empty()
    }

    /// Register a lifecycle event callback
    ///
    /// The callback runs synchronously on the thread performing the
    /// operation, with the loader lock held. It may subscribe or unsubscribe
    /// but must not call any other loader method.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&LifecycleEvent) + Send + Sync + 'static,
    {
        self.notifier.subscribe(callback)
    }

    /// Remove a callback; returns whether it was registered
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.notifier.unsubscribe(id)
    }

    /// Unload every module without emitting `Unloaded` events
    ///
    /// Individual failures are logged and do not stop the remaining
    /// unloads. Safe to call more than once.
    pub fn shutdown(&self) {
        let mut registry = self.registry.lock();
        if registry.is_empty() {
            return;
        }

        let names = registry.names();
        info!(count = names.len(), "Unloading all modules");

        for name in names {
            if let Err(e) = self.unload_locked(&mut registry, &name, false) {
                warn!(module = %name, error = %e, "Module failed to unload during teardown");
            }
        }
    }

    fn emit(&self, kind: LifecycleEventKind, module: ModuleSnapshot, message: impl Into<String>) {
        self.notifier
            .broadcast(&LifecycleEvent::new(kind, module, message));
    }

    fn load_failed(&self, err: LoaderError, name: &str, path: &Path) -> LoaderError {
        error!(path = %path.display(), error = %err, "Failed to load module");
        self.emit(
            LifecycleEventKind::ErrorLoading,
            ModuleSnapshot::partial(name, path),
            err.to_string(),
        );
        err
    }

    fn load_locked(&self, registry: &mut ModuleRegistry, path: &Path) -> Result<ModuleSnapshot> {
        if let Some(existing) = registry.find_by_path(path) {
            return Err(LoaderError::AlreadyLoaded {
                path: path.to_path_buf(),
                existing: Box::new(existing.snapshot()),
            });
        }

        debug!(path = %path.display(), "Loading module");

        let library = self.backend.open(path).map_err(|e| {
            self.load_failed(
                LoaderError::LoadFailure {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                },
                "",
                path,
            )
        })?;

        let factory = match library.resolve(CREATE_MODULE_SYMBOL) {
            // SAFETY: the factory symbol is declared with the `CreateModuleFn`
            // signature by the module contract.
            Ok(symbol) => unsafe { factory_from_symbol(symbol) },
            Err(e) => {
                close_after_failure(library, path);
                return Err(self.load_failed(
                    LoaderError::SymbolNotFound {
                        path: path.to_path_buf(),
                        symbol: CREATE_MODULE_SYMBOL.to_string(),
                        reason: e.to_string(),
                    },
                    "",
                    path,
                ));
            }
        };

        let destructor = resolve_destructor(library.as_ref());
        if destructor.is_none() {
            debug!(path = %path.display(), "Library exports no destructor; instance will not be freed by the loader");
        }

        // SAFETY: `factory` honors the contract and `library` stays open for
        // as long as the instance lives: it is closed only after `destroy`.
        let mut instance = match unsafe { ModuleInstance::create(factory) } {
            Ok(instance) => instance,
            Err(fault) => {
                close_after_failure(library, path);
                return Err(self.load_failed(
                    LoaderError::ConstructionFailure {
                        path: path.to_path_buf(),
                        reason: fault.to_string(),
                    },
                    "",
                    path,
                ));
            }
        };

        if let Err(fault) = instance.initialize(self.host.clone()) {
            let name = instance.metadata().map(|m| m.name).unwrap_or_default();
            discard(instance, destructor, &name);
            close_after_failure(library, path);
            return Err(self.load_failed(
                LoaderError::InitializationFailure {
                    name: name.clone(),
                    path: path.to_path_buf(),
                    reason: fault.to_string(),
                },
                &name,
                path,
            ));
        }

        let metadata = match instance.metadata() {
            Ok(metadata) => metadata,
            Err(fault) => {
                discard(instance, destructor, "");
                close_after_failure(library, path);
                return Err(self.load_failed(
                    LoaderError::ConstructionFailure {
                        path: path.to_path_buf(),
                        reason: format!("failed to read module identity: {fault}"),
                    },
                    "",
                    path,
                ));
            }
        };

        let descriptor = ModuleDescriptor {
            name: metadata.name,
            version: metadata.version,
            description: metadata.description,
            path: path.to_path_buf(),
            library,
            instance: Some(instance),
            has_destructor: destructor.is_some(),
            loaded_at: Utc::now(),
        };
        let snapshot = descriptor.snapshot();

        if let Err(mut rejected) = registry.insert(descriptor) {
            let existing_path = registry
                .find(&rejected.name)
                .map(|d| d.path.clone())
                .unwrap_or_default();
            if let Some(instance) = rejected.instance.take() {
                discard(instance, destructor, &rejected.name);
            }
            close_after_failure(rejected.library, path);
            return Err(self.load_failed(
                LoaderError::DuplicateName {
                    name: rejected.name.clone(),
                    path: path.to_path_buf(),
                    existing_path,
                },
                &rejected.name,
                path,
            ));
        }

        info!(
            module = %snapshot.name,
            version = %snapshot.version,
            path = %path.display(),
            "Module loaded"
        );
        self.emit(LifecycleEventKind::Loaded, snapshot.clone(), LOADED);

        Ok(snapshot)
    }

    fn unload_locked(
        &self,
        registry: &mut ModuleRegistry,
        name: &str,
        emit_unloaded: bool,
    ) -> Result<ModuleSnapshot> {
        let Some(mut descriptor) = registry.remove(name) else {
            if emit_unloaded {
                self.emit(
                    LifecycleEventKind::ErrorUnloading,
                    ModuleSnapshot::partial(name, ""),
                    NOT_FOUND_FOR_UNLOAD,
                );
            }
            return Err(LoaderError::not_found(name));
        };

        let snapshot = descriptor.snapshot();
        debug!(module = %name, "Unloading module");

        if let Some(mut instance) = descriptor.instance.take() {
            if let Err(fault) = instance.shutdown() {
                let err = LoaderError::ShutdownFault {
                    name: name.to_string(),
                    reason: fault.to_string(),
                };
                warn!(module = %name, error = %err, "Module shutdown faulted; continuing unload");
                self.emit(LifecycleEventKind::ErrorUnloading, snapshot.clone(), err.to_string());
            }

            let destructor = resolve_destructor(descriptor.library.as_ref());
            if let Err(fault) = instance.destroy(destructor) {
                let err = LoaderError::DestructorFault {
                    name: name.to_string(),
                    reason: fault.to_string(),
                };
                warn!(module = %name, error = %err, "Module destructor faulted; continuing unload");
                self.emit(LifecycleEventKind::ErrorUnloading, snapshot.clone(), err.to_string());
            }
        }

        if let Err(close) = descriptor.library.close() {
            descriptor.library = close.handle;
            let resident = descriptor.snapshot();
            let err = LoaderError::UnloadFailure {
                module: Box::new(resident.clone()),
                reason: close.error.to_string(),
            };
            error!(module = %name, error = %err, "Library could not be unmapped; module stays resident");

            if let Err(descriptor) = registry.insert(descriptor) {
                error!(module = %descriptor.name, "Resident module could not be re-registered");
            }
            self.emit(LifecycleEventKind::ErrorUnloading, resident, err.to_string());
            return Err(err);
        }

        info!(module = %name, path = %snapshot.path.display(), "Module unloaded");
        if emit_unloaded {
            self.emit(LifecycleEventKind::Unloaded, snapshot.clone(), UNLOADED);
        }

        Ok(snapshot)
    }
}

impl Drop for ModuleLoader {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for ModuleLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleLoader")
            .field("backend", &self.backend)
            .field("host", &self.host)
            .field("reload_strategy", &self.reload_strategy)
            .field("notifier", &self.notifier)
            .finish_non_exhaustive()
    }
}

fn resolve_destructor(library: &dyn LibraryHandle) -> Option<DestroyModuleFn> {
    library
        .resolve(DESTROY_MODULE_SYMBOL)
        .ok()
        // SAFETY: the destructor symbol is declared with the
        // `DestroyModuleFn` signature by the module contract.
        .map(|symbol| unsafe { destructor_from_symbol(symbol) })
}

/// Best-effort release of an instance that never made it into the registry
fn discard(instance: ModuleInstance, destructor: Option<DestroyModuleFn>, name: &str) {
    if let Err(fault) = instance.destroy(destructor) {
        warn!(module = %name, error = %fault, "Destructor faulted while discarding module");
    }
}

fn close_after_failure(library: Box<dyn LibraryHandle>, path: &Path) {
    if let Err(e) = library.close() {
        warn!(path = %path.display(), error = %e, "Failed to close library after load failure");
    }
}
