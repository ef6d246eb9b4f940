//! Hot reload of modules when their library file changes

use crate::descriptor::ModuleSnapshot;
use crate::library::is_library_path;
use crate::loader::ModuleLoader;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Watcher error
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// The platform watcher could not be created or attached
    #[error("File watcher error: {0}")]
    Notify(#[from] notify::Error),

    /// `run` was called before `start`, or twice
    #[error("Watcher not started")]
    NotStarted,
}

/// Reloads loaded modules whose library file was rebuilt
///
/// Watches the directories of the modules loaded when [`start`](Self::start)
/// is called. A change to a library file maps back to the module loaded
/// from that path, which is then reloaded on a blocking task. Reload errors
/// are logged, never propagated.
#[derive(Debug)]
pub struct ModuleWatcher {
    loader: Arc<ModuleLoader>,
    watcher: Option<RecommendedWatcher>,
    rx: Option<mpsc::UnboundedReceiver<notify::Result<Event>>>,
    debounce: Duration,
}

impl ModuleWatcher {
    /// Create a new watcher over `loader`
    pub fn new(loader: Arc<ModuleLoader>) -> Self {
        Self {
            loader,
            watcher: None,
            rx: None,
            debounce: Duration::from_secs(1),
        }
    }

    /// Set the minimum delay between two reloads of the same module
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Directories containing the currently loaded libraries
    pub fn watched_dirs(&self) -> Vec<PathBuf> {
        self.loader
            .list_all()
            .iter()
            .filter_map(|module| module.path.parent().map(Path::to_path_buf))
            .filter(|dir| !dir.as_os_str().is_empty())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Start watching
    pub fn start(&mut self) -> Result<(), WatchError> {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = tx.send(res);
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        let dirs = self.watched_dirs();
        for dir in &dirs {
            watcher.watch(dir, RecursiveMode::NonRecursive)?;
        }

        self.watcher = Some(watcher);
        self.rx = Some(rx);

        info!(dirs = dirs.len(), "Module watcher started");
        Ok(())
    }

    /// Stop watching
    pub fn stop(&mut self) {
        self.watcher = None;
        self.rx = None;
        info!("Module watcher stopped");
    }

    /// Spawn the event loop on the current tokio runtime
    ///
    /// The loop ends when the watcher is stopped or dropped.
    pub fn run(&mut self) -> Result<JoinHandle<()>, WatchError> {
        let mut rx = self.rx.take().ok_or(WatchError::NotStarted)?;
        let loader = Arc::clone(&self.loader);
        let debounce = self.debounce;

        Ok(tokio::spawn(async move {
            let mut last_reload: HashMap<String, Instant> = HashMap::new();

            while let Some(res) = rx.recv().await {
                let event = match res {
                    Ok(event) => event,
                    Err(e) => {
                        warn!(error = %e, "File watcher error");
                        continue;
                    }
                };

                if !should_process_event(&event) {
                    continue;
                }

                for path in &event.paths {
                    let Some(module) = module_for_path(&loader, path) else {
                        debug!(path = %path.display(), "Changed library is not loaded");
                        continue;
                    };

                    if last_reload
                        .get(&module.name)
                        .is_some_and(|at| at.elapsed() < debounce)
                    {
                        continue;
                    }
                    last_reload.insert(module.name.clone(), Instant::now());

                    info!(module = %module.name, path = %path.display(), "Library changed, reloading module");

                    let loader = Arc::clone(&loader);
                    let name = module.name.clone();
                    match tokio::task::spawn_blocking(move || loader.reload(&name)).await {
                        Ok(Ok(snapshot)) => {
                            info!(module = %snapshot.name, version = %snapshot.version, "Module hot reloaded")
                        }
                        Ok(Err(e)) => error!(module = %module.name, error = %e, "Hot reload failed"),
                        Err(e) => error!(module = %module.name, error = %e, "Hot reload task failed"),
                    }
                }
            }
        }))
    }
}

/// Whether `event` is a write or creation of a library file
fn should_process_event(event: &Event) -> bool {
    match event.kind {
        EventKind::Modify(_) | EventKind::Create(_) => {
            event.paths.iter().any(|path| is_library_path(path))
        }
        _ => false,
    }
}

/// The loaded module whose library lives at `path`
fn module_for_path(loader: &ModuleLoader, path: &Path) -> Option<ModuleSnapshot> {
    if let Some(module) = loader.find_by_path(path) {
        return Some(module);
    }

    let changed = fs::canonicalize(path).ok()?;
    loader
        .list_all()
        .into_iter()
        .find(|module| fs::canonicalize(&module.path).ok().as_deref() == Some(changed.as_path()))
}
