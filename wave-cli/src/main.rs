//! Wave CLI

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wave_module_api::{HostCapability, HostInfo};
use wave_module_loader::{
    discover_libraries, LifecycleEvent, LoaderConfig, ModuleLoader, ModuleWatcher,
};

#[derive(Parser)]
#[command(name = "wave")]
#[command(about = "Wave module host", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the configured modules and run until interrupted
    Run {
        /// Path to configuration file
        #[arg(short, long, default_value = "wave.yaml")]
        config: PathBuf,

        /// Log level (trace, debug, info, warn, error)
        #[arg(short, long, default_value = "info", env = "WAVE_LOG_LEVEL")]
        log_level: String,

        /// Emit logs as JSON
        #[arg(long)]
        json: bool,
    },

    /// Load one module library, print its descriptor as JSON, unload it
    Inspect {
        /// Path to the module library
        path: PathBuf,

        /// Log level (trace, debug, info, warn, error)
        #[arg(short, long, default_value = "warn")]
        log_level: String,
    },

    /// List module libraries in a directory
    Discover {
        /// Directory to scan
        dir: PathBuf,
    },

    /// Validate configuration file
    Validate {
        /// Path to configuration file
        #[arg(short, long, default_value = "wave.yaml")]
        config: PathBuf,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            log_level,
            json,
        } => {
            init_tracing(&log_level, json)?;

            tracing::info!("Starting Wave module host");
            tracing::info!("Config file: {}", config.display());

            let config = LoaderConfig::load_from_file(&config)
                .with_context(|| format!("Failed to load {}", config.display()))?;

            run(config).await
        }

        Commands::Inspect { path, log_level } => {
            init_tracing(&log_level, false)?;

            let loader = ModuleLoader::new(host_capability());
            let module = loader
                .load(&path)
                .with_context(|| format!("Failed to inspect {}", path.display()))?;

            println!("{}", serde_json::to_string_pretty(&module)?);

            loader.unload(&module.name)?;
            Ok(())
        }

        Commands::Discover { dir } => {
            let libraries = discover_libraries(&dir)
                .with_context(|| format!("Failed to read {}", dir.display()))?;

            if libraries.is_empty() {
                println!("No module libraries found in {}", dir.display());
            }
            for library in libraries {
                println!("{}", library.display());
            }
            Ok(())
        }

        Commands::Validate { config } => {
            tracing_subscriber::fmt().with_target(false).init();

            tracing::info!("Validating configuration: {}", config.display());

            match LoaderConfig::load_from_file(&config) {
                Ok(cfg) => {
                    tracing::info!("✓ Configuration is valid");
                    tracing::info!("  Modules: {}", cfg.modules.len());
                    tracing::info!("  Reload strategy: {:?}", cfg.reload_strategy);
                    tracing::info!("  Watch: {}", cfg.watch.enabled);
                    Ok(())
                }
                Err(e) => {
                    tracing::error!("✗ Configuration validation failed: {}", e);
                    std::process::exit(1);
                }
            }
        }

        Commands::Version => {
            println!("Wave module host");
            println!("Version: {}", env!("CARGO_PKG_VERSION"));
            println!("Rust version: {}", env!("CARGO_PKG_RUST_VERSION"));
            Ok(())
        }
    }
}

async fn run(config: LoaderConfig) -> Result<()> {
    let loader = Arc::new(ModuleLoader::from_config(&config, host_capability()));
    loader.subscribe(log_event);

    let results = loader.load_all(&config.modules);
    let failed = results.iter().filter(|(_, result)| result.is_err()).count();
    tracing::info!(
        loaded = results.len() - failed,
        failed,
        strategy = ?config.reload_strategy,
        "Modules loaded"
    );

    let mut watcher = if config.watch.enabled {
        let mut watcher =
            ModuleWatcher::new(Arc::clone(&loader)).with_debounce(config.watch.debounce);
        watcher.start()?;
        watcher.run()?;
        Some(watcher)
    } else {
        None
    };

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    tracing::info!("Shutdown signal received");

    if let Some(watcher) = watcher.as_mut() {
        watcher.stop();
    }

    let teardown = Arc::clone(&loader);
    tokio::task::spawn_blocking(move || teardown.shutdown()).await?;

    tracing::info!("All modules unloaded");
    Ok(())
}

fn host_capability() -> HostCapability {
    HostCapability::new(HostInfo::new("wave", env!("CARGO_PKG_VERSION")))
}

fn log_event(event: &LifecycleEvent) {
    let module = if event.module.name.is_empty() {
        event.module.path.display().to_string()
    } else {
        event.module.name.clone()
    };

    if event.kind.is_error() {
        tracing::warn!(kind = %event.kind, module = %module, "{}", event.message);
    } else {
        tracing::info!(
            kind = %event.kind,
            module = %module,
            version = %event.module.version,
            "{}",
            event.message
        );
    }
}

fn init_tracing(level: &str, json: bool) -> Result<()> {
    let filter = match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    };

    let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(filter.into());

    if json {
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_level(true),
            )
            .with(filter)
            .init();
    }

    Ok(())
}
