//! plainboard daemon: watches a storage root and reports board, column and
//! item changes made by other tools.
//!
//! Usage: `plainboard-daemon [config.json]`. Logging follows `RUST_LOG`.

mod config;

use std::path::PathBuf;
use std::process::ExitCode;

use plainboard_core::watcher::{EventFilter, WatcherError};
use plainboard_core::Engine;

use crate::config::DaemonConfig;

#[derive(Debug, thiserror::Error)]
enum DaemonError {
    #[error(transparent)]
    Watcher(#[from] WatcherError),

    #[error("Cannot create storage root {}: {source}", path.display())]
    Root {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to start runtime: {0}")]
    Runtime(#[source] std::io::Error),

    #[error("Failed to listen for shutdown signal: {0}")]
    Signal(#[source] std::io::Error),
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config_path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(config::default_config_path);
    let config = config::load_config(&config_path);

    match run(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("[plainboard.daemon] {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(config: DaemonConfig) -> Result<(), DaemonError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(DaemonError::Runtime)?;
    runtime.block_on(serve(config))
}

async fn serve(config: DaemonConfig) -> Result<(), DaemonError> {
    let engine_config = config.engine_config();
    let root = engine_config.root.clone();
    tokio::fs::create_dir_all(&root)
        .await
        .map_err(|source| DaemonError::Root {
            path: root.clone(),
            source,
        })?;

    let engine = Engine::new(engine_config)?;
    if config.print_events {
        engine.events().subscribe(EventFilter::All, |event| {
            println!("{}", serde_json::to_string(event)?);
            Ok(())
        });
    }

    engine.watcher().start()?;
    log::info!("[plainboard.daemon] Watching {}, Ctrl-C to stop", root.display());

    tokio::signal::ctrl_c().await.map_err(DaemonError::Signal)?;
    engine.watcher().stop().await?;

    let status = engine.watcher().status().await;
    log::info!(
        "[plainboard.daemon] Stopped after {} cycles, {} events",
        status.cycles,
        status.events_published
    );
    Ok(())
}
