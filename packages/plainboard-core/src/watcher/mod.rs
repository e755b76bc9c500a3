pub mod classifier;
pub mod daemon;
pub mod debounce;
pub mod detector;
pub mod events;
pub mod polling;
pub mod scanner;
pub mod self_write;
pub mod types;

pub use daemon::{WatcherDaemon, WatcherStatus};
pub use events::{EventBus, EventFilter, ListenerHandle};

#[derive(Debug, thiserror::Error)]
pub enum WatcherError {
    #[error("Watcher is already running")]
    AlreadyRunning,

    #[error("Watcher is not running")]
    NotRunning,

    #[error("Invalid watcher config: {0}")]
    InvalidConfig(String),
}
