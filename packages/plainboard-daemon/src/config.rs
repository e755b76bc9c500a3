/// Configuration for the plainboard daemon.
/// Reads config.json from ~/.config/plainboard/config.json (or platform equivalent).
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use plainboard_core::config::{ColumnRoles, EngineConfig, WatcherConfig};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Storage root. Defaults to the platform data directory.
    #[serde(default)]
    pub root: Option<PathBuf>,
    #[serde(default)]
    pub watcher: WatcherConfig,
    #[serde(default)]
    pub columns: ColumnRoles,
    /// Print every domain event as one JSON line on stdout.
    #[serde(default = "default_print_events")]
    pub print_events: bool,
}

fn default_print_events() -> bool {
    true
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            root: None,
            watcher: WatcherConfig::default(),
            columns: ColumnRoles::default(),
            print_events: default_print_events(),
        }
    }
}

impl DaemonConfig {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            root: self.root.clone().unwrap_or_else(default_root),
            watcher: self.watcher.clone(),
            columns: self.columns.clone(),
        }
    }
}

/// Default storage root: ~/.local/share/plainboard/boards
pub fn default_root() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("plainboard")
        .join("boards")
}

/// Default config path: ~/.config/plainboard/config.json
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("plainboard")
        .join("config.json")
}

/// Load config from path. Returns default if file doesn't exist or is invalid.
pub fn load_config(path: &Path) -> DaemonConfig {
    match fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
            log::warn!("Failed to parse config {}: {}", path.display(), e);
            DaemonConfig::default()
        }),
        Err(_) => {
            log::info!("No config at {}, using defaults", path.display());
            DaemonConfig::default()
        }
    }
}
