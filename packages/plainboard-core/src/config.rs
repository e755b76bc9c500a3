/// Engine configuration shared by the library and the daemon.
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level configuration: where the tree lives and how it is watched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_root")]
    pub root: PathBuf,
    #[serde(default)]
    pub watcher: WatcherConfig,
    #[serde(default)]
    pub columns: ColumnRoles,
}

fn default_root() -> PathBuf {
    PathBuf::from("boards")
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            watcher: WatcherConfig::default(),
            columns: ColumnRoles::default(),
        }
    }
}

/// Polling, debounce and scan tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    pub debounce_ms: u64,
    pub min_interval_ms: u64,
    pub initial_interval_ms: u64,
    pub max_interval_ms: u64,
    /// Growth factor applied to the poll interval on every idle cycle.
    pub backoff_factor: f64,
    pub max_depth: usize,
    pub yield_every: usize,
    pub self_write_ttl_ms: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 300,
            min_interval_ms: 500,
            initial_interval_ms: 1_000,
            max_interval_ms: 10_000,
            backoff_factor: 1.5,
            max_depth: 20,
            yield_every: 100,
            self_write_ttl_ms: 10_000,
        }
    }
}

impl WatcherConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.min_interval_ms == 0 {
            return Err("min_interval_ms must be greater than 0".to_string());
        }
        if self.min_interval_ms > self.max_interval_ms {
            return Err(format!(
                "min_interval_ms ({}) exceeds max_interval_ms ({})",
                self.min_interval_ms, self.max_interval_ms
            ));
        }
        if !self.backoff_factor.is_finite() || self.backoff_factor < 1.0 {
            return Err(format!("backoff_factor must be >= 1.0, got {}", self.backoff_factor));
        }
        if self.max_depth == 0 || self.yield_every == 0 {
            return Err("max_depth and yield_every must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Which column directories carry the progress/done timing semantics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnRoles {
    pub progress: String,
    pub done: String,
}

impl Default for ColumnRoles {
    fn default() -> Self {
        Self {
            progress: "in-progress".to_string(),
            done: "done".to_string(),
        }
    }
}
