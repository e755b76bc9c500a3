/// Wires the storage and watcher halves around one storage root, one event
/// bus and one own-write tracker.
///
/// The coordinator writes through a `TrackedFileSystem`, the watcher reads
/// through the plain one; both share the tracker so saves made here are not
/// reported back as external edits.
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::config::EngineConfig;
use crate::fs::{FileSystem, LocalFileSystem, TrackedFileSystem};
use crate::storage::{PersistenceCoordinator, StorageRoot};
use crate::watcher::self_write::SelfWriteTracker;
use crate::watcher::{EventBus, WatcherDaemon, WatcherError};

pub struct Engine {
    config: EngineConfig,
    root: StorageRoot,
    bus: Arc<EventBus>,
    storage: PersistenceCoordinator,
    watcher: WatcherDaemon,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Result<Self, WatcherError> {
        Self::with_file_system(config, Arc::new(LocalFileSystem::new()))
    }

    pub fn with_file_system(
        config: EngineConfig,
        fs: Arc<dyn FileSystem>,
    ) -> Result<Self, WatcherError> {
        let root = StorageRoot::new(config.root.clone());
        let bus = Arc::new(EventBus::new());
        let tracker = Arc::new(Mutex::new(SelfWriteTracker::new()));

        let watcher = WatcherDaemon::new(
            fs.clone(),
            root.clone(),
            bus.clone(),
            tracker.clone(),
            &config.watcher,
        )?;
        let tracked: Arc<dyn FileSystem> = Arc::new(TrackedFileSystem::new(fs, tracker));
        let storage = PersistenceCoordinator::new(tracked, root.clone(), config.columns.clone());

        log::info!("[plainboard.engine.init] Storage root {:?}", config.root);
        Ok(Self {
            config,
            root,
            bus,
            storage,
            watcher,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn root(&self) -> &StorageRoot {
        &self.root
    }

    /// Point storage and watcher at a different directory.
    pub fn set_root(&self, path: impl Into<PathBuf>) -> bool {
        self.root.set(path)
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn storage(&self) -> &PersistenceCoordinator {
        &self.storage
    }

    pub fn watcher(&self) -> &WatcherDaemon {
        &self.watcher
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Board, Column, Task};
    use crate::watcher::types::{ChangeType, EntityType};
    use crate::watcher::EventFilter;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_engine_round_trip() {
        let tmp = TempDir::new().unwrap();
        let config = EngineConfig {
            root: tmp.path().to_path_buf(),
            ..EngineConfig::default()
        };
        let engine = Engine::new(config).unwrap();
        let items = Arc::new(AtomicUsize::new(0));
        let seen = items.clone();
        engine
            .events()
            .subscribe(EventFilter::Entity(EntityType::Item), move |event| {
                assert_eq!(event.change_type, ChangeType::Created);
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });

        engine.watcher().force_check().await;

        let mut board = Board::new("roadmap", "Roadmap");
        let mut column = Column::new("backlog", "Backlog");
        column.tasks.push(Task::new("RM-1", "Plan release"));
        board.columns.push(column);
        engine.storage().save_board(&board).await.unwrap();
        assert!(engine.watcher().force_check().await.is_empty());

        std::fs::write(
            tmp.path().join("roadmap/backlog/tasks/rm-2-from-phone.md"),
            "---\nid: RM-2\ntitle: From phone\n---\n",
        )
        .unwrap();
        let events = engine.watcher().force_check().await;
        assert_eq!(events.len(), 1);
        assert_eq!(items.load(Ordering::SeqCst), 1);

        let loaded = engine.storage().load_board("roadmap").await.unwrap().unwrap();
        assert_eq!(loaded.columns[0].tasks.len(), 2);
    }

    #[test]
    fn test_invalid_watcher_config_is_rejected() {
        let mut config = EngineConfig::default();
        config.watcher.min_interval_ms = 0;
        assert!(matches!(
            Engine::new(config),
            Err(WatcherError::InvalidConfig(_))
        ));
    }
}
