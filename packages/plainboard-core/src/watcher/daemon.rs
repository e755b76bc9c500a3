/// Polling watcher.
///
/// One background task drives the pipeline: scan the root, diff against the
/// previous snapshot, drop changes the engine made itself, debounce, then
/// classify and publish. The next poll is only scheduled once the current
/// cycle has finished. `force_check` runs the same cycle inline under the same
/// lock and flushes the debounce buffer immediately.
///
/// The first cycle after start (or after the storage root moves) only records
/// a baseline; files already on disk are not reported as created.
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::classifier::ChangeClassifier;
use super::debounce::DebounceAggregator;
use super::detector::ChangeDetector;
use super::events::EventBus;
use super::polling::{AdaptiveInterval, PollingPolicy};
use super::scanner::DirectoryScanner;
use super::self_write::SelfWriteTracker;
use super::types::{ChangeKind, DomainEvent, RawChange};
use super::WatcherError;
use crate::config::WatcherConfig;
use crate::fs::FileSystem;
use crate::storage::StorageRoot;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WatcherStatus {
    pub running: bool,
    pub root: PathBuf,
    /// Current poll interval.
    pub interval_ms: u64,
    /// Raw changes waiting for the debounce window to close.
    pub pending_changes: usize,
    pub last_scan_at: Option<DateTime<Utc>>,
    pub cycles: u64,
    pub events_published: u64,
    /// Paths with an own-write mark not yet observed.
    pub tracked_paths: usize,
}

struct WatchState {
    scanner: DirectoryScanner,
    detector: ChangeDetector,
    debounce: DebounceAggregator,
    classifier: ChangeClassifier,
    policy: Box<dyn PollingPolicy>,
    has_baseline: bool,
    next_poll_at: Instant,
    last_scan_at: Option<DateTime<Utc>>,
    cycles: u64,
    events_published: u64,
}

impl WatchState {
    fn next_wake(&self) -> Instant {
        match self.debounce.deadline() {
            Some(deadline) => deadline.min(self.next_poll_at),
            None => self.next_poll_at,
        }
    }

    /// Forget everything observed under the old root.
    fn rebase(&mut self, root: PathBuf) {
        log::info!("[plainboard.watcher.root] Rebasing on {:?}", root);
        self.detector.reset();
        self.debounce.clear();
        self.policy.reset();
        self.classifier.set_root(root);
        self.has_baseline = false;
    }
}

struct Shared {
    fs: Arc<dyn FileSystem>,
    root: StorageRoot,
    bus: Arc<EventBus>,
    tracker: Arc<Mutex<SelfWriteTracker>>,
    state: tokio::sync::Mutex<WatchState>,
}

struct Running {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

pub struct WatcherDaemon {
    shared: Arc<Shared>,
    running: Mutex<Option<Running>>,
}

impl WatcherDaemon {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        root: StorageRoot,
        bus: Arc<EventBus>,
        tracker: Arc<Mutex<SelfWriteTracker>>,
        config: &WatcherConfig,
    ) -> Result<Self, WatcherError> {
        let policy = Box::new(AdaptiveInterval::from_config(config));
        Self::with_policy(fs, root, bus, tracker, config, policy)
    }

    pub fn with_policy(
        fs: Arc<dyn FileSystem>,
        root: StorageRoot,
        bus: Arc<EventBus>,
        tracker: Arc<Mutex<SelfWriteTracker>>,
        config: &WatcherConfig,
        policy: Box<dyn PollingPolicy>,
    ) -> Result<Self, WatcherError> {
        config.validate().map_err(WatcherError::InvalidConfig)?;
        tracker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .set_ttl(Duration::from_millis(config.self_write_ttl_ms));

        let state = WatchState {
            scanner: DirectoryScanner::new(fs.clone())
                .with_limits(config.max_depth, config.yield_every),
            detector: ChangeDetector::new(),
            debounce: DebounceAggregator::new(Duration::from_millis(config.debounce_ms)),
            classifier: ChangeClassifier::new(root.current()),
            policy,
            has_baseline: false,
            next_poll_at: Instant::now(),
            last_scan_at: None,
            cycles: 0,
            events_published: 0,
        };
        Ok(Self {
            shared: Arc::new(Shared {
                fs,
                root,
                bus,
                tracker,
                state: tokio::sync::Mutex::new(state),
            }),
            running: Mutex::new(None),
        })
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.shared.bus
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }

    /// Spawn the poll loop on the current tokio runtime.
    pub fn start(&self) -> Result<(), WatcherError> {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if running.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            return Err(WatcherError::AlreadyRunning);
        }
        let (shutdown, shutdown_rx) = watch::channel(false);
        let shared = self.shared.clone();
        let handle = tokio::spawn(run(shared, shutdown_rx));
        *running = Some(Running { shutdown, handle });
        log::info!(
            "[plainboard.watcher.start] Watching {:?}",
            self.shared.root.current()
        );
        Ok(())
    }

    /// Signal the loop to exit, wait for it, and drop any undelivered batch.
    pub async fn stop(&self) -> Result<(), WatcherError> {
        let running = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(Running { shutdown, handle }) = running else {
            return Err(WatcherError::NotRunning);
        };
        let _ = shutdown.send(true);
        if let Err(e) = handle.await {
            log::error!("[plainboard.watcher.stop] Poll loop ended abnormally: {}", e);
        }

        let mut state = self.shared.state.lock().await;
        let dropped = state.debounce.pending_len();
        state.debounce.clear();
        log::info!(
            "[plainboard.watcher.stop] Stopped ({} pending changes dropped)",
            dropped
        );
        Ok(())
    }

    /// Run one cycle now and deliver everything pending without waiting for
    /// the debounce window. Returns the published events.
    pub async fn force_check(&self) -> Vec<DomainEvent> {
        let mut state = self.shared.state.lock().await;
        self.shared.poll(&mut state).await;
        let batch = state.debounce.force_flush();
        self.shared.dispatch(&mut state, batch)
    }

    /// Apply new tuning. The poll interval restarts from its initial value.
    pub async fn update_config(&self, config: &WatcherConfig) -> Result<(), WatcherError> {
        config.validate().map_err(WatcherError::InvalidConfig)?;
        let mut state = self.shared.state.lock().await;
        state.debounce.set_delay(Duration::from_millis(config.debounce_ms));
        state.policy = Box::new(AdaptiveInterval::from_config(config));
        state.scanner = DirectoryScanner::new(self.shared.fs.clone())
            .with_limits(config.max_depth, config.yield_every);
        state.next_poll_at = Instant::now() + state.policy.interval();
        self.shared
            .tracker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .set_ttl(Duration::from_millis(config.self_write_ttl_ms));
        log::info!("[plainboard.watcher.config] Watcher config updated");
        Ok(())
    }

    pub async fn status(&self) -> WatcherStatus {
        let running = self.is_running();
        let state = self.shared.state.lock().await;
        let tracked_paths = self
            .shared
            .tracker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pending_paths();
        WatcherStatus {
            running,
            root: state.classifier.root().to_path_buf(),
            interval_ms: state.policy.interval().as_millis() as u64,
            pending_changes: state.debounce.pending_len(),
            last_scan_at: state.last_scan_at,
            cycles: state.cycles,
            events_published: state.events_published,
            tracked_paths,
        }
    }
}

impl Drop for WatcherDaemon {
    fn drop(&mut self) {
        let running = self
            .running
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(Running { shutdown, .. }) = running {
            let _ = shutdown.send(true);
        }
    }
}

async fn run(shared: Arc<Shared>, mut shutdown: watch::Receiver<bool>) {
    // A fresh receiver has already seen the current root.
    let mut root_rx = shared.root.subscribe();
    {
        let mut state = shared.state.lock().await;
        state.has_baseline = false;
        state.next_poll_at = Instant::now();
    }

    loop {
        let wake = shared.state.lock().await.next_wake();
        tokio::select! {
            _ = shutdown.changed() => break,
            changed = root_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let root = root_rx.borrow_and_update().clone();
                let mut state = shared.state.lock().await;
                state.rebase(root);
                state.next_poll_at = Instant::now();
            }
            _ = tokio::time::sleep_until(wake) => {
                let mut state = shared.state.lock().await;
                if Instant::now() >= state.next_poll_at {
                    shared.poll(&mut state).await;
                    state.next_poll_at = Instant::now() + state.policy.interval();
                }
                if let Some(batch) = state.debounce.take_ready(Instant::now()) {
                    shared.dispatch(&mut state, batch);
                }
            }
        }
    }
    log::debug!("[plainboard.watcher.loop] Poll loop exited");
}

impl Shared {
    /// Scan, diff and buffer. Returns the number of changes kept.
    async fn poll(&self, state: &mut WatchState) -> usize {
        let root = self.root.current();
        if state.classifier.root() != root {
            state.rebase(root.clone());
        }

        let snapshot = state.scanner.scan(&root).await;
        state.cycles += 1;
        state.last_scan_at = Some(Utc::now());

        if !state.has_baseline {
            log::debug!(
                "[plainboard.watcher.scan] Baseline of {} entries under {:?}",
                snapshot.len(),
                root
            );
            state.detector.update_state(&snapshot);
            state.has_baseline = true;
            return 0;
        }

        let changes = state.detector.detect_changes(&snapshot);
        state.detector.update_state(&snapshot);
        let detected = changes.len();
        let changes = self.drop_own_writes(changes).await;
        self.tracker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cleanup_expired();

        if changes.is_empty() {
            state.policy.on_idle();
        } else {
            state.policy.on_activity();
        }
        log::trace!(
            "[plainboard.watcher.poll] {} changes ({} own), next interval {:?}",
            detected,
            detected - changes.len(),
            state.policy.interval()
        );
        let kept = changes.len();
        state.debounce.push(changes, Instant::now());
        kept
    }

    async fn drop_own_writes(&self, changes: Vec<RawChange>) -> Vec<RawChange> {
        let mut kept = Vec::with_capacity(changes.len());
        for change in changes {
            // Read outside the tracker lock.
            let content = match (change.kind, change.is_directory) {
                (ChangeKind::Deleted, _) | (_, true) => None,
                _ => self.fs.read_file(&change.path).await,
            };
            let mut tracker = self.tracker.lock().unwrap_or_else(PoisonError::into_inner);
            let own = match (change.kind, change.is_directory) {
                (ChangeKind::Deleted, _) => tracker.check_removal(&change.path),
                (ChangeKind::Added, true) => tracker.check_directory(&change.path),
                (ChangeKind::Modified, true) => false,
                _ => content.is_some_and(|c| tracker.check_write(&change.path, &c)),
            };
            drop(tracker);
            if own {
                log::debug!("[plainboard.watcher.self] Ignoring own change {:?}", change.path);
            } else {
                kept.push(change);
            }
        }
        kept
    }

    fn dispatch(&self, state: &mut WatchState, batch: Vec<RawChange>) -> Vec<DomainEvent> {
        if batch.is_empty() {
            return Vec::new();
        }
        let events = state.classifier.classify_batch(&batch);
        for event in &events {
            log::debug!(
                "[plainboard.watcher.event] {:?} {:?} {:?}",
                event.entity_type,
                event.change_type,
                event.file_path
            );
            self.bus.publish(event);
        }
        state.events_published += events.len() as u64;
        log::info!(
            "[plainboard.watcher.flush] {} changes -> {} events",
            batch.len(),
            events.len()
        );
        events
    }
}
