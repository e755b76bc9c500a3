/// Debounce aggregator.
///
/// Raw changes from consecutive polls accumulate in one buffer. Every push
/// re-arms the deadline, replacing the previous one, so the buffer is only
/// released once a full quiet window has passed. Changes to the same path
/// collapse within a batch.
use std::time::Duration;

use tokio::time::Instant;

use super::types::{ChangeKind, RawChange};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

#[derive(Debug)]
pub struct DebounceAggregator {
    delay: Duration,
    pending: Vec<RawChange>,
    deadline: Option<Instant>,
}

impl Default for DebounceAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}

impl DebounceAggregator {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: Vec::new(),
            deadline: None,
        }
    }

    pub fn set_delay(&mut self, delay: Duration) {
        self.delay = delay;
    }

    /// Add changes observed at `now` and re-arm the timer.
    pub fn push(&mut self, changes: Vec<RawChange>, now: Instant) {
        if changes.is_empty() {
            return;
        }
        for change in changes {
            self.merge(change);
        }
        self.deadline = Some(now + self.delay);
    }

    fn merge(&mut self, change: RawChange) {
        let Some(pos) = self.pending.iter().position(|c| c.path == change.path) else {
            self.pending.push(change);
            return;
        };
        let merged = match (self.pending[pos].kind, change.kind) {
            // Appeared and vanished inside one window: nothing happened.
            (ChangeKind::Added, ChangeKind::Deleted) => None,
            (ChangeKind::Added, _) => Some(ChangeKind::Added),
            (ChangeKind::Deleted, ChangeKind::Added) => Some(ChangeKind::Modified),
            (_, kind) => Some(kind),
        };
        match merged {
            Some(kind) => {
                self.pending[pos].kind = kind;
                self.pending[pos].is_directory = change.is_directory;
            }
            None => {
                self.pending.remove(pos);
            }
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Drain the batch if the quiet window has elapsed by `now`.
    pub fn take_ready(&mut self, now: Instant) -> Option<Vec<RawChange>> {
        match self.deadline {
            Some(deadline) if now >= deadline => Some(self.force_flush()),
            _ => None,
        }
    }

    /// Drain immediately, ignoring the timer.
    pub fn force_flush(&mut self) -> Vec<RawChange> {
        self.deadline = None;
        std::mem::take(&mut self.pending)
    }

    pub fn clear(&mut self) {
        self.deadline = None;
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(path: &str, kind: ChangeKind) -> RawChange {
        RawChange::new(path, kind, false)
    }

    #[test]
    fn test_burst_flushes_once() {
        let mut agg = DebounceAggregator::new(Duration::from_millis(300));
        let start = Instant::now();

        for i in 0..10u64 {
            let now = start + Duration::from_millis(i * 100);
            agg.push(vec![change(&format!("/r/{i}.md"), ChangeKind::Added)], now);
            assert!(agg.take_ready(now).is_none());
        }

        // Last push at 900ms re-armed the timer to 1200ms.
        assert!(agg.take_ready(start + Duration::from_millis(1100)).is_none());
        let batch = agg.take_ready(start + Duration::from_millis(1200)).unwrap();
        assert_eq!(batch.len(), 10);
        assert!(agg.take_ready(start + Duration::from_secs(10)).is_none());
        assert!(agg.deadline().is_none());
        assert_eq!(agg.pending_len(), 0);
    }

    #[test]
    fn test_push_rearms_deadline() {
        let mut agg = DebounceAggregator::new(Duration::from_millis(300));
        let start = Instant::now();
        agg.push(vec![change("/r/a.md", ChangeKind::Added)], start);
        let first = agg.deadline().unwrap();
        agg.push(vec![change("/r/b.md", ChangeKind::Added)], start + Duration::from_millis(200));
        assert!(agg.deadline().unwrap() > first);
    }

    #[test]
    fn test_empty_push_does_not_arm() {
        let mut agg = DebounceAggregator::default();
        agg.push(Vec::new(), Instant::now());
        assert!(agg.deadline().is_none());
    }

    #[test]
    fn test_same_path_collapses() {
        let mut agg = DebounceAggregator::default();
        let now = Instant::now();
        agg.push(vec![change("/r/a.md", ChangeKind::Added)], now);
        agg.push(vec![change("/r/a.md", ChangeKind::Modified)], now);
        agg.push(vec![change("/r/b.md", ChangeKind::Modified)], now);
        agg.push(vec![change("/r/b.md", ChangeKind::Deleted)], now);
        agg.push(vec![change("/r/c.md", ChangeKind::Added)], now);
        agg.push(vec![change("/r/c.md", ChangeKind::Deleted)], now);

        let batch = agg.force_flush();
        assert_eq!(
            batch,
            vec![
                change("/r/a.md", ChangeKind::Added),
                change("/r/b.md", ChangeKind::Deleted),
            ]
        );
    }

    #[test]
    fn test_force_flush_ignores_timer() {
        let mut agg = DebounceAggregator::default();
        agg.push(vec![change("/r/a.md", ChangeKind::Modified)], Instant::now());
        assert_eq!(agg.force_flush().len(), 1);
        assert_eq!(agg.pending_len(), 0);
        assert!(agg.deadline().is_none());
    }
}
