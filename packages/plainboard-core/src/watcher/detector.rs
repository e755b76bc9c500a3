/// Snapshot diffing.
///
/// Holds the last committed snapshot as an exclusively owned copy. Additions
/// and modifications come out in the current snapshot's order, deletions in
/// the stored snapshot's order; both orders are by path.
use super::types::{ChangeKind, DirectorySnapshot, RawChange};

#[derive(Debug, Default)]
pub struct ChangeDetector {
    previous: DirectorySnapshot,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn detect_changes(&self, current: &DirectorySnapshot) -> Vec<RawChange> {
        let mut changes = Vec::new();

        for state in current.iter() {
            match self.previous.get(&state.path) {
                None => changes.push(RawChange::new(
                    state.path.clone(),
                    ChangeKind::Added,
                    state.is_directory,
                )),
                Some(old) if old.modified != state.modified || old.is_directory != state.is_directory => {
                    changes.push(RawChange::new(
                        state.path.clone(),
                        ChangeKind::Modified,
                        state.is_directory,
                    ))
                }
                Some(_) => {}
            }
        }

        for state in self.previous.iter() {
            if !current.contains(&state.path) {
                changes.push(RawChange::new(
                    state.path.clone(),
                    ChangeKind::Deleted,
                    state.is_directory,
                ));
            }
        }

        changes
    }

    /// Replace the stored snapshot with a copy of `snapshot`.
    pub fn update_state(&mut self, snapshot: &DirectorySnapshot) {
        self.previous = snapshot.clone();
    }

    pub fn reset(&mut self) {
        self.previous = DirectorySnapshot::new();
    }

    pub fn state(&self) -> DirectorySnapshot {
        self.previous.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watcher::types::FileState;
    use std::path::PathBuf;

    fn snap(states: &[FileState]) -> DirectorySnapshot {
        states.iter().cloned().collect()
    }

    #[test]
    fn test_added_modified_deleted() {
        let mut detector = ChangeDetector::new();
        detector.update_state(&snap(&[
            FileState::file("/r/keep.md", 1),
            FileState::file("/r/edit.md", 1),
            FileState::file("/r/gone.md", 1),
        ]));

        let changes = detector.detect_changes(&snap(&[
            FileState::file("/r/keep.md", 1),
            FileState::file("/r/edit.md", 2),
            FileState::file("/r/new.md", 5),
            FileState::directory("/r/dir"),
        ]));

        assert_eq!(
            changes,
            vec![
                RawChange::new("/r/dir", ChangeKind::Added, true),
                RawChange::new("/r/edit.md", ChangeKind::Modified, false),
                RawChange::new("/r/new.md", ChangeKind::Added, false),
                RawChange::new("/r/gone.md", ChangeKind::Deleted, false),
            ]
        );
    }

    #[test]
    fn test_idempotent() {
        let mut detector = ChangeDetector::new();
        let snapshot = snap(&[FileState::file("/r/a.md", 3), FileState::directory("/r/b")]);
        detector.update_state(&snapshot);
        assert!(detector.detect_changes(&snapshot).is_empty());
    }

    #[test]
    fn test_add_then_remove_never_modified() {
        let mut detector = ChangeDetector::new();
        let empty = snap(&[]);
        let with = snap(&[FileState::file("/r/a.md", 3)]);

        detector.update_state(&empty);
        let first = detector.detect_changes(&with);
        detector.update_state(&with);
        let second = detector.detect_changes(&empty);

        assert_eq!(first, vec![RawChange::new("/r/a.md", ChangeKind::Added, false)]);
        assert_eq!(second, vec![RawChange::new("/r/a.md", ChangeKind::Deleted, false)]);
    }

    #[test]
    fn test_state_is_a_copy() {
        let mut detector = ChangeDetector::new();
        let mut input = snap(&[FileState::file("/r/a.md", 1)]);
        detector.update_state(&input);

        input.insert(FileState::file("/r/b.md", 1));
        assert_eq!(detector.state().len(), 1);

        let mut copy = detector.state();
        copy.insert(FileState::file("/r/c.md", 1));
        assert_eq!(detector.state().len(), 1);
        assert!(detector.state().contains(&PathBuf::from("/r/a.md")));
    }

    #[test]
    fn test_reset_clears() {
        let mut detector = ChangeDetector::new();
        let snapshot = snap(&[FileState::file("/r/a.md", 1)]);
        detector.update_state(&snapshot);
        detector.reset();
        assert!(detector.state().is_empty());
        assert_eq!(detector.detect_changes(&snapshot).len(), 1);
    }
}
