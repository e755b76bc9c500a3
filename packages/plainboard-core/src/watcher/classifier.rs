/// Path-convention classifier: raw change → domain event.
///
/// Knows nothing about entity identity beyond what the path encodes. Paths
/// are taken relative to the watched root and split into segments:
///
/// | segments                          | kind      | event                      |
/// |-----------------------------------|-----------|----------------------------|
/// | `board/`                          | dir       | board created / deleted    |
/// | `board/kanban.md`                 | modified  | board modified             |
/// | `board/column/`                   | dir       | column created / deleted   |
/// | `board/column/column.md`          | add/mod   | column modified            |
/// | `board/column/<item>.md`          | any       | item created/modified/deleted |
/// | `board/column/tasks/<item>.md`    | any       | item created/modified/deleted |
///
/// Everything else, the root itself and the agenda tree classify to nothing.
use std::path::{Component, Path, PathBuf};

use chrono::Utc;

use super::types::{ChangeKind, ChangeType, DomainEvent, EntityType, RawChange};
use crate::layout::{self, AGENDA_DIR, BOARD_FILE, COLUMN_FILE, TASKS_DIR};

#[derive(Debug, Clone)]
pub struct ChangeClassifier {
    root: PathBuf,
}

impl ChangeClassifier {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn set_root(&mut self, root: impl Into<PathBuf>) {
        self.root = root.into();
    }

    pub fn classify(&self, change: &RawChange) -> Option<DomainEvent> {
        let relative = change.path.strip_prefix(&self.root).ok()?;
        let segments: Vec<String> = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();

        if segments.first().is_some_and(|s| s == AGENDA_DIR) {
            return None;
        }

        let event = |entity_type, change_type| DomainEvent {
            entity_type,
            change_type,
            file_path: change.path.clone(),
            timestamp: Utc::now(),
            board_name: segments.first().cloned(),
            column_name: None,
            item_id: None,
        };

        match segments.as_slice() {
            [_board] if change.is_directory => {
                let change_type = match change.kind {
                    ChangeKind::Added => ChangeType::Created,
                    ChangeKind::Deleted => ChangeType::Deleted,
                    ChangeKind::Modified => return None,
                };
                Some(event(EntityType::Board, change_type))
            }
            [_board, file] if file == BOARD_FILE && !change.is_directory => match change.kind {
                ChangeKind::Modified => Some(event(EntityType::Board, ChangeType::Modified)),
                _ => None,
            },
            [_board, column] if change.is_directory => {
                let change_type = match change.kind {
                    ChangeKind::Added => ChangeType::Created,
                    ChangeKind::Deleted => ChangeType::Deleted,
                    ChangeKind::Modified => return None,
                };
                Some(DomainEvent {
                    column_name: Some(column.clone()),
                    ..event(EntityType::Column, change_type)
                })
            }
            [_board, column, file] if file == COLUMN_FILE && !change.is_directory => {
                match change.kind {
                    ChangeKind::Added | ChangeKind::Modified => Some(DomainEvent {
                        column_name: Some(column.clone()),
                        ..event(EntityType::Column, ChangeType::Modified)
                    }),
                    ChangeKind::Deleted => None,
                }
            }
            [_board, column, file] | [_board, column, _, file]
                if !change.is_directory
                    && is_item_file(file)
                    && (segments.len() == 3 || segments[2] == TASKS_DIR) =>
            {
                let change_type = match change.kind {
                    ChangeKind::Added => ChangeType::Created,
                    ChangeKind::Modified => ChangeType::Modified,
                    ChangeKind::Deleted => ChangeType::Deleted,
                };
                let item_id = Path::new(file)
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned());
                Some(DomainEvent {
                    column_name: Some(column.clone()),
                    item_id,
                    ..event(EntityType::Item, change_type)
                })
            }
            _ => None,
        }
    }

    pub fn classify_batch(&self, changes: &[RawChange]) -> Vec<DomainEvent> {
        changes.iter().filter_map(|c| self.classify(c)).collect()
    }
}

fn is_item_file(name: &str) -> bool {
    name != COLUMN_FILE && layout::is_markdown(Path::new(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> ChangeClassifier {
        ChangeClassifier::new("boards")
    }

    fn classify(path: &str, kind: ChangeKind, is_dir: bool) -> Option<DomainEvent> {
        classifier().classify(&RawChange::new(path, kind, is_dir))
    }

    #[test]
    fn test_board_added() {
        let e = classify("boards/b1", ChangeKind::Added, true).unwrap();
        assert_eq!(e.entity_type, EntityType::Board);
        assert_eq!(e.change_type, ChangeType::Created);
        assert_eq!(e.board_name.as_deref(), Some("b1"));
        assert_eq!(e.file_path, PathBuf::from("boards/b1"));
    }

    #[test]
    fn test_board_deleted() {
        let e = classify("boards/b1", ChangeKind::Deleted, true).unwrap();
        assert_eq!(e.change_type, ChangeType::Deleted);
    }

    #[test]
    fn test_board_changed() {
        let e = classify("boards/b1/kanban.md", ChangeKind::Modified, false).unwrap();
        assert_eq!(e.entity_type, EntityType::Board);
        assert_eq!(e.change_type, ChangeType::Modified);
        assert_eq!(e.board_name.as_deref(), Some("b1"));
        assert!(classify("boards/b1/kanban.md", ChangeKind::Added, false).is_none());
    }

    #[test]
    fn test_column_changed() {
        let e = classify("boards/b1/to-do/column.md", ChangeKind::Modified, false).unwrap();
        assert_eq!(e.entity_type, EntityType::Column);
        assert_eq!(e.change_type, ChangeType::Modified);
        assert_eq!(e.board_name.as_deref(), Some("b1"));
        assert_eq!(e.column_name.as_deref(), Some("to-do"));
        assert!(classify("boards/b1/to-do/column.md", ChangeKind::Added, false).is_some());
        assert!(classify("boards/b1/to-do/column.md", ChangeKind::Deleted, false).is_none());
    }

    #[test]
    fn test_item_added() {
        let e = classify("boards/b1/to-do/MKA-1.md", ChangeKind::Added, false).unwrap();
        assert_eq!(e.entity_type, EntityType::Item);
        assert_eq!(e.change_type, ChangeType::Created);
        assert_eq!(e.board_name.as_deref(), Some("b1"));
        assert_eq!(e.column_name.as_deref(), Some("to-do"));
        assert_eq!(e.item_id.as_deref(), Some("MKA-1"));
    }

    #[test]
    fn test_item_modified_and_deleted() {
        let e = classify("boards/b1/to-do/MKA-1.md", ChangeKind::Modified, false).unwrap();
        assert_eq!(e.change_type, ChangeType::Modified);
        let e = classify("boards/b1/to-do/MKA-1.md", ChangeKind::Deleted, false).unwrap();
        assert_eq!(e.change_type, ChangeType::Deleted);
    }

    #[test]
    fn test_item_in_tasks_dir() {
        let e = classify(
            "boards/b1/to-do/tasks/mka-1-fix-login.md",
            ChangeKind::Added,
            false,
        )
        .unwrap();
        assert_eq!(e.entity_type, EntityType::Item);
        assert_eq!(e.column_name.as_deref(), Some("to-do"));
        assert_eq!(e.item_id.as_deref(), Some("mka-1-fix-login"));

        assert!(classify("boards/b1/to-do/other/x.md", ChangeKind::Added, false).is_none());
    }

    #[test]
    fn test_column_directory() {
        let e = classify("boards/b1/to-do", ChangeKind::Added, true).unwrap();
        assert_eq!(e.entity_type, EntityType::Column);
        assert_eq!(e.change_type, ChangeType::Created);
        assert_eq!(e.column_name.as_deref(), Some("to-do"));
    }

    #[test]
    fn test_root_and_unrecognized() {
        assert!(classify("boards", ChangeKind::Modified, true).is_none());
        assert!(classify("boards/b1", ChangeKind::Modified, true).is_none());
        assert!(classify("boards/notes.txt", ChangeKind::Added, false).is_none());
        assert!(classify("boards/b1/to-do/readme.txt", ChangeKind::Added, false).is_none());
        assert!(classify("boards/b1/to-do/tasks", ChangeKind::Added, true).is_none());
        assert!(classify("elsewhere/b1", ChangeKind::Added, true).is_none());
        assert!(classify("boards/a/b/c/d/e.md", ChangeKind::Added, false).is_none());
    }

    #[test]
    fn test_agenda_is_not_a_board() {
        assert!(classify("boards/agenda", ChangeKind::Added, true).is_none());
        assert!(classify("boards/agenda/2026/10/16/x.md", ChangeKind::Added, false).is_none());
    }
}
