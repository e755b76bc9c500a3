/// On-disk layout shared by the watcher's classifier and the storage layer.
///
/// ```text
/// <root>/<board>/kanban.md
/// <root>/<board>/<column>/column.md
/// <root>/<board>/<column>/tasks/<id>-<slug>.md
/// <root>/agenda/<yyyy>/<mm>/<dd>/<id>-<slug>.md
/// ```
use std::path::{Path, PathBuf};

use chrono::{Datelike, NaiveDate};

use crate::slug;

pub const BOARD_FILE: &str = "kanban.md";
pub const COLUMN_FILE: &str = "column.md";
pub const TASKS_DIR: &str = "tasks";
pub const AGENDA_DIR: &str = "agenda";
pub const MARKDOWN_EXTENSION: &str = "md";
/// Extension used by atomic writes for their in-flight temp file.
pub const TEMP_EXTENSION: &str = "plainboard.tmp";

/// Directory name for a board or column id. Never empty, `.` or `..`.
pub fn entity_dir_name(id: &str) -> String {
    let slug = slug::slugify(id);
    if slug.is_empty() {
        slug::sanitize_id(id)
    } else {
        slug
    }
}

/// Board directory. A board called `agenda` is moved aside so it cannot
/// shadow the agenda tree.
pub fn board_dir(root: &Path, board_id: &str) -> PathBuf {
    let name = entity_dir_name(board_id);
    if name == AGENDA_DIR {
        root.join(format!("_{}", name))
    } else {
        root.join(name)
    }
}

pub fn column_dir(root: &Path, board_id: &str, column_id: &str) -> PathBuf {
    board_dir(root, board_id).join(entity_dir_name(column_id))
}

pub fn tasks_dir(root: &Path, board_id: &str, column_id: &str) -> PathBuf {
    column_dir(root, board_id, column_id).join(TASKS_DIR)
}

pub fn agenda_day_dir(root: &Path, date: NaiveDate) -> PathBuf {
    root.join(AGENDA_DIR)
        .join(format!("{:04}", date.year()))
        .join(format!("{:02}", date.month()))
        .join(format!("{:02}", date.day()))
}

pub fn is_markdown(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(MARKDOWN_EXTENSION)
}

/// Lower-cased file stem, used for id matching.
pub fn file_stem_lower(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// Dot-files and temp files never take part in synchronization.
pub fn is_ignored(path: &Path) -> bool {
    let Some(name) = path.file_name().map(|n| n.to_string_lossy()) else {
        return true;
    };
    name.starts_with('.') || name.ends_with(&format!(".{}", TEMP_EXTENSION))
}
