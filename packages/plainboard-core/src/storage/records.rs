/// On-disk front-matter records.
///
/// These mirror the domain types but use the snake_case keys of the file
/// format and are lenient on read: ids may be numbers, timestamps may be bare
/// dates, and missing fields default so files written by other tools load.
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml_ng::Value;

use crate::types::{AgendaItem, Board, Column, Parent, Task};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct TaskRecord {
    #[serde(default, deserialize_with = "lenient_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_timestamp", skip_serializing_if = "Option::is_none")]
    pub moved_in_progress_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_timestamp", skip_serializing_if = "Option::is_none")]
    pub moved_in_done_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub worked_on_for: u64,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl TaskRecord {
    pub fn from_task(task: &Task) -> Self {
        Self {
            id: Some(task.id.clone()),
            title: task.title.clone(),
            parent_id: task.parent_id.clone(),
            created_at: task.created_at,
            moved_in_progress_at: task.moved_in_progress_at,
            moved_in_done_at: task.moved_in_done_at,
            worked_on_for: task.worked_on_for,
            tags: task.tags.clone(),
        }
    }

    /// `fallback_id` and `fallback_title` come from the file name.
    pub fn into_task(self, fallback_id: &str, fallback_title: String, description: String) -> Task {
        let title = if self.title.trim().is_empty() {
            fallback_title
        } else {
            self.title
        };
        Task {
            id: self.id.unwrap_or_else(|| fallback_id.to_string()),
            title,
            parent_id: self.parent_id,
            created_at: self.created_at,
            moved_in_progress_at: self.moved_in_progress_at,
            moved_in_done_at: self.moved_in_done_at,
            worked_on_for: self.worked_on_for,
            tags: self.tags,
            description,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct ColumnRecord {
    #[serde(default, deserialize_with = "lenient_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(default, deserialize_with = "lenient_timestamp", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl ColumnRecord {
    pub fn from_column(column: &Column, position: u32) -> Self {
        Self {
            id: Some(column.id.clone()),
            name: column.name.clone(),
            position: Some(position),
            limit: column.limit,
            created_at: column.created_at,
        }
    }

    pub fn into_column(self, dir_name: &str) -> Column {
        let id = self.id.unwrap_or_else(|| dir_name.to_string());
        let name = if self.name.trim().is_empty() {
            id.clone()
        } else {
            self.name
        };
        Column {
            id,
            name,
            position: self.position,
            limit: self.limit,
            created_at: self.created_at,
            tasks: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct BoardRecord {
    #[serde(default, deserialize_with = "lenient_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, deserialize_with = "lenient_timestamp", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub parents: Vec<Parent>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl BoardRecord {
    pub fn from_board(board: &Board) -> Self {
        Self {
            id: Some(board.id.clone()),
            name: board.name.clone(),
            description: board.description.clone(),
            created_at: board.created_at,
            parents: board.parents.clone(),
            tags: board.tags.clone(),
        }
    }

    pub fn into_board(self, dir_name: &str, body: String) -> Board {
        let id = self.id.unwrap_or_else(|| dir_name.to_string());
        let name = if self.name.trim().is_empty() {
            id.clone()
        } else {
            self.name
        };
        Board {
            id,
            name,
            description: self.description,
            created_at: self.created_at,
            parents: self.parents,
            tags: self.tags,
            body,
            columns: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct AgendaRecord {
    #[serde(default, deserialize_with = "lenient_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub board_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl AgendaRecord {
    pub fn from_item(item: &AgendaItem) -> Self {
        Self {
            id: Some(item.id.clone()),
            title: item.title.clone(),
            scheduled_date: Some(item.scheduled_date),
            project: item.project.clone(),
            board_id: item.board_id.clone(),
            task_id: item.task_id.clone(),
            created_at: item.created_at,
        }
    }

    /// The directory a file lives in decides its date when the
    /// front-matter does not say.
    pub fn into_item(
        self,
        fallback_id: &str,
        fallback_title: String,
        day: NaiveDate,
        description: String,
    ) -> AgendaItem {
        let title = if self.title.trim().is_empty() {
            fallback_title
        } else {
            self.title
        };
        AgendaItem {
            id: self.id.unwrap_or_else(|| fallback_id.to_string()),
            title,
            scheduled_date: self.scheduled_date.unwrap_or(day),
            project: self.project,
            board_id: self.board_id,
            task_id: self.task_id,
            created_at: self.created_at,
            description,
        }
    }
}

/// Only the creation stamp, used to carry it over when a save omits it.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct CreatedStamp {
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

fn is_zero(value: &u64) -> bool {
    *value == 0
}

fn lenient_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// RFC 3339, `YYYY-MM-DDTHH:MM:SS` (taken as UTC) or a bare date (midnight UTC).
fn lenient_timestamp<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error> {
    let Some(raw) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(dt.with_timezone(&Utc)));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Ok(Some(naive.and_utc()));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc()));
    }
    Err(serde::de::Error::custom(format!("invalid timestamp: {}", raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontmatter;

    #[test]
    fn test_task_record_lenient_read() {
        let content = "---\nid: 42\ntitle: ''\ncreated_at: 2026-03-01\n---\n\nbody";
        let doc = frontmatter::parse::<TaskRecord>(content).unwrap();
        let task = doc.meta.into_task("x", "From stem".into(), doc.body);
        assert_eq!(task.id, "42");
        assert_eq!(task.title, "From stem");
        assert_eq!(
            task.created_at.unwrap().to_rfc3339(),
            "2026-03-01T00:00:00+00:00"
        );
        assert_eq!(task.description, "body");
    }

    #[test]
    fn test_task_record_writes_snake_case() {
        let mut task = Task::new("MKA-1", "Fix login");
        task.parent_id = Some("P-1".into());
        task.worked_on_for = 90;
        let yaml = serde_yaml_ng::to_string(&TaskRecord::from_task(&task)).unwrap();
        assert!(yaml.contains("parent_id: P-1"));
        assert!(yaml.contains("worked_on_for: 90"));
        assert!(!yaml.contains("moved_in_done_at"));
    }

    #[test]
    fn test_invalid_timestamp_is_an_error() {
        let content = "---\nid: a\ncreated_at: yesterday\n---\n";
        assert!(frontmatter::parse::<TaskRecord>(content).is_err());
    }

    #[test]
    fn test_column_record_defaults_to_dir_name() {
        let column = ColumnRecord::default().into_column("backlog");
        assert_eq!(column.id, "backlog");
        assert_eq!(column.name, "backlog");
        assert_eq!(column.position, None);
    }
}
