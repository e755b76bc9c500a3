use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A parent project a board belongs to, embedded in the board metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Parent {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// When the task entered the progress column.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub moved_in_progress_at: Option<DateTime<Utc>>,
    /// When the task entered the done column.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub moved_in_done_at: Option<DateTime<Utc>>,
    /// Seconds of tracked work.
    #[serde(default)]
    pub worked_on_for: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default)]
    pub description: String,
}

impl Task {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            parent_id: None,
            created_at: None,
            moved_in_progress_at: None,
            moved_in_done_at: None,
            worked_on_for: 0,
            tags: Vec::new(),
            description: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub id: String,
    pub name: String,
    /// Display order within the board. Always set on loaded boards.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<u32>,
    /// Work-in-progress limit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

impl Column {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            position: None,
            limit: None,
            created_at: None,
            tasks: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Board {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parents: Vec<Parent>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Free text kept below the board front-matter.
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub columns: Vec<Column>,
}

impl Board {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            created_at: None,
            parents: Vec::new(),
            tags: Vec::new(),
            body: String::new(),
            columns: Vec::new(),
        }
    }

    pub fn column(&self, column_id: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|c| c.id.eq_ignore_ascii_case(column_id))
    }
}

/// A calendar entry, optionally linked to a project, board and task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgendaItem {
    pub id: String,
    pub title: String,
    pub scheduled_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub board_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub description: String,
}

impl AgendaItem {
    pub fn new(id: impl Into<String>, title: impl Into<String>, scheduled_date: NaiveDate) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            scheduled_date,
            project: None,
            board_id: None,
            task_id: None,
            created_at: None,
            description: String::new(),
        }
    }
}

/// Summary info for a board in list responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardInfo {
    pub id: String,
    pub name: String,
    pub path: PathBuf,
    pub column_count: usize,
}
