/// Explicit save/load of boards, tasks and agenda items.
///
/// All paths derive from the current `StorageRoot` at call time, so a root
/// change takes effect on the next operation. Multi-step operations (board
/// save, task move) are not transactional: a failure part way through leaves
/// whatever was already written.
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;

use super::records::{AgendaRecord, BoardRecord, ColumnRecord, CreatedStamp, TaskRecord};
use super::resolver::EntityFileResolver;
use super::root::StorageRoot;
use super::StorageError;
use crate::config::ColumnRoles;
use crate::frontmatter::{self, Document};
use crate::fs::FileSystem;
use crate::layout::{self, AGENDA_DIR, BOARD_FILE, COLUMN_FILE, MARKDOWN_EXTENSION, TASKS_DIR};
use crate::slug;
use crate::types::{AgendaItem, Board, BoardInfo, Column, Task};

/// Which timing fields a column keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnRole {
    Progress,
    Done,
    Other,
}

pub struct PersistenceCoordinator {
    fs: Arc<dyn FileSystem>,
    root: StorageRoot,
    resolver: EntityFileResolver,
    roles: ColumnRoles,
}

impl PersistenceCoordinator {
    pub fn new(fs: Arc<dyn FileSystem>, root: StorageRoot, roles: ColumnRoles) -> Self {
        Self {
            resolver: EntityFileResolver::new(fs.clone()),
            fs,
            root,
            roles,
        }
    }

    pub fn root(&self) -> &StorageRoot {
        &self.root
    }

    pub fn resolver(&self) -> &EntityFileResolver {
        &self.resolver
    }

    fn role_of(&self, column_id: &str) -> ColumnRole {
        let dir = layout::entity_dir_name(column_id);
        if dir == layout::entity_dir_name(&self.roles.progress) {
            ColumnRole::Progress
        } else if dir == layout::entity_dir_name(&self.roles.done) {
            ColumnRole::Done
        } else {
            ColumnRole::Other
        }
    }

    // ── Tasks ───────────────────────────────────────────────────────────

    /// Write `task` into `<board>/<column>/tasks/`, renaming any existing
    /// file for its id to the title-derived name. Returns the written path.
    pub async fn save_task(
        &self,
        board_id: &str,
        column_id: &str,
        task: &Task,
    ) -> Result<PathBuf, StorageError> {
        let root = self.root.current();
        let board_dir = layout::board_dir(&root, board_id);
        if !self.fs.exists(&board_dir).await {
            return Err(StorageError::BoardNotFound(board_id.to_string()));
        }
        let dir = layout::tasks_dir(&root, board_id, column_id);
        self.save_task_in(&dir, task).await
    }

    async fn save_task_in(&self, dir: &Path, task: &Task) -> Result<PathBuf, StorageError> {
        let (path, previous) = self.claim_file(dir, &task.id, &task.title).await?;

        let mut record = TaskRecord::from_task(task);
        record.created_at = Some(self.created_at(task.created_at, previous.as_deref()).await);
        let content = frontmatter::render(&record, &task.description).map_err(|source| {
            StorageError::Serialize {
                entity: format!("task {}", task.id),
                source,
            }
        })?;
        self.fs.write_file(&path, &content).await?;
        log::debug!("[plainboard.storage.task] Saved {} to {:?}", task.id, path);
        Ok(path)
    }

    pub async fn load_task(
        &self,
        board_id: &str,
        column_id: &str,
        task_id: &str,
    ) -> Result<Option<Task>, StorageError> {
        let dir = layout::tasks_dir(&self.root.current(), board_id, column_id);
        let Some(path) = self.resolver.find_by_id(&dir, task_id).await else {
            return Ok(None);
        };
        let Some(content) = self.fs.read_file(&path).await else {
            return Ok(None);
        };
        parse_task(&path, &content).map(Some)
    }

    /// Every readable task in the column. Unparseable files are skipped.
    pub async fn load_tasks(&self, board_id: &str, column_id: &str) -> Vec<Task> {
        let dir = layout::tasks_dir(&self.root.current(), board_id, column_id);
        self.load_tasks_in(&dir).await
    }

    async fn load_tasks_in(&self, dir: &Path) -> Vec<Task> {
        let mut tasks = Vec::new();
        for path in self.fs.list_files(dir, MARKDOWN_EXTENSION).await {
            if layout::is_ignored(&path) {
                continue;
            }
            let Some(content) = self.fs.read_file(&path).await else {
                continue;
            };
            match parse_task(&path, &content) {
                Ok(task) => tasks.push(task),
                Err(e) => log::warn!("[plainboard.storage.task] Skipping task file: {}", e),
            }
        }
        tasks
    }

    /// Returns false when no file exists for the id.
    pub async fn delete_task(
        &self,
        board_id: &str,
        column_id: &str,
        task_id: &str,
    ) -> Result<bool, StorageError> {
        let dir = layout::tasks_dir(&self.root.current(), board_id, column_id);
        let Some(path) = self.resolver.find_by_id(&dir, task_id).await else {
            return Ok(false);
        };
        let deleted = self.fs.delete_file(&path).await?;
        if deleted {
            log::debug!("[plainboard.storage.task] Deleted {} ({:?})", task_id, path);
        }
        Ok(deleted)
    }

    /// Write the task into `to`, then delete it from `from`.
    ///
    /// Entering the progress or done column stamps the matching timestamp
    /// if it is not set yet. If the source cannot be deleted the new copy is
    /// removed again (best effort) and `StorageError::Move` is returned.
    pub async fn move_task_between_columns(
        &self,
        board_id: &str,
        task: &Task,
        from: &str,
        to: &str,
    ) -> Result<PathBuf, StorageError> {
        if layout::entity_dir_name(from) == layout::entity_dir_name(to) {
            return self.save_task(board_id, to, task).await;
        }

        let root = self.root.current();
        let mut task = task.clone();
        match self.role_of(to) {
            ColumnRole::Progress if task.moved_in_progress_at.is_none() => {
                task.moved_in_progress_at = Some(Utc::now());
            }
            ColumnRole::Done if task.moved_in_done_at.is_none() => {
                task.moved_in_done_at = Some(Utc::now());
            }
            _ => {}
        }

        let from_column = layout::column_dir(&root, board_id, from);
        if !self.fs.exists(&from_column).await {
            if !self.fs.exists(&layout::board_dir(&root, board_id)).await {
                return Err(StorageError::BoardNotFound(board_id.to_string()));
            }
            return Err(StorageError::ColumnNotFound {
                board: board_id.to_string(),
                column: from.to_string(),
            });
        }

        let source = self
            .resolver
            .find_by_id(&from_column.join(TASKS_DIR), &task.id)
            .await;
        let written = self.save_task(board_id, to, &task).await?;

        let Some(source) = source else {
            return Ok(written);
        };
        if let Err(e) = self.fs.delete_file(&source).await {
            log::warn!(
                "[plainboard.storage.move] Could not remove {:?}, rolling back {:?}",
                source,
                written
            );
            if let Err(undo) = self.fs.delete_file(&written).await {
                log::error!(
                    "[plainboard.storage.move] Rollback of {:?} failed: {}",
                    written,
                    undo
                );
            }
            return Err(StorageError::Move {
                task_id: task.id.clone(),
                source: Box::new(e.into()),
            });
        }
        log::info!(
            "[plainboard.storage.move] Moved {} from {} to {}",
            task.id,
            from,
            to
        );
        Ok(written)
    }

    // ── Boards ──────────────────────────────────────────────────────────

    /// Load a board with its columns and tasks. `None` when the board
    /// directory does not exist.
    pub async fn load_board(&self, board_id: &str) -> Result<Option<Board>, StorageError> {
        let root = self.root.current();
        let dir = layout::board_dir(&root, board_id);
        if !self.fs.exists(&dir).await {
            return Ok(None);
        }

        let board_file = dir.join(BOARD_FILE);
        let mut board = match self.fs.read_file(&board_file).await {
            Some(content) => match frontmatter::parse::<BoardRecord>(&content) {
                Ok(Document { meta, body }) => meta.into_board(board_id, body),
                Err(e) => {
                    log::warn!(
                        "[plainboard.storage.board] Invalid {:?}, using defaults: {}",
                        board_file,
                        e
                    );
                    BoardRecord::default().into_board(board_id, String::new())
                }
            },
            None => BoardRecord::default().into_board(board_id, String::new()),
        };

        let mut columns = Vec::new();
        for column_dir in self.fs.list_directories(&dir).await {
            if layout::is_ignored(&column_dir) {
                continue;
            }
            let name = column_dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let column_file = column_dir.join(COLUMN_FILE);
            let record = match self.fs.read_file(&column_file).await {
                Some(content) => read_meta::<ColumnRecord>(&column_file, &content),
                None => ColumnRecord::default(),
            };
            let mut column = record.into_column(&name);
            column.tasks = self.load_tasks_in(&column_dir.join(TASKS_DIR)).await;
            let role = self.role_of(&name);
            for task in &mut column.tasks {
                normalize_timing(task, role);
            }
            columns.push(column);
        }

        assign_positions(&mut columns);
        columns.sort_by(|a, b| (a.position, &a.name).cmp(&(b.position, &b.name)));
        board.columns = columns;
        Ok(Some(board))
    }

    /// Write the whole board: metadata, columns and tasks. Column
    /// directories absent from the model are removed and each tasks
    /// directory is cleaned against the model's ids.
    pub async fn save_board(&self, board: &Board) -> Result<PathBuf, StorageError> {
        let root = self.root.current();
        let dir = layout::board_dir(&root, &board.id);
        self.fs.ensure_directory(&dir).await?;

        let board_file = dir.join(BOARD_FILE);
        let mut record = BoardRecord::from_board(board);
        record.created_at = Some(self.created_at(board.created_at, Some(board_file.as_path())).await);
        let content = frontmatter::render(&record, &board.body).map_err(|source| {
            StorageError::Serialize {
                entity: format!("board {}", board.id),
                source,
            }
        })?;
        self.fs.write_file(&board_file, &content).await?;

        let wanted: HashSet<String> = board
            .columns
            .iter()
            .map(|c| layout::entity_dir_name(&c.id))
            .collect();
        for existing in self.fs.list_directories(&dir).await {
            let name = existing
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            if layout::is_ignored(&existing) || wanted.contains(&name) {
                continue;
            }
            log::info!(
                "[plainboard.storage.board] Removing column {:?} from board {}",
                existing,
                board.id
            );
            self.fs.remove_directory(&existing).await?;
        }

        let positions = resolve_positions(&board.columns);
        for (column, position) in board.columns.iter().zip(positions) {
            self.save_column(&root, &board.id, column, position).await?;
        }

        log::info!(
            "[plainboard.storage.board] Saved board {} ({} columns)",
            board.id,
            board.columns.len()
        );
        Ok(dir)
    }

    async fn save_column(
        &self,
        root: &Path,
        board_id: &str,
        column: &Column,
        position: u32,
    ) -> Result<(), StorageError> {
        let dir = layout::column_dir(root, board_id, &column.id);
        let tasks_dir = dir.join(TASKS_DIR);
        self.fs.ensure_directory(&tasks_dir).await?;

        let column_file = dir.join(COLUMN_FILE);
        let mut record = ColumnRecord::from_column(column, position);
        record.created_at = Some(self.created_at(column.created_at, Some(column_file.as_path())).await);
        let content = frontmatter::render(&record, "").map_err(|source| {
            StorageError::Serialize {
                entity: format!("column {}", column.id),
                source,
            }
        })?;
        self.fs.write_file(&column_file, &content).await?;

        for task in &column.tasks {
            self.save_task_in(&tasks_dir, task).await?;
        }
        let ids: Vec<String> = column.tasks.iter().map(|t| t.id.clone()).collect();
        let report = self.resolver.cleanup(&tasks_dir, &ids).await;
        if !report.removed.is_empty() {
            log::info!(
                "[plainboard.storage.cleanup] Removed {} stale task files in {:?}",
                report.removed.len(),
                tasks_dir
            );
        }
        Ok(())
    }

    /// Returns false when the board did not exist.
    pub async fn delete_board(&self, board_id: &str) -> Result<bool, StorageError> {
        let dir = layout::board_dir(&self.root.current(), board_id);
        let removed = self.fs.remove_directory(&dir).await?;
        if removed {
            log::info!("[plainboard.storage.board] Deleted board {}", board_id);
        }
        Ok(removed)
    }

    /// Boards under the root, identified by their `kanban.md`.
    pub async fn list_boards(&self) -> Vec<BoardInfo> {
        let root = self.root.current();
        let mut boards = Vec::new();
        for dir in self.fs.list_directories(&root).await {
            let name = dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            if name == AGENDA_DIR || layout::is_ignored(&dir) {
                continue;
            }
            let board_file = dir.join(BOARD_FILE);
            let Some(content) = self.fs.read_file(&board_file).await else {
                continue;
            };
            let record = read_meta::<BoardRecord>(&board_file, &content);
            let board = record.into_board(&name, String::new());
            let column_count = self
                .fs
                .list_directories(&dir)
                .await
                .iter()
                .filter(|d| !layout::is_ignored(d))
                .count();
            boards.push(BoardInfo {
                id: board.id,
                name: board.name,
                path: dir,
                column_count,
            });
        }
        boards
    }

    // ── Agenda ──────────────────────────────────────────────────────────

    pub async fn save_agenda_item(&self, item: &AgendaItem) -> Result<PathBuf, StorageError> {
        let dir = layout::agenda_day_dir(&self.root.current(), item.scheduled_date);
        let (path, previous) = self.claim_file(&dir, &item.id, &item.title).await?;

        let mut record = AgendaRecord::from_item(item);
        record.created_at = Some(self.created_at(item.created_at, previous.as_deref()).await);
        let content = frontmatter::render(&record, &item.description).map_err(|source| {
            StorageError::Serialize {
                entity: format!("agenda item {}", item.id),
                source,
            }
        })?;
        self.fs.write_file(&path, &content).await?;
        log::debug!("[plainboard.storage.agenda] Saved {} to {:?}", item.id, path);
        Ok(path)
    }

    pub async fn load_agenda_items(&self, date: NaiveDate) -> Vec<AgendaItem> {
        let dir = layout::agenda_day_dir(&self.root.current(), date);
        let mut items = Vec::new();
        for path in self.fs.list_files(&dir, MARKDOWN_EXTENSION).await {
            if layout::is_ignored(&path) {
                continue;
            }
            let Some(content) = self.fs.read_file(&path).await else {
                continue;
            };
            match frontmatter::parse::<AgendaRecord>(&content) {
                Ok(Document { meta, body }) => {
                    let stem = stem_of(&path);
                    let id = meta.id.clone().unwrap_or_else(|| stem.clone());
                    let title = slug::title_from_stem(&stem, &id);
                    items.push(meta.into_item(&id, title, date, body));
                }
                Err(e) => log::warn!(
                    "[plainboard.storage.agenda] Skipping {:?}: {}",
                    path,
                    e
                ),
            }
        }
        items
    }

    pub async fn delete_agenda_item(
        &self,
        date: NaiveDate,
        item_id: &str,
    ) -> Result<bool, StorageError> {
        let dir = layout::agenda_day_dir(&self.root.current(), date);
        let Some(path) = self.resolver.find_by_id(&dir, item_id).await else {
            return Ok(false);
        };
        Ok(self.fs.delete_file(&path).await?)
    }

    /// Save `item` under its (new) scheduled date and remove the copy filed
    /// under `from`. Same compensation as a task move.
    pub async fn reschedule_agenda_item(
        &self,
        item: &AgendaItem,
        from: NaiveDate,
    ) -> Result<PathBuf, StorageError> {
        if from == item.scheduled_date {
            return self.save_agenda_item(item).await;
        }
        let old_dir = layout::agenda_day_dir(&self.root.current(), from);
        let source = self.resolver.find_by_id(&old_dir, &item.id).await;
        let written = self.save_agenda_item(item).await?;

        if let Some(source) = source {
            if let Err(e) = self.fs.delete_file(&source).await {
                if let Err(undo) = self.fs.delete_file(&written).await {
                    log::error!(
                        "[plainboard.storage.agenda] Rollback of {:?} failed: {}",
                        written,
                        undo
                    );
                }
                return Err(StorageError::Move {
                    task_id: item.id.clone(),
                    source: Box::new(e.into()),
                });
            }
        }
        log::info!(
            "[plainboard.storage.agenda] Rescheduled {} from {} to {}",
            item.id,
            from,
            item.scheduled_date
        );
        Ok(written)
    }

    // ── Helpers ─────────────────────────────────────────────────────────

    /// Pick the file `id` should be written to in `dir` and move any existing
    /// file for the id there. Returns the target and, when the entity already
    /// had a file, that target again (its content is the previous version).
    async fn claim_file(
        &self,
        dir: &Path,
        id: &str,
        title: &str,
    ) -> Result<(PathBuf, Option<PathBuf>), StorageError> {
        self.fs.ensure_directory(dir).await?;
        let desired = dir.join(slug::entity_file_name(id, title));
        let existing = self.resolver.find_by_id(dir, id).await;

        if existing.as_deref() == Some(desired.as_path()) {
            return Ok((desired, existing));
        }
        let target = dir.join(self.resolver.resolve_unique_name(&desired, id).await);
        match existing {
            Some(old) if old != target => {
                log::debug!(
                    "[plainboard.storage.rename] {:?} -> {:?}",
                    old,
                    target
                );
                self.fs.rename_file(&old, &target).await?;
                Ok((target.clone(), Some(target)))
            }
            Some(_) => Ok((target.clone(), Some(target))),
            None => Ok((target, None)),
        }
    }

    /// `explicit`, else the stamp already on disk at `previous`, else now.
    async fn created_at(
        &self,
        explicit: Option<DateTime<Utc>>,
        previous: Option<&Path>,
    ) -> DateTime<Utc> {
        if let Some(at) = explicit {
            return at;
        }
        if let Some(path) = previous {
            if let Some(content) = self.fs.read_file(path).await {
                if let Ok(doc) = frontmatter::parse::<CreatedStamp>(&content) {
                    if let Some(at) = doc.meta.created_at {
                        return at;
                    }
                }
            }
        }
        Utc::now()
    }
}

fn stem_of(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn parse_task(path: &Path, content: &str) -> Result<Task, StorageError> {
    let Document { meta, body } =
        frontmatter::parse::<TaskRecord>(content).map_err(|source| StorageError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    let stem = stem_of(path);
    let id = meta.id.clone().unwrap_or_else(|| stem.clone());
    let title = slug::title_from_stem(&stem, &id);
    Ok(meta.into_task(&id, title, body))
}

/// Metadata from a file whose parse failure should not stop the load.
fn read_meta<T: DeserializeOwned + Default>(path: &Path, content: &str) -> T {
    match frontmatter::parse::<T>(content) {
        Ok(doc) => doc.meta,
        Err(e) => {
            log::warn!(
                "[plainboard.storage.load] Invalid {:?}, using defaults: {}",
                path,
                e
            );
            T::default()
        }
    }
}

/// The progress column keeps entered-progress and time worked, the done
/// column keeps entered-done and time worked, other columns keep neither.
fn normalize_timing(task: &mut Task, role: ColumnRole) {
    match role {
        ColumnRole::Progress => task.moved_in_done_at = None,
        ColumnRole::Done => task.moved_in_progress_at = None,
        ColumnRole::Other => {
            task.moved_in_progress_at = None;
            task.moved_in_done_at = None;
            task.worked_on_for = 0;
        }
    }
}

/// Accept explicit positions that are still free, then hand out the
/// smallest unused positions to the rest in listing order.
fn assign_positions(columns: &mut [Column]) {
    let positions = resolve_positions(columns);
    for (column, position) in columns.iter_mut().zip(positions) {
        column.position = Some(position);
    }
}

/// Unique position per column, in order: an explicit position is kept when
/// no earlier column holds it, the rest take the smallest unused value.
fn resolve_positions(columns: &[Column]) -> Vec<u32> {
    let mut used = HashSet::new();
    let mut resolved: Vec<Option<u32>> = Vec::with_capacity(columns.len());
    for column in columns {
        match column.position {
            Some(p) if used.insert(p) => resolved.push(Some(p)),
            Some(p) => {
                log::debug!(
                    "[plainboard.storage.board] Column {} repeats position {}",
                    column.id,
                    p
                );
                resolved.push(None);
            }
            None => resolved.push(None),
        }
    }

    let mut next = 0u32;
    resolved
        .into_iter()
        .map(|position| {
            position.unwrap_or_else(|| {
                while used.contains(&next) {
                    next += 1;
                }
                used.insert(next);
                next
            })
        })
        .collect()
}
