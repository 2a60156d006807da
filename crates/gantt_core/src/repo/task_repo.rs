//! Task store contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist task rows and their parent/order placement.
//! - Provide the tree reads (children, subtree) the hierarchy engine needs.
//!
//! # Invariants
//! - Sibling listing is deterministic: `sort_order ASC, id ASC`.
//! - A supplied `order` is a sibling index; every list a write touches is
//!   renumbered to `0..n`.
//! - `parent` written by this store is the root sentinel or an existing task.
//! - Cycle prevention is the engine's job; the subtree walk still refuses to
//!   revisit a task or descend past `MAX_TREE_DEPTH`.

use crate::db::with_write_transaction;
use crate::model::ids::{TaskId, ROOT_TASK_ID};
use crate::model::task::{Task, TaskType, TaskUpdate};
use crate::repo::{ensure_table_ready, RepoError, RepoResult};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::collections::HashSet;

const TASK_SELECT_SQL: &str = "SELECT
    id,
    text,
    start_date,
    duration,
    progress,
    parent,
    sort_order,
    type
FROM tasks";

const TASK_COLUMNS: &[&str] = &[
    "id",
    "text",
    "start_date",
    "duration",
    "progress",
    "parent",
    "sort_order",
    "type",
];

/// Deepest subtree the store will walk before reporting corrupt data.
pub const MAX_TREE_DEPTH: usize = 1024;

/// Repository interface for the task tree.
pub trait TaskRepository {
    /// Inserts one task; absent fields take column defaults. `order` is a
    /// sibling index clamped to the sibling range; absent, the task is
    /// appended after the last sibling.
    fn add_task(&self, update: &TaskUpdate) -> RepoResult<TaskId>;
    /// Loads one task by id.
    fn get_task(&self, id: TaskId) -> RepoResult<Option<Task>>;
    /// Lists every task ordered by `parent, sort_order, id`.
    fn list_tasks(&self) -> RepoResult<Vec<Task>>;
    /// Applies supplied fields only. A changed `parent` appends the task to
    /// the new sibling list, or places it at `order` read as a sibling
    /// index; every affected list is renumbered.
    fn update_task(&self, id: TaskId, update: &TaskUpdate) -> RepoResult<()>;
    /// Deletes a task, its descendants and their links. Returns removed ids
    /// in pre-order.
    fn delete_task(&self, id: TaskId) -> RepoResult<Vec<TaskId>>;
    /// Lists direct children of `parent` in sibling order.
    fn list_children(&self, parent: TaskId) -> RepoResult<Vec<Task>>;
    /// Lists direct child ids of `parent` in sibling order.
    fn list_child_ids(&self, parent: TaskId) -> RepoResult<Vec<TaskId>>;
    /// Returns the subtree rooted at `root` in pre-order, root first.
    fn subtree(&self, root: TaskId) -> RepoResult<Vec<Task>>;
    /// Places `ordered_ids` under `parent` with orders `0..n`.
    fn place_children(&self, parent: TaskId, ordered_ids: &[TaskId]) -> RepoResult<()>;
}

/// SQLite-backed task store.
pub struct SqliteTaskRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteTaskRepository<'conn> {
    /// Creates repository from a connection already checked by the caller.
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    /// Creates repository from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_table_ready(conn, "tasks", TASK_COLUMNS)?;
        Ok(Self { conn })
    }
}

impl TaskRepository for SqliteTaskRepository<'_> {
    fn add_task(&self, update: &TaskUpdate) -> RepoResult<TaskId> {
        update.validate()?;
        let parent = update.parent.unwrap_or(ROOT_TASK_ID);

        with_write_transaction(self.conn, |conn| {
            ensure_parent_exists(conn, parent)?;
            conn.execute(
                "INSERT INTO tasks (
                    text,
                    start_date,
                    duration,
                    progress,
                    parent,
                    sort_order,
                    type
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
                params![
                    update.text.as_deref().unwrap_or(""),
                    update.start_date.as_deref(),
                    update.duration.unwrap_or(0),
                    update.progress.unwrap_or(0),
                    parent,
                    next_sort_order(conn, parent)?,
                    task_type_to_db(update.kind.unwrap_or_default()),
                ],
            )?;
            let id = conn.last_insert_rowid();
            if update.order.is_some() {
                position_task(conn, id, parent, update.order)?;
            }
            Ok(id)
        })
    }

    fn get_task(&self, id: TaskId) -> RepoResult<Option<Task>> {
        load_task(self.conn, id)
    }

    fn list_tasks(&self) -> RepoResult<Vec<Task>> {
        let mut stmt = self.conn.prepare(&format!(
            "{TASK_SELECT_SQL}
             ORDER BY parent ASC, sort_order ASC, id ASC;"
        ))?;
        let mut rows = stmt.query([])?;
        let mut tasks = Vec::new();
        while let Some(row) = rows.next()? {
            tasks.push(parse_task_row(row)?);
        }
        Ok(tasks)
    }

    fn update_task(&self, id: TaskId, update: &TaskUpdate) -> RepoResult<()> {
        update.validate()?;

        let mut assignments: Vec<&str> = Vec::new();
        let mut bind_values: Vec<Value> = Vec::new();
        if let Some(text) = &update.text {
            assignments.push("text = ?");
            bind_values.push(Value::Text(text.clone()));
        }
        if let Some(start_date) = &update.start_date {
            assignments.push("start_date = ?");
            bind_values.push(Value::Text(start_date.clone()));
        }
        if let Some(duration) = update.duration {
            assignments.push("duration = ?");
            bind_values.push(Value::Integer(duration));
        }
        if let Some(progress) = update.progress {
            assignments.push("progress = ?");
            bind_values.push(Value::Integer(progress));
        }
        if let Some(kind) = update.kind {
            assignments.push("type = ?");
            bind_values.push(Value::Text(task_type_to_db(kind).to_string()));
        }

        with_write_transaction(self.conn, |conn| {
            let current = load_task(conn, id)?.ok_or(RepoError::TaskNotFound(id))?;
            if let Some(parent) = update.parent {
                ensure_parent_exists(conn, parent)?;
            }

            if !assignments.is_empty() {
                let sql = format!("UPDATE tasks SET {} WHERE id = ?;", assignments.join(", "));
                bind_values.push(Value::Integer(id));
                conn.execute(&sql, params_from_iter(bind_values))?;
            }

            let parent = update.parent.unwrap_or(current.parent);
            let reordered = update.order.is_some_and(|order| order != current.order);
            if parent != current.parent || reordered {
                position_task(conn, id, parent, update.order)?;
            }
            if parent != current.parent {
                let remaining = list_child_ids(conn, current.parent)?;
                place_children(conn, current.parent, &remaining)?;
            }
            Ok(())
        })
    }

    fn delete_task(&self, id: TaskId) -> RepoResult<Vec<TaskId>> {
        with_write_transaction(self.conn, |conn| {
            let removed: Vec<TaskId> = walk_subtree(conn, id)?
                .into_iter()
                .map(|task| task.id)
                .collect();

            for task_id in &removed {
                conn.execute(
                    "DELETE FROM links
                     WHERE source = ?1
                        OR target = ?1;",
                    [task_id],
                )?;
            }
            for task_id in &removed {
                conn.execute("DELETE FROM tasks WHERE id = ?1;", [task_id])?;
            }
            Ok(removed)
        })
    }

    fn list_children(&self, parent: TaskId) -> RepoResult<Vec<Task>> {
        list_children(self.conn, parent)
    }

    fn list_child_ids(&self, parent: TaskId) -> RepoResult<Vec<TaskId>> {
        list_child_ids(self.conn, parent)
    }

    fn subtree(&self, root: TaskId) -> RepoResult<Vec<Task>> {
        walk_subtree(self.conn, root)
    }

    fn place_children(&self, parent: TaskId, ordered_ids: &[TaskId]) -> RepoResult<()> {
        with_write_transaction(self.conn, |conn| {
            ensure_parent_exists(conn, parent)?;
            place_children(conn, parent, ordered_ids)
        })
    }
}

fn list_child_ids(conn: &Connection, parent: TaskId) -> RepoResult<Vec<TaskId>> {
    let mut stmt = conn.prepare(
        "SELECT id
         FROM tasks
         WHERE parent = ?1
         ORDER BY sort_order ASC, id ASC;",
    )?;
    let mut rows = stmt.query([parent])?;
    let mut ids = Vec::new();
    while let Some(row) = rows.next()? {
        ids.push(row.get(0)?);
    }
    Ok(ids)
}

fn place_children(conn: &Connection, parent: TaskId, ordered_ids: &[TaskId]) -> RepoResult<()> {
    for (index, id) in ordered_ids.iter().enumerate() {
        let changed = conn.execute(
            "UPDATE tasks
             SET parent = ?2,
                 sort_order = ?3
             WHERE id = ?1;",
            params![id, parent, index as i64],
        )?;
        if changed == 0 {
            return Err(RepoError::TaskNotFound(*id));
        }
    }
    Ok(())
}

/// Puts `id` into the sibling list of `parent` at index `order` (clamped),
/// or last when `order` is absent, and renumbers that list.
fn position_task(
    conn: &Connection,
    id: TaskId,
    parent: TaskId,
    order: Option<i64>,
) -> RepoResult<()> {
    let mut siblings = list_child_ids(conn, parent)?;
    siblings.retain(|sibling| *sibling != id);
    let index = order.map_or(siblings.len(), |order| {
        order.clamp(0, siblings.len() as i64) as usize
    });
    siblings.insert(index, id);
    place_children(conn, parent, &siblings)
}

fn load_task(conn: &Connection, id: TaskId) -> RepoResult<Option<Task>> {
    let mut stmt = conn.prepare(&format!("{TASK_SELECT_SQL} WHERE id = ?1;"))?;
    let mut rows = stmt.query([id])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_task_row(row)?));
    }
    Ok(None)
}

fn list_children(conn: &Connection, parent: TaskId) -> RepoResult<Vec<Task>> {
    let mut stmt = conn.prepare(&format!(
        "{TASK_SELECT_SQL}
         WHERE parent = ?1
         ORDER BY sort_order ASC, id ASC;"
    ))?;
    let mut rows = stmt.query([parent])?;
    let mut children = Vec::new();
    while let Some(row) = rows.next()? {
        children.push(parse_task_row(row)?);
    }
    Ok(children)
}

fn walk_subtree(conn: &Connection, root: TaskId) -> RepoResult<Vec<Task>> {
    let root_task = load_task(conn, root)?.ok_or(RepoError::TaskNotFound(root))?;

    let mut visited = HashSet::from([root]);
    let mut ordered = Vec::new();
    let mut stack = vec![(root_task, 0_usize)];
    while let Some((task, depth)) = stack.pop() {
        if depth > MAX_TREE_DEPTH {
            return Err(RepoError::InvalidData(format!(
                "task tree under {root} is deeper than {MAX_TREE_DEPTH} levels"
            )));
        }

        let children = list_children(conn, task.id)?;
        ordered.push(task);
        // Reverse push keeps siblings in order when popped.
        for child in children.into_iter().rev() {
            if !visited.insert(child.id) {
                return Err(RepoError::InvalidData(format!(
                    "task {} is reachable twice under {root}",
                    child.id
                )));
            }
            stack.push((child, depth + 1));
        }
    }
    Ok(ordered)
}

fn ensure_parent_exists(conn: &Connection, parent: TaskId) -> RepoResult<()> {
    if parent == ROOT_TASK_ID {
        return Ok(());
    }
    let exists: Option<i64> = conn
        .query_row("SELECT 1 FROM tasks WHERE id = ?1;", [parent], |row| {
            row.get(0)
        })
        .optional()?;
    match exists {
        Some(_) => Ok(()),
        None => Err(RepoError::ParentNotFound(parent)),
    }
}

fn next_sort_order(conn: &Connection, parent: TaskId) -> RepoResult<i64> {
    let next = conn.query_row(
        "SELECT COALESCE(MAX(sort_order), -1) + 1
         FROM tasks
         WHERE parent = ?1;",
        [parent],
        |row| row.get(0),
    )?;
    Ok(next)
}

fn parse_task_row(row: &Row<'_>) -> RepoResult<Task> {
    let type_text: String = row.get("type")?;
    let kind = parse_task_type(&type_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid task type `{type_text}` in tasks.type"))
    })?;

    Ok(Task {
        id: row.get("id")?,
        text: row.get("text")?,
        start_date: row.get("start_date")?,
        duration: row.get("duration")?,
        progress: row.get("progress")?,
        parent: row.get("parent")?,
        order: row.get("sort_order")?,
        kind,
    })
}

fn task_type_to_db(kind: TaskType) -> &'static str {
    match kind {
        TaskType::Task => "task",
        TaskType::Project => "project",
        TaskType::Milestone => "milestone",
    }
}

fn parse_task_type(value: &str) -> Option<TaskType> {
    match value {
        "task" => Some(TaskType::Task),
        "project" => Some(TaskType::Project),
        "milestone" => Some(TaskType::Milestone),
        _ => None,
    }
}
