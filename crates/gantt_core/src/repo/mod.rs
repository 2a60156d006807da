//! Repository layer: task and link stores over SQLite.
//!
//! # Responsibility
//! - Define data access contracts for the task tree and dependency links.
//! - Isolate SQL details from the hierarchy engine.
//!
//! # Invariants
//! - Write paths validate update records before SQL mutations.
//! - Repository APIs return semantic errors (`TaskNotFound`,
//!   `MissingEndpoint`) in addition to DB transport errors.
//! - Multi-statement writes run inside [`with_write_transaction`], so they
//!   join the caller's transaction when one is open.
//!
//! [`with_write_transaction`]: crate::db::with_write_transaction

use crate::db::migrations::{latest_version, schema_version};
use crate::db::DbError;
use crate::model::ids::{LinkId, TaskId};
use crate::model::link::LinkValidationError;
use crate::model::task::TaskValidationError;
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod link_repo;
pub mod task_repo;

/// Result type used by task and link repository operations.
pub type RepoResult<T> = Result<T, RepoError>;

/// Errors from task and link repository operations.
#[derive(Debug)]
pub enum RepoError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Task update record failed field validation.
    TaskValidation(TaskValidationError),
    /// Link update record failed field validation.
    LinkValidation(LinkValidationError),
    /// Target task does not exist.
    TaskNotFound(TaskId),
    /// Requested parent task does not exist.
    ParentNotFound(TaskId),
    /// Target link does not exist.
    LinkNotFound(LinkId),
    /// A link endpoint references a task that does not exist.
    MissingEndpoint(TaskId),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
    /// Required column is missing from expected table.
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
    /// Persisted data cannot be converted to a valid read model.
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::TaskValidation(err) => write!(f, "{err}"),
            Self::LinkValidation(err) => write!(f, "{err}"),
            Self::TaskNotFound(id) => write!(f, "task not found: {id}"),
            Self::ParentNotFound(id) => write!(f, "parent task not found: {id}"),
            Self::LinkNotFound(id) => write!(f, "link not found: {id}"),
            Self::MissingEndpoint(id) => write!(f, "link endpoint task not found: {id}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "gantt repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "gantt repository requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "gantt repository requires column `{column}` in table `{table}`"
            ),
            Self::InvalidData(message) => write!(f, "invalid persisted gantt data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::TaskValidation(err) => Some(err),
            Self::LinkValidation(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<TaskValidationError> for RepoError {
    fn from(value: TaskValidationError) -> Self {
        Self::TaskValidation(value)
    }
}

impl From<LinkValidationError> for RepoError {
    fn from(value: LinkValidationError) -> Self {
        Self::LinkValidation(value)
    }
}

/// Checks that `conn` is migrated and `table` carries every listed column.
pub(crate) fn ensure_table_ready(
    conn: &Connection,
    table: &'static str,
    columns: &[&'static str],
) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version = schema_version(conn)?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    if !table_exists(conn, table)? {
        return Err(RepoError::MissingRequiredTable(table));
    }

    let existing = table_columns(conn, table)?;
    for &column in columns {
        if !existing.iter().any(|current| current == column) {
            return Err(RepoError::MissingRequiredColumn { table, column });
        }
    }

    Ok(())
}

/// Builds `?, ?, ?` with `count` placeholders for `IN (...)` clauses.
pub(crate) fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_columns(conn: &Connection, table: &str) -> RepoResult<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    let mut columns = Vec::new();
    while let Some(row) = rows.next()? {
        columns.push(row.get(1)?);
    }
    Ok(columns)
}
