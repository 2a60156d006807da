//! Link store contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist dependency links between tasks.
//! - Answer "which links touch these tasks" for subtree copy.
//!
//! # Invariants
//! - Both endpoints exist when a link is written.
//! - Listing is deterministic: `id ASC`.

use crate::db::with_write_transaction;
use crate::model::ids::{LinkId, TaskId};
use crate::model::link::{Link, LinkType, LinkUpdate};
use crate::repo::{ensure_table_ready, placeholders, RepoError, RepoResult};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::collections::BTreeMap;

const LINK_SELECT_SQL: &str = "SELECT
    id,
    source,
    target,
    type
FROM links";

/// Ids bound per `list_links_touching` query; each id is bound twice and
/// SQLite caps host parameters per statement.
const TOUCHING_CHUNK_SIZE: usize = 400;

/// Repository interface for dependency links.
pub trait LinkRepository {
    /// Inserts one link; both endpoints are required and must exist.
    fn add_link(&self, update: &LinkUpdate) -> RepoResult<LinkId>;
    /// Loads one link by id.
    fn get_link(&self, id: LinkId) -> RepoResult<Option<Link>>;
    /// Lists every link.
    fn list_links(&self) -> RepoResult<Vec<Link>>;
    /// Applies supplied fields only.
    fn update_link(&self, id: LinkId, update: &LinkUpdate) -> RepoResult<()>;
    /// Deletes one link.
    fn delete_link(&self, id: LinkId) -> RepoResult<()>;
    /// Lists links with at least one endpoint in `task_ids`, `id ASC`, each
    /// link once. Any number of ids is accepted.
    fn list_links_touching(&self, task_ids: &[TaskId]) -> RepoResult<Vec<Link>>;
}

/// SQLite-backed link store.
pub struct SqliteLinkRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteLinkRepository<'conn> {
    /// Creates repository from a connection already checked by the caller.
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    /// Creates repository from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_table_ready(conn, "links", &["id", "source", "target", "type"])?;
        Ok(Self { conn })
    }
}

impl LinkRepository for SqliteLinkRepository<'_> {
    fn add_link(&self, update: &LinkUpdate) -> RepoResult<LinkId> {
        let (source, target) = update.validate_new()?;

        with_write_transaction(self.conn, |conn| {
            ensure_endpoint_exists(conn, source)?;
            ensure_endpoint_exists(conn, target)?;
            conn.execute(
                "INSERT INTO links (source, target, type) VALUES (?1, ?2, ?3);",
                params![
                    source,
                    target,
                    link_type_to_db(update.kind.unwrap_or_default())
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    fn get_link(&self, id: LinkId) -> RepoResult<Option<Link>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{LINK_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_link_row(row)?));
        }
        Ok(None)
    }

    fn list_links(&self) -> RepoResult<Vec<Link>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{LINK_SELECT_SQL} ORDER BY id ASC;"))?;
        let mut rows = stmt.query([])?;
        let mut links = Vec::new();
        while let Some(row) = rows.next()? {
            links.push(parse_link_row(row)?);
        }
        Ok(links)
    }

    fn update_link(&self, id: LinkId, update: &LinkUpdate) -> RepoResult<()> {
        with_write_transaction(self.conn, |conn| {
            let current = self
                .get_link(id)?
                .ok_or(RepoError::LinkNotFound(id))?;
            let kind = update.kind.unwrap_or(current.kind);
            let merged = LinkUpdate::new(
                update.source.unwrap_or(current.source),
                update.target.unwrap_or(current.target),
                kind,
            );
            let (source, target) = merged.validate_new()?;
            ensure_endpoint_exists(conn, source)?;
            ensure_endpoint_exists(conn, target)?;

            conn.execute(
                "UPDATE links
                 SET source = ?2,
                     target = ?3,
                     type = ?4
                 WHERE id = ?1;",
                params![id, source, target, link_type_to_db(kind)],
            )?;
            Ok(())
        })
    }

    fn delete_link(&self, id: LinkId) -> RepoResult<()> {
        let changed = self.conn.execute("DELETE FROM links WHERE id = ?1;", [id])?;
        if changed == 0 {
            return Err(RepoError::LinkNotFound(id));
        }
        Ok(())
    }

    fn list_links_touching(&self, task_ids: &[TaskId]) -> RepoResult<Vec<Link>> {
        // A link spanning two chunks is returned by both queries.
        let mut links = BTreeMap::new();
        for chunk in task_ids.chunks(TOUCHING_CHUNK_SIZE) {
            let marks = placeholders(chunk.len());
            let sql = format!(
                "{LINK_SELECT_SQL}
                 WHERE source IN ({marks})
                    OR target IN ({marks});"
            );
            let bind_values = chunk
                .iter()
                .chain(chunk.iter())
                .map(|id| Value::Integer(*id));

            let mut stmt = self.conn.prepare(&sql)?;
            let mut rows = stmt.query(params_from_iter(bind_values))?;
            while let Some(row) = rows.next()? {
                let link = parse_link_row(row)?;
                links.insert(link.id, link);
            }
        }
        Ok(links.into_values().collect())
    }
}

fn ensure_endpoint_exists(conn: &Connection, task_id: TaskId) -> RepoResult<()> {
    let exists: Option<i64> = conn
        .query_row("SELECT 1 FROM tasks WHERE id = ?1;", [task_id], |row| {
            row.get(0)
        })
        .optional()?;
    match exists {
        Some(_) => Ok(()),
        None => Err(RepoError::MissingEndpoint(task_id)),
    }
}

fn parse_link_row(row: &Row<'_>) -> RepoResult<Link> {
    let type_text: String = row.get("type")?;
    let kind = parse_link_type(&type_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid link type `{type_text}` in links.type"))
    })?;

    Ok(Link {
        id: row.get("id")?,
        source: row.get("source")?,
        target: row.get("target")?,
        kind,
    })
}

fn link_type_to_db(kind: LinkType) -> &'static str {
    match kind {
        LinkType::FinishToStart => "fs",
        LinkType::StartToStart => "ss",
        LinkType::FinishToFinish => "ff",
        LinkType::StartToFinish => "sf",
    }
}

fn parse_link_type(value: &str) -> Option<LinkType> {
    match value {
        "fs" => Some(LinkType::FinishToStart),
        "ss" => Some(LinkType::StartToStart),
        "ff" => Some(LinkType::FinishToFinish),
        "sf" => Some(LinkType::StartToFinish),
        _ => None,
    }
}
