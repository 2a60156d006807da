//! Hierarchy mutation engine for the task tree.
//!
//! # Responsibility
//! - Apply update, move, copy (flat or nested) and delete to one task.
//! - Keep sibling order contiguous and link endpoints consistent.
//! - Run each mutation as one all-or-nothing write transaction.
//!
//! # Invariants
//! - Validation and cycle checks finish before the first write.
//! - No task ever becomes its own ancestor.
//! - Every sibling list touched by a mutation is renumbered to `0..n` in
//!   `sort_order, id` order; untouched lists keep their values.
//! - Nested copy re-creates every link touching the copied subtree, with
//!   internal endpoints remapped and external endpoints kept.
//! - The engine keeps no state between calls.

use crate::db::with_write_transaction;
use crate::model::ids::{LinkId, TaskId, ROOT_TASK_ID};
use crate::model::link::{Link, LinkUpdate};
use crate::model::task::{Task, TaskUpdate, TaskValidationError};
use crate::repo::link_repo::{LinkRepository, SqliteLinkRepository};
use crate::repo::task_repo::{SqliteTaskRepository, TaskRepository};
use crate::repo::{RepoError, RepoResult};
use crate::service::identity::IdentityResolver;
use crate::service::mutation_request::{MutationAction, MutationRequest, MutationResponse};
use log::{debug, error, info, warn};
use rusqlite::Connection;
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

/// Where a moved or copied task lands relative to `Placement::target`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementMode {
    /// Under the target, appended or at `Placement::order`.
    Child,
    /// Sibling immediately preceding the target.
    Before,
    /// Sibling immediately following the target.
    After,
}

impl PlacementMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "child" => Some(Self::Child),
            "before" => Some(Self::Before),
            "after" => Some(Self::After),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Child => "child",
            Self::Before => "before",
            Self::After => "after",
        }
    }
}

/// Destination of a move or copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    /// Reference task. With `Child`, `ROOT_TASK_ID` means the top level.
    pub target: TaskId,
    pub mode: PlacementMode,
    /// Sibling index for `Child`; clamped to the sibling range. Ignored by
    /// `Before`/`After`.
    pub order: Option<i64>,
}

impl Placement {
    pub fn child_of(target: TaskId) -> Self {
        Self {
            target,
            mode: PlacementMode::Child,
            order: None,
        }
    }

    pub fn before(target: TaskId) -> Self {
        Self {
            target,
            mode: PlacementMode::Before,
            order: None,
        }
    }

    pub fn after(target: TaskId) -> Self {
        Self {
            target,
            mode: PlacementMode::After,
            order: None,
        }
    }

    pub fn at_order(mut self, order: i64) -> Self {
        self.order = Some(order);
        self
    }
}

/// One structural or field change applied to a single task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskMutation {
    /// Partial field update. A changed `parent`/`order` repositions the task
    /// under the same rules as `Move`.
    Update(TaskUpdate),
    /// Relocate the task with its subtree.
    Move(Placement),
    /// Duplicate the task, or its whole subtree when `nested`.
    Copy { placement: Placement, nested: bool },
    /// Remove the task, its descendants and every incident link.
    Delete,
}

impl TaskMutation {
    pub fn op_name(&self) -> &'static str {
        match self {
            Self::Update(_) => "update",
            Self::Move(_) => "move",
            Self::Copy { .. } => "copy",
            Self::Delete => "delete",
        }
    }
}

/// Errors surfaced to request adapters.
#[derive(Debug)]
pub enum MutationError {
    /// Referenced task does not exist.
    NotFound(TaskId),
    /// Referenced link does not exist.
    LinkNotFound(LinkId),
    /// Malformed or disallowed arguments.
    Validation(String),
    /// Destination lies inside the subtree being moved or copied.
    Cycle { task_id: TaskId, target: TaskId },
    /// Persistence failure; the transaction was rolled back.
    Store(RepoError),
}

impl MutationError {
    /// Stable machine-readable code for logs and adapters.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::LinkNotFound(_) => "link_not_found",
            Self::Validation(_) => "validation",
            Self::Cycle { .. } => "cycle",
            Self::Store(_) => "store",
        }
    }

    /// Returns whether the request was rejected before touching storage.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, Self::Store(_))
    }
}

impl Display for MutationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(id) => write!(f, "task not found: {id}"),
            Self::LinkNotFound(id) => write!(f, "link not found: {id}"),
            Self::Validation(message) => write!(f, "invalid mutation: {message}"),
            Self::Cycle { task_id, target } => write!(
                f,
                "placing task {task_id} relative to {target} would make it its own ancestor"
            ),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for MutationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for MutationError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::TaskNotFound(id) | RepoError::ParentNotFound(id) => Self::NotFound(id),
            RepoError::LinkNotFound(id) => Self::LinkNotFound(id),
            RepoError::MissingEndpoint(id) => {
                Self::Validation(format!("link endpoint task {id} does not exist"))
            }
            RepoError::TaskValidation(err) => Self::Validation(err.to_string()),
            RepoError::LinkValidation(err) => Self::Validation(err.to_string()),
            other => Self::Store(other),
        }
    }
}

impl From<rusqlite::Error> for MutationError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Store(value.into())
    }
}

impl From<TaskValidationError> for MutationError {
    fn from(value: TaskValidationError) -> Self {
        Self::Validation(value.to_string())
    }
}

/// Task tree service facade consumed by request adapters.
pub struct HierarchyService<'conn> {
    conn: &'conn Connection,
}

impl<'conn> HierarchyService<'conn> {
    /// Creates service from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        SqliteTaskRepository::try_new(conn)?;
        SqliteLinkRepository::try_new(conn)?;
        Ok(Self { conn })
    }

    /// Applies one mutation to `task_id` atomically.
    ///
    /// Returns the affected id: the task itself, or the root of the new copy
    /// for `Copy`.
    pub fn mutate(
        &self,
        task_id: TaskId,
        mutation: TaskMutation,
    ) -> Result<TaskId, MutationError> {
        let started_at = Instant::now();
        let op = mutation.op_name();

        let result = with_write_transaction(self.conn, |conn| {
            let tasks = SqliteTaskRepository::new(conn);
            let links = SqliteLinkRepository::new(conn);
            Engine {
                tasks: &tasks,
                links: &links,
            }
            .apply(task_id, mutation)
        });

        let duration_ms = started_at.elapsed().as_millis();
        match &result {
            Ok(affected_id) => info!(
                "event=task_mutation module=hierarchy status=ok op={op} task_id={task_id} affected_id={affected_id} duration_ms={duration_ms}"
            ),
            Err(err) if err.is_rejection() => warn!(
                "event=task_mutation module=hierarchy status=rejected op={op} task_id={task_id} duration_ms={duration_ms} error_code={} error={err}",
                err.code()
            ),
            Err(err) => error!(
                "event=task_mutation module=hierarchy status=error op={op} task_id={task_id} duration_ms={duration_ms} error_code={} error={err}",
                err.code()
            ),
        }
        result
    }

    /// Decodes an editor payload and applies it to `task_id`.
    pub fn handle_request(
        &self,
        task_id: TaskId,
        body: &str,
    ) -> Result<MutationResponse, MutationError> {
        let mutation = MutationRequest::from_json(body)?.into_mutation()?;
        let action = MutationAction::of(&mutation);
        let id = self.mutate(task_id, mutation)?;
        Ok(MutationResponse { id, action })
    }

    /// Loads one task, failing with `NotFound` when absent.
    pub fn get_task(&self, id: TaskId) -> Result<Task, MutationError> {
        self.tasks()
            .get_task(id)?
            .ok_or(MutationError::NotFound(id))
    }

    pub fn list_tasks(&self) -> Result<Vec<Task>, MutationError> {
        Ok(self.tasks().list_tasks()?)
    }

    /// Inserts one task; an absent parent means the top level.
    pub fn add_task(&self, update: &TaskUpdate) -> Result<TaskId, MutationError> {
        let id = self.tasks().add_task(update)?;
        debug!("event=task_add module=hierarchy status=ok task_id={id}");
        Ok(id)
    }

    /// Inserts one task created by the client under `tentative_id`.
    ///
    /// A parent that was itself inserted earlier in the same batch is
    /// resolved to its durable id first. Tentative ids and durable ids
    /// share one number space within a batch: a tentative id may not name
    /// the root or an existing task, and a reference that matches both a
    /// recorded tentative id and a different durable task is rejected as
    /// ambiguous.
    pub fn add_task_resolved(
        &self,
        resolver: &mut IdentityResolver,
        tentative_id: TaskId,
        update: &TaskUpdate,
    ) -> Result<TaskId, MutationError> {
        if resolver.contains(tentative_id) {
            return Err(MutationError::Validation(format!(
                "tentative id {tentative_id} is already used in this batch"
            )));
        }
        if tentative_id == ROOT_TASK_ID || self.tasks().get_task(tentative_id)?.is_some() {
            return Err(MutationError::Validation(format!(
                "tentative id {tentative_id} collides with a stored task id"
            )));
        }

        let parent = match update.parent {
            Some(parent) => Some(self.resolve_batch_reference(resolver, parent)?),
            None => None,
        };
        let resolved = TaskUpdate {
            parent,
            ..update.clone()
        };
        let id = self.add_task(&resolved)?;
        resolver.record(tentative_id, id);
        Ok(id)
    }

    pub fn list_links(&self) -> Result<Vec<Link>, MutationError> {
        Ok(self.links().list_links()?)
    }

    pub fn add_link(&self, update: &LinkUpdate) -> Result<LinkId, MutationError> {
        let id = self.links().add_link(update)?;
        debug!("event=link_add module=hierarchy status=ok link_id={id}");
        Ok(id)
    }

    /// Inserts one link whose endpoints may be tentative ids of tasks
    /// inserted earlier in the same batch. Ambiguous endpoints are rejected
    /// as in [`Self::add_task_resolved`].
    pub fn add_link_resolved(
        &self,
        resolver: &IdentityResolver,
        update: &LinkUpdate,
    ) -> Result<LinkId, MutationError> {
        let source = match update.source {
            Some(id) => Some(self.resolve_batch_reference(resolver, id)?),
            None => None,
        };
        let target = match update.target {
            Some(id) => Some(self.resolve_batch_reference(resolver, id)?),
            None => None,
        };
        self.add_link(&LinkUpdate {
            source,
            target,
            kind: update.kind,
        })
    }

    pub fn update_link(&self, id: LinkId, update: &LinkUpdate) -> Result<(), MutationError> {
        Ok(self.links().update_link(id, update)?)
    }

    pub fn delete_link(&self, id: LinkId) -> Result<(), MutationError> {
        Ok(self.links().delete_link(id)?)
    }

    fn resolve_batch_reference(
        &self,
        resolver: &IdentityResolver,
        id: TaskId,
    ) -> Result<TaskId, MutationError> {
        let Some(durable) = resolver.get(id) else {
            return Ok(id);
        };
        if durable != id && self.tasks().get_task(id)?.is_some() {
            return Err(MutationError::Validation(format!(
                "id {id} names both a task of this batch and stored task {id}"
            )));
        }
        Ok(durable)
    }

    fn tasks(&self) -> SqliteTaskRepository<'conn> {
        SqliteTaskRepository::new(self.conn)
    }

    fn links(&self) -> SqliteLinkRepository<'conn> {
        SqliteLinkRepository::new(self.conn)
    }
}

/// Mutation logic over one transaction's stores.
struct Engine<'a, T, L> {
    tasks: &'a T,
    links: &'a L,
}

impl<T: TaskRepository, L: LinkRepository> Engine<'_, T, L> {
    fn apply(&self, task_id: TaskId, mutation: TaskMutation) -> Result<TaskId, MutationError> {
        match mutation {
            TaskMutation::Update(update) => self.update(task_id, &update).map(|()| task_id),
            TaskMutation::Move(placement) => self.move_task(task_id, &placement).map(|()| task_id),
            TaskMutation::Copy { placement, nested } => self.copy(task_id, &placement, nested),
            TaskMutation::Delete => self.delete(task_id).map(|()| task_id),
        }
    }

    fn update(&self, task_id: TaskId, update: &TaskUpdate) -> Result<(), MutationError> {
        let task = self.require_task(task_id)?;
        update.validate()?;

        let reposition = match (update.parent, update.order) {
            (Some(parent), order) if parent != task.parent => Some(Placement {
                target: parent,
                mode: PlacementMode::Child,
                order,
            }),
            (_, Some(order)) if order != task.order => {
                Some(Placement::child_of(task.parent).at_order(order))
            }
            _ => None,
        };
        if let Some(placement) = reposition {
            self.move_task(task_id, &placement)?;
        }

        self.tasks
            .update_task(task_id, &update.without_position())?;
        Ok(())
    }

    fn move_task(&self, task_id: TaskId, placement: &Placement) -> Result<(), MutationError> {
        let task = self.require_task(task_id)?;
        let parent = self.destination_parent(placement)?;
        if self.is_in_subtree(task_id, placement.target)? {
            return Err(MutationError::Cycle {
                task_id,
                target: placement.target,
            });
        }

        let mut siblings = self.tasks.list_child_ids(parent)?;
        siblings.retain(|id| *id != task_id);
        let index = insertion_index(placement, &siblings)?;
        siblings.insert(index, task_id);
        self.tasks.place_children(parent, &siblings)?;

        if task.parent != parent {
            self.renumber(task.parent)?;
        }
        Ok(())
    }

    fn copy(
        &self,
        source_id: TaskId,
        placement: &Placement,
        nested: bool,
    ) -> Result<TaskId, MutationError> {
        let source = self.require_task(source_id)?;
        let parent = self.destination_parent(placement)?;
        if nested && self.is_in_subtree(source_id, parent)? {
            return Err(MutationError::Cycle {
                task_id: source_id,
                target: placement.target,
            });
        }

        let originals = if nested {
            self.tasks.subtree(source_id)?
        } else {
            vec![source]
        };
        let mut siblings = self.tasks.list_child_ids(parent)?;
        let index = insertion_index(placement, &siblings)?;

        // Pre-order guarantees a parent is duplicated before its children.
        let mut resolver = IdentityResolver::new();
        for original in &originals {
            let new_parent = if original.id == source_id {
                parent
            } else {
                resolver.get(original.parent).ok_or_else(|| {
                    MutationError::Store(RepoError::InvalidData(format!(
                        "task {} listed before its parent {}",
                        original.id, original.parent
                    )))
                })?
            };
            let duplicate = self
                .tasks
                .add_task(&TaskUpdate::duplicate_of(original, new_parent))?;
            resolver.record(original.id, duplicate);
        }

        let copy_root = resolver.resolve(source_id);
        siblings.insert(index, copy_root);
        self.tasks.place_children(parent, &siblings)?;

        if nested {
            let subtree_ids: Vec<TaskId> = originals.iter().map(|task| task.id).collect();
            let links = self.links.list_links_touching(&subtree_ids)?;
            for link in &links {
                self.links.add_link(&LinkUpdate::new(
                    resolver.resolve(link.source),
                    resolver.resolve(link.target),
                    link.kind,
                ))?;
            }
            debug!(
                "event=task_copy module=hierarchy status=ok source_id={source_id} copy_id={copy_root} tasks={} links={}",
                originals.len(),
                links.len()
            );
        }

        Ok(copy_root)
    }

    fn delete(&self, task_id: TaskId) -> Result<(), MutationError> {
        if task_id == ROOT_TASK_ID {
            return Err(MutationError::Validation(
                "the root task cannot be deleted".to_string(),
            ));
        }

        let task = self.require_task(task_id)?;
        let removed = self.tasks.delete_task(task_id)?;
        debug!(
            "event=task_delete module=hierarchy status=ok task_id={task_id} removed_tasks={}",
            removed.len()
        );
        self.renumber(task.parent)
    }

    fn require_task(&self, id: TaskId) -> Result<Task, MutationError> {
        self.tasks
            .get_task(id)?
            .ok_or(MutationError::NotFound(id))
    }

    /// Resolves the parent the placed task will have, checking the target.
    fn destination_parent(&self, placement: &Placement) -> Result<TaskId, MutationError> {
        match placement.mode {
            PlacementMode::Child => {
                if placement.target != ROOT_TASK_ID {
                    self.require_task(placement.target)?;
                }
                Ok(placement.target)
            }
            PlacementMode::Before | PlacementMode::After => {
                if placement.target == ROOT_TASK_ID {
                    return Err(MutationError::Validation(format!(
                        "cannot place a task {} the root",
                        placement.mode.as_str()
                    )));
                }
                Ok(self.require_task(placement.target)?.parent)
            }
        }
    }

    /// Returns whether `candidate` is `root` or one of its descendants.
    fn is_in_subtree(&self, root: TaskId, candidate: TaskId) -> Result<bool, MutationError> {
        let mut visited = HashSet::new();
        let mut cursor = candidate;
        while cursor != ROOT_TASK_ID {
            if cursor == root {
                return Ok(true);
            }
            if !visited.insert(cursor) {
                return Err(MutationError::Store(RepoError::InvalidData(format!(
                    "parent chain of task {candidate} loops at {cursor}"
                ))));
            }
            cursor = self.require_task(cursor)?.parent;
        }
        Ok(false)
    }

    fn renumber(&self, parent: TaskId) -> Result<(), MutationError> {
        let ids = self.tasks.list_child_ids(parent)?;
        self.tasks.place_children(parent, &ids)?;
        Ok(())
    }
}

fn insertion_index(placement: &Placement, siblings: &[TaskId]) -> Result<usize, MutationError> {
    let target_index = || {
        siblings
            .iter()
            .position(|id| *id == placement.target)
            .ok_or_else(|| {
                MutationError::Store(RepoError::InvalidData(format!(
                    "task {} is missing from its parent's children",
                    placement.target
                )))
            })
    };

    match placement.mode {
        PlacementMode::Child => Ok(placement.order.map_or(siblings.len(), |order| {
            order.clamp(0, siblings.len() as i64) as usize
        })),
        PlacementMode::Before => target_index(),
        PlacementMode::After => target_index().map(|index| index + 1),
    }
}
