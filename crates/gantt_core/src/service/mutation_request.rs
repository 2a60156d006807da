//! Editor mutation payload decoding.
//!
//! # Responsibility
//! - Decode the JSON body the Gantt editor sends for `PUT /tasks/{id}`.
//! - Map it to a typed [`TaskMutation`] or reject it with a validation error.
//!
//! # Invariants
//! - A missing `operation` means a plain field update.
//! - `move` and `copy` require both `target` and `mode`.
//! - Unknown operations and modes are rejected; nothing guesses.

use crate::model::ids::{FuzzyId, TaskId};
use crate::model::task::{TaskType, TaskUpdate};
use crate::service::hierarchy_service::{
    MutationError, Placement, PlacementMode, TaskMutation,
};
use serde::{Deserialize, Serialize};

/// Raw mutation payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MutationRequest {
    /// `update` (default), `move`, `copy` or `delete`.
    pub operation: Option<String>,
    pub target: Option<FuzzyId>,
    /// `child`, `before` or `after`.
    pub mode: Option<String>,
    pub nested: bool,
    pub text: Option<String>,
    pub start_date: Option<String>,
    pub duration: Option<i64>,
    pub progress: Option<i64>,
    pub parent: Option<FuzzyId>,
    pub order: Option<i64>,
    #[serde(rename = "type")]
    pub kind: Option<TaskType>,
}

impl MutationRequest {
    /// Parses a JSON body.
    pub fn from_json(body: &str) -> Result<Self, MutationError> {
        serde_json::from_str(body)
            .map_err(|err| MutationError::Validation(format!("malformed mutation request: {err}")))
    }

    /// Converts the payload into a typed mutation.
    pub fn into_mutation(self) -> Result<TaskMutation, MutationError> {
        let operation = self
            .operation
            .as_deref()
            .map(|value| value.trim().to_ascii_lowercase())
            .unwrap_or_default();

        match operation.as_str() {
            "" | "update" => Ok(TaskMutation::Update(self.task_update())),
            "move" => Ok(TaskMutation::Move(self.placement()?)),
            "copy" => Ok(TaskMutation::Copy {
                placement: self.placement()?,
                nested: self.nested,
            }),
            "delete" => Ok(TaskMutation::Delete),
            other => Err(MutationError::Validation(format!(
                "unknown operation `{other}`; expected update|move|copy|delete"
            ))),
        }
    }

    /// Task fields carried by the payload.
    pub fn task_update(&self) -> TaskUpdate {
        TaskUpdate {
            text: self.text.clone(),
            start_date: self.start_date.clone(),
            duration: self.duration,
            progress: self.progress,
            parent: self.parent.map(TaskId::from),
            order: self.order,
            kind: self.kind,
        }
    }

    fn placement(&self) -> Result<Placement, MutationError> {
        let target = self.target.ok_or_else(|| {
            MutationError::Validation("`target` is required for move and copy".to_string())
        })?;
        let mode_text = self.mode.as_deref().ok_or_else(|| {
            MutationError::Validation("`mode` is required for move and copy".to_string())
        })?;
        let mode = PlacementMode::parse(mode_text).ok_or_else(|| {
            MutationError::Validation(format!(
                "unknown mode `{mode_text}`; expected child|before|after"
            ))
        })?;

        Ok(Placement {
            target: target.get(),
            mode,
            order: self.order,
        })
    }
}

/// What happened to the affected task, as reported back to the editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationAction {
    Updated,
    Moved,
    Inserted,
    Deleted,
}

impl MutationAction {
    pub fn of(mutation: &TaskMutation) -> Self {
        match mutation {
            TaskMutation::Update(_) => Self::Updated,
            TaskMutation::Move(_) => Self::Moved,
            TaskMutation::Copy { .. } => Self::Inserted,
            TaskMutation::Delete => Self::Deleted,
        }
    }
}

/// Reply body for a handled mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MutationResponse {
    /// Affected id; the new root for copies.
    pub id: TaskId,
    pub action: MutationAction,
}
