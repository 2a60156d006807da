//! Task domain model.
//!
//! # Responsibility
//! - Define the persisted task record and its partial-update form.
//! - Validate editor-supplied field values before persistence.
//!
//! # Invariants
//! - `parent` is [`ROOT_TASK_ID`] or the id of an existing task.
//! - `order` is unique and contiguous among siblings of one parent.
//! - `progress` is a percentage in `0..=100`; `duration` is non-negative.

use crate::model::ids::{TaskId, ROOT_TASK_ID};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

static START_DATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}(?: \d{2}:\d{2}(?::\d{2})?)?$").expect("valid start date regex")
});

/// Task kind as rendered by the Gantt editor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// Plain bar.
    #[default]
    Task,
    /// Summary bar spanning its children.
    Project,
    /// Zero-length marker.
    Milestone,
}

/// Persisted task row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub text: String,
    /// `YYYY-MM-DD[ HH:MM[:SS]]` in editor-local time.
    pub start_date: Option<String>,
    pub duration: i64,
    pub progress: i64,
    /// [`ROOT_TASK_ID`] for top-level tasks.
    pub parent: TaskId,
    /// Position among siblings of `parent`.
    pub order: i64,
    #[serde(rename = "type")]
    pub kind: TaskType,
}

impl Task {
    pub fn is_top_level(&self) -> bool {
        self.parent == ROOT_TASK_ID
    }
}

/// Partial task record.
///
/// `None` leaves the stored value unchanged on update, or takes the column
/// default on insert. `parent: Some(0)` explicitly moves a task to the root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskUpdate {
    pub text: Option<String>,
    pub start_date: Option<String>,
    pub duration: Option<i64>,
    pub progress: Option<i64>,
    pub parent: Option<TaskId>,
    pub order: Option<i64>,
    pub kind: Option<TaskType>,
}

impl TaskUpdate {
    /// Validates every supplied field.
    pub fn validate(&self) -> Result<(), TaskValidationError> {
        if let Some(progress) = self.progress {
            if !(0..=100).contains(&progress) {
                return Err(TaskValidationError::ProgressOutOfRange(progress));
            }
        }
        if let Some(duration) = self.duration {
            if duration < 0 {
                return Err(TaskValidationError::NegativeDuration(duration));
            }
        }
        if let Some(start_date) = self.start_date.as_deref() {
            if !START_DATE_RE.is_match(start_date) {
                return Err(TaskValidationError::InvalidStartDate(start_date.to_string()));
            }
        }
        if let Some(parent) = self.parent {
            if parent < ROOT_TASK_ID {
                return Err(TaskValidationError::InvalidParent(parent));
            }
        }
        if let Some(order) = self.order {
            if order < 0 {
                return Err(TaskValidationError::NegativeOrder(order));
            }
        }
        Ok(())
    }

    /// Returns a copy without the structural fields (`parent`, `order`).
    pub fn without_position(&self) -> Self {
        Self {
            parent: None,
            order: None,
            ..self.clone()
        }
    }

    /// Returns whether no field is supplied.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Builds an insert record carrying every field of `task` under a new
    /// parent. Order is left to the store so the copy is appended.
    pub fn duplicate_of(task: &Task, parent: TaskId) -> Self {
        Self {
            text: Some(task.text.clone()),
            start_date: task.start_date.clone(),
            duration: Some(task.duration),
            progress: Some(task.progress),
            parent: Some(parent),
            order: None,
            kind: Some(task.kind),
        }
    }
}

/// Field-level task validation failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskValidationError {
    ProgressOutOfRange(i64),
    NegativeDuration(i64),
    InvalidStartDate(String),
    InvalidParent(TaskId),
    NegativeOrder(i64),
}

impl Display for TaskValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ProgressOutOfRange(value) => {
                write!(f, "progress must be within 0..=100, got {value}")
            }
            Self::NegativeDuration(value) => {
                write!(f, "duration must not be negative, got {value}")
            }
            Self::InvalidStartDate(value) => write!(
                f,
                "start_date must look like `YYYY-MM-DD[ HH:MM[:SS]]`, got `{value}`"
            ),
            Self::InvalidParent(value) => write!(f, "invalid parent id {value}"),
            Self::NegativeOrder(value) => write!(f, "order must not be negative, got {value}"),
        }
    }
}

impl Error for TaskValidationError {}
