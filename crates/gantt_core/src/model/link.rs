//! Dependency link model.
//!
//! # Invariants
//! - Both endpoints reference existing tasks.
//! - A link never connects a task to itself.

use crate::model::ids::{LinkId, TaskId};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Scheduling relation between two tasks.
///
/// Serialized as the short code (`fs`, `ss`, ...); the editor's numeric codes
/// (`"0"`..`"3"`) are accepted on input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkType {
    #[default]
    #[serde(rename = "fs", alias = "0")]
    FinishToStart,
    #[serde(rename = "ss", alias = "1")]
    StartToStart,
    #[serde(rename = "ff", alias = "2")]
    FinishToFinish,
    #[serde(rename = "sf", alias = "3")]
    StartToFinish,
}

/// Persisted link row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub id: LinkId,
    pub source: TaskId,
    pub target: TaskId,
    #[serde(rename = "type")]
    pub kind: LinkType,
}

/// Partial link record. Inserts require both endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkUpdate {
    pub source: Option<TaskId>,
    pub target: Option<TaskId>,
    pub kind: Option<LinkType>,
}

impl LinkUpdate {
    pub fn new(source: TaskId, target: TaskId, kind: LinkType) -> Self {
        Self {
            source: Some(source),
            target: Some(target),
            kind: Some(kind),
        }
    }

    /// Validates the record for insertion.
    pub fn validate_new(&self) -> Result<(TaskId, TaskId), LinkValidationError> {
        let source = self.source.ok_or(LinkValidationError::MissingSource)?;
        let target = self.target.ok_or(LinkValidationError::MissingTarget)?;
        if source == target {
            return Err(LinkValidationError::SelfLink(source));
        }
        Ok((source, target))
    }
}

/// Field-level link validation failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkValidationError {
    MissingSource,
    MissingTarget,
    SelfLink(TaskId),
}

impl Display for LinkValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingSource => write!(f, "link source is required"),
            Self::MissingTarget => write!(f, "link target is required"),
            Self::SelfLink(id) => write!(f, "link cannot connect task {id} to itself"),
        }
    }
}

impl Error for LinkValidationError {}
