//! Identity resolution between tentative and durable task ids.
//!
//! # Responsibility
//! - Remember which durable id replaced a tentative or original id.
//! - Resolve ids through that table, passing unknown ids through unchanged.
//!
//! # Invariants
//! - One resolver serves one mutation or one client batch, never longer.
//! - Mappings are write-once; re-recording an id is rejected.

use crate::model::ids::TaskId;
use std::collections::HashMap;

/// Old/tentative id to new/durable id table.
///
/// Nested copy records `original -> duplicate` while duplicating a subtree
/// and consults the table afterwards to re-target links. Client batches
/// record `client temp id -> inserted id` so later entries can refer to
/// tasks created earlier in the same batch.
#[derive(Debug, Clone, Default)]
pub struct IdentityResolver {
    mapping: HashMap<TaskId, TaskId>,
}

impl IdentityResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `from` now lives as `to`.
    ///
    /// Returns `false` and keeps the first mapping when `from` was already
    /// recorded.
    pub fn record(&mut self, from: TaskId, to: TaskId) -> bool {
        if self.mapping.contains_key(&from) {
            return false;
        }
        self.mapping.insert(from, to);
        true
    }

    /// Returns the mapped id, or `id` itself when it was never recorded.
    pub fn resolve(&self, id: TaskId) -> TaskId {
        self.mapping.get(&id).copied().unwrap_or(id)
    }

    /// Returns the mapped id only when `id` was recorded.
    pub fn get(&self, id: TaskId) -> Option<TaskId> {
        self.mapping.get(&id).copied()
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.mapping.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.mapping.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }
}
