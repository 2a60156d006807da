//! Domain model for the Gantt task tree and its dependency links.
//!
//! # Responsibility
//! - Define the records persisted by the task and link stores.
//! - Define partial-update records where "not supplied" differs from
//!   "supplied as zero".
//!
//! # Invariants
//! - Task and link ids are positive SQLite rowids; `0` is the root sentinel.
//! - Field validation lives on the update records and runs before any write.

pub mod ids;
pub mod link;
pub mod task;
