//! Core data layer for the Gantt editor backend.
//! This crate owns the task tree, dependency links and every structural
//! mutation applied to them.

pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use logging::{default_log_level, init_logging, init_logging_from_env, logging_status};
pub use model::ids::{FuzzyId, LinkId, TaskId, ROOT_TASK_ID};
pub use model::link::{Link, LinkType, LinkUpdate, LinkValidationError};
pub use model::task::{Task, TaskType, TaskUpdate, TaskValidationError};
pub use repo::link_repo::{LinkRepository, SqliteLinkRepository};
pub use repo::task_repo::{SqliteTaskRepository, TaskRepository};
pub use repo::{RepoError, RepoResult};
pub use service::hierarchy_service::{
    HierarchyService, MutationError, Placement, PlacementMode, TaskMutation,
};
pub use service::identity::IdentityResolver;
pub use service::mutation_request::{MutationAction, MutationRequest, MutationResponse};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
