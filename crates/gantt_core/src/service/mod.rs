//! Use-case services over the task and link stores.
//!
//! # Responsibility
//! - Run every structural mutation of the task tree inside one transaction.
//! - Decode editor mutation payloads into typed mutations.
//! - Keep transport adapters decoupled from storage details.

pub mod hierarchy_service;
pub mod identity;
pub mod mutation_request;
