//! Storage layer abstractions and implementations.
//!
//! Each persistent entity of the scheduling pipeline (task instances,
//! recurring templates, audit events) gets a trait describing the operations
//! the pipeline needs, a PostgreSQL implementation backed by `sqlx`, and a
//! shared in-memory implementation for tests. The traits keep the jobs layer
//! free of SQL and make failure injection trivial in unit tests.
//!
//! All implementations must be `Send + Sync`; every mutating operation that
//! spans more than one row runs inside a single transaction so a cancelled
//! cycle can never leave a half-applied write behind.

use crate::errors::StorageError;

pub mod event_log;
pub mod memory;
pub mod task;
pub mod template;

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
