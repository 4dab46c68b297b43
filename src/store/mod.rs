//! Entity storage
//!
//! The CRUD service persists records through the `EntityStore` trait.
//! Records are addressed by namespace and id; selectors are plain field
//! equality.

mod memory;

pub use memory::{Fixture, MemoryStore};

use crate::record::{Namespace, Record};
use serde_json::Value;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Invalid id: {0}")]
    InvalidId(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for storage operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Trait for entity storage backends
///
/// Implementations must be thread-safe (Send + Sync); handlers share one
/// store across concurrent dispatches.
pub trait EntityStore: Send + Sync {
    /// Insert or replace a record. A record without an id gets a fresh one.
    /// Returns the stored record, stamped with its namespace.
    fn save(&self, namespace: &Namespace, entity: Record) -> StoreResult<Record>;

    /// Load a record by id
    fn load(&self, namespace: &Namespace, id: &Value) -> StoreResult<Option<Record>>;

    /// Remove a record by id. Returns whether it existed.
    fn remove(&self, namespace: &Namespace, id: &Value) -> StoreResult<bool>;

    /// Records whose fields equal every entry of `select`, in insertion order.
    ///
    /// Keys ending in `$` are store directives and never match fields.
    fn list(&self, namespace: &Namespace, select: &Record) -> StoreResult<Vec<Record>>;
}

/// Check that a value can serve as a record id.
pub(crate) fn check_id(id: &Value) -> StoreResult<()> {
    match id {
        Value::String(s) if !s.is_empty() => Ok(()),
        Value::Number(_) => Ok(()),
        other => Err(StoreError::InvalidId(other.to_string())),
    }
}

/// True if the record satisfies every equality entry of the selector.
pub(crate) fn selected(record: &Record, select: &Record) -> bool {
    select
        .iter()
        .filter(|(key, _)| !key.ends_with('$'))
        .all(|(key, value)| record.get(key) == Some(value))
}
