//! Enrichment and cascade engine
//!
//! Schema-driven orchestration of many asynchronous dispatch calls:
//! joins and appends add fields to records, follow-ups run declared
//! post-actions, and the cascade deleter walks a relationship tree.
//!
//! Fan-out groups run on a [`JoinSet`]; each branch owns its inputs and
//! returns the field it contributes, so no mutable state crosses branches.

mod append;
mod cascade;
mod detached;
mod join;
pub mod select;
pub mod template;
mod then;

pub use append::{resolve_appends, resolve_appends_for_list};
pub use cascade::{delete_relationships, CascadeDeleter, CascadeSummary, RelationshipReport};
pub use detached::{DetachedKind, DetachedOutcome, DetachedTasks};
pub use join::{resolve_joins, resolve_joins_for_list};
pub use select::{fetch_path, filter_list, matches};
pub use template::substitute;
pub use then::{run_follow_ups, Envelope, Subject};

use crate::dispatch::{DispatchError, Dispatcher};
use crate::record::ActionDescriptor;
use crate::schema::SchemaError;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::debug;

/// Errors from enrichment and cascade operations.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("dispatch failed: {0}")]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("fan-out task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Result type for enrichment operations
pub type EngineResult<T> = Result<T, EngineError>;

/// What happens to still-running branches when one branch fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OnFailure {
    /// Abort the remaining branches.
    Abort,
    /// Let the remaining branches run to completion, unobserved.
    Detach,
}

/// Run branches concurrently and return their outputs in input order.
///
/// The first failing branch fails the whole group.
pub(crate) async fn fan_out<T, F>(branches: Vec<F>, on_failure: OnFailure) -> EngineResult<Vec<T>>
where
    T: Send + 'static,
    F: Future<Output = EngineResult<T>> + Send + 'static,
{
    let mut slots: Vec<Option<T>> = Vec::with_capacity(branches.len());
    let mut set = JoinSet::new();
    for (index, branch) in branches.into_iter().enumerate() {
        slots.push(None);
        set.spawn(async move { (index, branch.await) });
    }

    while let Some(joined) = set.join_next().await {
        let outcome = joined.map_err(EngineError::from).and_then(|(index, output)| {
            output.map(|value| (index, value))
        });
        match outcome {
            Ok((index, value)) => slots[index] = Some(value),
            Err(err) => {
                if on_failure == OnFailure::Detach {
                    set.detach_all();
                }
                return Err(err);
            }
        }
    }

    Ok(slots.into_iter().flatten().collect())
}

/// Dispatch every action concurrently; responses come back in input order.
pub(crate) async fn fan_out_dispatches(
    dispatcher: &Arc<dyn Dispatcher>,
    actions: Vec<ActionDescriptor>,
) -> EngineResult<Vec<Value>> {
    let branches: Vec<_> = actions
        .into_iter()
        .map(|action| {
            let dispatcher = dispatcher.clone();
            async move { dispatcher.dispatch(action).await.map_err(EngineError::from) }
        })
        .collect();
    debug!(count = branches.len(), "fan-out dispatch");
    fan_out(branches, OnFailure::Abort).await
}
