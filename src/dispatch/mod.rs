//! Dispatcher layer
//!
//! Every storage effect of the engine goes through one primitive:
//! [`Dispatcher::dispatch`]. Components receive the dispatcher as an
//! `Arc<dyn Dispatcher>` and never resolve handlers themselves.

mod pattern;
mod router;
mod scripted;

pub use pattern::ActionPattern;
pub use router::{ActionHandler, ActionRouter};
pub use scripted::ScriptedDispatcher;

use crate::enrich::EngineError;
use crate::record::ActionDescriptor;
use crate::schema::SchemaError;
use crate::store::StoreError;
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Errors surfaced by a dispatch call.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no handler matches {0}")]
    NoRoute(String),

    #[error("invalid action: {0}")]
    InvalidAction(String),

    #[error("handler failed: {0}")]
    Handler(String),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<EngineError> for DispatchError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Dispatch(inner) => inner,
            EngineError::Schema(inner) => DispatchError::Schema(inner),
            EngineError::Serialization(inner) => DispatchError::Serialization(inner),
            other => DispatchError::Handler(other.to_string()),
        }
    }
}

/// The addressable asynchronous call mechanism the engine is built on.
///
/// A response is an open JSON object; by convention reads and queries
/// answer `{success, entity?|list?, count?}` and a truthy `success` means
/// "found".
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, action: ActionDescriptor) -> Result<Value, DispatchError>;
}
