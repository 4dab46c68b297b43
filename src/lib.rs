//! Entwine: Declarative Record-Graph Enrichment and Cascade Engine
//!
//! Sits between a client request and an asynchronous, pattern-addressed
//! action dispatcher. Given a record (or a list of records) and a small
//! declarative schema, it expands foreign keys, merges secondary query
//! results, runs follow-up actions and cascades deletions along a
//! relationship tree.
//!
//! # Core Concepts
//!
//! - **Joins**: foreign-key expansion of related records into named fields
//! - **Appends**: raw responses of secondary actions merged into named fields
//! - **Follow-ups** (`then`): post-actions templated against the resolved record
//! - **Cascade delete**: best-effort deletion along declared relationships
//! - **Deep select**: equality predicates over dot-separated paths
//!
//! # Example
//!
//! ```
//! use entwine::{CrudConfig, CrudService, MemoryStore};
//! use std::sync::Arc;
//!
//! let router = CrudService::new(Arc::new(MemoryStore::new()), CrudConfig::default()).into_router();
//! // Every CRUD command is now routed under the `entity` role
//! assert!(router.route_count() > 0);
//! ```

pub mod config;
pub mod crud;
pub mod dispatch;
pub mod enrich;
pub mod record;
pub mod schema;
pub mod store;

pub use config::{ConfigError, CrudConfig};
pub use crud::{AcceptAll, Command, CrudService, FieldError, Validation, Validator};
pub use dispatch::{ActionHandler, ActionPattern, ActionRouter, DispatchError, Dispatcher, ScriptedDispatcher};
pub use enrich::{
    delete_relationships, filter_list, matches, resolve_appends, resolve_appends_for_list, resolve_joins,
    resolve_joins_for_list, run_follow_ups, substitute, CascadeDeleter, CascadeSummary, DetachedKind,
    DetachedOutcome, DetachedTasks, EngineError, EngineResult, Envelope, RelationshipReport, Subject,
};
pub use record::{ActionDescriptor, Location, Namespace, Record};
pub use schema::{
    AppendSpec, DeepSelect, EnrichmentSchema, FollowUpSpec, JoinSpec, RelationshipSpec, SchemaError,
};
pub use store::{EntityStore, Fixture, MemoryStore, StoreError, StoreResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
