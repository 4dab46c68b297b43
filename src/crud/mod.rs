//! CRUD service: entity commands registered on an action router
//!
//! Every command is registered under the configured role. Read and query
//! compose the enrichment engine (deep select, joins, appends, follow-ups);
//! delete and `deleterelationships` drive the cascade deleter. Handlers
//! issue their own follow-on actions through the router they were
//! dispatched from.

mod commands;
mod query;
mod validate;

pub use validate::{AcceptAll, FieldError, Validation, Validator};

use crate::config::CrudConfig;
use crate::dispatch::{ActionHandler, ActionPattern, ActionRouter, DispatchError, Dispatcher};
use crate::enrich::DetachedTasks;
use crate::record::{flag, is_truthy, ActionDescriptor, Namespace, Record, NAMESPACE_FIELD};
use crate::store::EntityStore;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// The commands a CRUD service answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Create,
    Read,
    Update,
    Delete,
    Query,
    Count,
    First,
    Truncate,
    Check,
    Validate,
    DeleteRelationships,
}

impl Command {
    pub const ALL: [Command; 11] = [
        Command::Create,
        Command::Read,
        Command::Update,
        Command::Delete,
        Command::Query,
        Command::Count,
        Command::First,
        Command::Truncate,
        Command::Check,
        Command::Validate,
        Command::DeleteRelationships,
    ];

    /// Wire name used as the `cmd` key.
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Create => "create",
            Command::Read => "read",
            Command::Update => "update",
            Command::Delete => "delete",
            Command::Query => "query",
            Command::Count => "count",
            Command::First => "first",
            Command::Truncate => "truncate",
            Command::Check => "check",
            Command::Validate => "validate",
            Command::DeleteRelationships => "deleterelationships",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entity CRUD over an [`EntityStore`].
pub struct CrudService {
    store: Arc<dyn EntityStore>,
    config: CrudConfig,
    validator: Arc<dyn Validator>,
    detached: DetachedTasks,
}

impl CrudService {
    pub fn new(store: Arc<dyn EntityStore>, config: CrudConfig) -> Self {
        Self {
            store,
            config,
            validator: Arc::new(AcceptAll),
            detached: DetachedTasks::new(),
        }
    }

    pub fn with_validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validator = validator;
        self
    }

    /// Share a detached-task registry with the cascades this service starts.
    pub fn with_detached(mut self, detached: DetachedTasks) -> Self {
        self.detached = detached;
        self
    }

    pub fn config(&self) -> &CrudConfig {
        &self.config
    }

    pub fn detached(&self) -> &DetachedTasks {
        &self.detached
    }

    /// Register every command under the configured role.
    ///
    /// `create` and `update` get a second route matching `validate: true`
    /// that runs the validator first.
    pub fn register(self: &Arc<Self>, router: &ActionRouter) {
        for command in Command::ALL {
            let pattern = ActionPattern::capability(self.config.role.clone(), command.as_str());
            if matches!(command, Command::Create | Command::Update) {
                router.register(
                    pattern.clone().with("validate", true),
                    Arc::new(CommandHandler {
                        service: self.clone(),
                        command,
                        validated: true,
                    }),
                );
            }
            router.register(
                pattern,
                Arc::new(CommandHandler {
                    service: self.clone(),
                    command,
                    validated: false,
                }),
            );
        }
    }

    /// Build a router with this service registered.
    pub fn into_router(self) -> Arc<ActionRouter> {
        let router = ActionRouter::new();
        Arc::new(self).register(&router);
        router
    }

    /// Namespace of an action: its own non-empty parts over the configured defaults.
    fn namespace(&self, action: &ActionDescriptor) -> Namespace {
        let part = |key: &str| {
            action
                .get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        self.config
            .default_namespace()
            .overlay(&Namespace::new(part("zone"), part("base"), part("name")))
    }

    /// A descriptor for one of this service's own commands in `namespace`.
    fn own_action(&self, command: Command, namespace: &Namespace) -> ActionDescriptor {
        ActionDescriptor::new(self.config.role.clone(), command.as_str()).with_namespace(namespace)
    }
}

struct CommandHandler {
    service: Arc<CrudService>,
    command: Command,
    validated: bool,
}

#[async_trait]
impl ActionHandler for CommandHandler {
    async fn handle(
        &self,
        action: ActionDescriptor,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Result<Value, DispatchError> {
        let service = &self.service;
        if self.validated {
            return service.validate_and_execute(self.command, action, dispatcher).await;
        }
        match self.command {
            Command::Create => service.create(action),
            Command::Read => service.read(action, dispatcher).await,
            Command::Update => service.update(action),
            Command::Delete => service.delete(action, dispatcher).await,
            Command::Query => service.query(action, dispatcher).await,
            Command::Count => service.count(action),
            Command::First => service.first(action, dispatcher).await,
            Command::Truncate => service.truncate(action, dispatcher).await,
            Command::Check => service.check(action, dispatcher).await,
            Command::Validate => service.validate(action).await,
            Command::DeleteRelationships => service.delete_relationships(action, dispatcher).await,
        }
    }
}

/// An object-valued argument of an action, if present.
fn object_arg(action: &ActionDescriptor, key: &str) -> Option<Record> {
    action.get(key).and_then(Value::as_object).cloned()
}

/// Drop the store's namespace marker from a record.
fn strip_namespace(record: &mut Record) {
    record.remove(NAMESPACE_FIELD);
}

fn wants_no_namespace(action: &ActionDescriptor) -> bool {
    flag(action.get("nonamespace"))
}

/// Fill every falsy field of the record from `defaults`.
fn apply_defaults(record: &mut Record, defaults: &Record) {
    for (key, value) in defaults {
        if !is_truthy(record.get(key)) {
            record.insert(key.clone(), value.clone());
        }
    }
}
