//! Relationship cascade deleter
//!
//! Walks a relationship tree from a master id. For every relationship the
//! link records pointing at the master are queried; each link is then
//! deleted, its slave optionally deleted, and nested relationships continue
//! from the slave id. Only the link queries are awaited, and a rejected
//! query fails the call. Deletes and nested cascades run as detached tasks
//! whose failures never reach the caller.

use super::detached::{DetachedKind, DetachedOutcome, DetachedTasks};
use super::{fan_out, EngineResult, OnFailure};
use crate::dispatch::Dispatcher;
use crate::record::{response_succeeded, ActionDescriptor, Namespace, Record};
use crate::schema::RelationshipSpec;
use serde::Serialize;
use serde_json::{Map, Value};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, warn};

type CascadeFuture<'a> = Pin<Box<dyn Future<Output = EngineResult<CascadeSummary>> + Send + 'a>>;

/// Outcome of one link query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelationshipReport {
    pub success: bool,
    pub role: String,
    pub zone: Option<String>,
    pub base: Option<String>,
    pub name: Option<String>,
    pub count: u64,
}

/// Summary of a cascade: one report per top-level relationship.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CascadeSummary {
    pub success: bool,
    pub results: Vec<RelationshipReport>,
}

/// Cascade deleter bound to a dispatcher and a default namespace.
#[derive(Clone)]
pub struct CascadeDeleter {
    dispatcher: Arc<dyn Dispatcher>,
    defaults: Namespace,
    detached: DetachedTasks,
}

impl CascadeDeleter {
    pub fn new(dispatcher: Arc<dyn Dispatcher>, defaults: Namespace) -> Self {
        Self {
            dispatcher,
            defaults,
            detached: DetachedTasks::new(),
        }
    }

    /// Track detached branches in a shared registry.
    pub fn with_detached(mut self, detached: DetachedTasks) -> Self {
        self.detached = detached;
        self
    }

    pub fn detached(&self) -> &DetachedTasks {
        &self.detached
    }

    /// Cascade from `master_id` through every relationship concurrently.
    ///
    /// Resolves once the link queries have answered; the deletes they
    /// trigger may still be running. A rejected link query fails the whole
    /// call, while a query answering without `success` is reported.
    pub fn delete_relationships<'a>(
        &'a self,
        master_id: &'a Value,
        relationships: &'a [RelationshipSpec],
    ) -> CascadeFuture<'a> {
        Box::pin(async move {
            let branches: Vec<_> = relationships
                .iter()
                .map(|relationship| self.clone().cascade_one(master_id.clone(), relationship.clone()))
                .collect();
            let results = fan_out(branches, OnFailure::Abort).await?;
            Ok(CascadeSummary {
                success: true,
                results,
            })
        })
    }

    async fn cascade_one(
        self,
        master_id: Value,
        relationship: RelationshipSpec,
    ) -> EngineResult<RelationshipReport> {
        let namespace = self.defaults.overlay(&relationship.location.namespace());
        let mut select = Map::new();
        select.insert(relationship.in_idname.clone(), master_id.clone());
        let query = ActionDescriptor::new(relationship.location.role.clone(), "query")
            .with_namespace(&namespace)
            .with("select", Value::Object(select));

        let mut report = RelationshipReport {
            success: false,
            role: relationship.location.role.clone(),
            zone: namespace.zone.clone(),
            base: namespace.base.clone(),
            name: namespace.name.clone(),
            count: 0,
        };

        let response = self.dispatcher.dispatch(query).await.map_err(|err| {
            warn!(location = %relationship.location, %master_id, %err, "link query failed");
            err
        })?;
        report.success = response_succeeded(&response);

        let links: Vec<Record> = response
            .get("list")
            .and_then(Value::as_array)
            .map(|list| list.iter().filter_map(|v| v.as_object().cloned()).collect())
            .unwrap_or_default();
        report.count = response
            .get("count")
            .and_then(Value::as_u64)
            .unwrap_or(links.len() as u64);
        debug!(location = %relationship.location, %master_id, links = links.len(), "cascading");

        for link in &links {
            self.cascade_link(link, &namespace, &relationship);
        }
        Ok(report)
    }

    /// Spawn the detached deletes for one link record.
    fn cascade_link(&self, link: &Record, namespace: &Namespace, relationship: &RelationshipSpec) {
        match link.get("id").filter(|id| !id.is_null()) {
            Some(link_id) => {
                let action = ActionDescriptor::new(relationship.location.role.clone(), "delete")
                    .with_namespace(namespace)
                    .with("id", link_id.clone());
                self.spawn_delete(DetachedKind::LinkDelete, action, link_id.clone());
            }
            None => debug!(location = %relationship.location, "link record has no id"),
        }

        let out = &relationship.out;
        let Some(slave_id) = link.get(&out.idname).filter(|id| !id.is_null()).cloned() else {
            debug!(idname = %out.idname, "link record has no slave id");
            return;
        };

        if out.delete {
            let action = ActionDescriptor::new(out.location.role.clone(), "delete")
                .with_namespace(&self.defaults.overlay(&out.location.namespace()))
                .with("id", slave_id.clone());
            self.spawn_delete(DetachedKind::SlaveDelete, action, slave_id.clone());
        }

        if !relationship.relationships.is_empty() {
            let deleter = self.clone();
            let nested = relationship.relationships.clone();
            let role = out.location.role.clone();
            self.detached.spawn(async move {
                let error = deleter
                    .delete_relationships(&slave_id, &nested)
                    .await
                    .err()
                    .map(|err| err.to_string());
                DetachedOutcome {
                    kind: DetachedKind::Cascade,
                    role,
                    id: slave_id,
                    error,
                }
            });
        }
    }

    fn spawn_delete(&self, kind: DetachedKind, action: ActionDescriptor, id: Value) {
        let dispatcher = self.dispatcher.clone();
        let role = action.role().unwrap_or_default().to_string();
        self.detached.spawn(async move {
            let error = match dispatcher.dispatch(action).await {
                Ok(response) if response_succeeded(&response) => None,
                Ok(response) => Some(format!("delete reported failure: {}", response)),
                Err(err) => Some(err.to_string()),
            };
            DetachedOutcome { kind, role, id, error }
        });
    }
}

/// Cascade from `master_id` with an unobserved detached-task registry.
pub async fn delete_relationships(
    dispatcher: &Arc<dyn Dispatcher>,
    master_id: &Value,
    relationships: &[RelationshipSpec],
    defaults: &Namespace,
) -> EngineResult<CascadeSummary> {
    CascadeDeleter::new(dispatcher.clone(), defaults.clone())
        .delete_relationships(master_id, relationships)
        .await
}
