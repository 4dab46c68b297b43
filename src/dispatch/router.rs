//! Action router: dispatches descriptors to pattern-matched handlers
//!
//! The router is itself a [`Dispatcher`]. Handlers receive the router back
//! as an `Arc<dyn Dispatcher>` so they can issue their own follow-on
//! actions (joins, appends, cascades) through the same routing table.

use super::pattern::ActionPattern;
use super::{DispatchError, Dispatcher};
use crate::record::ActionDescriptor;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Arc, RwLock, Weak};
use tracing::debug;

/// A handler registered on the router under a pattern.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn handle(
        &self,
        action: ActionDescriptor,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Result<Value, DispatchError>;
}

struct Route {
    pattern: ActionPattern,
    handler: Arc<dyn ActionHandler>,
}

/// Routes each descriptor to the most specific matching handler.
///
/// Ties go to the route registered last, so a later registration can
/// override an earlier one for the same pattern.
pub struct ActionRouter {
    routes: RwLock<Vec<Route>>,
    this: Weak<ActionRouter>,
}

impl ActionRouter {
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            routes: RwLock::new(Vec::new()),
            this: this.clone(),
        })
    }

    pub fn register(&self, pattern: ActionPattern, handler: Arc<dyn ActionHandler>) {
        debug!(%pattern, "registering action route");
        let mut routes = self.routes.write().unwrap_or_else(|p| p.into_inner());
        routes.push(Route { pattern, handler });
    }

    pub fn route_count(&self) -> usize {
        self.routes.read().unwrap_or_else(|p| p.into_inner()).len()
    }

    fn find(&self, action: &ActionDescriptor) -> Option<Arc<dyn ActionHandler>> {
        let routes = self.routes.read().unwrap_or_else(|p| p.into_inner());
        let mut best: Option<&Route> = None;
        for route in routes.iter().filter(|r| r.pattern.matches(action)) {
            if best.map_or(true, |b| route.pattern.specificity() >= b.pattern.specificity()) {
                best = Some(route);
            }
        }
        best.map(|r| r.handler.clone())
    }
}

#[async_trait]
impl Dispatcher for ActionRouter {
    async fn dispatch(&self, action: ActionDescriptor) -> Result<Value, DispatchError> {
        let handler = self
            .find(&action)
            .ok_or_else(|| DispatchError::NoRoute(action.to_string()))?;
        let this: Arc<dyn Dispatcher> = self
            .this
            .upgrade()
            .ok_or_else(|| DispatchError::Handler("router dropped".to_string()))?;
        debug!(%action, "dispatching");
        handler.handle(action, this).await
    }
}
