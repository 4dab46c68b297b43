//! Common test utilities for entwine integration tests
//!
//! Builds a `shop` catalog in a `MemoryStore` and a router with the CRUD
//! service registered on it.

#![allow(dead_code)]

use entwine::{
    ActionDescriptor, ActionRouter, CrudConfig, CrudService, DetachedTasks, Dispatcher, EntityStore,
    MemoryStore, Namespace, Record,
};
use serde_json::Value;
use std::sync::Arc;

pub const ROLE: &str = "shop";

pub struct Shop {
    pub store: Arc<MemoryStore>,
    pub router: Arc<ActionRouter>,
    pub detached: DetachedTasks,
}

impl Shop {
    /// An empty shop whose detached cascade branches are recorded.
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let detached = DetachedTasks::recording();
        let service = Arc::new(
            CrudService::new(store.clone(), CrudConfig::default().with_role(ROLE)).with_detached(detached.clone()),
        );
        let router = ActionRouter::new();
        service.register(&router);
        Self { store, router, detached }
    }

    /// Seed records into the `name` collection.
    pub fn seed(&self, name: &str, records: Value) -> &Self {
        let namespace = Namespace::named(name);
        for value in records.as_array().cloned().unwrap_or_default() {
            self.store.save(&namespace, record(value)).unwrap();
        }
        self
    }

    pub fn count(&self, name: &str) -> usize {
        self.store.count(&Namespace::named(name))
    }

    /// Dispatch a JSON action through the router.
    pub async fn act(&self, action: Value) -> Value {
        let action = ActionDescriptor::from_value(action).unwrap();
        self.router.dispatch(action).await.unwrap()
    }
}

pub fn record(value: Value) -> Record {
    value.as_object().cloned().unwrap()
}
