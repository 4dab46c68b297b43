//! In-memory entity store backed by DashMap

use super::{check_id, selected, EntityStore, StoreResult};
use crate::record::{Namespace, Record, NAMESPACE_FIELD};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A batch of records to seed into one namespace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Fixture {
    #[serde(flatten)]
    pub namespace: Namespace,
    #[serde(default)]
    pub records: Vec<Record>,
}

impl Fixture {
    /// Parse a JSON array of fixtures.
    pub fn parse_list(json: &str) -> StoreResult<Vec<Fixture>> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Entity store keeping every namespace as an ordered list of records.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: DashMap<Namespace, Vec<Record>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store seeded with fixtures.
    pub fn with_fixtures(fixtures: Vec<Fixture>) -> StoreResult<Self> {
        let store = Self::new();
        for fixture in fixtures {
            for record in fixture.records {
                store.save(&fixture.namespace, record)?;
            }
        }
        Ok(store)
    }

    /// Number of records in a namespace
    pub fn count(&self, namespace: &Namespace) -> usize {
        self.collections.get(namespace).map(|c| c.len()).unwrap_or(0)
    }
}

impl EntityStore for MemoryStore {
    fn save(&self, namespace: &Namespace, mut entity: Record) -> StoreResult<Record> {
        let id = match entity.get("id").filter(|id| !id.is_null()) {
            Some(id) => {
                check_id(id)?;
                id.clone()
            }
            None => Value::String(Uuid::new_v4().to_string()),
        };
        entity.insert("id".to_string(), id.clone());
        entity.insert(NAMESPACE_FIELD.to_string(), Value::String(namespace.to_string()));

        let mut collection = self.collections.entry(namespace.clone()).or_default();
        match collection.iter_mut().find(|r| r.get("id") == Some(&id)) {
            Some(existing) => *existing = entity.clone(),
            None => collection.push(entity.clone()),
        }
        Ok(entity)
    }

    fn load(&self, namespace: &Namespace, id: &Value) -> StoreResult<Option<Record>> {
        if id.is_null() {
            return Ok(None);
        }
        check_id(id)?;
        Ok(self
            .collections
            .get(namespace)
            .and_then(|c| c.iter().find(|r| r.get("id") == Some(id)).cloned()))
    }

    fn remove(&self, namespace: &Namespace, id: &Value) -> StoreResult<bool> {
        if id.is_null() {
            return Ok(false);
        }
        check_id(id)?;
        let Some(mut collection) = self.collections.get_mut(namespace) else {
            return Ok(false);
        };
        let before = collection.len();
        collection.retain(|r| r.get("id") != Some(id));
        Ok(collection.len() < before)
    }

    fn list(&self, namespace: &Namespace, select: &Record) -> StoreResult<Vec<Record>> {
        Ok(self
            .collections
            .get(namespace)
            .map(|c| c.iter().filter(|r| selected(r, select)).cloned().collect())
            .unwrap_or_default())
    }
}
