//! Write-side commands: create, update, delete, truncate, check, validate
//! and relationship cascades

use super::validate::{FieldError, Validation};
use super::{object_arg, strip_namespace, wants_no_namespace, Command, CrudService};
use crate::dispatch::{DispatchError, Dispatcher};
use crate::enrich::{fan_out_dispatches, CascadeDeleter};
use crate::record::{is_truthy, response_succeeded, ActionDescriptor, Record};
use crate::schema::relationships_from_action;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

impl CrudService {
    pub(super) fn create(&self, action: ActionDescriptor) -> Result<Value, DispatchError> {
        let Some(mut entity) = self.entity_arg(&action) else {
            return Ok(self.no_entity());
        };
        self.stamp_last_update(&mut entity);

        let namespace = self.namespace(&action);
        let mut saved = self.store.save(&namespace, entity)?;
        if wants_no_namespace(&action) {
            strip_namespace(&mut saved);
        }
        debug!(%namespace, id = %saved["id"], "created");
        Ok(json!({"success": true, "errors": [], "entity": saved}))
    }

    /// Merge the given fields into the stored record with the same id.
    pub(super) fn update(&self, action: ActionDescriptor) -> Result<Value, DispatchError> {
        let Some(mut changes) = self.entity_arg(&action) else {
            return Ok(self.no_entity());
        };
        self.stamp_last_update(&mut changes);

        let namespace = self.namespace(&action);
        let id = changes.get("id").cloned().unwrap_or(Value::Null);
        let Some(mut stored) = self.store.load(&namespace, &id)? else {
            let errors = vec![FieldError::new(Some("id"), id, "not found")];
            return Ok(json!({"success": false, "errors": errors, "entity": null}));
        };

        stored.extend(changes);
        let mut saved = self.store.save(&namespace, stored)?;
        if wants_no_namespace(&action) {
            strip_namespace(&mut saved);
        }
        Ok(json!({"success": true, "errors": [], "entity": saved}))
    }

    /// Remove a record, then cascade through any declared relationships.
    pub(super) async fn delete(
        &self,
        action: ActionDescriptor,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Result<Value, DispatchError> {
        let relationships = relationships_from_action(&action, self.config.max_schema_depth)?;
        let namespace = self.namespace(&action);
        let id = action.get("id").cloned().unwrap_or(Value::Null);
        let removed = self.store.remove(&namespace, &id)?;
        debug!(%namespace, %id, removed, "deleted");

        if relationships.is_empty() {
            return Ok(json!({"success": true}));
        }
        let summary = self
            .cascade(dispatcher)
            .delete_relationships(&id, &relationships)
            .await?;
        Ok(json!({"success": true, "relationships": serde_json::to_value(summary)?}))
    }

    /// Delete every record of a namespace, one `delete` dispatch per record.
    pub(super) async fn truncate(
        &self,
        action: ActionDescriptor,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Result<Value, DispatchError> {
        let namespace = self.namespace(&action);
        let deletes: Vec<_> = self
            .store
            .list(&namespace, &Record::new())?
            .into_iter()
            .map(|record| {
                self.own_action(Command::Delete, &namespace)
                    .with("id", record.get("id").cloned().unwrap_or(Value::Null))
            })
            .collect();
        info!(%namespace, count = deletes.len(), "truncating");
        fan_out_dispatches(&dispatcher, deletes).await?;
        Ok(json!({"success": true}))
    }

    /// Store health check: create a record and delete it again.
    pub(super) async fn check(
        &self,
        action: ActionDescriptor,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Result<Value, DispatchError> {
        let namespace = self.namespace(&action);
        let entity = self
            .entity_arg(&action)
            .map(Value::Object)
            .unwrap_or_else(|| json!({"check": "check"}));

        let created = match dispatcher
            .dispatch(self.own_action(Command::Create, &namespace).with("entity", entity))
            .await
        {
            Ok(created) => created,
            Err(err) => return Ok(check_failed(json!([err.to_string()]), Command::Create)),
        };
        let id = created.get("entity").and_then(|e| e.get("id"));
        if !response_succeeded(&created) || !is_truthy(id) {
            return Ok(check_failed(errors_of(&created), Command::Create));
        }

        let delete = self
            .own_action(Command::Delete, &namespace)
            .with("id", id.cloned().unwrap_or(Value::Null));
        match dispatcher.dispatch(delete).await {
            Ok(deleted) if response_succeeded(&deleted) => Ok(json!({"success": true})),
            Ok(deleted) => Ok(check_failed(errors_of(&deleted), Command::Delete)),
            Err(err) => Ok(check_failed(json!([err.to_string()]), Command::Delete)),
        }
    }

    pub(super) async fn validate(&self, action: ActionDescriptor) -> Result<Value, DispatchError> {
        let validation = self.validator.validate(&action).await?;
        Ok(serde_json::to_value(validation)?)
    }

    /// Validate, then run the plain command through the router.
    pub(super) async fn validate_and_execute(
        &self,
        command: Command,
        action: ActionDescriptor,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Result<Value, DispatchError> {
        let validation: Validation = self.validator.validate(&action).await?;
        if !validation.success {
            debug!(%command, errors = validation.errors.len(), "validation failed");
            return Ok(serde_json::to_value(validation)?);
        }

        let namespace = self.namespace(&action);
        let mut plain = self.own_action(command, &namespace);
        for key in ["entity", "nonamespace"] {
            if let Some(value) = action.get(key) {
                plain = plain.with(key, value.clone());
            }
        }
        dispatcher.dispatch(plain).await
    }

    pub(super) async fn delete_relationships(
        &self,
        action: ActionDescriptor,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Result<Value, DispatchError> {
        let relationships = relationships_from_action(&action, self.config.max_schema_depth)?;
        if relationships.is_empty() {
            return Ok(json!({"success": true, "results": []}));
        }
        let id = action.get("id").cloned().unwrap_or(Value::Null);
        let summary = self
            .cascade(dispatcher)
            .delete_relationships(&id, &relationships)
            .await?;
        Ok(serde_json::to_value(summary)?)
    }

    fn cascade(&self, dispatcher: Arc<dyn Dispatcher>) -> CascadeDeleter {
        CascadeDeleter::new(dispatcher, self.config.default_namespace())
            .with_detached(self.detached.clone())
    }

    /// The `entity` argument, when it is an object.
    fn entity_arg(&self, action: &ActionDescriptor) -> Option<Record> {
        object_arg(action, "entity")
    }

    fn no_entity(&self) -> Value {
        let errors = vec![FieldError::new(None, Value::Null, self.config.msg_no_entity.clone())];
        json!({"success": false, "errors": errors})
    }

    fn stamp_last_update(&self, entity: &mut Record) {
        if self.config.last_update {
            entity.insert(
                "last_update".to_string(),
                Value::from(chrono::Utc::now().timestamp_millis()),
            );
        }
    }
}

fn errors_of(response: &Value) -> Value {
    response.get("errors").cloned().unwrap_or_else(|| json!([]))
}

fn check_failed(errors: Value, command: Command) -> Value {
    json!({"success": false, "errors": errors, "command": command.as_str()})
}

#[cfg(test)]
mod tests {
    use super::super::{AcceptAll, Validator};
    use super::*;
    use crate::config::CrudConfig;
    use crate::dispatch::ActionRouter;
    use crate::record::{Namespace, NAMESPACE_FIELD};
    use crate::store::{EntityStore, MemoryStore};
    use async_trait::async_trait;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn router_with(store: Arc<MemoryStore>, config: CrudConfig) -> Arc<ActionRouter> {
        CrudService::new(store, config).into_router()
    }

    fn shop() -> CrudConfig {
        CrudConfig::default().with_role("shop")
    }

    // --- Scenario: create ---

    #[tokio::test]
    async fn create_assigns_id_and_stamps_last_update() {
        let store = Arc::new(MemoryStore::new());
        let router = router_with(store.clone(), shop().with_last_update(true));

        let response = router
            .dispatch(ActionDescriptor::new("shop", "create").with("entity", json!({"label": "Fender"})))
            .await
            .unwrap();

        assert_eq!(response["success"], true);
        assert_eq!(response["errors"], json!([]));
        let entity = &response["entity"];
        assert!(entity["id"].is_string());
        assert!(entity["last_update"].as_i64().unwrap() > 0);
        assert_eq!(entity[NAMESPACE_FIELD], "-/-/entity");
        assert_eq!(store.count(&Namespace::named("entity")), 1);
    }

    #[tokio::test]
    async fn create_without_entity_reports_configured_message() {
        let router = router_with(Arc::new(MemoryStore::new()), shop());

        let response = router.dispatch(ActionDescriptor::new("shop", "create")).await.unwrap();

        assert_eq!(
            response,
            json!({"success": false, "errors": [{"field": null, "actual": null, "error": "no entity"}]})
        );
    }

    #[tokio::test]
    async fn create_with_nonamespace_strips_marker() {
        let router = router_with(Arc::new(MemoryStore::new()), shop());

        let response = router
            .dispatch(
                ActionDescriptor::new("shop", "create")
                    .with("entity", json!({"label": "Gibson"}))
                    .with("nonamespace", "true"),
            )
            .await
            .unwrap();

        assert!(response["entity"].get(NAMESPACE_FIELD).is_none());
    }

    // --- Scenario: update merges into the stored record ---

    #[tokio::test]
    async fn update_merges_fields() {
        let store = Arc::new(MemoryStore::new());
        let ns = Namespace::named("brand");
        store.save(&ns, record(json!({"id": "b1", "label": "Fender", "country": "US"}))).unwrap();
        let router = router_with(store.clone(), shop());

        let response = router
            .dispatch(
                ActionDescriptor::new("shop", "update")
                    .with("name", "brand")
                    .with("entity", json!({"id": "b1", "label": "Fender Inc."})),
            )
            .await
            .unwrap();

        assert_eq!(response["success"], true);
        let stored = store.load(&ns, &json!("b1")).unwrap().unwrap();
        assert_eq!(stored["label"], "Fender Inc.");
        assert_eq!(stored["country"], "US");
    }

    #[tokio::test]
    async fn update_unknown_id_is_not_found() {
        let router = router_with(Arc::new(MemoryStore::new()), shop());

        let response = router
            .dispatch(ActionDescriptor::new("shop", "update").with("entity", json!({"id": "nope", "x": 1})))
            .await
            .unwrap();

        assert_eq!(
            response,
            json!({"success": false, "errors": [{"field": "id", "actual": "nope", "error": "not found"}], "entity": null})
        );
    }

    // --- Scenario: validated variants ---

    struct RequireLabel;

    #[async_trait]
    impl Validator for RequireLabel {
        async fn validate(&self, action: &ActionDescriptor) -> Result<Validation, DispatchError> {
            let label = action.get("entity").and_then(|e| e.get("label"));
            if is_truthy(label) {
                Ok(Validation::ok())
            } else {
                Ok(Validation::failed(vec![FieldError::new(Some("label"), Value::Null, "required")]))
            }
        }
    }

    #[tokio::test]
    async fn validated_create_runs_validator_first() {
        let store = Arc::new(MemoryStore::new());
        let router = CrudService::new(store.clone(), shop())
            .with_validator(Arc::new(RequireLabel))
            .into_router();

        let rejected = router
            .dispatch(
                ActionDescriptor::new("shop", "create")
                    .with("validate", true)
                    .with("entity", json!({"country": "US"})),
            )
            .await
            .unwrap();
        let accepted = router
            .dispatch(
                ActionDescriptor::new("shop", "create")
                    .with("validate", true)
                    .with("entity", json!({"label": "Fender"})),
            )
            .await
            .unwrap();

        assert_eq!(rejected["success"], false);
        assert_eq!(rejected["errors"][0]["field"], "label");
        assert_eq!(accepted["success"], true);
        assert_eq!(store.count(&Namespace::named("entity")), 1);
    }

    #[tokio::test]
    async fn validate_command_returns_validator_output() {
        let router = CrudService::new(Arc::new(MemoryStore::new()), shop())
            .with_validator(Arc::new(AcceptAll))
            .into_router();

        let response = router.dispatch(ActionDescriptor::new("shop", "validate")).await.unwrap();

        assert_eq!(response, json!({"success": true, "errors": []}));
    }

    // --- Scenario: truncate and check ---

    #[tokio::test]
    async fn truncate_removes_every_record_of_namespace() {
        let store = Arc::new(MemoryStore::new());
        let ns = Namespace::named("brand");
        for id in ["b1", "b2", "b3"] {
            store.save(&ns, record(json!({"id": id}))).unwrap();
        }
        store.save(&Namespace::named("type"), record(json!({"id": "t1"}))).unwrap();
        let router = router_with(store.clone(), shop());

        let response = router
            .dispatch(ActionDescriptor::new("shop", "truncate").with("name", "brand"))
            .await
            .unwrap();

        assert_eq!(response, json!({"success": true}));
        assert_eq!(store.count(&ns), 0);
        assert_eq!(store.count(&Namespace::named("type")), 1);
    }

    #[tokio::test]
    async fn check_round_trips_through_store() {
        let store = Arc::new(MemoryStore::new());
        let router = router_with(store.clone(), shop());

        let response = router.dispatch(ActionDescriptor::new("shop", "check")).await.unwrap();

        assert_eq!(response, json!({"success": true}));
        assert_eq!(store.count(&Namespace::named("entity")), 0);
    }

    #[tokio::test]
    async fn check_reports_failing_create() {
        let router = router_with(Arc::new(MemoryStore::new()), shop());

        let response = router
            .dispatch(ActionDescriptor::new("shop", "check").with("entity", json!({"id": [1]})))
            .await
            .unwrap();

        assert_eq!(response["success"], false);
        assert_eq!(response["command"], "create");
        assert_eq!(response["errors"].as_array().unwrap().len(), 1);
    }

    // --- Scenario: delete with a relationship cascade ---

    #[tokio::test]
    async fn delete_cascades_declared_relationships() {
        let store = Arc::new(MemoryStore::new());
        store.save(&Namespace::named("brand"), record(json!({"id": "b1"}))).unwrap();
        store
            .save(&Namespace::named("brand_type"), record(json!({"id": "l1", "id_brand": "b1", "id_type": "t1"})))
            .unwrap();
        store.save(&Namespace::named("type"), record(json!({"id": "t1"}))).unwrap();
        let service = Arc::new(CrudService::new(store.clone(), shop()));
        let router = ActionRouter::new();
        service.register(&router);

        let response = router
            .dispatch(
                ActionDescriptor::new("shop", "delete")
                    .with("name", "brand")
                    .with("id", "b1")
                    .with(
                        "relationships",
                        json!([{
                            "location": {"role": "shop", "name": "brand_type"},
                            "in_idname": "id_brand",
                            "out": {"location": {"role": "shop", "name": "type"}, "idname": "id_type", "delete": true}
                        }]),
                    ),
            )
            .await
            .unwrap();
        service.detached().drain().await;

        assert_eq!(response["success"], true);
        assert_eq!(response["relationships"]["results"][0]["count"], 1);
        assert_eq!(store.count(&Namespace::named("brand")), 0);
        assert_eq!(store.count(&Namespace::named("brand_type")), 0);
        assert_eq!(store.count(&Namespace::named("type")), 0);
    }

    #[tokio::test]
    async fn delete_relationships_without_tree_is_empty_success() {
        let router = router_with(Arc::new(MemoryStore::new()), shop());

        let response = router
            .dispatch(ActionDescriptor::new("shop", "deleterelationships").with("id", "b1"))
            .await
            .unwrap();

        assert_eq!(response, json!({"success": true, "results": []}));
    }

    #[tokio::test]
    async fn cyclic_relationships_are_rejected_before_deleting() {
        let store = Arc::new(MemoryStore::new());
        store.save(&Namespace::named("brand"), record(json!({"id": "b1"}))).unwrap();
        let router = router_with(store.clone(), shop());
        let link = json!({
            "location": {"role": "shop", "name": "brand_type"},
            "in_idname": "id_brand",
            "out": {"location": {"role": "shop", "name": "type"}, "idname": "id_type"}
        });
        let mut cyclic = link.clone();
        cyclic["relationships"] = json!([link]);

        let result = router
            .dispatch(
                ActionDescriptor::new("shop", "delete")
                    .with("name", "brand")
                    .with("id", "b1")
                    .with("relationships", json!([cyclic])),
            )
            .await;

        assert!(matches!(result, Err(DispatchError::Schema(_))));
        assert_eq!(store.count(&Namespace::named("brand")), 1);
    }
}
