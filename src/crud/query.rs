//! Read-side commands: read, query, count and first
//!
//! Query pipeline: list from the store, format (deep select, namespace
//! stripping, defaults), joins, appends, then follow-ups. With `joinfirst`
//! the joins run before formatting so deep selects can reach joined fields.

use super::{apply_defaults, object_arg, strip_namespace, wants_no_namespace, CrudService};
use crate::dispatch::{DispatchError, Dispatcher};
use crate::enrich::{
    filter_list, resolve_appends, resolve_appends_for_list, resolve_joins, resolve_joins_for_list,
    run_follow_ups, Subject,
};
use crate::record::{flag, ActionDescriptor, Record};
use crate::schema::{DeepSelect, EnrichmentSchema};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

impl CrudService {
    pub(super) async fn read(
        &self,
        action: ActionDescriptor,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Result<Value, DispatchError> {
        let schema = EnrichmentSchema::from_action(&action, self.config.max_schema_depth)?;
        let namespace = self.namespace(&action);
        let id = action.get("id").cloned().unwrap_or(Value::Null);

        let mut entity = self.store.load(&namespace, &id)?;
        if let Some(record) = entity.as_mut() {
            if wants_no_namespace(&action) {
                strip_namespace(record);
            }
            if let Some(defaults) = object_arg(&action, "defaults") {
                apply_defaults(record, &defaults);
            }
        }
        debug!(%namespace, %id, found = entity.is_some(), "read");

        let entity = resolve_joins(&dispatcher, entity, &schema.joins).await?;
        let entity = resolve_appends(&dispatcher, entity, &schema.appends).await?;

        if schema.then.is_some() {
            let envelope = run_follow_ups(&dispatcher, Subject::Entity(entity), schema.then.as_ref()).await?;
            return Ok(Value::Object(envelope));
        }
        Ok(json!({"success": entity.is_some(), "entity": entity}))
    }

    pub(super) async fn query(
        &self,
        action: ActionDescriptor,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Result<Value, DispatchError> {
        let schema = EnrichmentSchema::from_action(&action, self.config.max_schema_depth)?;
        let list = self.query_list(&action, &schema, &dispatcher).await?;

        if schema.then.is_some() {
            let envelope = run_follow_ups(&dispatcher, Subject::List(Some(list)), schema.then.as_ref()).await?;
            return Ok(Value::Object(envelope));
        }
        let count = list.len();
        Ok(json!({"success": true, "list": list, "count": count}))
    }

    /// Count records after deep selects; no enrichment runs.
    pub(super) fn count(&self, action: ActionDescriptor) -> Result<Value, DispatchError> {
        let schema = EnrichmentSchema::from_action(&action, self.config.max_schema_depth)?;
        let list = self.store.list(&self.namespace(&action), &select_arg(&action))?;
        let count = filter_list(list, &schema.deepselect).len();
        Ok(json!({"success": true, "count": count}))
    }

    /// The first record of a query, or `null`. Follow-ups do not run.
    pub(super) async fn first(
        &self,
        action: ActionDescriptor,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Result<Value, DispatchError> {
        let schema = EnrichmentSchema::from_action(&action, self.config.max_schema_depth)?;
        let first = self
            .query_list(&action, &schema, &dispatcher)
            .await?
            .into_iter()
            .next();
        Ok(json!({"success": true, "entity": first}))
    }

    async fn query_list(
        &self,
        action: &ActionDescriptor,
        schema: &EnrichmentSchema,
        dispatcher: &Arc<dyn Dispatcher>,
    ) -> Result<Vec<Record>, DispatchError> {
        let namespace = self.namespace(action);
        let list = self.store.list(&namespace, &select_arg(action))?;
        let format = Format {
            deepselect: &schema.deepselect,
            nonamespace: wants_no_namespace(action),
            defaults: object_arg(action, "defaults").unwrap_or_default(),
        };
        debug!(%namespace, listed = list.len(), "query");

        let list = if flag(action.get("joinfirst")) {
            let joined = resolve_joins_for_list(dispatcher, list, &schema.joins).await?;
            format.apply(joined)
        } else {
            resolve_joins_for_list(dispatcher, format.apply(list), &schema.joins).await?
        };
        Ok(resolve_appends_for_list(dispatcher, list, &schema.appends).await?)
    }
}

/// List formatting applied between the store and the enrichment steps.
struct Format<'a> {
    deepselect: &'a [DeepSelect],
    nonamespace: bool,
    defaults: Record,
}

impl Format<'_> {
    fn apply(&self, list: Vec<Record>) -> Vec<Record> {
        let mut list = filter_list(list, self.deepselect);
        for record in &mut list {
            if self.nonamespace {
                strip_namespace(record);
            }
            apply_defaults(record, &self.defaults);
        }
        list
    }
}

fn select_arg(action: &ActionDescriptor) -> Record {
    object_arg(action, "select").unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CrudConfig;
    use crate::dispatch::ActionRouter;
    use crate::record::{Namespace, NAMESPACE_FIELD};
    use crate::store::{EntityStore, MemoryStore};

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    /// Products, brands and stock in the default `shop` role.
    fn catalog() -> (Arc<MemoryStore>, Arc<ActionRouter>) {
        let store = Arc::new(MemoryStore::new());
        let products = Namespace::named("product");
        store
            .save(&products, record(json!({"id": "p1", "label": "Strat", "id_brand": "b1", "data": {"zipcode": "59491"}})))
            .unwrap();
        store
            .save(&products, record(json!({"id": "p2", "label": "", "id_brand": "b2", "data": {"zipcode": "75001"}})))
            .unwrap();
        store
            .save(&products, record(json!({"id": "p3", "label": "Tele", "id_brand": "b1", "data": {"zipcode": "59491"}})))
            .unwrap();
        let brands = Namespace::named("brand");
        store.save(&brands, record(json!({"id": "b1", "country": "US"}))).unwrap();
        store.save(&brands, record(json!({"id": "b2", "country": "JP"}))).unwrap();

        let router = CrudService::new(store.clone(), CrudConfig::default().with_role("shop")).into_router();
        (store, router)
    }

    fn brand_join() -> Value {
        json!([{"role": "shop", "name": "brand", "idname": "id_brand", "resultname": "brand", "nonamespace": true}])
    }

    // --- Scenario: read with defaults, joins and appends ---

    #[tokio::test]
    async fn read_enriches_entity() {
        let (_, router) = catalog();

        let response = router
            .dispatch(
                ActionDescriptor::new("shop", "read")
                    .with("name", "product")
                    .with("id", "p2")
                    .with("nonamespace", true)
                    .with("defaults", json!({"label": "unnamed", "color": "black"}))
                    .with("joins", brand_join())
                    .with(
                        "appends",
                        json!([{"resultname": "siblings",
                                "action": {"role": "shop", "cmd": "count", "name": "product"},
                                "select": {"idname": "id_brand", "valuename": "id_brand"}}]),
                    ),
            )
            .await
            .unwrap();

        let entity = &response["entity"];
        assert_eq!(response["success"], true);
        assert_eq!(entity["label"], "unnamed");
        assert_eq!(entity["color"], "black");
        assert!(entity.get(NAMESPACE_FIELD).is_none());
        assert_eq!(entity["brand"], json!({"id": "b2", "country": "JP"}));
        assert_eq!(entity["siblings"], json!({"success": true, "count": 1}));
    }

    #[tokio::test]
    async fn read_unknown_id_is_unsuccessful() {
        let (_, router) = catalog();

        let response = router
            .dispatch(
                ActionDescriptor::new("shop", "read")
                    .with("name", "product")
                    .with("id", "nope")
                    .with("joins", brand_join()),
            )
            .await
            .unwrap();

        assert_eq!(response, json!({"success": false, "entity": null}));
    }

    #[tokio::test]
    async fn read_with_follow_ups_returns_envelope() {
        let (store, router) = catalog();

        let response = router
            .dispatch(
                ActionDescriptor::new("shop", "read")
                    .with("name", "product")
                    .with("id", "p1")
                    .with(
                        "then",
                        json!({"actions": [{"role": "shop", "cmd": "create", "name": "audit",
                                            "entity": {"product": "%id%", "note": "read %label%"}}],
                               "results": {"includes_start": true, "name": "audit"}}),
                    ),
            )
            .await
            .unwrap();

        assert_eq!(response["success"], true);
        assert_eq!(response["entity"]["id"], "p1");
        assert_eq!(response["audit"][0]["entity"]["note"], "read Strat");
        assert_eq!(store.count(&Namespace::named("audit")), 1);
    }

    // --- Scenario: query pipeline ---

    #[tokio::test]
    async fn query_filters_by_select_and_deep_select() {
        let (_, router) = catalog();

        let response = router
            .dispatch(
                ActionDescriptor::new("shop", "query")
                    .with("name", "product")
                    .with("select", json!({"id_brand": "b1"}))
                    .with("deepselect", json!([{"property": "data.zipcode", "value": "59491"}]))
                    .with("joins", brand_join()),
            )
            .await
            .unwrap();

        assert_eq!(response["count"], 2);
        let list = response["list"].as_array().unwrap();
        assert_eq!(list[0]["id"], "p1");
        assert_eq!(list[1]["id"], "p3");
        assert_eq!(list[1]["brand"]["country"], "US");
    }

    #[tokio::test]
    async fn joinfirst_lets_deep_select_reach_joined_fields() {
        let (_, router) = catalog();
        let by_country = json!([{"property": "brand.country", "value": "JP"}]);

        let late = router
            .dispatch(
                ActionDescriptor::new("shop", "query")
                    .with("name", "product")
                    .with("deepselect", by_country.clone())
                    .with("joins", brand_join()),
            )
            .await
            .unwrap();
        let early = router
            .dispatch(
                ActionDescriptor::new("shop", "query")
                    .with("name", "product")
                    .with("deepselect", by_country)
                    .with("joins", brand_join())
                    .with("joinfirst", true),
            )
            .await
            .unwrap();

        assert_eq!(late["count"], 0);
        assert_eq!(early["count"], 1);
        assert_eq!(early["list"][0]["id"], "p2");
    }

    #[tokio::test]
    async fn count_and_first() {
        let (_, router) = catalog();

        let count = router
            .dispatch(
                ActionDescriptor::new("shop", "count")
                    .with("name", "product")
                    .with("deepselect", json!([{"property": "data.zipcode", "value": "59491"}])),
            )
            .await
            .unwrap();
        let first = router
            .dispatch(
                ActionDescriptor::new("shop", "first")
                    .with("name", "product")
                    .with("select", json!({"id_brand": "b2"})),
            )
            .await
            .unwrap();
        let none = router
            .dispatch(
                ActionDescriptor::new("shop", "first")
                    .with("name", "product")
                    .with("select", json!({"id_brand": "b9"})),
            )
            .await
            .unwrap();

        assert_eq!(count, json!({"success": true, "count": 2}));
        assert_eq!(first["entity"]["id"], "p2");
        assert_eq!(none, json!({"success": true, "entity": null}));
    }

    #[tokio::test]
    async fn duplicate_result_names_are_rejected() {
        let (_, router) = catalog();
        let joins = json!([
            {"role": "shop", "idname": "id_brand", "resultname": "brand"},
            {"role": "shop", "idname": "id_maker", "resultname": "brand"}
        ]);

        let result = router
            .dispatch(ActionDescriptor::new("shop", "query").with("name", "product").with("joins", joins))
            .await;

        assert!(matches!(result, Err(DispatchError::Schema(_))));
    }
}
