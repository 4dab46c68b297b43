//! Join resolver: foreign-key expansion of related records
//!
//! Each join reads the record whose id sits in `origin[idname]` and stores
//! it under the join's result name. Nested joins and appends are forwarded
//! to the inner read, which resolves them against the related record.

use super::{fan_out, EngineResult, OnFailure};
use crate::dispatch::Dispatcher;
use crate::record::{response_succeeded, ActionDescriptor, Record};
use crate::schema::JoinSpec;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Resolve every join of one record concurrently.
///
/// An absent record or an empty join list is returned unchanged without
/// dispatching. A related record that is not found leaves its field unset.
pub async fn resolve_joins(
    dispatcher: &Arc<dyn Dispatcher>,
    record: Option<Record>,
    joins: &[JoinSpec],
) -> EngineResult<Option<Record>> {
    let mut record = match record {
        Some(record) if !joins.is_empty() => record,
        other => return Ok(other),
    };

    let mut branches = Vec::with_capacity(joins.len());
    for join in joins {
        let Some(id) = record.get(&join.idname).filter(|id| !id.is_null()).cloned() else {
            debug!(idname = %join.idname, "join key absent, nothing to read");
            continue;
        };
        let dispatcher = dispatcher.clone();
        let join = join.clone();
        branches.push(read_one(dispatcher, id, join));
    }

    for (field, related) in fan_out(branches, OnFailure::Abort).await?.into_iter().flatten() {
        record.insert(field, related);
    }
    Ok(Some(record))
}

/// Resolve joins on every record of a list; records run concurrently and
/// the output keeps the input order.
pub async fn resolve_joins_for_list(
    dispatcher: &Arc<dyn Dispatcher>,
    list: Vec<Record>,
    joins: &[JoinSpec],
) -> EngineResult<Vec<Record>> {
    if list.is_empty() || joins.is_empty() {
        return Ok(list);
    }

    let joins: Arc<[JoinSpec]> = joins.into();
    let branches: Vec<_> = list
        .into_iter()
        .map(|record| {
            let dispatcher = dispatcher.clone();
            let joins = joins.clone();
            async move { resolve_joins(&dispatcher, Some(record), &joins).await }
        })
        .collect();

    Ok(fan_out(branches, OnFailure::Abort).await?.into_iter().flatten().collect())
}

async fn read_one(
    dispatcher: Arc<dyn Dispatcher>,
    id: Value,
    join: JoinSpec,
) -> EngineResult<Option<(String, Value)>> {
    let response = dispatcher.dispatch(read_action(&join, id)?).await?;
    if !response_succeeded(&response) {
        debug!(role = %join.role, field = join.result_name(), "joined record not found");
        return Ok(None);
    }
    let related = response.get("entity").cloned().unwrap_or(Value::Null);
    Ok(Some((join.result_name().to_string(), related)))
}

/// The read-by-id descriptor for one join, carrying its nested schema.
fn read_action(join: &JoinSpec, id: Value) -> EngineResult<ActionDescriptor> {
    let mut action = ActionDescriptor::new(join.role.clone(), "read")
        .with_namespace(&join.namespace())
        .with("id", id);
    if !join.joins.is_empty() {
        action = action.with("joins", serde_json::to_value(&join.joins)?);
    }
    if !join.appends.is_empty() {
        action = action.with("appends", serde_json::to_value(&join.appends)?);
    }
    if join.nonamespace {
        action = action.with("nonamespace", true);
    }
    Ok(action)
}
