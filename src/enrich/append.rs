//! Append resolver: named secondary-query results merged into records
//!
//! Unlike a join, an append runs an arbitrary action and stores the whole
//! raw response. With a `select` rule, the origin record supplies the key
//! injected into the action's selector; a missing key skips the append.

use super::{fan_out, EngineResult, OnFailure};
use crate::dispatch::Dispatcher;
use crate::record::{ActionDescriptor, Record};
use crate::schema::{AppendSpec, SchemaError};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

/// Resolve every append of one record concurrently.
///
/// An append with neither a `resultname` nor an action `role` has nowhere
/// to store its response and fails with [`SchemaError::MissingResultName`]
/// before anything is dispatched.
pub async fn resolve_appends(
    dispatcher: &Arc<dyn Dispatcher>,
    record: Option<Record>,
    appends: &[AppendSpec],
) -> EngineResult<Option<Record>> {
    let mut record = match record {
        Some(record) if !appends.is_empty() => record,
        other => return Ok(other),
    };

    let mut branches = Vec::with_capacity(appends.len());
    for append in appends {
        let field = append.result_name().ok_or(SchemaError::MissingResultName)?;
        let Some(action) = selected_action(&record, append) else {
            debug!(field, "append selector value absent, skipping");
            continue;
        };
        branches.push(run_one(dispatcher.clone(), field.to_string(), action));
    }

    for (field, response) in fan_out(branches, OnFailure::Abort).await? {
        record.insert(field, response);
    }
    Ok(Some(record))
}

/// Resolve appends on every record of a list, keeping the input order.
pub async fn resolve_appends_for_list(
    dispatcher: &Arc<dyn Dispatcher>,
    list: Vec<Record>,
    appends: &[AppendSpec],
) -> EngineResult<Vec<Record>> {
    if list.is_empty() || appends.is_empty() {
        return Ok(list);
    }

    let appends: Arc<[AppendSpec]> = appends.into();
    let branches: Vec<_> = list
        .into_iter()
        .map(|record| {
            let dispatcher = dispatcher.clone();
            let appends = appends.clone();
            async move { resolve_appends(&dispatcher, Some(record), &appends).await }
        })
        .collect();

    Ok(fan_out(branches, OnFailure::Abort).await?.into_iter().flatten().collect())
}

/// Copy the append's action, injecting the selector key when one is declared.
///
/// Returns `None` when the selector's source field is absent (or null) on
/// the origin record.
fn selected_action(record: &Record, append: &AppendSpec) -> Option<ActionDescriptor> {
    let mut action = append.action.clone();
    if let Some(select) = &append.select {
        let value = record.get(&select.valuename).filter(|v| !v.is_null())?.clone();
        let fields = action.fields_mut();
        let selector = fields
            .entry("select")
            .or_insert_with(|| Value::Object(Map::new()));
        if !selector.is_object() {
            *selector = Value::Object(Map::new());
        }
        if let Value::Object(selector) = selector {
            selector.insert(select.idname.clone(), value);
        }
    }
    Some(action)
}

async fn run_one(
    dispatcher: Arc<dyn Dispatcher>,
    field: String,
    action: ActionDescriptor,
) -> EngineResult<(String, Value)> {
    let response = dispatcher.dispatch(action).await?;
    Ok((field, response))
}
