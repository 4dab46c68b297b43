//! Follow-up chain executor (wire name `then`)
//!
//! Runs declared actions against an already resolved record or list.
//! Sequential mode is entity-major: every action runs against the first
//! record before any action runs against the second. Async mode dispatches
//! every (record, action) pair at once.

use super::template::substitute;
use super::{fan_out, EngineError, EngineResult, OnFailure};
use crate::dispatch::Dispatcher;
use crate::record::{ActionDescriptor, Record};
use crate::schema::FollowUpSpec;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

/// The response envelope returned by a follow-up chain.
pub type Envelope = Map<String, Value>;

/// What a follow-up chain runs against.
#[derive(Debug, Clone, PartialEq)]
pub enum Subject {
    Entity(Option<Record>),
    List(Option<Vec<Record>>),
}

impl Subject {
    fn records(&self) -> &[Record] {
        match self {
            Subject::Entity(Some(record)) => std::slice::from_ref(record),
            Subject::List(Some(list)) => list,
            _ => &[],
        }
    }

    /// Envelope describing the subject itself: `{success, entity}` or
    /// `{success, list, count}`.
    fn start_envelope(&self) -> Envelope {
        let mut envelope = Envelope::new();
        match self {
            Subject::Entity(entity) => {
                envelope.insert("success".into(), Value::Bool(entity.is_some()));
                envelope.insert(
                    "entity".into(),
                    entity.clone().map(Value::Object).unwrap_or(Value::Null),
                );
            }
            Subject::List(list) => {
                envelope.insert("success".into(), Value::Bool(list.is_some()));
                let count = list.as_ref().map_or(0, Vec::len);
                envelope.insert(
                    "list".into(),
                    list.as_ref()
                        .map(|l| Value::Array(l.iter().cloned().map(Value::Object).collect()))
                        .unwrap_or(Value::Null),
                );
                envelope.insert("count".into(), Value::from(count));
            }
        }
        envelope
    }
}

/// Run a follow-up chain and shape the response envelope.
///
/// Without a subject or without actions nothing is dispatched and the
/// envelope describes the subject. A failing action fails the chain: in
/// sequential mode later actions never run, in async mode the actions
/// already launched still run to completion.
pub async fn run_follow_ups(
    dispatcher: &Arc<dyn Dispatcher>,
    subject: Subject,
    spec: Option<&FollowUpSpec>,
) -> EngineResult<Envelope> {
    let spec = match spec {
        Some(spec) if !spec.actions.is_empty() && !subject.records().is_empty() => spec,
        _ => return Ok(subject.start_envelope()),
    };

    let results = if spec.parallel {
        run_parallel(dispatcher, subject.records(), &spec.actions).await?
    } else {
        run_sequential(dispatcher, subject.records(), &spec.actions).await?
    };

    Ok(shape(subject, spec, results))
}

async fn run_sequential(
    dispatcher: &Arc<dyn Dispatcher>,
    records: &[Record],
    actions: &[ActionDescriptor],
) -> EngineResult<Vec<Value>> {
    let mut results = Vec::with_capacity(records.len() * actions.len());
    for record in records {
        for action in actions {
            let action = substitute(record, action);
            debug!(%action, "follow-up");
            results.push(dispatcher.dispatch(action).await?);
        }
    }
    Ok(results)
}

async fn run_parallel(
    dispatcher: &Arc<dyn Dispatcher>,
    records: &[Record],
    actions: &[ActionDescriptor],
) -> EngineResult<Vec<Value>> {
    let mut branches = Vec::with_capacity(records.len() * actions.len());
    for record in records {
        for action in actions {
            let dispatcher = dispatcher.clone();
            let action = substitute(record, action);
            branches.push(async move { dispatcher.dispatch(action).await.map_err(EngineError::from) });
        }
    }
    debug!(count = branches.len(), "follow-ups in parallel");
    fan_out(branches, OnFailure::Detach).await
}

/// Assemble the final envelope from the `results` declaration.
fn shape(subject: Subject, spec: &FollowUpSpec, results: Vec<Value>) -> Envelope {
    let Some(declared) = &spec.results else {
        let mut envelope = Envelope::new();
        envelope.insert("success".into(), Value::Bool(true));
        return envelope;
    };

    let mut envelope = if declared.includes_start {
        subject.start_envelope()
    } else {
        let mut envelope = Envelope::new();
        envelope.insert("success".into(), Value::Bool(true));
        envelope
    };
    if let Some(name) = &declared.name {
        envelope.insert(name.clone(), Value::Array(results));
    }
    envelope
}
