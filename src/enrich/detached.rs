//! Detached tasks: fire-and-forget dispatches with auditable outcomes
//!
//! The cascade deleter never awaits its delete branches. They are spawned
//! here instead, failures are logged, and an owner that needs to (a test,
//! or a process about to exit) can wait for the stragglers with `drain`.

use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::warn;

/// Which branch of a cascade a detached task ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetachedKind {
    LinkDelete,
    SlaveDelete,
    Cascade,
}

/// How one detached task ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetachedOutcome {
    pub kind: DetachedKind,
    pub role: String,
    pub id: Value,
    /// `None` on success.
    pub error: Option<String>,
}

impl DetachedOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Default)]
struct DetachedState {
    handles: Vec<JoinHandle<()>>,
    outcomes: Vec<DetachedOutcome>,
}

/// Registry of detached tasks spawned on the current tokio runtime.
///
/// Finished handles are pruned on every spawn. Outcomes are kept only when
/// the registry was built with [`DetachedTasks::recording`].
#[derive(Clone, Default)]
pub struct DetachedTasks {
    state: Arc<Mutex<DetachedState>>,
    record: bool,
}

impl DetachedTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry that keeps every outcome until the next [`drain`](Self::drain).
    pub fn recording() -> Self {
        Self {
            record: true,
            ..Self::default()
        }
    }

    pub(crate) fn spawn<F>(&self, task: F)
    where
        F: Future<Output = DetachedOutcome> + Send + 'static,
    {
        let state = self.state.clone();
        let record = self.record;
        let handle = tokio::spawn(async move {
            let outcome = task.await;
            if let Some(error) = &outcome.error {
                warn!(kind = ?outcome.kind, role = %outcome.role, id = %outcome.id, %error, "detached dispatch failed");
            }
            if record {
                lock(&state).outcomes.push(outcome);
            }
        });

        let mut state = lock(&self.state);
        state.handles.retain(|h| !h.is_finished());
        state.handles.push(handle);
    }

    /// Number of tracked tasks that have not finished yet.
    pub fn pending(&self) -> usize {
        lock(&self.state).handles.iter().filter(|h| !h.is_finished()).count()
    }

    /// Wait until every tracked task, including ones spawned while waiting,
    /// has finished. Returns the recorded outcomes and clears them.
    pub async fn drain(&self) -> Vec<DetachedOutcome> {
        loop {
            let batch = std::mem::take(&mut lock(&self.state).handles);
            if batch.is_empty() {
                break;
            }
            for handle in batch {
                if let Err(err) = handle.await {
                    warn!(%err, "detached task did not complete");
                }
            }
        }
        std::mem::take(&mut lock(&self.state).outcomes)
    }
}

fn lock(state: &Mutex<DetachedState>) -> std::sync::MutexGuard<'_, DetachedState> {
    state.lock().unwrap_or_else(|p| p.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn outcome(kind: DetachedKind, error: Option<&str>) -> DetachedOutcome {
        DetachedOutcome {
            kind,
            role: "shop".to_string(),
            id: json!("x1"),
            error: error.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn drain_waits_for_nested_spawns() {
        let tasks = DetachedTasks::recording();
        let inner = tasks.clone();
        tasks.spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            inner.spawn(async { outcome(DetachedKind::SlaveDelete, Some("gone")) });
            outcome(DetachedKind::Cascade, None)
        });

        let outcomes = tasks.drain().await;

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().any(|o| o.kind == DetachedKind::SlaveDelete && !o.succeeded()));
        assert!(outcomes.iter().any(|o| o.kind == DetachedKind::Cascade && o.succeeded()));
        assert_eq!(tasks.pending(), 0);
    }

    #[tokio::test]
    async fn non_recording_registry_keeps_no_outcomes() {
        let tasks = DetachedTasks::new();
        tasks.spawn(async { outcome(DetachedKind::LinkDelete, None) });
        assert!(tasks.drain().await.is_empty());
    }
}
