//! ScriptedDispatcher: a recording dispatcher answering from canned responders
//!
//! Every dispatched descriptor is recorded in call order before it is
//! answered. Responders are matched like router patterns; the most specific
//! match wins and unmatched actions fail with `NoRoute`.

use super::pattern::ActionPattern;
use super::{DispatchError, Dispatcher};
use crate::record::ActionDescriptor;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Respond = Arc<dyn Fn(&ActionDescriptor) -> Result<Value, DispatchError> + Send + Sync>;

struct Responder {
    pattern: ActionPattern,
    delay: Option<Duration>,
    respond: Respond,
}

#[derive(Default)]
pub struct ScriptedDispatcher {
    calls: Mutex<Vec<ActionDescriptor>>,
    responders: Vec<Responder>,
}

impl ScriptedDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer matching actions with a function of the descriptor.
    pub fn respond_fn<F>(mut self, pattern: ActionPattern, respond: F) -> Self
    where
        F: Fn(&ActionDescriptor) -> Result<Value, DispatchError> + Send + Sync + 'static,
    {
        self.responders.push(Responder {
            pattern,
            delay: None,
            respond: Arc::new(respond),
        });
        self
    }

    /// Answer matching actions with a fixed response.
    pub fn respond(self, pattern: ActionPattern, response: Value) -> Self {
        self.respond_fn(pattern, move |_| Ok(response.clone()))
    }

    /// Answer matching actions with a function of the descriptor, called
    /// only once the delay has elapsed.
    pub fn respond_fn_after<F>(mut self, pattern: ActionPattern, delay: Duration, respond: F) -> Self
    where
        F: Fn(&ActionDescriptor) -> Result<Value, DispatchError> + Send + Sync + 'static,
    {
        self.responders.push(Responder {
            pattern,
            delay: Some(delay),
            respond: Arc::new(respond),
        });
        self
    }

    /// Answer matching actions with a fixed response after a delay.
    pub fn respond_after(self, pattern: ActionPattern, delay: Duration, response: Value) -> Self {
        self.respond_fn_after(pattern, delay, move |_| Ok(response.clone()))
    }

    /// Fail matching actions with a handler error.
    pub fn fail(self, pattern: ActionPattern, message: &str) -> Self {
        let message = message.to_string();
        self.respond_fn(pattern, move |_| Err(DispatchError::Handler(message.clone())))
    }

    /// Every descriptor dispatched so far, in call order.
    pub fn calls(&self) -> Vec<ActionDescriptor> {
        self.calls.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Dispatched descriptors matching a pattern, in call order.
    pub fn calls_matching(&self, pattern: &ActionPattern) -> Vec<ActionDescriptor> {
        self.calls()
            .into_iter()
            .filter(|action| pattern.matches(action))
            .collect()
    }

    fn find(&self, action: &ActionDescriptor) -> Option<&Responder> {
        let mut best: Option<&Responder> = None;
        for responder in self.responders.iter().filter(|r| r.pattern.matches(action)) {
            if best.map_or(true, |b| responder.pattern.specificity() >= b.pattern.specificity()) {
                best = Some(responder);
            }
        }
        best
    }
}

#[async_trait]
impl Dispatcher for ScriptedDispatcher {
    async fn dispatch(&self, action: ActionDescriptor) -> Result<Value, DispatchError> {
        self.calls
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(action.clone());

        let (delay, respond) = match self.find(&action) {
            Some(responder) => (responder.delay, responder.respond.clone()),
            None => return Err(DispatchError::NoRoute(action.to_string())),
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        respond(&action)
    }
}
