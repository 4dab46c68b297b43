//! Action patterns: the keys a descriptor must carry to match a route.

use crate::record::ActionDescriptor;
use serde_json::{Map, Value};
use std::fmt;

/// A set of key/value pairs a descriptor must carry, compared by JSON equality.
///
/// When several patterns match a descriptor, the one with the most keys
/// wins, so `{role, cmd, validate:true}` shadows `{role, cmd}`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionPattern(Map<String, Value>);

impl ActionPattern {
    pub fn new() -> Self {
        Self::default()
    }

    /// The common `role` + `cmd` pattern.
    pub fn capability(role: impl Into<String>, cmd: impl Into<String>) -> Self {
        Self::new().with("role", role.into()).with("cmd", cmd.into())
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn matches(&self, action: &ActionDescriptor) -> bool {
        self.0
            .iter()
            .all(|(key, expected)| action.get(key) == Some(expected))
    }

    /// Number of keys; higher is more specific.
    pub fn specificity(&self) -> usize {
        self.0.len()
    }
}

impl From<Map<String, Value>> for ActionPattern {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

impl fmt::Display for ActionPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|(k, v)| format!("{}:{}", k, v)).collect();
        write!(f, "{{{}}}", parts.join(","))
    }
}
