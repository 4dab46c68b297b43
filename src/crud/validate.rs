//! Validation hooks for create and update

use crate::dispatch::DispatchError;
use crate::record::ActionDescriptor;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One field-level error in a command response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: Option<String>,
    pub actual: Value,
    pub error: String,
}

impl FieldError {
    pub fn new(field: Option<&str>, actual: Value, error: impl Into<String>) -> Self {
        Self {
            field: field.map(str::to_string),
            actual,
            error: error.into(),
        }
    }
}

/// Outcome of a validation: `{success, errors}` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Validation {
    pub success: bool,
    #[serde(default)]
    pub errors: Vec<FieldError>,
}

impl Validation {
    pub fn ok() -> Self {
        Self {
            success: true,
            errors: Vec::new(),
        }
    }

    pub fn failed(errors: Vec<FieldError>) -> Self {
        Self {
            success: false,
            errors,
        }
    }
}

/// Checks an incoming create or update before it runs.
#[async_trait]
pub trait Validator: Send + Sync {
    async fn validate(&self, action: &ActionDescriptor) -> Result<Validation, DispatchError>;
}

/// The default validator: every action passes.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

#[async_trait]
impl Validator for AcceptAll {
    async fn validate(&self, _action: &ActionDescriptor) -> Result<Validation, DispatchError> {
        Ok(Validation::ok())
    }
}
