//! Declarative enrichment schema
//!
//! Typed forms of the wire structures callers attach to an action:
//! `joins`, `appends`, `then`, `deepselect` and `relationships`. Field names
//! follow the wire convention exactly; parsing goes through serde and is
//! followed by [`validate`] checks the wire format itself cannot express.

mod validate;

pub use validate::{validate_enrichment, validate_relationships, DEFAULT_MAX_DEPTH};

use crate::record::{ActionDescriptor, Location, Namespace};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Errors raised while parsing or validating a schema.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("invalid {field} schema: {source}")]
    Invalid {
        field: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("duplicate result field name: {0}")]
    DuplicateResultName(String),

    #[error("schema nesting exceeds the maximum depth of {0}")]
    TooDeep(usize),

    #[error("relationship cycle through {0}")]
    Cycle(String),

    #[error("append has no resultname and its action has no role")]
    MissingResultName,
}

/// Foreign-key expansion of a related record into a field of the origin record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinSpec {
    pub role: String,
    pub idname: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resultname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub joins: Vec<JoinSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub appends: Vec<AppendSpec>,
    #[serde(default)]
    pub nonamespace: bool,
}

impl JoinSpec {
    pub fn new(role: impl Into<String>, idname: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            idname: idname.into(),
            resultname: None,
            zone: None,
            base: None,
            name: None,
            joins: Vec::new(),
            appends: Vec::new(),
            nonamespace: false,
        }
    }

    pub fn with_resultname(mut self, resultname: impl Into<String>) -> Self {
        self.resultname = Some(resultname.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Field the related record is stored under (defaults to the role).
    pub fn result_name(&self) -> &str {
        self.resultname.as_deref().unwrap_or(&self.role)
    }

    pub fn namespace(&self) -> Namespace {
        Namespace::new(self.zone.clone(), self.base.clone(), self.name.clone())
    }
}

/// Key-injection rule for an append: `action.select[idname] = origin[valuename]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendSelect {
    pub idname: String,
    pub valuename: String,
}

/// Merge of an arbitrary secondary dispatch result into a named field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppendSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resultname: Option<String>,
    pub action: ActionDescriptor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub select: Option<AppendSelect>,
}

impl AppendSpec {
    pub fn new(action: ActionDescriptor) -> Self {
        Self {
            resultname: None,
            action,
            select: None,
        }
    }

    pub fn with_resultname(mut self, resultname: impl Into<String>) -> Self {
        self.resultname = Some(resultname.into());
        self
    }

    pub fn with_select(mut self, idname: impl Into<String>, valuename: impl Into<String>) -> Self {
        self.select = Some(AppendSelect {
            idname: idname.into(),
            valuename: valuename.into(),
        });
        self
    }

    /// Field the raw response is stored under (defaults to the action's role).
    pub fn result_name(&self) -> Option<&str> {
        self.resultname.as_deref().or_else(|| self.action.role())
    }
}

/// How the follow-up response envelope is shaped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowUpResults {
    #[serde(default)]
    pub includes_start: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// A chain of post-resolution actions (wire name `then`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FollowUpSpec {
    #[serde(default)]
    pub actions: Vec<ActionDescriptor>,
    /// Run every action concurrently instead of one at a time.
    #[serde(default, rename = "async")]
    pub parallel: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<FollowUpResults>,
}

impl FollowUpSpec {
    pub fn sequential(actions: Vec<ActionDescriptor>) -> Self {
        Self {
            actions,
            parallel: false,
            results: None,
        }
    }

    pub fn parallel(actions: Vec<ActionDescriptor>) -> Self {
        Self {
            actions,
            parallel: true,
            results: None,
        }
    }

    pub fn with_results(mut self, includes_start: bool, name: Option<&str>) -> Self {
        self.results = Some(FollowUpResults {
            includes_start,
            name: name.map(str::to_string),
        });
        self
    }
}

/// The slave side of a relationship.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipOut {
    pub location: Location,
    pub idname: String,
    #[serde(default)]
    pub delete: bool,
}

/// One node of a cascade-delete tree.
///
/// Link records live at `location`; the ones whose `in_idname` equals the
/// master id are deleted, optionally along with the slave they point to,
/// and nested relationships continue from the slave id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipSpec {
    pub location: Location,
    pub in_idname: String,
    pub out: RelationshipOut,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relationships: Vec<RelationshipSpec>,
}

/// Equality predicate on a dot-separated path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeepSelect {
    pub property: String,
    pub value: Value,
}

impl DeepSelect {
    pub fn new(property: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            property: property.into(),
            value: value.into(),
        }
    }
}

/// The enrichment parts of a read or query action.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnrichmentSchema {
    pub joins: Vec<JoinSpec>,
    pub appends: Vec<AppendSpec>,
    pub then: Option<FollowUpSpec>,
    pub deepselect: Vec<DeepSelect>,
}

impl EnrichmentSchema {
    /// Parse and validate the enrichment keys carried by an action.
    pub fn from_action(action: &ActionDescriptor, max_depth: usize) -> Result<Self, SchemaError> {
        let schema = Self {
            joins: parse_field(action, "joins")?.unwrap_or_default(),
            appends: parse_field(action, "appends")?.unwrap_or_default(),
            then: parse_field(action, "then")?,
            deepselect: parse_field(action, "deepselect")?.unwrap_or_default(),
        };
        validate_enrichment(&schema.joins, &schema.appends, max_depth)?;
        Ok(schema)
    }
}

/// Parse and validate the `relationships` tree carried by an action.
pub fn relationships_from_action(
    action: &ActionDescriptor,
    max_depth: usize,
) -> Result<Vec<RelationshipSpec>, SchemaError> {
    let relationships: Vec<RelationshipSpec> =
        parse_field(action, "relationships")?.unwrap_or_default();
    validate_relationships(&relationships, max_depth)?;
    Ok(relationships)
}

/// Deserialize one optional key of an action; `null` counts as absent.
fn parse_field<T: DeserializeOwned>(
    action: &ActionDescriptor,
    field: &'static str,
) -> Result<Option<T>, SchemaError> {
    match action.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value.clone())
            .map(Some)
            .map_err(|source| SchemaError::Invalid { field, source }),
    }
}
