//! Records, namespaces and action descriptors
//!
//! A record is an open JSON object. An action descriptor is a JSON object
//! addressed by its `role` + `cmd` capability key; every other key is an
//! operation parameter.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// An open, dynamically keyed record.
pub type Record = Map<String, Value>;

/// Field the entity store stamps on records to carry their namespace.
pub const NAMESPACE_FIELD: &str = "entity$";

/// JavaScript-style truthiness over an optional JSON value.
///
/// Absent, `null`, `false`, `0` and `""` are falsy; everything else
/// (including empty arrays and objects) is truthy.
pub fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

/// True if a dispatch response reports success.
pub fn response_succeeded(response: &Value) -> bool {
    is_truthy(response.get("success"))
}

/// Read a flag that callers may send either as a boolean or as `"true"`.
pub fn flag(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s == "true",
        _ => false,
    }
}

/// The `zone/base/name` triple addressing a collection of records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Namespace {
    #[serde(default)]
    pub zone: Option<String>,
    #[serde(default)]
    pub base: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl Namespace {
    pub fn new(zone: Option<String>, base: Option<String>, name: Option<String>) -> Self {
        Self { zone, base, name }
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Overlay the parts set in `other` on top of this namespace.
    pub fn overlay(&self, other: &Namespace) -> Namespace {
        Namespace {
            zone: other.zone.clone().or_else(|| self.zone.clone()),
            base: other.base.clone().or_else(|| self.base.clone()),
            name: other.name.clone().or_else(|| self.name.clone()),
        }
    }

    /// Read the namespace parts carried by a JSON object. `null` counts as unset.
    pub fn from_fields(fields: &Map<String, Value>) -> Self {
        let part = |key: &str| fields.get(key).and_then(Value::as_str).map(str::to_string);
        Self {
            zone: part("zone"),
            base: part("base"),
            name: part("name"),
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let part = |p: &Option<String>| p.clone().unwrap_or_else(|| "-".to_string());
        write!(f, "{}/{}/{}", part(&self.zone), part(&self.base), part(&self.name))
    }
}

/// Where a collection of records lives: a role plus an optional namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Location {
    pub fn new(role: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            ..Self::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn namespace(&self) -> Namespace {
        Namespace::new(self.zone.clone(), self.base.clone(), self.name.clone())
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.role, self.namespace())
    }
}

/// An addressable operation: a `role` + `cmd` capability key plus parameters.
///
/// Descriptors are immutable inputs to a dispatch; builders consume and
/// return `self` so a schema-held descriptor is only ever cloned, never
/// edited in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionDescriptor(Map<String, Value>);

impl ActionDescriptor {
    pub fn new(role: impl Into<String>, cmd: impl Into<String>) -> Self {
        let mut fields = Map::new();
        fields.insert("role".to_string(), Value::String(role.into()));
        fields.insert("cmd".to_string(), Value::String(cmd.into()));
        Self(fields)
    }

    /// Wrap a JSON value; `None` unless it is an object.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self(fields)),
            _ => None,
        }
    }

    pub fn role(&self) -> Option<&str> {
        self.0.get("role").and_then(Value::as_str)
    }

    pub fn cmd(&self) -> Option<&str> {
        self.0.get("cmd").and_then(Value::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Set the namespace parts that are present; unset parts are left out.
    pub fn with_namespace(mut self, namespace: &Namespace) -> Self {
        for (key, part) in [
            ("zone", &namespace.zone),
            ("base", &namespace.base),
            ("name", &namespace.name),
        ] {
            if let Some(part) = part {
                self.0.insert(key.to_string(), Value::String(part.clone()));
            }
        }
        self
    }

    pub fn namespace(&self) -> Namespace {
        Namespace::from_fields(&self.0)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn fields_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.0
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for ActionDescriptor {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

impl fmt::Display for ActionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "role:{},cmd:{}",
            self.role().unwrap_or("?"),
            self.cmd().unwrap_or("?")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn truthiness_follows_loose_rules() {
        assert!(!is_truthy(None));
        assert!(!is_truthy(Some(&json!(null))));
        assert!(!is_truthy(Some(&json!(false))));
        assert!(!is_truthy(Some(&json!(0))));
        assert!(!is_truthy(Some(&json!(""))));
        assert!(is_truthy(Some(&json!("x"))));
        assert!(is_truthy(Some(&json!(2))));
        assert!(is_truthy(Some(&json!([]))));
        assert!(is_truthy(Some(&json!({}))));
    }

    #[test]
    fn flag_accepts_bool_and_string() {
        assert!(flag(Some(&json!(true))));
        assert!(flag(Some(&json!("true"))));
        assert!(!flag(Some(&json!("yes"))));
        assert!(!flag(None));
    }

    #[test]
    fn namespace_overlay_prefers_set_parts() {
        let defaults = Namespace::new(Some("eu".into()), None, Some("entity".into()));
        let resolved = defaults.overlay(&Namespace::named("brand"));
        assert_eq!(resolved.zone.as_deref(), Some("eu"));
        assert_eq!(resolved.base, None);
        assert_eq!(resolved.name.as_deref(), Some("brand"));
        assert_eq!(resolved.to_string(), "eu/-/brand");
    }

    #[test]
    fn descriptor_namespace_skips_unset_parts() {
        let action = ActionDescriptor::new("shop", "read").with_namespace(&Namespace::named("brand"));
        assert_eq!(action.get("name"), Some(&json!("brand")));
        assert!(action.get("zone").is_none());
        assert_eq!(action.namespace(), Namespace::named("brand"));
        assert_eq!(action.to_string(), "role:shop,cmd:read");
    }
}
