//! Action parameter definitions and kwargs validation

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use std::sync::Arc;
use tracing::warn;

use crate::core::errors::{ActionError, Result};

/// Custom check run on a supplied value after schema validation
pub type ParamValidator = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl ParamKind {
    /// JSON Schema `type` keyword
    pub fn schema_type(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
        }
    }

    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
        }
    }
}

/// One named parameter of an action
#[derive(Clone, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    pub label: String,
    #[serde(rename = "type")]
    pub kind: ParamKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
    #[serde(skip)]
    pub validator: Option<ParamValidator>,
}

impl ParamSpec {
    pub fn new<N: Into<String>, L: Into<String>>(name: N, label: L, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            kind,
            required: false,
            default: None,
            choices: Vec::new(),
            help: None,
            validator: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn choices<I: IntoIterator<Item = Value>>(mut self, choices: I) -> Self {
        self.choices = choices.into_iter().collect();
        self
    }

    pub fn help<S: Into<String>>(mut self, help: S) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn validator<F>(mut self, check: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(check));
        self
    }

    fn schema(&self) -> Value {
        let mut schema = json!({
            "type": self.kind.schema_type(),
            "title": self.label,
        });
        if let Some(help) = &self.help {
            schema["description"] = json!(help);
        }
        if let Some(default) = &self.default {
            schema["default"] = default.clone();
        }
        if !self.choices.is_empty() {
            schema["enum"] = Value::Array(self.choices.clone());
        }
        schema
    }
}

impl fmt::Debug for ParamSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParamSpec")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("required", &self.required)
            .field("default", &self.default)
            .finish()
    }
}

fn valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Check parameter definitions before an action is registered.
pub fn validate_definitions(params: &[ParamSpec]) -> Result<()> {
    let mut seen = std::collections::HashSet::new();
    for param in params {
        if !valid_name(&param.name) {
            return Err(ActionError::parameter(
                &param.name,
                "names may only contain lowercase letters, digits and '_'",
            ));
        }
        if !seen.insert(param.name.as_str()) {
            return Err(ActionError::parameter(&param.name, "defined more than once"));
        }
        if param.label.trim().is_empty() {
            return Err(ActionError::parameter(&param.name, "missing label"));
        }
        if let Some(default) = &param.default {
            if !param.kind.accepts(default) {
                return Err(ActionError::parameter(
                    &param.name,
                    format!("default {} does not match type {}", default, param.kind.schema_type()),
                ));
            }
        }
    }
    Ok(())
}

/// Default values of every parameter that declares one
pub fn defaults(params: &[ParamSpec]) -> Map<String, Value> {
    params
        .iter()
        .filter_map(|p| p.default.clone().map(|d| (p.name.clone(), d)))
        .collect()
}

/// JSON Schema for the kwargs an action accepts.
///
/// An action without parameters accepts no kwargs at all.
pub fn to_json_schema(params: &[ParamSpec]) -> Value {
    let properties: Map<String, Value> = params
        .iter()
        .map(|p| (p.name.clone(), p.schema()))
        .collect();
    let required: Vec<&str> = params
        .iter()
        .filter(|p| p.required)
        .map(|p| p.name.as_str())
        .collect();

    let mut schema = json!({
        "type": "object",
        "properties": properties,
        "required": required,
    });
    if params.is_empty() {
        schema["additionalProperties"] = json!(false);
    }
    schema
}

/// Validate caller kwargs against the parameter definitions.
pub fn validate_kwargs(params: &[ParamSpec], kwargs: &Map<String, Value>) -> Result<()> {
    let schema = to_json_schema(params);
    let validator = jsonschema::validator_for(&schema)
        .map_err(|e| ActionError::internal(format!("Failed to compile parameter schema: {}", e)))?;

    let instance = Value::Object(kwargs.clone());
    let details: Vec<String> = validator
        .iter_errors(&instance)
        .map(|e| {
            let path = e.instance_path.to_string();
            if path.is_empty() {
                e.to_string()
            } else {
                format!("{}: {}", path, e)
            }
        })
        .collect();
    if !details.is_empty() {
        warn!("Invalid arguments: {}", details.join("; "));
        return Err(ActionError::Validation {
            message: "invalid arguments".to_string(),
            field: None,
            details,
        });
    }

    for param in params {
        let (Some(check), Some(value)) = (&param.validator, kwargs.get(&param.name)) else {
            continue;
        };
        if !check(value) {
            return Err(ActionError::validation_field(
                format!("{} failed custom validator: {}", param.name, value),
                &param.name,
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn params() -> Vec<ParamSpec> {
        vec![
            ParamSpec::new("name", "Name", ParamKind::String).required(),
            ParamSpec::new("frames", "Frames", ParamKind::Integer).default_value(json!(24)),
            ParamSpec::new("mode", "Mode", ParamKind::String).choices([json!("fast"), json!("full")]),
        ]
    }

    fn kwargs(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_definitions() {
        assert!(validate_definitions(&params()).is_ok());

        let bad_name = [ParamSpec::new("Bad-Name", "Bad", ParamKind::String)];
        assert!(matches!(
            validate_definitions(&bad_name),
            Err(ActionError::Parameter { .. })
        ));

        let bad_default = [ParamSpec::new("n", "N", ParamKind::Integer).default_value(json!("x"))];
        assert!(validate_definitions(&bad_default).is_err());

        let no_label = [ParamSpec::new("n", " ", ParamKind::Integer)];
        assert!(validate_definitions(&no_label).is_err());
    }

    #[test]
    fn test_defaults() {
        assert_eq!(defaults(&params()), kwargs(json!({"frames": 24})));
    }

    #[test]
    fn test_validate_kwargs() {
        let params = params();
        assert!(validate_kwargs(&params, &kwargs(json!({"name": "sh010"}))).is_ok());

        let err = validate_kwargs(&params, &kwargs(json!({"frames": 2}))).unwrap_err();
        match err {
            ActionError::Validation { details, .. } => assert_eq!(details.len(), 1),
            other => panic!("unexpected error: {other}"),
        }

        assert!(validate_kwargs(&params, &kwargs(json!({"name": "a", "frames": "many"}))).is_err());
        assert!(validate_kwargs(&params, &kwargs(json!({"name": "a", "mode": "slow"}))).is_err());
    }

    #[test]
    fn test_no_parameters_rejects_kwargs() {
        assert!(validate_kwargs(&[], &Map::new()).is_ok());
        assert!(validate_kwargs(&[], &kwargs(json!({"x": 1}))).is_err());
    }

    #[test]
    fn test_custom_validator() {
        let params = [ParamSpec::new("code", "Code", ParamKind::String)
            .validator(|v| v.as_str().is_some_and(|s| s.len() == 3))];
        assert!(validate_kwargs(&params, &kwargs(json!({"code": "abc"}))).is_ok());
        assert!(validate_kwargs(&params, &kwargs(json!({"code": "abcd"}))).is_err());
    }
}
