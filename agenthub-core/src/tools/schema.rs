//! Parameter schemas and validation
//!
//! Every tool declares the parameters it accepts. Extracted parameters are
//! checked against the schema before a call is planned; nothing is coerced.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Concrete parameters for one tool call
pub type Parameters = Map<String, Value>;

/// JSON type a parameter must have
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
    /// Any JSON value, including null
    Any,
}

impl ParamType {
    /// Check whether a value conforms to this type
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Integer => value.is_i64() || value.is_u64(),
            ParamType::Number => value.is_number(),
            ParamType::Boolean => value.is_boolean(),
            ParamType::Array => value.is_array(),
            ParamType::Object => value.is_object(),
            ParamType::Any => true,
        }
    }

    /// JSON Schema type name
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
            ParamType::Array => "array",
            ParamType::Object => "object",
            ParamType::Any => "any",
        }
    }
}

impl std::fmt::Display for ParamType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declaration of a single parameter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterSpec {
    /// Expected JSON type
    #[serde(rename = "type")]
    pub param_type: ParamType,

    /// Whether the parameter must be supplied (or defaulted)
    pub required: bool,

    /// Value used when the parameter is absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    /// Human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A single field-level validation problem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Parameter name
    pub field: String,

    /// What is wrong with it
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Extracted parameters do not satisfy a tool's schema
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid parameters for '{tool_id}': {}", format_field_errors(.errors))]
pub struct ParameterValidationError {
    /// Tool whose schema rejected the parameters
    pub tool_id: String,

    /// Every problem found
    pub errors: Vec<FieldError>,
}

fn format_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Parameter schema for a tool
///
/// Parameters keep a stable (sorted) order so the JSON Schema rendering and
/// validation messages are deterministic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterSchema {
    /// Declared parameters by name
    #[serde(default)]
    pub parameters: BTreeMap<String, ParameterSpec>,

    /// Reject parameters the schema does not declare
    #[serde(default = "default_strict")]
    pub strict: bool,
}

fn default_strict() -> bool {
    true
}

impl Default for ParameterSchema {
    fn default() -> Self {
        Self::new()
    }
}

impl ParameterSchema {
    /// Create an empty strict schema (tool takes no parameters)
    pub fn new() -> Self {
        Self {
            parameters: BTreeMap::new(),
            strict: true,
        }
    }

    /// Declare a required parameter
    pub fn required(mut self, name: impl Into<String>, param_type: ParamType) -> Self {
        self.parameters.insert(
            name.into(),
            ParameterSpec {
                param_type,
                required: true,
                default: None,
                description: None,
            },
        );
        self
    }

    /// Declare an optional parameter with an optional default
    pub fn optional(
        mut self,
        name: impl Into<String>,
        param_type: ParamType,
        default: Option<Value>,
    ) -> Self {
        self.parameters.insert(
            name.into(),
            ParameterSpec {
                param_type,
                required: false,
                default,
                description: None,
            },
        );
        self
    }

    /// Attach a description to an already declared parameter
    pub fn describe(mut self, name: &str, description: impl Into<String>) -> Self {
        if let Some(spec) = self.parameters.get_mut(name) {
            spec.description = Some(description.into());
        }
        self
    }

    /// Set strict mode
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Look up a parameter declaration
    pub fn get(&self, name: &str) -> Option<&ParameterSpec> {
        self.parameters.get(name)
    }

    /// Check if the schema declares no parameters
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Validate extracted parameters, filling in defaults
    ///
    /// Returns the completed parameter set, or every problem found.
    pub fn validate(
        &self,
        tool_id: &str,
        mut params: Parameters,
    ) -> Result<Parameters, ParameterValidationError> {
        let mut errors = Vec::new();

        for (name, spec) in &self.parameters {
            match params.get(name) {
                Some(value) => {
                    if !spec.param_type.accepts(value) {
                        errors.push(FieldError::new(
                            name,
                            format!("expected {}, got {}", spec.param_type, json_type_name(value)),
                        ));
                    }
                }
                None => match &spec.default {
                    Some(default) => {
                        params.insert(name.clone(), default.clone());
                    }
                    None if spec.required => {
                        errors.push(FieldError::new(name, "required parameter is missing"));
                    }
                    None => {}
                },
            }
        }

        if self.strict {
            for name in params.keys() {
                if !self.parameters.contains_key(name) {
                    errors.push(FieldError::new(name, "unknown parameter"));
                }
            }
        }

        if errors.is_empty() {
            Ok(params)
        } else {
            Err(ParameterValidationError {
                tool_id: tool_id.to_string(),
                errors,
            })
        }
    }

    /// Render as a JSON Schema object (for extractors and tool listings)
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for (name, spec) in &self.parameters {
            let mut property = Map::new();
            if spec.param_type != ParamType::Any {
                property.insert("type".into(), Value::String(spec.param_type.as_str().into()));
            }
            if let Some(description) = &spec.description {
                property.insert("description".into(), Value::String(description.clone()));
            }
            if let Some(default) = &spec.default {
                property.insert("default".into(), default.clone());
            }
            properties.insert(name.clone(), Value::Object(property));

            if spec.required {
                required.push(Value::String(name.clone()));
            }
        }

        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": !self.strict,
        })
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
