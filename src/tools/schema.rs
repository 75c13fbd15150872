//! Parameter specs and deterministic JSON schema derivation.
//!
//! Operations declare their parameters explicitly; there is no reflection.
//! Derivation is a pure function of the declared specs, so identical specs
//! always produce byte-identical schema documents (`serde_json::Map` keeps
//! its keys sorted, so properties serialize in a deterministic order).

use serde_json::{json, Map, Value};

use crate::error::{ConnectorError, Result};

/// JSON parameter type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl ParamType {
    pub fn json_name(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
            ParamType::Array => "array",
            ParamType::Object => "object",
        }
    }

    fn matches(&self, value: &Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Integer => value.is_i64() || value.is_u64(),
            // Integers are acceptable where numbers are expected
            ParamType::Number => value.is_number(),
            ParamType::Boolean => value.is_boolean(),
            ParamType::Array => value.is_array(),
            ParamType::Object => value.is_object(),
        }
    }
}

/// Declaration of a single tool parameter.
#[derive(Clone, Debug)]
pub struct ParamSpec {
    name: String,
    param_type: ParamType,
    description: String,
    required: bool,
    default: Option<Value>,
    one_of: Option<Vec<Value>>,
}

impl ParamSpec {
    pub fn required(
        name: impl Into<String>,
        param_type: ParamType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            param_type,
            description: description.into(),
            required: true,
            default: None,
            one_of: None,
        }
    }

    pub fn optional(
        name: impl Into<String>,
        param_type: ParamType,
        description: impl Into<String>,
    ) -> Self {
        let mut spec = Self::required(name, param_type, description);
        spec.required = false;
        spec
    }

    /// Default applied when an optional parameter is omitted.
    pub fn default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    /// Restricts accepted values to a fixed set (JSON schema `enum`).
    pub fn one_of(mut self, values: Vec<Value>) -> Self {
        self.one_of = Some(values);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_required(&self) -> bool {
        self.required
    }
}

/// Declared parameters for one tool, in declaration order.
#[derive(Clone, Debug, Default)]
pub struct ToolSchema {
    params: Vec<ParamSpec>,
}

impl ToolSchema {
    pub fn new(params: Vec<ParamSpec>) -> Self {
        Self { params }
    }

    /// Schema with no parameters; validation accepts only `{}`.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    /// Derives a JSON schema object. Deterministic: identical specs yield
    /// byte-identical serialized output.
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for p in &self.params {
            let mut prop = Map::new();
            prop.insert("type".to_string(), json!(p.param_type.json_name()));
            prop.insert("description".to_string(), json!(p.description));
            if let Some(values) = &p.one_of {
                prop.insert("enum".to_string(), Value::Array(values.clone()));
            }
            if let Some(default) = &p.default {
                prop.insert("default".to_string(), default.clone());
            }
            properties.insert(p.name.clone(), Value::Object(prop));
            if p.required {
                required.push(json!(p.name));
            }
        }
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Validates arguments against the declared specs.
    ///
    /// Returns the effective arguments: declared defaults filled in for
    /// omitted optionals. Fails on a non-object argument value, a missing
    /// required parameter, an undeclared key, a type mismatch, or a value
    /// outside a declared enum. Validation failure means the handler is
    /// never invoked.
    pub fn validate(&self, tool: &str, arguments: &Value) -> Result<Map<String, Value>> {
        let invalid = |message: String| ConnectorError::ToolArgument {
            tool: tool.to_string(),
            message,
        };

        let supplied = arguments
            .as_object()
            .ok_or_else(|| invalid(format!("arguments must be an object, got {}", arguments)))?;

        for key in supplied.keys() {
            if !self.params.iter().any(|p| &p.name == key) {
                return Err(invalid(format!("unknown parameter '{}'", key)));
            }
        }

        let mut effective = Map::new();
        for p in &self.params {
            match supplied.get(&p.name) {
                Some(value) => {
                    if !p.param_type.matches(value) {
                        return Err(invalid(format!(
                            "parameter '{}' must be of type {}",
                            p.name,
                            p.param_type.json_name()
                        )));
                    }
                    if let Some(allowed) = &p.one_of {
                        if !allowed.contains(value) {
                            return Err(invalid(format!(
                                "parameter '{}' must be one of {}",
                                p.name,
                                Value::Array(allowed.clone())
                            )));
                        }
                    }
                    effective.insert(p.name.clone(), value.clone());
                }
                None if p.required => {
                    return Err(invalid(format!("missing required parameter '{}'", p.name)));
                }
                None => {
                    if let Some(default) = &p.default {
                        effective.insert(p.name.clone(), default.clone());
                    }
                }
            }
        }
        Ok(effective)
    }
}
