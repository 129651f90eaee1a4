//! Typed tool parameter descriptors and argument validation.
//!
//! Each tool declares a closed set of [`ParamSpec`]s.  Raw payloads from
//! the model are checked against it before any handler runs, so a
//! handler only ever sees a fully validated [`ToolArgs`].

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};

use crate::error::ToolError;

/// Primitive type of a tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    /// Non-empty string.
    String,
    /// Finite, non-negative number.
    Number,
}

impl ParamType {
    fn json_type(self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Number => "number",
        }
    }
}

/// One declared parameter.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: String,
    pub ty: ParamType,
    pub required: bool,
    pub description: String,
}

/// Name, description and parameter schema of one tool.
#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub params: Vec<ParamSpec>,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            params: Vec::new(),
        }
    }

    pub fn required(self, name: &str, ty: ParamType, description: &str) -> Self {
        self.param(name, ty, true, description)
    }

    pub fn optional(self, name: &str, ty: ParamType, description: &str) -> Self {
        self.param(name, ty, false, description)
    }

    fn param(mut self, name: &str, ty: ParamType, required: bool, description: &str) -> Self {
        self.params.push(ParamSpec {
            name: name.to_string(),
            ty,
            required,
            description: description.to_string(),
        });
        self
    }

    /// Render as a realtime function definition.
    pub fn function_def(&self) -> Value {
        let mut properties = Map::new();
        for p in &self.params {
            properties.insert(
                p.name.clone(),
                json!({ "type": p.ty.json_type(), "description": p.description }),
            );
        }
        let required: Vec<&str> = self
            .params
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();
        json!({
            "type": "function",
            "name": self.name,
            "description": self.description,
            "parameters": {
                "type": "object",
                "properties": properties,
                "required": required,
            },
        })
    }

    /// Validate a raw argument object against the declared parameters.
    ///
    /// Fails on the first violation; nothing is returned for a partially
    /// valid payload.
    pub fn validate(&self, raw: &Value) -> Result<ToolArgs, ToolError> {
        let empty = Map::new();
        let obj = match raw {
            Value::Object(map) => map,
            Value::Null => &empty,
            _ => return Err(ToolError::invalid("arguments", "must be a JSON object")),
        };

        if let Some(unknown) = obj
            .keys()
            .find(|k| !self.params.iter().any(|p| &p.name == *k))
        {
            return Err(ToolError::invalid(unknown.as_str(), "is not a known parameter"));
        }

        let mut values = BTreeMap::new();
        for spec in &self.params {
            let value = match obj.get(&spec.name) {
                None | Some(Value::Null) if spec.required => {
                    return Err(ToolError::invalid(&spec.name, "is required"));
                }
                None | Some(Value::Null) => continue,
                Some(v) => v,
            };
            let checked = match spec.ty {
                ParamType::String => match value.as_str() {
                    Some(s) if !s.trim().is_empty() => ArgValue::Text(s.trim().to_string()),
                    Some(_) => return Err(ToolError::invalid(&spec.name, "must not be empty")),
                    None => return Err(ToolError::invalid(&spec.name, "must be a string")),
                },
                ParamType::Number => match value.as_f64() {
                    Some(n) if n.is_finite() && n >= 0.0 => ArgValue::Number(n),
                    _ => {
                        return Err(ToolError::invalid(
                            &spec.name,
                            "must be a non-negative number",
                        ))
                    }
                },
            };
            values.insert(spec.name.clone(), checked);
        }
        Ok(ToolArgs { values })
    }
}

/// Parse the wire payload (a JSON-encoded object) into a `Value`.
///
/// An empty payload counts as `{}`.
pub fn parse_arguments(raw: &str) -> Result<Value, ToolError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(Value::Object(Map::new()));
    }
    serde_json::from_str(raw).map_err(|_| ToolError::invalid("arguments", "are not valid JSON"))
}

/// A validated argument value.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Text(String),
    Number(f64),
}

/// Validated arguments, keyed by parameter name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolArgs {
    values: BTreeMap<String, ArgValue>,
}

impl ToolArgs {
    pub fn text(&self, name: &str) -> Option<&str> {
        match self.values.get(name) {
            Some(ArgValue::Text(s)) => Some(s),
            _ => None,
        }
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        match self.values.get(name) {
            Some(ArgValue::Number(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
