//! Generic argument binder
//!
//! Checks a raw argument map against a tool's declared parameters before
//! the handler runs, so handlers only ever see validated arguments.

use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

use super::{ParamSpec, ParamType, ToolError};

/// Reasons an argument map does not fit a parameter schema
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BindError {
    #[error("missing required argument '{param}'")]
    MissingArgument { param: String },

    #[error("argument '{param}' must be {expected}, got {found}")]
    TypeMismatch {
        param: String,
        expected: ParamType,
        found: String,
    },
}

/// Arguments that passed binding, keyed by parameter name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolArguments {
    values: HashMap<String, Value>,
}

impl ToolArguments {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// A string argument the schema declares as required
    pub fn str(&self, name: &str) -> Result<&str, ToolError> {
        self.opt_str(name)
            .ok_or_else(|| ToolError::InvalidArgument(format!("'{}' must be a string", name)))
    }

    pub fn opt_str(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(|v| v.as_str())
    }

    pub fn opt_i64(&self, name: &str) -> Option<i64> {
        self.values.get(name).and_then(|v| v.as_i64())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Bind an argument map onto a parameter schema
///
/// `null` counts as absent. Values are never coerced between types.
/// Arguments the schema does not declare are dropped.
pub fn bind(
    params: &[ParamSpec],
    arguments: &HashMap<String, Value>,
) -> Result<ToolArguments, BindError> {
    let mut values = HashMap::with_capacity(params.len());

    for param in params {
        match arguments.get(&param.name).filter(|v| !v.is_null()) {
            Some(value) => {
                if !param.param_type.accepts(value) {
                    return Err(BindError::TypeMismatch {
                        param: param.name.clone(),
                        expected: param.param_type,
                        found: json_type_name(value).to_string(),
                    });
                }
                values.insert(param.name.clone(), value.clone());
            }
            None if param.required => {
                return Err(BindError::MissingArgument {
                    param: param.name.clone(),
                });
            }
            None => {
                if let Some(default) = &param.default {
                    values.insert(param.name.clone(), default.clone());
                }
            }
        }
    }

    for name in arguments.keys() {
        if !params.iter().any(|p| &p.name == name) {
            debug!("Ignoring undeclared argument '{}'", name);
        }
    }

    Ok(ToolArguments { values })
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "fractional number",
        Value::Number(n) if !n.is_i64() => "integer out of range",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
