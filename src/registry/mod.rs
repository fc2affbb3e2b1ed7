//! Tool registry
//!
//! The registry is the flat lookup table the server dispatches through:
//! each entry pairs a [`ToolDescriptor`] (name, description, ordered
//! parameter schema) with a handler closure. It is built once at startup
//! and never changes afterwards.

pub mod binding;

pub use binding::*;

use schemars::schema::{InstanceType, Metadata, ObjectValidation, Schema, SchemaObject};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while building or querying the registry
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("duplicate tool name: {0}")]
    DuplicateToolName(String),

    #[error("unknown tool: {0}")]
    NotFound(String),
}

/// Errors a tool handler can report
///
/// These are application-level failures: the dispatcher turns them into a
/// fault response carrying the display text.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("unsafe file path: {path}")]
    UnsafePath { path: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("failed to access '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Type tag of a tool parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Number,
    Integer,
    Boolean,
}

impl ParamType {
    /// Whether a JSON value has exactly this type (no coercion)
    ///
    /// `integer` covers the `i64` range only.
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Number => value.is_number(),
            ParamType::Integer => value.is_i64(),
            ParamType::Boolean => value.is_boolean(),
        }
    }

    fn instance_type(self) -> InstanceType {
        match self {
            ParamType::String => InstanceType::String,
            ParamType::Number => InstanceType::Number,
            ParamType::Integer => InstanceType::Integer,
            ParamType::Boolean => InstanceType::Boolean,
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ParamType::String => "string",
            ParamType::Number => "number",
            ParamType::Integer => "integer",
            ParamType::Boolean => "boolean",
        };
        f.write_str(name)
    }
}

/// One declared parameter of a tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    /// Parameter name as used in the argument map
    pub name: String,
    /// Expected value type
    #[serde(rename = "type")]
    pub param_type: ParamType,
    /// Whether the caller must supply it
    #[serde(default)]
    pub required: bool,
    /// Human-readable description
    #[serde(default)]
    pub description: String,
    /// Value bound when an optional parameter is absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl ParamSpec {
    pub fn required(name: &str, param_type: ParamType, description: &str) -> Self {
        Self {
            name: name.to_string(),
            param_type,
            required: true,
            description: description.to_string(),
            default: None,
        }
    }

    pub fn optional(name: &str, param_type: ParamType, description: &str) -> Self {
        Self {
            required: false,
            ..Self::required(name, param_type, description)
        }
    }

    /// Set the value used when the argument is absent
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }
}

/// Name, description and parameter schema of a tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Unique, case-sensitive identifier (e.g., "Echo")
    pub name: String,
    /// Human-readable description
    pub description: String,
    /// Parameters in declaration order
    #[serde(default)]
    pub parameters: Vec<ParamSpec>,
}

impl ToolDescriptor {
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            parameters: Vec::new(),
        }
    }

    /// Append a parameter to the schema
    pub fn param(mut self, spec: ParamSpec) -> Self {
        self.parameters.push(spec);
        self
    }

    /// Render the parameter list as a JSON Schema object
    pub fn input_schema(&self) -> Value {
        let mut object = ObjectValidation::default();

        for param in &self.parameters {
            let property = SchemaObject {
                metadata: Some(Box::new(Metadata {
                    description: Some(param.description.clone()),
                    default: param.default.clone(),
                    ..Default::default()
                })),
                instance_type: Some(param.param_type.instance_type().into()),
                ..Default::default()
            };
            object.properties.insert(param.name.clone(), Schema::Object(property));

            if param.required {
                object.required.insert(param.name.clone());
            }
        }

        let schema = SchemaObject {
            instance_type: Some(InstanceType::Object.into()),
            object: Some(Box::new(object)),
            ..Default::default()
        };

        serde_json::to_value(&schema).unwrap_or_else(|_| json!({ "type": "object" }))
    }
}

/// Handler invoked with validated arguments; returns the text result
pub type ToolHandler = Arc<dyn Fn(&ToolArguments) -> Result<String, ToolError> + Send + Sync>;

/// A registered tool: its descriptor plus the handler to run
#[derive(Clone)]
pub struct Tool {
    pub descriptor: ToolDescriptor,
    pub handler: ToolHandler,
}

impl Tool {
    pub fn new<F>(descriptor: ToolDescriptor, handler: F) -> Self
    where
        F: Fn(&ToolArguments) -> Result<String, ToolError> + Send + Sync + 'static,
    {
        Self {
            descriptor,
            handler: Arc::new(handler),
        }
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }
}

impl fmt::Debug for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tool")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

/// Read-only table of tools, in registration order
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    tools: Vec<Tool>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    /// Build the registry, rejecting the first repeated tool name
    pub fn new(tools: Vec<Tool>) -> Result<Self, RegistryError> {
        let mut index = HashMap::with_capacity(tools.len());

        for (position, tool) in tools.iter().enumerate() {
            if index.insert(tool.name().to_string(), position).is_some() {
                return Err(RegistryError::DuplicateToolName(tool.name().to_string()));
            }
        }

        tracing::debug!("Registered {} tools", tools.len());
        Ok(Self { tools, index })
    }

    /// Descriptors of every tool, in registration order
    pub fn list(&self) -> Vec<&ToolDescriptor> {
        self.tools.iter().map(|t| &t.descriptor).collect()
    }

    /// Look a tool up by exact name
    pub fn resolve(&self, name: &str) -> Result<&Tool, RegistryError> {
        self.index
            .get(name)
            .map(|&position| &self.tools[position])
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
