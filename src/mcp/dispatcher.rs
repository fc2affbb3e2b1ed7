//! Tool call dispatch
//!
//! Routes a `tools/call` request to the matching registry entry, binds the
//! arguments against the tool's declared schema and wraps whatever happens
//! into either text content or a fault. Nothing a caller sends can make
//! this panic out or abort the server.

use serde_json::Value;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, warn};

use crate::mcp::protocol::{Fault, FaultKind, ToolCallResult};
use crate::registry::{self, BindError, ToolRegistry};

/// Server-side router from tool name to handler
pub struct Dispatcher {
    registry: ToolRegistry,
}

impl Dispatcher {
    pub fn new(registry: ToolRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Run one tool call to completion
    pub fn dispatch(
        &self,
        name: &str,
        arguments: &HashMap<String, Value>,
    ) -> Result<ToolCallResult, Fault> {
        let tool = self.registry.resolve(name).map_err(|_| {
            debug!("Call to unknown tool '{}'", name);
            Fault::new(FaultKind::NotFound, format!("Unknown tool: {}", name))
        })?;

        // Validation happens before the handler runs, so a bad call has no side effects
        let bound = registry::bind(&tool.descriptor.parameters, arguments).map_err(|e| {
            let kind = match e {
                BindError::MissingArgument { .. } => FaultKind::MissingArgument,
                BindError::TypeMismatch { .. } => FaultKind::TypeMismatch,
            };
            Fault::new(kind, format!("{}: {}", name, e))
        })?;

        debug!("Invoking tool '{}' with {} arguments", name, bound.len());

        let handler = tool.handler.clone();
        match panic::catch_unwind(AssertUnwindSafe(|| handler(&bound))) {
            Ok(Ok(text)) => Ok(ToolCallResult::text(text)),
            Ok(Err(e)) => {
                debug!("Tool '{}' failed: {}", name, e);
                Err(Fault::new(FaultKind::ToolFailed, e.to_string()))
            }
            Err(payload) => {
                let detail = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                warn!("Tool '{}' panicked: {}", name, detail);
                Err(Fault::new(
                    FaultKind::ToolFailed,
                    format!("tool '{}' failed unexpectedly: {}", name, detail),
                ))
            }
        }
    }
}
