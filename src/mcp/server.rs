//! MCP server loop
//!
//! This module implements the server side of the protocol:
//! 1. Reads one JSON-RPC frame at a time from the transport
//! 2. Routes `initialize`, `tools/list` and `tools/call` to the dispatcher
//! 3. Writes exactly one response frame per request before reading the next

use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, error, info, warn};

use crate::mcp::dispatcher::Dispatcher;
use crate::mcp::protocol::*;
use crate::mcp::transport::{FrameReader, FrameWriter};
use crate::mcp::TransportError;
use crate::ServerError;

/// Name the server reports during the handshake
pub const SERVER_NAME: &str = "MCP Demo Server";

/// MCP server that answers one client over a framed channel
pub struct McpServer {
    dispatcher: Dispatcher,
    /// Whether the client has sent `initialize`
    initialized: bool,
}

impl McpServer {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher,
            initialized: false,
        }
    }

    /// Serve requests until the peer closes its end of the channel
    pub async fn run<R, W>(
        &mut self,
        mut reader: FrameReader<R>,
        mut writer: FrameWriter<W>,
    ) -> Result<(), ServerError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        info!("Starting MCP server, waiting for JSON-RPC requests...");

        loop {
            let reply = match reader.receive().await {
                Ok(frame) => self.process_frame(&frame),
                Err(TransportError::Closed) => {
                    info!("MCP server shutting down (input closed)");
                    break;
                }
                Err(TransportError::Framing { reason }) => {
                    warn!("Dropping malformed frame: {}", reason);
                    Some(Message::error(
                        RequestId::Null,
                        RpcError::new(error_codes::PARSE_ERROR, format!("Invalid frame: {}", reason)),
                    ))
                }
                Err(e) => return Err(e.into()),
            };

            if let Some(response) = reply {
                let frame = encode(&response).map_err(|e| {
                    error!("Failed to encode response: {}", e);
                    ServerError::Protocol(e)
                })?;

                match writer.send(&frame).await {
                    Ok(()) => debug!("Sent response: {}", frame),
                    Err(TransportError::Closed) => {
                        info!("MCP server shutting down (output closed)");
                        break;
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }

        Ok(())
    }

    /// Process a single frame, returning the response to send (if any)
    pub fn process_frame(&mut self, frame: &str) -> Option<Message> {
        debug!("Processing frame: {}", frame);

        match decode(frame) {
            Ok(message) => self.handle_message(message),
            Err(e) => {
                error!("Failed to parse JSON-RPC message: {}", e);
                Some(Message::error(
                    RequestId::Null,
                    RpcError {
                        code: error_codes::PARSE_ERROR,
                        message: e.reason,
                        data: Some(json!({ "fragment": e.fragment })),
                    },
                ))
            }
        }
    }

    /// Handle a decoded message; notifications and stray responses get no reply
    pub fn handle_message(&mut self, message: Message) -> Option<Message> {
        match message {
            Message::Request { id, method, params } => Some(self.handle_request(id, &method, params)),
            Message::Notification { method, .. } => {
                match method.as_str() {
                    methods::INITIALIZED => debug!("Client finished initialization"),
                    other => debug!("Ignoring notification '{}'", other),
                }
                None
            }
            Message::Response { id, .. } => {
                warn!("Ignoring unexpected response with id {}", id);
                None
            }
        }
    }

    fn handle_request(&mut self, id: RequestId, method: &str, params: Option<Value>) -> Message {
        match method {
            methods::INITIALIZE => self.handle_initialize(id, params),
            methods::PING => Message::success(id, json!({})),
            methods::TOOLS_LIST | methods::TOOLS_CALL if !self.initialized => Message::error(
                id,
                RpcError::new(
                    error_codes::NOT_INITIALIZED,
                    format!("Server not initialized; send '{}' first", methods::INITIALIZE),
                ),
            ),
            methods::TOOLS_LIST => self.handle_tools_list(id),
            methods::TOOLS_CALL => self.handle_tools_call(id, params),
            _ => Message::error(
                id,
                RpcError::new(
                    error_codes::METHOD_NOT_FOUND,
                    format!("Method '{}' not found", method),
                ),
            ),
        }
    }

    /// Handle MCP initialization request
    fn handle_initialize(&mut self, id: RequestId, params: Option<Value>) -> Message {
        match params.map(serde_json::from_value::<InitializeParams>) {
            Some(Ok(params)) => {
                let client = params
                    .client_info
                    .map(|c| format!("{} {}", c.name, c.version))
                    .unwrap_or_else(|| "unknown client".to_string());
                info!(
                    "MCP client connected: {} (protocol {})",
                    client, params.protocol_version
                );
            }
            Some(Err(e)) => {
                return Message::error(
                    id,
                    RpcError::new(
                        error_codes::INVALID_PARAMS,
                        format!("Invalid initialize parameters: {}", e),
                    ),
                );
            }
            None => info!("MCP client connected without parameters"),
        }

        self.initialized = true;

        let result = InitializeResult {
            protocol_version: MCP_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability {
                    list_changed: false,
                }),
            },
            server_info: PeerInfo {
                name: SERVER_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };

        to_response(id, &result)
    }

    /// Handle tools/list request
    fn handle_tools_list(&self, id: RequestId) -> Message {
        let tools = self
            .dispatcher
            .registry()
            .list()
            .into_iter()
            .map(ToolDefinition::from)
            .collect();

        to_response(id, &ListToolsResult { tools })
    }

    /// Handle tools/call request
    fn handle_tools_call(&self, id: RequestId, params: Option<Value>) -> Message {
        let call = match params.map(serde_json::from_value::<ToolCallParams>) {
            Some(Ok(call)) => call,
            Some(Err(e)) => {
                return Message::error(
                    id,
                    RpcError::new(error_codes::INVALID_PARAMS, format!("Invalid parameters: {}", e)),
                );
            }
            None => {
                return Message::error(
                    id,
                    RpcError::new(error_codes::INVALID_PARAMS, "Missing parameters"),
                );
            }
        };

        match self.dispatcher.dispatch(&call.name, &call.arguments) {
            Ok(result) => to_response(id, &result),
            Err(fault) => Message::error(id, RpcError::from(&fault)),
        }
    }
}

fn to_response<T: serde::Serialize>(id: RequestId, result: &T) -> Message {
    match serde_json::to_value(result) {
        Ok(value) => Message::success(id, value),
        Err(e) => Message::error(
            id,
            RpcError::new(error_codes::INTERNAL_ERROR, format!("Failed to serialize result: {}", e)),
        ),
    }
}
