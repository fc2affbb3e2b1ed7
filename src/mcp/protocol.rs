//! MCP (Model Context Protocol) message structures and JSON-RPC codec
//!
//! This module defines the JSON-RPC 2.0 messages that the client and the
//! server exchange, one per frame, and the typed payloads carried by the
//! `initialize`, `tools/list` and `tools/call` methods.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

use super::ProtocolError;
use crate::registry::ToolDescriptor;

/// MCP protocol version we support
pub const MCP_VERSION: &str = "2024-11-05";

/// JSON-RPC version tag carried by every message
pub const JSONRPC_VERSION: &str = "2.0";

/// Method names used on the wire
pub mod methods {
    pub const INITIALIZE: &str = "initialize";
    pub const INITIALIZED: &str = "notifications/initialized";
    pub const PING: &str = "ping";
    pub const TOOLS_LIST: &str = "tools/list";
    pub const TOOLS_CALL: &str = "tools/call";
}

/// Correlation token of a request
///
/// The client allocates numbers; strings are accepted from other peers.
/// `Null` only appears on error responses to frames that could not be
/// parsed far enough to recover an id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
    Null,
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{}", n),
            RequestId::String(s) => write!(f, "{:?}", s),
            RequestId::Null => write!(f, "null"),
        }
    }
}

/// JSON-RPC error information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    /// Error code (standard JSON-RPC codes or the application codes below)
    pub code: i32,
    /// Human-readable error message
    pub message: String,
    /// Additional error details
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

/// One protocol message, as carried by a single frame
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// A call that expects a response with the same id
    Request {
        id: RequestId,
        method: String,
        params: Option<Value>,
    },
    /// A one-way message; never answered
    Notification {
        method: String,
        params: Option<Value>,
    },
    /// The answer to a request
    Response {
        id: RequestId,
        outcome: Result<Value, RpcError>,
    },
}

impl Message {
    pub fn request(id: RequestId, method: &str, params: Option<Value>) -> Self {
        Message::Request {
            id,
            method: method.to_string(),
            params,
        }
    }

    pub fn notification(method: &str, params: Option<Value>) -> Self {
        Message::Notification {
            method: method.to_string(),
            params,
        }
    }

    /// Create a successful response
    pub fn success(id: RequestId, result: Value) -> Self {
        Message::Response {
            id,
            outcome: Ok(result),
        }
    }

    /// Create an error response
    pub fn error(id: RequestId, error: RpcError) -> Self {
        Message::Response {
            id,
            outcome: Err(error),
        }
    }
}

/// Wire shape shared by all message kinds, used for decoding
///
/// `id` and `result` use `present` so that an explicit `null` is kept
/// apart from a missing field. Fields we do not know are ignored.
#[derive(Debug, Deserialize)]
struct RawMessage {
    #[serde(default)]
    jsonrpc: Option<String>,
    #[serde(default, deserialize_with = "present")]
    id: Option<Value>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

fn present<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

/// Encode a message as a single-line JSON frame
pub fn encode(message: &Message) -> Result<String, ProtocolError> {
    let value = match message {
        Message::Request { id, method, params } => {
            let mut obj = json!({ "jsonrpc": JSONRPC_VERSION, "id": id, "method": method });
            if let Some(params) = params {
                obj["params"] = params.clone();
            }
            obj
        }
        Message::Notification { method, params } => {
            let mut obj = json!({ "jsonrpc": JSONRPC_VERSION, "method": method });
            if let Some(params) = params {
                obj["params"] = params.clone();
            }
            obj
        }
        Message::Response { id, outcome } => match outcome {
            Ok(result) => json!({ "jsonrpc": JSONRPC_VERSION, "id": id, "result": result }),
            Err(error) => json!({ "jsonrpc": JSONRPC_VERSION, "id": id, "error": error }),
        },
    };

    serde_json::to_string(&value)
        .map_err(|e| ProtocolError::new(format!("failed to serialize message: {}", e), ""))
}

/// Decode one frame into a message
pub fn decode(frame: &str) -> Result<Message, ProtocolError> {
    if frame.trim().is_empty() {
        return Err(ProtocolError::new("empty frame", frame));
    }

    let value: Value = serde_json::from_str(frame)
        .map_err(|e| ProtocolError::new(format!("invalid JSON: {}", e), frame))?;

    if !value.is_object() {
        return Err(ProtocolError::new("message is not a JSON object", frame));
    }

    let raw: RawMessage = serde_json::from_value(value)
        .map_err(|e| ProtocolError::new(format!("malformed message: {}", e), frame))?;

    if let Some(version) = &raw.jsonrpc {
        if version != JSONRPC_VERSION {
            return Err(ProtocolError::new(
                format!("unsupported jsonrpc version '{}'", version),
                frame,
            ));
        }
    }

    let id = match raw.id {
        Some(value) => Some(
            serde_json::from_value::<RequestId>(value)
                .map_err(|_| ProtocolError::new("id must be a number, a string or null", frame))?,
        ),
        None => None,
    };

    match (raw.method, id) {
        (Some(method), Some(id)) => Ok(Message::Request {
            id,
            method,
            params: raw.params,
        }),
        (Some(method), None) => Ok(Message::Notification {
            method,
            params: raw.params,
        }),
        (None, Some(id)) => match (raw.error, raw.result) {
            (Some(error), _) => Ok(Message::Response { id, outcome: Err(error) }),
            (None, Some(result)) => Ok(Message::Response { id, outcome: Ok(result) }),
            (None, None) => Err(ProtocolError::new(
                "response has neither result nor error",
                frame,
            )),
        },
        (None, None) => Err(ProtocolError::new(
            "message is neither a request, a notification nor a response",
            frame,
        )),
    }
}

/// MCP tool call parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallParams {
    /// Name of the tool to call (e.g., "Echo")
    pub name: String,
    /// Arguments to pass to the tool
    #[serde(default)]
    pub arguments: HashMap<String, Value>,
}

/// MCP tool call result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResult {
    /// Tool execution results
    pub content: Vec<ToolContent>,
    /// Whether this is an error result
    #[serde(default)]
    pub is_error: bool,
}

impl ToolCallResult {
    /// Create a successful tool result with text content
    pub fn text(text: String) -> Self {
        Self {
            content: vec![ToolContent::text(text)],
            is_error: false,
        }
    }
}

/// Content returned by a tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolContent {
    /// Type of content (usually "text")
    #[serde(rename = "type")]
    pub content_type: String,
    /// The actual content/result
    #[serde(default)]
    pub text: String,
}

impl ToolContent {
    pub fn text(text: String) -> Self {
        Self {
            content_type: "text".to_string(),
            text,
        }
    }
}

/// A tool as advertised by `tools/list`
///
/// The ordered parameter list is what clients bind against; `inputSchema`
/// carries the same information as JSON Schema for generic MCP clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    #[serde(flatten)]
    pub descriptor: ToolDescriptor,
    #[serde(rename = "inputSchema", default)]
    pub input_schema: Value,
}

impl From<&ToolDescriptor> for ToolDefinition {
    fn from(descriptor: &ToolDescriptor) -> Self {
        Self {
            descriptor: descriptor.clone(),
            input_schema: descriptor.input_schema(),
        }
    }
}

/// Result of `tools/list`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListToolsResult {
    pub tools: Vec<ToolDefinition>,
}

/// MCP server capabilities
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerCapabilities {
    /// Tools that this server provides
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolsCapability>,
}

/// Tools capability information
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolsCapability {
    /// Whether the tool list may change at runtime (never, for us)
    #[serde(default)]
    pub list_changed: bool,
}

/// MCP initialization request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    /// MCP protocol version the client supports
    pub protocol_version: String,
    /// Capabilities the client supports
    #[serde(default)]
    pub capabilities: Value,
    /// Client information
    #[serde(default)]
    pub client_info: Option<PeerInfo>,
}

/// Name and version of either peer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerInfo {
    pub name: String,
    pub version: String,
}

/// MCP initialization response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    /// MCP protocol version the server speaks
    pub protocol_version: String,
    /// Server capabilities
    #[serde(default)]
    pub capabilities: ServerCapabilities,
    /// Information about the server
    pub server_info: PeerInfo,
}

// JSON-RPC error codes
pub mod error_codes {
    /// Parse error - Invalid JSON was received by the server
    pub const PARSE_ERROR: i32 = -32700;
    /// Invalid Request - The JSON sent is not a valid Request object
    pub const INVALID_REQUEST: i32 = -32600;
    /// Method not found - The requested method doesn't exist
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Invalid parameters - Method exists but parameters are wrong
    pub const INVALID_PARAMS: i32 = -32602;
    /// Internal error - Internal JSON-RPC error
    pub const INTERNAL_ERROR: i32 = -32603;

    // Application-specific error codes (-32000 to -32099)
    /// No tool is registered under the requested name
    pub const TOOL_NOT_FOUND: i32 = -32001;
    /// A required tool parameter was not supplied
    pub const MISSING_ARGUMENT: i32 = -32002;
    /// A tool argument has the wrong type
    pub const TYPE_MISMATCH: i32 = -32003;
    /// The tool handler reported an error
    pub const TOOL_FAILED: i32 = -32004;
    /// A tool method was called before `initialize`
    pub const NOT_INITIALIZED: i32 = -32005;
}

/// Category of an application-level failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    NotFound,
    MissingArgument,
    TypeMismatch,
    ToolFailed,
    /// Any other error response (bad params, not initialized, ...)
    Rejected,
}

impl FaultKind {
    pub fn code(self) -> i32 {
        match self {
            FaultKind::NotFound => error_codes::TOOL_NOT_FOUND,
            FaultKind::MissingArgument => error_codes::MISSING_ARGUMENT,
            FaultKind::TypeMismatch => error_codes::TYPE_MISMATCH,
            FaultKind::ToolFailed => error_codes::TOOL_FAILED,
            FaultKind::Rejected => error_codes::INVALID_REQUEST,
        }
    }

    pub fn from_code(code: i32) -> Self {
        match code {
            error_codes::TOOL_NOT_FOUND => FaultKind::NotFound,
            error_codes::MISSING_ARGUMENT => FaultKind::MissingArgument,
            error_codes::TYPE_MISMATCH => FaultKind::TypeMismatch,
            error_codes::TOOL_FAILED => FaultKind::ToolFailed,
            _ => FaultKind::Rejected,
        }
    }
}

/// An application-level error carried inside a well-formed response
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct Fault {
    pub kind: FaultKind,
    pub message: String,
}

impl Fault {
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<&Fault> for RpcError {
    fn from(fault: &Fault) -> Self {
        RpcError::new(fault.kind.code(), fault.message.clone())
    }
}

impl From<RpcError> for Fault {
    fn from(error: RpcError) -> Self {
        Fault::new(FaultKind::from_code(error.code), error.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_arguments_round_trip() {
        let arguments = json!({
            "text": "MCP!",
            "int": 42,
            "negative": -7,
            "big": u64::MAX,
            "float": 1.5,
            "flag": true,
            "nothing": null
        });
        let request = Message::request(
            RequestId::Number(7),
            methods::TOOLS_CALL,
            Some(json!({ "name": "Echo", "arguments": arguments })),
        );

        let frame = encode(&request).unwrap();
        assert!(!frame.contains('\n'));

        let decoded = decode(&frame).unwrap();
        assert_eq!(decoded, request);

        if let Message::Request { params: Some(params), .. } = decoded {
            assert_eq!(params["arguments"]["big"].as_u64(), Some(u64::MAX));
            assert_eq!(params["arguments"]["float"].as_f64(), Some(1.5));
            assert!(params["arguments"]["nothing"].is_null());
        } else {
            panic!("expected a request");
        }
    }

    #[test]
    fn test_decode_notification_and_string_id() {
        let notification = decode(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#).unwrap();
        assert_eq!(notification, Message::notification(methods::INITIALIZED, None));

        let request = decode(r#"{"jsonrpc":"2.0","id":"abc","method":"ping"}"#).unwrap();
        assert_eq!(request, Message::request(RequestId::String("abc".into()), "ping", None));
    }

    #[test]
    fn test_decode_responses() {
        let ok = decode(r#"{"jsonrpc":"2.0","id":3,"result":null}"#).unwrap();
        assert_eq!(ok, Message::success(RequestId::Number(3), Value::Null));

        let err = decode(r#"{"jsonrpc":"2.0","id":null,"error":{"code":-32700,"message":"bad"}}"#).unwrap();
        assert_eq!(
            err,
            Message::error(RequestId::Null, RpcError::new(error_codes::PARSE_ERROR, "bad"))
        );
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let frame = r#"{"jsonrpc":"2.0","id":1,"method":"tools/list","extra":{"x":1},"_meta":true}"#;
        let message = decode(frame).unwrap();
        assert_eq!(message, Message::request(RequestId::Number(1), "tools/list", None));
    }

    #[test]
    fn test_empty_frame_is_protocol_error() {
        let err = decode("   ").unwrap_err();
        assert_eq!(err.reason, "empty frame");
    }

    #[test]
    fn test_non_conforming_frames_carry_fragment() {
        let err = decode("{not json").unwrap_err();
        assert_eq!(err.fragment, "{not json");

        let err = decode("[1,2,3]").unwrap_err();
        assert!(err.reason.contains("not a JSON object"));

        let err = decode(r#"{"jsonrpc":"2.0"}"#).unwrap_err();
        assert!(err.reason.contains("neither"));

        let err = decode(r#"{"jsonrpc":"2.0","id":1}"#).unwrap_err();
        assert!(err.reason.contains("neither result nor error"));

        let err = decode(r#"{"jsonrpc":"1.0","id":1,"method":"ping"}"#).unwrap_err();
        assert!(err.reason.contains("unsupported jsonrpc version"));

        let err = decode(r#"{"id":{"nested":true},"method":"ping"}"#).unwrap_err();
        assert!(err.reason.contains("id must be"));
    }

    #[test]
    fn test_fault_rpc_error_mapping() {
        let fault = Fault::new(FaultKind::MissingArgument, "missing required argument 'message'");
        let rpc: RpcError = (&fault).into();
        assert_eq!(rpc.code, error_codes::MISSING_ARGUMENT);

        let back: Fault = rpc.into();
        assert_eq!(back, fault);

        let other: Fault = RpcError::new(error_codes::METHOD_NOT_FOUND, "nope").into();
        assert_eq!(other.kind, FaultKind::Rejected);
    }

    #[test]
    fn test_tool_call_result_wire_shape() {
        let result = ToolCallResult::text("hello MCP!".to_string());
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(
            value,
            json!({ "content": [{ "type": "text", "text": "hello MCP!" }], "isError": false })
        );
    }
}
