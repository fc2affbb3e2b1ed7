//! MCP protocol implementation
//!
//! This module handles the Model Context Protocol communication:
//! line framing over stdio, JSON-RPC message encoding, tool call
//! dispatch on the server side and the client session that drives it.

pub mod client;
pub mod dispatcher;
pub mod protocol;
pub mod server;
pub mod transport;

use thiserror::Error;

// Re-export main types
pub use client::{ClientError, ClientSession, SessionOptions, ToolOutput, ToolSession};
pub use dispatcher::Dispatcher;
pub use protocol::{Fault, FaultKind, Message, RequestId, RpcError};
pub use server::McpServer;
pub use transport::{FrameReader, FrameWriter, ServerCommand, SpawnedServer};

/// Errors raised by the byte channel between the two processes
#[derive(Error, Debug)]
pub enum TransportError {
    /// The peer exited, the pipe broke or the stream reached end of input
    #[error("transport closed")]
    Closed,

    /// A frame on the wire could not be delimited or decoded as text
    #[error("framing error: {reason}")]
    Framing { reason: String },

    /// The server process could not be started
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// A frame that is well delimited but is not a valid protocol message
#[derive(Error, Debug, Clone, PartialEq)]
#[error("protocol error: {reason} (frame: {fragment:?})")]
pub struct ProtocolError {
    /// What was wrong with the frame
    pub reason: String,
    /// The offending frame, truncated for diagnostics
    pub fragment: String,
}

impl ProtocolError {
    /// Longest fragment kept in an error, in characters
    const MAX_FRAGMENT_CHARS: usize = 200;

    pub fn new(reason: impl Into<String>, frame: &str) -> Self {
        let fragment = if frame.chars().count() > Self::MAX_FRAGMENT_CHARS {
            let mut cut: String = frame.chars().take(Self::MAX_FRAGMENT_CHARS).collect();
            cut.push_str("...");
            cut
        } else {
            frame.to_string()
        };

        Self {
            reason: reason.into(),
            fragment,
        }
    }
}
