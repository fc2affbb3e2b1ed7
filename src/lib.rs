//! Public library interface for the MCP demo
//!
//! This crate contains both ends of a small Model Context Protocol setup:
//! a tool server that answers JSON-RPC over stdin/stdout, and a client
//! session that spawns that server as a child process, discovers its tools
//! and calls them.

use std::path::PathBuf;
use thiserror::Error;

pub mod console;
pub mod mcp;
pub mod registry;
pub mod tools;

// Re-export public modules and types
pub use mcp::{ClientError, ClientSession, Fault, FaultKind, ServerCommand, SessionOptions, ToolOutput, ToolSession};
pub use registry::{ParamSpec, ParamType, Tool, ToolDescriptor, ToolError, ToolRegistry, RegistryError};

use mcp::{Dispatcher, FrameReader, FrameWriter, McpServer, ProtocolError, TransportError};

/// Errors that can occur during server operation
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Tool registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Tool server that exposes a fixed set of tools over MCP
///
/// The registry is built once here and is read-only for the lifetime of
/// the process.
pub struct ToolServer {
    registry: ToolRegistry,
}

impl ToolServer {
    /// Create a server exposing the built-in tools, with file paths
    /// resolved against `root`
    pub fn new(root: PathBuf) -> Result<Self, ServerError> {
        tracing::info!("Initializing tool server with root: {}", root.display());
        Self::with_tools(tools::builtin_tools(root)?)
    }

    /// Create a server exposing exactly `tools`
    ///
    /// Fails if two tools share a name.
    pub fn with_tools(tools: Vec<Tool>) -> Result<Self, ServerError> {
        let registry = ToolRegistry::new(tools)?;
        Ok(Self { registry })
    }

    /// Serve JSON-RPC requests over stdin/stdout until stdin closes
    pub async fn run(self) -> Result<(), ServerError> {
        tracing::info!("Starting MCP server with {} tools", self.registry.len());
        self.serve(tokio::io::stdin(), tokio::io::stdout()).await
    }

    /// Serve JSON-RPC requests over an arbitrary pair of streams
    pub async fn serve<R, W>(self, reader: R, writer: W) -> Result<(), ServerError>
    where
        R: tokio::io::AsyncRead + Unpin,
        W: tokio::io::AsyncWrite + Unpin,
    {
        let mut server = McpServer::new(Dispatcher::new(self.registry));
        server
            .run(FrameReader::new(reader), FrameWriter::new(writer))
            .await
    }

    /// Get a reference to the tool registry (useful for testing)
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }
}
