//! MCP client session
//!
//! A session owns the write half of the channel and a background reader
//! task that continuously drains the server's output. Every request gets a
//! fresh id and a pending entry; the reader completes entries by id, so
//! responses may arrive in any order and several callers may wait at once.
//!
//! Outgoing frames go through a writer task. A caller only queues its frame
//! and then waits, so its deadline covers the whole request even when the
//! server has stopped reading, and a caller giving up never cuts a frame in
//! half.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::Child;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::mcp::protocol::{
    self, methods, Fault, FaultKind, InitializeParams, InitializeResult, ListToolsResult, Message,
    PeerInfo, RequestId, RpcError, ToolCallParams, ToolCallResult, ToolContent, MCP_VERSION,
};
use crate::mcp::transport::{self, FrameReader, FrameWriter, ServerCommand};
use crate::mcp::{ProtocolError, TransportError};
use crate::registry::ToolDescriptor;

/// Default timeout for tool calls
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for the initialize handshake
pub const INIT_TIMEOUT: Duration = Duration::from_secs(30);

/// How long `shutdown` waits for the child to exit before killing it
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors surfaced to callers of the session
#[derive(Error, Debug)]
pub enum ClientError {
    /// The server exited or the channel broke; fatal for the call
    #[error("transport closed")]
    TransportClosed,

    #[error(transparent)]
    Transport(TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("initialization failed: {0}")]
    InitFailed(String),

    #[error("'{operation}' timed out after {timeout:?}")]
    Timeout { operation: String, timeout: Duration },

    /// The server answered with an application-level error
    #[error("{0}")]
    Fault(Fault),

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl ClientError {
    /// The fault category, when the server rejected the call
    pub fn fault_kind(&self) -> Option<FaultKind> {
        match self {
            ClientError::Fault(fault) => Some(fault.kind),
            _ => None,
        }
    }
}

impl From<TransportError> for ClientError {
    fn from(error: TransportError) -> Self {
        match error {
            TransportError::Closed => ClientError::TransportClosed,
            other => ClientError::Transport(other),
        }
    }
}

/// Session settings
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Name reported to the server during the handshake
    pub client_name: String,
    /// Version reported to the server during the handshake
    pub client_version: String,
    /// Default tool call timeout; `None` waits forever
    pub call_timeout: Option<Duration>,
    /// Deadline for the initialize exchange
    pub init_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            client_name: "mcp-demo-client".to_string(),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
            call_timeout: Some(DEFAULT_CALL_TIMEOUT),
            init_timeout: INIT_TIMEOUT,
        }
    }
}

/// Successful result of a tool call
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub content: Vec<ToolContent>,
}

impl ToolOutput {
    /// The first text content item, if any
    pub fn text(&self) -> Option<&str> {
        self.content
            .iter()
            .find(|c| c.content_type == "text")
            .map(|c| c.text.as_str())
    }
}

/// Operations a front end needs from a connected session
#[async_trait]
pub trait ToolSession: Send + Sync {
    /// Discover the tools the server exposes
    async fn tools(&self) -> Result<Vec<ToolDescriptor>, ClientError>;

    /// Call a tool with the session's default timeout
    async fn invoke(
        &self,
        name: &str,
        arguments: HashMap<String, Value>,
    ) -> Result<ToolOutput, ClientError>;
}

type Waiter = oneshot::Sender<Result<Value, RpcError>>;

/// Requests waiting for their response
///
/// `closed` lives under the same lock as the table so that a request can
/// never be registered after the reader has drained it.
#[derive(Default)]
struct PendingCalls {
    waiters: HashMap<RequestId, Waiter>,
    closed: bool,
}

type SharedPending = Arc<Mutex<PendingCalls>>;

fn lock(pending: &SharedPending) -> std::sync::MutexGuard<'_, PendingCalls> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// A connected, initialized session with one server
pub struct ClientSession {
    /// Frames for the writer task; dropped to close the channel
    outgoing: Option<mpsc::UnboundedSender<String>>,
    pending: SharedPending,
    next_id: AtomicI64,
    reader_task: JoinHandle<()>,
    writer_task: JoinHandle<()>,
    /// Present when we spawned the server; killed on drop
    child: Option<Child>,
    server_info: InitializeResult,
    options: SessionOptions,
}

impl ClientSession {
    /// Spawn the server process and initialize a session over its stdio
    pub async fn spawn(command: &ServerCommand, options: SessionOptions) -> Result<Self, ClientError> {
        let spawned = transport::spawn(command)?;
        let writer: BoxedWriter = Box::new(spawned.writer.into_inner());
        Self::start(spawned.reader, writer, Some(spawned.child), options).await
    }

    /// Initialize a session over an already connected pair of streams
    pub async fn connect<R, W>(reader: R, writer: W, options: SessionOptions) -> Result<Self, ClientError>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self::start(FrameReader::new(reader), Box::new(writer), None, options).await
    }

    async fn start<R>(
        reader: FrameReader<R>,
        writer: BoxedWriter,
        child: Option<Child>,
        options: SessionOptions,
    ) -> Result<Self, ClientError>
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let pending = SharedPending::default();
        let reader_task = tokio::spawn(read_loop(reader, pending.clone()));
        let (outgoing, queued) = mpsc::unbounded_channel();
        let writer_task = tokio::spawn(write_loop(FrameWriter::new(writer), queued, pending.clone()));

        let mut session = Self {
            outgoing: Some(outgoing),
            pending,
            next_id: AtomicI64::new(1),
            reader_task,
            writer_task,
            child,
            server_info: InitializeResult {
                protocol_version: String::new(),
                capabilities: Default::default(),
                server_info: PeerInfo {
                    name: String::new(),
                    version: String::new(),
                },
            },
            options,
        };

        session.server_info = session.initialize().await?;
        info!(
            "Connected to {} {} (protocol {})",
            session.server_info.server_info.name,
            session.server_info.server_info.version,
            session.server_info.protocol_version
        );

        Ok(session)
    }

    /// The one initialization exchange of the session
    async fn initialize(&self) -> Result<InitializeResult, ClientError> {
        let params = InitializeParams {
            protocol_version: MCP_VERSION.to_string(),
            capabilities: serde_json::json!({}),
            client_info: Some(PeerInfo {
                name: self.options.client_name.clone(),
                version: self.options.client_version.clone(),
            }),
        };
        let params = serde_json::to_value(params)
            .map_err(|e| ClientError::InitFailed(format!("failed to encode parameters: {}", e)))?;

        let result = self
            .request(methods::INITIALIZE, Some(params), Some(self.options.init_timeout))
            .await
            .map_err(|e| match e {
                ClientError::TransportClosed => ClientError::TransportClosed,
                other => ClientError::InitFailed(other.to_string()),
            })?;

        let info: InitializeResult = serde_json::from_value(result)
            .map_err(|e| ClientError::InitFailed(format!("malformed initialize result: {}", e)))?;

        if info.protocol_version != MCP_VERSION {
            warn!(
                "Server speaks protocol {}, we speak {}",
                info.protocol_version, MCP_VERSION
            );
        }

        self.notify(methods::INITIALIZED, None).await?;
        Ok(info)
    }

    /// What the server reported during the handshake
    pub fn server_info(&self) -> &InitializeResult {
        &self.server_info
    }

    /// Ask the server which tools it exposes, in registration order
    pub async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ClientError> {
        let result = self
            .request(methods::TOOLS_LIST, None, self.options.call_timeout)
            .await?;

        let list: ListToolsResult = serde_json::from_value(result)
            .map_err(|e| ClientError::UnexpectedResponse(format!("malformed tools/list result: {}", e)))?;

        Ok(list.tools.into_iter().map(|t| t.descriptor).collect())
    }

    /// Call a tool and wait for its result
    ///
    /// `timeout` overrides the session default. On timeout the pending
    /// entry is dropped and a late response is discarded by the reader.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: HashMap<String, Value>,
        timeout: Option<Duration>,
    ) -> Result<ToolOutput, ClientError> {
        let params = serde_json::to_value(ToolCallParams {
            name: name.to_string(),
            arguments,
        })
        .map_err(|e| ProtocolError::new(format!("failed to encode arguments: {}", e), name))?;

        let result = self
            .request(methods::TOOLS_CALL, Some(params), timeout.or(self.options.call_timeout))
            .await?;

        let result: ToolCallResult = serde_json::from_value(result)
            .map_err(|e| ClientError::UnexpectedResponse(format!("malformed tools/call result: {}", e)))?;

        if result.is_error {
            let message = result
                .content
                .iter()
                .map(|c| c.text.as_str())
                .collect::<Vec<_>>()
                .join("\n");
            return Err(ClientError::Fault(Fault::new(FaultKind::ToolFailed, message)));
        }

        Ok(ToolOutput {
            content: result.content,
        })
    }

    /// Send a request and wait for the response with the same id
    async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Option<Duration>,
    ) -> Result<Value, ClientError> {
        let id = RequestId::Number(self.next_id.fetch_add(1, Ordering::Relaxed));
        let frame = protocol::encode(&Message::request(id.clone(), method, params))?;

        let (tx, mut rx) = oneshot::channel();
        {
            let mut pending = lock(&self.pending);
            if pending.closed {
                return Err(ClientError::TransportClosed);
            }
            pending.waiters.insert(id.clone(), tx);
        }

        debug!("Sending request {} ({})", id, method);
        if let Err(e) = self.enqueue(frame) {
            self.forget(&id);
            return Err(e);
        }

        let outcome = match timeout {
            None => rx.await.map_err(|_| ClientError::TransportClosed)?,
            Some(limit) => match tokio::time::timeout(limit, &mut rx).await {
                Ok(received) => received.map_err(|_| ClientError::TransportClosed)?,
                Err(_) => {
                    if self.forget(&id) {
                        warn!("Request {} ({}) timed out after {:?}", id, method, limit);
                        return Err(ClientError::Timeout {
                            operation: method.to_string(),
                            timeout: limit,
                        });
                    }
                    // The reader completed the entry right at the deadline
                    rx.try_recv().map_err(|_| ClientError::TransportClosed)?
                }
            },
        };

        outcome.map_err(|e| ClientError::Fault(e.into()))
    }

    /// Send a notification; no response is expected
    async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), ClientError> {
        let frame = protocol::encode(&Message::notification(method, params))?;
        self.enqueue(frame)
    }

    /// Hand a frame to the writer task
    fn enqueue(&self, frame: String) -> Result<(), ClientError> {
        match &self.outgoing {
            Some(outgoing) => outgoing.send(frame).map_err(|_| ClientError::TransportClosed),
            None => Err(ClientError::TransportClosed),
        }
    }

    /// Drop a pending entry; returns whether it was still there
    fn forget(&self, id: &RequestId) -> bool {
        lock(&self.pending).waiters.remove(id).is_some()
    }

    /// Close the channel and stop the server process
    ///
    /// Closing stdin lets a well-behaved server exit on its own; if it is
    /// still running after a grace period it is killed.
    pub async fn shutdown(mut self) -> Result<(), ClientError> {
        info!("Shutting down client session");

        // The writer task flushes what is queued, then closes the server's stdin
        self.outgoing.take();
        if tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut self.writer_task).await.is_err() {
            warn!("Writer did not finish in time");
            self.writer_task.abort();
        }

        if let Some(mut child) = self.child.take() {
            match tokio::time::timeout(SHUTDOWN_TIMEOUT, child.wait()).await {
                Ok(Ok(status)) => debug!("Server exited with {}", status),
                _ => {
                    warn!("Server did not exit in time, killing it");
                    let _ = child.kill().await;
                }
            }
        }

        Ok(())
    }
}

impl Drop for ClientSession {
    fn drop(&mut self) {
        self.reader_task.abort();
        self.writer_task.abort();
    }
}

#[async_trait]
impl ToolSession for ClientSession {
    async fn tools(&self) -> Result<Vec<ToolDescriptor>, ClientError> {
        self.list_tools().await
    }

    async fn invoke(
        &self,
        name: &str,
        arguments: HashMap<String, Value>,
    ) -> Result<ToolOutput, ClientError> {
        self.call_tool(name, arguments, None).await
    }
}

/// Write queued frames in order until the session lets go of the queue
///
/// A failed write means the server is gone: pending calls are released
/// and later requests fail fast with `TransportClosed`.
async fn write_loop(
    mut writer: FrameWriter<BoxedWriter>,
    mut queued: mpsc::UnboundedReceiver<String>,
    pending: SharedPending,
) {
    while let Some(frame) = queued.recv().await {
        if let Err(e) = writer.send(&frame).await {
            error!("Failed to write to server, closing session: {}", e);
            release_pending(&pending);
            return;
        }
    }

    let _ = writer.close().await;
}

fn release_pending(pending: &SharedPending) {
    let mut guard = lock(pending);
    guard.closed = true;
    let released = guard.waiters.len();
    guard.waiters.clear();
    if released > 0 {
        warn!("Released {} pending calls after the transport closed", released);
    }
}

/// Drain the server's output, completing pending calls by id
///
/// Runs until the channel closes or carries something undecodable. On
/// exit every still-pending call is released, which its waiter observes
/// as `TransportClosed`.
async fn read_loop<R>(mut reader: FrameReader<R>, pending: SharedPending)
where
    R: AsyncRead + Send + Unpin + 'static,
{
    loop {
        let frame = match reader.receive().await {
            Ok(frame) => frame,
            Err(TransportError::Closed) => {
                info!("Server closed the connection");
                break;
            }
            Err(e) => {
                error!("Transport failure, closing session: {}", e);
                break;
            }
        };

        match protocol::decode(&frame) {
            Ok(Message::Response { id, outcome }) => {
                // Completing under the lock keeps this atomic with a timeout's removal
                let mut guard = lock(&pending);
                match guard.waiters.remove(&id) {
                    Some(waiter) => {
                        let _ = waiter.send(outcome);
                    }
                    None => debug!("Discarding response for untracked request {}", id),
                }
            }
            Ok(Message::Notification { method, .. }) => {
                debug!("Ignoring server notification '{}'", method);
            }
            Ok(Message::Request { id, method, .. }) => {
                warn!("Ignoring server request '{}' (id {})", method, id);
            }
            Err(e) => {
                error!("Undecodable frame from server, closing session: {}", e);
                break;
            }
        }
    }

    release_pending(&pending);
}
