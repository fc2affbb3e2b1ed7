//! Line-framed transport over a pair of byte streams
//!
//! Every frame is one line of UTF-8 text terminated by `\n`. The same
//! framing is used on both ends: the server reads its own stdin and writes
//! its stdout, the client reads the child's stdout and writes the child's
//! stdin. The transport never looks inside a frame.

use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, info};

use super::TransportError;

/// Largest frame accepted by a reader (8 MiB)
pub const MAX_FRAME_BYTES: usize = 8 * 1024 * 1024;

/// Reads newline-delimited frames from an async byte stream
pub struct FrameReader<R> {
    reader: BufReader<R>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            reader: BufReader::new(inner),
        }
    }

    /// Wait for the next complete frame
    ///
    /// Blank lines are skipped and a trailing `\r` is stripped. Returns
    /// `Closed` at end of input and `Framing` for an unterminated, oversized
    /// or non-UTF-8 frame. After a `Framing` error the reader is positioned
    /// at the start of the next line, so the caller may keep reading.
    pub async fn receive(&mut self) -> Result<String, TransportError> {
        loop {
            let mut buf = Vec::new();
            let limit = (MAX_FRAME_BYTES + 1) as u64;
            let n = (&mut self.reader)
                .take(limit)
                .read_until(b'\n', &mut buf)
                .await
                .map_err(|e| {
                    debug!("Read failed, treating transport as closed: {}", e);
                    TransportError::Closed
                })?;

            if n == 0 {
                return Err(TransportError::Closed);
            }

            if buf.last() != Some(&b'\n') {
                if buf.len() > MAX_FRAME_BYTES {
                    self.skip_line().await?;
                    return Err(TransportError::Framing {
                        reason: format!("frame exceeds {} bytes", MAX_FRAME_BYTES),
                    });
                }
                return Err(TransportError::Framing {
                    reason: format!("unterminated frame ({} bytes before end of input)", buf.len()),
                });
            }

            buf.pop();
            if buf.last() == Some(&b'\r') {
                buf.pop();
            }

            if buf.iter().all(|b| b.is_ascii_whitespace()) {
                continue;
            }

            return String::from_utf8(buf).map_err(|e| TransportError::Framing {
                reason: format!("frame is not valid UTF-8: {}", e),
            });
        }
    }

    /// Discard input up to and including the next newline
    async fn skip_line(&mut self) -> Result<(), TransportError> {
        loop {
            let mut scratch = Vec::new();
            let n = (&mut self.reader)
                .take(64 * 1024)
                .read_until(b'\n', &mut scratch)
                .await
                .map_err(|_| TransportError::Closed)?;

            if n == 0 || scratch.last() == Some(&b'\n') {
                return Ok(());
            }
        }
    }
}

/// Writes newline-delimited frames to an async byte stream
pub struct FrameWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { writer: inner }
    }

    /// Write one frame and flush it
    ///
    /// The frame and its terminator go out in a single `write_all`, so a
    /// frame is never interleaved with another one.
    pub async fn send(&mut self, frame: &str) -> Result<(), TransportError> {
        if frame.contains('\n') {
            return Err(TransportError::Framing {
                reason: "frame contains a raw newline".to_string(),
            });
        }

        let mut bytes = Vec::with_capacity(frame.len() + 1);
        bytes.extend_from_slice(frame.as_bytes());
        bytes.push(b'\n');

        self.writer.write_all(&bytes).await.map_err(|e| {
            debug!("Write failed, treating transport as closed: {}", e);
            TransportError::Closed
        })?;
        self.writer.flush().await.map_err(|e| {
            debug!("Flush failed, treating transport as closed: {}", e);
            TransportError::Closed
        })?;

        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    /// Shut down the write half, signalling end of input to the peer
    pub async fn close(&mut self) -> Result<(), TransportError> {
        self.writer.shutdown().await.map_err(|_| TransportError::Closed)
    }
}

/// How to launch the server process
#[derive(Debug, Clone, PartialEq)]
pub struct ServerCommand {
    /// Executable to run (looked up on PATH when not a path)
    pub program: String,
    /// Arguments passed to the executable
    pub args: Vec<String>,
}

impl ServerCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Append an argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}

/// A running server child with its stdio wired as a framed channel
pub struct SpawnedServer {
    /// The child process handle; the child is killed when this is dropped
    pub child: Child,
    /// Frames coming from the child's stdout
    pub reader: FrameReader<ChildStdout>,
    /// Frames going to the child's stdin
    pub writer: FrameWriter<ChildStdin>,
}

/// Start the server process and bind its stdin/stdout as the transport
///
/// The child inherits the working directory. Its stderr is piped and
/// drained on a background task into our own log, so diagnostics never
/// share a stream with protocol frames.
pub fn spawn(command: &ServerCommand) -> Result<SpawnedServer, TransportError> {
    info!("Spawning server: {} {:?}", command.program, command.args);

    let mut child = Command::new(&command.program)
        .args(&command.args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| TransportError::Spawn {
            program: command.program.clone(),
            source: e,
        })?;

    let missing = |what: &str| TransportError::Spawn {
        program: command.program.clone(),
        source: std::io::Error::new(std::io::ErrorKind::Other, format!("failed to capture {}", what)),
    };

    let stdin = child.stdin.take().ok_or_else(|| missing("stdin"))?;
    let stdout = child.stdout.take().ok_or_else(|| missing("stdout"))?;

    if let Some(stderr) = child.stderr.take() {
        let program = command.program.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(server = %program, "stderr: {}", line);
            }
        });
    }

    Ok(SpawnedServer {
        child,
        reader: FrameReader::new(stdout),
        writer: FrameWriter::new(stdin),
    })
}
