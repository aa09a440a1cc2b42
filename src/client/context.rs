//! Connection manager for a single JPServe session.
//!
//! `ServeContext` owns one transport and performs strictly half-duplex
//! round trips over it: a request frame is written, then the caller waits for
//! the matching response frame. The frames carry no correlation id, so the
//! transport is held under a mutex for the whole write + read.
//!
//! # Lifecycle
//!
//! ```text
//! connect() ──► Active ──close()──────────────────────────► Closed  ("context already closed")
//!                  │
//!                  └──transport fault / timeout / abandoned
//!                     round trip ─────────────────────────► Closed  ("no longer usable")
//! ```
//!
//! A round trip whose future is dropped after the request went out leaves an
//! unread response on the wire. The connection is marked broken at that
//! point and the transport is dropped by the next caller. `close()` wakes an
//! in-flight round trip instead of waiting for the server to answer.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{split, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, Notify};
use tokio::time::timeout;

use crate::client::executor::ScriptExecutor;
use crate::client::framing::{decode_response, read_frame, write_exit, write_frame};
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::result::ScriptResult;

/// Observable connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Active,
    Closed,
}

/// Both halves of the transport.
struct Transport<S> {
    reader: BufReader<ReadHalf<S>>,
    writer: WriteHalf<S>,
}

impl<S> Transport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Send one script and wait for its response (no deadline).
    async fn exchange(&mut self, script: &str) -> Result<ScriptResult, ClientError> {
        write_frame(&mut self.writer, script).await?;
        let payload = read_frame(&mut self.reader).await?;
        tracing::debug!(
            "Received response frame ({} bytes payload)",
            payload.len()
        );
        decode_response(&payload)
    }
}

/// Marks the connection broken unless disarmed once the response frame has
/// been consumed. Dropping an armed guard means the exchange was abandoned.
struct InFlight<'a> {
    broken: &'a AtomicBool,
    armed: bool,
}

impl<'a> InFlight<'a> {
    fn arm(broken: &'a AtomicBool) -> Self {
        Self {
            broken,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.broken.store(true, Ordering::SeqCst);
        }
    }
}

/// One live session with a JPServe instance.
///
/// Share it behind an `Arc` and hand out [`ScriptExecutor`]s with
/// [`ServeContext::executor`]. Concurrent executors are serialized.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use jpserve_client::ServeContext;
///
/// let context = Arc::new(ServeContext::connect("localhost", 8888).await?);
/// let rs = context.executor().exec("_result_ = 'Hello World!'").await;
/// context.close().await;
/// ```
pub struct ServeContext<S = TcpStream> {
    endpoint: String,
    /// Set once by `close()`, before the transport lock is taken.
    closed: AtomicBool,
    /// Set when the transport can no longer be trusted to sit on a frame
    /// boundary.
    broken: AtomicBool,
    /// Wakes an in-flight round trip when `close()` is called.
    shutdown: Notify,
    /// `None` once the transport has been released.
    transport: Mutex<Option<Transport<S>>>,
    request_timeout: Option<Duration>,
}

impl ServeContext<TcpStream> {
    /// Connect to JPServe at `host:port` with default settings.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::ConnectionFailed` if the TCP connection cannot
    /// be established.
    pub async fn connect(host: &str, port: u16) -> Result<Self, ClientError> {
        Self::connect_with_config(&ClientConfig::new(host, port)).await
    }

    /// Connect using a full [`ClientConfig`].
    pub async fn connect_with_config(config: &ClientConfig) -> Result<Self, ClientError> {
        let endpoint = config.endpoint();
        let stream = TcpStream::connect((config.host.as_str(), config.port))
            .await
            .map_err(ClientError::ConnectionFailed)?;

        tracing::info!("Connected to JPServe at {}", endpoint);
        Ok(Self::from_stream(stream, endpoint, config.request_timeout))
    }
}

impl<S> ServeContext<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap an already-connected transport.
    pub fn from_stream(
        stream: S,
        endpoint: impl Into<String>,
        request_timeout: Option<Duration>,
    ) -> Self {
        let (read_half, write_half) = split(stream);
        Self {
            endpoint: endpoint.into(),
            closed: AtomicBool::new(false),
            broken: AtomicBool::new(false),
            shutdown: Notify::new(),
            transport: Mutex::new(Some(Transport {
                reader: BufReader::new(read_half),
                writer: write_half,
            })),
            request_timeout,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout
    }

    /// Current state. A context whose transport failed reports `Closed`.
    ///
    /// Does not wait for an in-flight round trip.
    pub fn state(&self) -> ConnectionState {
        if self.is_closed() || self.broken.load(Ordering::SeqCst) {
            ConnectionState::Closed
        } else {
            ConnectionState::Active
        }
    }

    /// Whether `close()` has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Send a script and wait for its result.
    ///
    /// Never fails: every error is returned as a failed [`ScriptResult`].
    pub async fn execute_script(&self, script: &str) -> ScriptResult {
        match self.round_trip(script).await {
            Ok(result) => result,
            Err(e) => ScriptResult::from(e),
        }
    }

    async fn round_trip(&self, script: &str) -> Result<ScriptResult, ClientError> {
        if self.is_closed() {
            return Err(ClientError::Closed);
        }

        let mut guard = self.transport.lock().await;

        // Register for the close signal before re-checking the flag, so a
        // close() that lands after the check still wakes us.
        let shutdown = self.shutdown.notified();
        tokio::pin!(shutdown);
        shutdown.as_mut().enable();

        if self.is_closed() {
            return Err(ClientError::Closed);
        }

        if self.broken.load(Ordering::SeqCst) {
            if guard.take().is_some() {
                tracing::warn!(
                    "Dropping connection to {} after an abandoned round trip",
                    self.endpoint
                );
            }
            return Err(ClientError::Broken);
        }
        let transport = guard.as_mut().ok_or(ClientError::Broken)?;

        tracing::debug!(
            "Sending script to {} ({} bytes)",
            self.endpoint,
            script.len()
        );

        let in_flight = InFlight::arm(&self.broken);
        let exchange = async {
            match self.request_timeout {
                Some(deadline) => timeout(deadline, transport.exchange(script))
                    .await
                    .unwrap_or(Err(ClientError::Timeout(deadline))),
                None => transport.exchange(script).await,
            }
        };

        let outcome = tokio::select! {
            outcome = exchange => outcome,
            _ = shutdown => {
                // close() takes the transport once we release the lock
                tracing::info!("Round trip to {} interrupted by close", self.endpoint);
                return Err(ClientError::Closed);
            }
        };

        match &outcome {
            Err(e) if e.poisons_transport() => {
                tracing::warn!(
                    "Dropping connection to {} after transport failure: {}",
                    self.endpoint,
                    e
                );
                // in_flight stays armed and marks the connection broken
                *guard = None;
            }
            Err(e) => {
                in_flight.disarm();
                tracing::warn!("Script round trip to {} failed: {}", self.endpoint, e);
            }
            Ok(_) => in_flight.disarm(),
        }

        outcome
    }

    /// Close the session.
    ///
    /// Marks the context closed, wakes any in-flight round trip, sends a
    /// best-effort `#!exit` notice and releases the transport. Errors during
    /// teardown are logged, never returned. Calling `close()` again is a
    /// no-op.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shutdown.notify_waiters();

        let transport = self.transport.lock().await.take();
        let Some(mut transport) = transport else {
            tracing::info!("Closed JPServe context for {}", self.endpoint);
            return;
        };

        if let Err(e) = write_exit(&mut transport.writer).await {
            tracing::warn!("Failed to send exit notice to {}: {}", self.endpoint, e);
        }
        if let Err(e) = transport.writer.shutdown().await {
            tracing::debug!("Failed to shut down transport to {}: {}", self.endpoint, e);
        }
        drop(transport);

        tracing::info!("Closed JPServe context for {}", self.endpoint);
    }
}

impl<S> ServeContext<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Get a script executor bound to this context.
    pub fn executor(self: &Arc<Self>) -> ScriptExecutor<S> {
        ScriptExecutor::new(Arc::clone(self))
    }
}

impl<S> fmt::Debug for ServeContext<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServeContext")
            .field("endpoint", &self.endpoint)
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .field("broken", &self.broken.load(Ordering::SeqCst))
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}
