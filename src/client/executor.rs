//! Script executor: the public entry point for running scripts.
//!
//! Scripts can come from a string, a file, or any async byte stream. All
//! three are normalized to text and sent through the bound
//! [`ServeContext`]. The script should assign the value to return to
//! `_result_`:
//!
//! ```text
//! a = 2
//! b = 3
//! _result_ = a * b
//! ```

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::net::TcpStream;

use crate::client::context::ServeContext;
use crate::error::ClientError;
use crate::result::ScriptResult;

/// Maximum script size (8MB).
pub const MAX_SCRIPT_SIZE: usize = 8 * 1024 * 1024;

/// Read buffer size for stream sources.
const READ_CHUNK: usize = 8192;

/// Lightweight handle for submitting scripts to a [`ServeContext`].
///
/// Cheap to clone; many executors may share one context.
pub struct ScriptExecutor<S = TcpStream> {
    context: Option<Arc<ServeContext<S>>>,
}

impl<S> ScriptExecutor<S> {
    pub fn new(context: Arc<ServeContext<S>>) -> Self {
        Self {
            context: Some(context),
        }
    }

    /// An executor with no context. Every call fails with a
    /// "not initialized" result.
    pub fn unbound() -> Self {
        Self { context: None }
    }

    pub fn context(&self) -> Option<&Arc<ServeContext<S>>> {
        self.context.as_ref()
    }
}

impl<S> ScriptExecutor<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Execute a script given as a string.
    ///
    /// Lines may be separated by `\n`, `\r` or `\r\n`.
    pub async fn exec(&self, script: &str) -> ScriptResult {
        let context = match self.bound_context() {
            Ok(context) => context,
            Err(e) => return e.into(),
        };

        if script.len() > MAX_SCRIPT_SIZE {
            return ClientError::ScriptTooLarge {
                limit: MAX_SCRIPT_SIZE,
            }
            .into();
        }

        context.execute_script(script).await
    }

    /// Execute the script stored in a file.
    pub async fn exec_file(&self, path: impl AsRef<Path>) -> ScriptResult {
        let path = path.as_ref();
        if let Err(e) = self.bound_context() {
            return e.into();
        }

        match tokio::fs::File::open(path).await {
            Ok(file) => self.exec_reader(file).await,
            Err(e) => {
                tracing::warn!("Cannot open script file {}: {}", path.display(), e);
                ClientError::Io(e).into()
            }
        }
    }

    /// Read a script from a byte stream and execute it.
    pub async fn exec_reader<R>(&self, reader: R) -> ScriptResult
    where
        R: AsyncRead + Unpin,
    {
        if let Err(e) = self.bound_context() {
            return e.into();
        }

        match read_script(reader, MAX_SCRIPT_SIZE).await {
            Ok(script) => self.exec(&script).await,
            Err(e) => e.into(),
        }
    }

    fn bound_context(&self) -> Result<&Arc<ServeContext<S>>, ClientError> {
        self.context.as_ref().ok_or(ClientError::NotInitialized)
    }
}

/// Read the whole stream as UTF-8 text, giving up as soon as more than
/// `limit` bytes have been seen.
async fn read_script<R>(mut reader: R, limit: usize) -> Result<String, ClientError>
where
    R: AsyncRead + Unpin,
{
    let mut bytes = Vec::new();
    let mut buffer = [0u8; READ_CHUNK];

    loop {
        let n = reader.read(&mut buffer).await.map_err(ClientError::Io)?;
        if n == 0 {
            break;
        }
        if bytes.len() + n > limit {
            return Err(ClientError::ScriptTooLarge { limit });
        }
        bytes.extend_from_slice(&buffer[..n]);
    }

    Ok(String::from_utf8(bytes)?)
}

impl<S> Clone for ScriptExecutor<S> {
    fn clone(&self) -> Self {
        Self {
            context: self.context.clone(),
        }
    }
}

impl<S> Default for ScriptExecutor<S> {
    fn default() -> Self {
        Self::unbound()
    }
}

impl<S> fmt::Debug for ScriptExecutor<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptExecutor")
            .field("context", &self.context)
            .finish()
    }
}
