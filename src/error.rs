//! Error types for the JPServe client.
//!
//! Only connection establishment surfaces a `ClientError` directly to the
//! caller. Every other failure is folded into a failed
//! [`ScriptResult`](crate::ScriptResult) at the executor boundary.

use std::time::Duration;

use thiserror::Error;

/// Errors produced while talking to a JPServe instance.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Failed to open the transport to the server.
    #[error("Connection failed: {0}")]
    ConnectionFailed(#[source] std::io::Error),

    /// The context was closed deliberately.
    #[error("context already closed")]
    Closed,

    /// The transport was abandoned after an earlier fault.
    #[error("connection is no longer usable after a transport failure")]
    Broken,

    /// No context is bound to the executor.
    #[error("context has not been initialized")]
    NotInitialized,

    /// Script exceeds the size limit.
    #[error("Exceeds the max script size limit ({limit} bytes)")]
    ScriptTooLarge {
        /// Limit in bytes
        limit: usize,
    },

    /// The server closed the connection before the end marker arrived.
    #[error("connection closed mid-response")]
    ConnectionClosed,

    /// No response frame arrived within the configured deadline.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// The response payload grew past the allowed size.
    #[error("Response exceeds maximum {limit} bytes")]
    ResponseTooLarge {
        /// Limit in bytes
        limit: usize,
    },

    /// The response payload is not a valid result document.
    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The script source is not valid UTF-8.
    #[error("Script is not valid UTF-8: {0}")]
    InvalidEncoding(#[from] std::string::FromUtf8Error),

    /// I/O error during communication.
    #[error("I/O error: {0}")]
    Io(#[source] std::io::Error),
}

impl ClientError {
    /// Whether the transport can no longer be trusted to sit on a frame
    /// boundary after this error.
    pub fn poisons_transport(&self) -> bool {
        matches!(
            self,
            ClientError::Io(_)
                | ClientError::ConnectionClosed
                | ClientError::Timeout(_)
                | ClientError::ResponseTooLarge { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_error_display() {
        assert_eq!(ClientError::Closed.to_string(), "context already closed");

        let timeout_err = ClientError::Timeout(Duration::from_secs(30));
        assert_eq!(timeout_err.to_string(), "Request timed out after 30s");

        let too_large = ClientError::ScriptTooLarge { limit: 8 };
        assert_eq!(
            too_large.to_string(),
            "Exceeds the max script size limit (8 bytes)"
        );
    }

    #[test]
    fn test_poisons_transport() {
        assert!(ClientError::ConnectionClosed.poisons_transport());
        assert!(ClientError::Timeout(Duration::from_millis(5)).poisons_transport());
        assert!(!ClientError::Closed.poisons_transport());
        assert!(!ClientError::ScriptTooLarge { limit: 1 }.poisons_transport());

        let decode = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(!ClientError::Decode(decode).poisons_transport());
    }
}
