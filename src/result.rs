//! Outcome of a single script execution.
//!
//! The server encodes each outcome as a JSON document:
//!
//! ```text
//! {"success": true, "msg": "success", "result": "[2, {\"a\": 2}, 3]"}
//! ```
//!
//! `result` carries the script's `_result_` value. Composite values arrive
//! already JSON-encoded as a string and are handed to the caller untouched.

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ClientError;

/// Result of one script execution.
///
/// Built fresh for every call and never mutated after it is returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptResult {
    success: bool,
    #[serde(
        default,
        rename = "msg",
        alias = "message",
        skip_serializing_if = "Option::is_none"
    )]
    message: Option<String>,
    #[serde(
        default,
        rename = "result",
        alias = "payload",
        deserialize_with = "payload_text",
        skip_serializing_if = "Option::is_none"
    )]
    payload: Option<String>,
}

impl ScriptResult {
    /// A successful outcome carrying the textual `_result_` value.
    pub fn success(payload: impl Into<String>) -> Self {
        Self {
            success: true,
            message: None,
            payload: Some(payload.into()),
        }
    }

    /// A failed outcome with a diagnostic message.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            payload: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    /// Diagnostic message. Always present on failure; the server may also
    /// send one (usually `"success"`) on success.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Raw `_result_` text. JSON for composite values, plain text for scalars.
    pub fn payload(&self) -> Option<&str> {
        self.payload.as_deref()
    }

    /// Convert into a std `Result` for callers who want to use `?`.
    pub fn into_outcome(self) -> Result<Option<String>, String> {
        if self.success {
            Ok(self.payload)
        } else {
            Err(self.message.unwrap_or_default())
        }
    }
}

impl From<ClientError> for ScriptResult {
    fn from(err: ClientError) -> Self {
        ScriptResult::failure(err.to_string())
    }
}

/// Accept `result` as any JSON value: strings are kept verbatim, other
/// values are kept as compact JSON text, `null` means no payload.
fn payload_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}
