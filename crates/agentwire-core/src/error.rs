//! Error types for the agentwire core.
//!
//! ## Error handling patterns
//!
//! The core uses three layers of errors:
//!
//! 1. **Transport** ([`TransportError`]): anything that breaks the current
//!    connection attempt. URL problems, handshake mismatches, malformed frames
//!    and socket I/O all land here. None of these are retried internally.
//!
//! 2. **RPC** ([`RpcError`]): the `{code, message, data}` object a peer sends
//!    back in a JSON-RPC error response. Delivered verbatim to the caller that
//!    issued the matching request.
//!
//! 3. **Calls** ([`CallError`]): what an outbound call resolves to when it
//!    does not succeed. Either the peer answered with an [`RpcError`], the
//!    transport failed while sending, or the connection went away.
//!
//! Interpretation of payloads never produces errors: missing or malformed
//! fields simply yield no action (see [`crate::protocol`]).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC "method not found".
pub const METHOD_NOT_FOUND: i64 = -32601;

/// Failures of the WebSocket transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("invalid WebSocket URL: {0}")]
    InvalidUrl(String),

    #[error("unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    #[error("handshake failed: expected status 101, got {0}")]
    InvalidStatusCode(u16),

    #[error("handshake failed: missing header {0}")]
    MissingHeader(&'static str),

    #[error("handshake failed: Sec-WebSocket-Accept does not match the request key")]
    InvalidAcceptValue,

    #[error("handshake failed: Upgrade header is {0:?}, expected \"websocket\"")]
    InvalidUpgradeHeader(String),

    #[error("handshake failed: Connection header {0:?} does not contain \"upgrade\"")]
    InvalidConnectionHeader(String),

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("disconnected")]
    Disconnected,

    #[error("unsupported frame length: {0} bytes")]
    UnsupportedFrameLength(u64),

    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TransportError {
    /// Whether this error came out of the opening handshake.
    pub fn is_handshake(&self) -> bool {
        matches!(
            self,
            Self::InvalidStatusCode(_)
                | Self::MissingHeader(_)
                | Self::InvalidAcceptValue
                | Self::InvalidUpgradeHeader(_)
                | Self::InvalidConnectionHeader(_)
                | Self::Handshake(_)
        )
    }
}

/// A JSON-RPC error object as sent by the peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("RPC error {code}: {message}")]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Lenient extraction from an `error` member. Missing code defaults to 0,
    /// missing message to an empty string.
    pub fn from_value(value: &Value) -> Self {
        Self {
            code: value.get("code").and_then(Value::as_i64).unwrap_or(0),
            message: value
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            data: value.get("data").cloned(),
        }
    }

    pub fn is_method_not_found(&self) -> bool {
        self.code == METHOD_NOT_FOUND
    }
}

/// Why an outbound call did not produce a result.
#[derive(Debug, thiserror::Error)]
pub enum CallError {
    /// The connection was not open, or dropped before the response arrived.
    #[error("disconnected")]
    Disconnected,

    /// The peer answered with a JSON-RPC error.
    #[error(transparent)]
    Rpc(#[from] RpcError),

    /// The request could not be transmitted.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl CallError {
    pub fn rpc(&self) -> Option<&RpcError> {
        match self {
            Self::Rpc(err) => Some(err),
            _ => None,
        }
    }
}
