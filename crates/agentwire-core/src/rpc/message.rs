//! JSON-RPC 2.0 envelopes.
//!
//! Messages are built and inspected as [`serde_json::Value`] trees rather
//! than typed structs so peers with loose field conventions still parse.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use strum::{Display, EnumString};

use crate::error::RpcError;

pub const JSONRPC_VERSION: &str = "2.0";

/// A request id as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    Text(String),
}

impl RequestId {
    /// Numeric value, accepting strings that hold an integer.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Number(n) => u64::try_from(*n).ok(),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::Number(n) => Value::from(*n),
            Self::Text(s) => Value::String(s.clone()),
        }
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => match n.as_i64() {
                Some(n) => Some(Self::Number(n)),
                // Too large for i64; kept verbatim so it can still be echoed.
                None => n.as_u64().map(|n| Self::Text(n.to_string())),
            },
            Value::String(s) => Some(Self::Text(s.clone())),
            _ => None,
        }
    }
}

impl From<u64> for RequestId {
    fn from(id: u64) -> Self {
        i64::try_from(id).map_or_else(|_| Self::Text(id.to_string()), Self::Number)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// How outbound JSON is rendered.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum JsonEncoding {
    /// Standard serde_json output.
    #[default]
    Plain,
    /// Every `/` written as `\/`.
    EscapedSlashes,
}

impl JsonEncoding {
    pub fn render(self, value: &Value) -> Result<String, serde_json::Error> {
        let text = serde_json::to_string(value)?;
        Ok(match self {
            Self::Plain => text,
            // '/' never occurs outside string literals in JSON text.
            Self::EscapedSlashes => text.replace('/', "\\/"),
        })
    }
}

/// Why inbound text could not be read as a JSON-RPC message.
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("not a JSON object")]
    NotAnObject,

    #[error("unrecognised envelope: {0}")]
    Unrecognised(&'static str),
}

/// One JSON-RPC message.
#[derive(Debug, Clone, PartialEq)]
pub enum WireMessage {
    Request {
        id: RequestId,
        method: String,
        params: Value,
    },
    Response {
        id: RequestId,
        outcome: Result<Value, RpcError>,
    },
    Notification {
        method: String,
        params: Value,
    },
}

impl WireMessage {
    pub fn request(id: impl Into<RequestId>, method: impl Into<String>, params: Value) -> Self {
        Self::Request {
            id: id.into(),
            method: method.into(),
            params,
        }
    }

    pub fn notification(method: impl Into<String>, params: Value) -> Self {
        Self::Notification {
            method: method.into(),
            params,
        }
    }

    pub fn method(&self) -> Option<&str> {
        match self {
            Self::Request { method, .. } | Self::Notification { method, .. } => Some(method),
            Self::Response { .. } => None,
        }
    }

    pub fn id(&self) -> Option<&RequestId> {
        match self {
            Self::Request { id, .. } | Self::Response { id, .. } => Some(id),
            Self::Notification { .. } => None,
        }
    }

    /// Build the envelope. `params` of `null` is omitted.
    pub fn to_value(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("jsonrpc".into(), json!(JSONRPC_VERSION));
        match self {
            Self::Request { id, method, params } => {
                obj.insert("id".into(), id.to_value());
                obj.insert("method".into(), json!(method));
                if !params.is_null() {
                    obj.insert("params".into(), params.clone());
                }
            }
            Self::Notification { method, params } => {
                obj.insert("method".into(), json!(method));
                if !params.is_null() {
                    obj.insert("params".into(), params.clone());
                }
            }
            Self::Response { id, outcome } => {
                obj.insert("id".into(), id.to_value());
                match outcome {
                    Ok(result) => {
                        obj.insert("result".into(), result.clone());
                    }
                    Err(error) => {
                        obj.insert("error".into(), json!(error));
                    }
                }
            }
        }
        Value::Object(obj)
    }

    /// Classify a parsed JSON value.
    ///
    /// `method` with `id` is a request, `method` alone a notification, and
    /// `id` with `result` or `error` a response. The `jsonrpc` member is
    /// not checked.
    pub fn from_value(value: Value) -> Result<Self, EnvelopeError> {
        let Value::Object(mut obj) = value else {
            return Err(EnvelopeError::NotAnObject);
        };

        let id = obj.get("id").and_then(RequestId::from_value);
        let method = obj
            .get("method")
            .and_then(Value::as_str)
            .map(str::to_string);
        let params = obj.remove("params").unwrap_or(Value::Null);

        match (method, id) {
            (Some(method), Some(id)) => Ok(Self::Request { id, method, params }),
            (Some(method), None) => Ok(Self::Notification { method, params }),
            (None, Some(id)) => {
                if let Some(error) = obj.get("error").filter(|e| !e.is_null()) {
                    Ok(Self::Response {
                        id,
                        outcome: Err(RpcError::from_value(error)),
                    })
                } else if let Some(result) = obj.remove("result") {
                    Ok(Self::Response {
                        id,
                        outcome: Ok(result),
                    })
                } else {
                    Err(EnvelopeError::Unrecognised("response without result or error"))
                }
            }
            (None, None) => Err(EnvelopeError::Unrecognised("no method and no usable id")),
        }
    }

    pub fn encode(&self, encoding: JsonEncoding) -> Result<String, serde_json::Error> {
        encoding.render(&self.to_value())
    }

    pub fn decode(text: &str) -> Result<Self, EnvelopeError> {
        Self::from_value(serde_json::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_envelope() {
        let msg = WireMessage::request(7, "session/new", json!({"cwd": "/tmp"}));
        assert_eq!(
            msg.to_value(),
            json!({"jsonrpc": "2.0", "id": 7, "method": "session/new", "params": {"cwd": "/tmp"}})
        );
    }

    #[test]
    fn test_null_params_omitted() {
        let msg = WireMessage::notification("session/cancel", Value::Null);
        assert_eq!(
            msg.to_value(),
            json!({"jsonrpc": "2.0", "method": "session/cancel"})
        );
    }

    #[test]
    fn test_escaped_slashes() {
        let msg = WireMessage::request(1, "session/new", json!({"cwd": "/a/b"}));
        let plain = msg.encode(JsonEncoding::Plain).unwrap();
        assert!(plain.contains(r#""session/new""#));
        let escaped = msg.encode(JsonEncoding::EscapedSlashes).unwrap();
        assert!(escaped.contains(r#""session\/new""#));
        assert!(escaped.contains(r#""\/a\/b""#));
        // Escaped output is still valid JSON for the same value.
        assert_eq!(
            serde_json::from_str::<Value>(&escaped).unwrap(),
            msg.to_value()
        );
    }

    #[test]
    fn test_decode_classifies() {
        assert!(matches!(
            WireMessage::decode(r#"{"jsonrpc":"2.0","id":"3","method":"session/request_permission","params":{}}"#).unwrap(),
            WireMessage::Request { id: RequestId::Text(ref s), .. } if s == "3"
        ));
        assert!(matches!(
            WireMessage::decode(r#"{"jsonrpc":"2.0","method":"session/update","params":{"x":1}}"#).unwrap(),
            WireMessage::Notification { ref method, .. } if method == "session/update"
        ));
        assert!(matches!(
            WireMessage::decode(r#"{"jsonrpc":"2.0","id":4,"result":null}"#).unwrap(),
            WireMessage::Response { outcome: Ok(Value::Null), .. }
        ));
    }

    #[test]
    fn test_decode_error_response() {
        let msg = WireMessage::decode(
            r#"{"jsonrpc":"2.0","id":2,"error":{"code":-32601,"message":"Method not found"}}"#,
        )
        .unwrap();
        let WireMessage::Response { id, outcome } = msg else {
            panic!("expected response");
        };
        assert_eq!(id, RequestId::Number(2));
        assert_eq!(outcome.unwrap_err().code, -32601);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            WireMessage::decode("not json"),
            Err(EnvelopeError::Json(_))
        ));
        assert!(matches!(
            WireMessage::decode("[1,2]"),
            Err(EnvelopeError::NotAnObject)
        ));
        assert!(matches!(
            WireMessage::decode(r#"{"jsonrpc":"2.0","id":null,"error":{"code":-32700}}"#),
            Err(EnvelopeError::Unrecognised(_))
        ));
    }

    #[test]
    fn test_string_id_matches_number() {
        assert_eq!(RequestId::Text("12".into()).as_u64(), Some(12));
        assert_eq!(RequestId::Text("abc".into()).as_u64(), None);
        assert_eq!(RequestId::Number(5).to_string(), "5");
        assert_eq!(RequestId::Number(-1).as_u64(), None);
    }

    #[test]
    fn test_negative_id_is_still_a_request() {
        let msg = WireMessage::decode(
            r#"{"jsonrpc":"2.0","id":-3,"method":"session/request_permission","params":{}}"#,
        )
        .unwrap();
        let WireMessage::Request { id, method, .. } = msg else {
            panic!("expected request, got {msg:?}");
        };
        assert_eq!(id, RequestId::Number(-3));
        assert_eq!(method, "session/request_permission");

        let reply = WireMessage::Response {
            id,
            outcome: Ok(json!({})),
        };
        assert_eq!(reply.to_value()["id"], json!(-3));
    }
}
