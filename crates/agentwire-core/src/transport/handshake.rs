//! HTTP/1.1 upgrade handshake for the client side of RFC 6455.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use sha1::{Digest, Sha1};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use super::endpoint::Endpoint;
use crate::error::TransportError;

/// Fixed GUID appended to the key when computing `Sec-WebSocket-Accept`.
pub const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Headers the handshake always writes itself. Caller-supplied headers with
/// these names (any case) are dropped.
pub const RESERVED_HEADERS: [&str; 6] = [
    "host",
    "upgrade",
    "connection",
    "sec-websocket-key",
    "sec-websocket-version",
    "sec-websocket-extensions",
];

/// Upper bound on the response header block.
const MAX_RESPONSE_HEAD: usize = 16 * 1024;

/// A fresh random 16-byte key, base64 encoded.
pub fn generate_key() -> String {
    BASE64.encode(rand::random::<[u8; 16]>())
}

/// base64(SHA-1(key + GUID)).
pub fn accept_value(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WEBSOCKET_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

pub fn is_reserved_header(name: &str) -> bool {
    RESERVED_HEADERS
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(name.trim()))
}

/// Render the upgrade request. Header names or values that would break the
/// request line structure are rejected.
pub fn build_request(
    endpoint: &Endpoint,
    key: &str,
    headers: &[(String, String)],
) -> Result<String, TransportError> {
    let mut request = format!(
        "GET {} HTTP/1.1\r\n\
         Host: {}\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Key: {}\r\n\
         Sec-WebSocket-Version: 13\r\n",
        endpoint.resource,
        endpoint.host_header(),
        key
    );
    for (name, value) in headers {
        if is_reserved_header(name) {
            debug!(header = %name, "Dropping reserved handshake header");
            continue;
        }
        if name.trim().is_empty() || name.contains([':', '\r', '\n']) {
            return Err(TransportError::Handshake(format!(
                "invalid header name {name:?}"
            )));
        }
        if value.contains(['\r', '\n']) {
            return Err(TransportError::Handshake(format!(
                "invalid value for header {name}"
            )));
        }
        request.push_str(name);
        request.push_str(": ");
        request.push_str(value);
        request.push_str("\r\n");
    }
    request.push_str("\r\n");
    Ok(request)
}

/// Index just past the first CRLFCRLF, if present.
pub fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4)
        .position(|window| window == b"\r\n\r\n")
        .map(|pos| pos + 4)
}

/// Parsed status line and headers of the upgrade response.
#[derive(Debug, Clone)]
pub struct HandshakeResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
}

impl HandshakeResponse {
    pub fn parse(head: &[u8]) -> Result<Self, TransportError> {
        let text = std::str::from_utf8(head)
            .map_err(|_| TransportError::Handshake("response head is not UTF-8".into()))?;
        let mut lines = text.split("\r\n");

        let status_line = lines
            .next()
            .ok_or_else(|| TransportError::Handshake("empty response".into()))?;
        let mut parts = status_line.split_whitespace();
        let version = parts.next().unwrap_or_default();
        if !version.starts_with("HTTP/") {
            return Err(TransportError::Handshake(format!(
                "bad status line: {status_line:?}"
            )));
        }
        let status = parts
            .next()
            .and_then(|code| code.parse::<u16>().ok())
            .ok_or_else(|| TransportError::Handshake(format!("bad status line: {status_line:?}")))?;

        let headers = lines
            .filter(|line| !line.is_empty())
            .filter_map(|line| {
                let (name, value) = line.split_once(':')?;
                Some((name.trim().to_string(), value.trim().to_string()))
            })
            .collect();

        Ok(Self { status, headers })
    }

    /// First header with this name, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Check the response against the key we sent.
    pub fn validate(&self, key: &str) -> Result<(), TransportError> {
        if self.status != 101 {
            return Err(TransportError::InvalidStatusCode(self.status));
        }

        let upgrade = self
            .header("Upgrade")
            .ok_or(TransportError::MissingHeader("Upgrade"))?;
        if !upgrade.eq_ignore_ascii_case("websocket") {
            return Err(TransportError::InvalidUpgradeHeader(upgrade.to_string()));
        }

        let connection = self
            .header("Connection")
            .ok_or(TransportError::MissingHeader("Connection"))?;
        let has_upgrade_token = connection
            .split(',')
            .any(|token| token.trim().eq_ignore_ascii_case("upgrade"));
        if !has_upgrade_token {
            return Err(TransportError::InvalidConnectionHeader(
                connection.to_string(),
            ));
        }

        let accept = self
            .header("Sec-WebSocket-Accept")
            .ok_or(TransportError::MissingHeader("Sec-WebSocket-Accept"))?;
        if accept != accept_value(key) {
            return Err(TransportError::InvalidAcceptValue);
        }

        Ok(())
    }
}

/// Run the opening handshake over `stream`.
///
/// Returns any bytes that arrived after the response head; they belong to
/// the first WebSocket frame.
pub async fn perform<S>(
    stream: &mut S,
    endpoint: &Endpoint,
    headers: &[(String, String)],
) -> Result<Vec<u8>, TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let key = generate_key();
    let request = build_request(endpoint, &key, headers)?;
    stream.write_all(request.as_bytes()).await?;
    stream.flush().await?;

    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 4096];
    let head_end = loop {
        if let Some(end) = find_header_end(&buf) {
            break end;
        }
        if buf.len() > MAX_RESPONSE_HEAD {
            return Err(TransportError::Handshake(
                "response header block too large".into(),
            ));
        }
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(TransportError::Handshake(
                "connection closed during handshake".into(),
            ));
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let response = HandshakeResponse::parse(&buf[..head_end - 4])?;
    response.validate(&key)?;
    debug!(
        host = %endpoint.host,
        resource = %endpoint.resource,
        leftover = buf.len() - head_end,
        "WebSocket handshake complete"
    );

    Ok(buf.split_off(head_end))
}
