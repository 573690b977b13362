//! WebSocket URL resolution.

use url::Url;

use crate::error::TransportError;

/// A resolved `ws://` or `wss://` target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub secure: bool,
    pub host: String,
    pub port: u16,
    /// Path plus `?query`, as sent on the request line.
    pub resource: String,
}

impl Endpoint {
    pub fn parse(raw: &str) -> Result<Self, TransportError> {
        let url = Url::parse(raw).map_err(|e| TransportError::InvalidUrl(format!("{raw}: {e}")))?;

        let secure = match url.scheme() {
            "ws" => false,
            "wss" => true,
            other => return Err(TransportError::UnsupportedScheme(other.to_string())),
        };

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| TransportError::InvalidUrl(format!("{raw}: missing host")))?
            .to_string();

        let port = url.port().unwrap_or(if secure { 443 } else { 80 });

        let mut resource = url.path().to_string();
        if resource.is_empty() {
            resource.push('/');
        }
        if let Some(query) = url.query() {
            resource.push('?');
            resource.push_str(query);
        }

        Ok(Self {
            secure,
            host,
            port,
            resource,
        })
    }

    pub fn default_port(&self) -> u16 {
        if self.secure { 443 } else { 80 }
    }

    /// Value of the `Host` header. The port is only included when it is not
    /// the scheme default.
    pub fn host_header(&self) -> String {
        if self.port == self.default_port() {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Host without IPv6 brackets, suitable for socket resolution and SNI.
    pub fn socket_host(&self) -> &str {
        self.host.trim_start_matches('[').trim_end_matches(']')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_default_port() {
        let ep = Endpoint::parse("ws://localhost/acp").unwrap();
        assert!(!ep.secure);
        assert_eq!(ep.port, 80);
        assert_eq!(ep.resource, "/acp");
        assert_eq!(ep.host_header(), "localhost");
    }

    #[test]
    fn test_parse_secure_with_query_and_port() {
        let ep = Endpoint::parse("wss://agent.example.com:8443/rpc?token=abc&x=1").unwrap();
        assert!(ep.secure);
        assert_eq!(ep.port, 8443);
        assert_eq!(ep.resource, "/rpc?token=abc&x=1");
        assert_eq!(ep.host_header(), "agent.example.com:8443");
    }

    #[test]
    fn test_parse_empty_path() {
        let ep = Endpoint::parse("wss://example.com").unwrap();
        assert_eq!(ep.port, 443);
        assert_eq!(ep.resource, "/");
    }

    #[test]
    fn test_parse_ipv6_host() {
        let ep = Endpoint::parse("ws://[::1]:9000/").unwrap();
        assert_eq!(ep.socket_host(), "::1");
        assert_eq!(ep.host_header(), "[::1]:9000");
    }

    #[test]
    fn test_unsupported_scheme() {
        let err = Endpoint::parse("http://example.com").unwrap_err();
        assert!(matches!(err, TransportError::UnsupportedScheme(s) if s == "http"));
    }

    #[test]
    fn test_invalid_url() {
        let err = Endpoint::parse("not a url").unwrap_err();
        assert!(matches!(err, TransportError::InvalidUrl(_)));
    }
}
