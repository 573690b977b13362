//! [`Connection`] backed by `tokio-tungstenite`.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::Mutex as StdMutex;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use super::endpoint::Endpoint;
use super::frame::CLOSE_NO_STATUS;
use super::handshake::is_reserved_header;
use super::{Connection, ConnectionEvent};
use crate::error::TransportError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct TungsteniteConnection {
    sink: Mutex<Option<SplitSink<WsStream, Message>>>,
    stream: Mutex<Option<SplitStream<WsStream>>>,
    shutdown: StdMutex<CancellationToken>,
}

impl Default for TungsteniteConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl TungsteniteConnection {
    pub fn new() -> Self {
        Self {
            sink: Mutex::new(None),
            stream: Mutex::new(None),
            shutdown: StdMutex::new(CancellationToken::new()),
        }
    }

    fn token(&self) -> std::sync::MutexGuard<'_, CancellationToken> {
        self.shutdown
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn write(&self, message: Message) -> Result<(), TransportError> {
        let mut guard = self.sink.lock().await;
        let sink = guard.as_mut().ok_or(TransportError::Disconnected)?;
        sink.send(message).await.map_err(map_error)
    }
}

/// Translate library errors into the shared transport error type.
fn map_error(err: tungstenite::Error) -> TransportError {
    match err {
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
            TransportError::Disconnected
        }
        tungstenite::Error::Io(e) => TransportError::Io(e),
        tungstenite::Error::Url(e) => TransportError::InvalidUrl(e.to_string()),
        tungstenite::Error::Http(response) => {
            TransportError::InvalidStatusCode(response.status().as_u16())
        }
        tungstenite::Error::Protocol(ProtocolError::SecWebSocketAcceptKeyMismatch) => {
            TransportError::InvalidAcceptValue
        }
        tungstenite::Error::Protocol(ProtocolError::MissingUpgradeWebSocketHeader) => {
            TransportError::InvalidUpgradeHeader(String::new())
        }
        tungstenite::Error::Protocol(ProtocolError::MissingConnectionUpgradeHeader) => {
            TransportError::InvalidConnectionHeader(String::new())
        }
        other => TransportError::MalformedFrame(other.to_string()),
    }
}

#[async_trait]
impl Connection for TungsteniteConnection {
    async fn connect(&self, url: &str, headers: &[(String, String)]) -> Result<(), TransportError> {
        self.close().await;

        // Same URL rules as the wire provider.
        let endpoint = Endpoint::parse(url)?;

        let mut request = url.into_client_request().map_err(map_error)?;
        for (name, value) in headers {
            if is_reserved_header(name) {
                continue;
            }
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| TransportError::Handshake(format!("header {name}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| TransportError::Handshake(format!("header value: {e}")))?;
            request.headers_mut().append(name, value);
        }

        let (ws, response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(map_error)?;
        debug!(status = %response.status(), "Upgrade accepted");

        let (sink, stream) = ws.split();
        *self.token() = CancellationToken::new();
        *self.sink.lock().await = Some(sink);
        *self.stream.lock().await = Some(stream);

        info!(host = %endpoint.host, port = endpoint.port, "WebSocket connected (tungstenite)");
        Ok(())
    }

    async fn send(&self, text: &str) -> Result<(), TransportError> {
        self.write(Message::text(text)).await
    }

    async fn receive(&self) -> Result<ConnectionEvent, TransportError> {
        let shutdown = self.token().clone();
        let mut guard = self.stream.lock().await;
        let stream = guard.as_mut().ok_or(TransportError::Disconnected)?;

        loop {
            let next = tokio::select! {
                next = stream.next() => next,
                _ = shutdown.cancelled() => return Ok(ConnectionEvent::abnormal_close()),
            };
            let message = match next {
                None => return Ok(ConnectionEvent::abnormal_close()),
                Some(Err(
                    tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed,
                )) => return Ok(ConnectionEvent::abnormal_close()),
                Some(Err(tungstenite::Error::Io(e))) => {
                    debug!(error = %e, "Socket read failed");
                    return Ok(ConnectionEvent::abnormal_close());
                }
                Some(Err(e)) => return Err(map_error(e)),
                Some(Ok(message)) => message,
            };

            match message {
                Message::Text(text) => return Ok(ConnectionEvent::Text(text.to_string())),
                Message::Binary(data) => return Ok(ConnectionEvent::Binary(data.to_vec())),
                Message::Close(frame) => {
                    let (code, reason) = frame
                        .map(|f| (u16::from(f.code), f.reason.to_string()))
                        .unwrap_or((CLOSE_NO_STATUS, String::new()));
                    info!(code, reason = %reason, "WebSocket closed by peer");
                    return Ok(ConnectionEvent::Closed { code, reason });
                }
                // The library queues the pong reply itself.
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {
                    trace!("Control frame handled by tungstenite");
                }
            }
        }
    }

    async fn close(&self) {
        self.token().cancel();
        if let Some(mut sink) = self.sink.lock().await.take() {
            if let Err(err) = sink.send(Message::Close(None)).await {
                trace!(error = %err, "Close frame not delivered");
            }
            let _ = sink.close().await;
        }
        *self.stream.lock().await = None;
    }

    async fn ping(&self) -> Result<(), TransportError> {
        self.write(Message::Ping(Vec::new().into())).await
    }
}
