//! Hand-rolled WebSocket client connection.
//!
//! One [`WireConnection`] owns one socket for one logical connection. The read
//! side (buffer plus fragment assembler) and the write side live behind
//! separate async mutexes so a single reader task can block in `receive`
//! while any number of tasks `send`. Each frame is written under the write
//! lock, so frames from concurrent writers never interleave.

use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_rustls::TlsConnector;
use tokio_rustls::rustls;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::endpoint::Endpoint;
use super::frame::{self, Assembled, FrameAssembler, Opcode};
use super::handshake;
use super::{Connection, ConnectionEvent};
use crate::error::TransportError;

/// Any byte stream the handshake and codec can run over.
pub trait WireStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> WireStream for T {}

type BoxedStream = Box<dyn WireStream>;

struct ReadState {
    half: ReadHalf<BoxedStream>,
    buffer: Vec<u8>,
    assembler: FrameAssembler,
    /// A close frame or EOF has been seen.
    finished: bool,
}

/// RFC 6455 client over TCP or TLS.
pub struct WireConnection {
    reader: Mutex<Option<ReadState>>,
    writer: Mutex<Option<WriteHalf<BoxedStream>>>,
    /// Handshake completed and `close` not yet called.
    open: AtomicBool,
    /// Cancelled by `close` to wake a reader blocked on the socket.
    shutdown: StdMutex<CancellationToken>,
    max_frame_size: usize,
    max_message_size: usize,
}

impl Default for WireConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl WireConnection {
    pub fn new() -> Self {
        Self {
            reader: Mutex::new(None),
            writer: Mutex::new(None),
            open: AtomicBool::new(false),
            shutdown: StdMutex::new(CancellationToken::new()),
            max_frame_size: frame::DEFAULT_MAX_FRAME_SIZE,
            max_message_size: frame::DEFAULT_MAX_MESSAGE_SIZE,
        }
    }

    /// Largest inbound frame payload accepted.
    pub fn with_max_frame_size(mut self, max: usize) -> Self {
        self.max_frame_size = max;
        self
    }

    /// Largest inbound message accepted after reassembly.
    pub fn with_max_message_size(mut self, max: usize) -> Self {
        self.max_message_size = max;
        self
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Run the handshake over an already-open stream and adopt it.
    pub async fn connect_stream<S>(
        &self,
        stream: S,
        endpoint: &Endpoint,
        headers: &[(String, String)],
    ) -> Result<(), TransportError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        self.close().await;

        let mut stream: BoxedStream = Box::new(stream);
        let leftover = handshake::perform(&mut stream, endpoint, headers).await?;
        let (read_half, write_half) = tokio::io::split(stream);

        *self.shutdown_token_slot() = CancellationToken::new();
        *self.reader.lock().await = Some(ReadState {
            half: read_half,
            buffer: leftover,
            assembler: FrameAssembler::with_max_message_size(self.max_message_size),
            finished: false,
        });
        *self.writer.lock().await = Some(write_half);
        self.open.store(true, Ordering::SeqCst);

        info!(
            host = %endpoint.host,
            port = endpoint.port,
            secure = endpoint.secure,
            "WebSocket connected"
        );
        Ok(())
    }

    fn shutdown_token_slot(&self) -> std::sync::MutexGuard<'_, CancellationToken> {
        self.shutdown
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn write_frame(&self, opcode: Opcode, payload: &[u8]) -> Result<(), TransportError> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(TransportError::Disconnected)?;
        let bytes = frame::encode(opcode, payload);
        writer.write_all(&bytes).await?;
        writer.flush().await?;
        trace!(?opcode, len = payload.len(), "Frame written");
        Ok(())
    }

    async fn handle_control(
        &self,
        state: &mut ReadState,
        control: frame::Frame,
    ) -> Option<ConnectionEvent> {
        match control.opcode {
            Opcode::Ping => {
                if let Err(err) = self.write_frame(Opcode::Pong, &control.payload).await {
                    debug!(error = %err, "Failed to answer ping");
                }
                None
            }
            Opcode::Pong => {
                trace!("Pong received");
                None
            }
            Opcode::Close => {
                let (code, reason) = frame::parse_close_payload(&control.payload);
                state.finished = true;
                let echo = if control.payload.len() >= 2 {
                    &control.payload[..2]
                } else {
                    &[][..]
                };
                if let Err(err) = self.write_frame(Opcode::Close, echo).await {
                    debug!(error = %err, "Failed to echo close frame");
                }
                // The closing handshake is done; `close` only releases the socket.
                self.open.store(false, Ordering::SeqCst);
                info!(code, reason = %reason, "WebSocket closed by peer");
                Some(ConnectionEvent::Closed { code, reason })
            }
            _ => None,
        }
    }
}

async fn open_tls(
    tcp: TcpStream,
    host: &str,
) -> Result<tokio_rustls::client::TlsStream<TcpStream>, TransportError> {
    let mut roots = rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = rustls::ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .map_err(|e| TransportError::Tls(e.to_string()))?
    .with_root_certificates(roots)
    .with_no_client_auth();

    let server_name = ServerName::try_from(host.to_string())
        .map_err(|e| TransportError::Tls(format!("invalid server name {host}: {e}")))?;

    TlsConnector::from(Arc::new(config))
        .connect(server_name, tcp)
        .await
        .map_err(|e| TransportError::Tls(e.to_string()))
}

#[async_trait]
impl Connection for WireConnection {
    async fn connect(&self, url: &str, headers: &[(String, String)]) -> Result<(), TransportError> {
        let endpoint = Endpoint::parse(url)?;
        debug!(url, "Opening socket");

        let tcp = TcpStream::connect((endpoint.socket_host(), endpoint.port)).await?;
        if let Err(err) = tcp.set_nodelay(true) {
            debug!(error = %err, "Could not set TCP_NODELAY");
        }

        if endpoint.secure {
            let tls = open_tls(tcp, endpoint.socket_host()).await?;
            self.connect_stream(tls, &endpoint, headers).await
        } else {
            self.connect_stream(tcp, &endpoint, headers).await
        }
    }

    async fn send(&self, text: &str) -> Result<(), TransportError> {
        self.write_frame(Opcode::Text, text.as_bytes()).await
    }

    async fn receive(&self) -> Result<ConnectionEvent, TransportError> {
        let shutdown = self.shutdown_token_slot().clone();
        let mut guard = self.reader.lock().await;
        let state = guard.as_mut().ok_or(TransportError::Disconnected)?;

        loop {
            while let Some((decoded, used)) =
                frame::decode_limited(&state.buffer, self.max_frame_size)?
            {
                state.buffer.drain(..used);
                match state.assembler.push(decoded)? {
                    None => {}
                    Some(Assembled::Message {
                        opcode: Opcode::Text,
                        payload,
                    }) => {
                        return Ok(match String::from_utf8(payload) {
                            Ok(text) => ConnectionEvent::Text(text),
                            Err(err) => {
                                warn!("Text message is not valid UTF-8, delivering as binary");
                                ConnectionEvent::Binary(err.into_bytes())
                            }
                        });
                    }
                    Some(Assembled::Message { payload, .. }) => {
                        return Ok(ConnectionEvent::Binary(payload));
                    }
                    Some(Assembled::Control(control)) => {
                        if let Some(event) = self.handle_control(state, control).await {
                            return Ok(event);
                        }
                    }
                }
            }

            if state.finished {
                return Ok(ConnectionEvent::abnormal_close());
            }

            let read = tokio::select! {
                read = state.half.read_buf(&mut state.buffer) => Some(read?),
                _ = shutdown.cancelled() => None,
            };
            let Some(read) = read else {
                state.finished = true;
                return Ok(ConnectionEvent::abnormal_close());
            };
            if read == 0 {
                state.finished = true;
                warn!("Socket ended without a close frame");
                return Ok(ConnectionEvent::abnormal_close());
            }
        }
    }

    async fn close(&self) {
        self.shutdown_token_slot().cancel();
        let was_open = self.open.swap(false, Ordering::SeqCst);

        let writer = self.writer.lock().await.take();
        if let Some(mut writer) = writer {
            if was_open {
                let bytes = frame::encode(Opcode::Close, &[]);
                if let Err(err) = writer.write_all(&bytes).await {
                    debug!(error = %err, "Close frame not delivered");
                }
            }
            if let Err(err) = writer.shutdown().await {
                trace!(error = %err, "Socket shutdown failed");
            }
        }

        *self.reader.lock().await = None;
        if was_open {
            info!("WebSocket closed");
        }
    }

    async fn ping(&self) -> Result<(), TransportError> {
        self.write_frame(Opcode::Ping, &[]).await
    }
}
