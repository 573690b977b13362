//! Connection lifecycle and JSON-RPC dispatch over a [`Connection`].
//!
//! [`AgentService`] owns one connection, the pending-call table, and a reader
//! task. Inbound responses resolve pending calls; everything else is
//! published as a [`ServiceEvent`] on a bounded channel, in peer order.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use strum::Display;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::correlator::PendingCalls;
use super::message::{JsonEncoding, RequestId, WireMessage};
use crate::config::ClientConfig;
use crate::error::{CallError, RpcError, TransportError};
use crate::transport::{Connection, ConnectionEvent};

/// Default capacity of the event channel.
pub const DEFAULT_EVENT_BUFFER: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Everything the service publishes besides call results.
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceEvent {
    StateChanged(ConnectionState),
    /// Peer notification, e.g. `session/update`.
    Notification { method: String, params: Value },
    /// Peer request that expects [`AgentService::respond`].
    ServerRequest {
        id: RequestId,
        method: String,
        params: Value,
    },
    /// A request is about to be written.
    WillSend { id: u64, method: String },
    /// Inbound text that is not a JSON-RPC message.
    Malformed { raw: String, reason: String },
}

struct Shared {
    connection: Arc<dyn Connection>,
    pending: PendingCalls,
    state: watch::Sender<ConnectionState>,
    events: mpsc::Sender<ServiceEvent>,
    encoding: JsonEncoding,
    /// Bumped on every connect and close; a reader only tears down the
    /// connection it was started for.
    generation: AtomicU64,
}

impl Shared {
    fn set_state(&self, state: ConnectionState) {
        let changed = self.state.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
        if changed {
            debug!(%state, "Connection state changed");
            self.publish_lossy(ServiceEvent::StateChanged(state));
        }
    }

    /// For diagnostics that must never block a caller.
    fn publish_lossy(&self, event: ServiceEvent) {
        if let Err(err) = self.events.try_send(event) {
            debug!(error = %err, "Event dropped");
        }
    }

    async fn publish(&self, event: ServiceEvent) {
        if self.events.send(event).await.is_err() {
            debug!("Event receiver gone");
        }
    }

    fn disconnect(&self) {
        let failed = self.pending.fail_all();
        if failed > 0 {
            info!(failed, "Pending calls failed by disconnect");
        }
        self.set_state(ConnectionState::Disconnected);
    }

    async fn dispatch(&self, text: String) {
        let message = match WireMessage::decode(&text) {
            Ok(message) => message,
            Err(err) => {
                warn!(error = %err, "Malformed inbound message");
                self.publish(ServiceEvent::Malformed {
                    raw: text,
                    reason: err.to_string(),
                })
                .await;
                return;
            }
        };

        match message {
            WireMessage::Response { id, outcome } => {
                debug!(%id, ok = outcome.is_ok(), "<- response");
                self.pending.resolve(&id, outcome.map_err(CallError::Rpc));
            }
            WireMessage::Notification { method, params } => {
                debug!(%method, "<- notification");
                self.publish(ServiceEvent::Notification { method, params })
                    .await;
            }
            WireMessage::Request { id, method, params } => {
                debug!(%id, %method, "<- server request");
                self.publish(ServiceEvent::ServerRequest { id, method, params })
                    .await;
            }
        }
    }

    async fn read_loop(self: Arc<Self>, generation: u64) {
        loop {
            let event = self.connection.receive().await;
            if self.generation.load(Ordering::SeqCst) != generation {
                debug!("Reader superseded");
                return;
            }
            match event {
                Ok(ConnectionEvent::Text(text)) => self.dispatch(text).await,
                Ok(ConnectionEvent::Binary(data)) => {
                    debug!(len = data.len(), "Ignoring binary message");
                }
                Ok(ConnectionEvent::Closed { code, reason }) => {
                    info!(code, reason = %reason, "Connection closed");
                    self.connection.close().await;
                    break;
                }
                Err(err) => {
                    warn!(error = %err, "Connection failed");
                    self.connection.close().await;
                    break;
                }
            }
        }

        if self.generation.load(Ordering::SeqCst) == generation {
            self.disconnect();
        }
    }
}

/// JSON-RPC client facade over one [`Connection`].
pub struct AgentService {
    shared: Arc<Shared>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl AgentService {
    /// Returns the service and the receiving end of its event channel.
    pub fn new(
        connection: Arc<dyn Connection>,
        encoding: JsonEncoding,
        event_buffer: usize,
    ) -> (Self, mpsc::Receiver<ServiceEvent>) {
        let (events, rx) = mpsc::channel(event_buffer.max(1));
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let service = Self {
            shared: Arc::new(Shared {
                connection,
                pending: PendingCalls::new(),
                state,
                events,
                encoding,
                generation: AtomicU64::new(0),
            }),
            reader: Mutex::new(None),
        };
        (service, rx)
    }

    /// Build the configured provider and wrap it.
    pub fn from_config(config: &ClientConfig) -> (Self, mpsc::Receiver<ServiceEvent>) {
        Self::new(
            config.provider.build(),
            config.json_encoding,
            config.event_buffer,
        )
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    pub fn pending_calls(&self) -> usize {
        self.shared.pending.len()
    }

    fn take_reader(&self) -> Option<JoinHandle<()>> {
        self.reader
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }

    /// Open the connection and start reading. Any previous connection is
    /// torn down first and its pending calls fail.
    pub async fn connect(&self, url: &str, headers: &[(String, String)]) -> Result<(), TransportError> {
        let shared = &self.shared;
        let generation = shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(reader) = self.take_reader() {
            reader.abort();
        }
        shared.pending.fail_all();

        shared.set_state(ConnectionState::Connecting);
        shared.pending.open();
        info!(url, "Connecting");

        if let Err(err) = shared.connection.connect(url, headers).await {
            warn!(url, error = %err, "Connect failed");
            if shared.generation.load(Ordering::SeqCst) == generation {
                shared.disconnect();
            }
            return Err(err);
        }

        shared.set_state(ConnectionState::Connected);
        let reader = tokio::spawn(shared.clone().read_loop(generation));
        *self
            .reader
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(reader);
        Ok(())
    }

    /// Admit outbound traffic. While a connect is in progress this waits for
    /// it to settle, so an early call goes out once the handshake is done.
    async fn check_gate(&self) -> Result<(), CallError> {
        let mut state = self.shared.state.subscribe();
        let connected = state
            .wait_for(|state| *state != ConnectionState::Connecting)
            .await
            .map(|state| *state == ConnectionState::Connected);
        match connected {
            Ok(true) => Ok(()),
            _ => Err(CallError::Disconnected),
        }
    }

    /// Send a request and wait for its response.
    ///
    /// Resolves with `Disconnected` if the connection drops first. There is
    /// no timeout; race this against `tokio::time::timeout` if needed.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, CallError> {
        self.check_gate().await?;
        let shared = &self.shared;

        let id = shared.pending.next_id();
        let text = WireMessage::request(id, method, params)
            .encode(shared.encoding)
            .map_err(TransportError::from)?;

        shared.publish_lossy(ServiceEvent::WillSend {
            id,
            method: method.to_string(),
        });
        let rx = shared.pending.register(id)?;

        debug!(id, method, "-> request");
        if let Err(err) = shared.connection.send(&text).await {
            warn!(id, method, error = %err, "Request not sent");
            shared.pending.fail(id, CallError::Transport(err));
        }

        rx.await.unwrap_or(Err(CallError::Disconnected))
    }

    /// Send a notification; no response is expected.
    pub async fn notify(&self, method: &str, params: Value) -> Result<(), CallError> {
        self.check_gate().await?;
        let text = WireMessage::notification(method, params)
            .encode(self.shared.encoding)
            .map_err(TransportError::from)?;
        debug!(method, "-> notification");
        self.shared.connection.send(&text).await?;
        Ok(())
    }

    /// Answer a [`ServiceEvent::ServerRequest`].
    pub async fn respond(&self, id: RequestId, result: Value) -> Result<(), CallError> {
        self.send_response(id, Ok(result)).await
    }

    pub async fn respond_error(&self, id: RequestId, error: RpcError) -> Result<(), CallError> {
        self.send_response(id, Err(error)).await
    }

    async fn send_response(
        &self,
        id: RequestId,
        outcome: Result<Value, RpcError>,
    ) -> Result<(), CallError> {
        self.check_gate().await?;
        let text = WireMessage::Response { id, outcome }
            .encode(self.shared.encoding)
            .map_err(TransportError::from)?;
        self.shared.connection.send(&text).await?;
        Ok(())
    }

    pub async fn ping(&self) -> Result<(), CallError> {
        self.check_gate().await?;
        self.shared.connection.ping().await?;
        Ok(())
    }

    /// Close the connection. Pending calls fail with `Disconnected`.
    pub async fn close(&self) {
        let shared = &self.shared;
        shared.generation.fetch_add(1, Ordering::SeqCst);
        shared.connection.close().await;
        if let Some(reader) = self.take_reader() {
            reader.abort();
        }
        shared.disconnect();
        info!("Service closed");
    }
}

impl Drop for AgentService {
    fn drop(&mut self) {
        if let Some(reader) = self.take_reader() {
            reader.abort();
        }
    }
}
