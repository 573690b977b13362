//! Scripted in-memory connection shared by the service-level tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use agentwire_core::transport::Connection;
use agentwire_core::{
    AgentService, ConnectionEvent, JsonEncoding, ServiceEvent, TransportError,
};
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{Mutex, Notify, mpsc};
use tokio::time::timeout;

pub const WAIT: Duration = Duration::from_secs(5);

/// Connection whose inbound side is fed by the test and whose outbound
/// side is observed by it.
pub struct ScriptedConnection {
    inbound: Mutex<mpsc::UnboundedReceiver<ConnectionEvent>>,
    outbound: mpsc::UnboundedSender<String>,
    pub refuse_connect: AtomicBool,
    pub refuse_send: AtomicBool,
    /// When set, `connect` blocks until `release_connect` is notified.
    pub hold_connect: AtomicBool,
    pub release_connect: Notify,
    pub close_calls: AtomicUsize,
}

#[async_trait]
impl Connection for ScriptedConnection {
    async fn connect(&self, _url: &str, _headers: &[(String, String)]) -> Result<(), TransportError> {
        if self.hold_connect.load(Ordering::SeqCst) {
            self.release_connect.notified().await;
        }
        if self.refuse_connect.load(Ordering::SeqCst) {
            return Err(TransportError::InvalidStatusCode(403));
        }
        Ok(())
    }

    async fn send(&self, text: &str) -> Result<(), TransportError> {
        if self.refuse_send.load(Ordering::SeqCst) {
            return Err(TransportError::Disconnected);
        }
        self.outbound
            .send(text.to_string())
            .map_err(|_| TransportError::Disconnected)
    }

    async fn receive(&self) -> Result<ConnectionEvent, TransportError> {
        let mut inbound = self.inbound.lock().await;
        Ok(inbound
            .recv()
            .await
            .unwrap_or_else(ConnectionEvent::abnormal_close))
    }

    async fn close(&self) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
    }

    async fn ping(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// The test's end of the scripted connection.
pub struct Peer {
    pub connection: Arc<ScriptedConnection>,
    pub inbound: mpsc::UnboundedSender<ConnectionEvent>,
    pub outbound: mpsc::UnboundedReceiver<String>,
}

impl Peer {
    pub fn new() -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        Self {
            connection: Arc::new(ScriptedConnection {
                inbound: Mutex::new(inbound_rx),
                outbound: outbound_tx,
                refuse_connect: AtomicBool::new(false),
                refuse_send: AtomicBool::new(false),
                hold_connect: AtomicBool::new(false),
                release_connect: Notify::new(),
                close_calls: AtomicUsize::new(0),
            }),
            inbound: inbound_tx,
            outbound: outbound_rx,
        }
    }

    pub fn push_text(&self, text: impl Into<String>) {
        self.inbound
            .send(ConnectionEvent::Text(text.into()))
            .unwrap();
    }

    pub fn push_json(&self, value: Value) {
        self.push_text(value.to_string());
    }

    pub fn push_close(&self) {
        self.inbound
            .send(ConnectionEvent::Closed {
                code: 1000,
                reason: String::new(),
            })
            .unwrap();
    }

    pub async fn next_sent(&mut self) -> Value {
        let text = timeout(WAIT, self.outbound.recv())
            .await
            .expect("nothing sent")
            .expect("connection gone");
        serde_json::from_str(&text).unwrap()
    }
}

pub async fn connected() -> (Arc<AgentService>, mpsc::Receiver<ServiceEvent>, Peer) {
    let peer = Peer::new();
    let (service, events) = AgentService::new(peer.connection.clone(), JsonEncoding::Plain, 64);
    service.connect("ws://agent.test/", &[]).await.unwrap();
    (Arc::new(service), events, peer)
}

/// Next event that is not a state change or send notice.
pub async fn next_event(events: &mut mpsc::Receiver<ServiceEvent>) -> ServiceEvent {
    loop {
        let event = timeout(WAIT, events.recv())
            .await
            .expect("no event")
            .expect("event channel closed");
        match event {
            ServiceEvent::StateChanged(_) | ServiceEvent::WillSend { .. } => continue,
            other => return other,
        }
    }
}
