//! WebSocket transport.
//!
//! The upper layers only see the [`Connection`] trait. Two providers
//! implement it:
//!
//! - [`WireConnection`]: the hand-rolled RFC 6455 client built on
//!   [`frame`] and [`handshake`], over plain TCP or rustls.
//! - [`TungsteniteConnection`]: the same surface backed by
//!   `tokio-tungstenite`.
//!
//! Both accept concurrent `send` calls from many tasks while a single task
//! loops on `receive`.

pub mod endpoint;
pub mod frame;
pub mod handshake;
pub mod socket;
pub mod tungstenite;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::TransportError;

pub use endpoint::Endpoint;
pub use socket::WireConnection;
pub use tungstenite::TungsteniteConnection;

/// A complete inbound message or the end of the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Text(String),
    Binary(Vec<u8>),
    Closed { code: u16, reason: String },
}

impl ConnectionEvent {
    /// The event reported when the socket ends without a close frame.
    pub fn abnormal_close() -> Self {
        Self::Closed {
            code: frame::CLOSE_ABNORMAL,
            reason: "Connection closed".to_string(),
        }
    }
}

/// The capability every upper layer depends on.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Open the socket and complete the upgrade handshake.
    async fn connect(&self, url: &str, headers: &[(String, String)]) -> Result<(), TransportError>;

    /// Send one text message.
    async fn send(&self, text: &str) -> Result<(), TransportError>;

    /// Wait for the next complete message. Pings are answered internally and
    /// pongs are swallowed; neither is returned.
    async fn receive(&self) -> Result<ConnectionEvent, TransportError>;

    /// Best-effort close frame, then tear down. Safe to call repeatedly.
    async fn close(&self);

    /// Out-of-band ping.
    async fn ping(&self) -> Result<(), TransportError>;
}

/// Which [`Connection`] implementation to use.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum ProviderKind {
    /// Hand-rolled RFC 6455 client.
    #[default]
    Wire,
    /// `tokio-tungstenite`.
    Tungstenite,
}

impl ProviderKind {
    pub fn build(self) -> Arc<dyn Connection> {
        match self {
            Self::Wire => Arc::new(WireConnection::new()),
            Self::Tungstenite => Arc::new(TungsteniteConnection::new()),
        }
    }
}
