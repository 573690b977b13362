//! JSON-RPC layer: envelopes, call correlation and the service facade.

pub mod correlator;
pub mod message;
pub mod service;

pub use correlator::PendingCalls;
pub use message::{EnvelopeError, JsonEncoding, RequestId, WireMessage};
pub use service::{AgentService, ConnectionState, ServiceEvent};
