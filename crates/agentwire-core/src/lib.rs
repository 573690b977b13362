// ── agentwire Core Library ───────────────────────────────────────────────────
//
// Client-side plumbing for talking to coding agents over WebSocket:
// the RFC 6455 transport, JSON-RPC call correlation, and interpretation of
// the Agent Client Protocol and app-server dialects.

pub mod args;
pub mod config;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod rpc;
pub mod transport;

pub use config::ClientConfig;
pub use error::{CallError, RpcError, TransportError};
pub use protocol::{Dialect, DialectKind, ResponseAction, SessionEvent, SessionUpdate};
pub use rpc::{AgentService, ConnectionState, JsonEncoding, RequestId, ServiceEvent, WireMessage};
pub use transport::{Connection, ConnectionEvent, ProviderKind};
