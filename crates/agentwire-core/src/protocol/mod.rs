//! Interpretation of agent payloads.
//!
//! Everything here is a pure function of JSON values: results become
//! [`ResponseAction`]s, notifications become [`SessionEvent`]s, and server
//! requests become [`PermissionRequest`]s. Unknown or partial payloads yield
//! nothing rather than an error.

pub mod acp;
pub mod actions;
pub mod app_server;
pub mod dialect;
pub mod fields;
pub mod methods;
pub mod modes;
pub mod response;
pub mod updates;

pub use acp::AcpDialect;
pub use actions::{
    AgentCapabilities, Capability, ResponseAction, ResponseContext, SessionActivation,
    SessionSummary,
};
pub use app_server::AppServerDialect;
pub use dialect::{Dialect, DialectKind, OutboundCall};
pub use modes::{ConfigKind, ConfigOption, ConfigValue, ModesInfo};
pub use updates::{
    AvailableCommand, PermissionOption, PermissionRequest, PlanEntry, SessionEvent, SessionUpdate,
    ToolCallInfo, ToolCallUpdate,
};
