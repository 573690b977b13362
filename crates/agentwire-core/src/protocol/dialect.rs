//! The seam between the wire layer and one agent dialect.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};

use super::acp::AcpDialect;
use super::actions::{ResponseAction, ResponseContext};
use super::app_server::AppServerDialect;
use super::response;
use super::updates::{PermissionRequest, SessionEvent};
use crate::config::ClientInfo;
use crate::error::RpcError;

/// A message a dialect wants sent.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundCall {
    pub method: &'static str,
    pub params: Value,
    /// Sent as a notification; no response follows.
    pub notification: bool,
}

impl OutboundCall {
    pub fn request(method: &'static str, params: Value) -> Self {
        Self {
            method,
            params,
            notification: false,
        }
    }

    pub fn notification(method: &'static str, params: Value) -> Self {
        Self {
            method,
            params,
            notification: true,
        }
    }

    /// Context for interpreting the response to this call.
    pub fn context(&self) -> ResponseContext {
        ResponseContext::new(self.method)
    }
}

/// One JSON-RPC dialect spoken by agent servers.
///
/// Interpretation never fails: anything unrecognised produces no action.
pub trait Dialect: Send + Sync {
    fn kind(&self) -> DialectKind;

    fn initialize_request(&self, client: &ClientInfo) -> OutboundCall;

    fn new_session_request(&self, cwd: &str) -> OutboundCall;

    fn load_session_request(&self, session_id: &str, cwd: &str) -> OutboundCall;

    fn prompt_request(&self, session_id: &str, text: &str) -> OutboundCall;

    /// Stop the running turn. `turn_id` is needed by dialects that address
    /// turns individually.
    fn cancel_request(&self, session_id: &str, turn_id: Option<&str>) -> OutboundCall;

    fn list_sessions_request(&self, cursor: Option<&str>) -> OutboundCall;

    /// Dialect-specific actions for a successful result, appended after the
    /// shared session actions.
    fn interpret_result(&self, ctx: &ResponseContext, result: &Value) -> Vec<ResponseAction>;

    fn interpret_notification(&self, method: &str, params: &Value) -> Option<SessionEvent>;

    /// Server-initiated requests that need a user decision.
    fn interpret_request(&self, method: &str, params: &Value) -> Option<PermissionRequest>;

    /// Reply to a permission request with the chosen option.
    fn permission_response(&self, option_id: Option<&str>) -> Value;

    fn interpret_response(
        &self,
        ctx: &ResponseContext,
        outcome: &Result<Value, RpcError>,
    ) -> Vec<ResponseAction> {
        match outcome {
            Ok(result) => {
                let mut actions = response::session_actions(ctx, result);
                actions.extend(self.interpret_result(ctx, result));
                actions
            }
            Err(error) => response::error_actions(ctx, error),
        }
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum DialectKind {
    /// Agent Client Protocol (`session/*`).
    #[default]
    Acp,
    /// App-server protocol (`thread/*`, `turn/*`, `item/*`).
    AppServer,
}

impl DialectKind {
    pub fn build(self) -> Arc<dyn Dialect> {
        match self {
            Self::Acp => Arc::new(AcpDialect),
            Self::AppServer => Arc::new(AppServerDialect),
        }
    }
}
