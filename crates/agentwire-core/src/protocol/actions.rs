//! Actions derived from call responses.

use serde::{Deserialize, Serialize};
use strum::Display;

use super::modes::{ConfigOption, ModesInfo};
use crate::error::RpcError;

/// Optional peer features that can be switched off at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Capability {
    ListSessions,
    LoadSession,
    ResumeSession,
}

/// What the caller knew when it issued the call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseContext {
    pub method: String,
    /// Local id shown before the peer confirmed a real one.
    pub placeholder_id: Option<String>,
    /// Session the call was made for, if any.
    pub pending_session_id: Option<String>,
    pub pending_cwd: Option<String>,
    /// Mode passed to `session/set_mode`.
    pub requested_mode: Option<String>,
}

impl ResponseContext {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            ..Default::default()
        }
    }

    pub fn with_placeholder(mut self, id: impl Into<String>) -> Self {
        self.placeholder_id = Some(id.into());
        self
    }

    pub fn with_session(mut self, id: impl Into<String>) -> Self {
        self.pending_session_id = Some(id.into());
        self
    }

    pub fn with_cwd(mut self, cwd: impl Into<String>) -> Self {
        self.pending_cwd = Some(cwd.into());
        self
    }

    pub fn with_requested_mode(mut self, mode: impl Into<String>) -> Self {
        self.requested_mode = Some(mode.into());
        self
    }
}

/// A session that is now the active context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionActivation {
    pub session_id: String,
    pub cwd: Option<String>,
    pub modes: Option<ModesInfo>,
    pub config_options: Vec<ConfigOption>,
}

impl SessionActivation {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            cwd: None,
            modes: None,
            config_options: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptCapabilities {
    pub image: bool,
    pub audio: bool,
    pub embedded_context: bool,
}

/// Capabilities advertised in the `initialize` result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentCapabilities {
    pub protocol_version: Option<i64>,
    pub load_session: bool,
    pub list_sessions: bool,
    pub resume_session: bool,
    pub prompt: PromptCapabilities,
    pub agent_name: Option<String>,
    pub agent_version: Option<String>,
    pub auth_methods: Vec<String>,
}

impl AgentCapabilities {
    pub fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::ListSessions => self.list_sessions,
            Capability::LoadSession => self.load_session,
            Capability::ResumeSession => self.resume_session,
        }
    }
}

/// One entry of a session listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub cwd: Option<String>,
    pub title: Option<String>,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ResponseAction {
    /// Replace the placeholder id with the confirmed one. Always emitted
    /// before the matching [`ResponseAction::SessionActivated`].
    SessionMigrated { from: String, to: String },
    SessionActivated(SessionActivation),
    /// The session exists on the peer and can be listed or reloaded.
    SessionMaterialized { session_id: String },
    ModeChanged {
        session_id: Option<String>,
        mode_id: String,
    },
    CapabilitiesConfirmed(AgentCapabilities),
    CapabilityDisabled(Capability),
    SessionsListed {
        sessions: Vec<SessionSummary>,
        next_cursor: Option<String>,
    },
    PromptCompleted { stop_reason: Option<String> },
    TurnStarted { turn_id: Option<String> },
    RpcError { method: String, error: RpcError },
}
