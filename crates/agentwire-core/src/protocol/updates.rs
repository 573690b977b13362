//! Streaming session events and the records they carry.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::Display;

use super::fields::{self, normalize_key, str_at};
use super::modes::{self, ConfigOption};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallInfo {
    pub id: String,
    pub title: String,
    pub kind: Option<String>,
    pub status: Option<String>,
    pub locations: Vec<String>,
    pub raw_input: Option<Value>,
}

impl ToolCallInfo {
    /// Parse a tool call object. The id is required; the title falls back
    /// to the kind, then to "Tool call".
    pub fn from_value(value: &Value) -> Option<Self> {
        let id = fields::tool_call_id(value)?;
        let kind = str_at(value, "kind").map(str::to_string);
        let title = str_at(value, "title")
            .map(str::to_string)
            .or_else(|| kind.clone())
            .unwrap_or_else(|| "Tool call".to_string());
        Some(Self {
            id,
            title,
            kind,
            status: str_at(value, "status").map(str::to_string),
            locations: locations_of(value),
            raw_input: value.get("rawInput").filter(|v| !v.is_null()).cloned(),
        })
    }
}

fn locations_of(value: &Value) -> Vec<String> {
    value
        .get("locations")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|loc| match loc {
                    Value::String(s) => Some(s.clone()),
                    other => str_at(other, "path").map(str::to_string),
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Partial update to a known tool call. Absent fields are unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ToolCallUpdate {
    pub id: String,
    pub title: Option<String>,
    pub status: Option<String>,
    /// Text extracted from `content`, or an output delta.
    pub output: Option<String>,
    pub raw_output: Option<Value>,
}

impl ToolCallUpdate {
    pub fn from_value(value: &Value) -> Option<Self> {
        Some(Self {
            id: fields::tool_call_id(value)?,
            title: str_at(value, "title").map(str::to_string),
            status: str_at(value, "status").map(str::to_string),
            output: fields::extract_text(value),
            raw_output: value.get("rawOutput").filter(|v| !v.is_null()).cloned(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanEntry {
    pub content: String,
    pub priority: Option<String>,
    pub status: Option<String>,
}

impl PlanEntry {
    pub fn from_value(value: &Value) -> Option<Self> {
        let content = str_at(value, "content").or_else(|| str_at(value, "step"))?;
        Some(Self {
            content: content.to_string(),
            priority: str_at(value, "priority").map(str::to_string),
            status: str_at(value, "status").map(str::to_string),
        })
    }
}

pub fn plan_entries(items: Option<&Value>) -> Vec<PlanEntry> {
    items
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(PlanEntry::from_value).collect())
        .unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailableCommand {
    pub name: String,
    pub description: Option<String>,
    pub input_hint: Option<String>,
}

impl AvailableCommand {
    pub fn from_value(value: &Value) -> Option<Self> {
        Some(Self {
            name: str_at(value, "name")?.to_string(),
            description: str_at(value, "description").map(str::to_string),
            input_hint: value
                .get("input")
                .and_then(|input| str_at(input, "hint"))
                .map(str::to_string),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionOption {
    pub id: String,
    pub name: String,
    /// e.g. `allow_once`, `reject_always`
    pub kind: Option<String>,
}

/// A server request asking the user to approve a tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRequest {
    pub session_id: Option<String>,
    pub tool_call: Option<ToolCallInfo>,
    pub options: Vec<PermissionOption>,
    pub reason: Option<String>,
}

/// UI-facing content of one streaming notification.
#[derive(Debug, Clone, PartialEq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum SessionUpdate {
    AgentMessageChunk { text: String },
    AgentThoughtChunk { text: String },
    UserMessageChunk { text: String },
    ToolCallStarted(ToolCallInfo),
    ToolCallUpdated(ToolCallUpdate),
    PlanUpdated { entries: Vec<PlanEntry> },
    ModeChanged { mode_id: String },
    ConfigOptionsUpdated { options: Vec<ConfigOption> },
    AvailableCommandsUpdated { commands: Vec<AvailableCommand> },
    TurnStarted { turn_id: Option<String> },
    TurnCompleted {
        turn_id: Option<String>,
        status: Option<String>,
    },
    ThreadStarted { thread_id: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionEvent {
    pub session_id: Option<String>,
    pub update: SessionUpdate,
}

impl SessionEvent {
    pub fn new(session_id: Option<String>, update: SessionUpdate) -> Self {
        Self { session_id, update }
    }
}

/// Classify an update object by its `sessionUpdate` or `type` field.
///
/// An unknown or missing discriminator falls back to text extraction and
/// yields an agent message chunk only when some text was found.
pub fn classify_update(update: &Value) -> Option<SessionUpdate> {
    let kind = str_at(update, "sessionUpdate")
        .or_else(|| str_at(update, "type"))
        .map(normalize_key)
        .unwrap_or_default();

    let text = || fields::extract_text(update);

    match kind.as_str() {
        "agentmessagechunk" => text().map(|text| SessionUpdate::AgentMessageChunk { text }),
        "agentthoughtchunk" => text().map(|text| SessionUpdate::AgentThoughtChunk { text }),
        "usermessagechunk" => text().map(|text| SessionUpdate::UserMessageChunk { text }),
        "toolcall" => ToolCallInfo::from_value(update).map(SessionUpdate::ToolCallStarted),
        "toolcallupdate" => ToolCallUpdate::from_value(update).map(SessionUpdate::ToolCallUpdated),
        "plan" => Some(SessionUpdate::PlanUpdated {
            entries: plan_entries(update.get("entries")),
        }),
        "currentmodeupdate" | "modeupdate" | "modechange" | "modechanged" => {
            fields::mode_id(update).map(|mode_id| SessionUpdate::ModeChanged { mode_id })
        }
        "configoptionsupdate" | "configoptionupdate" | "configoptionsupdated" => {
            modes::config_options_in(update)
                .map(|options| SessionUpdate::ConfigOptionsUpdated { options })
        }
        "availablecommandsupdate" | "availablecommandsupdated" => {
            Some(SessionUpdate::AvailableCommandsUpdated {
                commands: update
                    .get("availableCommands")
                    .and_then(Value::as_array)
                    .map(|items| items.iter().filter_map(AvailableCommand::from_value).collect())
                    .unwrap_or_default(),
            })
        }
        _ => text().map(|text| SessionUpdate::AgentMessageChunk { text }),
    }
}
