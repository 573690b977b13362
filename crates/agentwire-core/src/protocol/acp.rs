//! Agent Client Protocol dialect.

use serde_json::{Value, json};
use tracing::debug;

use super::actions::{
    AgentCapabilities, PromptCapabilities, ResponseAction, ResponseContext, SessionSummary,
};
use super::dialect::{Dialect, DialectKind, OutboundCall};
use super::fields::{self, str_at};
use super::methods;
use super::response;
use super::updates::{
    PermissionOption, PermissionRequest, SessionEvent, ToolCallInfo, classify_update,
};
use crate::config::ClientInfo;

pub const PROTOCOL_VERSION: i64 = 1;

#[derive(Debug, Clone, Copy, Default)]
pub struct AcpDialect;

fn flag(value: Option<&Value>, key: &str) -> bool {
    value
        .and_then(|v| v.get(key))
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

/// A capability given as an object (possibly empty) or `true`.
fn present(value: Option<&Value>, key: &str) -> bool {
    match value.and_then(|v| v.get(key)) {
        Some(Value::Bool(b)) => *b,
        Some(Value::Object(_)) => true,
        _ => false,
    }
}

pub(crate) fn parse_capabilities(result: &Value) -> AgentCapabilities {
    let caps = result.get("agentCapabilities");
    let session_caps = caps.and_then(|c| c.get("sessionCapabilities"));
    let prompt = caps.and_then(|c| c.get("promptCapabilities"));
    let info = result.get("agentInfo");

    AgentCapabilities {
        protocol_version: result.get("protocolVersion").and_then(Value::as_i64),
        load_session: flag(caps, "loadSession"),
        list_sessions: present(session_caps, "list") || flag(caps, "listSessions"),
        resume_session: present(session_caps, "resume") || flag(caps, "resumeSession"),
        prompt: PromptCapabilities {
            image: flag(prompt, "image"),
            audio: flag(prompt, "audio"),
            embedded_context: flag(prompt, "embeddedContext"),
        },
        agent_name: info.and_then(|i| str_at(i, "name")).map(str::to_string),
        agent_version: info.and_then(|i| str_at(i, "version")).map(str::to_string),
        auth_methods: result
            .get("authMethods")
            .and_then(Value::as_array)
            .map(|methods| {
                methods
                    .iter()
                    .filter_map(|m| str_at(m, "id").map(str::to_string))
                    .collect()
            })
            .unwrap_or_default(),
    }
}

fn parse_session_list(result: &Value) -> ResponseAction {
    let sessions = result
        .get("sessions")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    Some(SessionSummary {
                        session_id: fields::first_string(item, fields::SESSION_ID_KEYS)?,
                        cwd: fields::cwd(item),
                        title: str_at(item, "title").map(str::to_string),
                        updated_at: fields::string_at(item, "updatedAt"),
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    ResponseAction::SessionsListed {
        sessions,
        next_cursor: str_at(result, "nextCursor").map(str::to_string),
    }
}

impl Dialect for AcpDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Acp
    }

    fn initialize_request(&self, client: &ClientInfo) -> OutboundCall {
        OutboundCall::request(
            methods::INITIALIZE,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "clientCapabilities": {
                    "fs": {"readTextFile": false, "writeTextFile": false},
                    "terminal": false
                },
                "clientInfo": {"name": client.name, "version": client.version}
            }),
        )
    }

    fn new_session_request(&self, cwd: &str) -> OutboundCall {
        OutboundCall::request(methods::SESSION_NEW, json!({"cwd": cwd, "mcpServers": []}))
    }

    fn load_session_request(&self, session_id: &str, cwd: &str) -> OutboundCall {
        OutboundCall::request(
            methods::SESSION_LOAD,
            json!({"sessionId": session_id, "cwd": cwd, "mcpServers": []}),
        )
    }

    fn prompt_request(&self, session_id: &str, text: &str) -> OutboundCall {
        OutboundCall::request(
            methods::SESSION_PROMPT,
            json!({
                "sessionId": session_id,
                "prompt": [{"type": "text", "text": text}]
            }),
        )
    }

    fn cancel_request(&self, session_id: &str, _turn_id: Option<&str>) -> OutboundCall {
        OutboundCall::notification(methods::SESSION_CANCEL, json!({"sessionId": session_id}))
    }

    fn list_sessions_request(&self, cursor: Option<&str>) -> OutboundCall {
        let params = match cursor {
            Some(cursor) => json!({"cursor": cursor}),
            None => json!({}),
        };
        OutboundCall::request(methods::SESSION_LIST, params)
    }

    fn interpret_result(&self, ctx: &ResponseContext, result: &Value) -> Vec<ResponseAction> {
        match ctx.method.as_str() {
            methods::INITIALIZE => {
                vec![ResponseAction::CapabilitiesConfirmed(parse_capabilities(result))]
            }
            methods::SESSION_LIST => vec![parse_session_list(result)],
            methods::SESSION_PROMPT => vec![ResponseAction::PromptCompleted {
                stop_reason: str_at(result, "stopReason").map(str::to_string),
            }],
            methods::SESSION_SET_MODE => response::mode_change(ctx, result).into_iter().collect(),
            _ => Vec::new(),
        }
    }

    fn interpret_notification(&self, method: &str, params: &Value) -> Option<SessionEvent> {
        if method != methods::SESSION_UPDATE {
            debug!(method, "Unhandled notification");
            return None;
        }
        let update = params
            .get("update")
            .filter(|u| u.is_object())
            .or_else(|| params.get("sessionUpdate").filter(|u| u.is_object()))
            .unwrap_or(params);
        let session_id = fields::session_id(params);
        classify_update(update).map(|update| SessionEvent::new(session_id, update))
    }

    fn interpret_request(&self, method: &str, params: &Value) -> Option<PermissionRequest> {
        if method != methods::SESSION_REQUEST_PERMISSION {
            return None;
        }
        let options = params
            .get("options")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| {
                        let id = str_at(item, "optionId").or_else(|| str_at(item, "id"))?;
                        Some(PermissionOption {
                            id: id.to_string(),
                            name: str_at(item, "name").unwrap_or(id).to_string(),
                            kind: str_at(item, "kind").map(str::to_string),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        Some(PermissionRequest {
            session_id: fields::session_id(params),
            tool_call: params.get("toolCall").and_then(ToolCallInfo::from_value),
            options,
            reason: None,
        })
    }

    fn permission_response(&self, option_id: Option<&str>) -> Value {
        match option_id {
            Some(id) => json!({"outcome": {"outcome": "selected", "optionId": id}}),
            None => json!({"outcome": {"outcome": "cancelled"}}),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::updates::SessionUpdate;

    #[test]
    fn test_initialize_capabilities() {
        let actions = AcpDialect.interpret_response(
            &ResponseContext::new("initialize"),
            &Ok(json!({
                "protocolVersion": 1,
                "agentCapabilities": {
                    "loadSession": true,
                    "sessionCapabilities": {"list": {}},
                    "promptCapabilities": {"image": true, "embeddedContext": true}
                },
                "agentInfo": {"name": "demo-agent", "version": "0.3.0"},
                "authMethods": [{"id": "api-key", "name": "API key"}]
            })),
        );
        let [ResponseAction::CapabilitiesConfirmed(caps)] = actions.as_slice() else {
            panic!("expected capabilities, got {actions:?}");
        };
        assert!(caps.load_session);
        assert!(caps.list_sessions);
        assert!(!caps.resume_session);
        assert!(caps.prompt.image && !caps.prompt.audio);
        assert_eq!(caps.agent_name.as_deref(), Some("demo-agent"));
        assert_eq!(caps.auth_methods, vec!["api-key".to_string()]);
    }

    #[test]
    fn test_session_list() {
        let actions = AcpDialect.interpret_response(
            &ResponseContext::new("session/list"),
            &Ok(json!({
                "sessions": [
                    {"sessionId": "a", "cwd": "/x", "title": "First", "updatedAt": "2025-01-01T00:00:00Z"},
                    {"title": "no id"}
                ],
                "nextCursor": "c2"
            })),
        );
        let [ResponseAction::SessionsListed { sessions, next_cursor }] = actions.as_slice() else {
            panic!("expected listing");
        };
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].title.as_deref(), Some("First"));
        assert_eq!(next_cursor.as_deref(), Some("c2"));
    }

    #[test]
    fn test_prompt_completed() {
        let actions = AcpDialect.interpret_response(
            &ResponseContext::new("session/prompt").with_session("s1"),
            &Ok(json!({"stopReason": "end_turn"})),
        );
        assert_eq!(
            actions,
            vec![ResponseAction::PromptCompleted {
                stop_reason: Some("end_turn".into())
            }]
        );
    }

    #[test]
    fn test_session_update_notification() {
        let event = AcpDialect
            .interpret_notification(
                "session/update",
                &json!({
                    "sessionId": "s1",
                    "update": {"sessionUpdate": "agent_message_chunk", "content": {"type": "text", "text": "Hi"}}
                }),
            )
            .unwrap();
        assert_eq!(event.session_id.as_deref(), Some("s1"));
        assert_eq!(event.update, SessionUpdate::AgentMessageChunk { text: "Hi".into() });
    }

    #[test]
    fn test_other_notifications_ignored() {
        assert!(
            AcpDialect
                .interpret_notification("session/unknown", &json!({}))
                .is_none()
        );
    }

    #[test]
    fn test_permission_request() {
        let request = AcpDialect
            .interpret_request(
                "session/request_permission",
                &json!({
                    "sessionId": "s1",
                    "toolCall": {"toolCallId": "tc1", "title": "Edit main.rs", "kind": "edit"},
                    "options": [
                        {"optionId": "allow", "name": "Allow once", "kind": "allow_once"},
                        {"optionId": "deny", "name": "Reject", "kind": "reject_once"}
                    ]
                }),
            )
            .unwrap();
        assert_eq!(request.options.len(), 2);
        assert_eq!(request.tool_call.unwrap().title, "Edit main.rs");
        assert_eq!(
            AcpDialect.permission_response(Some("allow")),
            json!({"outcome": {"outcome": "selected", "optionId": "allow"}})
        );
    }

    #[test]
    fn test_cancel_is_notification() {
        let cancel = AcpDialect.cancel_request("s1", None);
        assert!(cancel.notification);
        assert_eq!(cancel.method, "session/cancel");
    }
}
