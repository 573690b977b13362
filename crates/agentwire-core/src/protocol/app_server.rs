//! App-server dialect: threads, turns and items.

use serde_json::{Value, json};
use tracing::debug;

use super::actions::{AgentCapabilities, ResponseAction, ResponseContext, SessionSummary};
use super::dialect::{Dialect, DialectKind, OutboundCall};
use super::fields::{self, str_at};
use super::methods;
use super::updates::{
    PermissionOption, PermissionRequest, SessionEvent, SessionUpdate, ToolCallInfo,
    ToolCallUpdate, plan_entries,
};
use crate::config::ClientInfo;

/// Item types reported as tool calls.
const TOOL_ITEM_TYPES: &[&str] = &["commandExecution", "fileChange", "mcpToolCall", "webSearch"];

#[derive(Debug, Clone, Copy, Default)]
pub struct AppServerDialect;

fn thread_id(params: &Value) -> Option<String> {
    fields::string_at(params, "threadId").or_else(|| fields::session_id(params))
}

fn turn_id(params: &Value) -> Option<String> {
    fields::string_at(params, "turnId").or_else(|| {
        params
            .get("turn")
            .and_then(|turn| fields::string_at(turn, "id"))
    })
}

/// `command` may be a string or an argv array.
fn command_text(value: &Value) -> Option<String> {
    match value.get("command")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Array(parts) => {
            let joined = parts
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(" ");
            (!joined.is_empty()).then_some(joined)
        }
        _ => None,
    }
}

fn item_kind(item_type: &str) -> &'static str {
    match item_type {
        "commandExecution" => "execute",
        "fileChange" => "edit",
        "webSearch" => "fetch",
        _ => "other",
    }
}

fn tool_item_started(item: &Value) -> Option<ToolCallInfo> {
    let item_type = str_at(item, "type")?;
    if !TOOL_ITEM_TYPES.contains(&item_type) {
        return None;
    }
    let id = fields::string_at(item, "id")?;
    let title = command_text(item)
        .or_else(|| str_at(item, "tool").map(str::to_string))
        .or_else(|| str_at(item, "query").map(str::to_string))
        .unwrap_or_else(|| item_type.to_string());
    Some(ToolCallInfo {
        id,
        title,
        kind: Some(item_kind(item_type).to_string()),
        status: Some(
            str_at(item, "status")
                .unwrap_or("inProgress")
                .to_string(),
        ),
        locations: Vec::new(),
        raw_input: None,
    })
}

fn tool_item_completed(item: &Value) -> Option<ToolCallUpdate> {
    let item_type = str_at(item, "type")?;
    if !TOOL_ITEM_TYPES.contains(&item_type) {
        return None;
    }
    Some(ToolCallUpdate {
        id: fields::string_at(item, "id")?,
        title: None,
        status: Some(str_at(item, "status").unwrap_or("completed").to_string()),
        output: str_at(item, "aggregatedOutput").map(str::to_string),
        raw_output: item.get("exitCode").filter(|v| !v.is_null()).cloned(),
    })
}

fn parse_thread_list(result: &Value) -> ResponseAction {
    let items = result
        .get("data")
        .or_else(|| result.get("threads"))
        .and_then(Value::as_array);
    let sessions = items
        .map(|items| {
            items
                .iter()
                .filter_map(|thread| {
                    Some(SessionSummary {
                        session_id: fields::string_at(thread, "id")?,
                        cwd: fields::cwd(thread),
                        title: str_at(thread, "preview")
                            .or_else(|| str_at(thread, "title"))
                            .map(str::to_string),
                        updated_at: fields::string_at(thread, "updatedAt")
                            .or_else(|| fields::string_at(thread, "createdAt")),
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

fn delta(params: &Value) -> Option<String> {
    str_at(params, "delta").map(str::to_string)
}

impl Dialect for AppServerDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::AppServer
    }

    fn initialize_request(&self, client: &ClientInfo) -> OutboundCall {
        OutboundCall::request(
            methods::INITIALIZE,
            json!({"clientInfo": {"name": client.name, "title": client.name, "version": client.version}}),
        )
    }

    fn new_session_request(&self, cwd: &str) -> OutboundCall {
        OutboundCall::request(methods::THREAD_START, json!({"cwd": cwd}))
    }

    fn load_session_request(&self, session_id: &str, cwd: &str) -> OutboundCall {
        OutboundCall::request(
            methods::THREAD_RESUME,
            json!({"threadId": session_id, "cwd": cwd}),
        )
    }

    fn prompt_request(&self, session_id: &str, text: &str) -> OutboundCall {
        OutboundCall::request(
            methods::TURN_START,
            json!({
                "threadId": session_id,
                "input": [{"type": "text", "text": text}]
            }),
        )
    }

    fn cancel_request(&self, session_id: &str, turn_id: Option<&str>) -> OutboundCall {
        let mut params = json!({"threadId": session_id});
        if let Some(turn_id) = turn_id {
            params["turnId"] = json!(turn_id);
        }
        OutboundCall::request(methods::TURN_INTERRUPT, params)
    }

    fn list_sessions_request(&self, cursor: Option<&str>) -> OutboundCall {
        let params = match cursor {
            Some(cursor) => json!({"cursor": cursor}),
            None => json!({}),
        };
        OutboundCall::request(methods::THREAD_LIST, params)
    }

    fn interpret_result(&self, ctx: &ResponseContext, result: &Value) -> Vec<ResponseAction> {
        match ctx.method.as_str() {
            methods::INITIALIZE => vec![ResponseAction::CapabilitiesConfirmed(AgentCapabilities {
                // Threads are always listable and resumable here.
                list_sessions: true,
                resume_session: true,
                agent_name: str_at(result, "userAgent").map(str::to_string),
                ..Default::default()
            })],
            methods::THREAD_LIST => vec![parse_thread_list(result)],
            methods::TURN_START => vec![ResponseAction::TurnStarted {
                turn_id: turn_id(result),
            }],
            _ => Vec::new(),
        }
    }

    fn interpret_notification(&self, method: &str, params: &Value) -> Option<SessionEvent> {
        let update = match method {
            methods::ITEM_AGENT_MESSAGE_DELTA => {
                SessionUpdate::AgentMessageChunk { text: delta(params)? }
            }
            methods::ITEM_REASONING_TEXT_DELTA | methods::ITEM_REASONING_SUMMARY_DELTA => {
                SessionUpdate::AgentThoughtChunk { text: delta(params)? }
            }
            methods::ITEM_COMMAND_OUTPUT_DELTA => SessionUpdate::ToolCallUpdated(ToolCallUpdate {
                id: fields::string_at(params, "itemId")?,
                output: Some(delta(params)?),
                ..Default::default()
            }),
            methods::ITEM_STARTED => {
                SessionUpdate::ToolCallStarted(tool_item_started(params.get("item")?)?)
            }
            methods::ITEM_COMPLETED => {
                SessionUpdate::ToolCallUpdated(tool_item_completed(params.get("item")?)?)
            }
            methods::TURN_STARTED => SessionUpdate::TurnStarted {
                turn_id: turn_id(params),
            },
            methods::TURN_COMPLETED => SessionUpdate::TurnCompleted {
                turn_id: turn_id(params),
                status: params
                    .get("turn")
                    .and_then(|turn| str_at(turn, "status"))
                    .map(str::to_string),
            },
            methods::TURN_PLAN_UPDATED => SessionUpdate::PlanUpdated {
                entries: plan_entries(params.get("plan")),
            },
            methods::THREAD_STARTED => SessionUpdate::ThreadStarted {
                thread_id: thread_id(params)?,
            },
            _ => {
                debug!(method, "Unhandled app-server notification");
                return None;
            }
        };
        Some(SessionEvent::new(thread_id(params), update))
    }

    fn interpret_request(&self, method: &str, params: &Value) -> Option<PermissionRequest> {
        let (kind, default_title) = match method {
            methods::ITEM_COMMAND_APPROVAL => ("execute", "Run command"),
            methods::ITEM_FILE_CHANGE_APPROVAL => ("edit", "Apply file changes"),
            _ => return None,
        };
        let tool_call = fields::string_at(params, "itemId").map(|id| ToolCallInfo {
            id,
            title: command_text(params).unwrap_or_else(|| default_title.to_string()),
            kind: Some(kind.to_string()),
            status: Some("pending".to_string()),
            locations: Vec::new(),
            raw_input: None,
        });
        let option = |id: &str, name: &str, kind: &str| PermissionOption {
            id: id.to_string(),
            name: name.to_string(),
            kind: Some(kind.to_string()),
        };
        Some(PermissionRequest {
            session_id: thread_id(params),
            tool_call,
            options: vec![
                option("accept", "Accept", "allow_once"),
                option("acceptForSession", "Accept for session", "allow_always"),
                option("decline", "Decline", "reject_once"),
            ],
            reason: str_at(params, "reason").map(str::to_string),
        })
    }

    fn permission_response(&self, option_id: Option<&str>) -> Value {
        json!({"decision": option_id.unwrap_or("decline")})
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::actions::SessionActivation;

    #[test]
    fn test_thread_start_activates() {
        let actions = AppServerDialect.interpret_response(
            &ResponseContext::new("thread/start").with_placeholder("local-1"),
            &Ok(json!({"thread": {"id": "thr_1", "cwd": "/repo"}, "model": "m"})),
        );
        assert_eq!(
            actions,
            vec![
                ResponseAction::SessionMigrated {
                    from: "local-1".into(),
                    to: "thr_1".into()
                },
                ResponseAction::SessionActivated(SessionActivation {
                    session_id: "thr_1".into(),
                    cwd: Some("/repo".into()),
                    modes: None,
                    config_options: vec![],
                }),
                ResponseAction::SessionMaterialized {
                    session_id: "thr_1".into()
                },
            ]
        );
    }

    #[test]
    fn test_turn_start_result() {
        let actions = AppServerDialect.interpret_response(
            &ResponseContext::new("turn/start"),
            &Ok(json!({"turn": {"id": "turn_7", "status": "inProgress"}})),
        );
        assert_eq!(
            actions,
            vec![ResponseAction::TurnStarted {
                turn_id: Some("turn_7".into())
            }]
        );
    }

    #[test]
    fn test_thread_list() {
        let actions = AppServerDialect.interpret_response(
            &ResponseContext::new("thread/list"),
            &Ok(json!({"data": [{"id": "t1", "preview": "fix bug", "createdAt": 1700000000}], "nextCursor": null})),
        );
        let [ResponseAction::SessionsListed { sessions, next_cursor }] = actions.as_slice() else {
            panic!("expected listing");
        };
        assert_eq!(sessions[0].title.as_deref(), Some("fix bug"));
        assert_eq!(sessions[0].updated_at.as_deref(), Some("1700000000"));
        assert!(next_cursor.is_none());
    }

    #[test]
    fn test_deltas() {
        let event = AppServerDialect
            .interpret_notification(
                "item/agentMessage/delta",
                &json!({"threadId": "t1", "turnId": "u1", "itemId": "i1", "delta": "Hel"}),
            )
            .unwrap();
        assert_eq!(event.session_id.as_deref(), Some("t1"));
        assert_eq!(event.update, SessionUpdate::AgentMessageChunk { text: "Hel".into() });

        let thought = AppServerDialect
            .interpret_notification(
                "item/reasoning/summaryTextDelta",
                &json!({"threadId": "t1", "itemId": "r1", "delta": "thinking"}),
            )
            .unwrap();
        assert!(matches!(thought.update, SessionUpdate::AgentThoughtChunk { .. }));

        let output = AppServerDialect
            .interpret_notification(
                "item/commandExecution/outputDelta",
                &json!({"threadId": "t1", "itemId": "c1", "delta": "ok\n"}),
            )
            .unwrap();
        let SessionUpdate::ToolCallUpdated(update) = output.update else {
            panic!("expected tool update");
        };
        assert_eq!(update.id, "c1");
        assert_eq!(update.output.as_deref(), Some("ok\n"));
    }

    #[test]
    fn test_command_item_lifecycle() {
        let started = AppServerDialect
            .interpret_notification(
                "item/started",
                &json!({"threadId": "t1", "item": {"type": "commandExecution", "id": "c1", "command": ["cargo", "fmt"]}}),
            )
            .unwrap();
        let SessionUpdate::ToolCallStarted(info) = started.update else {
            panic!("expected tool start");
        };
        assert_eq!(info.title, "cargo fmt");
        assert_eq!(info.kind.as_deref(), Some("execute"));

        let completed = AppServerDialect
            .interpret_notification(
                "item/completed",
                &json!({"threadId": "t1", "item": {"type": "commandExecution", "id": "c1",
                        "status": "failed", "aggregatedOutput": "boom", "exitCode": 1}}),
            )
            .unwrap();
        let SessionUpdate::ToolCallUpdated(update) = completed.update else {
            panic!("expected tool update");
        };
        assert_eq!(update.status.as_deref(), Some("failed"));
        assert_eq!(update.raw_output, Some(json!(1)));

        // Message items are streamed through deltas instead.
        assert!(
            AppServerDialect
                .interpret_notification(
                    "item/completed",
                    &json!({"threadId": "t1", "item": {"type": "agentMessage", "id": "m1"}})
                )
                .is_none()
        );
    }

    #[test]
    fn test_turn_and_plan_notifications() {
        let done = AppServerDialect
            .interpret_notification(
                "turn/completed",
                &json!({"threadId": "t1", "turn": {"id": "u1", "status": "completed"}}),
            )
            .unwrap();
        assert_eq!(
            done.update,
            SessionUpdate::TurnCompleted {
                turn_id: Some("u1".into()),
                status: Some("completed".into())
            }
        );

        let plan = AppServerDialect
            .interpret_notification(
                "turn/plan/updated",
                &json!({"threadId": "t1", "turnId": "u1", "plan": [{"step": "write tests", "status": "inProgress"}]}),
            )
            .unwrap();
        let SessionUpdate::PlanUpdated { entries } = plan.update else {
            panic!("expected plan");
        };
        assert_eq!(entries[0].content, "write tests");

        let started = AppServerDialect
            .interpret_notification("thread/started", &json!({"thread": {"id": "t9"}}))
            .unwrap();
        assert_eq!(started.session_id.as_deref(), Some("t9"));
    }

    #[test]
    fn test_approval_requests() {
        let request = AppServerDialect
            .interpret_request(
                "item/commandExecution/requestApproval",
                &json!({"threadId": "t1", "turnId": "u1", "itemId": "c1",
                        "command": "rm -rf target", "reason": "cleanup"}),
            )
            .unwrap();
        assert_eq!(request.tool_call.as_ref().unwrap().title, "rm -rf target");
        assert_eq!(request.reason.as_deref(), Some("cleanup"));
        assert_eq!(request.options.len(), 3);
        assert_eq!(
            AppServerDialect.permission_response(None),
            json!({"decision": "decline"})
        );
        assert!(
            AppServerDialect
                .interpret_request("session/request_permission", &json!({}))
                .is_none()
        );
    }

    #[test]
    fn test_thread_resume_not_found_disables_resume() {
        let actions = AppServerDialect.interpret_response(
            &ResponseContext::new("thread/resume"),
            &Err(crate::error::RpcError::new(-32601, "unknown method")),
        );
        assert!(actions.contains(&ResponseAction::CapabilityDisabled(
            crate::protocol::actions::Capability::ResumeSession
        )));
    }
}
