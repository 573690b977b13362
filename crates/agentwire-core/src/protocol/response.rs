//! Response interpretation shared by both dialects.

use serde_json::Value;
use tracing::debug;

use super::actions::{ResponseAction, ResponseContext, SessionActivation};
use super::fields;
use super::methods;
use super::modes;
use crate::error::RpcError;

/// Activation actions for a successful result.
///
/// Session-family methods resolve the id from the result, then the
/// context, and emit migration (if a differing placeholder was tracked),
/// activation and materialization, in that order. Other methods whose
/// result carries `modes` or `configOptions` only re-activate.
pub fn session_actions(ctx: &ResponseContext, result: &Value) -> Vec<ResponseAction> {
    let family = methods::is_session_family(&ctx.method);
    let config_options = modes::config_options_in(result);
    let carries_session_state = result.get("modes").is_some_and(Value::is_object)
        || config_options.is_some();

    if !family && !carries_session_state {
        return Vec::new();
    }

    let session_id = fields::session_id(result)
        .or_else(|| ctx.pending_session_id.clone())
        .filter(|id| !id.is_empty());
    let Some(session_id) = session_id else {
        debug!(method = %ctx.method, "No session id in response");
        return Vec::new();
    };

    let mut activation = SessionActivation::new(session_id.clone());
    activation.cwd = fields::cwd(result).or_else(|| ctx.pending_cwd.clone());
    activation.modes = modes::parse_modes(result);
    activation.config_options = config_options.unwrap_or_default();

    let mut actions = Vec::with_capacity(3);
    if family {
        if let Some(placeholder) = ctx.placeholder_id.as_ref() {
            if *placeholder != session_id {
                actions.push(ResponseAction::SessionMigrated {
                    from: placeholder.clone(),
                    to: session_id.clone(),
                });
            }
        }
    }
    actions.push(ResponseAction::SessionActivated(activation));
    if family {
        actions.push(ResponseAction::SessionMaterialized { session_id });
    }
    actions
}

/// Actions for an error response: always the error itself, plus a
/// capability demotion when the peer does not know the method.
pub fn error_actions(ctx: &ResponseContext, error: &RpcError) -> Vec<ResponseAction> {
    let mut actions = vec![ResponseAction::RpcError {
        method: ctx.method.clone(),
        error: error.clone(),
    }];
    if error.is_method_not_found() {
        if let Some(capability) = methods::capability_for_method(&ctx.method) {
            debug!(method = %ctx.method, %capability, "Capability disabled");
            actions.push(ResponseAction::CapabilityDisabled(capability));
        }
    }
    actions
}

/// Mode change for `session/set_mode`; the requested mode is used when the
/// result does not echo one.
pub fn mode_change(ctx: &ResponseContext, result: &Value) -> Option<ResponseAction> {
    let mode_id = fields::mode_id(result).or_else(|| ctx.requested_mode.clone())?;
    Some(ResponseAction::ModeChanged {
        session_id: fields::session_id(result).or_else(|| ctx.pending_session_id.clone()),
        mode_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::actions::Capability;
    use serde_json::json;

    #[test]
    fn test_session_new_without_placeholder() {
        let actions = session_actions(
            &ResponseContext::new("session/new"),
            &json!({"sessionId": "s1", "cwd": "/a"}),
        );
        assert_eq!(
            actions,
            vec![
                ResponseAction::SessionActivated(SessionActivation {
                    session_id: "s1".into(),
                    cwd: Some("/a".into()),
                    modes: None,
                    config_options: vec![],
                }),
                ResponseAction::SessionMaterialized {
                    session_id: "s1".into()
                },
            ]
        );
    }

    #[test]
    fn test_placeholder_migration_comes_first() {
        let ctx = ResponseContext::new("session/new")
            .with_placeholder("ph")
            .with_cwd("/w");
        let actions = session_actions(&ctx, &json!({"sessionId": "real"}));
        assert_eq!(actions.len(), 3);
        assert_eq!(
            actions[0],
            ResponseAction::SessionMigrated {
                from: "ph".into(),
                to: "real".into()
            }
        );
        let ResponseAction::SessionActivated(activation) = &actions[1] else {
            panic!("expected activation");
        };
        assert_eq!(activation.session_id, "real");
        assert_eq!(activation.cwd.as_deref(), Some("/w"));
    }

    #[test]
    fn test_matching_placeholder_does_not_migrate() {
        let ctx = ResponseContext::new("session/load").with_placeholder("s1");
        let actions = session_actions(&ctx, &json!({"sessionId": "s1"}));
        assert!(
            !actions
                .iter()
                .any(|a| matches!(a, ResponseAction::SessionMigrated { .. }))
        );
    }

    #[test]
    fn test_load_uses_pending_id() {
        let ctx = ResponseContext::new("session/load").with_session("s9");
        let actions = session_actions(&ctx, &json!(null));
        assert!(matches!(
            &actions[0],
            ResponseAction::SessionActivated(a) if a.session_id == "s9"
        ));
    }

    #[test]
    fn test_no_id_no_actions() {
        assert!(session_actions(&ResponseContext::new("session/new"), &json!({})).is_empty());
    }

    #[test]
    fn test_non_family_with_modes_activates_only() {
        let ctx = ResponseContext::new("session/set_config_option").with_session("s1");
        let actions = session_actions(
            &ctx,
            &json!({"configOptions": [{"id": "mode", "name": "Mode", "type": "select", "currentValue": "ask",
                     "options": [{"value": "ask", "name": "Ask"}]}]}),
        );
        assert_eq!(actions.len(), 1);
        let ResponseAction::SessionActivated(activation) = &actions[0] else {
            panic!("expected activation");
        };
        assert_eq!(
            activation
                .modes
                .as_ref()
                .and_then(|m| m.current_mode_id.as_deref()),
            Some("ask")
        );
        assert_eq!(activation.config_options.len(), 1);
    }

    #[test]
    fn test_non_family_plain_result_ignored() {
        let ctx = ResponseContext::new("session/prompt").with_session("s1");
        assert!(session_actions(&ctx, &json!({"stopReason": "end_turn"})).is_empty());
    }

    #[test]
    fn test_method_not_found_policy() {
        let err = RpcError::new(-32601, "Method not found");
        assert_eq!(
            error_actions(&ResponseContext::new("session/load"), &err),
            vec![
                ResponseAction::RpcError {
                    method: "session/load".into(),
                    error: err.clone()
                },
                ResponseAction::CapabilityDisabled(Capability::LoadSession),
            ]
        );
        assert_eq!(
            error_actions(&ResponseContext::new("session/cancel"), &err).len(),
            1
        );
        let other = RpcError::new(-32000, "busy");
        assert_eq!(
            error_actions(&ResponseContext::new("session/list"), &other).len(),
            1
        );
    }

    #[test]
    fn test_mode_change_uses_requested_mode() {
        let ctx = ResponseContext::new("session/set_mode")
            .with_session("s1")
            .with_requested_mode("code");
        assert_eq!(
            mode_change(&ctx, &json!({})),
            Some(ResponseAction::ModeChanged {
                session_id: Some("s1".into()),
                mode_id: "code".into()
            })
        );
        assert_eq!(mode_change(&ResponseContext::new("session/set_mode"), &json!({})), None);
    }
}
