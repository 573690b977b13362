//! Method names for both dialects.

use super::actions::Capability;

pub const INITIALIZE: &str = "initialize";
pub const AUTHENTICATE: &str = "authenticate";

// Agent Client Protocol
pub const SESSION_NEW: &str = "session/new";
pub const SESSION_CREATE: &str = "session/create";
pub const SESSION_LOAD: &str = "session/load";
pub const SESSION_RESUME: &str = "session/resume";
pub const SESSION_PROMPT: &str = "session/prompt";
pub const SESSION_CANCEL: &str = "session/cancel";
pub const SESSION_LIST: &str = "session/list";
pub const SESSION_SET_MODE: &str = "session/set_mode";
pub const SESSION_SET_CONFIG_OPTION: &str = "session/set_config_option";
pub const SESSION_UPDATE: &str = "session/update";
pub const SESSION_REQUEST_PERMISSION: &str = "session/request_permission";

// App-server
pub const THREAD_START: &str = "thread/start";
pub const THREAD_RESUME: &str = "thread/resume";
pub const THREAD_FORK: &str = "thread/fork";
pub const THREAD_LIST: &str = "thread/list";
pub const TURN_START: &str = "turn/start";
pub const TURN_INTERRUPT: &str = "turn/interrupt";

pub const THREAD_STARTED: &str = "thread/started";
pub const TURN_STARTED: &str = "turn/started";
pub const TURN_COMPLETED: &str = "turn/completed";
pub const TURN_PLAN_UPDATED: &str = "turn/plan/updated";
pub const ITEM_STARTED: &str = "item/started";
pub const ITEM_COMPLETED: &str = "item/completed";
pub const ITEM_AGENT_MESSAGE_DELTA: &str = "item/agentMessage/delta";
pub const ITEM_REASONING_TEXT_DELTA: &str = "item/reasoning/textDelta";
pub const ITEM_REASONING_SUMMARY_DELTA: &str = "item/reasoning/summaryTextDelta";
pub const ITEM_COMMAND_OUTPUT_DELTA: &str = "item/commandExecution/outputDelta";
pub const ITEM_COMMAND_APPROVAL: &str = "item/commandExecution/requestApproval";
pub const ITEM_FILE_CHANGE_APPROVAL: &str = "item/fileChange/requestApproval";

/// Responses to these methods establish an active session.
pub const SESSION_FAMILY: &[&str] = &[
    SESSION_NEW,
    SESSION_CREATE,
    SESSION_LOAD,
    SESSION_RESUME,
    THREAD_START,
    THREAD_RESUME,
    THREAD_FORK,
];

pub fn is_session_family(method: &str) -> bool {
    SESSION_FAMILY.contains(&method)
}

/// The capability a "method not found" reply to `method` rules out.
pub fn capability_for_method(method: &str) -> Option<Capability> {
    match method {
        SESSION_LIST | THREAD_LIST => Some(Capability::ListSessions),
        SESSION_LOAD => Some(Capability::LoadSession),
        SESSION_RESUME | THREAD_RESUME => Some(Capability::ResumeSession),
        _ => None,
    }
}
