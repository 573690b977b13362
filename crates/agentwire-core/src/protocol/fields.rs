//! Field lookup with fallback names.
//!
//! Peers disagree on field naming. Every place the interpreter reads an id,
//! path or mode goes through one of the key lists below, so the accepted
//! spellings live in one place.

use serde_json::Value;

/// `sessionId` → `session` → `id`
pub const SESSION_ID_KEYS: &[&str] = &["sessionId", "session", "id"];
/// `cwd` → `workingDirectory`
pub const CWD_KEYS: &[&str] = &["cwd", "workingDirectory"];
/// `currentModeId` → `modeId`
pub const MODE_ID_KEYS: &[&str] = &["currentModeId", "modeId"];
/// `toolCallId` → `id`
pub const TOOL_CALL_ID_KEYS: &[&str] = &["toolCallId", "id"];
/// Wrapper objects searched when the top level has no match.
pub const NESTED_KEYS: &[&str] = &["session", "thread"];

/// Non-empty string under `key`. Integers are rendered as strings.
pub fn string_at(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) if n.is_u64() || n.is_i64() => Some(n.to_string()),
        _ => None,
    }
}

/// Non-empty `&str` under `key`.
pub fn str_at<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// First key in `keys` that holds a usable string.
pub fn first_string(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| string_at(value, key))
}

/// [`first_string`] at the top level, then inside each object under
/// [`NESTED_KEYS`].
pub fn lookup(value: &Value, keys: &[&str]) -> Option<String> {
    first_string(value, keys).or_else(|| {
        NESTED_KEYS
            .iter()
            .filter_map(|wrapper| value.get(*wrapper).filter(|v| v.is_object()))
            .find_map(|inner| first_string(inner, keys))
    })
}

pub fn session_id(value: &Value) -> Option<String> {
    lookup(value, SESSION_ID_KEYS)
}

pub fn cwd(value: &Value) -> Option<String> {
    lookup(value, CWD_KEYS)
}

pub fn mode_id(value: &Value) -> Option<String> {
    lookup(value, MODE_ID_KEYS)
}

pub fn tool_call_id(value: &Value) -> Option<String> {
    first_string(value, TOOL_CALL_ID_KEYS)
}

/// Best-effort text from a content-bearing payload: `content` as a string,
/// then `content.text`, then the first array element that has
/// `content.text` or `text`.
pub fn extract_text(value: &Value) -> Option<String> {
    let content = value.get("content");

    if let Some(text) = content.and_then(Value::as_str) {
        return non_empty(text);
    }
    if let Some(text) = content.and_then(|c| c.get("text")).and_then(Value::as_str) {
        return non_empty(text);
    }

    let items = content
        .and_then(Value::as_array)
        .or_else(|| value.as_array())?;
    items.iter().find_map(|item| {
        item.get("content")
            .and_then(|c| c.get("text"))
            .and_then(Value::as_str)
            .or_else(|| item.get("text").and_then(Value::as_str))
            .and_then(non_empty)
    })
}

fn non_empty(text: &str) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

/// Lowercase with `_` and `-` removed, for loose key comparisons.
pub fn normalize_key(raw: &str) -> String {
    raw.chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_session_id_fallbacks() {
        assert_eq!(session_id(&json!({"sessionId": "a", "id": "b"})).as_deref(), Some("a"));
        assert_eq!(session_id(&json!({"session": "s"})).as_deref(), Some("s"));
        assert_eq!(session_id(&json!({"id": 42})).as_deref(), Some("42"));
        assert_eq!(
            session_id(&json!({"thread": {"id": "t1", "cwd": "/w"}})).as_deref(),
            Some("t1")
        );
        assert_eq!(
            session_id(&json!({"session": {"sessionId": "nested"}})).as_deref(),
            Some("nested")
        );
        assert!(session_id(&json!({"sessionId": ""})).is_none());
        assert!(session_id(&json!(null)).is_none());
    }

    #[test]
    fn test_cwd_and_mode_fallbacks() {
        assert_eq!(cwd(&json!({"workingDirectory": "/w"})).as_deref(), Some("/w"));
        assert_eq!(cwd(&json!({"thread": {"cwd": "/t"}})).as_deref(), Some("/t"));
        assert_eq!(mode_id(&json!({"modeId": "plan"})).as_deref(), Some("plan"));
        assert_eq!(tool_call_id(&json!({"id": "tc"})).as_deref(), Some("tc"));
    }

    #[test]
    fn test_extract_text() {
        assert_eq!(extract_text(&json!({"content": "hi"})).as_deref(), Some("hi"));
        assert_eq!(
            extract_text(&json!({"content": {"type": "text", "text": "yo"}})).as_deref(),
            Some("yo")
        );
        assert_eq!(
            extract_text(&json!({"content": [{"type": "image"}, {"content": {"text": "deep"}}]}))
                .as_deref(),
            Some("deep")
        );
        assert_eq!(
            extract_text(&json!({"content": [{"text": "flat"}]})).as_deref(),
            Some("flat")
        );
        assert!(extract_text(&json!({"content": ""})).is_none());
        assert!(extract_text(&json!({"other": 1})).is_none());
    }

    #[test]
    fn test_normalize_key() {
        assert_eq!(normalize_key("Session_Mode"), "sessionmode");
        assert_eq!(normalize_key("MODE"), "mode");
        assert_eq!(normalize_key("mo-de"), "mode");
    }
}
