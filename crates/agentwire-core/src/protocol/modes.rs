//! Session modes and config options.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::fields::{self, MODE_ID_KEYS, normalize_key, str_at};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeInfo {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ModesInfo {
    pub current_mode_id: Option<String>,
    pub available: Vec<ModeInfo>,
}

impl ModesInfo {
    pub fn is_empty(&self) -> bool {
        self.current_mode_id.is_none() && self.available.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigChoice {
    pub value: String,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigKind {
    Select { choices: Vec<ConfigChoice> },
    Boolean,
    Unknown(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigValue {
    Text(String),
    Bool(bool),
}

impl ConfigValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) if !s.is_empty() => Some(s),
            _ => None,
        }
    }
}

impl Default for ConfigValue {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigOption {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub kind: ConfigKind,
    pub current_value: ConfigValue,
}

impl ConfigOption {
    /// Whether this option selects the session mode.
    pub fn is_mode_selector(&self) -> bool {
        normalize_key(&self.id) == "mode"
            || self
                .category
                .as_deref()
                .is_some_and(|c| normalize_key(c) == "mode")
    }
}

fn parse_kind(raw: Option<&str>, entry: &Value) -> ConfigKind {
    let has_choices = entry.get("options").is_some() || entry.get("choices").is_some();
    let Some(raw) = raw else {
        return if has_choices {
            ConfigKind::Select {
                choices: choices_of(entry),
            }
        } else {
            ConfigKind::Unknown(String::new())
        };
    };
    match raw.to_ascii_lowercase().as_str() {
        "select" => ConfigKind::Select {
            choices: choices_of(entry),
        },
        "boolean" | "bool" | "flag" | "toggle" => ConfigKind::Boolean,
        _ => ConfigKind::Unknown(raw.to_string()),
    }
}

fn choices_of(entry: &Value) -> Vec<ConfigChoice> {
    let mut out = Vec::new();
    for key in ["options", "choices"] {
        if let Some(items) = entry.get(key).and_then(Value::as_array) {
            flatten_choices(items, &mut out);
        }
    }
    out
}

/// Groups carry their own `options`/`choices`; flatten them in order.
fn flatten_choices(items: &[Value], out: &mut Vec<ConfigChoice>) {
    for item in items {
        let nested = ["options", "choices"]
            .iter()
            .filter_map(|key| item.get(*key).and_then(Value::as_array))
            .collect::<Vec<_>>();
        if !nested.is_empty() {
            for group in nested {
                flatten_choices(group, out);
            }
            continue;
        }

        let value = match item {
            Value::String(s) if !s.is_empty() => Some(s.as_str()),
            _ => str_at(item, "value").or_else(|| str_at(item, "id")),
        };
        let Some(value) = value else { continue };
        let name = str_at(item, "name")
            .or_else(|| str_at(item, "label"))
            .unwrap_or(value);
        out.push(ConfigChoice {
            value: value.to_string(),
            name: name.to_string(),
            description: str_at(item, "description").map(str::to_string),
        });
    }
}

fn parse_option(entry: &Value) -> Option<ConfigOption> {
    let id = str_at(entry, "id")?.to_string();
    let name = str_at(entry, "name")?.to_string();
    let kind = parse_kind(str_at(entry, "type"), entry);
    let current_value = match entry.get("currentValue").or_else(|| entry.get("value")) {
        Some(Value::String(s)) => ConfigValue::Text(s.clone()),
        Some(Value::Bool(b)) => ConfigValue::Bool(*b),
        _ => ConfigValue::default(),
    };
    Some(ConfigOption {
        id,
        name,
        description: str_at(entry, "description").map(str::to_string),
        category: str_at(entry, "category").map(str::to_string),
        kind,
        current_value,
    })
}

/// Options from an array, skipping entries without id or name.
pub fn parse_config_options(value: &Value) -> Vec<ConfigOption> {
    value
        .as_array()
        .map(|items| items.iter().filter_map(parse_option).collect())
        .unwrap_or_default()
}

/// `configOptions` member of a payload, if it is present at all.
pub fn config_options_in(payload: &Value) -> Option<Vec<ConfigOption>> {
    payload
        .get("configOptions")
        .filter(|v| v.is_array())
        .map(parse_config_options)
}

/// Modes derived from the mode-selector option, if there is one.
pub fn modes_from_config_options(options: &[ConfigOption]) -> Option<ModesInfo> {
    let option = options.iter().find(|o| o.is_mode_selector())?;
    let available = match &option.kind {
        ConfigKind::Select { choices } => choices
            .iter()
            .map(|c| ModeInfo {
                id: c.value.clone(),
                name: c.name.clone(),
                description: c.description.clone(),
            })
            .collect(),
        _ => Vec::new(),
    };
    let modes = ModesInfo {
        current_mode_id: option.current_value.as_text().map(str::to_string),
        available,
    };
    (!modes.is_empty()).then_some(modes)
}

/// Modes from a response or update payload: the `modes` object first, then
/// the mode-selector config option.
pub fn parse_modes(payload: &Value) -> Option<ModesInfo> {
    if let Some(modes) = payload.get("modes").filter(|m| m.is_object()) {
        let available = modes
            .get("availableModes")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| {
                        Some(ModeInfo {
                            id: str_at(item, "id")?.to_string(),
                            name: str_at(item, "name")?.to_string(),
                            description: str_at(item, "description").map(str::to_string),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        let info = ModesInfo {
            current_mode_id: fields::first_string(modes, MODE_ID_KEYS),
            available,
        };
        if !info.is_empty() {
            return Some(info);
        }
    }

    config_options_in(payload).and_then(|options| modes_from_config_options(&options))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_modes_object() {
        let modes = parse_modes(&json!({
            "modes": {
                "currentModeId": "ask",
                "availableModes": [
                    {"id": "ask", "name": "Ask"},
                    {"id": "code", "name": "Code", "description": "Edits files"},
                    {"id": "broken"}
                ]
            }
        }))
        .unwrap();
        assert_eq!(modes.current_mode_id.as_deref(), Some("ask"));
        assert_eq!(modes.available.len(), 2);
        assert_eq!(modes.available[1].description.as_deref(), Some("Edits files"));
    }

    #[test]
    fn test_parse_modes_empty_is_none() {
        assert!(parse_modes(&json!({"modes": {"availableModes": []}})).is_none());
        assert!(parse_modes(&json!({})).is_none());
    }

    #[test]
    fn test_modes_from_config_option() {
        let payload = json!({
            "configOptions": [
                {"id": "model", "name": "Model", "type": "select", "currentValue": "m1",
                 "options": [{"value": "m1", "name": "M1"}]},
                {"id": "session_mode", "name": "Mode", "category": "Mode", "type": "select",
                 "currentValue": "plan",
                 "options": [{"value": "plan", "name": "Plan"}, {"value": "act", "name": "Act"}]}
            ]
        });
        let modes = parse_modes(&payload).unwrap();
        assert_eq!(modes.current_mode_id.as_deref(), Some("plan"));
        assert_eq!(modes.available.len(), 2);
    }

    #[test]
    fn test_config_option_kinds() {
        let options = parse_config_options(&json!([
            {"id": "a", "name": "A", "type": "toggle", "currentValue": true},
            {"id": "b", "name": "B", "type": "slider"},
            {"id": "c", "name": "C", "type": "select", "options": [
                {"group": "Fast", "options": [{"value": "x", "label": "X"}]},
                {"name": "Slow", "choices": [{"id": "y"}]},
                "z"
            ]},
            {"name": "missing id"}
        ]));
        assert_eq!(options.len(), 3);
        assert_eq!(options[0].kind, ConfigKind::Boolean);
        assert_eq!(options[0].current_value, ConfigValue::Bool(true));
        assert_eq!(options[1].kind, ConfigKind::Unknown("slider".into()));
        assert_eq!(options[1].current_value, ConfigValue::Text(String::new()));
        let ConfigKind::Select { choices } = &options[2].kind else {
            panic!("expected select");
        };
        let values: Vec<_> = choices.iter().map(|c| c.value.as_str()).collect();
        assert_eq!(values, ["x", "y", "z"]);
        assert_eq!(choices[0].name, "X");
        assert_eq!(choices[1].name, "y");
    }

    #[test]
    fn test_mode_selector_detection() {
        let options = parse_config_options(&json!([
            {"id": "MODE", "name": "m", "type": "select"},
        ]));
        assert!(options[0].is_mode_selector());
    }
}
