//! Client configuration, stored as TOML.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::protocol::DialectKind;
use crate::rpc::JsonEncoding;
use crate::rpc::service::DEFAULT_EVENT_BUFFER;
use crate::transport::ProviderKind;

/// One extra header for the upgrade request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderEntry {
    pub name: String,
    pub value: String,
}

impl HeaderEntry {
    /// Parse `Name: value` or `Name=value`.
    pub fn parse(raw: &str) -> Option<Self> {
        let (name, value) = raw.split_once(':').or_else(|| raw.split_once('='))?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        Some(Self {
            name: name.to_string(),
            value: value.trim().to_string(),
        })
    }
}

/// Identity sent in `initialize`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub name: String,
    pub version: String,
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self {
            name: "agentwire".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Agent endpoint (`ws://` or `wss://`).
    #[serde(default = "default_url")]
    pub url: String,

    /// Extra upgrade headers, in order.
    #[serde(default)]
    pub headers: Vec<HeaderEntry>,

    #[serde(default)]
    pub dialect: DialectKind,

    #[serde(default)]
    pub json_encoding: JsonEncoding,

    #[serde(default)]
    pub provider: ProviderKind,

    /// Capacity of the service event channel.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,

    #[serde(default)]
    pub client_info: ClientInfo,
}

fn default_url() -> String {
    "ws://127.0.0.1:8765/".to_string()
}

fn default_event_buffer() -> usize {
    DEFAULT_EVENT_BUFFER
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            headers: Vec::new(),
            dialect: DialectKind::default(),
            json_encoding: JsonEncoding::default(),
            provider: ProviderKind::default(),
            event_buffer: default_event_buffer(),
            client_info: ClientInfo::default(),
        }
    }
}

impl ClientConfig {
    /// `~/.agentwire/config.toml`
    pub fn default_path() -> PathBuf {
        let home_dir = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        home_dir.join(".agentwire").join("config.toml")
    }

    /// Load from `path`, or the default location. A missing file yields the
    /// defaults.
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = path.unwrap_or_else(Self::default_path);

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read {}", config_path.display()))?;
            let config: ClientConfig = toml::from_str(&content)
                .with_context(|| format!("Failed to parse {}", config_path.display()))?;
            Ok(config)
        } else {
            Ok(ClientConfig::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    /// Headers as the transport takes them.
    pub fn header_pairs(&self) -> Vec<(String, String)> {
        self.headers
            .iter()
            .map(|h| (h.name.clone(), h.value.clone()))
            .collect()
    }
}
