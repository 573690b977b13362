use crate::config::{ClientConfig, HeaderEntry};
use crate::protocol::DialectKind;
use crate::rpc::JsonEncoding;
use crate::transport::ProviderKind;
use anyhow::{Result, bail};
use clap::{ArgAction, Args};
use std::path::PathBuf;

// Global flags shared across every subcommand. Each one overrides the
// matching field of the loaded config file.
#[derive(Debug, Clone, Default, Args)]
pub struct CommonArgs {
    /// Path to a config.toml file (default: ~/.agentwire/config.toml)
    #[arg(
        short = 'c',
        long,
        value_name = "PATH",
        env = "AGENTWIRE_CONFIG",
        global = true
    )]
    pub config: Option<PathBuf>,

    /// Agent WebSocket URL (ws://… or wss://…)
    #[arg(long, value_name = "WS_URL", env = "AGENTWIRE_URL", global = true)]
    pub url: Option<String>,

    /// Extra handshake header, `Name: value`. Repeatable.
    #[arg(long = "header", short = 'H', value_name = "HEADER", global = true)]
    pub headers: Vec<String>,

    /// Wire dialect: acp or app-server
    #[arg(long, value_name = "DIALECT", env = "AGENTWIRE_DIALECT", global = true)]
    pub dialect: Option<DialectKind>,

    /// WebSocket implementation: wire or tungstenite
    #[arg(long, value_name = "PROVIDER", global = true)]
    pub provider: Option<ProviderKind>,

    /// JSON output style: plain or escaped-slashes
    #[arg(long, value_name = "ENCODING", global = true)]
    pub json_encoding: Option<JsonEncoding>,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,
}

impl CommonArgs {
    pub fn load_config(&self) -> Result<ClientConfig> {
        let mut config = ClientConfig::load(self.config.clone())?;
        self.apply_overrides(&mut config)?;
        Ok(config)
    }

    pub fn apply_overrides(&self, config: &mut ClientConfig) -> Result<()> {
        if let Some(url) = &self.url {
            config.url = url.clone();
        }

        for raw in &self.headers {
            let Some(header) = HeaderEntry::parse(raw) else {
                bail!("Invalid header {raw:?}, expected `Name: value`");
            };
            config.headers.push(header);
        }

        if let Some(dialect) = self.dialect {
            config.dialect = dialect;
        }

        if let Some(provider) = self.provider {
            config.provider = provider;
        }

        if let Some(encoding) = self.json_encoding {
            config.json_encoding = encoding;
        }

        Ok(())
    }
}
