//! Tracing subscriber setup.
//!
//! ## Environment Variables
//!
//! - `AGENTWIRE_LOG` or `RUST_LOG`: filter directives
//!   (e.g. `agentwire_core=debug,warn`)
//! - `AGENTWIRE_LOG_FORMAT`: `pretty`, `compact` or `json`
//!
//! Wire traffic is logged at `debug`, connection lifecycle at `info`, and
//! malformed input or abnormal closes at `warn`.

use std::str::FromStr;

use strum::{Display, EnumString};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    prelude::*,
};

const DEFAULT_FILTER: &str = "agentwire_core=info,agentwire=info,warn";

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    /// One JSON object per event
    Json,
}

impl LogFormat {
    /// Unknown names fall back to [`LogFormat::Pretty`].
    pub fn parse_lenient(s: &str) -> Self {
        Self::from_str(s.trim()).unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub filter: String,
    pub format: LogFormat,
    /// Emit span open/close events
    pub with_spans: bool,
    /// Include file and line
    pub with_file: bool,
    pub with_thread_ids: bool,
    pub with_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_FILTER.to_string(),
            format: LogFormat::Pretty,
            with_spans: false,
            with_file: false,
            with_thread_ids: false,
            with_target: true,
        }
    }
}

impl LogConfig {
    pub fn from_env() -> Self {
        let filter = std::env::var("AGENTWIRE_LOG")
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or_else(|_| DEFAULT_FILTER.to_string());

        let format = std::env::var("AGENTWIRE_LOG_FORMAT")
            .map(|s| LogFormat::parse_lenient(&s))
            .unwrap_or_default();

        Self {
            filter,
            format,
            ..Default::default()
        }
    }

    /// Filter for a `-v` count: 0 keeps the configured filter, 1 is debug
    /// for our crates, 2 or more is trace for everything.
    pub fn with_verbosity(mut self, verbose: u8) -> Self {
        match verbose {
            0 => {}
            1 => {
                self.filter = "agentwire_core=debug,agentwire=debug,info".to_string();
                self.with_file = true;
            }
            _ => {
                self.filter = "trace".to_string();
                self.with_file = true;
                self.with_thread_ids = true;
            }
        }
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }
}

/// Install the global subscriber. Returns `false` if one was already set.
pub fn init(config: LogConfig) -> bool {
    let env_filter =
        EnvFilter::try_new(&config.filter).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let span_events = if config.with_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let base = fmt::layer()
        .with_writer(std::io::stderr)
        .with_span_events(span_events)
        .with_file(config.with_file)
        .with_line_number(config.with_file)
        .with_thread_ids(config.with_thread_ids)
        .with_target(config.with_target);

    let layer = match config.format {
        LogFormat::Json => base.json().boxed(),
        LogFormat::Compact => base.compact().boxed(),
        LogFormat::Pretty => base.pretty().boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(layer)
        .try_init()
        .is_ok()
}

pub fn init_from_env() -> bool {
    init(LogConfig::from_env())
}
