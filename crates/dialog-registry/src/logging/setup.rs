use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::RegistryConfig;
use crate::errors::{RegistryError, RegistryResult};

/// Output format of the subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Subscriber settings for a process embedding the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Base level, e.g. `"info"`
    pub level: String,
    pub format: LogFormat,
    /// Print file and line of every event
    pub source_location: bool,
    /// Log span enter/exit
    pub span_events: bool,
    /// Extra `target=level` directives, e.g. `"rvoip_dialog_registry=trace"`
    pub directives: Vec<String>,
    /// Name reported in the startup line and in setup errors
    pub app_name: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
            source_location: false,
            span_events: false,
            directives: Vec::new(),
            app_name: "dialog-registry".to_string(),
        }
    }
}

impl LoggingConfig {
    pub fn new(level: Level, app_name: impl Into<String>) -> Self {
        Self {
            level: level.to_string().to_lowercase(),
            app_name: app_name.into(),
            ..Default::default()
        }
    }

    pub fn with_json(mut self) -> Self {
        self.format = LogFormat::Json;
        self
    }

    pub fn with_source_location(mut self) -> Self {
        self.source_location = true;
        self
    }

    pub fn with_span_events(mut self) -> Self {
        self.span_events = true;
        self
    }

    /// Add a per-target directive such as `"rvoip_dialog_registry::profile=debug"`
    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.directives.push(directive.into());
        self
    }

    /// `RUST_LOG` directives, then the base level and the configured ones
    fn env_filter(&self) -> RegistryResult<EnvFilter> {
        let level = parse_log_level(&self.level)?;
        let mut filter = EnvFilter::from_default_env().add_directive(LevelFilter::from_level(level).into());
        for directive in &self.directives {
            let parsed: Directive = directive
                .parse()
                .map_err(|e| RegistryError::config(format!("bad log directive {:?}: {}", directive, e)))?;
            filter = filter.add_directive(parsed);
        }
        Ok(filter)
    }
}

/// Install the global subscriber.
///
/// Fails on a bad level or directive, or when a global subscriber is already
/// installed.
pub fn setup_logging(config: &LoggingConfig) -> RegistryResult<()> {
    let filter = config.env_filter()?;
    let span_events = if config.span_events {
        FmtSpan::ACTIVE
    } else {
        FmtSpan::NONE
    };

    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_span_events(span_events)
        .with_file(config.source_location)
        .with_line_number(config.source_location);

    let installed = match config.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.try_init(),
    };

    installed.map_err(|e| {
        RegistryError::config(format!("{}: unable to install log subscriber: {}", config.app_name, e))
    })
}

/// Parse a level name, case-insensitive
pub fn parse_log_level(level: &str) -> RegistryResult<Level> {
    Level::from_str(level).map_err(|_| RegistryError::config(format!("invalid log level: {}", level)))
}

/// One line summarizing how the registry was sized
pub fn log_startup(app_name: &str, config: &RegistryConfig) {
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        hash_size = config.hash_size,
        profile_hash_size = config.profile_hash_size,
        default_timeout = config.default_timeout,
        persistence = ?config.persistence.mode,
        "starting {}",
        app_name
    );
}
