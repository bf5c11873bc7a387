//! `tracing-subscriber` setup for the interactive session.
//!
//! Sync log events reach this subscriber through
//! [`selsync_core::event::TracingEventSink`]. `RUST_LOG` overrides the
//! configured level.

use selsync_core::config::LoggingConfig;
use tracing_subscriber::{
    fmt::{self, MakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable single-line output.
    #[default]
    Console,
    /// One JSON object per line.
    Json,
}

impl LogFormat {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "console" => Some(Self::Console),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Install the global subscriber, writing to stderr.
pub fn init_logging(config: &LoggingConfig) -> Result<(), String> {
    init_logging_with_writer(config, std::io::stderr)
}

/// Install the global subscriber with a custom writer.
///
/// Fails if a global subscriber is already installed.
pub fn init_logging_with_writer<W>(config: &LoggingConfig, writer: W) -> Result<(), String>
where
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    let filter = build_env_filter(&config.level);
    let format = LogFormat::parse(&config.format).unwrap_or_default();
    let result = match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(writer).with_target(false))
            .try_init(),
        LogFormat::Console => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(writer).with_target(false))
            .try_init(),
    };
    result.map_err(|err| format!("failed to install log subscriber: {err}"))
}

fn build_env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives(level)))
}

// Dependencies stay at warn.
fn default_directives(level: &str) -> String {
    let level = level.trim().to_ascii_lowercase();
    format!("warn,selsync_core={level},selsync_watch={level},selsync_cli={level}")
}
