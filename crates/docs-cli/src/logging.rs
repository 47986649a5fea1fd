//! Logging infrastructure using `tracing` and `tracing-subscriber`.
//!
//! All logging is routed through `tracing` spans for consistent observability.
//!
//! # Log Levels
//!
//! - `error`: Failed saves, unreadable stores
//! - `warn`: Retries, lagged notification streams
//! - `info`: Save dispatches and acknowledgements
//! - `debug`: Script steps, skipped triggers
//! - `trace`: Individual document updates and host signals
//!
//! Document text is user content. It only reaches the logs when
//! `--log-content` is passed; otherwise it is redacted.

use std::fs::OpenOptions;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    fmt::{self, MakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

static LOG_CONTENT_ENABLED: AtomicBool = AtomicBool::new(false);

/// Placeholder used when content logging is disabled.
pub const REDACTED_CONTENT: &str = "[REDACTED]";

/// Returns true if document content may be logged.
pub fn log_content_enabled() -> bool {
    LOG_CONTENT_ENABLED.load(Ordering::Relaxed)
}

/// Returns the input text when content logging is enabled, otherwise a redacted token.
pub fn redact_content(text: &str) -> &str {
    if log_content_enabled() {
        text
    } else {
        REDACTED_CONTENT
    }
}

/// Configuration for logging behavior.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level filter.
    pub level_filter: LevelFilter,
    /// Whether `RUST_LOG` may override `level_filter`.
    pub use_env_filter: bool,
    /// Whether to include timestamps in log output.
    pub with_timestamps: bool,
    /// Whether to include target (module path) in log output.
    pub with_target: bool,
    /// Whether to use ANSI colors in output.
    pub with_ansi: bool,
    /// Output format.
    pub format: LogFormat,
    /// Optional log file path. When set, logs are written to the file.
    pub log_file: Option<PathBuf>,
    /// Whether document content may be logged.
    pub log_content: bool,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable format with colors.
    #[default]
    Pretty,
    /// Compact single-line format.
    Compact,
    /// JSON format for machine parsing.
    Json,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level_filter: LevelFilter::WARN,
            use_env_filter: true,
            with_timestamps: true,
            with_target: false,
            with_ansi: true,
            format: LogFormat::default(),
            log_file: None,
            log_content: false,
        }
    }
}

/// Initialize the global tracing subscriber with the given configuration.
///
/// This should be called once at application startup.
///
/// # Errors
///
/// Returns an error if the log file cannot be opened.
pub fn init_logging(config: &LogConfig) -> io::Result<()> {
    match &config.log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            init_logging_with_writer(config, Mutex::new(file));
        }
        None => init_logging_with_writer(config, io::stderr),
    }
    Ok(())
}

/// Initialize logging with a custom writer (useful for testing).
pub fn init_logging_with_writer<W>(config: &LogConfig, writer: W)
where
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    LOG_CONTENT_ENABLED.store(config.log_content, Ordering::Release);
    let layer = format_layer(config, writer).with_filter(build_env_filter(config));
    tracing_subscriber::registry().with(layer).init();
}

fn format_layer<W>(config: &LogConfig, writer: W) -> BoxedLayer
where
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    let base = fmt::layer()
        .with_writer(writer)
        .with_target(config.with_target);
    match (config.format, config.with_timestamps) {
        (LogFormat::Json, _) => base.json().with_current_span(true).boxed(),
        (LogFormat::Compact, true) => base.compact().with_ansi(config.with_ansi).boxed(),
        (LogFormat::Compact, false) => base
            .compact()
            .with_ansi(config.with_ansi)
            .without_time()
            .boxed(),
        (LogFormat::Pretty, true) => base.with_ansi(config.with_ansi).boxed(),
        (LogFormat::Pretty, false) => base.with_ansi(config.with_ansi).without_time().boxed(),
    }
}

/// Build the filter directive string for our crates at `level`.
///
/// External crates stay at warn level to reduce noise.
pub fn default_directives(level: LevelFilter) -> String {
    let level = level.to_string().to_lowercase();
    format!("warn,docs_autosave={level},docs_cli={level},docsave={level}")
}

fn build_env_filter(config: &LogConfig) -> EnvFilter {
    let fallback = || EnvFilter::new(default_directives(config.level_filter));
    if config.use_env_filter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback())
    } else {
        fallback()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives_scope_our_crates() {
        let directives = default_directives(LevelFilter::DEBUG);
        assert!(directives.starts_with("warn,"));
        assert!(directives.contains("docs_autosave=debug"));
        assert!(directives.contains("docs_cli=debug"));
    }

    #[test]
    fn test_content_is_redacted_by_default() {
        assert!(!LogConfig::default().log_content);
        if !log_content_enabled() {
            assert_eq!(redact_content("secret draft"), REDACTED_CONTENT);
        }
    }
}
