//! CLI argument definitions for the autosave replay tool.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use colorchoice_clap::Color;
use docs_cli::logging::LogFormat;
use tracing::level_filters::LevelFilter;

#[derive(Parser)]
#[command(
    name = "docsave",
    version,
    about = "Replay editing sessions against the document autosave coordinator",
    long_about = "Replay scripted editing sessions against the document autosave coordinator.\n\n\
                  Local edits are saved on a recurring timer, before navigation and unload,\n\
                  and when the session ends. Saved documents land in a local file store."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Adjust log verbosity (-v for debug, -vv for trace, -q for errors only).
    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    /// Control ANSI color output (auto, always, never).
    #[command(flatten)]
    pub color: Color,

    /// Autosave settings file (default: ./autosave.toml when present).
    #[arg(long = "config", value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding saved documents.
    #[arg(
        long = "store-dir",
        value_name = "DIR",
        default_value = ".docsave",
        global = true
    )]
    pub store_dir: PathBuf,

    /// Override the autosave interval in milliseconds.
    #[arg(long = "interval-ms", value_name = "MS", global = true)]
    pub interval_ms: Option<u64>,

    /// Explicit log level (overrides -v/-q flags).
    #[arg(long = "log-level", value_enum, global = true)]
    pub log_level: Option<LogLevelArg>,

    /// Log output format (pretty for human, json for machine parsing).
    #[arg(
        long = "log-format",
        value_enum,
        default_value = "pretty",
        global = true
    )]
    pub log_format: LogFormatArg,

    /// Write logs to a file instead of stderr.
    #[arg(long = "log-file", value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,

    /// Include document text in logs.
    ///
    /// Document text is redacted from logs unless this flag is set.
    #[arg(long = "log-content", global = true)]
    pub log_content: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Replay an editing session script.
    Replay(ReplayArgs),

    /// Show the saved copy of a document.
    Show(ShowArgs),

    /// Print the effective autosave configuration as TOML.
    Config,
}

#[derive(Parser)]
pub struct ReplayArgs {
    /// Session script, one step per line.
    #[arg(value_name = "SCRIPT")]
    pub script: PathBuf,

    /// Document id to save under.
    #[arg(long = "doc-id", value_name = "ID", default_value = "scratch")]
    pub doc_id: String,

    /// Start from an empty document instead of the saved copy.
    #[arg(long = "fresh")]
    pub fresh: bool,

    /// Start with saving disallowed (e.g. read-only viewer).
    #[arg(long = "ineligible")]
    pub ineligible: bool,
}

#[derive(Parser)]
pub struct ShowArgs {
    /// Document id to show.
    #[arg(value_name = "DOC_ID")]
    pub doc_id: String,

    /// Print metadata and content as JSON.
    #[arg(long = "json")]
    pub json: bool,
}

/// CLI log level choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// CLI log format choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}

impl From<LogLevelArg> for LevelFilter {
    fn from(level: LogLevelArg) -> Self {
        match level {
            LogLevelArg::Error => LevelFilter::ERROR,
            LogLevelArg::Warn => LevelFilter::WARN,
            LogLevelArg::Info => LevelFilter::INFO,
            LogLevelArg::Debug => LevelFilter::DEBUG,
            LogLevelArg::Trace => LevelFilter::TRACE,
        }
    }
}

impl From<LogFormatArg> for LogFormat {
    fn from(format: LogFormatArg) -> Self {
        match format {
            LogFormatArg::Pretty => LogFormat::Pretty,
            LogFormatArg::Compact => LogFormat::Compact,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}
