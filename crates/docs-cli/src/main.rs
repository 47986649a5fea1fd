//! Document autosave replay CLI.

use clap::{ColorChoice, Parser};
use docs_autosave::AutosaveError;
use docs_cli::logging::{LogConfig, init_logging};
use docs_cli::summary::print_summary;
use std::io::{self, IsTerminal};
use tracing::level_filters::LevelFilter;

mod cli;
mod commands;

use crate::cli::{Cli, Command};
use crate::commands::{run_config, run_replay, run_show};

fn main() {
    let cli = Cli::parse();
    cli.color.write_global();
    let log_config = log_config_from_cli(&cli);
    if let Err(error) = init_logging(&log_config) {
        eprintln!("error: failed to initialize logging: {error}");
        std::process::exit(1);
    }
    let exit_code = match &cli.command {
        Command::Replay(args) => match run_replay(&cli, args) {
            Ok(report) => {
                print_summary(&report, &cli.store_dir.display().to_string());
                if report.status.failed > 0 { 1 } else { 0 }
            }
            Err(error) => report_error(&error),
        },
        Command::Show(args) => match run_show(&cli, args) {
            Ok(()) => 0,
            Err(error) => report_error(&error),
        },
        Command::Config => match run_config(&cli) {
            Ok(()) => 0,
            Err(error) => report_error(&error),
        },
    };
    std::process::exit(exit_code);
}

fn report_error(error: &anyhow::Error) -> i32 {
    eprintln!("error: {error:#}");
    if let Some(hint) = error
        .downcast_ref::<AutosaveError>()
        .and_then(AutosaveError::suggestion)
    {
        eprintln!("hint: {hint}");
    }
    1
}

/// Build logging configuration from CLI flags.
///
/// `--log-level` beats `-v`/`-q`; either one disables the `RUST_LOG` override.
fn log_config_from_cli(cli: &Cli) -> LogConfig {
    let explicit = cli.verbosity.is_present() || cli.log_level.is_some();
    LogConfig {
        level_filter: cli
            .log_level
            .map_or_else(|| cli.verbosity.tracing_level_filter(), LevelFilter::from),
        use_env_filter: !explicit,
        format: cli.log_format.into(),
        log_file: cli.log_file.clone(),
        log_content: cli.log_content,
        with_ansi: match cli.color.color {
            ColorChoice::Always => true,
            ColorChoice::Never => false,
            ColorChoice::Auto => cli.log_file.is_none() && io::stderr().is_terminal(),
        },
        ..LogConfig::default()
    }
}
