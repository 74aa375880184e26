use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dkim_rollover::{config::LoggingToml, keys::MonthIndex, rollover, ConfigToml};

/// Exit code of a run that added or removed keys.
const EXIT_CHANGED: u8 = 2;

#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Configuration file
    #[clap(short, long, default_value = "/etc/dkim-rollover/config.toml")]
    config: PathBuf,
    /// [tracing_subscriber::EnvFilter], overrides the `[logging]` section
    #[clap(short, long)]
    tracing_env_filter: Option<String>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Roll keys once. The default.
    Run,
    /// List every key and its state without changing anything.
    Status,
    /// Print a commented sample configuration.
    SampleConfig,
}

fn main() -> ExitCode {
    let args = Cli::parse();
    let command = args.command.unwrap_or(Command::Run);

    if command == Command::SampleConfig {
        println!("{}", ConfigToml::sample_string());
        return ExitCode::SUCCESS;
    }

    match execute(&args, command) {
        Ok(true) => ExitCode::from(EXIT_CHANGED),
        Ok(false) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Returns whether keys were added or removed.
fn execute(args: &Cli, command: Command) -> Result<bool> {
    let config = match ConfigToml::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            // Log with defaults so the failure is not lost.
            dkim_rollover::tracing::init_tracing_logs(
                &LoggingToml::default(),
                args.tracing_env_filter.as_deref(),
            )?;
            return Err(e).with_context(|| format!("failed to read {}", args.config.display()));
        }
    };
    dkim_rollover::tracing::init_tracing_logs(&config.logging, args.tracing_env_filter.as_deref())?;

    match command {
        Command::Status => {
            rollover::status(&config, MonthIndex::current(), &mut std::io::stdout().lock())?;
            Ok(false)
        }
        _ => {
            let report = rollover::run(&config)?;
            Ok(report.has_changes())
        }
    }
}
