//! wirebox - dynamic module registry
//!
//! Main entry point for the wirebox CLI.

mod cli;
mod cmd_check;
mod cmd_resolve;
mod cmd_run;
mod setup;

use clap::Parser;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use wirebox_config::{ConfigLoader, LoggingConfig};

use cli::{Cli, Commands};

/// Initialize tracing with console output and, when a log directory is
/// configured, daily rolling files.
fn init_tracing(logging: &LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let file_layer = match &logging.directory {
        Some(directory) => {
            let log_dir = ConfigLoader::expand_path(directory);
            std::fs::create_dir_all(&log_dir)?;

            let file_appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix(logging.file_prefix.as_str())
                .filename_suffix("log")
                .max_log_files(30)
                .build(&log_dir)?;
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            // Flushes buffered lines on exit.
            static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
                std::sync::OnceLock::new();
            let _ = GUARD.set(guard);

            Some(fmt::layer().with_writer(non_blocking).with_ansi(false))
        }
        None => None,
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(logging.json.then(|| fmt::layer().json()))
        .with((!logging.json).then(|| fmt::layer().with_target(true).with_ansi(true)))
        .with(file_layer)
        .init();

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = ConfigLoader::load_or_default(cli.config.as_deref())?;

    init_tracing(&config.logging)?;

    match cli.command {
        Commands::Run {
            descriptors,
            level,
            wait,
        } => cmd_run::run(config, descriptors, level, wait).await,
        Commands::Resolve {
            descriptors,
            format,
        } => cmd_resolve::resolve(config, descriptors, format).await,
        Commands::Check { descriptors } => cmd_check::check(&config, &descriptors),
    }
}
