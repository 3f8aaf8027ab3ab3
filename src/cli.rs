//! CLI definitions for wirebox.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// wirebox CLI.
#[derive(Parser)]
#[command(name = "wirebox")]
#[command(about = "Dynamic module registry with transactional capability resolution")]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file path (defaults to ~/.wirebox/config.toml when present)
    #[arg(short, long, global = true, env = "WIREBOX_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Install modules, start the framework and report module states
    Run {
        /// Descriptor files, in addition to those in the config
        #[arg(short, long = "descriptors")]
        descriptors: Vec<PathBuf>,

        /// Start level to raise to after startup
        #[arg(long)]
        level: Option<u32>,

        /// Keep running until interrupted
        #[arg(long)]
        wait: bool,
    },

    /// Resolve modules without starting them and print the wiring
    Resolve {
        /// Descriptor files, in addition to those in the config
        #[arg(short, long = "descriptors")]
        descriptors: Vec<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// Validate the configuration and descriptor files
    Check {
        /// Descriptor files, in addition to those in the config
        #[arg(short, long = "descriptors")]
        descriptors: Vec<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Table,
    Json,
}
