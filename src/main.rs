//! Skirmish CLI - run, replay and validate matches between agent programs.

// Allow print in the CLI binary
#![allow(clippy::print_stdout, clippy::print_stderr)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod cli;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Skirmish - a match host for turn-based strategy agents
#[derive(Parser, Debug)]
#[command(name = "skirmish")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
enum Commands {
    /// Launch agents and play one match
    Run {
        /// Agent programs, one per seat (.py, .jar, .sh, or an executable)
        #[arg(required = true, num_args = 2..=8)]
        agents: Vec<PathBuf>,

        /// Match config file (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Maximum rounds (overrides the config)
        #[arg(short, long)]
        rounds: Option<u32>,

        /// Coordination port, 0 for any free port (overrides the config)
        #[arg(short, long)]
        port: Option<u16>,

        /// Per-phase wait in milliseconds (overrides the config)
        #[arg(long)]
        phase_timeout_ms: Option<u64>,

        /// Write a match log (JSON lines) to this file
        #[arg(long)]
        log: Option<PathBuf>,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: cli::OutputFormat,
    },

    /// Summarize a match log, or render one round of it
    Replay {
        /// Match log file
        #[arg(required = true)]
        log: PathBuf,

        /// Render the world at the end of this round
        #[arg(short, long)]
        round: Option<u32>,
    },

    /// Check a config file and its map
    Validate {
        /// Match config file (TOML)
        #[arg(required = true)]
        config: PathBuf,
    },
}

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("skirmish=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging();

    let result = match args.command {
        Commands::Run {
            agents,
            config,
            rounds,
            port,
            phase_timeout_ms,
            log,
            format,
        } => cli::run::execute(
            agents,
            config,
            cli::run::Overrides {
                rounds,
                port,
                phase_timeout_ms,
            },
            format,
            log,
        ),

        Commands::Replay { log, round } => cli::replay::execute(log, round),

        Commands::Validate { config } => cli::validate::execute(config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
