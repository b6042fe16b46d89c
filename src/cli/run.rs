//! Run command implementation.

use super::output::{format_text, JsonMatchResult};
use super::{CliError, OutputFormat};
use skirmish::replay::MatchLog;
use skirmish::{AbortHandle, Coordinator, MatchConfig};
use std::path::PathBuf;
use tracing::info;

/// Flags that override the config file.
#[derive(Debug, Default)]
pub(crate) struct Overrides {
    pub(crate) rounds: Option<u32>,
    pub(crate) port: Option<u16>,
    pub(crate) phase_timeout_ms: Option<u64>,
}

/// Execute the run command.
///
/// # Errors
///
/// Returns an error if the config is unusable, an agent fails to start, the
/// match is aborted, or the log cannot be written.
pub(crate) fn execute(
    agents: Vec<PathBuf>,
    config_path: Option<PathBuf>,
    overrides: Overrides,
    format: OutputFormat,
    log: Option<PathBuf>,
) -> Result<(), CliError> {
    let mut config = match &config_path {
        Some(path) => MatchConfig::load(path).map_err(|e| {
            CliError::new(format!("Failed to load config {}: {e}", path.display()))
        })?,
        None => MatchConfig::default(),
    };
    if let Some(rounds) = overrides.rounds {
        config.max_rounds = rounds;
    }
    if let Some(port) = overrides.port {
        config.port = port;
    }
    if let Some(timeout) = overrides.phase_timeout_ms {
        config.phase_timeout_ms = timeout;
    }
    config.validate()?;

    let agent_names: Vec<String> = agents
        .iter()
        .map(|path| {
            path.file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "unknown".to_string())
        })
        .collect();

    // Installed before launch so an interrupt during startup still stops
    // the agents already running.
    let abort = AbortHandle::new();
    let handler = abort.clone();
    ctrlc::set_handler(move || handler.abort())
        .map_err(|e| CliError::new(format!("Failed to install Ctrl-C handler: {e}")))?;

    let mut coordinator = Coordinator::launch_with_abort(&config, &agents, abort)?;
    if let Some(path) = &log {
        let match_log = MatchLog::create(path)
            .map_err(|e| CliError::new(format!("Failed to create log {}: {e}", path.display())))?;
        coordinator = coordinator.with_log(match_log);
        info!(path = %path.display(), "writing match log");
    }

    let result = coordinator.run()?;

    match format {
        OutputFormat::Text => {
            print!("{}", format_text(&result, &agent_names));
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&JsonMatchResult {
                agents: &agent_names,
                result: &result,
            })
            .map_err(|e| CliError::new(format!("JSON serialization failed: {e}")))?;
            println!("{json}");
        }
    }

    Ok(())
}
