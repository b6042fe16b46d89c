//! Replay command implementation.

use super::CliError;
use skirmish::replay::{render_ascii, Recording};
use std::path::PathBuf;

/// Execute the replay command.
///
/// Without `round`, prints one summary line per round and the result. With
/// `round`, renders the world at the end of that round.
///
/// # Errors
///
/// Returns an error if the log cannot be loaded or the round is not in it.
pub(crate) fn execute(log_path: PathBuf, round: Option<u32>) -> Result<(), CliError> {
    let recording = Recording::load(&log_path).map_err(|e| {
        CliError::new(format!("Failed to load match log {}: {e}", log_path.display()))
    })?;

    if let Some(round) = round {
        let snapshot = recording.snapshot(round).ok_or_else(|| {
            CliError::new(format!(
                "Round {round} is not in the log ({} rounds recorded)",
                recording.rounds.len()
            ))
        })?;
        print!("{}", render_ascii(&recording.map, snapshot, recording.max_rounds));
        return Ok(());
    }

    print!("{}", summarize(&recording));
    Ok(())
}

fn summarize(recording: &Recording) -> String {
    let mut output = format!(
        "Match log: {} players, {}x{} map, {} of {} rounds recorded\n\n",
        recording.players.len(),
        recording.map.width(),
        recording.map.height(),
        recording.rounds.len(),
        recording.max_rounds
    );

    for (report, state) in &recording.rounds {
        let units: Vec<String> = recording
            .players
            .iter()
            .map(|p| format!("P{}={}", p.id, state.units_of(p.id).count()))
            .collect();
        output.push_str(&format!("Round {:>4}: units {}", report.round, units.join(" ")));
        let rejected = report.rejected();
        if !rejected.is_empty() {
            let parts: Vec<String> = rejected.iter().map(|(p, n)| format!("P{p}={n}")).collect();
            output.push_str(&format!("  rejected {}", parts.join(" ")));
        }
        if !report.removed.is_empty() {
            output.push_str(&format!("  killed {}", report.removed.len()));
        }
        if !report.lost.is_empty() {
            output.push_str(&format!("  disconnected {:?}", report.lost));
        }
        output.push('\n');
    }

    match &recording.result {
        Some(result) => {
            output.push_str(&format!(
                "\nWinners: {:?} after {} rounds\n",
                result.winners, result.rounds_played
            ));
        }
        None => output.push_str("\nNo result entry (match did not finish)\n"),
    }
    output
}
