//! Output formatting utilities for CLI.

use std::fmt::Write as _;

use serde::Serialize;
use skirmish::MatchResult;

/// JSON-serializable match result with agent names attached.
#[derive(Debug, Serialize)]
pub(super) struct JsonMatchResult<'a> {
    /// Agent file name per seat.
    pub(super) agents: &'a [String],
    /// The result itself.
    #[serde(flatten)]
    pub(super) result: &'a MatchResult,
}

/// Format a match result as human-readable text.
pub(super) fn format_text(result: &MatchResult, agent_names: &[String]) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "Match Result");
    let winners: Vec<String> = result
        .winners
        .iter()
        .map(|&id| {
            let name = agent_names.get(usize::from(id)).map_or("Unknown", String::as_str);
            format!("Player {id} ({name})")
        })
        .collect();
    if winners.len() == 1 {
        let _ = writeln!(output, "  Winner: {}", winners[0]);
    } else {
        let _ = writeln!(output, "  Shared win: {}", winners.join(", "));
    }
    let _ = writeln!(output, "  Rounds: {}\n", result.rounds_played);

    for summary in &result.players {
        let name = agent_names
            .get(usize::from(summary.player))
            .map_or("Unknown", String::as_str);
        let _ = write!(
            output,
            "  Player {} ({name}): {} units, wood {} metal {}, {} rejected, {} malformed, {} timeouts",
            summary.player,
            summary.units,
            summary.balance.wood,
            summary.balance.metal,
            summary.rule_violations,
            summary.protocol_errors,
            summary.timeouts
        );
        if let Some(round) = summary.channel_lost {
            let _ = write!(output, " [disconnected round {round}]");
        }
        output.push('\n');
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use skirmish::PlayerSummary;
    use skirmish::game::Balance;

    fn result() -> MatchResult {
        let summary = |player| PlayerSummary {
            player,
            rule_violations: 2,
            protocol_errors: 0,
            timeouts: 1,
            channel_lost: (player == 1).then_some(4),
            units: 3,
            balance: Balance::new(5, 7),
        };
        MatchResult {
            winners: vec![0],
            rounds_played: 12,
            players: vec![summary(0), summary(1)],
        }
    }

    #[test]
    fn test_format_text() {
        let names = vec!["alpha.py".to_string(), "beta.sh".to_string()];
        let text = format_text(&result(), &names);
        assert!(text.contains("Winner: Player 0 (alpha.py)"));
        assert!(text.contains("Rounds: 12"));
        assert!(text.contains("[disconnected round 4]"));
    }

    #[test]
    fn test_json_includes_agents() {
        let names = vec!["a".to_string(), "b".to_string()];
        let result = result();
        let value = serde_json::to_value(JsonMatchResult {
            agents: &names,
            result: &result,
        })
        .unwrap();
        assert_eq!(value["agents"][1], "b");
        assert_eq!(value["rounds_played"], 12);
    }
}
