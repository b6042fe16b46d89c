//! Wire protocol between the host and agents.
//!
//! Every message is one JSON object on one line. The host speaks
//! [`HostMessage`]; agents answer with commands that [`parse_inbound`]
//! turns into [`Inbound`] values.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::error::ProtocolError;
use crate::game::{Action, Balance, Phase, PlayerId, WorldSnapshot};

/// Longest inbound line accepted, in bytes.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// A message from the host to one agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostMessage {
    /// Sent once after the agent connects.
    Initialize {
        /// Terrain codes, column-major: `map[x][y]`.
        map: Vec<Vec<u8>>,
        /// The receiving agent's player id.
        player_id: PlayerId,
        /// Number of players in the match.
        num_players: usize,
        /// Starting balance.
        balance: Balance,
        /// Price of every unit type.
        costs: BTreeMap<String, Balance>,
    },
    /// Sent at the start of every phase.
    PartStart {
        /// Round number.
        turn: u32,
        /// Phase that is starting.
        part: Phase,
        /// World at the phase start.
        state: WorldSnapshot,
    },
    /// Sent once when the match is over.
    EndGame {
        /// Winning player ids.
        winners: Vec<PlayerId>,
    },
}

/// An action an agent submitted for a round and phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    /// Round the action targets.
    pub turn: u32,
    /// Phase the action targets.
    pub phase: Phase,
    /// The decoded command.
    pub action: Action,
}

/// A decoded inbound line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A command to buffer.
    Action(Submission),
    /// `end_<part>`: the agent is done with a phase.
    PhaseEnd {
        /// Round the signal targets. `None` means the phase currently
        /// announced to the agent.
        turn: Option<u32>,
        /// Phase that is finished.
        phase: Phase,
    },
}

/// Serialize a message as one newline-terminated line.
///
/// # Errors
///
/// Returns an error if the message cannot be encoded.
pub fn encode_line<T: Serialize>(message: &T) -> Result<Vec<u8>, serde_json::Error> {
    let mut line = serde_json::to_vec(message)?;
    line.push(b'\n');
    Ok(line)
}

fn phase_named(name: &str) -> Option<Phase> {
    Phase::ALL.into_iter().find(|p| p.as_str() == name)
}

/// Decode one inbound line (without its terminator).
///
/// # Errors
///
/// Returns a [`ProtocolError`] for oversized, non-UTF-8, unparsable or
/// inconsistent messages.
pub fn parse_inbound(line: &[u8]) -> Result<Inbound, ProtocolError> {
    if line.len() > MAX_LINE_BYTES {
        return Err(ProtocolError::TooLarge {
            limit: MAX_LINE_BYTES,
        });
    }
    let text = std::str::from_utf8(line).map_err(|_| ProtocolError::NotUtf8)?;
    let value: Value = serde_json::from_str(text.trim())?;

    let Some(fields) = value.as_object() else {
        return Err(ProtocolError::InvalidField {
            field: "command",
            reason: "message is not an object",
        });
    };
    let command = fields
        .get("command")
        .and_then(Value::as_str)
        .ok_or(ProtocolError::InvalidField {
            field: "command",
            reason: "missing or not a string",
        })?;

    let turn = match fields.get("turn") {
        None | Some(Value::Null) => None,
        Some(turn) => Some(
            turn.as_u64()
                .and_then(|t| u32::try_from(t).ok())
                .ok_or(ProtocolError::InvalidField {
                    field: "turn",
                    reason: "not a round number",
                })?,
        ),
    };
    let part = match fields.get("part") {
        None | Some(Value::Null) => None,
        Some(part) => Some(part.as_str().and_then(phase_named).ok_or(
            ProtocolError::InvalidField {
                field: "part",
                reason: "unknown phase",
            },
        )?),
    };

    if let Some(suffix) = command.strip_prefix("end_") {
        let phase = phase_named(suffix).ok_or(ProtocolError::InvalidField {
            field: "command",
            reason: "unknown phase",
        })?;
        return Ok(Inbound::PhaseEnd { turn, phase });
    }

    if command == "move" && fields.contains_key("unit") && fields.contains_key("group") {
        return Err(ProtocolError::InvalidField {
            field: "group",
            reason: "a move names either a unit or a group",
        });
    }

    let action: Action = serde_json::from_value(value)?;
    let turn = turn.ok_or(ProtocolError::InvalidField {
        field: "turn",
        reason: "actions must name their round",
    })?;
    let phase = part.unwrap_or(action.phase());
    if phase != action.phase() {
        return Err(ProtocolError::OutOfPhase {
            command: action.command(),
            phase,
        });
    }

    Ok(Inbound::Action(Submission {
        turn,
        phase,
        action,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{Coord, Mover};

    fn parse(line: &str) -> Result<Inbound, ProtocolError> {
        parse_inbound(line.as_bytes())
    }

    #[test]
    fn test_parse_attack() {
        let inbound = parse(r#"{"command":"attack","turn":3,"part":"attack","unit":1,"target":4}"#)
            .unwrap();
        assert_eq!(
            inbound,
            Inbound::Action(Submission {
                turn: 3,
                phase: Phase::Attack,
                action: Action::Attack { unit: 1, target: 4 },
            })
        );
    }

    #[test]
    fn test_parse_move_variants() {
        let Inbound::Action(unit_move) =
            parse(r#"{"command":"move","turn":1,"unit":2,"destination":[5,6]}"#).unwrap()
        else {
            panic!("expected an action");
        };
        assert_eq!(unit_move.phase, Phase::Move);
        assert_eq!(
            unit_move.action,
            Action::Move {
                mover: Mover::Unit(2),
                destination: Coord::new(5, 6)
            }
        );

        let Inbound::Action(group_move) =
            parse(r#"{"command":"move","turn":1,"group":0,"destination":[1,1]}"#).unwrap()
        else {
            panic!("expected an action");
        };
        assert!(matches!(
            group_move.action,
            Action::Move {
                mover: Mover::Group(0),
                ..
            }
        ));

        assert!(matches!(
            parse(r#"{"command":"move","unit":2,"group":0,"destination":[1,1]}"#),
            Err(ProtocolError::InvalidField { field: "group", .. })
        ));
    }

    #[test]
    fn test_parse_phase_end() {
        assert_eq!(
            parse(r#"{"command":"end_collect","turn":7}"#).unwrap(),
            Inbound::PhaseEnd {
                turn: Some(7),
                phase: Phase::Collect
            }
        );
        assert_eq!(
            parse(r#"{"command":"end_spawn"}"#).unwrap(),
            Inbound::PhaseEnd {
                turn: None,
                phase: Phase::Spawn
            }
        );
        assert!(parse(r#"{"command":"end_lunch"}"#).is_err());
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(matches!(parse("not json"), Err(ProtocolError::Malformed(_))));
        assert!(matches!(parse("[1,2]"), Err(ProtocolError::InvalidField { .. })));
        assert!(matches!(
            parse(r#"{"command":"attack","unit":-1,"target":2}"#),
            Err(ProtocolError::Malformed(_))
        ));
        assert!(matches!(
            parse(r#"{"command":"dance","unit":1}"#),
            Err(ProtocolError::Malformed(_))
        ));
        assert!(matches!(
            parse(r#"{"command":"collect","unit":1}"#),
            Err(ProtocolError::InvalidField { field: "turn", .. })
        ));
        assert!(matches!(
            parse(r#"{"command":"collect","turn":"soon","unit":1}"#),
            Err(ProtocolError::InvalidField { field: "turn", .. })
        ));
        assert!(matches!(
            parse_inbound(&[0xff, 0xfe]),
            Err(ProtocolError::NotUtf8)
        ));
        let huge = vec![b' '; MAX_LINE_BYTES + 1];
        assert!(matches!(
            parse_inbound(&huge),
            Err(ProtocolError::TooLarge { .. })
        ));
    }

    #[test]
    fn test_parse_out_of_phase() {
        assert!(matches!(
            parse(r#"{"command":"spawn","turn":1,"part":"attack","unit_type":"gatherer"}"#),
            Err(ProtocolError::OutOfPhase {
                command: "spawn",
                phase: Phase::Attack
            })
        ));
    }

    #[test]
    fn test_host_message_shape() {
        let line = encode_line(&HostMessage::EndGame { winners: vec![1] }).unwrap();
        assert_eq!(line, b"{\"type\":\"end_game\",\"winners\":[1]}\n");

        let start = HostMessage::PartStart {
            turn: 2,
            part: Phase::Move,
            state: WorldSnapshot {
                round: 2,
                players: BTreeMap::from([(0, Balance::new(1, 2))]),
                units: Vec::new(),
                groups: Vec::new(),
            },
        };
        let value = serde_json::to_value(&start).unwrap();
        assert_eq!(value["type"], "part_start");
        assert_eq!(value["part"], "move");
        assert_eq!(value["state"]["players"]["0"]["metal"], 2);
    }
}
