//! Error taxonomy for the match host.
//!
//! Only [`ProcessError`] is fatal to a match. Everything else is recovered
//! locally so one misbehaving agent cannot halt the simulation for the others.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::game::{Coord, GroupId, Phase, PlayerId, Resource, UnitId};

/// A malformed or out-of-phase inbound message. The message is dropped and
/// the session keeps reading.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The line was not valid JSON or did not match any known command.
    #[error("unparsable message: {0}")]
    Malformed(#[from] serde_json::Error),
    /// The line was not valid UTF-8.
    #[error("message is not valid UTF-8")]
    NotUtf8,
    /// The line exceeded the per-message size limit.
    #[error("message exceeds {limit} bytes")]
    TooLarge {
        /// Limit in bytes.
        limit: usize,
    },
    /// A field was present but carried an unusable value.
    #[error("invalid field `{field}`: {reason}")]
    InvalidField {
        /// Wire name of the field.
        field: &'static str,
        /// Why it was rejected.
        reason: &'static str,
    },
    /// The command does not belong to the phase it was submitted for.
    #[error("`{command}` cannot be submitted during the {phase} phase")]
    OutOfPhase {
        /// Wire name of the command.
        command: &'static str,
        /// Phase the message was tagged with.
        phase: Phase,
    },
    /// The message targets a phase that is already over, or a round that
    /// has not been reached yet.
    #[error("round {turn} {phase} phase is not open for submissions")]
    NotOpen {
        /// Round the message named.
        turn: u32,
        /// Phase the message named.
        phase: Phase,
    },
}

/// An illegal action. The action is dropped with no side effects.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleViolation {
    /// The referenced unit does not exist (or already died).
    #[error("unit {0} does not exist")]
    UnknownUnit(UnitId),
    /// The referenced group does not exist.
    #[error("group {0} does not exist")]
    UnknownGroup(GroupId),
    /// The acting unit or group belongs to another player.
    #[error("player {player} does not own {what} {id}")]
    NotOwner {
        /// Submitting player.
        player: PlayerId,
        /// "unit" or "group".
        what: &'static str,
        /// Entity id.
        id: u32,
    },
    /// Attack on a unit of the same owner.
    #[error("unit {attacker} cannot attack friendly unit {target}")]
    FriendlyFire {
        /// Acting unit.
        attacker: UnitId,
        /// Target unit.
        target: UnitId,
    },
    /// Target is farther than the attacker's range.
    #[error("unit {target} is out of range of unit {attacker}")]
    OutOfRange {
        /// Acting unit.
        attacker: UnitId,
        /// Target unit.
        target: UnitId,
    },
    /// The unit already used its action for this phase kind this round.
    #[error("unit {unit} already {done} this round")]
    AlreadyActed {
        /// Acting unit.
        unit: UnitId,
        /// "attacked", "moved" or "collected".
        done: &'static str,
    },
    /// Destination lies outside the map.
    #[error("destination {0} is outside the map")]
    OutOfBounds(Coord),
    /// The straight path crosses an impassable cell.
    #[error("path to {destination} is blocked at {blocked}")]
    PathBlocked {
        /// Clamped destination.
        destination: Coord,
        /// First impassable cell on the path.
        blocked: Coord,
    },
    /// A grouped move or group formation referenced a unit that cannot join.
    #[error("unit {unit} cannot join a group at {position}")]
    TooFarToGroup {
        /// Candidate member.
        unit: UnitId,
        /// Group position.
        position: Coord,
    },
    /// A group needs at least one member.
    #[error("a group needs at least one member")]
    EmptyGroup,
    /// The unit's cell yields no resource.
    #[error("unit {unit} is not on a resource node")]
    NotOnResource {
        /// Acting unit.
        unit: UnitId,
    },
    /// Another unit already harvested this cell this round.
    #[error("resource node at {0} was already harvested this round")]
    AlreadyHarvested(Coord),
    /// The unit cannot carry anything.
    #[error("unit {unit} cannot collect")]
    CannotCollect {
        /// Acting unit.
        unit: UnitId,
    },
    /// Unit type is not in the cost table.
    #[error("unknown unit type `{0}`")]
    UnknownUnitType(String),
    /// Balance does not cover the cost.
    #[error("cannot afford `{unit_type}`: short of {short}")]
    InsufficientFunds {
        /// Requested type.
        unit_type: String,
        /// First resource line that is not covered.
        short: Resource,
    },
    /// The submitting player has no seat in this match.
    #[error("player {0} is not in this match")]
    UnknownPlayer(PlayerId),
}

/// The agent's connection is gone. The session is marked dead and its agent
/// is treated as taking no actions from then on.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The connection was already closed.
    #[error("channel to player {0} is closed")]
    Closed(PlayerId),
    /// Writing to the connection failed.
    #[error("write to player {player} failed: {source}")]
    Write {
        /// Player whose channel failed.
        player: PlayerId,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// The outgoing message could not be encoded.
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// The agent process could not be started or did not connect back in time.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The artifact does not exist.
    #[error("agent artifact {0} not found")]
    MissingArtifact(PathBuf),
    /// No launcher is known for this kind of artifact.
    #[error("unsupported agent artifact {0}")]
    UnsupportedArtifact(PathBuf),
    /// Spawning the process failed.
    #[error("failed to start agent {path}: {source}")]
    Spawn {
        /// Artifact path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// The process exited before connecting.
    #[error("agent {path} exited before connecting ({status})")]
    Exited {
        /// Artifact path.
        path: PathBuf,
        /// Exit status as reported by the OS.
        status: String,
    },
    /// No connection arrived within the startup window.
    #[error("agent {path} did not connect within {timeout_ms} ms")]
    ConnectTimeout {
        /// Artifact path.
        path: PathBuf,
        /// Startup window.
        timeout_ms: u64,
    },
    /// The wait for the connection was cut short by an abort.
    #[error("startup of agent {0} was interrupted")]
    Interrupted(PathBuf),
    /// Listener or socket setup failed.
    #[error("coordination socket error: {0}")]
    Socket(#[from] io::Error),
}

/// Invalid map description.
#[derive(Debug, Error)]
pub enum MapError {
    /// Width or height is zero.
    #[error("map must have non-zero size")]
    Empty,
    /// Rows have different lengths.
    #[error("row {row} has {found} cells, expected {expected}")]
    Ragged {
        /// Zero-based row.
        row: usize,
        /// Cells found.
        found: usize,
        /// Cells in the first row.
        expected: usize,
    },
    /// A cell is not a terrain digit.
    #[error("unknown terrain `{symbol}` at {coord}")]
    UnknownTerrain {
        /// Offending character.
        symbol: char,
        /// Cell position.
        coord: Coord,
    },
    /// A spawn point is off the map or impassable.
    #[error("spawn point {0} is not a passable cell")]
    BadSpawn(Coord),
    /// Reading the map file failed.
    #[error("failed to read map: {0}")]
    Io(#[from] io::Error),
}

/// Invalid match configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading the file failed.
    #[error("failed to read config: {0}")]
    Io(#[from] io::Error),
    /// The file is not valid TOML for a match config.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    /// A value is out of range.
    #[error("invalid config: {0}")]
    Invalid(String),
    /// The configured map is unusable.
    #[error(transparent)]
    Map(#[from] MapError),
}

/// Top-level failure of a match.
#[derive(Debug, Error)]
pub enum MatchError {
    /// Not enough agents.
    #[error("too few players: {0} (minimum 2)")]
    TooFewPlayers(usize),
    /// Too many agents.
    #[error("too many players: {0} (maximum 8)")]
    TooManyPlayers(usize),
    /// Configuration was rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// An agent could not be started. Fatal by design of the protocol.
    #[error("setup failed for player {player}: {source}")]
    Setup {
        /// Player whose agent failed.
        player: PlayerId,
        /// Underlying process error.
        #[source]
        source: ProcessError,
    },
    /// The coordination socket could not be opened.
    #[error("failed to open coordination port: {0}")]
    Bind(#[source] io::Error),
    /// The match was aborted administratively.
    #[error("match aborted after round {round}")]
    Aborted {
        /// Last round that started.
        round: u32,
    },
    /// The match log could not be written.
    #[error("match log error: {0}")]
    Log(#[from] crate::replay::ReplayError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_violation_display() {
        let err = RuleViolation::InsufficientFunds {
            unit_type: "attacker".to_string(),
            short: Resource::Metal,
        };
        assert_eq!(err.to_string(), "cannot afford `attacker`: short of metal");

        let err = RuleViolation::PathBlocked {
            destination: Coord::new(4, 0),
            blocked: Coord::new(2, 0),
        };
        assert_eq!(err.to_string(), "path to (4, 0) is blocked at (2, 0)");
    }

    #[test]
    fn test_out_of_phase_display() {
        let err = ProtocolError::OutOfPhase {
            command: "spawn",
            phase: Phase::Attack,
        };
        assert!(err.to_string().contains("attack phase"));
    }
}
