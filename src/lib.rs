// Allow unwrap in tests (test code is not production)
#![cfg_attr(test, allow(clippy::unwrap_used))]
//! Skirmish: a match host for turn-based strategy games played by agent
//! processes.
//!
//! Each agent is a separate program. The host launches it, accepts its TCP
//! connection and talks to it in newline-delimited JSON. Every round has
//! four phases (attack, move, collect, spawn); in each phase the host
//! broadcasts the world, waits for every agent against one deadline, then
//! applies the buffered commands in player order.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │   Coordinator (match lifecycle)     │
//! ├─────────────────────────────────────┤
//! │   Round scheduler (phase barrier)   │
//! ├──────────────────┬──────────────────┤
//! │   Game rules     │  Agent sessions  │
//! │   (Match)        │  (TCP JSON lines)│
//! └──────────────────┴──────────────────┘
//! ```

pub mod config;
pub mod coordinator;
pub mod error;
pub mod game;
pub mod protocol;
pub mod replay;
pub mod round;
pub mod session;

pub use config::MatchConfig;
pub use coordinator::{AbortHandle, Coordinator, MatchResult, PlayerSummary};
pub use error::{MatchError, ProtocolError, RuleViolation};

// Re-export key game types at crate root for convenience
pub use game::{Action, Coord, Map, Match, Phase, PlayerId, Terrain, UnitId, WorldSnapshot};
