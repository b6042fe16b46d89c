//! The fixed phase sequence of a round.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One step of a round. Every round runs all four, in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Units strike enemies in range. Deaths resolve after the whole phase.
    Attack,
    /// Units and groups walk in straight lines.
    Move,
    /// Units harvest the resource node they stand on.
    Collect,
    /// Players buy new units.
    Spawn,
}

impl Phase {
    /// Phases in round order.
    pub const ALL: [Phase; 4] = [Phase::Attack, Phase::Move, Phase::Collect, Phase::Spawn];

    /// Wire name, as used in `part` and `end_<part>`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Phase::Attack => "attack",
            Phase::Move => "move",
            Phase::Collect => "collect",
            Phase::Spawn => "spawn",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
