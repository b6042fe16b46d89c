//! Units and their stat templates.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::game::{Balance, Coord, GroupId, PlayerId};

/// Identifier for a unit. Ids are allocated in order and never reused.
pub type UnitId = u32;

/// Static stats shared by every unit of one type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitStats {
    /// Maximum cells travelled per round.
    pub speed: u32,
    /// Starting (and maximum) health.
    #[serde(alias = "health")]
    pub max_health: u32,
    /// Damage dealt per attack.
    pub attack: u32,
    /// Defense rating. Reported to agents and summed by groups.
    pub defense: u32,
    /// Maximum Euclidean attack distance.
    pub attack_range: u32,
    /// Sight radius, if the type has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view_range: Option<u32>,
    /// Resource units credited per successful collect.
    pub collect_amount: u32,
}

/// A buyable unit type: its cost and the stats new units receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitTemplate {
    /// Price paid at spawn.
    pub cost: Balance,
    /// Stats of spawned units.
    #[serde(flatten)]
    pub stats: UnitStats,
}

/// The built-in unit types.
#[must_use]
pub fn default_templates() -> BTreeMap<String, UnitTemplate> {
    let mut templates = BTreeMap::new();
    templates.insert(
        "gatherer".to_string(),
        UnitTemplate {
            cost: Balance::new(10, 10),
            stats: UnitStats {
                speed: 10,
                max_health: 10,
                attack: 0,
                defense: 5,
                attack_range: 0,
                view_range: None,
                collect_amount: 3,
            },
        },
    );
    templates.insert(
        "attacker".to_string(),
        UnitTemplate {
            cost: Balance::new(10, 10),
            stats: UnitStats {
                speed: 10,
                max_health: 10,
                attack: 10,
                defense: 10,
                attack_range: 15,
                view_range: None,
                collect_amount: 0,
            },
        },
    );
    templates
}

/// A unit on the field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    /// Unique id.
    pub id: UnitId,
    /// Owning player.
    pub owner: PlayerId,
    /// Unit type name (a key of the cost table).
    #[serde(rename = "type")]
    pub kind: String,
    /// Static stats from the type template.
    #[serde(flatten)]
    pub stats: UnitStats,
    /// Current health. The unit dies at the end of the attack phase once
    /// this reaches zero or below.
    pub health: i64,
    /// Current cell.
    pub position: Coord,
    /// Group membership, if any.
    #[serde(default)]
    pub group: Option<GroupId>,
    /// Set by a successful attack; cleared at round start.
    #[serde(default)]
    pub attacked_this_round: bool,
    /// Set by a successful move; cleared at round start.
    #[serde(default)]
    pub moved_this_round: bool,
    /// Set by a successful collect; cleared at round start.
    #[serde(default)]
    pub collected_this_round: bool,
    /// Where an over-long move is still heading. Continued in later move
    /// phases until reached, replaced or blocked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queued_move: Option<Coord>,
}

impl Unit {
    /// Create a unit with full health from a stat template.
    #[must_use]
    pub fn new(id: UnitId, owner: PlayerId, kind: &str, stats: UnitStats, position: Coord) -> Self {
        Self {
            id,
            owner,
            kind: kind.to_string(),
            stats,
            health: i64::from(stats.max_health),
            position,
            group: None,
            attacked_this_round: false,
            moved_this_round: false,
            collected_this_round: false,
            queued_move: None,
        }
    }

    /// Whether the unit survives end-of-phase removal.
    #[must_use]
    pub const fn is_alive(&self) -> bool {
        self.health > 0
    }

    /// Clear the per-round action flags.
    pub fn reset_round_flags(&mut self) {
        self.attacked_this_round = false;
        self.moved_this_round = false;
        self.collected_this_round = false;
    }

    /// Subtract damage. Health may go below zero.
    pub fn take_damage(&mut self, damage: u32) {
        self.health -= i64::from(damage);
    }
}
