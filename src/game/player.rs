//! Player state management.

use serde::{Deserialize, Serialize};

use crate::game::{Balance, Coord};

/// Identifier for a player. Players are numbered from 0 in launch order.
pub type PlayerId = u8;

/// State for a single player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    /// Identifier for this player; also its seat in the session list.
    pub id: PlayerId,
    /// Resources on hand.
    pub balance: Balance,
    /// Where this player's new units appear.
    pub spawn_point: Coord,
}

impl Player {
    /// Create a new player.
    #[must_use]
    pub fn new(id: PlayerId, balance: Balance, spawn_point: Coord) -> Self {
        Self {
            id,
            balance,
            spawn_point,
        }
    }
}
