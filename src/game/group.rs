//! Groups of units that move together.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::game::{Coord, PlayerId, Unit, UnitId};

/// Identifier for a group. Ids are allocated in order and never reused.
pub type GroupId = u32;

/// Several units of one owner standing on one cell and moving as one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Unique id.
    pub id: GroupId,
    /// Owning player. Every member shares it.
    pub owner: PlayerId,
    /// Cell the group (and every member) stands on.
    pub position: Coord,
    /// Member unit ids, in joining order.
    pub members: Vec<UnitId>,
    /// Where an over-long group move is still heading.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queued_move: Option<Coord>,
}

impl Group {
    /// Create an empty group.
    #[must_use]
    pub fn new(id: GroupId, owner: PlayerId, position: Coord) -> Self {
        Self {
            id,
            owner,
            position,
            members: Vec::new(),
            queued_move: None,
        }
    }

    /// Number of members.
    #[must_use]
    pub fn size(&self) -> usize {
        self.members.len()
    }

    fn member_units<'a>(
        &'a self,
        units: &'a BTreeMap<UnitId, Unit>,
    ) -> impl Iterator<Item = &'a Unit> + 'a {
        self.members.iter().filter_map(|id| units.get(id))
    }

    /// Sum of member attack.
    #[must_use]
    pub fn attack(&self, units: &BTreeMap<UnitId, Unit>) -> u32 {
        self.member_units(units).map(|u| u.stats.attack).sum()
    }

    /// Sum of member defense.
    #[must_use]
    pub fn defense(&self, units: &BTreeMap<UnitId, Unit>) -> u32 {
        self.member_units(units).map(|u| u.stats.defense).sum()
    }

    /// Speed of the slowest member; zero for an empty group.
    #[must_use]
    pub fn speed(&self, units: &BTreeMap<UnitId, Unit>) -> u32 {
        self.member_units(units)
            .map(|u| u.stats.speed)
            .min()
            .unwrap_or(0)
    }

    /// Remove a member. Returns `false` if it was not a member.
    pub fn remove_member(&mut self, unit: UnitId) -> bool {
        let before = self.members.len();
        self.members.retain(|&id| id != unit);
        self.members.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::default_templates;

    fn units() -> BTreeMap<UnitId, Unit> {
        let templates = default_templates();
        let mut fast = templates["attacker"].stats;
        fast.speed = 12;
        let mut units = BTreeMap::new();
        units.insert(1, Unit::new(1, 0, "attacker", fast, Coord::new(0, 0)));
        units.insert(
            2,
            Unit::new(2, 0, "gatherer", templates["gatherer"].stats, Coord::new(0, 0)),
        );
        units
    }

    #[test]
    fn test_group_aggregates() {
        let units = units();
        let mut group = Group::new(0, 0, Coord::new(0, 0));
        group.members = vec![1, 2];

        assert_eq!(group.size(), 2);
        assert_eq!(group.attack(&units), 10);
        assert_eq!(group.defense(&units), 15);
        assert_eq!(group.speed(&units), 10);
    }

    #[test]
    fn test_group_remove_member() {
        let mut group = Group::new(0, 0, Coord::new(0, 0));
        group.members = vec![1, 2];
        assert!(group.remove_member(1));
        assert!(!group.remove_member(1));
        assert_eq!(group.members, vec![2]);
        assert_eq!(group.speed(&BTreeMap::new()), 0);
    }
}
