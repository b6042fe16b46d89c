//! Match invariants - sanity checks that detect bugs.
//!
//! The mutators on [`Match`] only ever receive validated orders, so these
//! should NEVER trigger. If they do, a rule check or mutator is wrong.

use std::collections::BTreeSet;

use crate::game::Match;

/// Invariant violation error.
#[derive(Debug, Clone)]
pub struct InvariantViolation {
    /// Description of the violated invariant.
    pub message: String,
}

impl std::fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Invariant violation: {}", self.message)
    }
}

impl std::error::Error for InvariantViolation {}

/// Check all match invariants.
///
/// Returns a list of violations found, or empty if all invariants hold.
#[must_use]
pub fn check_invariants(state: &Match) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();
    let mut push = |message: String| violations.push(InvariantViolation { message });

    let seats: BTreeSet<_> = state.players().iter().map(|p| p.id).collect();

    for unit in state.units().values() {
        if i64::from(unit.stats.max_health) < unit.health {
            push(format!(
                "Unit {} has health {} > max {}",
                unit.id, unit.health, unit.stats.max_health
            ));
        }
        if !state.map().is_passable(unit.position) {
            push(format!(
                "Unit {} stands on unusable cell {}",
                unit.id, unit.position
            ));
        }
        if !seats.contains(&unit.owner) {
            push(format!("Unit {} has unknown owner {}", unit.id, unit.owner));
        }
        if unit.group.is_some() && unit.queued_move.is_some() {
            push(format!(
                "Unit {} is grouped but has its own queued move",
                unit.id
            ));
        }
        if let Some(group_id) = unit.group {
            match state.group(group_id) {
                Some(group) if group.members.contains(&unit.id) => {}
                Some(_) => push(format!(
                    "Unit {} points at group {group_id} which does not list it",
                    unit.id
                )),
                None => push(format!(
                    "Unit {} points at missing group {group_id}",
                    unit.id
                )),
            }
        }
    }

    for group in state.groups().values() {
        if group.members.is_empty() {
            push(format!("Group {} is empty", group.id));
        }
        for member in &group.members {
            match state.unit(*member) {
                Some(unit) if unit.group != Some(group.id) => push(format!(
                    "Group {} lists unit {member} which is not in it",
                    group.id
                )),
                Some(unit) if unit.owner != group.owner => push(format!(
                    "Group {} mixes owners {} and {}",
                    group.id, group.owner, unit.owner
                )),
                Some(unit) if unit.position != group.position => push(format!(
                    "Group {} at {} has member {member} at {}",
                    group.id, group.position, unit.position
                )),
                Some(_) => {}
                None => push(format!(
                    "Group {} lists dead unit {member}",
                    group.id
                )),
            }
        }
    }

    violations
}

/// Assert all match invariants hold, panicking if any are violated.
///
/// Only active in debug builds. No-op in release builds.
///
/// # Panics
///
/// Panics with detailed message if any invariant is violated.
#[cfg(debug_assertions)]
pub fn assert_invariants(state: &Match) {
    let violations = check_invariants(state);
    if !violations.is_empty() {
        let messages: Vec<_> = violations.iter().map(|v| v.message.as_str()).collect();
        panic!("Match invariant violations:\n  - {}", messages.join("\n  - "));
    }
}

/// No-op in release builds.
#[cfg(not(debug_assertions))]
pub fn assert_invariants(_state: &Match) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{default_templates, Action, Balance, Coord, Map, Player};

    #[test]
    fn test_fresh_match_is_clean() {
        let map = Map::arena(16, 16).unwrap();
        let players = vec![
            Player::new(0, Balance::new(15, 15), Coord::new(0, 0)),
            Player::new(1, Balance::new(15, 15), Coord::new(15, 15)),
        ];
        let mut state = Match::new(map, players, default_templates());
        state.begin_round();
        let a = state.place_unit(0, "gatherer", Coord::new(1, 1)).unwrap();
        let b = state.place_unit(0, "attacker", Coord::new(2, 2)).unwrap();
        state.execute(0, &Action::Group { units: vec![a, b] }).unwrap();

        assert!(check_invariants(&state).is_empty());
        assert_invariants(&state);
    }
}
