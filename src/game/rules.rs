//! Action validation.
//!
//! Every check here is read-only. A successful check yields an order value
//! that carries everything the matching mutator on [`Match`] needs, so the
//! world is only touched by actions that have already passed every rule.

use serde::{Deserialize, Serialize};

use crate::error::RuleViolation;
use crate::game::path::{clamp_destination, line_cells};
use crate::game::{
    Balance, Coord, GroupId, Match, Phase, PlayerId, Resource, Unit, UnitId, UnitStats,
};

/// What a `move` command moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mover {
    /// A single unit. Leaves its group, if any.
    Unit(UnitId),
    /// A whole group at the speed of its slowest member.
    Group(GroupId),
}

/// A command submitted by an agent, already decoded from the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "lowercase")]
pub enum Action {
    /// Strike an enemy unit.
    Attack {
        /// Acting unit.
        unit: UnitId,
        /// Enemy unit.
        target: UnitId,
    },
    /// Walk a unit or group toward a cell.
    Move {
        /// Unit or group.
        #[serde(flatten)]
        mover: Mover,
        /// Requested destination.
        destination: Coord,
    },
    /// Gather units onto the first unit's cell as a new group.
    Group {
        /// Members; the first one anchors the group position.
        units: Vec<UnitId>,
    },
    /// Harvest the resource under a unit.
    Collect {
        /// Acting unit.
        unit: UnitId,
    },
    /// Buy a unit at the spawn point.
    Spawn {
        /// Key of the cost table.
        unit_type: String,
    },
}

impl Action {
    /// The phase this command belongs to.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        match self {
            Action::Attack { .. } => Phase::Attack,
            Action::Move { .. } | Action::Group { .. } => Phase::Move,
            Action::Collect { .. } => Phase::Collect,
            Action::Spawn { .. } => Phase::Spawn,
        }
    }

    /// Wire name of the command.
    #[must_use]
    pub const fn command(&self) -> &'static str {
        match self {
            Action::Attack { .. } => "attack",
            Action::Move { .. } => "move",
            Action::Group { .. } => "group",
            Action::Collect { .. } => "collect",
            Action::Spawn { .. } => "spawn",
        }
    }
}

/// A validated attack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttackOrder {
    pub(crate) attacker: UnitId,
    pub(crate) target: UnitId,
    pub(crate) damage: u32,
}

/// A validated move of one unit or one group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveOrder {
    pub(crate) mover: Mover,
    pub(crate) destination: Coord,
    pub(crate) remaining: Option<Coord>,
}

impl MoveOrder {
    /// Cell the unit or group ends on (after speed clamping).
    #[must_use]
    pub const fn destination(&self) -> Coord {
        self.destination
    }

    /// The requested cell, if clamping fell short of it.
    #[must_use]
    pub const fn remaining(&self) -> Option<Coord> {
        self.remaining
    }
}

/// A validated group formation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupOrder {
    pub(crate) owner: PlayerId,
    pub(crate) position: Coord,
    pub(crate) members: Vec<UnitId>,
}

/// A validated harvest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectOrder {
    pub(crate) unit: UnitId,
    pub(crate) owner: PlayerId,
    pub(crate) cell: Coord,
    pub(crate) resource: Resource,
    pub(crate) amount: u32,
}

/// A validated purchase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnOrder {
    pub(crate) player: PlayerId,
    pub(crate) unit_type: String,
    pub(crate) cost: Balance,
    pub(crate) stats: UnitStats,
    pub(crate) position: Coord,
}

/// Any validated action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Order {
    /// See [`AttackOrder`].
    Attack(AttackOrder),
    /// See [`MoveOrder`].
    Move(MoveOrder),
    /// See [`GroupOrder`].
    Group(GroupOrder),
    /// See [`CollectOrder`].
    Collect(CollectOrder),
    /// See [`SpawnOrder`].
    Spawn(SpawnOrder),
}

/// Check `action` submitted by `player` against the current world.
///
/// # Errors
///
/// Returns the first rule the action breaks.
pub fn validate(state: &Match, player: PlayerId, action: &Action) -> Result<Order, RuleViolation> {
    match action {
        Action::Attack { unit, target } => {
            validate_attack(state, player, *unit, *target).map(Order::Attack)
        }
        Action::Move {
            mover: Mover::Unit(unit),
            destination,
        } => validate_move(state, player, *unit, *destination).map(Order::Move),
        Action::Move {
            mover: Mover::Group(group),
            destination,
        } => validate_group_move(state, player, *group, *destination).map(Order::Move),
        Action::Group { units } => validate_form_group(state, player, units).map(Order::Group),
        Action::Collect { unit } => validate_collect(state, player, *unit).map(Order::Collect),
        Action::Spawn { unit_type } => validate_spawn(state, player, unit_type).map(Order::Spawn),
    }
}

fn owned_unit(state: &Match, player: PlayerId, id: UnitId) -> Result<&Unit, RuleViolation> {
    let unit = state.unit(id).ok_or(RuleViolation::UnknownUnit(id))?;
    if unit.owner != player {
        return Err(RuleViolation::NotOwner {
            player,
            what: "unit",
            id,
        });
    }
    Ok(unit)
}

/// First impassable cell on the straight walk from `from` to `to`.
fn first_blocked(state: &Match, from: Coord, to: Coord) -> Option<Coord> {
    line_cells(from, to)
        .into_iter()
        .find(|&cell| !state.map().is_passable(cell))
}

/// Clamp the destination to `speed` and check the path to it.
fn plan_path(
    state: &Match,
    from: Coord,
    requested: Coord,
    speed: u32,
) -> Result<Coord, RuleViolation> {
    if !state.map().in_bounds(requested) {
        return Err(RuleViolation::OutOfBounds(requested));
    }
    let destination = clamp_destination(from, requested, speed);
    if let Some(blocked) = first_blocked(state, from, destination) {
        return Err(RuleViolation::PathBlocked {
            destination,
            blocked,
        });
    }
    Ok(destination)
}

/// Validate an attack by `attacker` on `target`.
///
/// Units that dropped to zero health earlier in the same attack phase can
/// still strike and be struck; they are only removed once the phase ends.
///
/// # Errors
///
/// Fails on unknown units, friendly targets, a second attack in one round,
/// or a target beyond `attack_range`.
pub fn validate_attack(
    state: &Match,
    player: PlayerId,
    attacker: UnitId,
    target: UnitId,
) -> Result<AttackOrder, RuleViolation> {
    let actor = owned_unit(state, player, attacker)?;
    let victim = state.unit(target).ok_or(RuleViolation::UnknownUnit(target))?;

    if victim.owner == actor.owner {
        return Err(RuleViolation::FriendlyFire { attacker, target });
    }
    if actor.attacked_this_round {
        return Err(RuleViolation::AlreadyActed {
            unit: attacker,
            done: "attacked",
        });
    }
    if !actor.position.within(victim.position, actor.stats.attack_range) {
        return Err(RuleViolation::OutOfRange { attacker, target });
    }

    Ok(AttackOrder {
        attacker,
        target,
        damage: actor.stats.attack,
    })
}

/// Validate moving a single unit toward `destination`.
///
/// # Errors
///
/// Fails on unknown or foreign units, destinations off the map, a second
/// move in one round, or an impassable cell on the clamped path.
pub fn validate_move(
    state: &Match,
    player: PlayerId,
    unit: UnitId,
    destination: Coord,
) -> Result<MoveOrder, RuleViolation> {
    let actor = owned_unit(state, player, unit)?;
    if actor.moved_this_round {
        return Err(RuleViolation::AlreadyActed {
            unit,
            done: "moved",
        });
    }
    let reached = plan_path(state, actor.position, destination, actor.stats.speed)?;

    Ok(MoveOrder {
        mover: Mover::Unit(unit),
        destination: reached,
        remaining: (reached != destination).then_some(destination),
    })
}

/// Validate moving a whole group toward `destination`.
///
/// # Errors
///
/// Fails on unknown or foreign groups, an empty group, any member that
/// already moved, or a blocked path.
pub fn validate_group_move(
    state: &Match,
    player: PlayerId,
    group: GroupId,
    destination: Coord,
) -> Result<MoveOrder, RuleViolation> {
    let found = state.group(group).ok_or(RuleViolation::UnknownGroup(group))?;
    if found.owner != player {
        return Err(RuleViolation::NotOwner {
            player,
            what: "group",
            id: group,
        });
    }
    if found.members.is_empty() {
        return Err(RuleViolation::EmptyGroup);
    }
    if let Some(moved) = found
        .members
        .iter()
        .filter_map(|id| state.unit(*id))
        .find(|u| u.moved_this_round)
    {
        return Err(RuleViolation::AlreadyActed {
            unit: moved.id,
            done: "moved",
        });
    }
    let speed = found.speed(state.units());
    let reached = plan_path(state, found.position, destination, speed)?;

    Ok(MoveOrder {
        mover: Mover::Group(group),
        destination: reached,
        remaining: (reached != destination).then_some(destination),
    })
}

/// Validate forming a group from `units`.
///
/// The first unit anchors the group on its own cell. Every other unit must
/// be able to reach that cell this round with a straight, passable walk.
/// Repeated ids are ignored.
///
/// # Errors
///
/// Fails on an empty list, unknown or foreign units, a member that already
/// moved, or a member that cannot reach the anchor.
pub fn validate_form_group(
    state: &Match,
    player: PlayerId,
    units: &[UnitId],
) -> Result<GroupOrder, RuleViolation> {
    let (&anchor_id, rest) = units.split_first().ok_or(RuleViolation::EmptyGroup)?;
    let anchor = owned_unit(state, player, anchor_id)?;
    let position = anchor.position;

    let mut members = vec![anchor_id];
    for &id in rest {
        if members.contains(&id) {
            continue;
        }
        let unit = owned_unit(state, player, id)?;
        if unit.position != position {
            if unit.moved_this_round {
                return Err(RuleViolation::AlreadyActed {
                    unit: id,
                    done: "moved",
                });
            }
            if !unit.position.within(position, unit.stats.speed) {
                return Err(RuleViolation::TooFarToGroup { unit: id, position });
            }
            if let Some(blocked) = first_blocked(state, unit.position, position) {
                return Err(RuleViolation::PathBlocked {
                    destination: position,
                    blocked,
                });
            }
        }
        members.push(id);
    }

    Ok(GroupOrder {
        owner: player,
        position,
        members,
    })
}

/// Validate a harvest by `unit`.
///
/// # Errors
///
/// Fails on unknown or foreign units, units with no carrying capacity, a
/// second collect in one round, cells without a resource, or a cell some
/// other unit already harvested this round.
pub fn validate_collect(
    state: &Match,
    player: PlayerId,
    unit: UnitId,
) -> Result<CollectOrder, RuleViolation> {
    let actor = owned_unit(state, player, unit)?;
    if actor.stats.collect_amount == 0 {
        return Err(RuleViolation::CannotCollect { unit });
    }
    if actor.collected_this_round {
        return Err(RuleViolation::AlreadyActed {
            unit,
            done: "collected",
        });
    }
    let cell = actor.position;
    let resource = state
        .map()
        .get(cell)
        .and_then(|terrain| terrain.resource())
        .ok_or(RuleViolation::NotOnResource { unit })?;
    if state.is_harvested(cell) {
        return Err(RuleViolation::AlreadyHarvested(cell));
    }

    Ok(CollectOrder {
        unit,
        owner: actor.owner,
        cell,
        resource,
        amount: actor.stats.collect_amount,
    })
}

/// Validate buying one `unit_type` for `player`.
///
/// # Errors
///
/// Fails on unknown players, unknown unit types, or a balance that does not
/// cover every resource line of the cost.
pub fn validate_spawn(
    state: &Match,
    player: PlayerId,
    unit_type: &str,
) -> Result<SpawnOrder, RuleViolation> {
    let buyer = state
        .player(player)
        .ok_or(RuleViolation::UnknownPlayer(player))?;
    let template = state
        .template(unit_type)
        .ok_or_else(|| RuleViolation::UnknownUnitType(unit_type.to_string()))?;
    if let Some(short) = buyer.balance.shortfall(&template.cost) {
        return Err(RuleViolation::InsufficientFunds {
            unit_type: unit_type.to_string(),
            short,
        });
    }

    Ok(SpawnOrder {
        player,
        unit_type: unit_type.to_string(),
        cost: template.cost,
        stats: template.stats,
        position: buyer.spawn_point,
    })
}
