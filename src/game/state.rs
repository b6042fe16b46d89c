//! Match state: the single aggregate the round loop mutates.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::RuleViolation;
use crate::game::rules::{
    self, Action, AttackOrder, CollectOrder, GroupOrder, MoveOrder, Mover, Order, SpawnOrder,
};
use crate::game::{
    Balance, Coord, Group, GroupId, Map, Player, PlayerId, Unit, UnitId, UnitStats,
    UnitTemplate,
};

/// Maximum number of players in a match.
pub const MAX_PLAYERS: usize = 8;

/// Minimum number of players in a match.
pub const MIN_PLAYERS: usize = 2;

/// Owned copy of everything agents see at a phase start.
///
/// Serializes as the `state` field of `part_start`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    /// Round the snapshot was taken in.
    pub round: u32,
    /// Balance per player id.
    pub players: BTreeMap<PlayerId, Balance>,
    /// Living units in id order.
    pub units: Vec<Unit>,
    /// Groups in id order.
    pub groups: Vec<Group>,
}

impl WorldSnapshot {
    /// Units owned by `player`.
    pub fn units_of(&self, player: PlayerId) -> impl Iterator<Item = &Unit> + '_ {
        self.units.iter().filter(move |u| u.owner == player)
    }
}

/// Complete match state.
#[derive(Debug, Clone)]
pub struct Match {
    map: Map,
    players: Vec<Player>,
    units: BTreeMap<UnitId, Unit>,
    groups: BTreeMap<GroupId, Group>,
    templates: BTreeMap<String, UnitTemplate>,
    round: u32,
    max_rounds: u32,
    next_unit: UnitId,
    next_group: GroupId,
    /// Resource cells harvested in the current round.
    harvested: BTreeSet<Coord>,
}

impl Match {
    /// Create a match before its first round.
    ///
    /// `templates` doubles as the cost table sent to agents.
    #[must_use]
    pub fn new(map: Map, players: Vec<Player>, templates: BTreeMap<String, UnitTemplate>) -> Self {
        Self {
            map,
            players,
            units: BTreeMap::new(),
            groups: BTreeMap::new(),
            templates,
            round: 0,
            max_rounds: u32::MAX,
            next_unit: 0,
            next_group: 0,
            harvested: BTreeSet::new(),
        }
    }

    /// Set the round limit.
    #[must_use]
    pub const fn with_max_rounds(mut self, max_rounds: u32) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    /// Current round number. Zero before the first round starts.
    #[must_use]
    pub const fn round(&self) -> u32 {
        self.round
    }

    /// Round limit.
    #[must_use]
    pub const fn max_rounds(&self) -> u32 {
        self.max_rounds
    }

    /// The terrain grid.
    #[must_use]
    pub const fn map(&self) -> &Map {
        &self.map
    }

    /// Players in seat order.
    #[must_use]
    pub fn players(&self) -> &[Player] {
        &self.players
    }

    /// Get a player by id.
    #[must_use]
    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    fn player_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == id)
    }

    /// All living units.
    #[must_use]
    pub const fn units(&self) -> &BTreeMap<UnitId, Unit> {
        &self.units
    }

    /// Get a unit by id.
    #[must_use]
    pub fn unit(&self, id: UnitId) -> Option<&Unit> {
        self.units.get(&id)
    }

    /// All groups.
    #[must_use]
    pub const fn groups(&self) -> &BTreeMap<GroupId, Group> {
        &self.groups
    }

    /// Get a group by id.
    #[must_use]
    pub fn group(&self, id: GroupId) -> Option<&Group> {
        self.groups.get(&id)
    }

    /// Unit types with their costs and stats.
    #[must_use]
    pub const fn templates(&self) -> &BTreeMap<String, UnitTemplate> {
        &self.templates
    }

    /// Template for one unit type.
    #[must_use]
    pub fn template(&self, kind: &str) -> Option<&UnitTemplate> {
        self.templates.get(kind)
    }

    /// Cost table as sent in `initialize`.
    #[must_use]
    pub fn costs(&self) -> BTreeMap<String, Balance> {
        self.templates
            .iter()
            .map(|(kind, template)| (kind.clone(), template.cost))
            .collect()
    }

    /// Whether a resource cell was harvested this round.
    #[must_use]
    pub fn is_harvested(&self, cell: Coord) -> bool {
        self.harvested.contains(&cell)
    }

    /// Number of living units owned by `player`.
    #[must_use]
    pub fn unit_count(&self, player: PlayerId) -> usize {
        self.units.values().filter(|u| u.owner == player).count()
    }

    /// Start the next round: bump the counter, clear per-round unit flags
    /// and the harvest record.
    pub fn begin_round(&mut self) -> u32 {
        self.round += 1;
        for unit in self.units.values_mut() {
            unit.reset_round_flags();
        }
        self.harvested.clear();
        self.round
    }

    /// Place a unit for free, e.g. for scenario setup.
    ///
    /// # Errors
    ///
    /// Fails if the owner, unit type or cell is unusable.
    pub fn place_unit(
        &mut self,
        owner: PlayerId,
        kind: &str,
        position: Coord,
    ) -> Result<UnitId, RuleViolation> {
        if self.player(owner).is_none() {
            return Err(RuleViolation::UnknownPlayer(owner));
        }
        let stats = self
            .template(kind)
            .ok_or_else(|| RuleViolation::UnknownUnitType(kind.to_string()))?
            .stats;
        if !self.map.in_bounds(position) {
            return Err(RuleViolation::OutOfBounds(position));
        }
        if !self.map.is_passable(position) {
            return Err(RuleViolation::PathBlocked {
                destination: position,
                blocked: position,
            });
        }
        Ok(self.insert_unit(owner, kind, stats, position))
    }

    fn insert_unit(
        &mut self,
        owner: PlayerId,
        kind: &str,
        stats: UnitStats,
        position: Coord,
    ) -> UnitId {
        let id = self.next_unit;
        self.next_unit += 1;
        self.units
            .insert(id, Unit::new(id, owner, kind, stats, position));
        id
    }

    /// Validate and apply one action.
    ///
    /// # Errors
    ///
    /// Returns the violated rule; the world is left untouched in that case.
    pub fn execute(&mut self, player: PlayerId, action: &Action) -> Result<(), RuleViolation> {
        let order = rules::validate(self, player, action)?;
        self.apply(order);
        Ok(())
    }

    /// Apply a validated order.
    pub fn apply(&mut self, order: Order) {
        match order {
            Order::Attack(order) => self.apply_attack(&order),
            Order::Move(order) => self.apply_move(&order),
            Order::Group(order) => {
                self.apply_form_group(order);
            }
            Order::Collect(order) => self.apply_collect(&order),
            Order::Spawn(order) => {
                self.apply_spawn(order);
            }
        }
    }

    /// Damage the target and mark the attacker. Deaths wait for
    /// [`Match::remove_dead_units`].
    pub fn apply_attack(&mut self, order: &AttackOrder) {
        if let Some(attacker) = self.units.get_mut(&order.attacker) {
            attacker.attacked_this_round = true;
        }
        if let Some(target) = self.units.get_mut(&order.target) {
            target.take_damage(order.damage);
        }
    }

    /// Move a unit or a group to the order's destination and queue whatever
    /// is left of the requested move. Replaces any earlier queued move.
    pub fn apply_move(&mut self, order: &MoveOrder) {
        match order.mover {
            Mover::Unit(id) => {
                let Some(unit) = self.units.get_mut(&id) else {
                    return;
                };
                unit.position = order.destination;
                unit.moved_this_round = true;
                unit.queued_move = order.remaining;
                if let Some(group) = unit.group.take() {
                    self.leave_group(group, id);
                }
            }
            Mover::Group(id) => {
                let Some(group) = self.groups.get_mut(&id) else {
                    return;
                };
                group.position = order.destination;
                group.queued_move = order.remaining;
                for member in &group.members {
                    if let Some(unit) = self.units.get_mut(member) {
                        unit.position = order.destination;
                        unit.moved_this_round = true;
                    }
                }
            }
        }
    }

    /// Continue queued moves of groups, then of ungrouped units, each in id
    /// order. A continuation is validated like a fresh move: movers that
    /// already moved this round keep their queue for a later round, and a
    /// continuation that is no longer legal is dropped.
    ///
    /// Returns the movers that advanced.
    pub fn continue_queued_moves(&mut self) -> Vec<Mover> {
        let groups = self
            .groups
            .values()
            .filter_map(|g| g.queued_move.map(|to| (g.owner, Mover::Group(g.id), to)));
        let units = self
            .units
            .values()
            .filter(|u| u.group.is_none())
            .filter_map(|u| u.queued_move.map(|to| (u.owner, Mover::Unit(u.id), to)));
        let pending: Vec<(PlayerId, Mover, Coord)> = groups.chain(units).collect();

        let mut advanced = Vec::new();
        for (owner, mover, destination) in pending {
            let planned = match mover {
                Mover::Unit(id) => rules::validate_move(self, owner, id, destination),
                Mover::Group(id) => rules::validate_group_move(self, owner, id, destination),
            };
            match planned {
                Ok(order) => {
                    self.apply_move(&order);
                    advanced.push(mover);
                }
                Err(RuleViolation::AlreadyActed { .. }) => {}
                Err(_) => self.drop_queued_move(mover),
            }
        }
        advanced
    }

    fn drop_queued_move(&mut self, mover: Mover) {
        match mover {
            Mover::Unit(id) => {
                if let Some(unit) = self.units.get_mut(&id) {
                    unit.queued_move = None;
                }
            }
            Mover::Group(id) => {
                if let Some(group) = self.groups.get_mut(&id) {
                    group.queued_move = None;
                }
            }
        }
    }

    /// Create a group and pull its members onto the anchor cell.
    pub fn apply_form_group(&mut self, order: GroupOrder) -> GroupId {
        let id = self.next_group;
        self.next_group += 1;

        for &member in &order.members {
            let Some(unit) = self.units.get_mut(&member) else {
                continue;
            };
            if unit.position != order.position {
                unit.position = order.position;
                unit.moved_this_round = true;
            }
            unit.queued_move = None;
            let previous = unit.group.replace(id);
            if let Some(previous) = previous {
                self.leave_group(previous, member);
            }
        }

        let mut group = Group::new(id, order.owner, order.position);
        group.members = order.members;
        self.groups.insert(id, group);
        id
    }

    /// Credit the harvest to the unit's owner and mark the cell.
    pub fn apply_collect(&mut self, order: &CollectOrder) {
        if let Some(unit) = self.units.get_mut(&order.unit) {
            unit.collected_this_round = true;
        }
        self.harvested.insert(order.cell);
        if let Some(player) = self.player_mut(order.owner) {
            player.balance.credit(order.resource, order.amount);
        }
    }

    /// Charge the cost and create the unit at the spawn point.
    ///
    /// Returns `None` if the balance no longer covers the cost.
    pub fn apply_spawn(&mut self, order: SpawnOrder) -> Option<UnitId> {
        let player = self.player_mut(order.player)?;
        player.balance.try_deduct(&order.cost).ok()?;
        Some(self.insert_unit(order.player, &order.unit_type, order.stats, order.position))
    }

    /// Remove every unit with health at or below zero, dropping them from
    /// their groups. Returns the removed ids in order.
    pub fn remove_dead_units(&mut self) -> Vec<UnitId> {
        let dead: Vec<UnitId> = self
            .units
            .values()
            .filter(|u| !u.is_alive())
            .map(|u| u.id)
            .collect();

        for id in &dead {
            let group = self.units.remove(id).and_then(|unit| unit.group);
            if let Some(group) = group {
                self.leave_group(group, *id);
            }
        }
        dead
    }

    /// Take `unit` out of `group`, dissolving the group once it is empty.
    fn leave_group(&mut self, group: GroupId, unit: UnitId) {
        let empty = self.groups.get_mut(&group).is_some_and(|g| {
            g.remove_member(unit);
            g.members.is_empty()
        });
        if empty {
            self.groups.remove(&group);
        }
    }

    /// Deep copy of the visible world.
    #[must_use]
    pub fn get_state(&self) -> WorldSnapshot {
        WorldSnapshot {
            round: self.round,
            players: self.players.iter().map(|p| (p.id, p.balance)).collect(),
            units: self.units.values().cloned().collect(),
            groups: self.groups.values().cloned().collect(),
        }
    }

    /// Whether `player` can still act: it owns a unit or can buy one.
    #[must_use]
    pub fn in_contention(&self, player: PlayerId) -> bool {
        let Some(found) = self.player(player) else {
            return false;
        };
        self.units.values().any(|u| u.owner == player)
            || self
                .templates
                .values()
                .any(|t| found.balance.covers(&t.cost))
    }

    /// Players still in contention, in seat order.
    #[must_use]
    pub fn contenders(&self) -> Vec<PlayerId> {
        self.players
            .iter()
            .map(|p| p.id)
            .filter(|&id| self.in_contention(id))
            .collect()
    }

    /// At most one player is still in contention.
    #[must_use]
    pub fn is_decided(&self) -> bool {
        self.contenders().len() <= 1
    }

    /// Round limit reached or the match is decided.
    #[must_use]
    pub fn is_over(&self) -> bool {
        self.round >= self.max_rounds || self.is_decided()
    }

    /// Contending players (every player if none contend) with the most
    /// living units. Ties share the win.
    #[must_use]
    pub fn winners(&self) -> Vec<PlayerId> {
        let mut pool = self.contenders();
        if pool.is_empty() {
            pool = self.players.iter().map(|p| p.id).collect();
        }
        let best = pool
            .iter()
            .map(|&id| self.unit_count(id))
            .max()
            .unwrap_or(0);
        pool.into_iter()
            .filter(|&id| self.unit_count(id) == best)
            .collect()
    }
}
