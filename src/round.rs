//! Phase scheduler: one round of attack, move, collect and spawn.
//!
//! For every phase the scheduler:
//! - Broadcasts a snapshot to every live session
//! - Waits for every session in parallel against one shared deadline
//! - Applies buffered actions sequentially, by player id then arrival order
//!
//! Deaths from the attack phase are resolved only after every attack in
//! the phase has been applied.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::coordinator::AbortHandle;
use crate::error::MatchError;
use crate::game::invariants::assert_invariants;
use crate::game::{Match, Mover, Phase, PlayerId, UnitId};
use crate::session::AgentLink;

/// What happened in one phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseReport {
    /// Actions applied, per player.
    pub applied: BTreeMap<PlayerId, u32>,
    /// Actions rejected by a rule, per player.
    pub rejected: BTreeMap<PlayerId, u32>,
    /// Players that did not signal the end of the phase in time.
    pub timed_out: Vec<PlayerId>,
}

/// What happened in one round.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundReport {
    /// Round number.
    pub round: u32,
    /// Per-phase outcome, in phase order.
    pub phases: BTreeMap<Phase, PhaseReport>,
    /// Units removed after the attack phase.
    pub removed: Vec<UnitId>,
    /// Units and groups that continued a queued move after the move phase.
    #[serde(default)]
    pub continued: Vec<Mover>,
    /// Players whose channel died during this round.
    pub lost: Vec<PlayerId>,
}

impl RoundReport {
    /// Rule violations per player across all phases.
    #[must_use]
    pub fn rejected(&self) -> BTreeMap<PlayerId, u32> {
        let mut totals = BTreeMap::new();
        for report in self.phases.values() {
            for (&player, &count) in &report.rejected {
                *totals.entry(player).or_insert(0) += count;
            }
        }
        totals
    }
}

/// Run one full round against `sessions`.
///
/// Sessions whose channel is dead are skipped: they get no snapshots and
/// their buffers are discarded.
///
/// # Errors
///
/// Returns [`MatchError::Aborted`] if `abort` fires; the check runs before
/// every phase.
pub fn run_round<L: AgentLink>(
    state: &mut Match,
    sessions: &[L],
    phase_timeout: Duration,
    abort: &AbortHandle,
) -> Result<RoundReport, MatchError> {
    let round = state.begin_round();
    let mut report = RoundReport {
        round,
        ..RoundReport::default()
    };
    let alive_at_start: Vec<bool> = sessions.iter().map(AgentLink::is_alive).collect();

    for phase in Phase::ALL {
        if abort.is_aborted() {
            return Err(MatchError::Aborted { round });
        }
        let phase_report = run_phase(state, sessions, round, phase, phase_timeout);
        if phase == Phase::Attack {
            report.removed = state.remove_dead_units();
            if !report.removed.is_empty() {
                debug!(round, removed = ?report.removed, "removed dead units");
            }
        }
        if phase == Phase::Move {
            report.continued = state.continue_queued_moves();
            if !report.continued.is_empty() {
                debug!(round, continued = ?report.continued, "continued queued moves");
            }
        }
        assert_invariants(state);
        report.phases.insert(phase, phase_report);
    }

    report.lost = sessions
        .iter()
        .zip(alive_at_start)
        .filter(|(session, was_alive)| *was_alive && !session.is_alive())
        .map(|(session, _)| session.player_id())
        .collect();
    Ok(report)
}

fn run_phase<L: AgentLink>(
    state: &mut Match,
    sessions: &[L],
    round: u32,
    phase: Phase,
    timeout: Duration,
) -> PhaseReport {
    let mut report = PhaseReport::default();

    // Broadcast
    let snapshot = state.get_state();
    for session in sessions.iter().filter(|s| s.is_alive()) {
        if let Err(error) = session.send_snapshot(round, phase, &snapshot) {
            warn!(player = session.player_id(), round, %phase, %error, "snapshot not delivered");
        }
    }

    // Barrier: every wait shares one deadline
    let deadline = Instant::now() + timeout;
    let finished: Vec<bool> = sessions
        .par_iter()
        .map(|session| {
            session.is_alive()
                && session.await_phase_end(
                    round,
                    phase,
                    deadline.saturating_duration_since(Instant::now()),
                )
        })
        .collect();
    for (session, done) in sessions.iter().zip(finished) {
        // Dead channels are reported as lost, not as timeouts.
        if !done && session.is_alive() {
            let player = session.player_id();
            debug!(player, round, %phase, "phase ended without signal");
            report.timed_out.push(player);
        }
    }

    // Dispatch in player order
    let mut order: Vec<&L> = sessions.iter().collect();
    order.sort_by_key(|s| s.player_id());
    for session in order {
        let player = session.player_id();
        let actions = session.drain_actions(round, phase);
        if !session.is_alive() {
            continue;
        }
        for action in actions {
            if action.phase() != phase {
                continue;
            }
            match state.execute(player, &action) {
                Ok(()) => *report.applied.entry(player).or_insert(0) += 1,
                Err(violation) => {
                    info!(player, round, %phase, command = action.command(), %violation, "rejected action");
                    *report.rejected.entry(player).or_insert(0) += 1;
                }
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::error::ChannelError;
    use crate::game::{default_templates, Action, Balance, Coord, Map, Player, WorldSnapshot};
    use crate::protocol::HostMessage;

    /// An in-process agent that answers every phase from a script.
    #[derive(Debug)]
    struct ScriptedLink {
        player: PlayerId,
        script: Mutex<BTreeMap<(u32, Phase), Vec<Action>>>,
        silent: bool,
        dead: bool,
        seen: Mutex<Vec<(u32, Phase)>>,
    }

    impl ScriptedLink {
        fn new(player: PlayerId) -> Self {
            Self {
                player,
                script: Mutex::new(BTreeMap::new()),
                silent: false,
                dead: false,
                seen: Mutex::new(Vec::new()),
            }
        }

        fn on(self, round: u32, phase: Phase, actions: Vec<Action>) -> Self {
            self.script.lock().unwrap().insert((round, phase), actions);
            self
        }
    }

    impl AgentLink for ScriptedLink {
        fn player_id(&self) -> PlayerId {
            self.player
        }

        fn send(&self, _message: &HostMessage) -> Result<(), ChannelError> {
            Ok(())
        }

        fn send_snapshot(
            &self,
            round: u32,
            phase: Phase,
            _state: &WorldSnapshot,
        ) -> Result<(), ChannelError> {
            self.seen.lock().unwrap().push((round, phase));
            Ok(())
        }

        fn await_phase_end(&self, _round: u32, _phase: Phase, timeout: Duration) -> bool {
            if self.silent {
                std::thread::sleep(timeout);
            }
            !self.silent
        }

        fn drain_actions(&self, round: u32, phase: Phase) -> Vec<Action> {
            self.script
                .lock()
                .unwrap()
                .remove(&(round, phase))
                .unwrap_or_default()
        }

        fn protocol_errors(&self) -> u64 {
            0
        }

        fn is_alive(&self) -> bool {
            !self.dead
        }

        fn close(&self) {}
    }

    fn duel() -> Match {
        let map = Map::new(10, 10).unwrap();
        let players = vec![
            Player::new(0, Balance::new(15, 15), Coord::new(0, 0)),
            Player::new(1, Balance::new(15, 15), Coord::new(9, 9)),
        ];
        Match::new(map, players, default_templates())
    }

    #[test]
    fn test_round_visits_every_phase() {
        let mut state = duel();
        let sessions = vec![ScriptedLink::new(0), ScriptedLink::new(1)];
        let report = run_round(&mut state, &sessions, Duration::from_millis(10), &AbortHandle::new())
            .unwrap();
        assert_eq!(report.round, 1);
        assert_eq!(report.phases.len(), 4);
        assert_eq!(
            *sessions[0].seen.lock().unwrap(),
            Phase::ALL.iter().map(|&p| (1, p)).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_simultaneous_attacks() {
        let mut state = duel();
        let a = state.place_unit(0, "attacker", Coord::new(4, 4)).unwrap();
        let b = state.place_unit(1, "attacker", Coord::new(5, 5)).unwrap();
        let sessions = vec![
            ScriptedLink::new(1).on(1, Phase::Attack, vec![Action::Attack { unit: b, target: a }]),
            ScriptedLink::new(0).on(1, Phase::Attack, vec![Action::Attack { unit: a, target: b }]),
        ];

        let report =
            run_round(&mut state, &sessions, Duration::from_millis(10), &AbortHandle::new())
                .unwrap();
        assert_eq!(report.removed, vec![a, b]);
        assert!(state.units().is_empty());
    }

    #[test]
    fn test_wrong_phase_actions_ignored() {
        let mut state = duel();
        let spawn = Action::Spawn {
            unit_type: "gatherer".to_string(),
        };
        let sessions = vec![
            ScriptedLink::new(0).on(1, Phase::Attack, vec![spawn.clone()]),
            ScriptedLink::new(1).on(1, Phase::Spawn, vec![spawn.clone(), spawn]),
        ];

        let report =
            run_round(&mut state, &sessions, Duration::from_millis(10), &AbortHandle::new())
                .unwrap();
        assert_eq!(state.unit_count(0), 0);
        assert_eq!(state.unit_count(1), 1);
        assert_eq!(report.rejected().get(&1), Some(&1));
    }

    #[test]
    fn test_silent_agent_does_not_stall() {
        let mut state = duel();
        let mut quiet = ScriptedLink::new(0).on(
            1,
            Phase::Spawn,
            vec![Action::Spawn {
                unit_type: "attacker".to_string(),
            }],
        );
        quiet.silent = true;
        let sessions = vec![quiet, ScriptedLink::new(1)];

        let start = Instant::now();
        let report = run_round(&mut state, &sessions, Duration::from_millis(40), &AbortHandle::new())
            .unwrap();
        // Four phases at most one timeout each.
        assert!(start.elapsed() < Duration::from_millis(40 * 4 + 500));
        assert_eq!(report.phases[&Phase::Move].timed_out, vec![0]);
        assert_eq!(state.unit_count(0), 1);
    }

    #[test]
    fn test_queued_move_continues_next_round() {
        let mut state = duel();
        let a = state.place_unit(0, "attacker", Coord::new(0, 0)).unwrap();
        let far = Action::Move {
            mover: Mover::Unit(a),
            destination: Coord::new(9, 9),
        };
        let sessions = vec![
            ScriptedLink::new(0).on(1, Phase::Move, vec![far]),
            ScriptedLink::new(1),
        ];
        let abort = AbortHandle::new();

        let first = run_round(&mut state, &sessions, Duration::from_millis(10), &abort).unwrap();
        assert!(first.continued.is_empty());
        assert_eq!(state.unit(a).unwrap().position, Coord::new(7, 7));

        let second = run_round(&mut state, &sessions, Duration::from_millis(10), &abort).unwrap();
        assert_eq!(second.continued, vec![Mover::Unit(a)]);
        assert_eq!(state.unit(a).unwrap().position, Coord::new(9, 9));
    }

    #[test]
    fn test_dead_channel_is_not_a_timeout() {
        let mut state = duel();
        let mut gone = ScriptedLink::new(1);
        gone.dead = true;
        let sessions = vec![ScriptedLink::new(0), gone];

        let report = run_round(&mut state, &sessions, Duration::from_millis(10), &AbortHandle::new())
            .unwrap();
        assert!(report.phases.values().all(|p| p.timed_out.is_empty()));
        assert!(sessions[1].seen.lock().unwrap().is_empty());
        // It was already dead when the round started.
        assert!(report.lost.is_empty());
    }

    #[test]
    fn test_abort_before_phase() {
        let mut state = duel();
        let sessions = vec![ScriptedLink::new(0), ScriptedLink::new(1)];
        let abort = AbortHandle::new();
        abort.abort();
        assert!(matches!(
            run_round(&mut state, &sessions, Duration::from_millis(10), &abort),
            Err(MatchError::Aborted { round: 1 })
        ));
    }
}
