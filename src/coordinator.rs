//! Match coordinator.
//!
//! Owns the sessions and the [`Match`], runs rounds until the round limit
//! or a decisive position, then announces the winners.
//!
//! The coordinator handles:
//! - Launching one agent per seat and accepting its connection
//! - Sending `initialize` and `end_game`
//! - Per-player accounting across rounds
//! - The append-only match log
//! - Administrative abort

use std::net::TcpListener;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::config::MatchConfig;
use crate::error::{MatchError, ProcessError};
use crate::game::{Balance, Match, PlayerId, MAX_PLAYERS, MIN_PLAYERS};
use crate::protocol::HostMessage;
use crate::replay::{LogEntry, MatchLog};
use crate::round::{run_round, RoundReport};
use crate::session::{AgentLink, AgentSession, LaunchOptions};

/// Shared flag that stops a running match at the next phase boundary.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    /// Create an unset handle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request the abort.
    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether an abort was requested.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-player accounting for a finished match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSummary {
    /// Player identifier.
    pub player: PlayerId,
    /// Actions rejected by a rule.
    pub rule_violations: u64,
    /// Inbound messages dropped as malformed.
    pub protocol_errors: u64,
    /// Phases that ended without the agent's signal.
    pub timeouts: u64,
    /// Round in which the channel died, if it did.
    pub channel_lost: Option<u32>,
    /// Living units at the end.
    pub units: usize,
    /// Balance at the end.
    pub balance: Balance,
}

/// Final result of a match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    /// Winning players. Ties share the win.
    pub winners: Vec<PlayerId>,
    /// Rounds played.
    pub rounds_played: u32,
    /// Per-player statistics, in seat order.
    pub players: Vec<PlayerSummary>,
}

/// Running totals for one seat.
#[derive(Debug, Clone, Copy, Default)]
struct Tally {
    rule_violations: u64,
    timeouts: u64,
    channel_lost: Option<u32>,
}

/// Drives a match from `initialize` to `end_game`.
#[derive(Debug)]
pub struct Coordinator<L: AgentLink> {
    state: Match,
    sessions: Vec<L>,
    phase_timeout: Duration,
    abort: AbortHandle,
    tallies: Vec<Tally>,
    log: Option<MatchLog>,
}

impl Coordinator<AgentSession> {
    /// Build the match from `config` and start one agent per artifact.
    ///
    /// Agents are started one at a time, so connection N belongs to player N.
    ///
    /// # Errors
    ///
    /// Returns an error if the player count or config is invalid, the port
    /// cannot be opened, or any agent fails to start and connect.
    pub fn launch(config: &MatchConfig, agents: &[PathBuf]) -> Result<Self, MatchError> {
        Self::launch_with_abort(config, agents, AbortHandle::new())
    }

    /// Like [`Coordinator::launch`], with `abort` already in force while
    /// the agents start up. The returned coordinator keeps using it.
    ///
    /// # Errors
    ///
    /// As [`Coordinator::launch`], plus [`MatchError::Aborted`] if `abort`
    /// fires before every agent is connected. Agents started so far are
    /// stopped.
    pub fn launch_with_abort(
        config: &MatchConfig,
        agents: &[PathBuf],
        abort: AbortHandle,
    ) -> Result<Self, MatchError> {
        check_player_count(agents.len())?;
        let state = config.build_match(agents.len())?;

        let listener = TcpListener::bind((config.bind_addr.as_str(), config.port))
            .map_err(MatchError::Bind)?;
        let options = LaunchOptions {
            python: config.python.clone(),
            startup_timeout: Duration::from_millis(config.startup_timeout_ms),
            write_timeout: Duration::from_millis(config.phase_timeout_ms),
            abort: Some(abort.clone()),
        };

        let mut sessions = Vec::with_capacity(agents.len());
        for (seat, artifact) in agents.iter().enumerate() {
            let player = PlayerId::try_from(seat).map_err(|_| MatchError::TooManyPlayers(seat))?;
            if abort.is_aborted() {
                warn!(player, "startup aborted");
                return Err(MatchError::Aborted { round: 0 });
            }
            let session = match AgentSession::launch(player, artifact, &listener, &options) {
                Ok(session) => session,
                Err(ProcessError::Interrupted(_)) => {
                    warn!(player, "startup aborted");
                    return Err(MatchError::Aborted { round: 0 });
                }
                Err(source) => {
                    error!(player, artifact = %artifact.display(), %source, "agent setup failed");
                    return Err(MatchError::Setup { player, source });
                }
            };
            sessions.push(session);
        }

        let mut coordinator = Self::new(
            state,
            sessions,
            Duration::from_millis(config.phase_timeout_ms),
        )?;
        coordinator.abort = abort;
        Ok(coordinator)
    }
}

fn check_player_count(count: usize) -> Result<(), MatchError> {
    if count < MIN_PLAYERS {
        return Err(MatchError::TooFewPlayers(count));
    }
    if count > MAX_PLAYERS {
        return Err(MatchError::TooManyPlayers(count));
    }
    Ok(())
}

impl<L: AgentLink> Coordinator<L> {
    /// Wrap an existing match and connected sessions.
    ///
    /// # Errors
    ///
    /// Returns an error if the number of sessions is outside 2-8.
    pub fn new(state: Match, sessions: Vec<L>, phase_timeout: Duration) -> Result<Self, MatchError> {
        check_player_count(sessions.len())?;
        let tallies = vec![Tally::default(); sessions.len()];
        Ok(Self {
            state,
            sessions,
            phase_timeout,
            abort: AbortHandle::new(),
            tallies,
            log: None,
        })
    }

    /// Append every round to `log`.
    #[must_use]
    pub fn with_log(mut self, log: MatchLog) -> Self {
        self.log = Some(log);
        self
    }

    /// Handle that aborts this match from another thread.
    #[must_use]
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// The match state.
    #[must_use]
    pub const fn state(&self) -> &Match {
        &self.state
    }

    fn seat(&self, player: PlayerId) -> Option<usize> {
        self.sessions.iter().position(|s| s.player_id() == player)
    }

    fn note_lost(&mut self, player: PlayerId, round: u32) {
        if let Some(seat) = self.seat(player) {
            let tally = &mut self.tallies[seat];
            if tally.channel_lost.is_none() {
                tally.channel_lost = Some(round);
            }
        }
    }

    /// Send `initialize` to every agent.
    fn initialize(&mut self) {
        let map = self.state.map().to_columns();
        let costs = self.state.costs();
        let num_players = self.sessions.len();
        let mut lost = Vec::new();

        for session in &self.sessions {
            let player = session.player_id();
            let balance = self
                .state
                .player(player)
                .map(|p| p.balance)
                .unwrap_or_default();
            let message = HostMessage::Initialize {
                map: map.clone(),
                player_id: player,
                num_players,
                balance,
                costs: costs.clone(),
            };
            if let Err(error) = session.send(&message) {
                warn!(player, %error, "initialize not delivered");
                lost.push(player);
            }
        }
        for player in lost {
            self.note_lost(player, 0);
        }
    }

    fn record(&mut self, report: &RoundReport) -> Result<(), MatchError> {
        for phase in report.phases.values() {
            for (&player, &count) in &phase.rejected {
                if let Some(seat) = self.seat(player) {
                    self.tallies[seat].rule_violations += u64::from(count);
                }
            }
            for &player in &phase.timed_out {
                if let Some(seat) = self.seat(player) {
                    self.tallies[seat].timeouts += 1;
                }
            }
        }
        // A channel that died between rounds never shows up in `report.lost`.
        let dead: Vec<PlayerId> = self
            .sessions
            .iter()
            .filter(|s| !s.is_alive())
            .map(AgentLink::player_id)
            .collect();
        for player in report.lost.iter().copied().chain(dead) {
            self.note_lost(player, report.round);
        }

        if let Some(log) = &mut self.log {
            log.append(&LogEntry::Round {
                report: report.clone(),
                state: self.state.get_state(),
            })?;
        }
        Ok(())
    }

    fn close_all(&self) {
        for session in &self.sessions {
            session.close();
        }
    }

    fn summarize(&self, winners: Vec<PlayerId>) -> MatchResult {
        let players = self
            .sessions
            .iter()
            .zip(&self.tallies)
            .map(|(session, tally)| {
                let player = session.player_id();
                PlayerSummary {
                    player,
                    rule_violations: tally.rule_violations,
                    protocol_errors: session.protocol_errors(),
                    timeouts: tally.timeouts,
                    channel_lost: tally.channel_lost,
                    units: self.state.unit_count(player),
                    balance: self
                        .state
                        .player(player)
                        .map(|p| p.balance)
                        .unwrap_or_default(),
                }
            })
            .collect();
        MatchResult {
            winners,
            rounds_played: self.state.round(),
            players,
        }
    }

    /// Run the match to completion.
    ///
    /// Every session is closed when this returns, whatever the outcome.
    ///
    /// # Errors
    ///
    /// Returns [`MatchError::Aborted`] if the abort handle fires, or a log
    /// error if the match log cannot be written.
    pub fn run(mut self) -> Result<MatchResult, MatchError> {
        let outcome = self.play();
        self.close_all();
        outcome
    }

    fn play(&mut self) -> Result<MatchResult, MatchError> {
        if let Some(log) = &mut self.log {
            log.append(&LogEntry::header(&self.state))?;
        }
        self.initialize();
        info!(
            players = self.sessions.len(),
            max_rounds = self.state.max_rounds(),
            "match started"
        );

        while !self.state.is_over() {
            let report = run_round(
                &mut self.state,
                &self.sessions,
                self.phase_timeout,
                &self.abort,
            )
            .inspect_err(|error| warn!(%error, "match stopped"))?;
            self.record(&report)?;
        }

        let winners = self.state.winners();
        for session in self.sessions.iter().filter(|s| s.is_alive()) {
            let message = HostMessage::EndGame {
                winners: winners.clone(),
            };
            if let Err(error) = session.send(&message) {
                warn!(player = session.player_id(), %error, "end_game not delivered");
            }
        }

        let result = self.summarize(winners);
        info!(rounds = result.rounds_played, winners = ?result.winners, "match finished");
        if let Some(log) = &mut self.log {
            log.append(&LogEntry::Result {
                result: result.clone(),
            })?;
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{default_templates, Coord, Map, Player};
    use crate::session::AgentSession;
    use std::net::TcpStream;
    use std::path::Path;

    fn duel() -> Match {
        let players = vec![
            Player::new(0, Balance::new(15, 15), Coord::new(0, 0)),
            Player::new(1, Balance::new(15, 15), Coord::new(7, 7)),
        ];
        Match::new(Map::new(8, 8).unwrap(), players, default_templates()).with_max_rounds(2)
    }

    #[test]
    fn test_player_count_bounds() {
        assert!(matches!(
            check_player_count(1),
            Err(MatchError::TooFewPlayers(1))
        ));
        assert!(matches!(
            check_player_count(9),
            Err(MatchError::TooManyPlayers(9))
        ));
        assert!(check_player_count(8).is_ok());
    }

    #[test]
    fn test_abort_during_startup() {
        let dir = tempfile::tempdir().unwrap();
        let agents = [dir.path().join("a.py"), dir.path().join("b.py")];
        let config = MatchConfig {
            port: 0,
            ..MatchConfig::default()
        };
        let abort = AbortHandle::new();
        abort.abort();
        assert!(matches!(
            Coordinator::launch_with_abort(&config, &agents, abort),
            Err(MatchError::Aborted { round: 0 })
        ));
    }

    #[test]
    fn test_abort_handle_shared() {
        let handle = AbortHandle::new();
        let clone = handle.clone();
        assert!(!handle.is_aborted());
        clone.abort();
        assert!(handle.is_aborted());
    }

    fn idle_sessions(listener: &TcpListener) -> (Vec<TcpStream>, Vec<AgentSession>) {
        let addr = listener.local_addr().unwrap();
        let mut agents = Vec::new();
        let mut sessions = Vec::new();
        for player in 0..2 {
            agents.push(TcpStream::connect(addr).unwrap());
            let (stream, _) = listener.accept().unwrap();
            sessions.push(
                AgentSession::from_stream(player, stream, None, Path::new("idle")).unwrap(),
            );
        }
        (agents, sessions)
    }

    #[test]
    fn test_abort_before_first_round() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let (_agents, sessions) = idle_sessions(&listener);
        let coordinator =
            Coordinator::new(duel(), sessions, Duration::from_millis(20)).unwrap();
        coordinator.abort_handle().abort();
        assert!(matches!(
            coordinator.run(),
            Err(MatchError::Aborted { round: 1 })
        ));
    }

    #[test]
    fn test_idle_agents_play_out_round_limit() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let (_agents, sessions) = idle_sessions(&listener);

        let coordinator =
            Coordinator::new(duel(), sessions, Duration::from_millis(20)).unwrap();
        let result = coordinator.run().unwrap();
        assert_eq!(result.rounds_played, 2);
        assert_eq!(result.winners, vec![0, 1]);
        assert!(result.players.iter().all(|p| p.timeouts == 8));
    }
}
