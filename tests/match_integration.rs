//! End-to-end matches over real TCP sessions.
//!
//! Each agent is a thread on the far side of a localhost connection that
//! answers host messages from a small script.
//!
//! Run with: cargo test --release match_integration

#![allow(missing_docs)]
#![allow(clippy::unwrap_used)]

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde_json::{json, Value};

use skirmish::error::{MatchError, ProcessError};
use skirmish::game::{default_templates, Balance, Player};
use skirmish::session::{AgentSession, LaunchOptions};
use skirmish::{AbortHandle, Coord, Coordinator, Map, Match, MatchConfig};

const PHASE_TIMEOUT: Duration = Duration::from_secs(2);

/// Connect an agent to `listener` and answer every host message with `reply`.
/// The thread returns every message it saw.
fn connect_agent<F>(listener: &TcpListener, reply: F) -> (TcpStream, JoinHandle<Vec<Value>>)
where
    F: Fn(&Value) -> Vec<String> + Send + 'static,
{
    let stream = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
    let (host, _) = listener.accept().unwrap();
    let handle = thread::spawn(move || {
        let mut writer = stream.try_clone().unwrap();
        let reader = BufReader::new(stream);
        let mut seen = Vec::new();
        for line in reader.lines() {
            let Ok(line) = line else { break };
            let message: Value = serde_json::from_str(&line).unwrap();
            for answer in reply(&message) {
                if writeln!(writer, "{answer}").is_err() {
                    break;
                }
            }
            let finished = message["type"] == "end_game";
            seen.push(message);
            if finished {
                break;
            }
        }
        seen
    });
    (host, handle)
}

/// `end_<part>` for a `part_start`, nothing otherwise.
fn end_of(message: &Value) -> Vec<String> {
    if message["type"] != "part_start" {
        return Vec::new();
    }
    let part = message["part"].as_str().unwrap();
    vec![json!({"command": format!("end_{part}"), "turn": message["turn"]}).to_string()]
}

fn is_phase(message: &Value, part: &str) -> bool {
    message["type"] == "part_start" && message["part"] == part
}

/// Spawn one attacker in round 1.
fn spawner(message: &Value) -> Vec<String> {
    let mut out = Vec::new();
    if is_phase(message, "spawn") && message["turn"] == 1 {
        out.push(json!({"command": "spawn", "turn": 1, "unit_type": "attacker"}).to_string());
    }
    out.extend(end_of(message));
    out
}

/// Spawn in round 1, then attack the first enemy unit with every own unit.
fn aggressor(message: &Value) -> Vec<String> {
    let mut out = Vec::new();
    if is_phase(message, "attack") {
        let turn = message["turn"].clone();
        let units = message["state"]["units"].as_array().cloned().unwrap_or_default();
        let owner = OWNER.with(std::cell::Cell::get);
        let enemy = units.iter().find(|u| u["owner"] != owner);
        if let Some(enemy) = enemy {
            for unit in units.iter().filter(|u| u["owner"] == owner) {
                out.push(
                    json!({
                        "command": "attack",
                        "turn": turn,
                        "unit": unit["id"],
                        "target": enemy["id"],
                    })
                    .to_string(),
                );
            }
        }
    }
    if message["type"] == "initialize" {
        OWNER.with(|cell| cell.set(message["player_id"].as_u64().unwrap_or(0)));
    }
    out.extend(spawner(message));
    out
}

thread_local! {
    /// Player id from `initialize`; each agent runs on its own thread.
    static OWNER: std::cell::Cell<u64> = const { std::cell::Cell::new(0) };
}

fn duel(max_rounds: u32) -> Match {
    let players = vec![
        Player::new(0, Balance::new(15, 15), Coord::new(0, 0)),
        Player::new(1, Balance::new(15, 15), Coord::new(7, 7)),
    ];
    Match::new(Map::new(8, 8).unwrap(), players, default_templates()).with_max_rounds(max_rounds)
}

fn session(player: u8, stream: TcpStream) -> AgentSession {
    AgentSession::from_stream(player, stream, None, Path::new("scripted")).unwrap()
}

#[test]
fn test_spawning_agent_wins_on_units() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let (host0, agent0) = connect_agent(&listener, spawner);
    let (host1, agent1) = connect_agent(&listener, end_of);

    let coordinator = Coordinator::new(
        duel(3),
        vec![session(0, host0), session(1, host1)],
        PHASE_TIMEOUT,
    )
    .unwrap();
    let result = coordinator.run().unwrap();

    assert_eq!(result.rounds_played, 3);
    assert_eq!(result.winners, vec![0]);
    assert_eq!(result.players[0].units, 1);
    assert_eq!(result.players[0].balance, Balance::new(5, 5));
    assert_eq!(result.players[1].balance, Balance::new(15, 15));
    assert!(result.players.iter().all(|p| p.timeouts == 0));

    let seen = agent0.join().unwrap();
    assert_eq!(seen[0]["type"], "initialize");
    assert_eq!(seen[0]["player_id"], 0);
    assert_eq!(seen[0]["num_players"], 2);
    assert_eq!(seen[0]["costs"]["attacker"]["wood"], 10);
    assert_eq!(
        seen.iter().filter(|m| m["type"] == "part_start").count(),
        12
    );
    let last = seen.last().unwrap();
    assert_eq!(last["type"], "end_game");
    assert_eq!(last["winners"], json!([0]));

    // Phase order inside a round.
    let parts: Vec<&str> = seen
        .iter()
        .filter(|m| m["type"] == "part_start" && m["turn"] == 2)
        .map(|m| m["part"].as_str().unwrap())
        .collect();
    assert_eq!(parts, ["attack", "move", "collect", "spawn"]);
    agent1.join().unwrap();
}

#[test]
fn test_mutual_kill_ends_match_early() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let (host0, agent0) = connect_agent(&listener, aggressor);
    let (host1, agent1) = connect_agent(&listener, aggressor);

    let coordinator = Coordinator::new(
        duel(50),
        vec![session(0, host0), session(1, host1)],
        PHASE_TIMEOUT,
    )
    .unwrap();
    let result = coordinator.run().unwrap();

    // Both attackers die in round 2 and nobody can afford another.
    assert_eq!(result.rounds_played, 2);
    assert_eq!(result.winners, vec![0, 1]);
    assert!(result.players.iter().all(|p| p.units == 0));
    assert!(result.players.iter().all(|p| p.rule_violations == 0));
    agent0.join().unwrap();
    agent1.join().unwrap();
}

#[test]
fn test_misbehaving_agent_is_counted_not_fatal() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let (host0, agent0) = connect_agent(&listener, end_of);
    let (host1, agent1) = connect_agent(&listener, |message: &Value| {
        let mut out = Vec::new();
        if is_phase(message, "attack") {
            out.push("garbage".to_string());
            out.push(
                json!({"command": "attack", "turn": 1, "part": "move", "unit": 0, "target": 1})
                    .to_string(),
            );
            out.push(json!({"command": "attack", "turn": 1, "unit": 99, "target": 0}).to_string());
        }
        out.extend(end_of(message));
        out
    });

    let coordinator = Coordinator::new(
        duel(1),
        vec![session(0, host0), session(1, host1)],
        PHASE_TIMEOUT,
    )
    .unwrap();
    let result = coordinator.run().unwrap();

    assert_eq!(result.rounds_played, 1);
    assert_eq!(result.players[1].protocol_errors, 2);
    assert_eq!(result.players[1].rule_violations, 1);
    assert_eq!(result.players[0].protocol_errors, 0);
    assert_eq!(result.players[0].rule_violations, 0);
    agent0.join().unwrap();
    agent1.join().unwrap();
}

#[test]
fn test_disconnected_agent_does_not_stall_match() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let (host0, agent0) = connect_agent(&listener, end_of);

    let quitter = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
    let (host1, _) = listener.accept().unwrap();
    let agent1 = thread::spawn(move || {
        let mut line = String::new();
        BufReader::new(quitter).read_line(&mut line).unwrap();
        line
    });

    let coordinator = Coordinator::new(
        duel(2),
        vec![session(0, host0), session(1, host1)],
        Duration::from_secs(10),
    )
    .unwrap();
    let start = Instant::now();
    let result = coordinator.run().unwrap();

    // The dead channel is noticed at once instead of waiting out each phase.
    assert!(start.elapsed() < Duration::from_secs(10));
    assert_eq!(result.rounds_played, 2);
    assert!(result.players[1].channel_lost.is_some());
    assert!(result.players[0].channel_lost.is_none());
    assert_eq!(result.players[0].timeouts, 0);
    assert!(agent1.join().unwrap().contains("initialize"));
    agent0.join().unwrap();
}

#[test]
fn test_launch_rejects_bad_player_counts() {
    let config = MatchConfig {
        port: 0,
        ..MatchConfig::default()
    };
    assert!(matches!(
        Coordinator::launch(&config, &[PathBuf::from("solo.py")]),
        Err(MatchError::TooFewPlayers(1))
    ));
    let crowd: Vec<PathBuf> = (0..9).map(|i| PathBuf::from(format!("{i}.py"))).collect();
    assert!(matches!(
        Coordinator::launch(&config, &crowd),
        Err(MatchError::TooManyPlayers(9))
    ));
}

#[test]
fn test_launch_fails_on_missing_agent() {
    let dir = tempfile::tempdir().unwrap();
    let config = MatchConfig {
        port: 0,
        ..MatchConfig::default()
    };
    let agents = [dir.path().join("a.py"), dir.path().join("b.py")];
    assert!(matches!(
        Coordinator::launch(&config, &agents),
        Err(MatchError::Setup {
            player: 0,
            source: ProcessError::MissingArtifact(_)
        })
    ));
}

#[cfg(unix)]
mod launch {
    use super::*;

    fn options(startup: Duration) -> LaunchOptions {
        LaunchOptions {
            startup_timeout: startup,
            ..LaunchOptions::default()
        }
    }

    #[test]
    fn test_agent_that_exits_early() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("quit.sh");
        std::fs::write(&script, "exit 3\n").unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();

        let outcome = AgentSession::launch(0, &script, &listener, &options(Duration::from_secs(5)));
        assert!(matches!(outcome, Err(ProcessError::Exited { .. })));
    }

    #[test]
    fn test_agent_that_never_connects() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("sleepy.sh");
        std::fs::write(&script, "sleep 5\n").unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();

        let start = Instant::now();
        let outcome =
            AgentSession::launch(0, &script, &listener, &options(Duration::from_millis(200)));
        assert!(matches!(outcome, Err(ProcessError::ConnectTimeout { .. })));
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_abort_interrupts_startup_wait() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("sleepy.sh");
        std::fs::write(&script, "sleep 5\n").unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();

        let abort = AbortHandle::new();
        let trigger = abort.clone();
        let firing = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            trigger.abort();
        });
        let launch = LaunchOptions {
            abort: Some(abort),
            ..options(Duration::from_secs(30))
        };

        let start = Instant::now();
        let outcome = AgentSession::launch(0, &script, &listener, &launch);
        assert!(matches!(outcome, Err(ProcessError::Interrupted(_))));
        assert!(start.elapsed() < Duration::from_secs(4));
        firing.join().unwrap();
    }

    #[test]
    fn test_unsupported_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let notes = dir.path().join("agent.txt");
        std::fs::write(&notes, "hello").unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();

        let outcome = AgentSession::launch(0, &notes, &listener, &options(Duration::from_secs(1)));
        assert!(matches!(outcome, Err(ProcessError::UnsupportedArtifact(_))));
    }
}
