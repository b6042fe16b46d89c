//! Benchmarks for the per-phase hot path: decoding agent lines, applying
//! their actions, and encoding the snapshot broadcast.

#![allow(missing_docs)]

use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};
use skirmish::game::{default_templates, Balance, Mover, Player};
use skirmish::protocol::{encode_line, parse_inbound, HostMessage};
use skirmish::{Action, Coord, Map, Match, Phase};

const LINES: [&str; 4] = [
    r#"{"command":"attack","turn":12,"part":"attack","unit":41,"target":97}"#,
    r#"{"command":"move","turn":12,"part":"move","unit":41,"destination":[17,3]}"#,
    r#"{"command":"collect","turn":12,"unit":41}"#,
    r#"{"command":"end_spawn","turn":12}"#,
];

/// Four players with `per_player` attackers each, spread over a 64x64 map.
fn crowded_match(per_player: i32) -> Match {
    let players: Vec<Player> = (0..4u8)
        .map(|id| Player::new(id, Balance::new(1000, 1000), Coord::new(0, 0)))
        .collect();
    let mut state = Match::new(Map::new(64, 64).unwrap(), players, default_templates());
    for player in 0..4u8 {
        for i in 0..per_player {
            let position = Coord::new(i % 64, i32::from(player) * 16 + i / 64);
            state.place_unit(player, "attacker", position).unwrap();
        }
    }
    state.begin_round();
    state
}

fn bench_parse_inbound(c: &mut Criterion) {
    c.bench_function("parse_inbound_mixed", |b| {
        b.iter(|| {
            for line in LINES {
                black_box(parse_inbound(black_box(line.as_bytes())).ok());
            }
        });
    });
}

fn bench_move_phase(c: &mut Criterion) {
    let state = crowded_match(128);
    let actions: Vec<(u8, Action)> = state
        .units()
        .values()
        .map(|unit| {
            let destination = Coord::new((unit.position.x + 7) % 64, (unit.position.y + 5) % 64);
            (
                unit.owner,
                Action::Move {
                    mover: Mover::Unit(unit.id),
                    destination,
                },
            )
        })
        .collect();

    c.bench_function("move_phase_512_units", |b| {
        b.iter_batched(
            || state.clone(),
            |mut world| {
                for (player, action) in &actions {
                    black_box(world.execute(*player, action).ok());
                }
                world
            },
            criterion::BatchSize::LargeInput,
        );
    });
}

fn bench_snapshot_broadcast(c: &mut Criterion) {
    let state = crowded_match(128);

    c.bench_function("snapshot_encode_512_units", |b| {
        b.iter(|| {
            let message = HostMessage::PartStart {
                turn: state.round(),
                part: Phase::Attack,
                state: state.get_state(),
            };
            black_box(encode_line(&message).ok())
        });
    });
}

criterion_group!(
    benches,
    bench_parse_inbound,
    bench_move_phase,
    bench_snapshot_broadcast
);
criterion_main!(benches);
