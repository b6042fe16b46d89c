#![no_main]

//! Rule application fuzzer.
//!
//! Feeds arbitrary actions from two players through validation and the
//! mutators over several rounds, checking invariants after every action.

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use skirmish::game::invariants::check_invariants;
use skirmish::game::{default_templates, Balance, Mover, Player};
use skirmish::{Action, Coord, Map, Match};

/// A fuzzer-generated action.
#[derive(Arbitrary, Debug, Clone)]
enum FuzzAction {
    Attack { unit: u8, target: u8 },
    Move { unit: u8, x: i8, y: i8 },
    GroupMove { group: u8, x: i8, y: i8 },
    Group { units: Vec<u8> },
    Collect { unit: u8 },
    Spawn { attacker: bool },
}

impl FuzzAction {
    fn into_action(self) -> Action {
        match self {
            FuzzAction::Attack { unit, target } => Action::Attack {
                unit: u32::from(unit),
                target: u32::from(target),
            },
            FuzzAction::Move { unit, x, y } => Action::Move {
                mover: Mover::Unit(u32::from(unit)),
                destination: Coord::new(i32::from(x), i32::from(y)),
            },
            FuzzAction::GroupMove { group, x, y } => Action::Move {
                mover: Mover::Group(u32::from(group)),
                destination: Coord::new(i32::from(x), i32::from(y)),
            },
            FuzzAction::Group { units } => Action::Group {
                units: units.into_iter().take(8).map(u32::from).collect(),
            },
            FuzzAction::Collect { unit } => Action::Collect {
                unit: u32::from(unit),
            },
            FuzzAction::Spawn { attacker } => Action::Spawn {
                unit_type: if attacker { "attacker" } else { "gatherer" }.to_string(),
            },
        }
    }
}

#[derive(Arbitrary, Debug)]
struct RulesInput {
    /// Starting wood and metal per player.
    funds: [(u8, u8); 2],
    /// One batch of (player, action) per round.
    rounds: Vec<Vec<(bool, FuzzAction)>>,
}

fuzz_target!(|input: RulesInput| {
    let Ok(map) = Map::arena(16, 16) else {
        return;
    };
    let players = vec![
        Player::new(0, Balance::new(u32::from(input.funds[0].0), u32::from(input.funds[0].1)), Coord::new(0, 0)),
        Player::new(1, Balance::new(u32::from(input.funds[1].0), u32::from(input.funds[1].1)), Coord::new(15, 15)),
    ];
    let mut state = Match::new(map, players, default_templates()).with_max_rounds(8);

    for batch in input.rounds.into_iter().take(8) {
        state.begin_round();
        for (second, action) in batch.into_iter().take(32) {
            let _ = state.execute(u8::from(second), &action.into_action());
            let violations = check_invariants(&state);
            assert!(violations.is_empty(), "{violations:?}");
        }
        state.remove_dead_units();
        state.continue_queued_moves();
        let violations = check_invariants(&state);
        assert!(violations.is_empty(), "{violations:?}");
        if state.is_over() {
            break;
        }
    }
});
