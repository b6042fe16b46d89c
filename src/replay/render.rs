//! ASCII renderer for terminal viewing with ANSI colors.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::game::{Coord, Map, PlayerId, Terrain, Unit, WorldSnapshot};

/// ANSI color codes for players, by player id.
const PLAYER_COLORS: [&str; 8] = [
    "\x1b[31m", // Player 0: Red
    "\x1b[34m", // Player 1: Blue
    "\x1b[32m", // Player 2: Green
    "\x1b[33m", // Player 3: Yellow
    "\x1b[35m", // Player 4: Magenta
    "\x1b[36m", // Player 5: Cyan
    "\x1b[91m", // Player 6: Bright Red
    "\x1b[94m", // Player 7: Bright Blue
];

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const WHITE: &str = "\x1b[37m";
const GRAY: &str = "\x1b[90m";
const BROWN: &str = "\x1b[33m";
const BLUE: &str = "\x1b[94m";

/// Player display names.
const PLAYER_NAMES: [&str; 8] = [
    "Red", "Blue", "Green", "Yellow", "Magenta", "Cyan", "B.Red", "B.Blue",
];

/// Render the world after a round.
///
/// Output format:
/// ```text
/// Round 12/100                            [P0: 4] [P1: 3]
/// ┌───────────────────┐
/// │ 0 . . M . . w . . │
/// │ . 3 . . ~ . . 1 m │
/// └───────────────────┘
///
/// Legend: M=Mountain  ~=Water  w=Wood  m=Metal  .=Open  digit=Units (by owner)
///
/// Player 0 (Red):     Units: 4   Groups: 1   Wood: 12   Metal: 3
/// ```
#[must_use]
pub fn render_ascii(map: &Map, snapshot: &WorldSnapshot, max_rounds: u32) -> String {
    let mut output = String::new();
    let occupants = occupancy(snapshot);

    render_header(&mut output, snapshot, max_rounds);
    render_map(&mut output, map, &occupants);
    output.push_str(
        "\nLegend: M=Mountain  ~=Water  w=Wood  m=Metal  .=Open  digit=Units (by owner)\n\n",
    );
    render_player_stats(&mut output, snapshot);

    output
}

/// Owner and headcount of the units on each occupied cell.
///
/// A cell shared by several owners is credited to the lowest player id.
fn occupancy(snapshot: &WorldSnapshot) -> BTreeMap<Coord, (PlayerId, usize)> {
    let mut cells: BTreeMap<Coord, (PlayerId, usize)> = BTreeMap::new();
    for unit in snapshot.units.iter().filter(|u| u.is_alive()) {
        let entry = cells.entry(unit.position).or_insert((unit.owner, 0));
        entry.0 = entry.0.min(unit.owner);
        entry.1 += 1;
    }
    cells
}

fn render_header(output: &mut String, snapshot: &WorldSnapshot, max_rounds: u32) {
    let title = format!("Round {}/{max_rounds}", snapshot.round);
    output.push_str(&title);
    for _ in 0..40usize.saturating_sub(title.len()) {
        output.push(' ');
    }

    for &player in snapshot.players.keys() {
        let color = get_player_color(player);
        let units = snapshot.units_of(player).count();
        let _ = write!(output, "{color}[P{player}: {units}]{RESET} ");
    }
    output.push('\n');
}

fn render_map(output: &mut String, map: &Map, occupants: &BTreeMap<Coord, (PlayerId, usize)>) {
    let width = usize::from(map.width());

    output.push('┌');
    output.push_str(&"─".repeat(width * 2 + 1));
    output.push_str("┐\n");

    for y in 0..i32::from(map.height()) {
        output.push_str("│ ");
        for x in 0..i32::from(map.width()) {
            let coord = Coord::new(x, y);
            render_cell(output, map, occupants.get(&coord).copied(), coord);
            output.push(' ');
        }
        output.push_str("│\n");
    }

    output.push('└');
    output.push_str(&"─".repeat(width * 2 + 1));
    output.push_str("┘\n");
}

/// Render one cell: units on top, terrain underneath.
fn render_cell(output: &mut String, map: &Map, occupant: Option<(PlayerId, usize)>, coord: Coord) {
    if let Some((owner, count)) = occupant {
        let color = get_player_color(owner);
        let _ = write!(output, "{color}{BOLD}{}{RESET}", count_to_char(count));
        return;
    }

    let Some(terrain) = map.get(coord) else {
        output.push('?');
        return;
    };
    let glyph = match terrain {
        Terrain::Open => format!("{GRAY}.{RESET}"),
        Terrain::Mountain => format!("{WHITE}{BOLD}M{RESET}"),
        Terrain::Water => format!("{BLUE}~{RESET}"),
        Terrain::Wood => format!("{BROWN}w{RESET}"),
        Terrain::Metal => format!("{WHITE}m{RESET}"),
    };
    output.push_str(&glyph);
}

/// Convert a unit count to a display character.
fn count_to_char(count: usize) -> char {
    u32::try_from(count)
        .ok()
        .filter(|&c| c <= 9)
        .and_then(|c| char::from_digit(c, 10))
        .unwrap_or('+')
}

/// Get ANSI color for a player.
fn get_player_color(player_id: PlayerId) -> &'static str {
    PLAYER_COLORS
        .get(usize::from(player_id))
        .copied()
        .unwrap_or(WHITE)
}

/// Get player display name.
fn get_player_name(player_id: PlayerId) -> &'static str {
    PLAYER_NAMES
        .get(usize::from(player_id))
        .copied()
        .unwrap_or("Unknown")
}

fn render_player_stats(output: &mut String, snapshot: &WorldSnapshot) {
    for (&player, balance) in &snapshot.players {
        let units: Vec<&Unit> = snapshot.units_of(player).collect();
        let name = get_player_name(player);
        if units.is_empty() {
            let _ = writeln!(
                output,
                "{DIM}Player {player} ({name}): no units  Wood: {}  Metal: {}{RESET}",
                balance.wood, balance.metal
            );
            continue;
        }

        let color = get_player_color(player);
        let groups = snapshot.groups.iter().filter(|g| g.owner == player).count();
        let _ = writeln!(
            output,
            "{color}Player {player} ({name:>7}):{RESET}  Units: {:<3}  Groups: {groups:<2}  Wood: {:<4}  Metal: {}",
            units.len(),
            balance.wood,
            balance.metal
        );
    }
}
