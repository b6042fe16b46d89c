//! Config validation command implementation.

use super::CliError;
use skirmish::MatchConfig;
use skirmish::game::{MAX_PLAYERS, MIN_PLAYERS};
use std::path::PathBuf;

/// Execute the validate command.
///
/// # Errors
///
/// Returns an error if the config cannot be loaded, the map is unusable, or
/// fewer than two seats have a usable spawn point.
pub(crate) fn execute(config_path: PathBuf) -> Result<(), CliError> {
    println!("Validating: {}", config_path.display());
    println!();

    let config = match MatchConfig::load(&config_path) {
        Ok(config) => {
            print_check("Config parses", true);
            config
        }
        Err(e) => {
            print_check("Config parses", false);
            return Err(CliError::new(format!("Invalid config: {e}")));
        }
    };

    let map = match config.load_map() {
        Ok(map) => {
            print_check("Map loads", true);
            map
        }
        Err(e) => {
            print_check("Map loads", false);
            return Err(CliError::new(format!("Invalid map: {e}")));
        }
    };

    let seats = (MIN_PLAYERS..=MAX_PLAYERS)
        .take_while(|&n| config.spawn_points_for(&map, n).is_ok())
        .last();
    print_check("Spawn points usable", seats.is_some());
    let Some(seats) = seats else {
        let reason = config
            .spawn_points_for(&map, MIN_PLAYERS)
            .err()
            .map_or_else(String::new, |e| e.to_string());
        return Err(CliError::new(format!("No usable spawn points: {reason}")));
    };

    println!();
    println!("Summary:");
    println!("  Map:          {}x{}", map.width(), map.height());
    println!("  Seats:        {MIN_PLAYERS}-{seats}");
    println!("  Rounds:       {}", config.max_rounds);
    println!("  Phase time:   {} ms", config.phase_timeout_ms);
    println!(
        "  Start funds:  wood {} metal {}",
        config.starting_balance.wood, config.starting_balance.metal
    );
    for (name, template) in &config.units {
        println!(
            "  Unit {name:<10} cost {}w/{}m  hp {}  atk {}  range {}  speed {}",
            template.cost.wood,
            template.cost.metal,
            template.stats.max_health,
            template.stats.attack,
            template.stats.attack_range,
            template.stats.speed
        );
    }

    println!();
    println!("Validation successful!");

    Ok(())
}

fn print_check(name: &str, ok: bool) {
    let status = if ok { "OK" } else { "FAILED" };
    let symbol = if ok { "✓" } else { "✗" };
    println!("  {symbol} {name}: {status}");
}
