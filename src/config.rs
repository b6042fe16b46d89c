//! Match configuration.
//!
//! Every field has a default, so an empty TOML file is a valid config:
//!
//! ```toml
//! max_rounds = 100
//! phase_timeout_ms = 3000
//! port = 6667
//!
//! [map]
//! width = 32
//! height = 32
//! # file = "maps/duel.txt"
//!
//! [starting_balance]
//! wood = 15
//! metal = 15
//!
//! [units.gatherer]
//! cost = { wood = 10, metal = 10 }
//! speed = 10
//! health = 10
//! attack = 0
//! defense = 5
//! attack_range = 0
//! collect_amount = 3
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, MapError};
use crate::game::{default_templates, Balance, Coord, Map, Match, Player, PlayerId, UnitTemplate};

/// Map source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MapConfig {
    /// Width of the built-in layout.
    pub width: u16,
    /// Height of the built-in layout.
    pub height: u16,
    /// Map file; overrides `width` and `height` when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            width: 32,
            height: 32,
            file: None,
        }
    }
}

/// Everything needed to set up and pace a match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MatchConfig {
    /// Rounds before the match ends on the limit.
    pub max_rounds: u32,
    /// How long each phase waits for agents.
    pub phase_timeout_ms: u64,
    /// How long an agent may take to connect back.
    pub startup_timeout_ms: u64,
    /// Address the coordination port binds to.
    pub bind_addr: String,
    /// Coordination port; 0 picks a free one.
    pub port: u16,
    /// Interpreter for `.py` agents.
    pub python: String,
    /// Map source.
    pub map: MapConfig,
    /// Balance every player starts with.
    pub starting_balance: Balance,
    /// Spawn point per seat. Empty means corners, then edge midpoints.
    pub spawn_points: Vec<Coord>,
    /// Unit types by name.
    pub units: BTreeMap<String, UnitTemplate>,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            max_rounds: 100,
            phase_timeout_ms: 3000,
            startup_timeout_ms: 10_000,
            bind_addr: "127.0.0.1".to_string(),
            port: 6667,
            python: "python3".to_string(),
            map: MapConfig::default(),
            starting_balance: Balance::new(15, 15),
            spawn_points: Vec::new(),
            units: default_templates(),
        }
    }
}

impl MatchConfig {
    /// Parse a config from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid or a value is out of range.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file. A relative map path is resolved against the
    /// config file's directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&text)?;
        if let (Some(file), Some(dir)) = (&config.map.file, path.parent())
            && file.is_relative()
        {
            config.map.file = Some(dir.join(file));
        }
        Ok(config)
    }

    /// Reject values that cannot produce a playable match.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_rounds == 0 {
            return Err(ConfigError::Invalid("max_rounds must be at least 1".into()));
        }
        if self.phase_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "phase_timeout_ms must be at least 1".into(),
            ));
        }
        if self.map.file.is_none() && (self.map.width == 0 || self.map.height == 0) {
            return Err(ConfigError::Invalid("map size must be non-zero".into()));
        }
        if self.units.is_empty() {
            return Err(ConfigError::Invalid("at least one unit type is required".into()));
        }
        if let Some((name, _)) = self
            .units
            .iter()
            .find(|(_, template)| template.stats.max_health == 0)
        {
            return Err(ConfigError::Invalid(format!(
                "unit type `{name}` needs positive health"
            )));
        }
        Ok(())
    }

    /// Load the configured map file, or build the default layout.
    ///
    /// # Errors
    ///
    /// Returns an error if the map file cannot be read or parsed.
    pub fn load_map(&self) -> Result<Map, ConfigError> {
        let map = match &self.map.file {
            Some(file) => Map::load(file)?,
            None => Map::arena(self.map.width, self.map.height)?,
        };
        Ok(map)
    }

    /// Spawn points for `players` seats on `map`.
    ///
    /// # Errors
    ///
    /// Returns an error if there are too few points or one is unusable.
    pub fn spawn_points_for(&self, map: &Map, players: usize) -> Result<Vec<Coord>, ConfigError> {
        let candidates = if self.spawn_points.is_empty() {
            default_spawns(map)
        } else {
            self.spawn_points.clone()
        };
        if candidates.len() < players {
            return Err(ConfigError::Invalid(format!(
                "{players} players need {players} spawn points, {} available",
                candidates.len()
            )));
        }
        let points: Vec<Coord> = candidates.into_iter().take(players).collect();
        if let Some(bad) = points.iter().find(|&&p| !map.is_passable(p)) {
            return Err(MapError::BadSpawn(*bad).into());
        }
        Ok(points)
    }

    /// Build the initial match for `players` seats.
    ///
    /// # Errors
    ///
    /// Returns an error if the config, map or spawn points are unusable.
    pub fn build_match(&self, players: usize) -> Result<Match, ConfigError> {
        self.validate()?;
        let map = self.load_map()?;
        let spawns = self.spawn_points_for(&map, players)?;
        let seats = spawns
            .into_iter()
            .enumerate()
            .map(|(seat, spawn)| {
                let id = PlayerId::try_from(seat)
                    .map_err(|_| ConfigError::Invalid(format!("seat {seat} out of range")))?;
                Ok(Player::new(id, self.starting_balance, spawn))
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;
        Ok(Match::new(map, seats, self.units.clone()).with_max_rounds(self.max_rounds))
    }
}

/// Corners first, then edge midpoints: up to eight distinct cells.
fn default_spawns(map: &Map) -> Vec<Coord> {
    let (w, h) = (i32::from(map.width()), i32::from(map.height()));
    let mut points = map.corners().to_vec();
    points.extend([
        Coord::new(w / 2, 0),
        Coord::new(w / 2, h - 1),
        Coord::new(0, h / 2),
        Coord::new(w - 1, h / 2),
    ]);
    let mut unique = Vec::with_capacity(points.len());
    for point in points {
        if !unique.contains(&point) {
            unique.push(point);
        }
    }
    unique
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = MatchConfig::parse("").unwrap();
        assert_eq!(config, MatchConfig::default());
        assert_eq!(config.units["gatherer"].stats.collect_amount, 3);
    }

    #[test]
    fn test_partial_override() {
        let config = MatchConfig::parse(
            r#"
            max_rounds = 5
            port = 0

            [map]
            width = 10
            height = 12

            [units.scout]
            cost = { wood = 1 }
            speed = 20
            health = 3
            attack = 1
            defense = 0
            attack_range = 2
            view_range = 8
            collect_amount = 0
            "#,
        )
        .unwrap();
        assert_eq!(config.max_rounds, 5);
        assert_eq!(config.map.height, 12);
        assert_eq!(config.phase_timeout_ms, 3000);
        let scout = config.units["scout"];
        assert_eq!(scout.cost, Balance::new(1, 0));
        assert_eq!(scout.stats.max_health, 3);
        assert_eq!(scout.stats.view_range, Some(8));
    }

    #[test]
    fn test_validation_errors() {
        assert!(matches!(
            MatchConfig::parse("max_rounds = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            MatchConfig::parse("[map]\nwidth = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            MatchConfig::parse("rounds = 3"),
            Err(ConfigError::Parse(_))
        ));
        let mut config = MatchConfig::default();
        config.units.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_spawns_distinct() {
        let map = Map::arena(16, 16).unwrap();
        let spawns = default_spawns(&map);
        assert_eq!(spawns.len(), 8);
        assert_eq!(spawns[0], Coord::new(0, 0));
        assert_eq!(spawns[1], Coord::new(15, 15));
    }

    #[test]
    fn test_build_match_seats() {
        let config = MatchConfig::default();
        let state = config.build_match(3).unwrap();
        assert_eq!(state.players().len(), 3);
        assert_eq!(state.players()[2].spawn_point, Coord::new(31, 0));
        assert_eq!(state.max_rounds(), 100);
    }

    #[test]
    fn test_bad_spawn_point() {
        let config = MatchConfig {
            spawn_points: vec![Coord::new(0, 0), Coord::new(16, 16)],
            ..MatchConfig::default()
        };
        // The default layout puts a mountain in the centre.
        assert!(matches!(
            config.build_match(2),
            Err(ConfigError::Map(MapError::BadSpawn(_)))
        ));
        assert!(matches!(
            config.build_match(3),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_load_resolves_map_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("tiny.txt"), "000\n010\n000\n").unwrap();
        let path = dir.path().join("match.toml");
        std::fs::write(&path, "[map]\nfile = \"tiny.txt\"\n").unwrap();

        let config = MatchConfig::load(&path).unwrap();
        let map = config.load_map().unwrap();
        assert_eq!(map.width(), 3);
        assert!(!map.is_passable(Coord::new(1, 1)));
    }
}
