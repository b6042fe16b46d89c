//! World model and rules.
//!
//! Pure data and rule checks with no I/O:
//! - Map with terrain and resource nodes
//! - Players with balances and spawn points
//! - Units, unit templates and groups
//! - Action validation and the mutators that apply validated orders

mod economy;
mod group;
pub mod invariants;
mod map;
pub mod path;
mod phase;
mod player;
pub mod rules;
mod state;
mod unit;

pub use economy::{Balance, Resource};
pub use group::{Group, GroupId};
pub use map::{Coord, Map, Terrain};
pub use phase::Phase;
pub use player::{Player, PlayerId};
pub use rules::{Action, Mover, Order};
pub use state::{Match, WorldSnapshot, MAX_PLAYERS, MIN_PLAYERS};
pub use unit::{default_templates, Unit, UnitId, UnitStats, UnitTemplate};
