//! Map, terrain and grid coordinates.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::MapError;
use crate::game::Resource;

/// A cell coordinate on the map.
///
/// Serialized as a two-element array `[x, y]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "[i32; 2]", into = "[i32; 2]")]
pub struct Coord {
    /// X coordinate (column).
    pub x: i32,
    /// Y coordinate (row).
    pub y: i32,
}

impl Coord {
    /// Create a new coordinate.
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Squared Euclidean distance to another coordinate.
    ///
    /// Range checks compare squared values so they stay exact on the grid.
    #[must_use]
    pub fn distance_squared(self, other: Coord) -> i64 {
        let dx = i64::from(other.x) - i64::from(self.x);
        let dy = i64::from(other.y) - i64::from(self.y);
        dx * dx + dy * dy
    }

    /// Whether `other` lies within `range` (inclusive) of this coordinate.
    #[must_use]
    pub fn within(self, other: Coord, range: u32) -> bool {
        let range = i64::from(range);
        self.distance_squared(other) <= range * range
    }
}

impl From<[i32; 2]> for Coord {
    fn from([x, y]: [i32; 2]) -> Self {
        Self { x, y }
    }
}

impl From<Coord> for [i32; 2] {
    fn from(coord: Coord) -> Self {
        [coord.x, coord.y]
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Type of terrain on a cell.
///
/// The discriminants are the values used on the wire and in map files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Terrain {
    /// Open ground.
    Open = 0,
    /// Mountain - impassable.
    Mountain = 1,
    /// Water.
    Water = 2,
    /// Forest - yields wood.
    Wood = 3,
    /// Ore - yields metal.
    Metal = 4,
}

impl Terrain {
    /// Check if units can enter or cross this terrain.
    #[must_use]
    pub const fn is_passable(self) -> bool {
        !matches!(self, Terrain::Mountain)
    }

    /// The resource harvested from this terrain, if any.
    #[must_use]
    pub const fn resource(self) -> Option<Resource> {
        match self {
            Terrain::Wood => Some(Resource::Wood),
            Terrain::Metal => Some(Resource::Metal),
            Terrain::Open | Terrain::Mountain | Terrain::Water => None,
        }
    }

    /// Decode a wire/map-file value.
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Terrain::Open),
            1 => Some(Terrain::Mountain),
            2 => Some(Terrain::Water),
            3 => Some(Terrain::Wood),
            4 => Some(Terrain::Metal),
            _ => None,
        }
    }

    /// Wire/map-file value.
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }
}

/// The game map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Map {
    /// Width of the map in cells.
    width: u16,
    /// Height of the map in cells.
    height: u16,
    /// Cells stored in row-major order.
    cells: Vec<Terrain>,
}

impl Map {
    /// Create a new map filled with open terrain.
    ///
    /// # Errors
    ///
    /// Returns [`MapError::Empty`] if width or height is zero.
    pub fn new(width: u16, height: u16) -> Result<Self, MapError> {
        if width == 0 || height == 0 {
            return Err(MapError::Empty);
        }

        let size = usize::from(width) * usize::from(height);
        Ok(Self {
            width,
            height,
            cells: vec![Terrain::Open; size],
        })
    }

    /// Fixed symmetric layout used when no map file is configured.
    ///
    /// Each corner gets a wood node two cells along the x axis and a metal
    /// node two cells along the y axis; a mountain sits in the centre.
    ///
    /// # Errors
    ///
    /// Returns [`MapError::Empty`] if width or height is zero.
    pub fn arena(width: u16, height: u16) -> Result<Self, MapError> {
        let mut map = Self::new(width, height)?;
        let (w, h) = (i32::from(width), i32::from(height));

        for corner in map.corners() {
            let step_x = if corner.x == 0 { 2 } else { -2 };
            let step_y = if corner.y == 0 { 2 } else { -2 };
            map.set(Coord::new(corner.x + step_x, corner.y), Terrain::Wood);
            map.set(Coord::new(corner.x, corner.y + step_y), Terrain::Metal);
        }
        if w > 4 && h > 4 {
            map.set(Coord::new(w / 2, h / 2), Terrain::Mountain);
        }

        Ok(map)
    }

    /// Parse a map from text: one line per row `y`, one terrain digit per cell.
    ///
    /// Blank lines and surrounding whitespace are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error for empty input, ragged rows or unknown symbols.
    pub fn parse(text: &str) -> Result<Self, MapError> {
        let rows: Vec<&str> = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();

        let expected = rows.first().map_or(0, |row| row.chars().count());
        if expected == 0 {
            return Err(MapError::Empty);
        }
        let width = u16::try_from(expected).map_err(|_| MapError::Empty)?;
        let height = u16::try_from(rows.len()).map_err(|_| MapError::Empty)?;

        let mut cells = Vec::with_capacity(usize::from(width) * usize::from(height));
        for (y, row) in rows.iter().enumerate() {
            let found = row.chars().count();
            if found != expected {
                return Err(MapError::Ragged {
                    row: y,
                    found,
                    expected,
                });
            }
            for (x, symbol) in row.chars().enumerate() {
                let terrain = symbol
                    .to_digit(10)
                    .and_then(|d| u8::try_from(d).ok())
                    .and_then(Terrain::from_code)
                    .ok_or(MapError::UnknownTerrain {
                        symbol,
                        coord: Coord::new(grid_index(x), grid_index(y)),
                    })?;
                cells.push(terrain);
            }
        }

        Ok(Self {
            width,
            height,
            cells,
        })
    }

    /// Load a map file (see [`Map::parse`]).
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &std::path::Path) -> Result<Self, MapError> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Get the width of the map.
    #[must_use]
    pub const fn width(&self) -> u16 {
        self.width
    }

    /// Get the height of the map.
    #[must_use]
    pub const fn height(&self) -> u16 {
        self.height
    }

    /// Check if a coordinate is within the map bounds.
    #[must_use]
    pub fn in_bounds(&self, coord: Coord) -> bool {
        coord.x >= 0
            && coord.y >= 0
            && coord.x < i32::from(self.width)
            && coord.y < i32::from(self.height)
    }

    /// Convert a coordinate to an index into the cell array.
    fn index(&self, coord: Coord) -> Option<usize> {
        if !self.in_bounds(coord) {
            return None;
        }
        let x = usize::try_from(coord.x).ok()?;
        let y = usize::try_from(coord.y).ok()?;
        Some(y * usize::from(self.width) + x)
    }

    /// Terrain at the given coordinate.
    #[must_use]
    pub fn get(&self, coord: Coord) -> Option<Terrain> {
        self.index(coord).map(|idx| self.cells[idx])
    }

    /// Set the terrain at the given coordinate.
    ///
    /// Returns `false` if the coordinate is out of bounds.
    pub fn set(&mut self, coord: Coord, terrain: Terrain) -> bool {
        if let Some(idx) = self.index(coord) {
            self.cells[idx] = terrain;
            true
        } else {
            false
        }
    }

    /// In bounds and not impassable.
    #[must_use]
    pub fn is_passable(&self, coord: Coord) -> bool {
        self.get(coord).is_some_and(Terrain::is_passable)
    }

    /// The four corner cells, in spawn-assignment order.
    #[must_use]
    pub fn corners(&self) -> [Coord; 4] {
        let (w, h) = (i32::from(self.width) - 1, i32::from(self.height) - 1);
        [
            Coord::new(0, 0),
            Coord::new(w, h),
            Coord::new(w, 0),
            Coord::new(0, h),
        ]
    }

    /// Iterate over all coordinates and terrain.
    pub fn iter(&self) -> impl Iterator<Item = (Coord, Terrain)> + '_ {
        let width = usize::from(self.width);
        self.cells.iter().enumerate().map(move |(idx, terrain)| {
            let x = grid_index(idx % width);
            let y = grid_index(idx / width);
            (Coord::new(x, y), *terrain)
        })
    }

    /// Column-major wire form: `grid[x][y]` is the terrain code at `[x, y]`.
    #[must_use]
    pub fn to_columns(&self) -> Vec<Vec<u8>> {
        let width = usize::from(self.width);
        let height = usize::from(self.height);
        (0..width)
            .map(|x| {
                (0..height)
                    .map(|y| self.cells[y * width + x].code())
                    .collect()
            })
            .collect()
    }

    /// Inverse of [`Map::to_columns`].
    ///
    /// # Errors
    ///
    /// Returns an error for empty or ragged grids or unknown codes.
    pub fn from_columns(columns: &[Vec<u8>]) -> Result<Self, MapError> {
        let height = columns.first().map_or(0, Vec::len);
        let width = u16::try_from(columns.len()).map_err(|_| MapError::Empty)?;
        let mut map = Self::new(width, u16::try_from(height).map_err(|_| MapError::Empty)?)?;
        for (x, column) in columns.iter().enumerate() {
            if column.len() != height {
                return Err(MapError::Ragged {
                    row: x,
                    found: column.len(),
                    expected: height,
                });
            }
            for (y, code) in column.iter().enumerate() {
                let coord = Coord::new(grid_index(x), grid_index(y));
                let terrain = Terrain::from_code(*code).ok_or(MapError::UnknownTerrain {
                    symbol: char::from(b'0'.saturating_add(*code)),
                    coord,
                })?;
                map.set(coord, terrain);
            }
        }
        Ok(map)
    }
}

/// Map dimensions fit in `u16`, so every in-map index fits in `i32`.
fn grid_index(value: usize) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}
