//! Tile map - walkability, line of sight and pathing over a fixed grid.
//!
//! The map is built once at mission setup and never changes afterwards. Systems
//! share it through [`MapResource`], which hands out an `Arc` so snapshots and
//! decision hooks can hold a reference without copying the grid.

use crate::error::SetupError;
use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

/// Resource wrapper for the mission map, allowing shared read access in ECS systems.
#[derive(Resource, Clone, Debug)]
pub struct MapResource(pub Arc<TileMap>);

impl MapResource {
    pub fn new(map: TileMap) -> Self {
        Self(Arc::new(map))
    }

    pub fn map(&self) -> &TileMap {
        &self.0
    }
}

/// Integer grid coordinate. Tile centers sit on whole numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Tile {
    pub x: i32,
    pub y: i32,
}

impl Tile {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance between tile centers.
    pub fn distance_to(&self, other: Tile) -> f32 {
        let dx = (self.x - other.x) as f32;
        let dy = (self.y - other.y) as f32;
        (dx * dx + dy * dy).sqrt()
    }

    /// King-move distance.
    pub fn chebyshev(&self, other: Tile) -> i32 {
        (self.x - other.x).abs().max((self.y - other.y).abs())
    }

    pub fn is_adjacent4(&self, other: Tile) -> bool {
        (self.x - other.x).abs() + (self.y - other.y).abs() == 1
    }

    /// Orthogonal neighbours in N, E, S, W order.
    pub fn neighbors4(&self) -> [Tile; 4] {
        [
            Tile::new(self.x, self.y - 1),
            Tile::new(self.x + 1, self.y),
            Tile::new(self.x, self.y + 1),
            Tile::new(self.x - 1, self.y),
        ]
    }
}

impl fmt::Display for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

impl From<(i32, i32)> for Tile {
    fn from((x, y): (i32, i32)) -> Self {
        Self::new(x, y)
    }
}

/// Terrain class at a grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TerrainClass {
    /// Open floor - walkable, never blocks sight.
    #[default]
    Floor,
    /// Solid wall.
    Wall,
    /// Hole or out-of-level space.
    Void,
    /// Knee-high debris, can be stepped over.
    LowCover,
    HalfCover,
    HighCover,
    FullCover,
}

impl TerrainClass {
    /// Whether units can stand on this terrain unless a map override says otherwise.
    pub fn default_walkable(&self) -> bool {
        matches!(self, TerrainClass::Floor | TerrainClass::LowCover)
    }

    pub fn from_symbol(symbol: char) -> Option<Self> {
        match symbol {
            '.' => Some(TerrainClass::Floor),
            '#' => Some(TerrainClass::Wall),
            ' ' | '~' => Some(TerrainClass::Void),
            'l' => Some(TerrainClass::LowCover),
            'h' => Some(TerrainClass::HalfCover),
            'H' => Some(TerrainClass::HighCover),
            'F' => Some(TerrainClass::FullCover),
            _ => None,
        }
    }

    pub fn symbol(&self) -> char {
        match self {
            TerrainClass::Floor => '.',
            TerrainClass::Wall => '#',
            TerrainClass::Void => '~',
            TerrainClass::LowCover => 'l',
            TerrainClass::HalfCover => 'h',
            TerrainClass::HighCover => 'H',
            TerrainClass::FullCover => 'F',
        }
    }
}

/// A single cell in the tile grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TileCell {
    pub class: TerrainClass,
    pub walkable: bool,
}

impl TileCell {
    pub fn new(class: TerrainClass) -> Self {
        Self {
            class,
            walkable: class.default_walkable(),
        }
    }
}

/// Serializable map description used by mission setup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapSpec {
    /// Identity stored in snapshots in place of the grid itself.
    pub id: String,
    /// One string per row, top row first. See [`TerrainClass::from_symbol`].
    pub rows: Vec<String>,
    #[serde(default)]
    pub overrides: Vec<WalkableOverride>,
}

/// Forces the walkability flag of a single tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalkableOverride {
    pub tile: Tile,
    pub walkable: bool,
}

/// Fixed-size tile grid (row-major).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileMap {
    id: String,
    width: usize,
    height: usize,
    cells: Vec<TileCell>,
}

impl TileMap {
    /// Create a map filled with floor.
    pub fn open(id: impl Into<String>, width: usize, height: usize) -> Self {
        Self {
            id: id.into(),
            width,
            height,
            cells: vec![TileCell::new(TerrainClass::Floor); width * height],
        }
    }

    /// Parse a map from ASCII rows.
    pub fn from_rows<S: AsRef<str>>(id: impl Into<String>, rows: &[S]) -> Result<Self, SetupError> {
        let height = rows.len();
        let width = rows.first().map(|r| r.as_ref().chars().count()).unwrap_or(0);
        if height == 0 || width == 0 {
            return Err(SetupError::EmptyMap);
        }

        let mut cells = Vec::with_capacity(width * height);
        for (row_idx, row) in rows.iter().enumerate() {
            let row = row.as_ref();
            let found = row.chars().count();
            if found != width {
                return Err(SetupError::RaggedMap {
                    row: row_idx,
                    expected: width,
                    found,
                });
            }
            for (col, symbol) in row.chars().enumerate() {
                let class = TerrainClass::from_symbol(symbol).ok_or(SetupError::UnknownTerrain {
                    symbol,
                    row: row_idx,
                    col,
                })?;
                cells.push(TileCell::new(class));
            }
        }

        Ok(Self {
            id: id.into(),
            width,
            height,
            cells,
        })
    }

    /// Build a map from its setup description, applying walkability overrides.
    pub fn from_spec(spec: &MapSpec) -> Result<Self, SetupError> {
        let mut map = Self::from_rows(spec.id.clone(), &spec.rows)?;
        for o in &spec.overrides {
            if !map.set_walkable(o.tile, o.walkable) {
                return Err(SetupError::OverrideOutOfBounds(o.tile));
            }
        }
        Ok(map)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    fn cell_index(&self, tile: Tile) -> Option<usize> {
        if tile.x >= 0 && tile.y >= 0 && (tile.x as usize) < self.width && (tile.y as usize) < self.height {
            Some(tile.y as usize * self.width + tile.x as usize)
        } else {
            None
        }
    }

    pub fn in_bounds(&self, tile: Tile) -> bool {
        self.cell_index(tile).is_some()
    }

    pub fn cell(&self, tile: Tile) -> Option<&TileCell> {
        self.cell_index(tile).map(|i| &self.cells[i])
    }

    pub fn terrain_at(&self, tile: Tile) -> Option<TerrainClass> {
        self.cell(tile).map(|c| c.class)
    }

    /// Out-of-bounds tiles are never walkable.
    pub fn is_walkable(&self, tile: Tile) -> bool {
        self.cell(tile).map(|c| c.walkable).unwrap_or(false)
    }

    pub fn set_walkable(&mut self, tile: Tile, walkable: bool) -> bool {
        match self.cell_index(tile) {
            Some(i) => {
                self.cells[i].walkable = walkable;
                true
            }
            None => false,
        }
    }

    /// Integer line walk (Bresenham) from `a` to `b`, both endpoints included.
    pub fn line_tiles(a: Tile, b: Tile) -> Vec<Tile> {
        let dx = (b.x - a.x).abs();
        let dy = -(b.y - a.y).abs();
        let sx = if a.x < b.x { 1 } else { -1 };
        let sy = if a.y < b.y { 1 } else { -1 };
        let mut err = dx + dy;
        let (mut x, mut y) = (a.x, a.y);

        let mut tiles = Vec::with_capacity((dx - dy) as usize + 1);
        loop {
            tiles.push(Tile::new(x, y));
            if x == b.x && y == b.y {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
        }
        tiles
    }

    /// True when every tile strictly between `a` and `b` is walkable.
    ///
    /// The walk always runs from the smaller endpoint so that sight is symmetric.
    pub fn line_of_sight(&self, a: Tile, b: Tile) -> bool {
        let (from, to) = if a <= b { (a, b) } else { (b, a) };
        let line = Self::line_tiles(from, to);
        if line.len() <= 2 {
            return true;
        }
        line[1..line.len() - 1].iter().all(|t| self.is_walkable(*t))
    }

    /// Shortest 4-connected walkable path from `start` to `goal`.
    ///
    /// The returned path excludes `start` and ends with `goal`. Neighbours are
    /// expanded in N, E, S, W order so ties always resolve the same way.
    pub fn find_path(&self, start: Tile, goal: Tile) -> Option<Vec<Tile>> {
        if !self.in_bounds(start) || !self.is_walkable(goal) {
            return None;
        }
        if start == goal {
            return Some(Vec::new());
        }

        let mut came_from: Vec<Option<Tile>> = vec![None; self.cells.len()];
        let mut visited = vec![false; self.cells.len()];
        let mut frontier = VecDeque::new();

        visited[self.cell_index(start)?] = true;
        frontier.push_back(start);

        while let Some(current) = frontier.pop_front() {
            if current == goal {
                let mut path = vec![goal];
                let mut cursor = goal;
                while let Some(prev) = self.cell_index(cursor).and_then(|i| came_from[i]) {
                    if prev == start {
                        break;
                    }
                    path.push(prev);
                    cursor = prev;
                }
                path.reverse();
                return Some(path);
            }

            for next in current.neighbors4() {
                let Some(idx) = self.cell_index(next) else {
                    continue;
                };
                if visited[idx] || !self.cells[idx].walkable {
                    continue;
                }
                visited[idx] = true;
                came_from[idx] = Some(current);
                frontier.push_back(next);
            }
        }

        None
    }

    /// All in-bounds tiles within `radius` of `center` (tile-center distance).
    pub fn tiles_within(&self, center: Tile, radius: f32) -> Vec<Tile> {
        let reach = radius.max(0.0).floor() as i32;
        let (width, height) = (self.width as i32, self.height as i32);
        let x_range = center.x.saturating_sub(reach).max(0)..=center.x.saturating_add(reach).min(width - 1);
        let y_range = center.y.saturating_sub(reach).max(0)..=center.y.saturating_add(reach).min(height - 1);
        let mut tiles = Vec::new();
        for y in y_range {
            for x in x_range.clone() {
                let tile = Tile::new(x, y);
                if self.in_bounds(tile) && center.distance_to(tile) <= radius {
                    tiles.push(tile);
                }
            }
        }
        tiles
    }

    /// Render the map back into ASCII rows.
    pub fn to_rows(&self) -> Vec<String> {
        self.cells
            .chunks(self.width)
            .map(|row| row.iter().map(|c| c.class.symbol()).collect())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn walled() -> TileMap {
        TileMap::from_rows(
            "walled",
            &[
                ".......", //
                "...#...",
                "...#...",
                ".......",
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_parse_rows() {
        let map = walled();
        assert_eq!(map.width(), 7);
        assert_eq!(map.height(), 4);
        assert_eq!(map.terrain_at(Tile::new(3, 1)), Some(TerrainClass::Wall));
        assert!(!map.is_walkable(Tile::new(3, 1)));
        assert!(map.is_walkable(Tile::new(0, 0)));
        assert!(!map.is_walkable(Tile::new(-1, 0)));
        assert_eq!(map.to_rows()[1], "...#...");
    }

    #[test]
    fn test_ragged_and_unknown_rows_rejected() {
        assert!(matches!(
            TileMap::from_rows("bad", &["...", ".."]),
            Err(SetupError::RaggedMap { row: 1, .. })
        ));
        assert!(matches!(
            TileMap::from_rows("bad", &[".?."]),
            Err(SetupError::UnknownTerrain { symbol: '?', .. })
        ));
        assert!(matches!(TileMap::from_rows::<&str>("bad", &[]), Err(SetupError::EmptyMap)));
    }

    #[test]
    fn test_cover_walkability() {
        assert!(TerrainClass::LowCover.default_walkable());
        assert!(!TerrainClass::HalfCover.default_walkable());
        assert!(!TerrainClass::FullCover.default_walkable());
        assert!(!TerrainClass::Void.default_walkable());
    }

    #[test]
    fn test_line_tiles_includes_endpoints() {
        let line = TileMap::line_tiles(Tile::new(0, 0), Tile::new(5, 0));
        assert_eq!(line.len(), 6);
        assert_eq!(line[0], Tile::new(0, 0));
        assert_eq!(line[5], Tile::new(5, 0));
    }

    #[test]
    fn test_line_of_sight_blocked_by_wall() {
        let map = walled();
        assert!(!map.line_of_sight(Tile::new(0, 1), Tile::new(6, 1)));
        assert!(!map.line_of_sight(Tile::new(6, 1), Tile::new(0, 1)));
        assert!(map.line_of_sight(Tile::new(0, 3), Tile::new(6, 3)));
        // Adjacent tiles have no intermediate samples.
        assert!(map.line_of_sight(Tile::new(2, 1), Tile::new(3, 1)));
    }

    #[test]
    fn test_find_path_routes_around_wall() {
        let map = walled();
        let path = map.find_path(Tile::new(2, 1), Tile::new(4, 1)).unwrap();
        assert_eq!(path.last(), Some(&Tile::new(4, 1)));
        assert!(!path.contains(&Tile::new(3, 1)));
        let mut prev = Tile::new(2, 1);
        for step in &path {
            assert!(prev.is_adjacent4(*step));
            assert!(map.is_walkable(*step));
            prev = *step;
        }
    }

    #[test]
    fn test_find_path_unreachable() {
        let map = TileMap::from_rows("boxed", &["..#..", "..#..", "..#.."]).unwrap();
        assert!(map.find_path(Tile::new(0, 0), Tile::new(4, 0)).is_none());
        assert_eq!(map.find_path(Tile::new(1, 1), Tile::new(1, 1)), Some(vec![]));
    }

    #[test]
    fn test_overrides_applied() {
        let spec = MapSpec {
            id: "ovr".into(),
            rows: vec!["...".into()],
            overrides: vec![WalkableOverride {
                tile: Tile::new(1, 0),
                walkable: false,
            }],
        };
        let map = TileMap::from_spec(&spec).unwrap();
        assert!(!map.is_walkable(Tile::new(1, 0)));
        assert_eq!(map.terrain_at(Tile::new(1, 0)), Some(TerrainClass::Floor));
    }

    #[test]
    fn test_tiles_within_radius() {
        let map = TileMap::open("open", 10, 10);
        let tiles = map.tiles_within(Tile::new(0, 0), 1.0);
        assert_eq!(tiles.len(), 3);
    }

    #[test]
    fn test_tiles_within_clamped_to_map() {
        let map = TileMap::open("open", 10, 4);
        assert_eq!(map.tiles_within(Tile::new(1, 0), 3.0e9).len(), 40);
        assert_eq!(map.tiles_within(Tile::new(1, 0), f32::INFINITY).len(), 40);
        assert!(map.tiles_within(Tile::new(1, 0), f32::NAN).is_empty());
    }
}
