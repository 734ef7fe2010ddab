//! Tile occupancy index for neighbour queries.
//!
//! Rebuilt from actor positions whenever a phase needs an up-to-date view.
//! Keyed on tiles in a `BTreeMap` so every scan visits tiles in a fixed order,
//! and radius queries come back sorted by distance, then id.

use crate::components::{ActorId, ActorKind, LifeState, Position};
use crate::terrain::Tile;
use bevy_ecs::prelude::*;
use std::collections::BTreeMap;

/// Entry for one non-dead actor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OccupantEntry {
    pub id: ActorId,
    pub entity: Entity,
    pub kind: ActorKind,
    pub tile: Tile,
    /// False for incapacitated actors, which still hold their tile.
    pub alive: bool,
}

/// Which actor stands on which tile. Dead actors are not indexed.
#[derive(Resource, Debug, Default)]
pub struct OccupancyGrid {
    cells: BTreeMap<Tile, OccupantEntry>,
    actor_tiles: BTreeMap<ActorId, Tile>,
}

impl OccupancyGrid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.cells.clear();
        self.actor_tiles.clear();
    }

    /// Index an actor. Returns the previous occupant if the tile was taken.
    pub fn insert(&mut self, entry: OccupantEntry) -> Option<OccupantEntry> {
        if let Some(old_tile) = self.actor_tiles.insert(entry.id, entry.tile) {
            if old_tile != entry.tile {
                self.cells.remove(&old_tile);
            }
        }
        self.cells.insert(entry.tile, entry).filter(|prev| prev.id != entry.id)
    }

    pub fn remove(&mut self, id: ActorId) {
        if let Some(tile) = self.actor_tiles.remove(&id) {
            self.cells.remove(&tile);
        }
    }

    pub fn occupant(&self, tile: Tile) -> Option<&OccupantEntry> {
        self.cells.get(&tile)
    }

    pub fn is_occupied(&self, tile: Tile) -> bool {
        self.cells.contains_key(&tile)
    }

    pub fn tile_of(&self, id: ActorId) -> Option<Tile> {
        self.actor_tiles.get(&id).copied()
    }

    /// All indexed actors within `radius` of `center`, closest first; equal
    /// distances resolve to the lower id.
    pub fn query_radius(&self, center: Tile, radius: f32) -> Vec<OccupantEntry> {
        if radius < 0.0 {
            return Vec::new();
        }
        // Saturates for huge radii; the key range must stay ordered.
        let reach = radius.floor() as i32;
        let (lo, hi) = (center.x.saturating_sub(reach), center.x.saturating_add(reach));
        let mut results: Vec<(f32, OccupantEntry)> = self
            .cells
            .range(Tile::new(lo, i32::MIN)..=Tile::new(hi, i32::MAX))
            .filter(|(tile, _)| tile.y.abs_diff(center.y) <= reach.unsigned_abs())
            .map(|(tile, entry)| (center.distance_to(*tile), *entry))
            .filter(|(dist, _)| *dist <= radius)
            .collect();

        results.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.id.cmp(&b.1.id)));
        results.into_iter().map(|(_, entry)| entry).collect()
    }

    /// Living actors hostile to `kind` within `radius`, closest first.
    pub fn query_hostiles(&self, center: Tile, radius: f32, kind: ActorKind) -> Vec<OccupantEntry> {
        let mut results = self.query_radius(center, radius);
        results.retain(|e| e.alive && kind.is_hostile_to(e.kind));
        results
    }

    /// Clear and re-index every non-dead actor, in id order.
    pub fn rebuild<'a>(
        &mut self,
        actors: impl Iterator<Item = (Entity, &'a ActorId, &'a ActorKind, &'a LifeState, &'a Position)>,
    ) {
        self.clear();
        let mut actors: Vec<_> = actors.filter(|(_, _, _, state, _)| !state.is_dead()).collect();
        actors.sort_by_key(|(_, id, ..)| **id);

        for (entity, id, kind, state, pos) in actors {
            let displaced = self.insert(OccupantEntry {
                id: *id,
                entity,
                kind: *kind,
                tile: pos.tile,
                alive: state.is_alive(),
            });
            if let Some(prev) = displaced {
                tracing::error!(actor = %id, other = %prev.id, tile = %pos.tile, "two actors share a tile");
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &OccupantEntry> {
        self.cells.values()
    }

    pub fn total_count(&self) -> usize {
        self.cells.len()
    }
}

/// Rebuilds the occupancy grid from actor positions.
///
/// ## Data Access
/// - Reads: ActorId, ActorKind, LifeState, Position
/// - Writes: OccupancyGrid
pub fn occupancy_update_system(
    mut grid: ResMut<OccupancyGrid>,
    query: Query<(Entity, &ActorId, &ActorKind, &LifeState, &Position)>,
) {
    grid.rebuild(query.iter());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: u32, kind: ActorKind, x: i32, y: i32) -> OccupantEntry {
        OccupantEntry {
            id: ActorId(id),
            entity: Entity::from_raw(id),
            kind,
            tile: Tile::new(x, y),
            alive: true,
        }
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut grid = OccupancyGrid::new();
        grid.insert(entry(1, ActorKind::Crew, 2, 2));
        assert!(grid.is_occupied(Tile::new(2, 2)));
        assert_eq!(grid.tile_of(ActorId(1)), Some(Tile::new(2, 2)));

        // Re-inserting at a new tile moves the actor.
        grid.insert(entry(1, ActorKind::Crew, 3, 2));
        assert!(!grid.is_occupied(Tile::new(2, 2)));
        assert_eq!(grid.total_count(), 1);

        grid.remove(ActorId(1));
        assert_eq!(grid.total_count(), 0);
    }

    #[test]
    fn test_query_radius_sorted() {
        let mut grid = OccupancyGrid::new();
        grid.insert(entry(5, ActorKind::Enemy, 3, 0));
        grid.insert(entry(2, ActorKind::Enemy, 0, 3));
        grid.insert(entry(9, ActorKind::Enemy, 1, 0));
        grid.insert(entry(7, ActorKind::Enemy, 20, 20));

        let ids: Vec<u32> = grid
            .query_radius(Tile::new(0, 0), 5.0)
            .iter()
            .map(|e| e.id.0)
            .collect();
        // Equal distance (3.0) resolves to the lower id.
        assert_eq!(ids, vec![9, 2, 5]);
    }

    #[test]
    fn test_query_radius_huge_radius() {
        let mut grid = OccupancyGrid::new();
        grid.insert(entry(1, ActorKind::Crew, 1, 0));
        grid.insert(entry(2, ActorKind::Enemy, 40, 30));

        assert_eq!(grid.query_radius(Tile::new(1, 0), 3.0e9).len(), 2);
        assert_eq!(grid.query_radius(Tile::new(1, 0), f32::INFINITY).len(), 2);
        assert!(grid.query_radius(Tile::new(1, 0), f32::NAN).is_empty());
    }

    #[test]
    fn test_query_hostiles_filters() {
        let mut grid = OccupancyGrid::new();
        grid.insert(entry(1, ActorKind::Crew, 0, 0));
        grid.insert(entry(2, ActorKind::Crew, 1, 0));
        grid.insert(entry(3, ActorKind::Enemy, 2, 0));
        grid.insert(entry(4, ActorKind::Neutral, 0, 1));
        let mut down = entry(5, ActorKind::Enemy, 0, 2);
        down.alive = false;
        grid.insert(down);

        let hostiles = grid.query_hostiles(Tile::new(0, 0), 10.0, ActorKind::Crew);
        assert_eq!(hostiles.len(), 1);
        assert_eq!(hostiles[0].id, ActorId(3));
    }

    #[test]
    fn test_update_system_skips_dead() {
        let mut world = World::new();
        world.insert_resource(OccupancyGrid::new());
        world.spawn((ActorId(1), ActorKind::Crew, LifeState::Alive, Position::at(Tile::new(0, 0))));
        world.spawn((ActorId(2), ActorKind::Enemy, LifeState::Dead, Position::at(Tile::new(1, 0))));
        world.spawn((
            ActorId(3),
            ActorKind::Enemy,
            LifeState::Incapacitated,
            Position::at(Tile::new(2, 0)),
        ));

        let mut schedule = Schedule::default();
        schedule.add_systems(occupancy_update_system);
        schedule.run(&mut world);

        let grid = world.resource::<OccupancyGrid>();
        assert_eq!(grid.total_count(), 2);
        assert!(!grid.is_occupied(Tile::new(1, 0)));
        assert!(!grid.occupant(Tile::new(2, 0)).unwrap().alive);
    }
}
