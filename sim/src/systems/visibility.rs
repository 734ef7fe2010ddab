//! Visibility system - per-actor sight lists and per-side fog of war.
//!
//! Sight is a pure function of positions, vision radii and the map, so the
//! per-actor work can run on rayon when the `parallel` feature is enabled.
//! Results are always applied in ascending id order.

use crate::components::*;
use crate::modifiers::{StatChannel, StatModifiers};
use crate::spatial::OccupancyGrid;
use crate::terrain::{MapResource, Tile, TileMap};
use bevy_ecs::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Sides that keep fog of war.
pub const FOG_SIDES: [ActorKind; 2] = [ActorKind::Crew, ActorKind::Enemy];

/// What each side sees now and has ever seen.
#[derive(Resource, Debug, Clone, Default, PartialEq, Eq)]
pub struct FogOfWar {
    visible: BTreeMap<ActorKind, BTreeSet<Tile>>,
    explored: BTreeMap<ActorKind, BTreeSet<Tile>>,
}

impl FogOfWar {
    pub fn is_visible(&self, side: ActorKind, tile: Tile) -> bool {
        self.visible.get(&side).is_some_and(|s| s.contains(&tile))
    }

    pub fn is_explored(&self, side: ActorKind, tile: Tile) -> bool {
        self.explored.get(&side).is_some_and(|s| s.contains(&tile))
    }

    pub fn visible_tiles(&self, side: ActorKind) -> impl Iterator<Item = &Tile> {
        self.visible.get(&side).into_iter().flatten()
    }

    pub fn explored_count(&self, side: ActorKind) -> usize {
        self.explored.get(&side).map_or(0, |s| s.len())
    }

    pub fn explored_sets(&self) -> BTreeMap<ActorKind, BTreeSet<Tile>> {
        self.explored.clone()
    }

    /// Put back explored sets taken from a snapshot.
    pub fn restore_explored(&mut self, explored: BTreeMap<ActorKind, BTreeSet<Tile>>) {
        self.explored = explored;
        self.visible.clear();
    }

    fn set_visible(&mut self, side: ActorKind, tiles: BTreeSet<Tile>) {
        self.explored.entry(side).or_default().extend(tiles.iter().copied());
        self.visible.insert(side, tiles);
    }
}

/// Input for one viewer.
struct Viewer {
    entity: Entity,
    id: ActorId,
    kind: ActorKind,
    tile: Tile,
    radius: f32,
}

/// Output for one viewer.
struct Seen {
    entity: Entity,
    kind: ActorKind,
    actors: Vec<ActorId>,
    tiles: Vec<Tile>,
}

fn compute_sight(viewer: &Viewer, grid: &OccupancyGrid, map: &TileMap) -> Seen {
    let mut actors: Vec<ActorId> = grid
        .query_radius(viewer.tile, viewer.radius)
        .into_iter()
        .filter(|e| e.id != viewer.id && map.line_of_sight(viewer.tile, e.tile))
        .map(|e| e.id)
        .collect();
    actors.sort();

    let tiles = if FOG_SIDES.contains(&viewer.kind) {
        map.tiles_within(viewer.tile, viewer.radius)
            .into_iter()
            .filter(|t| map.line_of_sight(viewer.tile, *t))
            .collect()
    } else {
        Vec::new()
    };

    Seen {
        entity: viewer.entity,
        kind: viewer.kind,
        actors,
        tiles,
    }
}

/// Recompute what every living actor sees, then the fog of war.
///
/// ## Data Access
/// - Reads: MapResource, ActorId, ActorKind, LifeState, Position, BaseStats, StatModifiers
/// - Writes: OccupancyGrid, FogOfWar, Sight
pub fn visibility_system(
    map: Res<MapResource>,
    mut grid: ResMut<OccupancyGrid>,
    mut fog: ResMut<FogOfWar>,
    actors: Query<(Entity, &ActorId, &ActorKind, &LifeState, &Position)>,
    stats: Query<(&BaseStats, &StatModifiers)>,
    mut sights: Query<&mut Sight>,
) {
    grid.rebuild(actors.iter());

    let mut viewers: Vec<Viewer> = Vec::new();
    for (entity, id, kind, state, pos) in actors.iter() {
        if !state.is_alive() {
            if let Ok(mut sight) = sights.get_mut(entity) {
                if !sight.visible.is_empty() {
                    sight.visible.clear();
                }
            }
            continue;
        }
        let radius = stats
            .get(entity)
            .map(|(base, mods)| base.effective(StatChannel::VisionRadius, mods))
            .unwrap_or(0.0);
        viewers.push(Viewer {
            entity,
            id: *id,
            kind: *kind,
            tile: pos.tile,
            radius,
        });
    }
    viewers.sort_by_key(|v| v.id);

    let map = map.map();
    let grid = &*grid;

    #[cfg(feature = "parallel")]
    let results: Vec<Seen> = viewers.par_iter().map(|v| compute_sight(v, grid, map)).collect();

    #[cfg(not(feature = "parallel"))]
    let results: Vec<Seen> = viewers.iter().map(|v| compute_sight(v, grid, map)).collect();

    let mut side_tiles: BTreeMap<ActorKind, BTreeSet<Tile>> =
        FOG_SIDES.iter().map(|side| (*side, BTreeSet::new())).collect();
    for seen in results {
        if let Some(tiles) = side_tiles.get_mut(&seen.kind) {
            tiles.extend(seen.tiles);
        }
        if let Ok(mut sight) = sights.get_mut(seen.entity) {
            if sight.visible != seen.actors {
                sight.visible = seen.actors;
            }
        }
    }
    for (side, tiles) in side_tiles {
        fog.set_visible(side, tiles);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mission::ActorSpec;
    use crate::modifiers::StatModifier;
    use crate::testing::{config, spawn, world_with};

    fn run(world: &mut World) {
        let mut schedule = Schedule::default();
        schedule.add_systems(visibility_system);
        schedule.run(world);
    }

    #[test]
    fn test_sight_respects_radius_and_walls() {
        let map = TileMap::from_rows(
            "walls",
            &[
                "..........", //
                "....#.....",
                "..........",
            ],
        )
        .unwrap();
        let mut world = world_with(map, config(0.7, false));
        let viewer = spawn(&mut world, ActorSpec::new(1, ActorKind::Crew, (2, 1)));
        spawn(&mut world, ActorSpec::new(5, ActorKind::Enemy, (6, 1)));
        spawn(&mut world, ActorSpec::new(3, ActorKind::Enemy, (2, 2)));
        spawn(&mut world, ActorSpec::new(2, ActorKind::Crew, (0, 0)));
        run(&mut world);

        // (6, 1) is behind the wall.
        assert_eq!(world.get::<Sight>(viewer).unwrap().visible, vec![ActorId(2), ActorId(3)]);
    }

    #[test]
    fn test_vision_modifier_shrinks_sight() {
        let mut world = world_with(TileMap::open("open", 10, 1), config(0.7, false));
        let viewer = spawn(&mut world, ActorSpec::new(1, ActorKind::Crew, (0, 0)));
        spawn(&mut world, ActorSpec::new(2, ActorKind::Enemy, (5, 0)));
        world
            .get_mut::<StatModifiers>(viewer)
            .unwrap()
            .add(StatModifier::factor("smoke", StatChannel::VisionRadius, 0.3));
        run(&mut world);
        assert!(world.get::<Sight>(viewer).unwrap().visible.is_empty());
    }

    #[test]
    fn test_dead_see_nothing_and_are_not_seen() {
        let mut world = world_with(TileMap::open("open", 10, 1), config(0.7, false));
        let viewer = spawn(&mut world, ActorSpec::new(1, ActorKind::Crew, (0, 0)));
        let dead = spawn(
            &mut world,
            ActorSpec::new(2, ActorKind::Enemy, (3, 0)).with_health(0).with_state(LifeState::Dead),
        );
        world.get_mut::<Sight>(dead).unwrap().visible = vec![ActorId(1)];
        run(&mut world);

        assert!(world.get::<Sight>(viewer).unwrap().visible.is_empty());
        assert!(world.get::<Sight>(dead).unwrap().visible.is_empty());
    }

    #[test]
    fn test_fog_explored_persists() {
        let mut world = world_with(TileMap::open("open", 30, 1), config(0.7, false));
        let scout = spawn(&mut world, ActorSpec::new(1, ActorKind::Crew, (0, 0)));
        run(&mut world);
        let fog = world.resource::<FogOfWar>();
        assert!(fog.is_visible(ActorKind::Crew, Tile::new(10, 0)));
        assert!(!fog.is_visible(ActorKind::Crew, Tile::new(11, 0)));
        assert!(!fog.is_visible(ActorKind::Enemy, Tile::new(0, 0)));
        let seen: Vec<i32> = fog.visible_tiles(ActorKind::Crew).map(|t| t.x).collect();
        assert_eq!(seen, (0..=10).collect::<Vec<_>>());
        assert_eq!(fog.visible_tiles(ActorKind::Enemy).count(), 0);

        world.get_mut::<Position>(scout).unwrap().snap(Tile::new(20, 0));
        run(&mut world);
        let fog = world.resource::<FogOfWar>();
        assert!(!fog.is_visible(ActorKind::Crew, Tile::new(0, 0)));
        assert!(fog.is_explored(ActorKind::Crew, Tile::new(0, 0)));
        assert_eq!(fog.explored_count(ActorKind::Crew), 30);
    }
}
