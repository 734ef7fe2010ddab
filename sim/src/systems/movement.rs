//! Movement system - tile claims, then continuous displacement along paths.

use crate::components::*;
use crate::config::{CombatConfig, SimTick};
use crate::events::{CombatEvent, EventLog};
use crate::modifiers::{StatChannel, StatModifiers};
use crate::terrain::{MapResource, Tile};
use bevy_ecs::prelude::*;
use std::collections::BTreeMap;

/// System that hands out next-step tiles to movers.
///
/// A claim already held by an actor still walking toward it stays valid. Tiles
/// occupied by any non-dead actor are blocked. New claimants are served in
/// ascending id order, so when several movers want the same tile the lowest id
/// gets it; the others keep their order and retry next tick.
pub fn collision_resolution_system(
    tick: Res<SimTick>,
    map: Res<MapResource>,
    mut events: ResMut<EventLog>,
    mut query: Query<(&ActorId, &LifeState, &Position, &mut PendingOrder, &mut MoveClaim)>,
) {
    let now = tick.0;
    let mut actors: Vec<_> = query.iter_mut().collect();
    actors.sort_by_key(|(id, ..)| **id);

    let mut reserved: BTreeMap<Tile, ActorId> = BTreeMap::new();
    for (id, state, pos, order, claim) in actors.iter_mut() {
        if !state.is_dead() {
            reserved.insert(pos.tile, **id);
        }
        let Some(tile) = claim.0 else {
            continue;
        };
        if state.is_alive() && order.0.as_ref().and_then(Order::next_step) == Some(tile) {
            reserved.insert(tile, **id);
        } else {
            claim.0 = None;
        }
    }

    for (id, state, _, order, claim) in actors.iter_mut() {
        if !state.is_alive() || claim.0.is_some() {
            continue;
        }
        let Some(next) = order.0.as_ref().and_then(Order::next_step) else {
            continue;
        };
        if !map.map().is_walkable(next) {
            tracing::warn!(tick = now, actor = %id, tile = %next, "path runs into a blocked tile, dropping move");
            order.clear();
            continue;
        }
        match reserved.get(&next).copied() {
            Some(holder) if holder != **id => {
                tracing::trace!(tick = now, actor = %id, tile = %next, blocked_by = %holder, "move deferred");
                events.push(CombatEvent::MoveDeferred {
                    tick: now,
                    actor: **id,
                    tile: next,
                    blocked_by: Some(holder),
                });
            }
            _ => {
                reserved.insert(next, **id);
                claim.0 = Some(next);
            }
        }
    }
}

/// System that advances claimed movers toward their next tile.
///
/// The step length is the effective move speed times the tick duration. An
/// actor within one step of the tile center snaps onto it; any leftover
/// distance is discarded. The order is cleared once the path is exhausted.
pub fn movement_system(
    config: Res<CombatConfig>,
    map: Res<MapResource>,
    mut query: Query<(
        &ActorId,
        &LifeState,
        &mut Position,
        &BaseStats,
        &StatModifiers,
        &mut PendingOrder,
        &mut MoveClaim,
    )>,
) {
    for (id, state, mut pos, stats, mods, mut order, mut claim) in query.iter_mut() {
        if !state.is_alive() {
            continue;
        }
        let Some(next) = claim.0 else {
            continue;
        };
        if order.0.as_ref().and_then(Order::next_step) != Some(next) || !map.map().is_walkable(next) {
            claim.0 = None;
            continue;
        }

        let step = stats.effective(StatChannel::MoveSpeed, mods) * config.tick_duration;
        if step <= 0.0 {
            continue;
        }

        let (tx, ty) = (next.x as f32, next.y as f32);
        let dist = pos.distance_to_point(tx, ty);
        if dist <= step {
            pos.snap(next);
            claim.0 = None;
            let arrived = match &mut order.0 {
                Some(Order::Move { path, .. }) => {
                    path.pop_front();
                    path.is_empty()
                }
                _ => true,
            };
            if arrived {
                tracing::debug!(actor = %id, tile = %next, "move complete");
                order.clear();
            }
        } else {
            pos.x += (tx - pos.x) / dist * step;
            pos.y += (ty - pos.y) / dist * step;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mission::ActorSpec;
    use crate::modifiers::StatModifier;
    use crate::testing::{config, spawn, step, world_with};
    use crate::terrain::TileMap;
    use std::collections::VecDeque;

    fn schedule() -> Schedule {
        let mut schedule = Schedule::default();
        schedule.add_systems((collision_resolution_system, movement_system).chain());
        schedule
    }

    fn move_along(world: &mut World, entity: Entity, path: &[(i32, i32)]) {
        let path: VecDeque<Tile> = path.iter().map(|&t| Tile::from(t)).collect();
        let destination = *path.back().unwrap();
        world.get_mut::<PendingOrder>(entity).unwrap().0 = Some(Order::Move { path, destination });
    }

    #[test]
    fn test_three_ticks_per_tile_at_default_speed() {
        let mut world = world_with(TileMap::open("open", 5, 5), config(0.7, false));
        let a = spawn(&mut world, ActorSpec::new(1, ActorKind::Crew, (0, 0)));
        move_along(&mut world, a, &[(1, 0)]);
        let mut schedule = schedule();

        step(&mut world, &mut schedule);
        let pos = *world.get::<Position>(a).unwrap();
        assert!((pos.x - 0.4).abs() < 1e-6);
        assert_eq!(pos.tile, Tile::new(0, 0));
        assert_eq!(world.get::<MoveClaim>(a).unwrap().0, Some(Tile::new(1, 0)));

        step(&mut world, &mut schedule);
        step(&mut world, &mut schedule);
        assert_eq!(*world.get::<Position>(a).unwrap(), Position::at(Tile::new(1, 0)));
        assert!(world.get::<PendingOrder>(a).unwrap().is_idle());
        assert_eq!(world.get::<MoveClaim>(a).unwrap().0, None);
    }

    #[test]
    fn test_lowest_id_wins_contested_tile() {
        let mut world = world_with(TileMap::open("open", 5, 5), config(0.7, false));
        let high = spawn(&mut world, ActorSpec::new(9, ActorKind::Crew, (2, 1)));
        let low = spawn(&mut world, ActorSpec::new(3, ActorKind::Crew, (1, 2)));
        move_along(&mut world, high, &[(2, 2)]);
        move_along(&mut world, low, &[(2, 2)]);

        let events = step(&mut world, &mut schedule());
        assert_eq!(world.get::<MoveClaim>(low).unwrap().0, Some(Tile::new(2, 2)));
        assert_eq!(world.get::<MoveClaim>(high).unwrap().0, None);
        assert_eq!(world.get::<Position>(high).unwrap().tile, Tile::new(2, 1));
        assert!(!world.get::<PendingOrder>(high).unwrap().is_idle());
        assert_eq!(
            events,
            vec![CombatEvent::MoveDeferred {
                tick: 1,
                actor: ActorId(9),
                tile: Tile::new(2, 2),
                blocked_by: Some(ActorId(3)),
            }]
        );
    }

    #[test]
    fn test_deferred_mover_proceeds_once_tile_frees() {
        let mut world = world_with(TileMap::open("open", 5, 5), config(0.7, false));
        let first = spawn(&mut world, ActorSpec::new(1, ActorKind::Crew, (1, 0)));
        let second = spawn(&mut world, ActorSpec::new(2, ActorKind::Crew, (0, 0)));
        move_along(&mut world, first, &[(2, 0)]);
        move_along(&mut world, second, &[(1, 0)]);
        let mut schedule = schedule();

        // Actor 1 still stands on (1, 0) until it snaps onto (2, 0).
        for _ in 0..3 {
            step(&mut world, &mut schedule);
        }
        assert_eq!(world.get::<Position>(first).unwrap().tile, Tile::new(2, 0));
        assert_eq!(world.get::<Position>(second).unwrap().tile, Tile::new(0, 0));

        for _ in 0..3 {
            step(&mut world, &mut schedule);
        }
        assert_eq!(world.get::<Position>(second).unwrap().tile, Tile::new(1, 0));
    }

    #[test]
    fn test_dead_actor_frees_tile_and_never_moves() {
        let mut world = world_with(TileMap::open("open", 5, 5), config(0.7, false));
        let dead = spawn(&mut world, ActorSpec::new(1, ActorKind::Crew, (1, 0)).with_health(0).with_state(LifeState::Dead));
        let mover = spawn(&mut world, ActorSpec::new(2, ActorKind::Crew, (0, 0)));
        move_along(&mut world, dead, &[(2, 0)]);
        move_along(&mut world, mover, &[(1, 0)]);

        step(&mut world, &mut schedule());
        assert_eq!(world.get::<MoveClaim>(mover).unwrap().0, Some(Tile::new(1, 0)));
        assert_eq!(*world.get::<Position>(dead).unwrap(), Position::at(Tile::new(1, 0)));
        assert_eq!(world.get::<MoveClaim>(dead).unwrap().0, None);
    }

    #[test]
    fn test_speed_modifier_scales_step() {
        let mut world = world_with(TileMap::open("open", 5, 5), config(0.7, false));
        let a = spawn(&mut world, ActorSpec::new(1, ActorKind::Crew, (0, 0)));
        world
            .get_mut::<StatModifiers>(a)
            .unwrap()
            .add(StatModifier::factor("sprint", StatChannel::MoveSpeed, 2.5));
        move_along(&mut world, a, &[(1, 0), (2, 0)]);
        let mut schedule = schedule();

        // 10 tiles/s * 0.1 s = one full tile per tick.
        step(&mut world, &mut schedule);
        assert_eq!(world.get::<Position>(a).unwrap().tile, Tile::new(1, 0));
        step(&mut world, &mut schedule);
        assert_eq!(world.get::<Position>(a).unwrap().tile, Tile::new(2, 0));
        assert!(world.get::<PendingOrder>(a).unwrap().is_idle());
    }

    #[test]
    fn test_zero_speed_holds_claim() {
        let mut world = world_with(TileMap::open("open", 5, 5), config(0.7, false));
        let a = spawn(&mut world, ActorSpec::new(1, ActorKind::Crew, (0, 0)));
        world
            .get_mut::<StatModifiers>(a)
            .unwrap()
            .add(StatModifier::factor("pinned", StatChannel::MoveSpeed, 0.0));
        move_along(&mut world, a, &[(1, 0)]);

        step(&mut world, &mut schedule());
        assert_eq!(*world.get::<Position>(a).unwrap(), Position::at(Tile::new(0, 0)));
        assert_eq!(world.get::<MoveClaim>(a).unwrap().0, Some(Tile::new(1, 0)));
    }
}
