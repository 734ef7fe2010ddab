//! Fixtures shared by the system tests.

use crate::config::{CombatConfig, CombatRng, SimTick};
use crate::events::{CombatEvent, DeathSignals, EventLog};
use crate::mission::ActorSpec;
use crate::objectives::{MissionStatus, ObjectiveSet};
use crate::spatial::OccupancyGrid;
use crate::systems::visibility::FogOfWar;
use crate::terrain::{MapResource, TileMap};
use bevy_ecs::prelude::*;

/// Deterministic config: every shot lands (`hit` = 1.0) or misses (0.0).
pub fn config(hit: f32, auto_defend: bool) -> CombatConfig {
    CombatConfig {
        base_hit_chance: hit,
        auto_defend,
        strict_invariants: true,
        ..CombatConfig::default()
    }
}

/// World with every core resource in place and no actors.
pub fn world_with(map: TileMap, config: CombatConfig) -> World {
    let mut world = World::new();
    world.insert_resource(SimTick(0));
    world.insert_resource(config);
    world.insert_resource(MapResource::new(map));
    world.insert_resource(CombatRng::from_seed(1));
    world.insert_resource(EventLog::default());
    world.insert_resource(DeathSignals::default());
    world.insert_resource(OccupancyGrid::default());
    world.insert_resource(FogOfWar::default());
    world.insert_resource(ObjectiveSet::default());
    world.insert_resource(MissionStatus::default());
    world
}

pub fn spawn(world: &mut World, spec: ActorSpec) -> Entity {
    world.spawn(spec.bundle()).id()
}

/// Advance the tick counter and run the schedule once.
pub fn step(world: &mut World, schedule: &mut Schedule) -> Vec<CombatEvent> {
    world.resource_mut::<SimTick>().increment();
    schedule.run(world);
    world.resource_mut::<EventLog>().drain()
}
