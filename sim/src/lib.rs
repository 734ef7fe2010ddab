//! Tactics Sim - Combat Simulation Core
//!
//! A deterministic, tick-driven ECS simulation of grid-based squad combat.
//! Uses `bevy_ecs` for the entity-component-system architecture; the public
//! entry point is [`CombatState`].

pub mod api;
pub mod components;
pub mod config;
pub mod error;
pub mod events;
pub mod hooks;
pub mod mission;
pub mod modifiers;
pub mod objectives;
pub mod resolver;
pub mod spatial;
pub mod systems;
pub mod terrain;
pub mod world;

#[cfg(test)]
mod testing;

pub use api::{CombatState, TickReport, TickStatus};
pub use components::*;
pub use config::{CombatConfig, CombatRng, SimTick, SuppressionConfig};
pub use error::{OrderRejection, SetupError, SnapshotError};
pub use events::{CombatEvent, EventSink};
pub use hooks::{DecisionContext, DecisionHook, EngageNearestHook, HookCommand, OrderRequest};
pub use mission::{ActorSpec, MissionSetup, WeaponSpec};
pub use modifiers::{StatChannel, StatModifier, StatModifiers};
pub use objectives::{
    EliminateAll, MissionOutcome, Objective, ObjectiveReport, ObjectiveRule, ObjectiveSpec, ObjectiveStatus,
    ReachZone, RuleSpec, Survive,
};
pub use resolver::{apply_damage, can_attack, resolve_attack, AttackResult, Combatant};
pub use spatial::OccupancyGrid;
pub use systems::FogOfWar;
pub use terrain::{MapSpec, TerrainClass, Tile, TileMap, WalkableOverride};
pub use world::{ActorRecord, ActorView, BattleView, CombatSnapshot, ObjectiveRecord};
