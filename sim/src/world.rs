//! Read-only views of the battle and the snapshot record.
//!
//! `BattleView` is what decision hooks and objective rules see: plain data,
//! actors sorted by id, the map behind an `Arc`. `CombatSnapshot` is the
//! serializable state record used for save/restore.

use crate::components::*;
use crate::config::{CombatRng, SimTick};
use crate::modifiers::{StatChannel, StatModifiers};
use crate::objectives::{MissionOutcome, MissionStatus, ObjectiveSet, ObjectiveStatus};
use crate::systems::visibility::FogOfWar;
use crate::terrain::{MapResource, Tile, TileMap};
use bevy_ecs::prelude::*;
use bevy_ecs::query::QueryData;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Snapshot format written by this version of the crate.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// Every actor component, read-only.
#[derive(QueryData)]
pub struct ActorData {
    pub id: &'static ActorId,
    pub kind: &'static ActorKind,
    pub state: &'static LifeState,
    pub position: &'static Position,
    pub health: &'static Health,
    pub stats: &'static BaseStats,
    pub modifiers: &'static StatModifiers,
    pub weapon: &'static Weapon,
    pub order: &'static PendingOrder,
    pub claim: &'static MoveClaim,
    pub sight: &'static Sight,
}

/// Read-only state of one actor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorView {
    pub id: ActorId,
    pub kind: ActorKind,
    pub state: LifeState,
    pub tile: Tile,
    pub x: f32,
    pub y: f32,
    pub health: i32,
    pub max_health: i32,
    pub order: Option<Order>,
    pub weapon_range: f32,
    pub weapon_ready: bool,
    pub rounds: u32,
    pub magazine_capacity: u32,
    pub reloading: bool,
    pub accuracy: f32,
    pub move_speed: f32,
    pub vision_radius: f32,
    /// Actors this one currently sees, ascending.
    pub visible: Vec<ActorId>,
}

impl ActorView {
    pub fn from_item(item: &ActorDataItem<'_>, tick: u64) -> Self {
        let stat = |channel| item.stats.effective(channel, item.modifiers);
        Self {
            id: *item.id,
            kind: *item.kind,
            state: *item.state,
            tile: item.position.tile,
            x: item.position.x,
            y: item.position.y,
            health: item.health.current,
            max_health: item.health.max,
            order: item.order.0.clone(),
            weapon_range: item.weapon.range,
            weapon_ready: item.weapon.is_ready(tick),
            rounds: item.weapon.rounds,
            magazine_capacity: item.weapon.magazine_capacity,
            reloading: item.weapon.is_reloading(),
            accuracy: stat(StatChannel::Accuracy),
            move_speed: stat(StatChannel::MoveSpeed),
            vision_radius: stat(StatChannel::VisionRadius),
            visible: item.sight.visible.clone(),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.state.is_alive()
    }

    pub fn is_idle(&self) -> bool {
        self.order.is_none()
    }
}

/// Read-only picture of the battle at one tick.
#[derive(Debug, Clone)]
pub struct BattleView {
    pub tick: u64,
    pub map: Arc<TileMap>,
    /// Sorted by id.
    pub actors: Vec<ActorView>,
}

impl BattleView {
    pub fn new(tick: u64, map: Arc<TileMap>, mut actors: Vec<ActorView>) -> Self {
        actors.sort_by_key(|a| a.id);
        Self { tick, map, actors }
    }

    /// Build a view from the ECS world.
    ///
    /// Panics if the `SimTick` or `MapResource` resources are missing.
    pub fn from_world(world: &mut World) -> Self {
        let tick = world.resource::<SimTick>().0;
        let map = world.resource::<MapResource>().0.clone();
        let mut query = world.query::<ActorData>();
        let actors = query.iter(world).map(|item| ActorView::from_item(&item, tick)).collect();
        Self::new(tick, map, actors)
    }

    pub fn actor(&self, id: ActorId) -> Option<&ActorView> {
        self.actors
            .binary_search_by_key(&id, |a| a.id)
            .ok()
            .map(|i| &self.actors[i])
    }

    pub fn alive(&self) -> impl Iterator<Item = &ActorView> {
        self.actors.iter().filter(|a| a.is_alive())
    }

    pub fn alive_count(&self, kind: ActorKind) -> usize {
        self.alive().filter(|a| a.kind == kind).count()
    }

    /// Living hostiles `viewer` currently sees, closest first.
    pub fn visible_hostiles(&self, viewer: ActorId) -> Vec<&ActorView> {
        let Some(me) = self.actor(viewer) else {
            return Vec::new();
        };
        let mut hostiles: Vec<&ActorView> = me
            .visible
            .iter()
            .filter_map(|id| self.actor(*id))
            .filter(|a| a.is_alive() && me.kind.is_hostile_to(a.kind))
            .collect();
        hostiles.sort_by(|a, b| {
            me.tile
                .distance_to(a.tile)
                .total_cmp(&me.tile.distance_to(b.tile))
                .then(a.id.cmp(&b.id))
        });
        hostiles
    }
}

// ============================================================================
// SNAPSHOT RECORD
// ============================================================================

/// Full persistent state of one actor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorRecord {
    pub id: ActorId,
    pub kind: ActorKind,
    pub state: LifeState,
    pub position: Position,
    pub health: Health,
    pub stats: BaseStats,
    pub modifiers: StatModifiers,
    pub weapon: Weapon,
    pub order: Option<Order>,
    pub claim: Option<Tile>,
}

impl ActorRecord {
    fn from_item(item: &ActorDataItem<'_>) -> Self {
        Self {
            id: *item.id,
            kind: *item.kind,
            state: *item.state,
            position: *item.position,
            health: *item.health,
            stats: *item.stats,
            modifiers: item.modifiers.clone(),
            weapon: item.weapon.clone(),
            order: item.order.0.clone(),
            claim: item.claim.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectiveRecord {
    pub id: String,
    pub status: ObjectiveStatus,
}

/// Serializable record of everything needed to resume a mission.
///
/// The map itself is not stored, only its id; restoring needs the original
/// mission setup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombatSnapshot {
    pub format_version: u32,
    pub map_id: String,
    pub tick: u64,
    /// Exact position in the random stream.
    pub rng: CombatRng,
    pub actors: Vec<ActorRecord>,
    pub objectives: Vec<ObjectiveRecord>,
    pub outcome: Option<MissionOutcome>,
    /// Tiles each side has ever seen.
    pub explored: BTreeMap<ActorKind, BTreeSet<Tile>>,
}

impl CombatSnapshot {
    /// Capture the state of the ECS world.
    ///
    /// Panics if any core resource is missing.
    pub fn from_world(world: &mut World) -> Self {
        let map_id = world.resource::<MapResource>().map().id().to_string();
        let tick = world.resource::<SimTick>().0;
        let rng = world.resource::<CombatRng>().clone();
        let objectives = world
            .resource::<ObjectiveSet>()
            .iter()
            .map(|o| ObjectiveRecord {
                id: o.id().to_string(),
                status: o.status(),
            })
            .collect();
        let outcome = world.resource::<MissionStatus>().outcome;
        let explored = world.resource::<FogOfWar>().explored_sets();

        let mut query = world.query::<ActorData>();
        let mut actors: Vec<ActorRecord> = query.iter(world).map(|item| ActorRecord::from_item(&item)).collect();
        actors.sort_by_key(|a| a.id);

        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            map_id,
            tick,
            rng,
            actors,
            objectives,
            outcome,
            explored,
        }
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serialize to pretty JSON string (for debugging).
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn actor(&self, id: ActorId) -> Option<&ActorRecord> {
        self.actors.iter().find(|a| a.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modifiers::StatModifier;

    fn spawn(world: &mut World, id: u32, kind: ActorKind, tile: Tile) -> Entity {
        world
            .spawn(ActorBundle {
                id: ActorId(id),
                kind,
                state: LifeState::Alive,
                position: Position::at(tile),
                health: Health::new(100),
                stats: BaseStats::default(),
                modifiers: StatModifiers::default(),
                weapon: Weapon {
                    name: "rifle".into(),
                    range: 8.0,
                    damage: 25,
                    magazine_capacity: 6,
                    rounds: 6,
                    cooldown_ticks: 1,
                    reload_ticks: 3,
                    cooldown_until: 0,
                    reload_until: None,
                },
                order: PendingOrder::default(),
                claim: MoveClaim::default(),
                sight: Sight::default(),
            })
            .id()
    }

    fn world() -> World {
        let mut world = World::new();
        world.insert_resource(SimTick(4));
        world.insert_resource(MapResource::new(TileMap::open("yard", 8, 8)));
        world
    }

    #[test]
    fn test_view_sorted_by_id() {
        let mut world = world();
        spawn(&mut world, 9, ActorKind::Enemy, Tile::new(5, 5));
        spawn(&mut world, 2, ActorKind::Crew, Tile::new(0, 0));
        spawn(&mut world, 4, ActorKind::Crew, Tile::new(1, 0));

        let view = BattleView::from_world(&mut world);
        let ids: Vec<u32> = view.actors.iter().map(|a| a.id.0).collect();
        assert_eq!(ids, vec![2, 4, 9]);
        assert_eq!(view.tick, 4);
        assert_eq!(view.alive_count(ActorKind::Crew), 2);
        assert_eq!(view.actor(ActorId(9)).unwrap().tile, Tile::new(5, 5));
        assert!(view.actor(ActorId(3)).is_none());
    }

    #[test]
    fn test_view_applies_modifiers() {
        let mut world = world();
        let e = spawn(&mut world, 1, ActorKind::Crew, Tile::new(0, 0));
        world
            .get_mut::<StatModifiers>(e)
            .unwrap()
            .add(StatModifier::factor("suppressed", StatChannel::Accuracy, 0.5));

        let view = BattleView::from_world(&mut world);
        assert_eq!(view.actors[0].accuracy, 0.5);
        assert_eq!(view.actors[0].move_speed, 4.0);
    }

    #[test]
    fn test_visible_hostiles_nearest_first() {
        let mut world = world();
        let me = spawn(&mut world, 1, ActorKind::Crew, Tile::new(0, 0));
        spawn(&mut world, 2, ActorKind::Enemy, Tile::new(4, 0));
        spawn(&mut world, 3, ActorKind::Enemy, Tile::new(2, 0));
        spawn(&mut world, 4, ActorKind::Crew, Tile::new(1, 0));
        world.get_mut::<Sight>(me).unwrap().visible = vec![ActorId(2), ActorId(3), ActorId(4)];

        let view = BattleView::from_world(&mut world);
        let ids: Vec<u32> = view.visible_hostiles(ActorId(1)).iter().map(|a| a.id.0).collect();
        assert_eq!(ids, vec![3, 2]);
    }
}
