//! Public API for the simulation.
//!
//! [`CombatState`] is the root of one mission: it owns the ECS world, the
//! per-tick schedule, registered decision hooks and event sinks, and is the
//! only way to issue orders or modifiers from outside.
//!
//! ## Tick
//!
//! Each call to [`CombatState::tick`] advances exactly one fixed time slice:
//!
//! 1. Decision hooks run in registration order and queue commands, which are
//!    validated like any other order.
//! 2. Ability and interact orders that the hooks have now seen are consumed.
//! 3. The system chain runs (see [`crate::systems`]).
//! 4. Events raised during the tick are forwarded to every sink and returned
//!    in the [`TickReport`].
//!
//! Once an outcome is reached the mission is over: orders are rejected with
//! [`OrderRejection::MissionOver`] and further ticks do not advance state.

use crate::components::*;
use crate::config::{CombatConfig, CombatRng, SimTick};
use crate::error::{OrderRejection, SetupError, SnapshotError};
use crate::events::{CombatEvent, DeathSignals, EventLog, EventSink};
use crate::hooks::{DecisionContext, DecisionHook, HookCommand, OrderRequest};
use crate::mission::MissionSetup;
use crate::modifiers::{StatModifier, StatModifiers};
use crate::objectives::{MissionOutcome, MissionStatus, Objective, ObjectiveReport, ObjectiveSet, ObjectiveSpec};
use crate::spatial::{occupancy_update_system, OccupancyGrid};
use crate::systems::*;
use crate::terrain::{MapResource, Tile, TileMap};
use crate::world::{ActorData, ActorView, BattleView, CombatSnapshot, SNAPSHOT_FORMAT_VERSION};
use bevy_ecs::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

/// Whether the mission goes on after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickStatus {
    Continue,
    Ended(MissionOutcome),
}

/// Everything that happened during one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub tick: u64,
    pub status: TickStatus,
    pub events: Vec<CombatEvent>,
    /// Hook commands refused during the hook phase.
    pub rejected_orders: Vec<(ActorId, OrderRejection)>,
}

impl TickReport {
    pub fn outcome(&self) -> Option<MissionOutcome> {
        match self.status {
            TickStatus::Ended(outcome) => Some(outcome),
            TickStatus::Continue => None,
        }
    }

    pub fn is_ended(&self) -> bool {
        self.outcome().is_some()
    }
}

/// One running mission.
pub struct CombatState {
    world: World,
    schedule: Schedule,
    /// Visibility only; used after setup and restore.
    refresh: Schedule,
    index: BTreeMap<ActorId, Entity>,
    hooks: Vec<Box<dyn DecisionHook>>,
    sinks: Vec<Box<dyn EventSink>>,
}

impl CombatState {
    /// Validate the setup and build the mission at tick 0.
    pub fn new(setup: &MissionSetup) -> Result<Self, SetupError> {
        Self::with_objectives(setup, Vec::new())
    }

    /// Like [`CombatState::new`], with extra objectives driven by custom
    /// rules appended after the ones in the setup.
    pub fn with_objectives(setup: &MissionSetup, extra: Vec<Objective>) -> Result<Self, SetupError> {
        let map = setup.build_map()?;
        let mut objectives: Vec<Objective> = setup.objectives.iter().map(ObjectiveSpec::build).collect();
        objectives.extend(extra);
        let objectives = ObjectiveSet::new(objectives)?;

        let mut world = World::new();

        // Core resources
        world.insert_resource(SimTick(0));
        world.insert_resource(setup.config.clone());
        world.insert_resource(MapResource::new(map));
        world.insert_resource(CombatRng::from_seed(setup.seed));
        world.insert_resource(EventLog::default());
        world.insert_resource(DeathSignals::default());
        world.insert_resource(OccupancyGrid::new());
        world.insert_resource(FogOfWar::default());
        world.insert_resource(objectives);
        world.insert_resource(MissionStatus::default());

        let mut index = BTreeMap::new();
        for spec in &setup.roster {
            let entity = world.spawn(spec.bundle()).id();
            index.insert(spec.id, entity);
        }

        // One tick, strictly sequential.
        let mut schedule = Schedule::default();
        schedule.add_systems(
            (
                modifier_expiry_system,
                occupancy_update_system,
                attack_system,
                death_cleanup_system,
                collision_resolution_system,
                movement_system,
                visibility_system,
                objective_system,
            )
                .chain(),
        );

        let mut refresh = Schedule::default();
        refresh.add_systems(visibility_system);
        refresh.run(&mut world);

        tracing::debug!(
            map = %setup.map.id,
            actors = index.len(),
            objectives = setup.objectives.len(),
            seed = setup.seed,
            "mission ready"
        );

        Ok(Self {
            world,
            schedule,
            refresh,
            index,
            hooks: Vec::new(),
            sinks: Vec::new(),
        })
    }

    /// Register a decision hook. Hooks run in registration order.
    pub fn add_hook(&mut self, hook: impl DecisionHook + 'static) {
        self.hooks.push(Box::new(hook));
    }

    /// Register an event sink. Sinks see every event, in order, once.
    pub fn add_event_sink(&mut self, sink: impl EventSink + 'static) {
        self.sinks.push(Box::new(sink));
    }

    // ========================================================================
    // TICK
    // ========================================================================

    /// Advance the mission by one tick.
    ///
    /// Calling this after the mission has ended is an invariant violation:
    /// it panics with `strict_invariants`, otherwise it is logged and the
    /// state is left untouched.
    pub fn tick(&mut self) -> TickReport {
        let current = self.current_tick();
        if let Some(outcome) = self.outcome() {
            if self.config().strict_invariants {
                panic!("tick() called after the mission ended in {outcome} at tick {current}");
            }
            tracing::warn!(tick = current, %outcome, "tick after mission end ignored");
            return TickReport {
                tick: current,
                status: TickStatus::Ended(outcome),
                events: Vec::new(),
                rejected_orders: Vec::new(),
            };
        }

        self.world.resource_mut::<SimTick>().increment();
        let now = self.current_tick();
        tracing::trace!(tick = now, "tick start");

        let handed_over = self.handed_over_orders();
        let (reissued, rejected_orders) = self.run_hooks();
        self.consume_handed_over(handed_over, &reissued);

        self.schedule.run(&mut self.world);

        let events = self.world.resource_mut::<EventLog>().drain();
        for event in &events {
            for sink in self.sinks.iter_mut() {
                sink.on_event(event);
            }
        }

        let status = match self.outcome() {
            Some(outcome) => TickStatus::Ended(outcome),
            None => TickStatus::Continue,
        };
        tracing::trace!(tick = now, events = events.len(), "tick end");

        TickReport {
            tick: now,
            status,
            events,
            rejected_orders,
        }
    }

    /// Actors holding an ability or interact order before the hook phase.
    fn handed_over_orders(&mut self) -> Vec<(ActorId, Entity)> {
        let mut query = self.world.query::<(Entity, &ActorId, &PendingOrder)>();
        let mut actors: Vec<(ActorId, Entity)> = query
            .iter(&self.world)
            .filter(|(.., pending)| matches!(pending.0, Some(Order::Ability { .. } | Order::Interact { .. })))
            .map(|(entity, id, _)| (*id, entity))
            .collect();
        actors.sort_by_key(|(id, _)| *id);
        actors
    }

    /// Clear handed-over orders unless a hook issued a new order for the
    /// same actor.
    fn consume_handed_over(&mut self, actors: Vec<(ActorId, Entity)>, reissued: &BTreeSet<ActorId>) {
        for (id, entity) in actors {
            if reissued.contains(&id) {
                continue;
            }
            if let Some(mut pending) = self.world.get_mut::<PendingOrder>(entity) {
                pending.clear();
            }
        }
    }

    /// Run every hook against a fresh view. Returns the actors that got a new
    /// order and the rejected commands.
    fn run_hooks(&mut self) -> (BTreeSet<ActorId>, Vec<(ActorId, OrderRejection)>) {
        let mut reissued = BTreeSet::new();
        let mut rejected = Vec::new();
        if self.hooks.is_empty() {
            return (reissued, rejected);
        }

        let mut hooks = std::mem::take(&mut self.hooks);
        for hook in hooks.iter_mut() {
            let view = self.view();
            let mut ctx = DecisionContext::new(&view);
            hook.decide(&mut ctx);
            for command in ctx.into_commands() {
                let actor = command.actor();
                let is_order = matches!(command, HookCommand::Order(_));
                match self.apply_command(command) {
                    Ok(()) if is_order => {
                        reissued.insert(actor);
                    }
                    Ok(()) => {}
                    Err(reason) => rejected.push((actor, reason)),
                }
            }
        }
        self.hooks = hooks;
        (reissued, rejected)
    }

    fn apply_command(&mut self, command: HookCommand) -> Result<(), OrderRejection> {
        match command {
            HookCommand::Order(request) => self.submit(request),
            HookCommand::ApplyModifier { actor, modifier } => self.apply_modifier(actor, modifier),
            HookCommand::RemoveModifiers { actor, source } => self.remove_modifiers(actor, &source).map(|_| ()),
        }
    }

    // ========================================================================
    // ORDERS
    // ========================================================================

    /// Dispatch a request to the matching `issue_*` entry point.
    pub fn submit(&mut self, request: OrderRequest) -> Result<(), OrderRejection> {
        match request {
            OrderRequest::Move { actor, tile } => self.issue_move(actor, tile),
            OrderRequest::MovePath { actor, path } => self.issue_move_path(actor, path),
            OrderRequest::Attack { actor, target } => self.issue_attack(actor, target),
            OrderRequest::Ability { actor, ability, tile } => self.issue_ability(actor, ability, tile),
            OrderRequest::Interact { actor, target } => self.issue_interact(actor, target),
            OrderRequest::Reload { actor } => self.issue_reload(actor),
        }
    }

    /// Walk to `tile` along the shortest 4-connected path.
    pub fn issue_move(&mut self, actor: ActorId, tile: Tile) -> Result<(), OrderRejection> {
        let checked = self.check_move(actor, tile);
        self.accept(actor, checked)
    }

    /// Walk a caller-supplied path of 4-adjacent walkable tiles.
    pub fn issue_move_path(&mut self, actor: ActorId, path: Vec<Tile>) -> Result<(), OrderRejection> {
        let checked = self.check_move_path(actor, path);
        self.accept(actor, checked)
    }

    pub fn issue_attack(&mut self, actor: ActorId, target: ActorId) -> Result<(), OrderRejection> {
        let checked = self.check_attack(actor, target);
        self.accept(actor, checked)
    }

    /// Queue an ability for the decision hooks to carry out next tick.
    pub fn issue_ability(
        &mut self,
        actor: ActorId,
        ability: impl Into<String>,
        tile: Tile,
    ) -> Result<(), OrderRejection> {
        let checked = self.check_ability(actor, ability.into(), tile);
        self.accept(actor, checked)
    }

    /// Queue an interaction with an adjacent actor for the decision hooks.
    pub fn issue_interact(&mut self, actor: ActorId, target: ActorId) -> Result<(), OrderRejection> {
        let checked = self.check_interact(actor, target);
        self.accept(actor, checked)
    }

    pub fn issue_reload(&mut self, actor: ActorId) -> Result<(), OrderRejection> {
        let checked = self.check_reload(actor);
        self.accept(actor, checked)
    }

    /// Queue a validated order, superseding the pending one and releasing any
    /// movement claim. Rejections leave the state untouched.
    fn accept(
        &mut self,
        actor: ActorId,
        checked: Result<(Entity, Order), OrderRejection>,
    ) -> Result<(), OrderRejection> {
        let tick = self.current_tick();
        let (entity, order) = match checked {
            Ok(accepted) => accepted,
            Err(reason) => {
                tracing::debug!(tick, actor = %actor, code = reason.code(), %reason, "order rejected");
                return Err(reason);
            }
        };
        tracing::debug!(tick, actor = %actor, order = order.kind(), "order accepted");
        if let Some(mut pending) = self.world.get_mut::<PendingOrder>(entity) {
            pending.0 = Some(order);
        }
        if let Some(mut claim) = self.world.get_mut::<MoveClaim>(entity) {
            claim.0 = None;
        }
        Ok(())
    }

    /// Entity of a living actor, while the mission runs.
    fn living(&self, actor: ActorId) -> Result<Entity, OrderRejection> {
        if self.is_over() {
            return Err(OrderRejection::MissionOver);
        }
        let entity = *self.index.get(&actor).ok_or(OrderRejection::UnknownActor(actor))?;
        match self.world.get::<LifeState>(entity) {
            Some(state) if state.is_alive() => Ok(entity),
            Some(_) => Err(OrderRejection::ActorNotAlive(actor)),
            None => Err(OrderRejection::UnknownActor(actor)),
        }
    }

    fn tile_of(&self, entity: Entity) -> Option<Tile> {
        self.world.get::<Position>(entity).map(|p| p.tile)
    }

    fn check_move(&self, actor: ActorId, tile: Tile) -> Result<(Entity, Order), OrderRejection> {
        let entity = self.living(actor)?;
        let from = self.tile_of(entity).ok_or(OrderRejection::UnknownActor(actor))?;
        let map = self.map();
        if !map.in_bounds(tile) {
            return Err(OrderRejection::OutOfBounds(tile));
        }
        if !map.is_walkable(tile) {
            return Err(OrderRejection::NotWalkable(tile));
        }
        if from == tile {
            return Err(OrderRejection::AlreadyAtDestination(tile));
        }
        let path = map.find_path(from, tile).ok_or(OrderRejection::Unreachable(tile))?;
        Ok((
            entity,
            Order::Move {
                path: path.into(),
                destination: tile,
            },
        ))
    }

    fn check_move_path(&self, actor: ActorId, path: Vec<Tile>) -> Result<(Entity, Order), OrderRejection> {
        let entity = self.living(actor)?;
        let from = self.tile_of(entity).ok_or(OrderRejection::UnknownActor(actor))?;
        let destination = *path.last().ok_or(OrderRejection::EmptyPath)?;
        let map = self.map();
        let mut prev = from;
        for (index, step) in path.iter().enumerate() {
            if !map.is_walkable(*step) || !prev.is_adjacent4(*step) {
                return Err(OrderRejection::InvalidPath { index });
            }
            prev = *step;
        }
        Ok((
            entity,
            Order::Move {
                path: path.into(),
                destination,
            },
        ))
    }

    fn check_attack(&self, actor: ActorId, target: ActorId) -> Result<(Entity, Order), OrderRejection> {
        let entity = self.living(actor)?;
        if target == actor {
            return Err(OrderRejection::SelfTarget(actor));
        }
        let target_entity = *self.index.get(&target).ok_or(OrderRejection::UnknownTarget(target))?;
        if !self.world.get::<LifeState>(target_entity).is_some_and(|s| s.is_alive()) {
            return Err(OrderRejection::TargetNotAlive(target));
        }

        let from = self.tile_of(entity).ok_or(OrderRejection::UnknownActor(actor))?;
        let to = self.tile_of(target_entity).ok_or(OrderRejection::UnknownTarget(target))?;
        let weapon = self.world.get::<Weapon>(entity).ok_or(OrderRejection::UnknownActor(actor))?;
        let distance = from.distance_to(to);
        if weapon.range <= 0.0 || distance > weapon.range {
            return Err(OrderRejection::OutOfRange {
                target,
                distance,
                range: weapon.range,
            });
        }
        if !self.map().line_of_sight(from, to) {
            return Err(OrderRejection::NoLineOfSight(target));
        }
        if weapon.rounds == 0 && !weapon.is_reloading() {
            return Err(OrderRejection::OutOfAmmo);
        }
        Ok((entity, Order::Attack { target }))
    }

    fn check_ability(&self, actor: ActorId, ability: String, tile: Tile) -> Result<(Entity, Order), OrderRejection> {
        let entity = self.living(actor)?;
        if ability.trim().is_empty() {
            return Err(OrderRejection::EmptyAbility);
        }
        if !self.map().in_bounds(tile) {
            return Err(OrderRejection::OutOfBounds(tile));
        }
        Ok((entity, Order::Ability { ability, tile }))
    }

    fn check_interact(&self, actor: ActorId, target: ActorId) -> Result<(Entity, Order), OrderRejection> {
        let entity = self.living(actor)?;
        if target == actor {
            return Err(OrderRejection::SelfTarget(actor));
        }
        let target_entity = *self.index.get(&target).ok_or(OrderRejection::UnknownTarget(target))?;
        let from = self.tile_of(entity).ok_or(OrderRejection::UnknownActor(actor))?;
        let to = self.tile_of(target_entity).ok_or(OrderRejection::UnknownTarget(target))?;
        if from.chebyshev(to) > 1 {
            return Err(OrderRejection::TargetTooFar(target));
        }
        Ok((entity, Order::Interact { target }))
    }

    fn check_reload(&self, actor: ActorId) -> Result<(Entity, Order), OrderRejection> {
        let entity = self.living(actor)?;
        let weapon = self.world.get::<Weapon>(entity).ok_or(OrderRejection::UnknownActor(actor))?;
        if weapon.is_reloading() {
            return Err(OrderRejection::AlreadyReloading);
        }
        if weapon.is_full() {
            return Err(OrderRejection::MagazineFull);
        }
        Ok((entity, Order::Reload))
    }

    // ========================================================================
    // MODIFIERS
    // ========================================================================

    /// Add a stat modifier to a living actor.
    pub fn apply_modifier(&mut self, actor: ActorId, modifier: StatModifier) -> Result<(), OrderRejection> {
        let entity = self.living(actor)?;
        tracing::debug!(
            tick = self.current_tick(),
            actor = %actor,
            source = %modifier.source,
            channel = ?modifier.channel,
            "modifier applied"
        );
        if let Some(mut modifiers) = self.world.get_mut::<StatModifiers>(entity) {
            modifiers.add(modifier);
        }
        Ok(())
    }

    /// Remove every modifier from `source`. Returns how many were removed.
    pub fn remove_modifiers(&mut self, actor: ActorId, source: &str) -> Result<usize, OrderRejection> {
        let entity = self.living(actor)?;
        let removed = self
            .world
            .get_mut::<StatModifiers>(entity)
            .map_or(0, |mut modifiers| modifiers.remove_by_source(source));
        tracing::debug!(tick = self.current_tick(), actor = %actor, source, removed, "modifiers removed");
        Ok(removed)
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    /// Ticks completed so far.
    pub fn current_tick(&self) -> u64 {
        self.world.resource::<SimTick>().0
    }

    pub fn outcome(&self) -> Option<MissionOutcome> {
        self.world.resource::<MissionStatus>().outcome
    }

    pub fn is_over(&self) -> bool {
        self.outcome().is_some()
    }

    pub fn config(&self) -> &CombatConfig {
        self.world.resource::<CombatConfig>()
    }

    pub fn map(&self) -> &TileMap {
        self.world.resource::<MapResource>().map()
    }

    pub fn fog(&self) -> &FogOfWar {
        self.world.resource::<FogOfWar>()
    }

    /// Actor ids in ascending order.
    pub fn actor_ids(&self) -> impl Iterator<Item = ActorId> + '_ {
        self.index.keys().copied()
    }

    pub fn actor(&mut self, id: ActorId) -> Option<ActorView> {
        let entity = *self.index.get(&id)?;
        let tick = self.current_tick();
        let mut query = self.world.query::<ActorData>();
        let item = query.get(&self.world, entity).ok()?;
        Some(ActorView::from_item(&item, tick))
    }

    /// Read-only picture of the whole battle.
    pub fn view(&mut self) -> BattleView {
        BattleView::from_world(&mut self.world)
    }

    /// Actors `id` currently sees, ascending.
    pub fn visible_to(&self, id: ActorId) -> Vec<ActorId> {
        self.index
            .get(&id)
            .and_then(|&entity| self.world.get::<Sight>(entity))
            .map(|sight| sight.visible.clone())
            .unwrap_or_default()
    }

    pub fn objectives(&mut self) -> Vec<ObjectiveReport> {
        let view = self.view();
        self.world
            .resource::<ObjectiveSet>()
            .iter()
            .map(|o| ObjectiveReport {
                id: o.id().to_string(),
                description: o.description().to_string(),
                primary: o.is_primary(),
                failure_condition: o.is_failure_condition(),
                status: o.status(),
                progress: o.progress_text(&view),
            })
            .collect()
    }

    /// Get the underlying ECS world (for advanced queries).
    pub fn world(&self) -> &World {
        &self.world
    }

    // ========================================================================
    // SNAPSHOT
    // ========================================================================

    pub fn snapshot(&mut self) -> CombatSnapshot {
        CombatSnapshot::from_world(&mut self.world)
    }

    pub fn snapshot_json(&mut self) -> Result<String, SnapshotError> {
        snapshot_to_json_string(&self.snapshot())
    }

    /// Rebuild a mission from its setup and a snapshot taken from it.
    ///
    /// Hooks and sinks are not part of the snapshot and must be registered
    /// again. Ticks after a restore match an uninterrupted run exactly.
    pub fn restore(setup: &MissionSetup, snapshot: &CombatSnapshot) -> Result<Self, SnapshotError> {
        Self::restore_with_objectives(setup, Vec::new(), snapshot)
    }

    pub fn restore_json(setup: &MissionSetup, json: &str) -> Result<Self, SnapshotError> {
        Self::restore(setup, &snapshot_from_json_string(json)?)
    }

    /// Restore a mission that was built with [`CombatState::with_objectives`].
    pub fn restore_with_objectives(
        setup: &MissionSetup,
        extra: Vec<Objective>,
        snapshot: &CombatSnapshot,
    ) -> Result<Self, SnapshotError> {
        if snapshot.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(SnapshotError::UnsupportedVersion {
                found: snapshot.format_version,
                expected: SNAPSHOT_FORMAT_VERSION,
            });
        }
        let mut state = Self::with_objectives(setup, extra)?;
        if state.map().id() != snapshot.map_id {
            return Err(SnapshotError::MapMismatch {
                expected: state.map().id().to_string(),
                found: snapshot.map_id.clone(),
            });
        }

        let mut seen = BTreeSet::new();
        for record in &snapshot.actors {
            if !seen.insert(record.id) {
                return Err(SnapshotError::DuplicateActor(record.id));
            }
            let entity = *state.index.get(&record.id).ok_or(SnapshotError::UnknownActor(record.id))?;
            state.world.entity_mut(entity).insert((
                record.kind,
                record.state,
                record.position,
                record.health,
                record.stats,
                record.modifiers.clone(),
                record.weapon.clone(),
                PendingOrder(record.order.clone()),
                MoveClaim(record.claim),
                Sight::default(),
            ));
        }
        if let Some(missing) = state.index.keys().find(|id| !seen.contains(*id)) {
            return Err(SnapshotError::MissingActor(*missing));
        }

        state.world.resource_mut::<ObjectiveSet>().restore_statuses(&snapshot.objectives)?;
        state.world.insert_resource(SimTick(snapshot.tick));
        state.world.insert_resource(snapshot.rng.clone());
        state.world.insert_resource(MissionStatus {
            outcome: snapshot.outcome,
        });
        state
            .world
            .resource_mut::<FogOfWar>()
            .restore_explored(snapshot.explored.clone());
        state.refresh.run(&mut state.world);

        tracing::debug!(tick = snapshot.tick, actors = snapshot.actors.len(), "mission restored");
        Ok(state)
    }
}
