//! Attack system - reloads, explicit attack orders and auto-defense.
//!
//! Runs in three passes, each in ascending actor id:
//!
//! 1. **Reload** - finish due reloads, then start reloads from reload orders.
//! 2. **Explicit attacks** - actors with an attack order and a ready weapon
//!    fire once. The order is consumed by the shot; it is dropped without a
//!    shot when the target is dead, missing or no longer attackable.
//! 3. **Auto-defense** - idle actors that did not fire this tick take one
//!    opportunistic shot at the nearest attackable hostile (ties go to the
//!    lower id).
//!
//! Lethal hits push the victim onto [`DeathSignals`] for cleanup later in the
//! tick. An actor killed earlier in a pass is skipped for the rest of it.

use crate::components::*;
use crate::config::{CombatConfig, CombatRng, SimTick};
use crate::events::{CombatEvent, DeathSignals, EventLog};
use crate::modifiers::{StatChannel, StatModifiers};
use crate::resolver::{apply_damage, can_attack, resolve_attack, Combatant};
use crate::spatial::OccupancyGrid;
use crate::systems::modifiers::apply_suppression;
use crate::terrain::{MapResource, TileMap};
use bevy_ecs::prelude::*;
use rand_chacha::ChaCha8Rng;
use std::collections::{BTreeMap, BTreeSet};

type AttackQuery<'w, 's> = Query<
    'w,
    's,
    (
        Entity,
        &'static ActorId,
        &'static ActorKind,
        &'static mut LifeState,
        &'static Position,
        &'static mut Health,
        &'static BaseStats,
        &'static mut StatModifiers,
        &'static mut Weapon,
        &'static mut PendingOrder,
    ),
>;

/// Shared state for resolving shots within one tick.
struct AttackContext<'a> {
    now: u64,
    config: &'a CombatConfig,
    map: &'a TileMap,
    rng: &'a mut ChaCha8Rng,
    events: &'a mut EventLog,
    deaths: &'a mut DeathSignals,
}

fn combatant(query: &AttackQuery, entity: Entity) -> Option<Combatant> {
    let (_, id, kind, state, pos, _, stats, mods, _, _) = query.get(entity).ok()?;
    Some(Combatant {
        id: *id,
        kind: *kind,
        alive: state.is_alive(),
        tile: pos.tile,
        accuracy: stats.effective(StatChannel::Accuracy, mods),
        damage_multiplier: stats.effective(StatChannel::Damage, mods),
    })
}

fn drop_order(query: &mut AttackQuery, entity: Entity) {
    if let Ok((.., mut order)) = query.get_mut(entity) {
        order.clear();
    }
}

/// Resolve one shot and apply its consequences.
fn fire(
    ctx: &mut AttackContext,
    query: &mut AttackQuery,
    attacker: (Entity, Combatant),
    target: (Entity, Combatant),
    auto_defense: bool,
) {
    let (attacker_entity, attacker) = attacker;
    let (target_entity, target) = target;

    let result = {
        let Ok((.., mut weapon, _)) = query.get_mut(attacker_entity) else {
            return;
        };
        let result = resolve_attack(
            &attacker,
            &target,
            &weapon,
            ctx.map,
            ctx.config.base_hit_chance,
            &mut *ctx.rng,
        );
        weapon.consume_round(ctx.now);
        result
    };

    let mut died = false;
    if let Ok((_, _, _, mut state, _, mut health, _, mut mods, _, _)) = query.get_mut(target_entity) {
        if result.hit {
            died = apply_damage(&mut health, &mut state, result.damage);
        }
        if let Some(suppression) = &ctx.config.suppression {
            if state.is_alive() {
                apply_suppression(&mut mods, suppression, ctx.now);
            }
        }
    }

    tracing::debug!(
        tick = ctx.now,
        attacker = %attacker.id,
        target = %target.id,
        hit = result.hit,
        damage = result.damage,
        auto_defense,
        "attack resolved"
    );
    ctx.events.push(CombatEvent::AttackResolved {
        tick: ctx.now,
        attacker: result.attacker,
        target: result.target,
        weapon: result.weapon,
        hit: result.hit,
        damage: result.damage,
        auto_defense,
    });

    if died {
        tracing::debug!(tick = ctx.now, actor = %target.id, killer = %attacker.id, "actor died");
        ctx.events.push(CombatEvent::ActorDied {
            tick: ctx.now,
            actor: target.id,
            killer: Some(attacker.id),
        });
        ctx.deaths.0.push(target.id);
    }
}

/// System that processes reloads, attack orders and auto-defense.
///
/// ## Data Access
/// - Reads: SimTick, CombatConfig, MapResource, OccupancyGrid, ActorId, ActorKind, Position, BaseStats
/// - Writes: CombatRng, EventLog, DeathSignals, LifeState, Health, StatModifiers, Weapon, PendingOrder
#[allow(clippy::too_many_arguments)]
pub fn attack_system(
    tick: Res<SimTick>,
    config: Res<CombatConfig>,
    map: Res<MapResource>,
    grid: Res<OccupancyGrid>,
    mut rng: ResMut<CombatRng>,
    mut events: ResMut<EventLog>,
    mut deaths: ResMut<DeathSignals>,
    mut query: AttackQuery,
) {
    let now = tick.0;
    let mut roster: Vec<(ActorId, Entity)> = query.iter().map(|(entity, id, ..)| (*id, entity)).collect();
    roster.sort_by_key(|(id, _)| *id);
    let index: BTreeMap<ActorId, Entity> = roster.iter().copied().collect();

    // Pass 1: reloads.
    for &(id, entity) in &roster {
        let Ok((.., state, _, _, _, _, mut weapon, mut order)) = query.get_mut(entity) else {
            continue;
        };
        if !state.is_alive() {
            continue;
        }
        if let Some(rounds) = weapon.complete_reload(now) {
            tracing::debug!(tick = now, actor = %id, rounds, "reload completed");
            events.push(CombatEvent::ReloadCompleted { tick: now, actor: id, rounds });
        }
        if matches!(order.0, Some(Order::Reload)) {
            order.clear();
            if !weapon.is_reloading() && !weapon.is_full() {
                let ready_at = weapon.start_reload(now);
                tracing::debug!(tick = now, actor = %id, ready_at, "reload started");
                events.push(CombatEvent::ReloadStarted {
                    tick: now,
                    actor: id,
                    ready_at,
                });
            }
        }
    }

    let mut ctx = AttackContext {
        now,
        config: &config,
        map: map.map(),
        rng: &mut rng.0,
        events: &mut events,
        deaths: &mut deaths,
    };
    let mut fired: BTreeSet<ActorId> = BTreeSet::new();

    // Pass 2: explicit attack orders.
    for &(id, entity) in &roster {
        let target_id = match query.get(entity) {
            Ok((.., state, _, _, _, _, weapon, order)) if state.is_alive() => match &order.0 {
                Some(Order::Attack { target }) if weapon.is_ready(now) => *target,
                _ => continue,
            },
            _ => continue,
        };

        let Some(attacker) = combatant(&query, entity) else {
            continue;
        };
        let target = index
            .get(&target_id)
            .and_then(|&target_entity| combatant(&query, target_entity).map(|c| (target_entity, c)));
        let Some((target_entity, target)) = target else {
            tracing::warn!(tick = now, actor = %id, target = %target_id, "attack order names a missing actor");
            drop_order(&mut query, entity);
            continue;
        };
        if !target.alive {
            tracing::debug!(tick = now, actor = %id, target = %target_id, "attack order dropped, target down");
            drop_order(&mut query, entity);
            continue;
        }

        let attackable = match query.get(entity) {
            Ok((.., weapon, _)) => can_attack(&attacker, &target, weapon, ctx.map),
            Err(_) => false,
        };
        if !attackable {
            tracing::debug!(tick = now, actor = %id, target = %target_id, "attack order dropped, target out of reach");
            drop_order(&mut query, entity);
            continue;
        }

        fire(&mut ctx, &mut query, (entity, attacker), (target_entity, target), false);
        drop_order(&mut query, entity);
        fired.insert(id);
    }

    // Pass 3: auto-defense.
    if !ctx.config.auto_defend {
        return;
    }
    for &(id, entity) in &roster {
        if fired.contains(&id) {
            continue;
        }
        let range = match query.get(entity) {
            Ok((.., state, _, _, _, _, weapon, order)) if state.is_alive() && order.is_idle() && weapon.is_ready(now) => {
                weapon.range
            }
            _ => continue,
        };
        let Some(attacker) = combatant(&query, entity) else {
            continue;
        };

        let candidates = grid.query_hostiles(attacker.tile, range, attacker.kind);
        let choice = candidates.iter().find_map(|entry| {
            let target = combatant(&query, entry.entity)?;
            let (.., weapon, _) = query.get(entity).ok()?;
            can_attack(&attacker, &target, weapon, ctx.map).then_some((entry.entity, target))
        });

        if let Some(target) = choice {
            fire(&mut ctx, &mut query, (entity, attacker), target, true);
            fired.insert(id);
        }
    }
}

/// System that releases the pending order and movement claim of every actor
/// killed this tick.
pub fn death_cleanup_system(
    mut deaths: ResMut<DeathSignals>,
    mut query: Query<(&ActorId, &LifeState, &mut PendingOrder, &mut MoveClaim)>,
) {
    if deaths.0.is_empty() {
        return;
    }
    let dead: BTreeSet<ActorId> = deaths.0.drain(..).collect();
    for (id, state, mut order, mut claim) in query.iter_mut() {
        if !dead.contains(id) {
            continue;
        }
        debug_assert!(state.is_dead());
        if order.0.is_some() {
            tracing::trace!(actor = %id, "releasing order of dead actor");
            order.clear();
        }
        claim.0 = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mission::{ActorSpec, WeaponSpec};
    use crate::modifiers::StatModifier;
    use crate::testing::{config, spawn, step, world_with};
    use crate::terrain::Tile;

    fn schedule() -> Schedule {
        let mut schedule = Schedule::default();
        schedule.add_systems(
            (
                crate::spatial::occupancy_update_system,
                attack_system,
                death_cleanup_system,
            )
                .chain(),
        );
        schedule
    }

    fn attack(world: &mut World, entity: Entity, target: u32) {
        world.get_mut::<PendingOrder>(entity).unwrap().0 = Some(Order::Attack { target: ActorId(target) });
    }

    #[test]
    fn test_explicit_attack_hits_and_consumes_order() {
        let mut world = world_with(TileMap::open("open", 10, 3), config(1.0, false));
        let a = spawn(&mut world, ActorSpec::new(1, ActorKind::Crew, (0, 0)));
        let t = spawn(&mut world, ActorSpec::new(2, ActorKind::Enemy, (5, 0)));
        attack(&mut world, a, 2);

        let events = step(&mut world, &mut schedule());
        assert_eq!(world.get::<Health>(t).unwrap().current, 75);
        assert_eq!(world.get::<Weapon>(a).unwrap().rounds, 5);
        assert!(world.get::<PendingOrder>(a).unwrap().is_idle());
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            CombatEvent::AttackResolved {
                hit: true,
                damage: 25,
                auto_defense: false,
                ..
            }
        ));
    }

    #[test]
    fn test_lethal_hit_signals_death_once() {
        let mut world = world_with(TileMap::open("open", 10, 3), config(1.0, false));
        let a = spawn(&mut world, ActorSpec::new(1, ActorKind::Crew, (0, 0)));
        let b = spawn(&mut world, ActorSpec::new(3, ActorKind::Crew, (0, 1)));
        let t = spawn(&mut world, ActorSpec::new(2, ActorKind::Enemy, (5, 0)).with_health(20));
        attack(&mut world, a, 2);
        attack(&mut world, b, 2);
        world.get_mut::<PendingOrder>(t).unwrap().0 = Some(Order::Attack { target: ActorId(1) });

        let events = step(&mut world, &mut schedule());
        assert_eq!(world.get::<Health>(t).unwrap().current, 0);
        assert_eq!(*world.get::<LifeState>(t).unwrap(), LifeState::Dead);
        let deaths = events.iter().filter(|e| matches!(e, CombatEvent::ActorDied { .. })).count();
        assert_eq!(deaths, 1);

        // Actor 2 died before its turn and never fired; actor 3 dropped its order.
        assert_eq!(world.get::<Health>(a).unwrap().current, 100);
        assert!(world.get::<PendingOrder>(b).unwrap().is_idle());
        assert_eq!(world.get::<Weapon>(b).unwrap().rounds, 6);
        assert!(world.get::<PendingOrder>(t).unwrap().is_idle());
        assert!(world.resource::<DeathSignals>().0.is_empty());
    }

    #[test]
    fn test_weapon_not_ready_keeps_order() {
        let mut world = world_with(TileMap::open("open", 10, 3), config(0.0, false));
        let a = spawn(
            &mut world,
            ActorSpec::new(1, ActorKind::Crew, (0, 0)).with_weapon(WeaponSpec {
                cooldown_ticks: 3,
                ..WeaponSpec::default()
            }),
        );
        spawn(&mut world, ActorSpec::new(2, ActorKind::Enemy, (5, 0)));
        let mut schedule = schedule();

        attack(&mut world, a, 2);
        step(&mut world, &mut schedule);
        assert_eq!(world.get::<Weapon>(a).unwrap().cooldown_until, 4);

        attack(&mut world, a, 2);
        let events = step(&mut world, &mut schedule);
        assert!(events.is_empty());
        assert!(!world.get::<PendingOrder>(a).unwrap().is_idle());
    }

    #[test]
    fn test_out_of_reach_order_dropped_without_shot() {
        let map = TileMap::from_rows("wall", &["..#...", "......"]).unwrap();
        let mut world = world_with(map, config(1.0, false));
        let a = spawn(&mut world, ActorSpec::new(1, ActorKind::Crew, (0, 0)));
        spawn(&mut world, ActorSpec::new(2, ActorKind::Enemy, (5, 0)));
        attack(&mut world, a, 2);

        let events = step(&mut world, &mut schedule());
        assert!(events.is_empty());
        assert!(world.get::<PendingOrder>(a).unwrap().is_idle());
        assert_eq!(world.get::<Weapon>(a).unwrap().rounds, 6);
    }

    #[test]
    fn test_auto_defense_targets_nearest_lowest_id() {
        let mut world = world_with(TileMap::open("open", 10, 10), config(1.0, true));
        spawn(&mut world, ActorSpec::new(1, ActorKind::Crew, (5, 5)));
        let near_high = spawn(&mut world, ActorSpec::new(7, ActorKind::Enemy, (5, 8)).with_weapon(WeaponSpec {
            range: 0.5,
            ..WeaponSpec::default()
        }));
        let near_low = spawn(&mut world, ActorSpec::new(4, ActorKind::Enemy, (8, 5)).with_weapon(WeaponSpec {
            range: 0.5,
            ..WeaponSpec::default()
        }));

        let events = step(&mut world, &mut schedule());
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            CombatEvent::AttackResolved {
                target: ActorId(4),
                auto_defense: true,
                ..
            }
        ));
        assert_eq!(world.get::<Health>(near_low).unwrap().current, 75);
        assert_eq!(world.get::<Health>(near_high).unwrap().current, 100);
    }

    #[test]
    fn test_explicit_shot_replaces_auto_defense() {
        let mut world = world_with(TileMap::open("open", 10, 3), config(1.0, true));
        let a = spawn(
            &mut world,
            ActorSpec::new(1, ActorKind::Crew, (0, 0)).with_weapon(WeaponSpec {
                cooldown_ticks: 0,
                ..WeaponSpec::default()
            }),
        );
        let harmless = WeaponSpec {
            range: 0.5,
            ..WeaponSpec::default()
        };
        let far = spawn(&mut world, ActorSpec::new(2, ActorKind::Enemy, (5, 0)).with_weapon(harmless.clone()));
        let near = spawn(&mut world, ActorSpec::new(3, ActorKind::Enemy, (2, 0)).with_weapon(harmless));
        attack(&mut world, a, 2);

        let events = step(&mut world, &mut schedule());
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            CombatEvent::AttackResolved {
                target: ActorId(2),
                auto_defense: false,
                ..
            }
        ));
        // Still ready after the shot, yet no second round at the closer hostile.
        assert!(world.get::<Weapon>(a).unwrap().is_ready(1));
        assert_eq!(world.get::<Weapon>(a).unwrap().rounds, 5);
        assert_eq!(world.get::<Health>(far).unwrap().current, 75);
        assert_eq!(world.get::<Health>(near).unwrap().current, 100);
    }

    #[test]
    fn test_busy_actor_does_not_auto_defend() {
        let mut world = world_with(TileMap::open("open", 10, 3), config(1.0, true));
        let a = spawn(&mut world, ActorSpec::new(1, ActorKind::Crew, (0, 0)));
        spawn(&mut world, ActorSpec::new(2, ActorKind::Neutral, (3, 0)));
        let t = spawn(&mut world, ActorSpec::new(3, ActorKind::Enemy, (5, 0)).with_weapon(WeaponSpec {
            range: 1.0,
            ..WeaponSpec::default()
        }));
        world.get_mut::<PendingOrder>(a).unwrap().0 = Some(Order::Interact { target: ActorId(2) });

        let events = step(&mut world, &mut schedule());
        assert!(events.is_empty());
        assert_eq!(world.get::<Health>(t).unwrap().current, 100);
    }

    #[test]
    fn test_reload_blocks_then_refills() {
        let mut world = world_with(TileMap::open("open", 10, 3), config(1.0, false));
        let a = spawn(&mut world, ActorSpec::new(1, ActorKind::Crew, (0, 0)));
        spawn(&mut world, ActorSpec::new(2, ActorKind::Enemy, (5, 0)).with_max_health(1000));
        let mut schedule = schedule();

        attack(&mut world, a, 2);
        step(&mut world, &mut schedule);
        world.get_mut::<PendingOrder>(a).unwrap().0 = Some(Order::Reload);
        let events = step(&mut world, &mut schedule);
        assert!(matches!(events[0], CombatEvent::ReloadStarted { ready_at: 5, .. }));

        // Ticks 3 and 4: attack orders wait on the reload.
        for _ in 0..2 {
            attack(&mut world, a, 2);
            let events = step(&mut world, &mut schedule);
            assert!(events.is_empty());
        }

        let events = step(&mut world, &mut schedule);
        assert!(matches!(events[0], CombatEvent::ReloadCompleted { rounds: 6, .. }));
        assert!(matches!(events[1], CombatEvent::AttackResolved { .. }));
        assert_eq!(world.get::<Weapon>(a).unwrap().rounds, 5);
    }

    #[test]
    fn test_accuracy_modifier_changes_outcome() {
        let mut world = world_with(TileMap::open("open", 10, 3), config(1.0, false));
        let a = spawn(&mut world, ActorSpec::new(1, ActorKind::Crew, (0, 0)));
        let t = spawn(&mut world, ActorSpec::new(2, ActorKind::Enemy, (5, 0)));
        world
            .get_mut::<StatModifiers>(a)
            .unwrap()
            .add(StatModifier::factor("blind", StatChannel::Accuracy, 0.0));
        attack(&mut world, a, 2);

        step(&mut world, &mut schedule());
        assert_eq!(world.get::<Health>(t).unwrap().current, 100);
        assert_eq!(world.get::<Weapon>(a).unwrap().rounds, 5);
    }

    #[test]
    fn test_suppression_applied_to_target() {
        let mut cfg = config(0.0, false);
        cfg.suppression = Some(Default::default());
        let mut world = world_with(TileMap::open("open", 10, 3), cfg);
        let a = spawn(&mut world, ActorSpec::new(1, ActorKind::Crew, (0, 0)));
        let t = spawn(&mut world, ActorSpec::new(2, ActorKind::Enemy, (5, 0)));
        attack(&mut world, a, 2);

        step(&mut world, &mut schedule());
        let mods = world.get::<StatModifiers>(t).unwrap();
        assert!(mods.has_source(crate::systems::modifiers::SUPPRESSED));
        assert_eq!(world.get::<Position>(t).unwrap().tile, Tile::new(5, 0));
    }
}
