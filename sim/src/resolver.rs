//! Attack resolution.
//!
//! Stateless: callers pass in everything the resolver needs, including the
//! random source. The resolver draws at most one sample per attack and draws
//! nothing for an attack that is not allowed, so the RNG stream only advances
//! on real shots.

use crate::components::{ActorId, ActorKind, Health, LifeState, Weapon};
use crate::terrain::{Tile, TileMap};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Attack-relevant view of one actor, with modifiers already applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Combatant {
    pub id: ActorId,
    pub kind: ActorKind,
    pub alive: bool,
    pub tile: Tile,
    /// Effective accuracy (multiplier on the base hit chance).
    pub accuracy: f32,
    /// Effective damage multiplier.
    pub damage_multiplier: f32,
}

/// Outcome of one attack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttackResult {
    pub attacker: ActorId,
    pub target: ActorId,
    pub weapon: String,
    pub hit: bool,
    pub damage: i32,
}

impl AttackResult {
    fn miss(attacker: &Combatant, target: &Combatant, weapon: &Weapon) -> Self {
        Self {
            attacker: attacker.id,
            target: target.id,
            weapon: weapon.name.clone(),
            hit: false,
            damage: 0,
        }
    }
}

/// Tile-center distance is within weapon range.
pub fn in_range(attacker: Tile, target: Tile, weapon: &Weapon) -> bool {
    attacker.distance_to(target) <= weapon.range
}

/// Both alive, distinct, within range and with clear line of sight.
///
/// Zero-range weapons and self-targeting are never allowed.
pub fn can_attack(attacker: &Combatant, target: &Combatant, weapon: &Weapon, map: &TileMap) -> bool {
    if attacker.id == target.id || weapon.range <= 0.0 {
        return false;
    }
    if !attacker.alive || !target.alive {
        return false;
    }
    in_range(attacker.tile, target.tile, weapon) && map.line_of_sight(attacker.tile, target.tile)
}

/// Probability that a shot with the given effective accuracy lands.
pub fn hit_chance(base_hit_chance: f32, accuracy: f32) -> f32 {
    (base_hit_chance * accuracy).clamp(0.0, 1.0)
}

/// Damage a landed shot deals.
pub fn hit_damage(weapon: &Weapon, damage_multiplier: f32) -> i32 {
    (weapon.damage as f32 * damage_multiplier).round().max(0.0) as i32
}

/// Resolve one attack. Draws exactly one uniform sample when the attack is
/// allowed and none otherwise.
pub fn resolve_attack<R: Rng + ?Sized>(
    attacker: &Combatant,
    target: &Combatant,
    weapon: &Weapon,
    map: &TileMap,
    base_hit_chance: f32,
    rng: &mut R,
) -> AttackResult {
    if !can_attack(attacker, target, weapon, map) {
        return AttackResult::miss(attacker, target, weapon);
    }

    let roll: f32 = rng.gen();
    let hit = roll < hit_chance(base_hit_chance, attacker.accuracy);
    AttackResult {
        attacker: attacker.id,
        target: target.id,
        weapon: weapon.name.clone(),
        hit,
        damage: if hit { hit_damage(weapon, attacker.damage_multiplier) } else { 0 },
    }
}

/// Subtract `amount` from a living target's health.
///
/// Returns true only on the call that takes health to zero, at which point the
/// target becomes `Dead`. Targets that are not alive are left untouched.
pub fn apply_damage(health: &mut Health, state: &mut LifeState, amount: i32) -> bool {
    if !state.is_alive() {
        return false;
    }
    health.current = (health.current - amount.max(0)).max(0);
    if health.current == 0 {
        *state = LifeState::Dead;
        true
    } else {
        false
    }
}
