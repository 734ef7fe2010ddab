//! ECS Components for the tactical combat core.
//!
//! Components are pure data containers attached to actor entities.
//! All game logic lives in systems that query these components.

use crate::modifiers::{StatChannel, StatModifiers};
use crate::terrain::Tile;
use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

// ============================================================================
// IDENTITY COMPONENTS
// ============================================================================

/// Stable actor identifier. Ordering on ids drives every tie-break in the core.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActorId(pub u32);

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Side an actor fights for.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ActorKind {
    Crew,
    Enemy,
    Neutral,
}

impl ActorKind {
    /// Crew and Enemy are mutually hostile. Neutrals are nobody's target.
    pub fn is_hostile_to(&self, other: ActorKind) -> bool {
        matches!(
            (self, other),
            (ActorKind::Crew, ActorKind::Enemy) | (ActorKind::Enemy, ActorKind::Crew)
        )
    }
}

/// Life-cycle state. `Dead` is terminal.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LifeState {
    #[default]
    Alive,
    Dead,
    /// Out of the fight but not killed. Never acts and is never targeted.
    Incapacitated,
}

impl LifeState {
    pub fn is_alive(&self) -> bool {
        matches!(self, LifeState::Alive)
    }

    pub fn is_dead(&self) -> bool {
        matches!(self, LifeState::Dead)
    }
}

// ============================================================================
// SPATIAL COMPONENTS
// ============================================================================

/// Grid position. `tile` is the tile the actor occupies; `x`/`y` is the
/// continuous position, which only differs from the tile center while the
/// actor is between tiles.
#[derive(Component, Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub tile: Tile,
}

impl Position {
    pub fn at(tile: Tile) -> Self {
        Self {
            x: tile.x as f32,
            y: tile.y as f32,
            tile,
        }
    }

    pub fn distance_to_point(&self, x: f32, y: f32) -> f32 {
        let dx = self.x - x;
        let dy = self.y - y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Snap onto a tile center.
    pub fn snap(&mut self, tile: Tile) {
        *self = Self::at(tile);
    }
}

/// Tile an actor has claimed as its next step. Held until the actor snaps onto
/// it, dies, or has its order superseded.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MoveClaim(pub Option<Tile>);

/// Actors currently visible to this actor, ascending by id.
#[derive(Component, Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sight {
    pub visible: Vec<ActorId>,
}

// ============================================================================
// COMBAT COMPONENTS
// ============================================================================

/// Hit points.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    pub current: i32,
    pub max: i32,
}

impl Health {
    pub fn new(max: i32) -> Self {
        Self { current: max, max }
    }
}

impl Default for Health {
    fn default() -> Self {
        Self::new(100)
    }
}

/// Unmodified actor stats. Effective values go through [`StatModifiers`].
#[derive(Component, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaseStats {
    /// Tiles per second.
    pub move_speed: f32,
    /// Multiplier on the configured base hit chance.
    pub accuracy: f32,
    /// Sight radius in tiles.
    pub vision_radius: f32,
    pub damage_multiplier: f32,
}

impl BaseStats {
    pub fn base(&self, channel: StatChannel) -> f32 {
        match channel {
            StatChannel::MoveSpeed => self.move_speed,
            StatChannel::Accuracy => self.accuracy,
            StatChannel::VisionRadius => self.vision_radius,
            StatChannel::Damage => self.damage_multiplier,
        }
    }

    /// Base value for `channel` run through the actor's modifiers.
    pub fn effective(&self, channel: StatChannel, modifiers: &StatModifiers) -> f32 {
        modifiers.calculate(channel, self.base(channel))
    }
}

impl Default for BaseStats {
    fn default() -> Self {
        Self {
            move_speed: 4.0,
            accuracy: 1.0,
            vision_radius: 10.0,
            damage_multiplier: 1.0,
        }
    }
}

/// Weapon and ammunition state.
#[derive(Component, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Weapon {
    pub name: String,
    /// Maximum tile-center distance.
    pub range: f32,
    pub damage: i32,
    pub magazine_capacity: u32,
    pub rounds: u32,
    /// Ticks between shots.
    pub cooldown_ticks: u64,
    pub reload_ticks: u64,
    /// First tick the weapon may fire again.
    pub cooldown_until: u64,
    /// Tick at which a running reload completes.
    pub reload_until: Option<u64>,
}

impl Weapon {
    pub fn is_reloading(&self) -> bool {
        self.reload_until.is_some()
    }

    pub fn is_cooling_down(&self, tick: u64) -> bool {
        tick < self.cooldown_until
    }

    /// Not reloading, not cooling down and with at least one round loaded.
    pub fn is_ready(&self, tick: u64) -> bool {
        !self.is_reloading() && self.rounds > 0 && !self.is_cooling_down(tick)
    }

    pub fn is_full(&self) -> bool {
        self.rounds >= self.magazine_capacity
    }

    /// Begin a reload; returns the tick it completes on.
    pub fn start_reload(&mut self, tick: u64) -> u64 {
        let ready_at = tick + self.reload_ticks;
        self.reload_until = Some(ready_at);
        ready_at
    }

    /// Finish the reload if it is due. Returns the refilled round count.
    pub fn complete_reload(&mut self, tick: u64) -> Option<u32> {
        match self.reload_until {
            Some(ready_at) if tick >= ready_at => {
                self.reload_until = None;
                self.rounds = self.magazine_capacity;
                Some(self.rounds)
            }
            _ => None,
        }
    }

    /// Spend one round and start the cooldown from `tick`.
    pub fn consume_round(&mut self, tick: u64) {
        self.rounds = self.rounds.saturating_sub(1);
        self.cooldown_until = tick + self.cooldown_ticks;
    }
}

// ============================================================================
// ORDER COMPONENTS
// ============================================================================

/// A queued actor intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Order {
    /// Walk the remaining path, one tile at a time.
    Move { path: VecDeque<Tile>, destination: Tile },
    Attack { target: ActorId },
    /// Handed to decision hooks; the core only carries it.
    Ability { ability: String, tile: Tile },
    Interact { target: ActorId },
    Reload,
}

impl Order {
    pub fn kind(&self) -> &'static str {
        match self {
            Order::Move { .. } => "move",
            Order::Attack { .. } => "attack",
            Order::Ability { .. } => "ability",
            Order::Interact { .. } => "interact",
            Order::Reload => "reload",
        }
    }

    pub fn next_step(&self) -> Option<Tile> {
        match self {
            Order::Move { path, .. } => path.front().copied(),
            _ => None,
        }
    }
}

/// At most one pending order per actor.
#[derive(Component, Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PendingOrder(pub Option<Order>);

impl PendingOrder {
    pub fn is_idle(&self) -> bool {
        self.0.is_none()
    }

    pub fn clear(&mut self) {
        self.0 = None;
    }
}

// ============================================================================
// BUNDLE HELPERS
// ============================================================================

/// Bundle for spawning a complete actor entity.
#[derive(Bundle)]
pub struct ActorBundle {
    pub id: ActorId,
    pub kind: ActorKind,
    pub state: LifeState,
    pub position: Position,
    pub health: Health,
    pub stats: BaseStats,
    pub modifiers: StatModifiers,
    pub weapon: Weapon,
    pub order: PendingOrder,
    pub claim: MoveClaim,
    pub sight: Sight,
}
