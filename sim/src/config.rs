//! Simulation configuration and core resources (tick counter, RNG stream).

use crate::error::SetupError;
use bevy_ecs::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Tuning for a combat mission.
#[derive(Resource, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CombatConfig {
    /// Seconds of game time covered by one tick.
    pub tick_duration: f32,
    /// Hit chance of an actor with accuracy 1.0.
    pub base_hit_chance: f32,
    /// Idle actors take one opportunistic shot per tick at a hostile in range.
    pub auto_defend: bool,
    /// Panic on invariant violations instead of logging them.
    pub strict_invariants: bool,
    /// Incoming fire applies a timed debuff to the target when set.
    pub suppression: Option<SuppressionConfig>,
}

impl Default for CombatConfig {
    fn default() -> Self {
        Self {
            tick_duration: 0.1,
            base_hit_chance: 0.70,
            auto_defend: true,
            strict_invariants: cfg!(debug_assertions),
            suppression: None,
        }
    }
}

impl CombatConfig {
    pub fn from_json(json: &str) -> Result<Self, SetupError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SetupError> {
        if !(self.tick_duration.is_finite() && self.tick_duration > 0.0) {
            return Err(SetupError::InvalidConfig(format!(
                "tick_duration must be positive, got {}",
                self.tick_duration
            )));
        }
        if !(0.0..=1.0).contains(&self.base_hit_chance) {
            return Err(SetupError::InvalidConfig(format!(
                "base_hit_chance must be within [0, 1], got {}",
                self.base_hit_chance
            )));
        }
        Ok(())
    }
}

/// Debuff applied to the target of every resolved attack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuppressionConfig {
    pub duration_ticks: u64,
    pub accuracy_factor: f32,
    pub move_speed_factor: f32,
}

impl Default for SuppressionConfig {
    fn default() -> Self {
        Self {
            duration_ticks: 3,
            accuracy_factor: 0.5,
            move_speed_factor: 0.5,
        }
    }
}

/// Global simulation tick counter. Tick 0 is the state before the first tick.
#[derive(Resource, Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimTick(pub u64);

impl SimTick {
    pub fn increment(&mut self) {
        self.0 += 1;
    }
}

/// The mission's random stream. Only attack resolution draws from it.
#[derive(Resource, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombatRng(pub ChaCha8Rng);

impl CombatRng {
    pub fn from_seed(seed: u64) -> Self {
        Self(ChaCha8Rng::seed_from_u64(seed))
    }
}
