//! Timed stat modifiers.
//!
//! Every status-effect change to an actor's derived stats is a [`StatModifier`]
//! held in the actor's [`StatModifiers`] collection. Effective values are
//! computed as `base × Π factor + Σ flat`, then clamped per channel.
//!
//! Factors and flat bonuses are sorted before they are combined, so the result
//! is bit-identical no matter in which order modifiers were added.

use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};

/// Derived stat a modifier acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StatChannel {
    MoveSpeed,
    Accuracy,
    VisionRadius,
    Damage,
}

impl StatChannel {
    pub const ALL: [StatChannel; 4] = [
        StatChannel::MoveSpeed,
        StatChannel::Accuracy,
        StatChannel::VisionRadius,
        StatChannel::Damage,
    ];

    /// Channels whose effective value never drops below zero.
    pub fn clamps_at_zero(&self) -> bool {
        matches!(self, StatChannel::MoveSpeed | StatChannel::Accuracy)
    }
}

/// A single timed change to one stat channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatModifier {
    /// Who applied it ("suppressed", "stim", ability ids...).
    pub source: String,
    pub channel: StatChannel,
    pub factor: f32,
    pub flat: f32,
    /// Purged once the tick counter reaches this value. `None` never expires.
    pub expires_at: Option<u64>,
    /// Stacking modifiers are never replaced by a same-source add.
    #[serde(default)]
    pub stacking: bool,
}

impl StatModifier {
    /// Multiplicative modifier.
    pub fn factor(source: impl Into<String>, channel: StatChannel, factor: f32) -> Self {
        Self {
            source: source.into(),
            channel,
            factor,
            flat: 0.0,
            expires_at: None,
            stacking: false,
        }
    }

    /// Additive modifier.
    pub fn flat(source: impl Into<String>, channel: StatChannel, flat: f32) -> Self {
        Self {
            source: source.into(),
            channel,
            factor: 1.0,
            flat,
            expires_at: None,
            stacking: false,
        }
    }

    pub fn expiring_at(mut self, tick: u64) -> Self {
        self.expires_at = Some(tick);
        self
    }

    pub fn stacking(mut self) -> Self {
        self.stacking = true;
        self
    }

    pub fn is_expired(&self, tick: u64) -> bool {
        self.expires_at.is_some_and(|at| at <= tick)
    }
}

/// Per-actor modifier collection.
#[derive(Component, Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatModifiers {
    entries: Vec<StatModifier>,
}

impl StatModifiers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a modifier. A non-stacking modifier replaces every existing modifier
    /// with the same source and channel, so re-applying is idempotent.
    pub fn add(&mut self, modifier: StatModifier) {
        if !modifier.stacking {
            self.entries
                .retain(|m| !(m.source == modifier.source && m.channel == modifier.channel));
        }
        self.entries.push(modifier);
    }

    /// Remove every modifier applied by `source`. Returns how many were removed.
    pub fn remove_by_source(&mut self, source: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|m| m.source != source);
        before - self.entries.len()
    }

    /// Purge modifiers whose expiry is at or before `tick`.
    pub fn remove_expired(&mut self, tick: u64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|m| !m.is_expired(tick));
        before - self.entries.len()
    }

    /// Effective value of `channel` for the given base.
    pub fn calculate(&self, channel: StatChannel, base: f32) -> f32 {
        let mut factors: Vec<f32> = Vec::new();
        let mut flats: Vec<f32> = Vec::new();
        for m in self.entries.iter().filter(|m| m.channel == channel) {
            factors.push(m.factor);
            flats.push(m.flat);
        }
        factors.sort_by(f32::total_cmp);
        flats.sort_by(f32::total_cmp);

        let product: f32 = factors.iter().product();
        let bonus: f32 = flats.iter().sum();
        let value = base * product + bonus;

        if channel.clamps_at_zero() {
            value.max(0.0)
        } else {
            value
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &StatModifier> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn has_source(&self, source: &str) -> bool {
        self.entries.iter().any(|m| m.source == source)
    }
}
