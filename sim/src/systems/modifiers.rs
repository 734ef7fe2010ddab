//! Modifier expiry and the suppression debuff.

use crate::config::{SimTick, SuppressionConfig};
use crate::modifiers::{StatChannel, StatModifier, StatModifiers};
use bevy_ecs::prelude::*;

/// Source tag of the debuff applied by incoming fire.
pub const SUPPRESSED: &str = "suppressed";

/// System that purges modifiers whose expiry tick has been reached.
pub fn modifier_expiry_system(tick: Res<SimTick>, mut query: Query<&mut StatModifiers>) {
    let now = tick.0;
    for mut modifiers in query.iter_mut() {
        if modifiers.iter().any(|m| m.is_expired(now)) {
            modifiers.remove_expired(now);
        }
    }
}

/// Apply (or refresh) the suppression debuff on a target.
pub fn apply_suppression(modifiers: &mut StatModifiers, config: &SuppressionConfig, tick: u64) {
    let expires_at = tick + config.duration_ticks;
    modifiers.add(StatModifier::factor(SUPPRESSED, StatChannel::Accuracy, config.accuracy_factor).expiring_at(expires_at));
    modifiers.add(
        StatModifier::factor(SUPPRESSED, StatChannel::MoveSpeed, config.move_speed_factor).expiring_at(expires_at),
    );
}
