//! Error types for order validation, mission setup and snapshot restore.

use crate::components::ActorId;
use crate::terrain::Tile;
use thiserror::Error;

/// Why an order or modifier request was refused. The state is never modified
/// when one of these is returned.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OrderRejection {
    #[error("mission is already over")]
    MissionOver,
    #[error("unknown actor {0}")]
    UnknownActor(ActorId),
    #[error("actor {0} is not alive")]
    ActorNotAlive(ActorId),
    #[error("unknown target {0}")]
    UnknownTarget(ActorId),
    #[error("target {0} is not alive")]
    TargetNotAlive(ActorId),
    #[error("actor {0} cannot target itself")]
    SelfTarget(ActorId),
    #[error("target {target} is out of range ({distance:.2} > {range:.2})")]
    OutOfRange { target: ActorId, distance: f32, range: f32 },
    #[error("no line of sight to target {0}")]
    NoLineOfSight(ActorId),
    #[error("magazine empty")]
    OutOfAmmo,
    #[error("tile {0} is out of bounds")]
    OutOfBounds(Tile),
    #[error("tile {0} is not walkable")]
    NotWalkable(Tile),
    #[error("no path to tile {0}")]
    Unreachable(Tile),
    #[error("actor is already at {0}")]
    AlreadyAtDestination(Tile),
    #[error("path step {index} is not adjacent and walkable")]
    InvalidPath { index: usize },
    #[error("path is empty")]
    EmptyPath,
    #[error("ability id is empty")]
    EmptyAbility,
    #[error("target {0} is too far to interact with")]
    TargetTooFar(ActorId),
    #[error("magazine is already full")]
    MagazineFull,
    #[error("reload already in progress")]
    AlreadyReloading,
}

impl OrderRejection {
    /// Stable machine-readable reason code.
    pub fn code(&self) -> &'static str {
        match self {
            OrderRejection::MissionOver => "mission_over",
            OrderRejection::UnknownActor(_) => "unknown_actor",
            OrderRejection::ActorNotAlive(_) => "actor_not_alive",
            OrderRejection::UnknownTarget(_) => "unknown_target",
            OrderRejection::TargetNotAlive(_) => "target_not_alive",
            OrderRejection::SelfTarget(_) => "self_target",
            OrderRejection::OutOfRange { .. } => "out_of_range",
            OrderRejection::NoLineOfSight(_) => "no_line_of_sight",
            OrderRejection::OutOfAmmo => "out_of_ammo",
            OrderRejection::OutOfBounds(_) => "out_of_bounds",
            OrderRejection::NotWalkable(_) => "not_walkable",
            OrderRejection::Unreachable(_) => "unreachable",
            OrderRejection::AlreadyAtDestination(_) => "already_at_destination",
            OrderRejection::InvalidPath { .. } => "invalid_path",
            OrderRejection::EmptyPath => "empty_path",
            OrderRejection::EmptyAbility => "empty_ability",
            OrderRejection::TargetTooFar(_) => "target_too_far",
            OrderRejection::MagazineFull => "magazine_full",
            OrderRejection::AlreadyReloading => "already_reloading",
        }
    }
}

/// Mission setup failures.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("map has no rows")]
    EmptyMap,
    #[error("map row {row} has {found} columns, expected {expected}")]
    RaggedMap { row: usize, expected: usize, found: usize },
    #[error("unknown terrain symbol {symbol:?} at row {row}, column {col}")]
    UnknownTerrain { symbol: char, row: usize, col: usize },
    #[error("walkability override at {0} is out of bounds")]
    OverrideOutOfBounds(Tile),
    #[error("duplicate actor id {0}")]
    DuplicateActor(ActorId),
    #[error("actor {actor} placed out of bounds at {tile}")]
    ActorOutOfBounds { actor: ActorId, tile: Tile },
    #[error("actor {actor} placed on non-walkable tile {tile}")]
    ActorOnBlockedTile { actor: ActorId, tile: Tile },
    #[error("actor {actor} shares tile {tile} with {other}")]
    SharedTile { actor: ActorId, other: ActorId, tile: Tile },
    #[error("actor {0} has invalid health")]
    InvalidHealth(ActorId),
    #[error("actor {actor} has invalid {stat}: {value}")]
    InvalidStat { actor: ActorId, stat: &'static str, value: f32 },
    #[error("objective {objective} tracks unknown actor {actor}")]
    UnknownObjectiveActor { objective: String, actor: ActorId },
    #[error("duplicate objective id {0}")]
    DuplicateObjective(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Snapshot restore failures.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot format version {found} is not supported (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },
    #[error("snapshot was taken on map {found:?}, mission uses {expected:?}")]
    MapMismatch { expected: String, found: String },
    #[error("snapshot objectives do not match the mission objectives")]
    ObjectiveMismatch,
    #[error("snapshot holds actor {0} more than once")]
    DuplicateActor(ActorId),
    #[error("snapshot actor {0} is not part of the mission roster")]
    UnknownActor(ActorId),
    #[error("roster actor {0} is missing from the snapshot")]
    MissingActor(ActorId),
    #[error(transparent)]
    Setup(#[from] SetupError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_codes_are_stable() {
        assert_eq!(OrderRejection::UnknownActor(ActorId(3)).code(), "unknown_actor");
        assert_eq!(
            OrderRejection::OutOfRange {
                target: ActorId(1),
                distance: 9.0,
                range: 8.0
            }
            .code(),
            "out_of_range"
        );
        assert_eq!(OrderRejection::MissionOver.code(), "mission_over");
    }

    #[test]
    fn test_rejection_display() {
        let msg = OrderRejection::ActorNotAlive(ActorId(7)).to_string();
        assert_eq!(msg, "actor #7 is not alive");
    }
}
