//! Serialization utilities for snapshots and the event feed.

use crate::error::SnapshotError;
use crate::events::CombatEvent;
use crate::world::{CombatSnapshot, SNAPSHOT_FORMAT_VERSION};

/// Serialize a snapshot to JSON bytes.
pub fn snapshot_to_json(snapshot: &CombatSnapshot) -> Result<Vec<u8>, SnapshotError> {
    Ok(serde_json::to_vec(snapshot)?)
}

/// Serialize a snapshot to a JSON string.
pub fn snapshot_to_json_string(snapshot: &CombatSnapshot) -> Result<String, SnapshotError> {
    Ok(serde_json::to_string(snapshot)?)
}

/// Deserialize a snapshot from JSON bytes, rejecting other format versions.
pub fn snapshot_from_json(data: &[u8]) -> Result<CombatSnapshot, SnapshotError> {
    check_version(serde_json::from_slice(data)?)
}

/// Deserialize a snapshot from a JSON string, rejecting other format versions.
pub fn snapshot_from_json_string(data: &str) -> Result<CombatSnapshot, SnapshotError> {
    check_version(serde_json::from_str(data)?)
}

fn check_version(snapshot: CombatSnapshot) -> Result<CombatSnapshot, SnapshotError> {
    if snapshot.format_version != SNAPSHOT_FORMAT_VERSION {
        return Err(SnapshotError::UnsupportedVersion {
            found: snapshot.format_version,
            expected: SNAPSHOT_FORMAT_VERSION,
        });
    }
    Ok(snapshot)
}

/// Serialize a batch of events as a JSON array.
pub fn events_to_json(events: &[CombatEvent]) -> Result<String, serde_json::Error> {
    serde_json::to_string(events)
}
