//! Combat event feed.
//!
//! Systems push events into [`EventLog`] as they happen; `CombatState` drains
//! the log at the end of each tick, returns the events in the tick report and
//! forwards them, in order, to every registered [`EventSink`].

use crate::components::ActorId;
use crate::objectives::{MissionOutcome, ObjectiveStatus};
use crate::terrain::Tile;
use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};

/// Something observable that happened during a tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CombatEvent {
    AttackResolved {
        tick: u64,
        attacker: ActorId,
        target: ActorId,
        weapon: String,
        hit: bool,
        damage: i32,
        /// Opportunistic shot rather than an explicit attack order.
        auto_defense: bool,
    },
    ActorDied {
        tick: u64,
        actor: ActorId,
        killer: Option<ActorId>,
    },
    ObjectiveStatusChanged {
        tick: u64,
        objective: String,
        status: ObjectiveStatus,
    },
    MissionOutcomeReached {
        tick: u64,
        outcome: MissionOutcome,
    },
    /// A mover lost a contested tile and will retry next tick.
    MoveDeferred {
        tick: u64,
        actor: ActorId,
        tile: Tile,
        blocked_by: Option<ActorId>,
    },
    ReloadStarted {
        tick: u64,
        actor: ActorId,
        ready_at: u64,
    },
    ReloadCompleted {
        tick: u64,
        actor: ActorId,
        rounds: u32,
    },
}

impl CombatEvent {
    pub fn tick(&self) -> u64 {
        match self {
            CombatEvent::AttackResolved { tick, .. }
            | CombatEvent::ActorDied { tick, .. }
            | CombatEvent::ObjectiveStatusChanged { tick, .. }
            | CombatEvent::MissionOutcomeReached { tick, .. }
            | CombatEvent::MoveDeferred { tick, .. }
            | CombatEvent::ReloadStarted { tick, .. }
            | CombatEvent::ReloadCompleted { tick, .. } => *tick,
        }
    }
}

/// Events raised during the current tick, in emission order.
#[derive(Resource, Debug, Default)]
pub struct EventLog {
    events: Vec<CombatEvent>,
}

impl EventLog {
    pub fn push(&mut self, event: CombatEvent) {
        self.events.push(event);
    }

    pub fn drain(&mut self) -> Vec<CombatEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CombatEvent> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Actors that died during the current attack phase, awaiting cleanup.
#[derive(Resource, Debug, Default)]
pub struct DeathSignals(pub Vec<ActorId>);

/// Receives every event exactly once, in order. Must not block.
pub trait EventSink: Send {
    fn on_event(&mut self, event: &CombatEvent);
}

impl<F> EventSink for F
where
    F: FnMut(&CombatEvent) + Send,
{
    fn on_event(&mut self, event: &CombatEvent) {
        self(event)
    }
}
