//! Mission objectives and outcome reduction.
//!
//! An [`Objective`] owns its status and delegates the per-tick check to an
//! [`ObjectiveRule`] trait object. Status only ever moves out of `InProgress`,
//! and a failure-condition objective can only fail.

use crate::components::{ActorId, ActorKind};
use crate::error::{SetupError, SnapshotError};
use crate::terrain::Tile;
use crate::world::{BattleView, ObjectiveRecord};
use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ObjectiveStatus {
    #[default]
    InProgress,
    Complete,
    Failed,
}

impl ObjectiveStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ObjectiveStatus::InProgress)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MissionOutcome {
    Victory,
    Defeat,
}

impl fmt::Display for MissionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissionOutcome::Victory => write!(f, "victory"),
            MissionOutcome::Defeat => write!(f, "defeat"),
        }
    }
}

/// Pluggable objective check.
pub trait ObjectiveRule: Send + Sync + fmt::Debug {
    /// Terminal status the objective should move to, if any.
    fn check(&self, view: &BattleView) -> Option<ObjectiveStatus>;

    /// Human-readable progress line.
    fn progress_text(&self, view: &BattleView) -> String;

    /// Failure-condition rules can only fail and never gate victory.
    fn is_failure_condition(&self) -> bool {
        false
    }
}

// ============================================================================
// BUILT-IN RULES
// ============================================================================

/// Fails once no actor of `side` is alive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Survive {
    pub side: ActorKind,
}

impl ObjectiveRule for Survive {
    fn check(&self, view: &BattleView) -> Option<ObjectiveStatus> {
        (view.alive_count(self.side) == 0).then_some(ObjectiveStatus::Failed)
    }

    fn progress_text(&self, view: &BattleView) -> String {
        format!("{} {:?} alive", view.alive_count(self.side), self.side)
    }

    fn is_failure_condition(&self) -> bool {
        true
    }
}

/// Completes once no actor of `hostiles` is alive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EliminateAll {
    pub hostiles: ActorKind,
}

impl ObjectiveRule for EliminateAll {
    fn check(&self, view: &BattleView) -> Option<ObjectiveStatus> {
        (view.alive_count(self.hostiles) == 0).then_some(ObjectiveStatus::Complete)
    }

    fn progress_text(&self, view: &BattleView) -> String {
        format!("{} {:?} remaining", view.alive_count(self.hostiles), self.hostiles)
    }
}

/// Completes when `actor` is alive and standing on any zone tile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReachZone {
    pub actor: ActorId,
    pub zone: Vec<Tile>,
}

impl ObjectiveRule for ReachZone {
    fn check(&self, view: &BattleView) -> Option<ObjectiveStatus> {
        let actor = view.actor(self.actor)?;
        (actor.is_alive() && self.zone.contains(&actor.tile)).then_some(ObjectiveStatus::Complete)
    }

    fn progress_text(&self, view: &BattleView) -> String {
        match view.actor(self.actor) {
            Some(actor) => {
                let nearest = self
                    .zone
                    .iter()
                    .map(|t| actor.tile.chebyshev(*t))
                    .min()
                    .unwrap_or(0);
                format!("{} is {} tiles from the zone", self.actor, nearest)
            }
            None => format!("{} is missing", self.actor),
        }
    }
}

// ============================================================================
// OBJECTIVE
// ============================================================================

#[derive(Debug)]
pub struct Objective {
    id: String,
    description: String,
    primary: bool,
    failure_condition: bool,
    status: ObjectiveStatus,
    rule: Box<dyn ObjectiveRule>,
}

impl Objective {
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        primary: bool,
        rule: Box<dyn ObjectiveRule>,
    ) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            primary,
            failure_condition: rule.is_failure_condition(),
            status: ObjectiveStatus::InProgress,
            rule,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn is_primary(&self) -> bool {
        self.primary
    }

    pub fn is_failure_condition(&self) -> bool {
        self.failure_condition
    }

    pub fn status(&self) -> ObjectiveStatus {
        self.status
    }

    pub fn progress_text(&self, view: &BattleView) -> String {
        self.rule.progress_text(view)
    }

    /// Re-check the rule. Returns the new status on a transition.
    pub fn evaluate(&mut self, view: &BattleView) -> Option<ObjectiveStatus> {
        if self.status.is_terminal() {
            return None;
        }
        match self.rule.check(view)? {
            ObjectiveStatus::InProgress => None,
            ObjectiveStatus::Complete if self.failure_condition => None,
            next => {
                self.status = next;
                Some(next)
            }
        }
    }

    /// Counts toward victory: primary and not a failure condition.
    pub fn is_victory_objective(&self) -> bool {
        self.primary && !self.failure_condition
    }
}

/// All objectives of a mission, in setup order.
#[derive(Resource, Debug, Default)]
pub struct ObjectiveSet {
    objectives: Vec<Objective>,
}

impl ObjectiveSet {
    pub fn new(objectives: Vec<Objective>) -> Result<Self, SetupError> {
        let mut seen = std::collections::BTreeSet::new();
        for o in &objectives {
            if !seen.insert(o.id.clone()) {
                return Err(SetupError::DuplicateObjective(o.id.clone()));
            }
        }
        Ok(Self { objectives })
    }

    /// Evaluate every objective; returns the transitions in setup order.
    pub fn evaluate(&mut self, view: &BattleView) -> Vec<(String, ObjectiveStatus)> {
        self.objectives
            .iter_mut()
            .filter_map(|o| o.evaluate(view).map(|s| (o.id.clone(), s)))
            .collect()
    }

    /// Any primary failure is a defeat, even if victory completed in the same
    /// pass. Victory needs at least one victory objective, all complete.
    pub fn outcome(&self) -> Option<MissionOutcome> {
        if self
            .objectives
            .iter()
            .any(|o| o.primary && o.status == ObjectiveStatus::Failed)
        {
            return Some(MissionOutcome::Defeat);
        }
        let mut victory = self.objectives.iter().filter(|o| o.is_victory_objective()).peekable();
        if victory.peek().is_some() && victory.all(|o| o.status == ObjectiveStatus::Complete) {
            return Some(MissionOutcome::Victory);
        }
        None
    }

    /// Put back statuses taken from a snapshot. Ids must match in order.
    pub fn restore_statuses(&mut self, records: &[ObjectiveRecord]) -> Result<(), SnapshotError> {
        if records.len() != self.objectives.len()
            || records.iter().zip(&self.objectives).any(|(r, o)| r.id != o.id)
        {
            return Err(SnapshotError::ObjectiveMismatch);
        }
        for (record, objective) in records.iter().zip(self.objectives.iter_mut()) {
            objective.status = record.status;
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Objective> {
        self.objectives.iter().find(|o| o.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Objective> {
        self.objectives.iter()
    }

    pub fn len(&self) -> usize {
        self.objectives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objectives.is_empty()
    }
}

/// Terminal outcome, set exactly once.
#[derive(Resource, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MissionStatus {
    pub outcome: Option<MissionOutcome>,
}

impl MissionStatus {
    pub fn is_over(&self) -> bool {
        self.outcome.is_some()
    }
}

/// Per-objective line for UIs and logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectiveReport {
    pub id: String,
    pub description: String,
    pub primary: bool,
    pub failure_condition: bool,
    pub status: ObjectiveStatus,
    pub progress: String,
}

// ============================================================================
// SETUP DESCRIPTION
// ============================================================================

/// Built-in rule selection for mission setup files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule")]
pub enum RuleSpec {
    Survive {
        #[serde(default = "default_allies")]
        side: ActorKind,
    },
    EliminateAll {
        #[serde(default = "default_hostiles")]
        hostiles: ActorKind,
    },
    ReachZone {
        actor: ActorId,
        zone: Vec<Tile>,
    },
}

fn default_allies() -> ActorKind {
    ActorKind::Crew
}

fn default_hostiles() -> ActorKind {
    ActorKind::Enemy
}

fn default_primary() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveSpec {
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_primary")]
    pub primary: bool,
    #[serde(flatten)]
    pub rule: RuleSpec,
}

impl ObjectiveSpec {
    pub fn survive(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: "Keep the crew alive".into(),
            primary: true,
            rule: RuleSpec::Survive { side: ActorKind::Crew },
        }
    }

    pub fn eliminate_all(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: "Eliminate all hostiles".into(),
            primary: true,
            rule: RuleSpec::EliminateAll {
                hostiles: ActorKind::Enemy,
            },
        }
    }

    pub fn reach_zone(id: impl Into<String>, actor: ActorId, zone: Vec<Tile>) -> Self {
        Self {
            id: id.into(),
            description: "Reach the extraction zone".into(),
            primary: true,
            rule: RuleSpec::ReachZone { actor, zone },
        }
    }

    pub fn secondary(mut self) -> Self {
        self.primary = false;
        self
    }

    pub fn build(&self) -> Objective {
        let rule: Box<dyn ObjectiveRule> = match &self.rule {
            RuleSpec::Survive { side } => Box::new(Survive { side: *side }),
            RuleSpec::EliminateAll { hostiles } => Box::new(EliminateAll { hostiles: *hostiles }),
            RuleSpec::ReachZone { actor, zone } => Box::new(ReachZone {
                actor: *actor,
                zone: zone.clone(),
            }),
        };
        Objective::new(self.id.clone(), self.description.clone(), self.primary, rule)
    }
}
