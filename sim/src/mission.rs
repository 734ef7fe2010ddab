//! Mission setup input: map, roster, objectives, seed and tuning.

use crate::components::*;
use crate::config::CombatConfig;
use crate::error::SetupError;
use crate::modifiers::StatModifiers;
use crate::objectives::{ObjectiveSpec, RuleSpec};
use crate::terrain::{MapSpec, Tile, TileMap};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Weapon loadout. Actors start with a full magazine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeaponSpec {
    pub name: String,
    pub range: f32,
    pub damage: i32,
    pub magazine_capacity: u32,
    pub cooldown_ticks: u64,
    pub reload_ticks: u64,
}

impl Default for WeaponSpec {
    fn default() -> Self {
        Self {
            name: "rifle".into(),
            range: 8.0,
            damage: 25,
            magazine_capacity: 6,
            cooldown_ticks: 1,
            reload_ticks: 3,
        }
    }
}

impl WeaponSpec {
    pub fn build(&self) -> Weapon {
        Weapon {
            name: self.name.clone(),
            range: self.range,
            damage: self.damage,
            magazine_capacity: self.magazine_capacity,
            rounds: self.magazine_capacity,
            cooldown_ticks: self.cooldown_ticks,
            reload_ticks: self.reload_ticks,
            cooldown_until: 0,
            reload_until: None,
        }
    }
}

fn default_max_health() -> i32 {
    100
}

/// One roster entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorSpec {
    pub id: ActorId,
    pub kind: ActorKind,
    pub tile: Tile,
    #[serde(default = "default_max_health")]
    pub max_health: i32,
    /// Starting health; full when absent.
    #[serde(default)]
    pub health: Option<i32>,
    #[serde(default)]
    pub stats: BaseStats,
    #[serde(default)]
    pub weapon: WeaponSpec,
    #[serde(default)]
    pub state: LifeState,
}

impl ActorSpec {
    pub fn new(id: u32, kind: ActorKind, tile: impl Into<Tile>) -> Self {
        Self {
            id: ActorId(id),
            kind,
            tile: tile.into(),
            max_health: default_max_health(),
            health: None,
            stats: BaseStats::default(),
            weapon: WeaponSpec::default(),
            state: LifeState::Alive,
        }
    }

    pub fn with_health(mut self, current: i32) -> Self {
        self.health = Some(current);
        self
    }

    pub fn with_max_health(mut self, max: i32) -> Self {
        self.max_health = max;
        self
    }

    pub fn with_stats(mut self, stats: BaseStats) -> Self {
        self.stats = stats;
        self
    }

    pub fn with_weapon(mut self, weapon: WeaponSpec) -> Self {
        self.weapon = weapon;
        self
    }

    pub fn with_state(mut self, state: LifeState) -> Self {
        self.state = state;
        self
    }

    pub fn starting_health(&self) -> Health {
        Health {
            current: self.health.unwrap_or(self.max_health),
            max: self.max_health,
        }
    }

    /// Stats and weapon range must be finite and non-negative.
    pub fn check_stats(&self) -> Result<(), SetupError> {
        let stats = [
            ("weapon range", self.weapon.range),
            ("move speed", self.stats.move_speed),
            ("accuracy", self.stats.accuracy),
            ("vision radius", self.stats.vision_radius),
            ("damage multiplier", self.stats.damage_multiplier),
        ];
        match stats.into_iter().find(|(_, value)| !(value.is_finite() && *value >= 0.0)) {
            Some((stat, value)) => Err(SetupError::InvalidStat {
                actor: self.id,
                stat,
                value,
            }),
            None => Ok(()),
        }
    }

    pub fn bundle(&self) -> ActorBundle {
        ActorBundle {
            id: self.id,
            kind: self.kind,
            state: self.state,
            position: Position::at(self.tile),
            health: self.starting_health(),
            stats: self.stats,
            modifiers: StatModifiers::default(),
            weapon: self.weapon.build(),
            order: PendingOrder::default(),
            claim: MoveClaim::default(),
            sight: Sight::default(),
        }
    }
}

/// Everything needed to start a mission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionSetup {
    pub map: MapSpec,
    pub roster: Vec<ActorSpec>,
    #[serde(default)]
    pub objectives: Vec<ObjectiveSpec>,
    #[serde(default)]
    pub seed: u64,
    #[serde(default)]
    pub config: CombatConfig,
}

impl MissionSetup {
    pub fn new(map: MapSpec) -> Self {
        Self {
            map,
            roster: Vec::new(),
            objectives: Vec::new(),
            seed: 0,
            config: CombatConfig::default(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, SetupError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_actor(mut self, actor: ActorSpec) -> Self {
        self.roster.push(actor);
        self
    }

    pub fn with_objective(mut self, objective: ObjectiveSpec) -> Self {
        self.objectives.push(objective);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_config(mut self, config: CombatConfig) -> Self {
        self.config = config;
        self
    }

    /// Parse the map and check the roster and objectives against it.
    pub fn build_map(&self) -> Result<TileMap, SetupError> {
        let map = TileMap::from_spec(&self.map)?;
        self.config.validate()?;

        let mut ids = BTreeSet::new();
        let mut occupied: BTreeMap<Tile, ActorId> = BTreeMap::new();
        for actor in &self.roster {
            if !ids.insert(actor.id) {
                return Err(SetupError::DuplicateActor(actor.id));
            }
            if !map.in_bounds(actor.tile) {
                return Err(SetupError::ActorOutOfBounds {
                    actor: actor.id,
                    tile: actor.tile,
                });
            }
            let health = actor.starting_health();
            if health.max <= 0 || health.current < 0 || health.current > health.max {
                return Err(SetupError::InvalidHealth(actor.id));
            }
            if actor.state.is_alive() && health.current == 0 {
                return Err(SetupError::InvalidHealth(actor.id));
            }
            actor.check_stats()?;
            if actor.state.is_dead() {
                continue;
            }
            if !map.is_walkable(actor.tile) {
                return Err(SetupError::ActorOnBlockedTile {
                    actor: actor.id,
                    tile: actor.tile,
                });
            }
            if let Some(other) = occupied.insert(actor.tile, actor.id) {
                return Err(SetupError::SharedTile {
                    actor: actor.id,
                    other,
                    tile: actor.tile,
                });
            }
        }

        for objective in &self.objectives {
            if let RuleSpec::ReachZone { actor, .. } = &objective.rule {
                if !ids.contains(actor) {
                    return Err(SetupError::UnknownObjectiveActor {
                        objective: objective.id.clone(),
                        actor: *actor,
                    });
                }
            }
        }

        Ok(map)
    }
}
