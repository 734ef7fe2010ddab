//! ECS systems for the combat simulation.
//!
//! Systems contain the per-tick logic that operates on components.
//!
//! ## Tick Order
//!
//! One tick runs every system in a single chain, in this order:
//!
//! 1. `modifier_expiry_system` - purges expired stat modifiers
//! 2. `occupancy_update_system` - rebuilds the occupancy grid
//! 3. `attack_system` - reloads, explicit attacks, then auto-defense
//! 4. `death_cleanup_system` - releases orders and claims of the fallen
//! 5. `collision_resolution_system` - hands out next-step tiles, lowest id first
//! 6. `movement_system` - advances claimed movers
//! 7. `visibility_system` - sight lists and fog of war
//! 8. `objective_system` - objective transitions and mission outcome
//!
//! Every system iterates actors in ascending `ActorId` order, so the chain
//! is deterministic for a given seed.

pub mod attack;
pub mod modifiers;
pub mod movement;
pub mod objectives;
pub mod serialization;
pub mod visibility;

pub use attack::{attack_system, death_cleanup_system};
pub use modifiers::{apply_suppression, modifier_expiry_system, SUPPRESSED};
pub use movement::{collision_resolution_system, movement_system};
pub use objectives::objective_system;
pub use serialization::*;
pub use visibility::{visibility_system, FogOfWar, FOG_SIDES};
