//! Decision hooks - external deciders that drive actors between ticks.
//!
//! A hook gets a [`DecisionContext`] at the start of every tick: a read-only
//! [`BattleView`] plus a command queue. Queued commands go through the same
//! validation as the public order API once the hook returns.

use crate::components::{ActorId, ActorKind, Order};
use crate::modifiers::StatModifier;
use crate::terrain::Tile;
use crate::world::{ActorView, BattleView};
use serde::{Deserialize, Serialize};

/// An order as submitted through the public API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OrderRequest {
    Move { actor: ActorId, tile: Tile },
    MovePath { actor: ActorId, path: Vec<Tile> },
    Attack { actor: ActorId, target: ActorId },
    Ability { actor: ActorId, ability: String, tile: Tile },
    Interact { actor: ActorId, target: ActorId },
    Reload { actor: ActorId },
}

impl OrderRequest {
    pub fn actor(&self) -> ActorId {
        match self {
            OrderRequest::Move { actor, .. }
            | OrderRequest::MovePath { actor, .. }
            | OrderRequest::Attack { actor, .. }
            | OrderRequest::Ability { actor, .. }
            | OrderRequest::Interact { actor, .. }
            | OrderRequest::Reload { actor } => *actor,
        }
    }
}

/// Something a hook asked the core to do.
#[derive(Debug, Clone, PartialEq)]
pub enum HookCommand {
    Order(OrderRequest),
    ApplyModifier { actor: ActorId, modifier: StatModifier },
    RemoveModifiers { actor: ActorId, source: String },
}

impl HookCommand {
    pub fn actor(&self) -> ActorId {
        match self {
            HookCommand::Order(request) => request.actor(),
            HookCommand::ApplyModifier { actor, .. } | HookCommand::RemoveModifiers { actor, .. } => *actor,
        }
    }
}

/// Capability handed to a hook for one decision pass.
pub struct DecisionContext<'a> {
    view: &'a BattleView,
    commands: Vec<HookCommand>,
}

impl<'a> DecisionContext<'a> {
    pub fn new(view: &'a BattleView) -> Self {
        Self {
            view,
            commands: Vec::new(),
        }
    }

    pub fn view(&self) -> &BattleView {
        self.view
    }

    pub fn tick(&self) -> u64 {
        self.view.tick
    }

    pub fn actor(&self, id: ActorId) -> Option<&ActorView> {
        self.view.actor(id)
    }

    /// The actor's pending order, including ability and interact orders
    /// queued since the last tick.
    pub fn pending_order(&self, id: ActorId) -> Option<&Order> {
        self.view.actor(id)?.order.as_ref()
    }

    pub fn move_to(&mut self, actor: ActorId, tile: Tile) {
        self.order(OrderRequest::Move { actor, tile });
    }

    pub fn move_path(&mut self, actor: ActorId, path: Vec<Tile>) {
        self.order(OrderRequest::MovePath { actor, path });
    }

    pub fn attack(&mut self, actor: ActorId, target: ActorId) {
        self.order(OrderRequest::Attack { actor, target });
    }

    pub fn ability(&mut self, actor: ActorId, ability: impl Into<String>, tile: Tile) {
        self.order(OrderRequest::Ability {
            actor,
            ability: ability.into(),
            tile,
        });
    }

    pub fn interact(&mut self, actor: ActorId, target: ActorId) {
        self.order(OrderRequest::Interact { actor, target });
    }

    pub fn reload(&mut self, actor: ActorId) {
        self.order(OrderRequest::Reload { actor });
    }

    pub fn order(&mut self, request: OrderRequest) {
        self.commands.push(HookCommand::Order(request));
    }

    pub fn apply_modifier(&mut self, actor: ActorId, modifier: StatModifier) {
        self.commands.push(HookCommand::ApplyModifier { actor, modifier });
    }

    pub fn remove_modifiers(&mut self, actor: ActorId, source: impl Into<String>) {
        self.commands.push(HookCommand::RemoveModifiers {
            actor,
            source: source.into(),
        });
    }

    pub fn commands(&self) -> &[HookCommand] {
        &self.commands
    }

    pub fn into_commands(self) -> Vec<HookCommand> {
        self.commands
    }
}

/// External decision maker run at the start of every tick.
pub trait DecisionHook: Send {
    fn decide(&mut self, ctx: &mut DecisionContext);
}

impl<F> DecisionHook for F
where
    F: FnMut(&mut DecisionContext) + Send,
{
    fn decide(&mut self, ctx: &mut DecisionContext) {
        self(ctx)
    }
}

// ============================================================================
// REFERENCE HOOK
// ============================================================================

/// Simple driver for one side: idle actors shoot the nearest visible hostile
/// when they can, reload an empty magazine, and otherwise step toward it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngageNearestHook {
    pub side: ActorKind,
}

impl EngageNearestHook {
    pub fn new(side: ActorKind) -> Self {
        Self { side }
    }
}

impl DecisionHook for EngageNearestHook {
    fn decide(&mut self, ctx: &mut DecisionContext) {
        let view = ctx.view;
        for me in view.alive().filter(|a| a.kind == self.side && a.is_idle()) {
            let Some(target) = view.visible_hostiles(me.id).first().copied() else {
                continue;
            };

            let distance = me.tile.distance_to(target.tile);
            let in_reach = distance <= me.weapon_range && view.map.line_of_sight(me.tile, target.tile);
            if in_reach && (me.rounds > 0 || me.reloading) {
                ctx.attack(me.id, target.id);
                continue;
            }
            if me.rounds == 0 && !me.reloading {
                ctx.reload(me.id);
                continue;
            }

            // One step at a time so the route is re-planned every time the
            // actor goes idle.
            if let Some(path) = view.map.find_path(me.tile, target.tile) {
                if path.len() > 1 {
                    ctx.move_path(me.id, vec![path[0]]);
                }
            }
        }
    }
}
