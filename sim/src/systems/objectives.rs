//! Objective system - evaluates objectives and settles the mission outcome.

use crate::config::SimTick;
use crate::events::{CombatEvent, EventLog};
use crate::objectives::{MissionStatus, ObjectiveSet};
use crate::terrain::MapResource;
use crate::world::{ActorData, ActorView, BattleView};
use bevy_ecs::prelude::*;

/// System that re-evaluates every objective and records the outcome once it
/// becomes terminal. Does nothing after the mission has ended.
pub fn objective_system(
    tick: Res<SimTick>,
    map: Res<MapResource>,
    mut objectives: ResMut<ObjectiveSet>,
    mut status: ResMut<MissionStatus>,
    mut events: ResMut<EventLog>,
    actors: Query<ActorData>,
) {
    if status.is_over() || objectives.is_empty() {
        return;
    }
    let now = tick.0;
    let view = BattleView::new(
        now,
        map.0.clone(),
        actors.iter().map(|item| ActorView::from_item(&item, now)).collect(),
    );

    for (objective, new_status) in objectives.evaluate(&view) {
        tracing::debug!(tick = now, objective = %objective, status = ?new_status, "objective status changed");
        events.push(CombatEvent::ObjectiveStatusChanged {
            tick: now,
            objective,
            status: new_status,
        });
    }

    if let Some(outcome) = objectives.outcome() {
        tracing::debug!(tick = now, %outcome, "mission ended");
        status.outcome = Some(outcome);
        events.push(CombatEvent::MissionOutcomeReached { tick: now, outcome });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::*;
    use crate::mission::ActorSpec;
    use crate::objectives::{MissionOutcome, ObjectiveSpec, ObjectiveStatus};
    use crate::testing::{config, spawn, step, world_with};
    use crate::terrain::TileMap;

    fn setup() -> (World, Entity, Entity) {
        let mut world = world_with(TileMap::open("open", 10, 3), config(0.7, false));
        let crew = spawn(&mut world, ActorSpec::new(1, ActorKind::Crew, (0, 0)));
        let enemy = spawn(&mut world, ActorSpec::new(2, ActorKind::Enemy, (5, 0)));
        world.insert_resource(
            ObjectiveSet::new(vec![
                ObjectiveSpec::eliminate_all("kill").build(),
                ObjectiveSpec::survive("live").build(),
            ])
            .unwrap(),
        );
        (world, crew, enemy)
    }

    fn schedule() -> Schedule {
        let mut schedule = Schedule::default();
        schedule.add_systems(objective_system);
        schedule
    }

    #[test]
    fn test_continues_while_both_sides_stand() {
        let (mut world, _, _) = setup();
        let events = step(&mut world, &mut schedule());
        assert!(events.is_empty());
        assert!(!world.resource::<MissionStatus>().is_over());
    }

    #[test]
    fn test_victory_reported_once() {
        let (mut world, _, enemy) = setup();
        let mut schedule = schedule();
        *world.get_mut::<LifeState>(enemy).unwrap() = LifeState::Dead;

        let events = step(&mut world, &mut schedule);
        assert_eq!(
            events,
            vec![
                CombatEvent::ObjectiveStatusChanged {
                    tick: 1,
                    objective: "kill".into(),
                    status: ObjectiveStatus::Complete,
                },
                CombatEvent::MissionOutcomeReached {
                    tick: 1,
                    outcome: MissionOutcome::Victory,
                },
            ]
        );

        // Ended: later passes are no-ops even if the state changes.
        *world.get_mut::<LifeState>(enemy).unwrap() = LifeState::Alive;
        assert!(step(&mut world, &mut schedule).is_empty());
        assert_eq!(world.resource::<MissionStatus>().outcome, Some(MissionOutcome::Victory));
    }

    #[test]
    fn test_defeat_wins_same_pass() {
        let (mut world, crew, enemy) = setup();
        *world.get_mut::<LifeState>(crew).unwrap() = LifeState::Dead;
        *world.get_mut::<LifeState>(enemy).unwrap() = LifeState::Dead;

        step(&mut world, &mut schedule());
        assert_eq!(world.resource::<MissionStatus>().outcome, Some(MissionOutcome::Defeat));
    }
}
