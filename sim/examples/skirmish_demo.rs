//! Small skirmish driven by the reference hook on both sides.
//!
//! Run with: cargo run --example skirmish_demo
//! Set `RUST_LOG=tactics_sim=debug` to see every order and shot.

use tactics_sim::{
    ActorKind, ActorSpec, CombatEvent, CombatState, EngageNearestHook, MapSpec, MissionSetup, ObjectiveSpec,
    TickStatus, WeaponSpec,
};

const MAP: &str = r#"{
    "id": "farmstead",
    "rows": [
        "..............",
        "...#......h...",
        "...#..........",
        "......FF......",
        "..........#...",
        ".h........#...",
        ".............."
    ]
}"#;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .init();

    println!("=== Tactics Sim - Skirmish Demo ===\n");

    let map: MapSpec = serde_json::from_str(MAP)?;
    let shotgun = WeaponSpec {
        name: "shotgun".into(),
        range: 4.0,
        damage: 40,
        magazine_capacity: 2,
        ..WeaponSpec::default()
    };
    let setup = MissionSetup::new(map)
        .with_actor(ActorSpec::new(1, ActorKind::Crew, (0, 0)))
        .with_actor(ActorSpec::new(2, ActorKind::Crew, (0, 3)))
        .with_actor(ActorSpec::new(3, ActorKind::Crew, (0, 6)).with_weapon(shotgun.clone()))
        .with_actor(ActorSpec::new(10, ActorKind::Enemy, (13, 0)))
        .with_actor(ActorSpec::new(11, ActorKind::Enemy, (13, 3)).with_weapon(shotgun))
        .with_actor(ActorSpec::new(12, ActorKind::Enemy, (13, 6)).with_max_health(60))
        .with_objective(ObjectiveSpec::eliminate_all("clear"))
        .with_objective(ObjectiveSpec::survive("crew"))
        .with_seed(2024);

    let mut state = CombatState::new(&setup)?;
    state.add_hook(EngageNearestHook::new(ActorKind::Crew));
    state.add_hook(EngageNearestHook::new(ActorKind::Enemy));
    state.add_event_sink(|event: &CombatEvent| match event {
        CombatEvent::ActorDied { tick, actor, killer } => {
            println!("  [tick {tick}] {actor} down (killer: {killer:?})");
        }
        CombatEvent::ObjectiveStatusChanged { tick, objective, status } => {
            println!("  [tick {tick}] objective {objective} -> {status:?}");
        }
        _ => {}
    });

    println!("Map:");
    for row in state.map().to_rows() {
        println!("  {row}");
    }
    println!();

    let mut shots = 0;
    let mut hits = 0;
    for _ in 0..600 {
        let report = state.tick();
        for event in &report.events {
            if let CombatEvent::AttackResolved { hit, .. } = event {
                shots += 1;
                hits += usize::from(*hit);
            }
        }

        if report.tick % 50 == 0 {
            println!("--- Tick {} ---", report.tick);
            print_actors(&mut state);
        }

        if let TickStatus::Ended(outcome) = report.status {
            println!("\nMission ended at tick {}: {}", report.tick, outcome);
            break;
        }
    }

    println!("\nShots fired: {shots}, hits: {hits}");
    println!("\nObjectives:");
    for objective in state.objectives() {
        println!("  {} [{:?}] {}", objective.id, objective.status, objective.progress);
    }

    println!("\n=== Final State (JSON) ===\n");
    println!("{}", state.snapshot().to_json_pretty()?);
    Ok(())
}

fn print_actors(state: &mut CombatState) {
    for actor in state.view().actors {
        println!(
            "  {} {:?} at {} hp={}/{} rounds={}/{} [{}]",
            actor.id,
            actor.kind,
            actor.tile,
            actor.health,
            actor.max_health,
            actor.rounds,
            actor.magazine_capacity,
            actor.order.as_ref().map_or("idle", |o| o.kind()),
        );
    }
    let fog = state.fog();
    for side in [ActorKind::Crew, ActorKind::Enemy] {
        println!(
            "  {:?} sees {} tiles, explored {}",
            side,
            fog.visible_tiles(side).count(),
            fog.explored_count(side)
        );
    }
}
