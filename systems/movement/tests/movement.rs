use std::{
    sync::{mpsc::Receiver, Arc},
    time::Duration,
};

use glam::Vec2;
use lane_siege_core::{
    Agent, AgentProfile, CancelToken, Column, EngineConfig, LaneId, VisualCommand, VisualId,
    VisualIds, VisualQueue, World,
};
use lane_siege_system_movement::MovementSimulator;
use lane_siege_world::Garden;
use tokio::time::Instant;

const LANE: LaneId = LaneId::new(1);
const VISUAL: VisualId = VisualId::new(1);

struct Rig {
    config: EngineConfig,
    garden: Arc<Garden>,
    movement: MovementSimulator,
    receiver: Receiver<VisualCommand>,
}

fn rig() -> Rig {
    let config = EngineConfig::default();
    let garden = Garden::shared();
    let (visuals, receiver) = VisualQueue::channel(VisualIds::new());
    let movement = MovementSimulator::new(garden.clone(), visuals, &config);
    Rig {
        config,
        garden,
        movement,
        receiver,
    }
}

fn agent_at(rig: &Rig, column: u32) -> Arc<Agent> {
    let position = rig.config.layout.cell_origin(LANE, Column::new(column));
    Arc::new(Agent::new(AgentProfile::melee(), position))
}

fn positions(receiver: &Receiver<VisualCommand>) -> Vec<Vec2> {
    receiver
        .try_iter()
        .filter_map(|command| match command {
            VisualCommand::SetPosition { visual, position } if visual == VISUAL => Some(position),
            _ => None,
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn walks_to_the_target_column_in_fixed_steps() {
    let rig = rig();
    let _ = rig.garden.plant(LANE, Column::new(5), 60, 100);
    let agent = agent_at(&rig, 8);
    let started = Instant::now();

    let reached = rig
        .movement
        .advance(LANE, &agent, VISUAL, Column::new(6), true, &CancelToken::new())
        .await;

    assert!(reached);
    let published = positions(&rig.receiver);
    assert_eq!(published.len(), 32, "160 units at 5 per step");
    assert_eq!(published.last().copied(), Some(Vec2::new(520.0, 180.0)));
    assert_eq!(agent.position(), Vec2::new(520.0, 180.0));
    assert_eq!(started.elapsed(), Duration::from_millis(32 * 150));
}

#[tokio::test(start_paused = true)]
async fn an_agent_already_in_place_does_not_move() {
    let rig = rig();
    let agent = agent_at(&rig, 3);

    let reached = rig
        .movement
        .advance(LANE, &agent, VISUAL, Column::new(4), true, &CancelToken::new())
        .await;

    assert!(reached);
    assert!(positions(&rig.receiver).is_empty());
}

#[tokio::test(start_paused = true)]
async fn a_new_obstacle_interrupts_the_walk() {
    let rig = rig();
    let agent = agent_at(&rig, 9);
    let walker = {
        let movement = rig.movement.clone();
        let agent = Arc::clone(&agent);
        tokio::spawn(async move {
            movement
                .advance(LANE, &agent, VISUAL, Column::HOUSE, true, &CancelToken::new())
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(1_000)).await;
    let _ = rig.garden.plant(LANE, Column::new(3), 100, 100);

    let reached = walker.await.expect("walker panicked");
    assert!(!reached, "the walk must stop so the agent can retarget");
    assert!(agent.position().x > rig.config.layout.column_x(Column::new(8)));
}

#[tokio::test(start_paused = true)]
async fn a_vanished_obstacle_interrupts_the_walk() {
    let rig = rig();
    let _ = rig.garden.plant(LANE, Column::new(2), 100, 100);
    let agent = agent_at(&rig, 9);
    let walker = {
        let movement = rig.movement.clone();
        let agent = Arc::clone(&agent);
        tokio::spawn(async move {
            movement
                .advance(LANE, &agent, VISUAL, Column::new(3), true, &CancelToken::new())
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(500)).await;
    rig.garden.remove_obstacle(LANE, Column::new(2));

    assert!(!walker.await.expect("walker panicked"));
}

#[tokio::test(start_paused = true)]
async fn changes_are_ignored_without_interruption() {
    let rig = rig();
    let agent = agent_at(&rig, 2);
    let walker = {
        let movement = rig.movement.clone();
        let agent = Arc::clone(&agent);
        tokio::spawn(async move {
            movement
                .advance(LANE, &agent, VISUAL, Column::HOUSE, false, &CancelToken::new())
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(300)).await;
    let _ = rig.garden.plant(LANE, Column::new(1), 100, 100);

    assert!(walker.await.expect("walker panicked"));
    assert_eq!(agent.position().x, rig.config.layout.column_x(Column::HOUSE));
}

#[tokio::test(start_paused = true)]
async fn cancellation_stops_the_walk_within_one_step() {
    let rig = rig();
    let agent = agent_at(&rig, 9);
    let cancel = CancelToken::new();
    let walker = {
        let movement = rig.movement.clone();
        let agent = Arc::clone(&agent);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            movement
                .advance(LANE, &agent, VISUAL, Column::HOUSE, true, &cancel)
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(400)).await;
    let started = Instant::now();
    cancel.cancel();

    assert!(!walker.await.expect("walker panicked"));
    assert!(started.elapsed() <= rig.config.timing.step_delay());
    assert_eq!(positions(&rig.receiver).len(), 3);
}
