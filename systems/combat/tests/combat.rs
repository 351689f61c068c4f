use std::{
    sync::{mpsc::Receiver, Arc},
    time::Duration,
};

use glam::Vec2;
use lane_siege_core::{
    Agent, AgentProfile, CancelToken, Column, EngineConfig, LaneId, VisualCommand, VisualId,
    VisualIds, VisualQueue,
};
use lane_siege_system_combat::{CombatSimulator, Engagement};
use lane_siege_world::{query, Garden, Notice};
use tokio::time::Instant;

const LANE: LaneId = LaneId::new(1);
const TARGET: Column = Column::new(5);
const VISUAL: VisualId = VisualId::new(1);

fn rig() -> (Arc<Garden>, CombatSimulator, Receiver<VisualCommand>) {
    let garden = Garden::shared();
    let (visuals, receiver) = VisualQueue::channel(VisualIds::new());
    let combat = CombatSimulator::new(garden.clone(), visuals, &EngineConfig::default());
    (garden, combat, receiver)
}

fn melee(damage: i32) -> Arc<Agent> {
    Arc::new(Agent::new(
        AgentProfile::melee().with_damage(damage),
        Vec2::ZERO,
    ))
}

#[tokio::test(start_paused = true)]
async fn three_hits_destroy_a_sixty_health_obstacle() {
    let (garden, combat, receiver) = rig();
    garden.adjust_score(500);
    let obstacle = garden.plant(LANE, TARGET, 60, 100);
    let agent = melee(20);
    let started = Instant::now();

    let fight = {
        let combat = combat.clone();
        let agent = Arc::clone(&agent);
        tokio::spawn(async move {
            combat
                .attack(LANE, TARGET, &agent, VISUAL, &CancelToken::new())
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(obstacle.health(), 40, "first hit lands immediately");
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(obstacle.health(), 20, "second hit after one interval");

    assert_eq!(fight.await.expect("fight panicked"), Engagement::Destroyed);
    assert_eq!(started.elapsed(), Duration::from_millis(1_000));
    assert!(obstacle.is_dead());
    assert_eq!(query::score(&garden), 400, "the obstacle cost is debited");
    assert_eq!(
        query::notices(&garden),
        vec![
            Notice::ObstacleLost {
                lane: LANE,
                column: TARGET,
                cost: 100,
            },
            Notice::ObstacleRemoved {
                lane: LANE,
                column: TARGET,
            },
        ]
    );
    assert_eq!(
        receiver.try_iter().collect::<Vec<_>>(),
        vec![VisualCommand::RemoveObstacle {
            lane: LANE,
            column: TARGET,
        }]
    );
}

#[tokio::test(start_paused = true)]
async fn missing_target_returns_immediately() {
    let (garden, combat, receiver) = rig();
    let agent = melee(20);

    let result = combat
        .attack(LANE, TARGET, &agent, VISUAL, &CancelToken::new())
        .await;

    assert_eq!(result, Engagement::TargetMissing);
    assert!(query::notices(&garden).is_empty());
    assert!(receiver.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn a_dying_attacker_abandons_the_fight() {
    let (garden, combat, _receiver) = rig();
    let obstacle = garden.plant(LANE, TARGET, 300, 100);
    let agent = melee(20);

    let fight = {
        let combat = combat.clone();
        let agent = Arc::clone(&agent);
        tokio::spawn(async move {
            combat
                .attack(LANE, TARGET, &agent, VISUAL, &CancelToken::new())
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(700)).await;
    assert!(agent.take_damage(500));

    assert_eq!(fight.await.expect("fight panicked"), Engagement::AttackerDown);
    assert_eq!(obstacle.health(), 260);
    assert_eq!(query::obstacle_health(&garden, LANE, TARGET), Some(260));
}

#[tokio::test(start_paused = true)]
async fn cancellation_interrupts_between_hits() {
    let (garden, combat, _receiver) = rig();
    let obstacle = garden.plant(LANE, TARGET, 300, 100);
    let agent = melee(20);
    let cancel = CancelToken::new();

    let fight = {
        let combat = combat.clone();
        let agent = Arc::clone(&agent);
        let cancel = cancel.clone();
        tokio::spawn(async move { combat.attack(LANE, TARGET, &agent, VISUAL, &cancel).await })
    };

    tokio::time::sleep(Duration::from_millis(1_200)).await;
    cancel.cancel();

    assert_eq!(fight.await.expect("fight panicked"), Engagement::Cancelled);
    assert_eq!(obstacle.health(), 240, "hits at 0, 500 and 1000 ms only");
}

#[tokio::test(start_paused = true)]
async fn a_kill_by_someone_else_ends_the_fight() {
    let (garden, combat, _receiver) = rig();
    let obstacle = garden.plant(LANE, TARGET, 300, 100);
    let agent = melee(20);

    let fight = {
        let combat = combat.clone();
        let agent = Arc::clone(&agent);
        tokio::spawn(async move {
            combat
                .attack(LANE, TARGET, &agent, VISUAL, &CancelToken::new())
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(obstacle.take_damage(1_000));

    assert_eq!(fight.await.expect("fight panicked"), Engagement::TargetGone);
    assert_eq!(
        query::count_notices(&garden, |notice| matches!(notice, Notice::ObstacleLost { .. })),
        0,
        "only the killing blow reports the loss"
    );
}
