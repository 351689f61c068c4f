#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Close-range combat between an agent and the obstacle in front of it.

use std::{sync::Arc, time::Duration};

use lane_siege_core::{
    pause, Agent, CancelToken, Column, EngineConfig, LaneId, VisualId, VisualQueue, World,
};
use tracing::debug;

/// How a single engagement ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Engagement {
    /// No living obstacle stood in the target cell when the attack began.
    TargetMissing,
    /// This agent landed the killing blow.
    Destroyed,
    /// Someone else finished the obstacle between two hits.
    TargetGone,
    /// The agent died before finishing the obstacle.
    AttackerDown,
    /// The agent's task was cancelled mid-fight.
    Cancelled,
}

/// Applies periodic melee damage to an adjacent obstacle.
#[derive(Clone)]
pub struct CombatSimulator {
    world: Arc<dyn World>,
    visuals: VisualQueue,
    attack_interval: Duration,
}

impl CombatSimulator {
    /// Creates a simulator damaging obstacles owned by `world`.
    #[must_use]
    pub fn new(world: Arc<dyn World>, visuals: VisualQueue, config: &EngineConfig) -> Self {
        Self {
            world,
            visuals,
            attack_interval: config.timing.attack_interval(),
        }
    }

    /// Hits the obstacle at `target_column` once per attack interval until it dies.
    pub async fn attack(
        &self,
        lane: LaneId,
        target_column: Column,
        agent: &Agent,
        visual: VisualId,
        cancel: &CancelToken,
    ) -> Engagement {
        let Some(obstacle) = self.world.obstacle_at(lane, target_column) else {
            debug!(%lane, column = target_column.get(), "target already gone");
            return Engagement::TargetMissing;
        };

        loop {
            if cancel.is_cancelled() {
                return Engagement::Cancelled;
            }
            if agent.is_dead() {
                return Engagement::AttackerDown;
            }
            if obstacle.is_dead() {
                return Engagement::TargetGone;
            }

            if obstacle.take_damage(agent.damage()) {
                self.world.obstacle_lost(lane, &obstacle);
                self.world.remove_obstacle(lane, target_column);
                self.visuals.remove_obstacle(lane, target_column);
                debug!(
                    %lane,
                    column = target_column.get(),
                    attacker = visual.get(),
                    "obstacle destroyed in close combat"
                );
                return Engagement::Destroyed;
            }

            if pause(cancel, self.attack_interval).await.is_err() {
                return Engagement::Cancelled;
            }
        }
    }
}
