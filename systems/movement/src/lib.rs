#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Step-wise agent movement that aborts when the lane changes underneath it.

use std::sync::Arc;

use lane_siege_core::{
    pause, Agent, CancelToken, Cancelled, Column, EngineConfig, LaneId, Layout, Timing,
    VisualId, VisualQueue, World,
};
use tracing::{debug, trace};

/// Advances agents toward a target column one fixed step at a time.
#[derive(Clone)]
pub struct MovementSimulator {
    world: Arc<dyn World>,
    visuals: VisualQueue,
    timing: Timing,
    layout: Layout,
}

impl MovementSimulator {
    /// Creates a simulator reading `world` and publishing to `visuals`.
    #[must_use]
    pub fn new(world: Arc<dyn World>, visuals: VisualQueue, config: &EngineConfig) -> Self {
        Self {
            world,
            visuals,
            timing: config.timing.clone(),
            layout: config.layout.clone(),
        }
    }

    /// Walks the agent from its current position toward `target_column`.
    ///
    /// Every intermediate position is published through the visual queue.
    /// With `interrupt_on_change` set, the nearest obstacle column of the lane
    /// is re-read after every step and any difference from the value seen at
    /// the start aborts the walk. Returns `true` only when the target was
    /// reached without such a change; cancellation returns `false`.
    pub async fn advance(
        &self,
        lane: LaneId,
        agent: &Agent,
        visual: VisualId,
        target_column: Column,
        interrupt_on_change: bool,
        cancel: &CancelToken,
    ) -> bool {
        self.walk(lane, agent, visual, target_column, interrupt_on_change, cancel)
            .await
            .unwrap_or(false)
    }

    async fn walk(
        &self,
        lane: LaneId,
        agent: &Agent,
        visual: VisualId,
        target_column: Column,
        interrupt_on_change: bool,
        cancel: &CancelToken,
    ) -> Result<bool, Cancelled> {
        let end_x = self.layout.column_x(target_column);
        let step = self.layout.move_step;
        let initial_obstacle = self.world.nearest_obstacle_column(lane);
        let mut position = agent.position();

        if step <= 0.0 {
            return Ok(position.x <= end_x);
        }

        while position.x > end_x {
            cancel.check()?;
            position.x = (position.x - step).max(end_x);
            agent.set_position(position);
            self.visuals.set_position(visual, position);
            trace!(%lane, x = position.x, "agent stepped");

            pause(cancel, self.timing.step_delay()).await?;

            if interrupt_on_change {
                let current = self.world.nearest_obstacle_column(lane);
                if current != initial_obstacle {
                    debug!(
                        %lane,
                        before = ?initial_obstacle.map(|column| column.get()),
                        after = ?current.map(|column| column.get()),
                        "lane changed mid-transit; rerouting"
                    );
                    return Ok(false);
                }
            }
        }

        Ok(true)
    }
}
