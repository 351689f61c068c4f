#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Ranged attacks fired by agents that stay out of melee range.
//!
//! Each ranged agent owns one projectile loop running beside its control
//! task. A cycle picks the obstacle nearest to the incoming agents, animates a
//! transient projectile sprite toward it and applies the agent's damage on
//! arrival.

use std::sync::Arc;

use glam::Vec2;
use lane_siege_core::{
    pause, Agent, CancelToken, Cancelled, EngineConfig, LaneId, Layout, Scene, SpriteKind,
    Timing, VisualId, VisualQueue, World,
};
use tracing::{debug, trace};

/// Result of a single firing cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Volley {
    /// No obstacle with a resolvable visual was found.
    NoTarget,
    /// The projectile landed and the obstacle survived.
    Hit,
    /// The projectile landed and destroyed the obstacle.
    Destroyed,
    /// The obstacle died while the projectile was in flight.
    Missed,
}

/// Straight-line path of a projectile, split into equal increments.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Trajectory {
    origin: Vec2,
    increment: Vec2,
    steps: u32,
}

impl Trajectory {
    /// Plans a path from `from` to `to` advancing at most `step` units per frame.
    #[must_use]
    pub fn between(from: Vec2, to: Vec2, step: f32) -> Self {
        let delta = to - from;
        let steps = if step > 0.0 {
            (delta.length() / step).ceil().max(1.0) as u32
        } else {
            1
        };
        Self {
            origin: from,
            increment: delta / steps as f32,
            steps,
        }
    }

    /// Number of animation frames.
    #[must_use]
    pub fn steps(&self) -> u32 {
        self.steps
    }

    /// Point reached after `frame` frames.
    #[must_use]
    pub fn point(&self, frame: u32) -> Vec2 {
        self.origin + self.increment * frame as f32
    }
}

/// Runs projectile loops for ranged agents.
#[derive(Clone)]
pub struct ProjectileSimulator {
    world: Arc<dyn World>,
    scene: Arc<dyn Scene>,
    visuals: VisualQueue,
    timing: Timing,
    layout: Layout,
}

impl ProjectileSimulator {
    /// Creates a simulator targeting obstacles of `world` located through `scene`.
    #[must_use]
    pub fn new(
        world: Arc<dyn World>,
        scene: Arc<dyn Scene>,
        visuals: VisualQueue,
        config: &EngineConfig,
    ) -> Self {
        Self {
            world,
            scene,
            visuals,
            timing: config.timing.clone(),
            layout: config.layout.clone(),
        }
    }

    /// Fires at the lane's nearest obstacle until cancelled or the agent dies.
    pub async fn run(&self, lane: LaneId, agent: &Agent, cancel: &CancelToken) {
        while !cancel.is_cancelled() && !agent.is_dead() {
            let wait = match self.fire(lane, agent, cancel).await {
                Ok(Volley::NoTarget) => self.timing.projectile_idle(),
                Ok(_) => self.timing.projectile_cooldown(),
                Err(Cancelled) => break,
            };
            if pause(cancel, wait).await.is_err() {
                break;
            }
        }
        debug!(%lane, "projectile loop finished");
    }

    /// Performs a single firing cycle without the trailing wait.
    pub async fn fire(
        &self,
        lane: LaneId,
        agent: &Agent,
        cancel: &CancelToken,
    ) -> Result<Volley, Cancelled> {
        let Some(column) = self.world.nearest_obstacle_column(lane) else {
            return Ok(Volley::NoTarget);
        };
        let Some(obstacle) = self.world.obstacle_at(lane, column) else {
            return Ok(Volley::NoTarget);
        };
        let Some(target) = self
            .scene
            .obstacle_visual(lane, column)
            .and_then(|visual| self.scene.center(visual))
        else {
            trace!(%lane, column = column.get(), "obstacle has no visual yet");
            return Ok(Volley::NoTarget);
        };

        let from = self.layout.agent_center(agent.position());
        let trajectory = Trajectory::between(from, target, self.layout.projectile_step);
        let shot = self
            .visuals
            .spawn_transient(SpriteKind::Projectile, self.layout.projectile_origin(from));
        let flight = self.animate(shot, &trajectory, cancel).await;
        self.visuals.remove(shot);
        flight?;

        if obstacle.is_dead() {
            return Ok(Volley::Missed);
        }
        if !obstacle.take_damage(agent.damage()) {
            debug!(%lane, column = column.get(), health = obstacle.health(), "projectile hit");
            return Ok(Volley::Hit);
        }

        self.world.remove_obstacle(lane, column);
        self.visuals.remove_obstacle(lane, column);
        debug!(%lane, column = column.get(), "obstacle destroyed by projectile");
        Ok(Volley::Destroyed)
    }

    async fn animate(
        &self,
        shot: VisualId,
        trajectory: &Trajectory,
        cancel: &CancelToken,
    ) -> Result<(), Cancelled> {
        for frame in 1..=trajectory.steps() {
            cancel.check()?;
            let center = trajectory.point(frame);
            self.visuals
                .set_position(shot, self.layout.projectile_origin(center));
            pause(cancel, self.timing.projectile_frame()).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trajectory_ends_on_the_target() {
        let trajectory =
            Trajectory::between(Vec2::new(320.0, 230.0), Vec2::new(240.0, 230.0), 5.0);
        assert_eq!(trajectory.steps(), 16);
        assert_eq!(trajectory.point(0), Vec2::new(320.0, 230.0));
        assert_eq!(trajectory.point(16), Vec2::new(240.0, 230.0));
    }

    #[test]
    fn partial_steps_round_up() {
        let trajectory = Trajectory::between(Vec2::ZERO, Vec2::new(3.0, 4.0), 2.0);
        assert_eq!(trajectory.steps(), 3);
    }

    #[test]
    fn coincident_points_still_take_one_frame() {
        let trajectory = Trajectory::between(Vec2::ONE, Vec2::ONE, 5.0);
        assert_eq!(trajectory.steps(), 1);
        assert_eq!(trajectory.point(1), Vec2::ONE);
    }
}
