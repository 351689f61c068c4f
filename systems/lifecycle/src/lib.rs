#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Control tasks driving every agent from spawn to exit.
//!
//! Each agent runs one control task on the provided runtime. Ranged agents
//! additionally run a projectile task that is bound to the control task
//! through the registry and cancelled during its cleanup. Cleanup is owned by
//! a guard created before the task is spawned, so it runs exactly once even if
//! the task is cancelled or dropped before its first poll.

use std::sync::Arc;

use glam::Vec2;
use lane_siege_core::{
    pause, Agent, AgentHandle, AgentProfile, CancelToken, Column, EngineConfig, EngineError,
    LaneId, Layout, Outcome, Scene, Timing, VisualId, VisualQueue, World,
};
use lane_siege_system_combat::{CombatSimulator, Engagement};
use lane_siege_system_movement::MovementSimulator;
use lane_siege_system_projectile::ProjectileSimulator;
use lane_siege_system_registry::{AgentEntry, AgentRegistry, ProjectileHandle};
use lane_siege_system_termination::TerminationCoordinator;
use tokio::{runtime::Handle, task::JoinHandle};
use tracing::{debug, info, info_span, Instrument};

/// Terminal state reached by a control task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AgentExit {
    /// The control task observed a cancellation request.
    Cancelled,
    /// The agent's health reached zero.
    Died,
    /// The agent reached the house and consumed the lane's barrier.
    ClearedLane,
    /// The agent reached an undefended house and declared the hostile win.
    DeclaredVictory,
    /// The agent reached the house after the outcome was already settled.
    OutcomeSettled,
}

/// Agent whose control task was just started.
#[derive(Debug)]
pub struct SpawnedAgent {
    /// Handle correlating the control task with its registry entries.
    pub handle: AgentHandle,
    /// Shared agent data.
    pub agent: Arc<Agent>,
    /// Completion of the control task.
    pub join: JoinHandle<AgentExit>,
}

struct Pilot {
    world: Arc<dyn World>,
    visuals: VisualQueue,
    termination: TerminationCoordinator,
    movement: MovementSimulator,
    combat: CombatSimulator,
    timing: Timing,
}

/// Starts agents and exposes the public entry points over running ones.
#[derive(Clone)]
pub struct AgentLifecycleManager {
    pilot: Arc<Pilot>,
    scene: Arc<dyn Scene>,
    registry: Arc<AgentRegistry>,
    projectiles: ProjectileSimulator,
    layout: Layout,
    runtime: Handle,
}

impl AgentLifecycleManager {
    /// Creates a manager spawning control tasks on `runtime`.
    #[must_use]
    pub fn new(
        world: Arc<dyn World>,
        scene: Arc<dyn Scene>,
        visuals: VisualQueue,
        registry: Arc<AgentRegistry>,
        config: &EngineConfig,
        runtime: Handle,
    ) -> Self {
        let pilot = Pilot {
            world: Arc::clone(&world),
            visuals: visuals.clone(),
            termination: TerminationCoordinator::new(Arc::clone(&registry), visuals.clone()),
            movement: MovementSimulator::new(Arc::clone(&world), visuals.clone(), config),
            combat: CombatSimulator::new(Arc::clone(&world), visuals.clone(), config),
            timing: config.timing.clone(),
        };
        let projectiles = ProjectileSimulator::new(world, Arc::clone(&scene), visuals, config);
        Self {
            pilot: Arc::new(pilot),
            scene,
            registry,
            projectiles,
            layout: config.layout.clone(),
            runtime,
        }
    }

    /// Registers an agent bound to `visual` and starts its tasks.
    ///
    /// The agent starts at the visual's current position, or at the lane's
    /// spawn point when the scene does not know the visual.
    pub fn spawn(&self, lane: LaneId, profile: AgentProfile, visual: VisualId) -> SpawnedAgent {
        let position = self
            .scene
            .position(visual)
            .unwrap_or_else(|| self.layout.spawn_point(lane));
        let agent = Arc::new(Agent::new(profile, position));
        let control = CancelToken::new();
        let handle = self
            .registry
            .register(lane, Arc::clone(&agent), visual, control.clone());

        let projectile = profile.kind.fires_projectiles().then(|| {
            let token = CancelToken::new();
            if !self
                .registry
                .bind_projectile(handle, ProjectileHandle::new(token.clone()))
            {
                token.cancel();
            }
            token
        });

        let cleanup = Cleanup {
            registry: Arc::clone(&self.registry),
            visuals: self.pilot.visuals.clone(),
            handle,
        };
        let pilot = Arc::clone(&self.pilot);
        let controlled = Arc::clone(&agent);
        let join = self.runtime.spawn(
            async move {
                let _cleanup = cleanup;
                let exit = pilot.control(lane, &controlled, visual, &control).await;
                info!(?exit, "agent exited");
                exit
            }
            .instrument(info_span!("agent", %handle)),
        );

        if let Some(token) = projectile {
            let projectiles = self.projectiles.clone();
            let shooter = Arc::clone(&agent);
            drop(self.runtime.spawn(
                async move { projectiles.run(lane, &shooter, &token).await }
                    .instrument(info_span!("projectile", %handle)),
            ));
        }

        info!(%handle, kind = ?profile.kind, "agent spawned");
        SpawnedAgent {
            handle,
            agent,
            join,
        }
    }

    /// Current stage position of a registered agent.
    pub fn agent_position(&self, handle: AgentHandle) -> Result<Vec2, EngineError> {
        self.registry
            .agent(handle)
            .map(|agent| agent.position())
            .ok_or(EngineError::AgentNotFound(handle))
    }

    /// Cancels a single agent's control task.
    pub fn terminate_agent(&self, handle: AgentHandle) -> Result<(), EngineError> {
        self.pilot.termination.terminate_agent(handle)
    }

    /// Drains and cancels every agent of the lane, returning how many were drained.
    pub fn terminate_lane(&self, lane: LaneId) -> usize {
        self.pilot.termination.terminate_lane(lane)
    }

    /// Stops every agent of the lane without blaming a barrier.
    pub fn stop_lane(&self, lane: LaneId) -> usize {
        self.pilot.termination.stop_lane(lane)
    }

    /// Earliest registered agent still active in the lane.
    #[must_use]
    pub fn first_agent(&self, lane: LaneId) -> Option<AgentEntry> {
        self.registry.lookup_first(lane)
    }

    /// Number of agents currently registered.
    #[must_use]
    pub fn active_agents(&self) -> usize {
        self.registry.len()
    }
}

impl Pilot {
    async fn control(
        &self,
        lane: LaneId,
        agent: &Agent,
        visual: VisualId,
        cancel: &CancelToken,
    ) -> AgentExit {
        if agent.kind().generates_resources() {
            return self.generate(lane, agent, cancel).await;
        }

        loop {
            if cancel.is_cancelled() {
                return AgentExit::Cancelled;
            }
            if agent.is_dead() {
                return AgentExit::Died;
            }

            let Some(column) = self.world.nearest_obstacle_column(lane) else {
                if self
                    .movement
                    .advance(lane, agent, visual, Column::HOUSE, true, cancel)
                    .await
                {
                    return self.reach_house(lane, agent, cancel);
                }
                continue;
            };

            if !self
                .movement
                .advance(lane, agent, visual, column.adjacent(), true, cancel)
                .await
            {
                continue;
            }

            if agent.kind().fires_projectiles() {
                if pause(cancel, self.timing.attack_interval()).await.is_err() {
                    return AgentExit::Cancelled;
                }
                continue;
            }

            if self.world.nearest_obstacle_column(lane) != Some(column) {
                debug!(%lane, column = column.get(), "target changed before the attack");
                continue;
            }

            match self.combat.attack(lane, column, agent, visual, cancel).await {
                Engagement::Destroyed => {}
                Engagement::TargetMissing | Engagement::TargetGone => {
                    if pause(cancel, self.timing.step_delay()).await.is_err() {
                        return AgentExit::Cancelled;
                    }
                }
                Engagement::AttackerDown => return AgentExit::Died,
                Engagement::Cancelled => return AgentExit::Cancelled,
            }
        }
    }

    fn reach_house(&self, lane: LaneId, agent: &Agent, cancel: &CancelToken) -> AgentExit {
        if cancel.is_cancelled() {
            return AgentExit::Cancelled;
        }
        if agent.is_dead() {
            return AgentExit::Died;
        }

        // The lane is swept before the barrier goes, so any agent that finds
        // it gone is already marked and cancelled.
        if self.world.barrier_present(lane) {
            let drained = self.termination.terminate_lane(lane);
            if self.world.consume_barrier(lane) {
                self.world.remove_all_agents_in_lane(lane);
                self.visuals.remove_barrier(lane);
                info!(%lane, drained, "barrier consumed");
                return AgentExit::ClearedLane;
            }
        }

        if agent.killed_by_barrier() || cancel.is_cancelled() {
            debug!(%lane, "swept by a barrier at the house");
            return AgentExit::Cancelled;
        }

        if !self.world.outcome_already_declared()
            && self.world.declare_outcome(Outcome::HostilesWin)
        {
            self.visuals.announce_outcome(Outcome::HostilesWin);
            info!(%lane, "house reached");
            return AgentExit::DeclaredVictory;
        }

        AgentExit::OutcomeSettled
    }

    async fn generate(&self, lane: LaneId, agent: &Agent, cancel: &CancelToken) -> AgentExit {
        loop {
            if cancel.is_cancelled() {
                return AgentExit::Cancelled;
            }
            if agent.is_dead() {
                return AgentExit::Died;
            }
            self.world.generate_resource(lane);
            if pause(cancel, self.timing.resource_interval()).await.is_err() {
                return AgentExit::Cancelled;
            }
        }
    }
}

/// Finalizer removing an agent from the registry when its control task ends.
struct Cleanup {
    registry: Arc<AgentRegistry>,
    visuals: VisualQueue,
    handle: AgentHandle,
}

impl Drop for Cleanup {
    fn drop(&mut self) {
        // A drained agent was already cleaned up by the termination coordinator.
        let Some(removed) = self.registry.unregister(self.handle) else {
            return;
        };
        if let Some(projectile) = &removed.projectile {
            projectile.cancel();
        }
        self.visuals.remove(removed.visual);
        debug!(handle = %self.handle, "agent cleaned up");
    }
}
