#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Bulk and single-agent termination of running control tasks.

use std::sync::Arc;

use lane_siege_core::{AgentHandle, CauseOfDeath, EngineError, LaneId, VisualQueue};
use lane_siege_system_registry::AgentRegistry;
use tracing::{debug, info};

/// Stops control tasks on behalf of barriers and external callers.
///
/// Termination only signals: cancelled tasks observe the request at their
/// next suspension point and run their own cleanup.
#[derive(Clone, Debug)]
pub struct TerminationCoordinator {
    registry: Arc<AgentRegistry>,
    visuals: VisualQueue,
}

impl TerminationCoordinator {
    /// Creates a coordinator operating on `registry`.
    #[must_use]
    pub fn new(registry: Arc<AgentRegistry>, visuals: VisualQueue) -> Self {
        Self { registry, visuals }
    }

    /// Drains every agent of the lane and cancels its tasks.
    ///
    /// Each drained agent is marked as killed by the barrier before its
    /// control task is cancelled. Returns the number of agents drained, which
    /// is zero when the lane was already empty.
    pub fn terminate_lane(&self, lane: LaneId) -> usize {
        self.sweep(lane, Some(CauseOfDeath::KilledByBarrier))
    }

    /// Drains and cancels every agent of the lane without recording a cause
    /// of death. Used when the encounter shuts down.
    pub fn stop_lane(&self, lane: LaneId) -> usize {
        self.sweep(lane, None)
    }

    fn sweep(&self, lane: LaneId, cause: Option<CauseOfDeath>) -> usize {
        let drained = self.registry.drain_lane(lane);
        for removed in &drained {
            if let Some(cause) = cause {
                let _ = removed.agent.mark_cause_of_death(cause);
            }
            removed.control.cancel();
            self.visuals.remove(removed.visual);
            if let Some(projectile) = &removed.projectile {
                projectile.cancel();
            }
            debug!(handle = %removed.handle, ?cause, "agent drained");
        }
        if !drained.is_empty() {
            info!(%lane, agents = drained.len(), ?cause, "lane terminated");
        }
        drained.len()
    }

    /// Cancels the control task of a single registered agent.
    ///
    /// Repeated calls while the agent is still registered are no-ops.
    pub fn terminate_agent(&self, handle: AgentHandle) -> Result<(), EngineError> {
        let (agent, control) = self
            .registry
            .agent_and_control(handle)
            .ok_or(EngineError::AgentNotFound(handle))?;
        let _ = agent.mark_cause_of_death(CauseOfDeath::KilledInCombat);
        if !control.is_cancelled() {
            control.cancel();
            info!(%handle, "agent terminated");
        }
        Ok(())
    }
}
