#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Shared lookup tables correlating agent handles, lanes, agent data, visual
//! bindings and nested projectile tasks.
//!
//! Tables are sharded per lane. Every operation touching an agent locks
//! exactly one lane shard and updates all of that agent's tables inside the
//! same critical section, so observers never see a partially registered or
//! partially removed agent, and unrelated lanes never contend.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError, RwLock,
    },
};

use lane_siege_core::{Agent, AgentHandle, CancelToken, LaneId, VisualId};
use tracing::trace;

/// Handle of a ranged agent's nested projectile task.
#[derive(Clone, Debug)]
pub struct ProjectileHandle {
    token: CancelToken,
}

impl ProjectileHandle {
    /// Wraps the cancellation token driving a projectile task.
    #[must_use]
    pub fn new(token: CancelToken) -> Self {
        Self { token }
    }

    /// Requests cancellation of the projectile task.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Reports whether the projectile task was asked to stop.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Snapshot of a registered agent.
#[derive(Clone, Debug)]
pub struct AgentEntry {
    /// Handle of the agent's control task.
    pub handle: AgentHandle,
    /// Shared agent data.
    pub agent: Arc<Agent>,
    /// Visual bound to the agent.
    pub visual: VisualId,
}

/// Everything the registry held for an agent at the moment it was removed.
#[derive(Debug)]
pub struct RemovedAgent {
    /// Handle of the agent's control task.
    pub handle: AgentHandle,
    /// Shared agent data.
    pub agent: Arc<Agent>,
    /// Visual bound to the agent.
    pub visual: VisualId,
    /// Cancellation token of the agent's control task.
    pub control: CancelToken,
    /// Nested projectile task, present for ranged agents that still had one bound.
    pub projectile: Option<ProjectileHandle>,
}

#[derive(Debug)]
struct Binding {
    agent: Arc<Agent>,
    visual: VisualId,
    control: CancelToken,
}

#[derive(Debug, Default)]
struct LaneTable {
    order: Vec<AgentHandle>,
    bindings: HashMap<AgentHandle, Binding>,
    projectiles: HashMap<AgentHandle, ProjectileHandle>,
}

impl LaneTable {
    fn remove(&mut self, handle: AgentHandle) -> Option<RemovedAgent> {
        let binding = self.bindings.remove(&handle)?;
        self.order.retain(|candidate| *candidate != handle);
        Some(RemovedAgent {
            handle,
            agent: binding.agent,
            visual: binding.visual,
            control: binding.control,
            projectile: self.projectiles.remove(&handle),
        })
    }

    fn drain(&mut self) -> Vec<RemovedAgent> {
        let order = std::mem::take(&mut self.order);
        let mut projectiles = std::mem::take(&mut self.projectiles);
        let mut bindings = std::mem::take(&mut self.bindings);
        order
            .into_iter()
            .filter_map(|handle| {
                let binding = bindings.remove(&handle)?;
                Some(RemovedAgent {
                    handle,
                    agent: binding.agent,
                    visual: binding.visual,
                    control: binding.control,
                    projectile: projectiles.remove(&handle),
                })
            })
            .collect()
    }
}

/// Lane-sharded registry of running agents.
#[derive(Debug, Default)]
pub struct AgentRegistry {
    lanes: RwLock<BTreeMap<LaneId, Arc<Mutex<LaneTable>>>>,
    next_serial: AtomicU64,
}

impl AgentRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an agent at the back of its lane and allocates its handle.
    pub fn register(
        &self,
        lane: LaneId,
        agent: Arc<Agent>,
        visual: VisualId,
        control: CancelToken,
    ) -> AgentHandle {
        let handle = AgentHandle::new(lane, self.next_serial.fetch_add(1, Ordering::Relaxed));
        let shard = self.shard_or_insert(lane);
        let mut table = lock(&shard);
        table.order.push(handle);
        let _ = table.bindings.insert(
            handle,
            Binding {
                agent,
                visual,
                control,
            },
        );
        drop(table);
        trace!(%handle, "agent registered");
        handle
    }

    /// Earliest registered agent still active in the lane.
    #[must_use]
    pub fn lookup_first(&self, lane: LaneId) -> Option<AgentEntry> {
        let shard = self.shard(lane)?;
        let table = lock(&shard);
        let handle = *table.order.first()?;
        table.bindings.get(&handle).map(|binding| AgentEntry {
            handle,
            agent: Arc::clone(&binding.agent),
            visual: binding.visual,
        })
    }

    /// Binds the projectile task of a registered agent.
    ///
    /// Returns `false` without binding when the agent is no longer registered
    /// or already owns a projectile task; the caller must then cancel the
    /// projectile itself.
    pub fn bind_projectile(&self, handle: AgentHandle, projectile: ProjectileHandle) -> bool {
        let Some(shard) = self.shard(handle.lane()) else {
            return false;
        };
        let mut table = lock(&shard);
        if !table.bindings.contains_key(&handle) || table.projectiles.contains_key(&handle) {
            return false;
        }
        let _ = table.projectiles.insert(handle, projectile);
        true
    }

    /// Removes an agent from every table.
    ///
    /// Returns `None` when the agent was already removed, for example by a
    /// concurrent lane drain.
    pub fn unregister(&self, handle: AgentHandle) -> Option<RemovedAgent> {
        let shard = self.shard(handle.lane())?;
        let removed = lock(&shard).remove(handle);
        if removed.is_some() {
            trace!(%handle, "agent unregistered");
        }
        removed
    }

    /// Removes every agent of a lane in registration order.
    pub fn drain_lane(&self, lane: LaneId) -> Vec<RemovedAgent> {
        let Some(shard) = self.shard(lane) else {
            return Vec::new();
        };
        let drained = lock(&shard).drain();
        trace!(%lane, count = drained.len(), "lane drained");
        drained
    }

    /// Reports whether the handle is registered.
    #[must_use]
    pub fn contains(&self, handle: AgentHandle) -> bool {
        self.with_binding(handle, |_| ()).is_some()
    }

    /// Shared data of a registered agent.
    #[must_use]
    pub fn agent(&self, handle: AgentHandle) -> Option<Arc<Agent>> {
        self.with_binding(handle, |binding| Arc::clone(&binding.agent))
    }

    /// Visual bound to a registered agent.
    #[must_use]
    pub fn visual(&self, handle: AgentHandle) -> Option<VisualId> {
        self.with_binding(handle, |binding| binding.visual)
    }

    /// Cancellation token of a registered agent's control task.
    #[must_use]
    pub fn control(&self, handle: AgentHandle) -> Option<CancelToken> {
        self.with_binding(handle, |binding| binding.control.clone())
    }

    /// Shared data and control token of a registered agent, read together.
    #[must_use]
    pub fn agent_and_control(&self, handle: AgentHandle) -> Option<(Arc<Agent>, CancelToken)> {
        self.with_binding(handle, |binding| {
            (Arc::clone(&binding.agent), binding.control.clone())
        })
    }

    /// Reports whether the agent currently owns a bound projectile task.
    #[must_use]
    pub fn has_projectile(&self, handle: AgentHandle) -> bool {
        self.shard(handle.lane())
            .is_some_and(|shard| lock(&shard).projectiles.contains_key(&handle))
    }

    /// Handles of a lane in registration order.
    #[must_use]
    pub fn lane_handles(&self, lane: LaneId) -> Vec<AgentHandle> {
        self.shard(lane)
            .map(|shard| lock(&shard).order.clone())
            .unwrap_or_default()
    }

    /// Number of agents active in a lane.
    #[must_use]
    pub fn lane_len(&self, lane: LaneId) -> usize {
        self.shard(lane).map_or(0, |shard| lock(&shard).order.len())
    }

    /// Number of agents active across all lanes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shards()
            .iter()
            .map(|shard| lock(shard).order.len())
            .sum()
    }

    /// Reports whether no agent is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn with_binding<T>(&self, handle: AgentHandle, read: impl FnOnce(&Binding) -> T) -> Option<T> {
        let shard = self.shard(handle.lane())?;
        let table = lock(&shard);
        table.bindings.get(&handle).map(read)
    }

    fn shard(&self, lane: LaneId) -> Option<Arc<Mutex<LaneTable>>> {
        self.lanes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&lane)
            .cloned()
    }

    fn shard_or_insert(&self, lane: LaneId) -> Arc<Mutex<LaneTable>> {
        if let Some(shard) = self.shard(lane) {
            return shard;
        }
        let mut lanes = self.lanes.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(lanes.entry(lane).or_default())
    }

    fn shards(&self) -> Vec<Arc<Mutex<LaneTable>>> {
        self.lanes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }
}

fn lock(shard: &Mutex<LaneTable>) -> MutexGuard<'_, LaneTable> {
    shard.lock().unwrap_or_else(PoisonError::into_inner)
}
