#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Reference in-memory world for Lane Siege.
//!
//! [`Garden`] owns the defenders and barriers of every lane, the defender
//! score, the hostile resource counter and the single outcome slot. Every
//! board mutation the agent systems request through the [`World`] trait is
//! journaled as a [`Notice`] so adapters and tests can replay what happened.
//! Resource ticks are only counted.

use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicI64, AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
};

use lane_siege_core::{Column, LaneId, Obstacle, ObstacleRef, Outcome, World};
use tracing::{debug, info, trace};

/// Bookkeeping record of a world mutation requested by the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Notice {
    /// An obstacle was removed from a cell.
    ObstacleRemoved {
        /// Lane of the removed obstacle.
        lane: LaneId,
        /// Column of the removed obstacle.
        column: Column,
    },
    /// The defenders lost an obstacle to close combat and paid its cost.
    ObstacleLost {
        /// Lane of the lost obstacle.
        lane: LaneId,
        /// Column of the lost obstacle.
        column: Column,
        /// Score debited for the loss.
        cost: u32,
    },
    /// Every agent in a lane was removed at once.
    LaneCleared {
        /// Cleared lane.
        lane: LaneId,
    },
    /// A barrier was consumed.
    BarrierConsumed {
        /// Lane whose barrier was consumed.
        lane: LaneId,
    },
    /// The encounter outcome was declared.
    OutcomeDeclared {
        /// Declared outcome.
        outcome: Outcome,
    },
}

#[derive(Debug, Default)]
struct LaneState {
    obstacles: BTreeMap<Column, ObstacleRef>,
    barrier: bool,
}

/// Authoritative board state shared by every agent task.
#[derive(Debug, Default)]
pub struct Garden {
    lanes: Mutex<BTreeMap<LaneId, LaneState>>,
    outcome: Mutex<Option<Outcome>>,
    journal: Mutex<Vec<Notice>>,
    score: AtomicI64,
    resources: AtomicU64,
}

impl Garden {
    /// Creates an empty garden with a zero score.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty garden wrapped for sharing with agent tasks.
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Places an obstacle in a cell, replacing any previous occupant.
    pub fn plant(&self, lane: LaneId, column: Column, health: i32, cost: u32) -> ObstacleRef {
        let obstacle = Arc::new(Obstacle::new(column, health, cost));
        let _ = self
            .lanes()
            .entry(lane)
            .or_default()
            .obstacles
            .insert(column, Arc::clone(&obstacle));
        obstacle
    }

    /// Arms the barrier guarding a lane.
    pub fn place_barrier(&self, lane: LaneId) {
        self.lanes().entry(lane).or_default().barrier = true;
    }

    /// Adjusts the defender score by `delta`.
    pub fn adjust_score(&self, delta: i64) {
        let _ = self.score.fetch_add(delta, Ordering::AcqRel);
    }

    fn lanes(&self) -> MutexGuard<'_, BTreeMap<LaneId, LaneState>> {
        self.lanes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, notice: Notice) {
        self.journal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notice);
    }
}

impl World for Garden {
    fn nearest_obstacle_column(&self, lane: LaneId) -> Option<Column> {
        let lanes = self.lanes();
        lanes.get(&lane).and_then(|state| {
            state
                .obstacles
                .iter()
                .rev()
                .find(|(_, obstacle)| !obstacle.is_dead())
                .map(|(column, _)| *column)
        })
    }

    fn barrier_present(&self, lane: LaneId) -> bool {
        self.lanes().get(&lane).is_some_and(|state| state.barrier)
    }

    fn consume_barrier(&self, lane: LaneId) -> bool {
        let consumed = self
            .lanes()
            .get_mut(&lane)
            .is_some_and(|state| std::mem::take(&mut state.barrier));
        if consumed {
            self.record(Notice::BarrierConsumed { lane });
        }
        consumed
    }

    fn obstacle_at(&self, lane: LaneId, column: Column) -> Option<ObstacleRef> {
        self.lanes()
            .get(&lane)
            .and_then(|state| state.obstacles.get(&column))
            .filter(|obstacle| !obstacle.is_dead())
            .cloned()
    }

    fn remove_obstacle(&self, lane: LaneId, column: Column) {
        let removed = self
            .lanes()
            .get_mut(&lane)
            .and_then(|state| state.obstacles.remove(&column));
        if removed.is_some() {
            debug!(%lane, column = column.get(), "obstacle removed");
            self.record(Notice::ObstacleRemoved { lane, column });
        }
    }

    fn obstacle_lost(&self, lane: LaneId, obstacle: &Obstacle) {
        self.adjust_score(-i64::from(obstacle.cost()));
        self.record(Notice::ObstacleLost {
            lane,
            column: obstacle.column(),
            cost: obstacle.cost(),
        });
    }

    fn remove_all_agents_in_lane(&self, lane: LaneId) {
        self.record(Notice::LaneCleared { lane });
    }

    fn declare_outcome(&self, outcome: Outcome) -> bool {
        let mut slot = self.outcome.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return false;
        }
        *slot = Some(outcome);
        drop(slot);
        info!(%outcome, "outcome declared");
        self.record(Notice::OutcomeDeclared { outcome });
        true
    }

    fn outcome_already_declared(&self) -> bool {
        self.outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    // Counted, not journaled.
    fn generate_resource(&self, lane: LaneId) {
        let ticks = self.resources.fetch_add(1, Ordering::AcqRel) + 1;
        trace!(%lane, ticks, "resource generated");
    }
}

/// Read-only queries over a [`Garden`].
pub mod query {
    use std::sync::PoisonError;

    use lane_siege_core::{Column, LaneId, ObstacleRef, Outcome};

    use super::{Garden, Notice};

    /// Current defender score.
    #[must_use]
    pub fn score(garden: &Garden) -> i64 {
        garden.score.load(std::sync::atomic::Ordering::Acquire)
    }

    /// Resource ticks produced so far.
    #[must_use]
    pub fn resources(garden: &Garden) -> u64 {
        garden.resources.load(std::sync::atomic::Ordering::Acquire)
    }

    /// Declared outcome, if any.
    #[must_use]
    pub fn outcome(garden: &Garden) -> Option<Outcome> {
        *garden
            .outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the journal in the order notices were recorded.
    #[must_use]
    pub fn notices(garden: &Garden) -> Vec<Notice> {
        garden
            .journal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of journaled notices matching `predicate`.
    #[must_use]
    pub fn count_notices(garden: &Garden, predicate: impl Fn(&Notice) -> bool) -> usize {
        garden
            .journal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|notice| predicate(notice))
            .count()
    }

    /// Obstacles of a lane ordered by column, including dead ones awaiting removal.
    #[must_use]
    pub fn obstacles(garden: &Garden, lane: LaneId) -> Vec<ObstacleRef> {
        garden
            .lanes()
            .get(&lane)
            .map(|state| state.obstacles.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Lanes that still hold an armed barrier.
    #[must_use]
    pub fn barrier_lanes(garden: &Garden) -> Vec<LaneId> {
        garden
            .lanes()
            .iter()
            .filter(|(_, state)| state.barrier)
            .map(|(lane, _)| *lane)
            .collect()
    }

    /// Health of the obstacle in a cell, dead or alive.
    #[must_use]
    pub fn obstacle_health(garden: &Garden, lane: LaneId, column: Column) -> Option<i32> {
        garden
            .lanes()
            .get(&lane)
            .and_then(|state| state.obstacles.get(&column))
            .map(|obstacle| obstacle.health())
    }
}
