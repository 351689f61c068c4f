#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Core contracts shared across the Lane Siege engine.
//!
//! This crate defines the vocabulary that connects the agent systems, the
//! authoritative [`World`] collaborator, and the presentation layer. Systems
//! read world state through the [`World`] trait and geometry through the
//! [`Scene`] trait, mutate agent and obstacle data through the atomic fields
//! on [`Agent`] and [`Obstacle`], and never touch visual state directly:
//! every visual mutation is enqueued on a [`VisualQueue`] drained by a single
//! presentation consumer.

mod config;
mod task;
mod visual;

use std::{
    fmt,
    sync::{
        atomic::{AtomicI32, AtomicU8, Ordering},
        Arc, Mutex, PoisonError,
    },
};

use glam::Vec2;
use thiserror::Error;

pub use config::{ConfigError, EngineConfig, Layout, Timing};
pub use task::{pause, CancelToken, Cancelled};
pub use visual::{Scene, SpriteKind, VisualCommand, VisualId, VisualIds, VisualQueue};

/// Canonical banner emitted when the experience boots.
pub const WELCOME_BANNER: &str = "Welcome to Lane Siege.";

/// Identifier of a single lane on the board.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LaneId(u32);

impl LaneId {
    /// Creates a new lane identifier with the provided index.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the zero-based lane index.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for LaneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lane {}", self.0)
    }
}

/// Zero-based column within a lane. Column zero borders the defended house.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Column(u32);

impl Column {
    /// The column adjacent to the defended house.
    pub const HOUSE: Column = Column(0);

    /// Creates a new column wrapper.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the underlying column index.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }

    /// Column directly behind this one from the point of view of an attacker.
    ///
    /// Attackers halt here to engage an obstacle without overlapping it.
    #[must_use]
    pub const fn adjacent(&self) -> Column {
        Column(self.0.saturating_add(1))
    }
}

/// Opaque identifier correlating a running agent task with its registry entries.
///
/// Handles are allocated by the agent registry; the embedded lane lets lookups
/// go straight to the owning lane shard.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AgentHandle {
    lane: LaneId,
    serial: u64,
}

impl AgentHandle {
    /// Creates a handle for the provided lane and registry serial.
    #[must_use]
    pub const fn new(lane: LaneId, serial: u64) -> Self {
        Self { lane, serial }
    }

    /// Lane the agent was registered into.
    #[must_use]
    pub const fn lane(&self) -> LaneId {
        self.lane
    }

    /// Registry-wide unique serial number.
    #[must_use]
    pub const fn serial(&self) -> u64 {
        self.serial
    }
}

impl fmt::Display for AgentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "agent#{}@{}", self.serial, self.lane.0)
    }
}

/// Capability set an agent is dispatched on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AgentKind {
    /// Walks up to obstacles and damages them at close range.
    MeleeAttacker,
    /// Stays put and produces resources for the hostile side.
    ResourceGenerator,
    /// Walks like a melee attacker but damages obstacles with projectiles only.
    RangedAttacker,
}

impl AgentKind {
    /// Reports whether the kind owns a nested projectile task.
    #[must_use]
    pub const fn fires_projectiles(self) -> bool {
        matches!(self, Self::RangedAttacker)
    }

    /// Reports whether the kind engages obstacles in close combat.
    #[must_use]
    pub const fn engages_in_melee(self) -> bool {
        matches!(self, Self::MeleeAttacker)
    }

    /// Reports whether the kind runs the resource loop instead of advancing.
    #[must_use]
    pub const fn generates_resources(self) -> bool {
        matches!(self, Self::ResourceGenerator)
    }
}

/// Reason an agent left the board before finishing its own loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CauseOfDeath {
    /// Swept away together with the rest of its lane by a barrier.
    KilledByBarrier,
    /// Terminated individually, typically by defender fire.
    KilledInCombat,
}

impl CauseOfDeath {
    const fn encode(self) -> u8 {
        match self {
            Self::KilledByBarrier => 1,
            Self::KilledInCombat => 2,
        }
    }

    const fn decode(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::KilledByBarrier),
            2 => Some(Self::KilledInCombat),
            _ => None,
        }
    }
}

/// Static stats used to construct an [`Agent`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AgentProfile {
    /// Capability set of the agent.
    pub kind: AgentKind,
    /// Starting health.
    pub health: i32,
    /// Damage dealt per melee hit or projectile impact.
    pub damage: i32,
}

impl AgentProfile {
    /// Baseline walker that bites obstacles.
    #[must_use]
    pub const fn melee() -> Self {
        Self {
            kind: AgentKind::MeleeAttacker,
            health: 100,
            damage: 20,
        }
    }

    /// Stationary agent producing resources.
    #[must_use]
    pub const fn resource_generator() -> Self {
        Self {
            kind: AgentKind::ResourceGenerator,
            health: 300,
            damage: 0,
        }
    }

    /// Walker that attacks with projectiles.
    #[must_use]
    pub const fn ranged() -> Self {
        Self {
            kind: AgentKind::RangedAttacker,
            health: 200,
            damage: 20,
        }
    }

    /// Returns the profile with its health replaced.
    #[must_use]
    pub const fn with_health(mut self, health: i32) -> Self {
        self.health = health;
        self
    }

    /// Returns the profile with its damage replaced.
    #[must_use]
    pub const fn with_damage(mut self, damage: i32) -> Self {
        self.damage = damage;
        self
    }
}

/// Shared data of a live agent.
///
/// Health only ever decreases. The cause of death is written at most once;
/// the first writer wins, which lets the termination coordinator win races
/// against an agent's own bookkeeping.
#[derive(Debug)]
pub struct Agent {
    kind: AgentKind,
    damage: i32,
    health: AtomicI32,
    cause: AtomicU8,
    position: Mutex<Vec2>,
}

impl Agent {
    /// Creates a new agent from a profile, placed at the provided stage position.
    #[must_use]
    pub fn new(profile: AgentProfile, position: Vec2) -> Self {
        Self {
            kind: profile.kind,
            damage: profile.damage,
            health: AtomicI32::new(profile.health),
            cause: AtomicU8::new(0),
            position: Mutex::new(position),
        }
    }

    /// Capability set of the agent.
    #[must_use]
    pub fn kind(&self) -> AgentKind {
        self.kind
    }

    /// Damage dealt per hit.
    #[must_use]
    pub fn damage(&self) -> i32 {
        self.damage
    }

    /// Remaining health.
    #[must_use]
    pub fn health(&self) -> i32 {
        self.health.load(Ordering::Acquire)
    }

    /// Reports whether health dropped to zero or below.
    #[must_use]
    pub fn is_dead(&self) -> bool {
        self.health() <= 0
    }

    /// Applies damage and reports whether this call killed the agent.
    pub fn take_damage(&self, amount: i32) -> bool {
        apply_damage(&self.health, amount)
    }

    /// Cause of death recorded so far, if any.
    #[must_use]
    pub fn cause_of_death(&self) -> Option<CauseOfDeath> {
        CauseOfDeath::decode(self.cause.load(Ordering::Acquire))
    }

    /// Records the cause of death unless one is already set.
    ///
    /// Returns `true` when this call recorded the cause.
    pub fn mark_cause_of_death(&self, cause: CauseOfDeath) -> bool {
        self.cause
            .compare_exchange(0, cause.encode(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Reports whether a barrier swept the agent away.
    #[must_use]
    pub fn killed_by_barrier(&self) -> bool {
        self.cause_of_death() == Some(CauseOfDeath::KilledByBarrier)
    }

    /// Top-left stage position of the agent's sprite.
    #[must_use]
    pub fn position(&self) -> Vec2 {
        *self.position.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Updates the engine-side copy of the sprite position.
    pub fn set_position(&self, position: Vec2) {
        *self.position.lock().unwrap_or_else(PoisonError::into_inner) = position;
    }
}

/// Stationary defender owned by the [`World`].
#[derive(Debug)]
pub struct Obstacle {
    column: Column,
    cost: u32,
    health: AtomicI32,
}

/// Shared reference to an obstacle handed out by the [`World`].
pub type ObstacleRef = Arc<Obstacle>;

impl Obstacle {
    /// Creates an obstacle standing in the provided column.
    #[must_use]
    pub fn new(column: Column, health: i32, cost: u32) -> Self {
        Self {
            column,
            cost,
            health: AtomicI32::new(health),
        }
    }

    /// Column the obstacle occupies.
    #[must_use]
    pub fn column(&self) -> Column {
        self.column
    }

    /// Resource cost paid to place the obstacle.
    #[must_use]
    pub fn cost(&self) -> u32 {
        self.cost
    }

    /// Remaining health.
    #[must_use]
    pub fn health(&self) -> i32 {
        self.health.load(Ordering::Acquire)
    }

    /// Reports whether health dropped to zero or below.
    #[must_use]
    pub fn is_dead(&self) -> bool {
        self.health() <= 0
    }

    /// Applies damage and reports whether this call killed the obstacle.
    ///
    /// Exactly one caller observes `true` for a given obstacle, so only the
    /// killing blow reports the removal.
    pub fn take_damage(&self, amount: i32) -> bool {
        apply_damage(&self.health, amount)
    }
}

fn apply_damage(health: &AtomicI32, amount: i32) -> bool {
    let amount = amount.max(0);
    let previous = match health.fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
        Some(current.saturating_sub(amount))
    }) {
        Ok(previous) | Err(previous) => previous,
    };
    previous > 0 && previous.saturating_sub(amount) <= 0
}

/// Final result of an encounter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// An agent reached the house through an undefended lane.
    HostilesWin,
    /// The defenders held every lane.
    DefendersWin,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HostilesWin => f.write_str("the zombies have won"),
            Self::DefendersWin => f.write_str("the plants have won"),
        }
    }
}

/// Authoritative board state consumed by the agent systems.
///
/// Implementations are shared across agent tasks and must be internally
/// synchronized. "Not found" answers are expected whenever another task won a
/// race and are never treated as failures.
pub trait World: Send + Sync {
    /// Column of the obstacle closest to the incoming agents, if any.
    fn nearest_obstacle_column(&self, lane: LaneId) -> Option<Column>;

    /// Reports whether the lane still holds its barrier.
    fn barrier_present(&self, lane: LaneId) -> bool;

    /// Removes the lane's barrier, returning `true` only for the caller that consumed it.
    fn consume_barrier(&self, lane: LaneId) -> bool;

    /// Obstacle standing in the provided cell, if any.
    fn obstacle_at(&self, lane: LaneId, column: Column) -> Option<ObstacleRef>;

    /// Removes the obstacle standing in the provided cell.
    fn remove_obstacle(&self, lane: LaneId, column: Column);

    /// Score bookkeeping hook invoked when an agent destroys an obstacle in close combat.
    fn obstacle_lost(&self, lane: LaneId, obstacle: &Obstacle);

    /// Notifies world-side bookkeeping that every agent in the lane is being removed.
    fn remove_all_agents_in_lane(&self, lane: LaneId);

    /// Declares the encounter outcome, returning `true` for the first declaration only.
    fn declare_outcome(&self, outcome: Outcome) -> bool;

    /// Reports whether an outcome was already declared.
    fn outcome_already_declared(&self) -> bool;

    /// Credits one resource tick produced by an agent in the lane.
    fn generate_resource(&self, lane: LaneId);
}

/// Errors surfaced by the public engine entry points.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    /// The handle does not belong to a registered agent.
    #[error("{0} is not registered")]
    AgentNotFound(AgentHandle),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adjacent_column_is_one_step_behind() {
        assert_eq!(Column::new(5).adjacent(), Column::new(6));
        assert_eq!(Column::new(u32::MAX).adjacent(), Column::new(u32::MAX));
    }

    #[test]
    fn obstacle_reports_the_killing_blow_once() {
        let obstacle = Obstacle::new(Column::new(3), 50, 100);
        assert!(!obstacle.take_damage(20));
        assert!(!obstacle.take_damage(20));
        assert!(obstacle.take_damage(20), "third hit crosses zero");
        assert!(obstacle.is_dead());
        assert!(!obstacle.take_damage(20), "corpses cannot be killed again");
        assert_eq!(obstacle.health(), -40);
    }

    #[test]
    fn negative_damage_never_heals() {
        let agent = Agent::new(AgentProfile::melee(), Vec2::ZERO);
        assert!(!agent.take_damage(-50));
        assert_eq!(agent.health(), 100);
    }

    #[test]
    fn first_cause_of_death_wins() {
        let agent = Agent::new(AgentProfile::ranged(), Vec2::ZERO);
        assert_eq!(agent.cause_of_death(), None);
        assert!(agent.mark_cause_of_death(CauseOfDeath::KilledByBarrier));
        assert!(!agent.mark_cause_of_death(CauseOfDeath::KilledInCombat));
        assert!(agent.killed_by_barrier());
    }

    #[test]
    fn agent_position_is_shared_state() {
        let agent = Agent::new(AgentProfile::melee(), Vec2::new(680.0, 80.0));
        agent.set_position(Vec2::new(675.0, 80.0));
        assert_eq!(agent.position(), Vec2::new(675.0, 80.0));
    }

    #[test]
    fn kinds_dispatch_to_distinct_capabilities() {
        assert!(AgentKind::MeleeAttacker.engages_in_melee());
        assert!(!AgentKind::RangedAttacker.engages_in_melee());
        assert!(AgentKind::RangedAttacker.fires_projectiles());
        assert!(AgentKind::ResourceGenerator.generates_resources());
        assert!(!AgentKind::ResourceGenerator.fires_projectiles());
    }
}
