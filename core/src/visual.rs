//! Visual bindings and the single-consumer update channel.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    mpsc::{self, Receiver, Sender},
    Arc,
};

use glam::Vec2;
use tracing::warn;

use crate::{AgentKind, Column, LaneId, Outcome};

/// Opaque handle to a screen representation owned by the presentation layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VisualId(u64);

impl VisualId {
    /// Creates a visual identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u64 {
        self.0
    }
}

/// Allocator shared by every party that creates visuals.
#[derive(Clone, Debug, Default)]
pub struct VisualIds {
    next: Arc<AtomicU64>,
}

impl VisualIds {
    /// Creates an allocator whose first identifier is `1`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a fresh identifier.
    #[must_use]
    pub fn allocate(&self) -> VisualId {
        VisualId(self.next.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

/// Kind of sprite a visual represents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SpriteKind {
    /// A hostile agent.
    Agent(AgentKind),
    /// A defender standing in a lane.
    Obstacle,
    /// A transient projectile fired by a ranged agent.
    Projectile,
    /// A lane-clearing barrier.
    Barrier,
}

/// Requests marshaled from simulation tasks to the presentation consumer.
#[derive(Clone, Debug, PartialEq)]
pub enum VisualCommand {
    /// Moves a visual to a new top-left stage position.
    SetPosition {
        /// Visual to move.
        visual: VisualId,
        /// New top-left position in stage space.
        position: Vec2,
    },
    /// Creates a short-lived visual whose identifier was allocated by the sender.
    SpawnTransient {
        /// Identifier reserved for the new visual.
        visual: VisualId,
        /// Kind of sprite to create.
        kind: SpriteKind,
        /// Top-left position in stage space.
        position: Vec2,
    },
    /// Removes a visual. Unknown visuals are ignored.
    Remove {
        /// Visual to remove.
        visual: VisualId,
    },
    /// Removes the visual of the obstacle standing in a cell.
    RemoveObstacle {
        /// Lane of the destroyed obstacle.
        lane: LaneId,
        /// Column of the destroyed obstacle.
        column: Column,
    },
    /// Removes the visual of a consumed barrier.
    RemoveBarrier {
        /// Lane whose barrier was consumed.
        lane: LaneId,
    },
    /// Presents the final outcome of the encounter.
    AnnounceOutcome {
        /// Declared outcome.
        outcome: Outcome,
    },
}

/// Sending half of the visual update channel.
///
/// Clones are handed to every simulation task. The receiving half belongs to
/// exactly one presentation consumer, which is the only code that mutates
/// visual state.
#[derive(Clone, Debug)]
pub struct VisualQueue {
    sender: Sender<VisualCommand>,
    ids: VisualIds,
}

impl VisualQueue {
    /// Opens a new channel whose transient visuals draw from `ids`.
    #[must_use]
    pub fn channel(ids: VisualIds) -> (Self, Receiver<VisualCommand>) {
        let (sender, receiver) = mpsc::channel();
        (Self { sender, ids }, receiver)
    }

    /// Enqueues a position update.
    pub fn set_position(&self, visual: VisualId, position: Vec2) {
        self.submit(VisualCommand::SetPosition { visual, position });
    }

    /// Reserves an identifier and enqueues creation of a transient visual.
    #[must_use]
    pub fn spawn_transient(&self, kind: SpriteKind, position: Vec2) -> VisualId {
        let visual = self.ids.allocate();
        self.submit(VisualCommand::SpawnTransient {
            visual,
            kind,
            position,
        });
        visual
    }

    /// Enqueues removal of a visual.
    pub fn remove(&self, visual: VisualId) {
        self.submit(VisualCommand::Remove { visual });
    }

    /// Enqueues removal of an obstacle's visual.
    pub fn remove_obstacle(&self, lane: LaneId, column: Column) {
        self.submit(VisualCommand::RemoveObstacle { lane, column });
    }

    /// Enqueues removal of a barrier's visual.
    pub fn remove_barrier(&self, lane: LaneId) {
        self.submit(VisualCommand::RemoveBarrier { lane });
    }

    /// Enqueues the outcome announcement.
    pub fn announce_outcome(&self, outcome: Outcome) {
        self.submit(VisualCommand::AnnounceOutcome { outcome });
    }

    fn submit(&self, command: VisualCommand) {
        if let Err(mpsc::SendError(command)) = self.sender.send(command) {
            warn!(?command, "presentation consumer gone; dropping visual update");
        }
    }
}

/// Read-only geometry queries answered by the presentation layer.
///
/// All coordinates share one stage space, so centers of unrelated visuals can
/// be compared directly.
pub trait Scene: Send + Sync {
    /// Top-left position of a visual.
    fn position(&self, visual: VisualId) -> Option<Vec2>;

    /// Center point of a visual.
    fn center(&self, visual: VisualId) -> Option<Vec2>;

    /// Visual bound to the obstacle standing in a cell.
    fn obstacle_visual(&self, lane: LaneId, column: Column) -> Option<VisualId>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_visuals_reserve_fresh_ids() {
        let ids = VisualIds::new();
        let reserved = ids.allocate();
        let (queue, receiver) = VisualQueue::channel(ids);

        let spawned = queue.spawn_transient(SpriteKind::Projectile, Vec2::new(10.0, 20.0));
        queue.remove(spawned);

        assert_ne!(reserved, spawned);
        assert_eq!(
            receiver.try_iter().collect::<Vec<_>>(),
            vec![
                VisualCommand::SpawnTransient {
                    visual: spawned,
                    kind: SpriteKind::Projectile,
                    position: Vec2::new(10.0, 20.0),
                },
                VisualCommand::Remove { visual: spawned },
            ],
        );
    }

    #[test]
    fn closed_channel_drops_updates_silently() {
        let (queue, receiver) = VisualQueue::channel(VisualIds::new());
        drop(receiver);
        queue.set_position(VisualId::new(1), Vec2::ZERO);
        queue.announce_outcome(Outcome::HostilesWin);
    }
}
