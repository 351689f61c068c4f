#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Presentation-side consumer of the Lane Siege visual update channel.
//!
//! [`Stage`] owns the receiving half of the channel and is the only code that
//! mutates sprite state. Simulation tasks read geometry through a cloned
//! [`StageProbe`], which implements [`Scene`] over a snapshot the stage keeps
//! current while it applies commands.

use std::{
    collections::BTreeMap,
    io::Write,
    sync::{mpsc::Receiver, Arc, PoisonError, RwLock},
};

use anyhow::Result as AnyResult;
use glam::Vec2;
use lane_siege_core::{
    AgentKind, Column, LaneId, Layout, Outcome, Scene, SpriteKind, VisualCommand, VisualId,
    VisualIds, VisualQueue,
};
use tracing::{debug, info};

/// Sprite drawn on the stage.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sprite {
    /// What the sprite depicts.
    pub kind: SpriteKind,
    /// Top-left corner in stage space.
    pub position: Vec2,
    /// Width and height in stage units.
    pub size: Vec2,
}

impl Sprite {
    /// Center point in stage space.
    #[must_use]
    pub fn center(&self) -> Vec2 {
        self.position + self.size * 0.5
    }
}

#[derive(Debug, Default)]
struct Geometry {
    sprites: BTreeMap<VisualId, Sprite>,
    obstacles: BTreeMap<(LaneId, Column), VisualId>,
    barriers: BTreeMap<LaneId, VisualId>,
}

impl Geometry {
    fn remove(&mut self, visual: VisualId) -> bool {
        self.obstacles.retain(|_, bound| *bound != visual);
        self.barriers.retain(|_, bound| *bound != visual);
        self.sprites.remove(&visual).is_some()
    }
}

/// Counters describing the commands a stage has applied.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StageStats {
    /// Commands applied in total.
    pub applied: usize,
    /// Position updates applied.
    pub moves: usize,
    /// Projectile sprites created.
    pub projectiles_spawned: usize,
    /// Sprites removed by identifier.
    pub removed: usize,
    /// Obstacle sprites removed.
    pub obstacles_removed: usize,
    /// Barrier sprites removed.
    pub barriers_removed: usize,
}

/// Read-only view of a stage shared with simulation tasks.
#[derive(Clone, Debug)]
pub struct StageProbe {
    geometry: Arc<RwLock<Geometry>>,
}

impl StageProbe {
    fn read<T>(&self, view: impl FnOnce(&Geometry) -> T) -> T {
        view(&self.geometry.read().unwrap_or_else(PoisonError::into_inner))
    }
}

impl Scene for StageProbe {
    fn position(&self, visual: VisualId) -> Option<Vec2> {
        self.read(|geometry| geometry.sprites.get(&visual).map(|sprite| sprite.position))
    }

    fn center(&self, visual: VisualId) -> Option<Vec2> {
        self.read(|geometry| geometry.sprites.get(&visual).map(Sprite::center))
    }

    fn obstacle_visual(&self, lane: LaneId, column: Column) -> Option<VisualId> {
        self.read(|geometry| geometry.obstacles.get(&(lane, column)).copied())
    }
}

/// Single consumer of visual updates.
///
/// The receiver it owns makes the stage `Send` but not `Sync`.
#[derive(Debug)]
pub struct Stage {
    receiver: Receiver<VisualCommand>,
    geometry: Arc<RwLock<Geometry>>,
    ids: VisualIds,
    layout: Layout,
    outcome: Option<Outcome>,
    stats: StageStats,
}

impl Stage {
    /// Creates a stage and the queue simulation tasks publish to.
    #[must_use]
    pub fn new(layout: Layout) -> (Self, VisualQueue) {
        let ids = VisualIds::new();
        let (queue, receiver) = VisualQueue::channel(ids.clone());
        let stage = Self {
            receiver,
            geometry: Arc::default(),
            ids,
            layout,
            outcome: None,
            stats: StageStats::default(),
        };
        (stage, queue)
    }

    /// Read-only geometry handle for simulation tasks.
    #[must_use]
    pub fn probe(&self) -> StageProbe {
        StageProbe {
            geometry: Arc::clone(&self.geometry),
        }
    }

    /// Creates the sprite of an agent entering a lane.
    pub fn add_agent(&mut self, lane: LaneId, kind: AgentKind) -> VisualId {
        let sprite = Sprite {
            kind: SpriteKind::Agent(kind),
            position: self.layout.spawn_point(lane),
            size: self.layout.agent_size(),
        };
        self.insert(sprite)
    }

    /// Creates the sprite of an obstacle standing in a cell.
    pub fn add_obstacle(&mut self, lane: LaneId, column: Column) -> VisualId {
        let sprite = Sprite {
            kind: SpriteKind::Obstacle,
            position: self.layout.cell_origin(lane, column),
            size: Vec2::new(self.layout.cell_width, self.layout.lane_height),
        };
        let visual = self.insert(sprite);
        let mut geometry = self.write();
        if let Some(previous) = geometry.obstacles.insert((lane, column), visual) {
            let _ = geometry.sprites.remove(&previous);
        }
        visual
    }

    /// Creates the sprite of a lane's barrier, left of the house column.
    pub fn add_barrier(&mut self, lane: LaneId) -> VisualId {
        let sprite = Sprite {
            kind: SpriteKind::Barrier,
            position: Vec2::new(
                self.layout.grid_origin_x - self.layout.cell_width,
                self.layout.lane_y(lane),
            ),
            size: Vec2::new(self.layout.cell_width, self.layout.lane_height),
        };
        let visual = self.insert(sprite);
        let _ = self.write().barriers.insert(lane, visual);
        visual
    }

    /// Applies every pending command and returns how many were applied.
    pub fn pump(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(command) = self.receiver.try_recv() {
            self.apply(command);
            applied += 1;
        }
        applied
    }

    /// Applies a single command.
    pub fn apply(&mut self, command: VisualCommand) {
        self.stats.applied += 1;
        match command {
            VisualCommand::SetPosition { visual, position } => {
                if let Some(sprite) = self.write().sprites.get_mut(&visual) {
                    sprite.position = position;
                }
                self.stats.moves += 1;
            }
            VisualCommand::SpawnTransient {
                visual,
                kind,
                position,
            } => {
                let size = match kind {
                    SpriteKind::Projectile => Vec2::splat(self.layout.projectile_size),
                    SpriteKind::Agent(_) => self.layout.agent_size(),
                    SpriteKind::Obstacle | SpriteKind::Barrier => {
                        Vec2::new(self.layout.cell_width, self.layout.lane_height)
                    }
                };
                let _ = self.write().sprites.insert(
                    visual,
                    Sprite {
                        kind,
                        position,
                        size,
                    },
                );
                if kind == SpriteKind::Projectile {
                    self.stats.projectiles_spawned += 1;
                }
            }
            VisualCommand::Remove { visual } => {
                if self.write().remove(visual) {
                    self.stats.removed += 1;
                }
            }
            VisualCommand::RemoveObstacle { lane, column } => {
                let removed = {
                    let mut geometry = self.write();
                    let visual = geometry.obstacles.remove(&(lane, column));
                    visual.map(|visual| geometry.sprites.remove(&visual))
                };
                if removed.is_some() {
                    self.stats.obstacles_removed += 1;
                    debug!(%lane, column = column.get(), "obstacle sprite removed");
                }
            }
            VisualCommand::RemoveBarrier { lane } => {
                let removed = {
                    let mut geometry = self.write();
                    let visual = geometry.barriers.remove(&lane);
                    visual.map(|visual| geometry.sprites.remove(&visual))
                };
                if removed.is_some() {
                    self.stats.barriers_removed += 1;
                    debug!(%lane, "barrier sprite removed");
                }
            }
            VisualCommand::AnnounceOutcome { outcome } => {
                if self.outcome.is_none() {
                    info!(%outcome, "announcing outcome");
                    self.outcome = Some(outcome);
                }
            }
        }
    }

    /// Outcome announced so far.
    #[must_use]
    pub fn outcome(&self) -> Option<Outcome> {
        self.outcome
    }

    /// Counters of applied commands.
    #[must_use]
    pub fn stats(&self) -> StageStats {
        self.stats
    }

    /// Copy of a sprite's current state.
    #[must_use]
    pub fn sprite(&self, visual: VisualId) -> Option<Sprite> {
        self.read().sprites.get(&visual).copied()
    }

    /// Number of sprites of the provided kind currently on stage.
    #[must_use]
    pub fn count(&self, kind: SpriteKind) -> usize {
        self.read()
            .sprites
            .values()
            .filter(|sprite| sprite.kind == kind)
            .count()
    }

    /// Renders the stage as one text row per lane.
    ///
    /// Column zero is preceded by the barrier slot; the last column is the
    /// spawn column.
    #[must_use]
    pub fn frame(&self, lanes: u32) -> Frame {
        let width = usize::try_from(self.layout.columns).unwrap_or(0) + 2;
        let mut rows = vec![vec!['.'; width]; usize::try_from(lanes).unwrap_or(0)];
        let geometry = self.read();
        let mut sprites: Vec<_> = geometry.sprites.values().collect();
        sprites.sort_by_key(|sprite| glyph_layer(sprite.kind));
        for sprite in sprites {
            let Some((lane, slot)) = self.slot_of(sprite.center(), lanes, width) else {
                continue;
            };
            rows[lane][slot] = glyph(sprite.kind);
        }
        Frame {
            lanes: rows.into_iter().map(String::from_iter).collect(),
            outcome: self.outcome,
        }
    }

    fn slot_of(&self, center: Vec2, lanes: u32, width: usize) -> Option<(usize, usize)> {
        if self.layout.lane_height <= 0.0 || self.layout.cell_width <= 0.0 {
            return None;
        }
        let lane = ((center.y - self.layout.lane_origin_y) / self.layout.lane_height).floor();
        if lane < 0.0 || lane >= lanes as f32 {
            return None;
        }
        let offset = ((center.x - self.layout.grid_origin_x) / self.layout.cell_width).floor();
        let slot = (offset + 1.0).clamp(0.0, (width - 1) as f32);
        Some((lane as usize, slot as usize))
    }

    fn insert(&mut self, sprite: Sprite) -> VisualId {
        let visual = self.ids.allocate();
        let _ = self.write().sprites.insert(visual, sprite);
        visual
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Geometry> {
        self.geometry.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Geometry> {
        self.geometry.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn glyph_layer(kind: SpriteKind) -> u8 {
    match kind {
        SpriteKind::Barrier | SpriteKind::Obstacle => 0,
        SpriteKind::Agent(_) => 1,
        SpriteKind::Projectile => 2,
    }
}

fn glyph(kind: SpriteKind) -> char {
    match kind {
        SpriteKind::Agent(AgentKind::MeleeAttacker) => 'Z',
        SpriteKind::Agent(AgentKind::ResourceGenerator) => 'B',
        SpriteKind::Agent(AgentKind::RangedAttacker) => 'E',
        SpriteKind::Obstacle => 'P',
        SpriteKind::Projectile => '*',
        SpriteKind::Barrier => '#',
    }
}

/// Text snapshot of the stage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    /// One row per lane.
    pub lanes: Vec<String>,
    /// Outcome announced so far.
    pub outcome: Option<Outcome>,
}

/// Backend that displays frames produced by a [`Stage`].
pub trait Presenter {
    /// Displays a frame.
    fn present(&mut self, frame: &Frame) -> AnyResult<()>;
}

/// Presenter printing frames as plain text.
#[derive(Debug)]
pub struct TextPresenter<W> {
    out: W,
}

impl<W: Write> TextPresenter<W> {
    /// Creates a presenter writing to `out`.
    #[must_use]
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Returns the underlying writer.
    #[must_use]
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Presenter for TextPresenter<W> {
    fn present(&mut self, frame: &Frame) -> AnyResult<()> {
        for (index, lane) in frame.lanes.iter().enumerate() {
            writeln!(self.out, "{index} {lane}")?;
        }
        if let Some(outcome) = frame.outcome {
            writeln!(self.out, "{outcome}!")?;
        }
        writeln!(self.out)?;
        self.out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LANE: LaneId = LaneId::new(0);

    #[test]
    fn probe_reflects_applied_moves() {
        let (mut stage, queue) = Stage::new(Layout::default());
        let probe = stage.probe();
        let agent = stage.add_agent(LANE, AgentKind::MeleeAttacker);
        assert_eq!(probe.position(agent), Some(Vec2::new(760.0, 80.0)));

        queue.set_position(agent, Vec2::new(700.0, 80.0));
        assert_eq!(probe.position(agent), Some(Vec2::new(760.0, 80.0)), "not pumped yet");
        assert_eq!(stage.pump(), 1);
        assert_eq!(probe.position(agent), Some(Vec2::new(700.0, 80.0)));
        assert_eq!(probe.center(agent), Some(Vec2::new(740.0, 130.0)));
    }

    #[test]
    fn obstacles_resolve_by_cell_and_disappear_on_removal() {
        let (mut stage, queue) = Stage::new(Layout::default());
        let probe = stage.probe();
        let visual = stage.add_obstacle(LANE, Column::new(4));
        assert_eq!(probe.obstacle_visual(LANE, Column::new(4)), Some(visual));
        assert_eq!(probe.center(visual), Some(Vec2::new(400.0, 130.0)));

        queue.remove_obstacle(LANE, Column::new(4));
        queue.remove_obstacle(LANE, Column::new(4));
        let _ = stage.pump();

        assert_eq!(probe.obstacle_visual(LANE, Column::new(4)), None);
        assert_eq!(probe.center(visual), None);
        assert_eq!(stage.stats().obstacles_removed, 1);
    }

    #[test]
    fn transient_projectiles_come_and_go() {
        let (mut stage, queue) = Stage::new(Layout::default());
        let shot = queue.spawn_transient(SpriteKind::Projectile, Vec2::new(500.0, 100.0));
        let _ = stage.pump();
        assert_eq!(stage.count(SpriteKind::Projectile), 1);
        assert_eq!(
            stage.sprite(shot).map(|sprite| sprite.size),
            Some(Vec2::splat(30.0))
        );

        queue.remove(shot);
        let _ = stage.pump();
        assert_eq!(stage.count(SpriteKind::Projectile), 0);
        assert_eq!(stage.stats().projectiles_spawned, 1);
    }

    #[test]
    fn first_outcome_announcement_wins() {
        let (mut stage, queue) = Stage::new(Layout::default());
        queue.announce_outcome(Outcome::HostilesWin);
        queue.announce_outcome(Outcome::DefendersWin);
        let _ = stage.pump();
        assert_eq!(stage.outcome(), Some(Outcome::HostilesWin));
    }

    #[test]
    fn frames_place_glyphs_per_lane() {
        let (mut stage, queue) = Stage::new(Layout::default());
        let _ = stage.add_barrier(LANE);
        let _ = stage.add_obstacle(LaneId::new(1), Column::new(2));
        let _ = stage.add_agent(LaneId::new(1), AgentKind::RangedAttacker);
        queue.remove_barrier(LANE);
        queue.announce_outcome(Outcome::HostilesWin);
        let _ = stage.pump();

        let frame = stage.frame(2);
        assert_eq!(frame.lanes, vec!["...........", "...P......E"]);

        let mut presenter = TextPresenter::new(Vec::new());
        presenter.present(&frame).expect("in-memory write");
        let text = String::from_utf8(presenter.into_inner()).expect("utf8");
        assert!(text.contains("1 ...P......E"));
        assert!(text.contains("the zombies have won!"));
    }
}
