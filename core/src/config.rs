//! Tunable interval constants and stage geometry.

use std::{fs, io, path::Path, path::PathBuf, time::Duration};

use glam::Vec2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Column, LaneId};

/// Engine configuration loaded from TOML. Missing keys fall back to defaults.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Interval constants governing every suspension point.
    pub timing: Timing,
    /// Stage geometry shared with the presentation layer.
    pub layout: Layout,
}

impl EngineConfig {
    /// Parses a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Reads and parses a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }
}

/// Failures raised while loading an [`EngineConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file {path}")]
    Read {
        /// Path that failed to load.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },
    /// The configuration text is not valid.
    #[error("invalid config")]
    Parse(#[from] toml::de::Error),
}

/// Interval constants, stored in milliseconds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timing {
    /// Delay between two movement steps.
    pub step_delay_ms: u64,
    /// Delay between two melee hits.
    pub attack_interval_ms: u64,
    /// Wait before re-scanning a lane without a reachable target.
    pub projectile_idle_ms: u64,
    /// Delay between two projectile animation frames.
    pub projectile_frame_ms: u64,
    /// Wait between two projectile shots.
    pub projectile_cooldown_ms: u64,
    /// Delay between two resource ticks.
    pub resource_interval_ms: u64,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            step_delay_ms: 150,
            attack_interval_ms: 500,
            projectile_idle_ms: 1_000,
            projectile_frame_ms: 10,
            projectile_cooldown_ms: 3_000,
            resource_interval_ms: 2_000,
        }
    }
}

impl Timing {
    /// Delay between two movement steps.
    #[must_use]
    pub fn step_delay(&self) -> Duration {
        Duration::from_millis(self.step_delay_ms)
    }

    /// Delay between two melee hits.
    #[must_use]
    pub fn attack_interval(&self) -> Duration {
        Duration::from_millis(self.attack_interval_ms)
    }

    /// Wait before re-scanning a lane without a reachable target.
    #[must_use]
    pub fn projectile_idle(&self) -> Duration {
        Duration::from_millis(self.projectile_idle_ms)
    }

    /// Delay between two projectile animation frames.
    #[must_use]
    pub fn projectile_frame(&self) -> Duration {
        Duration::from_millis(self.projectile_frame_ms)
    }

    /// Wait between two projectile shots.
    #[must_use]
    pub fn projectile_cooldown(&self) -> Duration {
        Duration::from_millis(self.projectile_cooldown_ms)
    }

    /// Delay between two resource ticks.
    #[must_use]
    pub fn resource_interval(&self) -> Duration {
        Duration::from_millis(self.resource_interval_ms)
    }

    /// Multiplies every interval by `factor`.
    ///
    /// Intervals never drop below one millisecond so that polling loops keep
    /// yielding to the scheduler.
    #[must_use]
    pub fn scaled(&self, factor: f64) -> Self {
        let scale = |millis: u64| {
            let scaled = (millis as f64 * factor.max(0.0)).round();
            (scaled as u64).max(1)
        };
        Self {
            step_delay_ms: scale(self.step_delay_ms),
            attack_interval_ms: scale(self.attack_interval_ms),
            projectile_idle_ms: scale(self.projectile_idle_ms),
            projectile_frame_ms: scale(self.projectile_frame_ms),
            projectile_cooldown_ms: scale(self.projectile_cooldown_ms),
            resource_interval_ms: scale(self.resource_interval_ms),
        }
    }
}

/// Stage geometry in presentation units.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Layout {
    /// Width of a single column.
    pub cell_width: f32,
    /// X coordinate of the left edge of column zero.
    pub grid_origin_x: f32,
    /// Height of a single lane.
    pub lane_height: f32,
    /// Y coordinate of the top edge of lane zero.
    pub lane_origin_y: f32,
    /// Number of columns on the board; agents enter at the last one.
    pub columns: u32,
    /// Distance an agent travels per movement step.
    pub move_step: f32,
    /// Distance a projectile travels per animation frame.
    pub projectile_step: f32,
    /// Width of an agent sprite.
    pub agent_width: f32,
    /// Height of an agent sprite.
    pub agent_height: f32,
    /// Side length of the square projectile sprite.
    pub projectile_size: f32,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            cell_width: 80.0,
            grid_origin_x: 40.0,
            lane_height: 100.0,
            lane_origin_y: 80.0,
            columns: 9,
            move_step: 5.0,
            projectile_step: 5.0,
            agent_width: 80.0,
            agent_height: 100.0,
            projectile_size: 30.0,
        }
    }
}

impl Layout {
    /// X coordinate of a column's left edge.
    #[must_use]
    pub fn column_x(&self, column: Column) -> f32 {
        self.grid_origin_x + column.get() as f32 * self.cell_width
    }

    /// Column containing the x coordinate, floored at the house column.
    #[must_use]
    pub fn column_at(&self, x: f32) -> Column {
        if self.cell_width <= 0.0 {
            return Column::HOUSE;
        }
        let offset = ((x - self.grid_origin_x) / self.cell_width).floor();
        Column::new(offset.max(0.0) as u32)
    }

    /// Y coordinate of a lane's top edge.
    #[must_use]
    pub fn lane_y(&self, lane: LaneId) -> f32 {
        self.lane_origin_y + lane.get() as f32 * self.lane_height
    }

    /// Top-left position of the sprite occupying a cell.
    #[must_use]
    pub fn cell_origin(&self, lane: LaneId, column: Column) -> Vec2 {
        Vec2::new(self.column_x(column), self.lane_y(lane))
    }

    /// Position where new agents enter a lane.
    #[must_use]
    pub fn spawn_point(&self, lane: LaneId) -> Vec2 {
        self.cell_origin(lane, Column::new(self.columns))
    }

    /// Size of an agent sprite.
    #[must_use]
    pub fn agent_size(&self) -> Vec2 {
        Vec2::new(self.agent_width, self.agent_height)
    }

    /// Center of an agent sprite whose top-left corner is at `position`.
    #[must_use]
    pub fn agent_center(&self, position: Vec2) -> Vec2 {
        position + self.agent_size() * 0.5
    }

    /// Top-left corner that centers a projectile sprite on `center`.
    #[must_use]
    pub fn projectile_origin(&self, center: Vec2) -> Vec2 {
        center - Vec2::splat(self.projectile_size * 0.5)
    }
}
