//! Seeded encounters for the demo binary.

use std::time::Duration;

use lane_siege_core::{AgentProfile, Column, LaneId};
use lane_siege_rendering::Stage;
use lane_siege_world::Garden;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

const OBSTACLE_HEALTH: [i32; 3] = [60, 100, 300];
const OBSTACLE_COST: [u32; 3] = [50, 100, 175];

/// Obstacle planted before the first agent arrives.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Defence {
    pub(crate) lane: LaneId,
    pub(crate) column: Column,
    pub(crate) health: i32,
    pub(crate) cost: u32,
}

/// Agent entering the board after `delay` from the start.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Arrival {
    pub(crate) delay: Duration,
    pub(crate) lane: LaneId,
    pub(crate) profile: AgentProfile,
}

/// Board setup and wave of a single encounter.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Scenario {
    pub(crate) lanes: u32,
    pub(crate) barriers: Vec<LaneId>,
    pub(crate) defences: Vec<Defence>,
    pub(crate) arrivals: Vec<Arrival>,
}

impl Scenario {
    /// Derives an encounter from `seed`; equal inputs give equal encounters.
    pub(crate) fn generate(
        seed: u64,
        lanes: u32,
        agents: u32,
        columns: u32,
        gap: Duration,
    ) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut barriers = Vec::new();
        let mut defences = Vec::new();

        for lane in (0..lanes).map(LaneId::new) {
            if rng.gen_bool(0.5) {
                barriers.push(lane);
            }
            let mut taken = Vec::new();
            for _ in 0..rng.gen_range(0..=3) {
                let column = Column::new(rng.gen_range(0..columns.max(1)));
                if taken.contains(&column) {
                    continue;
                }
                taken.push(column);
                let tier = rng.gen_range(0..OBSTACLE_HEALTH.len());
                defences.push(Defence {
                    lane,
                    column,
                    health: OBSTACLE_HEALTH[tier],
                    cost: OBSTACLE_COST[tier],
                });
            }
        }

        let mut delay = Duration::ZERO;
        let arrivals = (0..agents)
            .map(|_| {
                delay += gap.mul_f64(rng.gen_range(0.5..1.5));
                let profile = match rng.gen_range(0..20) {
                    0..=2 => AgentProfile::resource_generator(),
                    3..=7 => AgentProfile::ranged(),
                    _ => AgentProfile::melee(),
                };
                Arrival {
                    delay,
                    lane: LaneId::new(rng.gen_range(0..lanes.max(1))),
                    profile,
                }
            })
            .collect();

        Self {
            lanes,
            barriers,
            defences,
            arrivals,
        }
    }

    /// Places barriers and obstacles in the world and on the stage.
    pub(crate) fn install(&self, garden: &Garden, stage: &mut Stage) {
        for lane in &self.barriers {
            garden.place_barrier(*lane);
            let _ = stage.add_barrier(*lane);
        }
        for defence in &self.defences {
            let _ = garden.plant(defence.lane, defence.column, defence.health, defence.cost);
            let _ = stage.add_obstacle(defence.lane, defence.column);
        }
    }

    /// Lanes of the board.
    pub(crate) fn lane_ids(&self) -> impl Iterator<Item = LaneId> {
        (0..self.lanes).map(LaneId::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lane_siege_core::{Layout, SpriteKind, World};

    #[test]
    fn equal_seeds_give_equal_encounters() {
        let gap = Duration::from_secs(2);
        assert_eq!(
            Scenario::generate(7, 5, 12, 9, gap),
            Scenario::generate(7, 5, 12, 9, gap)
        );
    }

    #[test]
    fn arrivals_are_ordered_and_stay_on_the_board() {
        let scenario = Scenario::generate(11, 3, 40, 9, Duration::from_millis(500));
        assert_eq!(scenario.arrivals.len(), 40);
        assert!(scenario
            .arrivals
            .windows(2)
            .all(|pair| pair[0].delay < pair[1].delay));
        assert!(scenario.arrivals.iter().all(|arrival| arrival.lane.get() < 3));
        assert!(scenario
            .defences
            .iter()
            .all(|defence| defence.column.get() < 9 && defence.lane.get() < 3));
    }

    #[test]
    fn installing_populates_world_and_stage() {
        let scenario = Scenario::generate(3, 4, 0, 9, Duration::from_secs(1));
        let garden = Garden::new();
        let (mut stage, _visuals) = Stage::new(Layout::default());

        scenario.install(&garden, &mut stage);

        for lane in scenario.lane_ids() {
            assert_eq!(
                garden.barrier_present(lane),
                scenario.barriers.contains(&lane)
            );
        }
        assert_eq!(stage.count(SpriteKind::Obstacle), scenario.defences.len());
        assert_eq!(stage.count(SpriteKind::Barrier), scenario.barriers.len());
    }
}
