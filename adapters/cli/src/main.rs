#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Command-line adapter that plays a seeded Lane Siege encounter.

mod scenario;

use std::{
    collections::VecDeque,
    io,
    path::PathBuf,
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use clap::Parser;
use lane_siege_core::{AgentKind, EngineConfig, Outcome, World, WELCOME_BANNER};
use lane_siege_rendering::{Presenter, Stage, TextPresenter};
use lane_siege_system_lifecycle::{AgentLifecycleManager, SpawnedAgent};
use lane_siege_system_registry::AgentRegistry;
use lane_siege_world::{query, Garden, Notice};
use tracing::{info, warn};

use crate::scenario::Scenario;

/// Command-line arguments accepted by the Lane Siege demo.
#[derive(Debug, Parser)]
#[command(name = "lane-siege", about = "Plays a seeded lane siege encounter")]
struct CliArgs {
    /// TOML file overriding engine timing and layout.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Number of lanes on the board.
    #[arg(long, default_value_t = 5, value_parser = clap::value_parser!(u32).range(1..))]
    lanes: u32,

    /// Number of agents in the wave.
    #[arg(long, default_value_t = 12)]
    agents: u32,

    /// Seed for the board and wave.
    #[arg(long, default_value_t = 0x5EED)]
    seed: u64,

    /// Factor applied to every interval; below 1 plays faster.
    #[arg(long, default_value_t = 0.05)]
    time_scale: f64,

    /// Wall-clock limit for the encounter, in seconds.
    #[arg(long, default_value_t = 60)]
    max_seconds: u64,

    /// Prints a text frame of the board on every refresh.
    #[arg(long)]
    frames: bool,

    /// Interval between two refreshes of the stage, in milliseconds.
    #[arg(long, default_value_t = 50)]
    refresh_ms: u64,
}

/// Entry point for the Lane Siege command-line interface.
fn main() -> Result<()> {
    init_tracing();
    let args = CliArgs::parse();
    println!("{WELCOME_BANNER}");

    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => EngineConfig::default(),
    };
    config.timing = config.timing.scaled(args.time_scale);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_time()
        .thread_name("lane-siege-agent")
        .build()
        .context("failed to start the agent runtime")?;

    let scenario = Scenario::generate(
        args.seed,
        args.lanes,
        args.agents,
        config.layout.columns,
        config.timing.resource_interval(),
    );
    let garden = Garden::shared();
    garden.adjust_score(1_000);
    let (mut stage, visuals) = Stage::new(config.layout.clone());
    scenario.install(&garden, &mut stage);

    let manager = AgentLifecycleManager::new(
        garden.clone(),
        Arc::new(stage.probe()),
        visuals.clone(),
        Arc::new(AgentRegistry::new()),
        &config,
        runtime.handle().clone(),
    );
    info!(
        seed = args.seed,
        lanes = args.lanes,
        agents = args.agents,
        "encounter prepared"
    );

    let mut presenter = args.frames.then(|| TextPresenter::new(io::stdout()));
    let mut pending: VecDeque<_> = scenario.arrivals.iter().copied().collect();
    let mut spawned: Vec<SpawnedAgent> = Vec::new();
    let refresh = Duration::from_millis(args.refresh_ms.max(1));
    let deadline = Duration::from_secs(args.max_seconds);
    let started = Instant::now();

    loop {
        while pending
            .front()
            .is_some_and(|arrival| arrival.delay <= started.elapsed())
        {
            let Some(arrival) = pending.pop_front() else {
                break;
            };
            let visual = stage.add_agent(arrival.lane, arrival.profile.kind);
            spawned.push(manager.spawn(arrival.lane, arrival.profile, visual));
        }

        let _ = stage.pump();
        if let Some(presenter) = presenter.as_mut() {
            presenter.present(&stage.frame(args.lanes))?;
        }

        if stage.outcome().is_some() {
            break;
        }
        if pending.is_empty() && attackers_done(&spawned) {
            if garden.declare_outcome(Outcome::DefendersWin) {
                visuals.announce_outcome(Outcome::DefendersWin);
            }
            let _ = stage.pump();
            break;
        }
        if started.elapsed() >= deadline {
            warn!(limit = args.max_seconds, "encounter stopped at the time limit");
            break;
        }
        thread::sleep(refresh);
    }

    let stopped: usize = scenario
        .lane_ids()
        .map(|lane| manager.stop_lane(lane))
        .sum();
    runtime.block_on(async {
        for agent in spawned {
            let _ = agent.join.await;
        }
    });
    runtime.shutdown_timeout(refresh);
    let _ = stage.pump();

    if let Some(presenter) = presenter.as_mut() {
        presenter.present(&stage.frame(args.lanes))?;
    }
    print_summary(&garden, &stage, stopped, started.elapsed());
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn attackers_done(spawned: &[SpawnedAgent]) -> bool {
    spawned
        .iter()
        .filter(|agent| agent.agent.kind() != AgentKind::ResourceGenerator)
        .all(|agent| agent.join.is_finished())
}

fn print_summary(garden: &Garden, stage: &Stage, stopped: usize, elapsed: Duration) {
    let outcome = query::outcome(garden)
        .map_or_else(|| "undecided".to_owned(), |outcome| outcome.to_string());
    let destroyed =
        query::count_notices(garden, |notice| matches!(notice, Notice::ObstacleRemoved { .. }));
    let stats = stage.stats();
    println!("outcome: {outcome}");
    println!("elapsed: {:.1}s", elapsed.as_secs_f64());
    println!("score: {}", query::score(garden));
    println!("resources: {}", query::resources(garden));
    println!("obstacles destroyed: {destroyed}");
    println!("barriers used: {}", stats.barriers_removed);
    println!("projectiles fired: {}", stats.projectiles_spawned);
    println!("agents stopped at shutdown: {stopped}");
}
