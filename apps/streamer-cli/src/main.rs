use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use glam::{Vec2, Vec3};
use streamer_common::{ObserverId, SplitMix64};
use streamer_core::{
    EngineConfig, MemoryPlatform, PickupManager, PickupPayload, StoredEntity, StreamingManager,
    VehicleManager, VehiclePayload,
};
use streamer_geom::{BoundingBox, BulkTree, SplitStrategy};
use tracing_subscriber::EnvFilter;

/// Half-width of the square the simulation populates.
const AREA: f32 = 2500.0;

#[derive(Parser)]
#[command(name = "streamer-cli", about = "CLI tool for entity streaming")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print crate versions and the default config
    Info,
    /// Walk observers across a populated area and report streaming stats
    Simulate {
        /// YAML or JSON engine config
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Number of pickups to place
        #[arg(long, default_value = "2000")]
        pickups: usize,
        /// Number of vehicles to park
        #[arg(long, default_value = "800")]
        vehicles: usize,
        /// Number of observers
        #[arg(short, long, default_value = "4")]
        observers: u32,
        /// Number of ticks to simulate
        #[arg(short, long, default_value = "20")]
        ticks: u64,
        /// RNG seed for a reproducible run
        #[arg(short, long, default_value = "42")]
        seed: u64,
    },
    /// Bulk-build a tree of random boxes and query it
    Split {
        /// Number of boxes
        #[arg(short, long, default_value = "1000")]
        count: usize,
        /// Minimum children per node
        #[arg(long, default_value = "4")]
        min: usize,
        /// Maximum children per node
        #[arg(long, default_value = "16")]
        max: usize,
        /// RNG seed
        #[arg(short, long, default_value = "42")]
        seed: u64,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match cli.command {
        Commands::Info => {
            let defaults = EngineConfig::default();
            println!("streamer-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("core: {}", streamer_core::crate_info());
            println!(
                "pickups: max_visible={}, distance={}",
                defaults.pickups.max_visible, defaults.pickups.streaming_distance
            );
            println!(
                "vehicles: max_visible={}, distance={}",
                defaults.vehicles.max_visible, defaults.vehicles.streaming_distance
            );
            println!("tick: {}ms", defaults.tick_ms);
        }
        Commands::Simulate {
            config,
            pickups,
            vehicles,
            observers,
            ticks,
            seed,
        } => {
            let config = match config {
                Some(path) => EngineConfig::load(&path)
                    .with_context(|| format!("loading {}", path.display()))?,
                None => EngineConfig::default(),
            };
            simulate(&config, pickups, vehicles, observers, ticks, seed)?;
        }
        Commands::Split {
            count,
            min,
            max,
            seed,
        } => {
            let strategy = SplitStrategy::new(min, max).context("invalid split bounds")?;
            let mut rng = SplitMix64::new(seed);
            let items: Vec<(usize, BoundingBox)> = (0..count)
                .map(|i| {
                    let corner = Vec2::new(rng.range(-AREA, AREA), rng.range(-AREA, AREA));
                    let size = Vec2::new(rng.range(1.0, 50.0), rng.range(1.0, 50.0));
                    (i, BoundingBox::new(corner, corner + size))
                })
                .collect();
            let tree = BulkTree::build(items, strategy);
            println!(
                "Bulk tree: items={}, height={}, min={min}, max={max}",
                tree.len(),
                tree.height()
            );
            if let Some(bounds) = tree.bounds() {
                println!("Root bounds: {:?} .. {:?}", bounds.min, bounds.max);
            }
            let query = BoundingBox::around(Vec2::ZERO, 250.0);
            let hits = tree.search(&query);
            println!("Query {:?} .. {:?}: {} hits", query.min, query.max, hits.len());
        }
    }

    Ok(())
}

fn simulate(
    config: &EngineConfig,
    pickups: usize,
    vehicles: usize,
    observers: u32,
    ticks: u64,
    seed: u64,
) -> anyhow::Result<()> {
    println!("Simulation: seed={seed}, ticks={ticks}, observers={observers}");
    let mut rng = SplitMix64::new(seed);

    let mut pickup_manager: PickupManager<MemoryPlatform> =
        StreamingManager::new(config.pickups, MemoryPlatform::new())?;
    for i in 0..pickups {
        let position = Vec3::new(rng.range(-AREA, AREA), rng.range(-AREA, AREA), 10.0);
        let payload = if i % 4 == 0 {
            PickupPayload::fixed(1239)
        } else {
            PickupPayload::respawning(1242, Duration::from_secs(30))
        };
        pickup_manager.add(StoredEntity::new(position, payload)?.with_callbacks());
    }

    let mut vehicle_manager: VehicleManager<MemoryPlatform> =
        StreamingManager::new(config.vehicles, MemoryPlatform::new())?;
    for _ in 0..vehicles {
        let position = Vec3::new(rng.range(-AREA, AREA), rng.range(-AREA, AREA), 3.0);
        let payload = VehiclePayload {
            model: 400 + rng.below(211) as u16,
            heading: rng.range(0.0, 360.0),
            colours: [rng.below(127) as i16, rng.below(127) as i16],
            respawn_delay: Duration::from_secs(300),
        };
        vehicle_manager.add(StoredEntity::new(position, payload)?);
    }

    let mut positions: Vec<(ObserverId, Vec3)> = (0..observers)
        .map(|o| {
            let p = Vec3::new(rng.range(-AREA, AREA), rng.range(-AREA, AREA), 10.0);
            (ObserverId(o), p)
        })
        .collect();

    let step = Duration::from_millis(config.tick_ms);
    for tick in 0..ticks {
        let now = step * tick as u32;
        for (_, p) in positions.iter_mut() {
            let delta = Vec3::new(rng.range(-80.0, 80.0), rng.range(-80.0, 80.0), 0.0);
            *p = (*p + delta).clamp(Vec3::splat(-AREA), Vec3::splat(AREA));
        }

        let pickup_stats = pollster::block_on(pickup_manager.update(&positions, now));
        let vehicle_stats = pollster::block_on(vehicle_manager.update(&positions, now));

        // Every observer grabs whatever live pickup it holds first.
        let mut consumed = 0;
        for (observer, _) in &positions {
            let first = pickup_manager
                .visible(*observer)
                .and_then(|set| set.iter().next())
                .map(|(_, live)| live);
            if let Some(live) = first {
                if pickup_manager.consume_live(*observer, live, now) {
                    consumed += 1;
                }
            }
        }

        println!(
            "tick {tick:>3}: pickups live={} +{} -{} refused={} | vehicles live={} +{} -{} | consumed={consumed} pending_respawns={}",
            pickup_stats.live,
            pickup_stats.entered,
            pickup_stats.left,
            pickup_stats.refused,
            vehicle_stats.live,
            vehicle_stats.entered,
            vehicle_stats.left,
            pickup_manager.pending_respawns(),
        );
    }

    tracing::info!(
        pickup_instances = pickup_manager.platform().created(),
        vehicle_instances = vehicle_manager.platform().created(),
        events = pickup_manager.drain_events().len(),
        "simulation finished"
    );
    pickup_manager.dispose();
    vehicle_manager.dispose();
    Ok(())
}
