// simulation_main.rs
use clap::Parser;
use smart_signal::config::AppConfig;
use smart_signal::engine::CooperativeSession;
use smart_signal::monitoring::traffic_monitoring_system::TrafficRecorder;
use std::error::Error;
use std::path::PathBuf;
use tokio::sync::watch;

/// Runs the intersection in simulation-only mode: one loop spawns vehicles,
/// asks the controller for a decision and moves the queues, tick by tick.
#[derive(Parser, Debug)]
#[command(name = "simulation_main")]
struct Args {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Stop after this many ticks (runs until Ctrl-C otherwise)
    #[arg(short, long)]
    ticks: Option<u64>,

    /// Seed for a reproducible run
    #[arg(short, long)]
    seed: Option<u64>,

    /// Sleep one tick length between ticks instead of running flat out
    #[arg(long)]
    realtime: bool,

    /// Print the signal board every N ticks (0 disables it)
    #[arg(long, default_value_t = 300)]
    render_every: u64,

    /// Do not write the CSV traffic log
    #[arg(long)]
    no_log: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let args = Args::parse();

    let config = AppConfig::load(args.config.as_deref())?;
    let recorder = if args.no_log {
        TrafficRecorder::disabled()
    } else {
        TrafficRecorder::new(&config.logging)
    };
    let mut session = CooperativeSession::new(&config, args.seed, recorder.clone())?;

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("Stopping at the next tick...");
            stop_tx.send_replace(true);
        }
    });

    println!("Starting simulation...");
    let ran = session
        .run(args.ticks, args.realtime, args.render_every, stop_rx)
        .await;

    let stats = session.simulator().stats();
    let controller = session.controller().statistics(session.clock());
    println!("\nSimulation finished after {} ticks ({:.1}s simulated)", ran, session.clock());
    println!(
        "Vehicles: {} spawned, {} crossed, {} still queued",
        stats.total_spawned,
        stats.total_crossed,
        session.simulator().total_vehicles()
    );
    for (vehicle_type, crossed) in &stats.crossed_by_type {
        println!("  {:<10} {}", vehicle_type.to_string(), crossed);
    }
    for (side, queued) in session.simulator().queue_lengths() {
        println!("  {:<6} queue {}", side.as_str(), queued);
    }
    println!(
        "Signal: {} changes, {} full cycles, now {} {}",
        controller.signal_changes, controller.total_cycles, controller.current_side, controller.phase
    );
    if !args.no_log && config.logging.enabled {
        println!("Traffic log: {}", recorder.path().display());
    }
    Ok(())
}
