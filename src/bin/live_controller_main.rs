// live_controller_main.rs
use clap::{Parser, ValueEnum};
use smart_signal::communication::messages::ControlCommand;
use smart_signal::config::AppConfig;
use smart_signal::engine::{
    spawn_live, LiveOptions, LiveSources, Presentation, SyntheticDetector, VehicleCountSource,
};
use smart_signal::monitoring::traffic_monitoring_system::TrafficRecorder;
use smart_signal::shared_data::Side;
use smart_signal::simulation_engine::VehicleQueueSimulator;
use std::collections::BTreeMap;
use std::error::Error;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Source {
    /// Queue simulator driven by the live signal
    Simulator,
    /// Random per-side detector readings
    Synthetic,
}

/// Runs the controller live: per-side count acquisition, one control task and
/// a console. Type `override <side>`, `status` or `quit`.
#[derive(Parser, Debug)]
#[command(name = "live_controller_main")]
struct Args {
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = Source::Simulator)]
    source: Source,

    #[arg(short, long)]
    seed: Option<u64>,

    /// Milliseconds between controller updates
    #[arg(long, default_value_t = 100)]
    control_ms: u64,

    /// Milliseconds between count readings
    #[arg(long, default_value_t = 500)]
    acquisition_ms: u64,

    /// Print the full signal board instead of a status line
    #[arg(long)]
    dashboard: bool,

    #[arg(long)]
    no_log: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let args = Args::parse();
    let config = AppConfig::load(args.config.as_deref())?;
    let seed = args.seed.unwrap_or_else(rand::random);

    let sources = match args.source {
        Source::Simulator => {
            LiveSources::Simulated(VehicleQueueSimulator::with_seed(config.simulator.clone(), seed)?)
        }
        Source::Synthetic => {
            let mut detectors: BTreeMap<Side, Box<dyn VehicleCountSource>> = BTreeMap::new();
            for (i, side) in Side::ALL.iter().enumerate() {
                let detector = SyntheticDetector::new(seed.wrapping_add(i as u64))
                    .with_dropout_probability(0.02);
                detectors.insert(*side, Box::new(detector));
            }
            LiveSources::PerSide(detectors)
        }
    };

    let recorder = if args.no_log {
        TrafficRecorder::disabled()
    } else {
        TrafficRecorder::new(&config.logging)
    };
    let options = LiveOptions {
        control_period: Duration::from_millis(args.control_ms),
        acquisition_period: Duration::from_millis(args.acquisition_ms),
        sample_interval: config.logging.sample_interval,
        presentation: if args.dashboard {
            Presentation::Dashboard
        } else {
            Presentation::Console
        },
        ..LiveOptions::default()
    };

    let handle = spawn_live(config.timing.clone(), sources, recorder, options)?;
    println!("Live controller running. Commands: override <side>, status, quit");

    let commands = handle.commands();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line.trim().is_empty() {
                continue;
            }
            match ControlCommand::parse(&line) {
                Ok(command) => {
                    if commands.send(command).await.is_err() || command == ControlCommand::Shutdown {
                        break;
                    }
                }
                Err(e) => println!("{}", e),
            }
        }
    });

    let ctrl_c_commands = handle.commands();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = ctrl_c_commands.send(ControlCommand::Shutdown).await;
        }
    });

    let controller = handle.join().await?;
    let now = controller.phase_start_time();
    let stats = controller.statistics(now);
    println!(
        "Stopped: {} signal changes, {} full cycles",
        stats.signal_changes, stats.total_cycles
    );
    for event in &stats.recent_changes {
        println!(
            "  {:>7.1}s {} -> {} held {:.1}s ({})",
            event.timestamp, event.from_side, event.to_side, event.held_duration, event.reason
        );
    }
    Ok(())
}
