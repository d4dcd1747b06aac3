// traffic_log_report_main.rs
use clap::Parser;
use smart_signal::global_variables::DEFAULT_CSV_LOG_FILE;
use smart_signal::monitoring::traffic_monitoring_system::{generate_report, read_records};
use std::error::Error;
use std::path::PathBuf;

/// Summarises a traffic CSV log written by the simulator or the live controller.
#[derive(Parser, Debug)]
#[command(name = "traffic_log_report_main")]
struct Args {
    /// Log file to read
    #[arg(default_value = DEFAULT_CSV_LOG_FILE)]
    path: PathBuf,

    /// Also print every record
    #[arg(long)]
    records: bool,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let args = Args::parse();

    if args.records {
        println!("Traffic Data:");
        for record in read_records(&args.path)? {
            println!("{:?}", record);
        }
        println!();
    }
    generate_report(&args.path)?;
    Ok(())
}
