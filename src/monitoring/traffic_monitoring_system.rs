use crate::communication::messages::ControlFrame;
use crate::config::LoggingConfig;
use crate::control_system::{Phase, TransitionEvent};
use crate::global_variables::{
    EVENT_EMERGENCY, EVENT_SIGNAL_CHANGE, EVENT_SYSTEM, EVENT_VEHICLE_COUNT,
};
use crate::shared_data::{formatted_timestamp, CountSnapshot, Side, VehicleType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

/// One row of the persisted traffic log. Count columns are empty on
/// signal-change rows; duration and reason are empty on count samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficRecord {
    pub timestamp: String,
    pub event_type: String,
    pub side: String,
    pub signal_state: String,
    pub total_vehicles: Option<usize>,
    pub cars: Option<usize>,
    pub trucks: Option<usize>,
    pub motorcycles: Option<usize>,
    pub emergency: bool,
    pub duration_held: Option<f64>,
    pub reason: Option<String>,
}

impl TrafficRecord {
    fn blank(event_type: &str, side: &str) -> Self {
        Self {
            timestamp: formatted_timestamp(),
            event_type: event_type.to_string(),
            side: side.to_string(),
            signal_state: String::new(),
            total_vehicles: None,
            cars: None,
            trucks: None,
            motorcycles: None,
            emergency: false,
            duration_held: None,
            reason: None,
        }
    }

    pub fn signal_change(event: &TransitionEvent, emergency: bool) -> Self {
        Self {
            signal_state: Phase::Green.as_str().to_string(),
            emergency,
            duration_held: Some((event.held_duration * 10.0).round() / 10.0),
            reason: Some(event.reason.as_str().to_string()),
            ..Self::blank(EVENT_SIGNAL_CHANGE, event.to_side.as_str())
        }
    }

    pub fn vehicle_count(side: Side, phase: Phase, snapshot: &CountSnapshot) -> Self {
        Self {
            signal_state: phase.as_str().to_string(),
            total_vehicles: Some(snapshot.total_vehicles),
            cars: Some(snapshot.count_of(VehicleType::Car)),
            trucks: Some(snapshot.count_of(VehicleType::Truck)),
            motorcycles: Some(snapshot.count_of(VehicleType::Motorcycle)),
            emergency: snapshot.emergency_present,
            ..Self::blank(EVENT_VEHICLE_COUNT, side.as_str())
        }
    }

    pub fn emergency(side: Side) -> Self {
        Self {
            emergency: true,
            reason: Some(format!("EMERGENCY VEHICLE DETECTED on {}", side)),
            ..Self::blank(EVENT_EMERGENCY, side.as_str())
        }
    }

    pub fn system(message: &str) -> Self {
        Self {
            reason: Some(message.to_string()),
            ..Self::blank(EVENT_SYSTEM, "")
        }
    }
}

/// Generic helper to log a record to a CSV file. The header is written only
/// when the file is created.
fn log_to_csv<T: Serialize>(path: &Path, record: &T) -> Result<(), Box<dyn Error>> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let file_exists = path.exists();
    let file = OpenOptions::new().append(true).create(true).open(path)?;
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(!file_exists)
        .from_writer(file);
    wtr.serialize(record)?;
    wtr.flush()?;
    Ok(())
}

/// Appends traffic records to the CSV log. Write failures are logged and
/// otherwise ignored so they never hold up signal control.
#[derive(Debug, Clone)]
pub struct TrafficRecorder {
    path: PathBuf,
    enabled: bool,
}

impl TrafficRecorder {
    pub fn new(config: &LoggingConfig) -> Self {
        Self {
            path: PathBuf::from(&config.csv_path),
            enabled: config.enabled,
        }
    }

    pub fn at<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            enabled: true,
        }
    }

    pub fn disabled() -> Self {
        Self {
            path: PathBuf::new(),
            enabled: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, record: &TrafficRecord) {
        if !self.enabled {
            return;
        }
        if let Err(e) = log_to_csv(&self.path, record) {
            log::error!("Error logging {} record to {}: {}", record.event_type, self.path.display(), e);
        }
    }

    pub fn record_signal_change(&self, event: &TransitionEvent, emergency: bool) {
        self.write(&TrafficRecord::signal_change(event, emergency));
    }

    pub fn record_vehicle_count(&self, side: Side, phase: Phase, snapshot: &CountSnapshot) {
        self.write(&TrafficRecord::vehicle_count(side, phase, snapshot));
    }

    pub fn record_emergency(&self, side: Side) {
        self.write(&TrafficRecord::emergency(side));
    }

    pub fn record_system(&self, message: &str) {
        self.write(&TrafficRecord::system(message));
    }
}

/// Reads every record back from a traffic log.
pub fn read_records<P: AsRef<Path>>(path: P) -> Result<Vec<TrafficRecord>, Box<dyn Error>> {
    let file = File::open(path)?;
    let mut rdr = csv::Reader::from_reader(file);
    let mut records = Vec::new();
    for result in rdr.deserialize() {
        let record: TrafficRecord = result?;
        records.push(record);
    }
    Ok(records)
}

/// Aggregates over a traffic log.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogSummary {
    pub total_records: usize,
    pub switches_by_reason: BTreeMap<String, usize>,
    pub switches_to_side: BTreeMap<String, usize>,
    pub samples_by_side: BTreeMap<String, usize>,
    pub average_vehicles_by_side: BTreeMap<String, f64>,
    pub emergencies: usize,
    pub system_events: usize,
    pub average_held: Option<f64>,
}

impl LogSummary {
    pub fn total_switches(&self) -> usize {
        self.switches_by_reason.values().sum()
    }
}

pub fn summarize(records: &[TrafficRecord]) -> LogSummary {
    let mut summary = LogSummary {
        total_records: records.len(),
        ..LogSummary::default()
    };
    let mut vehicle_sums: BTreeMap<String, usize> = BTreeMap::new();
    let mut held_total = 0.0;
    let mut held_count = 0usize;

    for record in records {
        match record.event_type.as_str() {
            EVENT_SIGNAL_CHANGE => {
                let reason = record.reason.clone().unwrap_or_default();
                *summary.switches_by_reason.entry(reason).or_insert(0) += 1;
                *summary
                    .switches_to_side
                    .entry(record.side.clone())
                    .or_insert(0) += 1;
                if let Some(held) = record.duration_held {
                    held_total += held;
                    held_count += 1;
                }
            }
            EVENT_VEHICLE_COUNT => {
                *summary
                    .samples_by_side
                    .entry(record.side.clone())
                    .or_insert(0) += 1;
                *vehicle_sums.entry(record.side.clone()).or_insert(0) +=
                    record.total_vehicles.unwrap_or(0);
            }
            EVENT_EMERGENCY => summary.emergencies += 1,
            EVENT_SYSTEM => summary.system_events += 1,
            other => log::debug!("Skipping unknown event type {}", other),
        }
    }

    for (side, total) in vehicle_sums {
        let samples = summary.samples_by_side.get(&side).copied().unwrap_or(0);
        if samples > 0 {
            summary
                .average_vehicles_by_side
                .insert(side, total as f64 / samples as f64);
        }
    }
    if held_count > 0 {
        summary.average_held = Some(held_total / held_count as f64);
    }
    summary
}

/// Reads a traffic log and prints a summary of it.
pub fn generate_report<P: AsRef<Path>>(path: P) -> Result<LogSummary, Box<dyn Error>> {
    let path = path.as_ref();
    println!("Generating report for {}...", path.display());
    let summary = summarize(&read_records(path)?);

    println!("Report Summary:");
    println!("Records: {}", summary.total_records);
    println!("Signal changes: {}", summary.total_switches());
    for (reason, count) in &summary.switches_by_reason {
        println!("  {:<16} {}", reason, count);
    }
    if let Some(held) = summary.average_held {
        println!("Average green held: {:.1}s", held);
    }
    println!("Green given to:");
    for (side, count) in &summary.switches_to_side {
        println!("  {:<6} {}", side, count);
    }
    println!("Count samples:");
    for (side, samples) in &summary.samples_by_side {
        let average = summary
            .average_vehicles_by_side
            .get(side)
            .copied()
            .unwrap_or(0.0);
        println!("  {:<6} {} samples, {:.1} vehicles on average", side, samples, average);
    }
    println!("Emergencies: {}", summary.emergencies);
    println!("System events: {}", summary.system_events);
    Ok(summary)
}

/// Multi-line signal board for the console.
pub fn render_dashboard(frame: &ControlFrame) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "=== t={:.1}s  tick {}  {} ===\n",
        frame.time, frame.tick, frame.decision
    ));
    for side in Side::ALL {
        let phase = frame.signal_states.get(&side).copied().unwrap_or(Phase::Red);
        let marker = if side == frame.current_side { ">" } else { " " };
        let count = frame
            .counts
            .get(&side)
            .map(|n| n.to_string())
            .unwrap_or_else(|| "?".to_string());
        out.push_str(&format!(
            "{} {:<6} {:<8} vehicles: {}\n",
            marker,
            side.as_str(),
            phase.as_str(),
            count
        ));
    }
    out.push_str(&format!(
        "next: {}  time remaining: {:.1}s",
        frame.next_side, frame.time_remaining
    ));
    if frame.emergency_mode {
        out.push_str("  [EMERGENCY]");
    }
    if frame.degraded {
        out.push_str("  [DEGRADED: counts stale]");
    }
    out
}
