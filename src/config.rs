//! Configuration values handed to the controller and the simulator.
//!
//! Every struct deserializes from JSON with per-field defaults, so a config
//! file only needs to name what it changes. Values are checked once by
//! `validate`, which the constructors call before anything runs.

use crate::global_variables::{
    DEFAULT_CONFIG_FILE, DEFAULT_CSV_LOG_FILE, DEFAULT_HISTORY_CAPACITY,
};
use crate::shared_data::{Side, VehicleType};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;
use thiserror::Error;

const PROBABILITY_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("min_green ({min_green}s) must not exceed max_green ({max_green}s)")]
    MinGreenExceedsMaxGreen { min_green: f64, max_green: f64 },
    #[error("{name} must be a non-negative number of seconds, got {value}")]
    NegativeDuration { name: &'static str, value: f64 },
    #[error("{name} must be greater than zero, got {value}")]
    NonPositive { name: &'static str, value: f64 },
    #[error("signal sequence must contain at least one side")]
    EmptySequence,
    #[error("side {0} appears more than once in the signal sequence")]
    DuplicateSide(Side),
    #[error("{name} probabilities must sum to 1.0, got {sum}")]
    ProbabilitiesDoNotSumToOne { name: &'static str, sum: f64 },
    #[error("{name} must be within [0, 1], got {value}")]
    ProbabilityOutOfRange { name: &'static str, value: f64 },
    #[error("distance travelled per tick ({step}) must be smaller than the following gap ({gap})")]
    SpeedExceedsGap { step: f64, gap: f64 },
    #[error("stop line ({stop_line}) must lie between the spawn point ({spawn}) and the centre")]
    StopLineOutOfRange { stop_line: f64, spawn: f64 },
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}

fn check_duration(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_nan() || value < 0.0 {
        return Err(ConfigError::NegativeDuration { name, value });
    }
    Ok(())
}

fn check_positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_nan() || value <= 0.0 {
        return Err(ConfigError::NonPositive { name, value });
    }
    Ok(())
}

fn check_probability(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::ProbabilityOutOfRange { name, value });
    }
    Ok(())
}

fn check_distribution<I: IntoIterator<Item = f64>>(
    name: &'static str,
    weights: I,
) -> Result<(), ConfigError> {
    let mut sum = 0.0;
    for weight in weights {
        check_probability(name, weight)?;
        sum += weight;
    }
    if (sum - 1.0).abs() > PROBABILITY_TOLERANCE {
        return Err(ConfigError::ProbabilitiesDoNotSumToOne { name, sum });
    }
    Ok(())
}

/// Timing for the signal phase controller. All durations are in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalTiming {
    pub sequence: Vec<Side>,
    pub min_green: f64,
    pub max_green: f64,
    pub yellow_duration: f64,
    pub all_red_duration: f64,
    /// Vehicle count at or below which the active side counts as clearing.
    pub clearance_threshold: usize,
    pub clearance_wait_time: f64,
    /// Advisory only: shown by presentation, never ends an emergency hold.
    pub emergency_green_time: f64,
    /// Snapshots older than this are treated as missing.
    pub staleness_bound: f64,
    pub history_capacity: usize,
}

impl Default for SignalTiming {
    fn default() -> Self {
        Self {
            sequence: Side::ALL.to_vec(),
            min_green: 10.0,
            max_green: 30.0,
            yellow_duration: 5.0,
            all_red_duration: 2.0,
            clearance_threshold: 3,
            clearance_wait_time: 5.0,
            emergency_green_time: 60.0,
            staleness_bound: 2.0,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

impl SignalTiming {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sequence.is_empty() {
            return Err(ConfigError::EmptySequence);
        }
        let mut seen = HashSet::new();
        for side in &self.sequence {
            if !seen.insert(*side) {
                return Err(ConfigError::DuplicateSide(*side));
            }
        }
        check_duration("min_green", self.min_green)?;
        check_duration("max_green", self.max_green)?;
        check_duration("yellow_duration", self.yellow_duration)?;
        check_duration("all_red_duration", self.all_red_duration)?;
        check_duration("clearance_wait_time", self.clearance_wait_time)?;
        check_duration("emergency_green_time", self.emergency_green_time)?;
        check_duration("staleness_bound", self.staleness_bound)?;
        if self.min_green > self.max_green {
            return Err(ConfigError::MinGreenExceedsMaxGreen {
                min_green: self.min_green,
                max_green: self.max_green,
            });
        }
        check_positive("history_capacity", self.history_capacity as f64)?;
        Ok(())
    }
}

/// Share of spawned vehicles per turn intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnMix {
    pub straight: f64,
    pub left: f64,
    pub right: f64,
}

impl Default for TurnMix {
    fn default() -> Self {
        Self {
            straight: 0.6,
            left: 0.2,
            right: 0.2,
        }
    }
}

/// Spawn, capacity and geometry settings for the queue simulator.
///
/// Distances are measured along a vehicle's path from the intersection
/// centre; speed is distance per second of simulated time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    pub spawn_probability: f64,
    pub type_probabilities: BTreeMap<VehicleType, f64>,
    pub queue_capacity: usize,
    /// Optional cap on vehicles of one type waiting on a single side.
    pub type_capacity: BTreeMap<VehicleType, usize>,
    pub min_following_gap: f64,
    pub speed: f64,
    /// Nominal tick length used to bound the per-tick step.
    pub tick_seconds: f64,
    pub spawn_distance: f64,
    pub spawn_spacing: f64,
    pub stop_line_distance: f64,
    pub stop_line_margin: f64,
    pub crossing_distance: f64,
    pub turn_mix: TurnMix,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        let mut type_probabilities = BTreeMap::new();
        type_probabilities.insert(VehicleType::Car, 0.6);
        type_probabilities.insert(VehicleType::Truck, 0.25);
        type_probabilities.insert(VehicleType::Bus, 0.15);

        Self {
            spawn_probability: 0.4,
            type_probabilities,
            queue_capacity: 15,
            type_capacity: BTreeMap::new(),
            min_following_gap: 50.0,
            speed: 180.0,
            tick_seconds: 1.0 / 60.0,
            spawn_distance: 300.0,
            spawn_spacing: 60.0,
            stop_line_distance: 150.0,
            stop_line_margin: 10.0,
            crossing_distance: 400.0,
            turn_mix: TurnMix::default(),
        }
    }
}

impl SimulatorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_probability("spawn_probability", self.spawn_probability)?;
        check_distribution("type_probabilities", self.type_probabilities.values().copied())?;
        check_distribution(
            "turn_mix",
            [self.turn_mix.straight, self.turn_mix.left, self.turn_mix.right],
        )?;
        check_positive("queue_capacity", self.queue_capacity as f64)?;
        check_positive("min_following_gap", self.min_following_gap)?;
        check_positive("speed", self.speed)?;
        check_positive("tick_seconds", self.tick_seconds)?;
        check_positive("spawn_spacing", self.spawn_spacing)?;
        check_positive("crossing_distance", self.crossing_distance)?;
        check_duration("stop_line_margin", self.stop_line_margin)?;

        let step = self.step_per_tick();
        if step >= self.min_following_gap {
            return Err(ConfigError::SpeedExceedsGap {
                step,
                gap: self.min_following_gap,
            });
        }
        if self.stop_line_distance <= 0.0 || self.stop_line_distance >= self.spawn_distance {
            return Err(ConfigError::StopLineOutOfRange {
                stop_line: self.stop_line_distance,
                spawn: self.spawn_distance,
            });
        }
        Ok(())
    }

    pub fn step_per_tick(&self) -> f64 {
        self.speed * self.tick_seconds
    }
}

/// Where and how often the CSV log is written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub enabled: bool,
    pub csv_path: String,
    /// Seconds between periodic count samples.
    pub sample_interval: f64,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            csv_path: DEFAULT_CSV_LOG_FILE.to_string(),
            sample_interval: 5.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub timing: SignalTiming,
    pub simulator: SimulatorConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Loads `path` when given; otherwise the default config file if one
    /// exists, falling back to built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::from_json_file(path);
        }
        let default_path = Path::new(DEFAULT_CONFIG_FILE);
        if default_path.exists() {
            log::info!("Loading configuration from {}", default_path.display());
            return Self::from_json_file(default_path);
        }
        Ok(Self::default())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.timing.validate()?;
        self.simulator.validate()?;
        check_positive("sample_interval", self.logging.sample_interval)?;
        Ok(())
    }
}
