use crate::control_system::{Phase, SignalPhaseController, TransitionEvent, TransitionResult};
use crate::shared_data::{Side, SnapshotBoard, UnknownSide};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Requests handed to the control task. It is the only task that touches the
/// controller, so everything else talks to it through these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlCommand {
    ManualOverride(Side),
    Status,
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandParseError {
    Empty,
    UnknownCommand(String),
    MissingSide,
    BadSide(UnknownSide),
}

impl fmt::Display for CommandParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CommandParseError::Empty => write!(f, "empty command"),
            CommandParseError::UnknownCommand(word) => {
                write!(f, "unknown command '{}' (try: override <side>, status, quit)", word)
            }
            CommandParseError::MissingSide => write!(f, "override needs a side, e.g. 'override north'"),
            CommandParseError::BadSide(UnknownSide(side)) => write!(f, "unknown side '{}'", side),
        }
    }
}

impl std::error::Error for CommandParseError {}

impl ControlCommand {
    /// Parses one operator console line: `override <side>`, `status` or `quit`.
    pub fn parse(line: &str) -> Result<Self, CommandParseError> {
        let mut words = line.split_whitespace();
        let Some(word) = words.next() else {
            return Err(CommandParseError::Empty);
        };
        match word.to_ascii_lowercase().as_str() {
            "override" | "o" => {
                let side = words.next().ok_or(CommandParseError::MissingSide)?;
                side.parse::<Side>()
                    .map(ControlCommand::ManualOverride)
                    .map_err(CommandParseError::BadSide)
            }
            "status" | "s" => Ok(ControlCommand::Status),
            "quit" | "exit" | "q" => Ok(ControlCommand::Shutdown),
            other => Err(CommandParseError::UnknownCommand(other.to_string())),
        }
    }
}

/// What the control task publishes after every tick for presentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlFrame {
    pub tick: u64,
    /// Controller clock, seconds since start.
    pub time: f64,
    pub current_side: Side,
    pub next_side: Side,
    pub phase: Phase,
    pub signal_states: BTreeMap<Side, Phase>,
    pub time_remaining: f64,
    pub emergency_mode: bool,
    pub degraded: bool,
    pub decision: String,
    /// Latest known vehicle count per side; missing when no snapshot arrived yet.
    pub counts: BTreeMap<Side, usize>,
    pub last_event: Option<TransitionEvent>,
}

impl ControlFrame {
    /// Frame describing `controller` right after `result` was produced.
    pub fn capture(
        tick: u64,
        now: f64,
        controller: &SignalPhaseController,
        result: &TransitionResult,
        board: &SnapshotBoard,
    ) -> Self {
        Self {
            tick,
            time: now,
            current_side: controller.current_side(),
            next_side: controller.next_side(),
            phase: controller.phase(),
            signal_states: controller.signal_states(),
            time_remaining: controller.time_remaining(now),
            emergency_mode: controller.emergency_mode(),
            degraded: result.degraded,
            decision: result.decision.describe().to_string(),
            counts: board
                .iter()
                .map(|(side, stamped)| (*side, stamped.snapshot.total_vehicles))
                .collect(),
            last_event: controller.history().last().cloned(),
        }
    }

    /// One-line status for the console.
    pub fn status_line(&self) -> String {
        let counts = Side::ALL
            .iter()
            .map(|side| match self.counts.get(side) {
                Some(n) => format!("{}={}", side, n),
                None => format!("{}=?", side),
            })
            .collect::<Vec<_>>()
            .join(" ");
        let mut line = format!(
            "[t={:7.1}s] {} {} ({:.1}s left) | {}",
            self.time, self.current_side, self.phase, self.time_remaining, counts
        );
        if self.emergency_mode {
            line.push_str(" | EMERGENCY");
        }
        if self.degraded {
            line.push_str(" | DEGRADED");
        }
        line
    }
}
