use crate::config::{ConfigError, SignalTiming};
use crate::control_system::side_ring::SideRing;
use crate::shared_data::{Side, SnapshotBoard};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

/// Signal state of the active side, or of any side when viewed individually.
/// Non-active sides are always `Red`; the controller itself never sits in `Red`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Green,
    Yellow,
    AllRed,
    Red,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Green => "GREEN",
            Phase::Yellow => "YELLOW",
            Phase::AllRed => "ALL_RED",
            Phase::Red => "RED",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why a side lost its green.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransitionReason {
    /// Fixed-timer switch taken while the active side's counts were unavailable.
    Standard,
    MaxTime,
    EarlyClearance,
    Emergency,
    Manual,
}

impl TransitionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionReason::Standard => "STANDARD",
            TransitionReason::MaxTime => "MAX_TIME",
            TransitionReason::EarlyClearance => "EARLY_CLEARANCE",
            TransitionReason::Emergency => "EMERGENCY",
            TransitionReason::Manual => "MANUAL",
        }
    }
}

impl std::fmt::Display for TransitionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A completed hand-over of the green from one side to another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionEvent {
    pub from_side: Side,
    pub to_side: Side,
    /// Seconds the previous side spent in GREEN.
    pub held_duration: f64,
    pub reason: TransitionReason,
    /// Controller clock at which the new GREEN began.
    pub timestamp: f64,
}

/// What a single `update` call decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// GREEN below `min_green`; counts are not looked at.
    MinGreenHold,
    /// GREEN continues with traffic above the clearance threshold, or counts unavailable.
    Continuing,
    /// GREEN continues while the low-traffic timer runs.
    ClearancePending,
    /// Emergency reported on the active side; max-green is suspended.
    EmergencyHold,
    /// GREEN ended, YELLOW began.
    YellowStarted(TransitionReason),
    /// YELLOW ended, every side is RED.
    AllRedStarted,
    /// YELLOW or ALL_RED still running.
    DwellRunning,
    /// A new side is GREEN.
    Switched(TransitionReason),
}

impl Decision {
    pub fn describe(&self) -> &'static str {
        match self {
            Decision::MinGreenHold => "minimum green",
            Decision::Continuing => "continuing current signal",
            Decision::ClearancePending => "low traffic, clearance pending",
            Decision::EmergencyHold => "emergency hold",
            Decision::YellowStarted(_) => "yellow started",
            Decision::AllRedStarted => "all red",
            Decision::DwellRunning => "dwell",
            Decision::Switched(_) => "switched",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransitionResult {
    pub decision: Decision,
    pub current_side: Side,
    pub phase: Phase,
    /// Set when this call completed a hand-over.
    pub event: Option<TransitionEvent>,
    pub emergency_mode: bool,
    /// True when the active side's counts were missing or stale this tick.
    pub degraded: bool,
    pub time_remaining: f64,
}

impl TransitionResult {
    pub fn switched(&self) -> bool {
        self.event.is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ControllerStatistics {
    pub total_cycles: u64,
    pub current_side: Side,
    pub phase: Phase,
    pub current_duration: f64,
    pub signal_changes: u64,
    pub recent_changes: Vec<TransitionEvent>,
}

/// Adaptive phase controller for a single intersection.
///
/// Exactly one side holds GREEN, YELLOW or ALL_RED at a time; every other side
/// is RED. Emergency and manual requests jump straight to GREEN on their target.
#[derive(Debug, Clone)]
pub struct SignalPhaseController {
    timing: SignalTiming,
    ring: SideRing,
    phase: Phase,
    phase_start_time: f64,
    green_start_time: f64,
    /// Reason and green length captured when YELLOW began.
    pending_switch: Option<(TransitionReason, f64)>,
    low_traffic_start_time: Option<f64>,
    emergency_mode: bool,
    emergency_side: Option<Side>,
    degraded: bool,
    total_cycles: u64,
    signal_changes: u64,
    history: VecDeque<TransitionEvent>,
}

impl SignalPhaseController {
    /// Starts with the first side of the sequence GREEN at `now`.
    pub fn new(timing: SignalTiming, now: f64) -> Result<Self, ConfigError> {
        timing.validate()?;
        let ring = SideRing::new(timing.sequence.clone())?;
        log::info!(
            "Signal controller initialised: sequence {:?}, green {}s..{}s, yellow {}s, all-red {}s, clearance <= {} vehicles for {}s",
            ring.sides(),
            timing.min_green,
            timing.max_green,
            timing.yellow_duration,
            timing.all_red_duration,
            timing.clearance_threshold,
            timing.clearance_wait_time
        );
        let history = VecDeque::with_capacity(timing.history_capacity);

        Ok(Self {
            timing,
            ring,
            phase: Phase::Green,
            phase_start_time: now,
            green_start_time: now,
            pending_switch: None,
            low_traffic_start_time: None,
            emergency_mode: false,
            emergency_side: None,
            degraded: false,
            total_cycles: 0,
            signal_changes: 0,
            history,
        })
    }

    /// Decides, from the latest counts, whether the signal moves on at `now`.
    pub fn update(&mut self, board: &SnapshotBoard, now: f64) -> TransitionResult {
        if let Some(target) = self.find_emergency(board, now) {
            if target == self.current_side() && self.phase == Phase::Green {
                if !self.emergency_mode {
                    log::warn!("Emergency vehicle on active side {}: holding green", target);
                }
                self.emergency_mode = true;
                self.emergency_side = Some(target);
                self.low_traffic_start_time = None;
                return self.result(Decision::EmergencyHold, None, now);
            }
            log::warn!(
                "EMERGENCY VEHICLE DETECTED on {}: preempting {} ({})",
                target,
                self.current_side(),
                self.phase
            );
            let event = self.force_green(target, TransitionReason::Emergency, now);
            return self.result(Decision::Switched(TransitionReason::Emergency), Some(event), now);
        }

        if self.emergency_mode {
            log::info!(
                "Emergency cleared on {}: resuming normal sequencing",
                self.emergency_side.map(|s| s.as_str()).unwrap_or("?")
            );
            self.emergency_mode = false;
            self.emergency_side = None;
        }

        let elapsed = now - self.phase_start_time;
        match self.phase {
            Phase::Green => self.step_green(board, elapsed, now),
            Phase::Yellow => {
                if elapsed >= self.timing.yellow_duration {
                    self.phase = Phase::AllRed;
                    self.phase_start_time = now;
                    log::debug!("{}: yellow -> all red", self.current_side());
                    self.result(Decision::AllRedStarted, None, now)
                } else {
                    self.result(Decision::DwellRunning, None, now)
                }
            }
            Phase::AllRed | Phase::Red => {
                if elapsed >= self.timing.all_red_duration {
                    let event = self.advance_to_next_side(now);
                    let reason = event.reason;
                    self.result(Decision::Switched(reason), Some(event), now)
                } else {
                    self.result(Decision::DwellRunning, None, now)
                }
            }
        }
    }

    /// Operator override: GREEN on `target` immediately, bypassing dwell.
    /// Returns false, leaving state untouched, when `target` is not sequenced.
    pub fn manual_override(&mut self, target: Side, now: f64) -> bool {
        if !self.ring.contains(target) {
            log::warn!("Manual override rejected: {} is not in the signal sequence", target);
            return false;
        }
        if target == self.current_side() && self.phase == Phase::Green {
            return true;
        }
        log::warn!("MANUAL OVERRIDE: {} -> {}", self.current_side(), target);
        self.force_green(target, TransitionReason::Manual, now);
        true
    }

    pub fn current_side(&self) -> Side {
        self.ring.current()
    }

    /// Side that gets the green after the current one in normal sequencing.
    pub fn next_side(&self) -> Side {
        self.ring.peek_next()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn phase_start_time(&self) -> f64 {
        self.phase_start_time
    }

    pub fn emergency_mode(&self) -> bool {
        self.emergency_mode
    }

    pub fn emergency_side(&self) -> Option<Side> {
        self.emergency_side
    }

    pub fn low_traffic_start_time(&self) -> Option<f64> {
        self.low_traffic_start_time
    }

    pub fn total_cycles(&self) -> u64 {
        self.total_cycles
    }

    pub fn signal_changes(&self) -> u64 {
        self.signal_changes
    }

    pub fn sequence(&self) -> &[Side] {
        self.ring.sides()
    }

    /// Recent hand-overs, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &TransitionEvent> {
        self.history.iter()
    }

    /// Light shown to `side`.
    pub fn phase_for(&self, side: Side) -> Phase {
        if side == self.current_side() {
            self.phase
        } else {
            Phase::Red
        }
    }

    /// Light shown to every side of the intersection, sequenced or not.
    pub fn signal_states(&self) -> BTreeMap<Side, Phase> {
        Side::ALL
            .iter()
            .map(|side| (*side, self.phase_for(*side)))
            .collect()
    }

    /// Seconds left in the current phase. During an emergency hold this counts
    /// down the advisory emergency green time.
    pub fn time_remaining(&self, now: f64) -> f64 {
        let elapsed = now - self.phase_start_time;
        let limit = match self.phase {
            Phase::Green if self.emergency_mode => self.timing.emergency_green_time,
            Phase::Green => self.timing.max_green,
            Phase::Yellow => self.timing.yellow_duration,
            Phase::AllRed | Phase::Red => self.timing.all_red_duration,
        };
        (limit - elapsed).max(0.0)
    }

    pub fn statistics(&self, now: f64) -> ControllerStatistics {
        ControllerStatistics {
            total_cycles: self.total_cycles,
            current_side: self.current_side(),
            phase: self.phase,
            current_duration: now - self.phase_start_time,
            signal_changes: self.signal_changes,
            recent_changes: self.history.iter().cloned().collect(),
        }
    }

    fn step_green(&mut self, board: &SnapshotBoard, elapsed: f64, now: f64) -> TransitionResult {
        let current = self.current_side();
        let count = board
            .fresh(current, now, self.timing.staleness_bound)
            .map(|snapshot| snapshot.total_vehicles);
        self.note_degraded(count.is_none(), current);

        if elapsed < self.timing.min_green {
            return self.result(Decision::MinGreenHold, None, now);
        }

        if elapsed >= self.timing.max_green {
            let reason = if self.degraded {
                TransitionReason::Standard
            } else {
                TransitionReason::MaxTime
            };
            return self.begin_switch(reason, now);
        }

        let Some(vehicles) = count else {
            self.low_traffic_start_time = None;
            return self.result(Decision::Continuing, None, now);
        };

        if vehicles <= self.timing.clearance_threshold {
            let since = *self.low_traffic_start_time.get_or_insert_with(|| {
                log::debug!("{}: low traffic ({} vehicles), clearance timer started", current, vehicles);
                now
            });
            if now - since >= self.timing.clearance_wait_time {
                return self.begin_switch(TransitionReason::EarlyClearance, now);
            }
            self.result(Decision::ClearancePending, None, now)
        } else {
            if self.low_traffic_start_time.take().is_some() {
                log::debug!("{}: traffic back to {} vehicles, clearance timer reset", current, vehicles);
            }
            self.result(Decision::Continuing, None, now)
        }
    }

    fn begin_switch(&mut self, reason: TransitionReason, now: f64) -> TransitionResult {
        let held = now - self.green_start_time;
        log::debug!("{}: green -> yellow after {:.1}s ({})", self.current_side(), held, reason);
        self.pending_switch = Some((reason, held));
        self.phase = Phase::Yellow;
        self.phase_start_time = now;
        self.low_traffic_start_time = None;
        self.result(Decision::YellowStarted(reason), None, now)
    }

    fn advance_to_next_side(&mut self, now: f64) -> TransitionEvent {
        let from_side = self.current_side();
        let to_side = self.ring.advance();
        let (reason, held_duration) = self
            .pending_switch
            .take()
            .unwrap_or((TransitionReason::Standard, now - self.green_start_time));

        self.phase = Phase::Green;
        self.phase_start_time = now;
        self.green_start_time = now;
        self.low_traffic_start_time = None;
        if to_side == self.ring.first() {
            self.total_cycles += 1;
        }

        let event = TransitionEvent {
            from_side,
            to_side,
            held_duration,
            reason,
            timestamp: now,
        };
        log::info!(
            "SIGNAL CHANGE: {} -> {} | held {:.1}s | reason {}",
            from_side,
            to_side,
            held_duration,
            reason
        );
        self.record(event.clone());
        event
    }

    /// Jumps straight to GREEN on `target`; every other side goes RED at once.
    fn force_green(&mut self, target: Side, reason: TransitionReason, now: f64) -> TransitionEvent {
        let from_side = self.current_side();
        let held_duration = match self.pending_switch.take() {
            Some((_, held)) => held,
            None => now - self.green_start_time,
        };
        self.ring.jump_to(target);
        self.phase = Phase::Green;
        self.phase_start_time = now;
        self.green_start_time = now;
        self.low_traffic_start_time = None;

        match reason {
            TransitionReason::Emergency => {
                self.emergency_mode = true;
                self.emergency_side = Some(target);
            }
            _ => {
                self.emergency_mode = false;
                self.emergency_side = None;
            }
        }

        let event = TransitionEvent {
            from_side,
            to_side: target,
            held_duration,
            reason,
            timestamp: now,
        };
        self.record(event.clone());
        event
    }

    /// Side to preempt for, if any sequenced side reports an emergency.
    /// The active side wins; otherwise sides are scanned in ring order after it.
    fn find_emergency(&self, board: &SnapshotBoard, now: f64) -> Option<Side> {
        for (side, stamped) in board.iter() {
            if stamped.snapshot.emergency_present
                && !self.ring.contains(*side)
                && board.fresh(*side, now, self.timing.staleness_bound).is_some()
            {
                log::warn!(
                    "Emergency reported on {} ignored: side is not in the signal sequence",
                    side
                );
            }
        }

        let sides = self.ring.sides();
        let start = self.ring.index();
        (0..sides.len())
            .map(|offset| sides[(start + offset) % sides.len()])
            .find(|side| {
                board
                    .fresh(*side, now, self.timing.staleness_bound)
                    .map(|snapshot| snapshot.emergency_present)
                    .unwrap_or(false)
            })
    }

    fn note_degraded(&mut self, degraded: bool, side: Side) {
        if degraded && !self.degraded {
            log::warn!("No fresh counts for {}: falling back to fixed timing", side);
        } else if !degraded && self.degraded {
            log::info!("Counts for {} available again: adaptive timing resumed", side);
        }
        self.degraded = degraded;
    }

    fn record(&mut self, event: TransitionEvent) {
        self.signal_changes += 1;
        if self.history.len() == self.timing.history_capacity {
            self.history.pop_front();
        }
        self.history.push_back(event);
    }

    fn result(
        &self,
        decision: Decision,
        event: Option<TransitionEvent>,
        now: f64,
    ) -> TransitionResult {
        TransitionResult {
            decision,
            current_side: self.current_side(),
            phase: self.phase,
            event,
            emergency_mode: self.emergency_mode,
            degraded: self.degraded,
            time_remaining: self.time_remaining(now),
        }
    }
}
