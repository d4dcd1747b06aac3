// engine/cooperative.rs
use crate::communication::messages::ControlFrame;
use crate::config::{AppConfig, ConfigError};
use crate::control_system::{SignalPhaseController, TransitionReason, TransitionResult};
use crate::monitoring::traffic_monitoring_system::{render_dashboard, TrafficRecorder};
use crate::shared_data::Side;
use crate::simulation_engine::{TickSummary, VehicleQueueSimulator};

use tokio::sync::watch;
use tokio::time::{sleep, Duration};

/// Everything one tick of the cooperative loop produced.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub result: TransitionResult,
    pub summary: TickSummary,
}

/// Simulation-only mode: one loop owns both the simulator and the controller
/// and runs spawn, decide, move, retire in that order every tick.
pub struct CooperativeSession {
    controller: SignalPhaseController,
    simulator: VehicleQueueSimulator,
    recorder: TrafficRecorder,
    dt: f64,
    clock: f64,
    tick: u64,
    sample_interval: f64,
    next_sample: f64,
    last_frame: Option<ControlFrame>,
}

impl CooperativeSession {
    pub fn new(
        config: &AppConfig,
        seed: Option<u64>,
        recorder: TrafficRecorder,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let controller = SignalPhaseController::new(config.timing.clone(), 0.0)?;
        let simulator = match seed {
            Some(seed) => VehicleQueueSimulator::with_seed(config.simulator.clone(), seed)?,
            None => VehicleQueueSimulator::new(config.simulator.clone())?,
        };
        recorder.record_system("Traffic system started");
        Ok(Self {
            controller,
            simulator,
            recorder,
            dt: config.simulator.tick_seconds,
            clock: 0.0,
            tick: 0,
            sample_interval: config.logging.sample_interval,
            next_sample: 0.0,
            last_frame: None,
        })
    }

    /// Runs one tick and advances the session clock by the tick length.
    pub fn step(&mut self) -> StepOutcome {
        let now = self.clock_at(self.tick);
        let mut summary = TickSummary {
            spawned: self.simulator.spawn_all(),
            retired: Vec::new(),
        };

        let board = self.simulator.snapshot_board(now);
        let result = self.controller.update(&board, now);
        if let Some(event) = &result.event {
            self.recorder
                .record_signal_change(event, event.reason == TransitionReason::Emergency);
        }

        let states = self.controller.signal_states();
        summary.retired = self.simulator.advance(self.dt, &states);

        if now >= self.next_sample {
            for side in Side::ALL {
                self.recorder.record_vehicle_count(
                    side,
                    self.controller.phase_for(side),
                    &self.simulator.counts(side),
                );
            }
            self.next_sample = now + self.sample_interval;
        }

        self.last_frame = Some(ControlFrame::capture(
            self.tick,
            now,
            &self.controller,
            &result,
            &self.simulator.snapshot_board(now),
        ));
        self.tick += 1;
        self.clock = self.clock_at(self.tick);
        StepOutcome { result, summary }
    }

    /// Clock reading at the start of `tick`, taken from the tick count so
    /// rounding does not build up over long runs.
    fn clock_at(&self, tick: u64) -> f64 {
        tick as f64 * self.dt
    }

    /// Operator override between ticks.
    pub fn manual_override(&mut self, side: Side) -> bool {
        let before = self.controller.signal_changes();
        let accepted = self.controller.manual_override(side, self.clock);
        if self.controller.signal_changes() > before {
            if let Some(event) = self.controller.history().last() {
                self.recorder.record_signal_change(event, false);
            }
        }
        accepted
    }

    /// Ticks until `max_ticks` have run or `shutdown` turns true. The stop
    /// request is only looked at between ticks.
    pub async fn run(
        &mut self,
        max_ticks: Option<u64>,
        realtime: bool,
        render_every: u64,
        mut shutdown: watch::Receiver<bool>,
    ) -> u64 {
        let mut ran = 0;
        log::info!("Cooperative simulation started (tick {:.4}s)", self.dt);
        loop {
            if *shutdown.borrow_and_update() {
                log::info!("Stop requested at tick {}", self.tick);
                break;
            }
            if max_ticks.is_some_and(|max| ran >= max) {
                break;
            }

            let outcome = self.step();
            ran += 1;
            if let Some(event) = &outcome.result.event {
                println!(
                    "Signal: {} -> {} after {:.1}s ({})",
                    event.from_side, event.to_side, event.held_duration, event.reason
                );
            }
            if render_every > 0 && self.tick % render_every == 0 {
                if let Some(frame) = &self.last_frame {
                    println!("{}", render_dashboard(frame));
                }
            }

            if realtime {
                sleep(Duration::from_secs_f64(self.dt)).await;
            } else {
                tokio::task::yield_now().await;
            }
        }
        self.recorder.record_system("Traffic system stopped");
        log::info!("Cooperative simulation stopped after {} ticks", ran);
        ran
    }

    pub fn controller(&self) -> &SignalPhaseController {
        &self.controller
    }

    pub fn simulator(&self) -> &VehicleQueueSimulator {
        &self.simulator
    }

    pub fn clock(&self) -> f64 {
        self.clock
    }

    pub fn ticks(&self) -> u64 {
        self.tick
    }

    pub fn last_frame(&self) -> Option<&ControlFrame> {
        self.last_frame.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control_system::Phase;

    fn quiet_session(seed: u64) -> CooperativeSession {
        CooperativeSession::new(&AppConfig::default(), Some(seed), TrafficRecorder::disabled())
            .unwrap()
    }

    #[test]
    fn step_advances_clock_and_frame() {
        let mut session = quiet_session(1);
        session.step();
        session.step();
        assert_eq!(session.ticks(), 2);
        assert!((session.clock() - 2.0 / 60.0).abs() < 1e-9);
        let frame = session.last_frame().unwrap();
        assert_eq!(frame.tick, 1);
        assert_eq!(frame.current_side, Side::North);
        assert_eq!(frame.counts.len(), 4);
    }

    #[test]
    fn manual_override_takes_effect_before_next_tick() {
        let mut session = quiet_session(2);
        for _ in 0..30 {
            session.step();
        }
        assert!(session.manual_override(Side::West));
        assert_eq!(session.controller().current_side(), Side::West);
        assert_eq!(session.controller().phase_for(Side::North), Phase::Red);
        let outcome = session.step();
        assert_eq!(outcome.result.current_side, Side::West);
    }

    #[test]
    fn clock_tracks_tick_count_without_drift() {
        let mut session = quiet_session(4);
        for _ in 0..600 {
            session.step();
        }
        assert!((session.clock() - 10.0).abs() <= 10.0 * f64::EPSILON);
        assert_eq!(session.clock_at(600), session.clock());
    }

    #[tokio::test]
    async fn run_stops_on_tick_budget_and_on_shutdown() {
        let mut session = quiet_session(3);
        let (tx, rx) = watch::channel(false);
        assert_eq!(session.run(Some(120), false, 0, rx.clone()).await, 120);

        tx.send(true).unwrap();
        assert_eq!(session.run(None, false, 0, rx).await, 0);
        assert_eq!(session.ticks(), 120);
    }
}
