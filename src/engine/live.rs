// engine/live.rs
//! Multi-task live mode.
//!
//! Each side has one snapshot slot, a `watch` channel written by exactly one
//! producer and replaced as a whole value, so readers only ever see a complete
//! snapshot. A single control task owns the `SignalPhaseController`; operator
//! commands reach it over an `mpsc` channel. A presentation task prints the
//! frames the control task publishes. Every task checks the shared stop flag
//! between ticks only.

use crate::communication::messages::{ControlCommand, ControlFrame};
use crate::config::{ConfigError, SignalTiming};
use crate::control_system::{Phase, SignalPhaseController, TransitionReason};
use crate::engine::sources::VehicleCountSource;
use crate::monitoring::traffic_monitoring_system::{render_dashboard, TrafficRecorder};
use crate::shared_data::{Side, SnapshotBoard, StampedSnapshot};
use crate::simulation_engine::VehicleQueueSimulator;

use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, Instant, Interval, MissedTickBehavior};

type Slot = watch::Sender<Option<StampedSnapshot>>;

/// Where live counts come from.
pub enum LiveSources {
    /// One acquisition task per side, each owning its own source.
    PerSide(BTreeMap<Side, Box<dyn VehicleCountSource>>),
    /// A simulator driven by the published signal states; one task ticks it
    /// and refreshes every side's slot.
    Simulated(VehicleQueueSimulator),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presentation {
    /// Print a status line every presentation period.
    Console,
    /// Print the full signal board every presentation period.
    Dashboard,
    Silent,
}

#[derive(Debug, Clone)]
pub struct LiveOptions {
    pub control_period: Duration,
    pub acquisition_period: Duration,
    pub presentation_period: Duration,
    pub sample_interval: f64,
    pub presentation: Presentation,
}

impl Default for LiveOptions {
    fn default() -> Self {
        Self {
            control_period: Duration::from_millis(100),
            acquisition_period: Duration::from_millis(500),
            presentation_period: Duration::from_secs(1),
            sample_interval: 5.0,
            presentation: Presentation::Console,
        }
    }
}

/// Running live system. Dropping it without `shutdown` leaves the tasks running
/// until the runtime stops.
pub struct LiveHandle {
    commands: mpsc::Sender<ControlCommand>,
    frames: watch::Receiver<Option<ControlFrame>>,
    stop: Arc<watch::Sender<bool>>,
    control: JoinHandle<SignalPhaseController>,
    workers: Vec<JoinHandle<()>>,
}

impl LiveHandle {
    /// Queues a command for the control task. Returns false once it has stopped.
    pub async fn send(&self, command: ControlCommand) -> bool {
        self.commands.send(command).await.is_ok()
    }

    pub fn commands(&self) -> mpsc::Sender<ControlCommand> {
        self.commands.clone()
    }

    pub fn frames(&self) -> watch::Receiver<Option<ControlFrame>> {
        self.frames.clone()
    }

    pub fn latest_frame(&self) -> Option<ControlFrame> {
        self.frames.borrow().clone()
    }

    pub fn is_stopping(&self) -> bool {
        *self.stop.borrow()
    }

    /// Asks every task to stop at its next tick boundary, waits for them, and
    /// hands back the controller in its final state.
    pub async fn shutdown(self) -> Result<SignalPhaseController, tokio::task::JoinError> {
        self.stop.send_replace(true);
        self.join().await
    }

    /// Waits until the system stops on its own (for instance after a
    /// `Shutdown` command).
    pub async fn join(self) -> Result<SignalPhaseController, tokio::task::JoinError> {
        let controller = self.control.await;
        self.stop.send_replace(true);
        for worker in self.workers {
            worker.await?;
        }
        controller
    }
}

/// Starts the live system. Fails before any task is spawned when `timing` is
/// invalid.
pub fn spawn_live(
    timing: SignalTiming,
    sources: LiveSources,
    recorder: TrafficRecorder,
    options: LiveOptions,
) -> Result<LiveHandle, ConfigError> {
    let controller = SignalPhaseController::new(timing, 0.0)?;
    let start = Instant::now();

    let (stop_tx, stop_rx) = watch::channel(false);
    let stop = Arc::new(stop_tx);
    let (command_tx, command_rx) = mpsc::channel(16);
    let (frame_tx, frame_rx) = watch::channel(None);

    let mut slots: BTreeMap<Side, watch::Receiver<Option<StampedSnapshot>>> = BTreeMap::new();
    let mut writers: BTreeMap<Side, Slot> = BTreeMap::new();
    for side in Side::ALL {
        let (tx, rx) = watch::channel(None);
        writers.insert(side, tx);
        slots.insert(side, rx);
    }

    let mut workers = Vec::new();
    match sources {
        LiveSources::PerSide(sources) => {
            for (side, source) in sources {
                let Some(slot) = writers.remove(&side) else {
                    continue;
                };
                workers.push(tokio::spawn(acquisition_task(
                    side,
                    source,
                    slot,
                    start,
                    options.acquisition_period,
                    stop_rx.clone(),
                )));
            }
        }
        LiveSources::Simulated(simulator) => {
            let writers = std::mem::take(&mut writers);
            workers.push(tokio::spawn(simulation_task(
                simulator,
                writers,
                frame_rx.clone(),
                start,
                options.acquisition_period,
                stop_rx.clone(),
            )));
        }
    }
    for side in writers.keys() {
        log::warn!("{}: no count source attached, controller will run on fixed timing", side);
    }

    if options.presentation != Presentation::Silent {
        workers.push(tokio::spawn(presentation_task(
            frame_rx.clone(),
            options.presentation,
            options.presentation_period,
            stop_rx.clone(),
        )));
    }

    let control = tokio::spawn(control_task(
        controller,
        slots,
        command_rx,
        frame_tx,
        recorder,
        start,
        options,
        Arc::clone(&stop),
        stop_rx,
    ));

    Ok(LiveHandle {
        commands: command_tx,
        frames: frame_rx,
        stop,
        control,
        workers,
    })
}

fn ticker(period: Duration) -> Interval {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

/// Waits for the next tick. Returns false when the task should stop instead.
async fn next_tick(ticker: &mut Interval, stop: &mut watch::Receiver<bool>) -> bool {
    if *stop.borrow_and_update() {
        return false;
    }
    tokio::select! {
        _ = ticker.tick() => !*stop.borrow(),
        changed = stop.changed() => changed.is_ok() && !*stop.borrow(),
    }
}

fn seconds_since(start: Instant) -> f64 {
    start.elapsed().as_secs_f64()
}

async fn acquisition_task(
    side: Side,
    mut source: Box<dyn VehicleCountSource>,
    slot: Slot,
    start: Instant,
    period: Duration,
    mut stop: watch::Receiver<bool>,
) {
    log::info!("{}: acquisition task started", side);
    let mut ticker = ticker(period);
    while next_tick(&mut ticker, &mut stop).await {
        match source.read(side) {
            Some(snapshot) => {
                slot.send_replace(Some(StampedSnapshot {
                    snapshot,
                    captured_at: seconds_since(start),
                }));
            }
            None => log::warn!("{}: count source returned no reading", side),
        }
    }
    log::info!("{}: acquisition task stopped", side);
}

async fn simulation_task(
    mut simulator: VehicleQueueSimulator,
    writers: BTreeMap<Side, Slot>,
    frames: watch::Receiver<Option<ControlFrame>>,
    start: Instant,
    period: Duration,
    mut stop: watch::Receiver<bool>,
) {
    log::info!("Simulation task started");
    let mut ticker = ticker(period);
    let mut last = seconds_since(start);
    while next_tick(&mut ticker, &mut stop).await {
        let now = seconds_since(start);
        let states: BTreeMap<Side, Phase> = frames
            .borrow()
            .as_ref()
            .map(|frame| frame.signal_states.clone())
            .unwrap_or_default();

        simulator.spawn_all();
        simulator.advance(now - last, &states);
        last = now;

        for (side, slot) in &writers {
            slot.send_replace(Some(StampedSnapshot {
                snapshot: simulator.counts(*side),
                captured_at: now,
            }));
        }
    }
    let stats = simulator.stats();
    log::info!(
        "Simulation task stopped: {} spawned, {} crossed",
        stats.total_spawned,
        stats.total_crossed
    );
}

#[allow(clippy::too_many_arguments)]
async fn control_task(
    mut controller: SignalPhaseController,
    slots: BTreeMap<Side, watch::Receiver<Option<StampedSnapshot>>>,
    mut commands: mpsc::Receiver<ControlCommand>,
    frames: watch::Sender<Option<ControlFrame>>,
    recorder: TrafficRecorder,
    start: Instant,
    options: LiveOptions,
    stop_tx: Arc<watch::Sender<bool>>,
    mut stop: watch::Receiver<bool>,
) -> SignalPhaseController {
    log::info!("Control task started");
    recorder.record_system("Traffic system started");
    let mut ticker = ticker(options.control_period);
    let mut tick: u64 = 0;
    let mut next_sample = 0.0;
    let mut commands_open = true;

    loop {
        if *stop.borrow_and_update() {
            break;
        }
        tokio::select! {
            _ = ticker.tick() => {}
            changed = stop.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
            command = commands.recv(), if commands_open => {
                match command {
                    Some(command) => {
                        if !handle_command(&mut controller, command, &frames, &recorder, start, &stop_tx) {
                            break;
                        }
                    }
                    None => commands_open = false,
                }
                continue;
            }
        }

        let now = seconds_since(start);
        let board = read_board(&slots);
        let result = controller.update(&board, now);
        if let Some(event) = &result.event {
            let emergency = event.reason == TransitionReason::Emergency;
            recorder.record_signal_change(event, emergency);
            if emergency {
                recorder.record_emergency(event.to_side);
            }
        }
        if now >= next_sample {
            for (side, stamped) in board.iter() {
                recorder.record_vehicle_count(*side, controller.phase_for(*side), &stamped.snapshot);
            }
            next_sample = now + options.sample_interval;
        }
        frames.send_replace(Some(ControlFrame::capture(tick, now, &controller, &result, &board)));
        tick += 1;
    }

    recorder.record_system("Traffic system stopped");
    log::info!("Control task stopped after {} ticks", tick);
    controller
}

/// Applies one operator command. Returns false when the control task should stop.
fn handle_command(
    controller: &mut SignalPhaseController,
    command: ControlCommand,
    frames: &watch::Sender<Option<ControlFrame>>,
    recorder: &TrafficRecorder,
    start: Instant,
    stop_tx: &watch::Sender<bool>,
) -> bool {
    match command {
        ControlCommand::ManualOverride(side) => {
            let now = seconds_since(start);
            let before = controller.signal_changes();
            if controller.manual_override(side, now) {
                println!("Manual override accepted: {} is GREEN", side);
                if controller.signal_changes() > before {
                    if let Some(event) = controller.history().last() {
                        recorder.record_signal_change(event, false);
                    }
                }
            } else {
                println!("Manual override rejected: {} is not in the signal sequence", side);
            }
            true
        }
        ControlCommand::Status => {
            match frames.borrow().as_ref() {
                Some(frame) => println!("{}", render_dashboard(frame)),
                None => println!("No control tick has run yet"),
            }
            true
        }
        ControlCommand::Shutdown => {
            log::info!("Shutdown requested by operator");
            stop_tx.send_replace(true);
            false
        }
    }
}

fn read_board(slots: &BTreeMap<Side, watch::Receiver<Option<StampedSnapshot>>>) -> SnapshotBoard {
    let mut board = SnapshotBoard::new();
    for (side, slot) in slots {
        if let Some(stamped) = slot.borrow().clone() {
            board.publish(*side, stamped.snapshot, stamped.captured_at);
        }
    }
    board
}

async fn presentation_task(
    mut frames: watch::Receiver<Option<ControlFrame>>,
    presentation: Presentation,
    period: Duration,
    mut stop: watch::Receiver<bool>,
) {
    let mut ticker = ticker(period);
    let mut last_shown = None;
    while next_tick(&mut ticker, &mut stop).await {
        let Some(frame) = frames.borrow_and_update().clone() else {
            continue;
        };
        if last_shown == Some(frame.tick) {
            continue;
        }
        last_shown = Some(frame.tick);
        match presentation {
            Presentation::Console => println!("{}", frame.status_line()),
            Presentation::Dashboard => println!("{}", render_dashboard(&frame)),
            Presentation::Silent => {}
        }
    }
    log::info!("Presentation task stopped");
}
