// benches/bench_signal_controller.rs
use criterion::{
    black_box, criterion_group, criterion_main, AxisScale, BenchmarkId, Criterion,
    PlotConfiguration,
};
use smart_signal::config::SignalTiming;
use smart_signal::control_system::SignalPhaseController;
use smart_signal::shared_data::{CountSnapshot, Side, SnapshotBoard};
use std::time::Duration;

// Board where every side reports `load` vehicles at time `now`.
fn loaded_board(load: usize, now: f64, emergency_on: Option<Side>) -> SnapshotBoard {
    let mut board = SnapshotBoard::new();
    for side in Side::ALL {
        let snapshot =
            CountSnapshot::with_total(load).with_emergency(emergency_on == Some(side));
        board.publish(side, snapshot, now);
    }
    board
}

fn bench_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("controller_update");
    group.sample_size(100);
    group.measurement_time(Duration::from_secs(5));
    group.warm_up_time(Duration::from_secs(2));
    group.plot_config(PlotConfiguration::default().summary_scale(AxisScale::Linear));

    // Low load exercises early clearance, high load runs to max green.
    for &load in [0usize, 3, 20].iter() {
        group.bench_with_input(BenchmarkId::new("load", load), &load, |b, &load| {
            let mut controller = SignalPhaseController::new(SignalTiming::default(), 0.0).unwrap();
            let mut now = 0.0;
            b.iter(|| {
                now += 0.1;
                let board = loaded_board(load, now, None);
                black_box(controller.update(&board, now));
            });
        });
    }

    group.bench_function("emergency_hold", |b| {
        let mut controller = SignalPhaseController::new(SignalTiming::default(), 0.0).unwrap();
        let mut now = 0.0;
        b.iter(|| {
            now += 0.1;
            let board = loaded_board(5, now, Some(Side::North));
            black_box(controller.update(&board, now));
        });
    });

    group.finish();
}

fn bench_manual_override(c: &mut Criterion) {
    c.bench_function("manual_override_rotation", |b| {
        let mut controller = SignalPhaseController::new(SignalTiming::default(), 0.0).unwrap();
        let mut now = 0.0;
        let mut index = 0;
        b.iter(|| {
            now += 1.0;
            index = (index + 1) % Side::ALL.len();
            black_box(controller.manual_override(Side::ALL[index], now));
        });
    });
}

criterion_group!(benches, bench_update, bench_manual_override);
criterion_main!(benches);
