use smart_signal::config::{AppConfig, SignalTiming, SimulatorConfig};
use smart_signal::control_system::{Phase, TransitionReason};
use smart_signal::engine::CooperativeSession;
use smart_signal::monitoring::traffic_monitoring_system::{read_records, summarize, TrafficRecorder};
use smart_signal::shared_data::Side;

fn next_in(sequence: &[Side], side: Side) -> Side {
    let index = sequence.iter().position(|s| *s == side).unwrap();
    sequence[(index + 1) % sequence.len()]
}

#[test]
fn one_side_active_and_sequence_followed_over_long_run() {
    let config = AppConfig::default();
    let mut session = CooperativeSession::new(&config, Some(2024), TrafficRecorder::disabled()).unwrap();
    let sequence = config.timing.sequence.clone();
    let dt = config.simulator.tick_seconds;
    let mut switches = 0;

    for _ in 0..30_000 {
        let outcome = session.step();

        let states = session.controller().signal_states();
        let active: Vec<_> = states.iter().filter(|(_, p)| **p != Phase::Red).collect();
        assert!(active.len() <= 1, "more than one side active: {:?}", states);
        let green = states.values().filter(|p| **p == Phase::Green).count();
        assert!(green <= 1);

        if let Some(event) = outcome.result.event {
            switches += 1;
            assert_eq!(event.to_side, next_in(&sequence, event.from_side));
            assert!(event.held_duration >= config.timing.min_green);
            match event.reason {
                TransitionReason::MaxTime => {
                    assert!(event.held_duration < config.timing.max_green + 2.0 * dt)
                }
                TransitionReason::EarlyClearance => {}
                other => panic!("unexpected reason {:?} without emergencies", other),
            }
        }

        for side in Side::ALL {
            let lane = session.simulator().lane(side).unwrap();
            let offsets: Vec<f64> = lane.vehicles().iter().map(|v| v.offset).collect();
            assert!(offsets.windows(2).all(|w| w[0] >= w[1]));
            assert!(lane.len() <= config.simulator.queue_capacity);
        }
    }

    // 500 simulated seconds cannot pass without a full rotation.
    assert!(switches >= 4);
    assert!(session.controller().total_cycles() >= 1);
    let stats = session.simulator().stats();
    assert_eq!(
        stats.total_spawned as usize,
        stats.total_crossed as usize + session.simulator().total_vehicles()
    );
}

#[test]
fn sides_outside_the_sequence_never_get_green() {
    let config = AppConfig {
        timing: SignalTiming {
            sequence: vec![Side::North, Side::South],
            ..SignalTiming::default()
        },
        ..AppConfig::default()
    };
    let mut session = CooperativeSession::new(&config, Some(5), TrafficRecorder::disabled()).unwrap();
    for _ in 0..10_000 {
        session.step();
        assert_eq!(session.controller().phase_for(Side::East), Phase::Red);
        assert_eq!(session.controller().phase_for(Side::West), Phase::Red);
    }
    // East and West queues never move past the stop line.
    for side in [Side::East, Side::West] {
        assert!(session
            .simulator()
            .lane(side)
            .unwrap()
            .vehicles()
            .iter()
            .all(|v| !v.crossed_stop_line));
    }
    assert!(!session.manual_override(Side::East));
}

#[test]
fn empty_approaches_switch_on_early_clearance() {
    let config = AppConfig {
        simulator: SimulatorConfig {
            spawn_probability: 0.0,
            ..SimulatorConfig::default()
        },
        ..AppConfig::default()
    };
    let mut session = CooperativeSession::new(&config, Some(9), TrafficRecorder::disabled()).unwrap();
    let mut first = None;
    while first.is_none() {
        first = session.step().result.event;
    }
    let event = first.unwrap();
    assert_eq!(event.reason, TransitionReason::EarlyClearance);
    assert_eq!(event.from_side, Side::North);
    assert_eq!(event.to_side, Side::East);
    // Counts are not looked at before min_green, so the clearance timer starts
    // there and yellow begins clearance_wait_time later.
    let timing = &config.timing;
    let tolerance = 5.0 * config.simulator.tick_seconds;
    let held = timing.min_green + timing.clearance_wait_time;
    assert!((event.held_duration - held).abs() < tolerance);
    let expected = held + timing.yellow_duration + timing.all_red_duration;
    assert!((event.timestamp - expected).abs() < tolerance);
}

#[test]
fn session_writes_a_readable_traffic_log() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("traffic.csv");
    let config = AppConfig::default();
    let mut session = CooperativeSession::new(&config, Some(77), TrafficRecorder::at(&path)).unwrap();
    for _ in 0..(60 * 120) {
        session.step();
    }
    let target = next_in(&config.timing.sequence, session.controller().current_side());
    assert!(session.manual_override(target));
    assert_eq!(session.controller().current_side(), target);

    let summary = summarize(&read_records(&path).unwrap());
    assert_eq!(summary.system_events, 1);
    assert!(summary.total_switches() >= 2);
    assert_eq!(summary.switches_by_reason.get("MANUAL"), Some(&1));
    for side in Side::ALL {
        assert!(summary.samples_by_side.get(side.as_str()).copied().unwrap_or(0) >= 20);
    }
}
