use crate::config::SimulatorConfig;
use crate::control_system::Phase;
use crate::simulation_engine::vehicles::Vehicle;

/// Decides whether `vehicle` holds position this tick.
///
/// `ahead` holds every vehicle in front of it in the same queue, front first.
///
/// # Behavior
///
/// - A vehicle past the stop line never stops, whatever the signal shows.
/// - Otherwise it stops when any vehicle ahead is closer than the following gap.
/// - Otherwise it stops when its side is not GREEN and it is within the
///   approach margin of the stop line.
pub fn should_stop(
    vehicle: &Vehicle,
    ahead: &[Vehicle],
    phase: Phase,
    config: &SimulatorConfig,
) -> bool {
    if vehicle.crossed_stop_line {
        return false;
    }

    if ahead
        .iter()
        .any(|other| vehicle.gap_to(other) < config.min_following_gap)
    {
        return true;
    }

    if phase == Phase::Green {
        return false;
    }

    vehicle.distance_to_stop_line(config.stop_line_distance) <= config.stop_line_margin
}

/// Moves `vehicle` forward by `step`, then applies the stop-line, turn and
/// crossing thresholds it passed.
///
/// Vehicles that have not reached the stop line are never moved closer than
/// the following gap to `front`, the vehicle directly ahead, and never past
/// the line unless `phase` is GREEN.
pub fn advance_vehicle(
    vehicle: &mut Vehicle,
    front: Option<&Vehicle>,
    phase: Phase,
    step: f64,
    config: &SimulatorConfig,
) {
    if vehicle.crossed_intersection {
        return;
    }

    let mut distance = step;
    if !vehicle.crossed_stop_line {
        if let Some(front) = front {
            let room = vehicle.gap_to(front) - config.min_following_gap;
            distance = distance.min(room.max(0.0));
        }
        if phase != Phase::Green {
            let to_line = vehicle.distance_to_stop_line(config.stop_line_distance);
            distance = distance.min(to_line.max(0.0));
        }
    }
    vehicle.offset += distance;

    if !vehicle.crossed_stop_line && vehicle.offset > -config.stop_line_distance {
        vehicle.crossed_stop_line = true;
    }

    if !vehicle.turned && vehicle.offset >= 0.0 {
        vehicle.turned = true;
        let before = vehicle.current_side;
        vehicle.current_side = vehicle.turn_intent.apply(before);
        if vehicle.current_side != before {
            log::trace!(
                "{} turned {:?}: {} -> {}",
                vehicle.id,
                vehicle.turn_intent,
                before,
                vehicle.current_side
            );
        }
    }

    if vehicle.offset > config.crossing_distance {
        vehicle.crossed_intersection = true;
    }
}
