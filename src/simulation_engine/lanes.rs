use crate::config::SimulatorConfig;
use crate::control_system::Phase;
use crate::shared_data::{CountSnapshot, Side, VehicleType};
use crate::simulation_engine::movement::{advance_vehicle, should_stop};
use crate::simulation_engine::vehicles::Vehicle;

/// One approach of the intersection: an ordered queue, front vehicle first.
#[derive(Debug, Clone)]
pub struct ApproachLane {
    pub side: Side,
    vehicles: Vec<Vehicle>,
}

impl ApproachLane {
    pub fn new(side: Side) -> Self {
        Self {
            side,
            vehicles: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.vehicles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty()
    }

    pub fn vehicles(&self) -> &[Vehicle] {
        &self.vehicles
    }

    pub fn count_of(&self, vehicle_type: VehicleType) -> usize {
        self.vehicles
            .iter()
            .filter(|v| v.vehicle_type == vehicle_type)
            .count()
    }

    /// Where a vehicle joining the back of the queue is placed: its nominal
    /// slot behind the stop area, pushed further back if the last vehicle is
    /// still there.
    pub fn spawn_offset(&self, config: &SimulatorConfig) -> f64 {
        let slot = -(config.spawn_distance + self.vehicles.len() as f64 * config.spawn_spacing);
        match self.vehicles.last() {
            Some(last) => slot.min(last.offset - config.spawn_spacing),
            None => slot,
        }
    }

    /// Appends `vehicle` at the back of the queue.
    pub fn push_back(&mut self, mut vehicle: Vehicle) {
        vehicle.queue_position = self.vehicles.len();
        self.vehicles.push(vehicle);
    }

    /// Moves every vehicle front to back under `phase`.
    pub fn move_vehicles(&mut self, phase: Phase, step: f64, config: &SimulatorConfig) {
        for index in 0..self.vehicles.len() {
            let (ahead, rest) = self.vehicles.split_at_mut(index);
            let vehicle = &mut rest[0];
            if should_stop(vehicle, ahead, phase, config) {
                continue;
            }
            advance_vehicle(vehicle, ahead.last(), phase, step, config);
        }
    }

    /// Removes every vehicle that has left the intersection and renumbers the rest.
    pub fn retire_crossed(&mut self) -> Vec<Vehicle> {
        let (crossed, waiting): (Vec<Vehicle>, Vec<Vehicle>) = self
            .vehicles
            .drain(..)
            .partition(|v| v.crossed_intersection);
        self.vehicles = waiting;
        for (position, vehicle) in self.vehicles.iter_mut().enumerate() {
            vehicle.queue_position = position;
        }
        crossed
    }

    pub fn counts(&self) -> CountSnapshot {
        CountSnapshot::from_types(self.vehicles.iter().map(|v| v.vehicle_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation_engine::vehicles::TurnIntent;

    fn car(plate: &str, offset: f64) -> Vehicle {
        Vehicle::new(
            plate.to_string(),
            VehicleType::Car,
            Side::South,
            0,
            TurnIntent::Straight,
            offset,
        )
    }

    #[test]
    fn spawn_slot_never_lands_ahead_of_last_vehicle() {
        let config = SimulatorConfig::default();
        let mut lane = ApproachLane::new(Side::South);
        assert_eq!(lane.spawn_offset(&config), -300.0);
        lane.push_back(car("A", -600.0));
        assert_eq!(lane.spawn_offset(&config), -660.0);
    }

    #[test]
    fn queue_stays_ordered_while_moving() {
        let config = SimulatorConfig::default();
        let mut lane = ApproachLane::new(Side::South);
        for (i, plate) in ["A", "B", "C", "D"].iter().enumerate() {
            let offset = lane.spawn_offset(&config);
            lane.push_back(car(plate, offset));
            assert_eq!(lane.vehicles()[i].queue_position, i);
        }
        for tick in 0..400 {
            let phase = if (tick / 60) % 2 == 0 { Phase::Red } else { Phase::Green };
            lane.move_vehicles(phase, 3.0, &config);
            let offsets: Vec<f64> = lane.vehicles().iter().map(|v| v.offset).collect();
            assert!(offsets.windows(2).all(|w| w[0] >= w[1]), "tick {}", tick);
            lane.retire_crossed();
        }
    }

    #[test]
    fn retirement_renumbers_remaining_queue() {
        let mut lane = ApproachLane::new(Side::South);
        let mut gone = car("A", 401.0);
        gone.crossed_intersection = true;
        lane.push_back(gone);
        lane.push_back(car("B", -300.0));
        lane.push_back(car("C", -360.0));

        let retired = lane.retire_crossed();
        assert_eq!(retired.len(), 1);
        assert_eq!(retired[0].id, "A");
        assert_eq!(lane.len(), 2);
        assert_eq!(lane.vehicles()[0].id, "B");
        assert_eq!(lane.vehicles()[0].queue_position, 0);
        assert_eq!(lane.vehicles()[1].queue_position, 1);
        assert!(lane.retire_crossed().is_empty());
    }
}
