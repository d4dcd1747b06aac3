use crate::shared_data::{CountSnapshot, Side, VehicleType};
use crate::simulation_engine::VehicleQueueSimulator;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, VecDeque};

/// Anything that can report how many vehicles wait on a side.
///
/// `None` means no reading is available right now (sensor dropout, camera
/// offline). The controller treats that like a stale snapshot.
pub trait VehicleCountSource: Send {
    fn read(&mut self, side: Side) -> Option<CountSnapshot>;
}

impl VehicleCountSource for VehicleQueueSimulator {
    fn read(&mut self, side: Side) -> Option<CountSnapshot> {
        Some(self.counts(side))
    }
}

impl<S: VehicleCountSource + ?Sized> VehicleCountSource for Box<S> {
    fn read(&mut self, side: Side) -> Option<CountSnapshot> {
        (**self).read(side)
    }
}

/// Stand-in for a roadside detector: random counts that drift a little
/// between readings, with occasional emergency sightings and dropouts.
#[derive(Debug, Clone)]
pub struct SyntheticDetector {
    rng: SmallRng,
    max_vehicles: usize,
    emergency_probability: f64,
    dropout_probability: f64,
    last: BTreeMap<Side, usize>,
}

impl SyntheticDetector {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
            max_vehicles: 12,
            emergency_probability: 0.002,
            dropout_probability: 0.0,
            last: BTreeMap::new(),
        }
    }

    pub fn with_max_vehicles(mut self, max_vehicles: usize) -> Self {
        self.max_vehicles = max_vehicles;
        self
    }

    pub fn with_emergency_probability(mut self, probability: f64) -> Self {
        self.emergency_probability = probability.clamp(0.0, 1.0);
        self
    }

    pub fn with_dropout_probability(mut self, probability: f64) -> Self {
        self.dropout_probability = probability.clamp(0.0, 1.0);
        self
    }

    fn next_total(&mut self, side: Side) -> usize {
        let previous = match self.last.get(&side) {
            Some(n) => *n,
            None => self.rng.random_range(0..=self.max_vehicles),
        };
        let drift: i64 = self.rng.random_range(-2..=2);
        let total = (previous as i64 + drift).clamp(0, self.max_vehicles as i64) as usize;
        self.last.insert(side, total);
        total
    }
}

impl VehicleCountSource for SyntheticDetector {
    fn read(&mut self, side: Side) -> Option<CountSnapshot> {
        if self.rng.random_bool(self.dropout_probability) {
            log::debug!("{}: detector dropout", side);
            return None;
        }
        let total = self.next_total(side);
        let mut by_type = BTreeMap::new();
        let mut remaining = total;
        for vehicle_type in [VehicleType::Truck, VehicleType::Bus, VehicleType::Motorcycle] {
            let n = self.rng.random_range(0..=remaining / 4);
            if n > 0 {
                by_type.insert(vehicle_type, n);
            }
            remaining -= n;
        }
        if remaining > 0 {
            by_type.insert(VehicleType::Car, remaining);
        }
        let emergency = self.rng.random_bool(self.emergency_probability);
        if emergency {
            log::info!("{}: detector reports an emergency vehicle", side);
        }
        Some(CountSnapshot::new(total, by_type, emergency))
    }
}

/// Replays fixed readings per side, one per call. The last reading of a side
/// repeats once its script runs out; a side with no script reads `None`.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSource {
    scripts: BTreeMap<Side, VecDeque<Option<CountSnapshot>>>,
    last: BTreeMap<Side, Option<CountSnapshot>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script<I>(mut self, side: Side, readings: I) -> Self
    where
        I: IntoIterator<Item = Option<CountSnapshot>>,
    {
        self.scripts
            .entry(side)
            .or_default()
            .extend(readings);
        self
    }

    /// Same reading forever.
    pub fn constant(mut self, side: Side, snapshot: CountSnapshot) -> Self {
        self.last.insert(side, Some(snapshot));
        self
    }
}

impl VehicleCountSource for ScriptedSource {
    fn read(&mut self, side: Side) -> Option<CountSnapshot> {
        if let Some(next) = self.scripts.get_mut(&side).and_then(VecDeque::pop_front) {
            self.last.insert(side, next);
        }
        self.last.get(&side).cloned().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_counts_are_consistent_and_bounded() {
        let mut detector = SyntheticDetector::new(42).with_max_vehicles(8);
        for _ in 0..200 {
            for side in Side::ALL {
                let snapshot = detector.read(side).unwrap();
                assert!(snapshot.total_vehicles <= 8);
                assert!(snapshot.is_consistent());
            }
        }
    }

    #[test]
    fn synthetic_dropout_reads_nothing() {
        let mut detector = SyntheticDetector::new(1).with_dropout_probability(1.0);
        assert!(detector.read(Side::North).is_none());
    }

    #[test]
    fn synthetic_emergency_is_reported() {
        let mut detector = SyntheticDetector::new(5).with_emergency_probability(1.0);
        assert!(detector.read(Side::East).unwrap().emergency_present);
    }

    #[test]
    fn scripted_source_replays_then_holds_last_reading() {
        let mut source = ScriptedSource::new()
            .with_script(
                Side::North,
                vec![
                    Some(CountSnapshot::with_total(5)),
                    None,
                    Some(CountSnapshot::with_total(2)),
                ],
            )
            .constant(Side::East, CountSnapshot::with_total(7));

        assert_eq!(source.read(Side::North).unwrap().total_vehicles, 5);
        assert!(source.read(Side::North).is_none());
        assert_eq!(source.read(Side::North).unwrap().total_vehicles, 2);
        assert_eq!(source.read(Side::North).unwrap().total_vehicles, 2);
        assert_eq!(source.read(Side::East).unwrap().total_vehicles, 7);
        assert!(source.read(Side::South).is_none());
    }

    #[test]
    fn simulator_reports_its_queues() {
        let mut sim = VehicleQueueSimulator::with_seed(Default::default(), 3).unwrap();
        sim.inject(
            Side::West,
            VehicleType::Bus,
            crate::simulation_engine::TurnIntent::Straight,
        );
        let reading = VehicleCountSource::read(&mut sim, Side::West).unwrap();
        assert_eq!(reading.total_vehicles, 1);
        assert_eq!(reading.count_of(VehicleType::Bus), 1);
        assert!(!reading.emergency_present);
    }
}
