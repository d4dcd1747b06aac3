// simulation.rs
use crate::config::{ConfigError, SimulatorConfig};
use crate::control_system::Phase;
use crate::shared_data::{CountSnapshot, Side, SnapshotBoard, VehicleType};
use crate::simulation_engine::lanes::ApproachLane;
use crate::simulation_engine::vehicles::{PlateRegistry, TurnIntent, Vehicle};

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;

/// Cumulative counters kept across the whole run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimulationStats {
    pub ticks: u64,
    pub total_spawned: u64,
    pub total_crossed: u64,
    pub crossed_by_type: BTreeMap<VehicleType, u64>,
}

/// What changed during one tick.
#[derive(Debug, Clone, Default)]
pub struct TickSummary {
    pub spawned: Vec<(Side, String)>,
    pub retired: Vec<Vehicle>,
}

/// Owns one queue per side and moves vehicles through the intersection.
#[derive(Debug, Clone)]
pub struct VehicleQueueSimulator {
    config: SimulatorConfig,
    lanes: BTreeMap<Side, ApproachLane>,
    plates: PlateRegistry,
    rng: SmallRng,
    stats: SimulationStats,
}

impl VehicleQueueSimulator {
    pub fn new(config: SimulatorConfig) -> Result<Self, ConfigError> {
        Self::with_rng(config, SmallRng::from_os_rng())
    }

    /// Deterministic simulator for reproducible runs.
    pub fn with_seed(config: SimulatorConfig, seed: u64) -> Result<Self, ConfigError> {
        Self::with_rng(config, SmallRng::seed_from_u64(seed))
    }

    fn with_rng(config: SimulatorConfig, rng: SmallRng) -> Result<Self, ConfigError> {
        config.validate()?;
        let lanes = Side::ALL
            .iter()
            .map(|side| (*side, ApproachLane::new(*side)))
            .collect();
        Ok(Self {
            config,
            lanes,
            plates: PlateRegistry::new(),
            rng,
            stats: SimulationStats::default(),
        })
    }

    /// Spawns, moves and retires vehicles for every side.
    /// Sides missing from `phase_by_side` are treated as RED.
    pub fn tick(&mut self, dt: f64, phase_by_side: &BTreeMap<Side, Phase>) -> TickSummary {
        let spawned = self.spawn_all();
        let retired = self.advance(dt, phase_by_side);
        TickSummary { spawned, retired }
    }

    /// Spawn step of a tick, for callers that consult the controller between
    /// spawning and moving.
    pub fn spawn_all(&mut self) -> Vec<(Side, String)> {
        let mut spawned = Vec::new();
        for side in Side::ALL {
            if let Some(plate) = self.try_spawn(side) {
                spawned.push((side, plate));
            }
        }
        spawned
    }

    /// Move and retirement steps of a tick. A vehicle is retired in the same
    /// tick it leaves the intersection; the retired vehicles are returned.
    ///
    /// A `dt` longer than `tick_seconds` is covered in several moves of at
    /// most one tick each.
    pub fn advance(&mut self, dt: f64, phase_by_side: &BTreeMap<Side, Phase>) -> Vec<Vehicle> {
        let max_dt = self.config.tick_seconds;
        let mut remaining = dt.max(0.0);
        let mut retired = Vec::new();

        while remaining > 0.0 {
            let sub_dt = remaining.min(max_dt);
            let step = self.config.speed * sub_dt;
            for (side, lane) in self.lanes.iter_mut() {
                let phase = phase_by_side.get(side).copied().unwrap_or(Phase::Red);
                lane.move_vehicles(phase, step, &self.config);
            }
            for lane in self.lanes.values_mut() {
                retired.extend(lane.retire_crossed());
            }
            remaining -= sub_dt;
        }
        for vehicle in &retired {
            self.stats.total_crossed += 1;
            *self
                .stats
                .crossed_by_type
                .entry(vehicle.vehicle_type)
                .or_insert(0) += 1;
            log::debug!(
                "{} {} crossed from {} heading {}",
                vehicle.vehicle_type,
                vehicle.id,
                vehicle.origin_side,
                vehicle.current_side
            );
        }
        self.stats.ticks += 1;
        retired
    }

    /// Places a vehicle of `vehicle_type` at the back of `side`'s queue,
    /// ignoring spawn probability but not capacity.
    pub fn inject(
        &mut self,
        side: Side,
        vehicle_type: VehicleType,
        turn_intent: TurnIntent,
    ) -> Option<String> {
        if !self.has_room(side, vehicle_type) {
            return None;
        }
        Some(self.place(side, vehicle_type, turn_intent))
    }

    pub fn counts(&self, side: Side) -> CountSnapshot {
        self.lanes
            .get(&side)
            .map(ApproachLane::counts)
            .unwrap_or_default()
    }

    /// All four sides' counts stamped at `now`.
    pub fn snapshot_board(&self, now: f64) -> SnapshotBoard {
        let mut board = SnapshotBoard::new();
        for side in Side::ALL {
            board.publish(side, self.counts(side), now);
        }
        board
    }

    pub fn lane(&self, side: Side) -> Option<&ApproachLane> {
        self.lanes.get(&side)
    }

    pub fn queue_lengths(&self) -> BTreeMap<Side, usize> {
        self.lanes
            .iter()
            .map(|(side, lane)| (*side, lane.len()))
            .collect()
    }

    pub fn total_vehicles(&self) -> usize {
        self.lanes.values().map(ApproachLane::len).sum()
    }

    pub fn stats(&self) -> &SimulationStats {
        &self.stats
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    fn try_spawn(&mut self, side: Side) -> Option<String> {
        let queued = self.lanes.get(&side).map(ApproachLane::len).unwrap_or(0);
        if queued >= self.config.queue_capacity {
            return None;
        }
        if !self.rng.random_bool(self.config.spawn_probability) {
            return None;
        }
        let vehicle_type = self.choose_vehicle_type(side)?;
        let turn_intent = self.choose_turn_intent();
        Some(self.place(side, vehicle_type, turn_intent))
    }

    fn has_room(&self, side: Side, vehicle_type: VehicleType) -> bool {
        let Some(lane) = self.lanes.get(&side) else {
            return false;
        };
        if lane.len() >= self.config.queue_capacity {
            return false;
        }
        match self.config.type_capacity.get(&vehicle_type) {
            Some(cap) => lane.count_of(vehicle_type) < *cap,
            None => true,
        }
    }

    fn place(&mut self, side: Side, vehicle_type: VehicleType, turn_intent: TurnIntent) -> String {
        let plate = self.plates.issue(&mut self.rng);
        if let Some(lane) = self.lanes.get_mut(&side) {
            let offset = lane.spawn_offset(&self.config);
            let vehicle = Vehicle::new(
                plate.clone(),
                vehicle_type,
                side,
                lane.len(),
                turn_intent,
                offset,
            );
            lane.push_back(vehicle);
        }
        self.stats.total_spawned += 1;
        log::debug!(
            "Spawned {} {} on {} ({:?})",
            vehicle_type,
            plate,
            side,
            turn_intent
        );
        plate
    }

    /// Draws a type for `side`, re-weighted over the types still under their
    /// cap. `None` when every type with a weight is full.
    fn choose_vehicle_type(&mut self, side: Side) -> Option<VehicleType> {
        let open: Vec<(VehicleType, f64)> = self
            .config
            .type_probabilities
            .iter()
            .filter(|(vehicle_type, probability)| {
                **probability > 0.0 && self.has_room(side, **vehicle_type)
            })
            .map(|(vehicle_type, probability)| (*vehicle_type, *probability))
            .collect();
        let total: f64 = open.iter().map(|(_, probability)| probability).sum();
        if open.is_empty() || total <= 0.0 {
            return None;
        }

        let roll = self.rng.random_range(0.0..total);
        let mut cumulative = 0.0;
        for (vehicle_type, probability) in &open {
            cumulative += probability;
            if roll < cumulative {
                return Some(*vehicle_type);
            }
        }
        open.last().map(|(vehicle_type, _)| *vehicle_type)
    }

    fn choose_turn_intent(&mut self) -> TurnIntent {
        let mix = &self.config.turn_mix;
        let roll: f64 = self.rng.random_range(0.0..1.0);
        if roll < mix.straight {
            TurnIntent::Straight
        } else if roll < mix.straight + mix.left {
            TurnIntent::Left
        } else {
            TurnIntent::Right
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phases(green: Option<Side>) -> BTreeMap<Side, Phase> {
        Side::ALL
            .iter()
            .map(|side| {
                let phase = if Some(*side) == green {
                    Phase::Green
                } else {
                    Phase::Red
                };
                (*side, phase)
            })
            .collect()
    }

    fn quiet_config() -> SimulatorConfig {
        SimulatorConfig {
            spawn_probability: 0.0,
            ..SimulatorConfig::default()
        }
    }

    #[test]
    fn follower_waits_behind_close_leader_on_green() {
        let mut sim = VehicleQueueSimulator::with_seed(quiet_config(), 1).unwrap();
        sim.inject(Side::North, VehicleType::Car, TurnIntent::Straight);
        sim.inject(Side::North, VehicleType::Car, TurnIntent::Straight);
        sim.inject(Side::North, VehicleType::Truck, TurnIntent::Straight);

        // Put the middle vehicle right behind the leader.
        let lane = sim.lanes.get_mut(&Side::North).unwrap();
        let leader_offset = lane.vehicles()[0].offset;
        let mut squeezed = lane.vehicles().to_vec();
        squeezed[1].offset = leader_offset - 20.0;
        squeezed[2].offset = leader_offset - 100.0;
        *lane = ApproachLane::new(Side::North);
        for vehicle in squeezed {
            lane.push_back(vehicle);
        }
        lane.move_vehicles(Phase::Green, 3.0, &sim.config.clone());

        let lane = sim.lane(Side::North).unwrap();
        assert!((lane.vehicles()[0].offset - (leader_offset + 3.0)).abs() < 1e-9);
        assert!((lane.vehicles()[1].offset - (leader_offset - 20.0)).abs() < 1e-9);
    }

    #[test]
    fn spawning_respects_capacity() {
        let config = SimulatorConfig {
            spawn_probability: 1.0,
            queue_capacity: 4,
            ..SimulatorConfig::default()
        };
        let mut sim = VehicleQueueSimulator::with_seed(config, 3).unwrap();
        let red = phases(None);
        for _ in 0..50 {
            sim.tick(1.0 / 60.0, &red);
        }
        for side in Side::ALL {
            assert_eq!(sim.counts(side).total_vehicles, 4);
        }
        assert_eq!(sim.total_vehicles(), 16);
        assert_eq!(sim.stats().total_spawned, 16);
    }

    #[test]
    fn per_type_cap_limits_spawns() {
        let mut config = SimulatorConfig {
            spawn_probability: 1.0,
            ..SimulatorConfig::default()
        };
        config.type_capacity.insert(VehicleType::Car, 0);
        let mut sim = VehicleQueueSimulator::with_seed(config, 9).unwrap();
        for _ in 0..30 {
            sim.tick(1.0 / 60.0, &phases(None));
        }
        for side in Side::ALL {
            assert_eq!(sim.counts(side).count_of(VehicleType::Car), 0);
        }
        assert!(sim.inject(Side::East, VehicleType::Car, TurnIntent::Left).is_none());
    }

    #[test]
    fn capped_type_leaves_spawn_rate_to_the_others() {
        let mut config = SimulatorConfig {
            spawn_probability: 1.0,
            queue_capacity: 6,
            ..SimulatorConfig::default()
        };
        config.type_capacity.insert(VehicleType::Car, 1);
        let mut sim = VehicleQueueSimulator::with_seed(config, 21).unwrap();
        let red = phases(None);
        for _ in 0..6 {
            sim.tick(1.0 / 60.0, &red);
        }
        for side in Side::ALL {
            let counts = sim.counts(side);
            assert_eq!(counts.total_vehicles, 6);
            assert!(counts.count_of(VehicleType::Car) <= 1);
        }
        assert_eq!(sim.stats().total_spawned, 24);
    }

    #[test]
    fn fast_vehicle_never_runs_a_red_light() {
        let config = SimulatorConfig {
            spawn_probability: 0.0,
            speed: 1320.0,
            ..SimulatorConfig::default()
        };
        config.validate().unwrap();
        let mut sim = VehicleQueueSimulator::with_seed(config, 13).unwrap();
        sim.inject(Side::North, VehicleType::Car, TurnIntent::Straight);
        let red = phases(None);
        for _ in 0..600 {
            sim.tick(1.0 / 60.0, &red);
            let lane = sim.lane(Side::North).unwrap();
            assert!(lane.vehicles().iter().all(|v| !v.crossed_stop_line));
        }
        assert_eq!(sim.stats().total_crossed, 0);
        assert_eq!(sim.counts(Side::North).total_vehicles, 1);
    }

    #[test]
    fn long_tick_is_split_and_still_stops_on_red() {
        let mut sim = VehicleQueueSimulator::with_seed(quiet_config(), 17).unwrap();
        sim.inject(Side::South, VehicleType::Truck, TurnIntent::Left);
        sim.inject(Side::South, VehicleType::Car, TurnIntent::Straight);
        let red = phases(None);
        for _ in 0..20 {
            sim.tick(0.5, &red);
        }
        let lane = sim.lane(Side::South).unwrap();
        assert_eq!(lane.len(), 2);
        assert!(lane.vehicles().iter().all(|v| !v.crossed_stop_line));
        assert!(lane.vehicles()[1].gap_to(&lane.vehicles()[0]) >= sim.config().min_following_gap - 1e-9);
        assert_eq!(sim.stats().total_crossed, 0);
        assert_eq!(sim.stats().ticks, 20);

        let south_green = phases(Some(Side::South));
        sim.tick(5.0, &south_green);
        assert_eq!(sim.counts(Side::South).total_vehicles, 0);
        assert_eq!(sim.stats().total_crossed, 2);
    }

    #[test]
    fn red_side_holds_queue_and_green_side_drains() {
        let mut sim = VehicleQueueSimulator::with_seed(quiet_config(), 5).unwrap();
        for _ in 0..3 {
            sim.inject(Side::East, VehicleType::Car, TurnIntent::Straight);
            sim.inject(Side::West, VehicleType::Bus, TurnIntent::Right);
        }
        let east_green = phases(Some(Side::East));
        for _ in 0..600 {
            sim.tick(1.0 / 60.0, &east_green);
        }
        assert_eq!(sim.counts(Side::East).total_vehicles, 0);
        assert_eq!(sim.counts(Side::West).total_vehicles, 3);
        assert!(sim
            .lane(Side::West)
            .unwrap()
            .vehicles()
            .iter()
            .all(|v| !v.crossed_stop_line));
        assert_eq!(sim.stats().total_crossed, 3);
        assert_eq!(sim.stats().crossed_by_type.get(&VehicleType::Car), Some(&3));
    }

    #[test]
    fn every_vehicle_retires_exactly_once() {
        let config = SimulatorConfig {
            spawn_probability: 0.5,
            ..SimulatorConfig::default()
        };
        let mut sim = VehicleQueueSimulator::with_seed(config, 11).unwrap();
        let mut retired = std::collections::HashSet::new();
        for tick in 0..3000 {
            let green = Side::ALL[(tick / 300) % 4];
            let summary = sim.tick(1.0 / 60.0, &phases(Some(green)));
            for vehicle in summary.retired {
                assert!(vehicle.crossed_intersection);
                assert!(retired.insert(vehicle.id.clone()), "{} retired twice", vehicle.id);
            }
            for side in Side::ALL {
                let lane = sim.lane(side).unwrap();
                assert!(lane.vehicles().iter().all(|v| !v.crossed_intersection));
                let offsets: Vec<f64> = lane.vehicles().iter().map(|v| v.offset).collect();
                assert!(offsets.windows(2).all(|w| w[0] >= w[1]));
            }
        }
        let stats = sim.stats();
        assert_eq!(stats.total_crossed as usize, retired.len());
        assert_eq!(
            stats.total_spawned as usize,
            retired.len() + sim.total_vehicles()
        );
        assert_eq!(
            stats.crossed_by_type.values().sum::<u64>(),
            stats.total_crossed
        );
    }

    #[test]
    fn simulated_counts_never_flag_emergencies() {
        let config = SimulatorConfig {
            spawn_probability: 1.0,
            ..SimulatorConfig::default()
        };
        let mut sim = VehicleQueueSimulator::with_seed(config, 2).unwrap();
        sim.tick(1.0 / 60.0, &phases(None));
        let board = sim.snapshot_board(0.0);
        for (_, stamped) in board.iter() {
            assert!(!stamped.snapshot.emergency_present);
            assert!(stamped.snapshot.is_consistent());
        }
        assert_eq!(board.total_vehicles(), 4);
    }
}
