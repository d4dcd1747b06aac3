// src/shared_data.rs

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// One of the four approaches of the intersection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    North,
    East,
    South,
    West,
}

impl Side {
    /// Clockwise order, which is also the default signal sequence.
    pub const ALL: [Side; 4] = [Side::North, Side::East, Side::South, Side::West];

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::North => "NORTH",
            Side::East => "EAST",
            Side::South => "SOUTH",
            Side::West => "WEST",
        }
    }

    /// Side reached by a left turn: NORTH -> WEST -> SOUTH -> EAST -> NORTH.
    pub fn left(&self) -> Side {
        match self {
            Side::North => Side::West,
            Side::West => Side::South,
            Side::South => Side::East,
            Side::East => Side::North,
        }
    }

    /// Side reached by a right turn, the reverse rotation of `left`.
    pub fn right(&self) -> Side {
        match self {
            Side::North => Side::East,
            Side::East => Side::South,
            Side::South => Side::West,
            Side::West => Side::North,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownSide(pub String);

impl fmt::Display for UnknownSide {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "unknown side '{}'", self.0)
    }
}

impl std::error::Error for UnknownSide {}

impl FromStr for Side {
    type Err = UnknownSide;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NORTH" | "N" => Ok(Side::North),
            "EAST" | "E" => Ok(Side::East),
            "SOUTH" | "S" => Ok(Side::South),
            "WEST" | "W" => Ok(Side::West),
            _ => Err(UnknownSide(s.to_string())),
        }
    }
}

/// Vehicle categories reported by count sources.
/// The simulator spawns cars, trucks and buses; motorcycles only come from detectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VehicleType {
    Car,
    Truck,
    Bus,
    Motorcycle,
}

impl fmt::Display for VehicleType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            VehicleType::Car => write!(f, "CAR"),
            VehicleType::Truck => write!(f, "TRUCK"),
            VehicleType::Bus => write!(f, "BUS"),
            VehicleType::Motorcycle => write!(f, "MOTORCYCLE"),
        }
    }
}

/// Vehicle count for one side at one instant. Always replaced as a whole.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountSnapshot {
    pub total_vehicles: usize,
    pub by_type: BTreeMap<VehicleType, usize>,
    pub emergency_present: bool,
}

impl CountSnapshot {
    pub fn new(
        total_vehicles: usize,
        by_type: BTreeMap<VehicleType, usize>,
        emergency_present: bool,
    ) -> Self {
        Self {
            total_vehicles,
            by_type,
            emergency_present,
        }
    }

    /// Snapshot carrying only a total, used by sources that do not classify.
    pub fn with_total(total_vehicles: usize) -> Self {
        Self {
            total_vehicles,
            ..Self::default()
        }
    }

    /// Builds a snapshot by counting a sequence of vehicle types.
    pub fn from_types<I: IntoIterator<Item = VehicleType>>(types: I) -> Self {
        let mut by_type = BTreeMap::new();
        let mut total_vehicles = 0;
        for vehicle_type in types {
            *by_type.entry(vehicle_type).or_insert(0) += 1;
            total_vehicles += 1;
        }
        Self {
            total_vehicles,
            by_type,
            emergency_present: false,
        }
    }

    pub fn with_emergency(mut self, emergency_present: bool) -> Self {
        self.emergency_present = emergency_present;
        self
    }

    pub fn count_of(&self, vehicle_type: VehicleType) -> usize {
        self.by_type.get(&vehicle_type).copied().unwrap_or(0)
    }

    /// Per-type counts may undercount (unclassified vehicles) but never exceed the total.
    pub fn is_consistent(&self) -> bool {
        self.by_type.values().sum::<usize>() <= self.total_vehicles
    }
}

/// A snapshot together with the controller-clock instant it was captured at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StampedSnapshot {
    pub snapshot: CountSnapshot,
    pub captured_at: f64,
}

/// The latest snapshot per side, as seen by the control loop.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnapshotBoard {
    slots: BTreeMap<Side, StampedSnapshot>,
}

impl SnapshotBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole slot for `side`.
    pub fn publish(&mut self, side: Side, snapshot: CountSnapshot, captured_at: f64) {
        self.slots.insert(
            side,
            StampedSnapshot {
                snapshot,
                captured_at,
            },
        );
    }

    pub fn get(&self, side: Side) -> Option<&StampedSnapshot> {
        self.slots.get(&side)
    }

    /// Snapshot for `side` if present and no older than `max_age` at `now`.
    pub fn fresh(&self, side: Side, now: f64, max_age: f64) -> Option<&CountSnapshot> {
        self.slots
            .get(&side)
            .filter(|stamped| now - stamped.captured_at <= max_age)
            .map(|stamped| &stamped.snapshot)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Side, &StampedSnapshot)> {
        self.slots.iter()
    }

    pub fn total_vehicles(&self) -> usize {
        self.slots.values().map(|s| s.snapshot.total_vehicles).sum()
    }
}

/// Local wall-clock time formatted for log rows.
pub fn formatted_timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turn_rotations_are_inverse() {
        for side in Side::ALL {
            assert_eq!(side.left().right(), side);
            assert_ne!(side.left(), side.right());
        }
        assert_eq!(Side::North.left(), Side::West);
        assert_eq!(Side::North.right(), Side::East);
    }

    #[test]
    fn side_parses_case_insensitively() {
        assert_eq!("west".parse::<Side>(), Ok(Side::West));
        assert_eq!(" NORTH ".parse::<Side>(), Ok(Side::North));
        assert!("up".parse::<Side>().is_err());
    }

    #[test]
    fn snapshot_from_types_counts_each_category() {
        let snapshot = CountSnapshot::from_types(vec![
            VehicleType::Car,
            VehicleType::Car,
            VehicleType::Bus,
        ]);
        assert_eq!(snapshot.total_vehicles, 3);
        assert_eq!(snapshot.count_of(VehicleType::Car), 2);
        assert_eq!(snapshot.count_of(VehicleType::Truck), 0);
        assert!(snapshot.is_consistent());
    }

    #[test]
    fn board_reports_stale_slots_as_missing() {
        let mut board = SnapshotBoard::new();
        board.publish(Side::East, CountSnapshot::with_total(4), 10.0);
        assert!(board.fresh(Side::East, 11.0, 2.0).is_some());
        assert!(board.fresh(Side::East, 12.5, 2.0).is_none());
        assert!(board.fresh(Side::West, 11.0, 2.0).is_none());
    }
}
