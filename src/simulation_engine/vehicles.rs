use crate::global_variables::{LICENSE_PLATE_LETTERS, LICENSE_PLATE_STATES};
use crate::shared_data::{Side, VehicleType};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// What a vehicle does once it reaches the centre of the intersection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TurnIntent {
    Straight,
    Left,
    Right,
}

impl TurnIntent {
    /// Side a vehicle travelling on `side` ends up on after executing this intent.
    pub fn apply(&self, side: Side) -> Side {
        match self {
            TurnIntent::Straight => side,
            TurnIntent::Left => side.left(),
            TurnIntent::Right => side.right(),
        }
    }
}

/// Represents a vehicle queued on, or crossing from, one approach.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    /// Unique licence plate.
    pub id: String,
    pub vehicle_type: VehicleType,
    pub origin_side: Side,
    /// Changes at most once, when the turn is executed.
    pub current_side: Side,
    /// Ordinal within the origin queue, 0 = front.
    pub queue_position: usize,
    pub turn_intent: TurnIntent,
    /// Signed distance along the vehicle's path from the intersection centre.
    /// Negative while approaching, positive once past the centre.
    pub offset: f64,
    pub crossed_stop_line: bool,
    pub turned: bool,
    pub crossed_intersection: bool,
}

impl Vehicle {
    pub fn new(
        id: String,
        vehicle_type: VehicleType,
        origin_side: Side,
        queue_position: usize,
        turn_intent: TurnIntent,
        offset: f64,
    ) -> Self {
        Self {
            id,
            vehicle_type,
            origin_side,
            current_side: origin_side,
            queue_position,
            turn_intent,
            offset,
            crossed_stop_line: false,
            turned: false,
            crossed_intersection: false,
        }
    }

    /// Remaining distance to the stop line; negative once past it.
    pub fn distance_to_stop_line(&self, stop_line_distance: f64) -> f64 {
        -stop_line_distance - self.offset
    }

    /// Path distance from this vehicle forward to `ahead`.
    pub fn gap_to(&self, ahead: &Vehicle) -> f64 {
        ahead.offset - self.offset
    }
}

/// Hands out licence plates of the form `SSddLnnnn`, never repeating one.
#[derive(Debug, Clone, Default)]
pub struct PlateRegistry {
    used: HashSet<String>,
}

impl PlateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue<R: Rng + ?Sized>(&mut self, rng: &mut R) -> String {
        loop {
            let state = LICENSE_PLATE_STATES[rng.random_range(0..LICENSE_PLATE_STATES.len())];
            let district: u8 = rng.random_range(10..=99);
            let letter =
                LICENSE_PLATE_LETTERS[rng.random_range(0..LICENSE_PLATE_LETTERS.len())] as char;
            let number: u16 = rng.random_range(1000..=9999);
            let plate = format!("{}{}{}{}", state, district, letter, number);
            if self.used.insert(plate.clone()) {
                return plate;
            }
        }
    }

    pub fn issued(&self) -> usize {
        self.used.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    #[test]
    fn plates_are_unique_and_well_formed() {
        let mut rng = SmallRng::seed_from_u64(7);
        let mut registry = PlateRegistry::new();
        let mut seen = HashSet::new();
        for _ in 0..500 {
            let plate = registry.issue(&mut rng);
            assert_eq!(plate.len(), 9);
            assert!(plate[..2].chars().all(|c| c.is_ascii_uppercase()));
            assert!(plate[2..4].chars().all(|c| c.is_ascii_digit()));
            assert!(plate[4..5].chars().all(|c| c.is_ascii_uppercase()));
            assert!(plate[5..].chars().all(|c| c.is_ascii_digit()));
            assert!(seen.insert(plate));
        }
        assert_eq!(registry.issued(), 500);
    }

    #[test]
    fn turn_intent_rotates_side() {
        assert_eq!(TurnIntent::Straight.apply(Side::East), Side::East);
        assert_eq!(TurnIntent::Left.apply(Side::South), Side::East);
        assert_eq!(TurnIntent::Right.apply(Side::West), Side::North);
    }
}
