// simulation_engine/mod.rs
pub mod lanes;
pub mod movement;
pub mod simulation;
pub mod vehicles;

pub use lanes::ApproachLane;
pub use simulation::{SimulationStats, TickSummary, VehicleQueueSimulator};
pub use vehicles::{PlateRegistry, TurnIntent, Vehicle};
