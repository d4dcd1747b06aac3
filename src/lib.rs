pub mod communication;
pub mod config;
pub mod control_system;
pub mod engine;
pub mod global_variables;
pub mod monitoring;
pub mod shared_data;
pub mod simulation_engine;
