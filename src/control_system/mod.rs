// control_system/mod.rs
pub mod side_ring;
pub mod traffic_light_controller;

pub use side_ring::SideRing;
pub use traffic_light_controller::{
    ControllerStatistics, Decision, Phase, SignalPhaseController, TransitionEvent,
    TransitionReason, TransitionResult,
};
