// engine/mod.rs
pub mod cooperative;
pub mod live;
pub mod sources;

pub use cooperative::{CooperativeSession, StepOutcome};
pub use live::{spawn_live, LiveHandle, LiveOptions, LiveSources, Presentation};
pub use sources::{ScriptedSource, SyntheticDetector, VehicleCountSource};
