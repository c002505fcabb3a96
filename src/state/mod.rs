// src/state/mod.rs

pub mod machine;
pub mod record;
pub mod tracker;

pub use machine::{Action, ViolationState};
pub use record::{PositionHistory, TrackedObjectRecord, ZoneFlags};
pub use tracker::{ObjectStateTracker, StateTrackerConfig};
