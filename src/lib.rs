// src/lib.rs
//
// Traffic violation pipeline: detections are filtered, tracked and bound to
// stable object records, evaluated against one violation rule per pipeline,
// and turned into annotated MJPEG frames plus server events.

pub mod config;
pub mod detection;
pub mod error;
pub mod events;
pub mod geometry;
pub mod lookout;
pub mod pipeline;
pub mod render;
pub mod rules;
pub mod source;
pub mod state;
pub mod tracking;
pub mod types;

pub use config::{ActiveModel, Config};
pub use error::{Result, RoadwatchError};
pub use events::ServerEvent;
pub use lookout::LookoutStore;
pub use pipeline::{Notifier, PipelineBuilder, Runner};
