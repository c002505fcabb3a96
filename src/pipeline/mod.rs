// src/pipeline/mod.rs

pub mod builder;
pub mod coordinator;
pub mod driver;
pub mod event_bus;
pub mod frame_context;
pub mod metrics;
pub mod multipart;
pub mod notifier;
pub mod pacer;
pub mod processor;

pub use builder::{PipelineBuilder, Runner};
pub use coordinator::{compose_grid, Coordinator, Lane};
pub use driver::{StreamConfig, VideoPipeline};
pub use event_bus::EventBus;
pub use frame_context::FrameContext;
pub use metrics::{MetricsSummary, PipelineMetrics};
pub use multipart::{multipart_part, BOUNDARY, CONTENT_TYPE};
pub use notifier::{EventReceiver, Notifier};
pub use pacer::FramePacer;
pub use processor::FrameProcessor;
