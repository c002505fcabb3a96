// src/pipeline/frame_context.rs
//
// Everything one lane produced for a frame. The driver and the coordinator
// read from this instead of reaching into the lane's stages.

use crate::events::ServerEvent;
use crate::types::{ObjectLabel, TrackedDetection};
use image::RgbImage;

#[derive(Debug, Clone)]
pub struct FrameContext {
    pub frame_id: u64,
    pub timestamp_ms: f64,

    /// Detections after filtering and tracking
    pub tracked: Vec<TrackedDetection>,
    /// One per object the state tracker evaluated
    pub labels: Vec<ObjectLabel>,
    /// Events queued while processing, in detection order
    pub events: Vec<ServerEvent>,

    pub annotated: RgbImage,
    /// Detector failed; `annotated` is the raw frame
    pub degraded: bool,
}
