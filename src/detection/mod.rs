// src/detection/mod.rs
//
// Detector boundary plus the pure post-processing every pipeline applies
// before tracking: confidence threshold, class allow-list and NMS.

pub mod filter;
pub mod replay;

pub use filter::{calculate_iou, nms, DetectionFilter, FilterConfig};
pub use replay::{ReplayDetector, ReplayLog, ReplayRecognizer};

use crate::types::{Detection, Frame};
use anyhow::Result;

/// Produces raw detections for a frame. Model internals live behind this.
pub trait Detector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>>;
}

/// Reads an identity (plate text, person reference) off one detection.
///
/// `Ok(None)` means nothing legible; an `Err` is transient and the object is
/// retried on the next frame.
pub trait Recognizer: Send {
    fn recognize(&mut self, frame: &Frame, detection: &Detection) -> Result<Option<String>>;
}

impl<D: Detector + ?Sized> Detector for Box<D> {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        (**self).detect(frame)
    }
}

impl<R: Recognizer + ?Sized> Recognizer for Box<R> {
    fn recognize(&mut self, frame: &Frame, detection: &Detection) -> Result<Option<String>> {
        (**self).recognize(frame, detection)
    }
}
