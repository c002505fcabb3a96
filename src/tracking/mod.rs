// src/tracking/mod.rs

pub mod iou_tracker;

pub use iou_tracker::{IouTracker, TrackerConfig};

use crate::types::{Detection, TrackedDetection};

/// Attaches session identifiers to filtered detections.
///
/// Output order matches input order. Identifiers are opaque: they may skip
/// values, and an object that is lost and found again may get a new one.
pub trait Tracker: Send {
    fn update(&mut self, detections: Vec<Detection>) -> Vec<TrackedDetection>;
}

impl<T: Tracker + ?Sized> Tracker for Box<T> {
    fn update(&mut self, detections: Vec<Detection>) -> Vec<TrackedDetection> {
        (**self).update(detections)
    }
}
