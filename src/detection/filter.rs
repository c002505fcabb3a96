// src/detection/filter.rs
//
// Deterministic detection post-processing.

use crate::types::Detection;
use serde::{Deserialize, Serialize};

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Detections must score strictly above this.
    pub confidence_threshold: f32,
    /// Per-class NMS overlap threshold. `None` disables suppression.
    pub iou_threshold: Option<f32>,
    /// Class names to keep. `None` keeps everything.
    pub class_names: Option<Vec<String>>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.25,
            iou_threshold: Some(0.7),
            class_names: None,
        }
    }
}

// ============================================================================
// FILTER
// ============================================================================

#[derive(Debug, Clone)]
pub struct DetectionFilter {
    config: FilterConfig,
}

impl DetectionFilter {
    pub fn new(config: FilterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    pub fn apply(&self, detections: Vec<Detection>) -> Vec<Detection> {
        let kept: Vec<Detection> = detections
            .into_iter()
            .filter(|d| d.confidence > self.config.confidence_threshold)
            .filter(|d| match &self.config.class_names {
                Some(allowed) => allowed.iter().any(|c| c == &d.class_name),
                None => true,
            })
            .collect();

        match self.config.iou_threshold {
            Some(threshold) => nms(kept, threshold),
            None => kept,
        }
    }
}

/// Greedy per-class non-maximum suppression. Output is ordered by descending
/// confidence; ties keep their input order.
pub fn nms(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    if detections.is_empty() {
        return detections;
    }

    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<Detection> = Vec::with_capacity(detections.len());
    for det in detections {
        let suppressed = keep.iter().any(|k| {
            k.class_id == det.class_id && calculate_iou(&k.bbox, &det.bbox) > iou_threshold
        });
        if !suppressed {
            keep.push(det);
        }
    }
    keep
}

pub fn calculate_iou(box1: &[f32; 4], box2: &[f32; 4]) -> f32 {
    let x1 = box1[0].max(box2[0]);
    let y1 = box1[1].max(box2[1]);
    let x2 = box1[2].min(box2[2]);
    let y2 = box1[3].min(box2[3]);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let area1 = (box1[2] - box1[0]) * (box1[3] - box1[1]);
    let area2 = (box2[2] - box2[0]) * (box2[3] - box2[1]);
    let union = area1 + area2 - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}
