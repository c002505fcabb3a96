// src/detection/replay.rs
//
// Detector and recognizer backed by a recorded detection log. The log is a
// JSON array of `{frame, detections: [{bbox, confidence, class_id, text?}]}`
// produced offline by whatever model was run over the footage.

use super::filter::calculate_iou;
use super::{Detector, Recognizer};
use crate::error::{Result as RwResult, RoadwatchError};
use crate::types::{Detection, Frame};
use anyhow::Result;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Minimum overlap for a recorded recognition to apply to a live detection.
const RECOGNITION_MIN_IOU: f32 = 0.5;

#[derive(Debug, Clone, Deserialize)]
pub struct RecordedDetection {
    pub bbox: [f32; 4],
    pub confidence: f32,
    pub class_id: usize,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct RecordedFrame {
    frame: u64,
    #[serde(default)]
    detections: Vec<RecordedDetection>,
}

#[derive(Debug, Default)]
pub struct ReplayLog {
    frames: HashMap<u64, Vec<RecordedDetection>>,
}

impl ReplayLog {
    pub fn load<P: AsRef<Path>>(path: P) -> RwResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            RoadwatchError::replay(format!("cannot read {}: {}", path.display(), e))
        })?;
        let log = Self::from_json(&contents)
            .map_err(|e| RoadwatchError::replay(format!("{}: {}", path.display(), e)))?;
        info!(
            "✓ Loaded detection replay {} ({} frames)",
            path.display(),
            log.frames.len()
        );
        Ok(log)
    }

    pub fn from_json(json: &str) -> RwResult<Self> {
        let recorded: Vec<RecordedFrame> = serde_json::from_str(json)?;
        let mut frames: HashMap<u64, Vec<RecordedDetection>> = HashMap::new();
        for f in recorded {
            frames.entry(f.frame).or_default().extend(f.detections);
        }
        Ok(Self { frames })
    }

    pub fn frame(&self, index: u64) -> &[RecordedDetection] {
        self.frames.get(&index).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

// ============================================================================
// DETECTOR
// ============================================================================

pub struct ReplayDetector {
    log: Arc<ReplayLog>,
    labels: Vec<String>,
}

impl ReplayDetector {
    /// `labels[class_id]` names each class; ids past the end are named by number.
    pub fn new(log: Arc<ReplayLog>, labels: Vec<String>) -> Self {
        Self { log, labels }
    }

    fn class_name(&self, class_id: usize) -> String {
        self.labels
            .get(class_id)
            .cloned()
            .unwrap_or_else(|| class_id.to_string())
    }
}

impl Detector for ReplayDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let detections: Vec<Detection> = self
            .log
            .frame(frame.index)
            .iter()
            .map(|r| Detection {
                bbox: r.bbox,
                confidence: r.confidence,
                class_id: r.class_id,
                class_name: self.class_name(r.class_id),
            })
            .collect();
        debug!("Frame {}: {} replayed detections", frame.index, detections.len());
        Ok(detections)
    }
}

// ============================================================================
// RECOGNIZER
// ============================================================================

pub struct ReplayRecognizer {
    log: Arc<ReplayLog>,
}

impl ReplayRecognizer {
    pub fn new(log: Arc<ReplayLog>) -> Self {
        Self { log }
    }
}

impl Recognizer for ReplayRecognizer {
    fn recognize(&mut self, frame: &Frame, detection: &Detection) -> Result<Option<String>> {
        let best = self
            .log
            .frame(frame.index)
            .iter()
            .filter_map(|r| {
                let text = r.text.as_deref()?;
                let iou = calculate_iou(&r.bbox, &detection.bbox);
                (iou >= RECOGNITION_MIN_IOU).then_some((iou, text))
            })
            .max_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

        Ok(best
            .map(|(_, text)| text.trim().to_uppercase())
            .filter(|t| !t.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    const LOG: &str = r#"[
        {"frame": 0, "detections": [
            {"bbox": [0, 0, 10, 10], "confidence": 0.9, "class_id": 0, "text": " abc123 "},
            {"bbox": [50, 50, 60, 60], "confidence": 0.8, "class_id": 5}
        ]},
        {"frame": 2, "detections": []}
    ]"#;

    fn frame(index: u64) -> Frame {
        Frame::new(index, 0.0, RgbImage::new(4, 4))
    }

    #[test]
    fn test_replay_detector_names_classes() {
        let log = Arc::new(ReplayLog::from_json(LOG).unwrap());
        let mut det = ReplayDetector::new(log, vec!["car".into(), "truck".into()]);
        let out = det.detect(&frame(0)).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].class_name, "car");
        assert_eq!(out[1].class_name, "5");
        assert!(det.detect(&frame(1)).unwrap().is_empty());
    }

    #[test]
    fn test_replay_recognizer_matches_by_overlap() {
        let log = Arc::new(ReplayLog::from_json(LOG).unwrap());
        let mut rec = ReplayRecognizer::new(log);
        let hit = Detection::new([1.0, 0.0, 11.0, 10.0], 0.9, 0, "car");
        assert_eq!(rec.recognize(&frame(0), &hit).unwrap(), Some("ABC123".to_string()));

        let no_text = Detection::new([50.0, 50.0, 60.0, 60.0], 0.9, 5, "truck");
        assert_eq!(rec.recognize(&frame(0), &no_text).unwrap(), None);

        let far = Detection::new([100.0, 100.0, 110.0, 110.0], 0.9, 0, "car");
        assert_eq!(rec.recognize(&frame(0), &far).unwrap(), None);
    }

    #[test]
    fn test_malformed_log_is_error() {
        assert!(ReplayLog::from_json("{\"frame\": 1}").is_err());
        assert!(ReplayLog::load("/nonexistent/replay.json").is_err());
    }

    #[test]
    fn test_load_errors_name_the_file() {
        match ReplayLog::load("/nonexistent/replay.json") {
            Err(RoadwatchError::Replay(msg)) => assert!(msg.contains("/nonexistent/replay.json")),
            other => panic!("unexpected {:?}", other.map(|log| log.len())),
        }
        assert!(matches!(
            ReplayLog::from_json("not json"),
            Err(RoadwatchError::Json(_))
        ));
    }
}
