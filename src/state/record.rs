// src/state/record.rs
//
// Evidence accumulated for one tracker identifier.

use super::machine::ViolationState;
use crate::types::{Detection, Frame, Point, TrackId};
use std::collections::{HashMap, VecDeque};
use uuid::Uuid;

// ============================================================================
// POSITION HISTORY
// ============================================================================

/// Bounded ring buffer of positions; the oldest sample is evicted at capacity.
#[derive(Debug, Clone)]
pub struct PositionHistory {
    points: VecDeque<Point>,
    capacity: usize,
}

impl PositionHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            points: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, p: Point) {
        if self.points.len() >= self.capacity {
            self.points.pop_front();
        }
        self.points.push_back(p);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn first(&self) -> Option<Point> {
        self.points.front().copied()
    }

    pub fn last(&self) -> Option<Point> {
        self.points.back().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Point> {
        self.points.iter()
    }
}

// ============================================================================
// ZONE FLAGS
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ZoneFlags {
    pub ever_inside: bool,
    pub inside: bool,
}

impl ZoneFlags {
    pub fn update(&mut self, inside: bool) {
        self.inside = inside;
        self.ever_inside |= inside;
    }
}

// ============================================================================
// RECORD
// ============================================================================

#[derive(Debug, Clone)]
pub struct TrackedObjectRecord {
    pub tracker_id: TrackId,
    /// Assigned at first sighting from a per-tracker counter, never reused.
    pub object_id: u64,
    /// Event id shown to clients.
    pub external_id: String,
    pub class_votes: HashMap<String, u32>,
    pub positions: PositionHistory,
    pub zone: ZoneFlags,
    pub first_seen_ms: f64,
    pub last_seen_ms: f64,
    pub last_seen_frame: u64,
    pub first_class: String,
    /// Class of the most recent detection.
    pub class_name: String,
    pub confidence: f32,
    pub bbox: [f32; 4],
    /// Highest rule metric seen so far (km/h for speed).
    pub peak_metric: Option<f64>,
    /// Metric value carried by the last open/update event.
    pub reported_metric: Option<f64>,
    /// Recognised plate or person reference.
    pub identity: Option<String>,
    pub state: ViolationState,
}

impl TrackedObjectRecord {
    pub fn new(
        tracker_id: TrackId,
        object_id: u64,
        history_capacity: usize,
        det: &Detection,
        frame: &Frame,
    ) -> Self {
        Self {
            tracker_id,
            object_id,
            external_id: Uuid::new_v4().to_string(),
            class_votes: HashMap::new(),
            positions: PositionHistory::new(history_capacity),
            zone: ZoneFlags::default(),
            first_seen_ms: frame.timestamp_ms,
            last_seen_ms: frame.timestamp_ms,
            last_seen_frame: frame.index,
            first_class: det.class_name.clone(),
            class_name: det.class_name.clone(),
            confidence: det.confidence,
            bbox: det.bbox,
            peak_metric: None,
            reported_metric: None,
            identity: None,
            state: ViolationState::Clear,
        }
    }

    /// Fold one sighting into the record.
    pub fn observe(&mut self, det: &Detection, frame: &Frame) {
        *self.class_votes.entry(det.class_name.clone()).or_insert(0) += 1;
        self.class_name = det.class_name.clone();
        self.confidence = det.confidence;
        self.bbox = det.bbox;
        self.last_seen_ms = frame.timestamp_ms;
        self.last_seen_frame = frame.index;
    }

    pub fn votes(&self, class_name: &str) -> u32 {
        self.class_votes.get(class_name).copied().unwrap_or(0)
    }

    /// Whole seconds between first and last sighting.
    pub fn dwell_secs(&self) -> u64 {
        ((self.last_seen_ms - self.first_seen_ms).max(0.0) / 1000.0) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    #[test]
    fn test_history_is_bounded() {
        let mut h = PositionHistory::new(3);
        for i in 0..5 {
            h.push(Point::new(0.0, i as f32));
        }
        assert_eq!(h.len(), 3);
        assert_eq!(h.first(), Some(Point::new(0.0, 2.0)));
        assert_eq!(h.last(), Some(Point::new(0.0, 4.0)));
    }

    #[test]
    fn test_zone_flags_latch_ever_inside() {
        let mut z = ZoneFlags::default();
        z.update(true);
        z.update(false);
        assert!(z.ever_inside);
        assert!(!z.inside);
    }

    #[test]
    fn test_observe_counts_votes_and_dwell() {
        let det = Detection::new([0.0, 0.0, 1.0, 1.0], 0.8, 0, "helmet");
        let f0 = Frame::new(0, 0.0, RgbImage::new(1, 1));
        let f1 = Frame::new(75, 2500.0, RgbImage::new(1, 1));
        let mut r = TrackedObjectRecord::new(7, 1, 30, &det, &f0);
        r.observe(&det, &f0);
        r.observe(&Detection::new([0.0, 0.0, 1.0, 1.0], 0.9, 1, "no_helmet"), &f1);
        assert_eq!(r.votes("helmet"), 1);
        assert_eq!(r.votes("no_helmet"), 1);
        assert_eq!(r.first_class, "helmet");
        assert_eq!(r.class_name, "no_helmet");
        assert_eq!(r.dwell_secs(), 2);
        assert_eq!(r.external_id.len(), 36);
    }
}
