// src/tracking/iou_tracker.rs
//
// Greedy IoU multi-object tracker.
//
// Design:
//   - Greedy matching on IoU, highest overlap first
//   - Cross-class matches are penalised so same-class pairs win ties
//   - Tracks coast through short detection gaps before being dropped
//   - An identifier is only reported once a track has enough hits

use super::Tracker;
use crate::detection::calculate_iou;
use crate::types::{Detection, TrackId, TrackedDetection};
use serde::{Deserialize, Serialize};
use tracing::debug;

const CROSS_CLASS_IOU_PENALTY: f32 = 0.5;

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Minimum IoU to match a detection to an existing track
    pub min_iou: f32,
    /// Frames a track survives without a detection before deletion
    pub max_coast_frames: u32,
    /// Hits required before the track's identifier is reported
    pub min_hits: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            min_iou: 0.3,
            max_coast_frames: 30, // 1s at 30fps
            min_hits: 1,
        }
    }
}

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone)]
struct Track {
    id: TrackId,
    bbox: [f32; 4],
    class_id: usize,
    hits: u32,
    frames_since_hit: u32,
}

impl Track {
    fn is_confirmed(&self, min_hits: u32) -> bool {
        self.hits >= min_hits
    }
}

// ============================================================================
// TRACKER
// ============================================================================

pub struct IouTracker {
    config: TrackerConfig,
    tracks: Vec<Track>,
    next_id: TrackId,
}

impl IouTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            tracks: Vec::new(),
            next_id: 1,
        }
    }

    pub fn active_tracks(&self) -> usize {
        self.tracks.len()
    }
}

impl Default for IouTracker {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}

impl Tracker for IouTracker {
    fn update(&mut self, detections: Vec<Detection>) -> Vec<TrackedDetection> {
        let mut track_matched = vec![false; self.tracks.len()];
        let mut det_track: Vec<Option<usize>> = vec![None; detections.len()];

        let mut pairs: Vec<(usize, usize, f32)> = Vec::new();
        for (ti, track) in self.tracks.iter().enumerate() {
            for (di, det) in detections.iter().enumerate() {
                let raw = calculate_iou(&track.bbox, &det.bbox);
                let score = if track.class_id == det.class_id {
                    raw
                } else {
                    raw * CROSS_CLASS_IOU_PENALTY
                };
                if score >= self.config.min_iou {
                    pairs.push((ti, di, score));
                }
            }
        }
        pairs.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));

        for (ti, di, _) in pairs {
            if track_matched[ti] || det_track[di].is_some() {
                continue;
            }
            track_matched[ti] = true;
            det_track[di] = Some(ti);

            let track = &mut self.tracks[ti];
            track.bbox = detections[di].bbox;
            track.class_id = detections[di].class_id;
            track.hits += 1;
            track.frames_since_hit = 0;
        }

        for (ti, track) in self.tracks.iter_mut().enumerate() {
            if !track_matched[ti] {
                track.frames_since_hit += 1;
            }
        }

        // New tracks for whatever is left
        for (di, det) in detections.iter().enumerate() {
            if det_track[di].is_some() {
                continue;
            }
            let id = self.next_id;
            self.next_id = self.next_id.wrapping_add(1).max(1);
            self.tracks.push(Track {
                id,
                bbox: det.bbox,
                class_id: det.class_id,
                hits: 1,
                frames_since_hit: 0,
            });
            det_track[di] = Some(self.tracks.len() - 1);
            debug!("New track #{} ({})", id, det.class_name);
        }

        let min_hits = self.config.min_hits;
        let out: Vec<TrackedDetection> = detections
            .into_iter()
            .zip(det_track.iter())
            .map(|(det, ti)| {
                let id = ti
                    .map(|i| &self.tracks[i])
                    .filter(|t| t.is_confirmed(min_hits))
                    .map(|t| t.id);
                TrackedDetection::new(det, id)
            })
            .collect();

        let max_coast = self.config.max_coast_frames;
        self.tracks.retain(|t| {
            let keep = t.frames_since_hit <= max_coast;
            if !keep {
                debug!("Track #{} lost after {} frames", t.id, t.frames_since_hit);
            }
            keep
        });

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn car(x: f32) -> Detection {
        Detection::new([x, 0.0, x + 10.0, 10.0], 0.9, 2, "car")
    }

    #[test]
    fn test_identity_persists_across_frames() {
        let mut tracker = IouTracker::default();
        let a = tracker.update(vec![car(0.0), car(100.0)]);
        let b = tracker.update(vec![car(101.0), car(1.0)]);
        assert_eq!(a[0].tracker_id, b[1].tracker_id);
        assert_eq!(a[1].tracker_id, b[0].tracker_id);
        assert_ne!(a[0].tracker_id, a[1].tracker_id);
    }

    #[test]
    fn test_min_hits_withholds_identifier() {
        let mut tracker = IouTracker::new(TrackerConfig {
            min_hits: 2,
            ..Default::default()
        });
        assert_eq!(tracker.update(vec![car(0.0)])[0].tracker_id, None);
        assert!(tracker.update(vec![car(0.5)])[0].tracker_id.is_some());
    }

    #[test]
    fn test_coasting_then_drop() {
        let mut tracker = IouTracker::new(TrackerConfig {
            max_coast_frames: 2,
            ..Default::default()
        });
        let first = tracker.update(vec![car(0.0)])[0].tracker_id;
        tracker.update(vec![]);
        tracker.update(vec![]);
        // Still within the coast window
        assert_eq!(tracker.update(vec![car(0.0)])[0].tracker_id, first);

        for _ in 0..3 {
            tracker.update(vec![]);
        }
        assert_eq!(tracker.active_tracks(), 0);
        let reissued = tracker.update(vec![car(0.0)])[0].tracker_id;
        assert_ne!(reissued, first);
    }
}
