// src/pipeline/metrics.rs
//
// Run counters. Cheap to clone; every clone shares the same counters so a
// pipeline, its state tracker and the caller can all hold one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct PipelineMetrics {
    pub total_frames: Arc<AtomicU64>,
    pub total_detections: Arc<AtomicU64>,
    pub tracked_objects: Arc<AtomicU64>,
    pub events_opened: Arc<AtomicU64>,
    pub events_updated: Arc<AtomicU64>,
    pub events_closed: Arc<AtomicU64>,
    pub detector_failures: Arc<AtomicU64>,
    pub recognition_failures: Arc<AtomicU64>,
    pub snapshot_failures: Arc<AtomicU64>,
    pub encode_failures: Arc<AtomicU64>,
    pub frame_time_us: Arc<AtomicU64>,
    pub started_at: Instant,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            total_frames: Arc::new(AtomicU64::new(0)),
            total_detections: Arc::new(AtomicU64::new(0)),
            tracked_objects: Arc::new(AtomicU64::new(0)),
            events_opened: Arc::new(AtomicU64::new(0)),
            events_updated: Arc::new(AtomicU64::new(0)),
            events_closed: Arc::new(AtomicU64::new(0)),
            detector_failures: Arc::new(AtomicU64::new(0)),
            recognition_failures: Arc::new(AtomicU64::new(0)),
            snapshot_failures: Arc::new(AtomicU64::new(0)),
            encode_failures: Arc::new(AtomicU64::new(0)),
            frame_time_us: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }

    pub fn inc(&self, counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn set_timing(&self, counter: &AtomicU64, duration_us: u64) {
        counter.store(duration_us, Ordering::Relaxed);
    }

    pub fn fps(&self) -> f64 {
        let frames = self.total_frames.load(Ordering::Relaxed);
        let elapsed = self.started_at.elapsed().as_secs_f64();
        if elapsed > 0.01 {
            frames as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn summary(&self, subscribers_dropped: u64) -> MetricsSummary {
        MetricsSummary {
            total_frames: self.total_frames.load(Ordering::Relaxed),
            fps: self.fps(),
            total_detections: self.total_detections.load(Ordering::Relaxed),
            tracked_objects: self.tracked_objects.load(Ordering::Relaxed),
            events_opened: self.events_opened.load(Ordering::Relaxed),
            events_updated: self.events_updated.load(Ordering::Relaxed),
            events_closed: self.events_closed.load(Ordering::Relaxed),
            detector_failures: self.detector_failures.load(Ordering::Relaxed),
            recognition_failures: self.recognition_failures.load(Ordering::Relaxed),
            snapshot_failures: self.snapshot_failures.load(Ordering::Relaxed),
            encode_failures: self.encode_failures.load(Ordering::Relaxed),
            subscribers_dropped,
            last_frame_us: self.frame_time_us.load(Ordering::Relaxed),
            elapsed_secs: self.started_at.elapsed().as_secs_f64(),
        }
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSummary {
    pub total_frames: u64,
    pub fps: f64,
    pub total_detections: u64,
    pub tracked_objects: u64,
    pub events_opened: u64,
    pub events_updated: u64,
    pub events_closed: u64,
    pub detector_failures: u64,
    pub recognition_failures: u64,
    pub snapshot_failures: u64,
    pub encode_failures: u64,
    pub subscribers_dropped: u64,
    pub last_frame_us: u64,
    pub elapsed_secs: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_counters() {
        let m = PipelineMetrics::new();
        let other = m.clone();
        other.inc(&other.events_opened);
        m.add(&m.total_detections, 3);
        let s = m.summary(2);
        assert_eq!(s.events_opened, 1);
        assert_eq!(s.total_detections, 3);
        assert_eq!(s.subscribers_dropped, 2);
    }
}
