// src/pipeline/processor.rs
//
// One lane of per-frame work:
//   detect -> filter -> region -> track -> state tracker -> annotate

use super::frame_context::FrameContext;
use super::metrics::PipelineMetrics;
use crate::detection::{DetectionFilter, Detector};
use crate::geometry::PolygonZone;
use crate::render::FrameRenderer;
use crate::state::ObjectStateTracker;
use crate::tracking::Tracker;
use crate::types::Frame;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct FrameProcessor {
    detector: Box<dyn Detector>,
    filter: DetectionFilter,
    /// Detections whose anchor falls outside are dropped before tracking
    region: Option<PolygonZone>,
    tracker: Box<dyn Tracker>,
    states: ObjectStateTracker,
    renderer: Arc<dyn FrameRenderer>,
    metrics: PipelineMetrics,
}

impl FrameProcessor {
    pub fn new(
        detector: Box<dyn Detector>,
        filter: DetectionFilter,
        region: Option<PolygonZone>,
        tracker: Box<dyn Tracker>,
        states: ObjectStateTracker,
        renderer: Arc<dyn FrameRenderer>,
    ) -> Self {
        let metrics = PipelineMetrics::new();
        Self {
            detector,
            filter,
            region,
            tracker,
            states: states.with_metrics(metrics.clone()),
            renderer,
            metrics,
        }
    }

    /// Share counters with the caller. The state tracker is switched over too.
    pub fn with_metrics(mut self, metrics: PipelineMetrics) -> Self {
        self.states = self.states.with_metrics(metrics.clone());
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }

    pub fn states(&self) -> &ObjectStateTracker {
        &self.states
    }

    pub fn process(&mut self, frame: &Frame) -> FrameContext {
        self.metrics.inc(&self.metrics.total_frames);

        let raw = match self.detector.detect(frame) {
            Ok(d) => d,
            Err(e) => {
                warn!("Detector failed on frame {}: {:#}", frame.index, e);
                self.metrics.inc(&self.metrics.detector_failures);
                return FrameContext {
                    frame_id: frame.index,
                    timestamp_ms: frame.timestamp_ms,
                    tracked: Vec::new(),
                    labels: Vec::new(),
                    events: Vec::new(),
                    annotated: frame.image.clone(),
                    degraded: true,
                };
            }
        };

        let mut detections = self.filter.apply(raw);
        if let Some(region) = &self.region {
            detections = region.trigger(detections);
        }
        self.metrics
            .add(&self.metrics.total_detections, detections.len() as u64);

        let tracked = self.tracker.update(detections);
        let labels = self.states.update(frame, &tracked);
        let events = self.states.drain_events();

        let zone = self.region.as_ref().or(self.states.zone());
        let annotated = self.renderer.annotate(&frame.image, &labels, zone);

        debug!(
            "Frame {}: {} tracked, {} labelled, {} event(s)",
            frame.index,
            tracked.len(),
            labels.len(),
            events.len()
        );

        FrameContext {
            frame_id: frame.index,
            timestamp_ms: frame.timestamp_ms,
            tracked,
            labels,
            events,
            annotated,
            degraded: false,
        }
    }
}
