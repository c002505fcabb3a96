// src/state/tracker.rs
//
// Object state tracker: binds tracker identifiers to stable object records,
// accumulates evidence frame by frame, runs the violation lifecycle through
// the configured policy and queues the resulting events.
//
// Events for a frame are queued in detection order and drained by the
// driver after `update` returns.

use super::machine::{Action, ViolationState};
use super::record::TrackedObjectRecord;
use crate::events::ServerEvent;
use crate::geometry::{PolygonZone, ViewTransformer};
use crate::pipeline::event_bus::EventBus;
use crate::pipeline::metrics::PipelineMetrics;
use crate::render::FrameRenderer;
use crate::rules::{Snapshot, Verdict, ViolationPolicy};
use crate::types::{Anchor, Detection, Frame, ObjectLabel, TrackId, TrackedDetection};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

// ============================================================================
// CONFIGURATION
// ============================================================================

pub struct StateTrackerConfig {
    /// Nominal source rate; sizes the position history
    pub fps: f64,
    /// Image plane -> road plane, positions stay in pixels without one
    pub transform: Option<ViewTransformer>,
    /// Zone whose membership feeds the zone flags
    pub zone: Option<PolygonZone>,
    /// Point of the box recorded in the position history
    pub position_anchor: Anchor,
    /// Forget records not seen for this many frames. `None` keeps every
    /// record for the whole session.
    pub max_idle_frames: Option<u64>,
    /// Outbox size
    pub max_pending_events: usize,
}

impl Default for StateTrackerConfig {
    fn default() -> Self {
        Self {
            fps: 30.0,
            transform: None,
            zone: None,
            position_anchor: Anchor::BottomCenter,
            max_idle_frames: None,
            max_pending_events: 256,
        }
    }
}

// ============================================================================
// TRACKER
// ============================================================================

pub struct ObjectStateTracker {
    config: StateTrackerConfig,
    policy: Box<dyn ViolationPolicy>,
    renderer: Arc<dyn FrameRenderer>,
    records: HashMap<TrackId, TrackedObjectRecord>,
    next_object_id: u64,
    outbox: EventBus,
    metrics: PipelineMetrics,
}

impl ObjectStateTracker {
    pub fn new(
        config: StateTrackerConfig,
        policy: Box<dyn ViolationPolicy>,
        renderer: Arc<dyn FrameRenderer>,
    ) -> Self {
        info!(
            "✓ State tracker ready: rule={} fps={:.1} transform={} zone={} eviction={:?}",
            policy.rule().as_str(),
            config.fps,
            config.transform.is_some(),
            config.zone.is_some(),
            config.max_idle_frames
        );
        let outbox = EventBus::new(config.max_pending_events);
        Self {
            config,
            policy,
            renderer,
            records: HashMap::new(),
            next_object_id: 0,
            outbox,
            metrics: PipelineMetrics::new(),
        }
    }

    pub fn with_metrics(mut self, metrics: PipelineMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn zone(&self) -> Option<&PolygonZone> {
        self.config.zone.as_ref()
    }

    pub fn record(&self, tracker_id: TrackId) -> Option<&TrackedObjectRecord> {
        self.records.get(&tracker_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn drain_events(&mut self) -> Vec<ServerEvent> {
        self.outbox.drain()
    }

    /// Process one frame's tracked detections and return display labels for
    /// every object that was evaluated. Detections without an identifier are
    /// skipped.
    pub fn update(&mut self, frame: &Frame, detections: &[TrackedDetection]) -> Vec<ObjectLabel> {
        self.policy.begin_frame();
        let mut labels = Vec::with_capacity(detections.len());

        for tracked in detections {
            let Some(tracker_id) = tracked.tracker_id else {
                continue;
            };
            if let Some(label) = self.process(frame, tracker_id, &tracked.detection) {
                labels.push(label);
            }
        }

        if let Some(max_idle) = self.config.max_idle_frames {
            self.evict_idle(frame.index, max_idle);
        }

        labels
    }

    fn process(
        &mut self,
        frame: &Frame,
        tracker_id: TrackId,
        det: &Detection,
    ) -> Option<ObjectLabel> {
        if !self.records.contains_key(&tracker_id) {
            self.next_object_id += 1;
            let capacity = self.policy.history_capacity(self.config.fps);
            let record =
                TrackedObjectRecord::new(tracker_id, self.next_object_id, capacity, det, frame);
            debug!(
                "New object #{} for track {} ({})",
                record.object_id, tracker_id, det.class_name
            );
            self.records.insert(tracker_id, record);
            self.metrics.inc(&self.metrics.tracked_objects);
        }
        let record = self.records.get_mut(&tracker_id)?;

        // Evidence
        record.observe(det, frame);
        let anchor = det.anchor(self.config.position_anchor);
        let position = match &self.config.transform {
            Some(t) => t.transform_point(anchor),
            None => anchor,
        };
        record.positions.push(position);
        if let Some(zone) = &self.config.zone {
            record.zone.update(zone.contains_detection(det));
        }

        if let Err(e) = self.policy.observe(frame, det, record) {
            warn!(
                "Recognition failed for object #{} on frame {}: {:#}",
                record.object_id, frame.index, e
            );
            self.metrics.inc(&self.metrics.recognition_failures);
            return None;
        }

        // Lifecycle
        let verdict = self.policy.evaluate(record);
        if let Some(metric) = verdict.metric {
            record.peak_metric = Some(record.peak_metric.map_or(metric, |p| p.max(metric)));
        }

        let (next, action) = record
            .state
            .next(verdict.violating, self.policy.retractable());
        record.state = next;
        let action = match action {
            Action::Refresh if self.policy.reopens(record, &verdict) => Action::Open,
            other => other,
        };

        match action {
            Action::Nothing => {}
            Action::Open => {
                let snapshot_label = ObjectLabel {
                    text: self.policy.snapshot_label(record, &verdict),
                    flagged: true,
                    ..label_for(record, String::new(), &verdict)
                };
                match self.renderer.snapshot(frame, &snapshot_label, self.config.zone.as_ref()) {
                    Ok(img_src) => {
                        let snapshot = Snapshot {
                            img_src,
                            detected_at: chrono::Utc::now().timestamp_millis(),
                        };
                        if let Some(event) = self.policy.open_event(record, &verdict, snapshot) {
                            info!(
                                "🚨 {} for object #{} (frame {})",
                                event.name(),
                                record.object_id,
                                frame.index
                            );
                            self.outbox.publish(event);
                            self.metrics.inc(&self.metrics.events_opened);
                        }
                        record.state = ViolationState::Reported;
                    }
                    Err(e) => {
                        warn!(
                            "Snapshot failed for object #{}, retrying next frame: {:#}",
                            record.object_id, e
                        );
                        self.metrics.inc(&self.metrics.snapshot_failures);
                    }
                }
            }
            Action::Refresh => {
                if let Some(event) = self.policy.refresh_event(record, &verdict) {
                    debug!("{} for object #{}", event.name(), record.object_id);
                    self.outbox.publish(event);
                    self.metrics.inc(&self.metrics.events_updated);
                }
            }
            Action::Close => {
                if let Some(event) = self.policy.close_event(record) {
                    info!("✓ {} for object #{}", event.name(), record.object_id);
                    self.outbox.publish(event);
                    self.metrics.inc(&self.metrics.events_closed);
                }
            }
        }

        let text = self.policy.label(record, &verdict);
        Some(label_for(record, text, &verdict))
    }

    fn evict_idle(&mut self, current_frame: u64, max_idle: u64) {
        let before = self.records.len();
        self.records
            .retain(|_, r| current_frame.saturating_sub(r.last_seen_frame) <= max_idle);
        let evicted = before - self.records.len();
        if evicted > 0 {
            debug!("Evicted {} idle record(s)", evicted);
        }
    }
}

fn label_for(record: &TrackedObjectRecord, text: String, verdict: &Verdict) -> ObjectLabel {
    ObjectLabel {
        tracker_id: record.tracker_id,
        object_id: record.object_id,
        bbox: record.bbox,
        text,
        flagged: verdict.flagged,
        confidence: record.confidence,
        first_class: record.first_class.clone(),
        dwell_secs: record.dwell_secs(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::BoxRenderer;
    use crate::detection::Recognizer;
    use crate::events::VehicleFoundPayload;
    use crate::lookout::LookoutStore;
    use crate::pipeline::notifier::Notifier;
    use crate::rules::{
        Direction, DwellPolicy, HelmetConfig, HelmetPolicy, LookoutPolicy, PotholeConfig,
        PotholePolicy, RedLightPolicy, SpeedConfig, SpeedPolicy, WrongWayConfig, WrongWayPolicy,
    };
    use anyhow::{anyhow, Result};
    use image::RgbImage;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn frame(index: u64) -> Frame {
        Frame::new(index, index as f64 * 1000.0 / 30.0, RgbImage::new(64, 64))
    }

    fn tracked(id: TrackId, class: &str, bbox: [f32; 4]) -> TrackedDetection {
        TrackedDetection::new(Detection::new(bbox, 0.9, 0, class), Some(id))
    }

    fn tracker(policy: Box<dyn ViolationPolicy>) -> ObjectStateTracker {
        ObjectStateTracker::new(
            StateTrackerConfig::default(),
            policy,
            Arc::new(BoxRenderer::default()),
        )
    }

    /// Renderer whose snapshots can be made to fail.
    #[derive(Default)]
    struct FlakyRenderer {
        fail: AtomicBool,
        zone_seen: AtomicBool,
    }

    impl FrameRenderer for FlakyRenderer {
        fn annotate(&self, image: &RgbImage, _: &[ObjectLabel], _: Option<&PolygonZone>) -> RgbImage {
            image.clone()
        }

        fn snapshot(
            &self,
            _frame: &Frame,
            _label: &ObjectLabel,
            zone: Option<&PolygonZone>,
        ) -> Result<String> {
            self.zone_seen.store(zone.is_some(), Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                Err(anyhow!("encoder unavailable"))
            } else {
                Ok("img".into())
            }
        }
    }

    /// Reads the next plate on every call.
    struct Plates(VecDeque<&'static str>);

    impl Recognizer for Plates {
        fn recognize(&mut self, _frame: &Frame, _det: &Detection) -> Result<Option<String>> {
            Ok(self.0.pop_front().map(String::from))
        }
    }

    /// Opening and closing events with their ids, updates left out.
    fn lifecycle(events: &[ServerEvent]) -> Vec<(&'static str, String)> {
        events
            .iter()
            .filter(|e| !e.name().starts_with("server:update-"))
            .filter_map(|e| Some((e.name(), e.object_id()?.to_string())))
            .collect()
    }

    #[test]
    fn test_object_id_stable_and_never_reused() {
        let mut t = tracker(Box::new(DwellPolicy));
        let bbox = [0.0, 0.0, 10.0, 10.0];
        t.update(&frame(0), &[tracked(7, "car", bbox), tracked(3, "car", bbox)]);
        t.update(&frame(1), &[tracked(3, "car", bbox)]);
        let labels = t.update(&frame(2), &[tracked(7, "car", bbox), tracked(9, "car", bbox)]);
        assert_eq!(t.record(7).unwrap().object_id, 1);
        assert_eq!(t.record(3).unwrap().object_id, 2);
        assert_eq!(t.record(9).unwrap().object_id, 3);
        assert_eq!(labels[0].text, "#1 (0s)");
        assert_eq!(t.len(), 3);
    }

    #[test]
    fn test_untracked_detections_are_skipped() {
        let mut t = tracker(Box::new(DwellPolicy));
        let det = TrackedDetection::new(Detection::new([0.0; 4], 0.9, 0, "car"), None);
        assert!(t.update(&frame(0), &[det]).is_empty());
        assert!(t.is_empty());
    }

    #[test]
    fn test_helmet_votes_open_once_and_never_close() {
        let mut t = tracker(Box::new(HelmetPolicy::new(HelmetConfig::default())));
        let bbox = [0.0, 0.0, 10.0, 10.0];
        let mut opened_on = Vec::new();
        let mut events = Vec::new();
        // 20 no_helmet votes, 5 helmet votes, helmet on every fifth frame
        for i in 1..=25u64 {
            let class = if i % 5 == 0 { "helmet" } else { "no_helmet" };
            t.update(&frame(i), &[tracked(1, class, bbox)]);
            let drained = t.drain_events();
            if !drained.is_empty() {
                opened_on.push(i);
            }
            events.extend(drained);
        }
        assert_eq!(opened_on, vec![1]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name(), "server:no-helmet-violation");
        let r = t.record(1).unwrap();
        assert_eq!((r.votes("no_helmet"), r.votes("helmet")), (20, 5));
        assert!(r.state.is_reported());
    }

    #[test]
    fn test_helmet_closes_once_when_cleared() {
        let mut t = tracker(Box::new(HelmetPolicy::new(HelmetConfig::default())));
        let bbox = [0.0, 0.0, 10.0, 10.0];
        t.update(&frame(0), &[tracked(1, "no_helmet", bbox)]);
        t.update(&frame(1), &[tracked(1, "helmet", bbox)]);
        t.update(&frame(2), &[tracked(1, "helmet", bbox)]);
        let names: Vec<_> = t.drain_events().iter().map(|e| e.name()).collect();
        assert_eq!(
            names,
            vec!["server:no-helmet-violation", "server:remove-no-helmet-violation"]
        );
    }

    #[test]
    fn test_pothole_reported_exactly_once() {
        let mut t = tracker(Box::new(PotholePolicy::new(PotholeConfig::default())));
        let bbox = [5.0, 5.0, 20.0, 20.0];
        for i in 0..10 {
            t.update(&frame(i), &[tracked(4, "pothole", bbox)]);
        }
        let events = t.drain_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name(), "server:pothole");
    }

    #[test]
    fn test_red_light_opens_on_exit_frame() {
        let zone =
            PolygonZone::from_coords(&[[0.0, 0.0], [32.0, 0.0], [32.0, 64.0], [0.0, 64.0]], Anchor::Center)
                .unwrap();
        let mut t = ObjectStateTracker::new(
            StateTrackerConfig {
                zone: Some(zone),
                ..Default::default()
            },
            Box::new(RedLightPolicy::new()),
            Arc::new(BoxRenderer::default()),
        );
        // Center x: 10, 20, 30 inside; 40, 50 outside
        let mut opened_on = None;
        for (i, x) in [5.0f32, 15.0, 25.0, 35.0, 45.0].iter().enumerate() {
            t.update(&frame(i as u64), &[tracked(1, "car", [*x, 10.0, x + 10.0, 20.0])]);
            if !t.drain_events().is_empty() {
                assert!(opened_on.is_none(), "opened twice");
                opened_on = Some(i);
            }
        }
        assert_eq!(opened_on, Some(3));
    }

    #[test]
    fn test_red_light_snapshot_gets_safe_zone() {
        let zone =
            PolygonZone::from_coords(&[[0.0, 0.0], [32.0, 0.0], [32.0, 64.0], [0.0, 64.0]], Anchor::Center)
                .unwrap();
        let renderer = Arc::new(FlakyRenderer::default());
        let mut t = ObjectStateTracker::new(
            StateTrackerConfig {
                zone: Some(zone),
                ..Default::default()
            },
            Box::new(RedLightPolicy::new()),
            renderer.clone(),
        );
        t.update(&frame(0), &[tracked(1, "car", [5.0, 10.0, 15.0, 20.0])]);
        t.update(&frame(1), &[tracked(1, "car", [45.0, 10.0, 55.0, 20.0])]);
        assert_eq!(t.drain_events().len(), 1);
        assert!(renderer.zone_seen.load(Ordering::SeqCst));
    }

    #[test]
    fn test_failed_snapshot_retries_next_frame() {
        let renderer = Arc::new(FlakyRenderer {
            fail: AtomicBool::new(true),
            ..Default::default()
        });
        let mut t = ObjectStateTracker::new(
            StateTrackerConfig::default(),
            Box::new(PotholePolicy::new(PotholeConfig::default())),
            renderer.clone(),
        );
        let bbox = [0.0, 0.0, 10.0, 10.0];
        t.update(&frame(0), &[tracked(1, "pothole", bbox)]);
        assert!(t.drain_events().is_empty());
        assert_eq!(t.record(1).unwrap().state, ViolationState::Active);

        renderer.fail.store(false, Ordering::SeqCst);
        t.update(&frame(1), &[tracked(1, "pothole", bbox)]);
        assert_eq!(t.drain_events().len(), 1);
        assert!(t.record(1).unwrap().state.is_reported());
    }

    #[test]
    fn test_speed_through_tracker_reports_once() {
        let mut t = ObjectStateTracker::new(
            StateTrackerConfig {
                position_anchor: Anchor::Center,
                ..Default::default()
            },
            Box::new(SpeedPolicy::new(SpeedConfig::default(), 30.0)),
            Arc::new(BoxRenderer::default()),
        );
        // 1 px per frame = 30 px/s = 108 km/h with no transform
        let mut names = Vec::new();
        for i in 0..60u64 {
            let y = i as f32;
            t.update(&frame(i), &[tracked(2, "car", [0.0, y, 10.0, y + 10.0])]);
            names.extend(t.drain_events().iter().map(|e| e.name()));
        }
        assert_eq!(names.first().copied(), Some("server:overspeeding"));
        assert_eq!(names.iter().filter(|n| **n == "server:overspeeding").count(), 1);
        assert!(!names.contains(&"server:remove-overspeeding"));
        assert!(t.record(2).unwrap().peak_metric.unwrap() > 60.0);
    }

    #[test]
    fn test_idle_eviction_mints_new_object_id() {
        let mut t = ObjectStateTracker::new(
            StateTrackerConfig {
                max_idle_frames: Some(2),
                ..Default::default()
            },
            Box::new(DwellPolicy),
            Arc::new(BoxRenderer::default()),
        );
        let bbox = [0.0, 0.0, 10.0, 10.0];
        t.update(&frame(0), &[tracked(1, "car", bbox)]);
        for i in 1..=3 {
            t.update(&frame(i), &[]);
        }
        assert!(t.record(1).is_none());
        t.update(&frame(4), &[tracked(1, "car", bbox)]);
        assert_eq!(t.record(1).unwrap().object_id, 2);
    }

    #[test]
    fn test_helmet_toggle_opens_again_after_close() {
        let mut t = tracker(Box::new(HelmetPolicy::new(HelmetConfig::default())));
        let bbox = [0.0, 0.0, 10.0, 10.0];
        let mut events = Vec::new();
        for (i, class) in ["no_helmet", "helmet", "helmet", "no_helmet", "no_helmet"]
            .iter()
            .enumerate()
        {
            t.update(&frame(i as u64), &[tracked(1, class, bbox)]);
            events.extend(t.drain_events());
        }
        let names: Vec<_> = events.iter().map(|e| e.name()).collect();
        assert_eq!(
            names,
            vec![
                "server:no-helmet-violation",
                "server:remove-no-helmet-violation",
                "server:no-helmet-violation",
            ]
        );
        let id = t.record(1).unwrap().external_id.clone();
        assert!(events.iter().all(|e| e.object_id() == Some(id.as_str())));
    }

    #[test]
    fn test_retractable_speed_reopens_with_same_id() {
        let config = SpeedConfig {
            retract_when_cleared: true,
            ..Default::default()
        };
        let mut t = ObjectStateTracker::new(
            StateTrackerConfig {
                position_anchor: Anchor::Center,
                ..Default::default()
            },
            Box::new(SpeedPolicy::new(config, 30.0)),
            Arc::new(BoxRenderer::default()),
        );
        // Fast (108 km/h), stopped, fast again
        let mut y = 0.0f32;
        let mut events = Vec::new();
        for i in 0..150u64 {
            if !(30..90).contains(&i) {
                y += 1.0;
            }
            t.update(&frame(i), &[tracked(2, "car", [0.0, y, 10.0, y + 10.0])]);
            events.extend(t.drain_events());
        }
        let id = t.record(2).unwrap().external_id.clone();
        assert_eq!(
            lifecycle(&events),
            vec![
                ("server:overspeeding", id.clone()),
                ("server:remove-overspeeding", id.clone()),
                ("server:overspeeding", id),
            ]
        );
    }

    #[test]
    fn test_retractable_wrong_way_reopens_with_same_id() {
        let config = WrongWayConfig {
            correct_direction: Direction::Down,
            retract_when_cleared: true,
            ..Default::default()
        };
        let mut t = tracker(Box::new(WrongWayPolicy::new(config, 30.0)));
        // Up (wrong), down (correct), up again
        let mut y = 200.0f32;
        let mut events = Vec::new();
        for i in 0..150u64 {
            y += if (30..90).contains(&i) { 1.0 } else { -1.0 };
            t.update(&frame(i), &[tracked(5, "car", [0.0, y, 10.0, y + 10.0])]);
            events.extend(t.drain_events());
        }
        let id = t.record(5).unwrap().external_id.clone();
        assert_eq!(
            lifecycle(&events),
            vec![
                ("server:wrong-way", id.clone()),
                ("server:remove-wrong-way", id.clone()),
                ("server:wrong-way", id),
            ]
        );
    }

    #[test]
    fn test_second_listed_plate_on_same_track_is_reported() {
        let store = LookoutStore::new(Notifier::new());
        store.add_vehicle("AAA111");
        store.add_vehicle("BBB222");
        let plates = Plates(VecDeque::from(["AAA111", "AAA111", "BBB222", "BBB222", "AAA111"]));
        let mut t = tracker(Box::new(LookoutPolicy::vehicles(Box::new(plates), store)));
        let bbox = [0.0, 0.0, 10.0, 10.0];

        let mut events = Vec::new();
        for i in 0..4u64 {
            t.update(&frame(i), &[tracked(1, "car", bbox)]);
            events.extend(t.drain_events());
        }
        // Plate already reported, now seen on another track
        t.update(&frame(4), &[tracked(2, "car", bbox)]);
        events.extend(t.drain_events());

        let found: Vec<_> = events
            .iter()
            .map(|e| match e {
                ServerEvent::VehicleFound(VehicleFoundPayload { id, plate_number, .. }) => {
                    (id.clone(), plate_number.clone())
                }
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].1, "AAA111");
        assert_eq!(found[1].1, "BBB222");
        assert_eq!(found[0].0, t.record(1).unwrap().external_id);
        assert_ne!(found[0].0, found[1].0);
        assert!(t.record(1).unwrap().state.is_reported());
    }
}
