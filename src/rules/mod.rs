// src/rules/mod.rs
//
// Violation policies. The state tracker owns identity, evidence and the
// lifecycle; a policy only decides what counts as a violation for its rule,
// which events that produces and how objects are labelled.

pub mod dwell;
pub mod helmet;
pub mod lookout;
pub mod pothole;
pub mod red_light;
pub mod speed;
pub mod wrong_way;

pub use dwell::DwellPolicy;
pub use helmet::{HelmetConfig, HelmetPolicy};
pub use lookout::{LookoutKind, LookoutPolicy};
pub use pothole::{PotholeConfig, PotholePolicy};
pub use red_light::{RedLightConfig, RedLightPolicy};
pub use speed::{SpeedConfig, SpeedPolicy};
pub use wrong_way::{Direction, WrongWayConfig, WrongWayPolicy};

use crate::events::ServerEvent;
use crate::state::TrackedObjectRecord;
use crate::types::{Detection, Frame};
use anyhow::Result;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Rule {
    NoHelmet,
    Overspeeding,
    WrongWay,
    RedLight,
    Pothole,
    VehicleLookout,
    PersonLookout,
    Dwell,
}

impl Rule {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoHelmet => "no-helmet",
            Self::Overspeeding => "overspeeding",
            Self::WrongWay => "wrong-way",
            Self::RedLight => "red-light",
            Self::Pothole => "pothole",
            Self::VehicleLookout => "vehicle-lookout",
            Self::PersonLookout => "person-lookout",
            Self::Dwell => "dwell",
        }
    }
}

/// Result of evaluating a rule against one record.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Verdict {
    pub violating: bool,
    /// Draw with the violation colour.
    pub flagged: bool,
    /// Rule metric, `None` while there is not enough evidence.
    pub metric: Option<f64>,
}

impl Verdict {
    pub fn clear() -> Self {
        Self::default()
    }

    pub fn violating(metric: Option<f64>) -> Self {
        Self {
            violating: true,
            flagged: true,
            metric,
        }
    }
}

/// Evidence attached to an opening event.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Base64 JPEG of the annotated frame.
    pub img_src: String,
    /// Wall clock, ms since epoch.
    pub detected_at: i64,
}

pub trait ViolationPolicy: Send {
    fn rule(&self) -> Rule;

    /// Position samples kept per object.
    fn history_capacity(&self, fps: f64) -> usize {
        fps.round().max(1.0) as usize
    }

    /// Whether a reported violation is withdrawn once it stops holding.
    fn retractable(&self) -> bool {
        false
    }

    /// Called once per frame before any object is processed.
    fn begin_frame(&mut self) {}

    /// Rule-specific evidence gathering (recognition). An error skips the
    /// object for this frame.
    fn observe(
        &mut self,
        _frame: &Frame,
        _det: &Detection,
        _record: &mut TrackedObjectRecord,
    ) -> Result<()> {
        Ok(())
    }

    fn evaluate(&self, record: &TrackedObjectRecord) -> Verdict;

    fn open_event(
        &mut self,
        record: &mut TrackedObjectRecord,
        verdict: &Verdict,
        snapshot: Snapshot,
    ) -> Option<ServerEvent>;

    /// A reported object whose verdict calls for a fresh announcement
    /// rather than an update, e.g. a second listed plate on the same track.
    fn reopens(&self, _record: &TrackedObjectRecord, _verdict: &Verdict) -> bool {
        false
    }

    fn refresh_event(
        &mut self,
        _record: &mut TrackedObjectRecord,
        _verdict: &Verdict,
    ) -> Option<ServerEvent> {
        None
    }

    fn close_event(&mut self, _record: &mut TrackedObjectRecord) -> Option<ServerEvent> {
        None
    }

    /// Display label, computed after the state transition for this frame.
    fn label(&self, record: &TrackedObjectRecord, verdict: &Verdict) -> String;

    /// Label drawn on the event snapshot.
    fn snapshot_label(&self, record: &TrackedObjectRecord, verdict: &Verdict) -> String {
        self.label(record, verdict)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::state::TrackedObjectRecord;
    use crate::types::{Detection, Frame};
    use image::RgbImage;

    pub fn frame(index: u64, fps: f64) -> Frame {
        Frame::new(index, index as f64 * 1000.0 / fps, RgbImage::new(8, 8))
    }

    pub fn record(class: &str, capacity: usize) -> TrackedObjectRecord {
        let det = Detection::new([0.0, 0.0, 4.0, 4.0], 0.9, 0, class);
        TrackedObjectRecord::new(1, 1, capacity, &det, &frame(0, 30.0))
    }
}
