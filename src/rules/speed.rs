// src/rules/speed.rs
//
// Overspeeding. Positions are in the transformed road plane (metres), so
// displacement over the sampled window divided by its duration gives m/s.

use super::{Rule, Snapshot, Verdict, ViolationPolicy};
use crate::events::{OverspeedingPayload, RemovePayload, ServerEvent, SpeedUpdatePayload};
use crate::state::TrackedObjectRecord;
use serde::{Deserialize, Serialize};

const MS_TO_KMH: f64 = 3.6;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeedConfig {
    /// km/h; strictly greater is a violation
    pub speed_limit: f64,
    /// Real-world width of the road quadrilateral (m)
    pub road_width: f32,
    /// Real-world length of the road quadrilateral (m)
    pub road_height: f32,
    /// Withdraw the report when the object drops back under the limit
    pub retract_when_cleared: bool,
}

impl Default for SpeedConfig {
    fn default() -> Self {
        Self {
            speed_limit: 60.0,
            road_width: 20.0,
            road_height: 100.0,
            retract_when_cleared: false,
        }
    }
}

pub struct SpeedPolicy {
    config: SpeedConfig,
    fps: f64,
}

impl SpeedPolicy {
    pub fn new(config: SpeedConfig, fps: f64) -> Self {
        Self { config, fps }
    }

    /// km/h over the buffered window, `None` until half a second is buffered.
    pub fn estimate(&self, record: &TrackedObjectRecord) -> Option<f64> {
        let n = record.positions.len();
        if n == 0 || (n as f64) < self.fps / 2.0 {
            return None;
        }
        let elapsed = n as f64 / self.fps;
        if !(elapsed > 0.0) || !elapsed.is_finite() {
            return None;
        }
        let (first, last) = (record.positions.first()?, record.positions.last()?);
        let distance = (last.y - first.y).abs() as f64;
        Some(distance / elapsed * MS_TO_KMH)
    }
}

impl ViolationPolicy for SpeedPolicy {
    fn rule(&self) -> Rule {
        Rule::Overspeeding
    }

    fn retractable(&self) -> bool {
        self.config.retract_when_cleared
    }

    fn evaluate(&self, record: &TrackedObjectRecord) -> Verdict {
        match self.estimate(record) {
            Some(speed) if speed > self.config.speed_limit => Verdict::violating(Some(speed)),
            Some(speed) => Verdict {
                metric: Some(speed),
                ..Verdict::clear()
            },
            None => Verdict::clear(),
        }
    }

    fn open_event(
        &mut self,
        record: &mut TrackedObjectRecord,
        verdict: &Verdict,
        snapshot: Snapshot,
    ) -> Option<ServerEvent> {
        let speed = verdict.metric.unwrap_or_default();
        record.reported_metric = Some(speed);
        Some(ServerEvent::Overspeeding(OverspeedingPayload {
            id: record.external_id.clone(),
            img_src: snapshot.img_src,
            highest_speed: speed as i64,
            detected_at: snapshot.detected_at,
            class_name: record.class_name.clone(),
        }))
    }

    fn refresh_event(
        &mut self,
        record: &mut TrackedObjectRecord,
        verdict: &Verdict,
    ) -> Option<ServerEvent> {
        let speed = verdict.metric?;
        if record.reported_metric.is_some_and(|reported| speed <= reported) {
            return None;
        }
        record.reported_metric = Some(speed);
        Some(ServerEvent::UpdateOverspeeding(SpeedUpdatePayload {
            id: record.external_id.clone(),
            highest_speed: speed as i64,
        }))
    }

    fn close_event(&mut self, record: &mut TrackedObjectRecord) -> Option<ServerEvent> {
        record.reported_metric = None;
        Some(ServerEvent::RemoveOverspeeding(RemovePayload {
            id: record.external_id.clone(),
        }))
    }

    fn label(&self, record: &TrackedObjectRecord, verdict: &Verdict) -> String {
        match verdict.metric {
            None => format!("#{}", record.object_id),
            Some(speed) => {
                let mut label = format!("#{} [{} Km/h]", record.object_id, speed as i64);
                if verdict.violating {
                    label.push_str(" [Violator]");
                }
                label
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::testing::record;
    use crate::types::Point;

    fn with_track(ys: &[f32]) -> TrackedObjectRecord {
        let mut r = record("car", 30);
        for y in ys {
            r.positions.push(Point::new(0.0, *y));
        }
        r
    }

    #[test]
    fn test_static_object_has_zero_speed() {
        let policy = SpeedPolicy::new(SpeedConfig::default(), 30.0);
        let r = with_track(&[5.0; 30]);
        assert_eq!(policy.estimate(&r), Some(0.0));
        assert!(!policy.evaluate(&r).violating);
    }

    #[test]
    fn test_units_per_second_to_kmh() {
        let policy = SpeedPolicy::new(SpeedConfig::default(), 30.0);
        // 25 m over a full one-second window
        let mut ys = vec![0.0; 29];
        ys.push(25.0);
        let r = with_track(&ys);
        let speed = policy.estimate(&r).unwrap();
        assert!((speed - 25.0 * 3.6).abs() < 1e-3);
        let v = policy.evaluate(&r);
        assert!(v.violating);
        assert_eq!(policy.label(&r, &v), "#1 [90 Km/h] [Violator]");
    }

    #[test]
    fn test_insufficient_samples() {
        let policy = SpeedPolicy::new(SpeedConfig::default(), 30.0);
        let r = with_track(&[0.0; 14]);
        assert_eq!(policy.estimate(&r), None);
        assert_eq!(policy.label(&r, &policy.evaluate(&r)), "#1");
        // Exactly half the rate is enough
        let r = with_track(&[0.0; 15]);
        assert!(policy.estimate(&r).is_some());
    }

    #[test]
    fn test_update_only_on_new_peak() {
        let mut policy = SpeedPolicy::new(SpeedConfig::default(), 30.0);
        let mut r = record("car", 30);
        r.reported_metric = Some(80.0);
        assert!(policy
            .refresh_event(&mut r, &Verdict::violating(Some(75.0)))
            .is_none());
        let ev = policy.refresh_event(&mut r, &Verdict::violating(Some(91.7)));
        assert!(matches!(
            ev,
            Some(ServerEvent::UpdateOverspeeding(SpeedUpdatePayload { highest_speed, .. })) if highest_speed == 91
        ));
        assert_eq!(r.reported_metric, Some(91.7));
    }
}
