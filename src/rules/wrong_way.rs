// src/rules/wrong_way.rs
//
// Travel against the configured direction of the road. Uses the same
// transformed-plane history as the speed rule, over a shorter window.

use super::{Rule, Snapshot, Verdict, ViolationPolicy};
use crate::events::{RemovePayload, ServerEvent, ViolationPayload};
use crate::state::TrackedObjectRecord;
use serde::{Deserialize, Serialize};

/// Direction of travel along the transformed y axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Increasing y
    #[default]
    Down,
    Up,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WrongWayConfig {
    pub correct_direction: Direction,
    /// Minimum |Δy| (m) over the window before a direction is decided
    pub movement_threshold: f32,
    pub road_width: f32,
    pub road_height: f32,
    pub retract_when_cleared: bool,
}

impl Default for WrongWayConfig {
    fn default() -> Self {
        Self {
            correct_direction: Direction::Down,
            movement_threshold: 3.0,
            road_width: 15.0,
            road_height: 80.0,
            retract_when_cleared: false,
        }
    }
}

pub struct WrongWayPolicy {
    config: WrongWayConfig,
    min_samples: usize,
}

impl WrongWayPolicy {
    pub fn new(config: WrongWayConfig, fps: f64) -> Self {
        Self {
            config,
            min_samples: ((fps / 3.0) as usize).max(1),
        }
    }

    /// Net displacement along y, `None` until enough samples are buffered.
    pub fn displacement(&self, record: &TrackedObjectRecord) -> Option<f32> {
        if record.positions.len() < self.min_samples {
            return None;
        }
        Some(record.positions.last()?.y - record.positions.first()?.y)
    }
}

impl ViolationPolicy for WrongWayPolicy {
    fn rule(&self) -> Rule {
        Rule::WrongWay
    }

    fn retractable(&self) -> bool {
        self.config.retract_when_cleared
    }

    fn evaluate(&self, record: &TrackedObjectRecord) -> Verdict {
        let Some(dy) = self.displacement(record) else {
            return Verdict::clear();
        };
        let metric = Some(dy as f64);
        if dy.abs() <= self.config.movement_threshold {
            return Verdict {
                metric,
                ..Verdict::clear()
            };
        }
        let moving = if dy > 0.0 { Direction::Down } else { Direction::Up };
        if moving != self.config.correct_direction {
            Verdict::violating(metric)
        } else {
            Verdict {
                metric,
                ..Verdict::clear()
            }
        }
    }

    fn open_event(
        &mut self,
        record: &mut TrackedObjectRecord,
        _verdict: &Verdict,
        snapshot: Snapshot,
    ) -> Option<ServerEvent> {
        Some(ServerEvent::WrongWay(ViolationPayload {
            id: record.external_id.clone(),
            img_src: snapshot.img_src,
            class_name: record.class_name.clone(),
            detected_at: snapshot.detected_at,
        }))
    }

    fn close_event(&mut self, record: &mut TrackedObjectRecord) -> Option<ServerEvent> {
        Some(ServerEvent::RemoveWrongWay(RemovePayload {
            id: record.external_id.clone(),
        }))
    }

    fn label(&self, record: &TrackedObjectRecord, verdict: &Verdict) -> String {
        if verdict.violating {
            format!("#{} [Wrong Way]", record.object_id)
        } else {
            format!("#{}", record.object_id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::testing::record;
    use crate::types::Point;

    fn moving(ys: &[f32]) -> TrackedObjectRecord {
        let mut r = record("car", 30);
        for y in ys {
            r.positions.push(Point::new(0.0, *y));
        }
        r
    }

    #[test]
    fn test_upward_travel_is_wrong_when_road_runs_down() {
        let policy = WrongWayPolicy::new(WrongWayConfig::default(), 30.0);
        let ys: Vec<f32> = (0..10).map(|i| 50.0 - i as f32).collect();
        let r = moving(&ys);
        let v = policy.evaluate(&r);
        assert!(v.violating);
        assert_eq!(policy.label(&r, &v), "#1 [Wrong Way]");
    }

    #[test]
    fn test_correct_direction_is_clear() {
        let policy = WrongWayPolicy::new(WrongWayConfig::default(), 30.0);
        let ys: Vec<f32> = (0..10).map(|i| i as f32).collect();
        assert!(!policy.evaluate(&moving(&ys)).violating);
    }

    #[test]
    fn test_small_movement_and_short_history() {
        let policy = WrongWayPolicy::new(WrongWayConfig::default(), 30.0);
        // Below the movement threshold
        assert!(!policy.evaluate(&moving(&[10.0, 9.0, 8.0, 8.0, 8.0, 8.0, 8.0, 8.0, 8.0, 8.0])).violating);
        // Fewer than fps/3 samples
        assert_eq!(policy.displacement(&moving(&[50.0, 10.0])), None);
    }

    #[test]
    fn test_direction_config_parses() {
        let cfg: WrongWayConfig = serde_yaml::from_str("correct_direction: up").unwrap();
        assert_eq!(cfg.correct_direction, Direction::Up);
        assert_eq!(cfg.movement_threshold, 3.0);
    }
}
