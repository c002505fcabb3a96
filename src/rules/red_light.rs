// src/rules/red_light.rs
//
// Red-light crossing: an object that has been inside the safe zone (before
// the stop line) and is now outside it has crossed.

use super::{Rule, Snapshot, Verdict, ViolationPolicy};
use crate::events::{ServerEvent, ViolationPayload};
use crate::state::TrackedObjectRecord;
use crate::types::capitalize;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RedLightConfig {
    /// Safe-zone polygon in image coordinates
    pub safe_zone: Vec<[f32; 2]>,
}

#[derive(Default)]
pub struct RedLightPolicy;

impl RedLightPolicy {
    pub fn new() -> Self {
        Self
    }
}

impl ViolationPolicy for RedLightPolicy {
    fn rule(&self) -> Rule {
        Rule::RedLight
    }

    fn history_capacity(&self, _fps: f64) -> usize {
        1
    }

    fn evaluate(&self, record: &TrackedObjectRecord) -> Verdict {
        if record.zone.ever_inside && !record.zone.inside {
            Verdict::violating(None)
        } else {
            Verdict::clear()
        }
    }

    fn open_event(
        &mut self,
        record: &mut TrackedObjectRecord,
        _verdict: &Verdict,
        snapshot: Snapshot,
    ) -> Option<ServerEvent> {
        Some(ServerEvent::RedLightViolation(ViolationPayload {
            id: record.external_id.clone(),
            img_src: snapshot.img_src,
            class_name: record.class_name.clone(),
            detected_at: snapshot.detected_at,
        }))
    }

    fn label(&self, record: &TrackedObjectRecord, verdict: &Verdict) -> String {
        let mut label = format!("{} #{}", capitalize(&record.class_name), record.object_id);
        if verdict.violating || record.state.is_reported() {
            label.push_str(" [Violator]");
        }
        label
    }

    fn snapshot_label(&self, record: &TrackedObjectRecord, _verdict: &Verdict) -> String {
        format!("{} [Violator]", capitalize(&record.class_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::testing::record;

    #[test]
    fn test_exit_after_entry_is_violation() {
        let policy = RedLightPolicy::new();
        let mut r = record("car", 1);
        // Never inside
        r.zone.update(false);
        assert!(!policy.evaluate(&r).violating);
        r.zone.update(true);
        assert!(!policy.evaluate(&r).violating);
        r.zone.update(false);
        assert!(policy.evaluate(&r).violating);
        assert_eq!(policy.label(&r, &policy.evaluate(&r)), "Car #1 [Violator]");
    }
}
