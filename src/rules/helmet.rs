// src/rules/helmet.rs
//
// Riders without a helmet. Decided by majority of class votes over the
// object's lifetime, so a single misclassified frame does not flip it.

use super::{Rule, Snapshot, Verdict, ViolationPolicy};
use crate::events::{RemovePayload, ServerEvent, ViolationPayload};
use crate::state::TrackedObjectRecord;
use crate::types::capitalize;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HelmetConfig {
    pub helmet_class: String,
    pub no_helmet_class: String,
}

impl Default for HelmetConfig {
    fn default() -> Self {
        Self {
            helmet_class: "helmet".to_string(),
            no_helmet_class: "no_helmet".to_string(),
        }
    }
}

pub struct HelmetPolicy {
    config: HelmetConfig,
}

impl HelmetPolicy {
    pub fn new(config: HelmetConfig) -> Self {
        Self { config }
    }
}

impl ViolationPolicy for HelmetPolicy {
    fn rule(&self) -> Rule {
        Rule::NoHelmet
    }

    fn history_capacity(&self, _fps: f64) -> usize {
        1
    }

    fn retractable(&self) -> bool {
        true
    }

    fn evaluate(&self, record: &TrackedObjectRecord) -> Verdict {
        if record.votes(&self.config.no_helmet_class) > record.votes(&self.config.helmet_class) {
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
        Some(ServerEvent::NoHelmetViolation(ViolationPayload {
            id: record.external_id.clone(),
            img_src: snapshot.img_src,
            class_name: record.class_name.clone(),
            detected_at: snapshot.detected_at,
        }))
    }

    fn close_event(&mut self, record: &mut TrackedObjectRecord) -> Option<ServerEvent> {
        Some(ServerEvent::RemoveNoHelmetViolation(RemovePayload {
            id: record.external_id.clone(),
        }))
    }

    fn label(&self, record: &TrackedObjectRecord, verdict: &Verdict) -> String {
        let mut label = format!("{} #{}", capitalize(&record.class_name), record.object_id);
        if verdict.violating {
            label.push_str(" [Violator]");
        }
        label
    }

    fn snapshot_label(&self, record: &TrackedObjectRecord, _verdict: &Verdict) -> String {
        capitalize(&record.class_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::testing::{frame, record};
    use crate::types::Detection;

    #[test]
    fn test_majority_vote() {
        let policy = HelmetPolicy::new(HelmetConfig::default());
        let mut r = record("no_helmet", 1);
        let f = frame(1, 30.0);
        r.observe(&Detection::new([0.0; 4], 0.9, 1, "no_helmet"), &f);
        assert!(policy.evaluate(&r).violating);
        r.observe(&Detection::new([0.0; 4], 0.9, 0, "helmet"), &f);
        // Tie is not a violation
        assert!(!policy.evaluate(&r).violating);
    }

    #[test]
    fn test_labels() {
        let policy = HelmetPolicy::new(HelmetConfig::default());
        let r = record("no_helmet", 1);
        let v = Verdict::violating(None);
        assert_eq!(policy.label(&r, &v), "No_helmet #1 [Violator]");
        assert_eq!(policy.label(&r, &Verdict::clear()), "No_helmet #1");
        assert_eq!(policy.snapshot_label(&r, &v), "No_helmet");
    }
}
