// src/rules/dwell.rs
//
// Traffic-control counting: nothing is ever a violation, objects are only
// labelled with how long they have been in view.

use super::{Rule, Snapshot, Verdict, ViolationPolicy};
use crate::events::ServerEvent;
use crate::state::TrackedObjectRecord;

#[derive(Default)]
pub struct DwellPolicy;

impl ViolationPolicy for DwellPolicy {
    fn rule(&self) -> Rule {
        Rule::Dwell
    }

    fn history_capacity(&self, _fps: f64) -> usize {
        1
    }

    fn evaluate(&self, record: &TrackedObjectRecord) -> Verdict {
        Verdict {
            metric: Some(record.dwell_secs() as f64),
            ..Verdict::clear()
        }
    }

    fn open_event(
        &mut self,
        _record: &mut TrackedObjectRecord,
        _verdict: &Verdict,
        _snapshot: Snapshot,
    ) -> Option<ServerEvent> {
        None
    }

    fn label(&self, record: &TrackedObjectRecord, _verdict: &Verdict) -> String {
        format!("#{} ({}s)", record.object_id, record.dwell_secs())
    }
}
