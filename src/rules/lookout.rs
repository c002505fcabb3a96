// src/rules/lookout.rs
//
// Vehicle and person finders. Each object is run through a recogniser; a
// recognised identity on the current lookout list is announced once per
// session, no matter how many tracks it shows up on or how many listed
// identities one track reads.

use super::{Rule, Snapshot, Verdict, ViolationPolicy};
use crate::detection::Recognizer;
use crate::events::{PersonDetectedPayload, ServerEvent, VehicleFoundPayload};
use crate::lookout::{normalize, LookoutStore};
use crate::state::TrackedObjectRecord;
use crate::types::{Detection, Frame};
use anyhow::Result;
use std::collections::{HashMap, HashSet};
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookoutKind {
    Vehicle,
    Person,
}

pub struct LookoutPolicy {
    kind: LookoutKind,
    recognizer: Box<dyn Recognizer>,
    store: LookoutStore,
    /// Person reference -> display name, keys normalised
    registry: HashMap<String, String>,
    watch: HashSet<String>,
    reported: HashSet<String>,
}

impl LookoutPolicy {
    pub fn vehicles(recognizer: Box<dyn Recognizer>, store: LookoutStore) -> Self {
        Self::new(LookoutKind::Vehicle, recognizer, store, HashMap::new())
    }

    pub fn persons(
        recognizer: Box<dyn Recognizer>,
        store: LookoutStore,
        registry: HashMap<String, String>,
    ) -> Self {
        Self::new(LookoutKind::Person, recognizer, store, registry)
    }

    fn new(
        kind: LookoutKind,
        recognizer: Box<dyn Recognizer>,
        store: LookoutStore,
        registry: HashMap<String, String>,
    ) -> Self {
        Self {
            kind,
            recognizer,
            store,
            registry: registry
                .into_iter()
                .map(|(k, v)| (normalize(&k), v))
                .collect(),
            watch: HashSet::new(),
            reported: HashSet::new(),
        }
    }

    fn person_name(&self, reference: &str) -> String {
        self.registry
            .get(reference)
            .cloned()
            .unwrap_or_else(|| reference.to_string())
    }

    fn on_list<'a>(&self, record: &'a TrackedObjectRecord) -> Option<&'a str> {
        record
            .identity
            .as_deref()
            .filter(|id| self.watch.contains(*id))
    }
}

impl ViolationPolicy for LookoutPolicy {
    fn rule(&self) -> Rule {
        match self.kind {
            LookoutKind::Vehicle => Rule::VehicleLookout,
            LookoutKind::Person => Rule::PersonLookout,
        }
    }

    fn history_capacity(&self, _fps: f64) -> usize {
        1
    }

    fn begin_frame(&mut self) {
        let data = self.store.snapshot();
        let list = match self.kind {
            LookoutKind::Vehicle => data.lookout_vehicles,
            LookoutKind::Person => data.lookout_persons,
        };
        self.watch = list.into_iter().collect();
    }

    fn observe(
        &mut self,
        frame: &Frame,
        det: &Detection,
        record: &mut TrackedObjectRecord,
    ) -> Result<()> {
        record.identity = self
            .recognizer
            .recognize(frame, det)?
            .map(|text| normalize(&text))
            .filter(|text| !text.is_empty());
        Ok(())
    }

    fn evaluate(&self, record: &TrackedObjectRecord) -> Verdict {
        match self.on_list(record) {
            Some(id) => Verdict {
                violating: !self.reported.contains(id),
                flagged: true,
                metric: None,
            },
            None => Verdict::clear(),
        }
    }

    fn reopens(&self, _record: &TrackedObjectRecord, verdict: &Verdict) -> bool {
        verdict.violating
    }

    fn open_event(
        &mut self,
        record: &mut TrackedObjectRecord,
        _verdict: &Verdict,
        snapshot: Snapshot,
    ) -> Option<ServerEvent> {
        let identity = record.identity.clone()?;
        self.reported.insert(identity.clone());
        info!("🔎 Lookout match {} on object #{}", identity, record.object_id);

        // Every further identity on an already reported track is its own report
        let id = if record.state.is_reported() {
            Uuid::new_v4().to_string()
        } else {
            record.external_id.clone()
        };

        Some(match self.kind {
            LookoutKind::Vehicle => ServerEvent::VehicleFound(VehicleFoundPayload {
                id,
                img_src: snapshot.img_src,
                plate_number: identity,
                detected_at: snapshot.detected_at,
                class_name: record.class_name.clone(),
            }),
            LookoutKind::Person => ServerEvent::PersonDetected(PersonDetectedPayload {
                id,
                person_name: self.person_name(&identity),
                person_ref: identity,
                img_src: snapshot.img_src,
                detected_at: snapshot.detected_at,
            }),
        })
    }

    fn label(&self, record: &TrackedObjectRecord, verdict: &Verdict) -> String {
        match &record.identity {
            None => format!("#{}", record.object_id),
            Some(id) if verdict.flagged => format!("#{} {} [Found]", record.object_id, id),
            Some(id) => format!("#{} {}", record.object_id, id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::notifier::Notifier;
    use crate::rules::testing::{frame, record};

    struct Fixed(Option<&'static str>);

    impl Recognizer for Fixed {
        fn recognize(&mut self, _frame: &Frame, _det: &Detection) -> Result<Option<String>> {
            Ok(self.0.map(String::from))
        }
    }

    fn snapshot() -> Snapshot {
        Snapshot {
            img_src: String::new(),
            detected_at: 0,
        }
    }

    #[test]
    fn test_vehicle_found_once_per_identity() {
        let store = LookoutStore::new(Notifier::new());
        store.add_vehicle("ABC123");
        let mut policy = LookoutPolicy::vehicles(Box::new(Fixed(Some("abc123"))), store);
        let det = Detection::new([0.0; 4], 0.9, 0, "car");
        let f = frame(0, 30.0);

        policy.begin_frame();
        let mut a = record("car", 1);
        policy.observe(&f, &det, &mut a).unwrap();
        let v = policy.evaluate(&a);
        assert!(v.violating && v.flagged);
        assert_eq!(policy.label(&a, &v), "#1 ABC123 [Found]");
        assert!(matches!(
            policy.open_event(&mut a, &v, snapshot()),
            Some(ServerEvent::VehicleFound(VehicleFoundPayload { ref plate_number, .. })) if plate_number == "ABC123"
        ));

        // Same plate on a different track: flagged but not reported again
        let mut b = record("car", 1);
        policy.observe(&f, &det, &mut b).unwrap();
        let v = policy.evaluate(&b);
        assert!(v.flagged && !v.violating);
    }

    #[test]
    fn test_list_change_visible_next_frame() {
        let store = LookoutStore::new(Notifier::new());
        let mut policy = LookoutPolicy::vehicles(Box::new(Fixed(Some("XYZ"))), store.clone());
        let det = Detection::new([0.0; 4], 0.9, 0, "car");
        let mut r = record("car", 1);

        policy.begin_frame();
        policy.observe(&frame(0, 30.0), &det, &mut r).unwrap();
        store.add_vehicle("xyz");
        assert!(!policy.evaluate(&r).flagged);

        policy.begin_frame();
        assert!(policy.evaluate(&r).violating);
    }

    #[test]
    fn test_person_name_from_registry() {
        let store = LookoutStore::new(Notifier::new());
        store.add_person("modi1.jpg");
        let registry = HashMap::from([("modi1.jpg".to_string(), "Narendra".to_string())]);
        let mut policy = LookoutPolicy::persons(Box::new(Fixed(Some("modi1.jpg"))), store, registry);
        let mut r = record("person", 1);
        policy.begin_frame();
        policy
            .observe(&frame(0, 30.0), &Detection::new([0.0; 4], 0.9, 0, "person"), &mut r)
            .unwrap();
        let v = policy.evaluate(&r);
        match policy.open_event(&mut r, &v, snapshot()) {
            Some(ServerEvent::PersonDetected(p)) => {
                assert_eq!(p.person_ref, "MODI1.JPG");
                assert_eq!(p.person_name, "Narendra");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_unrecognised_object_label() {
        let store = LookoutStore::new(Notifier::new());
        let mut policy = LookoutPolicy::vehicles(Box::new(Fixed(None)), store);
        let mut r = record("car", 1);
        policy
            .observe(&frame(0, 30.0), &Detection::new([0.0; 4], 0.9, 0, "car"), &mut r)
            .unwrap();
        assert_eq!(policy.label(&r, &policy.evaluate(&r)), "#1");
    }
}
