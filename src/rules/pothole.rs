// src/rules/pothole.rs
//
// Potholes are reported once per tracked object, tagged with a coordinate
// from the survey list.

use super::{Rule, Snapshot, Verdict, ViolationPolicy};
use crate::events::{Coordinate, PotholePayload, ServerEvent};
use crate::state::TrackedObjectRecord;
use crate::types::capitalize;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PotholeConfig {
    /// `[lat, long]` pairs handed out in rotation
    pub coordinates: Vec<[f64; 2]>,
}

pub struct PotholePolicy {
    coordinates: Vec<[f64; 2]>,
    total: usize,
}

impl PotholePolicy {
    pub fn new(config: PotholeConfig) -> Self {
        Self {
            coordinates: config.coordinates,
            total: 0,
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    fn next_coordinate(&mut self) -> Coordinate {
        self.total += 1;
        if self.coordinates.is_empty() {
            return Coordinate::default();
        }
        let [lat, long] = self.coordinates[self.total % self.coordinates.len()];
        Coordinate { lat, long }
    }
}

impl ViolationPolicy for PotholePolicy {
    fn rule(&self) -> Rule {
        Rule::Pothole
    }

    fn history_capacity(&self, _fps: f64) -> usize {
        1
    }

    fn evaluate(&self, _record: &TrackedObjectRecord) -> Verdict {
        Verdict::violating(None)
    }

    fn open_event(
        &mut self,
        record: &mut TrackedObjectRecord,
        _verdict: &Verdict,
        snapshot: Snapshot,
    ) -> Option<ServerEvent> {
        let coordinate = self.next_coordinate();
        debug!(
            "Pothole #{} at ({:.5}, {:.5})",
            record.object_id, coordinate.lat, coordinate.long
        );
        Some(ServerEvent::Pothole(PotholePayload {
            id: record.external_id.clone(),
            img_src: snapshot.img_src,
            class_name: record.class_name.clone(),
            detected_at: snapshot.detected_at,
            coordinate,
        }))
    }

    fn label(&self, record: &TrackedObjectRecord, _verdict: &Verdict) -> String {
        format!("{} #{}", capitalize(&record.class_name), record.object_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::testing::record;

    fn snapshot() -> Snapshot {
        Snapshot {
            img_src: String::new(),
            detected_at: 0,
        }
    }

    #[test]
    fn test_coordinates_cycle_after_increment() {
        let mut policy = PotholePolicy::new(PotholeConfig {
            coordinates: vec![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]],
        });
        let mut r = record("pothole", 1);
        let v = Verdict::violating(None);
        let coords: Vec<Coordinate> = (0..4)
            .filter_map(|_| match policy.open_event(&mut r, &v, snapshot()) {
                Some(ServerEvent::Pothole(p)) => Some(p.coordinate),
                _ => None,
            })
            .collect();
        assert_eq!(coords[0], Coordinate { lat: 3.0, long: 4.0 });
        assert_eq!(coords[1], Coordinate { lat: 5.0, long: 6.0 });
        assert_eq!(coords[2], Coordinate { lat: 1.0, long: 2.0 });
        assert_eq!(coords[3], Coordinate { lat: 3.0, long: 4.0 });
        assert_eq!(policy.total(), 4);
    }

    #[test]
    fn test_empty_survey_list() {
        let mut policy = PotholePolicy::new(PotholeConfig::default());
        let mut r = record("pothole", 1);
        match policy.open_event(&mut r, &Verdict::violating(None), snapshot()) {
            Some(ServerEvent::Pothole(p)) => assert_eq!(p.coordinate, Coordinate::default()),
            other => panic!("unexpected {:?}", other),
        }
    }
}
