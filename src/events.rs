// src/events.rs
//
// Client-facing notifications. Serialised as `{"event": <name>, "data": ...}`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "server:no-helmet-violation")]
    NoHelmetViolation(ViolationPayload),
    #[serde(rename = "server:remove-no-helmet-violation")]
    RemoveNoHelmetViolation(RemovePayload),

    #[serde(rename = "server:overspeeding")]
    Overspeeding(OverspeedingPayload),
    #[serde(rename = "server:update-overspeeding")]
    UpdateOverspeeding(SpeedUpdatePayload),
    #[serde(rename = "server:remove-overspeeding")]
    RemoveOverspeeding(RemovePayload),

    #[serde(rename = "server:red-light-violation")]
    RedLightViolation(ViolationPayload),

    #[serde(rename = "server:pothole")]
    Pothole(PotholePayload),

    #[serde(rename = "server:wrong-way")]
    WrongWay(ViolationPayload),
    #[serde(rename = "server:remove-wrong-way")]
    RemoveWrongWay(RemovePayload),

    #[serde(rename = "server:vehicle-found")]
    VehicleFound(VehicleFoundPayload),
    #[serde(rename = "server:person_detected")]
    PersonDetected(PersonDetectedPayload),

    #[serde(rename = "server:traffic-control")]
    TrafficControl(Vec<TrafficControlSource>),

    #[serde(rename = "server:app-data")]
    AppData(AppData),
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::NoHelmetViolation(_) => "server:no-helmet-violation",
            Self::RemoveNoHelmetViolation(_) => "server:remove-no-helmet-violation",
            Self::Overspeeding(_) => "server:overspeeding",
            Self::UpdateOverspeeding(_) => "server:update-overspeeding",
            Self::RemoveOverspeeding(_) => "server:remove-overspeeding",
            Self::RedLightViolation(_) => "server:red-light-violation",
            Self::Pothole(_) => "server:pothole",
            Self::WrongWay(_) => "server:wrong-way",
            Self::RemoveWrongWay(_) => "server:remove-wrong-way",
            Self::VehicleFound(_) => "server:vehicle-found",
            Self::PersonDetected(_) => "server:person_detected",
            Self::TrafficControl(_) => "server:traffic-control",
            Self::AppData(_) => "server:app-data",
        }
    }

    /// The external id for per-object events.
    pub fn object_id(&self) -> Option<&str> {
        match self {
            Self::NoHelmetViolation(p) | Self::RedLightViolation(p) | Self::WrongWay(p) => {
                Some(&p.id)
            }
            Self::RemoveNoHelmetViolation(p)
            | Self::RemoveOverspeeding(p)
            | Self::RemoveWrongWay(p) => Some(&p.id),
            Self::Overspeeding(p) => Some(&p.id),
            Self::UpdateOverspeeding(p) => Some(&p.id),
            Self::Pothole(p) => Some(&p.id),
            Self::VehicleFound(p) => Some(&p.id),
            Self::PersonDetected(p) => Some(&p.id),
            Self::TrafficControl(_) | Self::AppData(_) => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

// ============================================================================
// PAYLOADS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViolationPayload {
    pub id: String,
    pub img_src: String,
    pub class_name: String,
    pub detected_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemovePayload {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverspeedingPayload {
    pub id: String,
    pub img_src: String,
    /// Whole km/h
    pub highest_speed: i64,
    pub detected_at: i64,
    pub class_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeedUpdatePayload {
    pub id: String,
    pub highest_speed: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub long: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PotholePayload {
    pub id: String,
    pub img_src: String,
    pub class_name: String,
    pub detected_at: i64,
    pub coordinate: Coordinate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleFoundPayload {
    pub id: String,
    pub img_src: String,
    pub plate_number: String,
    pub detected_at: i64,
    pub class_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonDetectedPayload {
    pub id: String,
    pub person_ref: String,
    pub person_name: String,
    pub img_src: String,
    pub detected_at: i64,
}

/// One source's contribution to a traffic-control tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficControlSource {
    pub video_id: String,
    pub detections: Vec<TrafficControlDetection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrafficControlDetection {
    pub class_name: String,
    pub conf_score: f32,
    pub elapsed_time: u64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppData {
    pub lookout_vehicles: Vec<String>,
    pub lookout_persons: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_shape() {
        let ev = ServerEvent::Overspeeding(OverspeedingPayload {
            id: "abc".into(),
            img_src: "data".into(),
            highest_speed: 72,
            detected_at: 1000,
            class_name: "car".into(),
        });
        let v: serde_json::Value = serde_json::from_str(&ev.to_json().unwrap()).unwrap();
        assert_eq!(
            v,
            json!({
                "event": "server:overspeeding",
                "data": {
                    "id": "abc",
                    "imgSrc": "data",
                    "highestSpeed": 72,
                    "detectedAt": 1000,
                    "className": "car"
                }
            })
        );
        assert_eq!(v["event"], ev.name());
        assert!(v["data"]["highestSpeed"].is_i64());
        assert!(!ev.to_json().unwrap().contains("72.0"));
    }

    #[test]
    fn test_traffic_control_keeps_video_id() {
        let ev = ServerEvent::TrafficControl(vec![TrafficControlSource {
            video_id: "cam1".into(),
            detections: vec![TrafficControlDetection {
                class_name: "car".into(),
                conf_score: 0.5,
                elapsed_time: 3,
            }],
        }]);
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["data"][0]["video_id"], "cam1");
        assert_eq!(v["data"][0]["detections"][0]["elapsedTime"], 3);
        assert_eq!(v["data"][0]["detections"][0]["confScore"], 0.5);
        assert!(ev.object_id().is_none());
    }

    #[test]
    fn test_app_data_shape() {
        let ev = ServerEvent::AppData(AppData {
            lookout_vehicles: vec!["ABC123".into()],
            lookout_persons: vec![],
        });
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["event"], "server:app-data");
        assert_eq!(v["data"]["lookoutVehicles"][0], "ABC123");
        assert!(v["data"]["lookoutPersons"].as_array().unwrap().is_empty());
    }
}
