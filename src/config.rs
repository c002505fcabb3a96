// src/config.rs
//
// YAML configuration. Every section has defaults, so an empty file (or no
// file at all) runs the stock red-light setup.

use crate::detection::FilterConfig;
use crate::error::RoadwatchError;
use crate::events::AppData;
use crate::pipeline::StreamConfig;
use crate::rules::{HelmetConfig, PotholeConfig, SpeedConfig, WrongWayConfig};
use crate::tracking::TrackerConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Leading COCO class names, enough for the vehicle models.
pub const COCO_LABELS: [&str; 8] = [
    "person",
    "bicycle",
    "car",
    "motorcycle",
    "airplane",
    "bus",
    "train",
    "truck",
];

const VEHICLE_CLASSES: [&str; 4] = ["car", "truck", "bus", "motorcycle"];

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn vehicle_filter(confidence_threshold: f32) -> FilterConfig {
    FilterConfig {
        confidence_threshold,
        iou_threshold: Some(0.7),
        class_names: Some(strings(&VEHICLE_CLASSES)),
    }
}

// ============================================================================
// TOP LEVEL
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub active_model: ActiveModel,
    pub logging: LoggingConfig,
    pub stream: StreamConfig,
    pub tracker: TrackerConfig,
    pub state: StateSettings,
    pub lookout: LookoutConfig,
    pub models: ModelsConfig,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActiveModel {
    #[default]
    RedLightPassing,
    TrafficControl,
    NoHelmet,
    Overspeeding,
    Pothole,
    WrongWay,
    VehicleFinder,
    PersonDetector,
}

impl ActiveModel {
    pub const ALL: [ActiveModel; 8] = [
        Self::TrafficControl,
        Self::RedLightPassing,
        Self::Overspeeding,
        Self::WrongWay,
        Self::NoHelmet,
        Self::Pothole,
        Self::VehicleFinder,
        Self::PersonDetector,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RedLightPassing => "redLightPassing",
            Self::TrafficControl => "trafficControl",
            Self::NoHelmet => "noHelmet",
            Self::Overspeeding => "overspeeding",
            Self::Pothole => "pothole",
            Self::WrongWay => "wrongWay",
            Self::VehicleFinder => "vehicleFinder",
            Self::PersonDetector => "personDetector",
        }
    }
}

impl fmt::Display for ActiveModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActiveModel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| {
                let names: Vec<&str> = Self::ALL.iter().map(|m| m.as_str()).collect();
                format!("unknown model '{}' (expected one of: {})", s, names.join(" | "))
            })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl LoggingConfig {
    /// Filter directive for the crate at the configured level.
    pub fn directive(&self) -> String {
        format!("roadwatch={}", self.level)
    }
}

/// Smallest accepted outbox. The outbox is drained after every frame and
/// drops its oldest event when full, so it must hold a whole frame's events.
pub const MIN_PENDING_EVENTS: usize = 64;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StateSettings {
    /// Forget objects not seen for this many frames; unset keeps them all
    pub max_idle_frames: Option<u64>,
    /// Events one frame may queue; at least `MIN_PENDING_EVENTS`
    pub max_pending_events: usize,
}

impl Default for StateSettings {
    fn default() -> Self {
        Self {
            max_idle_frames: None,
            max_pending_events: 256,
        }
    }
}

impl StateSettings {
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.max_pending_events < MIN_PENDING_EVENTS {
            return Err(RoadwatchError::config(format!(
                "state.max_pending_events must be at least {} (got {})",
                MIN_PENDING_EVENTS, self.max_pending_events
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LookoutConfig {
    /// Plates to watch for at startup
    pub vehicles: Vec<String>,
    /// Person references to watch for at startup
    pub persons: Vec<String>,
    /// Person reference -> display name
    pub person_registry: HashMap<String, String>,
}

impl LookoutConfig {
    pub fn seed(&self) -> AppData {
        AppData {
            lookout_vehicles: self.vehicles.clone(),
            lookout_persons: self.persons.clone(),
        }
    }
}

// ============================================================================
// SOURCES
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Shown on the stream and used in traffic-control events
    pub video_id: String,
    /// Directory of still frames, played in file-name order
    pub frames_dir: PathBuf,
    /// Recorded detections for the frames (JSON)
    pub detections: PathBuf,
    pub fps: f64,
    /// Class id -> class name for the recorded detections
    pub labels: Vec<String>,
    /// Only detections anchored inside this polygon are tracked
    pub region_polygon: Option<Vec<[f32; 2]>>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self::named("main", "video")
    }
}

impl SourceConfig {
    /// `assets/<name>/` frames with `assets/<name>.json` detections.
    pub fn named(video_id: &str, name: &str) -> Self {
        Self {
            video_id: video_id.to_string(),
            frames_dir: PathBuf::from(format!("assets/{}", name)),
            detections: PathBuf::from(format!("assets/{}.json", name)),
            fps: 30.0,
            labels: strings(&COCO_LABELS),
            region_polygon: None,
        }
    }

    fn with_labels(mut self, labels: &[&str]) -> Self {
        self.labels = strings(labels);
        self
    }

    fn with_region(mut self, polygon: Vec<[f32; 2]>) -> Self {
        self.region_polygon = Some(polygon);
        self
    }
}

// ============================================================================
// MODELS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    pub red_light_passing: RedLightModel,
    pub traffic_control: TrafficControlModel,
    pub no_helmet: HelmetModel,
    pub overspeeding: OverspeedingModel,
    pub pothole: PotholeModel,
    pub wrong_way: WrongWayModel,
    pub vehicle_finder: LookoutModel,
    pub person_detector: LookoutModel,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            red_light_passing: RedLightModel::default(),
            traffic_control: TrafficControlModel::default(),
            no_helmet: HelmetModel::default(),
            overspeeding: OverspeedingModel::default(),
            pothole: PotholeModel::default(),
            wrong_way: WrongWayModel::default(),
            vehicle_finder: LookoutModel::default(),
            person_detector: LookoutModel::persons(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedLightModel {
    pub source: SourceConfig,
    pub filter: FilterConfig,
    /// Vehicles that leave this polygon after being inside it crossed the line
    pub safe_zone: Vec<[f32; 2]>,
}

impl Default for RedLightModel {
    fn default() -> Self {
        Self {
            source: SourceConfig::named("main", "red-light-violation-1"),
            filter: vehicle_filter(0.2),
            safe_zone: vec![[0.0, 1441.0], [4000.0, 1383.0], [4000.0, 3000.0], [0.0, 3000.0]],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrafficControlModel {
    /// Every source needs a region polygon
    pub sources: Vec<SourceConfig>,
    pub filter: FilterConfig,
}

impl Default for TrafficControlModel {
    fn default() -> Self {
        Self {
            sources: vec![
                SourceConfig::named("Left", "traffic-video-1").with_region(vec![
                    [616.0, 200.0],
                    [812.0, 200.0],
                    [1451.0, 720.0],
                    [329.0, 720.0],
                ]),
                SourceConfig::named("Top", "traffic-video-2").with_region(vec![
                    [462.0, 152.0],
                    [738.0, 152.0],
                    [1280.0, 720.0],
                    [101.0, 720.0],
                ]),
                SourceConfig::named("Right", "traffic-video-3").with_region(vec![
                    [296.0, 129.0],
                    [583.0, 124.0],
                    [1393.0, 720.0],
                    [51.0, 720.0],
                ]),
                SourceConfig::named("Bottom", "traffic-video-4").with_region(vec![
                    [487.0, 136.0],
                    [753.0, 132.0],
                    [1089.0, 720.0],
                    [0.0, 720.0],
                ]),
            ],
            filter: vehicle_filter(0.3),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HelmetModel {
    pub source: SourceConfig,
    pub filter: FilterConfig,
    pub helmet: HelmetConfig,
}

impl Default for HelmetModel {
    fn default() -> Self {
        Self {
            source: SourceConfig::named("main", "helmet-video-1")
                .with_labels(&["helmet", "no_helmet"]),
            filter: FilterConfig {
                confidence_threshold: 0.3,
                ..Default::default()
            },
            helmet: HelmetConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OverspeedingModel {
    pub source: SourceConfig,
    pub filter: FilterConfig,
    /// Road corners TL, TR, BR, BL in image coordinates
    pub road_polygon: Vec<[f32; 2]>,
    pub speed: SpeedConfig,
}

impl Default for OverspeedingModel {
    fn default() -> Self {
        Self {
            source: SourceConfig::named("main", "overspeeding-1"),
            filter: vehicle_filter(0.2),
            road_polygon: vec![[1252.0, 787.0], [2298.0, 803.0], [5039.0, 2159.0], [-550.0, 2159.0]],
            speed: SpeedConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PotholeModel {
    pub source: SourceConfig,
    pub filter: FilterConfig,
    pub pothole: PotholeConfig,
}

impl Default for PotholeModel {
    fn default() -> Self {
        Self {
            source: SourceConfig::named("main", "pothole-video-1").with_labels(&["Pothole"]),
            filter: FilterConfig {
                confidence_threshold: 0.1,
                iou_threshold: Some(0.7),
                class_names: Some(strings(&["Pothole"])),
            },
            pothole: PotholeConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WrongWayModel {
    pub source: SourceConfig,
    pub filter: FilterConfig,
    /// Road corners TL, TR, BR, BL in image coordinates
    pub road_polygon: Vec<[f32; 2]>,
    pub wrong_way: WrongWayConfig,
}

impl Default for WrongWayModel {
    fn default() -> Self {
        Self {
            source: SourceConfig::named("main", "wrong-way-driving-1"),
            filter: FilterConfig {
                confidence_threshold: 0.2,
                iou_threshold: Some(0.7),
                class_names: Some(strings(&["car", "truck", "bus", "motorcycle", "person"])),
            },
            road_polygon: vec![[565.0, 356.0], [774.0, 355.0], [977.0, 720.0], [335.0, 720.0]],
            wrong_way: WrongWayConfig::default(),
        }
    }
}

/// Vehicle finder and person detector.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LookoutModel {
    pub source: SourceConfig,
    pub filter: FilterConfig,
    /// Recorded plate/face texts; the detection log is used when unset
    pub recognitions: Option<PathBuf>,
}

impl Default for LookoutModel {
    fn default() -> Self {
        Self {
            source: SourceConfig::named("main", "vehicle-finder-2"),
            filter: vehicle_filter(0.2),
            recognitions: None,
        }
    }
}

impl LookoutModel {
    pub fn persons() -> Self {
        Self {
            source: SourceConfig::named("main", "person-detector-1"),
            filter: FilterConfig {
                confidence_threshold: 0.3,
                iou_threshold: Some(0.7),
                class_names: Some(strings(&["person"])),
            },
            recognitions: None,
        }
    }
}
