// src/pipeline/builder.rs
//
// Turns the configuration for one model into a runnable pipeline: a single
// lane driver, or the multi-source coordinator for traffic control.
// Geometry is validated before any source is opened.

use super::coordinator::{Coordinator, Lane};
use super::driver::VideoPipeline;
use super::metrics::PipelineMetrics;
use super::processor::FrameProcessor;
use crate::config::{ActiveModel, Config, SourceConfig};
use crate::detection::{DetectionFilter, FilterConfig, ReplayDetector, ReplayLog, ReplayRecognizer};
use crate::error::RoadwatchError;
use crate::geometry::{PolygonZone, ViewTransformer};
use crate::lookout::LookoutStore;
use crate::render::{BoxRenderer, FrameRenderer};
use crate::rules::{
    DwellPolicy, HelmetPolicy, LookoutPolicy, PotholePolicy, RedLightPolicy, SpeedPolicy,
    ViolationPolicy, WrongWayPolicy,
};
use crate::source::{FrameSource, ImageSequenceSource};
use crate::state::{ObjectStateTracker, StateTrackerConfig};
use crate::tracking::IouTracker;
use crate::types::Anchor;
use anyhow::{Context, Result};
use futures::stream::BoxStream;
use std::sync::Arc;
use tracing::info;

/// A configured pipeline, ready to stream.
pub enum Runner {
    Single(VideoPipeline),
    Multi(Coordinator),
}

impl Runner {
    pub fn metrics(&self) -> PipelineMetrics {
        match self {
            Self::Single(p) => p.metrics(),
            Self::Multi(c) => c.metrics(),
        }
    }

    pub fn into_stream(self) -> BoxStream<'static, Vec<u8>> {
        match self {
            Self::Single(p) => p.into_stream(),
            Self::Multi(c) => c.into_stream(),
        }
    }
}

#[derive(Default)]
struct LaneGeometry {
    /// Drops detections before tracking
    region: Option<PolygonZone>,
    /// Feeds the zone flags of each record
    zone: Option<PolygonZone>,
    transform: Option<ViewTransformer>,
}

pub struct PipelineBuilder<'a> {
    config: &'a Config,
    store: LookoutStore,
    renderer: Arc<dyn FrameRenderer>,
}

impl<'a> PipelineBuilder<'a> {
    pub fn new(config: &'a Config, store: LookoutStore) -> Self {
        let renderer: Arc<dyn FrameRenderer> = Arc::new(BoxRenderer::new(
            config.stream.max_width,
            config.stream.jpeg_quality,
        ));
        Self {
            config,
            store,
            renderer,
        }
    }

    pub fn build(&self, model: ActiveModel) -> Result<Runner> {
        info!("🔧 Building {} pipeline", model);
        self.config.state.validate()?;
        let models = &self.config.models;

        match model {
            ActiveModel::RedLightPassing => {
                let m = &models.red_light_passing;
                let geometry = LaneGeometry {
                    region: region_of(&m.source)?,
                    zone: Some(
                        PolygonZone::from_coords(&m.safe_zone, Anchor::Center)
                            .context("Invalid red-light safe zone")?,
                    ),
                    transform: None,
                };
                self.single(&m.source, &m.filter, geometry, |_| {
                    Ok(Box::new(RedLightPolicy::new()))
                })
            }

            ActiveModel::Overspeeding => {
                let m = &models.overspeeding;
                let transform =
                    ViewTransformer::from_coords(&m.road_polygon, m.speed.road_width, m.speed.road_height)
                        .context("Invalid overspeeding road polygon")?;
                // Every vehicle is measured, the road polygon only calibrates
                let geometry = LaneGeometry {
                    region: region_of(&m.source)?,
                    zone: None,
                    transform: Some(transform),
                };
                self.single(&m.source, &m.filter, geometry, |_| {
                    Ok(Box::new(SpeedPolicy::new(m.speed.clone(), m.source.fps)))
                })
            }

            ActiveModel::WrongWay => {
                let m = &models.wrong_way;
                let geometry = road_geometry(
                    &m.road_polygon,
                    m.wrong_way.road_width,
                    m.wrong_way.road_height,
                )
                .context("Invalid wrong-way road polygon")?;
                self.single(&m.source, &m.filter, geometry, |_| {
                    Ok(Box::new(WrongWayPolicy::new(m.wrong_way.clone(), m.source.fps)))
                })
            }

            ActiveModel::NoHelmet => {
                let m = &models.no_helmet;
                let geometry = LaneGeometry {
                    region: region_of(&m.source)?,
                    ..Default::default()
                };
                self.single(&m.source, &m.filter, geometry, |_| {
                    Ok(Box::new(HelmetPolicy::new(m.helmet.clone())))
                })
            }

            ActiveModel::Pothole => {
                let m = &models.pothole;
                let geometry = LaneGeometry {
                    region: region_of(&m.source)?,
                    ..Default::default()
                };
                self.single(&m.source, &m.filter, geometry, |_| {
                    Ok(Box::new(PotholePolicy::new(m.pothole.clone())))
                })
            }

            ActiveModel::VehicleFinder | ActiveModel::PersonDetector => {
                let m = if model == ActiveModel::VehicleFinder {
                    &models.vehicle_finder
                } else {
                    &models.person_detector
                };
                let geometry = LaneGeometry {
                    region: region_of(&m.source)?,
                    ..Default::default()
                };
                self.single(&m.source, &m.filter, geometry, |log| {
                    let recognitions = match &m.recognitions {
                        Some(path) => Arc::new(ReplayLog::load(path)?),
                        None => Arc::clone(log),
                    };
                    let recognizer = Box::new(ReplayRecognizer::new(recognitions));
                    let store = self.store.clone();
                    let policy: Box<dyn ViolationPolicy> = if model == ActiveModel::VehicleFinder {
                        Box::new(LookoutPolicy::vehicles(recognizer, store))
                    } else {
                        Box::new(LookoutPolicy::persons(
                            recognizer,
                            store,
                            self.config.lookout.person_registry.clone(),
                        ))
                    };
                    Ok(policy)
                })
            }

            ActiveModel::TrafficControl => self.traffic_control(),
        }
    }

    fn single<F>(
        &self,
        source: &SourceConfig,
        filter: &FilterConfig,
        geometry: LaneGeometry,
        make_policy: F,
    ) -> Result<Runner>
    where
        F: FnOnce(&Arc<ReplayLog>) -> Result<Box<dyn ViolationPolicy>>,
    {
        let log = Arc::new(ReplayLog::load(&source.detections)?);
        let policy = make_policy(&log)?;
        let frames = open_frames(source)?;
        let processor = self.processor(source, filter, geometry, log, policy);
        Ok(Runner::Single(VideoPipeline::new(
            frames,
            processor,
            self.store.notifier().clone(),
            self.config.stream.clone(),
        )))
    }

    fn traffic_control(&self) -> Result<Runner> {
        let m = &self.config.models.traffic_control;
        if m.sources.is_empty() {
            return Err(RoadwatchError::config("traffic control needs at least one source").into());
        }

        let mut geometries = Vec::with_capacity(m.sources.len());
        for source in &m.sources {
            let region = region_of(source)?.ok_or_else(|| {
                RoadwatchError::config(format!(
                    "traffic-control source '{}' has no region_polygon",
                    source.video_id
                ))
            })?;
            geometries.push(LaneGeometry {
                region: Some(region),
                ..Default::default()
            });
        }

        let mut lanes = Vec::with_capacity(m.sources.len());
        for (source, geometry) in m.sources.iter().zip(geometries) {
            let log = Arc::new(ReplayLog::load(&source.detections)?);
            let frames = open_frames(source)?;
            let processor =
                self.processor(source, &m.filter, geometry, log, Box::new(DwellPolicy));
            lanes.push(Lane::new(source.video_id.clone(), frames, processor));
        }

        Ok(Runner::Multi(Coordinator::new(
            lanes,
            self.store.notifier().clone(),
            self.config.stream.clone(),
        )))
    }

    fn processor(
        &self,
        source: &SourceConfig,
        filter: &FilterConfig,
        geometry: LaneGeometry,
        log: Arc<ReplayLog>,
        policy: Box<dyn ViolationPolicy>,
    ) -> FrameProcessor {
        let states = ObjectStateTracker::new(
            StateTrackerConfig {
                fps: source.fps,
                transform: geometry.transform,
                zone: geometry.zone,
                position_anchor: Anchor::BottomCenter,
                max_idle_frames: self.config.state.max_idle_frames,
                max_pending_events: self.config.state.max_pending_events,
            },
            policy,
            Arc::clone(&self.renderer),
        );
        FrameProcessor::new(
            Box::new(ReplayDetector::new(log, source.labels.clone())),
            DetectionFilter::new(filter.clone()),
            geometry.region,
            Box::new(IouTracker::new(self.config.tracker.clone())),
            states,
            Arc::clone(&self.renderer),
        )
    }
}

fn region_of(source: &SourceConfig) -> Result<Option<PolygonZone>> {
    source
        .region_polygon
        .as_deref()
        .map(|coords| {
            PolygonZone::from_coords(coords, Anchor::BottomCenter).with_context(|| {
                format!("Invalid region polygon for source '{}'", source.video_id)
            })
        })
        .transpose()
}

/// Road polygon used both as the region filter and as the homography source.
/// Vehicles off the road never reach the tracker.
fn road_geometry(road: &[[f32; 2]], width: f32, height: f32) -> Result<LaneGeometry> {
    Ok(LaneGeometry {
        region: Some(PolygonZone::from_coords(road, Anchor::BottomCenter)?),
        zone: None,
        transform: Some(ViewTransformer::from_coords(road, width, height)?),
    })
}

fn open_frames(source: &SourceConfig) -> Result<Box<dyn FrameSource>> {
    let frames = ImageSequenceSource::open(&source.frames_dir, source.fps)
        .with_context(|| format!("Cannot open source '{}'", source.video_id))?;
    Ok(Box::new(frames))
}
