// src/pipeline/coordinator.rs
//
// Multi-source traffic control. Each source runs its own lane; every tick
// reads one frame per live source, broadcasts a `server:traffic-control`
// summary and streams all lanes composited onto one board.
//
// Sources are read round-robin in one task, so a slow detector stalls the
// whole tick.

use super::driver::StreamConfig;
use super::metrics::PipelineMetrics;
use super::multipart::multipart_part;
use super::notifier::Notifier;
use super::pacer::FramePacer;
use super::processor::FrameProcessor;
use crate::events::{ServerEvent, TrafficControlDetection, TrafficControlSource};
use crate::render::{encode_jpeg, resize_to_max_width, stamp};
use crate::source::FrameSource;
use crate::types::ObjectLabel;
use async_stream::stream;
use futures::stream::BoxStream;
use image::{imageops, RgbImage};
use tracing::{debug, info, warn};

pub const GRID_COLUMNS: u32 = 2;

/// One source and the lane that processes it.
pub struct Lane {
    video_id: String,
    source: Box<dyn FrameSource>,
    processor: FrameProcessor,
    /// Last annotated frame, shown frozen once the source is exhausted
    last_frame: Option<RgbImage>,
    finished: bool,
}

impl Lane {
    pub fn new(
        video_id: impl Into<String>,
        source: Box<dyn FrameSource>,
        processor: FrameProcessor,
    ) -> Self {
        Self {
            video_id: video_id.into(),
            source,
            processor,
            last_frame: None,
            finished: false,
        }
    }

    pub fn video_id(&self) -> &str {
        &self.video_id
    }

    /// Advance this lane by one frame. Returns its entry for the tick, or
    /// `None` when the lane was already finished.
    fn tick(&mut self, notifier: &Notifier) -> Option<TrafficControlSource> {
        if self.finished {
            return None;
        }

        let frame = match self.source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                info!("🏁 Source {} exhausted", self.video_id);
                self.finished = true;
                return Some(traffic_entry(&self.video_id, &[]));
            }
            Err(e) => {
                warn!("Source {}: skipping unreadable frame: {:#}", self.video_id, e);
                return Some(traffic_entry(&self.video_id, &[]));
            }
        };

        let ctx = self.processor.process(&frame);
        for event in ctx.events {
            notifier.broadcast(event);
        }
        let entry = traffic_entry(&self.video_id, &ctx.labels);

        let mut annotated = ctx.annotated;
        stamp(&mut annotated, &self.video_id);
        self.last_frame = Some(annotated);

        Some(entry)
    }
}

fn traffic_entry(video_id: &str, labels: &[ObjectLabel]) -> TrafficControlSource {
    TrafficControlSource {
        video_id: video_id.to_string(),
        detections: labels
            .iter()
            .map(|l| TrafficControlDetection {
                class_name: l.first_class.clone(),
                conf_score: l.confidence,
                elapsed_time: l.dwell_secs,
            })
            .collect(),
    }
}

pub struct Coordinator {
    lanes: Vec<Lane>,
    notifier: Notifier,
    stream: StreamConfig,
    metrics: PipelineMetrics,
}

impl Coordinator {
    pub fn new(lanes: Vec<Lane>, notifier: Notifier, stream: StreamConfig) -> Self {
        let metrics = PipelineMetrics::new();
        let lanes = lanes
            .into_iter()
            .map(|mut lane| {
                lane.processor = lane.processor.with_metrics(metrics.clone());
                lane
            })
            .collect();
        Self {
            lanes,
            notifier,
            stream,
            metrics,
        }
    }

    pub fn metrics(&self) -> PipelineMetrics {
        self.metrics.clone()
    }

    /// Fastest nominal rate among the sources.
    pub fn tick_fps(&self) -> Option<f64> {
        self.lanes
            .iter()
            .filter_map(|l| l.source.fps())
            .filter(|f| f.is_finite() && *f > 0.0)
            .fold(None, |best: Option<f64>, f| Some(best.map_or(f, |b| b.max(f))))
    }

    /// One board per tick. Ends after the tick in which the last source is
    /// exhausted.
    pub fn into_stream(self) -> BoxStream<'static, Vec<u8>> {
        let tick_fps = self.tick_fps();
        let Self {
            mut lanes,
            notifier,
            stream: cfg,
            metrics,
        } = self;

        Box::pin(stream! {
            let mut pacer = FramePacer::new(tick_fps, cfg.fallback_fps);
            info!(
                "🚦 Traffic control started: {} source(s), tick {:.1} ms",
                lanes.len(),
                pacer.interval().as_secs_f64() * 1000.0
            );
            let mut tick: u64 = 0;

            while lanes.iter().any(|l| !l.finished) {
                pacer.begin();
                tick += 1;

                let entries: Vec<TrafficControlSource> =
                    lanes.iter_mut().filter_map(|lane| lane.tick(&notifier)).collect();
                if !entries.is_empty() {
                    notifier.broadcast(ServerEvent::TrafficControl(entries));
                }

                let board = {
                    let cells: Vec<Option<&RgbImage>> =
                        lanes.iter().map(|l| l.last_frame.as_ref()).collect();
                    compose_grid(&cells, GRID_COLUMNS)
                };
                if let Some(board) = board {
                    let board = resize_to_max_width(&board, cfg.max_width);
                    match encode_jpeg(&board, cfg.jpeg_quality) {
                        Ok(jpeg) => yield multipart_part(&jpeg),
                        Err(e) => {
                            warn!("Tick {} not streamed: {:#}", tick, e);
                            metrics.inc(&metrics.encode_failures);
                        }
                    }
                }

                let took = pacer.finish().await;
                metrics.set_timing(&metrics.frame_time_us, took.as_micros() as u64);
                debug!("Tick {} took {:?}", tick, took);
            }

            info!("⏹️  All sources finished after {} tick(s)", tick);
        })
    }
}

/// Lay cells out row-major on a black board. Cell size comes from the first
/// available frame; frames of another size are resized to fit. Cells without
/// a frame stay black. `None` when no cell has a frame yet.
pub fn compose_grid(cells: &[Option<&RgbImage>], columns: u32) -> Option<RgbImage> {
    let first = cells.iter().flatten().next()?;
    let (cw, ch) = first.dimensions();
    let columns = columns.max(1);
    let rows = (cells.len() as u32).div_ceil(columns);

    let mut board = RgbImage::new(columns * cw, rows * ch);
    for (i, cell) in cells.iter().enumerate() {
        let Some(img) = cell else { continue };
        let x = (i as u32 % columns) * cw;
        let y = (i as u32 / columns) * ch;
        if img.dimensions() == (cw, ch) {
            imageops::replace(&mut board, *img, x as i64, y as i64);
        } else {
            let resized = imageops::resize(*img, cw, ch, imageops::FilterType::Triangle);
            imageops::replace(&mut board, &resized, x as i64, y as i64);
        }
    }
    Some(board)
}
