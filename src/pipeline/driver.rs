// src/pipeline/driver.rs
//
// Single-source pipeline driver. Pulls frames from the source, runs the lane,
// broadcasts the lane's events and yields one multipart JPEG part per frame,
// paced to the source's nominal rate.

use super::metrics::PipelineMetrics;
use super::multipart::multipart_part;
use super::notifier::Notifier;
use super::pacer::{FramePacer, FALLBACK_FPS};
use super::processor::FrameProcessor;
use crate::render::{encode_jpeg, resize_to_max_width};
use crate::source::FrameSource;
use async_stream::stream;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Output frames wider than this are downscaled
    pub max_width: u32,
    pub jpeg_quality: u8,
    /// Pacing rate when the source does not report one
    pub fallback_fps: f64,
    /// Log a progress line every N frames (0 disables)
    pub progress_every: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            max_width: 640,
            jpeg_quality: 80,
            fallback_fps: FALLBACK_FPS,
            progress_every: 100,
        }
    }
}

// ============================================================================
// DRIVER
// ============================================================================

pub struct VideoPipeline {
    source: Box<dyn FrameSource>,
    processor: FrameProcessor,
    notifier: Notifier,
    stream: StreamConfig,
}

impl VideoPipeline {
    pub fn new(
        source: Box<dyn FrameSource>,
        processor: FrameProcessor,
        notifier: Notifier,
        stream: StreamConfig,
    ) -> Self {
        Self {
            source,
            processor,
            notifier,
            stream,
        }
    }

    /// Shares counters with the running stream.
    pub fn metrics(&self) -> PipelineMetrics {
        self.processor.metrics().clone()
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Multipart parts, one per source frame, in source order. Ends when the
    /// source is exhausted. Dropping the stream stops the pipeline.
    pub fn into_stream(self) -> BoxStream<'static, Vec<u8>> {
        let Self {
            mut source,
            mut processor,
            notifier,
            stream: cfg,
        } = self;
        let metrics = processor.metrics().clone();

        Box::pin(stream! {
            let mut pacer = FramePacer::new(source.fps(), cfg.fallback_fps);
            info!(
                "▶️  Stream started ({:.1} ms/frame, max width {})",
                pacer.interval().as_secs_f64() * 1000.0,
                cfg.max_width
            );

            loop {
                pacer.begin();

                let frame = match source.next_frame() {
                    Ok(Some(frame)) => frame,
                    Ok(None) => break,
                    Err(e) => {
                        warn!("Skipping unreadable frame: {:#}", e);
                        pacer.finish().await;
                        continue;
                    }
                };

                let ctx = processor.process(&frame);
                for event in ctx.events {
                    debug!("Frame {}: {}", ctx.frame_id, event.name());
                    notifier.broadcast(event);
                }

                let out = resize_to_max_width(&ctx.annotated, cfg.max_width);
                match encode_jpeg(&out, cfg.jpeg_quality) {
                    Ok(jpeg) => yield multipart_part(&jpeg),
                    Err(e) => {
                        warn!("Frame {} not streamed: {:#}", ctx.frame_id, e);
                        metrics.inc(&metrics.encode_failures);
                    }
                }

                let took = pacer.finish().await;
                metrics.set_timing(&metrics.frame_time_us, took.as_micros() as u64);

                if cfg.progress_every > 0 && (ctx.frame_id + 1) % cfg.progress_every == 0 {
                    info!(
                        "📊 Progress: frame {} | {:.1} FPS | {} objects",
                        ctx.frame_id + 1,
                        metrics.fps(),
                        processor.states().len()
                    );
                }
            }

            info!("⏹️  Stream finished");
        })
    }
}
