// src/source.rs
//
// Frame sources. A source yields frames in order at a nominal rate and
// returns `Ok(None)` once exhausted.

use crate::error::{Result as RwResult, RoadwatchError};
use crate::types::Frame;
use anyhow::{Context, Result};
use image::RgbImage;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

const FRAME_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

pub trait FrameSource: Send {
    /// Nominal frame rate, if the source knows it.
    fn fps(&self) -> Option<f64>;

    /// Next frame, `Ok(None)` when exhausted. An error affects only the
    /// frame being read.
    fn next_frame(&mut self) -> Result<Option<Frame>>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn fps(&self) -> Option<f64> {
        (**self).fps()
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        (**self).next_frame()
    }
}

fn timestamp_ms(index: u64, fps: f64) -> f64 {
    if fps > 0.0 {
        index as f64 / fps * 1000.0
    } else {
        0.0
    }
}

// ============================================================================
// IMAGE SEQUENCE
// ============================================================================

/// A directory of still frames, played in file-name order.
pub struct ImageSequenceSource {
    paths: Vec<PathBuf>,
    cursor: usize,
    fps: f64,
}

impl ImageSequenceSource {
    pub fn open<P: AsRef<Path>>(dir: P, fps: f64) -> RwResult<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(RoadwatchError::source(format!(
                "frame directory {} does not exist",
                dir.display()
            )));
        }
        if !(fps > 0.0) {
            return Err(RoadwatchError::config(format!("invalid fps {}", fps)));
        }

        let mut paths: Vec<PathBuf> = WalkDir::new(dir)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| {
                p.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| FRAME_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .collect();
        paths.sort();

        if paths.is_empty() {
            warn!("No frames found in {}", dir.display());
        } else {
            info!(
                "Frame source {}: {} frames @ {:.1} FPS",
                dir.display(),
                paths.len(),
                fps
            );
        }

        Ok(Self {
            paths,
            cursor: 0,
            fps,
        })
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl FrameSource for ImageSequenceSource {
    fn fps(&self) -> Option<f64> {
        Some(self.fps)
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let Some(path) = self.paths.get(self.cursor) else {
            return Ok(None);
        };
        let index = self.cursor as u64;
        self.cursor += 1;

        let image = image::open(path)
            .with_context(|| format!("Failed to decode frame {}", path.display()))?
            .to_rgb8();
        Ok(Some(Frame::new(index, timestamp_ms(index, self.fps), image)))
    }
}

// ============================================================================
// IN MEMORY
// ============================================================================

pub struct MemorySource {
    frames: VecDeque<RgbImage>,
    next_index: u64,
    fps: Option<f64>,
}

impl MemorySource {
    pub fn new(frames: Vec<RgbImage>, fps: Option<f64>) -> Self {
        Self {
            frames: frames.into(),
            next_index: 0,
            fps,
        }
    }

    /// `count` black frames of the given size.
    pub fn blank(count: usize, width: u32, height: u32, fps: Option<f64>) -> Self {
        Self::new(vec![RgbImage::new(width, height); count], fps)
    }
}

impl FrameSource for MemorySource {
    fn fps(&self) -> Option<f64> {
        self.fps
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let Some(image) = self.frames.pop_front() else {
            return Ok(None);
        };
        let index = self.next_index;
        self.next_index += 1;
        let ts = timestamp_ms(index, self.fps.unwrap_or(0.0));
        Ok(Some(Frame::new(index, ts, image)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn scratch_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("roadwatch-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_memory_source_indices_and_exhaustion() {
        let mut src = MemorySource::blank(2, 4, 4, Some(10.0));
        let a = src.next_frame().unwrap().unwrap();
        let b = src.next_frame().unwrap().unwrap();
        assert_eq!((a.index, b.index), (0, 1));
        assert_eq!(b.timestamp_ms, 100.0);
        assert!(src.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_image_sequence_sorted_by_name() {
        let dir = scratch_dir();
        RgbImage::from_pixel(4, 4, Rgb([200, 0, 0]))
            .save(dir.join("frame_002.png"))
            .unwrap();
        RgbImage::from_pixel(4, 4, Rgb([0, 200, 0]))
            .save(dir.join("frame_001.png"))
            .unwrap();
        std::fs::write(dir.join("notes.txt"), "ignored").unwrap();

        let mut src = ImageSequenceSource::open(&dir, 25.0).unwrap();
        assert_eq!(src.len(), 2);
        let first = src.next_frame().unwrap().unwrap();
        assert_eq!(*first.image.get_pixel(0, 0), Rgb([0, 200, 0]));
        let second = src.next_frame().unwrap().unwrap();
        assert_eq!(second.timestamp_ms, 40.0);
        assert!(src.next_frame().unwrap().is_none());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_missing_directory_is_error() {
        assert!(ImageSequenceSource::open("/nonexistent/frames", 30.0).is_err());
    }
}
