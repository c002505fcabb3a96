// src/types.rs
//
// Shared value types passed between pipeline stages.

use image::RgbImage;
use serde::{Deserialize, Serialize};

/// Session-scoped identifier handed out by the tracker collaborator.
///
/// Unique only within one tracker session. The tracker may drop an identifier
/// and later reissue a new one for the same physical object, which shows up
/// downstream as a second record (and potentially a second event). That is a
/// known limitation of the tracking boundary and is not papered over here.
pub type TrackId = u32;

/// Image-plane or transformed-plane coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

impl From<[f32; 2]> for Point {
    fn from(p: [f32; 2]) -> Self {
        Self { x: p[0], y: p[1] }
    }
}

/// Which point of a bounding box stands in for the whole object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Anchor {
    Center,
    #[default]
    BottomCenter,
}

/// A decoded frame with its position in the source sequence.
#[derive(Debug, Clone)]
pub struct Frame {
    pub index: u64,
    /// Stream time of this frame (index / nominal fps), not wall clock.
    pub timestamp_ms: f64,
    pub image: RgbImage,
}

impl Frame {
    pub fn new(index: u64, timestamp_ms: f64, image: RgbImage) -> Self {
        Self {
            index,
            timestamp_ms,
            image,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub bbox: [f32; 4], // [x1, y1, x2, y2] in frame pixel coordinates
    pub confidence: f32,
    pub class_id: usize,
    pub class_name: String,
}

impl Detection {
    pub fn new(bbox: [f32; 4], confidence: f32, class_id: usize, class_name: &str) -> Self {
        Self {
            bbox,
            confidence,
            class_id,
            class_name: class_name.to_string(),
        }
    }

    pub fn center(&self) -> Point {
        Point::new(
            (self.bbox[0] + self.bbox[2]) * 0.5,
            (self.bbox[1] + self.bbox[3]) * 0.5,
        )
    }

    pub fn bottom_center(&self) -> Point {
        Point::new((self.bbox[0] + self.bbox[2]) * 0.5, self.bbox[3])
    }

    pub fn anchor(&self, anchor: Anchor) -> Point {
        match anchor {
            Anchor::Center => self.center(),
            Anchor::BottomCenter => self.bottom_center(),
        }
    }

    pub fn area(&self) -> f32 {
        (self.bbox[2] - self.bbox[0]).max(0.0) * (self.bbox[3] - self.bbox[1]).max(0.0)
    }
}

/// A filtered detection after the tracker has (maybe) attached an identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedDetection {
    pub detection: Detection,
    /// `None` when the tracker did not (yet) commit to an identity.
    pub tracker_id: Option<TrackId>,
}

impl TrackedDetection {
    pub fn new(detection: Detection, tracker_id: Option<TrackId>) -> Self {
        Self {
            detection,
            tracker_id,
        }
    }
}

/// Per-object display information produced by the state tracker for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectLabel {
    pub tracker_id: TrackId,
    pub object_id: u64,
    pub bbox: [f32; 4],
    pub text: String,
    /// Drawn with the violation colour.
    pub flagged: bool,
    pub confidence: f32,
    /// Class name recorded at first sighting.
    pub first_class: String,
    /// Whole seconds between first and last sighting (stream time).
    pub dwell_secs: u64,
}

/// Capitalise the first letter, the way labels show class names.
pub fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(|c| c.to_lowercase())).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anchor_points() {
        let det = Detection::new([10.0, 20.0, 30.0, 60.0], 0.9, 2, "car");
        assert_eq!(det.center(), Point::new(20.0, 40.0));
        assert_eq!(det.bottom_center(), Point::new(20.0, 60.0));
        assert_eq!(det.anchor(Anchor::Center), det.center());
        assert_eq!(det.area(), 800.0);
    }

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("no_helmet"), "No_helmet");
        assert_eq!(capitalize("CAR"), "Car");
        assert_eq!(capitalize(""), "");
    }
}
