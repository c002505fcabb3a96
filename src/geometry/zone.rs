// src/geometry/zone.rs
//
// Static polygon regions. Membership is boundary-inclusive: a point lying on
// an edge or vertex counts as inside.

use crate::error::{Result, RoadwatchError};
use crate::types::{Anchor, Detection, Point};

/// Tolerance for the on-edge test, in pixels.
const EDGE_EPSILON: f32 = 1e-3;

#[derive(Debug, Clone)]
pub struct PolygonZone {
    vertices: Vec<Point>,
    anchor: Anchor,
    // Cached bounds for the cheap rejection test.
    min: Point,
    max: Point,
}

impl PolygonZone {
    pub fn new(vertices: Vec<Point>, anchor: Anchor) -> Result<Self> {
        if vertices.len() < 3 {
            return Err(RoadwatchError::config(format!(
                "zone polygon needs at least 3 vertices, got {}",
                vertices.len()
            )));
        }
        if vertices.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
            return Err(RoadwatchError::config("zone polygon has non-finite vertices"));
        }

        let mut min = vertices[0];
        let mut max = vertices[0];
        for p in &vertices {
            min.x = min.x.min(p.x);
            min.y = min.y.min(p.y);
            max.x = max.x.max(p.x);
            max.y = max.y.max(p.y);
        }

        Ok(Self {
            vertices,
            anchor,
            min,
            max,
        })
    }

    pub fn from_coords(coords: &[[f32; 2]], anchor: Anchor) -> Result<Self> {
        Self::new(coords.iter().copied().map(Point::from).collect(), anchor)
    }

    pub fn vertices(&self) -> &[Point] {
        &self.vertices
    }

    pub fn anchor(&self) -> Anchor {
        self.anchor
    }

    pub fn contains(&self, p: Point) -> bool {
        if p.x < self.min.x - EDGE_EPSILON
            || p.x > self.max.x + EDGE_EPSILON
            || p.y < self.min.y - EDGE_EPSILON
            || p.y > self.max.y + EDGE_EPSILON
        {
            return false;
        }

        let n = self.vertices.len();
        let mut inside = false;
        let mut j = n - 1;
        for i in 0..n {
            let a = self.vertices[i];
            let b = self.vertices[j];

            if on_segment(a, b, p) {
                return true;
            }

            // Even-odd crossing rule
            if (a.y > p.y) != (b.y > p.y) {
                let x_cross = (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x;
                if p.x < x_cross {
                    inside = !inside;
                }
            }
            j = i;
        }
        inside
    }

    /// Membership of the detection's configured anchor point.
    pub fn contains_detection(&self, det: &Detection) -> bool {
        self.contains(det.anchor(self.anchor))
    }

    /// Keep only detections whose anchor lies inside the zone.
    pub fn trigger(&self, detections: Vec<Detection>) -> Vec<Detection> {
        detections
            .into_iter()
            .filter(|d| self.contains_detection(d))
            .collect()
    }
}

fn on_segment(a: Point, b: Point, p: Point) -> bool {
    let cross = (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x);
    let len = ((b.x - a.x).powi(2) + (b.y - a.y).powi(2)).sqrt().max(1.0);
    if cross.abs() / len > EDGE_EPSILON {
        return false;
    }
    p.x >= a.x.min(b.x) - EDGE_EPSILON
        && p.x <= a.x.max(b.x) + EDGE_EPSILON
        && p.y >= a.y.min(b.y) - EDGE_EPSILON
        && p.y <= a.y.max(b.y) + EDGE_EPSILON
}
