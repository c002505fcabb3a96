// src/geometry/transform.rs
//
// Perspective (homography) mapping from a road quadrilateral in the image to
// a rectangle in real-world units. The speed and wrong-way rules read
// positions in this plane so that distances are comparable along the road.

use crate::error::{Result, RoadwatchError};
use crate::types::Point;
use nalgebra::{SMatrix, SVector};

/// Weights below this are treated as points at infinity.
const WEIGHT_EPSILON: f64 = f32::EPSILON as f64;

/// Twice the minimum triangle area (px²) below which three corners are
/// considered collinear.
const MIN_TRIANGLE_AREA2: f64 = 1e-6;

#[derive(Debug, Clone)]
pub struct ViewTransformer {
    // Row-major 3x3, h[2][2] == 1
    m: [[f64; 3]; 3],
}

impl ViewTransformer {
    /// `source` corners ordered top-left, top-right, bottom-right, bottom-left.
    /// The target rectangle spans `(0,0)..(width-1, height-1)`.
    pub fn new(source: [Point; 4], target_width: f32, target_height: f32) -> Result<Self> {
        if target_width <= 1.0 || target_height <= 1.0 {
            return Err(RoadwatchError::geometry(format!(
                "target rectangle {}x{} has no area",
                target_width, target_height
            )));
        }
        let target = [
            Point::new(0.0, 0.0),
            Point::new(target_width - 1.0, 0.0),
            Point::new(target_width - 1.0, target_height - 1.0),
            Point::new(0.0, target_height - 1.0),
        ];
        Self::between(source, target)
    }

    pub fn from_coords(coords: &[[f32; 2]], target_width: f32, target_height: f32) -> Result<Self> {
        let corners: [Point; 4] = match coords {
            [a, b, c, d] => [(*a).into(), (*b).into(), (*c).into(), (*d).into()],
            _ => {
                return Err(RoadwatchError::config(format!(
                    "road polygon needs exactly 4 corners, got {}",
                    coords.len()
                )))
            }
        };
        Self::new(corners, target_width, target_height)
    }

    /// Solve the 8-parameter homography mapping `source[i]` to `target[i]`.
    pub fn between(source: [Point; 4], target: [Point; 4]) -> Result<Self> {
        check_non_degenerate(&source)?;

        let mut a = SMatrix::<f64, 8, 8>::zeros();
        let mut b = SVector::<f64, 8>::zeros();

        for (i, (s, t)) in source.iter().zip(target.iter()).enumerate() {
            let (x, y) = (s.x as f64, s.y as f64);
            let (u, v) = (t.x as f64, t.y as f64);

            let r = 2 * i;
            a[(r, 0)] = x;
            a[(r, 1)] = y;
            a[(r, 2)] = 1.0;
            a[(r, 6)] = -u * x;
            a[(r, 7)] = -u * y;
            b[r] = u;

            a[(r + 1, 3)] = x;
            a[(r + 1, 4)] = y;
            a[(r + 1, 5)] = 1.0;
            a[(r + 1, 6)] = -v * x;
            a[(r + 1, 7)] = -v * y;
            b[r + 1] = v;
        }

        let h = a
            .lu()
            .solve(&b)
            .ok_or_else(|| RoadwatchError::geometry("perspective system is singular"))?;

        if h.iter().any(|v| !v.is_finite()) {
            return Err(RoadwatchError::geometry("perspective solution is not finite"));
        }

        Ok(Self {
            m: [[h[0], h[1], h[2]], [h[3], h[4], h[5]], [h[6], h[7], 1.0]],
        })
    }

    pub fn transform_point(&self, p: Point) -> Point {
        let (x, y) = (p.x as f64, p.y as f64);
        let m = &self.m;
        let w = m[2][0] * x + m[2][1] * y + m[2][2];
        if w.abs() <= WEIGHT_EPSILON {
            return Point::new(0.0, 0.0);
        }
        let u = (m[0][0] * x + m[0][1] * y + m[0][2]) / w;
        let v = (m[1][0] * x + m[1][1] * y + m[1][2]) / w;
        Point::new(u as f32, v as f32)
    }

    pub fn transform(&self, points: &[Point]) -> Vec<Point> {
        points.iter().map(|p| self.transform_point(*p)).collect()
    }
}

fn check_non_degenerate(corners: &[Point; 4]) -> Result<()> {
    for i in 0..4 {
        for j in (i + 1)..4 {
            if (corners[i].x - corners[j].x).abs() < f32::EPSILON
                && (corners[i].y - corners[j].y).abs() < f32::EPSILON
            {
                return Err(RoadwatchError::geometry(format!(
                    "source corners {} and {} coincide",
                    i, j
                )));
            }
        }
    }

    // Any three of the four corners on one line makes the quad degenerate
    for skip in 0..4 {
        let tri: Vec<Point> = (0..4).filter(|&k| k != skip).map(|k| corners[k]).collect();
        let area2 = ((tri[1].x - tri[0].x) as f64 * (tri[2].y - tri[0].y) as f64
            - (tri[2].x - tri[0].x) as f64 * (tri[1].y - tri[0].y) as f64)
            .abs();
        if area2 < MIN_TRIANGLE_AREA2 {
            return Err(RoadwatchError::geometry(
                "three of the source corners are collinear",
            ));
        }
    }
    Ok(())
}
