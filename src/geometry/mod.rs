// src/geometry/mod.rs

pub mod transform;
pub mod zone;

pub use transform::ViewTransformer;
pub use zone::PolygonZone;
