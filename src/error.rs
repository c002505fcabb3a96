// src/error.rs
//
// Construction-time failures. Anything raised here stops a pipeline from
// starting; per-frame problems are logged and recovered where they happen.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RoadwatchError>;

#[derive(Error, Debug)]
pub enum RoadwatchError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Degenerate geometry: {0}")]
    DegenerateGeometry(String),

    #[error("Frame source error: {0}")]
    Source(String),

    #[error("Replay data error: {0}")]
    Replay(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RoadwatchError {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    pub fn geometry<S: Into<String>>(msg: S) -> Self {
        Self::DegenerateGeometry(msg.into())
    }

    pub fn source<S: Into<String>>(msg: S) -> Self {
        Self::Source(msg.into())
    }

    pub fn replay<S: Into<String>>(msg: S) -> Self {
        Self::Replay(msg.into())
    }
}
