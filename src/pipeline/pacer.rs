// src/pipeline/pacer.rs
//
// Keeps output at the nominal frame rate: sleep off whatever is left of the
// per-frame budget, or just yield when processing overran it.

use std::time::Duration;
use tokio::time::Instant;

pub const FALLBACK_FPS: f64 = 30.0;

pub struct FramePacer {
    interval: Duration,
    frame_start: Instant,
}

impl FramePacer {
    /// A non-positive or non-finite rate falls back to `fallback_fps`.
    pub fn new(fps: Option<f64>, fallback_fps: f64) -> Self {
        let fps = fps
            .filter(|f| f.is_finite() && *f > 0.0)
            .unwrap_or(if fallback_fps > 0.0 { fallback_fps } else { FALLBACK_FPS });
        Self {
            interval: Duration::from_secs_f64(1.0 / fps),
            frame_start: Instant::now(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn begin(&mut self) {
        self.frame_start = Instant::now();
    }

    /// Returns how long processing took.
    pub async fn finish(&mut self) -> Duration {
        let elapsed = self.frame_start.elapsed();
        if elapsed < self.interval {
            tokio::time::sleep(self.interval - elapsed).await;
        } else {
            tokio::task::yield_now().await;
        }
        elapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_sleeps_remaining_budget() {
        let mut pacer = FramePacer::new(Some(25.0), FALLBACK_FPS);
        assert_eq!(pacer.interval(), Duration::from_millis(40));
        let start = Instant::now();
        pacer.begin();
        tokio::time::advance(Duration::from_millis(15)).await;
        let took = pacer.finish().await;
        assert_eq!(took, Duration::from_millis(15));
        assert_eq!(start.elapsed(), Duration::from_millis(40));
    }

    #[tokio::test(start_paused = true)]
    async fn test_overrun_does_not_sleep() {
        let mut pacer = FramePacer::new(Some(25.0), FALLBACK_FPS);
        let start = Instant::now();
        pacer.begin();
        tokio::time::advance(Duration::from_millis(60)).await;
        pacer.finish().await;
        assert_eq!(start.elapsed(), Duration::from_millis(60));
    }

    #[tokio::test]
    async fn test_unknown_rate_uses_fallback() {
        let pacer = FramePacer::new(None, 20.0);
        assert_eq!(pacer.interval(), Duration::from_millis(50));
        let pacer = FramePacer::new(Some(0.0), 0.0);
        assert_eq!(pacer.interval(), Duration::from_secs_f64(1.0 / 30.0));
    }
}
