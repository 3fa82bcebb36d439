//! Time management utilities

use std::time::{Duration, Instant};

/// Frame timer tracking the duration of the last completed frame
///
/// The renderer marks the start and end of every frame; the app reads
/// [`FrameTimer::last_frame_time`] for FPS display.
#[derive(Debug)]
pub struct FrameTimer {
    frame_start: Option<Instant>,
    last_frame: Duration,
    smoothed_fps: f32,
    frame_count: u64,
}

impl Default for FrameTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameTimer {
    /// Weight given to the newest sample in the smoothed FPS
    const SMOOTHING: f32 = 0.1;

    /// Create a timer with no recorded frames
    pub const fn new() -> Self {
        Self {
            frame_start: None,
            last_frame: Duration::ZERO,
            smoothed_fps: 0.0,
            frame_count: 0,
        }
    }

    /// Mark the beginning of a frame
    pub fn begin_frame(&mut self) {
        self.frame_start = Some(Instant::now());
    }

    /// Mark the end of a frame started with [`Self::begin_frame`]
    pub fn end_frame(&mut self) {
        if let Some(start) = self.frame_start.take() {
            self.record(start.elapsed());
        }
    }

    /// Record an externally measured frame duration
    pub fn record(&mut self, elapsed: Duration) {
        self.last_frame = elapsed;
        self.frame_count += 1;

        let secs = elapsed.as_secs_f32();
        if secs > 0.0 {
            let fps = 1.0 / secs;
            self.smoothed_fps = if self.frame_count == 1 {
                fps
            } else {
                self.smoothed_fps + Self::SMOOTHING * (fps - self.smoothed_fps)
            };
        }
    }

    /// Duration of the last completed frame
    pub const fn last_frame_time(&self) -> Duration {
        self.last_frame
    }

    /// Exponentially smoothed frames per second
    pub const fn smoothed_fps(&self) -> f32 {
        self.smoothed_fps
    }

    /// Number of completed frames
    pub const fn frame_count(&self) -> u64 {
        self.frame_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_new_timer_is_empty() {
        let timer = FrameTimer::new();
        assert_eq!(timer.last_frame_time(), Duration::ZERO);
        assert_eq!(timer.frame_count(), 0);
    }

    #[test]
    fn test_record_updates_last_frame() {
        let mut timer = FrameTimer::new();
        timer.record(Duration::from_millis(16));
        timer.record(Duration::from_millis(20));

        assert_eq!(timer.last_frame_time(), Duration::from_millis(20));
        assert_eq!(timer.frame_count(), 2);
    }

    #[test]
    fn test_first_sample_seeds_fps() {
        let mut timer = FrameTimer::new();
        timer.record(Duration::from_millis(10));
        assert_relative_eq!(timer.smoothed_fps(), 100.0, epsilon = 1e-3);

        timer.record(Duration::from_millis(20));
        assert_relative_eq!(timer.smoothed_fps(), 95.0, epsilon = 1e-3);
    }

    #[test]
    fn test_end_without_begin_is_ignored() {
        let mut timer = FrameTimer::new();
        timer.end_frame();
        assert_eq!(timer.frame_count(), 0);
    }
}
