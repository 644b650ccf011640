use web_time::{Duration, Instant};

/// Frame pacing and FPS reporting for the demo loop.
pub struct FrameTiming {
    /// Minimum frame duration (zero = unlimited).
    min_frame_duration: Duration,
    /// Last frame timestamp
    last_frame: Instant,
    /// Last time a report was handed out
    last_report: Instant,
    /// How often [`end_frame`](Self::end_frame) reports
    report_interval: Duration,
    /// Frames completed so far
    frames: u64,
    /// Smoothed FPS using exponential moving average
    smoothed_fps: f32,
    /// Smoothing factor (lower = smoother, 0.0-1.0)
    smoothing: f32,
}

impl FrameTiming {
    /// Create a frame timer with the given FPS target (0 = unlimited) that
    /// reports every `report_interval`.
    #[must_use]
    pub fn new(target_fps: u32, report_interval: Duration) -> Self {
        let min_frame_duration = if target_fps > 0 {
            Duration::from_secs_f64(1.0 / f64::from(target_fps))
        } else {
            Duration::ZERO
        };
        let now = Instant::now();
        Self {
            min_frame_duration,
            last_frame: now,
            last_report: now,
            report_interval,
            frames: 0,
            smoothed_fps: 60.0,
            smoothing: 0.05,
        }
    }

    /// Whether enough time has passed since the last frame to render.
    #[must_use]
    pub fn should_render(&self) -> bool {
        self.last_frame.elapsed() >= self.min_frame_duration
    }

    /// Record a finished frame. Returns the smoothed FPS when a report is
    /// due.
    pub fn end_frame(&mut self) -> Option<f32> {
        let now = Instant::now();
        self.record(now.duration_since(self.last_frame));
        self.last_frame = now;
        if now.duration_since(self.last_report) >= self.report_interval {
            self.last_report = now;
            Some(self.smoothed_fps)
        } else {
            None
        }
    }

    fn record(&mut self, elapsed: Duration) {
        self.frames += 1;
        let frame_time = elapsed.as_secs_f32();
        if frame_time > 0.0 {
            let instant_fps = 1.0 / frame_time;
            self.smoothed_fps = self.smoothed_fps * (1.0 - self.smoothing)
                + instant_fps * self.smoothing;
        }
    }

    /// Get the current FPS (smoothed)
    #[must_use]
    pub fn fps(&self) -> f32 {
        self.smoothed_fps
    }

    /// Frames completed so far.
    #[must_use]
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fps_moves_towards_frame_rate() {
        let mut timing = FrameTiming::new(0, Duration::from_secs(1));
        for _ in 0..500 {
            timing.record(Duration::from_millis(10));
        }
        assert!((timing.fps() - 100.0).abs() < 1.0);
        assert_eq!(timing.frames(), 500);
    }

    #[test]
    fn zero_length_frames_are_counted_but_ignored() {
        let mut timing = FrameTiming::new(0, Duration::from_secs(1));
        timing.record(Duration::ZERO);
        assert_eq!(timing.fps(), 60.0);
        assert_eq!(timing.frames(), 1);
    }

    #[test]
    fn unlimited_always_renders() {
        assert!(FrameTiming::new(0, Duration::ZERO).should_render());
    }

    #[test]
    fn zero_interval_reports_every_frame() {
        let mut timing = FrameTiming::new(0, Duration::ZERO);
        assert!(timing.end_frame().is_some());
        assert!(timing.end_frame().is_some());
    }
}
