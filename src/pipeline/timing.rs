//! Frame rate measurement over fixed windows of frames

use std::time::{Duration, Instant};

/// Achieved rate over one completed window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowReport {
    pub frames: u32,
    pub elapsed: Duration,
    pub fps: f64,
    pub avg_frame_us: f64,
}

impl WindowReport {
    fn new(frames: u32, elapsed: Duration) -> Self {
        let secs = elapsed.as_secs_f64();
        let fps = if secs > 0.0 { frames as f64 / secs } else { 0.0 };
        let avg_frame_us = if frames > 0 {
            elapsed.as_micros() as f64 / frames as f64
        } else {
            0.0
        };
        Self {
            frames,
            elapsed,
            fps,
            avg_frame_us,
        }
    }
}

/// Counts frames and reports once every `window` of them.
#[derive(Debug)]
pub struct FrameTimer {
    window: u32,
    count: u32,
    started: Instant,
}

impl FrameTimer {
    pub fn new(window: u32) -> Self {
        Self {
            window: window.max(1),
            count: 0,
            started: Instant::now(),
        }
    }

    pub fn window(&self) -> u32 {
        self.window
    }

    /// Record one frame. Returns a report when the window closes.
    pub fn tick(&mut self) -> Option<WindowReport> {
        self.tick_at(Instant::now())
    }

    pub(crate) fn tick_at(&mut self, now: Instant) -> Option<WindowReport> {
        self.count += 1;
        if self.count < self.window {
            return None;
        }

        let report = WindowReport::new(self.count, now.saturating_duration_since(self.started));
        self.count = 0;
        self.started = now;
        Some(report)
    }
}
