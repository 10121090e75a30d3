//! Monotonic clock and frame timing

use std::time::{Duration, Instant};

thread_local! {
    static EPOCH: Instant = Instant::now();
}

/// Milliseconds elapsed on the monotonic clock since the first call on this thread
pub fn now_ms() -> f64 {
    EPOCH.with(|epoch| epoch.elapsed().as_secs_f64() * 1000.0)
}

/// Frame timer pacing a loop towards a target frame rate
pub struct Timer {
    frame_interval: Duration,
    last_frame: Option<Instant>,
    frame_count: u64,
}

impl Timer {
    /// Create a timer targeting `target_fps` frames per second
    ///
    /// A target of zero disables pacing.
    pub fn new(target_fps: u32) -> Self {
        let frame_interval = if target_fps == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(1.0 / f64::from(target_fps))
        };
        Self {
            frame_interval,
            last_frame: None,
            frame_count: 0,
        }
    }

    /// Time left until the next frame is due
    pub fn time_until_next_frame(&self) -> Duration {
        self.last_frame.map_or(Duration::ZERO, |last| {
            self.frame_interval.saturating_sub(last.elapsed())
        })
    }

    /// Mark a frame as started
    pub fn tick(&mut self) {
        self.last_frame = Some(Instant::now());
        self.frame_count += 1;
    }

    /// Number of frames ticked so far
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Target interval between frames
    pub fn frame_interval(&self) -> Duration {
        self.frame_interval
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new(60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_is_monotonic() {
        let first = now_ms();
        let second = now_ms();
        assert!(second >= first);
    }

    #[test]
    fn test_first_frame_is_due_immediately() {
        let timer = Timer::new(60);
        assert_eq!(timer.time_until_next_frame(), Duration::ZERO);
    }

    #[test]
    fn test_tick_schedules_next_frame() {
        let mut timer = Timer::new(1);
        timer.tick();
        assert_eq!(timer.frame_count(), 1);
        assert!(timer.time_until_next_frame() > Duration::from_millis(500));
    }

    #[test]
    fn test_zero_fps_disables_pacing() {
        let mut timer = Timer::new(0);
        timer.tick();
        assert_eq!(timer.time_until_next_frame(), Duration::ZERO);
    }
}
