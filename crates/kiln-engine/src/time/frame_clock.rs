use std::time::{Duration, Instant};

/// Frame timing snapshot.
#[derive(Debug, Copy, Clone)]
pub struct FrameTime {
    /// Time elapsed since the previous frame tick, in seconds.
    pub dt: f32,

    /// Monotonic timestamp taken at the tick.
    pub now: Instant,

    /// Monotonic frame counter.
    pub frame_index: u64,
}

impl FrameTime {
    /// A snapshot with a fixed delta, for driving updates outside the clock.
    pub fn fixed(dt: f32) -> Self {
        Self {
            dt,
            now: Instant::now(),
            frame_index: 0,
        }
    }
}

/// Frame clock producing `FrameTime` snapshots, optionally capping the frame rate.
///
/// Delta time is clamped to avoid pathological values when the application is paused
/// by the debugger, minimized, or stalls.
#[derive(Debug, Clone)]
pub struct FrameClock {
    last: Instant,
    frame_index: u64,
    dt_min: Duration,
    dt_max: Duration,
    interval: Option<Duration>,
}

impl FrameClock {
    /// Creates an unlimited clock with default clamps.
    pub fn new() -> Self {
        Self::with_clamps(Duration::from_micros(100), Duration::from_millis(250))
    }

    /// Creates a clock with custom delta-time clamps.
    pub fn with_clamps(dt_min: Duration, dt_max: Duration) -> Self {
        debug_assert!(dt_min <= dt_max);
        Self {
            last: Instant::now(),
            frame_index: 0,
            dt_min,
            dt_max,
            interval: None,
        }
    }

    /// Caps ticks to `fps` per second. `0` removes the cap.
    pub fn with_fps_limit(mut self, fps: u32) -> Self {
        self.set_fps_limit(fps);
        self
    }

    pub fn set_fps_limit(&mut self, fps: u32) {
        self.interval = (fps > 0).then(|| Duration::from_secs_f64(1.0 / fps as f64));
        match fps {
            0 => log::debug!("frame clock: no frame limit"),
            fps => log::debug!("frame clock: limited to {fps} fps"),
        }
    }

    pub fn fps_limit(&self) -> u32 {
        self.interval
            .map(|i| (1.0 / i.as_secs_f64()).round() as u32)
            .unwrap_or(0)
    }

    /// Resets the clock baseline.
    ///
    /// Useful after surface reconfigure events or when resuming from suspension.
    pub fn reset(&mut self) {
        self.last = Instant::now();
    }

    /// Advances the clock and returns a new `FrameTime`.
    ///
    /// With a frame limit, sleeps out whatever is left of the frame interval first.
    pub fn tick(&mut self) -> FrameTime {
        let mut now = Instant::now();
        if let Some(interval) = self.interval {
            let elapsed = now.saturating_duration_since(self.last);
            if elapsed < interval {
                std::thread::sleep(interval - elapsed);
                now = Instant::now();
            }
        }

        let dt = now
            .saturating_duration_since(self.last)
            .clamp(self.dt_min, self.dt_max);
        self.last = now;

        let ft = FrameTime {
            dt: dt.as_secs_f32(),
            now,
            frame_index: self.frame_index,
        };
        self.frame_index = self.frame_index.wrapping_add(1);
        ft
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_is_clamped() {
        let mut clock =
            FrameClock::with_clamps(Duration::from_millis(5), Duration::from_millis(10));
        let first = clock.tick();
        assert!(first.dt > 0.0049 && first.dt < 0.0101);

        std::thread::sleep(Duration::from_millis(20));
        assert!((clock.tick().dt - 0.010).abs() < 1e-6);
    }

    #[test]
    fn frame_limit_spaces_ticks() {
        let mut clock = FrameClock::new().with_fps_limit(100);
        assert_eq!(clock.fps_limit(), 100);
        clock.tick();
        let start = Instant::now();
        clock.tick();
        clock.tick();
        assert!(start.elapsed() >= Duration::from_millis(18));
    }

    #[test]
    fn frame_index_increments() {
        let mut clock = FrameClock::new();
        assert_eq!(clock.tick().frame_index, 0);
        assert_eq!(clock.tick().frame_index, 1);
        clock.set_fps_limit(0);
        assert_eq!(clock.fps_limit(), 0);
    }
}
