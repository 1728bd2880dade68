use std::time::Instant;

/// Audio time, in seconds, on the timeline of an audio device.
pub type AudioTime = f64;

/// Time returned by an engine that has nothing left to schedule but wants to
/// stay attached to its scheduler.
pub const NEVER: AudioTime = AudioTime::INFINITY;

/// Source of the current audio time.
///
/// The scheduler and the grain engines only ever read this clock; advancing
/// it is the job of whatever drives the audio hardware (or, offline, the
/// caller of [`crate::offline::OfflineDevice::set_time`]).
pub trait AudioClock: Send + Sync {
    fn current_time(&self) -> AudioTime;
}

/// Monotonic wall clock starting at zero when created.
///
/// Used by headless hosts that have no audio hardware clock to follow.
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        SystemClock {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioClock for SystemClock {
    fn current_time(&self) -> AudioTime {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Converts decibels to a linear gain factor.
pub fn db_to_linear(db: f64) -> f64 {
    // exp(db * ln(10) / 20)
    (0.115_129_254_649_702_29 * db).exp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let a = clock.current_time();
        let b = clock.current_time();
        assert!(a >= 0.0);
        assert!(b >= a);
    }

    #[test]
    fn decibel_conversion() {
        assert!((db_to_linear(0.0) - 1.0).abs() < 1e-12);
        assert!((db_to_linear(20.0) - 10.0).abs() < 1e-9);
        assert!((db_to_linear(-40.0) - 0.01).abs() < 1e-12);
    }
}
