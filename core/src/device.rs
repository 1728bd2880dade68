//! Boundary between the synthesis logic and whatever renders audio.
//!
//! Engines never produce samples themselves. Each grain is described as a
//! [`GrainPlan`] and handed to an [`AudioDevice`], which is expected to play
//! it sample-accurately on its own timeline.

use std::sync::Arc;

use crate::buffer::AudioBuffer;
use crate::clock::{AudioClock, AudioTime};

pub trait AudioDevice: AudioClock {
    fn sample_rate(&self) -> u32;

    /// Queues a grain for playback. Plans may start in the future, never in
    /// the past relative to [`AudioClock::current_time`].
    fn play_grain(&self, grain: GrainPlan);
}

/// One scheduled grain: a windowed slice of a buffer, resampled and enveloped.
#[derive(Debug, Clone)]
pub struct GrainPlan {
    /// Device time at which the grain starts sounding.
    pub start: AudioTime,
    /// Read position in the source buffer, in seconds.
    pub offset: AudioTime,
    /// Amount of source material consumed, in buffer seconds.
    pub duration: AudioTime,
    /// Playback rate, 1.0 being the original pitch.
    pub rate: f64,
    pub attack_end: AudioTime,
    pub release_start: AudioTime,
    pub end: AudioTime,
    /// Envelope peak.
    pub gain: f64,
    /// Gain of the output stage the grain is routed through.
    pub output_gain: f64,
    pub buffer: Arc<AudioBuffer>,
}

impl GrainPlan {
    /// Envelope value at device time `t`.
    ///
    /// Linear ramp up to `gain` until `attack_end`, hold, then linear ramp
    /// down to zero at `end`. When the release would begin before the attack
    /// is over, the ramp down starts at `attack_end` instead.
    pub fn envelope_at(&self, t: AudioTime) -> f64 {
        if t < self.start || t >= self.end {
            return 0.0;
        }
        if t < self.attack_end {
            let span = self.attack_end - self.start;
            return if span > 0.0 {
                self.gain * (t - self.start) / span
            } else {
                self.gain
            };
        }
        let release_start = self.release_start.max(self.attack_end);
        if t < release_start {
            return self.gain;
        }
        let span = self.end - release_start;
        if span > 0.0 {
            self.gain * (self.end - t) / span
        } else {
            0.0
        }
    }

    /// Output sample of this grain at device time `t`.
    pub fn sample_at(&self, t: AudioTime) -> f32 {
        let envelope = self.envelope_at(t);
        if envelope == 0.0 {
            return 0.0;
        }
        let elapsed = (t - self.start) * self.rate;
        if elapsed >= self.duration {
            return 0.0;
        }
        let value = self.buffer.sample_at(self.offset + elapsed);
        (value as f64 * envelope * self.output_gain) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(attack_end: f64, release_start: f64) -> GrainPlan {
        GrainPlan {
            start: 1.0,
            offset: 0.0,
            duration: 1.0,
            rate: 1.0,
            attack_end,
            release_start,
            end: 2.0,
            gain: 0.5,
            output_gain: 1.0,
            buffer: Arc::new(AudioBuffer::new(vec![1.0; 100], 100)),
        }
    }

    #[test]
    fn trapezoid_envelope() {
        let p = plan(1.25, 1.75);
        assert_eq!(p.envelope_at(0.5), 0.0);
        assert!((p.envelope_at(1.125) - 0.25).abs() < 1e-12);
        assert_eq!(p.envelope_at(1.5), 0.5);
        assert!((p.envelope_at(1.875) - 0.25).abs() < 1e-12);
        assert_eq!(p.envelope_at(2.0), 0.0);
    }

    #[test]
    fn overlapping_ramps_form_a_triangle() {
        let p = plan(1.5, 1.25);
        assert!((p.envelope_at(1.5) - 0.5).abs() < 1e-12);
        assert!((p.envelope_at(1.75) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn samples_are_scaled_by_both_gains() {
        let mut p = plan(1.0, 2.0);
        p.output_gain = 0.5;
        assert!((p.sample_at(1.5) - 0.25).abs() < 1e-6);
    }
}
