use std::sync::Arc;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::buffer::AudioBuffer;
use crate::clock::AudioTime;
use crate::device::{AudioDevice, GrainPlan};
use crate::fade::GainFade;
use crate::schedule::engine::{SchedulerId, TimeEngine};

/// Shortest interval between two grains.
pub const MIN_PERIOD: AudioTime = 0.01;
/// Grains shorter than this are not played.
pub const MIN_GRAIN_DURATION: AudioTime = 0.01;

/// Granular engine with a fading output gain.
///
/// Each call to [`TimeEngine::advance_time`] steps the fade, emits one grain
/// to the audio device and asks to be called again one period later. Once
/// the gain has faded to zero the engine detaches from its scheduler.
///
/// All durations are in seconds, `resampling` and `resampling_var` in cents,
/// `attack` and `release` are fractions of the grain duration.
pub struct GrainEngine {
    master: Option<SchedulerId>,
    device: Arc<dyn AudioDevice>,
    buffer: Option<Arc<AudioBuffer>>,

    pub period: AudioTime,
    pub duration: AudioTime,
    pub position: AudioTime,
    pub position_var: AudioTime,
    pub resampling: f64,
    pub resampling_var: f64,
    pub attack: f64,
    pub release: f64,

    output_gain: f64,
    fade: GainFade,
    rng: SmallRng,
}

impl GrainEngine {
    pub fn new(device: Arc<dyn AudioDevice>) -> Self {
        Self::with_rng(device, SmallRng::from_os_rng())
    }

    /// Engine with reproducible grain jitter.
    pub fn with_seed(device: Arc<dyn AudioDevice>, seed: u64) -> Self {
        Self::with_rng(device, SmallRng::seed_from_u64(seed))
    }

    fn with_rng(device: Arc<dyn AudioDevice>, rng: SmallRng) -> Self {
        GrainEngine {
            master: None,
            device,
            buffer: None,
            period: 0.01,
            duration: 0.1,
            position: 0.5,
            position_var: 0.003,
            resampling: 0.0,
            resampling_var: 0.0,
            attack: 0.5,
            release: 0.5,
            output_gain: 1.0,
            fade: GainFade::new(0.0),
            rng,
        }
    }

    pub fn buffer(&self) -> Option<&Arc<AudioBuffer>> {
        self.buffer.as_ref()
    }

    pub fn set_buffer(&mut self, buffer: Option<Arc<AudioBuffer>>) {
        self.buffer = buffer;
    }

    pub fn buffer_duration(&self) -> AudioTime {
        self.buffer.as_ref().map_or(0.0, |b| b.duration())
    }

    pub fn gain(&self) -> f64 {
        self.fade.gain()
    }

    pub fn target_gain(&self) -> f64 {
        self.fade.target()
    }

    pub fn output_gain(&self) -> f64 {
        self.output_gain
    }

    pub fn set_output_gain(&mut self, gain: f64) {
        self.output_gain = gain;
    }

    fn effective_period(&self) -> AudioTime {
        self.period.max(MIN_PERIOD)
    }

    /// Ramps the gain to `target` over `duration` seconds.
    pub fn fade(&mut self, target: f64, duration: AudioTime) {
        let period = self.effective_period();
        self.fade.fade(target, duration, period);
    }

    pub fn fade_in(&mut self, duration: AudioTime) {
        self.fade(1.0, duration);
    }

    pub fn fade_out(&mut self, duration: AudioTime) {
        self.fade(0.0, duration);
    }

    /// Emits one grain starting at `time` and returns the delay until the
    /// next one.
    pub fn trigger(&mut self, time: AudioTime) -> AudioTime {
        let period = self.effective_period();
        let Some(buffer) = self.buffer.clone() else {
            return period;
        };

        let mut grain_time = time;
        let mut duration = self.duration;
        let mut position = self.position - 0.5 * duration;

        let mut rate = 1.0;
        if self.resampling != 0.0 || self.resampling_var > 0.0 {
            let jitter = if self.resampling_var > 0.0 {
                self.rng
                    .random_range(-self.resampling_var..self.resampling_var)
            } else {
                0.0
            };
            rate = 2f64.powf((self.resampling + jitter) / 1200.0);
        }

        if self.position_var > 0.0 {
            position += self.rng.random_range(-self.position_var..self.position_var);
        }

        let buffer_duration = buffer.duration();
        if position < 0.0 {
            grain_time -= position;
            duration += position;
            position = 0.0;
        }
        if position + duration > buffer_duration {
            duration = buffer_duration - position;
        }
        let duration = duration.max(0.0);

        let gain = self.fade.gain();
        if gain > 0.0 && duration >= MIN_GRAIN_DURATION {
            let mut attack = self.attack * duration;
            let mut release = self.release * duration;
            if attack + release > duration {
                let factor = duration / (attack + release);
                attack *= factor;
                release *= factor;
            }

            let end = grain_time + duration / rate;
            self.device.play_grain(GrainPlan {
                start: grain_time,
                offset: position,
                duration,
                rate,
                attack_end: grain_time + attack,
                release_start: end - release,
                end,
                gain,
                output_gain: self.output_gain,
                buffer,
            });
        }

        period
    }
}

impl TimeEngine for GrainEngine {
    fn advance_time(&mut self, time: AudioTime) -> Option<AudioTime> {
        let gain = self.fade.step();
        if gain > 0.0 {
            let time = time.max(self.device.current_time());
            return Some(time + self.trigger(time));
        }
        None
    }

    fn master(&self) -> Option<SchedulerId> {
        self.master
    }

    fn set_master(&mut self, master: Option<SchedulerId>) {
        self.master = master;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offline::OfflineDevice;

    fn engine_with(seconds: usize) -> (Arc<OfflineDevice>, GrainEngine) {
        let device = Arc::new(OfflineDevice::new(1000));
        let mut engine = GrainEngine::with_seed(device.clone(), 1);
        engine.set_buffer(Some(Arc::new(AudioBuffer::new(vec![0.1; 1000 * seconds], 1000))));
        engine.position_var = 0.0;
        engine.fade_in(0.0);
        (device, engine)
    }

    #[test]
    fn silent_engine_detaches() {
        let device = Arc::new(OfflineDevice::new(1000));
        let mut engine = GrainEngine::with_seed(device.clone(), 1);
        assert_eq!(engine.advance_time(0.0), None);
        assert_eq!(device.grain_count(), 0);
    }

    #[test]
    fn emits_one_grain_per_period() {
        let (device, mut engine) = engine_with(1);
        engine.period = 0.05;
        let next = engine.advance_time(0.2).unwrap();
        assert!((next - 0.25).abs() < 1e-12);
        let grains = device.grains();
        assert_eq!(grains.len(), 1);
        assert_eq!(grains[0].start, 0.2);
        assert!((grains[0].offset - 0.45).abs() < 1e-12);
        assert!((grains[0].duration - 0.1).abs() < 1e-12);
        assert_eq!(grains[0].rate, 1.0);
        assert!((grains[0].attack_end - 0.25).abs() < 1e-12);
        assert!((grains[0].release_start - 0.25).abs() < 1e-12);
    }

    #[test]
    fn late_calls_start_at_device_time() {
        let (device, mut engine) = engine_with(1);
        device.set_time(3.0);
        let next = engine.advance_time(1.0).unwrap();
        assert!((next - 3.01).abs() < 1e-12);
        assert_eq!(device.grains()[0].start, 3.0);
    }

    #[test]
    fn period_is_floored() {
        let (_device, mut engine) = engine_with(1);
        engine.period = 0.001;
        assert_eq!(engine.advance_time(0.0), Some(MIN_PERIOD));
    }

    #[test]
    fn window_clipped_at_buffer_start() {
        let (device, mut engine) = engine_with(1);
        engine.position = 0.0;
        engine.advance_time(1.0);
        let grain = &device.grains()[0];
        assert_eq!(grain.offset, 0.0);
        assert!((grain.start - 1.05).abs() < 1e-12);
        assert!((grain.duration - 0.05).abs() < 1e-12);
    }

    #[test]
    fn window_clipped_at_buffer_end() {
        let (device, mut engine) = engine_with(1);
        engine.position = 0.98;
        engine.advance_time(0.0);
        let grain = &device.grains()[0];
        assert!((grain.offset - 0.93).abs() < 1e-12);
        assert!((grain.duration - 0.07).abs() < 1e-9);
    }

    #[test]
    fn short_grains_are_skipped() {
        let (device, mut engine) = engine_with(1);
        engine.duration = 0.005;
        assert_eq!(engine.advance_time(0.0), Some(0.01));
        assert_eq!(device.grain_count(), 0);
    }

    #[test]
    fn no_buffer_keeps_ticking_silently() {
        let device = Arc::new(OfflineDevice::new(1000));
        let mut engine = GrainEngine::with_seed(device.clone(), 1);
        engine.fade_in(0.0);
        assert_eq!(engine.advance_time(0.0), Some(0.01));
        assert_eq!(device.grain_count(), 0);
    }

    #[test]
    fn envelope_is_scaled_down() {
        let (device, mut engine) = engine_with(1);
        engine.attack = 0.8;
        engine.release = 0.6;
        engine.advance_time(0.0);
        let grain = &device.grains()[0];
        let attack = grain.attack_end - grain.start;
        let release = grain.end - grain.release_start;
        assert!((attack + release - 0.1).abs() < 1e-12);
        assert!((attack / release - 0.8 / 0.6).abs() < 1e-9);
    }

    #[test]
    fn resampling_scales_playback() {
        let (device, mut engine) = engine_with(1);
        engine.resampling = 1200.0;
        engine.advance_time(0.0);
        let grain = &device.grains()[0];
        assert!((grain.rate - 2.0).abs() < 1e-12);
        assert!((grain.end - grain.start - 0.05).abs() < 1e-12);
    }

    #[test]
    fn fade_out_retires_the_engine() {
        let (_device, mut engine) = engine_with(1);
        engine.period = 0.0625;
        engine.fade_out(0.25);
        let mut time = 0.0;
        let mut calls = 0;
        while let Some(next) = engine.advance_time(time) {
            time = next;
            calls += 1;
            assert!(calls < 100);
        }
        assert_eq!(calls, 3);
        assert_eq!(engine.gain(), 0.0);
    }

    #[test]
    fn grains_stay_inside_the_buffer() {
        let (device, mut engine) = engine_with(2);
        let mut rng = SmallRng::seed_from_u64(99);
        let mut time = 0.0;
        for _ in 0..500 {
            engine.position = rng.random_range(-0.5..2.5);
            engine.duration = rng.random_range(0.001..0.4);
            engine.position_var = rng.random_range(0.0..0.3);
            engine.resampling_var = rng.random_range(0.0..1200.0);
            time = engine.advance_time(time).unwrap();
        }
        for grain in device.grains() {
            assert!(grain.offset >= 0.0);
            assert!(grain.duration >= MIN_GRAIN_DURATION);
            assert!(grain.offset + grain.duration <= 2.0 + 1e-9);
            assert!(grain.end > grain.start);
        }
    }
}
