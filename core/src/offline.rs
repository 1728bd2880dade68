use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::clock::{AudioClock, AudioTime};
use crate::device::{AudioDevice, GrainPlan};
use crate::schedule::engine::lock;

/// Audio device without hardware.
///
/// Its clock only moves when told to, and every grain it receives is kept so
/// that it can be inspected or mixed down with [`OfflineDevice::render`].
pub struct OfflineDevice {
    sample_rate: u32,
    time: AtomicU64,
    grains: Mutex<Vec<GrainPlan>>,
}

impl OfflineDevice {
    pub fn new(sample_rate: u32) -> Self {
        OfflineDevice {
            sample_rate,
            time: AtomicU64::new(0f64.to_bits()),
            grains: Mutex::new(Vec::new()),
        }
    }

    pub fn set_time(&self, time: AudioTime) {
        self.time.store(time.to_bits(), Ordering::Release);
    }

    pub fn advance(&self, delta: AudioTime) {
        self.set_time(self.current_time() + delta);
    }

    pub fn grain_count(&self) -> usize {
        lock(&self.grains).len()
    }

    pub fn grains(&self) -> Vec<GrainPlan> {
        lock(&self.grains).clone()
    }

    /// Drops every grain that has finished sounding before `time`.
    pub fn discard_before(&self, time: AudioTime) {
        lock(&self.grains).retain(|g| g.end > time);
    }

    /// Mixes all recorded grains into `frames` samples starting at `from`.
    pub fn render(&self, from: AudioTime, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0f32; frames];
        let sr = self.sample_rate as AudioTime;
        if sr <= 0.0 {
            return out;
        }
        let to = from + frames as AudioTime / sr;

        for grain in lock(&self.grains).iter() {
            if grain.end <= from || grain.start >= to {
                continue;
            }
            let first = (((grain.start - from) * sr).floor().max(0.0)) as usize;
            let last = (((grain.end - from) * sr).ceil() as usize).min(frames);
            for (i, sample) in out.iter_mut().enumerate().take(last).skip(first) {
                *sample += grain.sample_at(from + i as AudioTime / sr);
            }
        }
        out
    }
}

impl AudioClock for OfflineDevice {
    fn current_time(&self) -> AudioTime {
        f64::from_bits(self.time.load(Ordering::Acquire))
    }
}

impl AudioDevice for OfflineDevice {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn play_grain(&self, grain: GrainPlan) {
        lock(&self.grains).push(grain);
    }
}
