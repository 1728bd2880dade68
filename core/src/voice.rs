use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::buffer::AudioBuffer;
use crate::clock::AudioTime;
use crate::device::AudioDevice;
use crate::error::SchedulerError;
use crate::grain::GrainEngine;
use crate::schedule::Scheduler;
use crate::schedule::engine::{SharedEngine, lock};

/// Two grain engines crossfading into each other whenever the source buffer
/// changes.
///
/// The engine in use is the current one; a new buffer goes to the other
/// engine, which fades in while the current one fades out and retires.
pub struct SynthVoice {
    engines: [Arc<Mutex<GrainEngine>>; 2],
    current: usize,
    playing: bool,
}

impl SynthVoice {
    pub fn new(device: Arc<dyn AudioDevice>) -> Self {
        SynthVoice::from_engines(
            GrainEngine::new(device.clone()),
            GrainEngine::new(device),
        )
    }

    pub fn with_seed(device: Arc<dyn AudioDevice>, seed: u64) -> Self {
        SynthVoice::from_engines(
            GrainEngine::with_seed(device.clone(), seed),
            GrainEngine::with_seed(device, seed.wrapping_add(1)),
        )
    }

    fn from_engines(a: GrainEngine, b: GrainEngine) -> Self {
        SynthVoice {
            engines: [Arc::new(Mutex::new(a)), Arc::new(Mutex::new(b))],
            current: 0,
            playing: false,
        }
    }

    pub fn start(&mut self) {
        self.playing = true;
    }

    /// Fades the current engine to silence; it leaves the scheduler once
    /// silent.
    pub fn stop(&mut self, fade_time: AudioTime) {
        lock(&self.engines[self.current]).fade_out(fade_time);
        self.playing = false;
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn engine(&self, index: usize) -> &Arc<Mutex<GrainEngine>> {
        &self.engines[index % 2]
    }

    /// Gains of both engines, in engine order.
    pub fn gains(&self) -> [f64; 2] {
        [lock(&self.engines[0]).gain(), lock(&self.engines[1]).gain()]
    }

    /// Crossfades to `buffer` over `fade_time` seconds.
    pub fn set_buffer(
        &mut self,
        scheduler: &mut Scheduler,
        buffer: Option<Arc<AudioBuffer>>,
        fade_time: AudioTime,
    ) -> Result<(), SchedulerError> {
        let prev = self.current;
        self.current = (self.current + 1) % 2;

        let prev_position = {
            let mut engine = lock(&self.engines[prev]);
            engine.fade_out(fade_time);
            engine.position
        };

        let next: SharedEngine = self.engines[self.current].clone();
        let attached = scheduler.has(&next);
        {
            let mut engine = lock(&self.engines[self.current]);
            if attached {
                engine.position = prev_position;
            } else if let Some(buffer) = &buffer {
                engine.position = 0.5 * buffer.duration();
            }
            engine.set_buffer(buffer);
            engine.fade_in(fade_time);
        }

        debug!(
            "voice: crossfading to engine {} over {fade_time}s",
            self.current
        );
        if !attached {
            scheduler.add(next, None)?;
        }
        Ok(())
    }

    fn for_each_engine(&self, mut f: impl FnMut(&mut GrainEngine)) {
        for engine in &self.engines {
            f(&mut lock(engine));
        }
    }

    pub fn set_period(&self, period: AudioTime) {
        self.for_each_engine(|e| e.period = period);
    }

    pub fn set_duration(&self, duration: AudioTime) {
        self.for_each_engine(|e| e.duration = duration);
    }

    pub fn set_position_var(&self, position_var: AudioTime) {
        self.for_each_engine(|e| e.position_var = position_var);
    }

    pub fn set_resampling(&self, cents: f64) {
        self.for_each_engine(|e| e.resampling = cents);
    }

    pub fn set_resampling_var(&self, cents: f64) {
        self.for_each_engine(|e| e.resampling_var = cents);
    }

    pub fn set_attack(&self, attack: f64) {
        self.for_each_engine(|e| e.attack = attack);
    }

    pub fn set_release(&self, release: f64) {
        self.for_each_engine(|e| e.release = release);
    }

    /// Linear gain of the output stage shared by both engines.
    pub fn set_gain(&self, gain: f64) {
        self.for_each_engine(|e| e.set_output_gain(gain));
    }

    /// Moves the read position of the current engine, if it has a buffer.
    pub fn set_position(&self, position: AudioTime) {
        let mut engine = lock(&self.engines[self.current]);
        if engine.buffer().is_some() {
            engine.position = position;
        }
    }
}
