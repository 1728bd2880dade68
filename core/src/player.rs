use std::sync::Arc;

use tracing::{debug, warn};

use crate::buffer::AudioBuffer;
use crate::clock::{AudioTime, db_to_linear};
use crate::error::SchedulerError;
use crate::params::{Param, ParamValue};
use crate::protocol::Message;
use crate::schedule::Scheduler;
use crate::voice::SynthVoice;

/// Crossfade between consecutive segments.
pub const FADE_TIME: AudioTime = 2.0;
/// Fade out when the player stops.
pub const RELEASE_TIME: AudioTime = 8.0;
/// Smallest position jitter the grain window leaves room for at each edge.
pub const MIN_POSITION_VAR: AudioTime = 0.005;

/// What the host has to do on behalf of a session.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerAction {
    /// Download and decode the segment stored in file `slot`, then hand it
    /// to [`PlayerSession::segment_loaded`].
    FetchSegment { slot: usize, sequence: u64 },
    /// Send a message to the server.
    Send(Message),
}

/// Player-side state: applies server messages to a synth voice.
pub struct PlayerSession {
    voice: SynthVoice,
    group: Option<usize>,
    sequence: u64,
    started: bool,
    frozen: bool,
    ended: bool,

    buffer: Option<Arc<AudioBuffer>>,
    grain_duration: AudioTime,
    grain_var: AudioTime,
    min_position: AudioTime,
    max_position: AudioTime,
    touch: (f64, f64),
}

impl PlayerSession {
    pub fn new(voice: SynthVoice) -> Self {
        PlayerSession {
            voice,
            group: None,
            sequence: 0,
            started: false,
            frozen: false,
            ended: false,
            buffer: None,
            grain_duration: 0.1,
            grain_var: MIN_POSITION_VAR,
            min_position: 0.0,
            max_position: 0.0,
            touch: (0.5, 0.5),
        }
    }

    pub fn voice(&self) -> &SynthVoice {
        &self.voice
    }

    pub fn group(&self) -> Option<usize> {
        self.group
    }

    /// Sequence number of the newest segment announced.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    pub fn buffer(&self) -> Option<&Arc<AudioBuffer>> {
        self.buffer.as_ref()
    }

    /// Range the playback position is kept in.
    pub fn position_range(&self) -> (AudioTime, AudioTime) {
        (self.min_position, self.max_position)
    }

    /// Starts audio; asks the server for the current parameters and plays
    /// the segment received so far, if any.
    pub fn start(&mut self, scheduler: &mut Scheduler) -> Result<PlayerAction, SchedulerError> {
        if !self.started {
            self.started = true;
            if let Some(buffer) = self.buffer.clone() {
                self.play(scheduler, buffer)?;
            }
        }
        Ok(PlayerAction::Send(Message::GetParams))
    }

    /// Stops audio, releasing the voice over [`RELEASE_TIME`].
    pub fn stop(&mut self) {
        self.started = false;
        self.voice.stop(RELEASE_TIME);
    }

    /// Applies a server message.
    pub fn handle(&mut self, message: Message) -> Option<PlayerAction> {
        match message {
            Message::PlayerGroup(group) => {
                debug!("player: assigned to group {group}");
                self.group = Some(group);
            }
            Message::UpdateBuffer { slot, sequence } => {
                if self.group != Some(slot) {
                    warn!(
                        "player: update for slot {slot} while in group {:?}",
                        self.group
                    );
                }
                // out-of-order announcements never lower the newest sequence
                self.sequence = self.sequence.max(sequence);
                return Some(PlayerAction::FetchSegment { slot, sequence });
            }
            Message::Param(param, value) => self.apply_param(param, value),
            other => debug!("player: ignoring '{}'", other.selector()),
        }
        None
    }

    fn apply_param(&mut self, param: Param, value: ParamValue) {
        match (param, value) {
            (Param::Freeze, ParamValue::Flag(frozen)) => self.frozen = frozen,
            (Param::End, ParamValue::Flag(ended)) => {
                self.ended = ended;
                if ended {
                    self.buffer = None;
                    self.voice.stop(FADE_TIME);
                }
            }
            (Param::Period, ParamValue::Number(ms)) => self.voice.set_period(0.001 * ms),
            (Param::Duration, ParamValue::Number(ms)) => {
                self.grain_duration = 0.001 * ms;
                self.update_grain_window();
            }
            (Param::Blur, ParamValue::Number(ms)) => {
                self.grain_var = 0.001 * ms;
                self.voice.set_position_var(self.grain_var);
                self.update_grain_window();
            }
            (Param::Pitch, ParamValue::Number(cents)) => self.voice.set_resampling(cents),
            (Param::Bubble, ParamValue::Number(cents)) => self.voice.set_resampling_var(cents),
            (Param::Attack, ParamValue::Number(pct)) => self.voice.set_attack(0.01 * pct),
            (Param::Release, ParamValue::Number(pct)) => self.voice.set_release(0.01 * pct),
            (Param::Gain, ParamValue::Number(db)) => self.voice.set_gain(db_to_linear(db)),
            (param, value) => warn!("player: invalid value {value:?} for '{param}'"),
        }
    }

    /// Hands over a decoded segment. Returns whether it is now playing.
    ///
    /// Segments older than the newest one announced are dropped, as are
    /// segments arriving while recording is frozen or the session has ended.
    pub fn segment_loaded(
        &mut self,
        scheduler: &mut Scheduler,
        sequence: u64,
        buffer: Arc<AudioBuffer>,
    ) -> Result<bool, SchedulerError> {
        if sequence < self.sequence {
            debug!("player: dropping stale segment {sequence}");
            return Ok(false);
        }
        if self.frozen || self.ended {
            return Ok(false);
        }
        self.buffer = Some(buffer.clone());
        if self.started {
            self.play(scheduler, buffer)?;
        }
        Ok(true)
    }

    fn play(
        &mut self,
        scheduler: &mut Scheduler,
        buffer: Arc<AudioBuffer>,
    ) -> Result<(), SchedulerError> {
        self.voice.set_buffer(scheduler, Some(buffer), FADE_TIME)?;
        if !self.voice.is_playing() {
            self.voice.start();
        }
        self.update_grain_window();
        let (x, y) = self.touch;
        self.set_touch_position(x, y);
        Ok(())
    }

    fn update_grain_window(&mut self) {
        let Some(buffer) = &self.buffer else {
            return;
        };
        let buffer_duration = buffer.duration();
        let max_duration = buffer_duration - 2.0 * MIN_POSITION_VAR;
        let duration = max_duration.min(self.grain_duration);
        let max_position_var = 0.5 * (buffer_duration - self.grain_duration);
        let position_var = max_position_var.min(self.grain_var);

        self.voice.set_duration(duration);
        self.voice.set_position_var(position_var);

        let margin = 0.5 * (duration + 2.0 * position_var);
        self.min_position = margin;
        self.max_position = buffer_duration - margin;
    }

    /// Maps normalized touch coordinates to a playback position.
    pub fn set_touch_position(&mut self, x: f64, y: f64) {
        self.touch = (x, y);
        if let Some(buffer) = &self.buffer {
            let position = (x * buffer.duration())
                .min(self.max_position)
                .max(self.min_position);
            self.voice.set_position(position);
        }
    }
}
