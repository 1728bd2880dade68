//! Decoded mono audio held in memory, the source material of every grain.

use std::io::Cursor;

use crate::clock::AudioTime;
use crate::error::BufferError;

/// Immutable mono sample buffer.
///
/// Players receive segments as WAV files; only the first channel is kept,
/// which is what a browser exposes through `getChannelData(0)`.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        AudioBuffer {
            samples,
            sample_rate,
        }
    }

    /// Decodes an in-memory WAV file.
    ///
    /// Integer formats of 8 to 32 bits and 32 bit float are accepted.
    pub fn from_wav_bytes(bytes: &[u8]) -> Result<Self, BufferError> {
        let mut reader = hound::WavReader::new(Cursor::new(bytes))?;
        let spec = reader.spec();
        let channels = spec.channels.max(1) as usize;

        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => {
                if spec.bits_per_sample != 32 {
                    return Err(BufferError::UnsupportedFormat {
                        bits: spec.bits_per_sample,
                        format: "float",
                    });
                }
                reader.samples::<f32>().collect::<Result<_, _>>()?
            }
            hound::SampleFormat::Int => {
                if spec.bits_per_sample == 0 || spec.bits_per_sample > 32 {
                    return Err(BufferError::UnsupportedFormat {
                        bits: spec.bits_per_sample,
                        format: "int",
                    });
                }
                let scale = (1u64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<Result<_, _>>()?
            }
        };

        if interleaved.is_empty() {
            return Err(BufferError::Empty);
        }

        let samples = interleaved.into_iter().step_by(channels).collect();
        Ok(AudioBuffer::new(samples, spec.sample_rate))
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Length in seconds.
    pub fn duration(&self) -> AudioTime {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as AudioTime / self.sample_rate as AudioTime
    }

    /// Linearly interpolated value at `position` seconds, zero outside the buffer.
    pub fn sample_at(&self, position: AudioTime) -> f32 {
        if position < 0.0 || self.samples.is_empty() {
            return 0.0;
        }
        let index = position * self.sample_rate as AudioTime;
        let i = index.floor() as usize;
        if i >= self.samples.len() {
            return 0.0;
        }
        let frac = (index - i as AudioTime) as f32;
        let a = self.samples[i];
        let b = self.samples.get(i + 1).copied().unwrap_or(0.0);
        a + (b - a) * frac
    }
}
