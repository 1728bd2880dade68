//! Circular buffer slicing the live stream into overlapping segments.
//!
//! Every slot of the ring holds two hops of samples, a hop being one second
//! of audio. Incoming samples are written twice: at the cursor in the second
//! half of the current slot and at the same offset in the first half of the
//! next slot. When a hop is complete the current slot therefore holds the
//! previous hop followed by the new one, and is emitted as a segment.

use tracing::debug;

pub const DEFAULT_NUM_BUFFERS: usize = 4;

/// Group notified of a segment, and file slot the segment is stored in.
///
/// Both must always agree: a player fetches the file named after its own
/// group.
pub fn segment_slot(sequence: u64, player_groups: usize) -> usize {
    (sequence % player_groups.max(1) as u64) as usize
}

/// Converts a float sample to 16 bits.
///
/// Values at or beyond full scale wrap around instead of being clamped:
/// `1.0` becomes `-32768`.
pub fn quantize(sample: f32) -> i16 {
    let scaled = (32768.0 * sample as f64 + 0.5).floor();
    scaled as i64 as i16
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletedSegment {
    pub sequence: u64,
    pub slot: usize,
    /// Two hops of audio, the second one being new.
    pub samples: Vec<i16>,
}

pub struct SegmentRing {
    buffers: Vec<Vec<i16>>,
    hop: usize,
    buffer_count: i64,
    first_valid: i64,
    cursor: usize,
    frozen: bool,
    player_groups: usize,
}

impl SegmentRing {
    pub fn new(num_buffers: usize, hop: usize, player_groups: usize) -> Self {
        let num_buffers = num_buffers.max(2);
        let hop = hop.max(1);
        SegmentRing {
            buffers: vec![vec![0; 2 * hop]; num_buffers],
            hop,
            buffer_count: -1,
            first_valid: 0,
            cursor: 0,
            frozen: false,
            player_groups: player_groups.max(1),
        }
    }

    pub fn hop(&self) -> usize {
        self.hop
    }

    pub fn num_buffers(&self) -> usize {
        self.buffers.len()
    }

    /// Sequence number of the slot being written, `-1` before the first hop.
    pub fn buffer_count(&self) -> i64 {
        self.buffer_count
    }

    pub fn first_valid(&self) -> i64 {
        self.first_valid
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Freezes or resumes recording. Resuming always resets the stream.
    pub fn set_frozen(&mut self, frozen: bool) {
        self.frozen = frozen;
        if !frozen {
            self.reset();
        }
    }

    /// Starts a new stream: the next completed hop is treated as transient
    /// and not emitted.
    pub fn reset(&mut self) {
        if self.buffer_count > 0 {
            self.buffer_count -= 1;
        }
        self.first_valid = self.buffer_count + 1;
        self.cursor = 0;
        debug!(
            "segment ring reset: count {}, first valid {}",
            self.buffer_count, self.first_valid
        );
    }

    fn slot_index(&self, count: i64) -> usize {
        count.rem_euclid(self.buffers.len() as i64) as usize
    }

    /// Appends a chunk of little-endian `f32` samples and returns the
    /// segments it completed. Ignored while frozen.
    ///
    /// Trailing bytes that do not form a whole sample are dropped.
    pub fn append(&mut self, chunk: &[u8]) -> Vec<CompletedSegment> {
        let mut completed = Vec::new();
        if self.frozen {
            return completed;
        }

        for bytes in chunk.chunks_exact(4) {
            let value = quantize(f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]));
            let current = self.slot_index(self.buffer_count);
            let next = self.slot_index(self.buffer_count + 1);

            self.buffers[current][self.hop + self.cursor] = value;
            self.buffers[next][self.cursor] = value;
            self.cursor += 1;

            if self.cursor >= self.hop {
                if self.buffer_count >= self.first_valid {
                    let sequence = self.buffer_count as u64;
                    completed.push(CompletedSegment {
                        sequence,
                        slot: segment_slot(sequence, self.player_groups),
                        samples: self.buffers[current].clone(),
                    });
                }
                self.buffer_count += 1;
                self.cursor = 0;
            }
        }
        completed
    }
}
