//! Encoded segments, kept in memory per slot and mirrored on disk.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::HubError;

const FILE_PREFIX: &str = "segment-";
const FILE_SUFFIX: &str = ".wav";

/// Encodes samples as a mono 16-bit PCM WAV file.
pub fn encode_wav(samples: &[i16], sample_rate: u32) -> Result<Vec<u8>, hound::Error> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::with_capacity(44 + 2 * samples.len()));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for sample in samples {
            writer.write_sample(*sample)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

pub fn segment_file_name(slot: usize) -> String {
    format!("{FILE_PREFIX}{slot}{FILE_SUFFIX}")
}

/// Slot named by a segment file name, `None` for anything else.
pub fn parse_segment_file_name(name: &str) -> Option<usize> {
    name.strip_prefix(FILE_PREFIX)?
        .strip_suffix(FILE_SUFFIX)?
        .parse()
        .ok()
}

pub struct SegmentStore {
    record_dir: PathBuf,
    slots: RwLock<Vec<Option<Bytes>>>,
}

impl SegmentStore {
    pub fn new(record_dir: impl Into<PathBuf>, slots: usize) -> Self {
        SegmentStore {
            record_dir: record_dir.into(),
            slots: RwLock::new(vec![None; slots.max(1)]),
        }
    }

    pub fn record_dir(&self) -> &Path {
        &self.record_dir
    }

    pub fn path_of(&self, slot: usize) -> PathBuf {
        self.record_dir.join(segment_file_name(slot))
    }

    /// Keeps the bytes of a slot for serving, then writes its file,
    /// replacing the previous one.
    ///
    /// The in-memory copy is updated even when writing the file fails.
    pub async fn put(&self, slot: usize, wav: Vec<u8>) -> Result<(), HubError> {
        let wav = Bytes::from(wav);
        {
            let mut slots = self.slots.write().await;
            if slot >= slots.len() {
                slots.resize(slot + 1, None);
            }
            slots[slot] = Some(wav.clone());
        }

        tokio::fs::create_dir_all(&self.record_dir).await?;
        let path = self.path_of(slot);
        tokio::fs::write(&path, &wav).await?;
        debug!("stored {} bytes in {}", wav.len(), path.display());
        Ok(())
    }

    pub async fn get(&self, slot: usize) -> Option<Bytes> {
        self.slots.read().await.get(slot).cloned().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_mono_16_bit() {
        let samples = [0i16, 1000, -1000, i16::MAX, i16::MIN];
        let wav = encode_wav(&samples, 8000).unwrap();

        let mut reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 8000);
        assert_eq!(spec.bits_per_sample, 16);
        let decoded: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(decoded, samples);
    }

    #[test]
    fn file_names_round_trip() {
        assert_eq!(segment_file_name(7), "segment-7.wav");
        assert_eq!(parse_segment_file_name("segment-7.wav"), Some(7));
        assert_eq!(parse_segment_file_name("segment-x.wav"), None);
        assert_eq!(parse_segment_file_name("../etc/passwd"), None);
    }

    #[tokio::test]
    async fn put_overwrites_the_slot() {
        let dir = tempfile::tempdir().unwrap();
        let store = SegmentStore::new(dir.path().join("audiofiles"), 2);
        assert!(store.get(1).await.is_none());

        store.put(1, vec![1, 2, 3]).await.unwrap();
        store.put(1, vec![4, 5]).await.unwrap();

        assert_eq!(store.get(1).await.unwrap().as_ref(), &[4, 5]);
        assert_eq!(std::fs::read(store.path_of(1)).unwrap(), vec![4, 5]);
        assert!(store.get(0).await.is_none());
    }

    #[tokio::test]
    async fn unwritable_directory_still_keeps_the_slot() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"not a directory").unwrap();
        let store = SegmentStore::new(blocker.join("audiofiles"), 2);

        assert!(matches!(store.put(0, vec![9, 9]).await, Err(HubError::Io(_))));
        assert_eq!(store.get(0).await.unwrap().as_ref(), &[9, 9]);
    }
}
