// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Sound storage.
//!
//! Sample data is stored as raw little-endian 32-bit float PCM, mono. Sounds are immutable once
//! decoded and are shared read-only between voices.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info};

/// Identifies a sound in a repository.
pub type SoundId = u32;

/// Width in bytes of one stored sample.
const SAMPLE_WIDTH: usize = std::mem::size_of::<f32>();

#[derive(Debug, thiserror::Error)]
pub enum SoundError {
    #[error("sound {0} not found")]
    NotFound(SoundId),

    #[error("sound {id} is corrupt: {len} bytes is not a whole number of f32 samples")]
    Corrupt { id: SoundId, len: usize },

    #[error("IO error reading sound {id}: {source}")]
    Io {
        id: SoundId,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to read sound index {}: {reason}", .path.display())]
    Index { path: PathBuf, reason: String },
}

/// A decoded sample that can be triggered by the sampler.
#[derive(Debug, Clone, PartialEq)]
pub struct Sound {
    pub id: SoundId,
    pub name: String,
    pub sample_rate: u32,
    data: Arc<[f32]>,
}

impl Sound {
    pub fn new(id: SoundId, name: &str, sample_rate: u32, data: Vec<f32>) -> Sound {
        Sound {
            id,
            name: name.to_string(),
            sample_rate,
            data: data.into(),
        }
    }

    /// Mono samples in the range [-1, 1].
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Looks sounds up by id.
pub trait SoundRepository: Send + Sync {
    fn get(&self, id: SoundId) -> Result<Arc<Sound>, SoundError>;
}

/// Decodes a little-endian f32 PCM blob.
pub fn decode_f32le(id: SoundId, raw: &[u8]) -> Result<Vec<f32>, SoundError> {
    if raw.len() % SAMPLE_WIDTH != 0 {
        return Err(SoundError::Corrupt { id, len: raw.len() });
    }
    Ok(raw
        .chunks_exact(SAMPLE_WIDTH)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

/// Encodes samples as a little-endian f32 PCM blob.
pub fn encode_f32le(samples: &[f32]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

struct StoredSound {
    name: String,
    sample_rate: u32,
    blob: Vec<u8>,
}

/// An in-memory repository holding encoded blobs, decoded on every lookup.
#[derive(Default)]
pub struct MemorySoundRepository {
    sounds: HashMap<SoundId, StoredSound>,
}

impl MemorySoundRepository {
    pub fn new() -> MemorySoundRepository {
        MemorySoundRepository::default()
    }

    /// Stores a raw blob. The blob is not validated until it is read.
    pub fn insert_blob(&mut self, id: SoundId, name: &str, sample_rate: u32, blob: Vec<u8>) {
        self.sounds.insert(
            id,
            StoredSound {
                name: name.to_string(),
                sample_rate,
                blob,
            },
        );
    }

    pub fn insert(&mut self, id: SoundId, name: &str, sample_rate: u32, samples: &[f32]) {
        self.insert_blob(id, name, sample_rate, encode_f32le(samples));
    }
}

impl SoundRepository for MemorySoundRepository {
    fn get(&self, id: SoundId) -> Result<Arc<Sound>, SoundError> {
        let stored = self.sounds.get(&id).ok_or(SoundError::NotFound(id))?;
        let data = decode_f32le(id, &stored.blob)?;
        Ok(Arc::new(Sound::new(
            id,
            &stored.name,
            stored.sample_rate,
            data,
        )))
    }
}

/// An entry in a sound directory's `sounds.yaml` index.
#[derive(Deserialize, Clone, Debug)]
struct IndexEntry {
    id: SoundId,
    name: String,
    sample_rate: u32,
    /// The raw PCM file, relative to the directory.
    file: String,
}

/// A directory of raw PCM files described by a `sounds.yaml` index.
///
/// ```yaml
/// - id: 1
///   name: kick
///   sample_rate: 48000
///   file: kick.f32
/// ```
pub struct DirectorySoundRepository {
    base_path: PathBuf,
    index: HashMap<SoundId, IndexEntry>,
}

impl DirectorySoundRepository {
    /// The name of the index file inside the directory.
    pub const INDEX_FILE: &'static str = "sounds.yaml";

    /// Opens the directory and reads its index.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<DirectorySoundRepository, SoundError> {
        let base_path = path.as_ref().to_path_buf();
        let index_path = base_path.join(Self::INDEX_FILE);
        let contents = fs::read_to_string(&index_path).map_err(|e| SoundError::Index {
            path: index_path.clone(),
            reason: e.to_string(),
        })?;
        let entries: Vec<IndexEntry> =
            serde_yaml::from_str(&contents).map_err(|e| SoundError::Index {
                path: index_path.clone(),
                reason: e.to_string(),
            })?;

        info!(path = ?base_path, sounds = entries.len(), "Sound index loaded");
        Ok(DirectorySoundRepository {
            base_path,
            index: entries.into_iter().map(|e| (e.id, e)).collect(),
        })
    }

    /// Ids of all indexed sounds, sorted.
    pub fn ids(&self) -> Vec<SoundId> {
        let mut ids: Vec<SoundId> = self.index.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

impl SoundRepository for DirectorySoundRepository {
    fn get(&self, id: SoundId) -> Result<Arc<Sound>, SoundError> {
        let entry = self.index.get(&id).ok_or(SoundError::NotFound(id))?;
        let path = if Path::new(&entry.file).is_absolute() {
            PathBuf::from(&entry.file)
        } else {
            self.base_path.join(&entry.file)
        };

        debug!(id, path = ?path, "Reading sound");
        let raw = fs::read(&path).map_err(|source| SoundError::Io { id, source })?;
        let data = decode_f32le(id, &raw)?;
        Ok(Arc::new(Sound::new(id, &entry.name, entry.sample_rate, data)))
    }
}
