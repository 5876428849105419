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

use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
};

use parking_lot::Mutex;
use thiserror::Error;
use tracing::debug;

use super::mapping::{MappingKey, MidiMapping};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unable to access mapping store {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed mapping store {}: {source}", .path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Persists MIDI mappings. Mappings are unique per (message type, channel, control), so saving
/// a mapping replaces any previous mapping for the same control.
pub trait MappingStore: Send + Sync {
    fn save_mapping(&self, mapping: MidiMapping) -> Result<(), StoreError>;

    /// Removes the mapping for the key. Returns whether a mapping was removed.
    fn delete_mapping(&self, key: &MappingKey) -> Result<bool, StoreError>;

    fn get_mapping(&self, key: &MappingKey) -> Result<Option<MidiMapping>, StoreError>;

    /// All mappings, ordered by key.
    fn load_all(&self) -> Result<Vec<MidiMapping>, StoreError>;
}

/// A mapping store that lives only as long as the process.
#[derive(Debug, Default)]
pub struct MemoryMappingStore {
    mappings: Mutex<BTreeMap<MappingKey, MidiMapping>>,
}

impl MemoryMappingStore {
    pub fn new() -> MemoryMappingStore {
        MemoryMappingStore::default()
    }

    pub fn with_mappings(mappings: Vec<MidiMapping>) -> MemoryMappingStore {
        MemoryMappingStore {
            mappings: Mutex::new(index(mappings)),
        }
    }
}

impl MappingStore for MemoryMappingStore {
    fn save_mapping(&self, mapping: MidiMapping) -> Result<(), StoreError> {
        self.mappings.lock().insert(mapping.key(), mapping);
        Ok(())
    }

    fn delete_mapping(&self, key: &MappingKey) -> Result<bool, StoreError> {
        Ok(self.mappings.lock().remove(key).is_some())
    }

    fn get_mapping(&self, key: &MappingKey) -> Result<Option<MidiMapping>, StoreError> {
        Ok(self.mappings.lock().get(key).cloned())
    }

    fn load_all(&self) -> Result<Vec<MidiMapping>, StoreError> {
        Ok(self.mappings.lock().values().cloned().collect())
    }
}

/// A mapping store backed by a YAML file holding a list of mappings. The file is read once when
/// opened and rewritten on every change.
#[derive(Debug)]
pub struct YamlMappingStore {
    path: PathBuf,
    mappings: Mutex<BTreeMap<MappingKey, MidiMapping>>,
}

impl YamlMappingStore {
    /// Opens the store. A missing file is an empty store; it's created on the first save.
    pub fn open(path: &Path) -> Result<YamlMappingStore, StoreError> {
        let mappings = match fs::read_to_string(path) {
            Ok(contents) if contents.trim().is_empty() => BTreeMap::new(),
            Ok(contents) => {
                let mappings: Vec<MidiMapping> =
                    serde_yaml::from_str(&contents).map_err(|source| StoreError::Yaml {
                        path: path.to_path_buf(),
                        source,
                    })?;
                index(mappings)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => {
                return Err(StoreError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        debug!(path = %path.display(), mappings = mappings.len(), "Opened mapping store");

        Ok(YamlMappingStore {
            path: path.to_path_buf(),
            mappings: Mutex::new(mappings),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, mappings: &BTreeMap<MappingKey, MidiMapping>) -> Result<(), StoreError> {
        let all: Vec<&MidiMapping> = mappings.values().collect();
        let contents = serde_yaml::to_string(&all).map_err(|source| StoreError::Yaml {
            path: self.path.clone(),
            source,
        })?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                    path: self.path.clone(),
                    source,
                })?;
            }
        }
        fs::write(&self.path, contents).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

impl MappingStore for YamlMappingStore {
    fn save_mapping(&self, mapping: MidiMapping) -> Result<(), StoreError> {
        let mut mappings = self.mappings.lock();
        let previous = mappings.insert(mapping.key(), mapping.clone());
        if let Err(e) = self.persist(&mappings) {
            // Keep memory and disk in agreement.
            match previous {
                Some(previous) => mappings.insert(mapping.key(), previous),
                None => mappings.remove(&mapping.key()),
            };
            return Err(e);
        }
        Ok(())
    }

    fn delete_mapping(&self, key: &MappingKey) -> Result<bool, StoreError> {
        let mut mappings = self.mappings.lock();
        let Some(previous) = mappings.remove(key) else {
            return Ok(false);
        };
        if let Err(e) = self.persist(&mappings) {
            mappings.insert(*key, previous);
            return Err(e);
        }
        Ok(true)
    }

    fn get_mapping(&self, key: &MappingKey) -> Result<Option<MidiMapping>, StoreError> {
        Ok(self.mappings.lock().get(key).cloned())
    }

    fn load_all(&self) -> Result<Vec<MidiMapping>, StoreError> {
        Ok(self.mappings.lock().values().cloned().collect())
    }
}

/// Later duplicates win, matching upsert semantics.
fn index(mappings: Vec<MidiMapping>) -> BTreeMap<MappingKey, MidiMapping> {
    mappings
        .into_iter()
        .map(|mapping| (mapping.key(), mapping))
        .collect()
}
