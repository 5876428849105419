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

//! Voice management for polyphonic one-shot playback.
//!
//! Voices live in a fixed arena sized to the polyphony limit, so allocation never grows memory
//! on the audio path. When the arena is full the voice with the earliest start time is stolen.

use std::sync::Arc;

use tracing::warn;

use super::repository::Sound;

/// A stable handle to a voice. Handles to evicted or swept voices stop resolving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoiceId {
    index: u32,
    generation: u32,
}

/// One in-flight instance of a triggered sound.
#[derive(Debug, Clone)]
pub struct Voice {
    id: VoiceId,
    sound: Arc<Sound>,
    /// Absolute time in seconds at which the first sample should sound.
    start_time: f64,
    /// Index of the next sample to mix.
    position: usize,
    /// Allocation order, used to break start time ties when stealing.
    serial: u64,
}

impl Voice {
    pub fn id(&self) -> VoiceId {
        self.id
    }

    pub fn sound(&self) -> &Arc<Sound> {
        &self.sound
    }

    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn is_finished(&self) -> bool {
        self.position >= self.sound.len()
    }

    /// Moves the cursor forward, never past the end of the sound.
    pub(super) fn advance(&mut self, samples: usize) {
        self.position = (self.position + samples).min(self.sound.len());
    }
}

struct Slot {
    generation: u32,
    voice: Option<Voice>,
}

/// Manages the polyphony limit and voice stealing.
pub struct VoiceAllocator {
    slots: Vec<Slot>,
    active: usize,
    next_serial: u64,
}

impl VoiceAllocator {
    /// Creates an allocator. Panics if `max_voices` is zero.
    pub fn new(max_voices: usize) -> Self {
        assert!(max_voices > 0, "max_voices must be positive");
        Self {
            slots: (0..max_voices)
                .map(|_| Slot {
                    generation: 0,
                    voice: None,
                })
                .collect(),
            active: 0,
            next_serial: 0,
        }
    }

    pub fn max_voices(&self) -> usize {
        self.slots.len()
    }

    pub fn active_count(&self) -> usize {
        self.active
    }

    /// Starts a voice for the sound, stealing the oldest voice if the limit has been reached.
    pub fn allocate(&mut self, sound: Arc<Sound>, start_time: f64) -> VoiceId {
        if self.active >= self.slots.len() {
            self.steal_oldest();
        }

        let free = self.slots.iter().position(|slot| slot.voice.is_none());
        let index = match free {
            Some(index) => index,
            // Unreachable while `active` tracks the occupied slots.
            None => self.steal_oldest(),
        };

        let slot = &mut self.slots[index];
        slot.generation = slot.generation.wrapping_add(1);
        let id = VoiceId {
            index: index as u32,
            generation: slot.generation,
        };
        slot.voice = Some(Voice {
            id,
            sound,
            start_time,
            position: 0,
            serial: self.next_serial,
        });
        self.next_serial += 1;
        self.active += 1;
        id
    }

    /// Evicts the voice with the smallest start time and returns its slot index.
    fn steal_oldest(&mut self) -> usize {
        let oldest = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.voice.as_ref().map(|v| (index, v)))
            .min_by(|(_, a), (_, b)| {
                a.start_time
                    .total_cmp(&b.start_time)
                    .then(a.serial.cmp(&b.serial))
            })
            .map(|(index, _)| index)
            .unwrap_or(0);

        if let Some(stolen) = self.slots[oldest].voice.take() {
            self.active -= 1;
            warn!(
                max_voices = self.slots.len(),
                sound = stolen.sound.name,
                start_time = stolen.start_time,
                "Voice limit reached, stealing oldest"
            );
        }
        oldest
    }

    /// Looks up a voice by handle.
    pub fn get(&self, id: VoiceId) -> Option<&Voice> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.voice.as_ref())
    }

    /// Iterates over the active voices.
    pub fn active(&self) -> impl Iterator<Item = &Voice> {
        self.slots.iter().filter_map(|slot| slot.voice.as_ref())
    }

    pub(super) fn active_mut(&mut self) -> impl Iterator<Item = &mut Voice> {
        self.slots.iter_mut().filter_map(|slot| slot.voice.as_mut())
    }

    /// Sweeps voices that have played to the end. Returns how many were removed.
    pub fn remove_finished(&mut self) -> usize {
        let mut removed = 0;
        for slot in self.slots.iter_mut() {
            if slot.voice.as_ref().is_some_and(Voice::is_finished) {
                slot.voice = None;
                removed += 1;
            }
        }
        self.active -= removed;
        removed
    }

    /// Drops every active voice.
    pub fn clear(&mut self) {
        for slot in self.slots.iter_mut() {
            slot.voice = None;
        }
        self.active = 0;
    }
}

impl std::fmt::Debug for VoiceAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceAllocator")
            .field("active_voices", &self.active)
            .field("max_voices", &self.slots.len())
            .finish()
    }
}
