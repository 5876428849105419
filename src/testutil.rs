// Copyright (C) 2025 Michael Wilson <mike@mdwn.dev>
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
    error::Error,
    fs::File,
    io,
    path::PathBuf,
    thread,
    time::{Duration, SystemTime},
};

use hound::{SampleFormat, WavSpec, WavWriter};
use parking_lot::Mutex;

use crate::midi::{
    MappingKey, MappingStore, MemoryMappingStore, MidiMapping, StoreError,
};
use crate::transport::{DeckId, TransportController};

/// Wait for the given predicate to return true or fail.
#[inline]
pub fn eventually<F>(predicate: F, error_msg: &str)
where
    F: Fn() -> bool,
{
    let start = SystemTime::now();
    let tick = Duration::from_millis(10);
    let timeout = Duration::from_secs(3);

    loop {
        let elapsed = start.elapsed();
        if elapsed.is_err() {
            panic!("System time error");
        }
        let elapsed = elapsed.unwrap();

        if elapsed > timeout {
            panic!("{}", error_msg);
        }
        if predicate() {
            return;
        }
        thread::sleep(tick);
    }
}

/// Writes a 32 bit float WAV file. Each inner vector is one channel; channels must be the same
/// length.
pub fn write_wav(
    path: PathBuf,
    samples: Vec<Vec<f32>>,
    sample_rate: u32,
) -> Result<(), Box<dyn Error>> {
    let tempwav = File::create(path)?;

    let num_channels = samples.len();
    assert!(num_channels <= u16::MAX.into(), "Too many channels!");
    let frames = samples.first().map(|channel| channel.len()).unwrap_or(0);
    assert!(
        samples.iter().all(|channel| channel.len() == frames),
        "Channels must be the same length"
    );

    let mut writer = WavWriter::new(
        tempwav,
        WavSpec {
            channels: num_channels as u16,
            sample_rate,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        },
    )?;

    for frame in 0..frames {
        for channel in &samples {
            writer.write_sample(channel[frame])?;
        }
    }
    writer.finalize()?;

    Ok(())
}

/// A transport call as seen by the [RecordingController].
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    TogglePlayPause(DeckId),
    SetTempo(DeckId, f64),
    SetPitch(DeckId, f64),
    SetCrossfader(f64),
    TriggerSampler(u32, u8),
}

/// A transport controller that records every call it receives.
#[derive(Debug, Default)]
pub struct RecordingController {
    calls: Mutex<Vec<Call>>,
}

impl RecordingController {
    pub fn new() -> RecordingController {
        RecordingController::default()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }
}

impl TransportController for RecordingController {
    fn toggle_play_pause(&self, deck: DeckId) {
        self.record(Call::TogglePlayPause(deck));
    }

    fn set_tempo(&self, deck: DeckId, value: f64) {
        self.record(Call::SetTempo(deck, value));
    }

    fn set_pitch(&self, deck: DeckId, value: f64) {
        self.record(Call::SetPitch(deck, value));
    }

    fn set_crossfader(&self, value: f64) {
        self.record(Call::SetCrossfader(value));
    }

    fn trigger_sampler(&self, pad: u32, velocity: u8) {
        self.record(Call::TriggerSampler(pad, velocity));
    }
}

/// A mapping store that can't save, and can't read the keys it was told are broken.
#[derive(Debug, Default)]
pub struct FailingStore {
    mappings: MemoryMappingStore,
    broken: Vec<MappingKey>,
}

impl FailingStore {
    pub fn new(mappings: Vec<MidiMapping>, broken: Vec<MappingKey>) -> FailingStore {
        FailingStore {
            mappings: MemoryMappingStore::with_mappings(mappings),
            broken,
        }
    }

    fn error() -> StoreError {
        StoreError::Io {
            path: PathBuf::from("failing.yaml"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "read only"),
        }
    }
}

impl MappingStore for FailingStore {
    fn save_mapping(&self, _: MidiMapping) -> Result<(), StoreError> {
        Err(FailingStore::error())
    }

    fn delete_mapping(&self, _: &MappingKey) -> Result<bool, StoreError> {
        Err(FailingStore::error())
    }

    fn get_mapping(&self, key: &MappingKey) -> Result<Option<MidiMapping>, StoreError> {
        if self.broken.contains(key) {
            return Err(FailingStore::error());
        }
        self.mappings.get_mapping(key)
    }

    fn load_all(&self) -> Result<Vec<MidiMapping>, StoreError> {
        self.mappings.load_all()
    }
}
