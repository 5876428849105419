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

use std::{collections::BTreeMap, path::PathBuf, time::Duration};

use duration_string::DurationString;
use serde::Deserialize;

use super::error::ConfigError;
use crate::clock::{DEFAULT_BUFFER_SIZE, DEFAULT_SAMPLE_RATE};
use crate::midi::DEFAULT_STOP_TIMEOUT;
use crate::samples::{
    SamplerSettings, SoundId, DEFAULT_ATTACK_MS, DEFAULT_MAX_VOICES, DEFAULT_RELEASE_MS,
};
use crate::session::{SessionSettings, DEFAULT_PITCH_RANGE_SEMITONES, DEFAULT_TEMPO_RANGE};

const DEFAULT_MAPPING_STORE: &str = "midi_mappings.yaml";
const DEFAULT_ANALYSIS_CACHE: &str = "cache";

/// Assigns a sound to a sampler pad.
#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Pad {
    pub pad: u32,
    pub sound: SoundId,
}

/// A YAML representation of the deckhand configuration. Every field is optional.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Settings {
    /// Engine sample rate in Hz (default: 48000).
    sample_rate: Option<u32>,

    /// Frames per audio buffer (default: 512).
    buffer_size: Option<u32>,

    /// Sampler polyphony (default: 8).
    max_voices: Option<usize>,

    /// Sampler attack ramp (default: 2ms).
    attack_ms: Option<f64>,

    /// Sampler release ramp (default: 8ms).
    release_ms: Option<f64>,

    /// Tempo fader range as a fraction of the original tempo (default: 0.08).
    tempo_range: Option<f64>,

    /// Pitch control range in semitones (default: 2).
    pitch_range_semitones: Option<f64>,

    /// How long to wait for the MIDI router to stop, e.g. "500ms" (default: 1s).
    router_stop_timeout: Option<String>,

    /// The MIDI mapping file (default: midi_mappings.yaml).
    mapping_store: Option<PathBuf>,

    /// A directory of sounds with a sounds.yaml index.
    sounds: Option<PathBuf>,

    /// Sampler pad assignments.
    #[serde(default)]
    pads: Vec<Pad>,

    /// The MIDI input port to listen on. Any port whose name contains this matches.
    midi_input: Option<String>,

    /// Where analysis results are cached (default: cache).
    analysis_cache: Option<PathBuf>,

    /// Analysis worker threads (default: number of CPUs).
    analysis_workers: Option<usize>,
}

impl Settings {
    /// Checks values that would otherwise only fail once the engine is running.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate() == 0 {
            return Err(ConfigError::invalid("sample_rate", "must be positive"));
        }
        if self.buffer_size() == 0 {
            return Err(ConfigError::invalid("buffer_size", "must be positive"));
        }
        if self.max_voices() == 0 {
            return Err(ConfigError::invalid("max_voices", "must be positive"));
        }
        for (field, value) in [
            ("attack_ms", self.attack_ms()),
            ("release_ms", self.release_ms()),
            ("pitch_range_semitones", self.pitch_range_semitones()),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::invalid(field, "must not be negative"));
            }
        }
        let tempo_range = self.tempo_range();
        if !(0.0..1.0).contains(&tempo_range) {
            return Err(ConfigError::invalid(
                "tempo_range",
                "must be at least 0 and less than 1",
            ));
        }
        self.router_stop_timeout()?;
        self.pad_assignments()?;
        Ok(())
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE)
    }

    pub fn buffer_size(&self) -> u32 {
        self.buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE)
    }

    pub fn max_voices(&self) -> usize {
        self.max_voices.unwrap_or(DEFAULT_MAX_VOICES)
    }

    pub fn attack_ms(&self) -> f64 {
        self.attack_ms.unwrap_or(DEFAULT_ATTACK_MS)
    }

    pub fn release_ms(&self) -> f64 {
        self.release_ms.unwrap_or(DEFAULT_RELEASE_MS)
    }

    pub fn tempo_range(&self) -> f64 {
        self.tempo_range.unwrap_or(DEFAULT_TEMPO_RANGE)
    }

    pub fn pitch_range_semitones(&self) -> f64 {
        self.pitch_range_semitones
            .unwrap_or(DEFAULT_PITCH_RANGE_SEMITONES)
    }

    pub fn router_stop_timeout(&self) -> Result<Duration, ConfigError> {
        match &self.router_stop_timeout {
            Some(timeout) => Ok(DurationString::from_string(timeout.clone())
                .map_err(|e| ConfigError::invalid("router_stop_timeout", e))?
                .into()),
            None => Ok(DEFAULT_STOP_TIMEOUT),
        }
    }

    pub fn mapping_store(&self) -> PathBuf {
        self.mapping_store
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_MAPPING_STORE))
    }

    pub fn sounds(&self) -> Option<&PathBuf> {
        self.sounds.as_ref()
    }

    /// Pad to sound assignments. A pad may only be assigned once.
    pub fn pad_assignments(&self) -> Result<BTreeMap<u32, SoundId>, ConfigError> {
        let mut assignments = BTreeMap::new();
        for pad in &self.pads {
            if assignments.insert(pad.pad, pad.sound).is_some() {
                return Err(ConfigError::invalid(
                    "pads",
                    format!("pad {} is assigned more than once", pad.pad),
                ));
            }
        }
        Ok(assignments)
    }

    pub fn midi_input(&self) -> Option<&str> {
        self.midi_input.as_deref()
    }

    pub fn analysis_cache(&self) -> PathBuf {
        self.analysis_cache
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ANALYSIS_CACHE))
    }

    pub fn analysis_workers(&self) -> usize {
        self.analysis_workers.unwrap_or_else(num_cpus::get).max(1)
    }

    pub fn sampler_settings(&self) -> SamplerSettings {
        SamplerSettings {
            sample_rate: self.sample_rate(),
            max_voices: self.max_voices(),
            attack_ms: self.attack_ms(),
            release_ms: self.release_ms(),
        }
    }

    pub fn session_settings(&self) -> Result<SessionSettings, ConfigError> {
        Ok(SessionSettings {
            tempo_range: self.tempo_range(),
            pitch_range_semitones: self.pitch_range_semitones(),
            pads: self.pad_assignments()?,
        })
    }
}
