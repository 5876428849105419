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

//! Per-track transport.
//!
//! A deck moves between three states:
//! - Idle: not playing, nothing scheduled.
//! - Scheduled: playing, waiting for the master clock to reach a buffer boundary.
//! - Playing: playing, advancing one buffer per `process()` call.
//!
//! Playback never starts mid-buffer: `play()` always schedules the start on the next boundary.

use std::sync::Arc;

use tracing::{debug, info};

use crate::clock::SharedClock;
use crate::dsp::{DspResult, DspStage};

mod source;

pub use source::{AudioHeader, AudioSource, WavSource};

#[derive(Debug, thiserror::Error)]
pub enum DeckError {
    #[error("unable to decode audio header from {source_name}: {reason}")]
    Decode { source_name: String, reason: String },

    #[error("tempo ratio must be positive and finite, got {0}")]
    InvalidTempo(f64),
}

/// The externally visible state of a deck.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportState {
    pub playing: bool,
    pub position_seconds: f64,
    pub duration_seconds: f64,
    pub tempo_ratio: f64,
    pub pitch_semitones: f64,
    pub scheduled_start_frame: Option<u64>,
}

/// A deck capable of loading a track and scheduling its playback against the master clock.
pub struct Deck {
    name: String,
    clock: SharedClock,
    dsp: Arc<dyn DspStage>,
    track: Option<String>,
    total_frames: u64,
    file_sample_rate: Option<u32>,
    position_frames: u64,
    playing: bool,
    tempo_ratio: f64,
    pitch_semitones: f64,
    scheduled_start_frame: Option<u64>,
    last_dsp_result: Option<DspResult>,
}

impl Deck {
    /// Creates an empty deck.
    pub fn new(name: &str, clock: SharedClock, dsp: Arc<dyn DspStage>) -> Deck {
        Deck {
            name: name.to_string(),
            clock,
            dsp,
            track: None,
            total_frames: 0,
            file_sample_rate: None,
            position_frames: 0,
            playing: false,
            tempo_ratio: 1.0,
            pitch_semitones: 0.0,
            scheduled_start_frame: None,
            last_dsp_result: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The name of the loaded track, if any.
    pub fn track(&self) -> Option<&str> {
        self.track.as_deref()
    }

    /// Loads a track. On success the deck is reset to Idle at position zero. On failure the
    /// deck is left untouched.
    pub fn load(&mut self, source: &dyn AudioSource) -> Result<(), DeckError> {
        let header = source.read_header()?;

        self.track = Some(source.name());
        self.total_frames = header.total_frames;
        self.file_sample_rate = Some(header.sample_rate);
        self.position_frames = 0;
        self.playing = false;
        self.scheduled_start_frame = None;
        self.last_dsp_result = None;

        info!(
            deck = self.name,
            track = self.track.as_deref(),
            frames = header.total_frames,
            sample_rate = header.sample_rate,
            "Track loaded."
        );
        Ok(())
    }

    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    pub fn position_frames(&self) -> u64 {
        self.position_frames
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn scheduled_start_frame(&self) -> Option<u64> {
        self.scheduled_start_frame
    }

    pub fn tempo_ratio(&self) -> f64 {
        self.tempo_ratio
    }

    pub fn pitch_semitones(&self) -> f64 {
        self.pitch_semitones
    }

    /// Sets the tempo ratio. Non-positive or non-finite ratios are rejected and the previous
    /// ratio is kept.
    pub fn set_tempo_ratio(&mut self, tempo_ratio: f64) -> Result<(), DeckError> {
        if !tempo_ratio.is_finite() || tempo_ratio <= 0.0 {
            return Err(DeckError::InvalidTempo(tempo_ratio));
        }
        self.tempo_ratio = tempo_ratio;
        Ok(())
    }

    pub fn set_pitch_semitones(&mut self, pitch_semitones: f64) {
        self.pitch_semitones = pitch_semitones;
    }

    /// The duration of the loaded track at its native sample rate.
    pub fn duration_seconds(&self) -> f64 {
        match self.file_sample_rate {
            Some(rate) if rate > 0 => self.total_frames as f64 / f64::from(rate),
            _ => 0.0,
        }
    }

    /// Moves the playhead. Positions past the end of the track are clamped to the end.
    pub fn seek(&mut self, seconds: f64) {
        let frames = self.clock.read().seconds_to_frames(seconds);
        self.position_frames = frames.min(self.total_frames);
        debug!(deck = self.name, position = self.position_frames, "Seek.");
    }

    /// Schedules playback on the next buffer boundary and returns that frame.
    pub fn play(&mut self) -> u64 {
        let start = self.clock.read().next_boundary();
        self.playing = true;
        self.scheduled_start_frame = Some(start);
        debug!(deck = self.name, start, "Playback scheduled.");
        start
    }

    /// Stops advancing. Any pending schedule is left as is.
    pub fn pause(&mut self) {
        self.playing = false;
    }

    /// Stops playback and returns the playhead to the start.
    pub fn stop(&mut self) {
        self.playing = false;
        self.position_frames = 0;
        self.scheduled_start_frame = None;
    }

    /// Processes one buffer. Returns nothing while idle or while waiting for the scheduled start.
    pub fn process(&mut self) -> Option<DspResult> {
        if !self.playing {
            return None;
        }

        let (frame_counter, buffer_size) = {
            let clock = self.clock.read();
            (clock.frame_counter(), clock.buffer_size())
        };

        if let Some(start) = self.scheduled_start_frame {
            if frame_counter < start {
                return None;
            }
            self.scheduled_start_frame = None;
        }

        let result = self.dsp.process(
            u64::from(buffer_size),
            self.tempo_ratio,
            self.pitch_semitones,
        );
        self.position_frames = self
            .position_frames
            .saturating_add(result.advanced_frames)
            .min(self.total_frames);

        if self.position_frames >= self.total_frames {
            self.playing = false;
            debug!(deck = self.name, "Reached end of track.");
        }

        self.last_dsp_result = Some(result.clone());
        Some(result)
    }

    /// A snapshot of the transport.
    pub fn transport_state(&self) -> TransportState {
        TransportState {
            playing: self.playing,
            position_seconds: self.clock.read().frames_to_seconds(self.position_frames),
            duration_seconds: self.duration_seconds(),
            tempo_ratio: self.tempo_ratio,
            pitch_semitones: self.pitch_semitones,
            scheduled_start_frame: self.scheduled_start_frame,
        }
    }

    /// A description of the last processed buffer.
    pub fn last_dsp_summary(&self) -> Option<String> {
        self.last_dsp_result.as_ref().map(DspResult::describe)
    }
}

impl std::fmt::Debug for Deck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deck")
            .field("name", &self.name)
            .field("track", &self.track)
            .field("position_frames", &self.position_frames)
            .field("total_frames", &self.total_frames)
            .field("playing", &self.playing)
            .field("scheduled_start_frame", &self.scheduled_start_frame)
            .finish()
    }
}
