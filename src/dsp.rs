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

//! The DSP-stage contract consumed by deck transport.
//!
//! A stage reports how many source frames a buffer of output consumed and which operations were
//! applied. Stages are expected to be pure and deterministic; nothing here makes claims about the
//! fidelity of the processed audio.

use std::fmt;

/// An operation applied by a DSP stage.
#[derive(Debug, Clone, PartialEq)]
pub struct DspOperation {
    pub name: &'static str,
    pub value: f64,
}

impl fmt::Display for DspOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)
    }
}

/// The result of running one buffer through a DSP stage.
#[derive(Debug, Clone, PartialEq)]
pub struct DspResult {
    /// Frames requested for the buffer.
    pub source_frames: u64,
    /// Frames the transport should advance by.
    pub advanced_frames: u64,
    pub tempo_ratio: f64,
    pub pitch_semitones: f64,
    pub operations: Vec<DspOperation>,
}

impl DspResult {
    /// A one-line summary, e.g. `frames=256 -> 384 (tempo=1.5, pitch=-2)`.
    pub fn describe(&self) -> String {
        let steps = self
            .operations
            .iter()
            .map(|op| op.to_string())
            .collect::<Vec<String>>()
            .join(", ");
        format!(
            "frames={} -> {} ({})",
            self.source_frames, self.advanced_frames, steps
        )
    }
}

/// A pluggable processing stage driven once per buffer by a deck.
pub trait DspStage: Send + Sync {
    fn process(&self, frame_count: u64, tempo_ratio: f64, pitch_semitones: f64) -> DspResult;
}

/// A stage that only records what a time-stretch and pitch-shift would do.
///
/// The frame count scales with the tempo ratio; pitch never changes the frame count.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetadataStage;

impl DspStage for MetadataStage {
    fn process(&self, frame_count: u64, tempo_ratio: f64, pitch_semitones: f64) -> DspResult {
        let advanced_frames = (frame_count as f64 * tempo_ratio).floor().max(0.0) as u64;
        DspResult {
            source_frames: frame_count,
            advanced_frames,
            tempo_ratio,
            pitch_semitones,
            operations: vec![
                DspOperation {
                    name: "tempo",
                    value: tempo_ratio,
                },
                DspOperation {
                    name: "pitch",
                    value: pitch_semitones,
                },
            ],
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_metadata_stage_scales_frames_by_tempo() {
        let result = MetadataStage.process(256, 1.5, -2.0);
        assert_eq!(result.source_frames, 256);
        assert_eq!(result.advanced_frames, 384);
        assert_eq!(result.tempo_ratio, 1.5);
        assert_eq!(result.pitch_semitones, -2.0);
        assert!(result.operations.iter().any(|op| op.name == "pitch"));
    }

    #[test]
    fn test_pitch_does_not_change_frame_count() {
        let result = MetadataStage.process(512, 1.0, 7.0);
        assert_eq!(result.advanced_frames, 512);
    }

    #[test]
    fn test_describe() {
        let result = MetadataStage.process(256, 1.5, -2.0);
        assert_eq!(result.describe(), "frames=256 -> 384 (tempo=1.5, pitch=-2)");
    }
}
