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

//! The capability MIDI routing drives.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifies one of the two decks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum DeckId {
    A,
    B,
}

impl fmt::Display for DeckId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeckId::A => write!(f, "A"),
            DeckId::B => write!(f, "B"),
        }
    }
}

/// Actions driven by MIDI controls. Implementations are responsible for applying these to deck
/// and sampler state safely across threads.
pub trait TransportController: Send + Sync {
    fn toggle_play_pause(&self, deck: DeckId);

    /// Sets the tempo fader position, 0.0 to 1.0.
    fn set_tempo(&self, deck: DeckId, value: f64);

    /// Sets the pitch control position, roughly -1.0 to 1.0.
    fn set_pitch(&self, deck: DeckId, value: f64);

    /// Sets the crossfader position, 0.0 to 1.0.
    fn set_crossfader(&self, value: f64);

    /// Fires a sampler pad with a raw MIDI velocity, 0 to 127.
    fn trigger_sampler(&self, pad: u32, velocity: u8);
}

/// Normalizes a 7-bit fader value into 0.0 to 1.0.
pub fn normalize_slider(value: u8) -> f64 {
    (f64::from(value) / 127.0).clamp(0.0, 1.0)
}

/// Normalizes a 7-bit pitch value centered on 64 into roughly -1.0 to 1.0.
pub fn normalize_pitch(value: u8) -> f64 {
    (f64::from(value) - 64.0) / 64.0
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_normalize_slider() {
        assert_eq!(normalize_slider(0), 0.0);
        assert_eq!(normalize_slider(127), 1.0);
        assert!((normalize_slider(100) - 100.0 / 127.0).abs() < f64::EPSILON);
        // Values above the 7-bit range still clamp.
        assert_eq!(normalize_slider(255), 1.0);
    }

    #[test]
    fn test_normalize_pitch() {
        assert_eq!(normalize_pitch(64), 0.0);
        assert_eq!(normalize_pitch(0), -1.0);
        assert!((normalize_pitch(127) - 63.0 / 64.0).abs() < f64::EPSILON);
    }
}
