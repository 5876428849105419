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

use serde::{Deserialize, Serialize};

use crate::samples::DeckState;

/// Slowest tempo considered.
const MIN_BPM: f64 = 60.0;
/// Fastest tempo considered.
const MAX_BPM: f64 = 180.0;
/// Onset envelope resolution.
const HOPS_PER_SECOND: u32 = 100;

/// A constant-tempo beat grid.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Beatgrid {
    pub bpm: f64,
    /// Time of the first beat in seconds.
    pub first_beat: f64,
}

impl Beatgrid {
    pub fn beat_interval(&self) -> f64 {
        60.0 / self.bpm
    }

    /// The tempo and beat phase at a position in the track, for quantizing sampler triggers.
    pub fn deck_state(&self, position_seconds: f64) -> DeckState {
        DeckState {
            bpm: self.bpm,
            phase: ((position_seconds - self.first_beat) / self.beat_interval()).rem_euclid(1.0),
        }
    }

    /// Beat times from the first beat up to (not including) `until`.
    pub fn beats(&self, until: f64) -> impl Iterator<Item = f64> + '_ {
        (0u32..)
            .map(move |beat| self.first_beat + f64::from(beat) * self.beat_interval())
            .take_while(move |time| *time < until)
    }
}

/// Estimates tempo and first beat from interleaved samples by autocorrelating the onset
/// envelope. Returns None for audio too short or too quiet to carry a pulse.
pub fn estimate_beatgrid(samples: &[f32], channels: u16, sample_rate: u32) -> Option<Beatgrid> {
    let channels = usize::from(channels.max(1));
    let hop_frames = (sample_rate / HOPS_PER_SECOND).max(1) as usize;
    let hop_seconds = hop_frames as f64 / f64::from(sample_rate.max(1));

    let energy: Vec<f32> = samples
        .chunks(hop_frames * channels)
        .map(|hop| hop.iter().map(|s| s * s).sum::<f32>() / hop.len() as f32)
        .collect();
    let onsets: Vec<f32> = std::iter::once(energy.first().copied().unwrap_or(0.0))
        .chain(energy.windows(2).map(|pair| (pair[1] - pair[0]).max(0.0)))
        .collect();

    let min_lag = (60.0 / MAX_BPM / hop_seconds).floor().max(1.0) as usize;
    let max_lag = (60.0 / MIN_BPM / hop_seconds).ceil() as usize;
    if onsets.len() < max_lag * 2 || onsets.iter().all(|onset| *onset <= 0.0) {
        return None;
    }

    let correlation = |lag: usize| -> f32 {
        onsets
            .iter()
            .zip(&onsets[lag..])
            .map(|(a, b)| a * b)
            .sum()
    };
    let scores: Vec<f32> = (min_lag - 1..=max_lag + 1).map(correlation).collect();

    // Ties go to the shorter lag so a pulse isn't read at half tempo.
    let mut best = 1;
    for i in 1..scores.len() - 1 {
        if scores[i] > scores[best] {
            best = i;
        }
    }
    if scores[best] <= 0.0 {
        return None;
    }

    let (before, peak, after) = (scores[best - 1], scores[best], scores[best + 1]);
    let curvature = before - 2.0 * peak + after;
    let refinement = if curvature < 0.0 {
        f64::from(0.5 * (before - after) / curvature)
    } else {
        0.0
    };
    let lag = (min_lag - 1 + best) as f64 + refinement;

    let first_beat = (0..lag.ceil() as usize)
        .map(|offset| {
            let strength: f32 = (0u32..)
                .map(|beat| (offset as f64 + f64::from(beat) * lag).round() as usize)
                .take_while(|index| *index < onsets.len())
                .map(|index| onsets[index])
                .sum();
            (offset, strength)
        })
        .fold((0, f32::MIN), |best, candidate| {
            if candidate.1 > best.1 {
                candidate
            } else {
                best
            }
        })
        .0;

    Some(Beatgrid {
        bpm: 60.0 / (lag * hop_seconds),
        first_beat: first_beat as f64 * hop_seconds,
    })
}
