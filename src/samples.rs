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

//! One-shot sample playback.
//!
//! This module provides:
//! - Sound storage (raw little-endian f32 PCM) behind a repository trait
//! - Time-ordered trigger scheduling, including beat-grid quantization
//! - Voice management with a hard polyphony limit and oldest-first stealing
//! - Mixing with attack/release envelopes

mod engine;
mod repository;
mod schedule;
mod time;
mod voice;

pub use engine::{
    DeckState, Envelope, Sampler, SamplerSettings, DEFAULT_ATTACK_MS, DEFAULT_MAX_VOICES,
    DEFAULT_RELEASE_MS,
};
pub use repository::{
    decode_f32le, encode_f32le, DirectorySoundRepository, MemorySoundRepository, Sound,
    SoundError, SoundId, SoundRepository,
};
pub use schedule::{ScheduledTrigger, TriggerQueue};
pub use time::{ManualTime, MonotonicTime, TimeSource};
pub use voice::{Voice, VoiceAllocator, VoiceId};
