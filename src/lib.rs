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

//! The control core of a live DJ deck.
//!
//! A [clock::MasterClock] is ticked once per audio buffer. Decks schedule playback on buffer
//! boundaries against it, and the [samples::Sampler] mixes one-shot sounds with a hard
//! polyphony limit. MIDI arrives on its own thread through the [midi::MidiRouter], which turns
//! mapped controls into calls on a [transport::TransportController] and can learn new mappings.

pub mod analysis;
pub mod clock;
pub mod config;
pub mod deck;
pub mod dsp;
pub mod midi;
pub mod samples;
pub mod session;
pub mod ticker;
pub mod transport;
pub mod util;

#[cfg(test)]
mod testutil;
