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

//! MIDI control: message parsing, persisted mappings, learn mode and the dispatch thread that
//! turns messages into transport actions.

mod input;
mod learner;
mod mapping;
mod message;
mod router;
mod store;

pub use input::{connect_input, list_ports, InputConnection};
pub use learner::{MidiLearner, PendingBinding};
pub use mapping::{MappingKey, MidiAction, MidiMapping};
pub use message::{MessageType, MidiMessage};
pub use router::{MessageSender, MessageSource, MidiRouter, RouterError, DEFAULT_STOP_TIMEOUT};
pub use store::{MappingStore, MemoryMappingStore, StoreError, YamlMappingStore};
