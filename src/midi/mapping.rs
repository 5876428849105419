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

use std::{convert::Infallible, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use super::message::{MessageType, MidiMessage};
use crate::transport::DeckId;

/// An action that a MIDI control can be bound to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(from = "String", into = "String")]
pub enum MidiAction {
    PlayDeck(DeckId),
    TempoDeck(DeckId),
    PitchDeck(DeckId),
    Crossfader,
    SamplerPad,
    /// An action name this build doesn't know about. Kept so that stored mappings survive a
    /// round trip, but never dispatched.
    Other(String),
}

impl MidiAction {
    pub fn as_str(&self) -> &str {
        match self {
            MidiAction::PlayDeck(DeckId::A) => "play_deck_a",
            MidiAction::PlayDeck(DeckId::B) => "play_deck_b",
            MidiAction::TempoDeck(DeckId::A) => "tempo_deck_a",
            MidiAction::TempoDeck(DeckId::B) => "tempo_deck_b",
            MidiAction::PitchDeck(DeckId::A) => "pitch_deck_a",
            MidiAction::PitchDeck(DeckId::B) => "pitch_deck_b",
            MidiAction::Crossfader => "crossfader",
            MidiAction::SamplerPad => "sampler_pad",
            MidiAction::Other(name) => name,
        }
    }
}

impl From<String> for MidiAction {
    fn from(value: String) -> Self {
        match value.as_str() {
            "play_deck_a" => MidiAction::PlayDeck(DeckId::A),
            "play_deck_b" => MidiAction::PlayDeck(DeckId::B),
            "tempo_deck_a" => MidiAction::TempoDeck(DeckId::A),
            "tempo_deck_b" => MidiAction::TempoDeck(DeckId::B),
            "pitch_deck_a" => MidiAction::PitchDeck(DeckId::A),
            "pitch_deck_b" => MidiAction::PitchDeck(DeckId::B),
            "crossfader" => MidiAction::Crossfader,
            "sampler_pad" => MidiAction::SamplerPad,
            _ => MidiAction::Other(value),
        }
    }
}

impl From<MidiAction> for String {
    fn from(value: MidiAction) -> Self {
        match value {
            MidiAction::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

impl FromStr for MidiAction {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(MidiAction::from(s.to_string()))
    }
}

impl fmt::Display for MidiAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The identity of a physical control. Mappings are unique per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
pub struct MappingKey {
    pub message_type: MessageType,
    pub channel: u8,
    pub control: u8,
}

impl MappingKey {
    pub fn new(message_type: MessageType, channel: u8, control: u8) -> MappingKey {
        MappingKey {
            message_type,
            channel,
            control,
        }
    }
}

impl From<&MidiMessage> for MappingKey {
    fn from(message: &MidiMessage) -> Self {
        MappingKey::new(message.message_type, message.channel, message.control)
    }
}

impl fmt::Display for MappingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ch={} control={}",
            self.message_type, self.channel, self.control
        )
    }
}

/// A binding from a physical control to an action.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct MidiMapping {
    pub message_type: MessageType,
    pub channel: u8,
    pub control: u8,
    pub action: MidiAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

impl MidiMapping {
    pub fn new(key: MappingKey, action: MidiAction, target: Option<String>) -> MidiMapping {
        MidiMapping {
            message_type: key.message_type,
            channel: key.channel,
            control: key.control,
            action,
            target,
        }
    }

    pub fn key(&self) -> MappingKey {
        MappingKey::new(self.message_type, self.channel, self.control)
    }

    /// The sampler pad named by the target. A missing or non-numeric target selects pad 0.
    pub fn pad(&self) -> u32 {
        self.target
            .as_deref()
            .and_then(|target| target.trim().parse::<u32>().ok())
            .unwrap_or(0)
    }
}

impl fmt::Display for MidiMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.key(), self.action)?;
        if let Some(target) = &self.target {
            write!(f, " ({})", target)?;
        }
        Ok(())
    }
}
