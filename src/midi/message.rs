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

use std::{fmt, str::FromStr};

use midly::live::LiveEvent;
use midly::num::{u4, u7};
use serde::{Deserialize, Serialize};

/// The kinds of MIDI message that can be routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    NoteOn,
    ControlChange,
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageType::NoteOn => write!(f, "note_on"),
            MessageType::ControlChange => write!(f, "control_change"),
        }
    }
}

impl FromStr for MessageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "note_on" => Ok(MessageType::NoteOn),
            "control_change" => Ok(MessageType::ControlChange),
            _ => Err(format!(
                "unknown message type {}, expected note_on or control_change",
                s
            )),
        }
    }
}

/// A normalized MIDI message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MidiMessage {
    pub message_type: MessageType,
    /// Zero-based MIDI channel.
    pub channel: u8,
    /// Note number or controller number.
    pub control: u8,
    /// Velocity or controller value.
    pub value: u8,
}

impl MidiMessage {
    pub fn new(message_type: MessageType, channel: u8, control: u8, value: u8) -> MidiMessage {
        MidiMessage {
            message_type,
            channel,
            control,
            value,
        }
    }

    pub fn note_on(channel: u8, key: u8, velocity: u8) -> MidiMessage {
        MidiMessage::new(MessageType::NoteOn, channel, key, velocity)
    }

    pub fn control_change(channel: u8, controller: u8, value: u8) -> MidiMessage {
        MidiMessage::new(MessageType::ControlChange, channel, controller, value)
    }

    /// Parses raw bytes. Anything other than a note on or a control change is not routable and
    /// yields `None`.
    pub fn parse(raw: &[u8]) -> Option<MidiMessage> {
        match LiveEvent::parse(raw).ok()? {
            LiveEvent::Midi { channel, message } => match message {
                midly::MidiMessage::NoteOn { key, vel } => Some(MidiMessage::note_on(
                    channel.as_int(),
                    key.as_int(),
                    vel.as_int(),
                )),
                midly::MidiMessage::Controller { controller, value } => {
                    Some(MidiMessage::control_change(
                        channel.as_int(),
                        controller.as_int(),
                        value.as_int(),
                    ))
                }
                _ => None,
            },
            _ => None,
        }
    }

    /// Converts to a live event. Out of range fields are masked to their MIDI widths.
    pub fn to_live_event(&self) -> LiveEvent<'static> {
        let channel = u4::from(self.channel & 0x0f);
        let control = u7::from(self.control & 0x7f);
        let value = u7::from(self.value & 0x7f);
        let message = match self.message_type {
            MessageType::NoteOn => midly::MidiMessage::NoteOn {
                key: control,
                vel: value,
            },
            MessageType::ControlChange => midly::MidiMessage::Controller {
                controller: control,
                value,
            },
        };
        LiveEvent::Midi { channel, message }
    }
}

impl fmt::Display for MidiMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ch={} control={} value={}",
            self.message_type, self.channel, self.control, self.value
        )
    }
}

#[cfg(test)]
mod test {
    use std::error::Error;

    use super::*;

    fn bytes(event: LiveEvent) -> Result<Vec<u8>, Box<dyn Error>> {
        let mut buf: Vec<u8> = Vec::with_capacity(8);
        event.write(&mut buf)?;
        Ok(buf)
    }

    #[test]
    fn test_parse_note_on() -> Result<(), Box<dyn Error>> {
        let message = MidiMessage::note_on(1, 24, 100);
        let raw = bytes(message.to_live_event())?;
        assert_eq!(raw, vec![0x91, 24, 100]);
        assert_eq!(MidiMessage::parse(&raw), Some(message));
        Ok(())
    }

    #[test]
    fn test_parse_control_change() {
        assert_eq!(
            MidiMessage::parse(&[0xb0, 10, 100]),
            Some(MidiMessage::control_change(0, 10, 100))
        );
    }

    #[test]
    fn test_unroutable_messages() {
        // Note off, program change, and garbage.
        assert_eq!(MidiMessage::parse(&[0x80, 60, 0]), None);
        assert_eq!(MidiMessage::parse(&[0xcf, 27]), None);
        assert_eq!(MidiMessage::parse(&[1, 2, 3, 4]), None);
        assert_eq!(MidiMessage::parse(&[]), None);
    }

    #[test]
    fn test_message_type_names() {
        for message_type in [MessageType::NoteOn, MessageType::ControlChange] {
            assert_eq!(message_type.to_string().parse(), Ok(message_type));
        }
        assert!("note_off".parse::<MessageType>().is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            MidiMessage::control_change(0, 10, 100).to_string(),
            "control_change ch=0 control=10 value=100"
        );
    }
}
