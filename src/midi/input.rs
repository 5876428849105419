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

use std::{error::Error, fmt};

use midir::{MidiInput, MidiInputConnection};
use tracing::{debug, info, span, Level};

use super::{message::MidiMessage, router::MessageSender};

/// An open MIDI input. Messages stop flowing when this is dropped.
pub struct InputConnection {
    port_name: String,
    _connection: MidiInputConnection<()>,
}

impl InputConnection {
    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

impl fmt::Debug for InputConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputConnection")
            .field("port_name", &self.port_name)
            .finish()
    }
}

/// Lists the names of the available MIDI input ports, sorted.
pub fn list_ports() -> Result<Vec<String>, Box<dyn Error>> {
    let input = MidiInput::new("deckhand input listing")?;
    let mut names = input
        .ports()
        .iter()
        .map(|port| input.port_name(port))
        .collect::<Result<Vec<String>, _>>()?;
    names.sort();
    Ok(names)
}

/// Connects to the input port whose name contains `name`, parsing incoming bytes and sending
/// routable messages to the router.
pub fn connect_input(name: &str, sender: MessageSender) -> Result<InputConnection, Box<dyn Error>> {
    let span = span!(Level::INFO, "midi input");
    let _enter = span.enter();

    let input = MidiInput::new("deckhand input")?;
    let ports = input.ports();
    let names = ports
        .iter()
        .map(|port| input.port_name(port))
        .collect::<Result<Vec<String>, _>>()?;
    let index = select_port(&names, name)?;
    let port_name = names[index].clone();

    info!(port = port_name, "Listening for MIDI input");
    let connection = input.connect(
        &ports[index],
        "deckhand input watcher",
        move |_, raw_event, _| match MidiMessage::parse(raw_event) {
            Some(message) => sender.send(message),
            None => debug!(raw = ?raw_event, "Ignoring unroutable MIDI event"),
        },
        (),
    )?;

    Ok(InputConnection {
        port_name,
        _connection: connection,
    })
}

/// Finds the single port whose name contains `name`.
fn select_port(names: &[String], name: &str) -> Result<usize, Box<dyn Error>> {
    let matches = names
        .iter()
        .enumerate()
        .filter(|(_, candidate)| candidate.contains(name))
        .collect::<Vec<_>>();

    match matches.as_slice() {
        [] => Err(format!("no MIDI input found with name {}", name).into()),
        [(index, _)] => Ok(*index),
        _ => Err(format!(
            "found too many MIDI inputs that match ({}), use a less ambiguous name",
            matches
                .iter()
                .map(|(_, candidate)| candidate.as_str())
                .collect::<Vec<&str>>()
                .join(", ")
        )
        .into()),
    }
}
