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

//! The concrete transport: two decks and a sampler driven from the audio tick, with a handle
//! that other threads use to control them.

use std::{collections::BTreeMap, fmt};

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, debug_span, info, warn};

use crate::clock::SharedClock;
use crate::deck::{AudioSource, Deck, DeckError};
use crate::dsp::DspResult;
use crate::samples::{Sampler, SoundId};
use crate::transport::{DeckId, TransportController};

/// Default tempo fader range, as a fraction of the original tempo in each direction.
pub const DEFAULT_TEMPO_RANGE: f64 = 0.08;

/// Default pitch control range in semitones in each direction.
pub const DEFAULT_PITCH_RANGE_SEMITONES: f64 = 2.0;

/// How controls map onto deck and sampler state.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub tempo_range: f64,
    pub pitch_range_semitones: f64,
    /// Sampler pad index to sound.
    pub pads: BTreeMap<u32, SoundId>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        SessionSettings {
            tempo_range: DEFAULT_TEMPO_RANGE,
            pitch_range_semitones: DEFAULT_PITCH_RANGE_SEMITONES,
            pads: BTreeMap::new(),
        }
    }
}

impl SessionSettings {
    /// The tempo ratio for a fader position. The center of the fader is the original tempo.
    pub fn tempo_ratio(&self, value: f64) -> f64 {
        1.0 + (2.0 * value.clamp(0.0, 1.0) - 1.0) * self.tempo_range
    }

    pub fn pitch_semitones(&self, value: f64) -> f64 {
        value.clamp(-1.0, 1.0) * self.pitch_range_semitones
    }
}

/// A control change waiting to be applied on the next tick.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    TogglePlayPause(DeckId),
    SetTempo(DeckId, f64),
    SetPitch(DeckId, f64),
    SetCrossfader(f64),
    TriggerPad { pad: u32, velocity: u8 },
}

/// The output of one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TickOutput {
    /// The clock frame at the start of the buffer.
    pub frame: u64,
    pub deck_a: Option<DspResult>,
    pub deck_b: Option<DspResult>,
    /// Mono sampler audio for the buffer.
    pub sampler: Vec<f32>,
}

/// Owns the decks and the sampler. Lives on the audio tick; everything else talks to it through
/// a [SessionHandle].
pub struct Session {
    clock: SharedClock,
    deck_a: Deck,
    deck_b: Deck,
    sampler: Sampler,
    crossfader: f64,
    settings: SessionSettings,
    commands: Receiver<SessionCommand>,
    sender: Sender<SessionCommand>,
}

impl Session {
    pub fn new(
        clock: SharedClock,
        deck_a: Deck,
        deck_b: Deck,
        sampler: Sampler,
        settings: SessionSettings,
    ) -> Session {
        let (sender, commands) = crossbeam_channel::unbounded();
        Session {
            clock,
            deck_a,
            deck_b,
            sampler,
            crossfader: 0.5,
            settings,
            commands,
            sender,
        }
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            sender: self.sender.clone(),
        }
    }

    pub fn deck(&self, deck: DeckId) -> &Deck {
        match deck {
            DeckId::A => &self.deck_a,
            DeckId::B => &self.deck_b,
        }
    }

    pub fn deck_mut(&mut self, deck: DeckId) -> &mut Deck {
        match deck {
            DeckId::A => &mut self.deck_a,
            DeckId::B => &mut self.deck_b,
        }
    }

    pub fn sampler(&self) -> &Sampler {
        &self.sampler
    }

    pub fn sampler_mut(&mut self) -> &mut Sampler {
        &mut self.sampler
    }

    pub fn crossfader(&self) -> f64 {
        self.crossfader
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn load(&mut self, deck: DeckId, source: &dyn AudioSource) -> Result<(), DeckError> {
        self.deck_mut(deck).load(source)
    }

    /// Catches the sampler's render window up with its time source. Call when ticking starts
    /// and whenever ticks were skipped.
    pub fn resync(&mut self) {
        self.sampler.resync();
    }

    /// Applies queued commands, processes both decks, renders one buffer of sampler audio and
    /// advances the clock by one buffer.
    pub fn tick(&mut self) -> TickOutput {
        let span = debug_span!("session tick");
        let _enter = span.enter();

        while let Ok(command) = self.commands.try_recv() {
            self.apply(command);
        }

        let (frame, buffer_seconds) = {
            let clock = self.clock.read();
            (clock.frame_counter(), clock.buffer_seconds())
        };
        let deck_a = self.deck_a.process();
        let deck_b = self.deck_b.process();
        let sampler = self.sampler.render(buffer_seconds);
        self.clock.write().tick(1);

        TickOutput {
            frame,
            deck_a,
            deck_b,
            sampler,
        }
    }

    fn apply(&mut self, command: SessionCommand) {
        debug!(command = ?command, "Applying command");
        match command {
            SessionCommand::TogglePlayPause(deck) => {
                let deck = self.deck_mut(deck);
                if deck.is_playing() {
                    deck.pause();
                } else {
                    deck.play();
                }
            }
            SessionCommand::SetTempo(deck, value) => {
                let ratio = self.settings.tempo_ratio(value);
                if let Err(e) = self.deck_mut(deck).set_tempo_ratio(ratio) {
                    warn!(deck = %deck, err = %e, "Unable to set tempo");
                }
            }
            SessionCommand::SetPitch(deck, value) => {
                let semitones = self.settings.pitch_semitones(value);
                self.deck_mut(deck).set_pitch_semitones(semitones);
            }
            SessionCommand::SetCrossfader(value) => {
                self.crossfader = value.clamp(0.0, 1.0);
            }
            SessionCommand::TriggerPad { pad, velocity } => self.trigger_pad(pad, velocity),
        }
    }

    fn trigger_pad(&mut self, pad: u32, velocity: u8) {
        // A note on with no velocity is a release.
        if velocity == 0 {
            return;
        }
        let Some(&sound_id) = self.settings.pads.get(&pad) else {
            warn!(pad, "No sound assigned to sampler pad");
            return;
        };
        // Pads start with the next buffer, whatever the time source says.
        let start_time = self.sampler.last_render_time();
        match self.sampler.schedule(sound_id, start_time) {
            Ok(()) => debug!(pad, sound_id, start_time, "Sampler pad triggered"),
            Err(e) => warn!(pad, sound_id, err = %e, "Unable to trigger sampler pad"),
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("clock", &*self.clock.read())
            .field("deck_a", &self.deck_a)
            .field("deck_b", &self.deck_b)
            .field("sampler", &self.sampler)
            .field("crossfader", &self.crossfader)
            .field("settings", &self.settings)
            .finish()
    }
}

/// Sends control changes to a [Session]. Cheap to clone and safe to use from any thread.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    sender: Sender<SessionCommand>,
}

impl SessionHandle {
    fn send(&self, command: SessionCommand) {
        if self.sender.send(command).is_err() {
            info!("Session is gone, dropping command");
        }
    }
}

impl TransportController for SessionHandle {
    fn toggle_play_pause(&self, deck: DeckId) {
        self.send(SessionCommand::TogglePlayPause(deck));
    }

    fn set_tempo(&self, deck: DeckId, value: f64) {
        self.send(SessionCommand::SetTempo(deck, value));
    }

    fn set_pitch(&self, deck: DeckId, value: f64) {
        self.send(SessionCommand::SetPitch(deck, value));
    }

    fn set_crossfader(&self, value: f64) {
        self.send(SessionCommand::SetCrossfader(value));
    }

    fn trigger_sampler(&self, pad: u32, velocity: u8) {
        self.send(SessionCommand::TriggerPad { pad, velocity });
    }
}

#[cfg(test)]
mod test {
    use std::{error::Error, sync::Arc};

    use super::*;
    use crate::clock::MasterClock;
    use crate::deck::AudioHeader;
    use crate::dsp::MetadataStage;
    use crate::samples::{ManualTime, MemorySoundRepository, SamplerSettings};

    fn session(pads: BTreeMap<u32, SoundId>) -> Result<(Session, Arc<ManualTime>), Box<dyn Error>> {
        let clock = MasterClock::new(1000, 100).shared();
        let dsp = Arc::new(MetadataStage);
        let mut repository = MemorySoundRepository::new();
        repository.insert(1, "clap", 1000, &[1.0; 50]);
        let time = Arc::new(ManualTime::new(0.0));
        let sampler = Sampler::new(
            Arc::new(repository),
            time.clone(),
            SamplerSettings {
                sample_rate: 1000,
                max_voices: 4,
                attack_ms: 1.0,
                release_ms: 1.0,
            },
        );

        let mut session = Session::new(
            clock.clone(),
            Deck::new("A", clock.clone(), dsp.clone()),
            Deck::new("B", clock, dsp),
            sampler,
            SessionSettings {
                pads,
                ..Default::default()
            },
        );
        session.load(
            DeckId::A,
            &AudioHeader {
                total_frames: 10_000,
                sample_rate: 1000,
            },
        )?;
        Ok((session, time))
    }

    #[test]
    fn test_fader_mapping() {
        let settings = SessionSettings::default();
        assert_eq!(settings.tempo_ratio(0.5), 1.0);
        assert!((settings.tempo_ratio(1.0) - 1.08).abs() < 1e-12);
        assert!((settings.tempo_ratio(0.0) - 0.92).abs() < 1e-12);
        assert_eq!(settings.pitch_semitones(-1.0), -2.0);
        assert_eq!(settings.pitch_semitones(0.5), 1.0);
    }

    #[test]
    fn test_toggle_play_pause() -> Result<(), Box<dyn Error>> {
        let (mut session, _) = session(BTreeMap::new())?;
        let handle = session.handle();

        handle.toggle_play_pause(DeckId::A);
        let output = session.tick();
        assert_eq!(output.frame, 0);
        assert!(session.deck(DeckId::A).is_playing());
        assert_eq!(output.deck_a.map(|result| result.advanced_frames), Some(100));
        assert_eq!(output.deck_b, None);

        handle.toggle_play_pause(DeckId::A);
        let output = session.tick();
        assert_eq!(output.frame, 100);
        assert!(!session.deck(DeckId::A).is_playing());
        assert_eq!(output.deck_a, None);
        assert_eq!(session.deck(DeckId::A).position_frames(), 100);
        Ok(())
    }

    #[test]
    fn test_tempo_pitch_crossfader() -> Result<(), Box<dyn Error>> {
        let (mut session, _) = session(BTreeMap::new())?;
        let handle = session.handle();

        handle.set_tempo(DeckId::B, 1.0);
        handle.set_pitch(DeckId::B, -0.5);
        handle.set_crossfader(0.25);
        session.tick();

        let deck = session.deck(DeckId::B);
        assert!((deck.tempo_ratio() - 1.08).abs() < 1e-12);
        assert_eq!(deck.pitch_semitones(), -1.0);
        assert_eq!(session.crossfader(), 0.25);
        Ok(())
    }

    #[test]
    fn test_pads() -> Result<(), Box<dyn Error>> {
        let (mut session, _) = session(BTreeMap::from([(3, 1)]))?;
        let handle = session.handle();

        // Unassigned pads and releases do nothing.
        handle.trigger_sampler(7, 127);
        handle.trigger_sampler(3, 0);
        let output = session.tick();
        assert!(output.sampler.iter().all(|sample| *sample == 0.0));

        handle.trigger_sampler(3, 100);
        let output = session.tick();
        assert_eq!(output.sampler.len(), 100);
        assert!(output.sampler.iter().any(|sample| *sample > 0.0));
        Ok(())
    }

    #[test]
    fn test_pad_sounds_on_next_buffer_after_delay() -> Result<(), Box<dyn Error>> {
        let (mut session, time) = session(BTreeMap::from([(3, 1)]))?;
        let handle = session.handle();

        // The time source runs ahead of the render window, e.g. setup took a while.
        time.set(0.25);
        handle.trigger_sampler(3, 100);
        let output = session.tick();
        assert!(output.sampler[..10].iter().any(|sample| *sample > 0.0));
        Ok(())
    }

    #[test]
    fn test_resync() -> Result<(), Box<dyn Error>> {
        let (mut session, time) = session(BTreeMap::new())?;
        session.tick();
        assert!((session.sampler().last_render_time() - 0.1).abs() < 1e-12);

        time.set(5.0);
        session.resync();
        assert_eq!(session.sampler().last_render_time(), 5.0);
        session.tick();
        assert!((session.sampler().last_render_time() - 5.1).abs() < 1e-12);
        Ok(())
    }

    #[test]
    fn test_handle_outlives_session() -> Result<(), Box<dyn Error>> {
        let (session, _) = session(BTreeMap::new())?;
        let handle = session.handle();
        drop(session);
        handle.set_crossfader(1.0);
        Ok(())
    }
}
