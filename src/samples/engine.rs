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

//! The sampler: schedules one-shot triggers and mixes active voices into output buffers.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, error};

use super::repository::{Sound, SoundError, SoundId, SoundRepository};
use super::schedule::{ScheduledTrigger, TriggerQueue};
use super::time::TimeSource;
use super::voice::{Voice, VoiceAllocator};

/// Default attack time in milliseconds.
pub const DEFAULT_ATTACK_MS: f64 = 2.0;

/// Default release time in milliseconds.
pub const DEFAULT_RELEASE_MS: f64 = 8.0;

/// Default maximum number of concurrent voices.
pub const DEFAULT_MAX_VOICES: usize = 8;

/// Lower bound on the BPM used for grid quantization.
const MIN_BPM: f64 = 1e-6;

/// Tempo information from a deck used for beat-grid scheduling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeckState {
    pub bpm: f64,
    /// Position within the current beat, 0.0 to 1.0.
    pub phase: f64,
}

/// Sampler construction parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerSettings {
    pub sample_rate: u32,
    pub max_voices: usize,
    pub attack_ms: f64,
    pub release_ms: f64,
}

impl Default for SamplerSettings {
    fn default() -> Self {
        SamplerSettings {
            sample_rate: crate::clock::DEFAULT_SAMPLE_RATE,
            max_voices: DEFAULT_MAX_VOICES,
            attack_ms: DEFAULT_ATTACK_MS,
            release_ms: DEFAULT_RELEASE_MS,
        }
    }
}

/// Linear attack and release ramps applied to every voice to avoid clicks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Envelope {
    attack_samples: usize,
    release_samples: usize,
}

impl Envelope {
    /// Builds an envelope from times in milliseconds. Each ramp is at least one sample long.
    pub fn from_ms(attack_ms: f64, release_ms: f64, sample_rate: u32) -> Envelope {
        let to_samples =
            |ms: f64| ((ms * f64::from(sample_rate) / 1000.0).floor().max(0.0) as usize).max(1);
        Envelope {
            attack_samples: to_samples(attack_ms),
            release_samples: to_samples(release_ms),
        }
    }

    pub fn attack_samples(&self) -> usize {
        self.attack_samples
    }

    pub fn release_samples(&self) -> usize {
        self.release_samples
    }

    /// The gain for the sample at `index` in a sound of `total_length` samples. Where the two
    /// ramps overlap on very short sounds the quieter one wins.
    pub fn gain(&self, index: usize, total_length: usize) -> f32 {
        let attack = if index < self.attack_samples {
            index as f32 / self.attack_samples as f32
        } else {
            1.0
        };
        let release = if index + self.release_samples >= total_length {
            let remaining = total_length.saturating_sub(index + 1);
            remaining as f32 / self.release_samples as f32
        } else {
            1.0
        };
        attack.min(release).max(0.0)
    }
}

/// Schedules and mixes one-shot sounds.
///
/// `render` is meant to be called repeatedly at a fixed cadence from the audio context. Sounds
/// are resolved from the repository when they are scheduled, so rendering never touches the
/// repository.
pub struct Sampler {
    repository: Arc<dyn SoundRepository>,
    time: Arc<dyn TimeSource>,
    sample_rate: u32,
    envelope: Envelope,
    allocator: VoiceAllocator,
    scheduled: TriggerQueue,
    sounds: HashMap<SoundId, Arc<Sound>>,
    last_render_time: f64,
}

impl Sampler {
    /// Creates a new sampler. The render window starts at the time source's current time.
    pub fn new(
        repository: Arc<dyn SoundRepository>,
        time: Arc<dyn TimeSource>,
        settings: SamplerSettings,
    ) -> Sampler {
        let last_render_time = time.now();
        Sampler {
            repository,
            time,
            sample_rate: settings.sample_rate,
            envelope: Envelope::from_ms(
                settings.attack_ms,
                settings.release_ms,
                settings.sample_rate,
            ),
            allocator: VoiceAllocator::new(settings.max_voices),
            scheduled: TriggerQueue::new(),
            sounds: HashMap::new(),
            last_render_time,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn envelope(&self) -> Envelope {
        self.envelope
    }

    pub fn now(&self) -> f64 {
        self.time.now()
    }

    /// The start of the next render window.
    pub fn last_render_time(&self) -> f64 {
        self.last_render_time
    }

    pub fn allocator(&self) -> &VoiceAllocator {
        &self.allocator
    }

    /// The voices currently sounding.
    pub fn active_voices(&self) -> impl Iterator<Item = &Voice> {
        self.allocator.active()
    }

    /// The triggers waiting to start, earliest first.
    pub fn pending(&self) -> Vec<ScheduledTrigger> {
        self.scheduled.pending()
    }

    /// Loads a sound into the sampler ahead of time.
    pub fn preload(&mut self, sound_id: SoundId) -> Result<Arc<Sound>, SoundError> {
        if let Some(sound) = self.sounds.get(&sound_id) {
            return Ok(sound.clone());
        }
        let sound = self.repository.get(sound_id)?;
        debug!(id = sound_id, name = sound.name, samples = sound.len(), "Sound loaded");
        self.sounds.insert(sound_id, sound.clone());
        Ok(sound)
    }

    /// Starts the sound as soon as possible. Returns the start time.
    pub fn trigger_now(&mut self, sound_id: SoundId) -> Result<f64, SoundError> {
        let now = self.time.now();
        self.schedule(sound_id, now)?;
        Ok(now)
    }

    /// Starts the sound on the next beat of the given deck. Returns the start time.
    pub fn trigger_on_grid(&mut self, sound_id: SoundId, deck: DeckState) -> Result<f64, SoundError> {
        let now = self.time.now();
        let seconds_per_beat = 60.0 / deck.bpm.max(MIN_BPM);
        let remaining = (1.0 - deck.phase.rem_euclid(1.0)) * seconds_per_beat;
        let start_time = now + remaining;
        self.schedule(sound_id, start_time)?;
        Ok(start_time)
    }

    /// Schedules the sound to start at an absolute time.
    pub fn schedule(&mut self, sound_id: SoundId, start_time: f64) -> Result<(), SoundError> {
        self.preload(sound_id)?;
        self.scheduled.push(sound_id, start_time);
        debug!(id = sound_id, start_time, "Trigger scheduled");
        Ok(())
    }

    /// Advances the engine by `duration` seconds and returns the mixed mono audio.
    pub fn render(&mut self, duration: f64) -> Vec<f32> {
        let window_start = self.last_render_time;
        let window_end = window_start + duration;
        let length = (duration * f64::from(self.sample_rate)).round().max(0.0) as usize;
        let mut buffer = vec![0.0f32; length];

        self.activate_due_triggers(window_end);

        let sample_rate = f64::from(self.sample_rate);
        let envelope = self.envelope;
        for voice in self.allocator.active_mut() {
            Self::mix_voice(&mut buffer, voice, window_start, sample_rate, envelope);
        }
        self.allocator.remove_finished();

        self.last_render_time = window_end;
        buffer
    }

    /// Promotes every trigger starting before the end of the window into a voice.
    fn activate_due_triggers(&mut self, up_to: f64) {
        while let Some(trigger) = self.scheduled.pop_due(up_to) {
            match self.sounds.get(&trigger.sound_id) {
                Some(sound) => {
                    let id = self.allocator.allocate(sound.clone(), trigger.start_time);
                    debug!(
                        id = trigger.sound_id,
                        voice = ?id,
                        start_time = trigger.start_time,
                        "Voice started"
                    );
                }
                None => error!(id = trigger.sound_id, "Trigger for an unloaded sound dropped"),
            }
        }
    }

    /// Mixes a voice into the buffer, starting at its offset from the window start.
    fn mix_voice(
        buffer: &mut [f32],
        voice: &mut Voice,
        window_start: f64,
        sample_rate: f64,
        envelope: Envelope,
    ) {
        let offset = ((voice.start_time() - window_start) * sample_rate).round() as i64;
        if offset >= buffer.len() as i64 {
            return;
        }

        // A voice that should already have been sounding when the window opened picks up
        // where it would have been, rather than starting late at the top of the buffer.
        let late = if offset < 0 && voice.position() == 0 {
            offset.unsigned_abs() as usize
        } else {
            0
        };
        voice.advance(late);

        let start = offset.max(0) as usize;
        let data = voice.sound().data();
        let total = data.len();
        let first = voice.position();
        let count = (buffer.len() - start).min(total - first);

        for (i, out) in buffer[start..start + count].iter_mut().enumerate() {
            let index = first + i;
            *out += data[index] * envelope.gain(index, total);
        }
        voice.advance(count);
    }

    /// Moves the render window up to now if it has fallen behind the time source, e.g. after
    /// the audio context stalled. The skipped time is never rendered.
    pub fn resync(&mut self) {
        let now = self.time.now();
        if now > self.last_render_time {
            debug!(behind = now - self.last_render_time, "Sampler render window resynced");
            self.last_render_time = now;
        }
    }

    /// Drops every pending trigger and active voice, and restarts the render window at now.
    pub fn clear(&mut self) {
        self.scheduled.clear();
        self.allocator.clear();
        self.last_render_time = self.time.now();
        debug!("Sampler cleared");
    }
}

impl std::fmt::Debug for Sampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sampler")
            .field("sample_rate", &self.sample_rate)
            .field("pending", &self.scheduled.len())
            .field("allocator", &self.allocator)
            .field("loaded_sounds", &self.sounds.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::samples::repository::MemorySoundRepository;
    use crate::samples::time::ManualTime;

    fn repository(data: &[f32], sample_rate: u32) -> Arc<MemorySoundRepository> {
        let mut repository = MemorySoundRepository::new();
        repository.insert(1, "kick", sample_rate, data);
        Arc::new(repository)
    }

    fn sampler(
        data: &[f32],
        time: &ManualTime,
        max_voices: usize,
        attack_ms: f64,
        release_ms: f64,
    ) -> Sampler {
        Sampler::new(
            repository(data, 1000),
            Arc::new(time.clone()),
            SamplerSettings {
                sample_rate: 1000,
                max_voices,
                attack_ms,
                release_ms,
            },
        )
    }

    #[test]
    fn test_trigger_on_grid_aligns_to_next_beat() {
        let time = ManualTime::new(10.0);
        let mut sampler = sampler(&[1.0; 200], &time, 8, 2.0, 8.0);

        let start_time = sampler
            .trigger_on_grid(
                1,
                DeckState {
                    bpm: 120.0,
                    phase: 0.25,
                },
            )
            .expect("sound should load");
        assert!((start_time - 10.375).abs() < 1e-6);

        let buffer = sampler.render(0.4);
        assert_eq!(buffer.len(), 400);
        assert!(buffer[..375].iter().all(|s| *s == 0.0));
        assert!(buffer.iter().map(|s| s.abs()).sum::<f32>() > 0.0);
    }

    #[test]
    fn test_grid_with_phase_on_beat_waits_a_full_beat() {
        let time = ManualTime::new(0.0);
        let mut sampler = sampler(&[1.0; 10], &time, 8, 2.0, 8.0);
        let deck = DeckState {
            bpm: 60.0,
            phase: 1.0,
        };
        let start_time = sampler.trigger_on_grid(1, deck).expect("sound should load");
        assert!((start_time - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_polyphony_steals_oldest_voice() {
        let time = ManualTime::new(0.0);
        let mut sampler = sampler(&[1.0; 50], &time, 2, 2.0, 8.0);
        for start in [0.0, 0.01, 0.02] {
            sampler.schedule(1, start).expect("sound should load");
        }

        sampler.render(0.03);
        let starts: Vec<f64> = sampler.active_voices().map(Voice::start_time).collect();
        assert_eq!(starts.len(), 2);
        assert!(!starts.contains(&0.0));
        assert!(sampler.pending().is_empty());
    }

    #[test]
    fn test_envelope_reduces_clicks() {
        let time = ManualTime::new(0.0);
        let mut sampler = sampler(&[1.0; 100], &time, 8, 10.0, 10.0);
        sampler.trigger_now(1).expect("sound should load");

        let buffer = sampler.render(100.0 / 1000.0);
        assert_eq!(buffer.len(), 100);
        assert!(buffer[0].abs() < 1e-5);
        assert!(buffer[99].abs() < 1e-5);
        for i in 1..10 {
            assert!(buffer[i] > buffer[i - 1]);
        }
        assert_eq!(buffer[50], 1.0);
        // Fully played voices are swept.
        assert_eq!(sampler.allocator().active_count(), 0);
    }

    #[test]
    fn test_voice_spans_render_calls() {
        let time = ManualTime::new(0.0);
        let data: Vec<f32> = (0..30).map(|i| i as f32).collect();
        let mut sampler = sampler(&data, &time, 8, 0.0, 0.0);
        sampler.schedule(1, 0.005).expect("sound should load");

        let first = sampler.render(0.01);
        assert_eq!(&first[..5], &[0.0; 5]);
        let voice_position = sampler.active_voices().next().map(Voice::position);
        assert_eq!(voice_position, Some(5));

        let second = sampler.render(0.01);
        // Continues exactly where the previous buffer stopped; index 6 is mixed at unity gain.
        assert_eq!(second[1], 6.0);
        assert_eq!(sampler.allocator().active_count(), 1);

        sampler.render(0.02);
        assert_eq!(sampler.allocator().active_count(), 0);
    }

    #[test]
    fn test_late_trigger_starts_at_interior_offset() {
        let time = ManualTime::new(1.0);
        let data: Vec<f32> = (0..100).map(|i| i as f32).collect();
        let mut sampler = sampler(&data, &time, 8, 0.0, 0.0);

        // Scheduled 10ms before the current window opened.
        sampler.schedule(1, 0.99).expect("sound should load");
        let buffer = sampler.render(0.01);
        assert_eq!(buffer[0], 10.0);
        assert_eq!(buffer[9], 19.0);
    }

    #[test]
    fn test_future_triggers_stay_pending() {
        let time = ManualTime::new(0.0);
        let mut sampler = sampler(&[1.0; 10], &time, 8, 2.0, 8.0);
        sampler.schedule(1, 0.5).expect("sound should load");

        let buffer = sampler.render(0.1);
        assert!(buffer.iter().all(|s| *s == 0.0));
        assert_eq!(sampler.pending().len(), 1);
        assert_eq!(sampler.allocator().active_count(), 0);
    }

    #[test]
    fn test_unknown_sound_is_rejected_at_schedule() {
        let time = ManualTime::new(0.0);
        let mut sampler = sampler(&[1.0; 10], &time, 8, 2.0, 8.0);
        assert!(matches!(
            sampler.trigger_now(42),
            Err(SoundError::NotFound(42))
        ));
        assert!(sampler.pending().is_empty());
    }

    #[test]
    fn test_clear_resets_window() {
        let time = ManualTime::new(0.0);
        let mut sampler = sampler(&[1.0; 1000], &time, 8, 2.0, 8.0);
        sampler.trigger_now(1).expect("sound should load");
        sampler.schedule(1, 5.0).expect("sound should load");
        sampler.render(0.1);
        assert_eq!(sampler.allocator().active_count(), 1);

        time.set(3.0);
        sampler.clear();
        assert!(sampler.pending().is_empty());
        assert_eq!(sampler.allocator().active_count(), 0);
        assert_eq!(sampler.last_render_time(), 3.0);
        assert!(sampler.render(0.1).iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_resync_only_moves_forward() {
        let time = ManualTime::new(0.0);
        let mut sampler = sampler(&[1.0; 1000], &time, 8, 0.0, 0.0);
        sampler.render(0.5);

        sampler.resync();
        assert_eq!(sampler.last_render_time(), 0.5);

        time.set(2.0);
        sampler.trigger_now(1).expect("sound should load");
        sampler.resync();
        assert_eq!(sampler.last_render_time(), 2.0);
        // The trigger made at the new now starts at the top of the next buffer.
        let buffer = sampler.render(0.01);
        assert_eq!(buffer[0], 1.0);
    }

    #[test]
    fn test_envelope_gain_overlapping_ramps() {
        let envelope = Envelope::from_ms(10.0, 10.0, 1000);
        assert_eq!(envelope.attack_samples(), 10);
        assert_eq!(envelope.gain(0, 100), 0.0);
        assert_eq!(envelope.gain(50, 100), 1.0);
        assert_eq!(envelope.gain(99, 100), 0.0);
        // On a short sound the release ramp caps the attack ramp.
        assert!(envelope.gain(5, 8) <= 0.2 + f32::EPSILON);

        let minimal = Envelope::from_ms(0.0, 0.0, 48_000);
        assert_eq!(minimal.attack_samples(), 1);
        assert_eq!(minimal.release_samples(), 1);
    }
}
