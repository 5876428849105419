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

//! The master clock: the single source of truth for elapsed audio frames.

use std::sync::Arc;

use parking_lot::RwLock;

/// Default sample rate for a session.
pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;

/// Default number of frames in one audio buffer.
pub const DEFAULT_BUFFER_SIZE: u32 = 512;

/// A master clock shared between decks. The audio-tick context is the only writer.
pub type SharedClock = Arc<RwLock<MasterClock>>;

/// Tracks the global transport timeline in frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterClock {
    sample_rate: u32,
    buffer_size: u32,
    frame_counter: u64,
}

impl MasterClock {
    /// Creates a new clock at frame zero.
    ///
    /// Panics if either the sample rate or the buffer size is zero.
    pub fn new(sample_rate: u32, buffer_size: u32) -> MasterClock {
        assert!(sample_rate > 0, "sample rate must be positive");
        assert!(buffer_size > 0, "buffer size must be positive");
        MasterClock {
            sample_rate,
            buffer_size,
            frame_counter: 0,
        }
    }

    /// Wraps the clock for sharing between decks.
    pub fn shared(self) -> SharedClock {
        Arc::new(RwLock::new(self))
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn buffer_size(&self) -> u32 {
        self.buffer_size
    }

    pub fn frame_counter(&self) -> u64 {
        self.frame_counter
    }

    /// Advances the clock by the given number of buffers and returns the new frame counter.
    pub fn tick(&mut self, buffers: u32) -> u64 {
        self.frame_counter += u64::from(self.buffer_size) * u64::from(buffers);
        self.frame_counter
    }

    /// Moves the clock to an arbitrary frame. Only the owner of the session should do this.
    pub fn seek_to(&mut self, frame: u64) {
        self.frame_counter = frame;
    }

    /// The offset of the clock inside the current buffer.
    pub fn phase(&self) -> u64 {
        self.frame_counter % u64::from(self.buffer_size)
    }

    /// The frame of the next buffer boundary, which is the current frame if already aligned.
    pub fn next_boundary(&self) -> u64 {
        self.align_frame(self.frame_counter)
    }

    /// Rounds the frame up to the next multiple of the buffer size.
    pub fn align_frame(&self, frame: u64) -> u64 {
        let buffer_size = u64::from(self.buffer_size);
        match frame % buffer_size {
            0 => frame,
            remainder => frame + (buffer_size - remainder),
        }
    }

    pub fn seconds_to_frames(&self, seconds: f64) -> u64 {
        // Negative times saturate to frame zero.
        (seconds * f64::from(self.sample_rate)).floor().max(0.0) as u64
    }

    pub fn frames_to_seconds(&self, frames: u64) -> f64 {
        frames as f64 / f64::from(self.sample_rate)
    }

    /// The duration of one buffer in seconds.
    pub fn buffer_seconds(&self) -> f64 {
        self.frames_to_seconds(u64::from(self.buffer_size))
    }
}

impl Default for MasterClock {
    fn default() -> Self {
        MasterClock::new(DEFAULT_SAMPLE_RATE, DEFAULT_BUFFER_SIZE)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_tick_advances_by_whole_buffers() {
        let mut clock = MasterClock::new(48_000, 512);
        assert_eq!(clock.tick(1), 512);
        assert_eq!(clock.tick(3), 2048);
        assert_eq!(clock.phase(), 0);
    }

    #[test]
    fn test_alignment() {
        let mut clock = MasterClock::new(48_000, 512);
        clock.tick(1);
        assert_eq!(clock.phase(), 0);
        assert_eq!(clock.next_boundary(), 512);

        clock.seek_to(100);
        assert_eq!(clock.phase(), 100);
        assert_eq!(clock.next_boundary(), 512);
        assert_eq!(clock.align_frame(130), 512);
        assert_eq!(clock.align_frame(0), 0);
        assert_eq!(clock.align_frame(1024), 1024);
    }

    #[test]
    fn test_align_frame_is_idempotent() {
        let clock = MasterClock::new(44_100, 256);
        for frame in [0u64, 1, 255, 256, 257, 1000, 65_537] {
            let aligned = clock.align_frame(frame);
            assert_eq!(aligned % 256, 0);
            assert!(aligned >= frame);
            assert!(aligned - frame < 256);
            assert_eq!(clock.align_frame(aligned), aligned);
        }
    }

    #[test]
    fn test_time_conversions() {
        let clock = MasterClock::new(48_000, 512);
        assert_eq!(clock.seconds_to_frames(1.5), 72_000);
        assert_eq!(clock.seconds_to_frames(0.000_01), 0);
        assert_eq!(clock.seconds_to_frames(-1.0), 0);
        assert!((clock.frames_to_seconds(24_000) - 0.5).abs() < f64::EPSILON);
        assert!((clock.buffer_seconds() - 512.0 / 48_000.0).abs() < 1e-12);
    }

    #[test]
    #[should_panic]
    fn test_zero_buffer_size_panics() {
        MasterClock::new(48_000, 0);
    }
}
