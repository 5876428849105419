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

use std::path::{Path, PathBuf};

use hound::WavReader;

use super::DeckError;
use crate::util::filename_display;

/// Header information a deck needs from an audio file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioHeader {
    /// Number of frames (one sample per channel) in the file.
    pub total_frames: u64,
    /// The native sample rate of the file.
    pub sample_rate: u32,
}

/// Something a deck can be loaded from.
pub trait AudioSource {
    /// A human readable name for logging and errors.
    fn name(&self) -> String;

    /// Reads the audio header. Fails with a decode error if the header is unreadable.
    fn read_header(&self) -> Result<AudioHeader, DeckError>;
}

/// A WAV file on disk.
pub struct WavSource {
    path: PathBuf,
}

impl WavSource {
    pub fn new<P: AsRef<Path>>(path: P) -> WavSource {
        WavSource {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl AudioSource for WavSource {
    fn name(&self) -> String {
        filename_display(&self.path).to_string()
    }

    fn read_header(&self) -> Result<AudioHeader, DeckError> {
        let reader = WavReader::open(&self.path).map_err(|e| DeckError::Decode {
            source_name: self.name(),
            reason: e.to_string(),
        })?;
        let spec = reader.spec();
        if spec.sample_rate == 0 || spec.channels == 0 {
            return Err(DeckError::Decode {
                source_name: self.name(),
                reason: "header declares no channels or a zero sample rate".to_string(),
            });
        }

        Ok(AudioHeader {
            total_frames: u64::from(reader.duration()),
            sample_rate: spec.sample_rate,
        })
    }
}

/// An already known header, mostly useful for tests and synthetic tracks.
impl AudioSource for AudioHeader {
    fn name(&self) -> String {
        format!("{} frames @ {}Hz", self.total_frames, self.sample_rate)
    }

    fn read_header(&self) -> Result<AudioHeader, DeckError> {
        if self.sample_rate == 0 {
            return Err(DeckError::Decode {
                source_name: self.name(),
                reason: "zero sample rate".to_string(),
            });
        }
        Ok(*self)
    }
}

#[cfg(test)]
mod test {
    use std::{error::Error, fs};

    use super::*;
    use crate::testutil::write_wav;

    #[test]
    fn test_wav_header() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("tone.wav");
        write_wav(path.clone(), vec![vec![0.0f32; 4800]], 48_000)?;

        let header = WavSource::new(&path).read_header()?;
        assert_eq!(header.total_frames, 4800);
        assert_eq!(header.sample_rate, 48_000);
        Ok(())
    }

    #[test]
    fn test_unreadable_header() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("garbage.wav");
        fs::write(&path, b"definitely not a RIFF header")?;

        let result = WavSource::new(&path).read_header();
        assert!(matches!(result, Err(DeckError::Decode { .. })));
        Ok(())
    }

    #[test]
    fn test_missing_file() {
        let result = WavSource::new("/nonexistent/track.wav").read_header();
        assert!(matches!(result, Err(DeckError::Decode { .. })));
    }
}
