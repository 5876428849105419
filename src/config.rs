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

use std::path::Path;

use config::{Config, File, FileFormat};
use tracing::info;

mod error;
mod settings;

pub use error::ConfigError;
pub use settings::{Pad, Settings};

/// Loads and validates settings from a YAML file.
pub fn load(path: &Path) -> Result<Settings, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::Missing(path.to_path_buf()));
    }
    let settings = Config::builder()
        .add_source(File::from(path).format(FileFormat::Yaml))
        .build()?
        .try_deserialize::<Settings>()?;
    settings.validate()?;
    info!(path = %path.display(), "Loaded settings");
    Ok(settings)
}

/// Parses and validates settings from a YAML string.
pub fn parse(yaml: &str) -> Result<Settings, ConfigError> {
    let settings = Config::builder()
        .add_source(File::from_str(yaml, FileFormat::Yaml))
        .build()?
        .try_deserialize::<Settings>()?;
    settings.validate()?;
    Ok(settings)
}

/// Loads settings from the path if one is given, otherwise uses the defaults.
pub fn load_or_default(path: Option<&Path>) -> Result<Settings, ConfigError> {
    match path {
        Some(path) => load(path),
        None => Ok(Settings::default()),
    }
}

#[cfg(test)]
mod test {
    use std::{error::Error, path::PathBuf, time::Duration};

    use super::*;

    #[test]
    fn test_defaults() -> Result<(), Box<dyn Error>> {
        let settings = parse("{}")?;
        assert_eq!(settings.sample_rate(), 48_000);
        assert_eq!(settings.buffer_size(), 512);
        assert_eq!(settings.max_voices(), 8);
        assert_eq!(settings.attack_ms(), 2.0);
        assert_eq!(settings.release_ms(), 8.0);
        assert_eq!(settings.tempo_range(), 0.08);
        assert_eq!(settings.pitch_range_semitones(), 2.0);
        assert_eq!(settings.router_stop_timeout()?, Duration::from_secs(1));
        assert_eq!(settings.mapping_store(), PathBuf::from("midi_mappings.yaml"));
        assert_eq!(settings.analysis_cache(), PathBuf::from("cache"));
        assert!(settings.analysis_workers() >= 1);
        assert!(settings.sounds().is_none());
        assert!(settings.midi_input().is_none());
        assert!(settings.pad_assignments()?.is_empty());
        Ok(())
    }

    #[test]
    fn test_full() -> Result<(), Box<dyn Error>> {
        let settings = parse(
            r#"
            sample_rate: 44100
            buffer_size: 256
            max_voices: 16
            attack_ms: 1.5
            release_ms: 20
            tempo_range: 0.16
            pitch_range_semitones: 12
            router_stop_timeout: 250ms
            mapping_store: /var/lib/deckhand/mappings.yaml
            sounds: /var/lib/deckhand/sounds
            midi_input: DDJ-400
            analysis_workers: 3
            pads:
              - pad: 0
                sound: 10
              - pad: 1
                sound: 11
            "#,
        )?;

        assert_eq!(settings.router_stop_timeout()?, Duration::from_millis(250));
        assert_eq!(settings.midi_input(), Some("DDJ-400"));
        assert_eq!(settings.analysis_workers(), 3);

        let sampler = settings.sampler_settings();
        assert_eq!(sampler.sample_rate, 44_100);
        assert_eq!(sampler.max_voices, 16);
        assert_eq!(sampler.release_ms, 20.0);

        let session = settings.session_settings()?;
        assert_eq!(session.tempo_range, 0.16);
        assert_eq!(session.pitch_range_semitones, 12.0);
        assert_eq!(session.pads.get(&1), Some(&11));
        Ok(())
    }

    #[test]
    fn test_invalid() {
        for yaml in [
            "sample_rate: 0",
            "buffer_size: 0",
            "max_voices: 0",
            "tempo_range: 1.5",
            "attack_ms: -1",
            "router_stop_timeout: soon",
            "pads: [{pad: 1, sound: 1}, {pad: 1, sound: 2}]",
        ] {
            assert!(
                matches!(parse(yaml), Err(ConfigError::Invalid { .. })),
                "{}",
                yaml
            );
        }
        assert!(matches!(
            parse("sample_rate: fast"),
            Err(ConfigError::Load(_))
        ));
    }

    #[test]
    fn test_load_file() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("deckhand.yaml");
        std::fs::write(&path, "buffer_size: 128\n")?;
        assert_eq!(load(&path)?.buffer_size(), 128);

        assert!(matches!(
            load(&dir.path().join("missing.yaml")),
            Err(ConfigError::Missing(_))
        ));
        assert_eq!(load_or_default(None)?.buffer_size(), 512);
        Ok(())
    }
}
