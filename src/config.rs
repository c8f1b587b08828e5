//! Session configuration.
//!
//! A session is described by a JSON file naming the lyric sheet, the two
//! stems and the initial mix. Every field has a default, so `{}` is a valid
//! configuration. Command-line flags are applied on top of the file.

use crate::clock::is_valid_bpm;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Tempo of the bundled practice song.
pub const DEFAULT_SESSION_BPM: f64 = 73.0;

/// Settings for one practice session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Initial tempo. Values outside [60, 200] fall back to the default.
    pub bpm: f64,
    /// Annotated lyric file.
    pub lyrics: Option<PathBuf>,
    /// Instrumental stem.
    pub instrumental: Option<PathBuf>,
    /// Vocal stem.
    pub vocals: Option<PathBuf>,
    /// Start with the vocal stem audible instead of the instrumental.
    pub vocals_enabled: bool,
    /// Level of the audible stem, 0.0 to 1.0.
    pub stem_volume: f32,
    /// Voice a metronome click on every beat.
    pub click_enabled: bool,
    /// Delay after the last beat of a line before the next line is shown.
    /// Zero disables the lead-in.
    pub lead_in_ms: u64,
    /// How far ahead of the audio the backend schedules ticks.
    pub lookahead_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            bpm: DEFAULT_SESSION_BPM,
            lyrics: None,
            instrumental: None,
            vocals: None,
            vocals_enabled: false,
            stem_volume: 1.0,
            click_enabled: true,
            lead_in_ms: 100,
            lookahead_ms: 100,
        }
    }
}

impl SessionConfig {
    /// Loads a configuration file.
    ///
    /// Relative paths inside the file are resolved against the file's
    /// directory.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or is not valid JSON.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let mut config = Self::from_json(&json)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        Ok(config.validated())
    }

    /// Parses a configuration from JSON without touching the filesystem.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    fn resolve_paths(&mut self, base: &Path) {
        for path in [&mut self.lyrics, &mut self.instrumental, &mut self.vocals]
            .into_iter()
            .flatten()
        {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }

    /// Replaces out-of-range values with their defaults.
    pub fn validated(mut self) -> Self {
        if !is_valid_bpm(self.bpm) {
            tracing::warn!(
                "Configured BPM {} out of range, using {}",
                self.bpm,
                DEFAULT_SESSION_BPM
            );
            self.bpm = DEFAULT_SESSION_BPM;
        }
        self.stem_volume = if self.stem_volume.is_finite() {
            self.stem_volume.clamp(0.0, 1.0)
        } else {
            1.0
        };
        self
    }

    pub fn lead_in(&self) -> Duration {
        Duration::from_millis(self.lead_in_ms)
    }

    pub fn lookahead(&self) -> Duration {
        Duration::from_millis(self.lookahead_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_uses_defaults() {
        let config = SessionConfig::from_json("{}").unwrap();
        assert_eq!(config, SessionConfig::default());
        assert_eq!(config.bpm, 73.0);
        assert!(config.click_enabled);
        assert_eq!(config.lead_in(), Duration::from_millis(100));
    }

    #[test]
    fn test_partial_config() {
        let config =
            SessionConfig::from_json(r#"{"bpm": 90, "vocals_enabled": true, "lyrics": "song.txt"}"#)
                .unwrap();
        assert_eq!(config.bpm, 90.0);
        assert!(config.vocals_enabled);
        assert_eq!(config.lyrics, Some(PathBuf::from("song.txt")));
        assert_eq!(config.stem_volume, 1.0);
    }

    #[test]
    fn test_validation_falls_back() {
        let config = SessionConfig {
            bpm: 250.0,
            stem_volume: 4.0,
            ..SessionConfig::default()
        }
        .validated();
        assert_eq!(config.bpm, DEFAULT_SESSION_BPM);
        assert_eq!(config.stem_volume, 1.0);
    }

    #[test]
    fn test_resolve_relative_paths() {
        let mut config = SessionConfig {
            lyrics: Some(PathBuf::from("song.txt")),
            vocals: Some(PathBuf::from("/abs/vocals.mp3")),
            ..SessionConfig::default()
        };
        config.resolve_paths(Path::new("/data/session"));
        assert_eq!(config.lyrics, Some(PathBuf::from("/data/session/song.txt")));
        assert_eq!(config.vocals, Some(PathBuf::from("/abs/vocals.mp3")));
        assert_eq!(config.instrumental, None);
    }

    #[test]
    fn test_load_missing_file_fails() {
        let err = SessionConfig::load("/nonexistent/pulsehead.json").unwrap_err();
        assert!(err.to_string().contains("Failed to read config"));
    }

    #[test]
    fn test_json_round_trip_file() {
        let dir = std::env::temp_dir().join(format!("pulsehead-config-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("session.json");
        let config = SessionConfig {
            bpm: 120.0,
            lyrics: Some(PathBuf::from("lyrics.txt")),
            ..SessionConfig::default()
        };
        fs::write(&path, config.to_json().unwrap()).unwrap();

        let loaded = SessionConfig::load(&path).unwrap();
        assert_eq!(loaded.bpm, 120.0);
        assert_eq!(loaded.lyrics, Some(dir.join("lyrics.txt")));
        fs::remove_dir_all(&dir).unwrap();
    }
}
