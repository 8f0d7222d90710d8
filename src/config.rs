use crate::defaults;
use crate::error::{Result, VoxbridgeError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub race: RaceConfig,
    pub segmenter: SegmenterConfig,
    pub speaker: SpeakerConfig,
}

/// Language race configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RaceConfig {
    /// Candidate languages, in priority order. The first is the timeout
    /// fallback.
    pub candidates: Vec<String>,
    pub poll_interval_ms: u64,
    pub confidence_threshold: f32,
    pub confidence_gap: f32,
    pub result_count_lead: usize,
    pub lock_timeout_ms: u64,
}

/// Utterance segmentation configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SegmenterConfig {
    pub silence_window_ms: u64,
    pub scan_tick_ms: u64,
}

/// Speaker identification configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SpeakerConfig {
    /// Fast-path similarity floor for reusing an existing profile.
    pub provisional_similarity_threshold: f32,
    /// Slow-path similarity floor for folding a provisional profile into a
    /// confirmed one.
    pub merge_similarity_threshold: f32,
    /// Audio required before the fast path runs.
    pub min_fast_audio_ms: u64,
}

impl Default for RaceConfig {
    fn default() -> Self {
        Self {
            candidates: vec!["en-US".to_string(), "es-ES".to_string()],
            poll_interval_ms: defaults::RACE_POLL_INTERVAL_MS,
            confidence_threshold: defaults::CONFIDENCE_THRESHOLD,
            confidence_gap: defaults::CONFIDENCE_GAP,
            result_count_lead: defaults::RESULT_COUNT_LEAD,
            lock_timeout_ms: defaults::RACE_TIMEOUT_MS,
        }
    }
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            silence_window_ms: defaults::SILENCE_WINDOW_MS,
            scan_tick_ms: defaults::SCAN_TICK_MS,
        }
    }
}

impl Default for SpeakerConfig {
    fn default() -> Self {
        Self {
            provisional_similarity_threshold: defaults::PROVISIONAL_SIMILARITY_THRESHOLD,
            merge_similarity_threshold: defaults::MERGE_SIMILARITY_THRESHOLD,
            min_fast_audio_ms: defaults::MIN_FAST_PATH_AUDIO_MS,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML or fails
    /// validation. Missing fields use default values.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                VoxbridgeError::ConfigFileNotFound {
                    path: path.to_path_buf(),
                }
            } else {
                VoxbridgeError::Io(e)
            }
        })?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only returns defaults if the file is missing. Invalid TOML or
    /// invalid values still fail.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(VoxbridgeError::ConfigFileNotFound { .. }) => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - VOXBRIDGE_CANDIDATES → race.candidates (comma-separated)
    /// - VOXBRIDGE_CONFIDENCE_THRESHOLD → race.confidence_threshold
    /// - VOXBRIDGE_SILENCE_WINDOW_MS → segmenter.silence_window_ms
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(candidates) = std::env::var("VOXBRIDGE_CANDIDATES")
            && !candidates.is_empty()
        {
            self.race.candidates = candidates
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        if let Ok(threshold) = std::env::var("VOXBRIDGE_CONFIDENCE_THRESHOLD")
            && let Ok(value) = threshold.parse::<f32>()
        {
            self.race.confidence_threshold = value;
        }

        if let Ok(window) = std::env::var("VOXBRIDGE_SILENCE_WINDOW_MS")
            && let Ok(value) = window.parse::<u64>()
        {
            self.segmenter.silence_window_ms = value;
        }

        self
    }

    /// Validate cross-field constraints
    pub fn validate(&self) -> Result<()> {
        if self.race.candidates.is_empty() {
            return Err(VoxbridgeError::ConfigInvalidValue {
                key: "race.candidates".to_string(),
                message: "at least one candidate language is required".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.race.confidence_threshold) {
            return Err(VoxbridgeError::ConfigInvalidValue {
                key: "race.confidence_threshold".to_string(),
                message: "must be between 0.0 and 1.0".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.race.confidence_gap) {
            return Err(VoxbridgeError::ConfigInvalidValue {
                key: "race.confidence_gap".to_string(),
                message: "must be between 0.0 and 1.0".to_string(),
            });
        }
        if self.race.poll_interval_ms == 0 {
            return Err(VoxbridgeError::ConfigInvalidValue {
                key: "race.poll_interval_ms".to_string(),
                message: "must be positive".to_string(),
            });
        }
        if self.segmenter.silence_window_ms == 0 || self.segmenter.scan_tick_ms == 0 {
            return Err(VoxbridgeError::ConfigInvalidValue {
                key: "segmenter".to_string(),
                message: "silence_window_ms and scan_tick_ms must be positive".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.speaker.provisional_similarity_threshold)
            || !(0.0..=1.0).contains(&self.speaker.merge_similarity_threshold)
        {
            return Err(VoxbridgeError::ConfigInvalidValue {
                key: "speaker".to_string(),
                message: "similarity thresholds must be between 0.0 and 1.0".to_string(),
            });
        }
        Ok(())
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/voxbridge/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("voxbridge")
            .join("config.toml")
    }
}
