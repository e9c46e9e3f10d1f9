//! Application configuration types.
//!
//! The top-level [`Config`] struct is deserialized from JSON and carries the
//! playback and library sections. Every section defaults sensibly so a
//! completely empty `{}` file is valid.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::Result;
use crate::segment::DEFAULT_SEGMENT_SECS;
use crate::Error;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub playback: PlaybackConfig,
    pub library: LibraryConfig,
}

impl Config {
    /// Deserialize a `Config` from a JSON string.
    ///
    /// This is string-based so the caller can read the file however it sees
    /// fit (async, embedded, etc.).
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str).map_err(|e| Error::Config(format!("config parse error: {e}")))
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// path is `None` or the file does not exist.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if !(self.playback.preload_threshold_secs > 0.0) {
            warnings.push("playback.preload_threshold_secs must be positive; preloading will only start at segment end".into());
        }
        if !(self.playback.open_timeout_secs > 0.0) {
            warnings.push(format!(
                "playback.open_timeout_secs is not positive; using {DEFAULT_OPEN_TIMEOUT_SECS}s"
            ));
        }
        if self.playback.event_capacity == 0 {
            warnings.push("playback.event_capacity is 0; a capacity of 1 will be used".into());
        }

        if self.library.extensions.is_empty() {
            warnings.push("library.extensions is empty; no files will be loaded".into());
        }
        for (i, ext) in self.library.extensions.iter().enumerate() {
            if ext.starts_with('.') {
                warnings.push(format!(
                    "library.extensions[{i}] '{ext}' should not include the leading dot"
                ));
            }
        }
        if !(self.library.default_segment_secs > 0.0) {
            warnings.push(format!(
                "library.default_segment_secs is not positive; using {DEFAULT_SEGMENT_SECS}s"
            ));
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

const DEFAULT_OPEN_TIMEOUT_SECS: f64 = 5.0;

/// Playback orchestration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Advance into the next segment automatically and preload it.
    pub continuous_playback: bool,
    /// Start preloading the successor once this little time is left.
    pub preload_threshold_secs: f64,
    /// Upper bound for a backend open (playback or preload).
    pub open_timeout_secs: f64,
    /// Broadcast buffer size of the event bus.
    pub event_capacity: usize,
}

impl PlaybackConfig {
    /// The open timeout as a `Duration`, substituting the default for
    /// non-positive values.
    pub fn open_timeout(&self) -> Duration {
        if self.open_timeout_secs.is_finite() && self.open_timeout_secs > 0.0 {
            Duration::from_secs_f64(self.open_timeout_secs)
        } else {
            Duration::from_secs_f64(DEFAULT_OPEN_TIMEOUT_SECS)
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            continuous_playback: true,
            preload_threshold_secs: 5.0,
            open_timeout_secs: DEFAULT_OPEN_TIMEOUT_SECS,
            event_capacity: 256,
        }
    }
}

/// Segment discovery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    /// File extensions (without the dot) considered recordings.
    pub extensions: Vec<String>,
    /// Duration assumed when the real length cannot be resolved.
    pub default_segment_secs: f64,
    /// Resolve each file's true duration by probing it.
    pub probe_durations: bool,
    /// Descend into sub-directories.
    pub recursive: bool,
}

impl LibraryConfig {
    /// The assumed segment duration, substituting the default for
    /// non-positive values.
    pub fn fallback_duration_secs(&self) -> f64 {
        if self.default_segment_secs.is_finite() && self.default_segment_secs > 0.0 {
            self.default_segment_secs
        } else {
            DEFAULT_SEGMENT_SECS
        }
    }
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            extensions: ["mp4", "mkv", "avi", "mov", "ts"]
                .into_iter()
                .map(String::from)
                .collect(),
            default_segment_secs: DEFAULT_SEGMENT_SECS,
            probe_durations: true,
            recursive: false,
        }
    }
}
