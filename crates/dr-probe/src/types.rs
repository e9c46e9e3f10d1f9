//! Core types for media probe results.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Container formats the pure-Rust prober understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Container {
    Mkv,
    Mp4,
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mkv => write!(f, "mkv"),
            Self::Mp4 => write!(f, "mp4"),
        }
    }
}

/// What probing a recorded segment file yields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaInfo {
    /// Path to the probed file.
    pub file_path: PathBuf,
    /// File size in bytes.
    pub file_size: u64,
    /// Container format.
    pub container: Container,
    /// Total duration (if determinable).
    pub duration: Option<Duration>,
}

impl MediaInfo {
    /// Duration in fractional seconds, ignoring zero-length reports.
    pub fn duration_secs(&self) -> Option<f64> {
        self.duration
            .map(|d| d.as_secs_f64())
            .filter(|secs| *secs > 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(duration: Option<Duration>) -> MediaInfo {
        MediaInfo {
            file_path: PathBuf::from("2024-12-18_09-00-00.mp4"),
            file_size: 1024,
            container: Container::Mp4,
            duration,
        }
    }

    #[test]
    fn container_display_and_serde() {
        assert_eq!(Container::Mkv.to_string(), "mkv");
        let json = serde_json::to_string(&Container::Mp4).unwrap();
        assert_eq!(json, r#""mp4""#);
    }

    #[test]
    fn duration_secs_filters_zero() {
        assert_eq!(info(Some(Duration::from_millis(299_500))).duration_secs(), Some(299.5));
        assert_eq!(info(Some(Duration::ZERO)).duration_secs(), None);
        assert_eq!(info(None).duration_secs(), None);
    }
}
