//! Unified error type for dayreel.
//!
//! All crates funnel their failures into [`Error`]. Errors that observers
//! need to see are classified into a [`PlaybackErrorKind`] via
//! [`Error::playback_kind`] before they are published on the event bus.

use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Unified error type covering all failure modes in dayreel.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The segment cannot be played (absent or marked unavailable).
    #[error("Invalid segment: {0}")]
    InvalidSegment(String),

    /// No recorded segment covers the requested instant.
    #[error("No footage at {time}")]
    NoFootageAtTime {
        /// The instant that was looked up.
        time: NaiveDateTime,
    },

    /// The media backend could not open a file.
    #[error("Failed to open {path}: {message}")]
    MediaOpenFailed {
        /// Path of the file that failed to open.
        path: String,
        /// Backend-reported reason.
        message: String,
    },

    /// The media backend reported a failure while playing.
    #[error("Playback failed: {0}")]
    MediaPlaybackFailed(String),

    /// Auto-advance found no successor segment.
    #[error("End of timeline reached")]
    EndOfTimeline,

    /// A bounded backend operation did not complete in time.
    #[error("Timed out after {secs:.1}s: {operation}")]
    Timeout {
        /// What was being waited on.
        operation: String,
        /// The bound that was exceeded.
        secs: f64,
    },

    /// A time range whose start is not strictly before its end.
    #[error("Invalid range: {start} .. {end}")]
    InvalidRange {
        /// Requested range start.
        start: NaiveDateTime,
        /// Requested range end.
        end: NaiveDateTime,
    },

    /// A file name that does not follow the `YYYY-MM-DD_HH-MM-SS.<ext>` convention.
    #[error("Invalid segment file name: {0}")]
    InvalidFileName(String),

    /// Configuration could not be parsed.
    #[error("Config error: {0}")]
    Config(String),

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Media probing failed.
    #[error("Probe error: {0}")]
    Probe(String),

    /// A pending request was abandoned before it completed.
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Classify this error for the observer-facing error channel.
    ///
    /// Returns `None` for errors that are never published to observers
    /// (config, probe, cancellation and internal plumbing failures).
    pub fn playback_kind(&self) -> Option<PlaybackErrorKind> {
        match self {
            Error::InvalidSegment(_) => Some(PlaybackErrorKind::InvalidSegment),
            Error::NoFootageAtTime { .. } => Some(PlaybackErrorKind::NoFootageAtTime),
            Error::MediaOpenFailed { .. } => Some(PlaybackErrorKind::MediaOpenFailed),
            Error::Timeout { .. } => Some(PlaybackErrorKind::MediaOpenFailed),
            Error::MediaPlaybackFailed(_) => Some(PlaybackErrorKind::MediaPlaybackFailed),
            Error::EndOfTimeline => Some(PlaybackErrorKind::EndOfTimeline),
            Error::InvalidRange { .. }
            | Error::InvalidFileName(_)
            | Error::Config(_)
            | Error::Io { .. }
            | Error::Probe(_)
            | Error::Cancelled(_)
            | Error::Internal(_) => None,
        }
    }

    /// Convenience constructor for [`Error::MediaOpenFailed`].
    pub fn open_failed(path: impl fmt::Display, message: impl Into<String>) -> Self {
        Error::MediaOpenFailed {
            path: path.to_string(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::Timeout`].
    pub fn timeout(operation: impl Into<String>, secs: f64) -> Self {
        Error::Timeout {
            operation: operation.into(),
            secs,
        }
    }
}

/// Failure classes surfaced to observers through the playback-error event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackErrorKind {
    /// Segment absent or unavailable.
    InvalidSegment,
    /// Seek target not covered by any segment.
    NoFootageAtTime,
    /// Backend could not open a file (including timeouts).
    MediaOpenFailed,
    /// Backend-reported runtime failure.
    MediaPlaybackFailed,
    /// Auto-advance has no successor.
    EndOfTimeline,
}

impl fmt::Display for PlaybackErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSegment => write!(f, "invalid_segment"),
            Self::NoFootageAtTime => write!(f, "no_footage_at_time"),
            Self::MediaOpenFailed => write!(f, "media_open_failed"),
            Self::MediaPlaybackFailed => write!(f, "media_playback_failed"),
            Self::EndOfTimeline => write!(f, "end_of_timeline"),
        }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
