//! Recorded-segment description, time ranges, and the file name convention.
//!
//! A [`Segment`] is one fixed-format recording (nominally five minutes of
//! CCTV video). Its start time comes from the file name, which must follow
//! `YYYY-MM-DD_HH-MM-SS.<ext>` exactly, e.g. `2024-12-18_13-54-23.mp4`.

use std::path::{Path, PathBuf};

use chrono::{NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::ids::SegmentId;

/// Duration assumed for a segment whose real media length is unknown.
pub const DEFAULT_SEGMENT_SECS: f64 = 300.0;

/// `chrono` format of the timestamp part of a segment file name.
pub const FILE_NAME_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Convert fractional seconds to a `chrono` delta with microsecond precision.
pub fn seconds_to_delta(secs: f64) -> TimeDelta {
    if !secs.is_finite() {
        return TimeDelta::zero();
    }
    TimeDelta::microseconds((secs * 1_000_000.0).round() as i64)
}

/// Convert a `chrono` delta to fractional seconds.
pub fn delta_to_seconds(delta: TimeDelta) -> f64 {
    match delta.num_microseconds() {
        Some(us) => us as f64 / 1_000_000.0,
        None => delta.num_milliseconds() as f64 / 1000.0,
    }
}

// ---------------------------------------------------------------------------
// Segment
// ---------------------------------------------------------------------------

/// One recorded clip: where it lives, when it starts, and how long it runs.
///
/// Everything except `duration_secs` and `available` is fixed at
/// construction. Those two may be corrected by the loader once the real
/// media length is known, before the segment is handed to readers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    id: SegmentId,
    path: PathBuf,
    start_time: NaiveDateTime,
    duration_secs: f64,
    available: bool,
}

impl Segment {
    /// Create an available segment with a fresh identity.
    ///
    /// Negative or non-finite durations are stored as zero.
    pub fn new(path: impl Into<PathBuf>, start_time: NaiveDateTime, duration_secs: f64) -> Self {
        Self {
            id: SegmentId::new(),
            path: path.into(),
            start_time,
            duration_secs: sanitize_duration(duration_secs),
            available: true,
        }
    }

    /// Build a segment from a file path whose name follows the convention.
    pub fn from_path(path: impl Into<PathBuf>, duration_secs: f64) -> Result<Self> {
        let path = path.into();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::InvalidFileName(path.display().to_string()))?;
        let start_time = parse_file_name(name)?;
        Ok(Self::new(path, start_time, duration_secs))
    }

    pub fn id(&self) -> SegmentId {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn start_time(&self) -> NaiveDateTime {
        self.start_time
    }

    pub fn duration_secs(&self) -> f64 {
        self.duration_secs
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    /// Derived end instant: `start_time + duration`.
    pub fn end_time(&self) -> NaiveDateTime {
        self.start_time + seconds_to_delta(self.duration_secs)
    }

    /// Whether `t` falls inside the half-open interval `[start, end)`.
    pub fn contains(&self, t: NaiveDateTime) -> bool {
        t >= self.start_time && t < self.end_time()
    }

    /// Identity comparison; metadata equality is irrelevant.
    pub fn is_same(&self, other: &Segment) -> bool {
        self.id == other.id
    }

    /// Seconds from this segment's start to `t` (negative before the start).
    pub fn offset_of(&self, t: NaiveDateTime) -> f64 {
        delta_to_seconds(t - self.start_time)
    }

    /// Absolute instant at `offset_secs` into this segment.
    pub fn instant_at(&self, offset_secs: f64) -> NaiveDateTime {
        self.start_time + seconds_to_delta(offset_secs)
    }

    /// Correct the duration once the real media length is known.
    pub fn set_duration(&mut self, duration_secs: f64) {
        self.duration_secs = sanitize_duration(duration_secs);
    }

    pub fn set_available(&mut self, available: bool) {
        self.available = available;
    }

    /// Builder-style variant of [`Segment::set_available`].
    pub fn with_available(mut self, available: bool) -> Self {
        self.available = available;
        self
    }
}

fn sanitize_duration(secs: f64) -> f64 {
    if secs.is_finite() && secs > 0.0 {
        secs
    } else {
        0.0
    }
}

// ---------------------------------------------------------------------------
// File name convention
// ---------------------------------------------------------------------------

/// Parse the start time out of a `YYYY-MM-DD_HH-MM-SS.<ext>` file name.
///
/// The stem must be exactly zero-padded (formatting the parsed value back
/// must reproduce it) and the extension must be non-empty ASCII alphanumeric.
pub fn parse_file_name(name: &str) -> Result<NaiveDateTime> {
    let invalid = || Error::InvalidFileName(name.to_string());

    let (stem, ext) = name.rsplit_once('.').ok_or_else(invalid)?;
    if ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(invalid());
    }
    if stem.len() != 19 || !stem.is_ascii() {
        return Err(invalid());
    }

    let start = NaiveDateTime::parse_from_str(stem, FILE_NAME_FORMAT).map_err(|_| invalid())?;
    if start.format(FILE_NAME_FORMAT).to_string() != stem {
        return Err(invalid());
    }
    Ok(start)
}

/// Render the file name a segment starting at `start` would carry.
pub fn segment_file_name(start: NaiveDateTime, extension: &str) -> String {
    format!("{}.{}", start.format(FILE_NAME_FORMAT), extension)
}

// ---------------------------------------------------------------------------
// TimeRange
// ---------------------------------------------------------------------------

/// A half-open `[start, end)` interval; always `start < end`.
///
/// Used both for caller-owned selection ranges and for reported gaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    start: NaiveDateTime,
    end: NaiveDateTime,
}

impl TimeRange {
    /// Create a range, rejecting `start >= end`.
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Result<Self> {
        if start >= end {
            return Err(Error::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    pub fn end(&self) -> NaiveDateTime {
        self.end
    }

    pub fn duration_secs(&self) -> f64 {
        delta_to_seconds(self.end - self.start)
    }

    pub fn contains(&self, t: NaiveDateTime) -> bool {
        t >= self.start && t < self.end
    }
}
