//! The per-day segment index.
//!
//! A [`Timeline`] owns one calendar day's segments, always sorted ascending
//! by start time. Overlapping or duplicate segments are kept as-is; point
//! lookups resolve ambiguity by taking the first match in sort order.

use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};

use dr_core::{Segment, SegmentId, TimeRange};

/// Sorted collection of one day's recorded segments.
#[derive(Debug, Clone)]
pub struct Timeline {
    date: NaiveDate,
    segments: Vec<Segment>,
}

impl Timeline {
    /// Build a timeline from segments in any order.
    ///
    /// The date is taken from the earliest segment, or today when empty.
    pub fn new(mut segments: Vec<Segment>) -> Self {
        // Stable: equal start times keep their input order.
        segments.sort_by_key(Segment::start_time);
        let date = derive_date(&segments);
        Self { date, segments }
    }

    /// A timeline with no segments, dated today.
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Build a timeline from only those segments that start on `date`.
    pub fn for_date(date: NaiveDate, segments: Vec<Segment>) -> Self {
        Self::new(
            segments
                .into_iter()
                .filter(|s| s.start_time().date() == date)
                .collect(),
        )
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    /// All segments in start-time order.
    pub fn all_segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn first(&self) -> Option<&Segment> {
        self.segments.first()
    }

    pub fn last(&self) -> Option<&Segment> {
        self.segments.last()
    }

    /// Midnight at the start of the timeline's date.
    pub fn start_of_day(&self) -> NaiveDateTime {
        self.date.and_time(NaiveTime::MIN)
    }

    /// Midnight at the start of the following day.
    pub fn end_of_day(&self) -> NaiveDateTime {
        self.start_of_day() + TimeDelta::days(1)
    }

    /// Sum of all segment durations (overlaps are counted twice).
    pub fn recorded_seconds(&self) -> f64 {
        self.segments.iter().map(Segment::duration_secs).sum()
    }

    /// Look a segment up by identity.
    pub fn find(&self, id: SegmentId) -> Option<&Segment> {
        self.segments.iter().find(|s| s.id() == id)
    }

    /// The first segment, in sort order, whose `[start, end)` contains `t`.
    pub fn segment_at(&self, t: NaiveDateTime) -> Option<&Segment> {
        self.segments
            .iter()
            .take_while(|s| s.start_time() <= t)
            .find(|s| s.contains(t))
    }

    /// Every segment intersecting `[a, b)`; empty when `a >= b`.
    ///
    /// A segment qualifies if it starts inside the range, ends inside it, or
    /// spans it entirely. The bounds of each case are inclusive, so a
    /// segment that merely touches `a` or `b` is included.
    pub fn segments_in_range(&self, a: NaiveDateTime, b: NaiveDateTime) -> Vec<&Segment> {
        if a >= b {
            return Vec::new();
        }

        self.segments
            .iter()
            .filter(|s| {
                let start = s.start_time();
                let end = s.end_time();
                let starts_inside = start >= a && start <= b;
                let ends_inside = end >= a && end <= b;
                let spans = start <= a && end >= b;
                starts_inside || ends_inside || spans
            })
            .collect()
    }

    /// [`Timeline::segments_in_range`] for a caller-owned selection.
    pub fn segments_in_selection(&self, range: &TimeRange) -> Vec<&Segment> {
        self.segments_in_range(range.start(), range.end())
    }

    /// Uncovered intervals of the day, in order.
    ///
    /// Computed against the full 24 hours of [`Timeline::date`]: before the
    /// first segment, between adjacent segments, and after the last. With
    /// fewer than two segments no gaps are reported.
    pub fn gaps(&self) -> Vec<TimeRange> {
        if self.segments.len() <= 1 {
            return Vec::new();
        }

        let mut gaps = Vec::new();
        let mut push = |start: NaiveDateTime, end: NaiveDateTime| {
            if let Ok(gap) = TimeRange::new(start, end) {
                gaps.push(gap);
            }
        };

        if let Some(first) = self.segments.first() {
            push(self.start_of_day(), first.start_time());
        }
        for pair in self.segments.windows(2) {
            let current_end = pair[0].end_time();
            let next_start = pair[1].start_time();
            if next_start > current_end {
                push(current_end, next_start);
            }
        }
        if let Some(last) = self.segments.last() {
            push(last.end_time(), self.end_of_day());
        }

        gaps
    }

    /// The segment after `segment` in sort order, matched by identity.
    pub fn next_segment(&self, segment: &Segment) -> Option<&Segment> {
        let idx = self.index_of(segment)?;
        self.segments.get(idx + 1)
    }

    /// The segment before `segment` in sort order, matched by identity.
    pub fn previous_segment(&self, segment: &Segment) -> Option<&Segment> {
        let idx = self.index_of(segment)?;
        idx.checked_sub(1).and_then(|i| self.segments.get(i))
    }

    /// The earliest segment starting strictly after `t`.
    pub fn first_segment_after(&self, t: NaiveDateTime) -> Option<&Segment> {
        self.segments.iter().find(|s| s.start_time() > t)
    }

    /// The latest-starting segment that ended at or before `t`.
    pub fn last_segment_before(&self, t: NaiveDateTime) -> Option<&Segment> {
        self.segments.iter().rev().find(|s| s.end_time() <= t)
    }

    /// Insert `segment`, keeping start-time order.
    ///
    /// Equal start times go after existing entries. The date is re-derived
    /// from the first segment.
    pub fn add_segment(&mut self, segment: Segment) {
        let idx = self
            .segments
            .partition_point(|s| s.start_time() <= segment.start_time());
        self.segments.insert(idx, segment);
        self.date = derive_date(&self.segments);
    }

    fn index_of(&self, segment: &Segment) -> Option<usize> {
        self.segments.iter().position(|s| s.is_same(segment))
    }
}

impl Default for Timeline {
    fn default() -> Self {
        Self::empty()
    }
}

fn derive_date(segments: &[Segment]) -> NaiveDate {
    segments
        .first()
        .map(|s| s.start_time().date())
        .unwrap_or_else(|| Local::now().date_naive())
}
