//! Playback cursor: the current segment and the current instant.
//!
//! The tracker is the only writer of its state. Observers learn about
//! changes through `SegmentChanged` / `PositionChanged` events on the shared
//! bus; when both fire, the position event is published first.

use std::sync::Arc;

use chrono::NaiveDateTime;

use dr_core::events::{EventBus, EventPayload};
use dr_core::Segment;

use crate::timeline::Timeline;

/// Tracks where playback is on a [`Timeline`].
pub struct PositionTracker {
    timeline: Arc<Timeline>,
    current_segment: Option<Segment>,
    current_position: NaiveDateTime,
    events: Arc<EventBus>,
}

impl PositionTracker {
    /// Create an uninitialised tracker over an empty timeline.
    ///
    /// No events are published until [`PositionTracker::initialize`].
    pub fn new(events: Arc<EventBus>) -> Self {
        let timeline = Arc::new(Timeline::empty());
        let current_position = timeline.start_of_day();
        Self {
            timeline,
            current_segment: None,
            current_position,
            events,
        }
    }

    pub fn timeline(&self) -> &Arc<Timeline> {
        &self.timeline
    }

    pub fn current_segment(&self) -> Option<&Segment> {
        self.current_segment.as_ref()
    }

    pub fn current_position(&self) -> NaiveDateTime {
        self.current_position
    }

    /// Attach `timeline` and move to its midnight.
    ///
    /// Both events are always published, even if nothing changed.
    pub fn initialize(&mut self, timeline: Arc<Timeline>) {
        self.current_position = timeline.start_of_day();
        self.current_segment = timeline.segment_at(self.current_position).cloned();
        self.timeline = timeline;
        tracing::debug!(
            date = %self.timeline.date(),
            segments = self.timeline.len(),
            "position tracker initialised"
        );
        self.publish_position();
        self.publish_segment();
    }

    /// Move to `t`, resolving the covering segment.
    ///
    /// Publishes `SegmentChanged` only when the resolved segment differs by
    /// identity from the current one. Returns whether a segment covers `t`.
    pub fn set_position(&mut self, t: NaiveDateTime) -> bool {
        self.current_position = t;
        let resolved = self.timeline.segment_at(t).cloned();
        let changed = !same_identity(self.current_segment.as_ref(), resolved.as_ref());
        let found = resolved.is_some();

        self.publish_position();
        if changed {
            self.current_segment = resolved;
            self.publish_segment();
        }
        found
    }

    /// Adopt `segment` authoritatively, positioned at its start.
    ///
    /// Both events are always published; the index is not consulted.
    pub fn force_segment_change(&mut self, segment: Segment) {
        self.current_position = segment.start_time();
        self.current_segment = Some(segment);
        self.publish_position();
        self.publish_segment();
    }

    /// Step to the next segment in sort order.
    ///
    /// Without a current segment (the cursor sits in a gap) the first
    /// segment starting after the cursor is used.
    pub fn move_to_next(&mut self) -> bool {
        match self.peek_next() {
            Some(next) => {
                self.force_segment_change(next);
                true
            }
            None => false,
        }
    }

    /// Step to the previous segment in sort order.
    ///
    /// Without a current segment the last segment ending at or before the
    /// cursor is used.
    pub fn move_to_previous(&mut self) -> bool {
        match self.peek_previous() {
            Some(previous) => {
                self.force_segment_change(previous);
                true
            }
            None => false,
        }
    }

    /// The segment [`PositionTracker::move_to_next`] would move to.
    pub fn peek_next(&self) -> Option<Segment> {
        match &self.current_segment {
            Some(current) => self.timeline.next_segment(current),
            None => self.timeline.first_segment_after(self.current_position),
        }
        .cloned()
    }

    /// The segment [`PositionTracker::move_to_previous`] would move to.
    pub fn peek_previous(&self) -> Option<Segment> {
        match &self.current_segment {
            Some(current) => self.timeline.previous_segment(current),
            None => self.timeline.last_segment_before(self.current_position),
        }
        .cloned()
    }

    /// Position the cursor `offset_secs` into the current segment.
    ///
    /// The offset is clamped to `[0, duration]`. Only `PositionChanged` is
    /// published; nothing happens without a current segment.
    pub fn update_position_within_segment(&mut self, offset_secs: f64) {
        let Some(segment) = &self.current_segment else {
            return;
        };
        let offset = clamp_offset(offset_secs, segment.duration_secs());
        self.current_position = segment.instant_at(offset);
        self.publish_position();
    }

    fn publish_position(&self) {
        self.events.publish(EventPayload::PositionChanged {
            position: self.current_position,
        });
    }

    fn publish_segment(&self) {
        self.events.publish(EventPayload::SegmentChanged {
            segment: self.current_segment.clone(),
        });
    }
}

/// Clamp `offset` into `[0, duration]`, mapping NaN to zero.
pub fn clamp_offset(offset: f64, duration: f64) -> f64 {
    if offset.is_nan() {
        return 0.0;
    }
    offset.clamp(0.0, duration.max(0.0))
}

fn same_identity(a: Option<&Segment>, b: Option<&Segment>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.is_same(b),
        (None, None) => true,
        _ => false,
    }
}
