//! Observer-facing playback events.
//!
//! [`EventBus`] wraps a `tokio::sync::broadcast` channel. Observers that
//! subscribe late only see what is published after they subscribed; the
//! position tracker republishes its full state whenever a timeline is
//! loaded, which is enough for a view to resynchronise.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::PlaybackErrorKind;
use crate::segment::Segment;

// ---------------------------------------------------------------------------
// EventPayload
// ---------------------------------------------------------------------------

/// Payload describing what happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// The tracked segment changed (`None` when no segment covers the position).
    SegmentChanged { segment: Option<Segment> },
    /// The tracked absolute position changed.
    PositionChanged { position: NaiveDateTime },
    /// The backend started playing a segment.
    PlaybackStarted { segment: Segment },
    /// A segment finished playing naturally.
    PlaybackEnded { segment: Segment },
    /// Something went wrong; the orchestrator remains usable.
    PlaybackError {
        kind: PlaybackErrorKind,
        message: String,
    },
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// A timestamped event ready for broadcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique event identifier.
    pub id: Uuid,
    /// When the event was published.
    pub timestamp: DateTime<Utc>,
    /// What happened.
    pub payload: EventPayload,
}

impl Event {
    /// Create a new event with a fresh UUID and the current timestamp.
    pub fn new(payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            payload,
        }
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Fan-out of playback events to any number of observers.
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    /// `capacity` is the per-subscriber backlog; zero is raised to one.
    /// Subscribers that fall further behind observe a lag and skip ahead.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn publish(&self, payload: EventPayload) {
        tracing::trace!(?payload, "publish");
        // No subscribers is not an error.
        let _ = self.tx.send(Event::new(payload));
    }

    /// Publish a playback error with its observer-facing classification.
    pub fn publish_error(&self, kind: PlaybackErrorKind, message: impl Into<String>) {
        self.publish(EventPayload::PlaybackError {
            kind,
            message: message.into(),
        });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Drain every event currently buffered for `rx`, skipping over lag gaps.
pub fn drain(rx: &mut broadcast::Receiver<Event>) -> Vec<EventPayload> {
    let mut out = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => out.push(event.payload),
            Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
    out
}
