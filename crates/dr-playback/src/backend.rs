//! The [`MediaBackend`] capability the orchestrator drives.
//!
//! Only `open` is asynchronous; every other operation is expected to return
//! immediately. Backends report what happens to opened media by sending
//! [`BackendEvent`]s through the [`BackendEventSender`] they were attached
//! with, from whatever executor context they like. The receiving end lives
//! in the playback service task, so nothing a backend does touches
//! orchestrator state directly.

use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use tokio::sync::mpsc;

/// Opaque reference to one opened media source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MediaHandle(u64);

impl MediaHandle {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for MediaHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "media#{}", self.0)
    }
}

/// Something the backend observed about an opened media source.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    MediaOpened { handle: MediaHandle },
    /// Playback reached the natural end of the media.
    MediaEnded { handle: MediaHandle },
    MediaFailed { handle: MediaHandle, message: String },
    /// Playback position, in seconds from the start of the media.
    PositionChanged { handle: MediaHandle, offset_secs: f64 },
}

impl BackendEvent {
    /// The media source this event concerns.
    pub fn handle(&self) -> MediaHandle {
        match self {
            Self::MediaOpened { handle }
            | Self::MediaEnded { handle }
            | Self::MediaFailed { handle, .. }
            | Self::PositionChanged { handle, .. } => *handle,
        }
    }
}

/// Cloneable sending half handed to a backend on [`MediaBackend::attach`].
#[derive(Debug, Clone)]
pub struct BackendEventSender {
    tx: mpsc::UnboundedSender<BackendEvent>,
}

impl BackendEventSender {
    /// Queue `event` for the owner task. Returns `false` once the owner task
    /// has stopped listening.
    pub fn send(&self, event: BackendEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

/// Create a connected sender/receiver pair.
pub fn event_channel() -> (BackendEventSender, mpsc::UnboundedReceiver<BackendEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (BackendEventSender { tx }, rx)
}

/// A media decode/render capability.
///
/// Implementations must tolerate calls on handles that were already
/// disposed.
#[async_trait]
pub trait MediaBackend: Send + Sync {
    /// A short name for logs.
    fn name(&self) -> &'static str;

    /// Subscribe the orchestrator to this backend's events.
    fn attach(&self, events: BackendEventSender);

    /// Drop the event subscription installed by [`MediaBackend::attach`].
    fn detach(&self);

    /// Open the file at `path`. May fail, and may never finish; callers
    /// bound it with a timeout.
    async fn open(&self, path: &Path) -> dr_core::Result<MediaHandle>;

    fn play(&self, handle: MediaHandle) -> dr_core::Result<()>;

    fn pause(&self, handle: MediaHandle) -> dr_core::Result<()>;

    /// Seek to `offset_secs` from the start of the media.
    fn set_position(&self, handle: MediaHandle, offset_secs: f64) -> dr_core::Result<()>;

    /// Release the media source. Further events for `handle` are not expected.
    fn dispose(&self, handle: MediaHandle);
}
