//! Playback orchestration state machine.
//!
//! The [`Orchestrator`] drives one segment at a time through a
//! [`MediaBackend`], preloads the successor in the background and decides
//! whether a natural end of media advances, is ignored, or is suppressed by
//! a manual seek.
//!
//! Every handler takes `&mut self` and returns without awaiting. Backend
//! opens run in spawned tasks whose results come back as [`Completion`]s
//! through the owner task, so backend events that arrive while an open is
//! in flight observe the `Opening` phase and are reconciled against it.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use dr_core::config::PlaybackConfig;
use dr_core::events::{EventBus, EventPayload};
use dr_core::{Error, PlaybackErrorKind, Result, Segment, SegmentId};
use dr_timeline::position::clamp_offset;
use dr_timeline::{PositionTracker, Timeline};

use crate::backend::{BackendEvent, BackendEventSender, MediaBackend, MediaHandle};

// ---------------------------------------------------------------------------
// Public state types
// ---------------------------------------------------------------------------

/// Why a segment is being opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenCause {
    /// An explicit play request.
    Direct,
    /// Next/previous navigation.
    Navigation,
    /// The previous segment ended naturally.
    AutoAdvance,
    /// A seek to an arbitrary instant.
    ManualSeek,
}

/// Coarse playback state as seen from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Opening(OpenCause),
    Playing,
    Paused,
    Stopped,
}

/// Point-in-time view of the orchestrator and its position tracker.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackSnapshot {
    pub state: PlaybackState,
    pub active_segment: Option<Segment>,
    /// Segment whose media is being (or has been) preloaded.
    pub preloaded_segment: Option<Segment>,
    /// Whether the preloaded media is open and ready for reuse.
    pub preload_ready: bool,
    pub current_segment: Option<Segment>,
    pub position: NaiveDateTime,
    pub date: NaiveDate,
}

// ---------------------------------------------------------------------------
// Internal plumbing
// ---------------------------------------------------------------------------

/// Reply channel of the command that started an operation.
pub(crate) enum Responder {
    Done(oneshot::Sender<Result<()>>),
    Moved(oneshot::Sender<Result<bool>>),
}

impl Responder {
    fn send(self, result: Result<()>) {
        match self {
            Self::Done(tx) => {
                let _ = tx.send(result);
            }
            Self::Moved(tx) => {
                let _ = tx.send(result.map(|()| true));
            }
        }
    }

    fn not_moved(self) {
        match self {
            Self::Moved(tx) => {
                let _ = tx.send(Ok(false));
            }
            other => other.send(Ok(())),
        }
    }
}

fn respond(reply: Option<Responder>, result: Result<()>) {
    if let Some(reply) = reply {
        reply.send(result);
    }
}

/// Result of a spawned backend open, delivered back to the owner task.
pub(crate) enum Completion {
    Opened {
        ticket: u64,
        result: Result<MediaHandle>,
    },
    Preloaded {
        segment: SegmentId,
        result: Result<MediaHandle>,
    },
}

impl Completion {
    fn opened_handle(&self) -> Option<MediaHandle> {
        match self {
            Self::Opened { result, .. } | Self::Preloaded { result, .. } => result.as_ref().ok().copied(),
        }
    }
}

struct PendingOpen {
    segment: Segment,
    cause: OpenCause,
    ticket: u64,
    seek_offset: Option<f64>,
    reply: Option<Responder>,
}

enum Phase {
    Idle,
    Opening(PendingOpen),
    Playing,
    Paused,
    Stopped,
}

impl Phase {
    fn state(&self) -> PlaybackState {
        match self {
            Self::Idle => PlaybackState::Idle,
            Self::Opening(pending) => PlaybackState::Opening(pending.cause),
            Self::Playing => PlaybackState::Playing,
            Self::Paused => PlaybackState::Paused,
            Self::Stopped => PlaybackState::Stopped,
        }
    }
}

#[derive(Default)]
enum Preload {
    #[default]
    Empty,
    Loading {
        segment: Segment,
        cancel: CancellationToken,
    },
    Ready {
        segment: Segment,
        handle: MediaHandle,
    },
    /// Preloading this segment already failed; not retried until it changes.
    Failed { segment: SegmentId },
}

impl Preload {
    fn segment(&self) -> Option<&Segment> {
        match self {
            Self::Loading { segment, .. } | Self::Ready { segment, .. } => Some(segment),
            Self::Empty | Self::Failed { .. } => None,
        }
    }

    fn concerns(&self, id: SegmentId) -> bool {
        match self {
            Self::Loading { segment, .. } | Self::Ready { segment, .. } => segment.id() == id,
            Self::Failed { segment } => *segment == id,
            Self::Empty => false,
        }
    }
}

/// The media currently wired to the backend's event stream.
struct Attached {
    segment: Segment,
    handle: MediaHandle,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub(crate) struct Orchestrator {
    backend: Arc<dyn MediaBackend>,
    events: Arc<EventBus>,
    config: PlaybackConfig,
    tracker: PositionTracker,
    phase: Phase,
    active_segment: Option<Segment>,
    attached: Option<Attached>,
    preload: Preload,
    backend_tx: BackendEventSender,
    backend_attached: bool,
    completions: mpsc::UnboundedSender<Completion>,
    next_ticket: u64,
}

impl Orchestrator {
    pub(crate) fn new(
        backend: Arc<dyn MediaBackend>,
        events: Arc<EventBus>,
        config: PlaybackConfig,
        backend_tx: BackendEventSender,
        completions: mpsc::UnboundedSender<Completion>,
    ) -> Self {
        Self {
            tracker: PositionTracker::new(events.clone()),
            backend,
            events,
            config,
            phase: Phase::Idle,
            active_segment: None,
            attached: None,
            preload: Preload::Empty,
            backend_tx,
            backend_attached: false,
            completions,
            next_ticket: 0,
        }
    }

    pub(crate) fn snapshot(&self) -> PlaybackSnapshot {
        PlaybackSnapshot {
            state: self.phase.state(),
            active_segment: self.active_segment.clone(),
            preloaded_segment: self.preload.segment().cloned(),
            preload_ready: matches!(self.preload, Preload::Ready { .. }),
            current_segment: self.tracker.current_segment().cloned(),
            position: self.tracker.current_position(),
            date: self.tracker.timeline().date(),
        }
    }

    /// Replace the timeline, dropping all playback state.
    pub(crate) fn load_timeline(&mut self, timeline: Arc<Timeline>) {
        self.cleanup();
        self.tracker.initialize(timeline);
    }

    // -- Commands ----------------------------------------------------------

    pub(crate) fn play_segment(
        &mut self,
        segment: Segment,
        cause: OpenCause,
        seek_offset: Option<f64>,
        reply: Option<Responder>,
    ) {
        if !segment.is_available() {
            let err = Error::InvalidSegment(format!(
                "{} is not available",
                segment.path().display()
            ));
            self.report(&err, PlaybackErrorKind::InvalidSegment);
            respond(reply, Err(err));
            return;
        }

        tracing::debug!(segment = %segment.path().display(), cause = ?cause, "play segment");
        self.ensure_backend_attached();
        self.supersede_pending();
        self.pause_attached();
        self.active_segment = Some(segment.clone());
        self.tracker.force_segment_change(segment.clone());

        if cause == OpenCause::ManualSeek {
            self.discard_preload();
        } else if let Some(handle) = self.take_ready_preload(&segment) {
            tracing::debug!(segment = %segment.path().display(), handle = %handle, "reusing preloaded media");
            self.start_playback(segment, handle, cause, seek_offset, reply);
            return;
        } else if self.preload.concerns(segment.id()) {
            // Still loading: open fresh rather than wait on it.
            self.discard_preload();
        }

        let ticket = self.issue_ticket();
        self.spawn_open(&segment, ticket);
        self.phase = Phase::Opening(PendingOpen {
            segment,
            cause,
            ticket,
            seek_offset,
            reply,
        });
    }

    /// Cross-segment seek. Auto-advance and preload reuse are suppressed
    /// until the target segment is playing.
    pub(crate) fn seek_to_time(&mut self, time: NaiveDateTime, reply: Responder) {
        let Some(segment) = self.tracker.timeline().segment_at(time).cloned() else {
            let err = Error::NoFootageAtTime { time };
            self.report(&err, PlaybackErrorKind::NoFootageAtTime);
            reply.send(Err(err));
            return;
        };
        let offset = segment.offset_of(time);
        let seek_offset = (offset > 0.0).then_some(offset);
        self.play_segment(segment, OpenCause::ManualSeek, seek_offset, Some(reply));
    }

    /// Seek within the active segment.
    pub(crate) fn seek_to_position(&mut self, offset_secs: f64) {
        if let Phase::Opening(pending) = &mut self.phase {
            pending.seek_offset = Some(clamp_offset(offset_secs, pending.segment.duration_secs()));
            return;
        }
        let Some((handle, duration)) = self
            .attached
            .as_ref()
            .map(|a| (a.handle, a.segment.duration_secs()))
        else {
            return;
        };

        let offset = clamp_offset(offset_secs, duration);
        if let Err(e) = self.backend.set_position(handle, offset) {
            self.report(&e, PlaybackErrorKind::MediaPlaybackFailed);
            return;
        }
        self.tracker.update_position_within_segment(offset);
    }

    pub(crate) fn move_to_next(&mut self, reply: Responder) {
        let target = self.tracker.peek_next();
        self.navigate(target, reply);
    }

    pub(crate) fn move_to_previous(&mut self, reply: Responder) {
        let target = self.tracker.peek_previous();
        self.navigate(target, reply);
    }

    fn navigate(&mut self, target: Option<Segment>, reply: Responder) {
        match target {
            Some(segment) => self.play_segment(segment, OpenCause::Navigation, None, Some(reply)),
            None => reply.not_moved(),
        }
    }

    pub(crate) fn play_pause(&mut self, reply: Responder) {
        match self.phase.state() {
            PlaybackState::Opening(_) => reply.send(Ok(())),
            PlaybackState::Playing => {
                let result = match self.attached_handle() {
                    Some(handle) => self.backend.pause(handle),
                    None => Ok(()),
                };
                match result {
                    Ok(()) => {
                        self.phase = Phase::Paused;
                        reply.send(Ok(()));
                    }
                    Err(e) => {
                        self.report(&e, PlaybackErrorKind::MediaPlaybackFailed);
                        reply.send(Err(e));
                    }
                }
            }
            PlaybackState::Idle | PlaybackState::Paused | PlaybackState::Stopped => {
                if let Some(handle) = self.attached_handle() {
                    match self.backend.play(handle) {
                        Ok(()) => {
                            self.phase = Phase::Playing;
                            reply.send(Ok(()));
                        }
                        Err(e) => {
                            self.report(&e, PlaybackErrorKind::MediaPlaybackFailed);
                            reply.send(Err(e));
                        }
                    }
                    return;
                }
                match self.resume_target() {
                    Some(segment) => self.play_segment(segment, OpenCause::Direct, None, Some(reply)),
                    None => {
                        let err = Error::InvalidSegment("nothing to play".into());
                        self.report(&err, PlaybackErrorKind::InvalidSegment);
                        reply.send(Err(err));
                    }
                }
            }
        }
    }

    /// Pause and rewind the attached media to its start.
    pub(crate) fn stop(&mut self) -> Result<()> {
        if matches!(self.phase, Phase::Opening(_)) {
            self.supersede_pending();
            self.release_attached();
            self.phase = Phase::Stopped;
            return Ok(());
        }
        let Some(handle) = self.attached_handle() else {
            return Ok(());
        };

        let result = self
            .backend
            .pause(handle)
            .and_then(|()| self.backend.set_position(handle, 0.0));
        self.phase = Phase::Stopped;
        match result {
            Ok(()) => {
                self.tracker.update_position_within_segment(0.0);
                Ok(())
            }
            Err(e) => {
                self.report(&e, PlaybackErrorKind::MediaPlaybackFailed);
                Err(e)
            }
        }
    }

    /// Release everything and detach from the backend. Safe to repeat.
    pub(crate) fn cleanup(&mut self) {
        self.supersede_pending();
        if let Some(attached) = self.attached.take() {
            if let Err(e) = self.backend.pause(attached.handle) {
                tracing::debug!(handle = %attached.handle, error = %e, "pause during cleanup failed");
            }
            self.backend.dispose(attached.handle);
        }
        self.discard_preload();
        self.active_segment = None;
        if self.backend_attached {
            self.backend.detach();
            self.backend_attached = false;
        }
        self.phase = Phase::Idle;
    }

    // -- Backend events ----------------------------------------------------

    pub(crate) fn handle_backend_event(&mut self, event: BackendEvent) {
        if self.attached_handle() != Some(event.handle()) {
            self.handle_detached_event(event);
            return;
        }
        match event {
            BackendEvent::MediaOpened { handle } => {
                tracing::trace!(handle = %handle, "media opened");
            }
            BackendEvent::MediaEnded { .. } => self.on_media_ended(),
            BackendEvent::MediaFailed { message, .. } => self.on_media_failed(message),
            BackendEvent::PositionChanged { offset_secs, .. } => self.on_position_changed(offset_secs),
        }
    }

    fn handle_detached_event(&mut self, event: BackendEvent) {
        let preload_failed = matches!(
            (&event, &self.preload),
            (BackendEvent::MediaFailed { handle, .. }, Preload::Ready { handle: ready, .. }) if handle == ready
        );
        if preload_failed {
            tracing::warn!(handle = %event.handle(), "preloaded media failed, discarding");
            self.discard_preload();
            return;
        }
        tracing::trace!(handle = %event.handle(), "ignoring event for detached media");
    }

    fn on_media_ended(&mut self) {
        let Some(finished) = self.attached.as_ref().map(|a| a.segment.clone()) else {
            return;
        };
        tracing::debug!(segment = %finished.path().display(), "media ended");
        self.events.publish(EventPayload::PlaybackEnded {
            segment: finished.clone(),
        });

        match self.phase.state() {
            PlaybackState::Opening(OpenCause::ManualSeek) => {
                tracing::debug!("media ended during manual seek, not advancing");
            }
            PlaybackState::Opening(_) => {
                tracing::debug!("transition already in progress, ignoring end of media");
            }
            PlaybackState::Playing => self.advance(&finished),
            PlaybackState::Idle | PlaybackState::Paused | PlaybackState::Stopped => {}
        }
    }

    fn advance(&mut self, finished: &Segment) {
        if !self.config.continuous_playback {
            self.phase = Phase::Stopped;
            return;
        }
        let base = self.active_segment.clone().unwrap_or_else(|| finished.clone());
        match self.next_playable(&base) {
            Some(next) => self.play_segment(next, OpenCause::AutoAdvance, None, None),
            None => {
                self.phase = Phase::Stopped;
                self.report(&Error::EndOfTimeline, PlaybackErrorKind::EndOfTimeline);
            }
        }
    }

    fn on_media_failed(&mut self, message: String) {
        let err = Error::MediaPlaybackFailed(message);
        self.report(&err, PlaybackErrorKind::MediaPlaybackFailed);
        self.release_attached();
        if !matches!(self.phase, Phase::Opening(_)) {
            self.phase = Phase::Stopped;
        }
    }

    fn on_position_changed(&mut self, offset_secs: f64) {
        if !matches!(self.phase, Phase::Playing | Phase::Paused) {
            return;
        }
        let Some(duration) = self.attached.as_ref().map(|a| a.segment.duration_secs()) else {
            return;
        };
        self.tracker.update_position_within_segment(offset_secs);

        let remaining = duration - clamp_offset(offset_secs, duration);
        if remaining < self.config.preload_threshold_secs {
            self.start_preload();
        }
    }

    // -- Completions -------------------------------------------------------

    pub(crate) fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Opened { ticket, result } => self.on_opened(ticket, result),
            Completion::Preloaded { segment, result } => self.on_preloaded(segment, result),
        }
    }

    fn on_opened(&mut self, ticket: u64, result: Result<MediaHandle>) {
        let pending = match std::mem::replace(&mut self.phase, Phase::Stopped) {
            Phase::Opening(pending) if pending.ticket == ticket => pending,
            other => {
                self.phase = other;
                if let Ok(handle) = result {
                    tracing::debug!(handle = %handle, ticket, "discarding superseded open");
                    self.backend.dispose(handle);
                }
                return;
            }
        };

        match result {
            Ok(handle) => self.start_playback(
                pending.segment,
                handle,
                pending.cause,
                pending.seek_offset,
                pending.reply,
            ),
            Err(e) => {
                self.report(&e, PlaybackErrorKind::MediaOpenFailed);
                self.release_attached();
                self.phase = Phase::Stopped;
                respond(pending.reply, Err(e));
            }
        }
    }

    fn on_preloaded(&mut self, segment_id: SegmentId, result: Result<MediaHandle>) {
        let current = matches!(
            &self.preload,
            Preload::Loading { segment, .. } if segment.id() == segment_id
        );
        if !current {
            if let Ok(handle) = result {
                tracing::debug!(handle = %handle, "discarding stale preload");
                self.backend.dispose(handle);
            }
            return;
        }

        let Preload::Loading { segment, .. } = std::mem::take(&mut self.preload) else {
            return;
        };
        match result {
            Ok(handle) => {
                tracing::debug!(segment = %segment.path().display(), handle = %handle, "preload ready");
                self.preload = Preload::Ready { segment, handle };
            }
            Err(e) => {
                tracing::warn!(segment = %segment.path().display(), error = %e, "preload failed");
                self.preload = Preload::Failed {
                    segment: segment.id(),
                };
            }
        }
    }

    // -- Helpers -----------------------------------------------------------

    fn start_playback(
        &mut self,
        segment: Segment,
        handle: MediaHandle,
        cause: OpenCause,
        seek_offset: Option<f64>,
        reply: Option<Responder>,
    ) {
        self.release_attached();
        self.attached = Some(Attached {
            segment: segment.clone(),
            handle,
        });

        if let Err(e) = self.backend.play(handle) {
            self.report(&e, PlaybackErrorKind::MediaPlaybackFailed);
            self.release_attached();
            self.phase = Phase::Stopped;
            respond(reply, Err(e));
            return;
        }

        self.phase = Phase::Playing;
        tracing::info!(segment = %segment.path().display(), handle = %handle, cause = ?cause, "playback started");
        self.events.publish(EventPayload::PlaybackStarted { segment });

        if let Some(offset) = seek_offset.filter(|o| *o > 0.0) {
            self.seek_to_position(offset);
        }
        if cause != OpenCause::ManualSeek {
            self.start_preload();
        }
        respond(reply, Ok(()));
    }

    /// Begin opening the successor of the active segment unless it is
    /// already loading or loaded. A successor whose preload failed is not
    /// retried.
    fn start_preload(&mut self) {
        if !self.config.continuous_playback {
            return;
        }
        let next = self
            .active_segment
            .as_ref()
            .and_then(|active| self.next_playable(active));
        let next = match next {
            Some(next) if self.preload.concerns(next.id()) => return,
            Some(next) => next,
            None => {
                self.discard_preload();
                return;
            }
        };
        self.discard_preload();

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let backend = self.backend.clone();
        let completions = self.completions.clone();
        let path = next.path().to_path_buf();
        let segment = next.id();
        let timeout = self.config.open_timeout();
        tracing::debug!(segment = %path.display(), "preloading next segment");

        tokio::spawn(async move {
            let result = tokio::select! {
                _ = token.cancelled() => return,
                result = open_with_timeout(backend.as_ref(), &path, timeout) => result,
            };
            deliver(&completions, backend.as_ref(), Completion::Preloaded { segment, result });
        });
        self.preload = Preload::Loading {
            segment: next,
            cancel,
        };
    }

    fn spawn_open(&self, segment: &Segment, ticket: u64) {
        let backend = self.backend.clone();
        let completions = self.completions.clone();
        let path = segment.path().to_path_buf();
        let timeout = self.config.open_timeout();

        tokio::spawn(async move {
            let result = open_with_timeout(backend.as_ref(), &path, timeout).await;
            deliver(&completions, backend.as_ref(), Completion::Opened { ticket, result });
        });
    }

    fn take_ready_preload(&mut self, segment: &Segment) -> Option<MediaHandle> {
        if !matches!(&self.preload, Preload::Ready { segment: ready, .. } if ready.is_same(segment)) {
            return None;
        }
        match std::mem::take(&mut self.preload) {
            Preload::Ready { handle, .. } => Some(handle),
            _ => None,
        }
    }

    fn discard_preload(&mut self) {
        match std::mem::take(&mut self.preload) {
            Preload::Loading { cancel, .. } => cancel.cancel(),
            Preload::Ready { handle, .. } => self.backend.dispose(handle),
            Preload::Empty | Preload::Failed { .. } => {}
        }
    }

    /// Fail the pending open's caller with `Cancelled`; its late result is
    /// discarded by ticket.
    fn supersede_pending(&mut self) {
        match std::mem::replace(&mut self.phase, Phase::Stopped) {
            Phase::Opening(pending) => {
                tracing::debug!(segment = %pending.segment.path().display(), "pending open superseded");
                respond(
                    pending.reply,
                    Err(Error::Cancelled(format!(
                        "opening {} was superseded",
                        pending.segment.path().display()
                    ))),
                );
            }
            other => self.phase = other,
        }
    }

    fn pause_attached(&self) {
        if let Some(handle) = self.attached_handle() {
            if let Err(e) = self.backend.pause(handle) {
                tracing::debug!(handle = %handle, error = %e, "pause failed");
            }
        }
    }

    fn release_attached(&mut self) {
        if let Some(attached) = self.attached.take() {
            self.backend.dispose(attached.handle);
        }
    }

    fn attached_handle(&self) -> Option<MediaHandle> {
        self.attached.as_ref().map(|a| a.handle)
    }

    fn ensure_backend_attached(&mut self) {
        if !self.backend_attached {
            tracing::debug!(backend = self.backend.name(), "attaching to media backend");
            self.backend.attach(self.backend_tx.clone());
            self.backend_attached = true;
        }
    }

    fn resume_target(&self) -> Option<Segment> {
        self.active_segment
            .clone()
            .or_else(|| self.tracker.current_segment().cloned())
            .or_else(|| {
                self.tracker
                    .timeline()
                    .all_segments()
                    .iter()
                    .find(|s| s.is_available())
                    .cloned()
            })
    }

    /// The first available segment after `from` in sort order.
    fn next_playable(&self, from: &Segment) -> Option<Segment> {
        let timeline = self.tracker.timeline();
        let mut cursor = timeline.next_segment(from);
        while let Some(segment) = cursor {
            if segment.is_available() {
                return Some(segment.clone());
            }
            cursor = timeline.next_segment(segment);
        }
        None
    }

    fn issue_ticket(&mut self) -> u64 {
        self.next_ticket += 1;
        self.next_ticket
    }

    fn report(&self, err: &Error, fallback: PlaybackErrorKind) {
        let kind = err.playback_kind().unwrap_or(fallback);
        tracing::warn!(kind = %kind, error = %err, "playback error");
        self.events.publish_error(kind, err.to_string());
    }
}

async fn open_with_timeout(
    backend: &dyn MediaBackend,
    path: &Path,
    timeout: Duration,
) -> Result<MediaHandle> {
    match tokio::time::timeout(timeout, backend.open(path)).await {
        Ok(result) => result,
        Err(_) => Err(Error::timeout(
            format!("opening {}", path.display()),
            timeout.as_secs_f64(),
        )),
    }
}

/// Hand a completion to the owner task, releasing the media if nobody is
/// listening any more.
fn deliver(
    completions: &mpsc::UnboundedSender<Completion>,
    backend: &dyn MediaBackend,
    completion: Completion,
) {
    if let Err(mpsc::error::SendError(unsent)) = completions.send(completion) {
        if let Some(handle) = unsent.opened_handle() {
            backend.dispose(handle);
        }
    }
}
