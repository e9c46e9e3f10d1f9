//! Shared harness for playback integration tests.
//!
//! [`FakeBackend`] records every call it receives and can be scripted to
//! hold opens until released or to fail them. [`Harness`] wires it to a
//! running playback service over a three-segment day:
//!
//! ```text
//! A 09:00-09:05   gap   B 09:10-09:15   gap   C 09:20-09:25
//! ```

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use parking_lot::Mutex;
use tokio::sync::{broadcast, Semaphore};

use dr_core::config::PlaybackConfig;
use dr_core::events::{drain, Event, EventBus, EventPayload};
use dr_core::{Error, PlaybackErrorKind, Result, Segment};
use dr_playback::{
    BackendEvent, BackendEventSender, MediaBackend, MediaHandle, PlaybackHandle, PlaybackService,
    PlaybackSnapshot,
};
use dr_timeline::Timeline;

// ---------------------------------------------------------------------------
// Time helpers
// ---------------------------------------------------------------------------

pub fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 12, 18).unwrap()
}

pub fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
    day().and_hms_opt(h, m, s).unwrap()
}

pub fn segment(h: u32, m: u32) -> Segment {
    let start = at(h, m, 0);
    Segment::new(
        Path::new("/recordings").join(dr_core::segment_file_name(start, "mp4")),
        start,
        300.0,
    )
}

// ---------------------------------------------------------------------------
// FakeBackend
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Attach,
    Detach,
    Open(PathBuf),
    Play(MediaHandle),
    Pause(MediaHandle),
    SetPosition(MediaHandle, f64),
    Dispose(MediaHandle),
}

#[derive(Default)]
struct FakeState {
    calls: Vec<Call>,
    held: HashMap<PathBuf, usize>,
    failing: HashSet<PathBuf>,
    opened: Vec<(PathBuf, MediaHandle)>,
}

/// Scriptable in-memory [`MediaBackend`].
pub struct FakeBackend {
    state: Mutex<FakeState>,
    sender: Mutex<Option<BackendEventSender>>,
    gate: Semaphore,
    next_handle: AtomicU64,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(FakeState::default()),
            sender: Mutex::new(None),
            gate: Semaphore::new(0),
            next_handle: AtomicU64::new(1),
        })
    }

    /// Make the next open of `path` wait until [`FakeBackend::release_one`].
    pub fn hold_next_open(&self, path: &Path) {
        *self.state.lock().held.entry(path.to_path_buf()).or_default() += 1;
    }

    /// Let one held open proceed.
    pub fn release_one(&self) {
        self.gate.add_permits(1);
    }

    pub fn fail_opens_of(&self, path: &Path) {
        self.state.lock().failing.insert(path.to_path_buf());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    pub fn count(&self, call: &Call) -> usize {
        self.state.lock().calls.iter().filter(|c| *c == call).count()
    }

    pub fn opens_of(&self, path: &Path) -> usize {
        self.count(&Call::Open(path.to_path_buf()))
    }

    /// The most recent successfully opened handle for `path`.
    pub fn handle_of(&self, path: &Path) -> Option<MediaHandle> {
        self.state
            .lock()
            .opened
            .iter()
            .rev()
            .find(|(p, _)| p == path)
            .map(|(_, h)| *h)
    }

    pub fn is_disposed(&self, handle: MediaHandle) -> bool {
        self.count(&Call::Dispose(handle)) > 0
    }

    pub fn is_attached(&self) -> bool {
        self.sender.lock().is_some()
    }

    /// Deliver `event` as if the backend had observed it.
    pub fn emit(&self, event: BackendEvent) {
        let sender = self.sender.lock().clone().expect("backend not attached");
        assert!(sender.send(event), "playback service stopped listening");
    }

    pub fn end(&self, handle: MediaHandle) {
        self.emit(BackendEvent::MediaEnded { handle });
    }

    pub fn position(&self, handle: MediaHandle, offset_secs: f64) {
        self.emit(BackendEvent::PositionChanged {
            handle,
            offset_secs,
        });
    }

    fn record(&self, call: Call) {
        self.state.lock().calls.push(call);
    }
}

#[async_trait]
impl MediaBackend for FakeBackend {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn attach(&self, events: BackendEventSender) {
        self.record(Call::Attach);
        *self.sender.lock() = Some(events);
    }

    fn detach(&self) {
        self.record(Call::Detach);
        self.sender.lock().take();
    }

    async fn open(&self, path: &Path) -> Result<MediaHandle> {
        let (held, failing) = {
            let mut state = self.state.lock();
            state.calls.push(Call::Open(path.to_path_buf()));
            let held = match state.held.get_mut(path) {
                Some(n) if *n > 0 => {
                    *n -= 1;
                    true
                }
                _ => false,
            };
            (held, state.failing.contains(path))
        };

        if held {
            let permit = self
                .gate
                .acquire()
                .await
                .map_err(|e| Error::Internal(e.to_string()))?;
            permit.forget();
        }
        if failing {
            return Err(Error::open_failed(path.display(), "scripted failure"));
        }

        let handle = MediaHandle::new(self.next_handle.fetch_add(1, Ordering::SeqCst));
        self.state.lock().opened.push((path.to_path_buf(), handle));
        Ok(handle)
    }

    fn play(&self, handle: MediaHandle) -> Result<()> {
        self.record(Call::Play(handle));
        Ok(())
    }

    fn pause(&self, handle: MediaHandle) -> Result<()> {
        self.record(Call::Pause(handle));
        Ok(())
    }

    fn set_position(&self, handle: MediaHandle, offset_secs: f64) -> Result<()> {
        self.record(Call::SetPosition(handle, offset_secs));
        Ok(())
    }

    fn dispose(&self, handle: MediaHandle) {
        self.record(Call::Dispose(handle));
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

/// A running playback service over segments A, B and C.
pub struct Harness {
    pub backend: Arc<FakeBackend>,
    pub playback: PlaybackHandle,
    pub rx: broadcast::Receiver<Event>,
    pub a: Segment,
    pub b: Segment,
    pub c: Segment,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(PlaybackConfig::default())
    }

    pub fn with_config(config: PlaybackConfig) -> Self {
        let a = segment(9, 0);
        let b = segment(9, 10);
        let c = segment(9, 20);
        Self::with_segments(config, vec![a.clone(), b.clone(), c.clone()], [a, b, c])
    }

    /// Like [`Harness::with_config`] but over an arbitrary timeline; `abc`
    /// only names segments for convenience.
    pub fn with_segments(
        config: PlaybackConfig,
        segments: Vec<Segment>,
        [a, b, c]: [Segment; 3],
    ) -> Self {
        let backend = FakeBackend::new();
        let events = Arc::new(EventBus::new(1024));
        let rx = events.subscribe();
        let timeline = Arc::new(Timeline::new(segments));
        let playback = PlaybackService::spawn(backend.clone(), timeline, events, config);
        Self {
            backend,
            playback,
            rx,
            a,
            b,
            c,
        }
    }

    /// Everything published since the last call.
    pub fn drain(&mut self) -> Vec<EventPayload> {
        drain(&mut self.rx)
    }

    pub async fn snapshot(&self) -> PlaybackSnapshot {
        self.playback.snapshot().await.unwrap()
    }

    /// Poll the service until `pred` holds, failing after two seconds.
    pub async fn wait_until(&self, pred: impl Fn(&PlaybackSnapshot) -> bool) -> PlaybackSnapshot {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        loop {
            let snap = self.snapshot().await;
            if pred(&snap) {
                return snap;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "condition not reached; last snapshot: {snap:?}"
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Wait for the backend to have seen `n` opens of `path`.
    pub async fn wait_for_opens(&self, path: &Path, n: usize) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while self.backend.opens_of(path) < n {
            assert!(
                tokio::time::Instant::now() < deadline,
                "expected {n} opens of {}",
                path.display()
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Handle the backend issued for `segment`'s most recent open.
    pub fn handle(&self, segment: &Segment) -> MediaHandle {
        self.backend
            .handle_of(segment.path())
            .unwrap_or_else(|| panic!("{} was never opened", segment.path().display()))
    }
}

/// Poll `cond` until it holds, failing after two seconds.
pub async fn eventually(cond: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !cond() {
        assert!(tokio::time::Instant::now() < deadline, "condition not reached");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

// ---------------------------------------------------------------------------
// Event assertions
// ---------------------------------------------------------------------------

pub fn errors(events: &[EventPayload]) -> Vec<PlaybackErrorKind> {
    events
        .iter()
        .filter_map(|e| match e {
            EventPayload::PlaybackError { kind, .. } => Some(*kind),
            _ => None,
        })
        .collect()
}

pub fn started(events: &[EventPayload]) -> Vec<Segment> {
    events
        .iter()
        .filter_map(|e| match e {
            EventPayload::PlaybackStarted { segment } => Some(segment.clone()),
            _ => None,
        })
        .collect()
}

pub fn ended(events: &[EventPayload]) -> Vec<Segment> {
    events
        .iter()
        .filter_map(|e| match e {
            EventPayload::PlaybackEnded { segment } => Some(segment.clone()),
            _ => None,
        })
        .collect()
}
