//! A headless, clock-driven [`MediaBackend`].
//!
//! Nothing is decoded. Playing media simply advances a virtual position on
//! every tick, scaled by a speed factor, and the backend reports
//! `PositionChanged` and finally `MediaEnded` like a real player would.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use dr_core::{Error, Result};
use dr_probe::Prober;

use crate::backend::{BackendEvent, BackendEventSender, MediaBackend, MediaHandle};

const DEFAULT_TICK: Duration = Duration::from_millis(250);

struct SimulatedMedia {
    path: PathBuf,
    duration_secs: f64,
    position_secs: f64,
    playing: bool,
}

#[derive(Default)]
struct Shared {
    media: Mutex<HashMap<MediaHandle, SimulatedMedia>>,
    sender: Mutex<Option<BackendEventSender>>,
}

impl Shared {
    fn emit(&self, event: BackendEvent) {
        if let Some(sender) = self.sender.lock().as_ref() {
            sender.send(event);
        }
    }

    /// Advance every playing media by `step` seconds of media time.
    fn tick(&self, step: f64) {
        let mut events = Vec::new();
        {
            let mut media = self.media.lock();
            for (handle, m) in media.iter_mut().filter(|(_, m)| m.playing) {
                m.position_secs = (m.position_secs + step).min(m.duration_secs);
                events.push(BackendEvent::PositionChanged {
                    handle: *handle,
                    offset_secs: m.position_secs,
                });
                if m.position_secs >= m.duration_secs {
                    m.playing = false;
                    tracing::trace!(path = %m.path.display(), "simulated media ended");
                    events.push(BackendEvent::MediaEnded { handle: *handle });
                }
            }
        }
        for event in events {
            self.emit(event);
        }
    }
}

/// Plays files by pretending: position advances with the wall clock.
pub struct SimulatedBackend {
    shared: Arc<Shared>,
    next_handle: AtomicU64,
    speed: f64,
    tick: Duration,
    prober: Option<Arc<dyn Prober>>,
    fallback_secs: f64,
    ticker: Mutex<Option<CancellationToken>>,
}

impl SimulatedBackend {
    /// `speed` is media seconds per wall-clock second; non-positive values
    /// mean real time.
    pub fn new(speed: f64, prober: Option<Arc<dyn Prober>>, fallback_secs: f64) -> Self {
        Self {
            shared: Arc::new(Shared::default()),
            next_handle: AtomicU64::new(1),
            speed: if speed.is_finite() && speed > 0.0 { speed } else { 1.0 },
            tick: DEFAULT_TICK,
            prober,
            fallback_secs,
            ticker: Mutex::new(None),
        }
    }

    /// Override the tick interval.
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Number of media sources currently open.
    pub fn open_count(&self) -> usize {
        self.shared.media.lock().len()
    }

    fn with_media(&self, handle: MediaHandle, f: impl FnOnce(&mut SimulatedMedia)) -> Result<()> {
        match self.shared.media.lock().get_mut(&handle) {
            Some(media) => {
                f(media);
                Ok(())
            }
            None => Err(Error::MediaPlaybackFailed(format!("unknown media {handle}"))),
        }
    }
}

fn media_duration(prober: Option<&Arc<dyn Prober>>, path: &Path, fallback_secs: f64) -> f64 {
    let probed = prober.filter(|p| p.supports(path)).and_then(|p| match p.probe_duration(path) {
        Ok(secs) => secs,
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "probe failed");
            None
        }
    });
    probed.unwrap_or(fallback_secs)
}

#[async_trait]
impl MediaBackend for SimulatedBackend {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn attach(&self, events: BackendEventSender) {
        *self.shared.sender.lock() = Some(events);

        let cancel = CancellationToken::new();
        if let Some(previous) = self.ticker.lock().replace(cancel.clone()) {
            previous.cancel();
        }

        let shared = self.shared.clone();
        let tick = self.tick;
        let step = tick.as_secs_f64() * self.speed;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => shared.tick(step),
                }
            }
        });
    }

    fn detach(&self) {
        if let Some(cancel) = self.ticker.lock().take() {
            cancel.cancel();
        }
        self.shared.sender.lock().take();
    }

    async fn open(&self, path: &Path) -> Result<MediaHandle> {
        let meta = tokio::fs::metadata(path)
            .await
            .map_err(|e| Error::open_failed(path.display(), e.to_string()))?;
        if !meta.is_file() {
            return Err(Error::open_failed(path.display(), "not a file"));
        }

        let prober = self.prober.clone();
        let fallback = self.fallback_secs;
        let owned = path.to_path_buf();
        let duration_secs =
            tokio::task::spawn_blocking(move || media_duration(prober.as_ref(), &owned, fallback))
                .await
                .map_err(|e| Error::Internal(format!("spawn_blocking join error: {e}")))?;

        let handle = MediaHandle::new(self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.shared.media.lock().insert(
            handle,
            SimulatedMedia {
                path: path.to_path_buf(),
                duration_secs,
                position_secs: 0.0,
                playing: false,
            },
        );
        tracing::debug!(path = %path.display(), handle = %handle, duration_secs, "simulated open");
        self.shared.emit(BackendEvent::MediaOpened { handle });
        Ok(handle)
    }

    fn play(&self, handle: MediaHandle) -> Result<()> {
        self.with_media(handle, |m| m.playing = true)
    }

    fn pause(&self, handle: MediaHandle) -> Result<()> {
        self.with_media(handle, |m| m.playing = false)
    }

    fn set_position(&self, handle: MediaHandle, offset_secs: f64) -> Result<()> {
        self.with_media(handle, |m| {
            m.position_secs = offset_secs.clamp(0.0, m.duration_secs);
        })
    }

    fn dispose(&self, handle: MediaHandle) {
        self.shared.media.lock().remove(&handle);
    }
}
