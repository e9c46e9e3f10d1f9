//! Owner task for the orchestrator.
//!
//! [`PlaybackService::spawn`] moves an orchestrator into a tokio task that
//! serially processes three inputs: commands from [`PlaybackHandle`]s,
//! events from the media backend, and completions of spawned opens. This is
//! the only place orchestrator state is touched, so backend callbacks from
//! any thread are marshaled by construction.

use std::sync::Arc;

use chrono::NaiveDateTime;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use dr_core::config::PlaybackConfig;
use dr_core::events::{Event, EventBus};
use dr_core::{Error, Result, Segment};
use dr_timeline::Timeline;

use crate::backend::{event_channel, BackendEvent, MediaBackend};
use crate::orchestrator::{Completion, OpenCause, Orchestrator, PlaybackSnapshot, Responder};

/// Bounded queue of pending commands.
const COMMAND_BUFFER: usize = 64;

enum Command {
    PlaySegment {
        segment: Segment,
        reply: oneshot::Sender<Result<()>>,
    },
    SeekToTime {
        time: NaiveDateTime,
        reply: oneshot::Sender<Result<()>>,
    },
    SeekToPosition {
        offset_secs: f64,
        reply: oneshot::Sender<()>,
    },
    MoveNext {
        reply: oneshot::Sender<Result<bool>>,
    },
    MovePrevious {
        reply: oneshot::Sender<Result<bool>>,
    },
    PlayPause {
        reply: oneshot::Sender<Result<()>>,
    },
    Stop {
        reply: oneshot::Sender<Result<()>>,
    },
    LoadTimeline {
        timeline: Arc<Timeline>,
        reply: oneshot::Sender<()>,
    },
    Snapshot {
        reply: oneshot::Sender<PlaybackSnapshot>,
    },
    Cleanup {
        reply: oneshot::Sender<()>,
    },
}

/// Entry point for running playback.
pub struct PlaybackService;

impl PlaybackService {
    /// Start the owner task with `timeline` loaded and return a handle to it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        backend: Arc<dyn MediaBackend>,
        timeline: Arc<Timeline>,
        events: Arc<EventBus>,
        config: PlaybackConfig,
    ) -> PlaybackHandle {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (backend_tx, backend_rx) = event_channel();
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();

        let mut orchestrator =
            Orchestrator::new(backend, events.clone(), config, backend_tx, completion_tx);
        orchestrator.load_timeline(timeline);

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(
            orchestrator,
            command_rx,
            backend_rx,
            completion_rx,
            cancel.clone(),
        ));

        PlaybackHandle {
            commands: command_tx,
            events,
            cancel,
            task: Arc::new(Mutex::new(Some(task))),
        }
    }
}

async fn run(
    mut orchestrator: Orchestrator,
    mut commands: mpsc::Receiver<Command>,
    mut backend_events: mpsc::UnboundedReceiver<BackendEvent>,
    mut completions: mpsc::UnboundedReceiver<Completion>,
    cancel: CancellationToken,
) {
    tracing::info!("Playback service started");

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            Some(event) = backend_events.recv() => orchestrator.handle_backend_event(event),
            Some(completion) = completions.recv() => orchestrator.handle_completion(completion),
            command = commands.recv() => match command {
                Some(command) => dispatch(&mut orchestrator, command),
                None => break,
            },
        }
    }

    orchestrator.cleanup();
    tracing::info!("Playback service stopped");
}

fn dispatch(orchestrator: &mut Orchestrator, command: Command) {
    match command {
        Command::PlaySegment { segment, reply } => {
            orchestrator.play_segment(segment, OpenCause::Direct, None, Some(Responder::Done(reply)))
        }
        Command::SeekToTime { time, reply } => {
            orchestrator.seek_to_time(time, Responder::Done(reply))
        }
        Command::SeekToPosition { offset_secs, reply } => {
            orchestrator.seek_to_position(offset_secs);
            let _ = reply.send(());
        }
        Command::MoveNext { reply } => orchestrator.move_to_next(Responder::Moved(reply)),
        Command::MovePrevious { reply } => orchestrator.move_to_previous(Responder::Moved(reply)),
        Command::PlayPause { reply } => orchestrator.play_pause(Responder::Done(reply)),
        Command::Stop { reply } => {
            let _ = reply.send(orchestrator.stop());
        }
        Command::LoadTimeline { timeline, reply } => {
            orchestrator.load_timeline(timeline);
            let _ = reply.send(());
        }
        Command::Snapshot { reply } => {
            let _ = reply.send(orchestrator.snapshot());
        }
        Command::Cleanup { reply } => {
            orchestrator.cleanup();
            let _ = reply.send(());
        }
    }
}

/// Cloneable client of a running [`PlaybackService`].
///
/// Requests that start a media open resolve once the open has completed
/// (or failed, timed out, or been superseded by a later request).
#[derive(Clone)]
pub struct PlaybackHandle {
    commands: mpsc::Sender<Command>,
    events: Arc<EventBus>,
    cancel: CancellationToken,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl PlaybackHandle {
    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled() && !self.commands.is_closed()
    }

    pub async fn play_segment(&self, segment: Segment) -> Result<()> {
        self.request(|reply| Command::PlaySegment { segment, reply })
            .await?
    }

    /// Jump to an arbitrary instant of the day.
    pub async fn seek_to_time(&self, time: NaiveDateTime) -> Result<()> {
        self.request(|reply| Command::SeekToTime { time, reply })
            .await?
    }

    /// Seek within the active segment; a no-op when nothing is active.
    pub async fn seek_to_position(&self, offset_secs: f64) -> Result<()> {
        self.request(|reply| Command::SeekToPosition { offset_secs, reply })
            .await
    }

    /// Play the next segment. `Ok(false)` when there is none.
    pub async fn move_to_next(&self) -> Result<bool> {
        self.request(|reply| Command::MoveNext { reply }).await?
    }

    /// Play the previous segment. `Ok(false)` when there is none.
    pub async fn move_to_previous(&self) -> Result<bool> {
        self.request(|reply| Command::MovePrevious { reply }).await?
    }

    pub async fn play_pause(&self) -> Result<()> {
        self.request(|reply| Command::PlayPause { reply }).await?
    }

    pub async fn stop(&self) -> Result<()> {
        self.request(|reply| Command::Stop { reply }).await?
    }

    pub async fn load_timeline(&self, timeline: Arc<Timeline>) -> Result<()> {
        self.request(|reply| Command::LoadTimeline { timeline, reply })
            .await
    }

    pub async fn snapshot(&self) -> Result<PlaybackSnapshot> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    pub async fn cleanup(&self) -> Result<()> {
        self.request(|reply| Command::Cleanup { reply }).await
    }

    /// Stop the owner task after releasing all media. Idempotent.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Playback service task failed");
            }
        }
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(build(tx))
            .await
            .map_err(|_| not_running())?;
        rx.await.map_err(|_| not_running())
    }
}

fn not_running() -> Error {
    Error::Internal("playback service is not running".into())
}
