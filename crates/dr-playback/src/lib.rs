//! # dr-playback
//!
//! Continuous playback of a day's segments over an external media backend.
//!
//! - [`MediaBackend`]: the decode/render capability being driven.
//! - [`PlaybackService`] / [`PlaybackHandle`]: the owner task that runs the
//!   orchestrator and the client used to command it.
//! - [`SimulatedBackend`]: a clock-driven backend for headless use.
//!
//! ```no_run
//! # async fn demo(timeline: std::sync::Arc<dr_timeline::Timeline>) -> dr_core::Result<()> {
//! use std::sync::Arc;
//! use dr_core::config::PlaybackConfig;
//! use dr_core::events::EventBus;
//! use dr_playback::{PlaybackService, SimulatedBackend};
//!
//! let backend = Arc::new(SimulatedBackend::new(8.0, None, 300.0));
//! let events = Arc::new(EventBus::default());
//! let playback = PlaybackService::spawn(backend, timeline, events, PlaybackConfig::default());
//! playback.move_to_next().await?;
//! playback.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod orchestrator;
pub mod service;
pub mod simulated;

pub use backend::{event_channel, BackendEvent, BackendEventSender, MediaBackend, MediaHandle};
pub use orchestrator::{OpenCause, PlaybackSnapshot, PlaybackState};
pub use service::{PlaybackHandle, PlaybackService};
pub use simulated::SimulatedBackend;
