//! dr-core: shared segment types, IDs, errors, configuration, and event system.
//!
//! This crate is the foundational dependency for all other dr-* crates,
//! providing the immutable [`Segment`] description, type-safe identifiers,
//! a unified error type, application configuration, and a broadcast event
//! bus carrying the observer-facing playback events.

pub mod config;
pub mod error;
pub mod events;
pub mod ids;
pub mod segment;

// Re-export the most commonly used items at the crate root.
pub use error::{Error, PlaybackErrorKind, Result};
pub use ids::*;
pub use segment::*;
