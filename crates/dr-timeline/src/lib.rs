//! # dr-timeline
//!
//! Everything that answers "what was recorded when" for a single day:
//!
//! - [`Timeline`]: the sorted segment collection with point, range, gap and
//!   neighbor queries.
//! - [`PositionTracker`]: the current segment and instant, publishing
//!   change events on the shared [`dr_core::events::EventBus`].
//! - [`SegmentLoader`]: builds a [`Timeline`] from a recordings directory.

pub mod loader;
pub mod position;
pub mod timeline;

pub use loader::SegmentLoader;
pub use position::PositionTracker;
pub use timeline::Timeline;
