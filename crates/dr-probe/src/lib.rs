//! # dr-probe
//!
//! Pure-Rust media probing for recorded segments.
//!
//! The segment loader only needs to know how long each clip really is, so
//! this crate extracts the container format and total duration from MKV and
//! MP4 files without requiring external tools like `ffprobe`.
//!
//! ## Quick start
//!
//! ```no_run
//! use dr_probe::{RustProber, Prober};
//! use std::path::Path;
//!
//! let prober = RustProber::new();
//! let info = prober.probe(Path::new("2024-12-18_13-54-23.mp4")).unwrap();
//! println!("Container: {}", info.container);
//! if let Some(d) = info.duration {
//!     println!("Duration: {:.1}s", d.as_secs_f64());
//! }
//! ```

pub mod prober;
pub mod rust_prober;
pub mod types;

// Re-export key types at crate root for convenience.
pub use prober::Prober;
pub use rust_prober::RustProber;
pub use types::{Container, MediaInfo};
