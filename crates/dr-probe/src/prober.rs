//! The [`Prober`] seam between segment loading and container parsing.

use std::path::Path;

use crate::types::MediaInfo;

/// Reads container metadata from a recorded segment file.
///
/// Probers are shared by the parallel loader and by playback backends, so
/// they must be `Send + Sync`.
pub trait Prober: Send + Sync {
    fn name(&self) -> &'static str;

    fn probe(&self, path: &Path) -> dr_core::Result<MediaInfo>;

    /// Whether `path` looks like something this prober can read, judged by
    /// extension only.
    fn supports(&self, path: &Path) -> bool;

    /// Probe `path` for its playing time in seconds. `Ok(None)` means the
    /// container parsed but carries no usable duration.
    fn probe_duration(&self, path: &Path) -> dr_core::Result<Option<f64>> {
        Ok(self.probe(path)?.duration_secs())
    }
}
