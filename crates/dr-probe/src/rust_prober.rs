//! Pure-Rust media file prober implementation.
//!
//! Uses the `matroska` crate for MKV/WebM files and `mp4parse` for MP4/M4V/MOV
//! files. Only the container and total duration are extracted.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::time::Duration;

use crate::prober::Prober;
use crate::types::{Container, MediaInfo};

/// A pure-Rust [`Prober`] implementation.
///
/// Supports MKV (Matroska), WebM, MP4, M4V and MOV files using native Rust
/// parsing crates. No external tools are required.
pub struct RustProber;

impl RustProber {
    /// Create a new `RustProber`.
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustProber {
    fn default() -> Self {
        Self::new()
    }
}

impl Prober for RustProber {
    fn name(&self) -> &'static str {
        "rust"
    }

    fn supports(&self, path: &Path) -> bool {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => matches!(
                ext.to_lowercase().as_str(),
                "mkv" | "webm" | "mp4" | "m4v" | "mov"
            ),
            None => false,
        }
    }

    fn probe(&self, path: &Path) -> dr_core::Result<MediaInfo> {
        let container = detect_container(path)?;
        let file_size = std::fs::metadata(path)
            .map_err(|e| dr_core::Error::Probe(e.to_string()))?
            .len();

        let duration = match container {
            Container::Mkv => probe_mkv_duration(path)?,
            Container::Mp4 => probe_mp4_duration(path)?,
        };
        tracing::trace!(
            path = %path.display(),
            container = %container,
            duration_secs = duration.map(|d| d.as_secs_f64()),
            "probed segment"
        );

        Ok(MediaInfo {
            file_path: path.to_path_buf(),
            file_size,
            container,
            duration,
        })
    }
}

// ---------------------------------------------------------------------------
// Container detection
// ---------------------------------------------------------------------------

/// Detect container format from file magic bytes, with extension fallback.
fn detect_container(path: &Path) -> dr_core::Result<Container> {
    let mut file = File::open(path).map_err(|e| dr_core::Error::Probe(e.to_string()))?;

    let mut magic = [0u8; 12];
    if file.read(&mut magic).unwrap_or(0) >= 8 {
        if let Some(container) = container_from_magic(&magic) {
            return Ok(container);
        }
    }

    // Fallback to extension.
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => match ext.to_lowercase().as_str() {
            "mkv" | "webm" => Ok(Container::Mkv),
            "mp4" | "m4v" | "mov" => Ok(Container::Mp4),
            other => Err(dr_core::Error::Probe(format!(
                "unsupported container extension: {other}"
            ))),
        },
        None => Err(dr_core::Error::Probe(
            "unable to detect container format".to_string(),
        )),
    }
}

fn container_from_magic(magic: &[u8]) -> Option<Container> {
    if magic.len() < 8 {
        return None;
    }
    // EBML header (Matroska/WebM).
    if magic[0..4] == [0x1A, 0x45, 0xDF, 0xA3] {
        return Some(Container::Mkv);
    }
    // Top-level ISO BMFF boxes (MP4/MOV).
    match &magic[4..8] {
        b"ftyp" | b"moov" | b"mdat" | b"free" => Some(Container::Mp4),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Duration extraction
// ---------------------------------------------------------------------------

fn probe_mkv_duration(path: &Path) -> dr_core::Result<Option<Duration>> {
    let file = File::open(path).map_err(|e| dr_core::Error::Probe(e.to_string()))?;
    let mkv = matroska::Matroska::open(BufReader::new(file))
        .map_err(|e| dr_core::Error::Probe(format!("MKV parse error: {e}")))?;
    Ok(mkv.info.duration)
}

fn probe_mp4_duration(path: &Path) -> dr_core::Result<Option<Duration>> {
    let file = File::open(path).map_err(|e| dr_core::Error::Probe(e.to_string()))?;
    let mut reader = BufReader::new(file);
    let context = mp4parse::read_mp4(&mut reader)
        .map_err(|e| dr_core::Error::Probe(format!("MP4 parse error: {e:?}")))?;
    Ok(compute_mp4_duration(&context))
}

fn compute_mp4_duration(context: &mp4parse::MediaContext) -> Option<Duration> {
    let global_ts = context.timescale?;
    context.tracks.iter().find_map(|t| {
        let dur = t.duration?;
        let scale = t.timescale.map(|s| s.0).unwrap_or(global_ts.0);
        if scale == 0 {
            return None;
        }
        let ms = dur.0.checked_mul(1000)? / scale;
        Some(Duration::from_millis(ms))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn supports_by_extension() {
        let p = RustProber::new();
        assert!(p.supports(Path::new("2024-12-18_09-00-00.mp4")));
        assert!(p.supports(Path::new("2024-12-18_09-00-00.MKV")));
        assert!(!p.supports(Path::new("2024-12-18_09-00-00.avi")));
        assert!(!p.supports(Path::new("no_extension")));
    }

    #[test]
    fn magic_bytes_win_over_extension() {
        let mkv = [0x1A, 0x45, 0xDF, 0xA3, 0x93, 0x42, 0x82, 0x88];
        assert_eq!(container_from_magic(&mkv), Some(Container::Mkv));

        let mp4 = [0x00, 0x00, 0x00, 0x14, b'f', b't', b'y', b'p'];
        assert_eq!(container_from_magic(&mp4), Some(Container::Mp4));

        assert_eq!(container_from_magic(&[0u8; 8]), None);
        assert_eq!(container_from_magic(&[0u8; 4]), None);
    }

    #[test]
    fn detect_falls_back_to_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("2024-12-18_09-00-00.mkv");
        std::fs::write(&path, b"short").unwrap();
        assert_eq!(detect_container(&path).unwrap(), Container::Mkv);

        let odd = dir.path().join("2024-12-18_09-00-00.bin");
        std::fs::write(&odd, b"short").unwrap();
        assert!(detect_container(&odd).is_err());
    }

    #[test]
    fn probe_missing_file_errors() {
        let err = RustProber::new()
            .probe(Path::new("/nonexistent/2024-12-18_09-00-00.mp4"))
            .unwrap_err();
        assert!(matches!(err, dr_core::Error::Probe(_)));
    }

    #[test]
    fn probe_garbage_mp4_errors() {
        let mut file = tempfile::Builder::new().suffix(".mp4").tempfile().unwrap();
        file.write_all(&[0x00, 0x00, 0x00, 0x08, b'f', b't', b'y', b'p', 0xFF, 0xFF])
            .unwrap();
        assert!(RustProber::new().probe(file.path()).is_err());
    }
}
