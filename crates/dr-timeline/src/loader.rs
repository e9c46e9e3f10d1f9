//! Segment discovery.
//!
//! Walks a recordings directory, keeps files whose names follow the
//! `YYYY-MM-DD_HH-MM-SS.<ext>` convention, and resolves each file's real
//! duration by probing it in parallel.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDate;
use rayon::prelude::*;

use dr_core::config::LibraryConfig;
use dr_core::{Error, Result, Segment};
use dr_probe::{Prober, RustProber};

use crate::timeline::Timeline;

/// Builds [`Segment`]s and day [`Timeline`]s from a directory of recordings.
pub struct SegmentLoader {
    config: LibraryConfig,
    extensions: Vec<String>,
    prober: Option<Arc<dyn Prober>>,
}

impl SegmentLoader {
    /// Create a loader. With `prober == None` every segment gets the
    /// configured fallback duration.
    pub fn new(config: LibraryConfig, prober: Option<Arc<dyn Prober>>) -> Self {
        let extensions = config
            .extensions
            .iter()
            .map(|e| e.trim_start_matches('.').to_lowercase())
            .collect();
        Self {
            config,
            extensions,
            prober,
        }
    }

    /// Create a loader using the pure-Rust prober when probing is enabled.
    pub fn with_default_prober(config: LibraryConfig) -> Self {
        let prober: Option<Arc<dyn Prober>> = if config.probe_durations {
            Some(Arc::new(RustProber::new()))
        } else {
            None
        };
        Self::new(config, prober)
    }

    pub fn config(&self) -> &LibraryConfig {
        &self.config
    }

    /// The prober used to measure durations, if any.
    pub fn prober(&self) -> Option<&Arc<dyn Prober>> {
        self.prober.as_ref()
    }

    /// Every segment found under `dir`, across all days, in start order.
    pub fn scan(&self, dir: &Path) -> Result<Vec<Segment>> {
        let files = self.collect_files(dir)?;
        tracing::debug!(dir = %dir.display(), candidates = files.len(), "scanning recordings");

        let fallback = self.config.fallback_duration_secs();
        let mut segments: Vec<Segment> = files
            .par_iter()
            .filter_map(|path| match Segment::from_path(path.clone(), fallback) {
                Ok(segment) => Some(self.resolve(segment)),
                Err(e) => {
                    tracing::debug!(path = %path.display(), error = %e, "skipping file");
                    None
                }
            })
            .collect();

        segments.sort_by_key(|s| s.start_time());
        tracing::info!(
            dir = %dir.display(),
            segments = segments.len(),
            "scan complete"
        );
        Ok(segments)
    }

    /// Distinct recording dates under `dir`, ascending.
    pub fn available_dates(&self, dir: &Path) -> Result<Vec<NaiveDate>> {
        let mut dates: Vec<NaiveDate> = self
            .collect_files(dir)?
            .iter()
            .filter_map(|path| path.file_name().and_then(|n| n.to_str()))
            .filter_map(|name| dr_core::parse_file_name(name).ok())
            .map(|t| t.date())
            .collect();
        dates.sort_unstable();
        dates.dedup();
        Ok(dates)
    }

    /// Load the timeline for `date`, or for the earliest recorded date when
    /// `date` is `None`. An empty directory yields an empty timeline.
    pub fn load_day(&self, dir: &Path, date: Option<NaiveDate>) -> Result<Timeline> {
        let segments = self.scan(dir)?;
        let date = match date.or_else(|| segments.first().map(|s| s.start_time().date())) {
            Some(date) => date,
            None => return Ok(Timeline::empty()),
        };
        let timeline = Timeline::for_date(date, segments);
        tracing::info!(
            date = %date,
            segments = timeline.len(),
            gaps = timeline.gaps().len(),
            "day loaded"
        );
        Ok(timeline)
    }

    fn collect_files(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let meta = std::fs::metadata(dir)?;
        if !meta.is_dir() {
            return Err(Error::Config(format!(
                "not a directory: {}",
                dir.display()
            )));
        }

        let max_depth = if self.config.recursive { usize::MAX } else { 1 };
        let files = walkdir::WalkDir::new(dir)
            .max_depth(max_depth)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| match e {
                Ok(entry) => Some(entry),
                Err(err) => {
                    tracing::warn!(error = %err, "error walking directory");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| self.has_wanted_extension(path))
            .collect();
        Ok(files)
    }

    fn has_wanted_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| self.extensions.iter().any(|want| want == &e.to_lowercase()))
            .unwrap_or(false)
    }

    fn resolve(&self, mut segment: Segment) -> Segment {
        let size = std::fs::metadata(segment.path()).map(|m| m.len()).unwrap_or(0);
        if size == 0 {
            tracing::warn!(path = %segment.path().display(), "empty recording, marking unavailable");
            segment.set_available(false);
            return segment;
        }

        let Some(prober) = &self.prober else {
            return segment;
        };
        if !self.config.probe_durations || !prober.supports(segment.path()) {
            return segment;
        }

        match prober.probe_duration(segment.path()) {
            Ok(Some(secs)) => segment.set_duration(secs),
            Ok(None) => tracing::warn!(
                path = %segment.path().display(),
                "no duration in container, using fallback"
            ),
            Err(e) => tracing::warn!(
                path = %segment.path().display(),
                error = %e,
                "probe failed, using fallback duration"
            ),
        }
        segment
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dr_probe::{Container, MediaInfo};
    use std::time::Duration;

    struct FixedProber(f64);

    impl Prober for FixedProber {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn supports(&self, _path: &Path) -> bool {
            true
        }

        fn probe(&self, path: &Path) -> Result<MediaInfo> {
            Ok(MediaInfo {
                file_path: path.to_path_buf(),
                file_size: 1,
                container: Container::Mp4,
                duration: Some(Duration::from_secs_f64(self.0)),
            })
        }
    }

    struct FailingProber;

    impl Prober for FailingProber {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn supports(&self, _path: &Path) -> bool {
            true
        }

        fn probe(&self, _path: &Path) -> Result<MediaInfo> {
            Err(Error::Probe("corrupt".into()))
        }
    }

    fn touch(dir: &Path, name: &str, bytes: &[u8]) {
        std::fs::write(dir.join(name), bytes).unwrap();
    }

    fn library_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "2024-12-18_09-10-00.mp4", b"data");
        touch(dir.path(), "2024-12-18_09-00-00.MP4", b"data");
        touch(dir.path(), "2024-12-19_08-00-00.mkv", b"data");
        touch(dir.path(), "2024-12-18_09-20-00.mov", b"");
        touch(dir.path(), "holiday.mp4", b"data");
        touch(dir.path(), "2024-12-18_9-00-00.mp4", b"data");
        touch(dir.path(), "2024-12-18_10-00-00.txt", b"data");
        dir
    }

    fn config(probe: bool) -> LibraryConfig {
        LibraryConfig {
            probe_durations: probe,
            ..LibraryConfig::default()
        }
    }

    #[test]
    fn scan_filters_names_and_extensions() {
        let dir = library_dir();
        let loader = SegmentLoader::new(config(false), None);
        let segments = loader.scan(dir.path()).unwrap();

        let names: Vec<_> = segments
            .iter()
            .map(|s| s.path().file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "2024-12-18_09-00-00.MP4",
                "2024-12-18_09-10-00.mp4",
                "2024-12-18_09-20-00.mov",
                "2024-12-19_08-00-00.mkv",
            ]
        );
        assert!(segments.iter().all(|s| s.duration_secs() == 300.0));
    }

    #[test]
    fn empty_files_are_unavailable() {
        let dir = library_dir();
        let loader = SegmentLoader::new(config(false), None);
        let segments = loader.scan(dir.path()).unwrap();
        let empty = segments
            .iter()
            .find(|s| s.path().ends_with("2024-12-18_09-20-00.mov"))
            .unwrap();
        assert!(!empty.is_available());
        assert_eq!(segments.iter().filter(|s| s.is_available()).count(), 3);
    }

    #[test]
    fn probed_duration_replaces_fallback() {
        let dir = library_dir();
        let loader = SegmentLoader::new(config(true), Some(Arc::new(FixedProber(297.5))));
        let segments = loader.scan(dir.path()).unwrap();
        assert!(segments
            .iter()
            .filter(|s| s.is_available())
            .all(|s| s.duration_secs() == 297.5));
    }

    #[test]
    fn probe_failure_falls_back() {
        let dir = library_dir();
        let cfg = LibraryConfig {
            default_segment_secs: 120.0,
            ..config(true)
        };
        let loader = SegmentLoader::new(cfg, Some(Arc::new(FailingProber)));
        let segments = loader.scan(dir.path()).unwrap();
        assert!(segments.iter().all(|s| s.duration_secs() == 120.0));
    }

    #[test]
    fn probing_disabled_ignores_prober() {
        let dir = library_dir();
        let loader = SegmentLoader::new(config(false), Some(Arc::new(FixedProber(10.0))));
        let segments = loader.scan(dir.path()).unwrap();
        assert!(segments.iter().all(|s| s.duration_secs() == 300.0));
    }

    #[test]
    fn available_dates_sorted_and_deduped() {
        let dir = library_dir();
        let loader = SegmentLoader::new(config(false), None);
        let dates = loader.available_dates(dir.path()).unwrap();
        assert_eq!(
            dates,
            vec![
                NaiveDate::from_ymd_opt(2024, 12, 18).unwrap(),
                NaiveDate::from_ymd_opt(2024, 12, 19).unwrap(),
            ]
        );
    }

    #[test]
    fn load_day_defaults_to_earliest_date() {
        let dir = library_dir();
        let loader = SegmentLoader::new(config(false), None);

        let timeline = loader.load_day(dir.path(), None).unwrap();
        assert_eq!(timeline.date(), NaiveDate::from_ymd_opt(2024, 12, 18).unwrap());
        assert_eq!(timeline.len(), 3);

        let other = NaiveDate::from_ymd_opt(2024, 12, 19).unwrap();
        let timeline = loader.load_day(dir.path(), Some(other)).unwrap();
        assert_eq!(timeline.date(), other);
        assert_eq!(timeline.len(), 1);
    }

    #[test]
    fn load_day_of_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let loader = SegmentLoader::new(config(false), None);
        assert!(loader.load_day(dir.path(), None).unwrap().is_empty());
    }

    #[test]
    fn recursion_is_opt_in() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("cam1");
        std::fs::create_dir(&nested).unwrap();
        touch(&nested, "2024-12-18_09-00-00.mp4", b"data");

        let flat = SegmentLoader::new(config(false), None);
        assert!(flat.scan(dir.path()).unwrap().is_empty());

        let deep = SegmentLoader::new(
            LibraryConfig {
                recursive: true,
                ..config(false)
            },
            None,
        );
        assert_eq!(deep.scan(dir.path()).unwrap().len(), 1);
    }

    #[test]
    fn missing_directory_errors() {
        let loader = SegmentLoader::new(config(false), None);
        let err = loader.scan(Path::new("/nonexistent/recordings")).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }
}
