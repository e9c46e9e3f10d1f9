mod cli;

use dr_core::config::Config;
use dr_core::events::{EventBus, EventPayload};
use dr_core::{PlaybackErrorKind, Segment, TimeRange};
use dr_playback::{PlaybackService, PlaybackState, SimulatedBackend};
use dr_timeline::{SegmentLoader, Timeline};

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveTime};
use clap::Parser;
use cli::{Cli, Commands};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG if set, otherwise use defaults based on the verbose flag.
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "dayreel=debug,dr_core=debug,dr_probe=debug,dr_timeline=debug,dr_playback=debug"
                .to_string()
        } else {
            "dayreel=info,dr_core=info,dr_probe=info,dr_timeline=info,dr_playback=info".to_string()
        }
    });

    // Logs go to stderr so `--json` output stays parseable.
    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Scan { dir, date, json } => scan_day(&dir, date, json, cli.config.as_deref()),
        Commands::Dates { dir } => list_dates(&dir, cli.config.as_deref()),
        Commands::Play {
            dir,
            date,
            from,
            speed,
        } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(play_day(&dir, date, from, speed, cli.config.as_deref()))
        }
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("dayreel {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn load_timeline(
    dir: &Path,
    date: Option<NaiveDate>,
    config: &Config,
) -> Result<(SegmentLoader, Timeline)> {
    let loader = SegmentLoader::with_default_prober(config.library.clone());
    let timeline = loader
        .load_day(dir, date)
        .with_context(|| format!("failed to load recordings from {}", dir.display()))?;
    Ok((loader, timeline))
}

#[derive(Serialize)]
struct DayReport<'a> {
    date: NaiveDate,
    recorded_secs: f64,
    segments: &'a [Segment],
    gaps: Vec<TimeRange>,
}

fn scan_day(
    dir: &Path,
    date: Option<NaiveDate>,
    json: bool,
    config_path: Option<&Path>,
) -> Result<()> {
    let config = Config::load_or_default(config_path);
    let (_, timeline) = load_timeline(dir, date, &config)?;

    let report = DayReport {
        date: timeline.date(),
        recorded_secs: timeline.recorded_seconds(),
        segments: timeline.all_segments(),
        gaps: timeline.gaps(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if timeline.is_empty() {
        println!("No recordings found in {}", dir.display());
        return Ok(());
    }

    println!("Date: {}", report.date);
    println!("Recorded: {}", format_secs(report.recorded_secs));

    println!("\nSegments: {}", report.segments.len());
    for segment in report.segments {
        let name = segment
            .path()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        print!(
            "  {} - {}  {:>8}  {}",
            segment.start_time().time(),
            segment.end_time().time(),
            format_secs(segment.duration_secs()),
            name
        );
        if !segment.is_available() {
            print!(" [unavailable]");
        }
        println!();
    }

    println!("\nGaps: {}", report.gaps.len());
    for gap in &report.gaps {
        println!(
            "  {} - {}  {:>8}",
            gap.start().time(),
            gap.end().time(),
            format_secs(gap.duration_secs())
        );
    }

    Ok(())
}

fn list_dates(dir: &Path, config_path: Option<&Path>) -> Result<()> {
    let config = Config::load_or_default(config_path);
    let loader = SegmentLoader::new(config.library, None);
    let dates = loader
        .available_dates(dir)
        .with_context(|| format!("failed to list recordings in {}", dir.display()))?;

    if dates.is_empty() {
        println!("No recordings found in {}", dir.display());
    }
    for date in dates {
        println!("{date}");
    }
    Ok(())
}

async fn play_day(
    dir: &Path,
    date: Option<NaiveDate>,
    from: Option<NaiveTime>,
    speed: f64,
    config_path: Option<&Path>,
) -> Result<()> {
    let config = Config::load_or_default(config_path);
    let (loader, timeline) = load_timeline(dir, date, &config)?;
    if timeline.is_empty() {
        anyhow::bail!("No recordings found in {}", dir.display());
    }

    let day = timeline.date();
    let first = first_playable(&timeline);
    tracing::info!("Playing {} ({} segments) at {speed}x", day, timeline.len());

    let backend = Arc::new(SimulatedBackend::new(
        speed,
        loader.prober().cloned(),
        config.library.fallback_duration_secs(),
    ));
    let events = Arc::new(EventBus::new(config.playback.event_capacity));
    let mut rx = events.subscribe();
    let playback =
        PlaybackService::spawn(backend, Arc::new(timeline), events, config.playback.clone());

    let started = match from {
        Some(time) => playback.seek_to_time(day.and_time(time)).await,
        None => match first {
            Some(segment) => playback.play_segment(segment).await,
            None => Err(dr_core::Error::InvalidSegment(format!(
                "no available recording on {day}"
            ))),
        },
    };
    if let Err(e) = started {
        playback.shutdown().await;
        return Err(e).context("failed to start playback");
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
            received = rx.recv() => match received {
                Ok(event) => {
                    let settled = matches!(
                        event.payload,
                        EventPayload::PlaybackEnded { .. } | EventPayload::PlaybackError { .. }
                    );
                    print_event(&event.payload);
                    if let EventPayload::PlaybackError {
                        kind: PlaybackErrorKind::EndOfTimeline,
                        ..
                    } = event.payload
                    {
                        break;
                    }
                    if settled && has_stopped(&playback).await {
                        break;
                    }
                }
                Err(RecvError::Lagged(n)) => {
                    tracing::warn!("Event output lagged; skipped {n} events");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    // Whatever the final command published, e.g. the end-of-timeline error
    // that follows the last segment's end.
    while let Ok(event) = rx.try_recv() {
        print_event(&event.payload);
    }

    playback.shutdown().await;
    Ok(())
}

/// Where playback begins when no start time is given: the day's earliest
/// recording that can actually be opened, even one starting at midnight.
fn first_playable(timeline: &Timeline) -> Option<Segment> {
    timeline
        .all_segments()
        .iter()
        .find(|segment| segment.is_available())
        .cloned()
}

async fn has_stopped(playback: &dr_playback::PlaybackHandle) -> bool {
    match playback.snapshot().await {
        Ok(snapshot) => matches!(snapshot.state, PlaybackState::Stopped | PlaybackState::Idle),
        Err(_) => true,
    }
}

fn print_event(payload: &EventPayload) {
    match payload {
        EventPayload::SegmentChanged { segment: Some(segment) } => {
            println!("segment  {}", segment.start_time());
        }
        EventPayload::SegmentChanged { segment: None } => println!("segment  none"),
        EventPayload::PositionChanged { position } => {
            tracing::debug!("position {position}");
        }
        EventPayload::PlaybackStarted { segment } => {
            println!("started  {}", segment.path().display());
        }
        EventPayload::PlaybackEnded { segment } => {
            println!("ended    {}", segment.path().display());
        }
        EventPayload::PlaybackError { kind, message } => {
            println!("error    {kind}: {message}");
        }
    }
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {}", p.display());
            let contents = std::fs::read_to_string(p)
                .with_context(|| format!("failed to read {}", p.display()))?;
            let config = Config::from_json(&contents)?;
            println!("✓ Configuration is valid");
            config
        }
        None => {
            println!("No config file specified, using defaults");
            Config::default()
        }
    };

    println!(
        "  Continuous playback: {}",
        config.playback.continuous_playback
    );
    println!(
        "  Preload threshold: {}s",
        config.playback.preload_threshold_secs
    );
    println!("  Open timeout: {}s", config.playback.open_timeout_secs);
    println!("  Extensions: {}", config.library.extensions.join(", "));
    println!("  Probe durations: {}", config.library.probe_durations);

    let warnings = config.validate();
    if !warnings.is_empty() {
        println!("\nWarnings:");
        for warning in &warnings {
            println!("  - {warning}");
        }
    }

    Ok(())
}

fn format_secs(secs: f64) -> String {
    let total = secs.max(0.0).round() as u64;
    format!("{:02}:{:02}:{:02}", total / 3600, (total / 60) % 60, total % 60)
}
