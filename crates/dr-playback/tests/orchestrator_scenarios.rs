//! Preload, auto-advance and manual-seek interplay.

mod common;

use common::{at, ended, errors, segment, started, Call, Harness};
use dr_core::config::PlaybackConfig;
use dr_core::events::EventPayload;
use dr_core::{Error, PlaybackErrorKind};
use dr_playback::{OpenCause, PlaybackState};

#[tokio::test]
async fn play_preloads_successor() {
    let h = Harness::new();
    h.playback.play_segment(h.a.clone()).await.unwrap();

    let snap = h.snapshot().await;
    assert_eq!(snap.state, PlaybackState::Playing);
    assert!(snap.active_segment.unwrap().is_same(&h.a));
    assert!(snap.preloaded_segment.unwrap().is_same(&h.b));

    h.wait_until(|s| s.preload_ready).await;
    assert_eq!(h.backend.opens_of(h.b.path()), 1);
}

#[tokio::test]
async fn playing_successor_before_preload_completes_opens_fresh() {
    let mut h = Harness::new();
    h.backend.hold_next_open(h.b.path());

    h.playback.play_segment(h.a.clone()).await.unwrap();
    h.wait_for_opens(h.b.path(), 1).await;
    let snap = h.snapshot().await;
    assert!(snap.preloaded_segment.unwrap().is_same(&h.b));
    assert!(!snap.preload_ready);

    h.playback.play_segment(h.b.clone()).await.unwrap();
    assert_eq!(h.backend.opens_of(h.b.path()), 2);

    let snap = h.snapshot().await;
    assert_eq!(snap.state, PlaybackState::Playing);
    assert!(snap.active_segment.unwrap().is_same(&h.b));

    let events = h.drain();
    assert_eq!(started(&events), vec![h.a.clone(), h.b.clone()]);
    assert!(errors(&events).is_empty());
}

#[tokio::test]
async fn ready_preload_is_reused() {
    let h = Harness::new();
    h.playback.play_segment(h.a.clone()).await.unwrap();
    h.wait_until(|s| s.preload_ready).await;
    let a = h.handle(&h.a);
    let preloaded = h.handle(&h.b);

    assert!(h.playback.move_to_next().await.unwrap());

    assert_eq!(h.backend.opens_of(h.b.path()), 1);
    assert_eq!(h.backend.count(&Call::Play(preloaded)), 1);
    assert!(h.backend.is_disposed(a));
    assert!(!h.backend.is_disposed(preloaded));

    let snap = h.snapshot().await;
    assert!(snap.active_segment.unwrap().is_same(&h.b));
    assert!(snap.preloaded_segment.unwrap().is_same(&h.c));
}

#[tokio::test]
async fn natural_end_advances_into_preloaded_segment() {
    let mut h = Harness::new();
    h.playback.play_segment(h.a.clone()).await.unwrap();
    h.wait_until(|s| s.preload_ready).await;
    h.drain();

    h.backend.end(h.handle(&h.a));
    let b = h.b.clone();
    h.wait_until(move |s| {
        s.state == PlaybackState::Playing
            && s.active_segment.as_ref().is_some_and(|active| active.is_same(&b))
    })
    .await;

    let events = h.drain();
    assert_eq!(
        &events[..4],
        &[
            EventPayload::PlaybackEnded {
                segment: h.a.clone()
            },
            EventPayload::PositionChanged {
                position: at(9, 10, 0)
            },
            EventPayload::SegmentChanged {
                segment: Some(h.b.clone())
            },
            EventPayload::PlaybackStarted {
                segment: h.b.clone()
            },
        ]
    );
    assert_eq!(h.backend.opens_of(h.b.path()), 1);
}

#[tokio::test]
async fn end_during_manual_seek_does_not_advance() {
    let mut h = Harness::new();
    h.playback.play_segment(h.a.clone()).await.unwrap();
    h.wait_until(|s| s.preload_ready).await;
    let a = h.handle(&h.a);
    let preloaded = h.handle(&h.b);

    h.backend.hold_next_open(h.c.path());
    let playback = h.playback.clone();
    let seek = tokio::spawn(async move { playback.seek_to_time(at(9, 21, 0)).await });
    h.wait_until(|s| s.state == PlaybackState::Opening(OpenCause::ManualSeek))
        .await;
    h.drain();

    h.backend.end(a);
    let snap = h.snapshot().await;
    assert_eq!(snap.state, PlaybackState::Opening(OpenCause::ManualSeek));

    let events = h.drain();
    assert_eq!(ended(&events), vec![h.a.clone()]);
    assert!(started(&events).is_empty());
    assert_eq!(h.backend.opens_of(h.b.path()), 1);
    // A manual seek never reuses the preload.
    assert!(h.backend.is_disposed(preloaded));

    h.backend.release_one();
    seek.await.unwrap().unwrap();

    let snap = h.snapshot().await;
    assert_eq!(snap.state, PlaybackState::Playing);
    assert!(snap.active_segment.unwrap().is_same(&h.c));
    assert_eq!(snap.position, at(9, 21, 0));
    assert!(snap.preloaded_segment.is_none());
    assert_eq!(h.backend.count(&Call::SetPosition(h.handle(&h.c), 60.0)), 1);
}

#[tokio::test]
async fn repeated_end_while_advancing_advances_once() {
    let mut h = Harness::new();
    // One hold for the preload, one for the advance's own open.
    h.backend.hold_next_open(h.b.path());
    h.backend.hold_next_open(h.b.path());

    h.playback.play_segment(h.a.clone()).await.unwrap();
    h.wait_for_opens(h.b.path(), 1).await;
    h.drain();

    let a = h.handle(&h.a);
    h.backend.end(a);
    h.backend.end(a);
    let snap = h.snapshot().await;
    assert_eq!(snap.state, PlaybackState::Opening(OpenCause::AutoAdvance));

    h.wait_for_opens(h.b.path(), 2).await;
    h.backend.release_one();
    h.backend.release_one();

    let b = h.b.clone();
    h.wait_until(move |s| {
        s.state == PlaybackState::Playing
            && s.active_segment.as_ref().is_some_and(|active| active.is_same(&b))
    })
    .await;

    assert_eq!(h.backend.opens_of(h.b.path()), 2);
    let events = h.drain();
    assert_eq!(ended(&events), vec![h.a.clone(), h.a.clone()]);
    assert_eq!(started(&events), vec![h.b.clone()]);
}

#[tokio::test]
async fn seek_into_gap_reports_no_footage() {
    let mut h = Harness::new();
    h.playback.play_segment(h.a.clone()).await.unwrap();
    h.drain();

    let err = h.playback.seek_to_time(at(9, 7, 0)).await.unwrap_err();
    assert!(matches!(err, Error::NoFootageAtTime { .. }));

    let events = h.drain();
    assert_eq!(events.len(), 1);
    assert_eq!(errors(&events), vec![PlaybackErrorKind::NoFootageAtTime]);

    let snap = h.snapshot().await;
    assert_eq!(snap.state, PlaybackState::Playing);
    assert!(snap.active_segment.unwrap().is_same(&h.a));
}

#[tokio::test]
async fn seek_to_segment_start_does_not_set_position() {
    let h = Harness::new();
    h.playback.seek_to_time(at(9, 10, 0)).await.unwrap();

    let b = h.handle(&h.b);
    assert!(!h
        .backend
        .calls()
        .iter()
        .any(|c| matches!(c, Call::SetPosition(handle, _) if *handle == b)));
    assert!(h.snapshot().await.active_segment.unwrap().is_same(&h.b));
}

#[tokio::test]
async fn last_segment_end_reports_end_of_timeline() {
    let mut h = Harness::new();
    h.playback.play_segment(h.c.clone()).await.unwrap();
    h.drain();

    h.backend.end(h.handle(&h.c));
    let snap = h.snapshot().await;
    assert_eq!(snap.state, PlaybackState::Stopped);

    let events = h.drain();
    assert_eq!(ended(&events), vec![h.c.clone()]);
    assert_eq!(errors(&events), vec![PlaybackErrorKind::EndOfTimeline]);
}

#[tokio::test]
async fn auto_advance_skips_unavailable_segments() {
    let a = segment(9, 0);
    let missing = segment(9, 10).with_available(false);
    let c = segment(9, 20);
    let mut h = Harness::with_segments(
        PlaybackConfig::default(),
        vec![a.clone(), missing.clone(), c.clone()],
        [a, missing, c],
    );

    h.playback.play_segment(h.a.clone()).await.unwrap();
    h.wait_until(|s| s.preload_ready).await;
    assert_eq!(h.backend.opens_of(h.b.path()), 0);

    h.backend.end(h.handle(&h.a));
    let c = h.c.clone();
    h.wait_until(move |s| s.active_segment.as_ref().is_some_and(|active| active.is_same(&c)))
        .await;
    assert!(errors(&h.drain()).is_empty());
}

#[tokio::test]
async fn position_near_end_triggers_preload() {
    let mut h = Harness::new();
    h.playback.seek_to_time(at(9, 0, 30)).await.unwrap();
    assert!(h.snapshot().await.preloaded_segment.is_none());
    let a = h.handle(&h.a);
    h.drain();

    h.backend.position(a, 100.0);
    let snap = h.snapshot().await;
    assert!(snap.preloaded_segment.is_none());
    assert_eq!(snap.position, at(9, 1, 40));
    assert_eq!(
        h.drain(),
        vec![EventPayload::PositionChanged {
            position: at(9, 1, 40)
        }]
    );

    h.backend.position(a, 297.0);
    let snap = h.snapshot().await;
    assert!(snap.preloaded_segment.unwrap().is_same(&h.b));
}

#[tokio::test]
async fn failed_preload_is_silent_and_not_retried() {
    let mut h = Harness::new();
    h.backend.fail_opens_of(h.b.path());
    h.playback.play_segment(h.a.clone()).await.unwrap();
    h.wait_for_opens(h.b.path(), 1).await;
    h.wait_until(|s| s.preloaded_segment.is_none()).await;

    let a = h.handle(&h.a);
    h.backend.position(a, 298.0);
    h.backend.position(a, 299.0);
    h.snapshot().await;

    assert_eq!(h.backend.opens_of(h.b.path()), 1);
    assert!(errors(&h.drain()).is_empty());
}

#[tokio::test]
async fn continuous_playback_off_neither_preloads_nor_advances() {
    let config = PlaybackConfig {
        continuous_playback: false,
        ..PlaybackConfig::default()
    };
    let mut h = Harness::with_config(config);
    h.playback.play_segment(h.a.clone()).await.unwrap();
    assert!(h.snapshot().await.preloaded_segment.is_none());

    h.backend.end(h.handle(&h.a));
    let snap = h.snapshot().await;
    assert_eq!(snap.state, PlaybackState::Stopped);
    assert_eq!(h.backend.opens_of(h.b.path()), 0);
    assert_eq!(ended(&h.drain()), vec![h.a.clone()]);
}
