//! Station lifecycle and queue loop tests.
//!
//! Every test runs a real [`Station`](onair::station::Station) wired to the
//! in-process fakes from `common`; the manifest lives in a temp directory.

mod common;

use std::time::Duration;

use oa_core::StreamState;

use common::{
    candidate, manifest, wait_until, within, write_manifest, FakePublisher, Opening,
    ScriptedSource, StaticSource, TestStation, LINK,
};

const WAIT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn start_is_rejected_unless_idle() {
    let t = TestStation::builder().build();
    assert_eq!(t.station.state(), StreamState::Idle);

    assert!(t.station.start());
    assert!(!t.station.start(), "second start must be a no-op");
    assert_eq!(t.station.state(), StreamState::Live);

    wait_until(WAIT, || t.publisher.sessions() == 1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(t.publisher.sessions(), 1);

    t.station.teardown().await;
    assert_eq!(t.station.state(), StreamState::Idle);
    assert_eq!(t.events_of("stream_started").len(), 1);
    assert_eq!(t.events_of("stream_stopped").len(), 1);
}

#[tokio::test]
async fn teardown_while_idle_is_a_noop() {
    let t = TestStation::builder().build();
    t.station.teardown().await;
    assert_eq!(t.station.state(), StreamState::Idle);
    assert!(t.events_of("stream_stopped").is_empty());
}

#[tokio::test]
async fn station_can_restart_after_teardown() {
    let t = TestStation::builder().build();
    assert!(t.station.start());
    t.station.teardown().await;
    assert!(t.station.start());
    wait_until(WAIT, || t.publisher.sessions() == 2).await;
    t.station.teardown().await;
    assert_eq!(t.station.state(), StreamState::Idle);
}

#[tokio::test]
async fn teardown_mid_run_returns_to_idle() {
    let t = TestStation::builder()
        .candidates(vec![candidate(LINK)])
        .source(StaticSource::hanging(vec!["endless"]))
        .build();

    t.station.start();
    wait_until(WAIT, || !t.publisher.received.lock().is_empty()).await;
    wait_until(WAIT, || t.station.currently_playing().is_some()).await;

    t.station.teardown().await;

    assert_eq!(t.station.state(), StreamState::Idle);
    assert!(t.station.currently_playing().is_none());
    assert_eq!(t.station.sink_stats().bytes_written, 0);
    assert_eq!(t.events_of("stream_stopped").len(), 1);
    assert!(t.events_of("clip_completed").is_empty());
    assert!(t.events_of("clip_failed").is_empty(), "teardown is not a failure");
    assert!(t.archive.marked.lock().is_empty(), "an interrupted clip stays unplayed");

    let last_now_playing = t.events_of("now_playing").pop().unwrap();
    assert!(last_now_playing["song"].is_null());
}

#[tokio::test]
async fn concurrent_teardowns_both_return_idle() {
    let t = TestStation::builder()
        .candidates(vec![candidate(LINK)])
        .source(StaticSource::hanging(vec!["endless"]))
        .build();

    t.station.start();
    wait_until(WAIT, || !t.publisher.received.lock().is_empty()).await;

    tokio::join!(t.station.teardown(), t.station.teardown());
    assert_eq!(t.station.state(), StreamState::Idle);
    assert_eq!(t.events_of("stream_stopped").len(), 1);
}

#[tokio::test]
async fn teardown_does_not_wait_for_a_slow_lookup() {
    let t = TestStation::builder()
        .candidates(vec![candidate(LINK)])
        .lookup_delay(Duration::from_secs(60))
        .build();

    t.station.start();
    wait_until(WAIT, || t.lookup.calls() == 1).await;

    within(Duration::from_secs(2), t.station.teardown()).await;
    assert_eq!(t.station.state(), StreamState::Idle);
    assert!(t.events_of("clip_failed").is_empty());
    assert!(t.events_of("clip_skipped").is_empty());
    assert_eq!(t.transcoder.spawns(), 0);
}

#[tokio::test]
async fn publisher_failure_tears_the_station_down() {
    let t = TestStation::builder()
        .publisher(FakePublisher::failing_after(Duration::from_millis(100)))
        .build();

    t.station.start();
    let mut state = t.station.subscribe_state();
    tokio::time::timeout(WAIT, state.wait_for(|s| *s == StreamState::Idle))
        .await
        .expect("station never went idle")
        .unwrap();

    let failed = t.events_of("clip_failed");
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0]["kind"], "persistent_encoder");
    assert!(failed[0]["post_id"].is_null());
    wait_until(WAIT, || t.events_of("stream_stopped").len() == 1).await;
}

// ---------------------------------------------------------------------------
// Queue loop
// ---------------------------------------------------------------------------

#[tokio::test]
async fn plays_a_clip_and_marks_it_played() {
    let post = candidate(LINK);
    let id = post.id;
    let t = TestStation::builder().candidates(vec![post]).build();

    t.station.start();
    wait_until(WAIT, || t.events_of("clip_completed").len() == 1).await;
    wait_until(WAIT, || t.archive.marked.lock().contains(&id)).await;

    wait_until(WAIT, || t.publisher.received.lock().as_slice() == b"hello world").await;
    assert_eq!(t.transcoder.spawns(), 1);

    // No manifest on disk, so the clip is announced as soon as it relays.
    wait_until(WAIT, || t.station.currently_playing().is_some()).await;
    let playing = t.station.currently_playing().unwrap();
    assert_eq!(playing.post_id, id);
    assert_eq!(playing.member_posted, "night_owl");
    assert_eq!(t.events_of("clip_queued").len(), 1);

    t.station.teardown().await;
}

#[tokio::test]
async fn already_played_post_is_not_marked_again() {
    let mut post = candidate(LINK);
    post.has_been_played = true;
    let t = TestStation::builder().candidates(vec![post]).build();

    t.station.start();
    wait_until(WAIT, || t.events_of("clip_completed").len() == 1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(t.archive.marked.lock().is_empty());

    t.station.teardown().await;
}

#[tokio::test]
async fn invalid_link_is_skipped_without_work() {
    let t = TestStation::builder()
        .candidates(vec![candidate("not a link"), candidate(LINK)])
        .build();

    t.station.start();
    wait_until(WAIT, || t.events_of("clip_completed").len() == 1).await;

    let skipped = t.events_of("clip_skipped");
    assert_eq!(skipped.len(), 1);
    assert_eq!(t.lookup.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert_eq!(t.transcoder.spawns(), 1, "only the valid candidate was transcoded");

    t.station.teardown().await;
}

#[tokio::test]
async fn oversize_clip_is_skipped_before_transcoding() {
    let t = TestStation::builder()
        .candidates(vec![candidate(LINK)])
        .length(500_000_000)
        .build();

    t.station.start();
    wait_until(WAIT, || t.events_of("clip_skipped").len() == 1).await;

    let skipped = &t.events_of("clip_skipped")[0];
    assert!(skipped["reason"].as_str().unwrap().contains("500000000"));
    assert_eq!(t.transcoder.spawns(), 0);
    assert!(t.archive.marked.lock().is_empty());

    t.station.teardown().await;
}

#[tokio::test]
async fn transcode_failure_moves_on_to_next_candidate() {
    let t = TestStation::builder()
        .candidates(vec![candidate(LINK), candidate(LINK)])
        .transcoder(common::CountingTranscoder::shell(
            "cat > /dev/null; echo 'codec exploded' >&2; exit 3",
        ))
        .build();

    t.station.start();
    wait_until(WAIT, || t.events_of("clip_failed").len() == 2).await;

    for failed in t.events_of("clip_failed") {
        assert_eq!(failed["kind"], "transcode");
        assert!(failed["error"].as_str().unwrap().contains("codec exploded"));
    }
    assert_eq!(t.transcoder.spawns(), 2);
    assert_eq!(t.station.state(), StreamState::Live, "clip failures never stop the stream");
    assert!(t.archive.marked.lock().is_empty());

    t.station.teardown().await;
}

#[tokio::test]
async fn now_playing_waits_for_manifest_to_roll_past_baseline() {
    let t = TestStation::builder()
        .candidates(vec![candidate(LINK)])
        .source(StaticSource::hanging(vec!["endless"]))
        .build();
    let path = t.manifest_path();
    write_manifest(&path, &manifest(Some(40), &["seg40.ts", "seg41.ts"]));

    t.station.start();
    wait_until(WAIT, || !t.publisher.received.lock().is_empty()).await;

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(
        t.station.currently_playing().is_none(),
        "announced before the buffered window aired"
    );

    write_manifest(&path, &manifest(Some(42), &["seg42.ts", "seg43.ts"]));
    wait_until(WAIT, || t.station.currently_playing().is_some()).await;
    assert_eq!(t.events_of("now_playing").len(), 1);

    t.station.teardown().await;
    assert!(t.station.currently_playing().is_none());
}

#[tokio::test]
async fn newer_clip_supersedes_pending_announcement_across_failed_run() {
    let first = candidate(LINK);
    let third = candidate(LINK);
    let third_id = third.id;
    let t = TestStation::builder()
        .candidates(vec![first, candidate(LINK), third])
        .source(ScriptedSource::new(vec![
            Opening::Chunks(vec!["one "]),
            Opening::Refused,
            Opening::Hanging(vec!["three"]),
        ]))
        .build();
    let path = t.manifest_path();
    write_manifest(&path, &manifest(Some(40), &["seg40.ts", "seg41.ts"]));

    t.station.start();
    wait_until(WAIT, || t.publisher.received.lock().as_slice() == b"one three").await;
    assert_eq!(t.events_of("clip_failed").len(), 1);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(t.station.currently_playing().is_none());

    write_manifest(&path, &manifest(Some(42), &["seg42.ts", "seg43.ts"]));
    wait_until(WAIT, || t.station.currently_playing().is_some()).await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(t.events_of("now_playing").len(), 1, "only the newest clip is announced");
    assert_eq!(t.station.currently_playing().unwrap().post_id, third_id);

    t.station.teardown().await;
}
