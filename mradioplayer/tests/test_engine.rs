mod common;

use common::{eventually, harness, track};
use mradioplayer::silence::{frame_len, silent_frame};
use mradioplayer::{Packet, PlaybackError, PlaybackStatus, RadioEvent, SeekOutcome};
use std::time::Duration;

fn current_title(h: &common::Harness) -> Option<String> {
    h.engine.current().map(|t| t.title)
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_skips_yield_one_transition() {
    let h = harness(
        vec![track("A", 180.0), track("B", 200.0), track("C", 100.0)],
        vec![],
        1,
    );
    h.engine.play(true).await.unwrap();
    assert_eq!(h.transcoder.requests().len(), 1);

    let (first, second) = tokio::join!(h.engine.skip(), h.engine.skip());
    assert!(first.is_ok());
    assert!(matches!(second, Err(PlaybackError::Transitioning)));

    assert_eq!(current_title(&h).as_deref(), Some("B"));
    assert_eq!(h.transcoder.requests().len(), 2);
    assert!(!h.engine.is_transitioning());
}

#[tokio::test(start_paused = true)]
async fn test_skip_on_empty_queue_is_rejected() {
    let h = harness(vec![], vec![], 1);
    assert!(matches!(h.engine.skip().await, Err(PlaybackError::QueueEmpty)));
    assert!(matches!(
        h.engine.play(true).await,
        Err(PlaybackError::QueueEmpty)
    ));
    assert!(!h.engine.is_transitioning());
}

#[tokio::test]
async fn test_skip_caches_finished_download_and_refills() {
    let h = harness(vec![], vec![track("C", 150.0), track("D", 90.0)], 2);

    let downloaded = h.cache.get_original_path("A");
    std::fs::write(&downloaded, b"A audio").unwrap();
    let mut a = track("A", 180.0);
    a.media_location = downloaded.to_string_lossy().into_owned();
    h.queue.push_back(a);
    h.queue.push_back(track("B", 200.0));

    h.engine.play(true).await.unwrap();
    h.engine.skip().await.unwrap();

    assert_eq!(current_title(&h).as_deref(), Some("B"));
    assert_eq!(h.engine.previous_track().unwrap().title, "A");
    assert!(eventually(|| h.queue.len() >= 2).await);
    assert_eq!(h.queue.head().unwrap().title, "B");
    assert!(eventually(|| h.cache.is_cached("A")).await);
    assert!(eventually(|| !downloaded.exists()).await);
}

#[tokio::test(start_paused = true)]
async fn test_seek_is_relative_to_elapsed() {
    let h = harness(vec![track("A", 120.0), track("B", 200.0)], vec![], 1);
    let mut events = h.events.subscribe();

    h.engine.play(true).await.unwrap();
    tokio::time::sleep(Duration::from_secs(10)).await;

    match h.engine.seek(30.0).await.unwrap() {
        SeekOutcome::Seeked(position) => assert!((position - 40.0).abs() < 0.1),
        other => panic!("unexpected outcome {:?}", other),
    }

    let last = h.transcoder.last().unwrap();
    assert_eq!(last.location, "/music/A.mp3");
    assert!((last.start_offset - 40.0).abs() < 0.1);
    assert!((h.engine.elapsed() - 40.0).abs() < 0.1);

    let mut seeked = false;
    while let Ok(envelope) = events.try_recv() {
        if matches!(envelope.event, RadioEvent::Seeked { .. }) {
            seeked = true;
        }
    }
    assert!(seeked);
}

#[tokio::test(start_paused = true)]
async fn test_seek_past_duration_ends_track() {
    let h = harness(vec![track("A", 120.0), track("B", 200.0)], vec![], 1);

    h.engine.play(true).await.unwrap();
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(h.engine.seek(200.0).await.unwrap(), SeekOutcome::TrackEnded);
    assert_eq!(current_title(&h).as_deref(), Some("B"));
    assert_eq!(h.engine.previous_track().unwrap().title, "A");

    let last = h.transcoder.last().unwrap();
    assert_eq!(last.location, "/music/B.mp3");
    assert_eq!(last.start_offset, 0.0);
}

#[tokio::test(start_paused = true)]
async fn test_seek_to_start_right_after_start_restarts() {
    let h = harness(vec![track("A", 120.0)], vec![], 1);

    h.engine.play(true).await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(h.engine.seek(-1.0).await.unwrap(), SeekOutcome::Restarted);
    assert_eq!(h.transcoder.requests().len(), 2);
    assert_eq!(h.transcoder.last().unwrap().start_offset, 0.0);
}

#[tokio::test(start_paused = true)]
async fn test_seek_requires_playing() {
    let h = harness(vec![track("A", 120.0)], vec![], 1);
    assert!(matches!(
        h.engine.seek(10.0).await,
        Err(PlaybackError::NotPlaying)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_failing_track_is_replayed_then_abandoned() {
    let h = harness(vec![track("A", 120.0), track("B", 200.0)], vec![], 1);
    h.transcoder.fail("/music/A.mp3");

    h.engine.play(true).await.unwrap();

    assert!(eventually(|| current_title(&h).as_deref() == Some("B")).await);
    assert_eq!(h.transcoder.count_for("/music/A.mp3"), 3);
    assert_eq!(h.engine.status(), PlaybackStatus::Playing);
}

#[tokio::test(start_paused = true)]
async fn test_natural_end_advances_and_announces() {
    let h = harness(vec![track("A", 120.0), track("B", 200.0)], vec![], 1);
    h.transcoder.finish("/music/A.mp3");
    let mut events = h.events.subscribe();

    h.engine.play(true).await.unwrap();
    assert!(eventually(|| current_title(&h).as_deref() == Some("B")).await);
    assert_eq!(h.transcoder.count_for("/music/A.mp3"), 1);

    let mut changes = Vec::new();
    while let Ok(envelope) = events.try_recv() {
        if let RadioEvent::TrackChanged { title, .. } = envelope.event {
            changes.push(title);
        }
    }
    assert_eq!(changes, vec!["A".to_string(), "B".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_pause_and_resume_keep_position() {
    let h = harness(vec![track("A", 120.0)], vec![], 1);

    assert!(matches!(h.engine.resume().await, Err(PlaybackError::NotPaused)));

    h.engine.play(true).await.unwrap();
    tokio::time::sleep(Duration::from_secs(20)).await;

    let position = h.engine.pause().await.unwrap();
    assert!((position - 20.0).abs() < 0.1);
    assert_eq!(h.engine.status(), PlaybackStatus::Paused);
    assert!(matches!(h.engine.pause().await, Err(PlaybackError::NotPlaying)));

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!((h.engine.elapsed() - 20.0).abs() < 0.1);
    assert_eq!(h.queue.len(), 1);

    h.engine.resume().await.unwrap();
    assert_eq!(h.engine.status(), PlaybackStatus::Playing);
    assert!((h.transcoder.last().unwrap().start_offset - 20.0).abs() < 0.1);
}

#[tokio::test(start_paused = true)]
async fn test_previous_swaps_current_and_previous() {
    let h = harness(vec![], vec![], 1);
    for title in ["A", "B"] {
        let path = h.dir.path().join(format!("{}.mp3", title));
        std::fs::write(&path, title).unwrap();
        let mut t = track(title, 120.0);
        t.media_location = path.to_string_lossy().into_owned();
        h.queue.push_back(t);
    }

    h.engine.play(true).await.unwrap();
    assert!(matches!(
        h.engine.previous().await,
        Err(PlaybackError::NoPrevious)
    ));

    h.engine.skip().await.unwrap();
    let replayed = h.engine.previous().await.unwrap();

    assert_eq!(replayed.title, "A");
    assert_eq!(current_title(&h).as_deref(), Some("A"));
    assert_eq!(h.engine.previous_track().unwrap().title, "B");
    let titles: Vec<_> = h.queue.snapshot().into_iter().map(|t| t.title).collect();
    assert_eq!(titles, vec!["A", "B"]);
    assert!(h.transcoder.last().unwrap().location.ends_with("A.mp3"));
}

#[tokio::test(start_paused = true)]
async fn test_repeated_previous_swaps_without_duplicates() {
    let h = harness(vec![], vec![], 1);
    for title in ["A", "B"] {
        let path = h.dir.path().join(format!("{}.mp3", title));
        std::fs::write(&path, title).unwrap();
        let mut t = track(title, 120.0);
        t.media_location = path.to_string_lossy().into_owned();
        h.queue.push_back(t);
    }
    let titles = || -> Vec<String> { h.queue.snapshot().into_iter().map(|t| t.title).collect() };

    h.engine.play(true).await.unwrap();
    h.engine.skip().await.unwrap();
    assert_eq!(titles(), vec!["B"]);

    assert_eq!(h.engine.previous().await.unwrap().title, "A");
    assert_eq!(titles(), vec!["A", "B"]);

    assert_eq!(h.engine.previous().await.unwrap().title, "B");
    assert_eq!(current_title(&h).as_deref(), Some("B"));
    assert_eq!(h.engine.previous_track().unwrap().title, "A");
    assert_eq!(titles(), vec!["B", "A"]);

    assert_eq!(h.engine.previous().await.unwrap().title, "A");
    assert_eq!(titles(), vec!["A", "B"]);
}

#[tokio::test(start_paused = true)]
async fn test_previous_fails_when_file_is_gone() {
    let h = harness(vec![track("A", 120.0), track("B", 200.0)], vec![], 1);

    h.engine.play(true).await.unwrap();
    h.engine.skip().await.unwrap();

    match h.engine.previous().await {
        Err(PlaybackError::PreviousEvicted(title)) => assert_eq!(title, "A"),
        other => panic!("unexpected result {:?}", other),
    }
    assert_eq!(current_title(&h).as_deref(), Some("B"));
}

#[tokio::test(start_paused = true)]
async fn test_idle_until_content_arrives() {
    let h = harness(vec![], vec![], 1);
    let mut events = h.events.subscribe();

    h.engine.start().await.unwrap();
    assert_eq!(h.engine.status(), PlaybackStatus::Idle);
    assert!(matches!(
        events.recv().await.unwrap().event,
        RadioEvent::Idle
    ));

    h.queue.push_back(track("Z", 60.0));
    assert!(eventually(|| current_title(&h).as_deref() == Some("Z")).await);
    assert_eq!(h.engine.status(), PlaybackStatus::Playing);

    h.engine.shutdown().await;
    assert_eq!(h.engine.status(), PlaybackStatus::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_idle_station_streams_silence_until_a_track_starts() {
    let h = harness(vec![], vec![], 1);
    let mut events = h.events.subscribe();
    let mut sink = h.broadcaster.add_sink();

    h.engine.start().await.unwrap();
    assert!(matches!(
        events.recv().await.unwrap().event,
        RadioEvent::Idle
    ));
    tokio::time::sleep(Duration::from_secs(1)).await;

    h.queue.push_back(track("Z", 60.0));
    assert!(eventually(|| current_title(&h).as_deref() == Some("Z")).await);
    tokio::time::sleep(Duration::from_millis(200)).await;

    let mut chunks = Vec::new();
    while let Some(packet) = sink.try_recv() {
        if let Packet::Audio(chunk) = packet {
            chunks.push(chunk);
        }
    }
    let first_track_chunk = chunks.iter().position(|c| c.len() == 100).unwrap();
    assert!(first_track_chunk >= 3);
    for chunk in &chunks[..first_track_chunk] {
        assert_eq!(chunk.len() % frame_len(), 0);
        assert_eq!(chunk[..frame_len()], silent_frame()[..]);
    }
    // Nothing of the filler once the track is on air
    assert!(chunks[first_track_chunk..].iter().all(|c| c.len() == 100));

    h.engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_queue_administration() {
    let h = harness(vec![track("A", 120.0), track("B", 200.0)], vec![], 1);
    h.engine.play(true).await.unwrap();

    h.engine.add_to_top(track("X", 100.0));
    let titles: Vec<_> = h.engine.upcoming().into_iter().map(|t| t.title).collect();
    assert_eq!(titles, vec!["X", "B"]);

    assert!(matches!(
        h.engine.remove_at(0),
        Err(PlaybackError::InvalidPosition(0))
    ));
    assert!(matches!(
        h.engine.remove_at(9),
        Err(PlaybackError::InvalidPosition(9))
    ));
    assert_eq!(h.engine.remove_at(2).unwrap().title, "B");

    let snapshot = h.engine.snapshot();
    assert_eq!(snapshot.status, PlaybackStatus::Playing);
    assert_eq!(snapshot.current.unwrap().title, "A");
    assert_eq!(snapshot.upcoming.len(), 1);
}
