use async_trait::async_trait;
use mradiosource::{
    BitrateProbe, Error, PlaybackQueue, PrefetchPipeline, Result, SourceType, Track, TrackSource,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug)]
struct FixedProbe(u32);

#[async_trait]
impl BitrateProbe for FixedProbe {
    async fn bitrate(&self, _location: &str) -> u32 {
        self.0
    }

    async fn duration(&self, _location: &str) -> Option<f64> {
        Some(205.04)
    }
}

/// Numbered tracks, with an optional delay per track
struct CountingSource {
    calls: AtomicUsize,
    delay: Duration,
    fail: bool,
    duration: f64,
}

impl CountingSource {
    fn new(delay: Duration) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            delay,
            fail: false,
            duration: 120.0,
        }
    }

    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(Duration::ZERO)
        }
    }
}

#[async_trait]
impl TrackSource for CountingSource {
    async fn next_track(&self) -> Result<Track> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            return Err(Error::RetriesExhausted(3));
        }
        Ok(Track {
            title: format!("track-{}", n),
            media_location: format!("/tmp/track-{}.mp3", n),
            source_type: SourceType::Local,
            duration_seconds: self.duration,
            requested_by: "test".to_string(),
            bitrate: 0,
        })
    }
}

fn pipeline(source: Arc<CountingSource>, min: usize) -> PrefetchPipeline {
    PrefetchPipeline::new(
        source,
        Arc::new(FixedProbe(192_000)),
        Arc::new(PlaybackQueue::new()),
        min,
    )
}

#[tokio::test]
async fn test_unknown_duration_is_probed() {
    let source = Arc::new(CountingSource {
        duration: 0.0,
        ..CountingSource::new(Duration::ZERO)
    });
    let prefetch = pipeline(source, 2);

    assert_eq!(prefetch.fill().await, Some(2));
    for track in prefetch.queue().snapshot() {
        assert_eq!(track.duration_seconds, 205.04);
    }
}

#[tokio::test]
async fn test_fill_reaches_minimum_and_probes_bitrate() {
    let source = Arc::new(CountingSource::new(Duration::ZERO));
    let prefetch = pipeline(source.clone(), 3);

    assert_eq!(prefetch.fill().await, Some(3));
    let queue = prefetch.queue().snapshot();
    assert_eq!(queue.len(), 3);
    assert!(queue.iter().all(|t| t.bitrate == 192_000));
    assert_eq!(queue[0].title, "track-0");

    // Already full: nothing fetched
    assert_eq!(prefetch.fill().await, Some(0));
    assert_eq!(source.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_fill_is_a_noop() {
    let source = Arc::new(CountingSource::new(Duration::from_millis(100)));
    let prefetch = pipeline(source.clone(), 2);

    let (first, second) = tokio::join!(prefetch.fill(), prefetch.fill());
    assert_eq!(first, Some(2));
    assert_eq!(second, None);
    assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    assert!(!prefetch.is_filling());
}

#[tokio::test(start_paused = true)]
async fn test_ensure_queue_size_runs_in_background() {
    let source = Arc::new(CountingSource::new(Duration::from_millis(50)));
    let prefetch = pipeline(source, 2);

    prefetch.ensure_queue_size();
    prefetch.ensure_queue_size();

    assert!(
        prefetch
            .queue()
            .wait_non_empty(Duration::from_secs(5))
            .await
    );
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(prefetch.queue().len(), 2);
    assert!(!prefetch.is_filling());
}

#[tokio::test]
async fn test_failed_fill_releases_guard() {
    let prefetch = pipeline(Arc::new(CountingSource::failing()), 2);
    assert_eq!(prefetch.fill().await, Some(0));
    assert!(!prefetch.is_filling());
    assert!(prefetch.queue().is_empty());
}
