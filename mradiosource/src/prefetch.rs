//! Track Prefetch Pipeline
//!
//! Keeps the playback queue filled up to a minimum length. Only one fill
//! loop runs at a time; the guard is a single atomic flag released by an
//! RAII guard, so a panicking or failing fill never leaves it set.

use crate::fetcher::TrackSource;
use crate::probe::BitrateProbe;
use crate::queue::PlaybackQueue;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

struct PrefetchInner {
    source: Arc<dyn TrackSource>,
    probe: Arc<dyn BitrateProbe>,
    queue: Arc<PlaybackQueue>,
    min_queue_size: usize,
    filling: AtomicBool,
}

#[derive(Clone)]
pub struct PrefetchPipeline {
    inner: Arc<PrefetchInner>,
}

struct FillGuard<'a>(&'a AtomicBool);

impl Drop for FillGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl std::fmt::Debug for PrefetchPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrefetchPipeline")
            .field("min_queue_size", &self.inner.min_queue_size)
            .field("filling", &self.is_filling())
            .finish()
    }
}

impl PrefetchPipeline {
    pub fn new(
        source: Arc<dyn TrackSource>,
        probe: Arc<dyn BitrateProbe>,
        queue: Arc<PlaybackQueue>,
        min_queue_size: usize,
    ) -> Self {
        Self {
            inner: Arc::new(PrefetchInner {
                source,
                probe,
                queue,
                min_queue_size,
                filling: AtomicBool::new(false),
            }),
        }
    }

    pub fn queue(&self) -> &Arc<PlaybackQueue> {
        &self.inner.queue
    }

    pub fn min_queue_size(&self) -> usize {
        self.inner.min_queue_size
    }

    pub fn is_filling(&self) -> bool {
        self.inner.filling.load(Ordering::Acquire)
    }

    /// Starts a background fill unless one is already running
    pub fn ensure_queue_size(&self) {
        if self.is_filling() || self.inner.queue.len() >= self.inner.min_queue_size {
            return;
        }
        let pipeline = self.clone();
        tokio::spawn(async move {
            pipeline.fill().await;
        });
    }

    /// Fills the queue up to the minimum size
    ///
    /// Returns the number of tracks appended, or `None` when another fill
    /// was already running.
    pub async fn fill(&self) -> Option<usize> {
        let inner = &self.inner;
        if inner
            .filling
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("Prefetch already running");
            return None;
        }
        let _guard = FillGuard(&inner.filling);

        let mut appended = 0;
        while inner.queue.len() < inner.min_queue_size {
            let mut track = match inner.source.next_track().await {
                Ok(track) => track,
                Err(e) => {
                    tracing::error!("Prefetch fill failed: {}", e);
                    break;
                }
            };

            if track.bitrate == 0 {
                track.bitrate = inner.probe.bitrate(&track.media_location).await;
            }
            // Fallback tracks and some resolvers come without a duration
            if track.duration_seconds <= 0.0 {
                if let Some(duration) = inner.probe.duration(&track.media_location).await {
                    track.duration_seconds = duration;
                }
            }

            // Re-checked after the await; a slight overshoot under races is tolerated
            if inner.queue.len() < inner.min_queue_size {
                tracing::info!(title = %track.title, bitrate = track.bitrate, "Track added to queue");
                inner.queue.push_back(track);
                appended += 1;
            }
        }

        Some(appended)
    }
}
