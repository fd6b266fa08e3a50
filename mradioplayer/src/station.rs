//! # Station
//!
//! The single context of the radio. Every building block (cache, playback
//! queue, fan-out, event bus, prefetch, engine, relay) is built once by
//! [`StationBuilder`] and then shared by reference.
//!
//! ```rust,ignore
//! let station = StationBuilder::new(cache, fetcher, requests)
//!     .min_queue_size(3)
//!     .relay(relay)
//!     .build();
//! station.start().await?;
//! ```

use crate::engine::{EngineOptions, PlaybackEngine};
use crate::error::Result;
use crate::events::{EventBus, DEFAULT_EVENT_CAPACITY};
use crate::fanout::{Broadcaster, Packet, DEFAULT_SINK_CAPACITY};
use crate::transcoder::{FfmpegTranscoder, Transcoder};
use mradiocache::CacheManager;
use mradiorelay::RelayStreamer;
use mradiosource::{
    BitrateProbe, FfmpegProbe, OrderedStore, PlaybackQueue, PrefetchPipeline, SongRequest,
    TrackSource,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Station context
pub struct Station {
    cache: Arc<CacheManager>,
    queue: Arc<PlaybackQueue>,
    broadcaster: Broadcaster,
    events: EventBus,
    prefetch: PrefetchPipeline,
    engine: PlaybackEngine,
    relay: Option<RelayStreamer>,
    requests: Arc<dyn OrderedStore<SongRequest>>,
    heartbeat_interval: Duration,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for Station {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Station")
            .field("engine", &self.engine)
            .field("listeners", &self.broadcaster.sink_count())
            .field("relay", &self.relay.as_ref().map(|r| r.state()))
            .finish()
    }
}

impl Station {
    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    pub fn queue(&self) -> &Arc<PlaybackQueue> {
        &self.queue
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn prefetch(&self) -> &PrefetchPipeline {
        &self.prefetch
    }

    pub fn engine(&self) -> &PlaybackEngine {
        &self.engine
    }

    pub fn relay(&self) -> Option<&RelayStreamer> {
        self.relay.as_ref()
    }

    /// Starts the heartbeat, the relay (when enabled), then playback
    pub async fn start(&self) -> Result<()> {
        let heartbeat = self
            .events
            .spawn_heartbeat(self.heartbeat_interval, self.cancel.child_token());
        self.tasks.lock().unwrap().push(heartbeat);

        if let Some(relay) = &self.relay {
            if relay.config().enabled {
                let drain = self.spawn_relay_drain(relay.clone());
                self.tasks.lock().unwrap().push(drain);

                let relay = relay.clone();
                tokio::spawn(async move {
                    if let Err(e) = relay.connect().await {
                        tracing::warn!("Initial relay connection failed: {}", e);
                    }
                });
            } else {
                tracing::info!("Relay disabled");
            }
        }

        self.engine.start().await
    }

    /// Stops playback, the relay and the background tasks
    pub async fn shutdown(&self) {
        tracing::info!("Stopping station");
        self.cancel.cancel();
        self.engine.shutdown().await;
        if let Some(relay) = &self.relay {
            relay.disconnect().await;
        }

        let tasks: Vec<_> = self.tasks.lock().unwrap().drain(..).collect();
        for task in tasks {
            let _ = task.await;
        }
    }

    /// Forwards the audio packets of a dedicated sink to the relay
    ///
    /// The broadcaster drops a sink that falls behind; the drain then
    /// registers a new one.
    fn spawn_relay_drain(&self, relay: RelayStreamer) -> JoinHandle<()> {
        let broadcaster = self.broadcaster.clone();
        let cancel = self.cancel.child_token();

        tokio::spawn(async move {
            loop {
                let mut sink = broadcaster.add_sink();
                tracing::debug!(sink = %sink.id(), "Relay attached to broadcast");

                loop {
                    let packet = tokio::select! {
                        _ = cancel.cancelled() => return,
                        packet = sink.recv() => packet,
                    };
                    match packet {
                        Some(Packet::Audio(chunk)) => {
                            if let Err(e) = relay.write(chunk).await {
                                tracing::debug!("Relay write failed: {}", e);
                            }
                        }
                        Some(Packet::Metadata { .. }) => {}
                        None => break,
                    }
                }

                tracing::warn!("Relay sink was dropped, re-registering");
            }
        })
    }

    /// Appends a request to the persisted request queue
    pub fn add_request(&self, request: SongRequest) -> Result<()> {
        tracing::info!("📥 Request: {} (by {})", request.title, request.requested_by);
        self.requests.add(request)?;
        self.prefetch.ensure_queue_size();
        Ok(())
    }

    /// Puts a request at the head of the persisted request queue
    pub fn add_request_to_front(&self, request: SongRequest) -> Result<()> {
        tracing::info!(
            "📥 Priority request: {} (by {})",
            request.title,
            request.requested_by
        );
        self.requests.add_to_front(request)?;
        self.prefetch.ensure_queue_size();
        Ok(())
    }

    /// Appends a batch of requests (an expanded playlist), in order
    pub fn add_requests(&self, requests: Vec<SongRequest>) -> Result<usize> {
        let added = self.requests.add_many(requests)?;
        tracing::info!("📥 {} requests queued", added);
        self.prefetch.ensure_queue_size();
        Ok(added)
    }

    /// Puts a batch of requests ahead of the pending ones, keeping their order
    pub fn add_requests_to_front(&self, requests: Vec<SongRequest>) -> Result<usize> {
        let added = self.requests.add_many_to_front(requests)?;
        tracing::info!("📥 {} priority requests queued", added);
        self.prefetch.ensure_queue_size();
        Ok(added)
    }

    /// Withdraws the most recent pending request of `requested_by`
    pub fn remove_last_request_by(&self, requested_by: &str) -> Result<Option<SongRequest>> {
        let removed = self
            .requests
            .remove_last_where(&|request| request.requested_by == requested_by)?;
        if let Some(request) = &removed {
            tracing::info!("🗑️ Request withdrawn: {} (by {})", request.title, requested_by);
        }
        Ok(removed)
    }

    pub fn requests(&self) -> Vec<SongRequest> {
        self.requests.get_all()
    }
}

/// Builder of [`Station`]
pub struct StationBuilder {
    cache: Arc<CacheManager>,
    source: Arc<dyn TrackSource>,
    requests: Arc<dyn OrderedStore<SongRequest>>,
    probe: Option<Arc<dyn BitrateProbe>>,
    transcoder: Option<Arc<dyn Transcoder>>,
    relay: Option<RelayStreamer>,
    min_queue_size: usize,
    engine_options: EngineOptions,
    heartbeat_interval: Duration,
    sink_capacity: usize,
    event_capacity: usize,
}

impl StationBuilder {
    /// Creates a builder
    ///
    /// # Arguments
    ///
    /// * `cache` - Cache of played tracks
    /// * `source` - Where the next tracks come from (a `NextTrackFetcher` in practice)
    /// * `requests` - Persisted request queue, the one `source` reads
    pub fn new(
        cache: Arc<CacheManager>,
        source: Arc<dyn TrackSource>,
        requests: Arc<dyn OrderedStore<SongRequest>>,
    ) -> Self {
        Self {
            cache,
            source,
            requests,
            probe: None,
            transcoder: None,
            relay: None,
            min_queue_size: 3,
            engine_options: EngineOptions::default(),
            heartbeat_interval: Duration::from_secs(15),
            sink_capacity: DEFAULT_SINK_CAPACITY,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    pub fn probe(mut self, probe: Arc<dyn BitrateProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn transcoder(mut self, transcoder: Arc<dyn Transcoder>) -> Self {
        self.transcoder = Some(transcoder);
        self
    }

    pub fn relay(mut self, relay: RelayStreamer) -> Self {
        self.relay = Some(relay);
        self
    }

    pub fn min_queue_size(mut self, size: usize) -> Self {
        self.min_queue_size = size.max(1);
        self
    }

    pub fn engine_options(mut self, options: EngineOptions) -> Self {
        self.engine_options = options;
        self
    }

    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn sink_capacity(mut self, capacity: usize) -> Self {
        self.sink_capacity = capacity;
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Builds the station
    ///
    /// Without an explicit probe or transcoder, ffmpeg is used.
    pub fn build(self) -> Station {
        let probe = self
            .probe
            .unwrap_or_else(|| Arc::new(FfmpegProbe::default()));
        let transcoder = self
            .transcoder
            .unwrap_or_else(|| Arc::new(FfmpegTranscoder::default()));

        let queue = Arc::new(PlaybackQueue::new());
        let broadcaster = Broadcaster::new(self.sink_capacity);
        let events = EventBus::new(self.event_capacity);
        let prefetch =
            PrefetchPipeline::new(self.source, probe, queue.clone(), self.min_queue_size);
        let engine = PlaybackEngine::new(
            queue.clone(),
            prefetch.clone(),
            self.cache.clone(),
            broadcaster.clone(),
            events.clone(),
            transcoder,
            self.engine_options,
        );

        Station {
            cache: self.cache,
            queue,
            broadcaster,
            events,
            prefetch,
            engine,
            relay: self.relay,
            requests: self.requests,
            heartbeat_interval: self.heartbeat_interval,
            cancel: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        }
    }
}
