#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use mradiocache::CacheManager;
use mradioplayer::{
    AudioStream, Broadcaster, EngineOptions, EventBus, PlaybackEngine, PlaybackError,
    TranscodeRequest, Transcoder,
};
use mradiosource::{
    BitrateProbe, Error, PlaybackQueue, PrefetchPipeline, Result, SourceType, Track, TrackSource,
};
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

pub fn track(title: &str, duration: f64) -> Track {
    Track {
        title: title.to_string(),
        media_location: format!("/music/{}.mp3", title),
        source_type: SourceType::Local,
        duration_seconds: duration,
        requested_by: "tester".to_string(),
        bitrate: 128_000,
    }
}

/// Fake transcoder: records the requests and emits a few chunks
///
/// By default the stream never ends (the track lasts until the engine stops
/// it). Locations listed in `failing` yield an error, those in `finite`
/// end normally.
#[derive(Debug, Default)]
pub struct FakeTranscoder {
    pub requests: Mutex<Vec<TranscodeRequest>>,
    pub failing: Mutex<HashSet<String>>,
    pub finite: Mutex<HashSet<String>>,
}

impl FakeTranscoder {
    pub fn requests(&self) -> Vec<TranscodeRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<TranscodeRequest> {
        self.requests.lock().unwrap().last().cloned()
    }

    pub fn count_for(&self, location: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.location == location)
            .count()
    }

    pub fn fail(&self, location: &str) {
        self.failing.lock().unwrap().insert(location.to_string());
    }

    pub fn finish(&self, location: &str) {
        self.finite.lock().unwrap().insert(location.to_string());
    }
}

#[async_trait]
impl Transcoder for FakeTranscoder {
    async fn start(
        &self,
        request: &TranscodeRequest,
    ) -> std::result::Result<AudioStream, PlaybackError> {
        self.requests.lock().unwrap().push(request.clone());

        if self.failing.lock().unwrap().contains(&request.location) {
            let stream = futures::stream::iter(vec![Err::<Bytes, _>(std::io::Error::other("boom"))]);
            return Ok(Box::pin(stream));
        }

        let chunks: Vec<std::io::Result<Bytes>> = (0..4u8)
            .map(|i| Ok(Bytes::from(vec![i; 100])))
            .collect();
        if self.finite.lock().unwrap().contains(&request.location) {
            return Ok(Box::pin(futures::stream::iter(chunks)));
        }
        Ok(Box::pin(
            futures::stream::iter(chunks).chain(futures::stream::pending()),
        ))
    }
}

/// Hands out scripted tracks, then fails
#[derive(Debug, Default)]
pub struct ScriptedSource {
    pub tracks: Mutex<VecDeque<Track>>,
}

impl ScriptedSource {
    pub fn new(tracks: Vec<Track>) -> Self {
        Self {
            tracks: Mutex::new(tracks.into()),
        }
    }
}

#[async_trait]
impl TrackSource for ScriptedSource {
    async fn next_track(&self) -> Result<Track> {
        self.tracks
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(Error::RetriesExhausted(3))
    }
}

#[derive(Debug)]
pub struct FixedProbe;

#[async_trait]
impl BitrateProbe for FixedProbe {
    async fn bitrate(&self, _location: &str) -> u32 {
        128_000
    }
}

pub struct Harness {
    pub engine: PlaybackEngine,
    pub queue: Arc<PlaybackQueue>,
    pub transcoder: Arc<FakeTranscoder>,
    pub events: EventBus,
    pub broadcaster: Broadcaster,
    pub cache: Arc<CacheManager>,
    pub dir: TempDir,
}

/// Engine over a queue preloaded with `queued`, topped up from `upcoming`
pub fn harness(queued: Vec<Track>, upcoming: Vec<Track>, min_queue_size: usize) -> Harness {
    let dir = TempDir::new().unwrap();
    let cache = Arc::new(
        CacheManager::new(dir.path().join("cache"), dir.path().join("tracks"), 1 << 30).unwrap(),
    );
    let queue = Arc::new(PlaybackQueue::new());
    for t in queued {
        queue.push_back(t);
    }
    let prefetch = PrefetchPipeline::new(
        Arc::new(ScriptedSource::new(upcoming)),
        Arc::new(FixedProbe),
        queue.clone(),
        min_queue_size,
    );
    let transcoder = Arc::new(FakeTranscoder::default());
    let events = EventBus::new(64);
    let broadcaster = Broadcaster::new(64);
    let engine = PlaybackEngine::new(
        queue.clone(),
        prefetch,
        cache.clone(),
        broadcaster.clone(),
        events.clone(),
        transcoder.clone(),
        EngineOptions {
            wait_timeout: Duration::from_secs(2),
            progress_interval: Duration::from_secs(5),
            max_failures: 3,
        },
    );

    Harness {
        engine,
        queue,
        transcoder,
        events,
        broadcaster,
        cache,
        dir,
    }
}

/// Attend (temps tokio) que `condition` devienne vraie
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    condition()
}
