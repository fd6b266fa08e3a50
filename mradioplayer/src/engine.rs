//! Playback Engine
//!
//! Owns the "now playing" slot, the transcoder lifecycle and the emission
//! loop.
//!
//! ```text
//! Idle ─► Loading ─► Playing ─► (skip / previous / seek / end) ─► Transitioning ─► Playing | Idle
//!                      │  ▲
//!                 pause│  │resume
//!                      ▼  │
//!                     Paused
//! ```
//!
//! Every control operation first acquires the transition token (an atomic
//! flag released by [`TransitionGuard`]); a call made while another
//! transition runs is rejected with [`PlaybackError::Transitioning`].
//!
//! Each emission (one transcoder run) carries a generation number. The
//! emission task sends how it ended on the engine's report channel; a single
//! consumer handles reports in order, waiting for any running transition to
//! release the token, and ignores a report whose generation is stale.
//!
//! The queue head is always the current track: advancing pops it,
//! `previous()` puts the previous track back in front.
//!
//! Between two emissions (track change, lookahead wait, idle station) the
//! [`silence`](crate::silence) filler keeps the listeners fed.

use crate::error::{PlaybackError, Result};
use crate::events::{EventBus, RadioEvent};
use crate::fanout::Broadcaster;
use crate::silence;
use crate::throttle::RateLimiter;
use crate::transcoder::{AudioStream, TranscodeRequest, Transcoder};
use mradiocache::CacheManager;
use mradiosource::{PlaybackQueue, PrefetchPipeline, Track, DEFAULT_BITRATE};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

/// Seeks landing below this position count as "back to the start"
const NEAR_ZERO_SECS: f64 = 0.5;
/// Elapsed time under which a seek to ≈0 simply replays the track
const SMALL_ELAPSED_SECS: f64 = 2.0;

#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Bounded wait for the lookahead buffer when the queue runs dry
    pub wait_timeout: Duration,
    pub progress_interval: Duration,
    /// Consecutive transcoder failures on one track before advancing
    pub max_failures: u32,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            wait_timeout: Duration::from_secs(30),
            progress_interval: Duration::from_secs(5),
            max_failures: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackStatus {
    #[default]
    Idle,
    Loading,
    Playing,
    Transitioning,
    Paused,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NowPlaying {
    pub status: PlaybackStatus,
    pub current: Option<Track>,
    pub previous: Option<Track>,
    pub elapsed_seconds: f64,
    pub upcoming: Vec<Track>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "position", rename_all = "camelCase")]
pub enum SeekOutcome {
    /// Emission restarted at this position (seconds)
    Seeked(f64),
    /// Target was ≈0 shortly after the start: replayed from the beginning
    Restarted,
    /// Target was past the end: handled as a natural track end
    TrackEnded,
}

#[derive(Debug, Clone, PartialEq)]
enum EmissionOutcome {
    Finished,
    Failed(String),
    Cancelled,
}

/// How an emission ended, sent to the report consumer
#[derive(Debug)]
struct Report {
    generation: u64,
    outcome: EmissionOutcome,
}

/// A cancellable background task feeding the broadcaster
struct Emission {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl Emission {
    async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            if e.is_panic() {
                tracing::error!("Emission task panicked: {}", e);
            }
        }
    }
}

#[derive(Default)]
struct EngineState {
    status: PlaybackStatus,
    current: Option<Track>,
    previous: Option<Track>,
    /// Instant matching position 0 of the current track
    started_at: Option<Instant>,
    paused_at: Option<f64>,
    generation: u64,
    failures: u32,
    emission: Option<Emission>,
    silence: Option<Emission>,
}

impl EngineState {
    fn elapsed(&self) -> f64 {
        match self.status {
            PlaybackStatus::Paused => self.paused_at.unwrap_or(0.0),
            PlaybackStatus::Playing | PlaybackStatus::Transitioning | PlaybackStatus::Loading => self
                .started_at
                .map(|s| s.elapsed().as_secs_f64())
                .unwrap_or(0.0),
            PlaybackStatus::Idle => 0.0,
        }
    }
}

struct EngineInner {
    queue: Arc<PlaybackQueue>,
    prefetch: PrefetchPipeline,
    cache: Arc<CacheManager>,
    broadcaster: Broadcaster,
    events: EventBus,
    transcoder: Arc<dyn Transcoder>,
    options: EngineOptions,
    state: Mutex<EngineState>,
    transitioning: AtomicBool,
    /// Signalled each time the transition token is released
    released: Notify,
    reports: mpsc::UnboundedSender<Report>,
    /// Taken by the consumer task on the first report
    report_rx: Mutex<Option<mpsc::UnboundedReceiver<Report>>>,
    shutdown: CancellationToken,
}

/// Releases the transition token when dropped
struct TransitionGuard<'a> {
    inner: &'a EngineInner,
}

impl Drop for TransitionGuard<'_> {
    fn drop(&mut self) {
        self.inner.transitioning.store(false, Ordering::Release);
        self.inner.released.notify_waiters();
    }
}

#[derive(Clone)]
pub struct PlaybackEngine {
    inner: Arc<EngineInner>,
}

impl std::fmt::Debug for PlaybackEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackEngine")
            .field("status", &self.status())
            .field("queue_len", &self.inner.queue.len())
            .finish()
    }
}

impl PlaybackEngine {
    pub fn new(
        queue: Arc<PlaybackQueue>,
        prefetch: PrefetchPipeline,
        cache: Arc<CacheManager>,
        broadcaster: Broadcaster,
        events: EventBus,
        transcoder: Arc<dyn Transcoder>,
        options: EngineOptions,
    ) -> Self {
        let (reports, report_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(EngineInner {
                queue,
                prefetch,
                cache,
                broadcaster,
                events,
                transcoder,
                options,
                state: Mutex::new(EngineState::default()),
                transitioning: AtomicBool::new(false),
                released: Notify::new(),
                reports,
                report_rx: Mutex::new(Some(report_rx)),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    fn begin_transition(&self) -> Result<TransitionGuard<'_>> {
        self.inner
            .transitioning
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| PlaybackError::Transitioning)?;
        Ok(TransitionGuard { inner: &self.inner })
    }

    pub fn is_transitioning(&self) -> bool {
        self.inner.transitioning.load(Ordering::Acquire)
    }

    pub fn status(&self) -> PlaybackStatus {
        self.inner.state.lock().unwrap().status
    }

    fn set_status(&self, status: PlaybackStatus) {
        self.inner.state.lock().unwrap().status = status;
    }

    pub fn current(&self) -> Option<Track> {
        self.inner.state.lock().unwrap().current.clone()
    }

    pub fn previous_track(&self) -> Option<Track> {
        self.inner.state.lock().unwrap().previous.clone()
    }

    /// Position in the current track, in seconds
    pub fn elapsed(&self) -> f64 {
        self.inner.state.lock().unwrap().elapsed()
    }

    pub fn queue(&self) -> &Arc<PlaybackQueue> {
        &self.inner.queue
    }

    /// Queue without the current track
    pub fn upcoming(&self) -> Vec<Track> {
        self.inner.queue.upcoming()
    }

    pub fn snapshot(&self) -> NowPlaying {
        let (status, current, previous, elapsed_seconds) = {
            let state = self.inner.state.lock().unwrap();
            (
                state.status,
                state.current.clone(),
                state.previous.clone(),
                state.elapsed(),
            )
        };
        NowPlaying {
            status,
            current,
            previous,
            elapsed_seconds,
            upcoming: self.upcoming(),
        }
    }

    /// Bootstraps playback: fills the lookahead buffer, waits for a first
    /// track and plays it, then starts the progress ticker and the idle
    /// watcher
    pub async fn start(&self) -> Result<()> {
        tracing::info!("🚀 Starting playback engine");

        if self.inner.queue.len() < self.inner.prefetch.min_queue_size() {
            self.inner.prefetch.fill().await;
        }

        let result = if self
            .inner
            .queue
            .wait_non_empty(self.inner.options.wait_timeout)
            .await
        {
            self.play(true).await.map(|_| ())
        } else {
            tracing::warn!("No track available at startup");
            self.go_idle();
            Ok(())
        };

        self.spawn_progress_ticker();
        self.spawn_idle_watcher();
        result
    }

    /// Stops the background tasks and the current emission
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        self.stop_emission().await;
        self.stop_silence().await;
        {
            let mut state = self.inner.state.lock().unwrap();
            state.status = PlaybackStatus::Idle;
            state.generation += 1;
        }
        self.inner.broadcaster.clear_now_playing();
        tracing::info!("Playback engine stopped");
    }

    /// Starts emission of the queue head (`use_next`, or when nothing is
    /// current) or restarts the current track from the beginning
    pub async fn play(&self, use_next: bool) -> Result<Track> {
        let _guard = self.begin_transition()?;

        let current = if use_next { None } else { self.current() };
        let track = match current {
            Some(track) => track,
            None => self.inner.queue.head().ok_or(PlaybackError::QueueEmpty)?,
        };

        self.stop_emission().await;
        self.start_emission(track.clone(), 0.0, true).await;
        Ok(track)
    }

    /// Abandons the current track and plays the next one
    pub async fn skip(&self) -> Result<()> {
        let _guard = self.begin_transition()?;
        if self.inner.queue.is_empty() {
            return Err(PlaybackError::QueueEmpty);
        }
        if let Some(track) = self.current() {
            tracing::info!("⏭️ Skipping: {}", track.title);
        }
        self.advance().await;
        Ok(())
    }

    /// Replays the previously played track
    pub async fn previous(&self) -> Result<Track> {
        let _guard = self.begin_transition()?;

        let previous = self.previous_track().ok_or(PlaybackError::NoPrevious)?;
        let location = self
            .locate(&previous)
            .ok_or_else(|| PlaybackError::PreviousEvicted(previous.title.clone()))?;
        let track = Track {
            media_location: location,
            ..previous
        };

        tracing::info!("⏮️ Back to: {}", track.title);
        self.set_status(PlaybackStatus::Transitioning);
        self.stop_emission().await;
        self.start_silence();

        {
            let mut state = self.inner.state.lock().unwrap();
            let displaced = state.current.take();
            state.previous = displaced;
        }
        self.inner.queue.restore_previous(track.clone());
        self.start_emission(track.clone(), 0.0, true).await;
        self.publish_queue_length();
        Ok(track)
    }

    /// Stops emission and remembers the position; the queue is untouched
    pub async fn pause(&self) -> Result<f64> {
        let _guard = self.begin_transition()?;

        let position = {
            let state = self.inner.state.lock().unwrap();
            if state.status != PlaybackStatus::Playing {
                return Err(PlaybackError::NotPlaying);
            }
            state.elapsed()
        };

        self.stop_emission().await;
        {
            let mut state = self.inner.state.lock().unwrap();
            state.status = PlaybackStatus::Paused;
            state.paused_at = Some(position);
            state.started_at = None;
        }
        self.inner.broadcaster.clear_now_playing();
        tracing::info!("⏸️ Paused at {:.1}s", position);
        Ok(position)
    }

    /// Restarts emission of the current track where it was paused
    pub async fn resume(&self) -> Result<()> {
        let _guard = self.begin_transition()?;

        let (track, position) = {
            let state = self.inner.state.lock().unwrap();
            if state.status != PlaybackStatus::Paused {
                return Err(PlaybackError::NotPaused);
            }
            let track = state.current.clone().ok_or(PlaybackError::NotPaused)?;
            (track, state.paused_at.unwrap_or(0.0))
        };

        tracing::info!("▶️ Resuming {} at {:.1}s", track.title, position);
        self.start_emission(track, position, false).await;
        Ok(())
    }

    /// Moves the play position by `offset_seconds` (negative rewinds)
    pub async fn seek(&self, offset_seconds: f64) -> Result<SeekOutcome> {
        let _guard = self.begin_transition()?;

        let (track, elapsed) = {
            let state = self.inner.state.lock().unwrap();
            if state.status != PlaybackStatus::Playing {
                return Err(PlaybackError::NotPlaying);
            }
            let track = state.current.clone().ok_or(PlaybackError::NotPlaying)?;
            (track, state.elapsed())
        };

        let target = elapsed + offset_seconds;
        let duration = track.duration_seconds;

        if duration > 0.0 && target >= duration {
            tracing::info!(
                "Seek target {:.1}s is past the end of {} ({:.1}s)",
                target,
                track.title,
                duration
            );
            self.advance().await;
            return Ok(SeekOutcome::TrackEnded);
        }

        let target = target.max(0.0);
        self.set_status(PlaybackStatus::Transitioning);
        self.stop_emission().await;

        if target < NEAR_ZERO_SECS && elapsed < SMALL_ELAPSED_SECS {
            self.start_emission(track, 0.0, false).await;
            return Ok(SeekOutcome::Restarted);
        }

        self.start_emission(track.clone(), target, false).await;
        self.inner.events.publish(RadioEvent::Seeked {
            title: track.title,
            position: target,
        });
        tracing::info!("⏩ Seeked to {:.1}s", target);
        Ok(SeekOutcome::Seeked(target))
    }

    /// Natural completion of the current track
    pub async fn handle_track_end(&self) -> Result<()> {
        let _guard = self.begin_transition()?;
        {
            let mut state = self.inner.state.lock().unwrap();
            if state.status != PlaybackStatus::Playing {
                return Err(PlaybackError::NotPlaying);
            }
            state.failures = 0;
        }
        self.advance().await;
        Ok(())
    }

    /// Inserts a track right after the current one
    pub fn add_to_top(&self, track: Track) {
        tracing::info!("Added to top of queue: {}", track.title);
        self.inner.queue.insert_after_current(track);
        self.publish_queue_length();
    }

    /// Removes the queued track at `position` (0 is the current track)
    pub fn remove_at(&self, position: usize) -> Result<Track> {
        if position == 0 && self.current().is_some() {
            return Err(PlaybackError::InvalidPosition(position));
        }
        let track = self
            .inner
            .queue
            .remove_at(position)
            .ok_or(PlaybackError::InvalidPosition(position))?;
        tracing::info!("Removed from queue: {}", track.title);
        self.publish_queue_length();
        self.inner.prefetch.ensure_queue_size();
        Ok(track)
    }

    fn publish_queue_length(&self) {
        self.inner.events.publish(RadioEvent::QueueUpdated {
            length: self.inner.queue.len(),
        });
    }

    /// Playable location of a track, preferring the cached copy
    fn locate(&self, track: &Track) -> Option<String> {
        if let Some(path) = self.inner.cache.get_from_cache(&track.title) {
            return Some(path.to_string_lossy().into_owned());
        }
        if track.media_location.contains("://") || Path::new(&track.media_location).exists() {
            return Some(track.media_location.clone());
        }
        None
    }

    /// Retires the current track and plays the new head
    ///
    /// Caller holds the transition token.
    async fn advance(&self) {
        self.set_status(PlaybackStatus::Transitioning);
        self.stop_emission().await;
        self.start_silence();

        let finished = {
            let mut state = self.inner.state.lock().unwrap();
            let finished = state.current.take();
            if finished.is_some() {
                state.previous = finished.clone();
            }
            state.started_at = None;
            state.paused_at = None;
            finished
        };

        if let Some(track) = &finished {
            self.inner.queue.pop_front();
            self.cache_finished(track);
        }

        self.inner.prefetch.ensure_queue_size();
        self.publish_queue_length();

        if self
            .inner
            .queue
            .wait_non_empty(self.inner.options.wait_timeout)
            .await
        {
            if let Some(next) = self.inner.queue.head() {
                self.start_emission(next, 0.0, true).await;
                return;
            }
        }

        self.go_idle();
    }

    fn go_idle(&self) {
        {
            let mut state = self.inner.state.lock().unwrap();
            state.status = PlaybackStatus::Idle;
            state.current = None;
            state.started_at = None;
            state.paused_at = None;
        }
        self.inner.broadcaster.clear_now_playing();
        self.inner.events.publish(RadioEvent::Idle);
        self.start_silence();
        tracing::warn!("Nothing to play, station is idle");
    }

    /// Starts the silence filler unless it already runs
    fn start_silence(&self) {
        if self.inner.shutdown.is_cancelled() {
            return;
        }
        let mut state = self.inner.state.lock().unwrap();
        if state.silence.is_none() {
            let cancel = CancellationToken::new();
            let task = silence::spawn_filler(self.inner.broadcaster.clone(), cancel.clone());
            state.silence = Some(Emission { cancel, task });
        }
    }

    async fn stop_silence(&self) {
        let silence = self.inner.state.lock().unwrap().silence.take();
        if let Some(silence) = silence {
            silence.stop().await;
        }
    }

    /// Moves a downloaded track into the cache in the background
    fn cache_finished(&self, track: &Track) {
        let path = PathBuf::from(&track.media_location);
        let cache = self.inner.cache.clone();
        if !cache.is_scratch_path(&path) || cache.is_cached(&track.title) {
            return;
        }

        let title = track.title.clone();
        tokio::spawn(async move {
            match cache.move_to_cache(&path, &title).await {
                Ok(true) => tracing::debug!("Cached: {}", title),
                Ok(false) => tracing::debug!("Nothing to cache for {}", title),
                Err(e) => tracing::warn!("Failed to cache {}: {}", title, e),
            }
        });
    }

    /// Spawns the transcoder and the emission task for `track`
    ///
    /// A transcoder that cannot start is reported like a failed emission, so
    /// the replay/advance policy applies.
    async fn start_emission(&self, track: Track, offset: f64, new_track: bool) {
        let generation = {
            let mut state = self.inner.state.lock().unwrap();
            state.status = PlaybackStatus::Loading;
            state.current = Some(track.clone());
            state.paused_at = None;
            state.generation += 1;
            if new_track {
                state.failures = 0;
            }
            state.generation
        };

        let bitrate = if track.bitrate > 0 {
            track.bitrate
        } else {
            DEFAULT_BITRATE
        };
        let request = TranscodeRequest {
            location: track.media_location.clone(),
            start_offset: offset,
            bitrate_kbps: (bitrate / 1000).max(8),
        };

        let started = self.inner.transcoder.start(&request).await;
        // No filler chunk may follow the first chunk of the new emission
        self.stop_silence().await;

        let emission = match started {
            Ok(stream) => {
                let cancel = CancellationToken::new();
                let task = tokio::spawn(self.clone().run_emission(
                    stream,
                    request.bitrate_kbps * 1000,
                    cancel.clone(),
                    generation,
                ));
                Some(Emission { cancel, task })
            }
            Err(e) => {
                tracing::error!("Cannot start transcoder for {}: {}", track.title, e);
                self.report(generation, EmissionOutcome::Failed(e.to_string()));
                None
            }
        };

        {
            let mut state = self.inner.state.lock().unwrap();
            state.status = PlaybackStatus::Playing;
            state.started_at = Some(
                Instant::now()
                    .checked_sub(Duration::from_secs_f64(offset))
                    .unwrap_or_else(Instant::now),
            );
            state.emission = emission;
        }

        self.inner.broadcaster.announce(&track.title);
        if new_track {
            tracing::info!("🎵 Now playing: {}", track.title);
            self.inner.events.publish(RadioEvent::TrackChanged {
                title: track.title,
                duration: track.duration_seconds,
                requested_by: track.requested_by,
            });
        }
    }

    /// Cancels the emission task, kills its transcoder and waits for it
    async fn stop_emission(&self) {
        let emission = self.inner.state.lock().unwrap().emission.take();
        if let Some(emission) = emission {
            emission.stop().await;
        }
    }

    /// Hot path: transcoder output → rate limiter → fan-out
    async fn run_emission(
        self,
        mut stream: AudioStream,
        bitrate: u32,
        cancel: CancellationToken,
        generation: u64,
    ) {
        let mut limiter = RateLimiter::new(bitrate);

        let outcome = loop {
            let item = tokio::select! {
                biased;
                _ = cancel.cancelled() => break EmissionOutcome::Cancelled,
                item = stream.next() => item,
            };
            match item {
                Some(Ok(chunk)) => {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break EmissionOutcome::Cancelled,
                        _ = limiter.pace(chunk.len()) => {}
                    }
                    self.inner.broadcaster.broadcast_audio(chunk);
                }
                Some(Err(e)) => break EmissionOutcome::Failed(e.to_string()),
                None => break EmissionOutcome::Finished,
            }
        };

        // Dropping the stream kills the process
        drop(stream);

        if outcome != EmissionOutcome::Cancelled {
            self.report(generation, outcome);
        }
    }

    fn report(&self, generation: u64, outcome: EmissionOutcome) {
        self.spawn_report_consumer();
        if self.inner.reports.send(Report { generation, outcome }).is_err() {
            tracing::debug!("Report consumer gone, generation {} dropped", generation);
        }
    }

    /// Starts the task draining the report channel (once per engine)
    ///
    /// The task only holds a weak reference between reports, so dropping
    /// the last engine handle closes the channel and ends it.
    fn spawn_report_consumer(&self) {
        let Some(mut reports) = self.inner.report_rx.lock().unwrap().take() else {
            return;
        };
        let inner = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            while let Some(report) = reports.recv().await {
                let Some(inner) = inner.upgrade() else {
                    break;
                };
                PlaybackEngine { inner }
                    .on_emission_finished(report.generation, report.outcome)
                    .await;
            }
        });
    }

    async fn on_emission_finished(&self, generation: u64, outcome: EmissionOutcome) {
        let _guard = loop {
            let current = self.inner.state.lock().unwrap().generation;
            if current != generation || self.inner.shutdown.is_cancelled() {
                return;
            }
            // Registered before the attempt so a release in between is not missed
            let released = self.inner.released.notified();
            tokio::pin!(released);
            released.as_mut().enable();
            match self.begin_transition() {
                Ok(guard) => break guard,
                Err(_) => released.await,
            }
        };

        let (track, failures) = {
            let mut state = self.inner.state.lock().unwrap();
            if state.generation != generation || state.status != PlaybackStatus::Playing {
                return;
            }
            match &outcome {
                EmissionOutcome::Finished => state.failures = 0,
                EmissionOutcome::Failed(_) => state.failures += 1,
                EmissionOutcome::Cancelled => return,
            }
            match state.current.clone() {
                Some(track) => (track, state.failures),
                None => return,
            }
        };

        match outcome {
            EmissionOutcome::Failed(reason) if failures < self.inner.options.max_failures => {
                tracing::warn!(
                    "Transcoder failed on {} ({}), replaying (failure {}/{})",
                    track.title,
                    reason,
                    failures,
                    self.inner.options.max_failures
                );
                self.stop_emission().await;
                self.start_emission(track, 0.0, false).await;
            }
            EmissionOutcome::Failed(reason) => {
                tracing::error!(
                    "Giving up on {} after {} failures ({})",
                    track.title,
                    failures,
                    reason
                );
                self.advance().await;
            }
            _ => {
                tracing::debug!("Track ended: {}", track.title);
                self.advance().await;
            }
        }
    }

    fn spawn_progress_ticker(&self) {
        let engine = self.clone();
        let shutdown = self.inner.shutdown.clone();
        let period = self.inner.options.progress_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let progress = {
                    let state = engine.inner.state.lock().unwrap();
                    match (&state.status, &state.current) {
                        (PlaybackStatus::Playing, Some(track)) => {
                            Some((track.title.clone(), state.elapsed()))
                        }
                        _ => None,
                    }
                };
                if let Some((title, elapsed)) = progress {
                    engine
                        .inner
                        .events
                        .publish(RadioEvent::Progress { title, elapsed });
                }
            }
        });
    }

    /// Restarts playback when the engine is idle and tracks arrive
    fn spawn_idle_watcher(&self) {
        let engine = self.clone();
        let shutdown = self.inner.shutdown.clone();
        let mut lengths = self.inner.queue.subscribe();
        let recheck = self.inner.options.wait_timeout;

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    changed = lengths.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = tokio::time::sleep(recheck) => {}
                }

                let len = *lengths.borrow_and_update();
                if len > 0 && engine.status() == PlaybackStatus::Idle && !engine.is_transitioning() {
                    match engine.play(true).await {
                        Ok(track) => tracing::info!("Leaving idle with {}", track.title),
                        Err(e) => tracing::debug!("Idle watcher could not start playback: {}", e),
                    }
                }
            }
        });
    }
}
