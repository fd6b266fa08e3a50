//! Choosing and materialising the next track
//!
//! Priority order:
//! 1. head of the persisted request queue,
//! 2. a random track of the active default playlists (genre filter),
//! 3. a random `.mp3` of the static fallback directory.
//!
//! A cached copy (looked up by title) always wins over a new download.

use crate::error::{Error, Result};
use crate::resolver::ResolverRegistry;
use crate::store::OrderedStore;
use crate::track::{DefaultPlaylist, PlaylistTrack, SongRequest, SourceType, Track};
use async_trait::async_trait;
use mradiocache::CacheManager;
use rand::seq::IndexedRandom;
use std::collections::HashSet;
use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::Arc;

/// Anything able to hand out the next track to enqueue
#[async_trait]
pub trait TrackSource: Send + Sync {
    async fn next_track(&self) -> Result<Track>;
}

#[derive(Debug, Clone)]
pub struct FetcherOptions {
    /// Attempts per fetch before giving up
    pub max_retries: usize,
    /// `None` or `"all"` accepts every active playlist
    pub genre: Option<String>,
    pub fallback_dir: PathBuf,
}

impl FetcherOptions {
    pub fn new(fallback_dir: impl Into<PathBuf>) -> Self {
        Self {
            max_retries: 3,
            genre: None,
            fallback_dir: fallback_dir.into(),
        }
    }

    fn genre_filter(&self) -> Option<&str> {
        self.genre.as_deref().filter(|g| *g != "all")
    }
}

pub struct NextTrackFetcher {
    requests: Arc<dyn OrderedStore<SongRequest>>,
    playlists: Arc<dyn OrderedStore<DefaultPlaylist>>,
    playlist_tracks: Arc<dyn OrderedStore<PlaylistTrack>>,
    resolvers: Arc<ResolverRegistry>,
    cache: Arc<CacheManager>,
    options: FetcherOptions,
}

impl Debug for NextTrackFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NextTrackFetcher")
            .field("pending_requests", &self.requests.len())
            .field("options", &self.options)
            .finish()
    }
}

impl NextTrackFetcher {
    pub fn new(
        requests: Arc<dyn OrderedStore<SongRequest>>,
        playlists: Arc<dyn OrderedStore<DefaultPlaylist>>,
        playlist_tracks: Arc<dyn OrderedStore<PlaylistTrack>>,
        resolvers: Arc<ResolverRegistry>,
        cache: Arc<CacheManager>,
        options: FetcherOptions,
    ) -> Self {
        Self {
            requests,
            playlists,
            playlist_tracks,
            resolvers,
            cache,
            options,
        }
    }

    pub fn requests(&self) -> &Arc<dyn OrderedStore<SongRequest>> {
        &self.requests
    }

    /// Fetches the next track, retrying up to `max_retries` times
    pub async fn fetch_next(&self) -> Result<Track> {
        let attempts = self.options.max_retries.max(1);
        for attempt in 1..=attempts {
            match self.try_fetch().await {
                Ok(track) => return Ok(track),
                Err(e) => {
                    tracing::warn!("Error fetching track: {} (attempt {}/{})", e, attempt, attempts);
                }
            }
        }
        Err(Error::RetriesExhausted(attempts))
    }

    async fn try_fetch(&self) -> Result<Track> {
        if let Some(request) = self.requests.first() {
            let result = self.materialize(&request).await;
            // Consumed on success, dropped on failure
            self.drop_request(&request);
            return result;
        }

        match self.pick_default() {
            Some(pick) => self.materialize(&pick.into()).await,
            None => self.fallback_track().await,
        }
    }

    fn drop_request(&self, request: &SongRequest) {
        let position = if self.requests.first().as_ref() == Some(request) {
            Some(0)
        } else {
            self.requests.get_all().iter().position(|r| r == request)
        };

        if let Some(position) = position {
            if let Err(e) = self.requests.remove_at(position) {
                tracing::warn!(title = %request.title, "Cannot remove request: {}", e);
            }
        }
    }

    async fn materialize(&self, request: &SongRequest) -> Result<Track> {
        if let Some(path) = self.cache.get_from_cache(&request.title) {
            tracing::info!("Using cached version of: {}", request.title);
            return Ok(Track {
                title: request.title.clone(),
                media_location: path.to_string_lossy().into_owned(),
                // Free-text request: the cached copy is a local file
                source_type: request.source_type.unwrap_or(SourceType::Local),
                duration_seconds: request.duration_seconds,
                requested_by: request.requested_by.clone(),
                bitrate: 0,
            });
        }

        let (source_type, resolved) = match request.source_type {
            Some(SourceType::Fallback) => {
                return Ok(Track {
                    title: request.title.clone(),
                    media_location: request.reference.clone(),
                    source_type: SourceType::Fallback,
                    duration_seconds: request.duration_seconds,
                    requested_by: request.requested_by.clone(),
                    bitrate: 0,
                });
            }
            Some(source) => {
                let resolved = self.resolvers.resolve_with(source, &request.reference).await?;
                (source, resolved)
            }
            None => {
                let query = if request.reference.trim().is_empty() {
                    &request.title
                } else {
                    &request.reference
                };
                self.resolvers.resolve_any(query).await?
            }
        };

        let duration = if request.duration_seconds > 0.0 {
            request.duration_seconds
        } else {
            resolved.duration_seconds
        };

        tracing::debug!(
            title = %request.title,
            source = %source_type,
            location = %resolved.media_location,
            "Resolved track"
        );

        Ok(Track {
            title: request.title.clone(),
            media_location: resolved.media_location,
            source_type,
            duration_seconds: duration,
            requested_by: request.requested_by.clone(),
            bitrate: 0,
        })
    }

    /// Random track of the active default playlists matching the genre
    pub fn pick_default(&self) -> Option<PlaylistTrack> {
        let genre = self.options.genre_filter();

        let active: HashSet<String> = self
            .playlists
            .get_all()
            .into_iter()
            .filter(|p| p.is_active && genre.map_or(true, |g| p.genre == g))
            .map(|p| p.playlist_id)
            .collect();

        if active.is_empty() {
            return None;
        }

        let eligible: Vec<PlaylistTrack> = self
            .playlist_tracks
            .get_all()
            .into_iter()
            .filter(|t| active.contains(&t.playlist_id))
            .filter(|t| genre.map_or(true, |g| t.genre == g))
            .collect();

        eligible.choose(&mut rand::rng()).cloned()
    }

    /// Random `.mp3` from the fallback directory
    pub async fn fallback_track(&self) -> Result<Track> {
        let dir = &self.options.fallback_dir;
        let no_fallback = || Error::NoFallback(dir.display().to_string());

        let mut entries = tokio::fs::read_dir(dir).await.map_err(|_| no_fallback())?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("mp3") {
                files.push(path);
            }
        }

        let path = files.choose(&mut rand::rng()).ok_or_else(no_fallback)?;
        let title = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("fallback")
            .to_string();

        tracing::info!("Using fallback track: {}", title);

        Ok(Track {
            title,
            media_location: path.to_string_lossy().into_owned(),
            source_type: SourceType::Fallback,
            // Unknown here; the prefetch pipeline probes it
            duration_seconds: 0.0,
            requested_by: "fallback".to_string(),
            bitrate: 0,
        })
    }
}

#[async_trait]
impl TrackSource for NextTrackFetcher {
    async fn next_track(&self) -> Result<Track> {
        self.fetch_next().await
    }
}
