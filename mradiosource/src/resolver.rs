//! Turning a reference into a playable location
//!
//! Each external source (YouTube, JioSaavn, SoundCloud, ...) is one
//! [`TrackResolver`]. The [`ResolverRegistry`] either calls exactly one of
//! them, when the source type is known, or tries all of them in turn for a
//! free-text query.

use crate::error::ResolveError;
use crate::probe::BitrateProbe;
use crate::track::SourceType;
use async_trait::async_trait;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Outcome of a successful resolution
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTrack {
    pub title: String,
    pub media_location: String,
    pub duration_seconds: f64,
}

#[async_trait]
pub trait TrackResolver: Debug + Send + Sync {
    fn source_type(&self) -> SourceType;

    async fn resolve(&self, reference: &str) -> Result<ResolvedTrack, ResolveError>;
}

#[derive(Debug, Default, Clone)]
pub struct ResolverRegistry {
    resolvers: Vec<Arc<dyn TrackResolver>>,
}

impl ResolverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a resolver; the first one registered for a source type wins
    pub fn register(&mut self, resolver: Arc<dyn TrackResolver>) {
        tracing::debug!(source = %resolver.source_type(), "Registered track resolver");
        self.resolvers.push(resolver);
    }

    pub fn with(mut self, resolver: Arc<dyn TrackResolver>) -> Self {
        self.register(resolver);
        self
    }

    pub fn get(&self, source: SourceType) -> Option<&Arc<dyn TrackResolver>> {
        self.resolvers.iter().find(|r| r.source_type() == source)
    }

    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }

    /// Resolves with the resolver of `source` only
    pub async fn resolve_with(
        &self,
        source: SourceType,
        reference: &str,
    ) -> Result<ResolvedTrack, ResolveError> {
        let resolver = self.get(source).ok_or(ResolveError::Unsupported(source))?;
        resolver.resolve(reference).await
    }

    /// Tries every resolver in registration order, returns the first success
    pub async fn resolve_any(
        &self,
        query: &str,
    ) -> Result<(SourceType, ResolvedTrack), ResolveError> {
        let mut last_error = ResolveError::NotFound(query.to_string());
        for resolver in &self.resolvers {
            match resolver.resolve(query).await {
                Ok(track) => return Ok((resolver.source_type(), track)),
                Err(e) => {
                    tracing::debug!(source = %resolver.source_type(), query = %query, "Resolver failed: {}", e);
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }
}

const AUDIO_EXTENSIONS: [&str; 7] = ["mp3", "flac", "ogg", "opus", "m4a", "aac", "wav"];

fn is_audio(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| AUDIO_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Resolves references against the files of a local directory
///
/// Lookup order: exact file-stem match, then the first file whose stem
/// contains the reference (case-insensitive). Files that are not audio are
/// rejected with [`ResolveError::NotMusic`].
#[derive(Debug)]
pub struct LocalLibraryResolver {
    root: PathBuf,
    max_duration: Option<f64>,
    probe: Option<Arc<dyn BitrateProbe>>,
}

impl LocalLibraryResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_duration: None,
            probe: None,
        }
    }

    pub fn with_max_duration(mut self, seconds: f64) -> Self {
        self.max_duration = Some(seconds);
        self
    }

    /// Probe used to read durations
    pub fn with_probe(mut self, probe: Arc<dyn BitrateProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    async fn find(&self, reference: &str) -> Result<PathBuf, ResolveError> {
        let mut dir = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| ResolveError::Unavailable(format!("{}: {}", self.root.display(), e)))?;

        let needle = reference.to_lowercase();
        let mut partial: Option<PathBuf> = None;

        while let Ok(Some(entry)) = dir.next_entry().await {
            let path = entry.path();
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if stem == reference {
                return Ok(path);
            }
            if partial.is_none() && stem.to_lowercase().contains(&needle) {
                partial = Some(path);
            }
        }

        partial.ok_or_else(|| ResolveError::NotFound(reference.to_string()))
    }
}

#[async_trait]
impl TrackResolver for LocalLibraryResolver {
    fn source_type(&self) -> SourceType {
        SourceType::Local
    }

    async fn resolve(&self, reference: &str) -> Result<ResolvedTrack, ResolveError> {
        let path = self.find(reference).await?;
        let title = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(reference)
            .to_string();

        if !is_audio(&path) {
            return Err(ResolveError::NotMusic(title));
        }

        let location = path.to_string_lossy().into_owned();
        let duration = match &self.probe {
            Some(probe) => probe.duration(&location).await.unwrap_or(0.0),
            None => 0.0,
        };

        if let Some(max) = self.max_duration {
            if duration > max {
                return Err(ResolveError::DurationExceeded {
                    title,
                    duration,
                    max,
                });
            }
        }

        Ok(ResolvedTrack {
            title,
            media_location: location,
            duration_seconds: duration,
        })
    }
}
