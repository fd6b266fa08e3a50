//! Error types of mradiosource

use crate::track::SourceType;

/// Why a reference could not be turned into a playable location
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ResolveError {
    #[error("Track not found: {0}")]
    NotFound(String),

    #[error("Track '{title}' is too long: {duration:.0}s (max {max:.0}s)")]
    DurationExceeded { title: String, duration: f64, max: f64 },

    #[error("Not a music track: {0}")]
    NotMusic(String),

    #[error("No resolver registered for source {0}")]
    Unsupported(SourceType),

    #[error("Source unavailable: {0}")]
    Unavailable(String),
}

/// Track source errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("Failed to fetch track after {0} attempts")]
    RetriesExhausted(usize),

    #[error("No fallback track available in {0}")]
    NoFallback(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Result type of mradiosource
pub type Result<T> = std::result::Result<T, Error>;
