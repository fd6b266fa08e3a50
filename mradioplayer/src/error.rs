//! Playback errors

/// Why a playback control call was rejected or failed
#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    #[error("A transition is already in progress")]
    Transitioning,

    #[error("The queue is empty")]
    QueueEmpty,

    #[error("Nothing is playing")]
    NotPlaying,

    #[error("Playback is not paused")]
    NotPaused,

    #[error("No previous track")]
    NoPrevious,

    #[error("Previous track is no longer available: {0}")]
    PreviousEvicted(String),

    #[error("Invalid queue position: {0}")]
    InvalidPosition(usize),

    #[error("Transcoder error: {0}")]
    Transcoder(String),

    #[error(transparent)]
    Source(#[from] mradiosource::Error),
}

impl PlaybackError {
    /// `true` for errors caused by the current state rather than a failure
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            PlaybackError::Transitioning
                | PlaybackError::QueueEmpty
                | PlaybackError::NotPlaying
                | PlaybackError::NotPaused
                | PlaybackError::NoPrevious
                | PlaybackError::PreviousEvicted(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, PlaybackError>;
