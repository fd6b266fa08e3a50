/// Relay errors
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Failed to spawn relay encoder: {0}")]
    Spawn(String),

    #[error("Relay encoder exited")]
    ProcessExited,

    #[error("Relay encoder reported: {0}")]
    Diagnostic(String),

    #[error("Relay is not connected")]
    NotConnected,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RelayError>;
