//! The external re-encoding process feeding the relay

use crate::config::RelayConfig;
use crate::error::{RelayError, Result};
use async_trait::async_trait;
use std::fmt::Debug;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWrite, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// What the encoder process reports while running
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncoderEvent {
    /// One line of diagnostics (stderr)
    Line(String),
    /// The process ended, with its exit code when available
    Exited(Option<i32>),
}

/// Classification of a diagnostic line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// The output was opened: the ingest server accepted the stream
    Connected,
    Error(String),
    Info(String),
}

/// Noise produced on track boundaries, harmless for the relay
const TRANSITION_NOISE: [&str; 2] = [
    "Header missing",
    "Invalid data found when processing input",
];

const ERROR_MARKERS: [&str; 5] = [
    "connection refused",
    "unauthorized",
    "broken pipe",
    "i/o error",
    "error",
];

pub fn classify_diagnostic(line: &str) -> Diagnostic {
    let line = line.trim();
    if TRANSITION_NOISE.iter().any(|n| line.contains(n)) {
        return Diagnostic::Info(line.to_string());
    }
    if line.contains("Output #0") {
        return Diagnostic::Connected;
    }
    let lower = line.to_lowercase();
    if ERROR_MARKERS.iter().any(|m| lower.contains(m)) {
        return Diagnostic::Error(line.to_string());
    }
    Diagnostic::Info(line.to_string())
}

/// A running encoder
///
/// Dropping the handle (or cancelling `cancel`) kills the process.
pub struct EncoderHandle {
    pub input: Box<dyn AsyncWrite + Send + Unpin>,
    pub events: mpsc::Receiver<EncoderEvent>,
    pub cancel: CancellationToken,
}

impl Drop for EncoderHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[async_trait]
pub trait RelayEncoder: Debug + Send + Sync {
    async fn spawn(&self, config: &RelayConfig) -> Result<EncoderHandle>;
}

/// ffmpeg re-encoding stdin to a constant-bitrate MP3 source stream
#[derive(Debug, Default, Clone)]
pub struct FfmpegRelayEncoder;

impl FfmpegRelayEncoder {
    pub fn args(config: &RelayConfig) -> Vec<String> {
        let mut args: Vec<String> = [
            "-hide_banner",
            "-nostats",
            "-loglevel",
            "info",
            "-f",
            "mp3",
            "-i",
            "pipe:0",
            "-err_detect",
            "ignore_err",
            "-fflags",
            "+genpts+discardcorrupt",
            "-acodec",
            "libmp3lame",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        args.extend([
            "-ab".to_string(),
            format!("{}k", config.bitrate),
            "-ar".to_string(),
            config.sample_rate.to_string(),
            "-ac".to_string(),
            config.channels.to_string(),
            "-metadata".to_string(),
            format!("title={}", config.name),
            "-metadata".to_string(),
            format!("artist={}", config.description),
            "-metadata".to_string(),
            format!("genre={}", config.genre),
            "-f".to_string(),
            "mp3".to_string(),
            "-content_type".to_string(),
            "audio/mpeg".to_string(),
            "-ice_name".to_string(),
            config.name.clone(),
            "-ice_description".to_string(),
            config.description.clone(),
            "-ice_genre".to_string(),
            config.genre.clone(),
            "-ice_public".to_string(),
            "1".to_string(),
            config.icecast_url(),
        ]);
        args
    }
}

#[async_trait]
impl RelayEncoder for FfmpegRelayEncoder {
    async fn spawn(&self, config: &RelayConfig) -> Result<EncoderHandle> {
        let mut child = Command::new(&config.ffmpeg_path)
            .args(Self::args(config))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RelayError::Spawn(e.to_string()))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| RelayError::Spawn("encoder stdin unavailable".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| RelayError::Spawn("encoder stderr unavailable".to_string()))?;

        let (tx, events) = mpsc::channel(64);
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        let _ = child.kill().await;
                        return;
                    }
                    line = lines.next_line() => match line {
                        Ok(Some(line)) => {
                            let _ = tx.send(EncoderEvent::Line(line)).await;
                        }
                        _ => break,
                    }
                }
            }

            let status = tokio::select! {
                _ = token.cancelled() => {
                    let _ = child.kill().await;
                    return;
                }
                status = child.wait() => status,
            };
            let code = status.ok().and_then(|s| s.code());
            let _ = tx.send(EncoderEvent::Exited(code)).await;
        });

        Ok(EncoderHandle {
            input: Box::new(stdin),
            events,
            cancel,
        })
    }
}
