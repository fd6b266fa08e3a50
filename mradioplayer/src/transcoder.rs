//! External transcoding process
//!
//! A transcoder turns a media location into a constant-bitrate MP3 byte
//! stream. The stream ends with `None` on a clean exit and with an `Err`
//! item when the process fails. Dropping the stream kills the process.

use crate::error::PlaybackError;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::fmt::Debug;
use std::pin::Pin;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_stream::StreamExt;
use tokio_util::io::ReaderStream;

pub type AudioStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>;

#[derive(Debug, Clone, PartialEq)]
pub struct TranscodeRequest {
    pub location: String,
    /// Start position in seconds
    pub start_offset: f64,
    /// Output bitrate in kbit/s
    pub bitrate_kbps: u32,
}

#[async_trait]
pub trait Transcoder: Debug + Send + Sync {
    async fn start(&self, request: &TranscodeRequest) -> Result<AudioStream, PlaybackError>;
}

#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    ffmpeg_path: String,
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl FfmpegTranscoder {
    pub fn new(ffmpeg_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
        }
    }

    pub fn args(request: &TranscodeRequest) -> Vec<String> {
        let mut args = vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
        ];
        if request.start_offset > 0.0 {
            args.push("-ss".to_string());
            args.push(format!("{:.3}", request.start_offset));
        }
        args.extend([
            "-i".to_string(),
            request.location.clone(),
            "-vn".to_string(),
            "-acodec".to_string(),
            "libmp3lame".to_string(),
            "-ab".to_string(),
            format!("{}k", request.bitrate_kbps),
            "-ac".to_string(),
            "2".to_string(),
            "-ar".to_string(),
            "44100".to_string(),
            "-f".to_string(),
            "mp3".to_string(),
            "pipe:1".to_string(),
        ]);
        args
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn start(&self, request: &TranscodeRequest) -> Result<AudioStream, PlaybackError> {
        let mut child = Command::new(&self.ffmpeg_path)
            .args(Self::args(request))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PlaybackError::Transcoder(format!("spawn failed: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| PlaybackError::Transcoder("stdout unavailable".to_string()))?;

        if let Some(stderr) = child.stderr.take() {
            let location = request.location.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(location = %location, "ffmpeg: {}", line);
                }
            });
        }

        tracing::debug!(
            location = %request.location,
            offset = request.start_offset,
            "Transcoder started"
        );

        let stream = async_stream::stream! {
            let mut chunks = ReaderStream::new(stdout);
            while let Some(chunk) = chunks.next().await {
                match chunk {
                    Ok(bytes) => yield Ok(bytes),
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }
            match child.wait().await {
                Ok(status) if status.success() => {}
                Ok(status) => yield Err(std::io::Error::other(format!("transcoder exited with {}", status))),
                Err(e) => yield Err(e),
            }
        };

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_with_offset() {
        let request = TranscodeRequest {
            location: "/music/a.mp3".into(),
            start_offset: 40.0,
            bitrate_kbps: 192,
        };
        let args = FfmpegTranscoder::args(&request);
        let ss = args.iter().position(|a| a == "-ss").unwrap();
        assert_eq!(args[ss + 1], "40.000");
        assert!(ss < args.iter().position(|a| a == "-i").unwrap());
        assert!(args.contains(&"192k".to_string()));
        assert_eq!(args.last().unwrap(), "pipe:1");
    }

    #[test]
    fn test_args_without_offset() {
        let request = TranscodeRequest {
            location: "/music/a.mp3".into(),
            start_offset: 0.0,
            bitrate_kbps: 128,
        };
        assert!(!FfmpegTranscoder::args(&request).contains(&"-ss".to_string()));
    }

    #[tokio::test]
    async fn test_missing_binary_is_a_transcoder_error() {
        let transcoder = FfmpegTranscoder::new("/nonexistent/ffmpeg");
        let request = TranscodeRequest {
            location: "x.mp3".into(),
            start_offset: 0.0,
            bitrate_kbps: 128,
        };
        assert!(matches!(
            transcoder.start(&request).await,
            Err(PlaybackError::Transcoder(_))
        ));
    }
}
