//! Bitrate and duration probing through ffmpeg
//!
//! `ffmpeg -i <file> -f null -` prints the stream description on stderr:
//!
//! ```text
//!   Duration: 00:03:25.04, start: 0.025057, bitrate: 192 kb/s
//!   Stream #0:0: Audio: mp3, 44100 Hz, stereo, fltp, 192 kb/s
//! ```

use async_trait::async_trait;
use std::fmt::Debug;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

/// Bitrate used when nothing can be probed (bits per second)
pub const DEFAULT_BITRATE: u32 = 128_000;

#[async_trait]
pub trait BitrateProbe: Debug + Send + Sync {
    /// Audio bitrate of `location` in bits per second
    ///
    /// Never fails: returns [`DEFAULT_BITRATE`] when the file is missing or
    /// nothing is found.
    async fn bitrate(&self, location: &str) -> u32;

    /// Duration of `location` in seconds, when known
    async fn duration(&self, _location: &str) -> Option<f64> {
        None
    }
}

#[derive(Debug, Clone)]
pub struct FfmpegProbe {
    ffmpeg_path: String,
}

impl FfmpegProbe {
    pub fn new(ffmpeg_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
        }
    }

    async fn describe(&self, location: &str) -> Option<String> {
        if !location.contains("://") && !Path::new(location).exists() {
            return None;
        }

        let output = Command::new(&self.ffmpeg_path)
            .args(["-hide_banner", "-i", location, "-f", "null", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await;

        match output {
            Ok(output) => Some(String::from_utf8_lossy(&output.stderr).into_owned()),
            Err(e) => {
                tracing::warn!(location = %location, "ffmpeg probe failed: {}", e);
                None
            }
        }
    }
}

impl Default for FfmpegProbe {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

#[async_trait]
impl BitrateProbe for FfmpegProbe {
    async fn bitrate(&self, location: &str) -> u32 {
        let bitrate = match self.describe(location).await {
            Some(stderr) => parse_audio_bitrate(&stderr),
            None => None,
        };
        match bitrate {
            Some(b) => {
                tracing::debug!(location = %location, bitrate = b, "Probed bitrate");
                b
            }
            None => {
                tracing::debug!(location = %location, "No bitrate found, using default");
                DEFAULT_BITRATE
            }
        }
    }

    async fn duration(&self, location: &str) -> Option<f64> {
        parse_duration(&self.describe(location).await?)
    }
}

/// Bitrate (bits/s) from the first `Audio: ... <n> kb/s` line
pub fn parse_audio_bitrate(stderr: &str) -> Option<u32> {
    let line = stderr.lines().find(|l| l.contains("Audio:"))?;
    let end = line.find(" kb/s")?;
    let kbps: u32 = line[..end]
        .rsplit(|c: char| !c.is_ascii_digit())
        .next()?
        .parse()
        .ok()?;
    (kbps > 0).then_some(kbps * 1000)
}

/// Duration in seconds from the `Duration: HH:MM:SS.cc` line
pub fn parse_duration(stderr: &str) -> Option<f64> {
    let line = stderr.lines().find(|l| l.contains("Duration:"))?;
    let start = line.find("Duration:")? + "Duration:".len();
    let stamp = line[start..].trim_start().split(',').next()?.trim();

    let mut parts = stamp.split(':');
    let hours: f64 = parts.next()?.parse().ok()?;
    let minutes: f64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "Input #0, mp3, from 'song.mp3':\n  \
        Duration: 00:03:25.04, start: 0.025057, bitrate: 192 kb/s\n  \
        Stream #0:0: Audio: mp3, 44100 Hz, stereo, fltp, 192 kb/s\n";

    #[test]
    fn test_parse_audio_bitrate() {
        assert_eq!(parse_audio_bitrate(SAMPLE), Some(192_000));
        assert_eq!(parse_audio_bitrate("Stream #0:0: Video: h264"), None);
        assert_eq!(parse_audio_bitrate(""), None);
    }

    #[test]
    fn test_parse_duration() {
        let duration = parse_duration(SAMPLE).unwrap();
        assert!((duration - 205.04).abs() < 1e-6);
        assert_eq!(parse_duration("Duration: N/A, bitrate: N/A"), None);
    }

    #[tokio::test]
    async fn test_missing_file_uses_default() {
        let probe = FfmpegProbe::new("/nonexistent/ffmpeg");
        assert_eq!(probe.bitrate("/nonexistent/file.mp3").await, DEFAULT_BITRATE);
    }
}
