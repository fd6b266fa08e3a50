//! Silence filler
//!
//! While nothing is on air (idle station, track change, lookahead wait) the
//! listeners keep receiving valid MP3: silent MPEG-1 Layer III frames at
//! 128 kbit/s, 44.1 kHz, paced like real audio.

use crate::fanout::Broadcaster;
use crate::throttle::RateLimiter;
use bytes::Bytes;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// MPEG-1 Layer III, 128 kbit/s, 44.1 kHz, no padding, no CRC
const FRAME_HEADER: [u8; 4] = [0xFF, 0xFB, 0x90, 0x00];
pub const SILENCE_BITRATE: u32 = 128_000;
const SAMPLE_RATE: u32 = 44_100;
/// Frames per broadcast chunk (about 260 ms of audio)
const FRAMES_PER_CHUNK: usize = 10;

/// Size of one frame: 144 * bitrate / sample rate
pub const fn frame_len() -> usize {
    (144 * SILENCE_BITRATE / SAMPLE_RATE) as usize
}

/// One frame whose side info and main data are all zero
pub fn silent_frame() -> Bytes {
    let mut frame = vec![0u8; frame_len()];
    frame[..FRAME_HEADER.len()].copy_from_slice(&FRAME_HEADER);
    Bytes::from(frame)
}

fn silent_chunk() -> Bytes {
    let frame = silent_frame();
    let mut chunk = Vec::with_capacity(frame.len() * FRAMES_PER_CHUNK);
    for _ in 0..FRAMES_PER_CHUNK {
        chunk.extend_from_slice(&frame);
    }
    Bytes::from(chunk)
}

/// Broadcasts silence until `cancel` fires
pub fn spawn_filler(broadcaster: Broadcaster, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let chunk = silent_chunk();
        let mut limiter = RateLimiter::new(SILENCE_BITRATE);
        tracing::debug!("Silence filler started");
        loop {
            broadcaster.broadcast_audio(chunk.clone());
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = limiter.pace(chunk.len()) => {}
            }
        }
        tracing::debug!("Silence filler stopped");
    })
}
