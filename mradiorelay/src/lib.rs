//! # mradiorelay
//!
//! Pushes the station's audio to an external relay (Icecast-style source
//! client) through a long-running re-encoding process.
//!
//! The relay is never a dependency of local playback: while it is down,
//! audio accumulates in a capped [`PendingBuffer`] (oldest bytes dropped
//! first) and the streamer reconnects with a linear, capped backoff until it
//! gives up.
//!
//! ```rust,ignore
//! use mradiorelay::{FfmpegRelayEncoder, RelayConfig, RelayStreamer};
//!
//! let relay = RelayStreamer::new(RelayConfig::default(), Arc::new(FfmpegRelayEncoder));
//! relay.write(chunk).await?;
//! println!("{:?}", relay.status());
//! ```

pub mod config;
pub mod encoder;
pub mod error;
pub mod ring;
pub mod streamer;

#[cfg(feature = "mradioconfig")]
pub mod config_ext;

pub use config::RelayConfig;
pub use encoder::{
    classify_diagnostic, Diagnostic, EncoderEvent, EncoderHandle, FfmpegRelayEncoder,
    RelayEncoder,
};
pub use error::{RelayError, Result};
pub use ring::PendingBuffer;
pub use streamer::{RelayState, RelayStatus, RelayStreamer};

#[cfg(feature = "mradioconfig")]
pub use config_ext::RelayConfigExt;
