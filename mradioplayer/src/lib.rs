//! # mradioplayer
//!
//! The heart of the station: a single track on air, transcoded to
//! constant-bitrate MP3 and pushed in real time to every listener.
//!
//! ```text
//! PlaybackQueue ─► PlaybackEngine ─► Transcoder ─► RateLimiter ─► Broadcaster ─┬─► /stream
//!                        │                                                      └─► relay drain
//!                        └─► EventBus ─► /events
//! ```
//!
//! - [`engine`]: playback state machine (play, skip, previous, seek, pause, resume)
//! - [`fanout`]: one bounded channel per listener, broadcast never waits
//! - [`silence`]: silent frames while nothing is on air
//! - [`events`]: out-of-band notifications (track change, progress, heartbeat)
//! - [`transcoder`]: external transcoding process
//! - [`throttle`]: pacing at the stream bitrate
//! - [`station`]: the context wiring it all together

pub mod engine;
pub mod error;
pub mod events;
pub mod fanout;
pub mod silence;
pub mod station;
pub mod throttle;
pub mod transcoder;

#[cfg(feature = "mradioconfig")]
pub mod config_ext;

pub use engine::{EngineOptions, NowPlaying, PlaybackEngine, PlaybackStatus, SeekOutcome};
pub use error::{PlaybackError, Result};
pub use events::{EventBus, EventEnvelope, RadioEvent};
pub use fanout::{Broadcaster, ListenerSink, Packet, SinkId};
pub use station::{Station, StationBuilder};
pub use throttle::RateLimiter;
pub use transcoder::{AudioStream, FfmpegTranscoder, TranscodeRequest, Transcoder};

#[cfg(feature = "mradioconfig")]
pub use config_ext::StationConfigExt;
