//! # mradiosource
//!
//! Everything that happens before a track reaches the playback engine.
//!
//! ```text
//! request queue ─┐
//! default pool ──┼─► NextTrackFetcher ─► PrefetchPipeline ─► PlaybackQueue
//! fallback dir ──┘        │                    │
//!                   ResolverRegistry       BitrateProbe
//! ```
//!
//! - [`track`]: data model (`Track`, `SongRequest`, playlists)
//! - [`resolver`]: the "reference → playable location" capability
//! - [`store`]: ordered-list persistence (memory / JSON file)
//! - [`fetcher`]: picks and materialises the next track, with bounded retries
//! - [`queue`]: the in-memory lookahead buffer with a length watch
//! - [`prefetch`]: keeps the lookahead buffer filled
//!
//! Per-source scrapers are not part of this crate; plug them in as
//! [`TrackResolver`] implementations.

pub mod error;
pub mod fetcher;
pub mod prefetch;
pub mod probe;
pub mod queue;
pub mod resolver;
pub mod store;
pub mod track;

#[cfg(feature = "mradioconfig")]
pub mod config_ext;

pub use error::{Error, ResolveError, Result};
pub use fetcher::{FetcherOptions, NextTrackFetcher, TrackSource};
pub use prefetch::PrefetchPipeline;
pub use probe::{BitrateProbe, FfmpegProbe, DEFAULT_BITRATE};
pub use queue::PlaybackQueue;
pub use resolver::{LocalLibraryResolver, ResolvedTrack, ResolverRegistry, TrackResolver};
pub use store::{JsonFileStore, MemoryStore, OrderedStore};
pub use track::{DefaultPlaylist, PlaylistTrack, SongRequest, SourceType, Track};

#[cfg(feature = "mradioconfig")]
pub use config_ext::SourceConfigExt;
