//! Track sources built from mradioconfig

use crate::fetcher::FetcherOptions;
use crate::store::JsonFileStore;
use crate::track::{DefaultPlaylist, PlaylistTrack, SongRequest};
use anyhow::Result;
use mradioconfig::Config;
use std::sync::Arc;

const REQUESTS_FILE: &str = "requests.json";
const PLAYLISTS_FILE: &str = "default_playlists.json";
const PLAYLIST_TRACKS_FILE: &str = "default_playlist_tracks.json";

/// Extension trait for `mradioconfig::Config`
///
/// ```rust,ignore
/// use mradioconfig::get_config;
/// use mradiosource::SourceConfigExt;
///
/// let config = get_config();
/// let options = config.fetcher_options()?;
/// let requests = config.open_request_store()?;
/// ```
pub trait SourceConfigExt {
    /// Fetcher options (retries, genre, fallback directory)
    fn fetcher_options(&self) -> Result<FetcherOptions>;

    /// Request queue persisted in the data directory
    fn open_request_store(&self) -> Result<Arc<JsonFileStore<SongRequest>>>;

    fn open_playlist_store(&self) -> Result<Arc<JsonFileStore<DefaultPlaylist>>>;

    fn open_playlist_track_store(&self) -> Result<Arc<JsonFileStore<PlaylistTrack>>>;
}

impl SourceConfigExt for Config {
    fn fetcher_options(&self) -> Result<FetcherOptions> {
        let genre = self.get_default_genre()?;
        Ok(FetcherOptions {
            max_retries: self.get_max_fetch_retries()?,
            genre: Some(genre),
            fallback_dir: self.get_fallback_dir()?,
        })
    }

    fn open_request_store(&self) -> Result<Arc<JsonFileStore<SongRequest>>> {
        let path = self.get_data_dir()?.join(REQUESTS_FILE);
        Ok(Arc::new(JsonFileStore::open(path)?))
    }

    fn open_playlist_store(&self) -> Result<Arc<JsonFileStore<DefaultPlaylist>>> {
        let path = self.get_data_dir()?.join(PLAYLISTS_FILE);
        Ok(Arc::new(JsonFileStore::open(path)?))
    }

    fn open_playlist_track_store(&self) -> Result<Arc<JsonFileStore<PlaylistTrack>>> {
        let path = self.get_data_dir()?.join(PLAYLIST_TRACKS_FILE);
        Ok(Arc::new(JsonFileStore::open(path)?))
    }
}
