//! Data model shared by the whole station

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a track comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Youtube,
    Jiosaavn,
    Soundcloud,
    Local,
    /// Static local fallback directory; the reference is already a path.
    Fallback,
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceType::Youtube => "youtube",
            SourceType::Jiosaavn => "jiosaavn",
            SourceType::Soundcloud => "soundcloud",
            SourceType::Local => "local",
            SourceType::Fallback => "fallback",
        };
        f.write_str(name)
    }
}

/// A track ready to be played
///
/// `bitrate` is in bits per second and drives the emission pace
/// (bitrate / 8 bytes per second).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub title: String,
    pub media_location: String,
    pub source_type: SourceType,
    pub duration_seconds: f64,
    pub requested_by: String,
    pub bitrate: u32,
}

/// Entry of the persisted request queue
///
/// Without `sourceType` the reference is a free-text query handed to every
/// resolver in turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct SongRequest {
    pub title: String,
    pub reference: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_type: Option<SourceType>,
    #[serde(default)]
    pub duration_seconds: f64,
    #[serde(default = "anonymous")]
    pub requested_by: String,
}

fn anonymous() -> String {
    "anonymous".to_string()
}

/// Entry of the default-playlist registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefaultPlaylist {
    pub playlist_id: String,
    pub title: String,
    pub source: SourceType,
    pub is_active: bool,
    pub genre: String,
}

/// One track of a default playlist, as stored in the metadata store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistTrack {
    pub title: String,
    pub reference: String,
    pub source_type: SourceType,
    #[serde(default)]
    pub duration_seconds: f64,
    pub requested_by: String,
    pub genre: String,
    pub playlist_id: String,
}

impl From<PlaylistTrack> for SongRequest {
    fn from(track: PlaylistTrack) -> Self {
        SongRequest {
            title: track.title,
            reference: track.reference,
            source_type: Some(track.source_type),
            duration_seconds: track.duration_seconds,
            requested_by: track.requested_by,
        }
    }
}
