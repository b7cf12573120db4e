use serde::{Deserialize, Serialize};

/// Spotify user profile from `GET /v1/me`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpotifyUser {
    pub id: Option<String>,
    pub display_name: Option<String>,
    pub email: Option<String>,
}

/// One page of `GET /v1/me/tracks`.
///
/// Items stay as raw JSON so that one malformed item does not fail the whole page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedTracksPage {
    pub total: u32,
    #[serde(default)]
    pub offset: Option<u32>,
    #[serde(default)]
    pub limit: Option<u32>,
    pub items: Vec<serde_json::Value>,
}

/// Saved-track wrapper; the track itself sits under `track`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedTrackItem {
    pub track: Option<RawTrack>,
}

/// Track object as returned by the API. Every field the normalizer needs is optional
/// here so that a missing one can be reported by name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawTrack {
    pub name: Option<String>,
    #[serde(default)]
    pub artists: Vec<RawArtist>,
    pub album: Option<RawAlbum>,
    pub track_number: Option<u32>,
    pub duration_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawArtist {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawAlbum {
    pub name: Option<String>,
    pub release_date: Option<String>,
    #[serde(default)]
    pub images: Vec<RawImage>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawImage {
    pub url: Option<String>,
}
