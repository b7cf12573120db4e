use crate::error::SyncError;
use crate::spotify_rs::types::{SavedTracksPage, SpotifyUser};

/// Port trait wrapping the Spotify API capabilities used by the library sync.
///
/// Implementations live in `spotify_rs::client` (production) or test mocks.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait SpotifyLibraryApi: Send + Sync {
    /// `GET /v1/me`
    async fn current_user(&self) -> Result<SpotifyUser, SyncError>;

    /// `GET /v1/me/tracks?offset=..&limit=..[&market=..]`
    async fn saved_tracks_page(
        &self,
        offset: u32,
        limit: u32,
        market: Option<String>,
    ) -> Result<SavedTracksPage, SyncError>;
}
