use std::time::Duration;

use url::Url;

use crate::error::{ParseError, SyncError};
use crate::ports::spotify::SpotifyLibraryApi;
use crate::spotify_rs::types::{SavedTracksPage, SpotifyUser};

pub const SPOTIFY_API_BASE_URL: &str = "https://api.spotify.com/";

/// Spotify Web API client authenticated with a bearer token.
///
/// Token acquisition and refresh happen elsewhere; this client only sends the token it was given.
pub struct SpotifyClient {
    access_token: String,
    base_url: Url,
    timeout: Duration,
    client: reqwest::Client,
}

impl SpotifyClient {
    pub fn new(access_token: String, base_url: Url, timeout: Duration) -> Self {
        Self {
            access_token,
            base_url,
            timeout,
            client: reqwest::Client::new(),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: Url,
        context: &str,
    ) -> Result<T, SyncError> {
        tracing::debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .bearer_auth(&self.access_token)
            .timeout(self.timeout)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|error| SyncError::from_reqwest(context, self.timeout, error))?;

        let body = response
            .text()
            .await
            .map_err(|error| SyncError::from_reqwest(context, self.timeout, error))?;

        serde_json::from_str(&body)
            .map_err(|error| ParseError::new(context, error.to_string()).into())
    }
}

/// Builds `v1/me/tracks` relative to `base_url`.
pub fn saved_tracks_url(
    base_url: &Url,
    offset: u32,
    limit: u32,
    market: Option<&str>,
) -> Result<Url, url::ParseError> {
    let mut url = base_url.join("v1/me/tracks")?;
    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("offset", &offset.to_string())
            .append_pair("limit", &limit.to_string());
        if let Some(market) = market {
            query.append_pair("market", market);
        }
    }
    Ok(url)
}

#[async_trait::async_trait]
impl SpotifyLibraryApi for SpotifyClient {
    async fn current_user(&self) -> Result<SpotifyUser, SyncError> {
        let url = self
            .base_url
            .join("v1/me")
            .map_err(|error| SyncError::transport("user profile", error))?;
        self.get_json(url, "user profile").await
    }

    async fn saved_tracks_page(
        &self,
        offset: u32,
        limit: u32,
        market: Option<String>,
    ) -> Result<SavedTracksPage, SyncError> {
        let context = format!("saved tracks at offset {}", offset);
        let url = saved_tracks_url(&self.base_url, offset, limit, market.as_deref())
            .map_err(|error| SyncError::transport(context.as_str(), error))?;
        self.get_json(url, &context).await
    }
}
