pub mod client;
pub mod types;

pub use client::{SPOTIFY_API_BASE_URL, SpotifyClient};
