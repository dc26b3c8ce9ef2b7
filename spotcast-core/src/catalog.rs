//! Read-only lookups against the music catalog.

use crate::media::{MediaError, SpotifyUri};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    /// The name or uri does not resolve to any catalog entity
    #[error("Not found in catalog: {query}")]
    NotFound { query: String },

    /// Malformed reference, rejected before any remote call
    #[error("Invalid reference: {0}")]
    InvalidReference(#[from] MediaError),

    /// Both include and exclude playlist filters were given
    #[error("Cannot specify both include and exclude playlists")]
    ConflictingFilter,

    /// The remote catalog call failed
    #[error("Catalog request failed: {reason}")]
    Remote { reason: String },
}

impl CatalogError {
    pub fn not_found(query: impl Into<String>) -> Self {
        Self::NotFound {
            query: query.into(),
        }
    }

    pub fn remote(reason: impl ToString) -> Self {
        Self::Remote {
            reason: reason.to_string(),
        }
    }
}

pub type CatalogResult<T> = Result<T, CatalogError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackInfo {
    pub uri: SpotifyUri,
    pub name: String,
    /// First listed album artist
    pub artist_name: String,
    pub artist_uri: Option<SpotifyUri>,
    pub album_uri: Option<SpotifyUri>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlbumInfo {
    pub uri: SpotifyUri,
    pub name: String,
    pub artist_name: String,
    pub artist_uri: Option<SpotifyUri>,
    pub total_tracks: u32,
    pub tracks: Vec<SpotifyUri>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtistInfo {
    pub uri: SpotifyUri,
    pub name: String,
    pub genres: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistInfo {
    pub uri: SpotifyUri,
    pub name: String,
    pub owner: Option<String>,
    pub total_tracks: u32,
    pub tracks: Vec<SpotifyUri>,
}

/// Name and uri of a playlist as listed for a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistSummary {
    pub uri: SpotifyUri,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlbumGroup {
    Album,
    Single,
    AppearsOn,
    Compilation,
}

/// Seeds for a recommendation query; at least one list must be non-empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecommendationSeeds {
    pub artists: Vec<SpotifyUri>,
    pub genres: Vec<String>,
    pub tracks: Vec<SpotifyUri>,
}

impl RecommendationSeeds {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.artists.is_empty() && self.genres.is_empty() && self.tracks.is_empty()
    }
}

/// Remote catalog client.
///
/// Implementations are pure query wrappers: no retries and no caching.
/// Name-or-uri arguments accept either a `spotify:` uri of the right kind or
/// a free text search name.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn lookup_track(&self, track: &str, artist: Option<&str>) -> CatalogResult<TrackInfo>;

    async fn lookup_album(&self, album: &str, artist: Option<&str>) -> CatalogResult<AlbumInfo>;

    async fn lookup_artist(&self, artist: &str) -> CatalogResult<ArtistInfo>;

    async fn lookup_playlist(&self, playlist: &SpotifyUri) -> CatalogResult<PlaylistInfo>;

    async fn recommendations(
        &self,
        seeds: &RecommendationSeeds,
        limit: u32,
    ) -> CatalogResult<Vec<SpotifyUri>>;

    /// Genres accepted as recommendation seeds
    async fn genre_seeds(&self) -> CatalogResult<Vec<String>>;

    async fn related_artists(&self, artist: &SpotifyUri) -> CatalogResult<Vec<SpotifyUri>>;

    async fn top_tracks(&self, artist: &SpotifyUri, country: &str)
    -> CatalogResult<Vec<SpotifyUri>>;

    async fn artist_albums(
        &self,
        artist: &SpotifyUri,
        group: Option<AlbumGroup>,
        country: &str,
        limit: u32,
        offset: u32,
    ) -> CatalogResult<Vec<SpotifyUri>>;

    async fn album_tracks(
        &self,
        album: &SpotifyUri,
        limit: u32,
        offset: u32,
    ) -> CatalogResult<Vec<SpotifyUri>>;

    /// Playlists owned or followed by `user`; `"me"` is the authenticated user
    async fn user_playlists(&self, user: &str) -> CatalogResult<Vec<PlaylistSummary>>;

    /// Category ids
    async fn categories(&self, limit: u32) -> CatalogResult<Vec<String>>;

    async fn category_playlists(
        &self,
        category: &str,
        limit: u32,
    ) -> CatalogResult<Vec<SpotifyUri>>;

    async fn featured_playlists(&self, limit: u32) -> CatalogResult<Vec<SpotifyUri>>;

    /// Newly released albums
    async fn new_releases(&self, limit: u32) -> CatalogResult<Vec<SpotifyUri>>;

    /// Saved tracks of the authenticated user
    async fn saved_tracks(&self, limit: u32) -> CatalogResult<Vec<SpotifyUri>>;

    /// Playlists of `user` filtered by name or uri.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::ConflictingFilter`] when both filters are given.
    async fn playlists_of(
        &self,
        user: &str,
        include: &[String],
        exclude: &[String],
    ) -> CatalogResult<Vec<SpotifyUri>> {
        if !include.is_empty() && !exclude.is_empty() {
            return Err(CatalogError::ConflictingFilter);
        }
        let matches = |playlist: &PlaylistSummary, names: &[String]| {
            let uri = playlist.uri.to_string();
            names.iter().any(|n| *n == playlist.name || *n == uri)
        };
        Ok(self
            .user_playlists(user)
            .await?
            .into_iter()
            .filter(|pl| include.is_empty() || matches(pl, include))
            .filter(|pl| exclude.is_empty() || !matches(pl, exclude))
            .map(|pl| pl.uri)
            .collect())
    }
}
