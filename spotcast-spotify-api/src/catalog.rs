//! Catalog lookups over the Spotify Web API.

use crate::convert::{
    album_id, artist_id, catalog_error, market, playlist_id, to_uri, to_uris, track_id,
};
use crate::oauth::SpotifyOAuth;
use async_trait::async_trait;
use rspotify::ClientError;
use rspotify::http::Query;
use rspotify::model::{
    AlbumType, FullAlbum, FullArtist, FullTrack, Market, Page, PlayableItem,
    RecommendationsAttribute, SearchResult, SearchType, SimplifiedAlbum, SimplifiedPlaylist,
    UserId,
};
use rspotify::prelude::*;
use serde::Deserialize;
use spotcast_core::{
    AlbumGroup, AlbumInfo, ArtistInfo, Catalog, CatalogError, CatalogResult, PlaylistInfo,
    PlaylistSummary, RecommendationSeeds, SpotifyUri, TrackInfo, UriKind, is_spotify_uri,
};
use std::sync::Arc;
use tracing::debug;

/// Largest page the Web API hands out
const PAGE_SIZE: u32 = 50;
/// Upper bound when walking every playlist of a user
const MAX_PLAYLISTS: u32 = 1000;

#[derive(Debug, Deserialize)]
struct GenreSeeds {
    genres: Vec<String>,
}

/// [`Catalog`] backed by the authenticated Web API client.
pub struct SpotifyCatalog {
    oauth: Arc<SpotifyOAuth>,
    market: Option<Market>,
    language: String,
}

impl SpotifyCatalog {
    #[must_use]
    pub fn new(oauth: Arc<SpotifyOAuth>, country: &str, language: impl Into<String>) -> Self {
        Self {
            oauth,
            market: market(country),
            language: language.into(),
        }
    }

    async fn fresh(&self) -> CatalogResult<()> {
        self.oauth
            .ensure_token_fresh()
            .await
            .map_err(CatalogError::remote)
    }

    async fn search_first(&self, query: &str, kind: SearchType) -> CatalogResult<SearchResult> {
        self.fresh().await?;
        debug!("Searching {:?} for \"{}\"", kind, query);
        self.oauth
            .client()
            .search(query, kind, self.market, None, Some(1), None)
            .await
            .map_err(|e| catalog_error(query, &e))
    }

    async fn full_track(&self, track: &str, artist: Option<&str>) -> CatalogResult<FullTrack> {
        if is_spotify_uri(track, &[UriKind::Track]) {
            let uri = SpotifyUri::parse(track)?;
            self.fresh().await?;
            return self
                .oauth
                .client()
                .track(track_id(&uri).map_err(CatalogError::remote)?, self.market)
                .await
                .map_err(|e| catalog_error(track, &e));
        }

        let query = artist.map_or_else(
            || format!("track:{track}"),
            |artist| format!("artist:{artist} track:{track}"),
        );
        let found = match self.search_first(&query, SearchType::Track).await? {
            SearchResult::Tracks(page) => page.items.into_iter().next(),
            _ => None,
        };
        found.ok_or_else(|| CatalogError::not_found(query))
    }

    async fn full_album(&self, album: &str, artist: Option<&str>) -> CatalogResult<FullAlbum> {
        let uri = if is_spotify_uri(album, &[UriKind::Album]) {
            SpotifyUri::parse(album)?
        } else {
            let query = artist.map_or_else(
                || format!("album:{album}"),
                |artist| format!("album:{album} artist:{artist}"),
            );
            let found = match self.search_first(&query, SearchType::Album).await? {
                SearchResult::Albums(page) => page.items.into_iter().next(),
                _ => None,
            };
            found
                .and_then(|a| a.id.as_ref().and_then(to_uri))
                .ok_or_else(|| CatalogError::not_found(query))?
        };

        self.fresh().await?;
        self.oauth
            .client()
            .album(album_id(&uri).map_err(CatalogError::remote)?, self.market)
            .await
            .map_err(|e| catalog_error(album, &e))
    }

    async fn full_artist(&self, artist: &str) -> CatalogResult<FullArtist> {
        if is_spotify_uri(artist, &[UriKind::Artist]) {
            let uri = SpotifyUri::parse(artist)?;
            self.fresh().await?;
            return self
                .oauth
                .client()
                .artist(artist_id(&uri).map_err(CatalogError::remote)?)
                .await
                .map_err(|e| catalog_error(artist, &e));
        }

        let query = format!("artist:{artist}");
        let found = match self.search_first(&query, SearchType::Artist).await? {
            SearchResult::Artists(page) => page.items.into_iter().next(),
            _ => None,
        };
        found.ok_or_else(|| CatalogError::not_found(query))
    }

    async fn playlist_page(
        &self,
        user: Option<&UserId<'static>>,
        offset: u32,
    ) -> Result<Page<SimplifiedPlaylist>, ClientError> {
        let client = self.oauth.client();
        match user {
            None => {
                client
                    .current_user_playlists_manual(Some(PAGE_SIZE), Some(offset))
                    .await
            }
            Some(user_id) => {
                client
                    .user_playlists_manual(user_id.clone(), Some(PAGE_SIZE), Some(offset))
                    .await
            }
        }
    }
}

fn track_info(track: FullTrack) -> Option<TrackInfo> {
    let first_artist = track.artists.first();
    Some(TrackInfo {
        uri: track.id.as_ref().and_then(to_uri)?,
        name: track.name,
        artist_name: first_artist.map(|a| a.name.clone()).unwrap_or_default(),
        artist_uri: first_artist.and_then(|a| a.id.as_ref()).and_then(to_uri),
        album_uri: track.album.id.as_ref().and_then(to_uri),
    })
}

fn album_uris(albums: &[SimplifiedAlbum]) -> Vec<SpotifyUri> {
    to_uris(albums.iter().map(|album| &album.id))
}

fn playlist_uris(playlists: &[SimplifiedPlaylist]) -> Vec<SpotifyUri> {
    playlists.iter().filter_map(|p| to_uri(&p.id)).collect()
}

const fn album_type(group: AlbumGroup) -> AlbumType {
    match group {
        AlbumGroup::Album => AlbumType::Album,
        AlbumGroup::Single => AlbumType::Single,
        AlbumGroup::AppearsOn => AlbumType::AppearsOn,
        AlbumGroup::Compilation => AlbumType::Compilation,
    }
}

#[async_trait]
impl Catalog for SpotifyCatalog {
    async fn lookup_track(&self, track: &str, artist: Option<&str>) -> CatalogResult<TrackInfo> {
        track_info(self.full_track(track, artist).await?)
            .ok_or_else(|| CatalogError::not_found(track))
    }

    async fn lookup_album(&self, album: &str, artist: Option<&str>) -> CatalogResult<AlbumInfo> {
        let full = self.full_album(album, artist).await?;
        let first_artist = full.artists.first();
        Ok(AlbumInfo {
            uri: to_uri(&full.id).ok_or_else(|| CatalogError::not_found(album))?,
            artist_name: first_artist.map(|a| a.name.clone()).unwrap_or_default(),
            artist_uri: first_artist.and_then(|a| a.id.as_ref()).and_then(to_uri),
            total_tracks: full.tracks.total,
            tracks: to_uris(full.tracks.items.iter().map(|t| &t.id)),
            name: full.name,
        })
    }

    async fn lookup_artist(&self, artist: &str) -> CatalogResult<ArtistInfo> {
        let full = self.full_artist(artist).await?;
        Ok(ArtistInfo {
            uri: to_uri(&full.id).ok_or_else(|| CatalogError::not_found(artist))?,
            name: full.name,
            genres: full.genres,
        })
    }

    async fn lookup_playlist(&self, playlist: &SpotifyUri) -> CatalogResult<PlaylistInfo> {
        self.fresh().await?;
        let query = playlist.to_string();
        let full = self
            .oauth
            .client()
            .playlist(playlist_id(playlist).map_err(CatalogError::remote)?, None, self.market)
            .await
            .map_err(|e| catalog_error(&query, &e))?;

        let tracks = full
            .tracks
            .items
            .iter()
            .filter_map(|item| match &item.track {
                Some(PlayableItem::Track(track)) => track.id.as_ref().and_then(to_uri),
                _ => None,
            })
            .collect();
        Ok(PlaylistInfo {
            uri: playlist.clone(),
            name: full.name,
            owner: full.owner.display_name,
            total_tracks: full.tracks.total,
            tracks,
        })
    }

    async fn recommendations(
        &self,
        seeds: &RecommendationSeeds,
        limit: u32,
    ) -> CatalogResult<Vec<SpotifyUri>> {
        if seeds.is_empty() {
            return Ok(Vec::new());
        }
        let artists = seeds
            .artists
            .iter()
            .map(artist_id)
            .collect::<Result<Vec<_>, _>>()
            .map_err(CatalogError::remote)?;
        let tracks = seeds
            .tracks
            .iter()
            .map(track_id)
            .collect::<Result<Vec<_>, _>>()
            .map_err(CatalogError::remote)?;
        let genres: Vec<&str> = seeds.genres.iter().map(String::as_str).collect();

        self.fresh().await?;
        let result = self
            .oauth
            .client()
            .recommendations(
                Vec::<RecommendationsAttribute>::new(),
                (!artists.is_empty()).then_some(artists),
                (!genres.is_empty()).then_some(genres),
                (!tracks.is_empty()).then_some(tracks),
                self.market,
                Some(limit),
            )
            .await
            .map_err(|e| catalog_error("recommendations", &e))?;
        Ok(to_uris(result.tracks.iter().map(|t| &t.id)))
    }

    async fn genre_seeds(&self) -> CatalogResult<Vec<String>> {
        self.fresh().await?;
        let body = self
            .oauth
            .client()
            .api_get("recommendations/available-genre-seeds", &Query::new())
            .await
            .map_err(|e| catalog_error("genre seeds", &e))?;
        serde_json::from_str::<GenreSeeds>(&body)
            .map(|seeds| seeds.genres)
            .map_err(CatalogError::remote)
    }

    async fn related_artists(&self, artist: &SpotifyUri) -> CatalogResult<Vec<SpotifyUri>> {
        self.fresh().await?;
        let related = self
            .oauth
            .client()
            .artist_related_artists(artist_id(artist).map_err(CatalogError::remote)?)
            .await
            .map_err(|e| catalog_error(&artist.to_string(), &e))?;
        Ok(related.iter().filter_map(|a| to_uri(&a.id)).collect())
    }

    async fn top_tracks(
        &self,
        artist: &SpotifyUri,
        country: &str,
    ) -> CatalogResult<Vec<SpotifyUri>> {
        self.fresh().await?;
        let tracks = self
            .oauth
            .client()
            .artist_top_tracks(artist_id(artist).map_err(CatalogError::remote)?, market(country))
            .await
            .map_err(|e| catalog_error(&artist.to_string(), &e))?;
        Ok(to_uris(tracks.iter().map(|t| &t.id)))
    }

    async fn artist_albums(
        &self,
        artist: &SpotifyUri,
        group: Option<AlbumGroup>,
        country: &str,
        limit: u32,
        offset: u32,
    ) -> CatalogResult<Vec<SpotifyUri>> {
        self.fresh().await?;
        let page = self
            .oauth
            .client()
            .artist_albums_manual(
                artist_id(artist).map_err(CatalogError::remote)?,
                group.map(album_type),
                market(country),
                Some(limit),
                Some(offset),
            )
            .await
            .map_err(|e| catalog_error(&artist.to_string(), &e))?;
        Ok(album_uris(&page.items))
    }

    async fn album_tracks(
        &self,
        album: &SpotifyUri,
        limit: u32,
        offset: u32,
    ) -> CatalogResult<Vec<SpotifyUri>> {
        self.fresh().await?;
        let page = self
            .oauth
            .client()
            .album_track_manual(
                album_id(album).map_err(CatalogError::remote)?,
                self.market,
                Some(limit),
                Some(offset),
            )
            .await
            .map_err(|e| catalog_error(&album.to_string(), &e))?;
        Ok(to_uris(page.items.iter().map(|t| &t.id)))
    }

    async fn user_playlists(&self, user: &str) -> CatalogResult<Vec<PlaylistSummary>> {
        // "me" is the authenticated user
        let user_id = match user {
            "me" => None,
            other => Some(
                UserId::from_id(other)
                    .map(UserId::into_static)
                    .map_err(CatalogError::remote)?,
            ),
        };

        self.fresh().await?;
        let mut playlists = Vec::new();
        let mut offset = 0;
        while offset < MAX_PLAYLISTS {
            let page = self
                .playlist_page(user_id.as_ref(), offset)
                .await
                .map_err(|e| catalog_error(user, &e))?;
            let last = page.next.is_none();
            playlists.extend(page.items.into_iter().filter_map(|p| {
                Some(PlaylistSummary {
                    uri: to_uri(&p.id)?,
                    name: p.name,
                })
            }));
            if last {
                break;
            }
            offset += PAGE_SIZE;
        }
        Ok(playlists)
    }

    async fn categories(&self, limit: u32) -> CatalogResult<Vec<String>> {
        self.fresh().await?;
        let page = self
            .oauth
            .client()
            .categories_manual(Some(self.language.as_str()), self.market, Some(limit), None)
            .await
            .map_err(|e| catalog_error("categories", &e))?;
        Ok(page.items.into_iter().map(|c| c.id).collect())
    }

    async fn category_playlists(
        &self,
        category: &str,
        limit: u32,
    ) -> CatalogResult<Vec<SpotifyUri>> {
        self.fresh().await?;
        let page = self
            .oauth
            .client()
            .category_playlists_manual(category, self.market, Some(limit), None)
            .await
            .map_err(|e| catalog_error(category, &e))?;
        Ok(playlist_uris(&page.items))
    }

    async fn featured_playlists(&self, limit: u32) -> CatalogResult<Vec<SpotifyUri>> {
        self.fresh().await?;
        let featured = self
            .oauth
            .client()
            .featured_playlists(
                Some(self.language.as_str()),
                self.market,
                Some(chrono::Utc::now()),
                Some(limit),
                None,
            )
            .await
            .map_err(|e| catalog_error("featured playlists", &e))?;
        Ok(playlist_uris(&featured.playlists.items))
    }

    async fn new_releases(&self, limit: u32) -> CatalogResult<Vec<SpotifyUri>> {
        self.fresh().await?;
        let page = self
            .oauth
            .client()
            .new_releases_manual(self.market, Some(limit), None)
            .await
            .map_err(|e| catalog_error("new releases", &e))?;
        Ok(album_uris(&page.items))
    }

    async fn saved_tracks(&self, limit: u32) -> CatalogResult<Vec<SpotifyUri>> {
        self.fresh().await?;
        let page = self
            .oauth
            .client()
            .current_user_saved_tracks_manual(self.market, Some(limit), None)
            .await
            .map_err(|e| catalog_error("saved tracks", &e))?;
        Ok(to_uris(page.items.iter().map(|saved| &saved.track.id)))
    }
}
