//! Catalog lookups that degrade to "nothing" instead of failing.
//!
//! Every rule of the cascade treats a missing entity the same way as an
//! empty result, so errors stop here and are only logged.

use super::Resolver;
use crate::catalog::{
    AlbumInfo, CatalogError, CatalogResult, PlaylistInfo, RecommendationSeeds, TrackInfo,
};
use crate::media::{SpotifyUri, UriKind, is_spotify_uri};
use tracing::{debug, warn};

/// Upper bound on combined recommendation seeds
const MAX_SEEDS: usize = 5;
/// Page size for listings
const PAGE_LIMIT: u32 = 50;

fn settle<T>(context: &str, result: CatalogResult<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(CatalogError::NotFound { query }) => {
            debug!("{}: nothing found for {}", context, query);
            None
        }
        Err(e) => {
            warn!("{}: {}", context, e);
            None
        }
    }
}

fn settle_list<T>(context: &str, result: CatalogResult<Vec<T>>) -> Vec<T> {
    settle(context, result).unwrap_or_default()
}

impl Resolver {
    pub(super) async fn track_info(&self, track: &str, artist: Option<&str>) -> Option<TrackInfo> {
        settle("Track lookup", self.catalog.lookup_track(track, artist).await)
    }

    /// A track uri as-is, or the best catalog match for a track name.
    pub(super) async fn track_uri(&self, track: &str, artist: Option<&str>) -> Option<SpotifyUri> {
        if is_spotify_uri(track, &[UriKind::Track]) {
            return SpotifyUri::parse(track).ok();
        }
        self.track_info(track, artist).await.map(|info| info.uri)
    }

    pub(super) async fn album_info(&self, album: &str, artist: Option<&str>) -> Option<AlbumInfo> {
        settle("Album lookup", self.catalog.lookup_album(album, artist).await)
    }

    /// The artist behind an artist uri, a track or album uri, or an artist name.
    pub(super) async fn artist_uri(&self, reference: &str) -> Option<SpotifyUri> {
        match SpotifyUri::parse(reference).map(|uri| (uri.kind(), uri)) {
            Ok((UriKind::Artist, uri)) => Some(uri),
            Ok((UriKind::Track, _)) => self.track_info(reference, None).await?.artist_uri,
            Ok((UriKind::Album, _)) => self.album_info(reference, None).await?.artist_uri,
            Ok((UriKind::Playlist, _)) => None,
            Err(_) => settle("Artist lookup", self.catalog.lookup_artist(reference).await)
                .map(|info| info.uri),
        }
    }

    /// A playlist uri as-is, or the first playlist of the user with that name.
    pub(super) async fn playlist_uri(
        &self,
        playlist: &str,
        user: Option<&str>,
    ) -> Option<SpotifyUri> {
        if is_spotify_uri(playlist, &[UriKind::Playlist]) {
            return SpotifyUri::parse(playlist).ok();
        }
        self.user_playlists(user, &[playlist.to_string()])
            .await
            .into_iter()
            .next()
    }

    pub(super) async fn playlist_info(&self, playlist: &SpotifyUri) -> Option<PlaylistInfo> {
        settle("Playlist lookup", self.catalog.lookup_playlist(playlist).await)
    }

    pub(super) async fn top_tracks(&self, artist: &SpotifyUri) -> Vec<SpotifyUri> {
        settle_list(
            "Top tracks",
            self.catalog.top_tracks(artist, &self.settings.country).await,
        )
    }

    pub(super) async fn related_artist(
        &self,
        artist: &SpotifyUri,
        random: bool,
    ) -> Option<SpotifyUri> {
        let related = settle_list("Related artists", self.catalog.related_artists(artist).await);
        self.pick(&related, random)
    }

    pub(super) async fn albums_of(&self, artist: &SpotifyUri) -> Vec<SpotifyUri> {
        settle_list(
            "Artist albums",
            self.catalog
                .artist_albums(artist, None, &self.settings.country, PAGE_LIMIT, 0)
                .await,
        )
    }

    pub(super) async fn album_tracks(&self, album: &SpotifyUri) -> Vec<SpotifyUri> {
        settle_list(
            "Album tracks",
            self.catalog.album_tracks(album, PAGE_LIMIT, 0).await,
        )
    }

    /// Up to `limit` tracks by `artist`: walked through its albums, or when
    /// `similar` is set, one top track from each related artist.
    pub(super) async fn artist_tracks(
        &self,
        artist: &SpotifyUri,
        limit: usize,
        similar: bool,
        random: bool,
    ) -> Vec<SpotifyUri> {
        let mut tracks = Vec::new();
        if similar {
            let mut related =
                settle_list("Related artists", self.catalog.related_artists(artist).await);
            if random {
                self.shuffle(&mut related);
            }
            for other in &related {
                if tracks.len() >= limit {
                    break;
                }
                if let Some(track) = self.pick(&self.top_tracks(other).await, random) {
                    tracks.push(track);
                }
            }
        } else {
            let mut albums = self.albums_of(artist).await;
            if random {
                self.shuffle(&mut albums);
            }
            for album in &albums {
                if tracks.len() >= limit {
                    break;
                }
                tracks.extend(self.album_tracks(album).await);
            }
        }
        tracks.truncate(limit);
        tracks
    }

    /// Recommendations for the given seeds. No seeds means no recommendations.
    pub(super) async fn recommend(
        &self,
        artists: &[SpotifyUri],
        genres: &[String],
        tracks: &[SpotifyUri],
        limit: u32,
    ) -> Vec<SpotifyUri> {
        let mut budget = MAX_SEEDS;
        let mut take = |count: usize| {
            let taken = count.min(budget);
            budget -= taken;
            taken
        };
        let seeds = RecommendationSeeds {
            artists: artists[..take(artists.len())].to_vec(),
            genres: genres[..take(genres.len())].to_vec(),
            tracks: tracks[..take(tracks.len())].to_vec(),
        };
        if seeds.is_empty() {
            return Vec::new();
        }
        settle_list(
            "Recommendations",
            self.catalog.recommendations(&seeds, limit).await,
        )
    }

    pub(super) async fn is_genre_seed(&self, genre: &str) -> bool {
        settle_list("Genre seeds", self.catalog.genre_seeds().await)
            .iter()
            .any(|seed| seed.eq_ignore_ascii_case(genre))
    }

    /// Playlists of `user` (alias mapped, default user when absent), keeping
    /// only those named in `include` when it is non-empty.
    pub(super) async fn user_playlists(
        &self,
        user: Option<&str>,
        include: &[String],
    ) -> Vec<SpotifyUri> {
        let user = user.unwrap_or(&self.settings.default_user);
        let user = self
            .settings
            .user_aliases
            .get(user)
            .map_or(user, String::as_str);
        settle_list(
            "User playlists",
            self.catalog.playlists_of(user, include, &[]).await,
        )
    }

    /// Playlists of a browse category. Unknown categories yield nothing.
    pub(super) async fn category_playlists(&self, category: &str) -> Vec<SpotifyUri> {
        let known = settle_list("Categories", self.catalog.categories(PAGE_LIMIT).await);
        let Some(category) = known.iter().find(|c| c.eq_ignore_ascii_case(category)) else {
            debug!("\"{}\" is not a browse category", category);
            return Vec::new();
        };
        settle_list(
            "Category playlists",
            self.catalog.category_playlists(category, PAGE_LIMIT).await,
        )
    }

    pub(super) async fn featured(&self) -> Vec<SpotifyUri> {
        settle_list("Featured playlists", self.catalog.featured_playlists(PAGE_LIMIT).await)
    }

    pub(super) async fn new_releases(&self) -> Vec<SpotifyUri> {
        settle_list("New releases", self.catalog.new_releases(PAGE_LIMIT).await)
    }

    pub(super) async fn saved_tracks(&self) -> Vec<SpotifyUri> {
        settle_list("Saved tracks", self.catalog.saved_tracks(PAGE_LIMIT).await)
    }
}
