//! The ordered resolution cascade.

use super::Resolver;
use crate::media::{MediaReference, SpotifyUri};
use crate::request::{ResolutionRequest, TrackField};
use tracing::{debug, warn};

/// Tracks requested from recommendation endpoints
const RECOMMENDATION_LIMIT: u32 = 20;

/// One strategy of the cascade. Rules run in [`Rule::CASCADE`] order and the
/// first non-empty result wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rule {
    /// A playlist, track, album or artist named or linked directly
    DirectReference,
    /// Something like the requested track or album
    SimilarTrackOrAlbum,
    Artist,
    Genre,
    Category,
    Featured,
    NewReleases,
    /// The user's own playlists, then their saved tracks
    UserFallback,
}

impl Rule {
    pub const CASCADE: [Self; 8] = [
        Self::DirectReference,
        Self::SimilarTrackOrAlbum,
        Self::Artist,
        Self::Genre,
        Self::Category,
        Self::Featured,
        Self::NewReleases,
        Self::UserFallback,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::DirectReference => "direct_reference",
            Self::SimilarTrackOrAlbum => "similar_track_or_album",
            Self::Artist => "artist",
            Self::Genre => "genre",
            Self::Category => "category",
            Self::Featured => "featured",
            Self::NewReleases => "new_releases",
            Self::UserFallback => "user_fallback",
        }
    }
}

impl Resolver {
    pub(super) async fn run_cascade(
        &self,
        request: &ResolutionRequest,
    ) -> (MediaReference, Option<Rule>) {
        for rule in Rule::CASCADE {
            match self.apply_rule(rule, request).await {
                Some(reference) if !reference.is_empty() => {
                    debug!("Rule {} matched: {}", rule.name(), reference.describe());
                    return (reference, Some(rule));
                }
                _ => debug!("Rule {} yielded nothing", rule.name()),
            }
        }
        (MediaReference::Empty, None)
    }

    /// Evaluate a single rule in isolation.
    pub async fn apply_rule(
        &self,
        rule: Rule,
        request: &ResolutionRequest,
    ) -> Option<MediaReference> {
        match rule {
            Rule::DirectReference => self.direct_reference(request).await,
            Rule::SimilarTrackOrAlbum => self.similar_track_or_album(request).await,
            Rule::Artist => self.artist_rule(request).await,
            Rule::Genre => self.genre_rule(request).await,
            Rule::Category => self.category_rule(request).await,
            Rule::Featured => {
                if !request.featured {
                    return None;
                }
                let mut found = self.featured().await;
                if found.is_empty() {
                    found = self.new_releases().await;
                }
                self.pick(&found, request.random_search)
                    .map(MediaReference::from_uri)
            }
            Rule::NewReleases => {
                if !request.new_releases {
                    return None;
                }
                let mut found = self.new_releases().await;
                if found.is_empty() {
                    found = self.featured().await;
                }
                self.pick(&found, request.random_search)
                    .map(MediaReference::from_uri)
            }
            Rule::UserFallback => {
                let playlists = self.user_playlists(request.username.as_deref(), &[]).await;
                if let Some(playlist) = self.pick(&playlists, request.random_search) {
                    return Some(MediaReference::Playlist(playlist));
                }
                Some(MediaReference::from_tracks(self.saved_tracks().await))
            }
        }
    }

    async fn direct_reference(&self, request: &ResolutionRequest) -> Option<MediaReference> {
        if request.similar {
            return None;
        }
        let artist = request.artist.as_deref();

        if let Some(playlist) = &request.playlist
            && let Some(uri) = self.playlist_uri(playlist, request.username.as_deref()).await
        {
            return Some(MediaReference::Playlist(uri));
        }

        match &request.track {
            Some(TrackField::Many(tracks)) => {
                let uris: Vec<SpotifyUri> = tracks
                    .iter()
                    .filter_map(|track| match SpotifyUri::parse(track) {
                        Ok(uri) => Some(uri),
                        Err(e) => {
                            warn!("Skipping track list entry: {}", e);
                            None
                        }
                    })
                    .collect();
                match MediaReference::track_list(uris) {
                    Ok(reference) => return Some(reference),
                    Err(e) => warn!("Track list rejected: {}", e),
                }
            }
            Some(TrackField::One(track)) => {
                if let Some(uri) = self.track_uri(track, artist).await {
                    return Some(MediaReference::Track(uri));
                }
            }
            None => {}
        }

        if let Some(album) = &request.album
            && let Some(info) = self.album_info(album, artist).await
        {
            return Some(MediaReference::Album(info.uri));
        }

        // Multiple tracks of an artist are handled by the artist rule
        if let Some(name) = artist
            && !request.wants_multiple()
            && let Some(uri) = self.artist_uri(name).await
        {
            if request.random_search
                && let Some(album) = self.pick(&self.albums_of(&uri).await, true)
            {
                return Some(MediaReference::Album(album));
            }
            return Some(MediaReference::Artist(uri));
        }
        None
    }

    async fn similar_track_or_album(&self, request: &ResolutionRequest) -> Option<MediaReference> {
        let genres: Vec<String> = request.genre.iter().cloned().collect();
        let random = request.random_search;

        let track = match &request.track {
            Some(TrackField::One(track)) => Some(track.as_str()),
            Some(TrackField::Many(tracks)) => tracks.first().map(String::as_str),
            None => None,
        };
        if let Some(track) = track {
            let info = self.track_info(track, request.artist.as_deref()).await;
            let (artists, tracks): (Vec<SpotifyUri>, Vec<SpotifyUri>) = match info {
                Some(info) => (info.artist_uri.into_iter().collect(), vec![info.uri]),
                None => match request.artist.as_deref() {
                    Some(artist) => (self.artist_uri(artist).await.into_iter().collect(), vec![]),
                    None => (vec![], vec![]),
                },
            };
            let recommended = self
                .recommend(&artists, &genres, &tracks, RECOMMENDATION_LIMIT)
                .await;
            if let Some(pick) = self.pick(&recommended, random) {
                return Some(MediaReference::Track(pick));
            }
        }

        let album = request.album.as_deref()?;
        let info = self.album_info(album, request.artist.as_deref()).await?;
        let mut seed_artist = info.artist_uri?;
        if random
            && self.coin()
            && let Some(related) = self.related_artist(&seed_artist, true).await
        {
            seed_artist = related;
        }

        let mut albums = self.albums_of(&seed_artist).await;
        if albums.len() > 1 {
            albums.retain(|candidate| *candidate != info.uri);
        }
        if let Some(pick) = self.pick(&albums, random) {
            return Some(MediaReference::Album(pick));
        }

        let recommended = self
            .recommend(&[seed_artist], &genres, &[], RECOMMENDATION_LIMIT)
            .await;
        self.pick(&recommended, random).map(MediaReference::Track)
    }

    async fn artist_rule(&self, request: &ResolutionRequest) -> Option<MediaReference> {
        let mut artist = self.artist_uri(request.artist.as_deref()?).await?;
        let random = request.random_search;
        if request.similar
            && let Some(related) = self.related_artist(&artist, random).await
        {
            artist = related;
        }

        let multiple = request.wants_multiple();
        if !multiple {
            let mut tracks = self.top_tracks(&artist).await;
            if random {
                let limit = tracks.len().max(RECOMMENDATION_LIMIT as usize);
                tracks.extend(self.artist_tracks(&artist, limit, false, true).await);
                self.shuffle(&mut tracks);
            }
            if !tracks.is_empty() {
                return Some(MediaReference::TrackList(tracks));
            }
        }

        let albums = self.albums_of(&artist).await;
        if let Some(album) = self.pick(&albums, random) {
            return Some(MediaReference::Album(album));
        }

        if multiple {
            let tracks = self.top_tracks(&artist).await;
            if !tracks.is_empty() {
                return Some(MediaReference::TrackList(tracks));
            }
        }

        let genres: Vec<String> = request.genre.iter().cloned().collect();
        let recommended = self
            .recommend(&[artist], &genres, &[], RECOMMENDATION_LIMIT)
            .await;
        self.pick(&recommended, random).map(MediaReference::Track)
    }

    async fn genre_rule(&self, request: &ResolutionRequest) -> Option<MediaReference> {
        let genre = request.genre.as_deref()?;
        if self.is_genre_seed(genre).await {
            let artists: Vec<SpotifyUri> = match request.artist.as_deref() {
                Some(artist) => self.artist_uri(artist).await.into_iter().collect(),
                None => vec![],
            };
            let tracks: Vec<SpotifyUri> = match request.track_name() {
                Some(track) => self
                    .track_uri(track, request.artist.as_deref())
                    .await
                    .into_iter()
                    .collect(),
                None => vec![],
            };
            let recommended = self
                .recommend(&artists, &[genre.to_string()], &tracks, RECOMMENDATION_LIMIT)
                .await;
            return Some(MediaReference::from_tracks(recommended));
        }

        // Not a seed genre; try it as a browse category instead
        let playlists = self.category_playlists(genre).await;
        self.pick(&playlists, request.random_search)
            .map(MediaReference::Playlist)
    }

    async fn category_rule(&self, request: &ResolutionRequest) -> Option<MediaReference> {
        let category = request.category.as_deref()?;
        let playlists = self.category_playlists(category).await;
        if let Some(playlist) = self.pick(&playlists, request.random_search) {
            return Some(MediaReference::Playlist(playlist));
        }

        // Not a browse category; try it as a seed genre instead
        let recommended = self
            .recommend(&[], &[category.to_string()], &[], RECOMMENDATION_LIMIT)
            .await;
        Some(MediaReference::from_tracks(recommended))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::PlaylistSummary;
    use crate::resolve::ResolverSettings;
    use crate::testing::{FakeCatalog, album, artist, playlist, track};
    use std::sync::Arc;

    fn resolver(catalog: FakeCatalog) -> (Resolver, Arc<FakeCatalog>) {
        let catalog = Arc::new(catalog);
        (
            Resolver::with_seed(catalog.clone(), ResolverSettings::default(), 3),
            catalog,
        )
    }

    #[test]
    fn test_cascade_order() {
        assert_eq!(Rule::CASCADE[0], Rule::DirectReference);
        assert_eq!(Rule::CASCADE[7], Rule::UserFallback);
        let names: Vec<_> = Rule::CASCADE.iter().map(|r| r.name()).collect();
        assert_eq!(names[3], "genre");
    }

    #[tokio::test]
    async fn test_direct_reference_priority() {
        let mut catalog = FakeCatalog::default();
        catalog.add_track("Creep", &track("creep"), None);
        catalog.add_album("Pablo Honey", &album("pablo"), None, vec![]);
        let (resolver, _) = resolver(catalog);

        let request = ResolutionRequest {
            playlist: Some(playlist("list").to_string()),
            track: Some(TrackField::One("Creep".into())),
            album: Some("Pablo Honey".into()),
            ..ResolutionRequest::default()
        };
        assert_eq!(
            resolver.apply_rule(Rule::DirectReference, &request).await,
            Some(MediaReference::Playlist(playlist("list")))
        );

        let request = ResolutionRequest {
            playlist: None,
            ..request
        };
        assert_eq!(
            resolver.apply_rule(Rule::DirectReference, &request).await,
            Some(MediaReference::Track(track("creep")))
        );

        let request = ResolutionRequest {
            track: Some(TrackField::One("Unknown song".into())),
            ..request
        };
        assert_eq!(
            resolver.apply_rule(Rule::DirectReference, &request).await,
            Some(MediaReference::Album(album("pablo")))
        );

        let similar = ResolutionRequest {
            similar: true,
            ..request
        };
        assert_eq!(resolver.apply_rule(Rule::DirectReference, &similar).await, None);
    }

    #[tokio::test]
    async fn test_track_list_passes_through() {
        let (resolver, _) = resolver(FakeCatalog::default());
        let request = ResolutionRequest {
            track: Some(TrackField::Many(vec![
                track("a").to_string(),
                track("b").to_string(),
            ])),
            ..ResolutionRequest::default()
        };
        assert_eq!(
            resolver.apply_rule(Rule::DirectReference, &request).await,
            Some(MediaReference::TrackList(vec![track("a"), track("b")]))
        );
    }

    #[tokio::test]
    async fn test_similar_track_seeds_artist_and_track() {
        let mut catalog = FakeCatalog::default();
        let a = artist("radiohead");
        catalog.add_track("Creep", &track("creep"), Some(&a));
        catalog.recommended = vec![track("r1"), track("r2")];
        let (resolver, catalog) = resolver(catalog);

        let request = ResolutionRequest {
            track: Some(TrackField::One("Creep".into())),
            genre: Some("alt-rock".into()),
            similar: true,
            ..ResolutionRequest::default()
        };
        let resolution = resolver.resolve(&request).await;
        assert_eq!(resolution.rule, Some(Rule::SimilarTrackOrAlbum));
        assert_eq!(resolution.reference, MediaReference::Track(track("r1")));

        let seeds = &catalog.seeds_seen()[0];
        assert_eq!(seeds.artists, vec![a]);
        assert_eq!(seeds.tracks, vec![track("creep")]);
        assert_eq!(seeds.genres, vec!["alt-rock".to_string()]);
    }

    #[tokio::test]
    async fn test_similar_album_excludes_input_album() {
        let mut catalog = FakeCatalog::default();
        let a = artist("radiohead");
        catalog.add_album("OK Computer", &album("okc"), Some(&a), vec![]);
        catalog
            .artist_albums
            .insert(a.to_string(), vec![album("okc"), album("kida")]);
        let (resolver, _) = resolver(catalog);

        let request = ResolutionRequest {
            album: Some("OK Computer".into()),
            similar: true,
            ..ResolutionRequest::default()
        };
        assert_eq!(
            resolver.apply_rule(Rule::SimilarTrackOrAlbum, &request).await,
            Some(MediaReference::Album(album("kida")))
        );
    }

    #[tokio::test]
    async fn test_artist_rule_top_tracks_then_albums() {
        let mut catalog = FakeCatalog::default();
        let a = artist("muse");
        catalog.add_artist("Muse", &a);
        catalog.top_tracks.insert(a.to_string(), vec![track("t1")]);
        catalog.artist_albums.insert(a.to_string(), vec![album("drones")]);
        let (resolver, _) = resolver(catalog);

        let request = ResolutionRequest {
            artist: Some("Muse".into()),
            ..ResolutionRequest::default()
        };
        assert_eq!(
            resolver.apply_rule(Rule::Artist, &request).await,
            Some(MediaReference::TrackList(vec![track("t1")]))
        );

        let request = ResolutionRequest {
            multiple: true,
            ..request
        };
        assert_eq!(
            resolver.apply_rule(Rule::Artist, &request).await,
            Some(MediaReference::Album(album("drones")))
        );
    }

    #[tokio::test]
    async fn test_genre_and_category_fall_back_to_each_other() {
        let mut catalog = FakeCatalog::default();
        catalog.genre_seeds = vec!["jazz".into()];
        catalog.categories = vec!["chill".into()];
        catalog
            .category_playlists
            .insert("chill".into(), vec![playlist("chill")]);
        catalog.recommended = vec![track("r1")];
        let (resolver, catalog) = resolver(catalog);

        // seed genre: recommendations
        let request = ResolutionRequest {
            genre: Some("jazz".into()),
            ..ResolutionRequest::default()
        };
        assert_eq!(
            resolver.apply_rule(Rule::Genre, &request).await,
            Some(MediaReference::TrackList(vec![track("r1")]))
        );

        // genre that is really a category
        let request = ResolutionRequest {
            genre: Some("chill".into()),
            ..ResolutionRequest::default()
        };
        assert_eq!(
            resolver.apply_rule(Rule::Genre, &request).await,
            Some(MediaReference::Playlist(playlist("chill")))
        );

        // category that is really a genre
        let request = ResolutionRequest {
            category: Some("jazz".into()),
            ..ResolutionRequest::default()
        };
        assert_eq!(
            resolver.apply_rule(Rule::Category, &request).await,
            Some(MediaReference::TrackList(vec![track("r1")]))
        );
        assert_eq!(catalog.seeds_seen().last().unwrap().genres, vec!["jazz".to_string()]);
    }

    #[tokio::test]
    async fn test_featured_and_new_releases_swap_fallbacks() {
        let mut catalog = FakeCatalog::default();
        catalog.new_releases = vec![album("fresh")];
        let (resolver, _) = resolver(catalog);

        let featured = ResolutionRequest {
            featured: true,
            ..ResolutionRequest::default()
        };
        assert_eq!(
            resolver.apply_rule(Rule::Featured, &featured).await,
            Some(MediaReference::Album(album("fresh")))
        );
        assert_eq!(resolver.apply_rule(Rule::NewReleases, &featured).await, None);
    }

    #[tokio::test]
    async fn test_user_fallback_prefers_playlists_over_saved() {
        let mut catalog = FakeCatalog::default();
        catalog.saved = vec![track("saved")];
        let (resolver, _) = resolver(catalog);
        assert_eq!(
            resolver.resolve(&ResolutionRequest::default()).await.reference,
            MediaReference::TrackList(vec![track("saved")])
        );

        let mut catalog = FakeCatalog::default();
        catalog.saved = vec![track("saved")];
        catalog.user_playlists.insert(
            "me".into(),
            vec![PlaylistSummary {
                uri: playlist("mine"),
                name: "Mine".into(),
            }],
        );
        let (resolver, _) = self::resolver(catalog);
        let resolution = resolver.resolve(&ResolutionRequest::default()).await;
        assert_eq!(resolution.rule, Some(Rule::UserFallback));
        assert_eq!(resolution.reference, MediaReference::Playlist(playlist("mine")));
    }
}
