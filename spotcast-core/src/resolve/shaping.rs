//! Cardinality shaping and start offsets for a resolved reference.

use super::Resolver;
use crate::media::{MediaReference, PlayOffset, SpotifyUri};
use crate::request::ResolutionRequest;
use tracing::debug;

/// Recommendations appended when expanding a single track
const EXPANSION_SIZE: u32 = 10;

impl Resolver {
    /// Apply `single`, then `multiple`, then the requested count. The first
    /// one set wins.
    pub(super) async fn shape(
        &self,
        request: &ResolutionRequest,
        reference: MediaReference,
    ) -> MediaReference {
        if reference.is_empty() {
            return reference;
        }
        if request.single {
            return self.reduce_to_single(reference, request.random_search).await;
        }
        if request.wants_multiple() {
            return self.expand_track(reference).await;
        }
        match request.effective_count() {
            0 => reference,
            count => self.fit_count(request, reference, count as usize).await,
        }
    }

    /// Descend to exactly one track, picking at each level.
    async fn reduce_to_single(&self, reference: MediaReference, random: bool) -> MediaReference {
        let picked = match &reference {
            MediaReference::Track(_) | MediaReference::Empty => return reference,
            MediaReference::TrackList(tracks) => self.pick(tracks, random),
            MediaReference::Playlist(uri) => match self.playlist_info(uri).await {
                Some(info) => self.pick(&info.tracks, random),
                None => None,
            },
            MediaReference::Album(uri) => self.pick(&self.album_tracks(uri).await, random),
            MediaReference::Artist(uri) => match self.pick(&self.albums_of(uri).await, random) {
                Some(album) => self.pick(&self.album_tracks(&album).await, random),
                None => None,
            },
        };
        match picked {
            Some(track) => MediaReference::Track(track),
            None => {
                debug!("No single track found in {}", reference.describe());
                reference
            }
        }
    }

    /// A bare track becomes that track followed by tracks recommended from it.
    async fn expand_track(&self, reference: MediaReference) -> MediaReference {
        let MediaReference::Track(track) = reference else {
            return reference;
        };
        let recommended = self
            .recommend(&[], &[], std::slice::from_ref(&track), EXPANSION_SIZE)
            .await;
        let mut tracks = vec![track];
        for candidate in recommended {
            if !tracks.contains(&candidate) {
                tracks.push(candidate);
            }
        }
        MediaReference::TrackList(tracks)
    }

    /// Sample down to `count` tracks, or pad with tracks of a seed artist and
    /// then recommendations. Padding is best effort.
    async fn fit_count(
        &self,
        request: &ResolutionRequest,
        reference: MediaReference,
        count: usize,
    ) -> MediaReference {
        let random = request.random_search;
        let mut tracks = self.tracks_of(&reference).await;
        if tracks.len() >= count {
            if random {
                return MediaReference::TrackList(self.sample(&tracks, count));
            }
            tracks.truncate(count);
            return MediaReference::TrackList(tracks);
        }

        if let Some(artist) = self.seed_artist(&reference, &tracks, random).await {
            for similar in [request.similar, !request.similar] {
                if tracks.len() >= count {
                    break;
                }
                let more = self
                    .artist_tracks(&artist, count - tracks.len(), similar, random)
                    .await;
                append_unique(&mut tracks, more);
            }
            if tracks.len() < count {
                let seed_tracks: Vec<SpotifyUri> = tracks.iter().take(4).cloned().collect();
                let missing = u32::try_from(count - tracks.len()).unwrap_or(u32::MAX);
                let more = self
                    .recommend(std::slice::from_ref(&artist), &[], &seed_tracks, missing)
                    .await;
                append_unique(&mut tracks, more);
            }
        }
        tracks.truncate(count);
        if tracks.len() < count {
            debug!("Only found {} of {} requested tracks", tracks.len(), count);
        }
        if tracks.is_empty() {
            reference
        } else {
            MediaReference::TrackList(tracks)
        }
    }

    /// Tracks currently behind a reference. An artist starts from its top
    /// tracks, which are what padding from that artist would add first anyway.
    async fn tracks_of(&self, reference: &MediaReference) -> Vec<SpotifyUri> {
        match reference {
            MediaReference::Track(track) => vec![track.clone()],
            MediaReference::TrackList(tracks) => tracks.clone(),
            MediaReference::Playlist(uri) => self
                .playlist_info(uri)
                .await
                .map(|info| info.tracks)
                .unwrap_or_default(),
            MediaReference::Album(uri) => self.album_tracks(uri).await,
            MediaReference::Artist(uri) => self.top_tracks(uri).await,
            MediaReference::Empty => Vec::new(),
        }
    }

    async fn seed_artist(
        &self,
        reference: &MediaReference,
        tracks: &[SpotifyUri],
        random: bool,
    ) -> Option<SpotifyUri> {
        match reference {
            MediaReference::Artist(uri) => Some(uri.clone()),
            MediaReference::Album(uri) => self.artist_uri(&uri.to_string()).await,
            _ => self.artist_uri(&self.pick(tracks, random)?.to_string()).await,
        }
    }

    /// Random start position, for references that can start mid-way.
    pub(super) async fn random_offset(&self, reference: &MediaReference) -> Option<PlayOffset> {
        let total = match reference {
            MediaReference::TrackList(tracks) => u32::try_from(tracks.len()).ok()?,
            MediaReference::Playlist(uri) => self.playlist_info(uri).await?.total_tracks,
            MediaReference::Album(uri) => {
                self.album_info(&uri.to_string(), None).await?.total_tracks
            }
            MediaReference::Track(_) | MediaReference::Artist(_) | MediaReference::Empty => {
                return None;
            }
        };
        (total > 0).then(|| PlayOffset::Position(self.index_below(total)))
    }
}

fn append_unique(tracks: &mut Vec<SpotifyUri>, more: Vec<SpotifyUri>) {
    for track in more {
        if !tracks.contains(&track) {
            tracks.push(track);
        }
    }
}
