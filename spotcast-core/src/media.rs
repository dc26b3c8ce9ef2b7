//! Spotify URIs and the playable references built from them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Length of the base62 id part of a Spotify URI
pub const SPOTIFY_ID_LEN: usize = 22;

const URI_SCHEME: &str = "spotify";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediaError {
    /// The string does not have the `spotify:<kind>:<id>` shape
    #[error("Invalid Spotify uri: \"{uri}\"")]
    InvalidUri { uri: String },

    /// The uri is well formed but of a kind the caller cannot use here
    #[error("Expected a {expected} uri, got \"{uri}\"")]
    WrongKind { uri: String, expected: UriKind },

    #[error("A track list must contain at least one track")]
    EmptyTrackList,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UriKind {
    Track,
    Playlist,
    Artist,
    Album,
}

impl UriKind {
    pub const ALL: [Self; 4] = [Self::Track, Self::Playlist, Self::Artist, Self::Album];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Track => "track",
            Self::Playlist => "playlist",
            Self::Artist => "artist",
            Self::Album => "album",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == value)
    }
}

impl fmt::Display for UriKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated `spotify:<kind>:<id>` uri.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SpotifyUri {
    kind: UriKind,
    id: String,
}

impl SpotifyUri {
    /// Parse and validate a uri of any supported kind.
    ///
    /// # Errors
    ///
    /// Returns [`MediaError::InvalidUri`] unless the input splits into exactly
    /// three colon separated parts: `spotify`, a known kind and a 22 character id.
    pub fn parse(uri: &str) -> Result<Self, MediaError> {
        let invalid = || MediaError::InvalidUri {
            uri: uri.to_string(),
        };
        let parts: Vec<&str> = uri.split(':').collect();
        let [scheme, kind, id] = parts.as_slice() else {
            return Err(invalid());
        };
        if *scheme != URI_SCHEME || id.chars().count() != SPOTIFY_ID_LEN {
            return Err(invalid());
        }
        let kind = UriKind::parse(kind).ok_or_else(invalid)?;
        Ok(Self {
            kind,
            id: (*id).to_string(),
        })
    }

    /// Parse a uri and require a specific kind.
    ///
    /// # Errors
    ///
    /// Returns an error if the uri is malformed or of another kind.
    pub fn parse_kind(uri: &str, expected: UriKind) -> Result<Self, MediaError> {
        let parsed = Self::parse(uri)?;
        if parsed.kind == expected {
            Ok(parsed)
        } else {
            Err(MediaError::WrongKind {
                uri: uri.to_string(),
                expected,
            })
        }
    }

    /// Build a uri from a bare id, validating the id length.
    ///
    /// # Errors
    ///
    /// Returns [`MediaError::InvalidUri`] if the id is not 22 characters.
    pub fn from_id(kind: UriKind, id: &str) -> Result<Self, MediaError> {
        Self::parse(&format!("{URI_SCHEME}:{kind}:{id}"))
    }

    #[must_use]
    pub const fn kind(&self) -> UriKind {
        self.kind
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn is(&self, kind: UriKind) -> bool {
        self.kind == kind
    }
}

impl fmt::Display for SpotifyUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{URI_SCHEME}:{}:{}", self.kind, self.id)
    }
}

impl FromStr for SpotifyUri {
    type Err = MediaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for SpotifyUri {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SpotifyUri {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// True iff `uri` is a Spotify uri whose kind is one of `kinds`.
/// An empty `kinds` slice accepts any supported kind.
#[must_use]
pub fn is_spotify_uri(uri: &str, kinds: &[UriKind]) -> bool {
    SpotifyUri::parse(uri).is_ok_and(|parsed| kinds.is_empty() || kinds.contains(&parsed.kind))
}

/// Heuristic used on name-or-uri fields: anything starting with the scheme is
/// treated as a uri and must validate, everything else is a search name.
#[must_use]
pub fn looks_like_uri(value: &str) -> bool {
    value.starts_with("spotify:")
}

/// Where to start inside a playable reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayOffset {
    /// Zero based index into the track list or context
    Position(u32),
    /// A track uri inside the track list or context
    Uri(SpotifyUri),
}

/// The outcome of resolution: what to hand to the playback service.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "uri", rename_all = "snake_case")]
pub enum MediaReference {
    Track(SpotifyUri),
    TrackList(Vec<SpotifyUri>),
    Playlist(SpotifyUri),
    Album(SpotifyUri),
    Artist(SpotifyUri),
    #[default]
    Empty,
}

impl MediaReference {
    /// Wrap a single uri in the matching variant.
    #[must_use]
    pub fn from_uri(uri: SpotifyUri) -> Self {
        match uri.kind() {
            UriKind::Track => Self::Track(uri),
            UriKind::Playlist => Self::Playlist(uri),
            UriKind::Album => Self::Album(uri),
            UriKind::Artist => Self::Artist(uri),
        }
    }

    /// Build a track list.
    ///
    /// # Errors
    ///
    /// Rejects an empty list and any entry that is not a track uri.
    pub fn track_list(tracks: Vec<SpotifyUri>) -> Result<Self, MediaError> {
        if tracks.is_empty() {
            return Err(MediaError::EmptyTrackList);
        }
        if let Some(bad) = tracks.iter().find(|uri| !uri.is(UriKind::Track)) {
            return Err(MediaError::WrongKind {
                uri: bad.to_string(),
                expected: UriKind::Track,
            });
        }
        Ok(Self::TrackList(tracks))
    }

    /// Collapse a list of tracks: none is `Empty`, otherwise a track list.
    #[must_use]
    pub fn from_tracks(tracks: Vec<SpotifyUri>) -> Self {
        Self::track_list(tracks).unwrap_or_default()
    }

    /// Validate the invariants a reference must satisfy before a remote call.
    ///
    /// # Errors
    ///
    /// Returns an error for `Empty`, for an empty or mixed track list, and
    /// for a uri stored under a variant of another kind.
    pub fn validate(&self) -> Result<(), MediaError> {
        let check = |uri: &SpotifyUri, kind: UriKind| {
            if uri.is(kind) {
                Ok(())
            } else {
                Err(MediaError::WrongKind {
                    uri: uri.to_string(),
                    expected: kind,
                })
            }
        };
        match self {
            Self::Track(uri) => check(uri, UriKind::Track),
            Self::TrackList(tracks) => {
                if tracks.is_empty() {
                    return Err(MediaError::EmptyTrackList);
                }
                tracks.iter().try_for_each(|uri| check(uri, UriKind::Track))
            }
            Self::Playlist(uri) => check(uri, UriKind::Playlist),
            Self::Album(uri) => check(uri, UriKind::Album),
            Self::Artist(uri) => check(uri, UriKind::Artist),
            Self::Empty => Err(MediaError::InvalidUri { uri: String::new() }),
        }
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Tracks and track lists are played as a uri list, everything else as a context.
    #[must_use]
    pub const fn is_track_based(&self) -> bool {
        matches!(self, Self::Track(_) | Self::TrackList(_))
    }

    /// Artists are the only references that never take an offset.
    #[must_use]
    pub const fn accepts_offset(&self) -> bool {
        !matches!(self, Self::Artist(_) | Self::Empty)
    }

    /// The single uri behind a non-list reference.
    #[must_use]
    pub const fn uri(&self) -> Option<&SpotifyUri> {
        match self {
            Self::Track(uri) | Self::Playlist(uri) | Self::Album(uri) | Self::Artist(uri) => {
                Some(uri)
            }
            Self::TrackList(_) | Self::Empty => None,
        }
    }

    /// Short human readable description for logs.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::TrackList(tracks) => format!("{} tracks", tracks.len()),
            Self::Empty => "nothing".to_string(),
            other => other
                .uri()
                .map_or_else(String::new, ToString::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "4uLU6hMCjMI75M1A2tKUQC";

    #[test]
    fn test_parse_valid_uri() {
        let uri = SpotifyUri::parse(&format!("spotify:track:{ID}")).unwrap();
        assert_eq!(uri.kind(), UriKind::Track);
        assert_eq!(uri.id(), ID);
        assert_eq!(uri.to_string(), format!("spotify:track:{ID}"));
    }

    #[test]
    fn test_is_spotify_uri_shape() {
        assert!(is_spotify_uri(&format!("spotify:album:{ID}"), &[UriKind::Album]));
        assert!(is_spotify_uri(&format!("spotify:album:{ID}"), &[]));
        assert!(!is_spotify_uri(&format!("spotify:album:{ID}"), &[UriKind::Track]));
        // id too short / too long
        assert!(!is_spotify_uri("spotify:track:abc", &[]));
        assert!(!is_spotify_uri(&format!("spotify:track:{ID}x"), &[]));
        // wrong part count and scheme
        assert!(!is_spotify_uri(&format!("spotify:user:me:track:{ID}"), &[]));
        assert!(!is_spotify_uri(&format!("track:{ID}"), &[]));
        assert!(!is_spotify_uri(&format!("youtube:track:{ID}"), &[]));
        assert!(!is_spotify_uri(&format!("spotify:show:{ID}"), &[]));
    }

    #[test]
    fn test_parse_kind_mismatch() {
        let err =
            SpotifyUri::parse_kind(&format!("spotify:artist:{ID}"), UriKind::Album).unwrap_err();
        assert!(matches!(err, MediaError::WrongKind { expected: UriKind::Album, .. }));
    }

    #[test]
    fn test_track_list_rejects_empty_and_mixed() {
        assert_eq!(MediaReference::track_list(vec![]), Err(MediaError::EmptyTrackList));
        let album = SpotifyUri::from_id(UriKind::Album, ID).unwrap();
        let track = SpotifyUri::from_id(UriKind::Track, ID).unwrap();
        assert!(MediaReference::track_list(vec![track.clone(), album]).is_err());
        assert_eq!(
            MediaReference::track_list(vec![track.clone()]),
            Ok(MediaReference::TrackList(vec![track]))
        );
    }

    #[test]
    fn test_offset_acceptance() {
        let artist = SpotifyUri::from_id(UriKind::Artist, ID).unwrap();
        let playlist = SpotifyUri::from_id(UriKind::Playlist, ID).unwrap();
        assert!(!MediaReference::Artist(artist).accepts_offset());
        assert!(MediaReference::Playlist(playlist).accepts_offset());
        assert!(MediaReference::Empty.validate().is_err());
    }

    #[test]
    fn test_uri_serde_validates() {
        let ok: SpotifyUri = serde_json::from_str(&format!("\"spotify:playlist:{ID}\"")).unwrap();
        assert!(ok.is(UriKind::Playlist));
        assert!(serde_json::from_str::<SpotifyUri>("\"spotify:playlist:short\"").is_err());
    }
}
