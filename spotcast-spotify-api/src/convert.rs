//! Conversions between domain uris and rspotify ids.

use rspotify::ClientError;
use rspotify::http::HttpError;
use rspotify::model::{
    AlbumId, ArtistId, Country, IdError, Market, PlayContextId, PlayableId, PlaylistId, RepeatState,
    TrackId,
};
use rspotify::prelude::*;
use spotcast_core::{CatalogError, MediaReference, PlaybackError, RepeatMode, SpotifyUri};
use tracing::warn;

pub fn track_id(uri: &SpotifyUri) -> Result<TrackId<'static>, IdError> {
    TrackId::from_id(uri.id()).map(TrackId::into_static)
}

pub fn album_id(uri: &SpotifyUri) -> Result<AlbumId<'static>, IdError> {
    AlbumId::from_id(uri.id()).map(AlbumId::into_static)
}

pub fn artist_id(uri: &SpotifyUri) -> Result<ArtistId<'static>, IdError> {
    ArtistId::from_id(uri.id()).map(ArtistId::into_static)
}

pub fn playlist_id(uri: &SpotifyUri) -> Result<PlaylistId<'static>, IdError> {
    PlaylistId::from_id(uri.id()).map(PlaylistId::into_static)
}

/// Domain uri of an rspotify id; ids of unsupported kinds are dropped.
pub fn to_uri(id: &impl Id) -> Option<SpotifyUri> {
    SpotifyUri::parse(&id.uri()).ok()
}

pub fn to_uris<'a, I, T>(ids: I) -> Vec<SpotifyUri>
where
    I: IntoIterator<Item = &'a Option<T>>,
    T: Id + 'a,
{
    ids.into_iter().flatten().filter_map(to_uri).collect()
}

/// Market for a two letter country code
pub fn market(country: &str) -> Option<Market> {
    // Country codes are the serde names of the enum variants
    match serde_json::from_value::<Country>(serde_json::Value::String(country.to_string())) {
        Ok(country) => Some(Market::Country(country)),
        Err(_) => {
            warn!("Unknown market \"{}\", searching without one", country);
            None
        }
    }
}

/// Playback context of a reference, `None` for track based references.
pub fn play_context(reference: &MediaReference) -> Result<Option<PlayContextId<'static>>, IdError> {
    Ok(match reference {
        MediaReference::Album(uri) => Some(PlayContextId::Album(album_id(uri)?)),
        MediaReference::Artist(uri) => Some(PlayContextId::Artist(artist_id(uri)?)),
        MediaReference::Playlist(uri) => Some(PlayContextId::Playlist(playlist_id(uri)?)),
        MediaReference::Track(_) | MediaReference::TrackList(_) | MediaReference::Empty => None,
    })
}

pub fn playable_ids(reference: &MediaReference) -> Result<Vec<PlayableId<'static>>, IdError> {
    let tracks: &[SpotifyUri] = match reference {
        MediaReference::Track(uri) => std::slice::from_ref(uri),
        MediaReference::TrackList(tracks) => tracks,
        _ => &[],
    };
    tracks
        .iter()
        .map(|uri| track_id(uri).map(PlayableId::Track))
        .collect()
}

pub const fn repeat_state(mode: RepeatMode) -> RepeatState {
    match mode {
        RepeatMode::Track => RepeatState::Track,
        RepeatMode::Context => RepeatState::Context,
        RepeatMode::Off => RepeatState::Off,
    }
}

pub const fn repeat_mode(state: RepeatState) -> RepeatMode {
    match state {
        RepeatState::Track => RepeatMode::Track,
        RepeatState::Context => RepeatMode::Context,
        RepeatState::Off => RepeatMode::Off,
    }
}

/// HTTP status of a failed Web API call, if the server answered at all
pub fn status_code(err: &ClientError) -> Option<u16> {
    match err {
        ClientError::Http(http) => match http.as_ref() {
            HttpError::StatusCode(response) => Some(response.status().as_u16()),
            _ => None,
        },
        _ => None,
    }
}

pub fn catalog_error(query: &str, err: &ClientError) -> CatalogError {
    if status_code(err) == Some(404) {
        CatalogError::not_found(query)
    } else {
        CatalogError::remote(err)
    }
}

/// Playback calls naming a device answer 404 when the id is stale.
pub fn playback_error(device_id: Option<&str>, err: &ClientError) -> PlaybackError {
    match (device_id, status_code(err)) {
        (Some(device_id), Some(404)) => PlaybackError::DeviceNotFound {
            device_id: device_id.to_string(),
        },
        _ => PlaybackError::remote(err),
    }
}
