//! Spotify Connect playback control.

use crate::convert::{
    play_context, playable_ids, playback_error, repeat_mode, repeat_state, to_uri,
};
use crate::oauth::SpotifyOAuth;
use async_trait::async_trait;
use rspotify::model::{Offset, PlayableItem};
use rspotify::prelude::*;
use spotcast_core::{
    MediaReference, PlayOffset, PlaybackError, PlaybackResult, PlaybackService, PlaybackState,
    RemoteDevice, RepeatMode, SpotifyUri,
};
use std::sync::Arc;
use tracing::debug;

/// [`PlaybackService`] over the Web API player endpoints.
pub struct SpotifyPlayback {
    oauth: Arc<SpotifyOAuth>,
}

impl SpotifyPlayback {
    #[must_use]
    pub const fn new(oauth: Arc<SpotifyOAuth>) -> Self {
        Self { oauth }
    }

    async fn fresh(&self) -> PlaybackResult<()> {
        self.oauth
            .ensure_token_fresh()
            .await
            .map_err(PlaybackError::remote)
    }
}

fn offset(offset: Option<&PlayOffset>) -> Option<Offset> {
    offset.map(|offset| match offset {
        PlayOffset::Position(index) => {
            Offset::Position(chrono::Duration::milliseconds(i64::from(*index)))
        }
        PlayOffset::Uri(uri) => Offset::Uri(uri.to_string()),
    })
}

fn invalid(reference: &MediaReference, reason: impl ToString) -> PlaybackError {
    PlaybackError::InvalidReference {
        reason: format!("{}: {}", reference.describe(), reason.to_string()),
    }
}

fn item_uri(item: Option<&PlayableItem>) -> Option<SpotifyUri> {
    match item? {
        PlayableItem::Track(track) => track.id.as_ref().and_then(to_uri),
        PlayableItem::Episode(_) => None,
    }
}

fn volume(percent: Option<u32>) -> Option<u8> {
    percent.and_then(|p| u8::try_from(p.min(100)).ok())
}

fn millis(duration: chrono::Duration) -> u64 {
    u64::try_from(duration.num_milliseconds()).unwrap_or(0)
}

#[async_trait]
impl PlaybackService for SpotifyPlayback {
    async fn list_devices(&self) -> PlaybackResult<Vec<RemoteDevice>> {
        self.fresh().await?;
        let devices = self
            .oauth
            .client()
            .device()
            .await
            .map_err(|e| playback_error(None, &e))?;
        Ok(devices
            .into_iter()
            .filter_map(|device| {
                Some(RemoteDevice {
                    id: device.id?,
                    name: device.name,
                    volume_percent: volume(device.volume_percent),
                    is_active: device.is_active,
                })
            })
            .collect())
    }

    async fn start_playback(
        &self,
        device_id: &str,
        reference: &MediaReference,
        offset_at: Option<&PlayOffset>,
    ) -> PlaybackResult<()> {
        reference.validate().map_err(|e| invalid(reference, e))?;
        let offset_at = offset_at.filter(|_| reference.accepts_offset());
        debug!(
            "Starting {} on device {} (offset {:?})",
            reference.describe(),
            device_id,
            offset_at
        );

        let context = play_context(reference).map_err(|e| invalid(reference, e))?;
        self.fresh().await?;
        let client = self.oauth.client();
        let result = if let Some(context) = context {
            client
                .start_context_playback(context, Some(device_id), offset(offset_at), None)
                .await
        } else {
            let uris = playable_ids(reference).map_err(|e| invalid(reference, e))?;
            client
                .start_uris_playback(uris, Some(device_id), offset(offset_at), None)
                .await
        };
        result.map_err(|e| playback_error(Some(device_id), &e))
    }

    async fn transfer_playback(&self, device_id: &str, force_play: bool) -> PlaybackResult<()> {
        self.fresh().await?;
        self.oauth
            .client()
            .transfer_playback(device_id, Some(force_play))
            .await
            .map_err(|e| playback_error(Some(device_id), &e))
    }

    async fn current_playback(&self) -> PlaybackResult<Option<PlaybackState>> {
        self.fresh().await?;
        let Some(context) = self
            .oauth
            .client()
            .current_playback(None, None::<Vec<_>>)
            .await
            .map_err(|e| playback_error(None, &e))?
        else {
            return Ok(None);
        };

        let device = RemoteDevice {
            id: context.device.id.clone().unwrap_or_default(),
            name: context.device.name.clone(),
            volume_percent: volume(context.device.volume_percent),
            is_active: context.device.is_active,
        };
        Ok(Some(PlaybackState {
            device,
            context_uri: context
                .context
                .as_ref()
                .and_then(|c| SpotifyUri::parse(&c.uri).ok()),
            item_uri: item_uri(context.item.as_ref()),
            progress_ms: context.progress.map_or(0, millis),
            shuffle: context.shuffle_state,
            repeat: repeat_mode(context.repeat_state),
            is_playing: context.is_playing,
        }))
    }

    async fn pause(&self, device_id: Option<&str>) -> PlaybackResult<()> {
        self.fresh().await?;
        self.oauth
            .client()
            .pause_playback(device_id)
            .await
            .map_err(|e| playback_error(device_id, &e))
    }

    async fn resume(&self, device_id: Option<&str>) -> PlaybackResult<()> {
        self.fresh().await?;
        self.oauth
            .client()
            .resume_playback(device_id, None)
            .await
            .map_err(|e| playback_error(device_id, &e))
    }

    async fn next_track(&self, device_id: Option<&str>) -> PlaybackResult<()> {
        self.fresh().await?;
        self.oauth
            .client()
            .next_track(device_id)
            .await
            .map_err(|e| playback_error(device_id, &e))
    }

    async fn previous_track(&self, device_id: Option<&str>) -> PlaybackResult<()> {
        self.fresh().await?;
        self.oauth
            .client()
            .previous_track(device_id)
            .await
            .map_err(|e| playback_error(device_id, &e))
    }

    async fn set_volume(&self, percent: u8, device_id: Option<&str>) -> PlaybackResult<()> {
        self.fresh().await?;
        self.oauth
            .client()
            .volume(percent.min(100), device_id)
            .await
            .map_err(|e| playback_error(device_id, &e))
    }

    async fn seek(&self, position_ms: u64, device_id: Option<&str>) -> PlaybackResult<()> {
        let position = i64::try_from(position_ms).map_err(PlaybackError::remote)?;
        self.fresh().await?;
        self.oauth
            .client()
            .seek_track(chrono::Duration::milliseconds(position), device_id)
            .await
            .map_err(|e| playback_error(device_id, &e))
    }

    async fn set_shuffle(&self, state: bool, device_id: Option<&str>) -> PlaybackResult<()> {
        self.fresh().await?;
        self.oauth
            .client()
            .shuffle(state, device_id)
            .await
            .map_err(|e| playback_error(device_id, &e))
    }

    async fn set_repeat(&self, mode: RepeatMode, device_id: Option<&str>) -> PlaybackResult<()> {
        self.fresh().await?;
        self.oauth
            .client()
            .repeat(repeat_state(mode), device_id)
            .await
            .map_err(|e| playback_error(device_id, &e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_conversion() {
        let uri = SpotifyUri::parse("spotify:track:4uLU6hMCjMI75M1A2tKUQC").unwrap();
        assert_eq!(
            offset(Some(&PlayOffset::Uri(uri))),
            Some(Offset::Uri("spotify:track:4uLU6hMCjMI75M1A2tKUQC".to_string()))
        );
        assert_eq!(offset(None), None);
    }

    #[test]
    fn test_volume_clamped() {
        assert_eq!(volume(Some(150)), Some(100));
        assert_eq!(volume(Some(35)), Some(35));
        assert_eq!(volume(None), None);
    }

    #[test]
    fn test_negative_progress_is_zero() {
        assert_eq!(millis(chrono::Duration::milliseconds(-5)), 0);
        assert_eq!(millis(chrono::Duration::milliseconds(45_000)), 45_000);
    }
}
