//! Remote playback control (Spotify Connect).

use crate::media::{MediaReference, PlayOffset, SpotifyUri};
use crate::request::RepeatMode;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlaybackError {
    /// The remote service does not know the device id (stale cache, device dropped)
    #[error("Playback device not found: {device_id}")]
    DeviceNotFound { device_id: String },

    #[error("Invalid playback reference: {reason}")]
    InvalidReference { reason: String },

    #[error("Playback request failed: {reason}")]
    Remote { reason: String },
}

impl PlaybackError {
    pub fn remote(reason: impl ToString) -> Self {
        Self::Remote {
            reason: reason.to_string(),
        }
    }
}

pub type PlaybackResult<T> = Result<T, PlaybackError>;

/// A device as listed by the playback service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteDevice {
    pub id: String,
    pub name: String,
    pub volume_percent: Option<u8>,
    pub is_active: bool,
}

/// What the playback service reports as currently playing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackState {
    pub device: RemoteDevice,
    /// Playlist, album or artist the item is played from
    pub context_uri: Option<SpotifyUri>,
    pub item_uri: Option<SpotifyUri>,
    pub progress_ms: u64,
    pub shuffle: bool,
    pub repeat: RepeatMode,
    pub is_playing: bool,
}

/// Playback service consumed by dispatch and the control entry point.
///
/// `device_id` arguments are remote playback ids; `None` targets the active device.
#[async_trait]
pub trait PlaybackService: Send + Sync {
    async fn list_devices(&self) -> PlaybackResult<Vec<RemoteDevice>>;

    async fn start_playback(
        &self,
        device_id: &str,
        reference: &MediaReference,
        offset: Option<&PlayOffset>,
    ) -> PlaybackResult<()>;

    async fn transfer_playback(&self, device_id: &str, force_play: bool) -> PlaybackResult<()>;

    async fn current_playback(&self) -> PlaybackResult<Option<PlaybackState>>;

    async fn pause(&self, device_id: Option<&str>) -> PlaybackResult<()>;

    async fn resume(&self, device_id: Option<&str>) -> PlaybackResult<()>;

    async fn next_track(&self, device_id: Option<&str>) -> PlaybackResult<()>;

    async fn previous_track(&self, device_id: Option<&str>) -> PlaybackResult<()>;

    async fn set_volume(&self, percent: u8, device_id: Option<&str>) -> PlaybackResult<()>;

    async fn seek(&self, position_ms: u64, device_id: Option<&str>) -> PlaybackResult<()>;

    async fn set_shuffle(&self, state: bool, device_id: Option<&str>) -> PlaybackResult<()>;

    async fn set_repeat(&self, mode: RepeatMode, device_id: Option<&str>) -> PlaybackResult<()>;
}
