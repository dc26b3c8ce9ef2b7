//! Single-slot capture and restore of the current playback.

use crate::dispatch::{DispatchAttempt, FollowUp};
use crate::media::{MediaReference, PlayOffset, SpotifyUri};
use crate::playback::PlaybackState;
use crate::request::RepeatMode;
use parking_lot::Mutex;
use tracing::{debug, info};

/// What was playing, where, and how far in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackSnapshot {
    /// Name of the device that was playing
    pub device: String,
    /// Playback context, or the track list we dispatched when there was none
    pub context: Option<MediaReference>,
    pub item: Option<SpotifyUri>,
    pub progress_ms: u64,
    pub shuffle: bool,
    pub repeat: RepeatMode,
}

/// Holds the most recent snapshot. A new capture replaces the old one.
#[derive(Default)]
pub struct SnapshotStore {
    slot: Mutex<Option<PlaybackSnapshot>>,
}

impl SnapshotStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture `state`. Plain track-list playback has no context uri, so the
    /// last dispatched track list stands in for it.
    pub fn capture(
        &self,
        state: &PlaybackState,
        last_dispatched: Option<MediaReference>,
    ) -> PlaybackSnapshot {
        let context = state
            .context_uri
            .clone()
            .map(MediaReference::from_uri)
            .or_else(|| last_dispatched.filter(MediaReference::is_track_based));
        let snapshot = PlaybackSnapshot {
            device: state.device.name.clone(),
            context,
            item: state.item_uri.clone(),
            progress_ms: state.progress_ms,
            shuffle: state.shuffle,
            repeat: state.repeat,
        };
        info!(
            "Captured playback on \"{}\" at {} ms",
            state.device.name, snapshot.progress_ms
        );
        *self.slot.lock() = Some(snapshot.clone());
        snapshot
    }

    #[must_use]
    pub fn current(&self) -> Option<PlaybackSnapshot> {
        self.slot.lock().clone()
    }

    /// The dispatch that puts the snapshot back: the context from the
    /// captured item, then seek, shuffle and repeat as they were.
    #[must_use]
    pub fn restore_attempt(&self, device: Option<&str>) -> Option<DispatchAttempt> {
        let snapshot = self.current()?;
        let reference = match (snapshot.context, &snapshot.item) {
            (Some(context), _) => context,
            (None, Some(item)) => MediaReference::Track(item.clone()),
            (None, None) => {
                debug!("Snapshot holds nothing to restore");
                return None;
            }
        };
        let offset = match &reference {
            MediaReference::Track(_) => None,
            other if other.accepts_offset() => snapshot.item.map(PlayOffset::Uri),
            _ => None,
        };
        let device = device.map_or(snapshot.device, ToString::to_string);
        Some(
            DispatchAttempt::play(device, reference, offset).with_follow_up(FollowUp {
                seek_ms: Some(snapshot.progress_ms),
                shuffle: Some(snapshot.shuffle),
                repeat: Some(snapshot.repeat),
            }),
        )
    }
}
