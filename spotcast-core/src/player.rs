//! Turns play and control events into dispatch attempts and direct playback calls.

use crate::device::DeviceDirectory;
use crate::dispatch::{DispatchAttempt, Dispatcher, FollowUp};
use crate::playback::{PlaybackResult, PlaybackService, PlaybackState};
use crate::request::{ControlAction, ControlRequest, PlayRequest};
use crate::resolve::Resolver;
use crate::snapshot::SnapshotStore;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Percentage points per volume step
const VOLUME_STEP: u8 = 5;

pub struct Player {
    resolver: Arc<Resolver>,
    dispatcher: Arc<Dispatcher>,
    playback: Arc<dyn PlaybackService>,
    directory: Arc<DeviceDirectory>,
    snapshots: SnapshotStore,
}

impl Player {
    #[must_use]
    pub fn new(
        resolver: Arc<Resolver>,
        dispatcher: Arc<Dispatcher>,
        playback: Arc<dyn PlaybackService>,
        directory: Arc<DeviceDirectory>,
    ) -> Self {
        Self {
            resolver,
            dispatcher,
            playback,
            directory,
            snapshots: SnapshotStore::new(),
        }
    }

    #[must_use]
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    #[must_use]
    pub const fn snapshots(&self) -> &SnapshotStore {
        &self.snapshots
    }

    /// Resolve a play event. `None` when there is no device or nothing to play.
    pub async fn prepare_play(&self, request: &PlayRequest) -> Option<DispatchAttempt> {
        let Some(device) = request.device.as_deref().filter(|d| !d.trim().is_empty()) else {
            warn!("Play request without a device, ignoring");
            return None;
        };
        let resolution = self.resolver.resolve(&request.request).await;
        if resolution.reference.is_empty() {
            warn!("Nothing found to play on \"{}\"", device);
            return None;
        }
        let follow_up = FollowUp {
            seek_ms: None,
            shuffle: Some(request.request.shuffle),
            repeat: Some(request.request.repeat_mode),
        };
        Some(
            DispatchAttempt::play(device, resolution.reference, resolution.offset)
                .with_follow_up(follow_up),
        )
    }

    /// Handle a control event. Returns a dispatch when the event needs one
    /// (restore and transfer); every other action is applied directly.
    pub async fn control(&self, request: &ControlRequest) -> Option<DispatchAttempt> {
        if request.transfer_playback {
            let Some(device) = request.device.as_deref() else {
                warn!("transfer_playback needs a device");
                return None;
            };
            let name = self.directory.resolve(device).name;
            return Some(DispatchAttempt::transfer(name, true));
        }

        let Some(action) = request.action else {
            debug!("Control request without an action");
            return None;
        };

        if action == ControlAction::Restore {
            let attempt = self.snapshots.restore_attempt(request.device.as_deref());
            if attempt.is_none() {
                warn!("No snapshot to restore");
            }
            return attempt;
        }

        let current = match self.playback.current_playback().await {
            Ok(Some(current)) => current,
            Ok(None) => {
                info!("Nothing is playing, ignoring {:?}", action);
                return None;
            }
            Err(e) => {
                warn!("Could not read current playback: {}", e);
                return None;
            }
        };

        if action == ControlAction::Snapshot {
            self.snapshots
                .capture(&current, self.dispatcher.last_dispatched());
            return None;
        }

        if let Err(e) = self.apply(action, request, &current).await {
            warn!("{:?} failed: {}", action, e);
        }
        None
    }

    async fn apply(
        &self,
        action: ControlAction,
        request: &ControlRequest,
        current: &PlaybackState,
    ) -> PlaybackResult<()> {
        let device = Some(current.device.id.as_str());
        let volume = current.device.volume_percent.unwrap_or(0);
        match action {
            ControlAction::Pause | ControlAction::Stop => self.playback.pause(device).await,
            ControlAction::Resume => self.playback.resume(device).await,
            ControlAction::Next => self.playback.next_track(device).await,
            ControlAction::Previous => self.playback.previous_track(device).await,
            ControlAction::SetVolume => match request.volume_level {
                Some(level) => self.playback.set_volume(level.min(100), device).await,
                None => {
                    warn!("Please specify the volume_level parameter to set the volume");
                    Ok(())
                }
            },
            ControlAction::IncreaseVolume => {
                let level = volume.saturating_add(VOLUME_STEP).min(100);
                self.playback.set_volume(level, device).await
            }
            ControlAction::DecreaseVolume => {
                self.playback
                    .set_volume(volume.saturating_sub(VOLUME_STEP), device)
                    .await
            }
            ControlAction::Mute => self.playback.set_volume(0, device).await,
            ControlAction::Snapshot | ControlAction::Restore => Ok(()),
        }
    }
}
