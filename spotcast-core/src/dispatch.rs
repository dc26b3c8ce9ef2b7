//! Delivering a play or transfer call to a named device, with a bounded retry.

use crate::device::DeviceDirectory;
use crate::media::{MediaError, MediaReference, PlayOffset};
use crate::playback::{PlaybackResult, PlaybackService};
use crate::request::RepeatMode;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Attempts per dispatch, the first included
pub const MAX_ATTEMPTS: u32 = 2;
/// Wait before the forced-refresh attempt
pub const RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Refusing to dispatch: {0}")]
    InvalidReference(#[from] MediaError),

    #[error("Could not reach \"{device}\" after {attempts} attempts")]
    Exhausted { device: String, attempts: u32 },
}

/// The remote call issued once a device id is known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchAction {
    Play {
        reference: MediaReference,
        offset: Option<PlayOffset>,
    },
    /// Move current playback without changing what plays
    Transfer { force_play: bool },
}

/// Calls made on the device after a successful delivery. Failures here are only logged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FollowUp {
    pub seek_ms: Option<u64>,
    pub shuffle: Option<bool>,
    pub repeat: Option<RepeatMode>,
}

/// One try of a dispatch. Retries carry the next attempt number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchAttempt {
    pub device: String,
    pub action: DispatchAction,
    pub follow_up: FollowUp,
    /// 1-based
    pub attempt: u32,
}

impl DispatchAttempt {
    #[must_use]
    pub fn play(
        device: impl Into<String>,
        reference: MediaReference,
        offset: Option<PlayOffset>,
    ) -> Self {
        Self {
            device: device.into(),
            action: DispatchAction::Play { reference, offset },
            follow_up: FollowUp::default(),
            attempt: 1,
        }
    }

    #[must_use]
    pub fn transfer(device: impl Into<String>, force_play: bool) -> Self {
        Self {
            device: device.into(),
            action: DispatchAction::Transfer { force_play },
            follow_up: FollowUp::default(),
            attempt: 1,
        }
    }

    #[must_use]
    pub const fn with_follow_up(mut self, follow_up: FollowUp) -> Self {
        self.follow_up = follow_up;
        self
    }

    /// Only the first attempt may trust the cached device id.
    #[must_use]
    pub const fn force_refresh(&self) -> bool {
        self.attempt > 1
    }

    fn next(mut self) -> Self {
        self.attempt += 1;
        self
    }
}

/// What happened to one attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Delivered,
    /// Run this attempt after [`RETRY_DELAY`]
    Retry(DispatchAttempt),
    Failed,
}

pub struct Dispatcher {
    directory: Arc<DeviceDirectory>,
    playback: Arc<dyn PlaybackService>,
    max_attempts: u32,
    last_dispatched: Mutex<Option<MediaReference>>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(directory: Arc<DeviceDirectory>, playback: Arc<dyn PlaybackService>) -> Self {
        Self {
            directory,
            playback,
            max_attempts: MAX_ATTEMPTS,
            last_dispatched: Mutex::new(None),
        }
    }

    /// The last reference successfully handed to a device.
    #[must_use]
    pub fn last_dispatched(&self) -> Option<MediaReference> {
        self.last_dispatched.lock().clone()
    }

    /// Run one attempt without waiting. A retry is returned to the caller,
    /// which decides how to schedule it.
    pub async fn run_attempt(&self, attempt: DispatchAttempt) -> AttemptOutcome {
        if let DispatchAction::Play { reference, .. } = &attempt.action
            && let Err(e) = reference.validate()
        {
            error!("Not dispatching {} to \"{}\": {}", reference.describe(), attempt.device, e);
            return AttemptOutcome::Failed;
        }

        let identity = self.directory.resolve(&attempt.device);
        let force_refresh = attempt.force_refresh();
        debug!(
            "Dispatch attempt {} to \"{}\" (force refresh: {})",
            attempt.attempt, identity.name, force_refresh
        );

        let delivered = match self
            .directory
            .get_remote_playback_id(&identity.name, force_refresh)
            .await
        {
            None => {
                warn!("No Spotify device found for \"{}\"", identity.name);
                false
            }
            Some(device_id) => match self.deliver(&device_id, &attempt.action).await {
                Ok(()) => {
                    self.apply_follow_up(&device_id, attempt.follow_up).await;
                    true
                }
                Err(e) => {
                    warn!("Playback call to \"{}\" failed: {}", identity.name, e);
                    self.directory.invalidate_remote_id(&identity.name);
                    false
                }
            },
        };

        if delivered {
            if let DispatchAction::Play { reference, .. } = &attempt.action {
                info!("Playing {} on \"{}\"", reference.describe(), identity.name);
                *self.last_dispatched.lock() = Some(reference.clone());
            } else {
                info!("Transferred playback to \"{}\"", identity.name);
            }
            AttemptOutcome::Delivered
        } else if attempt.attempt < self.max_attempts {
            AttemptOutcome::Retry(attempt.next())
        } else {
            error!(
                "Giving up on \"{}\" after {} attempts",
                identity.name, attempt.attempt
            );
            AttemptOutcome::Failed
        }
    }

    /// Run attempts until delivered or exhausted, sleeping between them.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::InvalidReference`] before any remote call for
    /// an invalid reference, and [`DispatchError::Exhausted`] after the last
    /// attempt failed.
    pub async fn dispatch(&self, mut attempt: DispatchAttempt) -> Result<(), DispatchError> {
        if let DispatchAction::Play { reference, .. } = &attempt.action {
            reference.validate()?;
        }
        loop {
            let device = attempt.device.clone();
            match self.run_attempt(attempt).await {
                AttemptOutcome::Delivered => return Ok(()),
                AttemptOutcome::Retry(next) => {
                    tokio::time::sleep(RETRY_DELAY).await;
                    attempt = next;
                }
                AttemptOutcome::Failed => {
                    return Err(DispatchError::Exhausted {
                        device,
                        attempts: self.max_attempts,
                    });
                }
            }
        }
    }

    async fn deliver(&self, device_id: &str, action: &DispatchAction) -> PlaybackResult<()> {
        match action {
            DispatchAction::Play { reference, offset } => {
                let offset = offset.as_ref().filter(|_| reference.accepts_offset());
                self.playback
                    .start_playback(device_id, reference, offset)
                    .await
            }
            DispatchAction::Transfer { force_play } => {
                self.playback
                    .transfer_playback(device_id, *force_play)
                    .await
            }
        }
    }

    async fn apply_follow_up(&self, device_id: &str, follow_up: FollowUp) {
        let device = Some(device_id);
        if let Some(position) = follow_up.seek_ms
            && let Err(e) = self.playback.seek(position, device).await
        {
            warn!("Seek to {} ms failed: {}", position, e);
        }
        if let Some(shuffle) = follow_up.shuffle
            && let Err(e) = self.playback.set_shuffle(shuffle, device).await
        {
            warn!("Setting shuffle failed: {}", e);
        }
        if let Some(repeat) = follow_up.repeat
            && let Err(e) = self.playback.set_repeat(repeat, device).await
        {
            warn!("Setting repeat to {} failed: {}", repeat, e);
        }
    }
}
