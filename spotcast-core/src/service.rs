//! The single worker that handles play and control events in arrival order.

use crate::dispatch::{AttemptOutcome, DispatchAttempt, RETRY_DELAY};
use crate::error::{CoreError, Result};
use crate::player::Player;
use crate::request::{ControlRequest, PlayRequest};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

enum Job {
    Play(PlayRequest),
    Control(ControlRequest),
    /// A retry coming back from its timer
    Dispatch(DispatchAttempt),
}

/// Cheap cloneable sender into the player worker.
#[derive(Clone)]
pub struct PlayerHandle {
    tx: mpsc::UnboundedSender<Job>,
}

impl PlayerHandle {
    /// Queue a play event.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ServiceStopped`] once the worker has exited.
    pub fn play(&self, request: PlayRequest) -> Result<()> {
        self.tx
            .send(Job::Play(request))
            .map_err(|_| CoreError::ServiceStopped)
    }

    /// Queue a control event.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ServiceStopped`] once the worker has exited.
    pub fn control(&self, request: ControlRequest) -> Result<()> {
        self.tx
            .send(Job::Control(request))
            .map_err(|_| CoreError::ServiceStopped)
    }
}

/// Runs each event to completion before taking the next one. Retries wait
/// on their own timer task, so a pending retry never blocks new events.
pub struct PlayerService {
    player: Arc<Player>,
    tx: mpsc::UnboundedSender<Job>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<Job>>>,
    cancel_token: CancellationToken,
}

impl PlayerService {
    /// Create the service
    ///
    /// # Arguments
    /// * `player` - Resolves and dispatches events
    /// * `cancel_token` - Optional external cancellation token for graceful shutdown
    #[must_use]
    pub fn new(player: Arc<Player>, cancel_token: Option<CancellationToken>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            player,
            tx,
            rx: Mutex::new(Some(rx)),
            cancel_token: cancel_token.unwrap_or_default(),
        }
    }

    #[must_use]
    pub fn handle(&self) -> PlayerHandle {
        PlayerHandle {
            tx: self.tx.clone(),
        }
    }

    /// Start the worker in a background task
    #[must_use]
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    async fn run(&self) {
        let Some(mut rx) = self.rx.lock().take() else {
            warn!("Player service is already running");
            return;
        };
        info!("Player service started");

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!("Player service shutting down gracefully");
                    break;
                }
                job = rx.recv() => {
                    let Some(job) = job else { break };
                    self.handle_job(job).await;
                }
            }
        }
    }

    async fn handle_job(&self, job: Job) {
        let attempt = match job {
            Job::Play(request) => self.player.prepare_play(&request).await,
            Job::Control(request) => self.player.control(&request).await,
            Job::Dispatch(attempt) => Some(attempt),
        };
        if let Some(attempt) = attempt {
            self.run_dispatch(attempt).await;
        }
    }

    async fn run_dispatch(&self, attempt: DispatchAttempt) {
        let AttemptOutcome::Retry(next) = self.player.dispatcher().run_attempt(attempt).await else {
            return;
        };
        debug!("Retrying \"{}\" in {:?}", next.device, RETRY_DELAY);
        let tx = self.tx.clone();
        let cancel_token = self.cancel_token.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = cancel_token.cancelled() => {}
                () = tokio::time::sleep(RETRY_DELAY) => {
                    if tx.send(Job::Dispatch(next)).is_err() {
                        debug!("Player service stopped before retry");
                    }
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::Dispatcher;
    use crate::media::MediaReference;
    use crate::request::{ControlAction, ResolutionRequest, TrackField};
    use crate::resolve::{Resolver, ResolverSettings};
    use crate::testing::{FakeCatalog, FakePlayback, PlaybackCall, directory, remote_device, track};
    use std::time::Duration;

    fn service(
        playback: &Arc<FakePlayback>,
        cancel_token: CancellationToken,
    ) -> Arc<PlayerService> {
        let directory = directory(playback.clone());
        let resolver = Arc::new(Resolver::with_seed(
            Arc::new(FakeCatalog::default()),
            ResolverSettings::default(),
            1,
        ));
        let dispatcher = Arc::new(Dispatcher::new(directory.clone(), playback.clone()));
        let player = Arc::new(Player::new(resolver, dispatcher, playback.clone(), directory));
        Arc::new(PlayerService::new(player, Some(cancel_token)))
    }

    fn play(track_uri: &str) -> PlayRequest {
        PlayRequest {
            device: Some("Office PC".into()),
            request: ResolutionRequest {
                track: Some(TrackField::One(track_uri.into())),
                ..ResolutionRequest::default()
            },
        }
    }

    fn starts(playback: &FakePlayback) -> Vec<MediaReference> {
        playback
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                PlaybackCall::Start { reference, .. } => Some(reference),
                _ => None,
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_run_in_order() {
        let playback = Arc::new(FakePlayback::default());
        playback.add_device(remote_device("dev-1", "Office PC"));
        let cancel_token = CancellationToken::new();
        let service = service(&playback, cancel_token.clone());
        let handle = service.handle();
        let task = service.start();

        handle.play(play(&track("first").to_string())).unwrap();
        handle.play(play(&track("second").to_string())).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(
            starts(&playback),
            vec![
                MediaReference::Track(track("first")),
                MediaReference::Track(track("second")),
            ]
        );
        cancel_token.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_runs_after_delay_without_blocking() {
        let playback = Arc::new(FakePlayback::default());
        playback.add_device(remote_device("dev-1", "Office PC"));
        playback.reject_devices(true);
        let cancel_token = CancellationToken::new();
        let service = service(&playback, cancel_token.clone());
        let handle = service.handle();
        let task = service.start();

        handle.play(play(&track("first").to_string())).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(starts(&playback).len(), 1);

        // a new event is handled while the retry waits
        handle
            .control(ControlRequest {
                action: Some(ControlAction::Pause),
                ..ControlRequest::default()
            })
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        tokio::time::sleep(RETRY_DELAY * 3).await;
        assert_eq!(starts(&playback).len(), 2);

        cancel_token.cancel();
        task.await.unwrap();
        assert!(matches!(
            handle.play(PlayRequest::default()),
            Err(CoreError::ServiceStopped)
        ));
    }
}
