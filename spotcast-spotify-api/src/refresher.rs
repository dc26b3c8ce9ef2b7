//! Background renewal of the Spotify access token.

use crate::error::SpotifyError;
use crate::oauth::SpotifyOAuth;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Longest wait between failed renewal attempts
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Renews the token on its own timer so cast credentials never go stale.
pub struct TokenRefresher {
    oauth: Arc<SpotifyOAuth>,
    interval: Duration,
    cancel_token: CancellationToken,
}

impl TokenRefresher {
    /// # Arguments
    /// * `oauth` - Token owner
    /// * `interval` - Time between successful renewals
    /// * `cancel_token` - Optional external cancellation token for graceful shutdown
    #[must_use]
    pub fn new(
        oauth: Arc<SpotifyOAuth>,
        interval: Duration,
        cancel_token: Option<CancellationToken>,
    ) -> Self {
        Self {
            oauth,
            interval,
            cancel_token: cancel_token.unwrap_or_default(),
        }
    }

    /// Start renewing in a background task
    #[must_use]
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    async fn run(&self) {
        info!("Starting Spotify token renewal every {}s", self.interval.as_secs());
        let mut consecutive_errors: u32 = 0;

        loop {
            let wait = if consecutive_errors == 0 {
                self.interval
            } else {
                backoff(consecutive_errors)
            };

            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!("Token renewal shutting down gracefully");
                    break;
                }
                () = tokio::time::sleep(wait) => {
                    match self.oauth.refresh_token().await {
                        Ok(()) => consecutive_errors = 0,
                        Err(e) => {
                            consecutive_errors = consecutive_errors.saturating_add(1);
                            log_failure(consecutive_errors, &e);
                        }
                    }
                }
            }
        }
    }
}

/// 1s doubling per failure, capped at [`MAX_BACKOFF`]
fn backoff(consecutive_errors: u32) -> Duration {
    let secs = 2_u64.saturating_pow(consecutive_errors.saturating_sub(1).min(10));
    Duration::from_secs(secs).min(MAX_BACKOFF)
}

fn log_failure(consecutive_errors: u32, e: &SpotifyError) {
    if consecutive_errors >= 5 {
        error!("Token renewal failed {} times in a row: {}", consecutive_errors, e);
    } else {
        warn!("Token renewal failed (attempt {}): {}", consecutive_errors, e);
    }
}
