//! Interfaces to network discovery and castable endpoint connections.

use crate::device::session::StatusListener;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Cast application id of the Spotify receiver
pub const SPOTIFY_APP_ID: &str = "CC32E753";

#[derive(Debug, Error)]
pub enum CastError {
    #[error("No castable endpoint named \"{name}\"")]
    NotFound { name: String },

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Endpoint connection is not established")]
    NotConnected,

    #[error("Receiver app failed to launch: {reason}")]
    LaunchFailed { reason: String },

    #[error("Endpoint rejected the playback credentials")]
    CredentialRejected,

    #[error("Discovery failed: {reason}")]
    Discovery { reason: String },

    #[error("Cast protocol error: {reason}")]
    Protocol { reason: String },

    #[error("TLS error: {reason}")]
    Tls { reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Identity of a discovered endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointDescriptor {
    pub host: String,
    pub port: u16,
    /// Stable hardware id, the key of the session table
    pub uuid: String,
    pub model: String,
    pub manufacturer: Option<String>,
    /// Friendly name shown to users
    pub name: String,
}

/// Bounds of one discovery sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoverySweep {
    pub tries: u32,
    pub retry_wait: Duration,
    /// Upper bound for the whole sweep
    pub timeout: Duration,
}

impl Default for DiscoverySweep {
    fn default() -> Self {
        Self {
            tries: 5,
            retry_wait: Duration::from_secs(5),
            timeout: Duration::from_secs(30),
        }
    }
}

#[async_trait]
pub trait EndpointDiscovery: Send + Sync {
    /// Browse the local network for castable endpoints.
    ///
    /// # Errors
    ///
    /// Returns an error if the discovery backend cannot be started.
    async fn discover(&self, sweep: DiscoverySweep) -> Result<Vec<EndpointDescriptor>, CastError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Disconnected,
}

impl ConnectionStatus {
    /// Connecting counts as usable: callers may block briefly on readiness.
    #[must_use]
    pub const fn is_available(self) -> bool {
        matches!(self, Self::Connecting | Self::Connected)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Connecting => "CONNECTING",
            Self::Connected => "CONNECTED",
            Self::Disconnected => "DISCONNECTED",
        })
    }
}

/// Receiver status as reported by the endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CastStatus {
    /// App currently running on the receiver
    pub app_id: Option<String>,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaStatus {
    pub player_state: String,
}

/// Short-lived credentials handed to the receiver app
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_token: String,
    pub expires_in: u64,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &"<redacted>")
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Current access token and its remaining lifetime in seconds.
    ///
    /// # Errors
    ///
    /// Returns a description of why no token is available.
    async fn credentials(&self) -> Result<Credentials, String>;
}

/// Result of launching the receiver app. Only `launched && !credential_error` is success.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LaunchOutcome {
    pub launched: bool,
    pub credential_error: bool,
}

impl LaunchOutcome {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.launched && !self.credential_error
    }
}

/// A live connection to one endpoint.
#[async_trait]
pub trait CastLink: Send + Sync {
    /// Wait until the connection is established.
    ///
    /// # Errors
    ///
    /// Returns [`CastError::Timeout`] or the connection-layer error.
    async fn wait_ready(&self, timeout: Duration) -> Result<(), CastError>;

    /// Launch the Spotify receiver and hand it `credentials`.
    ///
    /// # Errors
    ///
    /// Returns [`CastError::Timeout`] if no answer arrives in time, or
    /// [`CastError::NotConnected`] if the connection drops meanwhile.
    async fn launch_spotify(
        &self,
        credentials: &Credentials,
        timeout: Duration,
    ) -> Result<LaunchOutcome, CastError>;

    fn close(&self);
}

pub trait CastConnector: Send + Sync {
    /// Start connecting without blocking. Status changes, including the
    /// initial `Connecting`, are reported through `listener`.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot even be started.
    fn connect(
        &self,
        endpoint: &EndpointDescriptor,
        listener: StatusListener,
    ) -> Result<Arc<dyn CastLink>, CastError>;
}
