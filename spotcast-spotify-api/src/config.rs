//! Spotify provider configuration.

use const_format::concatcp;
use serde::{Deserialize, Serialize};
use spotcast_core::{CoreError, ProvidersConfig};
use std::time::Duration;

/// Provider name used in config file
pub const PROVIDER_NAME: &str = "spotify";

/// Default OAuth redirect URI; the callback server binds to its host and port
pub const DEFAULT_REDIRECT_URI: &str = "http://127.0.0.1:8888/callback";

/// Access tokens live an hour, renew a little earlier
const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 3500;

/// Spotify-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotifyProviderConfig {
    /// Spotify OAuth client ID
    pub client_id: String,
    /// Spotify OAuth client secret
    pub client_secret: String,
    /// OAuth redirect URI
    #[serde(default = "default_redirect_uri")]
    pub oauth_redirect_uri: String,
    /// How often the access token is renewed in the background
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,
}

fn default_redirect_uri() -> String {
    DEFAULT_REDIRECT_URI.into()
}

const fn default_refresh_interval() -> u64 {
    DEFAULT_REFRESH_INTERVAL_SECS
}

impl SpotifyProviderConfig {
    /// Extract Spotify config from the dynamic providers config.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be parsed.
    pub fn from_providers(providers: &ProvidersConfig) -> Result<Option<Self>, CoreError> {
        providers.get(PROVIDER_NAME)
    }

    /// Validate that required fields are present.
    ///
    /// # Errors
    ///
    /// Returns an error if required fields are missing or empty.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.client_id.is_empty() {
            return Err(CoreError::ConfigMissingField {
                field: "providers.spotify.client_id".into(),
            });
        }
        if self.client_secret.is_empty() {
            return Err(CoreError::ConfigMissingField {
                field: "providers.spotify.client_secret".into(),
            });
        }
        if self.refresh_interval_secs == 0 {
            return Err(CoreError::ConfigInvalid {
                message: "providers.spotify.refresh_interval_secs must be positive".into(),
            });
        }
        Ok(())
    }

    #[must_use]
    pub const fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}

/// Config template for Spotify provider.
/// This is appended to the base config template when creating a new config file.
pub const CONFIG_TEMPLATE: &str = concatcp!(
    r#"[providers.spotify]
# Get these from https://developer.spotify.com/dashboard
client_id = ""
client_secret = ""
oauth_redirect_uri = ""#,
    DEFAULT_REDIRECT_URI,
    r#""
refresh_interval_secs = "#,
    DEFAULT_REFRESH_INTERVAL_SECS,
    "\n"
);
