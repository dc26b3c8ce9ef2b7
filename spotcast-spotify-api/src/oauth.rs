//! OAuth authorization-code flow and the cached Spotify token.

use crate::error::SpotifyError;
use async_trait::async_trait;
use axum::{Router, extract::Query, response::Html, routing::get};
use rspotify::{
    AuthCodeSpotify, Credentials as ClientCredentials, OAuth, Token, prelude::*, scopes,
};
use serde::{Deserialize, Serialize};
use spotcast_core::{CredentialSource, Credentials};
use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, oneshot};
use tracing::{debug, info, warn};

/// How long the interactive flow waits for the browser callback
const OAUTH_CALLBACK_TIMEOUT: Duration = Duration::from_secs(600);

/// Refresh token proactively if it expires within this many seconds
const PROACTIVE_REFRESH_THRESHOLD_SECS: i64 = 60;

type CodeSender = Arc<Mutex<Option<oneshot::Sender<String>>>>;

/// Token as written to the cache file
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedToken {
    access_token: String,
    refresh_token: Option<String>,
    /// Unix timestamp
    expires_at: Option<i64>,
    scopes: Vec<String>,
}

impl From<&Token> for PersistedToken {
    fn from(token: &Token) -> Self {
        Self {
            access_token: token.access_token.clone(),
            refresh_token: token.refresh_token.clone(),
            expires_at: token.expires_at.map(|d| d.timestamp()),
            scopes: token.scopes.iter().cloned().collect(),
        }
    }
}

impl From<PersistedToken> for Token {
    fn from(persisted: PersistedToken) -> Self {
        Self {
            access_token: persisted.access_token,
            refresh_token: persisted.refresh_token,
            expires_at: persisted
                .expires_at
                .and_then(|ts| chrono::DateTime::from_timestamp(ts, 0)),
            expires_in: chrono::TimeDelta::zero(),
            scopes: persisted.scopes.into_iter().collect(),
        }
    }
}

/// Owns the authenticated Web API client and keeps its token alive.
pub struct SpotifyOAuth {
    client: AuthCodeSpotify,
    token_path: PathBuf,
}

impl SpotifyOAuth {
    #[must_use]
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self::with_token_path(
            client_id,
            client_secret,
            redirect_uri,
            crate::paths::spotify_token_cache_path(),
        )
    }

    /// Same as [`Self::new`] with an explicit token cache location.
    #[must_use]
    pub fn with_token_path(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
        token_path: PathBuf,
    ) -> Self {
        let creds = ClientCredentials::new(&client_id.into(), &client_secret.into());
        let oauth = OAuth {
            redirect_uri: redirect_uri.into(),
            scopes: scopes!(
                "streaming",
                "user-read-email",
                "user-read-private",
                "user-read-playback-state",
                "user-modify-playback-state",
                "user-read-currently-playing",
                "user-library-read",
                "playlist-read-private",
                "playlist-read-collaborative"
            ),
            ..Default::default()
        };

        Self {
            client: AuthCodeSpotify::new(creds, oauth),
            token_path,
        }
    }

    async fn lock_token(
        &self,
    ) -> Result<futures::lock::MutexGuard<'_, Option<Token>>, SpotifyError> {
        self.client
            .token
            .lock()
            .await
            .map_err(|_| SpotifyError::AuthFailed {
                reason: "Failed to acquire token lock".to_string(),
            })
    }

    /// Try to load the cached token, refreshing it if it already expired.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache cannot be read or parsed, or the refresh fails.
    pub async fn load_cached_token(&self) -> Result<bool, SpotifyError> {
        if !self.token_path.exists() {
            info!("No cached token file found at {:?}", self.token_path);
            return Ok(false);
        }

        let content = fs::read_to_string(&self.token_path)?;
        let token = Token::from(serde_json::from_str::<PersistedToken>(&content)?);

        if token.is_expired() {
            if token.refresh_token.is_none() {
                info!(
                    "Cached token is expired and has no refresh token, re-authentication required"
                );
                return Ok(false);
            }
            info!("Cached token is expired, refreshing...");
            *self.lock_token().await? = Some(token);
            self.refresh_token().await?;
            return Ok(true);
        }

        *self.lock_token().await? = Some(token);
        info!("Loaded valid cached Spotify token");
        Ok(true)
    }

    async fn save_token(&self) -> Result<(), SpotifyError> {
        let token_guard = self.lock_token().await?;
        if let Some(token) = token_guard.as_ref() {
            if let Some(parent) = self.token_path.parent() {
                fs::create_dir_all(parent)?;
            }
            let content = serde_json::to_string_pretty(&PersistedToken::from(token))?;
            fs::write(&self.token_path, content)?;
            debug!("Saved Spotify token to {:?}", self.token_path);
        }
        Ok(())
    }

    /// Refresh the access token and persist it.
    ///
    /// # Errors
    ///
    /// Returns an error if the token refresh fails or the token cannot be saved.
    pub async fn refresh_token(&self) -> Result<(), SpotifyError> {
        info!("Refreshing Spotify access token");
        self.client
            .refresh_token()
            .await
            .map_err(|e| SpotifyError::AuthFailed {
                reason: format!("Token refresh failed: {e}"),
            })?;
        self.save_token().await
    }

    /// Refresh the token if it expires within a minute. Called before API requests.
    ///
    /// # Errors
    ///
    /// Returns an error if the token refresh fails.
    pub async fn ensure_token_fresh(&self) -> Result<(), SpotifyError> {
        let needs_refresh = {
            let token_guard = self.lock_token().await?;
            needs_refresh(token_guard.as_ref(), chrono::Utc::now())
        };
        if needs_refresh {
            self.refresh_token().await?;
        }
        Ok(())
    }

    /// Access token and its remaining lifetime, refreshed first if needed.
    ///
    /// # Errors
    ///
    /// Returns [`SpotifyError::NotAuthenticated`] before any token was obtained.
    pub async fn current_credentials(&self) -> Result<Credentials, SpotifyError> {
        self.ensure_token_fresh().await?;
        let token_guard = self.lock_token().await?;
        let token = token_guard.as_ref().ok_or(SpotifyError::NotAuthenticated)?;
        Ok(Credentials {
            access_token: token.access_token.clone(),
            expires_in: seconds_left(token, chrono::Utc::now()),
        })
    }

    /// Ensure we have a valid token, refreshing or re-authenticating if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if authentication or token refresh fails.
    pub async fn ensure_authenticated(&self) -> Result<(), SpotifyError> {
        info!("Checking for cached Spotify token...");
        if self.load_cached_token().await? {
            return self.ensure_token_fresh().await;
        }

        info!("No valid cached token, starting OAuth server for interactive authentication...");
        self.authenticate_interactive().await
    }

    /// Run the authorization-code flow through a local callback server.
    ///
    /// # Errors
    ///
    /// Returns an error if the server cannot start, the callback never
    /// arrives, or the code exchange fails.
    pub async fn authenticate_interactive(&self) -> Result<(), SpotifyError> {
        let (addr, callback_path) = self.callback_address()?;

        let (tx, rx) = oneshot::channel::<String>();
        let app = callback_router(&callback_path, Arc::new(Mutex::new(Some(tx))));
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| SpotifyError::AuthFailed {
                reason: format!("Failed to bind to {addr}: {e}"),
            })?;
        info!("OAuth callback server listening on http://{}{}", addr, callback_path);

        let auth_url = self
            .client
            .get_authorize_url(false)
            .map_err(|e| SpotifyError::AuthFailed {
                reason: format!("Failed to generate auth URL: {e}"),
            })?;
        if let Err(e) = open::that(&auth_url) {
            warn!("Could not open browser automatically: {}", e);
            info!("Please open this URL manually:\n{auth_url}");
        }

        let code = tokio::select! {
            result = rx => result.map_err(|_| SpotifyError::AuthFailed {
                reason: "Callback channel closed unexpectedly".into(),
            })?,
            _ = axum::serve(listener, app) => {
                return Err(SpotifyError::AuthFailed {
                    reason: "Callback server stopped unexpectedly".into(),
                });
            }
            () = tokio::time::sleep(OAUTH_CALLBACK_TIMEOUT) => {
                return Err(SpotifyError::AuthFailed {
                    reason: format!(
                        "OAuth callback timed out after {} minutes",
                        OAUTH_CALLBACK_TIMEOUT.as_secs() / 60
                    ),
                });
            }
        };

        info!("Received authorization code, exchanging for token...");
        self.client
            .request_token(&code)
            .await
            .map_err(|e| SpotifyError::AuthFailed {
                reason: format!("Token exchange failed: {e}"),
            })?;
        self.save_token().await?;
        info!("Successfully authenticated with Spotify");
        Ok(())
    }

    /// The underlying Web API client
    #[must_use]
    pub const fn client(&self) -> &AuthCodeSpotify {
        &self.client
    }

    fn callback_address(&self) -> Result<(SocketAddr, String), SpotifyError> {
        let invalid = |reason: String| SpotifyError::AuthFailed { reason };
        let parsed = url::Url::parse(&self.client.oauth.redirect_uri)
            .map_err(|e| invalid(format!("Invalid redirect URI: {e}")))?;

        let host = match parsed.host_str() {
            None | Some("localhost") => "127.0.0.1",
            Some(host) => host,
        };
        let addr = format!("{}:{}", host, parsed.port().unwrap_or(8888))
            .parse::<SocketAddr>()
            .map_err(|e| invalid(format!("Invalid callback address: {e}")))?;
        Ok((addr, parsed.path().to_string()))
    }
}

#[async_trait]
impl CredentialSource for SpotifyOAuth {
    async fn credentials(&self) -> Result<Credentials, String> {
        self.current_credentials().await.map_err(|e| e.to_string())
    }
}

fn needs_refresh(token: Option<&Token>, now: chrono::DateTime<chrono::Utc>) -> bool {
    let Some(token) = token else {
        warn!("No token available for proactive refresh check");
        return false;
    };
    let Some(expires_at) = token.expires_at else {
        return false;
    };
    let seconds_until_expiry = (expires_at - now).num_seconds();
    if seconds_until_expiry <= PROACTIVE_REFRESH_THRESHOLD_SECS {
        debug!("Token expires in {}s, refreshing proactively", seconds_until_expiry);
        return true;
    }
    false
}

fn seconds_left(token: &Token, now: chrono::DateTime<chrono::Utc>) -> u64 {
    token
        .expires_at
        .and_then(|expires_at| u64::try_from((expires_at - now).num_seconds()).ok())
        .unwrap_or(0)
}

#[derive(Debug, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    error: Option<String>,
}

fn callback_router(callback_path: &str, tx: CodeSender) -> Router {
    Router::new().route(
        callback_path,
        get(move |Query(params): Query<CallbackParams>| {
            let tx = tx.clone();
            async move { handle_callback(params, tx).await }
        }),
    )
}

async fn handle_callback(params: CallbackParams, tx: CodeSender) -> Html<String> {
    match (params.code, params.error) {
        (Some(code), _) => {
            if let Some(sender) = tx.lock().await.take() {
                let _ = sender.send(code);
            }
            Html(callback_page(
                "Authorization Successful",
                "Spotcast is now connected to Spotify. You can close this window.",
            ))
        }
        (None, Some(error)) => Html(callback_page(
            "Authorization Failed",
            &format!("Error: {error}. Please close this window and try again."),
        )),
        (None, None) => Html(callback_page(
            "Authorization Failed",
            "No authorization code received. Please close this window and try again.",
        )),
    }
}

fn callback_page(title: &str, message: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>{title}</title></head>
<body style="font-family: sans-serif; text-align: center; padding: 50px;">
    <h1>{title}</h1>
    <p>{message}</p>
</body>
</html>"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(expires_in_secs: i64) -> Token {
        Token {
            access_token: "access".to_string(),
            refresh_token: Some("refresh".to_string()),
            expires_at: Some(chrono::Utc::now() + chrono::TimeDelta::seconds(expires_in_secs)),
            expires_in: chrono::TimeDelta::zero(),
            scopes: std::collections::HashSet::new(),
        }
    }

    #[test]
    fn test_refresh_threshold() {
        let now = chrono::Utc::now();
        assert!(needs_refresh(Some(&token(30)), now));
        assert!(!needs_refresh(Some(&token(600)), now));
        assert!(!needs_refresh(None, now));
    }

    #[test]
    fn test_seconds_left_never_negative() {
        let now = chrono::Utc::now();
        assert_eq!(seconds_left(&token(-100), now), 0);
        assert!(seconds_left(&token(3600), now) > 3500);
    }

    #[test]
    fn test_persisted_token_keeps_expiry() {
        let original = token(3600);
        let restored = Token::from(PersistedToken::from(&original));
        assert_eq!(restored.access_token, "access");
        assert_eq!(
            restored.expires_at.map(|d| d.timestamp()),
            original.expires_at.map(|d| d.timestamp())
        );
    }

    #[tokio::test]
    async fn test_credentials_require_a_token() {
        let dir = std::env::temp_dir().join("spotcast-oauth-test");
        let oauth = SpotifyOAuth::with_token_path(
            "id",
            "secret",
            "http://127.0.0.1:8888/callback",
            dir.join("token.json"),
        );
        assert!(matches!(
            oauth.current_credentials().await,
            Err(SpotifyError::NotAuthenticated)
        ));
    }

    #[test]
    fn test_callback_address_maps_localhost() {
        let oauth = SpotifyOAuth::with_token_path(
            "id",
            "secret",
            "http://localhost:9000/cb",
            PathBuf::from("unused.json"),
        );
        let (addr, path) = oauth.callback_address().unwrap();
        assert_eq!(addr.to_string(), "127.0.0.1:9000");
        assert_eq!(path, "/cb");
    }
}
