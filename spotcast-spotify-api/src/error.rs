use thiserror::Error;

/// Errors from OAuth, token renewal and Web API calls.
#[derive(Debug, Error)]
pub enum SpotifyError {
    /// Authentication failed during OAuth flow or token exchange.
    #[error("Spotify authentication failed: {reason}")]
    AuthFailed { reason: String },

    /// No token has been loaded or obtained yet.
    #[error("Spotify is not authenticated")]
    NotAuthenticated,

    /// Error from the Spotify API client.
    #[error("Spotify API error: {0}")]
    Api(#[from] rspotify::ClientError),

    /// A Spotify id or uri did not have the expected shape.
    #[error("Invalid Spotify id: {0}")]
    InvalidId(#[from] rspotify::model::IdError),

    /// Failed to read the token cache file or perform I/O.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse or serialize JSON data.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience type alias for Results with `SpotifyError`.
pub type Result<T> = std::result::Result<T, SpotifyError>;
