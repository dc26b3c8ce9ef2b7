pub mod catalog;
pub mod config;
mod convert;
pub mod error;
pub mod oauth;
pub mod paths;
pub mod playback;
pub mod refresher;

pub use catalog::SpotifyCatalog;
pub use config::{CONFIG_TEMPLATE as SPOTIFY_CONFIG_TEMPLATE, SpotifyProviderConfig};
pub use error::SpotifyError;
pub use oauth::SpotifyOAuth;
pub use paths::SPOTIFY_TOKEN_CACHE_FILE_NAME;
pub use playback::SpotifyPlayback;
pub use refresher::TokenRefresher;
