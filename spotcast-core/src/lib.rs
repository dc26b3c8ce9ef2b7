pub mod catalog;
pub mod config;
pub mod device;
pub mod dispatch;
pub mod error;
pub mod media;
pub mod paths;
pub mod playback;
pub mod player;
pub mod request;
pub mod resolve;
pub mod service;
pub mod snapshot;

#[cfg(test)]
pub(crate) mod testing;

pub use catalog::{
    AlbumGroup, AlbumInfo, ArtistInfo, Catalog, CatalogError, CatalogResult, PlaylistInfo,
    PlaylistSummary, RecommendationSeeds, TrackInfo,
};
pub use config::{
    AliasConfig, CastConfig, DiscoveryConfig, LoggingConfig, PlaybackConfig, ProvidersConfig,
    ServerConfig, SpotcastConfig, build_config_template,
};

/// Re-export toml error type for config parsing error handling
pub use toml::de::Error as TomlParseError;
pub use device::{
    CastConnector, CastError, CastLink, CastSession, CastStatus, ConnectionStatus,
    CredentialSource, Credentials, DeviceDirectory, DeviceIdentity, DirectorySettings,
    DiscoverySweep, EndpointDescriptor, EndpointDiscovery, LaunchOutcome, MediaStatus,
    SPOTIFY_APP_ID, StatusListener,
};
pub use dispatch::{
    AttemptOutcome, DispatchAction, DispatchAttempt, DispatchError, Dispatcher, FollowUp,
    MAX_ATTEMPTS, RETRY_DELAY,
};
pub use error::CoreError;
pub use media::{
    MediaError, MediaReference, PlayOffset, SpotifyUri, UriKind, is_spotify_uri, looks_like_uri,
};
pub use paths::{CONFIG_DIR_NAME, CONFIG_FILE_NAME, LOG_FILE_NAME, cache_dir, config_dir};
pub use playback::{PlaybackError, PlaybackResult, PlaybackService, PlaybackState, RemoteDevice};
pub use player::Player;
pub use request::{
    ControlAction, ControlRequest, PlayRequest, RepeatMode, ResolutionRequest, TrackField,
};
pub use resolve::{Resolution, Resolver, ResolverSettings, Rule};
pub use service::{PlayerHandle, PlayerService};
pub use snapshot::{PlaybackSnapshot, SnapshotStore};
