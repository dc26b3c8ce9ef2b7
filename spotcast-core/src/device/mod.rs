mod directory;
mod endpoint;
mod registration;
mod session;

pub use directory::{DeviceDirectory, DeviceIdentity, DirectorySettings};
pub use endpoint::{
    CastConnector, CastError, CastLink, CastStatus, ConnectionStatus, CredentialSource,
    Credentials, DiscoverySweep, EndpointDescriptor, EndpointDiscovery, LaunchOutcome,
    MediaStatus, SPOTIFY_APP_ID,
};
pub use session::{CastSession, StatusListener};
