//! Launching the Spotify receiver on a castable endpoint.

use crate::device::directory::DeviceDirectory;
use crate::device::endpoint::{CastError, LaunchOutcome};
use tracing::{debug, error, info, warn};

impl DeviceDirectory {
    /// Launch the Spotify receiver on the endpoint called `name` and hand it
    /// a fresh access token, so the endpoint shows up as a remote playback device.
    ///
    /// Returns `true` only when the receiver reported a successful launch
    /// without a credential error. Every failure is logged and reported as `false`.
    pub async fn register_app(&self, name: &str) -> bool {
        let Some(session) = self.find_endpoint(name).await else {
            warn!("Cannot register Spotify on \"{}\": endpoint not found", name);
            return false;
        };
        let Some(link) = session.link() else {
            warn!("Cannot register Spotify on \"{}\": not connected", name);
            return false;
        };

        if let Err(e) = link.wait_ready(self.settings.connect_timeout).await {
            warn!("Cast endpoint \"{}\" not ready: {}", name, e);
            return false;
        }

        let credentials = match self.credentials.credentials().await {
            Ok(credentials) => credentials,
            Err(reason) => {
                error!("No Spotify access token available for \"{}\": {}", name, reason);
                return false;
            }
        };

        debug!("Launching Spotify receiver on \"{}\"", name);
        match link
            .launch_spotify(&credentials, self.settings.launch_timeout)
            .await
        {
            Ok(outcome) if outcome.is_success() => {
                session.mark_app_registered();
                info!("Spotify receiver registered on \"{}\"", name);
                true
            }
            Ok(LaunchOutcome {
                credential_error: true,
                ..
            })
            | Err(CastError::CredentialRejected) => {
                error!("Spotify receiver on \"{}\" rejected the access token", name);
                false
            }
            Ok(_) => {
                error!("Spotify receiver on \"{}\" did not launch", name);
                false
            }
            Err(CastError::Timeout(waited)) => {
                error!(
                    "No answer from Spotify receiver on \"{}\" after {:?}",
                    name, waited
                );
                false
            }
            Err(e) => {
                error!("Cast connection to \"{}\" failed: {}", name, e);
                false
            }
        }
    }
}
