//! Connection state of one discovered castable endpoint.

use crate::device::endpoint::{
    CastConnector, CastError, CastLink, CastStatus, ConnectionStatus, EndpointDescriptor,
    MediaStatus, SPOTIFY_APP_ID,
};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

struct SessionState {
    descriptor: EndpointDescriptor,
    status: ConnectionStatus,
    available: bool,
    link: Option<Arc<dyn CastLink>>,
    /// Bumped whenever the live link is torn down; listeners carrying an
    /// older value belong to a superseded socket and are ignored.
    generation: u64,
    /// The Spotify receiver was launched with our credentials on this link
    app_registered: bool,
}

/// One castable endpoint, keyed by its hardware uuid.
///
/// All state transitions go through a single lock so updates for one
/// session are applied in a consistent order.
pub struct CastSession {
    uuid: String,
    state: Mutex<SessionState>,
}

impl CastSession {
    #[must_use]
    pub fn new(descriptor: EndpointDescriptor) -> Arc<Self> {
        Arc::new(Self {
            uuid: descriptor.uuid.clone(),
            state: Mutex::new(SessionState {
                descriptor,
                status: ConnectionStatus::Disconnected,
                available: false,
                link: None,
                generation: 0,
                app_registered: false,
            }),
        })
    }

    #[must_use]
    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    #[must_use]
    pub fn name(&self) -> String {
        self.state.lock().descriptor.name.clone()
    }

    #[must_use]
    pub fn descriptor(&self) -> EndpointDescriptor {
        self.state.lock().descriptor.clone()
    }

    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.state.lock().status
    }

    #[must_use]
    pub fn is_available(&self) -> bool {
        self.state.lock().available
    }

    #[must_use]
    pub fn has_link(&self) -> bool {
        self.state.lock().link.is_some()
    }

    #[must_use]
    pub fn link(&self) -> Option<Arc<dyn CastLink>> {
        self.state.lock().link.clone()
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    #[must_use]
    pub fn is_app_registered(&self) -> bool {
        self.state.lock().app_registered
    }

    pub(crate) fn mark_app_registered(&self) {
        self.state.lock().app_registered = true;
    }

    /// Case-insensitive friendly name match.
    #[must_use]
    pub fn matches_name(&self, name: &str) -> bool {
        self.state.lock().descriptor.name.eq_ignore_ascii_case(name)
    }

    /// Replace the cached identity tuple. Ignored while a link is held.
    pub fn update_descriptor(&self, descriptor: EndpointDescriptor) -> bool {
        let mut state = self.state.lock();
        if state.link.is_some() || descriptor.uuid != self.uuid {
            return false;
        }
        if state.descriptor != descriptor {
            debug!(
                "Endpoint {} moved to {}:{}",
                descriptor.name, descriptor.host, descriptor.port
            );
            state.descriptor = descriptor;
        }
        true
    }

    /// Open a link using the cached host/port/uuid/model/name tuple.
    ///
    /// Returns `Ok(false)` without touching anything if a link is already held.
    ///
    /// # Errors
    ///
    /// Returns the connector's error if the connection cannot be started.
    pub fn connect(self: &Arc<Self>, connector: &dyn CastConnector) -> Result<bool, CastError> {
        let (descriptor, generation) = {
            let state = self.state.lock();
            if state.link.is_some() {
                return Ok(false);
            }
            (state.descriptor.clone(), state.generation)
        };

        let listener = StatusListener {
            session: Arc::downgrade(self),
            generation,
        };
        let link = connector.connect(&descriptor, listener)?;

        let mut state = self.state.lock();
        if state.link.is_some() || state.generation != generation {
            // Lost a race with another connect, or the link died during setup
            drop(state);
            link.close();
            return Ok(false);
        }
        state.link = Some(link);
        debug!("Opened link to endpoint {} ({})", descriptor.name, self.uuid);
        Ok(true)
    }

    /// Drop the live link, if any, and invalidate its listeners.
    pub fn invalidate(&self) {
        let link = {
            let mut state = self.state.lock();
            state.generation += 1;
            state.app_registered = false;
            state.status = ConnectionStatus::Disconnected;
            state.available = false;
            state.link.take()
        };
        if let Some(link) = link {
            link.close();
        }
    }

    fn on_connection_status(&self, generation: u64, status: ConnectionStatus) {
        let mut state = self.state.lock();
        if generation != state.generation {
            debug!(
                "Dropping stale {} update for {} (generation {} != {})",
                status, state.descriptor.name, generation, state.generation
            );
            return;
        }

        let was_available = state.available;
        state.status = status;
        state.available = status.is_available();

        let released = if status == ConnectionStatus::Disconnected {
            state.generation += 1;
            state.app_registered = false;
            state.link.take()
        } else {
            None
        };

        if was_available != state.available {
            if state.available {
                info!("Cast endpoint {} is available ({})", state.descriptor.name, status);
            } else {
                warn!("Cast endpoint {} became unavailable", state.descriptor.name);
            }
        }
        drop(state);

        if let Some(link) = released {
            link.close();
        }
    }

    fn on_cast_status(&self, generation: u64, status: &CastStatus) {
        let mut state = self.state.lock();
        if generation != state.generation {
            return;
        }
        if state.app_registered && status.app_id.as_deref() != Some(SPOTIFY_APP_ID) {
            debug!(
                "Spotify receiver no longer running on {} (now {:?})",
                state.descriptor.name, status.display_name
            );
            state.app_registered = false;
        }
    }
}

/// Callback handle given to a link; tied to the session generation that created it.
#[derive(Clone)]
pub struct StatusListener {
    session: Weak<CastSession>,
    generation: u64,
}

impl StatusListener {
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    pub fn on_connection_status(&self, status: ConnectionStatus) {
        if let Some(session) = self.session.upgrade() {
            session.on_connection_status(self.generation, status);
        }
    }

    pub fn on_cast_status(&self, status: &CastStatus) {
        if let Some(session) = self.session.upgrade() {
            session.on_cast_status(self.generation, status);
        }
    }

    pub fn on_media_status(&self, status: &MediaStatus) {
        if let Some(session) = self.session.upgrade() {
            debug!("Media status on {}: {}", session.uuid(), status.player_state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeConnector, descriptor};

    #[test]
    fn test_availability_transitions() {
        let connector = FakeConnector::default();
        let session = CastSession::new(descriptor("uuid-1", "Kitchen"));
        assert!(!session.is_available());

        assert!(session.connect(&connector).unwrap());
        let listener = connector.last_listener().unwrap();

        listener.on_connection_status(ConnectionStatus::Connecting);
        assert!(session.is_available());
        listener.on_connection_status(ConnectionStatus::Connected);
        assert!(session.is_available());
        listener.on_connection_status(ConnectionStatus::Disconnected);
        assert!(!session.is_available());
        assert!(!session.has_link());

        // reconnect issues a fresh listener
        assert!(session.connect(&connector).unwrap());
        connector
            .last_listener()
            .unwrap()
            .on_connection_status(ConnectionStatus::Connecting);
        assert!(session.is_available());
        assert_eq!(session.status(), ConnectionStatus::Connecting);
    }

    #[test]
    fn test_stale_listener_dropped() {
        let connector = FakeConnector::default();
        let session = CastSession::new(descriptor("uuid-1", "Kitchen"));
        session.connect(&connector).unwrap();
        let old = connector.last_listener().unwrap();
        old.on_connection_status(ConnectionStatus::Connected);
        old.on_connection_status(ConnectionStatus::Disconnected);

        session.connect(&connector).unwrap();
        let fresh = connector.last_listener().unwrap();
        fresh.on_connection_status(ConnectionStatus::Connected);
        assert!(fresh.generation() > old.generation());

        // late callbacks from the superseded socket change nothing
        old.on_connection_status(ConnectionStatus::Disconnected);
        assert!(session.is_available());
        assert!(session.has_link());
    }

    #[test]
    fn test_connect_never_replaces_live_link() {
        let connector = FakeConnector::default();
        let session = CastSession::new(descriptor("uuid-1", "Kitchen"));
        assert!(session.connect(&connector).unwrap());
        assert!(!session.connect(&connector).unwrap());
        assert_eq!(connector.connect_count(), 1);
    }

    #[test]
    fn test_descriptor_update_only_without_link() {
        let connector = FakeConnector::default();
        let session = CastSession::new(descriptor("uuid-1", "Kitchen"));
        let mut moved = descriptor("uuid-1", "Kitchen");
        moved.host = "10.0.0.99".into();
        assert!(session.update_descriptor(moved.clone()));
        assert_eq!(session.descriptor().host, "10.0.0.99");

        session.connect(&connector).unwrap();
        moved.host = "10.0.0.100".into();
        assert!(!session.update_descriptor(moved));
        assert_eq!(session.descriptor().host, "10.0.0.99");
    }

    #[test]
    fn test_other_app_clears_registration() {
        let connector = FakeConnector::default();
        let session = CastSession::new(descriptor("uuid-1", "Kitchen"));
        session.connect(&connector).unwrap();
        session.mark_app_registered();
        let listener = connector.last_listener().unwrap();
        listener.on_cast_status(&CastStatus {
            app_id: Some(SPOTIFY_APP_ID.into()),
            display_name: Some("Spotify".into()),
        });
        assert!(session.is_app_registered());
        listener.on_cast_status(&CastStatus {
            app_id: Some("CC1AD845".into()),
            display_name: Some("Default Media Receiver".into()),
        });
        assert!(!session.is_app_registered());
    }
}
