//! Maps human device names to remote playback ids and castable endpoints.

use crate::config::SpotcastConfig;
use crate::device::endpoint::{
    CastConnector, CredentialSource, DiscoverySweep, EndpointDescriptor, EndpointDiscovery,
};
use crate::device::session::CastSession;
use crate::playback::PlaybackService;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Timeouts used when talking to endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectorySettings {
    pub sweep: DiscoverySweep,
    pub connect_timeout: Duration,
    pub launch_timeout: Duration,
}

impl Default for DirectorySettings {
    fn default() -> Self {
        Self {
            sweep: DiscoverySweep::default(),
            connect_timeout: Duration::from_secs(2),
            launch_timeout: Duration::from_secs(10),
        }
    }
}

impl DirectorySettings {
    #[must_use]
    pub const fn from_config(config: &SpotcastConfig) -> Self {
        Self {
            sweep: config.discovery.sweep(),
            connect_timeout: config.cast.connect_timeout(),
            launch_timeout: config.cast.launch_timeout(),
        }
    }
}

/// What the directory knows about a device name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub name: String,
    /// Cached remote playback id; may be stale
    pub remote_id: Option<String>,
    /// Hardware uuid of the matching castable endpoint
    pub endpoint_uuid: Option<String>,
}

/// Owns the endpoint session table and the remote id cache.
pub struct DeviceDirectory {
    /// lowercased alias -> device name
    aliases: HashMap<String, String>,
    /// hardware uuid -> session
    sessions: RwLock<HashMap<String, Arc<CastSession>>>,
    /// device name -> remote playback id
    remote_ids: Mutex<HashMap<String, String>>,
    pub(super) playback: Arc<dyn PlaybackService>,
    discovery: Arc<dyn EndpointDiscovery>,
    connector: Arc<dyn CastConnector>,
    pub(super) credentials: Arc<dyn CredentialSource>,
    pub(super) settings: DirectorySettings,
    /// One network sweep at a time
    sweep_lock: tokio::sync::Mutex<()>,
}

impl DeviceDirectory {
    pub fn new(
        aliases: &HashMap<String, String>,
        playback: Arc<dyn PlaybackService>,
        discovery: Arc<dyn EndpointDiscovery>,
        connector: Arc<dyn CastConnector>,
        credentials: Arc<dyn CredentialSource>,
        settings: DirectorySettings,
    ) -> Self {
        Self {
            aliases: aliases
                .iter()
                .map(|(alias, name)| (alias.to_lowercase(), name.clone()))
                .collect(),
            sessions: RwLock::new(HashMap::new()),
            remote_ids: Mutex::new(HashMap::new()),
            playback,
            discovery,
            connector,
            credentials,
            settings,
            sweep_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Normalize a user supplied device name.
    ///
    /// Tries the alias table, then live endpoint friendly names, then the
    /// cached remote id -> name mapping; otherwise the input is taken as canonical.
    #[must_use]
    pub fn resolve(&self, name: &str) -> DeviceIdentity {
        let name = self.canonical_name(name);
        let remote_id = self.cached_remote_id(&name);
        let endpoint_uuid = self.session_by_name(&name).map(|s| s.uuid().to_string());
        DeviceIdentity {
            name,
            remote_id,
            endpoint_uuid,
        }
    }

    fn canonical_name(&self, name: &str) -> String {
        let name = name.trim();
        let aliased = self.aliases.get(&name.to_lowercase()).map(String::as_str);
        if let Some(alias) = aliased {
            debug!("Device alias \"{}\" maps to \"{}\"", name, alias);
        }
        let name = aliased.unwrap_or(name);

        if let Some(session) = self.session_by_name(name) {
            return session.name();
        }

        let by_id = self
            .remote_ids
            .lock()
            .iter()
            .find(|(_, id)| id.as_str() == name)
            .map(|(device, _)| device.clone());
        by_id.unwrap_or_else(|| name.to_string())
    }

    /// Linear scan of the session table by friendly name.
    #[must_use]
    pub fn session_by_name(&self, name: &str) -> Option<Arc<CastSession>> {
        self.sessions
            .read()
            .values()
            .find(|session| session.matches_name(name))
            .cloned()
    }

    #[must_use]
    pub fn session(&self, uuid: &str) -> Option<Arc<CastSession>> {
        self.sessions.read().get(uuid).cloned()
    }

    #[must_use]
    pub fn sessions(&self) -> Vec<Arc<CastSession>> {
        self.sessions.read().values().cloned().collect()
    }

    #[must_use]
    pub fn endpoint_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.sessions().iter().map(|s| s.name()).collect();
        names.sort();
        names
    }

    #[must_use]
    pub fn cached_remote_id(&self, name: &str) -> Option<String> {
        self.remote_ids.lock().get(name).cloned()
    }

    /// Forget the cached remote id after a failed delivery.
    pub fn invalidate_remote_id(&self, name: &str) {
        if self.remote_ids.lock().remove(name).is_some() {
            debug!("Invalidated cached Spotify device id for \"{}\"", name);
        }
    }

    /// Remote playback id for a canonical device name.
    ///
    /// Castable endpoints get the receiver app registered first when forced
    /// or when no registration is live; other names are looked up directly
    /// in the remote device list. At most one registration per call.
    pub async fn get_remote_playback_id(&self, name: &str, force_refresh: bool) -> Option<String> {
        if force_refresh {
            self.invalidate_remote_id(name);
        } else if let Some(id) = self.cached_remote_id(name) {
            debug!("Cached Spotify device used for \"{}\"", name);
            return Some(id);
        }

        let mut registered = false;
        if let Some(session) = self.session_by_name(name)
            && (force_refresh || !session.is_app_registered())
        {
            registered = true;
            if !self.register_app(name).await {
                debug!("Registration on \"{}\" failed, checking device list anyway", name);
            }
        }

        if let Some(id) = self.lookup_remote_device(name).await {
            return Some(id);
        }

        if registered {
            return None;
        }

        // Possibly a castable endpoint we have not discovered yet
        if self.register_app(name).await {
            return self.lookup_remote_device(name).await;
        }
        None
    }

    async fn lookup_remote_device(&self, name: &str) -> Option<String> {
        let devices = match self.playback.list_devices().await {
            Ok(devices) => devices,
            Err(e) => {
                warn!("Could not list Spotify devices: {}", e);
                return None;
            }
        };
        let found = devices
            .iter()
            .find(|d| d.name == name)
            .or_else(|| devices.iter().find(|d| d.name.eq_ignore_ascii_case(name)))?;

        debug!("Newly discovered Spotify device \"{}\" ({})", found.name, found.id);
        self.remote_ids
            .lock()
            .insert(name.to_string(), found.id.clone());
        Some(found.id.clone())
    }

    /// Find the castable endpoint called `name`.
    ///
    /// An unavailable match gets one reconnect attempt; no match at all
    /// triggers a discovery sweep.
    pub async fn find_endpoint(&self, name: &str) -> Option<Arc<CastSession>> {
        if let Some(session) = self.session_by_name(name) {
            if session.is_available() {
                debug!("Cached cast endpoint used for \"{}\"", name);
                return Some(session);
            }
            info!("Cast endpoint \"{}\" is unavailable, reconnecting", name);
            if let Err(e) = session.connect(self.connector.as_ref()) {
                warn!("Reconnect to \"{}\" failed: {}", name, e);
            }
            return session.is_available().then_some(session);
        }

        self.discover().await;
        let found = self.session_by_name(name);
        if found.is_some() {
            debug!("Newly discovered cast endpoint found for \"{}\"", name);
        } else {
            warn!(
                "No cast endpoint named \"{}\". Known endpoints: {:?}",
                name,
                self.endpoint_names()
            );
        }
        found
    }

    /// Run one discovery sweep and merge the results. Returns the number of new endpoints.
    pub async fn discover(&self) -> usize {
        let _sweep = self.sweep_lock.lock().await;
        let descriptors = match self.discovery.discover(self.settings.sweep).await {
            Ok(descriptors) => descriptors,
            Err(e) => {
                warn!("Cast discovery failed: {}", e);
                return 0;
            }
        };
        descriptors
            .into_iter()
            .filter(|descriptor| self.merge_endpoint(descriptor.clone()))
            .count()
    }

    /// Add a new endpoint or refresh an existing one whose link is gone.
    fn merge_endpoint(&self, descriptor: EndpointDescriptor) -> bool {
        let existing = self.session(&descriptor.uuid);
        let (session, is_new) = match existing {
            Some(session) if session.has_link() => return false,
            Some(session) => {
                session.update_descriptor(descriptor);
                (session, false)
            }
            None => {
                let mut sessions = self.sessions.write();
                let session = sessions
                    .entry(descriptor.uuid.clone())
                    .or_insert_with(|| CastSession::new(descriptor.clone()))
                    .clone();
                info!(
                    "Discovered cast endpoint \"{}\" ({} at {}:{})",
                    descriptor.name, descriptor.model, descriptor.host, descriptor.port
                );
                (session, true)
            }
        };
        if let Err(e) = session.connect(self.connector.as_ref()) {
            warn!("Could not connect to \"{}\": {}", session.name(), e);
        }
        is_new
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::endpoint::{ConnectionStatus, LaunchOutcome};
    use crate::testing::{
        FakeConnector, FakeCredentials, FakeDiscovery, FakePlayback, descriptor, remote_device,
    };

    struct Fixture {
        directory: DeviceDirectory,
        playback: Arc<FakePlayback>,
        discovery: Arc<FakeDiscovery>,
        connector: Arc<FakeConnector>,
    }

    fn fixture(aliases: &[(&str, &str)]) -> Fixture {
        let playback = Arc::new(FakePlayback::default());
        let discovery = Arc::new(FakeDiscovery::default());
        let connector = Arc::new(FakeConnector::registering_on(playback.clone()));
        let aliases = aliases
            .iter()
            .map(|(a, n)| ((*a).to_string(), (*n).to_string()))
            .collect();
        let directory = DeviceDirectory::new(
            &aliases,
            playback.clone(),
            discovery.clone(),
            connector.clone(),
            Arc::new(FakeCredentials),
            DirectorySettings::default(),
        );
        Fixture {
            directory,
            playback,
            discovery,
            connector,
        }
    }

    #[tokio::test]
    async fn test_resolve_order() {
        let f = fixture(&[("kitchen", "Kitchen speaker")]);
        f.discovery.add(descriptor("uuid-1", "Living Room"));
        f.directory.discover().await;
        f.playback.add_device(remote_device("dev-9", "Office PC"));
        f.directory.get_remote_playback_id("Office PC", false).await;

        assert_eq!(f.directory.resolve("KITCHEN").name, "Kitchen speaker");
        let living = f.directory.resolve("living room");
        assert_eq!(living.name, "Living Room");
        assert_eq!(living.endpoint_uuid.as_deref(), Some("uuid-1"));
        assert_eq!(f.directory.resolve("dev-9").name, "Office PC");
        assert_eq!(f.directory.resolve("Garage").name, "Garage");
    }

    #[tokio::test]
    async fn test_remote_id_cached_until_forced() {
        let f = fixture(&[]);
        f.playback.add_device(remote_device("dev-1", "Office PC"));

        assert_eq!(
            f.directory.get_remote_playback_id("Office PC", false).await.as_deref(),
            Some("dev-1")
        );
        assert_eq!(
            f.directory.get_remote_playback_id("Office PC", false).await.as_deref(),
            Some("dev-1")
        );
        assert_eq!(f.playback.list_calls(), 1);

        f.directory.get_remote_playback_id("Office PC", true).await;
        assert_eq!(f.playback.list_calls(), 2);
    }

    #[tokio::test]
    async fn test_castable_endpoint_registered_before_lookup() {
        let f = fixture(&[]);
        f.discovery.add(descriptor("uuid-1", "Living Room"));

        // not in the remote list until the receiver app runs
        let id = f.directory.get_remote_playback_id("Living Room", false).await;
        assert!(id.is_some());
        assert_eq!(f.connector.launch_count(), 1);
        let session = f.directory.session("uuid-1").unwrap();
        assert!(session.is_app_registered());

        // forced refresh registers again
        f.directory.get_remote_playback_id("Living Room", true).await;
        assert_eq!(f.connector.launch_count(), 2);
    }

    #[tokio::test]
    async fn test_credential_error_is_not_registration() {
        let f = fixture(&[]);
        f.connector.set_outcome(LaunchOutcome {
            launched: false,
            credential_error: true,
        });
        f.discovery.add(descriptor("uuid-1", "Living Room"));
        assert!(f.directory.get_remote_playback_id("Living Room", false).await.is_none());
        assert!(!f.directory.register_app("Living Room").await);
        assert!(!f.directory.session("uuid-1").unwrap().is_app_registered());
    }

    #[tokio::test]
    async fn test_unknown_name_single_registration_attempt() {
        let f = fixture(&[]);
        assert!(f.directory.get_remote_playback_id("Nowhere", false).await.is_none());
        assert_eq!(f.discovery.sweeps(), 1);
        assert_eq!(f.connector.launch_count(), 0);
    }

    #[tokio::test]
    async fn test_find_endpoint_reconnects_once() {
        let f = fixture(&[]);
        f.discovery.add(descriptor("uuid-1", "Living Room"));
        f.directory.discover().await;
        let session = f.directory.session("uuid-1").unwrap();
        f.connector
            .last_listener()
            .unwrap()
            .on_connection_status(ConnectionStatus::Disconnected);
        assert!(!session.is_available());

        let found = f.directory.find_endpoint("Living Room").await;
        assert!(found.is_some());
        assert_eq!(f.connector.connect_count(), 2);
        // reconnect, not a new sweep
        assert_eq!(f.discovery.sweeps(), 1);
    }

    #[tokio::test]
    async fn test_sweep_is_append_only() {
        let f = fixture(&[]);
        f.discovery.add(descriptor("uuid-1", "Living Room"));
        assert_eq!(f.directory.discover().await, 1);
        let first = f.directory.session("uuid-1").unwrap();

        f.discovery.add(descriptor("uuid-2", "Bedroom"));
        assert_eq!(f.directory.discover().await, 1);
        let again = f.directory.session("uuid-1").unwrap();
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(f.directory.sessions().len(), 2);
        // live link of uuid-1 was not replaced
        assert_eq!(f.connector.connect_count(), 2);
    }
}
