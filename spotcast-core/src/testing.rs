//! In-memory collaborators for unit tests.

use crate::catalog::{
    AlbumGroup, AlbumInfo, ArtistInfo, Catalog, CatalogError, CatalogResult, PlaylistInfo,
    PlaylistSummary, RecommendationSeeds, TrackInfo,
};
use crate::device::{
    CastConnector, CastError, CastLink, ConnectionStatus, CredentialSource, Credentials,
    DeviceDirectory, DirectorySettings, DiscoverySweep, EndpointDescriptor, EndpointDiscovery,
    LaunchOutcome, StatusListener,
};
use crate::media::{MediaReference, PlayOffset, SpotifyUri, UriKind};
use crate::playback::{PlaybackError, PlaybackResult, PlaybackService, PlaybackState, RemoteDevice};
use crate::request::RepeatMode;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Build a valid uri of `kind` whose 22 character id is derived from `seed`.
pub fn uri(kind: UriKind, seed: &str) -> SpotifyUri {
    let id: String = seed
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .chain(std::iter::repeat('x'))
        .take(22)
        .collect();
    SpotifyUri::from_id(kind, &id).unwrap()
}

pub fn track(seed: &str) -> SpotifyUri {
    uri(UriKind::Track, seed)
}

pub fn album(seed: &str) -> SpotifyUri {
    uri(UriKind::Album, seed)
}

pub fn artist(seed: &str) -> SpotifyUri {
    uri(UriKind::Artist, seed)
}

pub fn playlist(seed: &str) -> SpotifyUri {
    uri(UriKind::Playlist, seed)
}

pub fn descriptor(uuid: &str, name: &str) -> EndpointDescriptor {
    EndpointDescriptor {
        host: "192.168.1.20".into(),
        port: 8009,
        uuid: uuid.into(),
        model: "Chromecast Audio".into(),
        manufacturer: Some("Google Inc.".into()),
        name: name.into(),
    }
}

// ---------------------------------------------------------------------------
// Catalog

#[derive(Default)]
pub struct FakeCatalog {
    /// keyed by name and by uri
    pub tracks: HashMap<String, TrackInfo>,
    pub albums: HashMap<String, AlbumInfo>,
    pub artists: HashMap<String, ArtistInfo>,
    pub playlists: HashMap<String, PlaylistInfo>,
    pub top_tracks: HashMap<String, Vec<SpotifyUri>>,
    pub related: HashMap<String, Vec<SpotifyUri>>,
    pub artist_albums: HashMap<String, Vec<SpotifyUri>>,
    pub recommended: Vec<SpotifyUri>,
    pub genre_seeds: Vec<String>,
    pub user_playlists: HashMap<String, Vec<PlaylistSummary>>,
    pub categories: Vec<String>,
    pub category_playlists: HashMap<String, Vec<SpotifyUri>>,
    pub featured: Vec<SpotifyUri>,
    pub new_releases: Vec<SpotifyUri>,
    pub saved: Vec<SpotifyUri>,
    pub seeds_seen: Mutex<Vec<RecommendationSeeds>>,
}

impl FakeCatalog {
    pub fn add_track(&mut self, name: &str, uri: &SpotifyUri, artist: Option<&SpotifyUri>) {
        let info = TrackInfo {
            uri: uri.clone(),
            name: name.into(),
            artist_name: String::new(),
            artist_uri: artist.cloned(),
            album_uri: None,
        };
        self.tracks.insert(name.into(), info.clone());
        self.tracks.insert(uri.to_string(), info);
    }

    pub fn add_album(
        &mut self,
        name: &str,
        uri: &SpotifyUri,
        artist: Option<&SpotifyUri>,
        tracks: Vec<SpotifyUri>,
    ) {
        let info = AlbumInfo {
            uri: uri.clone(),
            name: name.into(),
            artist_name: String::new(),
            artist_uri: artist.cloned(),
            total_tracks: u32::try_from(tracks.len()).unwrap(),
            tracks,
        };
        self.albums.insert(name.into(), info.clone());
        self.albums.insert(uri.to_string(), info);
    }

    pub fn add_artist(&mut self, name: &str, uri: &SpotifyUri) {
        let info = ArtistInfo {
            uri: uri.clone(),
            name: name.into(),
            genres: vec![],
        };
        self.artists.insert(name.into(), info.clone());
        self.artists.insert(uri.to_string(), info);
    }

    pub fn add_playlist(&mut self, name: &str, uri: &SpotifyUri, tracks: Vec<SpotifyUri>) {
        self.playlists.insert(
            uri.to_string(),
            PlaylistInfo {
                uri: uri.clone(),
                name: name.into(),
                owner: Some("me".into()),
                total_tracks: u32::try_from(tracks.len()).unwrap(),
                tracks,
            },
        );
    }

    pub fn seeds_seen(&self) -> Vec<RecommendationSeeds> {
        self.seeds_seen.lock().clone()
    }
}

fn found<T: Clone>(map: &HashMap<String, T>, key: &str) -> CatalogResult<T> {
    map.get(key).cloned().ok_or_else(|| CatalogError::not_found(key))
}

fn page(items: &[SpotifyUri], limit: u32, offset: u32) -> Vec<SpotifyUri> {
    items
        .iter()
        .skip(offset as usize)
        .take(limit as usize)
        .cloned()
        .collect()
}

#[async_trait]
impl Catalog for FakeCatalog {
    async fn lookup_track(&self, track: &str, _artist: Option<&str>) -> CatalogResult<TrackInfo> {
        found(&self.tracks, track)
    }

    async fn lookup_album(&self, album: &str, _artist: Option<&str>) -> CatalogResult<AlbumInfo> {
        found(&self.albums, album)
    }

    async fn lookup_artist(&self, artist: &str) -> CatalogResult<ArtistInfo> {
        found(&self.artists, artist)
    }

    async fn lookup_playlist(&self, playlist: &SpotifyUri) -> CatalogResult<PlaylistInfo> {
        found(&self.playlists, &playlist.to_string())
    }

    async fn recommendations(
        &self,
        seeds: &RecommendationSeeds,
        limit: u32,
    ) -> CatalogResult<Vec<SpotifyUri>> {
        self.seeds_seen.lock().push(seeds.clone());
        Ok(page(&self.recommended, limit, 0))
    }

    async fn genre_seeds(&self) -> CatalogResult<Vec<String>> {
        Ok(self.genre_seeds.clone())
    }

    async fn related_artists(&self, artist: &SpotifyUri) -> CatalogResult<Vec<SpotifyUri>> {
        Ok(self.related.get(&artist.to_string()).cloned().unwrap_or_default())
    }

    async fn top_tracks(
        &self,
        artist: &SpotifyUri,
        _country: &str,
    ) -> CatalogResult<Vec<SpotifyUri>> {
        Ok(self.top_tracks.get(&artist.to_string()).cloned().unwrap_or_default())
    }

    async fn artist_albums(
        &self,
        artist: &SpotifyUri,
        _group: Option<AlbumGroup>,
        _country: &str,
        limit: u32,
        offset: u32,
    ) -> CatalogResult<Vec<SpotifyUri>> {
        let albums = self.artist_albums.get(&artist.to_string()).cloned().unwrap_or_default();
        Ok(page(&albums, limit, offset))
    }

    async fn album_tracks(
        &self,
        album: &SpotifyUri,
        limit: u32,
        offset: u32,
    ) -> CatalogResult<Vec<SpotifyUri>> {
        let info = found(&self.albums, &album.to_string())?;
        Ok(page(&info.tracks, limit, offset))
    }

    async fn user_playlists(&self, user: &str) -> CatalogResult<Vec<PlaylistSummary>> {
        Ok(self.user_playlists.get(user).cloned().unwrap_or_default())
    }

    async fn categories(&self, limit: u32) -> CatalogResult<Vec<String>> {
        Ok(self.categories.iter().take(limit as usize).cloned().collect())
    }

    async fn category_playlists(
        &self,
        category: &str,
        limit: u32,
    ) -> CatalogResult<Vec<SpotifyUri>> {
        let playlists = found(&self.category_playlists, category)?;
        Ok(page(&playlists, limit, 0))
    }

    async fn featured_playlists(&self, limit: u32) -> CatalogResult<Vec<SpotifyUri>> {
        Ok(page(&self.featured, limit, 0))
    }

    async fn new_releases(&self, limit: u32) -> CatalogResult<Vec<SpotifyUri>> {
        Ok(page(&self.new_releases, limit, 0))
    }

    async fn saved_tracks(&self, limit: u32) -> CatalogResult<Vec<SpotifyUri>> {
        Ok(page(&self.saved, limit, 0))
    }
}

// ---------------------------------------------------------------------------
// Playback

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackCall {
    Start {
        device_id: String,
        reference: MediaReference,
        offset: Option<PlayOffset>,
    },
    Transfer {
        device_id: String,
        force_play: bool,
    },
    Pause,
    Resume,
    Next,
    Previous,
    Volume(u8),
    Seek(u64),
    Shuffle(bool),
    Repeat(RepeatMode),
}

#[derive(Default)]
pub struct FakePlayback {
    devices: Mutex<Vec<RemoteDevice>>,
    current: Mutex<Option<PlaybackState>>,
    calls: Mutex<Vec<PlaybackCall>>,
    list_calls: AtomicUsize,
    /// Every start/transfer is recorded, then answered with "device not found"
    reject_device: AtomicBool,
}

impl FakePlayback {
    pub fn add_device(&self, device: RemoteDevice) {
        let mut devices = self.devices.lock();
        if !devices.iter().any(|d| d.name == device.name) {
            devices.push(device);
        }
    }

    pub fn set_current(&self, state: Option<PlaybackState>) {
        *self.current.lock() = state;
    }

    pub fn reject_devices(&self, reject: bool) {
        self.reject_device.store(reject, Ordering::SeqCst);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<PlaybackCall> {
        self.calls.lock().clone()
    }

    fn record(&self, call: PlaybackCall) -> PlaybackResult<()> {
        self.calls.lock().push(call);
        Ok(())
    }

    fn check_device(&self, device_id: &str) -> PlaybackResult<()> {
        if self.reject_device.load(Ordering::SeqCst) {
            return Err(PlaybackError::DeviceNotFound {
                device_id: device_id.into(),
            });
        }
        Ok(())
    }
}

pub fn remote_device(id: &str, name: &str) -> RemoteDevice {
    RemoteDevice {
        id: id.into(),
        name: name.into(),
        volume_percent: Some(50),
        is_active: false,
    }
}

#[async_trait]
impl PlaybackService for FakePlayback {
    async fn list_devices(&self) -> PlaybackResult<Vec<RemoteDevice>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.devices.lock().clone())
    }

    async fn start_playback(
        &self,
        device_id: &str,
        reference: &MediaReference,
        offset: Option<&PlayOffset>,
    ) -> PlaybackResult<()> {
        self.record(PlaybackCall::Start {
            device_id: device_id.into(),
            reference: reference.clone(),
            offset: offset.cloned(),
        })?;
        self.check_device(device_id)
    }

    async fn transfer_playback(&self, device_id: &str, force_play: bool) -> PlaybackResult<()> {
        self.record(PlaybackCall::Transfer {
            device_id: device_id.into(),
            force_play,
        })?;
        self.check_device(device_id)
    }

    async fn current_playback(&self) -> PlaybackResult<Option<PlaybackState>> {
        Ok(self.current.lock().clone())
    }

    async fn pause(&self, _device_id: Option<&str>) -> PlaybackResult<()> {
        self.record(PlaybackCall::Pause)
    }

    async fn resume(&self, _device_id: Option<&str>) -> PlaybackResult<()> {
        self.record(PlaybackCall::Resume)
    }

    async fn next_track(&self, _device_id: Option<&str>) -> PlaybackResult<()> {
        self.record(PlaybackCall::Next)
    }

    async fn previous_track(&self, _device_id: Option<&str>) -> PlaybackResult<()> {
        self.record(PlaybackCall::Previous)
    }

    async fn set_volume(&self, percent: u8, _device_id: Option<&str>) -> PlaybackResult<()> {
        self.record(PlaybackCall::Volume(percent))
    }

    async fn seek(&self, position_ms: u64, _device_id: Option<&str>) -> PlaybackResult<()> {
        self.record(PlaybackCall::Seek(position_ms))
    }

    async fn set_shuffle(&self, state: bool, _device_id: Option<&str>) -> PlaybackResult<()> {
        self.record(PlaybackCall::Shuffle(state))
    }

    async fn set_repeat(&self, mode: RepeatMode, _device_id: Option<&str>) -> PlaybackResult<()> {
        self.record(PlaybackCall::Repeat(mode))
    }
}

// ---------------------------------------------------------------------------
// Endpoints

#[derive(Default)]
pub struct FakeDiscovery {
    endpoints: Mutex<Vec<EndpointDescriptor>>,
    sweeps: AtomicUsize,
}

impl FakeDiscovery {
    pub fn add(&self, descriptor: EndpointDescriptor) {
        self.endpoints.lock().push(descriptor);
    }

    pub fn sweeps(&self) -> usize {
        self.sweeps.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EndpointDiscovery for FakeDiscovery {
    async fn discover(&self, _sweep: DiscoverySweep) -> Result<Vec<EndpointDescriptor>, CastError> {
        self.sweeps.fetch_add(1, Ordering::SeqCst);
        Ok(self.endpoints.lock().clone())
    }
}

/// Connector whose links succeed immediately. When built with
/// [`FakeConnector::registering_on`], a successful launch makes the endpoint
/// appear in the remote device list, the way a real receiver does.
#[derive(Default)]
pub struct FakeConnector {
    listeners: Mutex<Vec<StatusListener>>,
    outcome: Mutex<Option<LaunchOutcome>>,
    launches: Arc<AtomicUsize>,
    remote: Option<Arc<FakePlayback>>,
}

impl FakeConnector {
    pub fn registering_on(remote: Arc<FakePlayback>) -> Self {
        Self {
            remote: Some(remote),
            ..Self::default()
        }
    }

    pub fn set_outcome(&self, outcome: LaunchOutcome) {
        *self.outcome.lock() = Some(outcome);
    }

    pub fn last_listener(&self) -> Option<StatusListener> {
        self.listeners.lock().last().cloned()
    }

    pub fn connect_count(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn launch_count(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

impl CastConnector for FakeConnector {
    fn connect(
        &self,
        endpoint: &EndpointDescriptor,
        listener: StatusListener,
    ) -> Result<Arc<dyn CastLink>, CastError> {
        listener.on_connection_status(ConnectionStatus::Connecting);
        self.listeners.lock().push(listener);
        Ok(Arc::new(FakeLink {
            name: endpoint.name.clone(),
            uuid: endpoint.uuid.clone(),
            outcome: self.outcome.lock().unwrap_or(LaunchOutcome {
                launched: true,
                credential_error: false,
            }),
            launches: self.launches.clone(),
            remote: self.remote.clone(),
        }))
    }
}

pub struct FakeLink {
    name: String,
    uuid: String,
    outcome: LaunchOutcome,
    launches: Arc<AtomicUsize>,
    remote: Option<Arc<FakePlayback>>,
}

#[async_trait]
impl CastLink for FakeLink {
    async fn wait_ready(&self, _timeout: Duration) -> Result<(), CastError> {
        Ok(())
    }

    async fn launch_spotify(
        &self,
        _credentials: &Credentials,
        _timeout: Duration,
    ) -> Result<LaunchOutcome, CastError> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        if self.outcome.is_success()
            && let Some(remote) = &self.remote
        {
            remote.add_device(remote_device(&format!("remote-{}", self.uuid), &self.name));
        }
        Ok(self.outcome)
    }

    fn close(&self) {}
}

pub struct FakeCredentials;

#[async_trait]
impl CredentialSource for FakeCredentials {
    async fn credentials(&self) -> Result<Credentials, String> {
        Ok(Credentials {
            access_token: "token".into(),
            expires_in: 3600,
        })
    }
}

/// A directory over `playback` with no castable endpoints on the network.
pub fn directory(playback: Arc<FakePlayback>) -> Arc<DeviceDirectory> {
    Arc::new(DeviceDirectory::new(
        &HashMap::new(),
        playback,
        Arc::new(FakeDiscovery::default()),
        Arc::new(FakeConnector::default()),
        Arc::new(FakeCredentials),
        DirectorySettings::default(),
    ))
}
