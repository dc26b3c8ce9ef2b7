//! Live links to Cast endpoints, each driven by its own worker thread.

use crate::channel::{
    CastChannel, NAMESPACE_MEDIA, NAMESPACE_RECEIVER, NAMESPACE_SPOTIFY, RECEIVER_ID,
    find_transport_id, message_type, parse_media_status, parse_receiver_status,
};
use crate::frame::CastFrame;
use async_trait::async_trait;
use serde_json::json;
use spotcast_core::{
    CastConnector, CastError, CastLink, ConnectionStatus, Credentials, EndpointDescriptor,
    LaunchOutcome, SPOTIFY_APP_ID, StatusListener,
};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};

/// Extra time the async side waits beyond the worker's own deadline
const REPLY_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkState {
    Connecting,
    Ready,
    Closed,
}

enum Command {
    Launch {
        credentials: Credentials,
        timeout: Duration,
        reply: oneshot::Sender<Result<LaunchOutcome, CastError>>,
    },
    Close,
}

/// Opens [`ChromecastLink`]s.
#[derive(Debug, Clone, Copy)]
pub struct ChromecastConnector {
    connect_timeout: Duration,
}

impl ChromecastConnector {
    #[must_use]
    pub const fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl CastConnector for ChromecastConnector {
    fn connect(
        &self,
        endpoint: &EndpointDescriptor,
        listener: StatusListener,
    ) -> Result<Arc<dyn CastLink>, CastError> {
        listener.on_connection_status(ConnectionStatus::Connecting);

        let (commands, command_rx) = mpsc::channel();
        let (state_tx, state) = watch::channel(LinkState::Connecting);
        let worker = Worker {
            endpoint: endpoint.clone(),
            connect_timeout: self.connect_timeout,
            listener,
            commands: command_rx,
            state: state_tx,
        };
        thread::Builder::new()
            .name(format!("cast-{}", endpoint.uuid))
            .spawn(move || worker.run())?;

        Ok(Arc::new(ChromecastLink { commands, state }))
    }
}

/// Async handle to a link worker.
pub struct ChromecastLink {
    commands: Sender<Command>,
    state: watch::Receiver<LinkState>,
}

#[async_trait]
impl CastLink for ChromecastLink {
    async fn wait_ready(&self, timeout: Duration) -> Result<(), CastError> {
        let mut state = self.state.clone();
        let ready = tokio::time::timeout(timeout, async move {
            state
                .wait_for(|s| *s != LinkState::Connecting)
                .await
                .map(|s| *s == LinkState::Ready)
        })
        .await;
        match ready {
            Err(_) => Err(CastError::Timeout(timeout)),
            Ok(Ok(true)) => Ok(()),
            Ok(Ok(false) | Err(_)) => Err(CastError::NotConnected),
        }
    }

    async fn launch_spotify(
        &self,
        credentials: &Credentials,
        timeout: Duration,
    ) -> Result<LaunchOutcome, CastError> {
        if *self.state.borrow() != LinkState::Ready {
            return Err(CastError::NotConnected);
        }
        let (reply, answer) = oneshot::channel();
        self.commands
            .send(Command::Launch {
                credentials: credentials.clone(),
                timeout,
                reply,
            })
            .map_err(|_| CastError::NotConnected)?;

        match tokio::time::timeout(timeout + REPLY_GRACE, answer).await {
            Err(_) => Err(CastError::Timeout(timeout)),
            Ok(Err(_)) => Err(CastError::NotConnected),
            Ok(Ok(outcome)) => outcome,
        }
    }

    fn close(&self) {
        // The worker may already be gone
        let _ = self.commands.send(Command::Close);
    }
}

struct Worker {
    endpoint: EndpointDescriptor,
    connect_timeout: Duration,
    listener: StatusListener,
    commands: Receiver<Command>,
    state: watch::Sender<LinkState>,
}

impl Worker {
    fn run(self) {
        let name = self.endpoint.name.clone();
        let mut channel = match CastChannel::open(&self.endpoint, self.connect_timeout)
            .and_then(|mut channel| channel.request_status().map(|()| channel))
        {
            Ok(channel) => channel,
            Err(e) => {
                warn!("Could not connect to cast endpoint \"{}\": {}", name, e);
                self.finish();
                return;
            }
        };

        self.state.send_replace(LinkState::Ready);
        self.listener.on_connection_status(ConnectionStatus::Connected);
        debug!("Cast link to \"{}\" established", name);

        loop {
            match self.commands.try_recv() {
                Ok(Command::Launch {
                    credentials,
                    timeout,
                    reply,
                }) => {
                    let outcome = self.launch(&mut channel, &credentials, timeout);
                    let lost = matches!(outcome, Err(CastError::Io(_)));
                    // The caller may have given up waiting
                    let _ = reply.send(outcome);
                    if lost {
                        break;
                    }
                }
                Ok(Command::Close) | Err(TryRecvError::Disconnected) => {
                    debug!("Closing cast link to \"{}\"", name);
                    channel.close();
                    self.finish();
                    return;
                }
                Err(TryRecvError::Empty) => {}
            }

            match channel.read_frame() {
                Ok(Some(frame)) => {
                    if !self.observe(&frame) {
                        break;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("Cast link to \"{}\" lost: {}", name, e);
                    break;
                }
            }
        }
        self.finish();
    }

    fn finish(&self) {
        self.state.send_replace(LinkState::Closed);
        self.listener
            .on_connection_status(ConnectionStatus::Disconnected);
    }

    /// Forward status frames to the listener. Returns false when the
    /// receiver closed our connection.
    fn observe(&self, frame: &CastFrame) -> bool {
        match frame.namespace.as_str() {
            NAMESPACE_RECEIVER => {
                if let Some(status) = parse_receiver_status(&frame.payload) {
                    self.listener.on_cast_status(&status);
                }
            }
            NAMESPACE_MEDIA => {
                if let Some(status) = parse_media_status(&frame.payload) {
                    self.listener.on_media_status(&status);
                }
            }
            crate::channel::NAMESPACE_CONNECTION
                if frame.source_id == RECEIVER_ID
                    && message_type(&frame.payload).as_deref() == Some("CLOSE") =>
            {
                info!("Cast endpoint \"{}\" closed the connection", self.endpoint.name);
                return false;
            }
            _ => {}
        }
        true
    }

    /// Launch the Spotify receiver, connect to its transport and hand over
    /// the access token, all within `timeout`.
    fn launch(
        &self,
        channel: &mut CastChannel,
        credentials: &Credentials,
        timeout: Duration,
    ) -> Result<LaunchOutcome, CastError> {
        let deadline = Instant::now() + timeout;

        let request_id = channel.alloc_request_id();
        channel.send_json(
            NAMESPACE_RECEIVER,
            RECEIVER_ID,
            &json!({"type": "LAUNCH", "appId": SPOTIFY_APP_ID, "requestId": request_id}),
        )?;

        let transport_id = loop {
            let frame = self.next_frame(channel, deadline, timeout)?;
            if frame.namespace != NAMESPACE_RECEIVER {
                continue;
            }
            if message_type(&frame.payload).as_deref() == Some("LAUNCH_ERROR") {
                return Err(CastError::LaunchFailed {
                    reason: frame.payload,
                });
            }
            if let Some(transport_id) = find_transport_id(&frame.payload, SPOTIFY_APP_ID) {
                break transport_id;
            }
        };
        debug!("Spotify receiver running on transport {}", transport_id);

        channel.connect_to(&transport_id)?;
        channel.send_json(
            NAMESPACE_SPOTIFY,
            &transport_id,
            &json!({
                "type": "setCredentials",
                "credentials": credentials.access_token,
                "expiresIn": credentials.expires_in,
            }),
        )?;

        loop {
            let frame = self.next_frame(channel, deadline, timeout)?;
            if frame.namespace != NAMESPACE_SPOTIFY {
                continue;
            }
            match message_type(&frame.payload).as_deref() {
                Some("setCredentialsResponse") => {
                    return Ok(LaunchOutcome {
                        launched: true,
                        credential_error: false,
                    });
                }
                Some("setCredentialsError") => {
                    return Ok(LaunchOutcome {
                        launched: false,
                        credential_error: true,
                    });
                }
                other => debug!("Ignoring Spotify receiver message {:?}", other),
            }
        }
    }

    /// Next frame before `deadline`, observed on the way.
    fn next_frame(
        &self,
        channel: &mut CastChannel,
        deadline: Instant,
        timeout: Duration,
    ) -> Result<CastFrame, CastError> {
        while Instant::now() < deadline {
            if let Some(frame) = channel.read_frame()? {
                if !self.observe(&frame) {
                    return Err(CastError::NotConnected);
                }
                return Ok(frame);
            }
        }
        Err(CastError::Timeout(timeout))
    }
}
