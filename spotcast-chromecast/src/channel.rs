//! Blocking TLS control channel to one Cast endpoint.

use crate::frame::CastFrame;
use serde_json::{Value, json};
use spotcast_core::{CastError, CastStatus, EndpointDescriptor, MediaStatus};
use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

pub const NAMESPACE_CONNECTION: &str = "urn:x-cast:com.google.cast.tp.connection";
pub const NAMESPACE_HEARTBEAT: &str = "urn:x-cast:com.google.cast.tp.heartbeat";
pub const NAMESPACE_RECEIVER: &str = "urn:x-cast:com.google.cast.receiver";
pub const NAMESPACE_MEDIA: &str = "urn:x-cast:com.google.cast.media";
pub const NAMESPACE_SPOTIFY: &str = "urn:x-cast:com.spotify.chromecast.secure.v1";

pub const RECEIVER_ID: &str = "receiver-0";
const SENDER_ID: &str = "sender-spotcast";

/// Short read timeout so the worker loop can interleave commands with reads
const READ_TIMEOUT: Duration = Duration::from_millis(180);
const WRITE_TIMEOUT: Duration = Duration::from_millis(1500);
/// Largest frame we accept from a receiver
const MAX_FRAME_LEN: usize = 64 * 1024;

pub struct CastChannel {
    stream: native_tls::TlsStream<TcpStream>,
    next_request_id: i64,
}

impl CastChannel {
    /// Connect and open the virtual connection to the platform receiver.
    ///
    /// # Errors
    ///
    /// Returns an error if the address does not resolve, the TCP connect or
    /// TLS handshake fails, or the first write fails.
    pub fn open(
        endpoint: &EndpointDescriptor,
        connect_timeout: Duration,
    ) -> Result<Self, CastError> {
        let address = resolve_address(&endpoint.host, endpoint.port)?;
        let tcp = TcpStream::connect_timeout(&address, connect_timeout)?;
        tcp.set_read_timeout(Some(READ_TIMEOUT))?;
        tcp.set_write_timeout(Some(WRITE_TIMEOUT))?;

        // Cast devices present self-signed certificates
        let connector = native_tls::TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true)
            .build()
            .map_err(|e| CastError::Tls {
                reason: e.to_string(),
            })?;
        let stream = connector
            .connect(&endpoint.host, tcp)
            .map_err(|e| CastError::Tls {
                reason: e.to_string(),
            })?;

        let mut channel = Self {
            stream,
            next_request_id: 1,
        };
        channel.connect_to(RECEIVER_ID)?;
        Ok(channel)
    }

    pub fn alloc_request_id(&mut self) -> i64 {
        let id = self.next_request_id;
        self.next_request_id += 1;
        id
    }

    /// Open a virtual connection to `destination` (the platform or an app transport).
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn connect_to(&mut self, destination: &str) -> Result<(), CastError> {
        self.send_json(
            NAMESPACE_CONNECTION,
            destination,
            &json!({"type": "CONNECT", "origin": {}}),
        )
    }

    /// Ask the platform receiver for its status.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn request_status(&mut self) -> Result<(), CastError> {
        let request_id = self.alloc_request_id();
        self.send_json(
            NAMESPACE_RECEIVER,
            RECEIVER_ID,
            &json!({"type": "GET_STATUS", "requestId": request_id}),
        )
    }

    /// # Errors
    ///
    /// Returns an error if the frame cannot be encoded or written.
    pub fn send_json(
        &mut self,
        namespace: &str,
        destination: &str,
        payload: &Value,
    ) -> Result<(), CastError> {
        let frame = CastFrame::new(SENDER_ID, destination, namespace, payload.to_string())
            .encode()
            .map_err(|e| CastError::Protocol {
                reason: e.to_string(),
            })?;
        self.stream.write_all(&frame)?;
        Ok(())
    }

    /// Read one frame, or `None` when nothing arrived within the read timeout.
    /// Heartbeat pings are answered here and never returned.
    ///
    /// # Errors
    ///
    /// Returns an error when the connection is closed or a frame is malformed.
    pub fn read_frame(&mut self) -> Result<Option<CastFrame>, CastError> {
        let mut len_buf = [0u8; 4];
        match self.stream.read_exact(&mut len_buf) {
            Ok(()) => {}
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        }
        let len = usize::try_from(u32::from_be_bytes(len_buf)).unwrap_or(usize::MAX);
        if len == 0 {
            return Ok(None);
        }
        if len > MAX_FRAME_LEN {
            return Err(CastError::Protocol {
                reason: format!("frame of {len} bytes exceeds limit"),
            });
        }
        let mut body = vec![0u8; len];
        self.stream.read_exact(&mut body)?;
        let frame = CastFrame::decode(&body).map_err(|e| CastError::Protocol {
            reason: e.to_string(),
        })?;

        if frame.namespace == NAMESPACE_HEARTBEAT {
            if message_type(&frame.payload).as_deref() == Some("PING") {
                self.send_json(NAMESPACE_HEARTBEAT, &frame.source_id, &json!({"type": "PONG"}))?;
            }
            return Ok(None);
        }
        Ok(Some(frame))
    }

    /// Close the platform connection. Errors are irrelevant at this point.
    pub fn close(mut self) {
        let _ = self.send_json(NAMESPACE_CONNECTION, RECEIVER_ID, &json!({"type": "CLOSE"}));
        let _ = self.stream.shutdown();
    }
}

fn resolve_address(host: &str, port: u16) -> Result<SocketAddr, CastError> {
    (host, port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| CastError::Protocol {
            reason: format!("{host}:{port} does not resolve"),
        })
}

/// The `type` field of a JSON payload
#[must_use]
pub fn message_type(payload: &str) -> Option<String> {
    let value: Value = serde_json::from_str(payload).ok()?;
    value.get("type")?.as_str().map(ToString::to_string)
}

/// Running app of a `RECEIVER_STATUS` payload. An idle receiver yields a
/// status with no app.
#[must_use]
pub fn parse_receiver_status(payload: &str) -> Option<CastStatus> {
    let value: Value = serde_json::from_str(payload).ok()?;
    if value.get("type").and_then(Value::as_str) != Some("RECEIVER_STATUS") {
        return None;
    }
    let app = value
        .get("status")
        .and_then(|status| status.get("applications"))
        .and_then(Value::as_array)
        .and_then(|apps| apps.first());
    let field = |name: &str| {
        app.and_then(|app| app.get(name))
            .and_then(Value::as_str)
            .map(ToString::to_string)
    };
    Some(CastStatus {
        app_id: field("appId"),
        display_name: field("displayName"),
    })
}

/// Transport id of `app_id` in a `RECEIVER_STATUS` payload.
#[must_use]
pub fn find_transport_id(payload: &str, app_id: &str) -> Option<String> {
    let value: Value = serde_json::from_str(payload).ok()?;
    value
        .get("status")?
        .get("applications")?
        .as_array()?
        .iter()
        .find(|app| app.get("appId").and_then(Value::as_str) == Some(app_id))?
        .get("transportId")?
        .as_str()
        .map(ToString::to_string)
}

#[must_use]
pub fn parse_media_status(payload: &str) -> Option<MediaStatus> {
    let value: Value = serde_json::from_str(payload).ok()?;
    if value.get("type").and_then(Value::as_str) != Some("MEDIA_STATUS") {
        return None;
    }
    let status = value.get("status")?.as_array()?.first()?;
    Some(MediaStatus {
        player_state: status
            .get("playerState")
            .and_then(Value::as_str)
            .unwrap_or("UNKNOWN")
            .to_string(),
    })
}
