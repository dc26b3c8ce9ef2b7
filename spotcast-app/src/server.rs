//! HTTP entry points for play and control events.

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use spotcast_core::{ControlRequest, CoreError, PlayRequest, PlayerHandle, ServerConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Invalid bind address \"{address}\"")]
    InvalidAddress { address: String },

    #[error("Failed to bind to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("Event server failed: {0}")]
    Serve(#[from] std::io::Error),
}

/// Where accepted events go
pub trait EventSink: Send + Sync {
    /// Queue a play event.
    ///
    /// # Errors
    ///
    /// Returns an error if the event can no longer be handled.
    fn play(&self, request: PlayRequest) -> Result<(), CoreError>;

    /// Queue a control event.
    ///
    /// # Errors
    ///
    /// Returns an error if the event can no longer be handled.
    fn control(&self, request: ControlRequest) -> Result<(), CoreError>;
}

impl EventSink for PlayerHandle {
    fn play(&self, request: PlayRequest) -> Result<(), CoreError> {
        Self::play(self, request)
    }

    fn control(&self, request: ControlRequest) -> Result<(), CoreError> {
        Self::control(self, request)
    }
}

type Sink = Arc<dyn EventSink>;

/// Events are queued, not awaited: both routes answer 202 once accepted.
pub fn router(config: &ServerConfig, sink: Sink) -> Router {
    Router::new()
        .route(&config.play_path(), post(play))
        .route(&config.controls_path(), post(controls))
        .with_state(sink)
}

async fn play(
    State(sink): State<Sink>,
    payload: Result<Json<PlayRequest>, JsonRejection>,
) -> StatusCode {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(e) => {
            warn!("Rejected play event: {}", e);
            return e.status();
        }
    };
    accepted(sink.play(request))
}

async fn controls(
    State(sink): State<Sink>,
    payload: Result<Json<ControlRequest>, JsonRejection>,
) -> StatusCode {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(e) => {
            warn!("Rejected control event: {}", e);
            return e.status();
        }
    };
    accepted(sink.control(request))
}

fn accepted(result: Result<(), CoreError>) -> StatusCode {
    match result {
        Ok(()) => StatusCode::ACCEPTED,
        Err(e) => {
            warn!("Event not queued: {}", e);
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

/// Serve the entry points until `cancel_token` fires.
///
/// # Errors
///
/// Returns an error if the address is invalid, cannot be bound, or serving fails.
pub async fn serve(
    config: &ServerConfig,
    sink: Sink,
    cancel_token: CancellationToken,
) -> Result<(), ServerError> {
    let addr: SocketAddr = config
        .bind
        .parse()
        .map_err(|_| ServerError::InvalidAddress {
            address: config.bind.clone(),
        })?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;

    info!(
        "Listening for events on http://{}{} and http://{}{}",
        addr,
        config.play_path(),
        addr,
        config.controls_path()
    );
    axum::serve(listener, router(config, sink))
        .with_graceful_shutdown(async move { cancel_token.cancelled().await })
        .await?;
    info!("Event server stopped");
    Ok(())
}
