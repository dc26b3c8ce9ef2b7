//! mDNS discovery of Cast endpoints.

use async_trait::async_trait;
use mdns_sd::{ResolvedService, ServiceDaemon, ServiceEvent};
use spotcast_core::{CastError, DiscoverySweep, EndpointDescriptor, EndpointDiscovery};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const CAST_SERVICE_TYPE: &str = "_googlecast._tcp.local.";
/// How long one try listens for announcements
const BROWSE_WINDOW: Duration = Duration::from_millis(1800);
const BROWSE_POLL: Duration = Duration::from_millis(250);

/// Browses `_googlecast._tcp` on the local network.
#[derive(Debug, Clone, Copy, Default)]
pub struct MdnsDiscovery;

impl MdnsDiscovery {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EndpointDiscovery for MdnsDiscovery {
    async fn discover(&self, sweep: DiscoverySweep) -> Result<Vec<EndpointDescriptor>, CastError> {
        let deadline = Instant::now() + sweep.timeout;
        let mut found: HashMap<String, EndpointDescriptor> = HashMap::new();

        for attempt in 1..=sweep.tries.max(1) {
            let window = deadline
                .saturating_duration_since(Instant::now())
                .min(BROWSE_WINDOW);
            if window.is_zero() {
                break;
            }

            let batch = tokio::task::spawn_blocking(move || browse_once(window))
                .await
                .map_err(|e| CastError::Discovery {
                    reason: e.to_string(),
                })??;
            debug!(
                "Discovery try {}/{} saw {} endpoint(s)",
                attempt,
                sweep.tries,
                batch.len()
            );
            for endpoint in batch {
                found.insert(endpoint.uuid.clone(), endpoint);
            }
            if !found.is_empty() || attempt == sweep.tries {
                break;
            }

            let wait = deadline
                .saturating_duration_since(Instant::now())
                .min(sweep.retry_wait);
            tokio::time::sleep(wait).await;
        }

        let mut endpoints: Vec<EndpointDescriptor> = found.into_values().collect();
        endpoints.sort_by_key(|e| e.name.to_lowercase());
        Ok(endpoints)
    }
}

fn browse_once(window: Duration) -> Result<Vec<EndpointDescriptor>, CastError> {
    let mdns = ServiceDaemon::new().map_err(|e| CastError::Discovery {
        reason: e.to_string(),
    })?;
    let receiver = match mdns.browse(CAST_SERVICE_TYPE) {
        Ok(receiver) => receiver,
        Err(e) => {
            let _ = mdns.shutdown();
            return Err(CastError::Discovery {
                reason: e.to_string(),
            });
        }
    };

    let deadline = Instant::now() + window;
    let mut endpoints = Vec::new();
    while Instant::now() < deadline {
        let timeout = deadline
            .saturating_duration_since(Instant::now())
            .min(BROWSE_POLL);
        let Ok(event) = receiver.recv_timeout(timeout) else {
            continue;
        };
        if let ServiceEvent::ServiceResolved(service) = event
            && let Some(endpoint) = endpoint_from_service(&service)
        {
            endpoints.push(endpoint);
        }
    }

    if let Err(e) = mdns.stop_browse(CAST_SERVICE_TYPE) {
        debug!("Failed to stop mDNS browse cleanly: {}", e);
    }
    if let Err(e) = mdns.shutdown() {
        warn!("Failed to shut down mDNS daemon: {}", e);
    }
    Ok(endpoints)
}

fn txt_value(service: &ResolvedService, key: &str) -> Option<String> {
    service
        .get_property_val_str(key)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
}

fn endpoint_from_service(service: &ResolvedService) -> Option<EndpointDescriptor> {
    // IPv4 first, the TLS channel connects by address
    let mut v4_addresses: Vec<_> = service.get_addresses_v4().iter().copied().collect();
    v4_addresses.sort();
    let host = v4_addresses.first().map(ToString::to_string)?;
    let port = service.get_port();

    let name = txt_value(service, "fn")
        .unwrap_or_else(|| instance_name_from_fullname(service.get_fullname()));
    let uuid = txt_value(service, "id").unwrap_or_else(|| format!("{host}:{port}"));

    Some(EndpointDescriptor {
        host,
        port,
        uuid,
        model: txt_value(service, "md").unwrap_or_default(),
        manufacturer: None,
        name,
    })
}

/// `Living-Room-abc123._googlecast._tcp.local.` -> `Living-Room-abc123`
fn instance_name_from_fullname(fullname: &str) -> String {
    fullname
        .strip_suffix(CAST_SERVICE_TYPE)
        .map_or(fullname, |name| name.trim_end_matches('.'))
        .to_string()
}
