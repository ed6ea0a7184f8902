//! Handshake confirmation
//!
//! A handshake is the only proof a tunnel is alive. After applying a
//! configuration the orchestrator polls for one; a connection that cannot
//! prove liveness in time is torn down rather than left half up.

use std::net::IpAddr;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use wirelift_net::VirtualAddress;

use crate::error::{Error, Result};
use crate::platform::Platform;
use crate::vpn::{VpnConfiguration, VpnPeer};

/// Result of polling for a handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeOutcome {
    Connected,
    TimedOut,
    /// The handshake lookup itself failed
    Failed(String),
}

/// The earliest handshake time that counts as belonging to this connection
///
/// Handshake times have whole second resolution, so this is the current
/// second minus one.
pub fn connection_started() -> SystemTime {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    UNIX_EPOCH + Duration::from_secs(secs.saturating_sub(1))
}

/// Poll until a handshake at or after `started` is seen, or time runs out
pub fn poll_handshake(
    platform: &dyn Platform,
    native_name: &str,
    public_key: &str,
    started: SystemTime,
    timeout: Duration,
    interval: Duration,
) -> HandshakeOutcome {
    let interval = interval.max(Duration::from_millis(1));
    let attempts = (timeout.as_millis() / interval.as_millis()).max(1);

    for _ in 0..attempts {
        thread::sleep(interval);
        match platform.latest_handshake(native_name, public_key) {
            Ok(Some(at)) if at >= started => return HandshakeOutcome::Connected,
            Ok(_) => {}
            Err(e) => return HandshakeOutcome::Failed(e.to_string()),
        }
    }
    HandshakeOutcome::TimedOut
}

/// Wait for the first handshake from the gating peer
///
/// Returns `Ok(false)` at once when there is not exactly one peer, no peer
/// was requested, or the peer has no endpoint, and `Ok(true)` once a
/// handshake is seen. On timeout or lookup failure the
/// interface is brought down and deleted, each exactly once, and
/// [`Error::NoHandshake`] is returned.
pub fn wait_for_first_handshake(
    platform: &dyn Platform,
    configuration: &VpnConfiguration,
    address: &VirtualAddress,
    started: SystemTime,
    peer: Option<&VpnPeer>,
    timeout: Duration,
    interval: Duration,
) -> Result<bool> {
    if configuration.peers().len() != 1 {
        log::info!("Not waiting for handshake, there are either no or multiple peers.");
        return Ok(false);
    }
    let peer = match peer {
        Some(peer) => peer,
        None => {
            log::info!("Not waiting for handshake, no peer specified.");
            return Ok(false);
        }
    };
    let endpoint = match peer.endpoint_address() {
        Some(endpoint) => endpoint,
        None => {
            log::info!("Not waiting for handshake, the peer has no endpoint.");
            return Ok(false);
        }
    };

    log::info!(
        "Waiting for handshake for {} seconds on {}",
        timeout.as_secs(),
        address.short_name()
    );

    let outcome = poll_handshake(
        platform,
        &address.native_name,
        peer.public_key(),
        started,
        timeout,
        interval,
    );
    match outcome {
        HandshakeOutcome::Connected => {
            log::info!("Handshake received on {}", address.short_name());
            return Ok(true);
        }
        HandshakeOutcome::TimedOut => {
            log::warn!("No handshake on {} within {:?}", address.short_name(), timeout);
        }
        HandshakeOutcome::Failed(reason) => {
            log::error!("Failed to query handshake on {}: {}", address.short_name(), reason);
        }
    }

    rollback(platform, address);

    Err(Error::NoHandshake {
        endpoint: endpoint.to_string(),
        hostname: endpoint_hostname(endpoint),
        interface: address.short_name().to_string(),
        timeout: timeout.as_secs(),
    })
}

fn rollback(platform: &dyn Platform, address: &VirtualAddress) {
    if let Err(e) = platform.down(address) {
        log::error!("Failed to bring down {}: {}", address.native_name, e);
    }
    if let Err(e) = platform.delete(address) {
        log::error!("Failed to delete {}: {}", address.native_name, e);
    }
}

/// Best effort reverse lookup; host names are returned as given
fn endpoint_hostname(endpoint: &str) -> String {
    match endpoint.parse::<IpAddr>() {
        Ok(ip) => wirelift_net::local::reverse_lookup(ip).unwrap_or_else(|| endpoint.to_string()),
        Err(_) => endpoint.to_string(),
    }
}
