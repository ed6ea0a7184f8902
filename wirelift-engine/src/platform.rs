//! Platform capability seam
//!
//! Everything OS specific the orchestrator needs sits behind [`Platform`]:
//! creating and removing interfaces, pushing tunnel configuration, reading
//! handshakes and allowed-ips, installing routes and swapping the default
//! gateway. The orchestrator in [`crate::service`] holds one platform by
//! composition and never branches on the OS itself.

pub mod linux;
pub mod mock;

use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::SystemTime;

use wirelift_net::{Gateway, GatewaySwitch, VirtualAddress};

use crate::command::CommandChannel;
use crate::error::{BoxError, Result};
use crate::hook;
use crate::vpn::{VpnConfiguration, VpnConfigurationBuilder, VpnPeer, VpnPeerBuilder};

pub use linux::LinuxPlatform;
pub use mock::MockPlatform;

/// Outcome of a successful apply step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// The interface is usable now
    Ready,
    /// Liveness must be confirmed by waiting for a handshake
    AwaitHandshake,
}

/// How a configuration file updates a live interface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    /// Replace everything, active peers may be disrupted
    Replace,
    /// Apply the difference, unaffected peers are left alone
    Sync,
    /// Add peers without removing existing ones
    Append,
}

impl std::fmt::Display for UpdateMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            UpdateMode::Replace => "replace",
            UpdateMode::Sync => "sync",
            UpdateMode::Append => "append",
        };
        write!(f, "{}", name)
    }
}

/// Live statistics for one peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInformation {
    pub public_key: String,
    pub preshared_key: Option<String>,
    pub endpoint: Option<SocketAddr>,
    pub allowed_ips: Vec<String>,
    /// `None` until the first handshake
    pub last_handshake: Option<SystemTime>,
    pub rx: u64,
    pub tx: u64,
}

/// Live statistics for one interface
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InterfaceInformation {
    pub interface_name: String,
    pub public_key: String,
    pub listen_port: Option<u16>,
    pub fwmark: Option<u32>,
    pub peers: Vec<PeerInformation>,
}

impl InterfaceInformation {
    /// Total bytes received across peers
    pub fn rx(&self) -> u64 {
        self.peers.iter().map(|p| p.rx).sum()
    }

    /// Total bytes sent across peers
    pub fn tx(&self) -> u64 {
        self.peers.iter().map(|p| p.tx).sum()
    }

    /// Most recent handshake of any peer
    pub fn last_handshake(&self) -> Option<SystemTime> {
        self.peers.iter().filter_map(|p| p.last_handshake).max()
    }

    pub fn peer(&self, public_key: &str) -> Option<&PeerInformation> {
        self.peers.iter().find(|p| p.public_key == public_key)
    }
}

/// OS specific operations consumed by the adapter orchestrator
pub trait Platform: Send + Sync {
    /// Platform key, also used to partition persisted name mappings
    fn name(&self) -> &str;

    /// Command channel this platform runs OS tools through
    fn commands(&self) -> &dyn CommandChannel;

    /// Prefix of numbered native interface slots
    fn interface_prefix(&self) -> &str;

    /// Whether the OS would accept `name` as a native interface name
    fn is_valid_native_interface_name(&self, name: &str) -> bool;

    /// Native names of every live tunnel interface
    fn interfaces(&self) -> Result<Vec<String>>;

    /// Whether a tunnel interface with this native name exists
    fn exists(&self, native_name: &str) -> Result<bool> {
        Ok(self.interfaces()?.iter().any(|n| n == native_name))
    }

    /// Describe an existing interface
    fn address(&self, name: &str, native_name: &str) -> Result<VirtualAddress>;

    /// Create a new tunnel interface
    fn add(&self, name: &str, native_name: &str) -> Result<VirtualAddress>;

    /// Public key currently active on an interface, if any
    fn public_key(&self, native_name: &str) -> Result<Option<String>>;

    /// Install keys, peers, addresses and MTU onto an allocated interface
    ///
    /// `configuration` is what the caller asked for, `effective` is the
    /// transformed configuration that goes to the tunnel itself.
    fn apply(
        &self,
        address: &VirtualAddress,
        configuration: &VpnConfiguration,
        effective: &VpnConfiguration,
    ) -> std::result::Result<Applied, BoxError>;

    /// Time of the latest handshake with a peer, `None` if there was none
    fn latest_handshake(&self, native_name: &str, public_key: &str) -> Result<Option<SystemTime>>;

    /// Bring an interface down
    fn down(&self, address: &VirtualAddress) -> Result<()>;

    /// Remove an interface from the OS
    fn delete(&self, address: &VirtualAddress) -> Result<()>;

    /// Release in-process resources held for an interface
    fn close(&self, _address: &VirtualAddress) -> Result<()> {
        Ok(())
    }

    /// Called during stop after default gateway routing has been undone
    fn on_stopped(&self, _address: &VirtualAddress) -> Result<()> {
        Ok(())
    }

    /// Apply a configuration file to a live interface
    fn set_configuration(&self, native_name: &str, path: &Path, mode: UpdateMode) -> Result<()>;

    /// Remove one peer from a live interface
    fn remove_peer(&self, native_name: &str, public_key: &str) -> Result<()>;

    /// Allowed-ips the tunnel reports for all peers of an interface
    fn allowed_ips(&self, native_name: &str) -> Result<Vec<String>>;

    /// Whether the orchestrator should install routes for allowed-ips
    fn installs_routes(&self) -> bool {
        false
    }

    /// Install routes through an interface, in the given order
    fn set_routes(&self, _address: &VirtualAddress, _routes: &[String]) -> Result<()> {
        Ok(())
    }

    /// The OS default gateway, if one is set
    fn default_gateway(&self) -> Result<Option<Gateway>>;

    /// Route all traffic through the tunnel side of a switch
    fn set_default_gateway(&self, switch: &GatewaySwitch) -> Result<()>;

    /// Undo [`Platform::set_default_gateway`]
    fn reset_default_gateway(&self, switch: &GatewaySwitch) -> Result<()>;

    /// Addresses of local non-loopback interfaces that are up
    fn local_addresses(&self) -> Result<Vec<IpAddr>> {
        Ok(wirelift_net::local::local_addresses()?)
    }

    /// Strip interface fields the tunnel cannot express on this OS
    fn transform_interface(&self, builder: VpnConfigurationBuilder) -> VpnConfigurationBuilder {
        builder
    }

    /// Adjust a peer before it is pushed to the tunnel
    fn transform_peer(&self, _peer: &VpnPeer, builder: VpnPeerBuilder) -> VpnPeerBuilder {
        builder
    }

    /// Live statistics of an interface
    fn information(&self, address: &VirtualAddress) -> Result<InterfaceInformation>;

    /// Live configuration of an interface, as the tunnel reports it
    fn configuration(&self, native_name: &str) -> Result<VpnConfiguration>;

    /// Hardware address of an interface
    fn mac_address(&self, native_name: &str) -> Option<String> {
        wirelift_net::local::mac_address(native_name)
    }

    /// Run one hook line with the given environment
    fn run_hook(&self, line: &str, env: &[(String, String)]) -> Result<()> {
        hook::run_line(self.commands().privileged(), line, env)
    }
}
