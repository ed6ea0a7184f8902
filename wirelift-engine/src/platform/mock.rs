//! In-memory platform for tests
//!
//! Keeps interfaces, peers, routes and the default gateway in memory, counts
//! teardown calls and can be told to fail any single operation. Hook lines go
//! through a [`ScriptedCommands`] so tests can script their exit status.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::net::IpAddr;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::SystemTime;

use wirelift_net::{Gateway, GatewaySwitch, VirtualAddress, DEFAULT_MTU};

use super::{Applied, InterfaceInformation, PeerInformation, Platform, UpdateMode};
use crate::command::mock::ScriptedCommands;
use crate::command::CommandChannel;
use crate::error::{BoxError, Error, Result};
use crate::vpn::VpnConfiguration;
use crate::wgconf;

/// Operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fail {
    Add,
    Apply,
    Down,
    Delete,
    Close,
    OnStopped,
    SetRoutes,
    SetDefaultGateway,
    ResetDefaultGateway,
    LatestHandshake,
}

/// How the mock answers handshake queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeMode {
    /// Every query reports a handshake that just happened
    Immediate,
    /// A handshake appears after this many queries
    AfterPolls(u32),
    /// No handshake ever
    Never,
}

/// Error raised by injected failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockError(pub String);

impl fmt::Display for MockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mock failure: {}", self.0)
    }
}

impl std::error::Error for MockError {}

#[derive(Debug, Clone)]
struct MockInterface {
    public_key: Option<String>,
    up: bool,
    mtu: u32,
    configuration: Option<VpnConfiguration>,
    routes: Vec<String>,
}

struct MockState {
    interfaces: BTreeMap<String, MockInterface>,
    failures: HashSet<Fail>,
    handshake: HandshakeMode,
    polls: u32,
    applied: Applied,
    default_gateway: Option<Gateway>,
    local_addresses: Vec<IpAddr>,
    effective: Vec<VpnConfiguration>,
    journal: Vec<String>,
}

/// Stateful in-memory [`Platform`]
pub struct MockPlatform {
    commands: Arc<ScriptedCommands>,
    prefix: String,
    state: Mutex<MockState>,
}

impl Default for MockPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPlatform {
    pub fn new() -> Self {
        Self {
            commands: Arc::new(ScriptedCommands::new()),
            prefix: "wg".to_string(),
            state: Mutex::new(MockState {
                interfaces: BTreeMap::new(),
                failures: HashSet::new(),
                handshake: HandshakeMode::Immediate,
                polls: 0,
                applied: Applied::AwaitHandshake,
                default_gateway: None,
                local_addresses: Vec::new(),
                effective: Vec::new(),
                journal: Vec::new(),
            }),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check(&self, fail: Fail) -> Result<()> {
        if self.state().failures.contains(&fail) {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                MockError(format!("{:?}", fail)),
            )));
        }
        Ok(())
    }

    fn record(&self, entry: String) {
        self.state().journal.push(entry);
    }

    /// Scripted channel hook lines run through
    pub fn hooks(&self) -> &ScriptedCommands {
        &self.commands
    }

    /// Seed an existing interface, optionally with an active key
    pub fn seed(&self, native_name: &str, public_key: Option<&str>) {
        self.state().interfaces.insert(
            native_name.to_string(),
            MockInterface {
                public_key: public_key.map(str::to_string),
                up: public_key.is_some(),
                mtu: DEFAULT_MTU,
                configuration: None,
                routes: Vec::new(),
            },
        );
    }

    /// Make an operation fail until [`MockPlatform::heal`] is called
    pub fn fail(&self, fail: Fail) {
        self.state().failures.insert(fail);
    }

    pub fn heal(&self, fail: Fail) {
        self.state().failures.remove(&fail);
    }

    pub fn set_handshake(&self, mode: HandshakeMode) {
        let mut state = self.state();
        state.handshake = mode;
        state.polls = 0;
    }

    /// What `apply` reports on success
    pub fn set_applied(&self, applied: Applied) {
        self.state().applied = applied;
    }

    pub fn set_os_default_gateway(&self, gateway: Option<Gateway>) {
        self.state().default_gateway = gateway;
    }

    pub fn set_local_addresses(&self, addresses: Vec<IpAddr>) {
        self.state().local_addresses = addresses;
    }

    /// Native names of every interface
    pub fn native_names(&self) -> Vec<String> {
        self.state().interfaces.keys().cloned().collect()
    }

    /// Effective configurations handed to `apply`, oldest first
    pub fn effective(&self) -> Vec<VpnConfiguration> {
        self.state().effective.clone()
    }

    /// Routes installed on an interface, in install order
    pub fn routes(&self, native_name: &str) -> Vec<String> {
        self.state()
            .interfaces
            .get(native_name)
            .map(|i| i.routes.clone())
            .unwrap_or_default()
    }

    /// Every state changing call, as `operation target`
    pub fn journal(&self) -> Vec<String> {
        self.state().journal.clone()
    }

    /// How many journal entries start with `operation`
    pub fn count(&self, operation: &str) -> usize {
        let prefix = format!("{} ", operation);
        self.state()
            .journal
            .iter()
            .filter(|e| e.starts_with(&prefix))
            .count()
    }

    /// Number of handshake queries so far
    pub fn polls(&self) -> u32 {
        self.state().polls
    }

    fn missing(native_name: &str) -> Error {
        Error::NotFound(format!("interface `{}`", native_name))
    }
}

impl Platform for MockPlatform {
    fn name(&self) -> &str {
        "mock"
    }

    fn commands(&self) -> &dyn CommandChannel {
        self.commands.as_ref()
    }

    fn interface_prefix(&self) -> &str {
        &self.prefix
    }

    fn is_valid_native_interface_name(&self, name: &str) -> bool {
        !name.is_empty() && name.len() <= 15 && !name.contains(char::is_whitespace)
    }

    fn interfaces(&self) -> Result<Vec<String>> {
        Ok(self.native_names())
    }

    fn address(&self, name: &str, native_name: &str) -> Result<VirtualAddress> {
        let state = self.state();
        let iface = state
            .interfaces
            .get(native_name)
            .ok_or_else(|| Self::missing(native_name))?;
        Ok(VirtualAddress::new(name, native_name)
            .with_mtu(iface.mtu)
            .with_up(iface.up))
    }

    fn add(&self, name: &str, native_name: &str) -> Result<VirtualAddress> {
        self.check(Fail::Add)?;
        self.seed(native_name, None);
        self.record(format!("add {}", native_name));
        Ok(VirtualAddress::new(name, native_name))
    }

    fn public_key(&self, native_name: &str) -> Result<Option<String>> {
        Ok(self
            .state()
            .interfaces
            .get(native_name)
            .and_then(|i| i.public_key.clone()))
    }

    fn apply(
        &self,
        address: &VirtualAddress,
        configuration: &VpnConfiguration,
        effective: &VpnConfiguration,
    ) -> std::result::Result<Applied, BoxError> {
        if self.state().failures.contains(&Fail::Apply) {
            return Err(Box::new(MockError("apply".into())));
        }
        self.record(format!("apply {}", address.native_name));
        let mut state = self.state();
        state.effective.push(effective.clone());
        let iface = state
            .interfaces
            .get_mut(&address.native_name)
            .ok_or_else(|| Self::missing(&address.native_name))?;
        iface.public_key = Some(effective.public_key().to_string());
        iface.configuration = Some(effective.clone());
        iface.mtu = configuration.mtu().unwrap_or(DEFAULT_MTU);
        iface.up = true;
        Ok(state.applied)
    }

    fn latest_handshake(&self, native_name: &str, _public_key: &str) -> Result<Option<SystemTime>> {
        self.check(Fail::LatestHandshake)?;
        let mut state = self.state();
        if !state.interfaces.contains_key(native_name) {
            return Err(Self::missing(native_name));
        }
        state.polls += 1;
        Ok(match state.handshake {
            HandshakeMode::Immediate => Some(SystemTime::now()),
            HandshakeMode::AfterPolls(n) if state.polls >= n => Some(SystemTime::now()),
            HandshakeMode::AfterPolls(_) | HandshakeMode::Never => None,
        })
    }

    fn down(&self, address: &VirtualAddress) -> Result<()> {
        self.record(format!("down {}", address.native_name));
        self.check(Fail::Down)?;
        if let Some(iface) = self.state().interfaces.get_mut(&address.native_name) {
            iface.up = false;
        }
        Ok(())
    }

    fn delete(&self, address: &VirtualAddress) -> Result<()> {
        self.record(format!("delete {}", address.native_name));
        self.check(Fail::Delete)?;
        self.state().interfaces.remove(&address.native_name);
        Ok(())
    }

    fn close(&self, address: &VirtualAddress) -> Result<()> {
        self.record(format!("close {}", address.native_name));
        self.check(Fail::Close)
    }

    fn on_stopped(&self, address: &VirtualAddress) -> Result<()> {
        self.record(format!("stopped {}", address.native_name));
        self.check(Fail::OnStopped)
    }

    fn set_configuration(&self, native_name: &str, path: &Path, mode: UpdateMode) -> Result<()> {
        let incoming = wgconf::load(path)?;
        self.record(format!("{} {}", mode, native_name));
        let mut state = self.state();
        let iface = state
            .interfaces
            .get_mut(native_name)
            .ok_or_else(|| Self::missing(native_name))?;
        let merged = match (mode, iface.configuration.take()) {
            (UpdateMode::Append, Some(current)) => {
                let mut peers = current.peers().to_vec();
                for peer in incoming.peers() {
                    match peers.iter_mut().find(|p| p.public_key() == peer.public_key()) {
                        Some(existing) => *existing = peer.clone(),
                        None => peers.push(peer.clone()),
                    }
                }
                current.to_builder().peers(peers).build()?
            }
            _ => incoming,
        };
        iface.public_key = Some(merged.public_key().to_string());
        iface.configuration = Some(merged);
        Ok(())
    }

    fn remove_peer(&self, native_name: &str, public_key: &str) -> Result<()> {
        self.record(format!("remove-peer {}", native_name));
        let mut state = self.state();
        let iface = state
            .interfaces
            .get_mut(native_name)
            .ok_or_else(|| Self::missing(native_name))?;
        let current = iface
            .configuration
            .take()
            .ok_or_else(|| Error::NotFound(format!("peer {}", public_key)))?;
        if !current.has_peer(public_key) {
            iface.configuration = Some(current);
            return Err(Error::NotFound(format!("peer {}", public_key)));
        }
        let peers: Vec<_> = current
            .peers()
            .iter()
            .filter(|p| p.public_key() != public_key)
            .cloned()
            .collect();
        iface.configuration = Some(current.to_builder().peers(peers).build()?);
        Ok(())
    }

    fn allowed_ips(&self, native_name: &str) -> Result<Vec<String>> {
        let state = self.state();
        let iface = state
            .interfaces
            .get(native_name)
            .ok_or_else(|| Self::missing(native_name))?;
        Ok(iface
            .configuration
            .as_ref()
            .map(VpnConfiguration::allowed_ips)
            .unwrap_or_default())
    }

    fn installs_routes(&self) -> bool {
        true
    }

    fn set_routes(&self, address: &VirtualAddress, routes: &[String]) -> Result<()> {
        self.record(format!("routes {}", address.native_name));
        self.check(Fail::SetRoutes)?;
        if let Some(iface) = self.state().interfaces.get_mut(&address.native_name) {
            iface.routes = routes.to_vec();
        }
        Ok(())
    }

    fn default_gateway(&self) -> Result<Option<Gateway>> {
        Ok(self.state().default_gateway.clone())
    }

    fn set_default_gateway(&self, switch: &GatewaySwitch) -> Result<()> {
        self.record(format!("gateway-set {}", switch.tunnel));
        self.check(Fail::SetDefaultGateway)?;
        self.state().default_gateway = Some(switch.tunnel.clone());
        Ok(())
    }

    fn reset_default_gateway(&self, switch: &GatewaySwitch) -> Result<()> {
        self.record(format!("gateway-reset {}", switch.tunnel));
        self.check(Fail::ResetDefaultGateway)?;
        self.state().default_gateway = Some(switch.previous.clone());
        Ok(())
    }

    fn local_addresses(&self) -> Result<Vec<IpAddr>> {
        Ok(self.state().local_addresses.clone())
    }

    fn information(&self, address: &VirtualAddress) -> Result<InterfaceInformation> {
        let state = self.state();
        let iface = state
            .interfaces
            .get(&address.native_name)
            .ok_or_else(|| Self::missing(&address.native_name))?;
        let peers = iface
            .configuration
            .as_ref()
            .map(|c| {
                c.peers()
                    .iter()
                    .map(|p| PeerInformation {
                        public_key: p.public_key().to_string(),
                        preshared_key: p.preshared_key().map(str::to_string),
                        endpoint: p.endpoint().and_then(|e| e.parse().ok()),
                        allowed_ips: p.allowed_ips().to_vec(),
                        last_handshake: None,
                        rx: 0,
                        tx: 0,
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(InterfaceInformation {
            interface_name: address.name.clone(),
            public_key: iface.public_key.clone().unwrap_or_default(),
            listen_port: None,
            fwmark: None,
            peers,
        })
    }

    fn configuration(&self, native_name: &str) -> Result<VpnConfiguration> {
        self.state()
            .interfaces
            .get(native_name)
            .and_then(|i| i.configuration.clone())
            .ok_or_else(|| Self::missing(native_name))
    }

    fn mac_address(&self, _native_name: &str) -> Option<String> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_and_query() {
        let platform = MockPlatform::new();
        platform.seed("wg0", Some("key"));
        platform.seed("wg1", None);
        assert_eq!(platform.interfaces().unwrap(), vec!["wg0", "wg1"]);
        assert_eq!(platform.public_key("wg0").unwrap().as_deref(), Some("key"));
        assert_eq!(platform.public_key("wg1").unwrap(), None);
        assert!(platform.address("office", "wg0").unwrap().is_up);
        assert!(platform.address("x", "wg9").is_err());
    }

    #[test]
    fn test_injected_failure_and_heal() {
        let platform = MockPlatform::new();
        platform.fail(Fail::Add);
        assert!(platform.add("a", "wg0").is_err());
        platform.heal(Fail::Add);
        assert!(platform.add("a", "wg0").is_ok());
        assert_eq!(platform.count("add"), 1);
    }

    #[test]
    fn test_handshake_after_polls() {
        let platform = MockPlatform::new();
        platform.seed("wg0", None);
        platform.set_handshake(HandshakeMode::AfterPolls(3));
        assert!(platform.latest_handshake("wg0", "k").unwrap().is_none());
        assert!(platform.latest_handshake("wg0", "k").unwrap().is_none());
        assert!(platform.latest_handshake("wg0", "k").unwrap().is_some());
        assert_eq!(platform.polls(), 3);
    }
}
