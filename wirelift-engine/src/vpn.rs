//! Declarative tunnel configuration
//!
//! [`VpnConfiguration`] and [`VpnPeer`] are immutable once built. Changing one
//! means building a new value from the old, which is how the transform engine
//! derives the platform variant without touching the caller's copy.

use std::hash::{Hash, Hasher};

use wirelift_net::Table;

use crate::error::{Error, Result};
use crate::keys;

/// Local identity, addressing and peers of one tunnel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VpnConfiguration {
    public_key: String,
    private_key: Option<String>,
    listen_port: Option<u16>,
    fwmark: Option<u32>,
    addresses: Vec<String>,
    dns: Vec<String>,
    mtu: Option<u32>,
    table: Table,
    peers: Vec<VpnPeer>,
    pre_up: Vec<String>,
    post_up: Vec<String>,
    pre_down: Vec<String>,
    post_down: Vec<String>,
    save_config: bool,
}

impl VpnConfiguration {
    /// Create a new configuration builder
    pub fn builder() -> VpnConfigurationBuilder {
        VpnConfigurationBuilder::default()
    }

    /// Builder seeded with every field of this configuration
    pub fn to_builder(&self) -> VpnConfigurationBuilder {
        VpnConfigurationBuilder {
            public_key: Some(self.public_key.clone()),
            private_key: self.private_key.clone(),
            listen_port: self.listen_port,
            fwmark: self.fwmark,
            addresses: self.addresses.clone(),
            dns: self.dns.clone(),
            mtu: self.mtu,
            table: self.table,
            peers: self.peers.clone(),
            pre_up: self.pre_up.clone(),
            post_up: self.post_up.clone(),
            pre_down: self.pre_down.clone(),
            post_down: self.post_down.clone(),
            save_config: self.save_config,
        }
    }

    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    pub fn private_key(&self) -> Option<&str> {
        self.private_key.as_deref()
    }

    pub fn listen_port(&self) -> Option<u16> {
        self.listen_port
    }

    pub fn fwmark(&self) -> Option<u32> {
        self.fwmark
    }

    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }

    pub fn dns(&self) -> &[String] {
        &self.dns
    }

    pub fn mtu(&self) -> Option<u32> {
        self.mtu
    }

    pub fn table(&self) -> Table {
        self.table
    }

    pub fn peers(&self) -> &[VpnPeer] {
        &self.peers
    }

    pub fn pre_up(&self) -> &[String] {
        &self.pre_up
    }

    pub fn post_up(&self) -> &[String] {
        &self.post_up
    }

    pub fn pre_down(&self) -> &[String] {
        &self.pre_down
    }

    pub fn post_down(&self) -> &[String] {
        &self.post_down
    }

    pub fn save_config(&self) -> bool {
        self.save_config
    }

    /// Find a peer by public key
    pub fn peer(&self, public_key: &str) -> Option<&VpnPeer> {
        self.peers.iter().find(|p| p.public_key == public_key)
    }

    /// Whether a peer with this public key is part of the configuration
    pub fn has_peer(&self, public_key: &str) -> bool {
        self.peer(public_key).is_some()
    }

    /// The first peer, if any
    pub fn first_peer(&self) -> Option<&VpnPeer> {
        self.peers.first()
    }

    /// Every allowed-ip of every peer, in peer order
    pub fn allowed_ips(&self) -> Vec<String> {
        self.peers
            .iter()
            .flat_map(|p| p.allowed_ips.iter().cloned())
            .collect()
    }
}

/// Builder for [`VpnConfiguration`]
#[derive(Debug, Clone, Default)]
pub struct VpnConfigurationBuilder {
    public_key: Option<String>,
    private_key: Option<String>,
    listen_port: Option<u16>,
    fwmark: Option<u32>,
    addresses: Vec<String>,
    dns: Vec<String>,
    mtu: Option<u32>,
    table: Table,
    peers: Vec<VpnPeer>,
    pre_up: Vec<String>,
    post_up: Vec<String>,
    pre_down: Vec<String>,
    post_down: Vec<String>,
    save_config: bool,
}

impl VpnConfigurationBuilder {
    /// Set the public key explicitly (for configurations without a private key)
    pub fn public_key(mut self, key: impl Into<String>) -> Self {
        self.public_key = Some(key.into());
        self
    }

    /// Set the private key; the public key is derived from it unless set
    pub fn private_key(mut self, key: impl Into<String>) -> Self {
        self.private_key = Some(key.into());
        self
    }

    /// Remove the private key, keeping the public key
    pub fn without_private_key(mut self) -> Self {
        self.private_key = None;
        self
    }

    pub fn listen_port(mut self, port: u16) -> Self {
        self.listen_port = Some(port);
        self
    }

    pub fn fwmark(mut self, mark: u32) -> Self {
        self.fwmark = Some(mark);
        self
    }

    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.addresses.push(address.into());
        self
    }

    pub fn addresses<I, S>(mut self, addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.addresses = addresses.into_iter().map(Into::into).collect();
        self
    }

    pub fn dns_server(mut self, server: impl Into<String>) -> Self {
        self.dns.push(server.into());
        self
    }

    pub fn dns<I, S>(mut self, servers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dns = servers.into_iter().map(Into::into).collect();
        self
    }

    pub fn mtu(mut self, mtu: Option<u32>) -> Self {
        self.mtu = mtu;
        self
    }

    pub fn table(mut self, table: Table) -> Self {
        self.table = table;
        self
    }

    pub fn peer(mut self, peer: VpnPeer) -> Self {
        self.peers.push(peer);
        self
    }

    /// Replace the peer list
    pub fn peers<I>(mut self, peers: I) -> Self
    where
        I: IntoIterator<Item = VpnPeer>,
    {
        self.peers = peers.into_iter().collect();
        self
    }

    pub fn pre_up(mut self, command: impl Into<String>) -> Self {
        self.pre_up.push(command.into());
        self
    }

    pub fn post_up(mut self, command: impl Into<String>) -> Self {
        self.post_up.push(command.into());
        self
    }

    pub fn pre_down(mut self, command: impl Into<String>) -> Self {
        self.pre_down.push(command.into());
        self
    }

    pub fn post_down(mut self, command: impl Into<String>) -> Self {
        self.post_down.push(command.into());
        self
    }

    /// Drop every hook command
    pub fn without_hooks(mut self) -> Self {
        self.pre_up.clear();
        self.post_up.clear();
        self.pre_down.clear();
        self.post_down.clear();
        self
    }

    pub fn save_config(mut self, save: bool) -> Self {
        self.save_config = save;
        self
    }

    /// Build the configuration
    ///
    /// Fails when there is neither a public key nor a private key to derive
    /// one from.
    pub fn build(self) -> Result<VpnConfiguration> {
        let public_key = match (self.public_key, &self.private_key) {
            (Some(key), _) if !key.trim().is_empty() => key,
            (_, Some(private)) => keys::public_key(private)?,
            _ => {
                return Err(Error::Key(
                    "configuration needs a private key or a public key".into(),
                ))
            }
        };

        for (i, peer) in self.peers.iter().enumerate() {
            if self.peers[..i].contains(peer) {
                return Err(Error::Config(format!(
                    "peer {} is listed more than once",
                    peer.public_key
                )));
            }
        }

        Ok(VpnConfiguration {
            public_key,
            private_key: self.private_key,
            listen_port: self.listen_port,
            fwmark: self.fwmark,
            addresses: self.addresses,
            dns: self.dns,
            mtu: self.mtu,
            table: self.table,
            peers: self.peers,
            pre_up: self.pre_up,
            post_up: self.post_up,
            pre_down: self.pre_down,
            post_down: self.post_down,
            save_config: self.save_config,
        })
    }
}

/// One remote peer of a tunnel
///
/// Equality and hashing use the public key alone.
#[derive(Debug, Clone)]
pub struct VpnPeer {
    public_key: String,
    endpoint_address: Option<String>,
    endpoint_port: Option<u16>,
    allowed_ips: Vec<String>,
    preshared_key: Option<String>,
    persistent_keepalive: Option<u16>,
}

impl PartialEq for VpnPeer {
    fn eq(&self, other: &Self) -> bool {
        self.public_key == other.public_key
    }
}

impl Eq for VpnPeer {}

impl Hash for VpnPeer {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.public_key.hash(state);
    }
}

impl VpnPeer {
    /// Create a new peer builder
    pub fn builder(public_key: impl Into<String>) -> VpnPeerBuilder {
        VpnPeerBuilder {
            public_key: public_key.into(),
            endpoint_address: None,
            endpoint_port: None,
            allowed_ips: Vec::new(),
            preshared_key: None,
            persistent_keepalive: None,
        }
    }

    /// Builder seeded with every field of this peer
    pub fn to_builder(&self) -> VpnPeerBuilder {
        VpnPeerBuilder {
            public_key: self.public_key.clone(),
            endpoint_address: self.endpoint_address.clone(),
            endpoint_port: self.endpoint_port,
            allowed_ips: self.allowed_ips.clone(),
            preshared_key: self.preshared_key.clone(),
            persistent_keepalive: self.persistent_keepalive,
        }
    }

    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    pub fn endpoint_address(&self) -> Option<&str> {
        self.endpoint_address.as_deref()
    }

    pub fn endpoint_port(&self) -> Option<u16> {
        self.endpoint_port
    }

    pub fn allowed_ips(&self) -> &[String] {
        &self.allowed_ips
    }

    pub fn preshared_key(&self) -> Option<&str> {
        self.preshared_key.as_deref()
    }

    pub fn persistent_keepalive(&self) -> Option<u16> {
        self.persistent_keepalive
    }

    /// Whether the peer can only answer, never initiate
    pub fn is_responder_only(&self) -> bool {
        self.endpoint_address.is_none()
    }

    /// `host:port`, bracketing IPv6 literals
    pub fn endpoint(&self) -> Option<String> {
        let address = self.endpoint_address.as_deref()?;
        let port = self.endpoint_port.unwrap_or(crate::DEFAULT_PORT);
        if address.contains(':') {
            Some(format!("[{}]:{}", address, port))
        } else {
            Some(format!("{}:{}", address, port))
        }
    }
}

/// Builder for [`VpnPeer`]
#[derive(Debug, Clone)]
pub struct VpnPeerBuilder {
    public_key: String,
    endpoint_address: Option<String>,
    endpoint_port: Option<u16>,
    allowed_ips: Vec<String>,
    preshared_key: Option<String>,
    persistent_keepalive: Option<u16>,
}

impl VpnPeerBuilder {
    /// Replace the public key
    pub fn public_key(mut self, key: impl Into<String>) -> Self {
        self.public_key = key.into();
        self
    }

    pub fn endpoint(mut self, address: impl Into<String>, port: u16) -> Self {
        self.endpoint_address = Some(address.into());
        self.endpoint_port = Some(port);
        self
    }

    pub fn endpoint_address(mut self, address: impl Into<String>) -> Self {
        self.endpoint_address = Some(address.into());
        self
    }

    pub fn allowed_ip(mut self, cidr: impl Into<String>) -> Self {
        self.allowed_ips.push(cidr.into());
        self
    }

    /// Replace the allowed-ips
    pub fn allowed_ips<I, S>(mut self, cidrs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_ips = cidrs.into_iter().map(Into::into).collect();
        self
    }

    pub fn preshared_key(mut self, key: impl Into<String>) -> Self {
        self.preshared_key = Some(key.into());
        self
    }

    pub fn persistent_keepalive(mut self, seconds: u16) -> Self {
        self.persistent_keepalive = Some(seconds);
        self
    }

    /// Build the peer, requiring a public key
    pub fn build(self) -> Result<VpnPeer> {
        if self.public_key.trim().is_empty() {
            return Err(Error::Key("peer public key is required".into()));
        }
        Ok(VpnPeer {
            public_key: self.public_key.trim().to_string(),
            endpoint_address: self.endpoint_address,
            endpoint_port: self.endpoint_port,
            allowed_ips: self.allowed_ips,
            preshared_key: self.preshared_key,
            persistent_keepalive: self.persistent_keepalive,
        })
    }
}
