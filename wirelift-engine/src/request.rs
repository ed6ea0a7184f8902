//! Requests to bring an adapter up

use crate::error::{Error, Result};
use crate::vpn::{VpnConfiguration, VpnPeer};

/// What a caller wants started
///
/// A native interface name may only be given together with a logical name.
#[derive(Debug, Clone)]
pub struct StartRequest {
    interface_name: Option<String>,
    native_interface_name: Option<String>,
    configuration: VpnConfiguration,
    peer: Option<VpnPeer>,
}

impl StartRequest {
    /// Create a new request builder
    pub fn builder(configuration: VpnConfiguration) -> StartRequestBuilder {
        StartRequestBuilder {
            interface_name: None,
            native_interface_name: None,
            configuration,
            peer: None,
        }
    }

    /// A request with no names, allocating the next free slot
    pub fn new(configuration: VpnConfiguration) -> Self {
        Self {
            interface_name: None,
            native_interface_name: None,
            configuration,
            peer: None,
        }
    }

    pub fn interface_name(&self) -> Option<&str> {
        self.interface_name.as_deref()
    }

    pub fn native_interface_name(&self) -> Option<&str> {
        self.native_interface_name.as_deref()
    }

    pub fn configuration(&self) -> &VpnConfiguration {
        &self.configuration
    }

    /// The peer whose handshake gates the connected state
    pub fn peer(&self) -> Option<&VpnPeer> {
        self.peer.as_ref()
    }
}

/// Builder for [`StartRequest`]
#[derive(Debug, Clone)]
pub struct StartRequestBuilder {
    interface_name: Option<String>,
    native_interface_name: Option<String>,
    configuration: VpnConfiguration,
    peer: Option<VpnPeer>,
}

impl StartRequestBuilder {
    pub fn interface_name(mut self, name: impl Into<String>) -> Self {
        self.interface_name = Some(name.into());
        self
    }

    pub fn native_interface_name(mut self, name: impl Into<String>) -> Self {
        self.native_interface_name = Some(name.into());
        self
    }

    pub fn peer(mut self, peer: VpnPeer) -> Self {
        self.peer = Some(peer);
        self
    }

    /// Gate on the configuration's only peer, if it has exactly one
    pub fn sole_peer(mut self) -> Self {
        if let [peer] = self.configuration.peers() {
            self.peer = Some(peer.clone());
        }
        self
    }

    /// Build the request
    pub fn build(self) -> Result<StartRequest> {
        let interface_name = self.interface_name.filter(|n| !n.trim().is_empty());
        let native_interface_name = self.native_interface_name.filter(|n| !n.trim().is_empty());

        if native_interface_name.is_some() && interface_name.is_none() {
            return Err(Error::InvalidRequest(
                "a native interface name requires an interface name".into(),
            ));
        }

        if let Some(ref peer) = self.peer {
            if !self.configuration.has_peer(peer.public_key()) {
                return Err(Error::InvalidRequest(format!(
                    "peer {} is not part of the configuration",
                    peer.public_key()
                )));
            }
        }

        Ok(StartRequest {
            interface_name,
            native_interface_name,
            configuration: self.configuration,
            peer: self.peer,
        })
    }
}
