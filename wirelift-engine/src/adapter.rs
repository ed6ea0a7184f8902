//! Live adapter handle

use wirelift_net::VirtualAddress;

use crate::vpn::VpnConfiguration;

/// A started tunnel interface
///
/// Returned by [`crate::AdapterService::start`] and consumed by
/// [`crate::AdapterService::stop`]. Adapters discovered on a running system
/// carry no start configuration; stop then reads the live one.
#[derive(Debug, Clone)]
pub struct VpnAdapter {
    address: VirtualAddress,
    configuration: Option<VpnConfiguration>,
    allows: Vec<String>,
}

impl VpnAdapter {
    pub(crate) fn new(address: VirtualAddress, configuration: Option<VpnConfiguration>) -> Self {
        Self {
            address,
            configuration,
            allows: Vec::new(),
        }
    }

    /// Attach the configuration a discovered adapter was started from, so
    /// stop can run its hooks
    pub fn with_configuration(mut self, configuration: VpnConfiguration) -> Self {
        self.configuration = Some(configuration);
        self
    }

    pub fn address(&self) -> &VirtualAddress {
        &self.address
    }

    /// Logical name
    pub fn name(&self) -> &str {
        &self.address.name
    }

    pub fn native_name(&self) -> &str {
        &self.address.native_name
    }

    /// Configuration the adapter was started with
    pub fn configuration(&self) -> Option<&VpnConfiguration> {
        self.configuration.as_ref()
    }

    /// Routes installed for this adapter, in install order
    pub fn allows(&self) -> &[String] {
        &self.allows
    }

    pub(crate) fn set_allows(&mut self, allows: Vec<String>) {
        self.allows = allows;
    }

    pub(crate) fn set_configuration(&mut self, configuration: Option<VpnConfiguration>) {
        self.configuration = configuration;
    }

    pub(crate) fn address_mut(&mut self) -> &mut VirtualAddress {
        &mut self.address
    }
}

impl std::fmt::Display for VpnAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.address)
    }
}
