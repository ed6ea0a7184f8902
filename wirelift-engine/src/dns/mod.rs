//! DNS integration
//!
//! The engine speaks one normalized shape, [`DnsEntry`], to whichever
//! provider the host uses. Providers translate it to their own mechanism.

pub mod resolvectl;

use std::net::IpAddr;
use std::sync::Arc;

use crate::command::CommandChannel;
use crate::error::{Error, Result};
use crate::platform::Platform;
use crate::vpn::VpnConfiguration;

pub use resolvectl::ResolvectlProvider;

/// DNS settings for one interface
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DnsEntry {
    /// Native interface name
    pub iface: String,
    pub ipv4_servers: Vec<String>,
    pub ipv6_servers: Vec<String>,
    /// Search domains
    pub domains: Vec<String>,
}

impl DnsEntry {
    pub fn new(iface: impl Into<String>) -> Self {
        Self {
            iface: iface.into(),
            ..Default::default()
        }
    }

    /// Split a configuration's DNS list into servers and search domains
    pub fn from_configuration(iface: impl Into<String>, configuration: &VpnConfiguration) -> Self {
        let mut entry = Self::new(iface);
        for value in configuration.dns() {
            entry.add(value);
        }
        entry
    }

    /// Add a server or domain, classified by whether it parses as an address
    pub fn add(&mut self, value: &str) {
        let value = value.trim();
        if value.is_empty() {
            return;
        }
        match value.parse::<IpAddr>() {
            Ok(IpAddr::V4(_)) => push_unique(&mut self.ipv4_servers, value),
            Ok(IpAddr::V6(_)) => push_unique(&mut self.ipv6_servers, value),
            Err(_) => push_unique(&mut self.domains, value),
        }
    }

    /// All servers, IPv4 first
    pub fn servers(&self) -> Vec<String> {
        self.ipv4_servers
            .iter()
            .chain(self.ipv6_servers.iter())
            .cloned()
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.ipv4_servers.is_empty() && self.ipv6_servers.is_empty() && self.domains.is_empty()
    }
}

fn push_unique(list: &mut Vec<String>, value: &str) {
    if !list.iter().any(|v| v == value) {
        list.push(value.to_string());
    }
}

/// OS specific DNS mechanism
pub trait DnsProvider: Send + Sync {
    /// Provider name, as used in configuration
    fn name(&self) -> &'static str;

    /// Prepare the provider for use with a platform
    fn init(&self, _platform: &dyn Platform) -> Result<()> {
        Ok(())
    }

    /// Current DNS settings of every interface the provider knows about
    fn entries(&self) -> Result<Vec<DnsEntry>>;

    /// Apply DNS settings to an interface
    fn set(&self, entry: &DnsEntry) -> Result<()>;

    /// Remove DNS settings from an interface
    fn unset(&self, entry: &DnsEntry) -> Result<()>;

    /// Remove DNS settings by interface name
    fn unset_interface(&self, iface: &str) -> Result<()> {
        match self.entry(iface)? {
            Some(entry) => self.unset(&entry),
            None => Ok(()),
        }
    }

    /// Current DNS settings of one interface
    fn entry(&self, iface: &str) -> Result<Option<DnsEntry>> {
        Ok(self.entries()?.into_iter().find(|e| e.iface == iface))
    }
}

/// Pick a DNS provider by name, or detect one when `name` is unset
///
/// `none` disables DNS integration. Detection falls back to no provider
/// when nothing usable is installed.
pub fn select_provider(
    name: Option<&str>,
    commands: Arc<dyn CommandChannel>,
) -> Result<Option<Arc<dyn DnsProvider>>> {
    match name.map(|n| n.trim().to_ascii_lowercase()) {
        Some(n) if n == "none" => Ok(None),
        Some(n) if n == ResolvectlProvider::NAME => {
            Ok(Some(Arc::new(ResolvectlProvider::new(commands))))
        }
        Some(other) => Err(Error::Config(format!(
            "unknown DNS integration `{}` (expected `resolvectl` or `none`)",
            other
        ))),
        None => {
            if ResolvectlProvider::available(commands.as_ref()) {
                log::debug!("Detected systemd-resolved, using resolvectl for DNS");
                Ok(Some(Arc::new(ResolvectlProvider::new(commands))))
            } else {
                log::warn!("No supported DNS integration found, DNS settings will be ignored");
                Ok(None)
            }
        }
    }
}

/// Names of the DNS integrations this build knows about
pub fn provider_names() -> &'static [&'static str] {
    &[ResolvectlProvider::NAME, "none"]
}
