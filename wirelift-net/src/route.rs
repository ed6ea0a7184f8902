//! Route parsing, ordering and local coverage tests
//!
//! Allowed-ips double as the routes installed for a tunnel. These helpers
//! decide which of them are safe to install and in which order.

use std::cmp::Ordering;
use std::fmt;
use std::net::IpAddr;

use ipnet::IpNet;

use crate::address::Table;
use crate::error::{Error, Result};

/// The IPv4 full tunnel route
pub const FULL_TUNNEL_V4: &str = "0.0.0.0/0";

/// A route bound to a tunnel interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Destination network
    pub destination: IpNet,
    /// Gateway address (None for interface routes)
    pub gateway: Option<IpAddr>,
    /// Interface name
    pub interface: Option<String>,
    /// Routing table
    pub table: Table,
}

impl Route {
    /// Parse a CIDR or bare address into an interface route
    ///
    /// A bare address becomes a host route (/32 or /128).
    pub fn parse(route: &str, interface: impl Into<String>) -> Result<Self> {
        Ok(Self::interface_route(parse_network(route)?, interface))
    }

    /// Create an interface route (no gateway, traffic goes directly to interface)
    pub fn interface_route(destination: IpNet, interface: impl Into<String>) -> Self {
        Self {
            destination,
            gateway: None,
            interface: Some(interface.into()),
            table: Table::Auto,
        }
    }

    /// Set the gateway for this route
    pub fn with_gateway(mut self, gateway: IpAddr) -> Self {
        self.gateway = Some(gateway);
        self
    }

    /// Set the routing table for this route
    pub fn with_table(mut self, table: Table) -> Self {
        self.table = table;
        self
    }

    /// Check if this is a default route
    pub fn is_default(&self) -> bool {
        self.destination.prefix_len() == 0
    }

    /// Check if this is an IPv4 route
    pub fn is_ipv4(&self) -> bool {
        matches!(self.destination, IpNet::V4(_))
    }

    /// Check if this is an IPv6 route
    pub fn is_ipv6(&self) -> bool {
        matches!(self.destination, IpNet::V6(_))
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.destination)?;
        if let Some(ref gw) = self.gateway {
            write!(f, " via {}", gw)?;
        }
        if let Some(ref iface) = self.interface {
            write!(f, " dev {}", iface)?;
        }
        if let Some(table) = self.table.route_table() {
            write!(f, " table {}", table)?;
        }
        Ok(())
    }
}

/// Parse a CIDR, or a bare address as a host network
pub fn parse_network(route: &str) -> Result<IpNet> {
    let route = route.trim();
    if let Ok(net) = route.parse::<IpNet>() {
        return Ok(net);
    }
    if route.contains('/') {
        return Err(Error::InvalidPrefix(route.to_string()));
    }
    route
        .parse::<IpAddr>()
        .map(IpNet::from)
        .map_err(|_| Error::InvalidAddress(route.to_string()))
}

/// Prefix length written after the `/`, or 0 when there is none
///
/// An unparseable prefix also counts as 0 so that ordering never fails.
pub fn prefix_length(route: &str) -> u8 {
    match route.split_once('/') {
        Some((_, prefix)) => prefix.trim().parse().unwrap_or(0),
        None => 0,
    }
}

/// Compare two routes for installation: longer prefixes first, ties by text
pub fn install_cmp(a: &str, b: &str) -> Ordering {
    prefix_length(b)
        .cmp(&prefix_length(a))
        .then_with(|| a.cmp(b))
}

/// Order routes so the most specific ones are installed first
pub fn install_order<S: AsRef<str>>(routes: &[S]) -> Vec<String> {
    let mut ordered: Vec<String> = routes.iter().map(|r| r.as_ref().to_string()).collect();
    ordered.sort_by(|a, b| install_cmp(a, b));
    ordered
}

/// Whether `route` covers any of the `locals`
///
/// The route is first tried as a CIDR range of either family and tested for
/// containment; if it is not a valid range it is compared as a single host
/// address. Families are matched independently.
pub fn covers_local(route: &str, locals: &[IpAddr]) -> bool {
    covering_local(route, locals).is_some()
}

/// The first local address `route` covers, if any
pub fn covering_local(route: &str, locals: &[IpAddr]) -> Option<IpAddr> {
    let route = route.trim();
    if let Ok(net) = route.parse::<IpNet>() {
        return locals.iter().copied().find(|addr| net.contains(addr));
    }
    match route.parse::<IpAddr>() {
        Ok(host) => locals.iter().copied().find(|addr| *addr == host),
        Err(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_length() {
        assert_eq!(prefix_length("10.0.0.0/8"), 8);
        assert_eq!(prefix_length("fd00::/64"), 64);
        assert_eq!(prefix_length("10.0.0.1"), 0);
        assert_eq!(prefix_length("10.0.0.1/xx"), 0);
    }

    #[test]
    fn test_install_order() {
        let ordered = install_order(&["10.0.0.0/8", "10.1.0.0/16", "0.0.0.0/0"]);
        assert_eq!(ordered, vec!["10.1.0.0/16", "10.0.0.0/8", "0.0.0.0/0"]);
    }

    #[test]
    fn test_install_order_ties() {
        let ordered = install_order(&["10.2.0.0/16", "192.168.0.5", "10.1.0.0/16"]);
        assert_eq!(ordered, vec!["10.1.0.0/16", "10.2.0.0/16", "192.168.0.5"]);
    }

    #[test]
    fn test_covers_local() {
        let locals: Vec<IpAddr> = vec!["192.168.1.5".parse().unwrap(), "fd00::2".parse().unwrap()];

        assert!(covers_local("192.168.1.5/32", &locals));
        assert!(covers_local("192.168.0.0/16", &locals));
        assert!(!covers_local("10.0.0.0/8", &locals));
        assert!(covers_local("fd00::/64", &locals));
        assert!(covers_local("192.168.1.5", &locals));
        assert!(!covers_local("not-a-route", &locals));
    }

    #[test]
    fn test_families_independent() {
        let locals: Vec<IpAddr> = vec!["fd00::2".parse().unwrap()];
        assert!(!covers_local("0.0.0.0/0", &locals));
        assert!(covers_local("::/0", &locals));
    }

    #[test]
    fn test_route_parse() {
        let route = Route::parse("10.0.0.1", "wg0").unwrap();
        assert_eq!(route.destination.prefix_len(), 32);
        assert!(route.is_ipv4());

        let route = Route::parse("0.0.0.0/0", "wg0").unwrap().with_table(Table::Id(100));
        assert!(route.is_default());
        assert_eq!(route.to_string(), "0.0.0.0/0 dev wg0 table 100");

        assert!(Route::parse("10.0.0.0/99", "wg0").is_err());
        assert!(Route::parse("bogus", "wg0").is_err());
    }
}
