//! Interface identity and default gateway value types

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Routing table selector for routes installed on behalf of an interface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Table {
    /// Let the platform pick (usually the main table)
    #[default]
    Auto,
    /// Install no routes at all
    Off,
    /// The main routing table
    Main,
    /// An explicit numbered table
    Id(u32),
}

impl Table {
    /// Whether routes should be installed at all
    pub fn installs_routes(&self) -> bool {
        !matches!(self, Table::Off)
    }

    /// The explicit table argument for route commands, if any
    pub fn route_table(&self) -> Option<String> {
        match self {
            Table::Auto | Table::Off => None,
            Table::Main => Some("main".to_string()),
            Table::Id(id) => Some(id.to_string()),
        }
    }
}

impl FromStr for Table {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "auto" => Ok(Table::Auto),
            "off" => Ok(Table::Off),
            "main" => Ok(Table::Main),
            other => other
                .parse::<u32>()
                .map(Table::Id)
                .map_err(|_| Error::InvalidTable(s.to_string())),
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Table::Auto => write!(f, "auto"),
            Table::Off => write!(f, "off"),
            Table::Main => write!(f, "main"),
            Table::Id(id) => write!(f, "{}", id),
        }
    }
}

impl TryFrom<String> for Table {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Table> for String {
    fn from(value: Table) -> Self {
        value.to_string()
    }
}

/// Identity of a tunnel interface as known to wirelift
///
/// `name` is the logical, user facing name and survives reinstalls. `native_name`
/// is what the OS calls the device. Once mapped, each resolves to the other.
/// Instances are snapshots rebuilt per query; the OS device outlives them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualAddress {
    /// Logical name
    pub name: String,
    /// OS level interface name
    pub native_name: String,
    /// MTU, 0 when unset
    pub mtu: u32,
    /// Routing table selector
    pub table: Table,
    /// Single peer association, where the platform tracks one
    pub peer: Option<String>,
    /// Whether the link is administratively up
    pub is_up: bool,
    /// Whether this interface currently carries the default route
    pub is_default_gateway: bool,
}

impl VirtualAddress {
    /// Create an address for a mapped pair of names
    pub fn new(name: impl Into<String>, native_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            native_name: native_name.into(),
            mtu: 0,
            table: Table::Auto,
            peer: None,
            is_up: false,
            is_default_gateway: false,
        }
    }

    /// Create an address whose logical name is its native name
    pub fn native(native_name: impl Into<String>) -> Self {
        let native_name = native_name.into();
        Self::new(native_name.clone(), native_name)
    }

    pub fn with_mtu(mut self, mtu: u32) -> Self {
        self.mtu = mtu;
        self
    }

    pub fn with_table(mut self, table: Table) -> Self {
        self.table = table;
        self
    }

    pub fn with_peer(mut self, peer: impl Into<String>) -> Self {
        self.peer = Some(peer.into());
        self
    }

    pub fn with_up(mut self, up: bool) -> Self {
        self.is_up = up;
        self
    }

    /// Whether the logical name differs from the native one
    pub fn has_virtual_name(&self) -> bool {
        self.name != self.native_name
    }

    /// Name used in log lines
    pub fn short_name(&self) -> &str {
        &self.name
    }

    /// Name shown to users, including the native name when it differs
    pub fn display_name(&self) -> String {
        if self.has_virtual_name() {
            format!("{} ({})", self.name, self.native_name)
        } else {
            self.name.clone()
        }
    }
}

impl fmt::Display for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// A default route: the interface it leaves through and the next hop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gateway {
    /// Native interface name
    pub native_iface: String,
    /// Next hop address
    pub address: IpAddr,
}

impl Gateway {
    pub fn new(native_iface: impl Into<String>, address: IpAddr) -> Self {
        Self {
            native_iface: native_iface.into(),
            address,
        }
    }
}

impl fmt::Display for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} dev {}", self.address, self.native_iface)
    }
}

/// A default route moved onto a tunnel, with what it replaced
///
/// `tunnel.address` is the peer endpoint that must stay reachable through
/// `previous` while the tunnel carries everything else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewaySwitch {
    /// The OS default gateway before the switch
    pub previous: Gateway,
    /// The tunnel interface and its peer endpoint
    pub tunnel: Gateway,
}

impl GatewaySwitch {
    pub fn new(previous: Gateway, tunnel: Gateway) -> Self {
        Self { previous, tunnel }
    }
}
