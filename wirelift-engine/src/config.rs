//! System configuration for the adapter lifecycle engine

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Environment variable holding extra comma separated addresses to strip
/// from every non-gateway peer's allowed-ips
pub const IGNORE_ADDRESSES_ENV: &str = "WIRELIFT_IGNORE_ADDRESSES";

/// Default location of the system configuration file
pub const DEFAULT_CONFIG_PATH: &str = "/etc/wirelift/wirelift.toml";

/// Engine wide settings
///
/// These govern how adapters are allocated and how peer configuration is
/// transformed before it reaches the OS. Per tunnel settings live in the
/// tunnel configuration files instead.
///
/// # Example Configuration
///
/// ```toml
/// ignore_local_routes = true
/// ignore_addresses = ["10.9.0.1/32"]
/// connect_timeout = 12
/// max_interfaces = 250
/// interface_prefix = "wg"
/// dns_integration = "resolvectl"
/// state_dir = "/var/lib/wirelift"
/// default_gateway_peer = "xTIBA5rboUvnH4htodjb6e697QjLERt1NAB4mZqp8Dg="
/// log_level = "info"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    /// Drop allowed-ips that cover an address already assigned locally
    #[serde(default = "default_true")]
    pub ignore_local_routes: bool,

    /// Addresses removed from every non-gateway peer's allowed-ips
    #[serde(default)]
    pub ignore_addresses: Vec<String>,

    /// Seconds to wait for the first handshake, 0 to skip waiting
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,

    /// Seconds after which a silent peer is no longer considered connected
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout: u64,

    /// Milliseconds between handshake polls
    #[serde(default = "default_handshake_poll_interval_ms")]
    pub handshake_poll_interval_ms: u64,

    /// Number of native interface slots scanned during allocation
    #[serde(default = "default_max_interfaces")]
    pub max_interfaces: usize,

    /// Native interface name prefix (platform default when unset)
    #[serde(default)]
    pub interface_prefix: Option<String>,

    /// DNS integration: "resolvectl" or "none" (auto-detected when unset)
    #[serde(default)]
    pub dns_integration: Option<String>,

    /// Directory holding the name mapping store and the allocation lock
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    /// Public key of the peer that should carry the default route
    #[serde(default)]
    pub default_gateway_peer: Option<String>,

    /// MTU used when a tunnel configuration does not set one
    #[serde(default)]
    pub default_mtu: Option<u32>,

    /// Program and arguments prefixed to privileged commands when not root
    #[serde(default = "default_elevate")]
    pub elevate: Vec<String>,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            ignore_local_routes: true,
            ignore_addresses: Vec::new(),
            connect_timeout: default_connect_timeout(),
            handshake_timeout: default_handshake_timeout(),
            handshake_poll_interval_ms: default_handshake_poll_interval_ms(),
            max_interfaces: default_max_interfaces(),
            interface_prefix: None,
            dns_integration: None,
            state_dir: default_state_dir(),
            default_gateway_peer: None,
            default_mtu: None,
            elevate: default_elevate(),
            log_level: default_log_level(),
        }
    }
}

impl SystemConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Load the configuration file if it exists, defaults otherwise
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            log::debug!("No configuration at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: SystemConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to TOML
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_interfaces == 0 {
            return Err(Error::Config("max_interfaces must be at least 1".into()));
        }

        if self.handshake_poll_interval_ms == 0 {
            return Err(Error::Config(
                "handshake_poll_interval_ms must be greater than 0".into(),
            ));
        }

        if let Some(ref prefix) = self.interface_prefix {
            if prefix.trim().is_empty() {
                return Err(Error::Config("interface_prefix must not be empty".into()));
            }
        }

        if let Some(mtu) = self.default_mtu {
            if mtu < 576 {
                return Err(Error::Config(format!(
                    "MTU {} is too small (minimum 576)",
                    mtu
                )));
            }
        }

        Ok(())
    }

    /// Configured ignore list merged with the environment override
    pub fn effective_ignore_addresses(&self) -> Vec<String> {
        let env = std::env::var(IGNORE_ADDRESSES_ENV).ok();
        merge_ignore_addresses(&self.ignore_addresses, env.as_deref())
    }

    /// Handshake wait budget
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    /// Interval between handshake polls
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.handshake_poll_interval_ms)
    }

    /// Path of the persistent name mapping store
    pub fn names_path(&self) -> PathBuf {
        self.state_dir.join("names.toml")
    }

    /// Path of the default gateway claim
    pub fn gateway_path(&self) -> PathBuf {
        self.state_dir.join("gateway.toml")
    }

    /// Path of the allocation lock file
    pub fn lock_path(&self) -> PathBuf {
        self.state_dir.join("allocate.lock")
    }

    /// Generate a sample configuration
    pub fn sample() -> String {
        r#"# wirelift system configuration

# Drop allowed-ips that would route an address this host already owns
# through the tunnel (default: true)
ignore_local_routes = true

# Extra addresses never routed through a non-gateway peer.
# WIRELIFT_IGNORE_ADDRESSES (comma separated) adds to this list.
ignore_addresses = []

# Seconds to wait for the first handshake before tearing the
# interface down again, 0 to disable (default: 12)
connect_timeout = 12

# Seconds without a handshake before a peer counts as gone (default: 180)
handshake_timeout = 180

# Number of native interface slots to scan (default: 250)
max_interfaces = 250

# Native interface name prefix (default: "wg" on Linux)
# interface_prefix = "wg"

# DNS integration: "resolvectl" or "none" (default: auto-detect)
# dns_integration = "resolvectl"

# Where name mappings and the allocation lock live
state_dir = "/var/lib/wirelift"

# Public key of the peer that should carry all traffic
# default_gateway_peer = "..."

# Command prefixed to privileged operations when not running as root
elevate = ["sudo", "-n"]

# Log level: "error", "warn", "info", "debug", "trace"
log_level = "info"
"#
        .to_string()
    }
}

/// Merge a configured ignore list with a comma separated override
pub fn merge_ignore_addresses(configured: &[String], env: Option<&str>) -> Vec<String> {
    let mut merged: Vec<String> = configured
        .iter()
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty())
        .collect();
    if let Some(env) = env {
        for addr in env.split(',').map(str::trim).filter(|a| !a.is_empty()) {
            if !merged.iter().any(|m| m == addr) {
                merged.push(addr.to_string());
            }
        }
    }
    merged
}

fn default_true() -> bool {
    true
}

fn default_connect_timeout() -> u64 {
    12
}

fn default_handshake_timeout() -> u64 {
    180
}

fn default_handshake_poll_interval_ms() -> u64 {
    1000
}

fn default_max_interfaces() -> usize {
    250
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("/var/lib/wirelift")
}

fn default_elevate() -> Vec<String> {
    vec!["sudo".to_string(), "-n".to_string()]
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SystemConfig::from_toml("").unwrap();
        assert!(config.ignore_local_routes);
        assert_eq!(config.connect_timeout, 12);
        assert_eq!(config.handshake_timeout, 180);
        assert_eq!(config.max_interfaces, 250);
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.lock_path(), PathBuf::from("/var/lib/wirelift/allocate.lock"));
        assert_eq!(config.elevate, vec!["sudo", "-n"]);
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
ignore_local_routes = false
ignore_addresses = ["10.9.0.1/32"]
connect_timeout = 0
max_interfaces = 4
interface_prefix = "tun"
default_gateway_peer = "abc="
state_dir = "/tmp/wl"
"#;
        let config = SystemConfig::from_toml(toml).unwrap();
        assert!(!config.ignore_local_routes);
        assert_eq!(config.connect_timeout(), Duration::ZERO);
        assert_eq!(config.max_interfaces, 4);
        assert_eq!(config.interface_prefix.as_deref(), Some("tun"));
        assert_eq!(config.default_gateway_peer.as_deref(), Some("abc="));
        assert_eq!(config.names_path(), PathBuf::from("/tmp/wl/names.toml"));
        assert_eq!(config.gateway_path(), PathBuf::from("/tmp/wl/gateway.toml"));
    }

    #[test]
    fn test_zero_interfaces_fails() {
        assert!(SystemConfig::from_toml("max_interfaces = 0").is_err());
    }

    #[test]
    fn test_zero_poll_interval_fails() {
        assert!(SystemConfig::from_toml("handshake_poll_interval_ms = 0").is_err());
    }

    #[test]
    fn test_empty_prefix_fails() {
        let err = SystemConfig::from_toml("interface_prefix = \" \"").unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_merge_ignore_addresses() {
        let configured = vec!["10.0.0.1/32".to_string(), " ".to_string()];
        let merged = merge_ignore_addresses(&configured, Some("10.0.0.2/32, 10.0.0.1/32,,"));
        assert_eq!(merged, vec!["10.0.0.1/32", "10.0.0.2/32"]);
        assert_eq!(merge_ignore_addresses(&[], None), Vec::<String>::new());
    }

    #[test]
    fn test_sample_parses() {
        let config = SystemConfig::from_toml(&SystemConfig::sample()).unwrap();
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_toml_round_trip_keeps_gateway_peer() {
        let mut config = SystemConfig::default();
        config.default_gateway_peer = Some("peer=".into());
        let parsed = SystemConfig::from_toml(&config.to_toml().unwrap()).unwrap();
        assert_eq!(parsed.default_gateway_peer.as_deref(), Some("peer="));
    }
}
