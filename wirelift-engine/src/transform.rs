//! Route and peer transform
//!
//! Derives the configuration actually pushed to the tunnel from the one the
//! caller supplied. The input is never modified.
//!
//! Per peer, in order:
//! 1. the designated gateway peer gets the full tunnel route only;
//! 2. otherwise, with local route exclusion on, any allowed-ip covering a
//!    local interface address is dropped;
//! 3. otherwise, entries on the ignore list are dropped.
//!
//! The platform then strips whatever it cannot express.

use std::net::IpAddr;

use wirelift_net::route::{covering_local, FULL_TUNNEL_V4};

use crate::error::Result;
use crate::platform::Platform;
use crate::vpn::{VpnConfiguration, VpnPeer};

/// External state a transform depends on
#[derive(Debug, Clone, Copy, Default)]
pub struct TransformContext<'a> {
    /// Public key of the designated default gateway peer
    pub gateway_peer: Option<&'a str>,
    pub ignore_local_routes: bool,
    /// Addresses of local, up, non-loopback interfaces
    pub local_addresses: &'a [IpAddr],
    /// Allowed-ips that are never installed
    pub ignore_addresses: &'a [String],
}

/// Allowed-ips of a non gateway peer after exclusions
pub fn filter_allowed_ips(peer: &VpnPeer, context: &TransformContext<'_>) -> Vec<String> {
    let mut allowed: Vec<String> = peer.allowed_ips().to_vec();

    if context.ignore_local_routes {
        allowed.retain(|route| match covering_local(route, context.local_addresses) {
            Some(local) => {
                log::info!(
                    "Filtering out route {} as it covers local interface address {}",
                    route,
                    local
                );
                false
            }
            None => true,
        });
    }

    if !context.ignore_addresses.is_empty() {
        allowed.retain(|route| !context.ignore_addresses.iter().any(|i| i.trim() == route));
    }

    allowed
}

/// Build the platform specific variant of a configuration
pub fn transform(
    platform: &dyn Platform,
    configuration: &VpnConfiguration,
    context: &TransformContext<'_>,
) -> Result<VpnConfiguration> {
    let mut peers = Vec::with_capacity(configuration.peers().len());
    for peer in configuration.peers() {
        let builder = if context.gateway_peer == Some(peer.public_key()) {
            peer.to_builder().allowed_ips([FULL_TUNNEL_V4])
        } else {
            peer.to_builder().allowed_ips(filter_allowed_ips(peer, context))
        };
        peers.push(platform.transform_peer(peer, builder).build()?);
    }

    platform
        .transform_interface(configuration.to_builder())
        .peers(peers)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{LinuxPlatform, MockPlatform};
    use std::sync::Arc;

    const KEY: &str = "xTIBA5rboUvnH4htodjb6e697QjLERt1NAB4mZqp8Dg=";

    fn peer(key: &str, ips: &[&str]) -> VpnPeer {
        VpnPeer::builder(key)
            .endpoint("203.0.113.5", 51820)
            .allowed_ips(ips.iter().copied())
            .build()
            .unwrap()
    }

    fn config(peers: Vec<VpnPeer>) -> VpnConfiguration {
        VpnConfiguration::builder()
            .public_key(KEY)
            .address("10.9.0.2/24")
            .dns_server("10.9.0.1")
            .peers(peers)
            .build()
            .unwrap()
    }

    fn local() -> Vec<IpAddr> {
        vec!["192.168.1.5".parse().unwrap(), "fd00:1::5".parse().unwrap()]
    }

    #[test]
    fn test_gateway_peer_gets_full_tunnel() {
        let platform = MockPlatform::new();
        let cfg = config(vec![peer("gw", &["10.0.0.0/8", "192.168.0.0/16", "fd00::/8"])]);
        let ctx = TransformContext {
            gateway_peer: Some("gw"),
            ignore_local_routes: true,
            ..Default::default()
        };
        let out = transform(&platform, &cfg, &ctx).unwrap();
        assert_eq!(out.peers()[0].allowed_ips(), &["0.0.0.0/0".to_string()]);
        assert_eq!(cfg.peers()[0].allowed_ips().len(), 3);
    }

    #[test]
    fn test_local_route_exclusion() {
        let platform = MockPlatform::new();
        let locals = local();
        let cfg = config(vec![peer("a", &["10.0.0.0/8", "192.168.1.5/32"])]);
        let ctx = TransformContext {
            ignore_local_routes: true,
            local_addresses: &locals,
            ..Default::default()
        };
        let out = transform(&platform, &cfg, &ctx).unwrap();
        assert_eq!(out.peers()[0].allowed_ips(), &["10.0.0.0/8".to_string()]);
    }

    #[test]
    fn test_exclusion_covers_both_families_and_bare_hosts() {
        let platform = MockPlatform::new();
        let locals = local();
        let cfg = config(vec![peer(
            "a",
            &["192.168.0.0/16", "fd00::/16", "192.168.1.5", "172.16.0.0/12", "fd01::/64"],
        )]);
        let ctx = TransformContext {
            ignore_local_routes: true,
            local_addresses: &locals,
            ..Default::default()
        };
        let out = transform(&platform, &cfg, &ctx).unwrap();
        assert_eq!(
            out.peers()[0].allowed_ips(),
            &["172.16.0.0/12".to_string(), "fd01::/64".to_string()]
        );
    }

    #[test]
    fn test_exclusion_disabled_keeps_routes() {
        let platform = MockPlatform::new();
        let locals = local();
        let cfg = config(vec![peer("a", &["192.168.1.0/24"])]);
        let ctx = TransformContext {
            ignore_local_routes: false,
            local_addresses: &locals,
            ..Default::default()
        };
        let out = transform(&platform, &cfg, &ctx).unwrap();
        assert_eq!(out.peers()[0].allowed_ips(), &["192.168.1.0/24".to_string()]);
    }

    #[test]
    fn test_ignore_list_applies_to_non_gateway_peers() {
        let platform = MockPlatform::new();
        let ignore = vec!["10.5.0.0/16".to_string()];
        let cfg = config(vec![
            peer("gw", &["10.5.0.0/16"]),
            peer("a", &["10.5.0.0/16", "10.6.0.0/16"]),
        ]);
        let ctx = TransformContext {
            gateway_peer: Some("gw"),
            ignore_addresses: &ignore,
            ..Default::default()
        };
        let out = transform(&platform, &cfg, &ctx).unwrap();
        assert_eq!(out.peers()[0].allowed_ips(), &["0.0.0.0/0".to_string()]);
        assert_eq!(out.peers()[1].allowed_ips(), &["10.6.0.0/16".to_string()]);
    }

    #[test]
    fn test_transform_is_idempotent() {
        let platform = MockPlatform::new();
        let locals = local();
        let ignore = vec!["10.6.0.0/16".to_string()];
        let cfg = config(vec![
            peer("gw", &["10.0.0.0/8"]),
            peer("a", &["192.168.1.0/24", "10.6.0.0/16", "10.7.0.0/16"]),
        ]);
        let ctx = TransformContext {
            gateway_peer: Some("gw"),
            ignore_local_routes: true,
            local_addresses: &locals,
            ignore_addresses: &ignore,
        };
        let once = transform(&platform, &cfg, &ctx).unwrap();
        let twice = transform(&platform, &once, &ctx).unwrap();
        assert_eq!(once, twice);
        assert_eq!(once.peers(), twice.peers());
        for (a, b) in once.peers().iter().zip(twice.peers()) {
            assert_eq!(a.allowed_ips(), b.allowed_ips());
        }
    }

    #[test]
    fn test_linux_strips_interface_fields() {
        let platform = LinuxPlatform::new(Arc::new(crate::command::mock::ScriptedCommands::new()));
        let cfg = config(vec![peer("a", &["10.0.0.0/8"])]);
        let out = transform(&platform, &cfg, &TransformContext::default()).unwrap();
        assert!(out.addresses().is_empty());
        assert!(out.dns().is_empty());
        assert_eq!(out.public_key(), cfg.public_key());
        assert_eq!(cfg.addresses(), &["10.9.0.2/24".to_string()]);
    }
}
