//! Route selection scenarios for wirelift-net
//!
//! These exercise the helpers together the way the engine uses them: filter
//! allowed-ips against local addresses, then order what is left.

use std::net::IpAddr;

use wirelift_net::route::{covers_local, install_order, parse_network, FULL_TUNNEL_V4};
use wirelift_net::{Route, Table};

fn locals(addrs: &[&str]) -> Vec<IpAddr> {
    addrs.iter().map(|a| a.parse().unwrap()).collect()
}

#[test]
fn test_filter_then_order() {
    let local = locals(&["192.168.1.5"]);
    let allowed = ["10.0.0.0/8", "192.168.1.5/32", "10.1.0.0/16", FULL_TUNNEL_V4];

    // A full tunnel route covers everything, so it is filtered too
    let kept: Vec<&str> = allowed
        .iter()
        .copied()
        .filter(|r| !covers_local(r, &local))
        .collect();

    assert_eq!(kept, vec!["10.0.0.0/8", "10.1.0.0/16"]);
    assert_eq!(install_order(&kept), vec!["10.1.0.0/16", "10.0.0.0/8"]);
}

#[test]
fn test_order_is_stable_for_mixed_families() {
    let ordered = install_order(&["fd00::/64", "10.0.0.0/24", "fd00:1::/64", "::/0", "10.9.9.9/32"]);
    assert_eq!(
        ordered,
        vec!["fd00:1::/64", "fd00::/64", "10.9.9.9/32", "10.0.0.0/24", "::/0"]
    );
}

#[test]
fn test_order_twice_is_unchanged() {
    let once = install_order(&["10.0.0.0/8", "10.1.0.0/16", "0.0.0.0/0"]);
    let twice = install_order(&once);
    assert_eq!(once, twice);
}

#[test]
fn test_routes_render_for_commands() {
    let net = parse_network("10.10.0.0/16").unwrap();
    let route = Route::interface_route(net, "wg2").with_table(Table::Main);
    assert_eq!(route.to_string(), "10.10.0.0/16 dev wg2 table main");
}
