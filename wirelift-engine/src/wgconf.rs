//! wg-quick style configuration files
//!
//! The full form carries everything a tunnel needs (addresses, DNS, hooks).
//! The `setconf` form is the subset the `wg` tool accepts.

use std::fmt::Write as _;
use std::path::Path;

use wirelift_net::Table;

use crate::error::{Error, Result};
use crate::vpn::{VpnConfiguration, VpnConfigurationBuilder, VpnPeer, VpnPeerBuilder};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    Interface,
    Peer,
}

/// Read a configuration file from disk
pub fn load<P: AsRef<Path>>(path: P) -> Result<VpnConfiguration> {
    let content = std::fs::read_to_string(path)?;
    parse(&content)
}

/// Parse a wg-quick configuration
pub fn parse(content: &str) -> Result<VpnConfiguration> {
    let mut config = VpnConfiguration::builder();
    let mut section = Section::None;
    let mut peer: Option<(usize, VpnPeerBuilder)> = None;
    let mut peers: Vec<VpnPeer> = Vec::new();
    let mut seen_interface = false;

    for (idx, raw) in content.lines().enumerate() {
        let line_no = idx + 1;
        let line = match raw.find('#') {
            Some(pos) => &raw[..pos],
            None => raw,
        }
        .trim();
        if line.is_empty() {
            continue;
        }

        if line.starts_with('[') && line.ends_with(']') {
            if let Some((start, builder)) = peer.take() {
                peers.push(finish_peer(start, builder)?);
            }
            section = match line[1..line.len() - 1].trim().to_ascii_lowercase().as_str() {
                "interface" => {
                    seen_interface = true;
                    Section::Interface
                }
                "peer" => {
                    peer = Some((line_no, VpnPeer::builder("")));
                    Section::Peer
                }
                other => return Err(parse_error(line_no, format!("unknown section [{}]", other))),
            };
            continue;
        }

        let (key, value) = line
            .split_once('=')
            .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim()))
            .ok_or_else(|| parse_error(line_no, format!("expected `key = value`, got `{}`", line)))?;

        match section {
            Section::None => {
                return Err(parse_error(line_no, "setting outside of a section".to_string()))
            }
            Section::Interface => {
                config = interface_setting(config, &key, value, line_no)?;
            }
            Section::Peer => {
                if let Some((start, builder)) = peer.take() {
                    peer = Some((start, peer_setting(builder, &key, value, line_no)?));
                }
            }
        }
    }

    if let Some((start, builder)) = peer.take() {
        peers.push(finish_peer(start, builder)?);
    }
    if !seen_interface {
        return Err(parse_error(1, "missing [Interface] section".to_string()));
    }

    config.peers(peers).build()
}

fn interface_setting(
    config: VpnConfigurationBuilder,
    key: &str,
    value: &str,
    line: usize,
) -> Result<VpnConfigurationBuilder> {
    Ok(match key {
        "privatekey" => config.private_key(value),
        "publickey" => config.public_key(value),
        "listenport" => config.listen_port(parse_num(value, line)?),
        "fwmark" => {
            if value.eq_ignore_ascii_case("off") {
                config
            } else {
                config.fwmark(parse_fwmark(value, line)?)
            }
        }
        "address" => split_list(value).fold(config, |c, a| c.address(a)),
        "dns" => split_list(value).fold(config, |c, d| c.dns_server(d)),
        "mtu" => config.mtu(Some(parse_num(value, line)?)),
        "table" => config.table(
            value
                .parse::<Table>()
                .map_err(|e| parse_error(line, e.to_string()))?,
        ),
        "preup" => config.pre_up(value),
        "postup" => config.post_up(value),
        "predown" => config.pre_down(value),
        "postdown" => config.post_down(value),
        "saveconfig" => config.save_config(parse_bool(value, line)?),
        other => return Err(parse_error(line, format!("unknown interface setting `{}`", other))),
    })
}

fn peer_setting(peer: VpnPeerBuilder, key: &str, value: &str, line: usize) -> Result<VpnPeerBuilder> {
    Ok(match key {
        "publickey" => peer.public_key(value),
        "presharedkey" => peer.preshared_key(value),
        "allowedips" => split_list(value).fold(peer, |p, ip| p.allowed_ip(ip)),
        "endpoint" => {
            let (host, port) = split_endpoint(value).ok_or_else(|| {
                parse_error(line, format!("endpoint `{}` must be host:port", value))
            })?;
            peer.endpoint(host, port)
        }
        "persistentkeepalive" => {
            if value.eq_ignore_ascii_case("off") {
                peer
            } else {
                peer.persistent_keepalive(parse_num(value, line)?)
            }
        }
        other => return Err(parse_error(line, format!("unknown peer setting `{}`", other))),
    })
}

fn finish_peer(start: usize, builder: VpnPeerBuilder) -> Result<VpnPeer> {
    builder
        .build()
        .map_err(|_| parse_error(start, "[Peer] without PublicKey".to_string()))
}

fn parse_error(line: usize, message: String) -> Error {
    Error::Parse { line, message }
}

fn parse_num<T: std::str::FromStr>(value: &str, line: usize) -> Result<T> {
    value
        .parse()
        .map_err(|_| parse_error(line, format!("`{}` is not a valid number", value)))
}

fn parse_fwmark(value: &str, line: usize) -> Result<u32> {
    match value.strip_prefix("0x") {
        Some(hex) => u32::from_str_radix(hex, 16)
            .map_err(|_| parse_error(line, format!("`{}` is not a valid fwmark", value))),
        None => parse_num(value, line),
    }
}

fn parse_bool(value: &str, line: usize) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(parse_error(line, format!("`{}` is not a boolean", value))),
    }
}

fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|v| !v.is_empty())
}

/// Split `host:port` or `[v6]:port`
pub fn split_endpoint(value: &str) -> Option<(&str, u16)> {
    let value = value.trim();
    if let Some(rest) = value.strip_prefix('[') {
        let (host, port) = rest.split_once("]:")?;
        return Some((host, port.parse().ok()?));
    }
    let (host, port) = value.rsplit_once(':')?;
    if host.is_empty() || host.contains(':') {
        return None;
    }
    Some((host, port.parse().ok()?))
}

fn write_peers(out: &mut String, config: &VpnConfiguration) {
    for peer in config.peers() {
        let _ = writeln!(out, "\n[Peer]");
        let _ = writeln!(out, "PublicKey = {}", peer.public_key());
        if let Some(psk) = peer.preshared_key() {
            let _ = writeln!(out, "PresharedKey = {}", psk);
        }
        if !peer.allowed_ips().is_empty() {
            let _ = writeln!(out, "AllowedIPs = {}", peer.allowed_ips().join(", "));
        }
        if let Some(endpoint) = peer.endpoint() {
            let _ = writeln!(out, "Endpoint = {}", endpoint);
        }
        if let Some(keepalive) = peer.persistent_keepalive() {
            let _ = writeln!(out, "PersistentKeepalive = {}", keepalive);
        }
    }
}

fn write_keys(out: &mut String, config: &VpnConfiguration, include_public: bool) {
    match config.private_key() {
        Some(private) => {
            let _ = writeln!(out, "PrivateKey = {}", private);
        }
        None if include_public => {
            let _ = writeln!(out, "PublicKey = {}", config.public_key());
        }
        None => {}
    }
    if let Some(port) = config.listen_port() {
        let _ = writeln!(out, "ListenPort = {}", port);
    }
    if let Some(mark) = config.fwmark() {
        let _ = writeln!(out, "FwMark = {}", mark);
    }
}

/// Render the full wg-quick form
pub fn to_quick_string(config: &VpnConfiguration) -> String {
    let mut out = String::from("[Interface]\n");
    write_keys(&mut out, config, true);
    if !config.addresses().is_empty() {
        let _ = writeln!(out, "Address = {}", config.addresses().join(", "));
    }
    if !config.dns().is_empty() {
        let _ = writeln!(out, "DNS = {}", config.dns().join(", "));
    }
    if let Some(mtu) = config.mtu() {
        let _ = writeln!(out, "MTU = {}", mtu);
    }
    if config.table() != Table::Auto {
        let _ = writeln!(out, "Table = {}", config.table());
    }
    for (key, commands) in [
        ("PreUp", config.pre_up()),
        ("PostUp", config.post_up()),
        ("PreDown", config.pre_down()),
        ("PostDown", config.post_down()),
    ] {
        for command in commands {
            let _ = writeln!(out, "{} = {}", key, command);
        }
    }
    if config.save_config() {
        let _ = writeln!(out, "SaveConfig = true");
    }
    write_peers(&mut out, config);
    out
}

/// Render the subset accepted by `wg setconf`
pub fn to_setconf_string(config: &VpnConfiguration) -> String {
    let mut out = String::from("[Interface]\n");
    write_keys(&mut out, config, false);
    write_peers(&mut out, config);
    out
}

/// Copy of a configuration with the private key removed
pub fn strip_private_key(config: &VpnConfiguration) -> Result<VpnConfiguration> {
    config.to_builder().without_private_key().build()
}
