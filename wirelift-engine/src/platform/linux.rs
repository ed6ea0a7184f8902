//! Kernel WireGuard on Linux
//!
//! Interfaces are managed with `ip`, tunnel state with `wg`. Addresses, MTU
//! and DNS are set through the OS rather than the tunnel, so they are
//! stripped from the configuration handed to `wg setconf`.

use std::io::Write;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use ipnet::IpNet;
use wirelift_net::{Gateway, GatewaySwitch, Route, VirtualAddress, DEFAULT_MTU};

use super::{Applied, InterfaceInformation, PeerInformation, Platform, UpdateMode};
use crate::command::CommandChannel;
use crate::error::{BoxError, Error, Result};
use crate::vpn::{VpnConfiguration, VpnConfigurationBuilder};
use crate::wgconf;

/// Default prefix of numbered interface slots
pub const DEFAULT_PREFIX: &str = "wg";

const MAX_NAME_LEN: usize = 15;

/// The two halves that together cover the IPv4 space without replacing
/// the OS default route
const SPLIT_DEFAULT_V4: [&str; 2] = ["0.0.0.0/1", "128.0.0.0/1"];
const SPLIT_DEFAULT_V6: [&str; 2] = ["::/1", "8000::/1"];

/// Linux kernel WireGuard platform
pub struct LinuxPlatform {
    commands: Arc<dyn CommandChannel>,
    prefix: String,
    default_mtu: u32,
}

impl LinuxPlatform {
    pub fn new(commands: Arc<dyn CommandChannel>) -> Self {
        Self {
            commands,
            prefix: DEFAULT_PREFIX.to_string(),
            default_mtu: DEFAULT_MTU,
        }
    }

    /// Use a different interface slot prefix
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// MTU used when a configuration does not set one
    pub fn with_default_mtu(mut self, mtu: u32) -> Self {
        self.default_mtu = mtu;
        self
    }

    fn privileged(&self) -> &dyn CommandChannel {
        self.commands.privileged()
    }

    fn wg_show(&self, native_name: &str, what: &str) -> Result<Vec<String>> {
        self.privileged().output(&["wg", "show", native_name, what])
    }

    /// MTU and up flag from `ip -o link show dev`
    fn link(&self, native_name: &str) -> Result<(u32, bool)> {
        let lines = self
            .commands
            .output(&["ip", "-o", "link", "show", "dev", native_name])
            .map_err(|e| {
                if is_missing_device(&e) {
                    Error::NotFound(format!("interface `{}`", native_name))
                } else {
                    e
                }
            })?;
        let line = lines
            .first()
            .ok_or_else(|| Error::NotFound(format!("interface `{}`", native_name)))?;
        Ok(parse_link(line))
    }

    fn add_address(&self, native_name: &str, address: &str) -> Result<()> {
        let family = match wirelift_net::route::parse_network(address)? {
            IpNet::V4(_) => "-4",
            IpNet::V6(_) => "-6",
        };
        log::info!("Setting address {} on {}", address, native_name);
        self.privileged()
            .run(&["ip", family, "address", "add", address, "dev", native_name])
    }

    fn route(&self, verb: &str, route: &Route) -> Result<()> {
        let family = if route.is_ipv6() { "-6" } else { "-4" };
        let rendered = route.to_string();
        let mut args = vec!["ip", family, "route", verb];
        args.extend(rendered.split_whitespace());
        self.privileged().run(&args)
    }
}

impl Platform for LinuxPlatform {
    fn name(&self) -> &str {
        "linux"
    }

    fn commands(&self) -> &dyn CommandChannel {
        self.commands.as_ref()
    }

    fn interface_prefix(&self) -> &str {
        &self.prefix
    }

    fn is_valid_native_interface_name(&self, name: &str) -> bool {
        !name.is_empty()
            && name.len() <= MAX_NAME_LEN
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '=' | '+' | '.' | '-'))
    }

    fn interfaces(&self) -> Result<Vec<String>> {
        let lines = self
            .commands
            .output(&["ip", "-o", "link", "show", "type", "wireguard"])?;
        Ok(lines.iter().filter_map(|l| parse_link_name(l)).collect())
    }

    fn address(&self, name: &str, native_name: &str) -> Result<VirtualAddress> {
        let (mtu, up) = self.link(native_name)?;
        Ok(VirtualAddress::new(name, native_name)
            .with_mtu(mtu)
            .with_up(up))
    }

    fn add(&self, name: &str, native_name: &str) -> Result<VirtualAddress> {
        log::info!("Creating interface {}", native_name);
        self.privileged()
            .run(&["ip", "link", "add", "dev", native_name, "type", "wireguard"])?;
        Ok(VirtualAddress::new(name, native_name))
    }

    fn public_key(&self, native_name: &str) -> Result<Option<String>> {
        match self.wg_show(native_name, "public-key") {
            Ok(lines) => {
                let key = lines.first().map(|l| l.trim()).unwrap_or("");
                if key.is_empty() || key == "(none)" {
                    Ok(None)
                } else {
                    Ok(Some(key.to_string()))
                }
            }
            Err(e) if is_missing_device(&e) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn apply(
        &self,
        address: &VirtualAddress,
        configuration: &VpnConfiguration,
        effective: &VpnConfiguration,
    ) -> std::result::Result<Applied, BoxError> {
        let native = address.native_name.as_str();

        let mut file = tempfile::Builder::new().prefix("wg").suffix(".cfg").tempfile()?;
        file.write_all(wgconf::to_setconf_string(effective).as_bytes())?;
        file.flush()?;
        let path = file.path().to_string_lossy().to_string();

        log::info!("Activating WireGuard configuration for {}", address.short_name());
        self.privileged().run(&["wg", "setconf", native, &path])?;
        log::info!("Activated WireGuard configuration for {}", address.short_name());

        for addr in configuration.addresses() {
            self.add_address(native, addr)?;
        }

        let mtu = configuration.mtu().unwrap_or(self.default_mtu).to_string();
        log::info!("Bringing up {}", address.short_name());
        self.privileged()
            .run(&["ip", "link", "set", "mtu", &mtu, "up", "dev", native])?;

        Ok(Applied::AwaitHandshake)
    }

    fn latest_handshake(&self, native_name: &str, public_key: &str) -> Result<Option<SystemTime>> {
        for line in self.wg_show(native_name, "latest-handshakes")? {
            let mut fields = line.split_whitespace();
            if let (Some(key), Some(secs)) = (fields.next(), fields.next()) {
                if key == public_key {
                    return Ok(epoch_seconds(secs));
                }
            }
        }
        Ok(None)
    }

    fn down(&self, address: &VirtualAddress) -> Result<()> {
        self.privileged()
            .run(&["ip", "link", "set", "down", "dev", &address.native_name])
    }

    fn delete(&self, address: &VirtualAddress) -> Result<()> {
        log::info!("Deleting interface {}", address.native_name);
        self.privileged()
            .run(&["ip", "link", "del", "dev", &address.native_name])
    }

    /// Kernel interfaces are removed on close
    fn close(&self, address: &VirtualAddress) -> Result<()> {
        self.delete(address)
    }

    fn set_configuration(&self, native_name: &str, path: &Path, mode: UpdateMode) -> Result<()> {
        let verb = match mode {
            UpdateMode::Replace => "setconf",
            UpdateMode::Sync => "syncconf",
            UpdateMode::Append => "addconf",
        };
        let path = path.to_string_lossy();
        self.privileged().run(&["wg", verb, native_name, &path])
    }

    fn remove_peer(&self, native_name: &str, public_key: &str) -> Result<()> {
        self.privileged()
            .run(&["wg", "set", native_name, "peer", public_key, "remove"])
    }

    fn allowed_ips(&self, native_name: &str) -> Result<Vec<String>> {
        let mut ips = Vec::new();
        for line in self.wg_show(native_name, "allowed-ips")? {
            ips.extend(
                line.split_whitespace()
                    .skip(1)
                    .filter(|ip| *ip != "(none)")
                    .map(str::to_string),
            );
        }
        Ok(ips)
    }

    fn installs_routes(&self) -> bool {
        true
    }

    fn set_routes(&self, address: &VirtualAddress, routes: &[String]) -> Result<()> {
        for route in routes {
            let route = Route::parse(route, address.native_name.clone())?.with_table(address.table);
            log::info!("Adding route {}", route);
            match self.route("add", &route) {
                Ok(()) => {}
                Err(Error::Command { ref message, .. }) if message.contains("File exists") => {
                    log::debug!("Route {} already present", route);
                }
                Err(e) => return Err(Error::Route(format!("failed to add {}: {}", route, e))),
            }
        }
        Ok(())
    }

    fn default_gateway(&self) -> Result<Option<Gateway>> {
        let lines = self.commands.output(&["ip", "route", "show", "default"])?;
        Ok(lines.iter().find_map(|l| parse_default_route(l)))
    }

    fn set_default_gateway(&self, switch: &GatewaySwitch) -> Result<()> {
        let pin = endpoint_pin(switch);
        log::info!(
            "Routing traffic all through {} on {}",
            switch.tunnel.address,
            switch.tunnel.native_iface
        );
        self.route("add", &pin)?;
        for half in split_default(switch) {
            self.route("add", &half)?;
        }
        Ok(())
    }

    fn reset_default_gateway(&self, switch: &GatewaySwitch) -> Result<()> {
        log::info!(
            "Stopping routing traffic all through {} on {}",
            switch.tunnel.address,
            switch.tunnel.native_iface
        );
        let mut first_error = None;
        for half in split_default(switch) {
            match self.route("del", &half) {
                Ok(()) => {}
                // the halves go away with the link when it was deleted first
                Err(e) if is_missing_device(&e) => log::debug!("{} already gone", half),
                Err(e) => {
                    log::debug!("Failed to remove {}: {}", half, e);
                    first_error.get_or_insert(e);
                }
            }
        }
        if let Err(e) = self.route("del", &endpoint_pin(switch)) {
            first_error.get_or_insert(e);
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn transform_interface(&self, builder: VpnConfigurationBuilder) -> VpnConfigurationBuilder {
        builder
            .addresses(Vec::<String>::new())
            .dns(Vec::<String>::new())
            .mtu(None)
    }

    fn information(&self, address: &VirtualAddress) -> Result<InterfaceInformation> {
        let lines = self.wg_show(&address.native_name, "dump")?;
        parse_dump(&address.name, &lines)
    }

    fn configuration(&self, native_name: &str) -> Result<VpnConfiguration> {
        let lines = self.privileged().output(&["wg", "showconf", native_name])?;
        wgconf::parse(&lines.join("\n"))
    }
}

fn is_missing_device(err: &Error) -> bool {
    match err {
        Error::Command { message, .. } => {
            message.contains("No such device")
                || message.contains("does not exist")
                || message.contains("Unable to access interface")
                || message.contains("Cannot find device")
        }
        _ => false,
    }
}

/// Host route keeping the endpoint reachable over the previous gateway
fn endpoint_pin(switch: &GatewaySwitch) -> Route {
    Route::interface_route(IpNet::from(switch.tunnel.address), switch.previous.native_iface.clone())
        .with_gateway(switch.previous.address)
}

fn split_default(switch: &GatewaySwitch) -> Vec<Route> {
    let halves = match switch.tunnel.address {
        IpAddr::V4(_) => SPLIT_DEFAULT_V4,
        IpAddr::V6(_) => SPLIT_DEFAULT_V6,
    };
    halves
        .iter()
        .filter_map(|h| Route::parse(h, switch.tunnel.native_iface.clone()).ok())
        .collect()
}

fn epoch_seconds(value: &str) -> Option<SystemTime> {
    match value.parse::<u64>() {
        Ok(0) | Err(_) => None,
        Ok(secs) => Some(UNIX_EPOCH + Duration::from_secs(secs)),
    }
}

fn optional(value: &str) -> Option<&str> {
    match value {
        "(none)" | "off" | "" => None,
        v => Some(v),
    }
}

fn parse_fwmark(value: &str) -> Option<u32> {
    let value = optional(value)?;
    let mark = match value.strip_prefix("0x") {
        Some(hex) => u32::from_str_radix(hex, 16).ok()?,
        None => value.parse().ok()?,
    };
    (mark != 0).then_some(mark)
}

/// Interface name from one line of `ip -o link show`
///
/// `5: wg0: <POINTOPOINT,NOARP,UP,LOWER_UP> mtu 1420 ...`
pub(crate) fn parse_link_name(line: &str) -> Option<String> {
    let name = line.split(':').nth(1)?.trim();
    let name = name.split('@').next().unwrap_or(name);
    (!name.is_empty()).then(|| name.to_string())
}

fn parse_link(line: &str) -> (u32, bool) {
    let mut fields = line.split_whitespace();
    let mut mtu = 0;
    let mut up = false;
    while let Some(field) = fields.next() {
        if field.starts_with('<') {
            up = field
                .trim_matches(|c| c == '<' || c == '>')
                .split(',')
                .any(|f| f == "UP");
        } else if field == "mtu" {
            mtu = fields.next().and_then(|m| m.parse().ok()).unwrap_or(0);
        }
    }
    (mtu, up)
}

/// Gateway from one line of `ip route show default`
///
/// Routes without a `via` (such as a tunnel's own default) are skipped.
pub(crate) fn parse_default_route(line: &str) -> Option<Gateway> {
    let mut via = None;
    let mut dev = None;
    let mut fields = line.split_whitespace();
    while let Some(field) = fields.next() {
        match field {
            "via" => via = fields.next().and_then(|v| v.parse::<IpAddr>().ok()),
            "dev" => dev = fields.next(),
            _ => {}
        }
    }
    Some(Gateway::new(dev?, via?))
}

/// Parse the tab separated output of `wg show <iface> dump`
///
/// The first line describes the interface, every following line one peer.
pub(crate) fn parse_dump(interface_name: &str, lines: &[String]) -> Result<InterfaceInformation> {
    let mut info = InterfaceInformation {
        interface_name: interface_name.to_string(),
        ..Default::default()
    };
    let bad = |line: &str| Error::Parse {
        line: 0,
        message: format!("unexpected `wg show dump` line: {}", line),
    };

    for line in lines.iter().filter(|l| !l.trim().is_empty()) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        match fields.len() {
            4 => {
                info.public_key = fields[1].to_string();
                info.listen_port = fields[2].parse().ok().filter(|p| *p != 0);
                info.fwmark = parse_fwmark(fields[3]);
            }
            8 => {
                let allowed_ips = optional(fields[3])
                    .map(|ips| ips.split(',').map(str::to_string).collect())
                    .unwrap_or_default();
                info.peers.push(PeerInformation {
                    public_key: fields[0].to_string(),
                    preshared_key: optional(fields[1]).map(str::to_string),
                    endpoint: optional(fields[2]).and_then(|e| e.parse::<SocketAddr>().ok()),
                    allowed_ips,
                    last_handshake: epoch_seconds(fields[4]),
                    rx: fields[5].parse().map_err(|_| bad(line))?,
                    tx: fields[6].parse().map_err(|_| bad(line))?,
                });
            }
            _ => return Err(bad(line)),
        }
    }
    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::mock::{Reply, ScriptedCommands};
    use wirelift_net::Table;

    const KEY: &str = "xTIBA5rboUvnH4htodjb6e697QjLERt1NAB4mZqp8Dg=";

    fn platform() -> (Arc<ScriptedCommands>, LinuxPlatform) {
        let commands = Arc::new(ScriptedCommands::new());
        let platform = LinuxPlatform::new(commands.clone());
        (commands, platform)
    }

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|l| l.to_string()).collect()
    }

    #[test]
    fn test_valid_native_names() {
        let (_, platform) = platform();
        assert!(platform.is_valid_native_interface_name("wg0"));
        assert!(platform.is_valid_native_interface_name("office-vpn.1"));
        assert!(!platform.is_valid_native_interface_name(""));
        assert!(!platform.is_valid_native_interface_name("has space"));
        assert!(!platform.is_valid_native_interface_name("sixteen-chars-xx"));
    }

    #[test]
    fn test_parse_link_lines() {
        let line = "7: wg1: <POINTOPOINT,NOARP,UP,LOWER_UP> mtu 1380 qdisc noqueue state UNKNOWN";
        assert_eq!(parse_link_name(line).as_deref(), Some("wg1"));
        assert_eq!(parse_link(line), (1380, true));

        let down = "8: wg2: <POINTOPOINT,NOARP> mtu 1420 qdisc noop state DOWN";
        assert_eq!(parse_link(down), (1420, false));
        assert_eq!(parse_link_name("9: veth0@if3: <UP> mtu 1500").as_deref(), Some("veth0"));
    }

    #[test]
    fn test_parse_default_route() {
        let gw = parse_default_route("default via 192.168.1.1 dev eth0 proto dhcp metric 100").unwrap();
        assert_eq!(gw.native_iface, "eth0");
        assert_eq!(gw.address, "192.168.1.1".parse::<IpAddr>().unwrap());
        assert!(parse_default_route("default dev wg0 scope link").is_none());
    }

    #[test]
    fn test_parse_dump() {
        let dump = lines(&[
            "cHJpdmF0ZQ==\tcHVibGlj\t51820\toff",
            "cGVlcjE=\t(none)\t203.0.113.5:51820\t10.0.0.0/24,10.1.0.0/16\t1700000000\t2048\t1024\t25",
            "cGVlcjI=\t(none)\t(none)\t(none)\t0\t0\t0\toff",
        ]);
        let info = parse_dump("office", &dump).unwrap();
        assert_eq!(info.interface_name, "office");
        assert_eq!(info.public_key, "cHVibGlj");
        assert_eq!(info.listen_port, Some(51820));
        assert_eq!(info.fwmark, None);
        assert_eq!(info.peers.len(), 2);

        let first = &info.peers[0];
        assert_eq!(first.allowed_ips, vec!["10.0.0.0/24", "10.1.0.0/16"]);
        assert_eq!(first.endpoint, Some("203.0.113.5:51820".parse().unwrap()));
        assert_eq!(first.rx, 2048);
        assert!(first.last_handshake.is_some());

        let second = &info.peers[1];
        assert!(second.endpoint.is_none());
        assert!(second.allowed_ips.is_empty());
        assert!(second.last_handshake.is_none());
        assert_eq!(info.rx(), 2048);
    }

    #[test]
    fn test_parse_dump_rejects_garbage() {
        assert!(parse_dump("x", &lines(&["one two"])).is_err());
    }

    #[test]
    fn test_fwmark_forms() {
        assert_eq!(parse_fwmark("off"), None);
        assert_eq!(parse_fwmark("0xca6c"), Some(0xca6c));
        assert_eq!(parse_fwmark("51820"), Some(51820));
    }

    #[test]
    fn test_interfaces_lists_wireguard_links() {
        let (commands, platform) = platform();
        commands.reply(
            "ip -o link show type wireguard",
            Reply::ok([
                "4: wg0: <POINTOPOINT,NOARP,UP,LOWER_UP> mtu 1420 qdisc noqueue",
                "6: wg3: <POINTOPOINT,NOARP> mtu 1420 qdisc noop",
            ]),
        );
        assert_eq!(platform.interfaces().unwrap(), vec!["wg0", "wg3"]);
        assert!(platform.exists("wg3").unwrap());
        assert!(!platform.exists("wg1").unwrap());
    }

    #[test]
    fn test_public_key_none_and_missing() {
        let (commands, platform) = platform();
        commands.reply("wg show wg0 public-key", Reply::ok(["(none)"]));
        commands.reply(
            "wg show wg1 public-key",
            Reply::fail(1, ["Unable to access interface: No such device"]),
        );
        commands.reply("wg show wg2 public-key", Reply::ok([KEY]));
        assert_eq!(platform.public_key("wg0").unwrap(), None);
        assert_eq!(platform.public_key("wg1").unwrap(), None);
        assert_eq!(platform.public_key("wg2").unwrap().as_deref(), Some(KEY));
    }

    #[test]
    fn test_latest_handshake() {
        let (commands, platform) = platform();
        commands.reply(
            "wg show wg0 latest-handshakes",
            Reply::ok([format!("{}\t1700000000", KEY), "b3RoZXI=\t0".to_string()]),
        );
        let at = platform.latest_handshake("wg0", KEY).unwrap();
        assert_eq!(at, Some(UNIX_EPOCH + Duration::from_secs(1_700_000_000)));
        assert_eq!(platform.latest_handshake("wg0", "b3RoZXI=").unwrap(), None);
        assert_eq!(platform.latest_handshake("wg0", "missing").unwrap(), None);
    }

    #[test]
    fn test_allowed_ips_flattened() {
        let (commands, platform) = platform();
        commands.reply(
            "wg show wg0 allowed-ips",
            Reply::ok(["a=\t10.0.0.0/8 10.1.0.0/16", "b=\t(none)", "c=\tfd00::/64"]),
        );
        assert_eq!(
            platform.allowed_ips("wg0").unwrap(),
            vec!["10.0.0.0/8", "10.1.0.0/16", "fd00::/64"]
        );
    }

    #[test]
    fn test_apply_sets_addresses_and_mtu() {
        let (commands, platform) = platform();
        let config = VpnConfiguration::builder()
            .public_key(KEY)
            .address("10.9.0.2/24")
            .address("fd00:9::2/64")
            .mtu(Some(1380))
            .build()
            .unwrap();
        let effective = platform
            .transform_interface(config.to_builder())
            .build()
            .unwrap();
        assert!(effective.addresses().is_empty());
        assert_eq!(effective.mtu(), None);

        let address = VirtualAddress::new("office", "wg0");
        let applied = platform.apply(&address, &config, &effective).unwrap();
        assert_eq!(applied, Applied::AwaitHandshake);

        let ran = commands.lines();
        assert!(ran[0].starts_with("wg setconf wg0 "));
        assert_eq!(ran[1], "ip -4 address add 10.9.0.2/24 dev wg0");
        assert_eq!(ran[2], "ip -6 address add fd00:9::2/64 dev wg0");
        assert_eq!(ran[3], "ip link set mtu 1380 up dev wg0");
    }

    #[test]
    fn test_set_routes_ignores_existing() {
        let (commands, platform) = platform();
        commands.reply(
            "ip -4 route add 10.0.0.0/8",
            Reply::fail(2, ["RTNETLINK answers: File exists"]),
        );
        let address = VirtualAddress::new("office", "wg0").with_table(Table::Id(51820));
        platform
            .set_routes(&address, &["10.1.0.0/16".to_string(), "10.0.0.0/8".to_string()])
            .unwrap();
        assert_eq!(
            commands.lines(),
            vec![
                "ip -4 route add 10.1.0.0/16 dev wg0 table 51820",
                "ip -4 route add 10.0.0.0/8 dev wg0 table 51820",
            ]
        );
    }

    #[test]
    fn test_set_routes_reports_failure() {
        let (commands, platform) = platform();
        commands.reply("ip -4 route add", Reply::fail(2, ["RTNETLINK answers: Invalid argument"]));
        let address = VirtualAddress::new("office", "wg0");
        let err = platform
            .set_routes(&address, &["10.1.0.0/16".to_string()])
            .unwrap_err();
        assert!(matches!(err, Error::Route(_)));
    }

    #[test]
    fn test_default_gateway_switch_commands() {
        let (commands, platform) = platform();
        let switch = GatewaySwitch::new(
            Gateway::new("eth0", "192.168.1.1".parse().unwrap()),
            Gateway::new("wg0", "203.0.113.5".parse().unwrap()),
        );
        platform.set_default_gateway(&switch).unwrap();
        platform.reset_default_gateway(&switch).unwrap();
        assert_eq!(
            commands.lines(),
            vec![
                "ip -4 route add 203.0.113.5/32 via 192.168.1.1 dev eth0",
                "ip -4 route add 0.0.0.0/1 dev wg0",
                "ip -4 route add 128.0.0.0/1 dev wg0",
                "ip -4 route del 0.0.0.0/1 dev wg0",
                "ip -4 route del 128.0.0.0/1 dev wg0",
                "ip -4 route del 203.0.113.5/32 via 192.168.1.1 dev eth0",
            ]
        );
    }

    #[test]
    fn test_update_modes_map_to_wg_verbs() {
        let (commands, platform) = platform();
        let path = Path::new("/tmp/x.conf");
        platform.set_configuration("wg0", path, UpdateMode::Replace).unwrap();
        platform.set_configuration("wg0", path, UpdateMode::Sync).unwrap();
        platform.set_configuration("wg0", path, UpdateMode::Append).unwrap();
        assert_eq!(
            commands.lines(),
            vec![
                "wg setconf wg0 /tmp/x.conf",
                "wg syncconf wg0 /tmp/x.conf",
                "wg addconf wg0 /tmp/x.conf",
            ]
        );
    }
}
