//! Hook command execution
//!
//! Each PreUp/PostUp/PreDown/PostDown line runs through the shell on the
//! privileged command channel, with a documented set of `WIRELIFT_*`
//! variables describing the tunnel.
//!
//! A hook reports a readable failure by printing a line starting with
//! `[ERROR] `; the last such line becomes the error message.

use wirelift_net::VirtualAddress;

use crate::command::CommandChannel;
use crate::error::{Error, Result};
use crate::vpn::VpnConfiguration;

/// Prefix of every hook environment variable
pub const ENV_PREFIX: &str = "WIRELIFT_";

/// Marker a hook prints before a user facing error message
pub const ERROR_MARKER: &str = "[ERROR] ";

const NO_MAC: &str = "00:00:00:00:00:00";

/// Which hook list is being run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    PreUp,
    PostUp,
    PreDown,
    PostDown,
}

impl HookKind {
    /// The commands of this kind in a configuration
    pub fn commands<'a>(&self, configuration: &'a VpnConfiguration) -> &'a [String] {
        match self {
            HookKind::PreUp => configuration.pre_up(),
            HookKind::PostUp => configuration.post_up(),
            HookKind::PreDown => configuration.pre_down(),
            HookKind::PostDown => configuration.post_down(),
        }
    }
}

impl std::fmt::Display for HookKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            HookKind::PreUp => "pre-up",
            HookKind::PostUp => "post-up",
            HookKind::PreDown => "pre-down",
            HookKind::PostDown => "post-down",
        };
        write!(f, "{}", name)
    }
}

/// Facts about the local machine exported to hooks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostInfo {
    pub local_mac: String,
    pub device_name: String,
}

impl HostInfo {
    /// Probe the local machine, skipping tunnel interfaces for the MAC
    pub fn detect(skip: &[&str]) -> Self {
        Self {
            local_mac: wirelift_net::local::best_local_mac(skip).unwrap_or_else(|| NO_MAC.to_string()),
            device_name: wirelift_net::local::hostname(),
        }
    }
}

/// Build the environment handed to hook commands
///
/// Per-peer variables are numbered from 1 and only count peers with an
/// endpoint.
pub fn environment(
    host: &HostInfo,
    configuration: &VpnConfiguration,
    address: &VirtualAddress,
    ip_mac: Option<&str>,
) -> Vec<(String, String)> {
    let mut env = Vec::new();
    let mut put = |key: &str, value: String| env.push((format!("{}{}", ENV_PREFIX, key), value));

    put("LOCAL_MAC", host.local_mac.clone());
    put("LOCAL_DEVICE_NAME", host.device_name.clone());

    put("ADDRESS", configuration.addresses().join(","));
    put("USER_PUBLIC_KEY", configuration.public_key().to_string());
    put("DNS", configuration.dns().join(" "));
    put("MTU", configuration.mtu().unwrap_or(0).to_string());

    let with_endpoint = configuration
        .peers()
        .iter()
        .filter_map(|p| p.endpoint_address().map(|a| (p, a)));
    for (idx, (peer, endpoint)) in with_endpoint.enumerate() {
        let n = idx + 1;
        put(&format!("ENDPOINT_ADDRESS_{}", n), endpoint.to_string());
        put(
            &format!("ENDPOINT_PORT_{}", n),
            peer.endpoint_port().unwrap_or(0).to_string(),
        );
        put(&format!("PEER_PUBLIC_KEY_{}", n), peer.public_key().to_string());
    }

    put("IP_MAC", ip_mac.unwrap_or(NO_MAC).to_string());
    put("IP_NAME", address.name.clone());
    put("IP_NATIVE_NAME", address.native_name.clone());
    put("IP_SHORT_NAME", address.short_name().to_string());
    put("IP_DISPLAY_NAME", address.display_name());
    put("IP_PEER", address.peer.clone().unwrap_or_default());
    put("IP_TABLE", address.table.to_string());

    env
}

/// Arguments that hand one hook line to the system shell
pub fn shell_command(line: &str) -> Vec<String> {
    #[cfg(windows)]
    {
        vec!["cmd".to_string(), "/C".to_string(), line.to_string()]
    }
    #[cfg(not(windows))]
    {
        vec!["/bin/sh".to_string(), "-c".to_string(), line.to_string()]
    }
}

/// Run one hook line
pub fn run_line(commands: &dyn CommandChannel, line: &str, env: &[(String, String)]) -> Result<()> {
    log::debug!("Executing hook: {}", line);
    for (key, value) in env {
        log::debug!("    {} = {}", key, value);
    }

    let args = shell_command(line);
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    let mut error_message: Option<String> = None;
    let status = commands.consume(&args, env, &mut |output: &str| {
        log::debug!("    {}", output);
        if let Some(message) = output.strip_prefix(ERROR_MARKER) {
            error_message = Some(message.to_string());
        }
    })?;

    log::debug!("Exit: {}", status);
    if status != 0 {
        return Err(Error::Hook(error_message.unwrap_or_else(|| {
            format!("Hook exited with non-zero status of {}.", status)
        })));
    }
    Ok(())
}

/// Run every line of a hook list in order, stopping at the first failure
///
/// `run` executes one line, normally [`run_line`] on a privileged channel.
pub fn run_hooks(
    kind: HookKind,
    lines: &[String],
    run: &mut dyn FnMut(&str) -> Result<()>,
) -> Result<()> {
    if lines.is_empty() {
        return Ok(());
    }
    log::info!("Running {} commands. {}", kind, lines.join("; ").trim());
    for line in lines {
        run(line)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::mock::{Reply, ScriptedCommands};
    use crate::vpn::VpnPeer;
    use wirelift_net::Table;

    fn host() -> HostInfo {
        HostInfo {
            local_mac: "aa:bb:cc:dd:ee:ff".into(),
            device_name: "laptop".into(),
        }
    }

    fn config() -> VpnConfiguration {
        VpnConfiguration::builder()
            .public_key("me=")
            .addresses(["10.0.0.2/24", "fd00::2/64"])
            .dns(["10.0.0.1", "corp.example"])
            .mtu(Some(1380))
            .peer(VpnPeer::builder("responder=").build().unwrap())
            .peer(VpnPeer::builder("server=").endpoint("203.0.113.7", 51820).build().unwrap())
            .pre_up("echo one")
            .pre_up("echo two")
            .build()
            .unwrap()
    }

    fn lookup<'a>(env: &'a [(String, String)], key: &str) -> Option<&'a str> {
        env.iter()
            .find(|(k, _)| k == &format!("{}{}", ENV_PREFIX, key))
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_environment() {
        let address = VirtualAddress::new("office", "wg0").with_table(Table::Id(200));
        let env = environment(&host(), &config(), &address, None);

        assert_eq!(lookup(&env, "LOCAL_MAC"), Some("aa:bb:cc:dd:ee:ff"));
        assert_eq!(lookup(&env, "LOCAL_DEVICE_NAME"), Some("laptop"));
        assert_eq!(lookup(&env, "ADDRESS"), Some("10.0.0.2/24,fd00::2/64"));
        assert_eq!(lookup(&env, "DNS"), Some("10.0.0.1 corp.example"));
        assert_eq!(lookup(&env, "MTU"), Some("1380"));
        // Responder-only peers are not numbered
        assert_eq!(lookup(&env, "ENDPOINT_ADDRESS_1"), Some("203.0.113.7"));
        assert_eq!(lookup(&env, "ENDPOINT_PORT_1"), Some("51820"));
        assert_eq!(lookup(&env, "PEER_PUBLIC_KEY_1"), Some("server="));
        assert_eq!(lookup(&env, "ENDPOINT_ADDRESS_2"), None);
        assert_eq!(lookup(&env, "IP_MAC"), Some("00:00:00:00:00:00"));
        assert_eq!(lookup(&env, "IP_DISPLAY_NAME"), Some("office (wg0)"));
        assert_eq!(lookup(&env, "IP_TABLE"), Some("200"));
        assert_eq!(lookup(&env, "IP_PEER"), Some(""));
    }

    #[test]
    fn test_hooks_run_in_order_with_env() {
        let commands = ScriptedCommands::new();
        let env = vec![("WIRELIFT_X".to_string(), "1".to_string())];
        run_hooks(HookKind::PreUp, config().pre_up(), &mut |line: &str| {
            run_line(&commands, line, &env)
        })
        .unwrap();

        let calls = commands.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].args, shell_command("echo one"));
        assert_eq!(calls[1].args, shell_command("echo two"));
        assert_eq!(calls[1].env, env);
    }

    #[test]
    fn test_first_failure_stops() {
        let commands = ScriptedCommands::new();
        commands.reply(&shell_command("echo one").join(" "), Reply::fail(4, Vec::<String>::new()));
        let err = run_hooks(HookKind::PreUp, config().pre_up(), &mut |line: &str| {
            run_line(&commands, line, &[])
        })
        .unwrap_err();
        assert_eq!(err.to_string(), "Hook exited with non-zero status of 4.");
        assert_eq!(commands.calls().len(), 1);
    }

    #[test]
    fn test_last_error_marker_wins() {
        let commands = ScriptedCommands::new();
        commands.reply(
            &shell_command("check").join(" "),
            Reply::fail(1, ["[ERROR] first", "noise", "[ERROR] Licence expired"]),
        );
        let err = run_line(&commands, "check", &[]).unwrap_err();
        assert_eq!(err.to_string(), "Licence expired");
    }

    #[test]
    fn test_marker_ignored_on_success() {
        let commands = ScriptedCommands::new();
        commands.reply(&shell_command("warn").join(" "), Reply::ok(["[ERROR] not fatal"]));
        assert!(run_line(&commands, "warn", &[]).is_ok());
    }
}
