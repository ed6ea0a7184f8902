//! systemd-resolved integration through `resolvectl`

use std::collections::BTreeMap;
use std::sync::Arc;

use super::{DnsEntry, DnsProvider};
use crate::command::CommandChannel;
use crate::error::{Error, Result};
use crate::platform::Platform;

/// Per-link DNS through systemd-resolved
pub struct ResolvectlProvider {
    commands: Arc<dyn CommandChannel>,
}

impl ResolvectlProvider {
    pub const NAME: &'static str = "resolvectl";

    pub fn new(commands: Arc<dyn CommandChannel>) -> Self {
        Self { commands }
    }

    /// Whether `resolvectl` is installed and answering
    pub fn available(commands: &dyn CommandChannel) -> bool {
        matches!(commands.result(&["resolvectl", "--version"]), Ok(0))
    }
}

/// Parse `Link N (iface): value value` lines into per-interface values
fn parse_links(lines: &[String]) -> BTreeMap<String, Vec<String>> {
    let mut links = BTreeMap::new();
    for line in lines {
        let Some(rest) = line.trim().strip_prefix("Link ") else {
            continue;
        };
        let (Some(open), Some(close)) = (rest.find('('), rest.find("):")) else {
            continue;
        };
        if close < open {
            continue;
        }
        let iface = rest[open + 1..close].to_string();
        let values = rest[close + 2..]
            .split_whitespace()
            .map(|v| v.split('#').next().unwrap_or(v).to_string())
            .filter(|v| !v.is_empty())
            .collect();
        links.insert(iface, values);
    }
    links
}

impl DnsProvider for ResolvectlProvider {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn init(&self, platform: &dyn Platform) -> Result<()> {
        if !Self::available(self.commands.as_ref()) {
            return Err(Error::Dns("resolvectl is not available".into()));
        }
        log::debug!("Using resolvectl for DNS on {}", platform.name());
        Ok(())
    }

    fn entries(&self) -> Result<Vec<DnsEntry>> {
        let servers = parse_links(&self.commands.output(&["resolvectl", "dns"])?);
        let domains = parse_links(&self.commands.output(&["resolvectl", "domain"])?);

        let mut entries: BTreeMap<String, DnsEntry> = BTreeMap::new();
        for (iface, values) in servers.into_iter().chain(domains) {
            let entry = entries
                .entry(iface.clone())
                .or_insert_with(|| DnsEntry::new(iface));
            for value in values {
                entry.add(&value);
            }
        }
        Ok(entries.into_values().filter(|e| !e.is_empty()).collect())
    }

    fn set(&self, entry: &DnsEntry) -> Result<()> {
        log::info!(
            "Setting DNS for {} to {:?} (domains {:?})",
            entry.iface,
            entry.servers(),
            entry.domains
        );
        let privileged = self.commands.privileged();

        let servers = entry.servers();
        let mut args = vec!["resolvectl", "dns", entry.iface.as_str()];
        args.extend(servers.iter().map(String::as_str));
        privileged
            .run(&args)
            .map_err(|e| Error::Dns(format!("failed to set servers on {}: {}", entry.iface, e)))?;

        if !entry.domains.is_empty() {
            let mut args = vec!["resolvectl", "domain", entry.iface.as_str()];
            args.extend(entry.domains.iter().map(String::as_str));
            privileged.run(&args).map_err(|e| {
                Error::Dns(format!("failed to set domains on {}: {}", entry.iface, e))
            })?;
        }
        Ok(())
    }

    fn unset(&self, entry: &DnsEntry) -> Result<()> {
        self.unset_interface(&entry.iface)
    }

    fn unset_interface(&self, iface: &str) -> Result<()> {
        log::info!("Reverting DNS for {}", iface);
        self.commands
            .privileged()
            .run(&["resolvectl", "revert", iface])
            .map_err(|e| Error::Dns(format!("failed to revert {}: {}", iface, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::mock::{Reply, ScriptedCommands};

    fn provider() -> (Arc<ScriptedCommands>, ResolvectlProvider) {
        let scripted = Arc::new(ScriptedCommands::new());
        let commands: Arc<dyn CommandChannel> = scripted.clone();
        (scripted, ResolvectlProvider::new(commands))
    }

    #[test]
    fn test_entries() {
        let (scripted, provider) = provider();
        scripted.reply(
            "resolvectl dns",
            Reply::ok([
                "Global: 1.1.1.1",
                "Link 2 (eth0): 192.168.1.1",
                "Link 5 (wg0): 10.0.0.1 fd00::53#dns.corp",
            ]),
        );
        scripted.reply(
            "resolvectl domain",
            Reply::ok(["Global:", "Link 2 (eth0):", "Link 5 (wg0): corp.example"]),
        );

        let entries = provider.entries().unwrap();
        assert_eq!(entries.len(), 2);
        let wg = provider.entry("wg0").unwrap().unwrap();
        assert_eq!(wg.ipv4_servers, vec!["10.0.0.1"]);
        assert_eq!(wg.ipv6_servers, vec!["fd00::53"]);
        assert_eq!(wg.domains, vec!["corp.example"]);
        assert!(provider.entry("wg9").unwrap().is_none());
    }

    #[test]
    fn test_set_and_unset() {
        let (scripted, provider) = provider();
        let mut entry = DnsEntry::new("wg0");
        entry.add("10.0.0.1");
        entry.add("corp.example");

        provider.set(&entry).unwrap();
        provider.unset(&entry).unwrap();

        assert_eq!(
            scripted.lines(),
            vec![
                "resolvectl dns wg0 10.0.0.1",
                "resolvectl domain wg0 corp.example",
                "resolvectl revert wg0",
            ]
        );
    }

    #[test]
    fn test_set_failure_is_dns_error() {
        let (scripted, provider) = provider();
        scripted.reply("resolvectl dns", Reply::fail(1, ["Failed to set DNS"]));
        let err = provider.set(&DnsEntry::new("wg0")).unwrap_err();
        assert!(matches!(err, Error::Dns(_)));
    }
}
