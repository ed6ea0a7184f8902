//! Wirelift CLI
//!
//! A command-line front end for bringing tunnel adapters up and down.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use wirelift_engine::{keys, wgconf, AdapterService, StartRequest, SystemConfig, VpnConfiguration};

/// Directories searched for `<IFACE>.conf`
const SEARCH_DIRS: &[&str] = &["/etc/wirelift", "/etc/wireguard"];

/// Wirelift - tunnel adapter lifecycle manager
#[derive(Parser)]
#[command(name = "wirelift")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the system configuration file
    #[arg(short, long, default_value = "/etc/wirelift/wirelift.toml")]
    config: PathBuf,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bring a tunnel up from a configuration file or interface name
    Up {
        /// Path to a tunnel configuration, or the name of one in /etc/wirelift
        target: String,

        /// Native interface to use instead of allocating one
        #[arg(long)]
        native_iface: Option<String>,

        /// Seconds to wait for the first handshake, 0 to skip
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Take a tunnel down
    Down {
        /// Path to a tunnel configuration, or the name of one in /etc/wirelift
        target: String,
    },

    /// Show live tunnel interfaces
    Show {
        /// Only show this interface
        iface: Option<String>,
    },

    /// Print a configuration in the form the tunnel tool accepts
    Strip {
        /// Path to a tunnel configuration
        config: PathBuf,
    },

    /// Show DNS settings per interface
    Dns,

    /// Generate a private key
    Genkey,

    /// Read a private key from stdin and print its public key
    Pubkey,

    /// Generate a sample system configuration file
    GenConfig {
        /// Output path for the configuration file
        #[arg(short, long, default_value = "wirelift.toml")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level);

    match cli.command {
        Commands::Up {
            target,
            native_iface,
            timeout,
        } => up(&cli.config, &target, native_iface, timeout),
        Commands::Down { target } => down(&cli.config, &target),
        Commands::Show { iface } => show(&cli.config, iface.as_deref()),
        Commands::Strip { config } => strip(&config),
        Commands::Dns => dns(&cli.config),
        Commands::Genkey => {
            println!("{}", keys::generate_private_key());
            Ok(())
        }
        Commands::Pubkey => pubkey(),
        Commands::GenConfig { output } => generate_config(output),
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_system_config(path: &Path) -> Result<SystemConfig> {
    SystemConfig::load_or_default(path)
        .with_context(|| format!("Failed to load configuration from {:?}", path))
}

fn service(path: &Path, timeout: Option<u64>) -> Result<AdapterService> {
    let mut config = load_system_config(path)?;
    if let Some(timeout) = timeout {
        config.connect_timeout = timeout;
    }
    AdapterService::from_config(config).context("Failed to initialize the adapter service")
}

/// Find a tunnel configuration by path or by interface name
///
/// Returns the file and the interface name it implies.
fn locate(target: &str) -> Result<(PathBuf, String)> {
    let direct = PathBuf::from(target);
    let candidates = if direct.is_file() {
        vec![direct]
    } else {
        SEARCH_DIRS
            .iter()
            .map(|dir| Path::new(dir).join(format!("{}.conf", target)))
            .collect()
    };

    for path in candidates {
        if path.is_file() {
            let name = path
                .file_stem()
                .and_then(|s| s.to_str())
                .map(str::to_string)
                .with_context(|| format!("Cannot derive an interface name from {:?}", path))?;
            return Ok((path, name));
        }
    }
    bail!("No configuration found for `{}`", target)
}

fn load_tunnel(target: &str) -> Result<(VpnConfiguration, String)> {
    let (path, name) = locate(target)?;
    let configuration =
        wgconf::load(&path).with_context(|| format!("Failed to load tunnel configuration from {:?}", path))?;
    info!("Tunnel configuration loaded from {:?}", path);
    Ok((configuration, name))
}

fn up(config: &Path, target: &str, native_iface: Option<String>, timeout: Option<u64>) -> Result<()> {
    let (configuration, name) = load_tunnel(target)?;
    let service = service(config, timeout)?;

    let mut builder = StartRequest::builder(configuration).interface_name(name).sole_peer();
    if let Some(native) = native_iface {
        builder = builder.native_interface_name(native);
    }
    let request = builder.build()?;

    let adapter = service.start(&request)?;
    println!("{} is up", adapter.address().display_name());
    Ok(())
}

fn down(config: &Path, target: &str) -> Result<()> {
    let (configuration, name) = load_tunnel(target)?;
    let service = service(config, None)?;

    let adapter = match service.adapter_for(&configuration, Some(&name))? {
        Some(adapter) => adapter.with_configuration(configuration),
        None => bail!("`{}` is not up", name),
    };
    let display = adapter.address().display_name();
    service.stop(adapter)?;
    println!("{} is down", display);
    Ok(())
}

fn show(config: &Path, iface: Option<&str>) -> Result<()> {
    let service = service(config, None)?;
    let alive_within = Duration::from_secs(service.config().handshake_timeout);

    let adapters = service.adapters()?;
    let adapters: Vec<_> = adapters
        .into_iter()
        .filter(|a| iface.map_or(true, |name| a.name() == name || a.native_name() == name))
        .collect();
    if adapters.is_empty() {
        match iface {
            Some(name) => bail!("`{}` is not up", name),
            None => {
                println!("No tunnel interfaces are up");
                return Ok(());
            }
        }
    }

    for adapter in adapters {
        let information = service.information(&adapter)?;
        println!("interface: {}", adapter.address().display_name());
        println!("  public key: {}", information.public_key);
        if let Some(port) = information.listen_port {
            println!("  listening port: {}", port);
        }
        if adapter.address().is_default_gateway {
            println!("  default gateway: yes");
        }
        for peer in &information.peers {
            println!();
            println!("  peer: {}", peer.public_key);
            if let Some(endpoint) = peer.endpoint {
                println!("    endpoint: {}", endpoint);
            }
            if !peer.allowed_ips.is_empty() {
                println!("    allowed ips: {}", peer.allowed_ips.join(", "));
            }
            println!("    latest handshake: {}", describe_handshake(peer.last_handshake, alive_within));
            println!("    transfer: {} received, {} sent", peer.rx, peer.tx);
        }
        println!();
    }
    Ok(())
}

fn describe_handshake(at: Option<SystemTime>, alive_within: Duration) -> String {
    let at = match at {
        Some(at) => at,
        None => return "never".to_string(),
    };
    let ago = SystemTime::now().duration_since(at).unwrap_or_default();
    let state = if ago <= alive_within { "alive" } else { "stale" };
    format!("{} seconds ago ({})", ago.as_secs(), state)
}

fn strip(config: &Path) -> Result<()> {
    let configuration =
        wgconf::load(config).with_context(|| format!("Failed to load tunnel configuration from {:?}", config))?;
    print!("{}", wgconf::to_setconf_string(&configuration));
    Ok(())
}

fn dns(config: &Path) -> Result<()> {
    let service = service(config, None)?;
    let provider = match service.dns() {
        Some(provider) => provider,
        None => {
            println!("No DNS integration is active");
            return Ok(());
        }
    };

    println!("DNS integration: {}", provider.name());
    for entry in provider.entries()? {
        println!("{}", entry.iface);
        let servers = entry.servers();
        if !servers.is_empty() {
            println!("  servers: {}", servers.join(", "));
        }
        if !entry.domains.is_empty() {
            println!("  domains: {}", entry.domains.join(", "));
        }
    }
    Ok(())
}

fn pubkey() -> Result<()> {
    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .context("Failed to read the private key from stdin")?;
    println!("{}", keys::public_key(input.trim())?);
    Ok(())
}

fn generate_config(output: PathBuf) -> Result<()> {
    let sample = SystemConfig::sample();

    std::fs::write(&output, sample)
        .with_context(|| format!("Failed to write configuration to {:?}", output))?;

    info!("Generated sample configuration at {:?}", output);
    println!("Sample configuration written to {:?}", output);
    println!("\nCopy it to /etc/wirelift/wirelift.toml to use it system wide.");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_up_arguments() {
        let cli = Cli::parse_from(["wirelift", "up", "office", "--native-iface", "wg3", "--timeout", "0"]);
        match cli.command {
            Commands::Up {
                target,
                native_iface,
                timeout,
            } => {
                assert_eq!(target, "office");
                assert_eq!(native_iface.as_deref(), Some("wg3"));
                assert_eq!(timeout, Some(0));
            }
            _ => panic!("expected up"),
        }
    }

    #[test]
    fn test_locate_by_path_uses_file_stem() {
        let dir = std::env::temp_dir().join(format!("wirelift-cli-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("office.conf");
        std::fs::write(&path, "[Interface]\n").unwrap();

        let (found, name) = locate(path.to_str().unwrap()).unwrap();
        assert_eq!(found, path);
        assert_eq!(name, "office");

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_locate_unknown_name() {
        assert!(locate("no-such-tunnel-anywhere").is_err());
    }

    #[test]
    fn test_describe_handshake() {
        let window = Duration::from_secs(180);
        assert_eq!(describe_handshake(None, window), "never");
        assert!(describe_handshake(Some(SystemTime::now()), window).ends_with("(alive)"));
        let old = SystemTime::now() - Duration::from_secs(600);
        assert!(describe_handshake(Some(old), window).ends_with("(stale)"));
    }
}
