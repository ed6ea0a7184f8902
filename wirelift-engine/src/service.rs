//! Adapter lifecycle orchestrator
//!
//! [`AdapterService`] owns the start and stop state machines. Start resolves
//! names, allocates an interface slot, applies the transformed configuration
//! through the [`Platform`], confirms liveness and then layers routes, the
//! default gateway, DNS and hooks on top. Stop undoes those layers in reverse
//! and runs every stage even when an earlier one fails.

use std::collections::HashSet;
use std::io::Write;
use std::net::{IpAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::sync::Arc;

use wirelift_net::{Gateway, GatewaySwitch, VirtualAddress};

use crate::adapter::VpnAdapter;
use crate::config::SystemConfig;
use crate::dns::{DnsEntry, DnsProvider};
use crate::error::{Error, Result};
use crate::event::{AdapterEvent, AdapterState, EventHandler, LoggingEventHandler};
use crate::gateway::GatewayRegistry;
use crate::handshake;
use crate::hook::{self, HookKind, HostInfo};
use crate::lock::AllocationLock;
use crate::names::NameStore;
use crate::platform::{Applied, InterfaceInformation, Platform, UpdateMode};
use crate::request::StartRequest;
use crate::resolver::{self, Resolution};
use crate::transform::{self, TransformContext};
use crate::vpn::VpnConfiguration;
use crate::wgconf;

/// State transitions and step failures of one start or stop run
struct Progress<'a> {
    events: &'a dyn EventHandler,
    interface: String,
    state: AdapterState,
    first_error: Option<Error>,
}

impl<'a> Progress<'a> {
    fn new(events: &'a dyn EventHandler, interface: impl Into<String>, state: AdapterState) -> Self {
        Self {
            events,
            interface: interface.into(),
            state,
            first_error: None,
        }
    }

    fn enter(&mut self, state: AdapterState) {
        let old = self.state;
        self.state = state;
        self.events.on_event(AdapterEvent::StateChanged {
            interface: self.interface.clone(),
            old,
            new: state,
        });
    }

    fn failed(&self, err: &Error) {
        self.events.on_event(AdapterEvent::StepFailed {
            interface: self.interface.clone(),
            state: self.state,
            message: err.to_string(),
        });
    }

    /// Report a failing step and pass its result on
    fn check<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            self.failed(e);
        }
        result
    }

    /// Log and remember a failing teardown step, then carry on
    fn keep(&mut self, what: &str, result: Result<()>) {
        if let Err(e) = result {
            log::error!("Failed to {} {}: {}", what, self.interface, e);
            self.failed(&e);
            self.first_error.get_or_insert(e);
        }
    }

    fn finish(self) -> Result<()> {
        match self.first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Starts, stops and reconfigures tunnel adapters
pub struct AdapterService {
    platform: Arc<dyn Platform>,
    names: Arc<dyn NameStore>,
    dns: Option<Arc<dyn DnsProvider>>,
    config: SystemConfig,
    gateway: GatewayRegistry,
    lock_path: Option<PathBuf>,
    events: Arc<dyn EventHandler>,
    host: HostInfo,
}

impl AdapterService {
    /// Create a service over a platform and a name store
    ///
    /// The designated gateway peer is taken from `config`. No DNS provider
    /// and no allocation lock are used until set.
    pub fn new(platform: Arc<dyn Platform>, names: Arc<dyn NameStore>, config: SystemConfig) -> Self {
        let host = HostInfo::detect(&[platform.interface_prefix()]);
        Self {
            gateway: GatewayRegistry::with_peer(config.default_gateway_peer.clone()),
            platform,
            names,
            dns: None,
            config,
            lock_path: None,
            events: Arc::new(LoggingEventHandler),
            host,
        }
    }

    /// Build the service for the host OS from a system configuration
    #[cfg(target_os = "linux")]
    pub fn from_config(config: SystemConfig) -> Result<Self> {
        use crate::command::{CommandChannel, SystemCommands};
        use crate::names::FileNameStore;
        use crate::platform::LinuxPlatform;

        config.validate()?;

        let commands: Arc<dyn CommandChannel> = Arc::new(SystemCommands::new(config.elevate.clone()));
        let mut linux = LinuxPlatform::new(commands.clone());
        if let Some(prefix) = &config.interface_prefix {
            linux = linux.with_prefix(prefix.clone());
        }
        if let Some(mtu) = config.default_mtu {
            linux = linux.with_default_mtu(mtu);
        }
        let platform: Arc<dyn Platform> = Arc::new(linux);

        let names = Arc::new(FileNameStore::new(config.names_path(), platform.name()));
        let dns = crate::dns::select_provider(config.dns_integration.as_deref(), commands)?;
        if let Some(dns) = &dns {
            dns.init(platform.as_ref())?;
        }

        let lock_path = config.lock_path();
        let gateway = GatewayRegistry::persistent(config.gateway_path(), config.default_gateway_peer.clone());
        let mut service = Self::new(platform, names, config)
            .with_lock_path(lock_path)
            .with_gateway_registry(gateway);
        if let Some(dns) = dns {
            service = service.with_dns(dns);
        }
        Ok(service)
    }

    /// Build the service for the host OS from a system configuration
    #[cfg(not(target_os = "linux"))]
    pub fn from_config(_config: SystemConfig) -> Result<Self> {
        Err(Error::Unsupported(format!(
            "no platform implementation for {}",
            std::env::consts::OS
        )))
    }

    pub fn with_dns(mut self, dns: Arc<dyn DnsProvider>) -> Self {
        self.dns = Some(dns);
        self
    }

    /// Share a gateway registry with other services
    pub fn with_gateway_registry(mut self, gateway: GatewayRegistry) -> Self {
        self.gateway = gateway;
        self
    }

    /// Hold an advisory lock on this file while allocating interface slots
    pub fn with_lock_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.lock_path = Some(path.into());
        self
    }

    /// Set a custom event handler
    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.events = handler;
        self
    }

    /// Override the host facts exported to hooks
    pub fn with_host_info(mut self, host: HostInfo) -> Self {
        self.host = host;
        self
    }

    pub fn platform(&self) -> &dyn Platform {
        self.platform.as_ref()
    }

    pub fn names(&self) -> &dyn NameStore {
        self.names.as_ref()
    }

    pub fn dns(&self) -> Option<&dyn DnsProvider> {
        self.dns.as_deref()
    }

    pub fn config(&self) -> &SystemConfig {
        &self.config
    }

    pub fn gateway(&self) -> &GatewayRegistry {
        &self.gateway
    }

    fn emit(&self, event: AdapterEvent) {
        self.events.on_event(event);
    }

    // ========================================================================
    // Start
    // ========================================================================

    /// Bring an adapter up
    ///
    /// Pre-up hook, allocation and apply failures abort the start. A
    /// handshake timeout removes the interface before failing. A default
    /// gateway failure is logged and the adapter still comes up. Route, DNS
    /// and post-up failures close the adapter again without running hooks.
    pub fn start(&self, request: &StartRequest) -> Result<VpnAdapter> {
        let configuration = request.configuration();
        let requested = request
            .native_interface_name()
            .or(request.interface_name())
            .unwrap_or_default();
        let mut progress = Progress::new(self.events.as_ref(), requested, AdapterState::Idle);

        progress.enter(AdapterState::PreUp);
        let pending = VirtualAddress::new(
            request.interface_name().unwrap_or_default(),
            request.native_interface_name().unwrap_or_default(),
        );
        progress.check(self.run_hooks(HookKind::PreUp, configuration, &pending))?;

        progress.enter(AdapterState::Applying);
        let mut address = progress.check(self.allocate(request))?;
        progress.interface = address.native_name.clone();
        address.table = configuration.table();
        address.peer = request.peer().map(|p| p.public_key().to_string());

        let effective = progress.check(self.transform(configuration))?;
        let started = handshake::connection_started();
        log::info!("Starting {}", address.display_name());
        let applied = progress.check(
            self.platform
                .apply(&address, configuration, &effective)
                .map_err(Error::from_apply),
        )?;

        if applied == Applied::AwaitHandshake && self.config.connect_timeout > 0 {
            progress.enter(AdapterState::WaitingHandshake);
            let waited = handshake::wait_for_first_handshake(
                self.platform.as_ref(),
                configuration,
                &address,
                started,
                request.peer(),
                self.config.connect_timeout(),
                self.config.poll_interval(),
            );
            match progress.check(waited) {
                Ok(true) => {
                    if let Some(peer) = request.peer() {
                        self.emit(AdapterEvent::Handshake {
                            interface: address.native_name.clone(),
                            public_key: peer.public_key().to_string(),
                        });
                    }
                }
                Ok(false) => {}
                Err(e) => {
                    // the interface is gone, so is its mapping
                    if let Err(unmap) = self.names.unmap(&address.name) {
                        log::warn!("Failed to unmap {}: {}", address.name, unmap);
                    }
                    return Err(e);
                }
            }
        }

        let mut adapter = VpnAdapter::new(address, Some(configuration.clone()));

        progress.enter(AdapterState::Routing);
        if let Err(e) = self.install_routes(&mut adapter) {
            progress.failed(&e);
            self.abort(&adapter);
            return Err(e);
        }
        match self.switch_gateway(&mut adapter) {
            Ok(true) => self.emit(AdapterEvent::DefaultGateway {
                interface: adapter.native_name().to_string(),
                active: true,
            }),
            Ok(false) => {}
            Err(e) => {
                log::error!("Failed to setup routing. {}", e);
                progress.failed(&e);
            }
        }

        progress.enter(AdapterState::Dns);
        if let Err(e) = self.set_dns(&adapter, configuration) {
            progress.failed(&e);
            self.abort(&adapter);
            return Err(e);
        }

        progress.enter(AdapterState::PostUp);
        if let Err(e) = self.run_hooks(HookKind::PostUp, configuration, adapter.address()) {
            progress.failed(&e);
            self.abort(&adapter);
            return Err(e);
        }

        adapter.address_mut().is_up = true;
        progress.enter(AdapterState::Up);
        log::info!("Started {}", adapter.address().display_name());
        Ok(adapter)
    }

    /// Resolve and allocate under the allocation lock
    fn allocate(&self, request: &StartRequest) -> Result<VirtualAddress> {
        let _lock = self
            .lock_path
            .as_ref()
            .map(AllocationLock::acquire)
            .transpose()?;
        let resolution = resolver::resolve(
            self.platform.as_ref(),
            self.names.as_ref(),
            request.configuration(),
            request.interface_name(),
            request.native_interface_name(),
        )?;
        log::debug!("Resolved {:?}", resolution);
        self.find_address(&resolution, request.configuration())
    }

    /// Pick, create or reuse the interface slot for a resolution
    ///
    /// A resolved name that already exists is reused when its active key
    /// matches, or when it has no key and is down. Without a resolved name
    /// the numbered slots are scanned; finding the requested key active there
    /// is a [`Error::DuplicatePeer`] conflict. The chosen name is mapped
    /// before returning.
    pub fn find_address(&self, resolution: &Resolution, configuration: &VpnConfiguration) -> Result<VirtualAddress> {
        match &resolution.resolved_name {
            Some(native) => {
                let name = resolution.interface_name.clone().unwrap_or_else(|| native.clone());
                self.claim_resolved(&name, native, configuration.public_key())
            }
            None => self.scan(resolution.interface_name.as_deref(), configuration.public_key()),
        }
    }

    fn claim_resolved(&self, name: &str, native_name: &str, public_key: &str) -> Result<VirtualAddress> {
        if !self.platform.exists(native_name)? {
            let address = self.platform.add(name, native_name)?;
            self.mapped(address, false)
        } else {
            let address = self.platform.address(name, native_name)?;
            match self.platform.public_key(native_name)? {
                // An explicit name with the same key reattaches, unlike the scan
                Some(active) if active == public_key => {}
                Some(_) => return Err(Error::InUse(native_name.to_string())),
                None if address.is_up => return Err(Error::InUse(native_name.to_string())),
                None => {}
            }
            self.mapped(address, true)
        }
    }

    fn scan(&self, name: Option<&str>, public_key: &str) -> Result<VirtualAddress> {
        let prefix = self.platform.interface_prefix();
        let existing: HashSet<String> = self.platform.interfaces()?.into_iter().collect();
        let mut candidate = None;
        let mut free = None;

        for index in 0..self.config.max_interfaces {
            let native = format!("{}{}", prefix, index);
            if !existing.contains(&native) {
                if candidate.is_none() {
                    free = Some(native);
                    break;
                }
                // keep looking for the same key further up
                continue;
            }
            match self.platform.public_key(&native)? {
                Some(active) if active == public_key => {
                    return Err(Error::DuplicatePeer {
                        public_key: public_key.to_string(),
                        native_name: native,
                    });
                }
                Some(_) => {}
                None => {
                    // first reusable slot wins
                    if candidate.is_none() && self.names.is_mapped(&native)? {
                        candidate = Some(native);
                    }
                }
            }
        }

        if let Some(native) = candidate {
            let name = match name {
                Some(name) => name.to_string(),
                None => self.names.name(&native)?.unwrap_or_else(|| native.clone()),
            };
            let address = self.platform.address(&name, &native)?;
            return self.mapped(address, true);
        }

        match free {
            Some(native) => {
                let name = name.unwrap_or(native.as_str()).to_string();
                let address = self.platform.add(&name, &native)?;
                self.mapped(address, false)
            }
            None => Err(Error::Capacity(self.config.max_interfaces)),
        }
    }

    fn mapped(&self, address: VirtualAddress, reused: bool) -> Result<VirtualAddress> {
        self.names.map(&address.name, &address.native_name)?;
        self.emit(AdapterEvent::Allocated {
            name: address.name.clone(),
            native_name: address.native_name.clone(),
            reused,
        });
        Ok(address)
    }

    /// The configuration actually pushed to the tunnel
    pub fn transform(&self, configuration: &VpnConfiguration) -> Result<VpnConfiguration> {
        let locals = if self.config.ignore_local_routes {
            self.platform.local_addresses()?
        } else {
            Vec::new()
        };
        let ignore = self.config.effective_ignore_addresses();
        let gateway_peer = self.gateway.peer();
        let context = TransformContext {
            gateway_peer: gateway_peer.as_deref(),
            ignore_local_routes: self.config.ignore_local_routes,
            local_addresses: &locals,
            ignore_addresses: &ignore,
        };
        transform::transform(self.platform.as_ref(), configuration, &context)
    }

    /// Install routes for the live allowed-ips, most specific first
    fn install_routes(&self, adapter: &mut VpnAdapter) -> Result<()> {
        if !self.platform.installs_routes() || !adapter.address().table.installs_routes() {
            return Ok(());
        }
        let allowed = self.platform.allowed_ips(adapter.native_name())?;
        let routes = wirelift_net::route::install_order(&allowed);
        if !routes.is_empty() {
            log::info!("Setting routes for {}: {}", adapter.address().short_name(), routes.join(", "));
            self.platform.set_routes(adapter.address(), &routes)?;
        }
        adapter.set_allows(routes);
        Ok(())
    }

    /// Move the default route onto the adapter if it carries the gateway peer
    fn switch_gateway(&self, adapter: &mut VpnAdapter) -> Result<bool> {
        let peer_key = match self.gateway.peer() {
            Some(peer) => peer,
            None => return Ok(false),
        };
        let peer = match adapter.configuration().and_then(|c| c.peer(&peer_key)) {
            Some(peer) => peer,
            None => return Ok(false),
        };
        let endpoint = peer
            .endpoint_address()
            .ok_or_else(|| Error::Gateway(format!("gateway peer {} has no endpoint", peer_key)))?;
        let endpoint = resolve_endpoint(endpoint, peer.endpoint_port().unwrap_or(crate::DEFAULT_PORT))?;

        let previous = self
            .platform
            .default_gateway()?
            .ok_or_else(|| Error::Gateway("there is no default gateway to replace".into()))?;
        let native = adapter.native_name().to_string();
        let switch = GatewaySwitch::new(previous, Gateway::new(native.as_str(), endpoint));

        self.gateway.acquire(&native, switch.clone())?;
        if let Err(e) = self.platform.set_default_gateway(&switch) {
            if let Err(release) = self.gateway.release(&native) {
                log::error!("Failed to release default gateway claim of {}: {}", native, release);
            }
            return Err(e);
        }
        adapter.address_mut().is_default_gateway = true;
        Ok(true)
    }

    fn set_dns(&self, adapter: &VpnAdapter, configuration: &VpnConfiguration) -> Result<()> {
        if configuration.dns().is_empty() {
            return Ok(());
        }
        match &self.dns {
            Some(dns) => {
                let entry = DnsEntry::from_configuration(adapter.native_name(), configuration);
                log::info!(
                    "Setting DNS for {} using {}: {}",
                    adapter.address().short_name(),
                    dns.name(),
                    configuration.dns().join(", ")
                );
                dns.set(&entry)
            }
            None => {
                log::warn!(
                    "No DNS integration available, ignoring DNS for {}",
                    adapter.address().short_name()
                );
                Ok(())
            }
        }
    }

    /// Undo a partially started adapter, without hooks
    fn abort(&self, adapter: &VpnAdapter) {
        log::warn!("Closing {} after a failed start", adapter.address().display_name());
        match self.gateway.release(adapter.native_name()) {
            Ok(Some(switch)) => {
                if let Err(e) = self.platform.reset_default_gateway(&switch) {
                    log::error!("Failed to reset default gateway: {}", e);
                }
            }
            Ok(None) => {}
            Err(e) => log::error!("Failed to release default gateway claim: {}", e),
        }
        if let (Some(dns), Some(configuration)) = (&self.dns, adapter.configuration()) {
            if !configuration.dns().is_empty() {
                if let Err(e) = dns.unset_interface(adapter.native_name()) {
                    log::error!("Failed to unset DNS for {}: {}", adapter.native_name(), e);
                }
            }
        }
        if let Err(e) = self.platform.close(adapter.address()) {
            log::error!("Failed to close {}: {}", adapter.native_name(), e);
        }
        if let Err(e) = self.names.unmap(adapter.name()) {
            log::error!("Failed to unmap {}: {}", adapter.name(), e);
        }
    }

    fn run_hooks(&self, kind: HookKind, configuration: &VpnConfiguration, address: &VirtualAddress) -> Result<()> {
        let lines = kind.commands(configuration);
        if lines.is_empty() {
            return Ok(());
        }
        let mac = if address.native_name.is_empty() {
            None
        } else {
            self.platform.mac_address(&address.native_name)
        };
        let env = hook::environment(&self.host, configuration, address, mac.as_deref());
        hook::run_hooks(kind, lines, &mut |line: &str| self.platform.run_hook(line, &env))
    }

    // ========================================================================
    // Stop
    // ========================================================================

    /// Take an adapter down
    ///
    /// Every stage runs even when an earlier one fails. Failures are logged
    /// and reported as events, and the first one is returned at the end.
    pub fn stop(&self, adapter: VpnAdapter) -> Result<()> {
        let address = adapter.address().clone();
        let native = address.native_name.clone();
        let mut progress = Progress::new(self.events.as_ref(), native.as_str(), AdapterState::Up);
        log::info!("Stopping {}", address.display_name());

        let configuration = match adapter.configuration() {
            Some(configuration) => Some(configuration.clone()),
            None => match self.platform.configuration(&native) {
                Ok(configuration) => Some(configuration),
                Err(e) => {
                    log::warn!("Could not read the configuration of {}, skipping hooks: {}", native, e);
                    None
                }
            },
        };

        progress.enter(AdapterState::UndoRouting);
        if let Some(dns) = &self.dns {
            let result = match &configuration {
                Some(c) if !c.addresses().is_empty() => dns.unset(&DnsEntry::from_configuration(native.as_str(), c)),
                Some(_) => Ok(()),
                None => dns.unset_interface(&native),
            };
            progress.keep("unset DNS for", result);
        }

        progress.enter(AdapterState::PreDown);
        if let Some(configuration) = &configuration {
            progress.keep("run pre-down hooks for", self.run_hooks(HookKind::PreDown, configuration, &address));
        }

        progress.enter(AdapterState::Closing);
        progress.keep("close", self.platform.close(&address));
        match self.gateway.release(&native) {
            Ok(Some(switch)) => {
                log::info!("Restoring default gateway {}", switch.previous);
                let result = self.platform.reset_default_gateway(&switch);
                if result.is_ok() {
                    self.emit(AdapterEvent::DefaultGateway {
                        interface: native.clone(),
                        active: false,
                    });
                }
                progress.keep("reset default gateway for", result);
            }
            Ok(None) => {}
            Err(e) => progress.keep("release default gateway for", Err(e)),
        }
        progress.keep("finish stopping", self.platform.on_stopped(&address));
        progress.keep("unmap", self.names.unmap(&address.name).map(|_| ()));

        progress.enter(AdapterState::PostDown);
        if let Some(configuration) = &configuration {
            progress.keep("run post-down hooks for", self.run_hooks(HookKind::PostDown, configuration, &address));
        }

        progress.enter(AdapterState::Down);
        log::info!("Stopped {}", address.display_name());
        progress.finish()
    }

    // ========================================================================
    // Live updates
    // ========================================================================

    /// Replace the configuration of a live adapter; active peers may drop
    pub fn reconfigure(&self, adapter: &mut VpnAdapter, configuration: &VpnConfiguration) -> Result<()> {
        self.update(adapter, configuration, UpdateMode::Replace)
    }

    /// Apply only what differs, leaving unaffected peers alone
    pub fn sync(&self, adapter: &mut VpnAdapter, configuration: &VpnConfiguration) -> Result<()> {
        self.update(adapter, configuration, UpdateMode::Sync)
    }

    /// Add the peers of a configuration without removing existing ones
    pub fn append(&self, adapter: &mut VpnAdapter, configuration: &VpnConfiguration) -> Result<()> {
        self.update(adapter, configuration, UpdateMode::Append)
    }

    fn update(&self, adapter: &mut VpnAdapter, configuration: &VpnConfiguration, mode: UpdateMode) -> Result<()> {
        let effective = self.transform(configuration)?;

        let mut file = tempfile::Builder::new().prefix("wg").suffix(".cfg").tempfile()?;
        file.write_all(wgconf::to_setconf_string(&effective).as_bytes())?;
        file.flush()?;

        log::info!("Updating {} ({})", adapter.address().display_name(), mode);
        self.platform
            .set_configuration(adapter.native_name(), file.path(), mode)?;

        // allowed-ips may have changed underneath the installed routes
        self.install_routes(adapter)?;

        let current = match (mode, adapter.configuration()) {
            (UpdateMode::Append, Some(current)) => merge_peers(current, configuration)?,
            _ => configuration.clone(),
        };
        adapter.set_configuration(Some(current));
        Ok(())
    }

    /// Remove one peer from a live adapter
    pub fn remove(&self, adapter: &mut VpnAdapter, public_key: &str) -> Result<()> {
        log::info!("Removing peer {} from {}", public_key, adapter.address().short_name());
        self.platform.remove_peer(adapter.native_name(), public_key)?;
        if let Some(current) = adapter.configuration() {
            let peers: Vec<_> = current
                .peers()
                .iter()
                .filter(|p| p.public_key() != public_key)
                .cloned()
                .collect();
            let updated = current.to_builder().peers(peers).build()?;
            adapter.set_configuration(Some(updated));
        }
        Ok(())
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Adapters for every live tunnel interface
    pub fn adapters(&self) -> Result<Vec<VpnAdapter>> {
        self.platform
            .interfaces()?
            .iter()
            .map(|native| self.adapter(native))
            .collect()
    }

    /// Adapter for a live native interface
    pub fn adapter(&self, native_name: &str) -> Result<VpnAdapter> {
        let name = self
            .names
            .name(native_name)?
            .unwrap_or_else(|| native_name.to_string());
        let mut address = self.platform.address(&name, native_name)?;
        address.is_default_gateway = self.gateway.is_held_by(native_name)?;
        Ok(VpnAdapter::new(address, None))
    }

    /// The live adapter a configuration and optional name refer to
    pub fn adapter_for(&self, configuration: &VpnConfiguration, name: Option<&str>) -> Result<Option<VpnAdapter>> {
        let resolution = resolver::resolve(self.platform.as_ref(), self.names.as_ref(), configuration, name, None)?;
        match resolution.resolved_name {
            Some(native) if self.platform.exists(&native)? => Ok(Some(self.adapter(&native)?)),
            _ => Ok(None),
        }
    }

    /// The live adapter whose active key is `public_key`
    pub fn find_by_public_key(&self, public_key: &str) -> Result<Option<VpnAdapter>> {
        match resolver::find_by_public_key(self.platform.as_ref(), self.names.as_ref(), public_key)? {
            Some((_, native)) => Ok(Some(self.adapter(&native)?)),
            None => Ok(None),
        }
    }

    /// Interface and peer statistics
    pub fn information(&self, adapter: &VpnAdapter) -> Result<InterfaceInformation> {
        self.platform.information(adapter.address())
    }

    /// Live configuration as the tunnel reports it
    pub fn configuration(&self, adapter: &VpnAdapter) -> Result<VpnConfiguration> {
        self.platform.configuration(adapter.native_name())
    }

    // ========================================================================
    // Default gateway peer
    // ========================================================================

    /// Public key of the peer designated to carry the default route
    pub fn default_gateway_peer(&self) -> Option<String> {
        self.gateway.peer()
    }

    /// Designate the peer that should carry the default route
    ///
    /// Takes effect for adapters started afterwards.
    pub fn set_default_gateway_peer(&self, public_key: impl Into<String>) {
        self.gateway.set_peer(public_key);
    }

    /// Clear the designated peer, moving the default route back if it is held
    pub fn reset_default_gateway_peer(&self) -> Result<Option<String>> {
        let peer = self.gateway.reset_peer();
        if let Some(claim) = self.gateway.claim()? {
            if let Some(switch) = self.gateway.release(&claim.owner)? {
                log::info!("Restoring default gateway {}", switch.previous);
                self.platform.reset_default_gateway(&switch)?;
                self.emit(AdapterEvent::DefaultGateway {
                    interface: claim.owner,
                    active: false,
                });
            }
        }
        Ok(peer)
    }
}

/// Peers of `current` with those of `incoming` added or replaced
fn merge_peers(current: &VpnConfiguration, incoming: &VpnConfiguration) -> Result<VpnConfiguration> {
    let mut peers = current.peers().to_vec();
    for peer in incoming.peers() {
        match peers.iter_mut().find(|p| p.public_key() == peer.public_key()) {
            Some(existing) => *existing = peer.clone(),
            None => peers.push(peer.clone()),
        }
    }
    current.to_builder().peers(peers).build()
}

fn resolve_endpoint(host: &str, port: u16) -> Result<IpAddr> {
    let bare = host.trim_start_matches('[').trim_end_matches(']');
    if let Ok(ip) = bare.parse::<IpAddr>() {
        return Ok(ip);
    }
    (bare, port)
        .to_socket_addrs()?
        .next()
        .map(|addr| addr.ip())
        .ok_or_else(|| Error::Gateway(format!("could not resolve {}", host)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::names::MemoryNameStore;
    use crate::platform::MockPlatform;
    use crate::vpn::VpnPeer;

    const KEY: &str = "xTIBA5rboUvnH4htodjb6e697QjLERt1NAB4mZqp8Dg=";
    const OTHER: &str = "HIgo9xNzJMWLKASShiTqIybxZ0U3wGLiUeJ1PKf8ykw=";

    fn config() -> VpnConfiguration {
        VpnConfiguration::builder()
            .public_key(KEY)
            .peer(VpnPeer::builder(OTHER).build().unwrap())
            .build()
            .unwrap()
    }

    fn service(platform: Arc<MockPlatform>, max: usize) -> (AdapterService, Arc<MemoryNameStore>) {
        let names = Arc::new(MemoryNameStore::new());
        let system = SystemConfig {
            max_interfaces: max,
            ..Default::default()
        };
        let host = HostInfo {
            local_mac: "00:00:00:00:00:00".into(),
            device_name: "test".into(),
        };
        let service = AdapterService::new(platform, names.clone(), system).with_host_info(host);
        (service, names)
    }

    fn scan_request() -> Resolution {
        Resolution::default()
    }

    #[test]
    fn test_scan_takes_first_free_slot() {
        let platform = Arc::new(MockPlatform::new());
        platform.seed("wg0", Some(OTHER));
        let (service, names) = service(platform.clone(), 4);

        let address = service.find_address(&scan_request(), &config()).unwrap();
        assert_eq!(address.native_name, "wg1");
        assert_eq!(names.native_name("wg1").unwrap().as_deref(), Some("wg1"));
        assert_eq!(platform.count("add"), 1);
    }

    #[test]
    fn test_scan_reuses_mapped_keyless_slot() {
        let platform = Arc::new(MockPlatform::new());
        platform.seed("wg0", Some(OTHER));
        platform.seed("wg1", None);
        let (service, names) = service(platform.clone(), 4);
        names.map("office", "wg1").unwrap();

        let address = service.find_address(&scan_request(), &config()).unwrap();
        assert_eq!(address.native_name, "wg1");
        assert_eq!(address.name, "office");
        assert_eq!(platform.count("add"), 0);
    }

    #[test]
    fn test_scan_prefers_lowest_reusable_slot() {
        let platform = Arc::new(MockPlatform::new());
        platform.seed("wg0", Some(OTHER));
        platform.seed("wg1", None);
        platform.seed("wg2", Some(OTHER));
        platform.seed("wg3", None);
        let (service, names) = service(platform, 4);
        names.map("home", "wg1").unwrap();
        names.map("office", "wg3").unwrap();

        let address = service.find_address(&scan_request(), &config()).unwrap();
        assert_eq!(address.native_name, "wg1");
        assert_eq!(address.name, "home");
        assert_eq!(names.native_name("office").unwrap().as_deref(), Some("wg3"));
    }

    #[test]
    fn test_scan_skips_unmapped_keyless_slot() {
        let platform = Arc::new(MockPlatform::new());
        platform.seed("wg0", None);
        let (service, _) = service(platform, 4);
        let address = service.find_address(&scan_request(), &config()).unwrap();
        assert_eq!(address.native_name, "wg1");
    }

    #[test]
    fn test_scan_finds_duplicate_beyond_candidate() {
        let platform = Arc::new(MockPlatform::new());
        platform.seed("wg0", None);
        platform.seed("wg2", Some(KEY));
        let (service, names) = service(platform, 4);
        names.map("spare", "wg0").unwrap();

        let err = service.find_address(&scan_request(), &config()).unwrap_err();
        match err {
            Error::DuplicatePeer { native_name, .. } => assert_eq!(native_name, "wg2"),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_resolved_name_conflicts() {
        let platform = Arc::new(MockPlatform::new());
        platform.seed("wg5", Some(OTHER));
        let (service, _) = service(platform, 4);
        let resolution = Resolution {
            interface_name: Some("office".into()),
            native_name: Some("wg5".into()),
            resolved_name: Some("wg5".into()),
        };
        assert!(matches!(
            service.find_address(&resolution, &config()),
            Err(Error::InUse(_))
        ));
    }

    #[test]
    fn test_resolved_name_is_created() {
        let platform = Arc::new(MockPlatform::new());
        let (service, names) = service(platform.clone(), 4);
        let resolution = Resolution {
            interface_name: Some("office".into()),
            native_name: None,
            resolved_name: Some("office".into()),
        };
        let address = service.find_address(&resolution, &config()).unwrap();
        assert_eq!(address.native_name, "office");
        assert_eq!(platform.native_names(), vec!["office"]);
        assert_eq!(names.name("office").unwrap().as_deref(), Some("office"));
    }

    #[test]
    fn test_merge_peers_replaces_by_key() {
        let current = config();
        let incoming = VpnConfiguration::builder()
            .public_key(KEY)
            .peer(VpnPeer::builder(OTHER).allowed_ip("10.0.0.0/8").build().unwrap())
            .peer(VpnPeer::builder("third").build().unwrap())
            .build()
            .unwrap();
        let merged = merge_peers(&current, &incoming).unwrap();
        assert_eq!(merged.peers().len(), 2);
        assert_eq!(merged.peer(OTHER).unwrap().allowed_ips(), ["10.0.0.0/8"]);
    }

    #[test]
    fn test_resolve_endpoint_literals() {
        assert_eq!(resolve_endpoint("203.0.113.7", 51820).unwrap(), "203.0.113.7".parse::<IpAddr>().unwrap());
        assert_eq!(resolve_endpoint("[fd00::1]", 51820).unwrap(), "fd00::1".parse::<IpAddr>().unwrap());
    }
}
