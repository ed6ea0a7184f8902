//! Wirelift Engine
//!
//! This crate manages the lifecycle of WireGuard-style tunnel adapters: it
//! turns a tunnel configuration plus optional names into a live, routed,
//! DNS-integrated interface, and tears it down again.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Application Layer                        │
//! │  ┌─────────────────┐              ┌─────────────────────┐   │
//! │  │  wirelift-cli   │              │   Other front ends  │   │
//! │  └────────┬────────┘              └──────────┬──────────┘   │
//! │           └───────────────┬──────────────────┘              │
//! │                           ▼                                  │
//! │  ┌────────────────────────────────────────────────────────┐ │
//! │  │                  wirelift-engine                        │ │
//! │  │  - AdapterService (start / stop / reconfigure)         │ │
//! │  │  - Resolver, transform, handshake confirmation         │ │
//! │  │  - Platform seam (Linux, mock)                         │ │
//! │  │  - Name store, allocation lock, gateway registry       │ │
//! │  └────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────┘
//!                           │
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Library Layer                            │
//! │  ┌─────────────────────────────────────────────────────┐   │
//! │  │  wirelift-net: addresses, routes, local probes      │   │
//! │  └─────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use wirelift_engine::{wgconf, AdapterService, StartRequest, SystemConfig};
//!
//! # fn main() -> wirelift_engine::Result<()> {
//! let service = AdapterService::from_config(SystemConfig::default())?;
//! let configuration = wgconf::load("/etc/wireguard/office.conf")?;
//! let request = StartRequest::builder(configuration)
//!     .interface_name("office")
//!     .sole_peer()
//!     .build()?;
//! let adapter = service.start(&request)?;
//! service.stop(adapter)?;
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod command;
pub mod config;
pub mod dns;
pub mod error;
pub mod event;
pub mod gateway;
pub mod handshake;
pub mod hook;
pub mod keys;
pub mod lock;
pub mod names;
pub mod platform;
pub mod request;
pub mod resolver;
pub mod service;
pub mod transform;
pub mod vpn;
pub mod wgconf;

pub use adapter::VpnAdapter;
pub use command::{CommandChannel, SystemCommands};
pub use config::SystemConfig;
pub use dns::{DnsEntry, DnsProvider};
pub use error::{Error, Result};
pub use event::{AdapterEvent, AdapterState, EventHandler, LoggingEventHandler};
pub use gateway::GatewayRegistry;
pub use names::{FileNameStore, MemoryNameStore, NameStore};
pub use platform::{Applied, InterfaceInformation, PeerInformation, Platform, UpdateMode};
pub use request::{StartRequest, StartRequestBuilder};
pub use service::AdapterService;
pub use vpn::{VpnConfiguration, VpnPeer};

/// Default WireGuard listen and endpoint port
pub const DEFAULT_PORT: u16 = 51820;
