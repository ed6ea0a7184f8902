//! Network identity helpers for wirelift
//!
//! This crate holds the small, platform-neutral pieces the lifecycle engine
//! builds on:
//!
//! - **Interface identity**: [`VirtualAddress`] pairs a logical name with the
//!   native OS name, plus MTU, routing table and peer association
//! - **Default gateway**: [`Gateway`] and [`GatewaySwitch`] describe the OS
//!   default route and a tunnel's claim on it
//! - **Routes**: parsing allowed-ips, ordering them for installation and
//!   testing whether they would swallow a local address
//! - **Local probes**: local interface addresses, hardware addresses and
//!   host name lookups
//!
//! # Example
//!
//! ```
//! use wirelift_net::route::install_order;
//!
//! let ordered = install_order(&["10.0.0.0/8", "10.1.0.0/16", "0.0.0.0/0"]);
//! assert_eq!(ordered, vec!["10.1.0.0/16", "10.0.0.0/8", "0.0.0.0/0"]);
//! ```

pub mod address;
pub mod error;
pub mod local;
pub mod route;

pub use address::{Gateway, GatewaySwitch, Table, VirtualAddress};
pub use error::{Error, Result};
pub use route::Route;

/// Default MTU for kernel WireGuard interfaces
pub const DEFAULT_MTU: u32 = 1420;
