//! l2radar: passive L2 neighbour discovery with eBPF.
//!
//! A TC ingress classifier records which MACs announce which IPv4/IPv6
//! addresses via ARP and NDP. This crate is the userspace half: it loads
//! and attaches the classifier per interface, pins each neighbour table and
//! turns the pinned tables into text dumps or JSON exports.
//!
//! # Architecture
//!
//! ```text
//! NIC ingress --> TC eBPF (l2radar) --> NEIGHBOURS map
//!                                           |
//!                                           +--> pinned at <pin-path>/neigh-<iface>
//!                                                   |
//!                                                   +--> dump (table / JSON)
//!                                                   +--> export (neigh-<iface>.json)
//! ```

pub mod config;
pub mod dump;
pub mod ebpf_loader;
pub mod export;
pub mod iface;
pub mod runner;

#[cfg(any(test, feature = "test-util"))]
pub mod test_util;

// Re-export commonly used types
pub use config::RunConfig;
pub use dump::{ClockOffset, MacAddr, Neighbour};
pub use ebpf_loader::{Probe, ProbeSet};
pub use export::InterfaceDocument;
