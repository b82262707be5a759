//! Interface discovery, keyword expansion and metadata lookups.

use crate::dump::MacAddr;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Where the kernel lists network interfaces.
pub const SYSFS_NET: &str = "/sys/class/net";

/// Name prefixes of bridges, veths and container plumbing. Skipped by the
/// `external` keyword.
pub const VIRTUAL_PREFIXES: &[&str] = &["veth", "docker", "br-", "virbr"];

/// Interface lookup errors.
#[derive(Debug, Error)]
pub enum InterfaceError {
    #[error("Interface not found: {0}")]
    NotFound(String),

    #[error("Failed to read {path}: {source}")]
    Sysfs {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid value in {path}: {value:?}")]
    Parse { path: PathBuf, value: String },

    #[error("Failed to list interface addresses: {0}")]
    Addresses(#[from] nix::Error),
}

pub type Result<T> = std::result::Result<T, InterfaceError>;

/// An interface as seen during discovery.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiscoveredInterface {
    pub name: String,
    pub is_loopback: bool,
}

impl DiscoveredInterface {
    pub fn new(name: impl Into<String>, is_loopback: bool) -> Self {
        Self {
            name: name.into(),
            is_loopback,
        }
    }

    fn is_virtual(&self) -> bool {
        VIRTUAL_PREFIXES.iter().any(|p| self.name.starts_with(p))
    }
}

/// Expand the `any` and `external` keywords (case-insensitive) against
/// `discovered`. Other names pass through untouched. Order follows
/// `requested`; later duplicates are dropped.
pub fn resolve_interfaces(requested: &[String], discovered: &[DiscoveredInterface]) -> Vec<String> {
    let mut resolved: Vec<String> = Vec::new();
    let mut add = |name: &str| {
        if !resolved.iter().any(|n| n == name) {
            resolved.push(name.to_string());
        }
    };

    for name in requested {
        let keyword = name.to_ascii_lowercase();
        match keyword.as_str() {
            "any" | "external" => {
                let skip_virtual = keyword == "external";
                for iface in discovered {
                    if iface.is_loopback || (skip_virtual && iface.is_virtual()) {
                        continue;
                    }
                    add(&iface.name);
                }
            }
            _ => add(name),
        }
    }

    resolved
}

/// True if any requested name is an expansion keyword.
pub fn needs_discovery(requested: &[String]) -> bool {
    requested
        .iter()
        .any(|n| n.eq_ignore_ascii_case("any") || n.eq_ignore_ascii_case("external"))
}

/// Enumerate interfaces under [`SYSFS_NET`].
pub fn discover_interfaces() -> Result<Vec<DiscoveredInterface>> {
    discover_interfaces_in(Path::new(SYSFS_NET))
}

/// Enumerate interfaces under a sysfs-style directory, sorted by name.
pub fn discover_interfaces_in(root: &Path) -> Result<Vec<DiscoveredInterface>> {
    let entries = fs::read_dir(root).map_err(|source| InterfaceError::Sysfs {
        path: root.to_path_buf(),
        source,
    })?;

    let mut interfaces = Vec::new();
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        let flags = read_flags(&root.join(&name).join("flags")).unwrap_or(0);
        interfaces.push(DiscoveredInterface {
            is_loopback: flags & libc::IFF_LOOPBACK as u32 != 0,
            name,
        });
    }
    interfaces.sort_by(|a, b| a.name.cmp(&b.name));

    Ok(interfaces)
}

fn read_flags(path: &Path) -> Result<u32> {
    let raw = read_trimmed(path)?;
    u32::from_str_radix(raw.trim_start_matches("0x"), 16).map_err(|_| InterfaceError::Parse {
        path: path.to_path_buf(),
        value: raw,
    })
}

fn read_trimmed(path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .map(|s| s.trim().to_string())
        .map_err(|source| InterfaceError::Sysfs {
            path: path.to_path_buf(),
            source,
        })
}

/// Parse `aa:bb:cc:dd:ee:ff`.
pub fn parse_mac(s: &str) -> Option<[u8; 6]> {
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() != 6 {
        return None;
    }
    let mut mac = [0u8; 6];
    for (i, part) in parts.iter().enumerate() {
        if part.len() != 2 {
            return None;
        }
        mac[i] = u8::from_str_radix(part, 16).ok()?;
    }
    Some(mac)
}

/// A monitored interface's own addresses.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InterfaceInfo {
    pub mac: Option<MacAddr>,
    pub ipv4: Vec<Ipv4Addr>,
    pub ipv6: Vec<Ipv6Addr>,
}

/// Own MAC from sysfs and own addresses from getifaddrs.
pub fn lookup_interface_info(name: &str) -> Result<InterfaceInfo> {
    let address_path = Path::new(SYSFS_NET).join(name).join("address");
    if !address_path.exists() {
        return Err(InterfaceError::NotFound(name.to_string()));
    }
    let mac = parse_mac(&read_trimmed(&address_path)?).map(MacAddr);

    let mut info = InterfaceInfo {
        mac,
        ..Default::default()
    };
    for ifaddr in nix::ifaddrs::getifaddrs()? {
        if ifaddr.interface_name != name {
            continue;
        }
        let Some(address) = ifaddr.address else {
            continue;
        };
        if let Some(v4) = address.as_sockaddr_in() {
            info.ipv4.push(v4.ip());
        } else if let Some(v6) = address.as_sockaddr_in6() {
            info.ipv6.push(v6.ip());
        }
    }

    Ok(info)
}

/// Kernel TX/RX counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceStats {
    pub tx_bytes: u64,
    pub rx_bytes: u64,
    pub tx_packets: u64,
    pub rx_packets: u64,
    pub tx_errors: u64,
    pub rx_errors: u64,
    pub tx_dropped: u64,
    pub rx_dropped: u64,
}

/// Counters from `/sys/class/net/<name>/statistics`.
pub fn lookup_interface_stats(name: &str) -> Result<InterfaceStats> {
    lookup_interface_stats_in(Path::new(SYSFS_NET), name)
}

pub fn lookup_interface_stats_in(root: &Path, name: &str) -> Result<InterfaceStats> {
    let dir = root.join(name).join("statistics");
    let read = |counter: &str| -> Result<u64> {
        let path = dir.join(counter);
        let raw = read_trimmed(&path)?;
        raw.parse()
            .map_err(|_| InterfaceError::Parse { path, value: raw })
    };

    Ok(InterfaceStats {
        tx_bytes: read("tx_bytes")?,
        rx_bytes: read("rx_bytes")?,
        tx_packets: read("tx_packets")?,
        rx_packets: read("rx_packets")?,
        tx_errors: read("tx_errors")?,
        rx_errors: read("rx_errors")?,
        tx_dropped: read("tx_dropped")?,
        rx_dropped: read("rx_dropped")?,
    })
}
