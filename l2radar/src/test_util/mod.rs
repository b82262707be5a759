//! Test utilities for l2radar.
//!
//! Provides frame builders, an in-memory neighbour table that stands in for
//! the kernel map, and small fixtures for dump and export tests.

pub mod packets;

pub use packets::*;

use crate::dump::{MacAddr, Neighbour};
use chrono::{DateTime, Utc};
use l2radar_common::{MacKey, NeighbourEntry, NeighbourTable};
use std::collections::BTreeMap;
use std::net::{Ipv4Addr, Ipv6Addr};

/// Neighbour table backed by a `BTreeMap`, optionally bounded like the
/// kernel map.
#[derive(Debug, Default)]
pub struct MemoryTable {
    entries: BTreeMap<MacKey, NeighbourEntry>,
    capacity: Option<usize>,
}

impl MemoryTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table that refuses new keys once `capacity` entries exist.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            capacity: Some(capacity),
        }
    }

    pub fn get(&self, mac: [u8; 6]) -> Option<&NeighbourEntry> {
        self.entries.get(&MacKey::new(mac))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn macs(&self) -> Vec<[u8; 6]> {
        self.entries.keys().map(|k| k.addr).collect()
    }

    /// Feed a frame through the classifier.
    pub fn classify(&mut self, frame: &[u8], now: u64) -> i32 {
        l2radar_common::classify(frame, self, now)
    }
}

impl NeighbourTable for MemoryTable {
    fn entry(&mut self, mac: &MacKey, now: u64) -> Option<&mut NeighbourEntry> {
        if !self.entries.contains_key(mac) && self.capacity.is_some_and(|cap| self.entries.len() >= cap)
        {
            return None;
        }
        Some(
            self.entries
                .entry(*mac)
                .or_insert_with(|| NeighbourEntry::new(now)),
        )
    }
}

/// Parse MAC address string to bytes
pub fn parse_mac(s: &str) -> [u8; 6] {
    let parts: Vec<u8> = s
        .split(':')
        .map(|p| u8::from_str_radix(p, 16).unwrap())
        .collect();
    assert_eq!(parts.len(), 6, "MAC must have six octets: {s}");
    [parts[0], parts[1], parts[2], parts[3], parts[4], parts[5]]
}

/// Format MAC address bytes to string
pub fn format_mac(mac: &[u8; 6]) -> String {
    MacAddr(*mac).to_string()
}

/// Decoded neighbour fixture.
pub fn neighbour(
    mac: &str,
    ipv4: &[&str],
    ipv6: &[&str],
    first_seen: DateTime<Utc>,
    last_seen: DateTime<Utc>,
) -> Neighbour {
    Neighbour {
        mac: MacAddr(parse_mac(mac)),
        ipv4: ipv4.iter().map(|s| s.parse::<Ipv4Addr>().unwrap()).collect(),
        ipv6: ipv6.iter().map(|s| s.parse::<Ipv6Addr>().unwrap()).collect(),
        first_seen,
        last_seen,
    }
}
