//! Reading pinned neighbour tables.
//!
//! The kernel stamps entries with CLOCK_BOOTTIME nanoseconds. Each read
//! takes one [`ClockOffset`] sample and uses it for every entry so that
//! all timestamps of one snapshot are mutually consistent.

use aya::maps::{HashMap, Map, MapData, MapError};
use chrono::{DateTime, Utc};
use l2radar_common::{MacKey, NeighbourEntry};
use nix::time::{ClockId, clock_gettime};
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::path::{Path, PathBuf};
use tabled::{Table, Tabled};
use thiserror::Error;

const TABLE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Table reader errors.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("Failed to open pinned map {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: MapError,
    },

    #[error("Pinned map {0} is not a hash map")]
    UnexpectedMapType(PathBuf),

    #[error("Failed to iterate map: {0}")]
    Iterate(#[from] MapError),

    #[error("Failed to read clock: {0}")]
    Clock(#[from] nix::Error),
}

pub type Result<T> = std::result::Result<T, ReadError>;

/// Hardware address, rendered as `aa:bb:cc:dd:ee:ff`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MacAddr(pub [u8; 6]);

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            m[0], m[1], m[2], m[3], m[4], m[5]
        )
    }
}

/// One decoded table entry with wall-clock timestamps.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Neighbour {
    pub mac: MacAddr,
    pub ipv4: Vec<Ipv4Addr>,
    pub ipv6: Vec<Ipv6Addr>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// `wall - boot` in nanoseconds.
///
/// Built from CLOCK_BOOTTIME, which keeps counting through suspend and is
/// what `bpf_ktime_get_boot_ns` reads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClockOffset {
    offset_ns: i128,
}

impl ClockOffset {
    /// Sample both clocks now.
    pub fn now() -> Result<Self> {
        let wall = clock_gettime(ClockId::CLOCK_REALTIME)?;
        let boot = clock_gettime(ClockId::CLOCK_BOOTTIME)?;
        Ok(Self::from_readings(timespec_ns(&wall), timespec_ns(&boot)))
    }

    /// Offset from explicit readings of the two clocks.
    pub fn from_readings(wall_ns: i128, boot_ns: i128) -> Self {
        Self {
            offset_ns: wall_ns - boot_ns,
        }
    }

    /// Wall-clock time for a boot-relative timestamp.
    pub fn to_wall(&self, boot_ns: u64) -> DateTime<Utc> {
        let wall_ns = self.offset_ns + boot_ns as i128;
        let clamped = wall_ns.clamp(i64::MIN as i128, i64::MAX as i128) as i64;
        DateTime::from_timestamp_nanos(clamped)
    }
}

fn timespec_ns(ts: &nix::sys::time::TimeSpec) -> i128 {
    ts.tv_sec() as i128 * 1_000_000_000 + ts.tv_nsec() as i128
}

/// Decode one raw entry.
pub fn neighbour_from_entry(key: &MacKey, entry: &NeighbourEntry, clock: &ClockOffset) -> Neighbour {
    Neighbour {
        mac: MacAddr(key.addr),
        ipv4: unique(entry.ipv4_addrs()).map(Ipv4Addr::from).collect(),
        ipv6: unique(entry.ipv6_addrs()).map(Ipv6Addr::from).collect(),
        first_seen: clock.to_wall(entry.first_seen),
        last_seen: clock.to_wall(entry.last_seen),
    }
}

// Two CPUs appending the same address at once can both miss it in the
// duplicate scan, so the slots themselves may repeat a value.
fn unique<const N: usize>(slots: &[[u8; N]]) -> impl Iterator<Item = [u8; N]> + '_ {
    slots
        .iter()
        .enumerate()
        .filter(|(i, addr)| !slots[..*i].contains(*addr))
        .map(|(_, addr)| *addr)
}

/// Raw snapshot of the pinned map at `pin_path`.
///
/// The classifier keeps writing while this iterates, so the result is a
/// best-effort view rather than a point-in-time copy.
pub fn read_entries(pin_path: &Path) -> Result<Vec<(MacKey, NeighbourEntry)>> {
    let data = MapData::from_pin(pin_path).map_err(|source| ReadError::Open {
        path: pin_path.to_path_buf(),
        source,
    })?;
    let map: HashMap<MapData, MacKey, NeighbourEntry> = HashMap::try_from(Map::HashMap(data))
        .map_err(|_| ReadError::UnexpectedMapType(pin_path.to_path_buf()))?;

    let mut entries = Vec::new();
    for item in map.iter() {
        entries.push(item?);
    }
    Ok(entries)
}

/// Read and decode every neighbour at `pin_path`.
pub fn read_table(pin_path: &Path) -> Result<Vec<Neighbour>> {
    let entries = read_entries(pin_path)?;
    let clock = ClockOffset::now()?;
    Ok(entries
        .iter()
        .map(|(key, entry)| neighbour_from_entry(key, entry, &clock))
        .collect())
}

/// Most recently seen first. Stable: ties keep their input order.
pub fn sort_by_last_seen_descending(neighbours: &mut [Neighbour]) {
    neighbours.sort_by(|a, b| b.last_seen.cmp(&a.last_seen));
}

#[derive(Tabled)]
struct NeighbourRow {
    #[tabled(rename = "MAC")]
    mac: String,
    #[tabled(rename = "IPv4")]
    ipv4: String,
    #[tabled(rename = "IPv6")]
    ipv6: String,
    #[tabled(rename = "FIRST SEEN")]
    first_seen: String,
    #[tabled(rename = "LAST SEEN")]
    last_seen: String,
}

fn join_or_dash<T: ToString>(items: &[T]) -> String {
    if items.is_empty() {
        "-".to_string()
    } else {
        items.iter().map(|i| i.to_string()).collect::<Vec<_>>().join(", ")
    }
}

/// Render neighbours as a text table, in the given order.
pub fn format_table(neighbours: &[Neighbour]) -> String {
    let rows: Vec<NeighbourRow> = neighbours
        .iter()
        .map(|n| NeighbourRow {
            mac: n.mac.to_string(),
            ipv4: join_or_dash(&n.ipv4),
            ipv6: join_or_dash(&n.ipv6),
            first_seen: n.first_seen.format(TABLE_TIME_FORMAT).to_string(),
            last_seen: n.last_seen.format(TABLE_TIME_FORMAT).to_string(),
        })
        .collect();
    Table::new(rows).to_string()
}
