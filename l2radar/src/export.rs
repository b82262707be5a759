//! Per-interface JSON export.
//!
//! Files are written atomically: the document goes to a temp file in the
//! output directory, is made world-readable, then renamed over
//! `neigh-<iface>.json`. Readers see either the old or the new file.

use crate::dump::{self, Neighbour, ReadError};
use crate::iface::{self, InterfaceError, InterfaceInfo, InterfaceStats};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, Permissions};
use std::io::{self, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, error, warn};

const EXPORT_FILE_MODE: u32 = 0o644;

/// Export errors.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Failed to read neighbour table: {0}")]
    Read(#[from] ReadError),

    #[error("Failed to look up interface: {0}")]
    Interface(#[from] InterfaceError),

    #[error("Failed to serialize export: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub type Result<T> = std::result::Result<T, ExportError>;

/// One neighbour as exported.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeighbourRecord {
    pub mac: String,
    pub ipv4: Vec<String>,
    pub ipv6: Vec<String>,
    pub first_seen: String,
    pub last_seen: String,
}

impl From<&Neighbour> for NeighbourRecord {
    fn from(n: &Neighbour) -> Self {
        Self {
            mac: n.mac.to_string(),
            ipv4: n.ipv4.iter().map(|ip| ip.to_string()).collect(),
            ipv6: n.ipv6.iter().map(|ip| ip.to_string()).collect(),
            first_seen: rfc3339(&n.first_seen),
            last_seen: rfc3339(&n.last_seen),
        }
    }
}

/// Document written to `neigh-<iface>.json`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceDocument {
    pub interface: String,
    pub timestamp: String,
    pub export_interval: String,
    /// Empty when the interface MAC could not be read
    pub mac: String,
    pub ipv4: Vec<String>,
    pub ipv6: Vec<String>,
    pub stats: Option<InterfaceStats>,
    pub neighbours: Vec<NeighbourRecord>,
}

impl InterfaceDocument {
    pub fn new(
        interface: &str,
        timestamp: DateTime<Utc>,
        interval: Duration,
        neighbours: &[Neighbour],
        info: Option<&InterfaceInfo>,
        stats: Option<InterfaceStats>,
    ) -> Self {
        let mut doc = Self {
            interface: interface.to_string(),
            timestamp: rfc3339(&timestamp),
            export_interval: format_interval(interval),
            mac: String::new(),
            ipv4: Vec::new(),
            ipv6: Vec::new(),
            stats,
            neighbours: neighbours.iter().map(NeighbourRecord::from).collect(),
        };

        if let Some(info) = info {
            doc.mac = info.mac.map(|m| m.to_string()).unwrap_or_default();
            doc.ipv4 = info.ipv4.iter().map(|ip| ip.to_string()).collect();
            doc.ipv6 = info.ipv6.iter().map(|ip| ip.to_string()).collect();
        }

        doc
    }

    /// Pretty JSON with a trailing newline.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        let mut buf = serde_json::to_vec_pretty(self)?;
        buf.push(b'\n');
        Ok(buf)
    }
}

fn rfc3339(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Short duration form: `5s`, `1m30s`, `1h0m0s`, `500ms`, `0s`.
pub fn format_interval(d: Duration) -> String {
    if d.is_zero() {
        return "0s".to_string();
    }
    if d < Duration::from_secs(1) {
        let nanos = d.subsec_nanos();
        return if nanos % 1_000_000 == 0 {
            format!("{}ms", nanos / 1_000_000)
        } else if nanos % 1_000 == 0 {
            format!("{}µs", nanos / 1_000)
        } else {
            format!("{nanos}ns")
        };
    }

    let total = d.as_secs();
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    let secs = match d.subsec_nanos() {
        0 => seconds.to_string(),
        nanos => {
            let frac = format!("{nanos:09}");
            format!("{seconds}.{}", frac.trim_end_matches('0'))
        }
    };

    if hours > 0 {
        format!("{hours}h{minutes}m{secs}s")
    } else if minutes > 0 {
        format!("{minutes}m{secs}s")
    } else {
        format!("{secs}s")
    }
}

/// File name of the export for `interface`.
pub fn output_file_name(interface: &str) -> String {
    format!("neigh-{interface}.json")
}

/// Atomically write `doc` into `output_dir`. Returns the final path.
pub fn write_json(doc: &InterfaceDocument, output_dir: &Path) -> Result<PathBuf> {
    let payload = doc.to_json()?;
    let out_path = output_dir.join(output_file_name(&doc.interface));
    let write_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source: io::Error| ExportError::Write { path, source }
    };

    let mut tmp = tempfile::Builder::new()
        .prefix(".neigh-")
        .suffix(".tmp")
        .tempfile_in(output_dir)
        .map_err(write_err(output_dir))?;

    tmp.write_all(&payload).map_err(write_err(tmp.path()))?;
    tmp.as_file().sync_all().map_err(write_err(tmp.path()))?;
    fs::set_permissions(tmp.path(), Permissions::from_mode(EXPORT_FILE_MODE))
        .map_err(write_err(tmp.path()))?;

    persist(tmp, &out_path)?;
    Ok(out_path)
}

// On failure the temp file is dropped, which removes it.
fn persist(tmp: NamedTempFile, out_path: &Path) -> Result<()> {
    tmp.persist(out_path).map_err(|e| ExportError::Write {
        path: out_path.to_path_buf(),
        source: e.error,
    })?;
    Ok(())
}

/// Read one interface's table and write its export.
pub fn export_interface(
    interface: &str,
    pin_path: &Path,
    output_dir: &Path,
    interval: Duration,
) -> Result<PathBuf> {
    let mut neighbours = dump::read_table(pin_path)?;
    dump::sort_by_last_seen_descending(&mut neighbours);
    export_neighbours(interface, &neighbours, output_dir, interval)
}

/// Write the export for already decoded `neighbours`. Metadata lookups that
/// fail leave the corresponding fields empty.
pub fn export_neighbours(
    interface: &str,
    neighbours: &[Neighbour],
    output_dir: &Path,
    interval: Duration,
) -> Result<PathBuf> {
    let info = match iface::lookup_interface_info(interface) {
        Ok(info) => Some(info),
        Err(e) => {
            warn!(interface, error = %e, "Interface address lookup failed");
            None
        }
    };
    let stats = match iface::lookup_interface_stats(interface) {
        Ok(stats) => Some(stats),
        Err(e) => {
            warn!(interface, error = %e, "Interface counter lookup failed");
            None
        }
    };

    let doc = InterfaceDocument::new(
        interface,
        Utc::now(),
        interval,
        neighbours,
        info.as_ref(),
        stats,
    );
    let path = write_json(&doc, output_dir)?;
    debug!(
        interface,
        neighbours = neighbours.len(),
        path = %path.display(),
        "Exported neighbour table"
    );
    Ok(path)
}

/// Document for an interactive dump. Unlike the periodic export, missing
/// interface metadata is an error here, and the interval is always zero.
pub fn dump_document(interface: &str, neighbours: &[Neighbour]) -> Result<InterfaceDocument> {
    let info = iface::lookup_interface_info(interface)?;
    let stats = iface::lookup_interface_stats(interface)?;
    Ok(InterfaceDocument::new(
        interface,
        Utc::now(),
        Duration::ZERO,
        neighbours,
        Some(&info),
        Some(stats),
    ))
}

/// Export every `(interface, pin_path)` pair in order. A failure is logged
/// and does not stop the remaining exports. Returns the number that failed.
pub fn export_all<'a, I>(targets: I, output_dir: &Path, interval: Duration) -> usize
where
    I: IntoIterator<Item = (&'a str, &'a Path)>,
{
    let mut failed = 0;
    for (interface, pin_path) in targets {
        if let Err(e) = export_interface(interface, pin_path, output_dir, interval) {
            error!(interface, error = %e, "Export failed");
            failed += 1;
        }
    }
    failed
}
