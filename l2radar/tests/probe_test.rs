//! Probe lifecycle tests
//!
//! The attach tests need root, a bpffs mount at /sys/fs/bpf and a built TC
//! program.
//! Run with: L2RADAR_PROGRAM=<path> cargo test --package l2radar --features test-util --test probe_test -- --ignored --nocapture

use l2radar::dump;
use l2radar::ebpf_loader::{self, DEFAULT_PROGRAM_PATH, Probe, ProbeError, ProbeSet};
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use tempfile::TempDir;

const LOOPBACK: &str = "lo";
const MISSING_IFACE: &str = "l2rnoexist0";
const BPFFS_ROOT: &str = "/sys/fs/bpf";

fn program_path() -> PathBuf {
    std::env::var_os("L2RADAR_PROGRAM")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_PROGRAM_PATH))
}

// statfs f_type of a BPF filesystem
const BPF_FS_MAGIC: i64 = 0xcafe4a11;

/// Fresh pin directory on bpffs, or `None` (with a note) when the
/// privileged tests cannot run here.
fn bpffs_pin_dir() -> Option<TempDir> {
    if !nix::unistd::Uid::effective().is_root() {
        eprintln!("Skipping test: requires root privileges");
        return None;
    }
    if !program_path().exists() {
        eprintln!("Skipping test: {} not found", program_path().display());
        return None;
    }
    let is_bpffs = nix::sys::statfs::statfs(BPFFS_ROOT)
        .map(|st| st.filesystem_type().0 as i64 == BPF_FS_MAGIC)
        .unwrap_or(false);
    if !is_bpffs {
        eprintln!("Skipping test: {BPFFS_ROOT} is not a bpffs mount");
        return None;
    }

    ebpf_loader::raise_memlock_rlimit();
    Some(tempfile::tempdir_in(BPFFS_ROOT).expect("Failed to create pin dir on bpffs"))
}

#[test]
fn test_unknown_interface_rejected_before_load() {
    let pins = tempfile::tempdir().unwrap();
    let err = Probe::attach(MISSING_IFACE, pins.path(), &program_path()).unwrap_err();

    assert!(matches!(err, ProbeError::InterfaceNotFound(ref name) if name == MISSING_IFACE));
    assert!(!ebpf_loader::pin_path(pins.path(), MISSING_IFACE).exists());
}

#[test]
fn test_missing_program_leaves_nothing_behind() {
    let pins = tempfile::tempdir().unwrap();
    let bogus = pins.path().join("no-such-program");

    let err = Probe::attach(LOOPBACK, pins.path(), &bogus).unwrap_err();
    assert!(matches!(err, ProbeError::Load(_)));
    assert!(fs_is_empty(pins.path()));
}

#[test]
fn test_attach_all_stops_at_first_failure() {
    let pins = tempfile::tempdir().unwrap();
    let interfaces = vec![MISSING_IFACE.to_string(), LOOPBACK.to_string()];

    let err = ProbeSet::attach_all(&interfaces, pins.path(), &program_path()).unwrap_err();
    assert!(matches!(err, ProbeError::InterfaceNotFound(_)));
    assert!(fs_is_empty(pins.path()));
}

#[test]
#[ignore]
fn test_attach_pin_and_close() {
    let Some(pins) = bpffs_pin_dir() else {
        return;
    };
    let probe = Probe::attach(LOOPBACK, pins.path(), &program_path()).expect("attach to lo");

    let pinned = ebpf_loader::pin_path(pins.path(), LOOPBACK);
    assert_eq!(probe.pin_path(), pinned.as_path());
    assert!(pinned.exists());
    let mode = std::fs::metadata(&pinned).unwrap().permissions().mode() & 0o777;
    assert_eq!(mode, 0o444);

    // Loopback frames carry a zero MAC, so the table stays empty
    let neighbours = dump::read_table(&pinned).expect("read pinned map");
    assert!(neighbours.is_empty());

    probe.close().expect("clean close");
    assert!(!pinned.exists());
}

#[test]
#[ignore]
fn test_failed_set_rolls_back_attached_probes() {
    let Some(pins) = bpffs_pin_dir() else {
        return;
    };
    let interfaces = vec![LOOPBACK.to_string(), MISSING_IFACE.to_string()];

    let err = ProbeSet::attach_all(&interfaces, pins.path(), &program_path()).unwrap_err();
    assert!(matches!(err, ProbeError::InterfaceNotFound(_)));
    assert!(!ebpf_loader::pin_path(pins.path(), LOOPBACK).exists());
}

#[test]
#[ignore]
fn test_probe_set_close_all() {
    let Some(pins) = bpffs_pin_dir() else {
        return;
    };
    let mut set = ProbeSet::attach_all(&[LOOPBACK.to_string()], pins.path(), &program_path())
        .expect("attach set");
    assert_eq!(set.len(), 1);

    let failures = set.close_all();
    assert!(failures.is_empty(), "close failures: {failures:?}");
    assert!(set.is_empty());
    assert!(!ebpf_loader::pin_path(pins.path(), LOOPBACK).exists());
}

#[test]
#[ignore]
fn test_reattach_after_unclean_exit() {
    let Some(pins) = bpffs_pin_dir() else {
        return;
    };
    let pinned = ebpf_loader::pin_path(pins.path(), LOOPBACK);

    // Leave the TC filter and the pin behind, as a killed process would
    let first = Probe::attach(LOOPBACK, pins.path(), &program_path()).expect("first attach");
    std::mem::forget(first);
    assert!(pinned.exists());

    let second = Probe::attach(LOOPBACK, pins.path(), &program_path())
        .expect("attach over leftover filter and pin");
    assert!(pinned.exists());
    assert!(dump::read_table(&pinned).is_ok());

    second.close().expect("clean close");
    assert!(!pinned.exists());

    // Nothing left on the interface: a further attach starts clean
    let third = Probe::attach(LOOPBACK, pins.path(), &program_path()).expect("third attach");
    third.close().expect("clean close");
}

fn fs_is_empty(dir: &std::path::Path) -> bool {
    std::fs::read_dir(dir).unwrap().next().is_none()
}
