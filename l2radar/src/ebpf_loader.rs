//! eBPF program loading, attachment and map pinning.
//!
//! One [`Probe`] per interface: each gets its own copy of the program and
//! therefore its own neighbour map, pinned at `<pin_base>/neigh-<iface>` so
//! that readers never share memory with the classifier. The program itself
//! is compiled separately in l2radar-ebpf-programs.

use aya::maps::Map;
use aya::programs::tc::{SchedClassifierLinkId, TcOptions};
use aya::programs::{SchedClassifier, TcAttachType};
use aya::{Bpf, BpfLoader};
use l2radar_common::{NEIGHBOURS_MAP, PROGRAM_NAME};
use std::fs::{self, DirBuilder, Permissions};
use std::io;
use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Default base directory for pinned neighbour maps.
pub const DEFAULT_PIN_PATH: &str = "/sys/fs/bpf/l2radar";

/// Default location of the compiled TC program.
pub const DEFAULT_PROGRAM_PATH: &str = "/usr/lib/l2radar/ebpf/l2radar";

const PIN_DIR_MODE: u32 = 0o755;
const PIN_MODE: u32 = 0o444;

/// Probe attach errors.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Interface not found: {0}")]
    InterfaceNotFound(String),

    #[error("Failed to load eBPF program: {0}")]
    Load(#[from] aya::BpfError),

    #[error("Failed to attach TC program: {0}")]
    Attach(#[from] aya::programs::ProgramError),

    #[error("Failed to pin map: {0}")]
    Pin(#[from] aya::pin::PinError),

    #[error("Program not found: {0}")]
    ProgramNotFound(String),

    #[error("Map not found: {0}")]
    MapNotFound(String),

    #[error("TC error: {0}")]
    Tc(String),

    #[error("Failed to publish {path}: {source}")]
    Publish {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub type Result<T> = std::result::Result<T, ProbeError>;

/// Every cleanup step that failed while closing one probe.
#[derive(Debug, Error)]
#[error("Failed to close probe on {interface}: {}", .failures.join("; "))]
pub struct CloseError {
    pub interface: String,
    pub failures: Vec<String>,
}

/// Location of the pinned map for `interface` under `pin_base`.
pub fn pin_path(pin_base: &Path, interface: &str) -> PathBuf {
    pin_base.join(format!("neigh-{interface}"))
}

/// Raise RLIMIT_MEMLOCK so map creation works on pre-5.11 kernels.
pub fn raise_memlock_rlimit() {
    let rlim = libc::rlimit {
        rlim_cur: libc::RLIM_INFINITY,
        rlim_max: libc::RLIM_INFINITY,
    };
    let ret = unsafe { libc::setrlimit(libc::RLIMIT_MEMLOCK, &rlim) };
    if ret != 0 {
        warn!(
            error = %io::Error::last_os_error(),
            "Failed to raise memlock rlimit"
        );
    }
}

/// The classifier bound to one interface.
#[derive(Debug)]
pub struct Probe {
    interface: String,
    pin_path: PathBuf,
    bpf: Option<Bpf>,
    link: Option<SchedClassifierLinkId>,
    pinned: bool,
}

impl Probe {
    /// Load the program from `program_path`, attach it at TC ingress of
    /// `interface` and publish its neighbour map under `pin_base`.
    ///
    /// Anything set up before a failure is torn down again.
    pub fn attach(interface: &str, pin_base: &Path, program_path: &Path) -> Result<Self> {
        let if_index = nix::net::if_::if_nametoindex(interface)
            .map_err(|_| ProbeError::InterfaceNotFound(interface.to_string()))?;

        let bpf = BpfLoader::new().load_file(program_path)?;

        let mut probe = Self {
            interface: interface.to_string(),
            pin_path: pin_path(pin_base, interface),
            bpf: Some(bpf),
            link: None,
            pinned: false,
        };

        if let Err(e) = probe.activate(pin_base) {
            if let Err(close_err) = probe.release() {
                warn!(
                    interface,
                    error = %close_err,
                    "Rollback after failed attach was incomplete"
                );
            }
            return Err(e);
        }

        info!(
            interface,
            if_index,
            pin_path = %probe.pin_path.display(),
            "Probe attached"
        );
        Ok(probe)
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// Where readers find this probe's neighbour table.
    pub fn pin_path(&self) -> &Path {
        &self.pin_path
    }

    fn activate(&mut self, pin_base: &Path) -> Result<()> {
        let bpf = self
            .bpf
            .as_mut()
            .ok_or_else(|| ProbeError::ProgramNotFound(PROGRAM_NAME.to_string()))?;

        // Add clsact qdisc if not present
        if let Err(e) = aya::programs::tc::qdisc_add_clsact(&self.interface)
            && !e.to_string().contains("exists")
        {
            return Err(ProbeError::Tc(format!(
                "Failed to add clsact qdisc to {}: {}",
                self.interface, e
            )));
        }

        // TC filters outlive the process that added them
        remove_stale_filter(&self.interface)?;

        let prog: &mut SchedClassifier = bpf
            .program_mut(PROGRAM_NAME)
            .ok_or_else(|| ProbeError::ProgramNotFound(PROGRAM_NAME.to_string()))?
            .try_into()?;

        prog.load()?;
        let link = prog.attach_with_options(
            &self.interface,
            TcAttachType::Ingress,
            TcOptions {
                priority: 1,
                handle: 1,
            },
        )?;
        self.link = Some(link);
        debug!(interface = %self.interface, "TC ingress program attached");

        create_pin_dir(pin_base)?;
        remove_stale_pin(&self.pin_path)?;

        let map = bpf
            .map_mut(NEIGHBOURS_MAP)
            .ok_or_else(|| ProbeError::MapNotFound(NEIGHBOURS_MAP.to_string()))?;
        match map {
            Map::HashMap(data) => data.pin(&self.pin_path)?,
            _ => return Err(ProbeError::MapNotFound(NEIGHBOURS_MAP.to_string())),
        }
        self.pinned = true;

        fs::set_permissions(&self.pin_path, Permissions::from_mode(PIN_MODE)).map_err(
            |source| ProbeError::Publish {
                path: self.pin_path.clone(),
                source,
            },
        )?;

        Ok(())
    }

    /// Detach, unpin, then release the program. Every step is attempted;
    /// all failures are returned together.
    pub fn close(mut self) -> std::result::Result<(), CloseError> {
        let result = self.release();
        if result.is_ok() {
            info!(interface = %self.interface, "Probe closed");
        }
        result
    }

    fn release(&mut self) -> std::result::Result<(), CloseError> {
        let mut failures = Vec::new();

        if let Some(link) = self.link.take()
            && let Err(e) = self.detach(link)
        {
            failures.push(format!("detach: {e}"));
        }

        if self.pinned {
            self.pinned = false;
            match fs::remove_file(&self.pin_path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => failures.push(format!("unpin {}: {e}", self.pin_path.display())),
            }
        }

        // Dropping the object closes the program and map fds
        self.bpf = None;

        if failures.is_empty() {
            Ok(())
        } else {
            Err(CloseError {
                interface: self.interface.clone(),
                failures,
            })
        }
    }

    fn detach(&mut self, link: SchedClassifierLinkId) -> Result<()> {
        let bpf = self
            .bpf
            .as_mut()
            .ok_or_else(|| ProbeError::ProgramNotFound(PROGRAM_NAME.to_string()))?;
        let prog: &mut SchedClassifier = bpf
            .program_mut(PROGRAM_NAME)
            .ok_or_else(|| ProbeError::ProgramNotFound(PROGRAM_NAME.to_string()))?
            .try_into()?;
        prog.detach(link)?;
        Ok(())
    }
}

fn create_pin_dir(pin_base: &Path) -> Result<()> {
    DirBuilder::new()
        .recursive(true)
        .mode(PIN_DIR_MODE)
        .create(pin_base)
        .map_err(|source| ProbeError::Publish {
            path: pin_base.to_path_buf(),
            source,
        })
}

fn remove_stale_filter(interface: &str) -> Result<()> {
    match aya::programs::tc::qdisc_detach_program(interface, TcAttachType::Ingress, PROGRAM_NAME) {
        Ok(()) => {
            warn!(interface, "Removed stale TC filter from a previous run");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ProbeError::Tc(format!(
            "Failed to remove stale filter on {interface}: {e}"
        ))),
    }
}

// A pin left behind by a crashed run would make BPF_OBJ_PIN fail with EEXIST.
fn remove_stale_pin(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "Replaced stale pin");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(ProbeError::Publish {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// All probes of one run, in attach order.
#[derive(Debug, Default)]
pub struct ProbeSet {
    probes: Vec<Probe>,
}

impl ProbeSet {
    /// Attach one probe per interface. On the first failure every probe
    /// already attached is closed again and the error is returned.
    pub fn attach_all(interfaces: &[String], pin_base: &Path, program_path: &Path) -> Result<Self> {
        let mut set = Self::default();
        for interface in interfaces {
            match Probe::attach(interface, pin_base, program_path) {
                Ok(probe) => set.probes.push(probe),
                Err(e) => {
                    for close_err in set.close_all() {
                        warn!(error = %close_err, "Failed to roll back probe");
                    }
                    return Err(e);
                }
            }
        }
        Ok(set)
    }

    pub fn probes(&self) -> &[Probe] {
        &self.probes
    }

    pub fn len(&self) -> usize {
        self.probes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probes.is_empty()
    }

    /// Close every probe, returning every failure. Closing one probe never
    /// stops the others from being closed.
    pub fn close_all(&mut self) -> Vec<CloseError> {
        self.probes
            .drain(..)
            .filter_map(|probe| probe.close().err())
            .collect()
    }
}
