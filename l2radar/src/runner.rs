//! The long-running monitor: attach, export on a timer, tear down on signal.

use crate::config::RunConfig;
use crate::ebpf_loader::{self, ProbeSet};
use crate::export;
use crate::iface;
use anyhow::{Context, bail};
use std::fs;
use tokio::signal::unix::{SignalKind, signal};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{error, info};

/// Expand keywords in `config.interfaces` into concrete names.
pub fn resolve_config_interfaces(config: &RunConfig) -> anyhow::Result<Vec<String>> {
    let discovered = if iface::needs_discovery(&config.interfaces) {
        iface::discover_interfaces().context("Failed to list interfaces")?
    } else {
        Vec::new()
    };

    let resolved = iface::resolve_interfaces(&config.interfaces, &discovered);
    if resolved.is_empty() {
        bail!("No interfaces found");
    }
    Ok(resolved)
}

/// Run until SIGINT or SIGTERM.
pub async fn run(config: RunConfig) -> anyhow::Result<()> {
    config.validate()?;
    let interfaces = resolve_config_interfaces(&config)?;

    if let Some(dir) = &config.export_dir {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create export directory {}", dir.display()))?;
    }

    let mut sigint = signal(SignalKind::interrupt()).context("Failed to register SIGINT handler")?;
    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to register SIGTERM handler")?;

    ebpf_loader::raise_memlock_rlimit();
    let mut probes = ProbeSet::attach_all(&interfaces, &config.pin_path, &config.program_path)?;

    info!(
        interfaces = ?interfaces,
        pin_path = %config.pin_path.display(),
        "l2radar running"
    );

    match &config.export_dir {
        Some(dir) => {
            info!(
                dir = %dir.display(),
                interval = %export::format_interval(config.export_interval),
                "Export enabled"
            );

            // First tick fires immediately
            let mut ticker = interval(config.export_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let targets = probes.probes().iter().map(|p| (p.interface(), p.pin_path()));
                        export::export_all(targets, dir, config.export_interval);
                    }
                    _ = sigint.recv() => { info!("Received SIGINT"); break; }
                    _ = sigterm.recv() => { info!("Received SIGTERM"); break; }
                }
            }
        }
        None => {
            tokio::select! {
                _ = sigint.recv() => { info!("Received SIGINT"); }
                _ = sigterm.recv() => { info!("Received SIGTERM"); }
            }
        }
    }

    info!("Shutting down...");
    let failures = probes.close_all();
    for e in &failures {
        error!(interface = %e.interface, error = %e, "Failed to close probe");
    }
    if !failures.is_empty() {
        bail!("{} probe(s) failed to close cleanly", failures.len());
    }

    info!("l2radar stopped");
    Ok(())
}
