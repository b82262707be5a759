//! Daemon configuration.

use crate::ebpf_loader::{DEFAULT_PIN_PATH, DEFAULT_PROGRAM_PATH};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Default export cadence.
pub const DEFAULT_EXPORT_INTERVAL: Duration = Duration::from_secs(5);

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("At least one interface is required")]
    NoInterfaces,

    #[error("Invalid duration {0:?}")]
    InvalidDuration(String),

    #[error("Export interval must be positive")]
    NonPositiveInterval,
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Everything `l2radar run` needs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunConfig {
    /// Interface names or the `any` / `external` keywords
    pub interfaces: Vec<String>,
    pub pin_path: PathBuf,
    pub program_path: PathBuf,
    /// Export disabled when `None`
    pub export_dir: Option<PathBuf>,
    pub export_interval: Duration,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            interfaces: Vec::new(),
            pin_path: PathBuf::from(DEFAULT_PIN_PATH),
            program_path: PathBuf::from(DEFAULT_PROGRAM_PATH),
            export_dir: None,
            export_interval: DEFAULT_EXPORT_INTERVAL,
        }
    }
}

impl RunConfig {
    /// Checked before any kernel state is touched.
    pub fn validate(&self) -> Result<()> {
        if self.interfaces.iter().all(|i| i.trim().is_empty()) {
            return Err(ConfigError::NoInterfaces);
        }
        if self.export_interval.is_zero() {
            return Err(ConfigError::NonPositiveInterval);
        }
        Ok(())
    }
}

const NANOS_PER_SEC: u128 = 1_000_000_000;

// Fraction digits past this cannot change the result for any unit.
const MAX_FRACTION_DIGITS: usize = 18;

/// Parse durations such as `5s`, `500ms`, `1m30s`, `1.5s` or `2h`.
///
/// Units: `h`, `m`, `s`, `ms`, `us`/`µs`, `ns`. Each number may carry a
/// decimal fraction. A bare `0` is zero.
pub fn parse_interval(s: &str) -> Result<Duration> {
    let invalid = || ConfigError::InvalidDuration(s.to_string());
    let s_trimmed = s.trim();
    if s_trimmed == "0" {
        return Ok(Duration::ZERO);
    }
    if s_trimmed.is_empty() {
        return Err(invalid());
    }

    let mut total_ns: u128 = 0;
    let mut rest = s_trimmed;
    while !rest.is_empty() {
        let int_len = rest.bytes().take_while(u8::is_ascii_digit).count();
        let int_part = &rest[..int_len];
        rest = &rest[int_len..];

        let mut frac_part = "";
        if let Some(after_dot) = rest.strip_prefix('.') {
            let frac_len = after_dot.bytes().take_while(u8::is_ascii_digit).count();
            frac_part = &after_dot[..frac_len];
            rest = &after_dot[frac_len..];
        }
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid());
        }

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let unit_ns = unit_nanos(&rest[..unit_len]).ok_or_else(invalid)?;
        rest = &rest[unit_len..];

        let whole: u128 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().map_err(|_| invalid())?
        };
        let mut part = whole.checked_mul(unit_ns).ok_or_else(invalid)?;

        let frac = &frac_part[..frac_part.len().min(MAX_FRACTION_DIGITS)];
        if !frac.is_empty() {
            let numerator: u128 = frac.parse().map_err(|_| invalid())?;
            part += numerator * unit_ns / 10u128.pow(frac.len() as u32);
        }
        total_ns = total_ns.checked_add(part).ok_or_else(invalid)?;
    }

    let secs = u64::try_from(total_ns / NANOS_PER_SEC).map_err(|_| invalid())?;
    Ok(Duration::new(secs, (total_ns % NANOS_PER_SEC) as u32))
}

fn unit_nanos(unit: &str) -> Option<u128> {
    match unit {
        "h" => Some(3600 * NANOS_PER_SEC),
        "m" => Some(60 * NANOS_PER_SEC),
        "s" => Some(NANOS_PER_SEC),
        "ms" => Some(1_000_000),
        "us" | "µs" => Some(1_000),
        "ns" => Some(1),
        _ => None,
    }
}
