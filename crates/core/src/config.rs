//! Configuration system for the tool.
//!
//! This module defines the configuration structure that parameterizes the
//! persistence model. It provides:
//! 1. **Defaults:** Baseline capacities and probabilities for the cache,
//!    write buffer, and crash simulator.
//! 2. **Detection:** Cache-line size read from the target CPU.
//! 3. **Deserialization:** Configuration can be supplied as JSON; every field
//!    falls back to its default when absent.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::common::ToolError;
use crate::common::constants::DEFAULT_LINE_BYTES;

/// Default configuration constants.
///
/// Capacities and probabilities are deliberately tunable: the model evicts a
/// random subset when a capacity is exceeded, and tests inject smaller values
/// to force those paths deterministically.
mod defaults {
    /// Maximum number of cache entries before a probabilistic eviction sweep.
    pub const CACHE_MAX: usize = 4096;

    /// Maximum number of write-buffer entries before a probabilistic eviction sweep.
    pub const WB_MAX: usize = 64;

    /// A crash point fires with probability 1-in-this per check.
    pub const CRASH_ONE_IN: u64 = 100;

    /// Each cache entry is selected for eviction with probability 1-in-this.
    pub const CACHE_EVICT_ONE_IN: u64 = 2;

    /// Each write-buffer entry is selected for eviction with probability 1-in-this.
    pub const WB_EVICT_ONE_IN: u64 = 10;

    /// Default PRNG seed.
    pub const SEED: u64 = 0x5043_0001;
}

/// Tool configuration.
///
/// Construct with [`Config::default`], deserialize from JSON, or load with
/// [`Config::from_file`]. A `line_bytes` of zero means "detect at startup".
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Cache-line size in bytes; `0` detects from the target CPU.
    pub line_bytes: u64,
    /// Cache capacity in entries.
    pub cache_max: usize,
    /// Write-buffer capacity in entries.
    pub wb_max: usize,
    /// Denominator of the per-check crash probability.
    pub crash_one_in: u64,
    /// Denominator of the per-entry cache eviction probability.
    pub cache_evict_one_in: u64,
    /// Denominator of the per-entry write-buffer eviction probability.
    pub wb_evict_one_in: u64,
    /// PRNG seed; identical seeds replay identical eviction/crash choices.
    pub seed: u64,
    /// Verifier executable invoked on simulated crashes; `None` suppresses
    /// crash simulation entirely.
    pub verifier: Option<PathBuf>,
    /// Directory receiving `bad-verification-<k>.*` artifacts.
    pub artifact_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            line_bytes: 0,
            cache_max: defaults::CACHE_MAX,
            wb_max: defaults::WB_MAX,
            crash_one_in: defaults::CRASH_ONE_IN,
            cache_evict_one_in: defaults::CACHE_EVICT_ONE_IN,
            wb_evict_one_in: defaults::WB_EVICT_ONE_IN,
            seed: defaults::SEED,
            verifier: None,
            artifact_dir: PathBuf::from("."),
        }
    }
}

impl Config {
    /// Loads a configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::ConfigRead`] when the file cannot be read and
    /// [`ToolError::ConfigParse`] when it is not valid JSON for this shape.
    pub fn from_file(path: &Path) -> Result<Self, ToolError> {
        let text = fs::read_to_string(path).map_err(|source| ToolError::ConfigRead {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ToolError::ConfigParse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Resolves the cache-line size: configured value, or detected.
    pub fn effective_line_bytes(&self) -> u64 {
        if self.line_bytes == 0 {
            detect_line_size()
        } else {
            self.line_bytes
        }
    }
}

/// Reads the target CPU's flush granularity — Linux specific.
///
/// Scans `/proc/cpuinfo` for the `clflush size` field and falls back to the
/// default when the file or field is missing.
pub fn detect_line_size() -> u64 {
    let Ok(cpuinfo) = fs::read_to_string("/proc/cpuinfo") else {
        return DEFAULT_LINE_BYTES;
    };
    for line in cpuinfo.lines() {
        if let Some(rest) = line.strip_prefix("clflush size") {
            let value = rest.trim_start_matches([' ', '\t', ':']).trim();
            if let Ok(bytes) = value.parse::<u64>()
                && bytes != 0
            {
                return bytes;
            }
        }
    }
    DEFAULT_LINE_BYTES
}
