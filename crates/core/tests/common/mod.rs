//! Shared test infrastructure.
//!
//! Provides a `TestRig` that owns a temp directory and an engine configured
//! for deterministic tests (fixed line size, generous capacities, crash
//! simulation unarmed unless a verifier is injected), plus helpers for
//! registering regions inside the temp directory.


use std::fs;
use std::path::PathBuf;

use pmat_core::{Config, PmemOps};
use tempfile::TempDir;

/// Cache-line size every test assumes.
pub const LINE: u64 = 64;

/// An engine over a private temp directory.
pub struct TestRig {
    /// Temp directory holding backing files and crash artifacts.
    pub dir: TempDir,
    /// The engine under test.
    pub ops: PmemOps,
}

impl TestRig {
    /// Creates a rig with the default deterministic test config.
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    /// Creates a rig, letting the caller adjust the config first.
    pub fn with_config(adjust: impl FnOnce(&mut Config)) -> Self {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();

        let dir = TempDir::new().expect("temp dir");
        let mut config = Config {
            line_bytes: LINE,
            cache_max: 1024,
            wb_max: 1024,
            seed: 1,
            artifact_dir: dir.path().to_path_buf(),
            ..Config::default()
        };
        adjust(&mut config);
        let ops = PmemOps::new(config);
        Self { dir, ops }
    }

    /// Path (as region name) for a file inside the rig's temp directory.
    pub fn region_name(&self, name: &str) -> String {
        self.dir.path().join(name).display().to_string()
    }

    /// Registers a region inside the temp directory and returns its name.
    pub fn register(&mut self, name: &str, base: u64, size: u64) -> String {
        let full = self.region_name(name);
        self.ops
            .register(&full, base, size)
            .expect("region should register");
        full
    }

    /// Reads a backing file in full.
    pub fn read_backing(&self, name: &str) -> Vec<u8> {
        fs::read(self.region_name(name)).expect("backing file should exist")
    }

    /// Path of a crash artifact inside the temp directory.
    pub fn artifact(&self, file: &str) -> PathBuf {
        self.dir.path().join(file)
    }
}

impl Default for TestRig {
    fn default() -> Self {
        Self::new()
    }
}
