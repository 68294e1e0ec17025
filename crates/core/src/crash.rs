//! Crash simulation: fork/wait driver, verifier invocation, artifacts.
//!
//! A simulated crash forks the process and execs the verifier in the child.
//! The parent's in-memory cache and write buffer are untouched; the verifier
//! sees only the backing files, which hold exactly the fenced-or-evicted
//! subset of stores — the crash-consistent view. The parent blocks in
//! `waitpid`, times the run, and classifies the outcome.
//!
//! Per attempt `k` the child's streams land in `bad-verification-<k>.stdout`
//! / `.stderr` and the leak report in `bad-verification-<k>.dump`; on
//! success all three are deleted. On failure every backing file is copied to
//! `<name>.<k>.<suffix>` with a reflink-capable copy so snapshots stay cheap
//! on copy-on-write filesystems.

use std::ffi::{CString, c_char};
use std::fs::{self, File};
use std::io::{self, Write};
use std::os::fd::AsRawFd;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::ptr;
use std::time::Instant;

use tracing::warn;

use crate::common::constants::VERIFICATION_FAILURE;
use crate::region::RegionTable;
use crate::stats::VerificationStats;

/// The crash simulator's configuration and accumulated statistics.
#[derive(Debug)]
pub struct CrashSim {
    verifier: Option<PathBuf>,
    enabled: bool,
    artifact_dir: PathBuf,
    stats: VerificationStats,
}

impl CrashSim {
    /// Creates a simulator; crash simulation starts enabled.
    pub fn new(verifier: Option<PathBuf>, artifact_dir: PathBuf) -> Self {
        Self {
            verifier,
            enabled: true,
            artifact_dir,
            stats: VerificationStats::new(),
        }
    }

    /// The configured verifier, if any.
    pub fn verifier(&self) -> Option<&Path> {
        self.verifier.as_deref()
    }

    /// Toggles the global crash-simulation flag.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Accumulated verification statistics.
    pub fn stats(&self) -> &VerificationStats {
        &self.stats
    }

    /// Whether probabilistic crash points may fire at all.
    pub fn armed(&self, num_regions: usize) -> bool {
        self.enabled && self.verifier.is_some() && num_regions > 0
    }

    /// Runs one simulated crash: snapshot artifacts, fork, exec the verifier,
    /// wait, classify.
    ///
    /// `dump` is the rendered leak report at the moment of the crash. The
    /// attempt number is fixed before the fork so artifact names and the
    /// post-wait run counter agree.
    ///
    /// # Panics
    ///
    /// Panics when the per-attempt artifact files cannot be created, when
    /// `fork` fails, or when the child terminates in a way `waitpid` cannot
    /// classify.
    pub fn simulate(&mut self, regions: &RegionTable, dump: &str) {
        let verifier = self
            .verifier
            .clone()
            .unwrap_or_else(|| panic!("crash simulated without a verifier"));
        let attempt = self.stats.runs + 1;

        // Everything the child touches is prepared before the fork; the child
        // itself only redirects descriptors and execs.
        let dump_path = self.artifact_path(attempt, "dump");
        let mut dump_file = create_artifact(&dump_path);
        if let Err(err) = dump_file.write_all(dump.as_bytes()) {
            panic!("could not write '{}': {err}", dump_path.display());
        }
        let stdout_file = create_artifact(&self.artifact_path(attempt, "stdout"));
        let stderr_file = create_artifact(&self.artifact_path(attempt, "stderr"));

        let program = cstring(verifier.as_os_str().as_bytes());
        let mut args: Vec<CString> = vec![program.clone(), cstring(regions.len().to_string())];
        for region in regions.iter() {
            args.push(cstring(region.name.as_bytes()));
        }
        let mut argv: Vec<*const c_char> = args.iter().map(|arg| arg.as_ptr()).collect();
        argv.push(ptr::null());

        let start = Instant::now();
        // SAFETY: the child performs only async-signal-safe calls (dup2,
        // execv, _exit) on descriptors and buffers prepared above.
        let pid = unsafe { libc::fork() };
        if pid == 0 {
            unsafe {
                libc::dup2(stdout_file.as_raw_fd(), libc::STDOUT_FILENO);
                libc::dup2(stderr_file.as_raw_fd(), libc::STDERR_FILENO);
                libc::execv(program.as_ptr(), argv.as_ptr());
                libc::_exit(-1);
            }
        }
        assert!(pid > 0, "fork failed: {}", io::Error::last_os_error());

        self.reap(pid, attempt, start, regions);
    }

    /// Waits for the verifier child and classifies its exit.
    fn reap(&mut self, pid: libc::pid_t, attempt: u64, start: Instant, regions: &RegionTable) {
        let mut status: libc::c_int = 0;
        // SAFETY: pid is the child forked above; status is a valid out-pointer.
        let reaped = unsafe { libc::waitpid(pid, &mut status, 0) };
        assert_eq!(reaped, pid, "waitpid({pid}) returned unexpected pid {reaped}");

        self.stats.record(start.elapsed().as_secs_f64());

        if libc::WIFEXITED(status) {
            let code = libc::WEXITSTATUS(status);
            if code == 0 {
                self.remove_artifacts(attempt);
            } else {
                if code != VERIFICATION_FAILURE && code != ((-VERIFICATION_FAILURE) & 0xFF) {
                    warn!("verifier exited with unexpected status {code}");
                }
                self.stats.record_failure();
                self.copy_regions(regions, attempt, "bad");
            }
        } else if libc::WIFSIGNALED(status) {
            self.stats.record_failure();
            self.copy_regions(regions, attempt, "bad.coredump");
        } else {
            self.stats.record_failure();
            self.copy_regions(regions, attempt, "bad.weird");
            panic!("verification process terminated in a very unusual way");
        }
    }

    /// Snapshots every backing file to `<name>.<attempt>.<suffix>`.
    fn copy_regions(&self, regions: &RegionTable, attempt: u64, suffix: &str) {
        for region in regions.iter() {
            let snapshot = format!("{}.{attempt}.{suffix}", region.name);
            match Command::new("/bin/cp")
                .arg(&region.name)
                .arg(&snapshot)
                .arg("--reflink=auto")
                .status()
            {
                Ok(status) if status.success() => {}
                Ok(status) => warn!("snapshot copy to '{snapshot}' failed: {status}"),
                Err(err) => warn!("could not run /bin/cp for '{snapshot}': {err}"),
            }
        }
    }

    /// Deletes the per-attempt artifact files after a clean verification.
    fn remove_artifacts(&self, attempt: u64) {
        for ext in ["dump", "stdout", "stderr"] {
            let _removed = fs::remove_file(self.artifact_path(attempt, ext));
        }
    }

    /// Path of one per-attempt artifact file.
    fn artifact_path(&self, attempt: u64, ext: &str) -> PathBuf {
        self.artifact_dir
            .join(format!("bad-verification-{attempt}.{ext}"))
    }
}

/// Creates a per-attempt artifact file; failure to do so is fatal.
fn create_artifact(path: &Path) -> File {
    match File::create(path) {
        Ok(file) => file,
        Err(err) => panic!("could not open file '{}': {err}", path.display()),
    }
}

/// Builds a C string for exec; region names and paths never contain NUL.
fn cstring(bytes: impl Into<Vec<u8>>) -> CString {
    CString::new(bytes).unwrap_or_else(|_| panic!("embedded NUL in exec argument"))
}
