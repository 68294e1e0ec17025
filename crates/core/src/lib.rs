//! Persistent-memory analysis tool core.
//!
//! This crate implements the persistence model of a dynamic-instrumentation
//! checker for persistent-memory programs:
//! 1. **Model:** An abstract CPU-cache / write-buffer state machine that shadows
//!    every store, flush, and fence the instrumented program issues.
//! 2. **Regions:** Bookkeeping for registered persistent ranges and their raw
//!    backing files, plus transient ranges excluded from tracking.
//! 3. **Crash simulation:** A fork/wait loop that materializes crash-consistent
//!    snapshots and runs an external verifier against them.
//! 4. **Instrumentation:** The guest-IR pass that inserts store/flush/fence
//!    callbacks into translated blocks handed over by the host framework.
//! 5. **Protocol:** The in-band client-request dispatcher and the GDB-monitor
//!    command channel.

/// Common types and helpers (addresses, constants, errors, PRNG).
pub mod common;
/// Tool configuration (capacities, probabilities, verifier, line-size detection).
pub mod config;
/// Client-request codes and the request dispatcher.
pub mod client;
/// Crash simulation: fork/wait driver, verifier invocation, artifacts.
pub mod crash;
/// The host binary-translation framework's interface to the tool.
pub mod host;
/// Guest-IR model and the instrumentation pass.
pub mod instr;
/// The cache / write-buffer durability model and its engine.
pub mod model;
/// Registered persistent regions and transient ranges.
pub mod region;
/// Leak reporting and the final dump.
pub mod report;
/// Stacktrace interning and canonical comparison.
pub mod stack;
/// Verification-run statistics (Welford online mean/variance).
pub mod stats;

/// Root configuration type; use `Config::default()` or deserialize from JSON.
pub use crate::config::Config;
/// The host framework's callback interface.
pub use crate::host::Host;
/// Process-wide tool state; create in `init`, drain with `fini`.
pub use crate::model::engine::PmemOps;
