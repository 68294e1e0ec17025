//! Global constants used across the tool.
//!
//! This module defines tool-wide constants. It includes:
//! 1. **Line Constants:** The default cache-line size and dirty-mask width.
//! 2. **Protocol Constants:** The verifier exit status that signals a caught
//!    inconsistency.
//! 3. **Word Size:** The machine word the instrumentation contract assumes.

/// Default cache-line size in bytes when detection fails.
///
/// Matches the `clflush` granularity of every mainstream x86-64 part.
pub const DEFAULT_LINE_BYTES: u64 = 64;

/// Width of the per-byte dirty mask in a cache entry.
///
/// One bit per byte of a line; bounds the largest supported line size.
pub const MAX_DIRTY_BITS: u64 = 64;

/// Machine word size in bytes; 32-bit targets are not supported.
pub const MACHINE_WORD: usize = 8;

/// Largest store size the instrumentation pass will tag (a V256 vector).
pub const MAX_STORE_BYTES: u64 = 32;

/// Exit status a verifier returns to signal a caught crash inconsistency.
///
/// Distinguishes an asserted-bad snapshot from an unexpected verifier error;
/// both are counted as failures, but other statuses are additionally logged.
pub const VERIFICATION_FAILURE: i32 = 0xBD;
