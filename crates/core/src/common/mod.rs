//! Common utilities and types used throughout the tool.
//!
//! This module provides the building blocks shared by every component:
//! 1. **Line Arithmetic:** Cache-line trimming/offset helpers.
//! 2. **Constants:** Cache-line defaults, the verifier failure status, and the
//!    machine word size the tool assumes.
//! 3. **Error Handling:** User-error kinds surfaced back to the guest.
//! 4. **Randomness:** The seedable PRNG driving eviction and crash points.

/// Cache-line arithmetic.
pub mod addr;

/// Common constants used throughout the tool.
pub mod constants;

/// User-error definitions.
pub mod error;

/// Seedable pseudo-random number generator.
pub mod rng;

pub use addr::LineSize;
pub use constants::{DEFAULT_LINE_BYTES, MACHINE_WORD, VERIFICATION_FAILURE};
pub use error::ToolError;
pub use rng::XorShift64;
