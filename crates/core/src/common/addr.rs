//! Cache-line arithmetic.
//!
//! This module defines the line-size helper every component uses to trim
//! guest addresses to cache-line boundaries. It provides:
//! 1. **Line Arithmetic:** Trimming to line base and extracting in-line offsets.
//! 2. **Validation:** Rejects unsupported line sizes at startup.

use crate::common::constants::MAX_DIRTY_BITS;

/// The cache-line size in effect for this run.
///
/// Detected at startup from the target CPU (`clflush size`); all line
/// addresses the model tracks are aligned to this size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LineSize(u64);

impl LineSize {
    /// Creates a line size, validating it against what the model supports.
    ///
    /// # Panics
    ///
    /// Panics if `bytes` is not a power of two or exceeds the width of the
    /// per-byte dirty mask. An unsupported line size means the durability
    /// model cannot represent the target at all, so this is fatal.
    pub fn new(bytes: u64) -> Self {
        assert!(
            bytes.is_power_of_two() && bytes <= MAX_DIRTY_BITS,
            "unsupported cache line size {bytes}"
        );
        Self(bytes)
    }

    /// Returns the line size in bytes.
    #[inline(always)]
    pub fn bytes(&self) -> u64 {
        self.0
    }

    /// Trims an address down to the base of its cache line.
    #[inline(always)]
    pub fn trim(&self, addr: u64) -> u64 {
        addr & !(self.0 - 1)
    }

    /// Returns the byte offset of an address within its cache line.
    #[inline(always)]
    pub fn offset(&self, addr: u64) -> u64 {
        addr & (self.0 - 1)
    }
}
