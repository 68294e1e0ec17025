//! Registered persistent regions and transient ranges.
//!
//! This module tracks which guest address ranges the tool treats as
//! persistent memory:
//! 1. **Region table:** Registered `{name, base, size, backing file}` tuples,
//!    queryable by address range and by name.
//! 2. **Transient set:** Ranges the user asserts are not persistent even
//!    though they lie inside a registered region; stores to them are skipped.

/// Registered-region table and backing-file management.
pub mod table;

/// Transient address ranges excluded from tracking.
pub mod transient;

pub use table::{RegionTable, RegisteredRegion};
pub use transient::TransientSet;
