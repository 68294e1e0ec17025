//! User-error definitions.
//!
//! This module defines the errors the tool reports back to the guest instead
//! of aborting. The split follows the tool's propagation policy:
//! 1. **User errors** (this enum): rejected with a message; the guest
//!    continues running.
//! 2. **Fatal conditions** (assertions elsewhere): missing descriptors, short
//!    backing-file I/O, unsupported word sizes. These abort the tool.

use thiserror::Error;

/// An operation rejected because of a caller mistake.
///
/// Every variant maps to a client request that was refused; none of them stop
/// the instrumented program.
#[derive(Debug, Error)]
pub enum ToolError {
    /// A region was registered with an empty (null) name.
    #[error("region name must not be empty")]
    EmptyRegionName,

    /// A region's base address is not aligned to the cache-line size.
    #[error("address {addr:#x} is not aligned to cache line size of {line}")]
    MisalignedRegion {
        /// The rejected base address.
        addr: u64,
        /// The cache-line size in effect.
        line: u64,
    },

    /// A crash was forced without a configured verification program.
    #[error("attempt to force a crash without a verification program")]
    NoVerifier,

    /// A crash was forced with no registered persistent region.
    #[error("attempt to force a crash without a registered persistent region")]
    NoRegions,

    /// The tool configuration file could not be read.
    #[error("could not read config '{path}': {source}")]
    ConfigRead {
        /// Path of the config file.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The tool configuration file could not be parsed.
    #[error("could not parse config '{path}': {source}")]
    ConfigParse {
        /// Path of the config file.
        path: String,
        /// Underlying deserialization error.
        #[source]
        source: serde_json::Error,
    },
}
