//! Replay-trace event definitions and the synthetic host.
//!
//! A trace is a JSON array of events, each mirroring one callback the host
//! framework would deliver: instrumented stores, flushes and fences, and the
//! client requests the guest issues. The replay host stands in for the real
//! framework, synthesizing one stacktrace frame per trace position so the
//! final report can point back at the offending event.

use serde::Deserialize;

use pmat_core::host::{Host, ThreadId};
use pmat_core::stack::{Frame, Stacktrace};

/// One replayed event.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceEvent {
    /// Register a persistent region backed by the file at `name`.
    Register {
        /// Region name; also the backing-file path.
        name: String,
        /// Line-aligned base address.
        addr: u64,
        /// Region size in bytes.
        size: u64,
    },
    /// An instrumented store of `size` bytes of `value` at `addr`.
    Store {
        /// Store address.
        addr: u64,
        /// Store size in bytes, at most a machine word.
        size: u64,
        /// Stored value, little-endian.
        value: u64,
        /// Issuing guest thread.
        #[serde(default)]
        tid: u32,
    },
    /// Flush the cache line containing `addr`.
    Flush {
        /// Address inside the flushed line.
        addr: u64,
        /// Issuing guest thread.
        #[serde(default)]
        tid: u32,
    },
    /// Flush with self-fencing semantics.
    FlushFence {
        /// Address inside the flushed line.
        addr: u64,
        /// Issuing guest thread.
        #[serde(default)]
        tid: u32,
    },
    /// Store fence on the issuing thread.
    Fence {
        /// Issuing guest thread.
        #[serde(default)]
        tid: u32,
    },
    /// Mark a range transient.
    Transient {
        /// Base of the transient range.
        addr: u64,
        /// Size of the transient range.
        size: u64,
    },
    /// Unregister the region named `name`.
    UnregisterByName {
        /// Name the region was registered under.
        name: String,
    },
    /// Unregister the region containing `addr`.
    UnregisterByAddr {
        /// Any address inside the region.
        addr: u64,
    },
    /// Re-enable crash simulation.
    CrashEnable,
    /// Disable crash simulation.
    CrashDisable,
    /// Simulate a crash now.
    ForceCrash,
}

impl TraceEvent {
    /// The guest thread issuing this event; defaults to thread 0.
    pub fn tid(&self) -> u32 {
        match self {
            Self::Store { tid, .. }
            | Self::Flush { tid, .. }
            | Self::FlushFence { tid, .. }
            | Self::Fence { tid } => *tid,
            _ => 0,
        }
    }
}

/// Synthetic host for trace replay.
///
/// Reports the current event's thread id and a one-frame stacktrace naming
/// the event's position in the trace file.
#[derive(Debug, Default)]
pub struct ReplayHost {
    tid: u32,
    position: u64,
}

impl ReplayHost {
    /// Creates a replay host positioned before the first event.
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves to the event at `position`, issued by `tid`.
    pub fn advance(&mut self, position: u64, tid: u32) {
        self.position = position;
        self.tid = tid;
    }
}

impl Host for ReplayHost {
    fn stacktrace(&mut self) -> Stacktrace {
        Stacktrace::new(vec![Frame::new(
            self.position,
            format!("trace[{}]", self.position),
        )])
    }

    fn thread_id(&self) -> ThreadId {
        ThreadId(self.tid)
    }
}
