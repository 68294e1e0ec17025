//! The cache / write-buffer durability model.
//!
//! This module implements the abstract state machine that shadows the
//! instrumented program's persistence behavior:
//! 1. **Cache:** Line-sized entries with per-byte dirty masks, created by
//!    stores and bounded by random eviction.
//! 2. **Write buffer:** Flushed-but-not-fenced entries, tagged with the
//!    flushing thread, drained by fences.
//! 3. **Engine:** The orchestrator driving the
//!    store → cache → flush → fence → file progression and the crash hooks.
//!
//! Per-line durability states:
//!
//! ```text
//! (absent) --store--> DIRTY --flush--> FLUSHED --fence/evict--> PERSISTED (absent)
//!                        ^--store--|
//! ```

/// Cache entries and the capacity-bounded store cache.
pub mod cache;

/// The durability engine orchestrating all model transitions.
pub mod engine;

/// Per-thread write buffer of flushed entries pending a fence.
pub mod wbuf;

pub use cache::{CacheEntry, StoreCache};
pub use engine::PmemOps;
pub use wbuf::{WriteBuffer, WriteBufferEntry};
