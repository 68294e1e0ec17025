//! Per-thread write buffer of flushed entries pending a fence.
//!
//! A flush moves a cache entry in here; the entry holds its post-flush state
//! until a fence on the flushing thread (or a capacity eviction) writes it to
//! the backing file. Entries are tagged with the thread that flushed them so
//! a fence drains only the issuing thread's pending flushes.

use std::collections::BTreeMap;

use crate::host::ThreadId;
use crate::model::cache::CacheEntry;

/// A flushed cache entry waiting for a fence.
#[derive(Clone, Debug)]
pub struct WriteBufferEntry {
    /// The flushed line; no longer resident in the cache.
    pub entry: CacheEntry,
    /// Thread that issued the flush.
    pub tid: ThreadId,
}

/// The simulated write buffer, keyed by line address.
#[derive(Debug, Default)]
pub struct WriteBuffer {
    entries: BTreeMap<u64, WriteBufferEntry>,
}

impl WriteBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of pending entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether a line is pending.
    pub fn contains(&self, line: u64) -> bool {
        self.entries.contains_key(&line)
    }

    /// Inserts a flushed entry tagged with the flushing thread.
    ///
    /// The caller collapses any existing entry for the same line first, so a
    /// displaced entry here is a logic error.
    pub fn insert(&mut self, entry: CacheEntry, tid: ThreadId) {
        let prev = self
            .entries
            .insert(entry.addr, WriteBufferEntry { entry, tid });
        debug_assert!(prev.is_none(), "write buffer collapse was skipped");
    }

    /// Removes and returns the pending entry for a line.
    pub fn remove(&mut self, line: u64) -> Option<WriteBufferEntry> {
        self.entries.remove(&line)
    }

    /// Removes and returns every entry flushed by `tid`, in address order.
    pub fn drain_thread(&mut self, tid: ThreadId) -> Vec<WriteBufferEntry> {
        let lines: Vec<u64> = self
            .entries
            .iter()
            .filter(|(_, pending)| pending.tid == tid)
            .map(|(&line, _)| line)
            .collect();
        lines
            .into_iter()
            .filter_map(|line| self.entries.remove(&line))
            .collect()
    }

    /// Iterates pending entries in address order.
    pub fn iter(&self) -> impl Iterator<Item = &WriteBufferEntry> {
        self.entries.values()
    }

    /// Iterates pending line addresses in address order.
    pub fn lines(&self) -> impl Iterator<Item = u64> + '_ {
        self.entries.keys().copied()
    }
}
