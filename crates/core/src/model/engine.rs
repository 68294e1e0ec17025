//! The durability engine orchestrating all model transitions.
//!
//! `PmemOps` is the tool's process-wide state: created in the host
//! framework's `init` callback, drained in `fini`. The host serializes guest
//! execution, so every callback runs single-threaded and the engine needs no
//! interior locking. It drives:
//! 1. **Stores** into the cache with per-byte dirty tracking.
//! 2. **Flushes** from the cache into the per-thread write buffer.
//! 3. **Fences** draining the issuing thread's flushes to the backing files.
//! 4. **Evictions** when either structure exceeds its capacity.
//! 5. **Crash points** after stores, flushes, and around fences.

use std::os::unix::fs::FileExt;

use tracing::{error, warn};

use crate::common::addr::LineSize;
use crate::common::constants::MACHINE_WORD;
use crate::common::error::ToolError;
use crate::common::rng::XorShift64;
use crate::config::Config;
use crate::crash::CrashSim;
use crate::host::{Host, ThreadId};
use crate::model::cache::{CacheEntry, StoreCache};
use crate::model::wbuf::WriteBuffer;
use crate::region::{RegionTable, TransientSet};
use crate::report;
use crate::stack::StackTable;
use crate::stats::VerificationStats;

/// Process-wide tool state.
#[derive(Debug)]
pub struct PmemOps {
    line: LineSize,
    config: Config,
    regions: RegionTable,
    transients: TransientSet,
    cache: StoreCache,
    wbuf: WriteBuffer,
    stacks: StackTable,
    crash: CrashSim,
    rng: XorShift64,
    blocks_entered: u64,
}

impl PmemOps {
    /// Creates the engine from a configuration.
    ///
    /// # Panics
    ///
    /// Panics on a non-64-bit host or an unsupported cache-line size; the
    /// model's word and dirty-mask assumptions cannot hold on such targets.
    pub fn new(config: Config) -> Self {
        assert_eq!(
            std::mem::size_of::<usize>(),
            MACHINE_WORD,
            "only 64-bit targets are supported"
        );
        let line = LineSize::new(config.effective_line_bytes());
        let rng = XorShift64::new(config.seed);
        let crash = CrashSim::new(config.verifier.clone(), config.artifact_dir.clone());
        Self {
            line,
            config,
            regions: RegionTable::new(),
            transients: TransientSet::new(),
            cache: StoreCache::new(),
            wbuf: WriteBuffer::new(),
            stacks: StackTable::new(),
            crash,
            rng,
            blocks_entered: 0,
        }
    }

    /// The cache-line size in effect.
    pub fn line(&self) -> LineSize {
        self.line
    }

    /// Registered persistent regions.
    pub fn regions(&self) -> &RegionTable {
        &self.regions
    }

    /// Transient ranges excluded from tracking.
    pub fn transients(&self) -> &TransientSet {
        &self.transients
    }

    /// The simulated cache.
    pub fn cache(&self) -> &StoreCache {
        &self.cache
    }

    /// The simulated write buffer.
    pub fn write_buffer(&self) -> &WriteBuffer {
        &self.wbuf
    }

    /// Interned stacktraces.
    pub fn stacks(&self) -> &StackTable {
        &self.stacks
    }

    /// Verification-run statistics.
    pub fn verification_stats(&self) -> &VerificationStats {
        self.crash.stats()
    }

    /// Number of translated blocks entered so far.
    pub fn blocks_entered(&self) -> u64 {
        self.blocks_entered
    }

    /// Counts entry into a translated block.
    pub fn on_block_entered(&mut self) {
        self.blocks_entered += 1;
    }

    /// Registers a persistent region backed by a file at path `name`.
    ///
    /// # Errors
    ///
    /// Rejects empty names and bases not aligned to the cache-line size.
    pub fn register(&mut self, name: &str, base: u64, size: u64) -> Result<(), ToolError> {
        self.regions.register(name, base, size, self.line)
    }

    /// Removes the region registered under `name`; absent names are a no-op.
    pub fn unregister_by_name(&mut self, name: &str) {
        self.regions.unregister_by_name(name);
    }

    /// Removes the region containing `addr`; a miss is a no-op.
    pub fn unregister_by_addr(&mut self, addr: u64) {
        self.regions.unregister_by_addr(addr);
    }

    /// Marks `[addr, addr + size)` as transient.
    ///
    /// Only recorded when the address lies inside a registered region;
    /// anything else is a silent no-op.
    pub fn add_transient(&mut self, addr: u64, size: u64) {
        if self.regions.lookup(addr).is_none() {
            return;
        }
        self.transients.add(addr, size);
    }

    /// Re-enables crash simulation.
    pub fn crash_enable(&mut self) {
        self.crash.set_enabled(true);
    }

    /// Disables crash simulation globally.
    pub fn crash_disable(&mut self) {
        self.crash.set_enabled(false);
    }

    /// Whether a store to `[addr, addr + size)` must be shadowed.
    fn is_tracked(&self, addr: u64, size: u64) -> bool {
        if self.regions.lookup(addr).is_none() {
            return false;
        }
        !self.transients.contains(addr, size)
    }

    /// Shadows one instrumented store.
    ///
    /// The value arrives widened to a machine word; `size` is the number of
    /// its low bytes actually stored, taken little-endian. Stores crossing a
    /// cache line are trimmed to the leading part with a warning.
    pub fn on_store(&mut self, host: &mut dyn Host, addr: u64, size: u64, value: u64) {
        assert!(
            size as usize <= MACHINE_WORD,
            "store callbacks carry at most one machine word"
        );
        if !self.is_tracked(addr, size) {
            return;
        }

        let line_base = self.line.trim(addr);
        let offset = self.line.offset(addr);
        let mut size = size;
        if offset + size > self.line.bytes() {
            let leading = self.line.bytes() - offset;
            warn!(
                "store of {size} bytes at {addr:#x} crosses a cache line; \
                 tracking only the leading {leading} bytes"
            );
            size = leading;
        }

        let origin = self.stacks.intern(host.stacktrace());
        let bytes = value.to_le_bytes();
        let bytes = &bytes[..size as usize];

        if let Some(entry) = self.cache.get_mut(line_base) {
            entry.store(offset, bytes, origin);
        } else {
            let mut entry = CacheEntry::new(line_base, origin);
            entry.store(offset, bytes, origin);
            self.cache.insert(entry);
            if self.cache.len() > self.config.cache_max {
                self.evict_cache(host);
            }
        }
        self.maybe_crash();
    }

    /// Shadows a cache-line flush; a crash point follows.
    pub fn on_flush(&mut self, host: &dyn Host, addr: u64) {
        self.do_flush(host, addr);
        self.maybe_crash();
    }

    /// Shadows a flush-with-fence instruction.
    ///
    /// The flush and the fence happen with no crash point in between, so a
    /// simulated crash can never see the line flushed but unfenced; that
    /// window does not exist for this instruction.
    pub fn on_flush_fence(&mut self, host: &dyn Host, addr: u64) {
        self.do_flush(host, addr);
        self.drain_fence(host.thread_id());
        self.maybe_crash();
    }

    /// Shadows a store fence, with crash points before and after.
    pub fn on_fence(&mut self, host: &dyn Host) {
        self.maybe_crash();
        self.drain_fence(host.thread_id());
        self.maybe_crash();
    }

    /// Moves the line containing `addr` from the cache to the write buffer.
    fn do_flush(&mut self, host: &dyn Host, addr: u64) {
        let line_base = self.line.trim(addr);
        if let Some(entry) = self.cache.remove(line_base) {
            self.writeback(host, entry);
        }
    }

    /// Hands a cache entry to the write buffer, tagged with the calling thread.
    ///
    /// A pending entry for the same line is collapsed: the older one is
    /// materialized to the backing file first, preserving flush order for
    /// repeated flushes of one line. Exceeding the buffer capacity evicts a
    /// random subset straight to the backing files.
    fn writeback(&mut self, host: &dyn Host, entry: CacheEntry) {
        let tid = host.thread_id();
        if let Some(existing) = self.wbuf.remove(entry.addr) {
            self.write_to_file(&existing.entry);
        }
        self.wbuf.insert(entry, tid);

        if self.wbuf.len() > self.config.wb_max {
            let victims: Vec<u64> = {
                let rng = &mut self.rng;
                let denom = self.config.wb_evict_one_in;
                self.wbuf.lines().filter(|_| rng.one_in(denom)).collect()
            };
            for line in victims {
                if let Some(pending) = self.wbuf.remove(line) {
                    self.write_to_file(&pending.entry);
                }
            }
        }
    }

    /// Evicts a random subset of the cache through the flush path.
    fn evict_cache(&mut self, host: &dyn Host) {
        let victims: Vec<u64> = {
            let rng = &mut self.rng;
            let denom = self.config.cache_evict_one_in;
            self.cache.lines().filter(|_| rng.one_in(denom)).collect()
        };
        for line in victims {
            if let Some(entry) = self.cache.remove(line) {
                self.writeback(host, entry);
            }
        }
    }

    /// Drains every write-buffer entry flushed by `tid` to its backing file.
    fn drain_fence(&mut self, tid: ThreadId) {
        if self.wbuf.is_empty() {
            return;
        }
        for pending in self.wbuf.drain_thread(tid) {
            self.write_to_file(&pending.entry);
        }
    }

    /// Merges an entry's dirty bytes into its region's backing file.
    ///
    /// # Panics
    ///
    /// Panics when no registered region contains the entry's address or when
    /// the backing-file read/write comes up short; both mean the model has
    /// lost a descriptor it depends on.
    fn write_to_file(&self, entry: &CacheEntry) {
        let region = self
            .regions
            .lookup(entry.addr)
            .unwrap_or_else(|| panic!("no descriptor for address {:#x}", entry.addr));

        let len = self.line.bytes() as usize;
        let offset = entry.addr - region.base;
        let mut buf = [0u8; 64];
        if let Err(err) = region.file.read_exact_at(&mut buf[..len], offset) {
            panic!("short read from backing file '{}': {err}", region.name);
        }
        for i in 0..len {
            if entry.dirty & (1u64 << i) != 0 {
                buf[i] = entry.data[i];
            }
        }
        if let Err(err) = region.file.write_all_at(&buf[..len], offset) {
            panic!("short write to backing file '{}': {err}", region.name);
        }
    }

    /// Rolls the crash dice if the simulator is armed.
    pub fn maybe_crash(&mut self) {
        if !self.crash.armed(self.regions.len()) {
            return;
        }
        if self.rng.one_in(self.config.crash_one_in) {
            self.simulate_crash();
        }
    }

    /// Simulates a crash unconditionally: fork, run the verifier against the
    /// backing files, record the outcome.
    ///
    /// Forcing a crash without a verifier or without registered regions is a
    /// user error, reported and ignored.
    pub fn simulate_crash(&mut self) {
        if self.crash.verifier().is_none() {
            error!("{}", ToolError::NoVerifier);
            return;
        }
        if self.regions.is_empty() {
            error!("{}", ToolError::NoRegions);
            return;
        }
        let dump = report::render_dump(self);
        self.crash.simulate(&self.regions, &dump);
    }

    /// Final lifecycle callback: prints the leak report and verification stats.
    pub fn fini(&self) {
        report::print_report(self);
    }
}
