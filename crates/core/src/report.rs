//! Leak reporting and the final dump.
//!
//! Two renderings of the same information:
//! 1. **The exit report** printed to stdout by `fini`: leaked lines grouped
//!    by origin stacktrace, the verification tally, and the timing block.
//! 2. **The dump file** written for each simulated crash
//!    (`bad-verification-<k>.dump`): the same leak groups without the tally.
//!
//! Lines sharing an origin (under the canonical stacktrace comparison) are
//! reported once, so each bug site appears a single time however many lines
//! it dirtied.

use std::fmt::Write;

use crate::model::cache::CacheEntry;
use crate::model::engine::PmemOps;
use crate::stack::{StackTable, Stacktrace, TraceId};
use crate::stats::format_scientific;

/// Renders the dump-file variant of the leak report.
pub fn render_dump(ops: &PmemOps) -> String {
    let mut out = String::new();
    write_unpersisted(ops, &mut out);
    write_unfenced(ops, &mut out, false);
    out
}

/// Renders the exit report: leaks, verification tally, timing block.
pub fn render_report(ops: &PmemOps) -> String {
    let mut out = String::new();
    write_unpersisted(ops, &mut out);
    write_unfenced(ops, &mut out, true);

    let stats = ops.verification_stats();
    let _ = writeln!(
        out,
        "{} out of {} verifications failed...",
        stats.failures, stats.runs
    );
    if stats.runs > 0 {
        let _ = writeln!(out, "Verification Function Stats (seconds):");
        let _ = writeln!(out, "\tMinimum:{}", format_scientific(stats.min_seconds));
        let _ = writeln!(out, "\tMaximum:{}", format_scientific(stats.max_seconds));
        let _ = writeln!(out, "\tMean:{}", format_scientific(stats.mean()));
        let _ = writeln!(out, "\tVariance:{}", format_scientific(stats.variance()));
    }
    out
}

/// Prints the exit report to stdout.
pub fn print_report(ops: &PmemOps) {
    print!("{}", render_report(ops));
}

/// Writes the "not made persistent" section: every line still in the cache.
fn write_unpersisted(ops: &PmemOps, out: &mut String) {
    let _ = writeln!(
        out,
        "Number of cache-lines not made persistent: {}",
        ops.cache().len()
    );
    for entry in unique_origins(ops.stacks(), ops.cache().iter()) {
        write_group(ops, entry, out, None);
    }
}

/// Writes the "flushed but not fenced" section: every write-buffer entry.
fn write_unfenced(ops: &PmemOps, out: &mut String, with_address: bool) {
    let _ = writeln!(
        out,
        "Number of cache-lines flushed but not fenced: {}",
        ops.write_buffer().len()
    );
    let entries = ops.write_buffer().iter().map(|pending| &pending.entry);
    for entry in unique_origins(ops.stacks(), entries) {
        let address = with_address.then_some(entry.addr);
        write_group(ops, entry, out, address);
    }
}

/// Writes one origin group: region header, fences, stacktrace.
fn write_group(ops: &PmemOps, entry: &CacheEntry, out: &mut String, address: Option<u64>) {
    let region = ops
        .regions()
        .lookup(entry.addr)
        .unwrap_or_else(|| panic!("no descriptor for address {:#x}", entry.addr));
    match address {
        Some(addr) => {
            let _ = writeln!(
                out,
                "Leaked Cache-Line at address {addr:#x} belonging to file '{}'",
                region.name
            );
        }
        None => {
            let _ = writeln!(out, "['{}']", region.name);
        }
    }
    let _ = writeln!(out, "~~~~~~~~~~~~~~~");
    write_trace(ops.stacks().get(entry.origin), out);
    let _ = writeln!(out, "~~~~~~~~~~~~~~~");
}

/// Writes a stacktrace in `at`/`by` form, innermost frame first.
fn write_trace(trace: &Stacktrace, out: &mut String) {
    for (n, frame) in trace.frames.iter().enumerate() {
        let lead = if n == 0 { "at" } else { "by" };
        let _ = writeln!(out, "   {lead} {:#018x}: {}", frame.ip, frame.symbol);
    }
}

/// Filters entries down to one representative per canonical origin.
fn unique_origins<'a>(
    stacks: &StackTable,
    entries: impl Iterator<Item = &'a CacheEntry>,
) -> Vec<&'a CacheEntry> {
    let mut seen: Vec<TraceId> = Vec::new();
    let mut unique = Vec::new();
    for entry in entries {
        if seen.iter().any(|&id| stacks.canonical_eq(id, entry.origin)) {
            continue;
        }
        seen.push(entry.origin);
        unique.push(entry);
    }
    unique
}
