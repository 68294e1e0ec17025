//! Client-request codes and the request dispatcher.
//!
//! The guest program talks to the tool through an in-band request protocol.
//! The request codes are an ABI: their integer values are stable, never
//! reordered, never deleted — new codes are appended, and retired slots stay
//! reserved as warning no-ops. The dispatcher routes recognized codes to the
//! engine and answers a GDB-monitor command channel for interactive
//! inspection.

use tracing::{error, warn};

use crate::host::Host;
use crate::model::engine::PmemOps;

/// Base of the tool's client-request code space (`'P' << 24 | 'C' << 16`).
pub const REQUEST_BASE: u64 = 0x5043_0000;

/// Stable client-request codes.
///
/// The declaration order is the ABI; `Reserved6` genuinely sits after
/// `Reserved8` and must stay there.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u64)]
pub enum RequestCode {
    /// Flush a cache line.
    DoFlush = REQUEST_BASE,
    /// Store fence.
    DoFence,
    /// Reserved slot; do not use.
    Reserved1,
    /// Historical statistics dump; deprecated no-op.
    WriteStats,
    /// Reserved slot; do not use.
    Reserved2,
    /// Reserved slot; do not use.
    Reserved3,
    /// Reserved slot; do not use.
    Reserved4,
    /// Reserved slot; do not use.
    Reserved5,
    /// Reserved slot; do not use.
    Reserved7,
    /// Reserved slot; do not use.
    Reserved8,
    /// Reserved slot; do not use.
    Reserved6,
    /// Register a persistent region.
    Register,
    /// Unregister a region by name.
    UnregisterByName,
    /// Unregister a region by address.
    UnregisterByAddr,
    /// Force a simulated crash now.
    ForceSimulateCrash,
    /// Disable crash simulation.
    CrashDisable,
    /// Enable crash simulation.
    CrashEnable,
    /// Mark a range transient.
    Transient,
}

impl RequestCode {
    /// Decodes a raw request code.
    pub fn from_raw(code: u64) -> Option<Self> {
        if !(REQUEST_BASE..=REQUEST_BASE + 17).contains(&code) {
            return None;
        }
        Some(match code - REQUEST_BASE {
            0 => Self::DoFlush,
            1 => Self::DoFence,
            2 => Self::Reserved1,
            3 => Self::WriteStats,
            4 => Self::Reserved2,
            5 => Self::Reserved3,
            6 => Self::Reserved4,
            7 => Self::Reserved5,
            8 => Self::Reserved7,
            9 => Self::Reserved8,
            10 => Self::Reserved6,
            11 => Self::Register,
            12 => Self::UnregisterByName,
            13 => Self::UnregisterByAddr,
            14 => Self::ForceSimulateCrash,
            15 => Self::CrashDisable,
            16 => Self::CrashEnable,
            17 => Self::Transient,
            _ => unreachable!(),
        })
    }

    /// Whether this slot is reserved or deprecated.
    pub fn is_reserved(self) -> bool {
        matches!(
            self,
            Self::Reserved1
                | Self::Reserved2
                | Self::Reserved3
                | Self::Reserved4
                | Self::Reserved5
                | Self::Reserved6
                | Self::Reserved7
                | Self::Reserved8
                | Self::WriteStats
        )
    }
}

/// A decoded client request.
///
/// The host shim resolves pointer arguments (names, monitor command strings)
/// before handing the request over; codes it cannot type land in [`Request::Raw`].
#[derive(Clone, Copy, Debug)]
pub enum Request<'a> {
    /// Flush the line containing `addr`.
    DoFlush {
        /// Address inside the line to flush.
        addr: u64,
        /// Length of the flushed range (currently only the leading line is modeled).
        len: u64,
    },
    /// Store fence on the calling thread.
    DoFence,
    /// Register a persistent region backed by a file at path `name`.
    Register {
        /// Region name; also the backing-file path.
        name: &'a str,
        /// Line-aligned base address.
        addr: u64,
        /// Region size in bytes.
        size: u64,
    },
    /// Unregister the region named `name`.
    UnregisterByName {
        /// Name the region was registered under.
        name: &'a str,
    },
    /// Unregister the region containing `addr`.
    UnregisterByAddr {
        /// Any address inside the region.
        addr: u64,
    },
    /// Simulate a crash right now, regardless of probability.
    ForceSimulateCrash,
    /// Disable crash simulation globally.
    CrashDisable,
    /// Re-enable crash simulation.
    CrashEnable,
    /// Mark `[addr, addr + size)` transient.
    Transient {
        /// Base of the transient range.
        addr: u64,
        /// Size of the transient range.
        size: u64,
    },
    /// A reserved or unknown raw request code.
    Raw {
        /// The raw code as received.
        code: u64,
    },
    /// A GDB-monitor command line.
    Monitor {
        /// The command text.
        command: &'a str,
    },
}

/// Whether the dispatcher handled a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Recognized and executed.
    Handled,
    /// Rejected, reserved, or unknown.
    NotHandled,
}

/// Dispatches one client request to the engine.
pub fn handle(ops: &mut PmemOps, host: &mut dyn Host, request: Request<'_>) -> Outcome {
    match request {
        Request::DoFlush { addr, len: _ } => {
            ops.on_flush(host, addr);
            Outcome::Handled
        }
        Request::DoFence => {
            ops.on_fence(host);
            Outcome::Handled
        }
        Request::Register { name, addr, size } => match ops.register(name, addr, size) {
            Ok(()) => Outcome::Handled,
            Err(err) => {
                error!("{err}");
                Outcome::NotHandled
            }
        },
        Request::UnregisterByName { name } => {
            ops.unregister_by_name(name);
            Outcome::Handled
        }
        Request::UnregisterByAddr { addr } => {
            ops.unregister_by_addr(addr);
            Outcome::Handled
        }
        Request::ForceSimulateCrash => {
            ops.simulate_crash();
            Outcome::Handled
        }
        Request::CrashDisable => {
            ops.crash_disable();
            Outcome::Handled
        }
        Request::CrashEnable => {
            ops.crash_enable();
            Outcome::Handled
        }
        Request::Transient { addr, size } => {
            ops.add_transient(addr, size);
            Outcome::Handled
        }
        Request::Raw { code } => {
            match RequestCode::from_raw(code) {
                Some(known) if known.is_reserved() => {
                    warn!("deprecated client request code {code:#x}");
                }
                _ => {
                    warn!("unknown client request code {code:#x}");
                }
            }
            Outcome::NotHandled
        }
        Request::Monitor { command } => handle_monitor(ops, command),
    }
}

/// Handles one GDB-monitor command line.
fn handle_monitor(ops: &PmemOps, command: &str) -> Outcome {
    let keyword = command.split_whitespace().next().unwrap_or("");
    match keyword {
        "help" => {
            println!();
            println!("pmat monitor commands:");
            println!("  print_stats");
            println!("        prints the summary");
            println!("  print_pmem_regions");
            println!("        prints the registered persistent memory regions");
            println!();
            Outcome::Handled
        }
        "print_stats" => {
            let stats = ops.verification_stats();
            println!(
                "Number of cache-lines not made persistent: {}",
                ops.cache().len()
            );
            println!(
                "Number of cache-lines flushed but not fenced: {}",
                ops.write_buffer().len()
            );
            println!(
                "{} out of {} verifications failed...",
                stats.failures, stats.runs
            );
            Outcome::Handled
        }
        "print_pmem_regions" => {
            for region in ops.regions().iter() {
                println!(
                    "['{}'] base={:#x} size={:#x}",
                    region.name, region.base, region.size
                );
            }
            Outcome::Handled
        }
        _ => Outcome::NotHandled,
    }
}
