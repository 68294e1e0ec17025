//! Persistence-checker trace-replay CLI.
//!
//! This binary stands in for the host binary-translation framework: it reads
//! a JSON event trace and delivers each event to the tool exactly as the
//! framework's instrumentation callbacks and client-request channel would.
//! On exit it prints the leak report and verification statistics.
//!
//! Examples:
//!   pmat traces/queue.json
//!   pmat --pmat-verifier=./verify_queue traces/queue.json
//!   RUST_LOG=pmat_core=debug pmat --seed 7 traces/queue.json

mod trace;

use std::fs;
use std::path::PathBuf;
use std::process;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use pmat_core::client::{self, Request};
use pmat_core::{Config, PmemOps};

use crate::trace::{ReplayHost, TraceEvent};

#[derive(Parser, Debug)]
#[command(
    name = "pmat",
    author,
    version,
    about = "Persistent-memory analysis tool (trace replay driver)",
    long_about = "Replays a JSON event trace through the persistence model.\n\nWithout --pmat-verifier, crash simulation is suppressed and only the final\nleak report is produced.\n\nExamples:\n  pmat traces/queue.json\n  pmat --pmat-verifier=./verify_queue --seed 7 traces/queue.json"
)]
struct Cli {
    /// Verifier to call when simulating a crash (default: no verification).
    #[arg(long = "pmat-verifier", value_name = "PATH")]
    pmat_verifier: Option<PathBuf>,

    /// PRNG seed; identical seeds replay identical eviction and crash choices.
    #[arg(long)]
    seed: Option<u64>,

    /// JSON config file overriding the built-in defaults.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Event trace to replay.
    trace: PathBuf,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => match Config::from_file(path) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("Error: {err}");
                process::exit(1);
            }
        },
        None => Config::default(),
    };
    if let Some(seed) = cli.seed {
        config.seed = seed;
    }
    if cli.pmat_verifier.is_some() {
        config.verifier = cli.pmat_verifier.clone();
    }

    let events = load_trace(&cli.trace);
    let mut ops = PmemOps::new(config);
    let mut host = ReplayHost::new();

    for (position, event) in events.iter().enumerate() {
        host.advance(position as u64, event.tid());
        replay_event(&mut ops, &mut host, event);
    }

    ops.fini();
}

/// Reads and parses the trace file, exiting on malformed input.
fn load_trace(path: &PathBuf) -> Vec<TraceEvent> {
    let text = fs::read_to_string(path).unwrap_or_else(|err| {
        eprintln!("Error reading trace {}: {err}", path.display());
        process::exit(1);
    });
    serde_json::from_str(&text).unwrap_or_else(|err| {
        eprintln!("Error parsing trace {}: {err}", path.display());
        process::exit(1);
    })
}

/// Delivers one event the way the host framework would.
fn replay_event(ops: &mut PmemOps, host: &mut ReplayHost, event: &TraceEvent) {
    match event {
        TraceEvent::Store {
            addr, size, value, ..
        } => {
            if *size == 0 || *size > 8 {
                tracing::warn!("skipping store of unsupported size {size}");
                return;
            }
            ops.on_store(host, *addr, *size, *value);
        }
        TraceEvent::Flush { addr, .. } => ops.on_flush(host, *addr),
        TraceEvent::FlushFence { addr, .. } => ops.on_flush_fence(host, *addr),
        TraceEvent::Fence { .. } => ops.on_fence(host),
        TraceEvent::Register { name, addr, size } => {
            let _ = client::handle(
                ops,
                host,
                Request::Register {
                    name,
                    addr: *addr,
                    size: *size,
                },
            );
        }
        TraceEvent::Transient { addr, size } => {
            let _ = client::handle(
                ops,
                host,
                Request::Transient {
                    addr: *addr,
                    size: *size,
                },
            );
        }
        TraceEvent::UnregisterByName { name } => {
            let _ = client::handle(ops, host, Request::UnregisterByName { name });
        }
        TraceEvent::UnregisterByAddr { addr } => {
            let _ = client::handle(ops, host, Request::UnregisterByAddr { addr: *addr });
        }
        TraceEvent::CrashEnable => {
            let _ = client::handle(ops, host, Request::CrashEnable);
        }
        TraceEvent::CrashDisable => {
            let _ = client::handle(ops, host, Request::CrashDisable);
        }
        TraceEvent::ForceCrash => {
            let _ = client::handle(ops, host, Request::ForceSimulateCrash);
        }
    }
}
