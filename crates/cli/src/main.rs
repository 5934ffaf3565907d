//! DDR5 pseudo-channel/NDP memory-subsystem simulator CLI.
//!
//! This binary provides a single entry point for driving a
//! [`pch_ndp_sim_core::system::MemorySystem`] from the command line:
//! 1. **Run:** boot a system from a JSON config (or defaults), optionally
//!    inject a load/store trace, and tick it until it drains or a cycle
//!    limit is hit.
//! 2. **Stats:** print a human-readable summary, and optionally write a
//!    JSON report for downstream tooling.

use std::{fs, process};

use clap::{Parser, Subcommand};
use pch_ndp_sim_core::config::Config;
use pch_ndp_sim_core::stats::SimStats;
use pch_ndp_sim_core::system::MemorySystem;
use pch_ndp_sim_core::trace::parse_trace;

#[derive(Parser, Debug)]
#[command(
    name = "pch-ndp-sim",
    author,
    version,
    about = "Cycle-accurate DDR5 pseudo-channel + NDP memory subsystem simulator"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a simulation, optionally driven by a load/store trace.
    Run {
        /// JSON configuration file; falls back to built-in defaults.
        #[arg(long)]
        config: Option<String>,

        /// Load/store trace file to inject.
        #[arg(long)]
        trace: Option<String>,

        /// Stop after this many cycles even if the system never drains.
        #[arg(long)]
        max_cycles: Option<u64>,

        /// Write a JSON stats report to this path.
        #[arg(long)]
        stats_out: Option<String>,
    },
}

fn main() {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            config,
            trace,
            max_cycles,
            stats_out,
        } => cmd_run(config, trace, max_cycles, stats_out),
    }
}

fn load_config(path: Option<&str>) -> Config {
    let Some(path) = path else {
        return Config::default();
    };
    let text = fs::read_to_string(path).unwrap_or_else(|e| {
        eprintln!("error reading config {path}: {e}");
        process::exit(1);
    });
    serde_json::from_str(&text).unwrap_or_else(|e| {
        eprintln!("error parsing config {path}: {e}");
        process::exit(1);
    })
}

fn cmd_run(config_path: Option<String>, trace_path: Option<String>, max_cycles: Option<u64>, stats_out: Option<String>) {
    let config = load_config(config_path.as_deref());
    let mut system = MemorySystem::new(config).unwrap_or_else(|e| {
        eprintln!("error resolving configuration: {e}");
        process::exit(1);
    });

    if let Some(path) = &trace_path {
        let text = fs::read_to_string(path).unwrap_or_else(|e| {
            eprintln!("error reading trace {path}: {e}");
            process::exit(1);
        });
        let entries = parse_trace(&text).unwrap_or_else(|e| {
            eprintln!("error parsing trace {path}: {e}");
            process::exit(1);
        });
        tracing::info!(entries = entries.len(), path, "loaded trace");
        system.load_trace(entries);
    }

    let mut stats = SimStats::default();
    loop {
        if let Some(limit) = max_cycles {
            if system.clk() >= limit {
                break;
            }
        }
        if system.is_finished() {
            break;
        }
        match system.tick() {
            Ok(outcome) => {
                stats.record_tick(&outcome);
                stats.record_mode_residency(system.controllers());
            }
            Err(e) => {
                eprintln!("fatal error at cycle {}: {e}", system.clk());
                process::exit(1);
            }
        }
    }

    stats.rejected_sends = system.rejected_sends();
    stats.ndp_launch_words = system.ndp_launch_words();
    stats.ndp_starts = system.ndp_starts();

    stats.print();

    if let Some(path) = stats_out {
        let report = stats.to_report();
        let json = serde_json::to_string_pretty(&report).unwrap_or_else(|e| {
            eprintln!("error serializing stats: {e}");
            process::exit(1);
        });
        fs::write(&path, json).unwrap_or_else(|e| {
            eprintln!("error writing stats to {path}: {e}");
            process::exit(1);
        });
    }
}
