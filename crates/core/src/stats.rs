//! Run statistics collection and reporting.
//!
//! This module tracks the counters a memory-subsystem simulation run cares
//! about. It provides:
//! 1. **Throughput:** issued commands by category, completed reads/writes,
//!    and derived rates.
//! 2. **Mode residency:** per-pseudo-channel cycle counts in each
//!    `mc_db_mode`/`db_dram_mode` combination.
//! 3. **Refresh:** all-bank and same-bank refresh counts.
//! 4. **NDP:** launch-buffer writes, control-register starts, and
//!    NDP-addressed command counts.
//! 5. **Rejections:** `send()` calls that failed for lack of buffer room.

use std::collections::BTreeMap;
use std::time::Instant;

use serde::Serialize;

use crate::common::command::Command;
use crate::controller::{IssuedEvent, MemoryController};
use crate::system::SystemTickOutcome;

/// Run statistics, accumulated tick by tick via [`SimStats::record_tick`].
#[derive(Clone)]
pub struct SimStats {
    start_time: Instant,
    /// Total DRAM cycles simulated.
    pub cycles: u64,

    /// Host reads issued (`RD`/`RDA`).
    pub issued_rd: u64,
    /// Host writes issued (`WR`/`WRA`).
    pub issued_wr: u64,
    /// Row activations issued (`ACT`/`PACT`).
    pub issued_act: u64,
    /// Precharges issued (`PRE`/`PREA`/`PPRE`/`PRESB`).
    pub issued_pre: u64,
    /// Data-buffer stage-1 commands issued (`PRE_RD`/`PRE_WR`/`PRE_RDA`).
    pub issued_db_stage1: u64,
    /// Data-buffer stage-2 commands issued (`POST_RD`/`POST_WR`/`POST_WRA`).
    pub issued_db_stage2: u64,
    /// NDP control-plane accesses issued (`NDP_DB_RD`/`NDP_DB_WR`).
    pub issued_ndp_db: u64,
    /// NDP DRAM-side accesses issued (`NDP_DRAM_RD`/`NDP_DRAM_WR` and their
    /// auto-precharge variants).
    pub issued_ndp_dram: u64,
    /// All-bank refreshes issued.
    pub issued_refab: u64,
    /// Same-bank refreshes issued.
    pub issued_refsb: u64,

    /// Host reads that retired.
    pub completed_rd: u64,
    /// Host writes that retired.
    pub completed_wr: u64,

    /// `send()` calls rejected for lack of buffer room, host-facing and
    /// NDP-facing combined.
    pub rejected_sends: u64,

    /// Words accepted into a DIMM launch buffer.
    pub ndp_launch_words: u64,
    /// NDP-unit starts (non-zero control-register writes).
    pub ndp_starts: u64,

    /// Cycles each `(channel, pseudochannel)` spent in each
    /// `mc_db_mode`/`db_dram_mode` pair, keyed `"ch{ch}/pch{pch}/{mode}"`.
    /// For any one `(channel, pseudochannel)`, these sum to the number of
    /// [`SimStats::record_mode_residency`] calls made so far.
    pub mode_cycles: BTreeMap<String, u64>,
}

impl Default for SimStats {
    fn default() -> Self {
        Self {
            start_time: Instant::now(),
            cycles: 0,
            issued_rd: 0,
            issued_wr: 0,
            issued_act: 0,
            issued_pre: 0,
            issued_db_stage1: 0,
            issued_db_stage2: 0,
            issued_ndp_db: 0,
            issued_ndp_dram: 0,
            issued_refab: 0,
            issued_refsb: 0,
            completed_rd: 0,
            completed_wr: 0,
            rejected_sends: 0,
            ndp_launch_words: 0,
            ndp_starts: 0,
            mode_cycles: BTreeMap::new(),
        }
    }
}

fn bucket(command: Command) -> fn(&mut SimStats) -> &mut u64 {
    match command {
        Command::Rd | Command::Rda => |s| &mut s.issued_rd,
        Command::Wr | Command::Wra => |s| &mut s.issued_wr,
        Command::Act | Command::PAct => |s| &mut s.issued_act,
        Command::Pre | Command::Prea | Command::PPre | Command::Presb => |s| &mut s.issued_pre,
        Command::PreRd | Command::PreWr | Command::PreRda => |s| &mut s.issued_db_stage1,
        Command::PostRd | Command::PostWr | Command::PostWra => |s| &mut s.issued_db_stage2,
        Command::NdpDbRd | Command::NdpDbWr => |s| &mut s.issued_ndp_db,
        Command::NdpDramRd | Command::NdpDramWr | Command::NdpDramRda | Command::NdpDramWra => {
            |s| &mut s.issued_ndp_dram
        }
        Command::Refab | Command::RefabEnd => |s| &mut s.issued_refab,
        Command::Refsb | Command::RefsbEnd => |s| &mut s.issued_refsb,
        Command::Rfm | Command::Drfm => |s| &mut s.issued_pre,
    }
}

impl SimStats {
    /// Folds one [`SystemTickOutcome`] (one per-channel `tick()` result) into
    /// the running totals. Call once per simulated cycle.
    pub fn record_tick(&mut self, outcome: &SystemTickOutcome) {
        self.cycles += 1;
        for channel in outcome {
            if let Some(IssuedEvent { command, .. }) = channel.issued {
                *bucket(command)(self) += 1;
            }
            for completion in &channel.completions {
                use crate::common::request::ReqType;
                match completion.kind {
                    ReqType::Read => self.completed_rd += 1,
                    ReqType::Write => self.completed_wr += 1,
                }
            }
        }
    }

    /// Records one `send()` call that a buffer rejected.
    pub fn record_rejected_send(&mut self) {
        self.rejected_sends += 1;
    }

    /// Records `words` landing in a DIMM launch buffer.
    pub fn record_launch_words(&mut self, words: usize) {
        self.ndp_launch_words += words as u64;
    }

    /// Records an NDP-unit start (non-zero control-register write).
    pub fn record_ndp_start(&mut self) {
        self.ndp_starts += 1;
    }

    /// Samples every controller's current `(mc_db_mode, db_dram_mode)` and
    /// adds one cycle to that pseudo-channel's bucket. Call once per
    /// simulated cycle, alongside [`SimStats::record_tick`]: across a fixed
    /// window, a given pseudo-channel's buckets sum to the number of calls
    /// made for it.
    pub fn record_mode_residency(&mut self, controllers: &[MemoryController]) {
        for (ch, pch, mode) in mode_snapshot(controllers) {
            *self.mode_cycles.entry(format!("ch{ch}/pch{pch}/{mode}")).or_insert(0) += 1;
        }
    }

    /// Host-visible read/write latency proxy: completed requests per issued
    /// request, across both kinds. Not a real cycle count, just a quick
    /// health signal for `--stats-out`.
    #[must_use]
    pub fn completion_ratio(&self) -> f64 {
        let issued = (self.issued_rd + self.issued_wr).max(1);
        (self.completed_rd + self.completed_wr) as f64 / issued as f64
    }

    /// Serializable snapshot for `--stats-out`.
    #[must_use]
    pub fn to_report(&self) -> Report {
        let seconds = self.start_time.elapsed().as_secs_f64();
        Report {
            cycles: self.cycles,
            host_seconds: seconds,
            sim_khz: if seconds > 0.0 { (self.cycles as f64 / seconds) / 1000.0 } else { 0.0 },
            issued_rd: self.issued_rd,
            issued_wr: self.issued_wr,
            issued_act: self.issued_act,
            issued_pre: self.issued_pre,
            issued_db_stage1: self.issued_db_stage1,
            issued_db_stage2: self.issued_db_stage2,
            issued_ndp_db: self.issued_ndp_db,
            issued_ndp_dram: self.issued_ndp_dram,
            issued_refab: self.issued_refab,
            issued_refsb: self.issued_refsb,
            completed_rd: self.completed_rd,
            completed_wr: self.completed_wr,
            rejected_sends: self.rejected_sends,
            ndp_launch_words: self.ndp_launch_words,
            ndp_starts: self.ndp_starts,
            completion_ratio: self.completion_ratio(),
            mode_cycles: self.mode_cycles.clone(),
        }
    }

    /// Prints a human-readable summary to stdout.
    pub fn print(&self) {
        let report = self.to_report();
        println!("==========================================================");
        println!("MEMORY SYSTEM SIMULATION STATISTICS");
        println!("==========================================================");
        println!("host_seconds             {:.4} s", report.host_seconds);
        println!("sim_cycles               {}", report.cycles);
        println!("sim_freq                 {:.2} kHz", report.sim_khz);
        println!("----------------------------------------------------------");
        println!("ISSUED COMMANDS");
        println!("  rd                     {}", report.issued_rd);
        println!("  wr                     {}", report.issued_wr);
        println!("  act                    {}", report.issued_act);
        println!("  pre                    {}", report.issued_pre);
        println!("  db_stage1              {}", report.issued_db_stage1);
        println!("  db_stage2              {}", report.issued_db_stage2);
        println!("  ndp_db                 {}", report.issued_ndp_db);
        println!("  ndp_dram               {}", report.issued_ndp_dram);
        println!("  refab                  {}", report.issued_refab);
        println!("  refsb                  {}", report.issued_refsb);
        println!("----------------------------------------------------------");
        println!("COMPLETIONS");
        println!("  rd                     {}", report.completed_rd);
        println!("  wr                     {}", report.completed_wr);
        println!("  completion_ratio       {:.4}", report.completion_ratio);
        println!("----------------------------------------------------------");
        println!("NDP");
        println!("  launch_words           {}", report.ndp_launch_words);
        println!("  starts                 {}", report.ndp_starts);
        println!("----------------------------------------------------------");
        println!("REJECTED SENDS          {}", report.rejected_sends);
        if !report.mode_cycles.is_empty() {
            println!("----------------------------------------------------------");
            println!("MODE RESIDENCY (cycles)");
            for (key, cycles) in &report.mode_cycles {
                println!("  {key:<24} {cycles}");
            }
        }
        println!("==========================================================");
    }
}

/// Current `(pseudochannel, mc_db_mode, db_dram_mode)` snapshot across every
/// controller, for a point-in-time report rather than a cycle histogram.
#[must_use]
pub fn mode_snapshot(controllers: &[MemoryController]) -> Vec<(i64, i64, String)> {
    controllers
        .iter()
        .enumerate()
        .flat_map(|(ch, c)| c.modes().map(move |(pch, mc_db, db_dram)| (ch as i64, pch, format!("{mc_db:?}/{db_dram:?}"))))
        .collect()
}

/// JSON-serializable snapshot of [`SimStats`], written by `--stats-out`.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    /// Total DRAM cycles simulated.
    pub cycles: u64,
    /// Wall-clock seconds the run took.
    pub host_seconds: f64,
    /// Simulated clock frequency, in kHz.
    pub sim_khz: f64,
    /// Host reads issued.
    pub issued_rd: u64,
    /// Host writes issued.
    pub issued_wr: u64,
    /// Row activations issued.
    pub issued_act: u64,
    /// Precharges issued.
    pub issued_pre: u64,
    /// Data-buffer stage-1 commands issued.
    pub issued_db_stage1: u64,
    /// Data-buffer stage-2 commands issued.
    pub issued_db_stage2: u64,
    /// NDP control-plane accesses issued.
    pub issued_ndp_db: u64,
    /// NDP DRAM-side accesses issued.
    pub issued_ndp_dram: u64,
    /// All-bank refreshes issued.
    pub issued_refab: u64,
    /// Same-bank refreshes issued.
    pub issued_refsb: u64,
    /// Host reads that retired.
    pub completed_rd: u64,
    /// Host writes that retired.
    pub completed_wr: u64,
    /// `send()` calls rejected for lack of buffer room.
    pub rejected_sends: u64,
    /// Words accepted into a DIMM launch buffer.
    pub ndp_launch_words: u64,
    /// NDP-unit starts.
    pub ndp_starts: u64,
    /// Completed-over-issued ratio across reads and writes.
    pub completion_ratio: f64,
    /// Cycles each `(channel, pseudochannel)` spent in each mode pair.
    pub mode_cycles: BTreeMap<String, u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::{CompletionRecord, TickOutcome};
    use crate::common::request::ReqType;

    #[test]
    fn record_tick_counts_issued_and_completed() {
        let mut stats = SimStats::default();
        let outcome = vec![TickOutcome {
            completions: vec![CompletionRecord { pch: 0, kind: ReqType::Read }],
            issued: Some(IssuedEvent { pch: 0, command: Command::Rd }),
        }];
        stats.record_tick(&outcome);
        assert_eq!(stats.cycles, 1);
        assert_eq!(stats.issued_rd, 1);
        assert_eq!(stats.completed_rd, 1);
    }

    #[test]
    fn completion_ratio_is_bounded_by_one_on_a_balanced_run() {
        let mut stats = SimStats::default();
        stats.issued_rd = 10;
        stats.completed_rd = 10;
        assert!((stats.completion_ratio() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn rejected_sends_launch_words_and_starts_accumulate_independently() {
        let mut stats = SimStats::default();
        stats.record_rejected_send();
        stats.record_rejected_send();
        stats.record_launch_words(8);
        stats.record_ndp_start();
        assert_eq!(stats.rejected_sends, 2);
        assert_eq!(stats.ndp_launch_words, 8);
        assert_eq!(stats.ndp_starts, 1);
    }

    #[test]
    fn mode_residency_sums_to_the_number_of_samples_taken() {
        use crate::config::Config;

        let controllers = vec![MemoryController::new(0, &Config::default())];
        let mut stats = SimStats::default();
        for _ in 0..5 {
            stats.record_mode_residency(&controllers);
        }
        let total: u64 = stats
            .mode_cycles
            .iter()
            .filter(|(key, _)| key.starts_with("ch0/pch0/"))
            .map(|(_, count)| *count)
            .sum();
        assert_eq!(total, 5);
    }
}
