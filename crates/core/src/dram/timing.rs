//! The JEDEC timing-constraint table.
//!
//! A flat list of rules of the form `{scope_level, preceding_commands,
//! following_commands, latency, window?, is_sibling?}`. `sibling_group_level`
//! generalizes `is_sibling` to say *which* ancestor level the affected
//! siblings share — e.g. same-bank-group column spacing vs. same-rank
//! activation spacing both scope at `Bank` but group at different
//! ancestors.

use std::collections::HashMap;

use crate::common::command::Command;
use crate::common::coord::{CoordVec, Level};
use crate::config::TimingConfig;
use crate::dram::node::NodeArena;

/// One timing-constraint rule.
pub struct TimingRule {
    /// The level at which `preceding` commands are issued.
    pub scope_level: Level,
    /// When `is_sibling`, the ancestor level whose children share this
    /// constraint; ignored otherwise.
    pub sibling_group_level: Level,
    /// Commands that trigger this rule on issue.
    pub preceding: Vec<Command>,
    /// Commands forbidden until `latency` cycles after the triggering issue.
    pub following: Vec<Command>,
    /// Cycles to wait.
    pub latency: u64,
    /// When set, the rule applies to the `window`-th previous issue rather
    /// than the most recent one (four-activation-window style).
    pub window: Option<u32>,
    /// Whether the restriction also applies to sibling nodes, not just the
    /// issuing node itself.
    pub is_sibling: bool,
}

/// Per-group issue history, used only by windowed rules. Keyed by the
/// group level a window is tracked at (e.g. per-rank for `nFAW`) plus the
/// group's flat index, so activations anywhere in the group count toward
/// the same window.
#[derive(Default)]
pub struct IssueHistory {
    history: HashMap<(Level, usize, Command), Vec<u64>>,
}

impl IssueHistory {
    fn record(&mut self, group_level: Level, group_idx: usize, cmd: Command, clk: u64, keep: usize) {
        let entries = self.history.entry((group_level, group_idx, cmd)).or_default();
        entries.push(clk);
        let drop = entries.len().saturating_sub(keep);
        if drop > 0 {
            let _ = entries.drain(0..drop);
        }
    }

    fn nth_previous(&self, group_level: Level, group_idx: usize, cmd: Command, window: u32) -> Option<u64> {
        let entries = self.history.get(&(group_level, group_idx, cmd))?;
        let window = window as usize;
        if entries.len() < window {
            return None;
        }
        Some(entries[entries.len() - window])
    }
}

/// The full timing-constraint table for one organization/timing preset.
pub struct TimingTable {
    rules: Vec<TimingRule>,
}

impl TimingTable {
    /// Builds the DDR5 pCH ruleset from resolved JEDEC parameters.
    #[must_use]
    pub fn from_config(timing: &TimingConfig) -> Self {
        use Command::{Act, NdpDramRd, PAct, Pre, PreRd, PreWr, Prea, Rd, Wr};

        let rules = vec![
            // ACT -> RD/WR family: nRCD, same bank only.
            TimingRule {
                scope_level: Level::Bank,
                sibling_group_level: Level::Bank,
                preceding: vec![Act, PAct],
                following: vec![
                    Rd,
                    Wr,
                    Command::Rda,
                    Command::Wra,
                    PreRd,
                    PreWr,
                    Command::PreRda,
                    NdpDramRd,
                    Command::NdpDramWr,
                    Command::NdpDramRda,
                    Command::NdpDramWra,
                ],
                latency: timing.n_rcd,
                window: None,
                is_sibling: false,
            },
            // ACT -> PRE: nRAS, same bank only.
            TimingRule {
                scope_level: Level::Bank,
                sibling_group_level: Level::Bank,
                preceding: vec![Act, PAct],
                following: vec![Pre, Prea, Command::PPre],
                latency: timing.n_ras,
                window: None,
                is_sibling: false,
            },
            // PRE -> ACT: nRP, same bank only.
            TimingRule {
                scope_level: Level::Bank,
                sibling_group_level: Level::Bank,
                preceding: vec![Pre, Prea, Command::PPre, Command::Rda, Command::Wra],
                following: vec![Act, PAct],
                latency: timing.n_rp,
                window: None,
                is_sibling: false,
            },
            // RD -> PRE: nRTP, same bank only.
            TimingRule {
                scope_level: Level::Bank,
                sibling_group_level: Level::Bank,
                preceding: vec![Rd, PreRd, NdpDramRd],
                following: vec![Pre, Prea, Command::PPre],
                latency: timing.n_rtp,
                window: None,
                is_sibling: false,
            },
            // Column-to-column, same bank group: nCCD (tCCD_L).
            TimingRule {
                scope_level: Level::Bank,
                sibling_group_level: Level::BankGroup,
                preceding: vec![Rd, Wr, PreRd, PreWr],
                following: vec![Rd, Wr, PreRd, PreWr],
                latency: timing.n_ccd,
                window: None,
                is_sibling: true,
            },
            // Column-to-column, across bank groups: nCCDS_WR (tCCD_S).
            TimingRule {
                scope_level: Level::Bank,
                sibling_group_level: Level::Rank,
                preceding: vec![Rd, Wr, PreRd, PreWr],
                following: vec![Rd, Wr, PreRd, PreWr],
                latency: timing.n_ccds_wr,
                window: None,
                is_sibling: true,
            },
            // ACT -> ACT, same rank: nRRD.
            TimingRule {
                scope_level: Level::Bank,
                sibling_group_level: Level::Rank,
                preceding: vec![Act, PAct],
                following: vec![Act, PAct],
                latency: timing.n_rrd,
                window: None,
                is_sibling: true,
            },
            // Four-activation window, same rank: nFAW.
            TimingRule {
                scope_level: Level::Bank,
                sibling_group_level: Level::Rank,
                preceding: vec![Act, PAct],
                following: vec![Act, PAct],
                latency: timing.n_faw,
                window: Some(4),
                is_sibling: true,
            },
        ];
        Self { rules }
    }

    /// Applies every rule triggered by issuing `cmd` at `addr`, updating
    /// each affected node's "next allowed time" table in `arena`.
    pub fn update_timing(
        &self,
        arena: &mut NodeArena,
        history: &mut IssueHistory,
        cmd: Command,
        addr: &CoordVec,
        clk: u64,
    ) {
        let issuing_idx = arena.flat_index(addr, cmd.scope_level());
        for rule in &self.rules {
            if rule.scope_level != cmd.scope_level() || !rule.preceding.contains(&cmd) {
                continue;
            }
            let effective_clk = if let Some(window) = rule.window {
                let group_level = if rule.is_sibling {
                    rule.sibling_group_level
                } else {
                    rule.scope_level
                };
                let group_idx = arena.flat_index(addr, group_level);
                history.record(group_level, group_idx, cmd, clk, window as usize);
                match history.nth_previous(group_level, group_idx, cmd, window) {
                    Some(base) => base,
                    None => continue,
                }
            } else {
                clk
            };
            let targets: Vec<usize> = if rule.is_sibling {
                arena.siblings_at(rule.scope_level, addr, rule.sibling_group_level)
            } else {
                vec![issuing_idx]
            };
            for idx in targets {
                let node = arena.get_mut_by_index(rule.scope_level, idx);
                for &follow in &rule.following {
                    node.bump_next_allowed(follow, effective_clk + rule.latency);
                }
            }
        }
    }

    /// True iff `cmd`'s next-allowed time at `addr`'s scoped node has
    /// already elapsed.
    #[must_use]
    pub fn is_timing_ready(&self, arena: &NodeArena, cmd: Command, addr: &CoordVec, clk: u64) -> bool {
        let node = arena.get(cmd.scope_level(), addr);
        node.next_allowed_time(cmd) <= clk
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OrgConfig;

    fn addr(bank: i64) -> CoordVec {
        let mut v = CoordVec::unspecified();
        v.channel = 0;
        v.pseudochannel = 0;
        v.rank = 0;
        v.bankgroup = 0;
        v.bank = bank;
        v
    }

    #[test]
    fn act_blocks_read_for_nrcd_cycles() {
        let timing = TimingConfig::default();
        let table = TimingTable::from_config(&timing);
        let mut arena = NodeArena::new(&OrgConfig::default());
        let mut history = IssueHistory::default();

        table.update_timing(&mut arena, &mut history, Command::Act, &addr(0), 100);
        assert!(!table.is_timing_ready(&arena, Command::Rd, &addr(0), 100));
        assert!(table.is_timing_ready(&arena, Command::Rd, &addr(0), 100 + timing.n_rcd));
    }

    #[test]
    fn faw_blocks_the_fifth_activation_in_window() {
        let timing = TimingConfig::default();
        let table = TimingTable::from_config(&timing);
        let mut arena = NodeArena::new(&OrgConfig::default());
        let mut history = IssueHistory::default();

        for (i, clk) in [0u64, 10, 20, 30].into_iter().enumerate() {
            table.update_timing(&mut arena, &mut history, Command::Act, &addr(i as i64), clk);
        }
        // The 5th ACT anywhere in the rank must wait until the 1st ACT + nFAW.
        assert!(!table.is_timing_ready(&arena, Command::Act, &addr(0), 31));
        assert!(table.is_timing_ready(&arena, Command::Act, &addr(0), timing.n_faw));
    }
}
