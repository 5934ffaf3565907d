//! The DRAM device model: per-channel hierarchy state, JEDEC
//! timing, the deferred-action queue, and the embedded per-pseudo-channel
//! NDP units.

/// Deferred/future-action queue, used for refresh completion.
pub mod actions;
/// The hierarchy arena (`NodeArena`/`Node`).
pub mod node;
/// The embedded NDP compute unit.
pub mod ndp_unit;
/// JEDEC timing-constraint table.
pub mod timing;

use crate::common::command::Command;
use crate::common::coord::{CoordVec, Level};
use crate::common::error::{SimError, SimResult};
use crate::config::{NdpConfig, OrgConfig, TimingConfig};
use crate::dram::actions::ActionQueue;
use crate::dram::node::{NodeArena, NodeState};
use crate::dram::ndp_unit::NdpUnit;
use crate::dram::timing::{IssueHistory, TimingTable};

/// One channel's DRAM device: hierarchy state, timing, refresh completion
/// queue, and its pseudo-channels' embedded NDP units.
pub struct DramDevice {
    clk: u64,
    org: OrgConfig,
    arena: NodeArena,
    timing: TimingTable,
    history: IssueHistory,
    actions: ActionQueue,
    ndp_units: Vec<NdpUnit>,
    n_rfc: u64,
}

impl DramDevice {
    /// Builds a device for one channel from resolved organization/timing/NDP
    /// parameters.
    #[must_use]
    pub fn new(org: &OrgConfig, timing: &TimingConfig, ndp: &NdpConfig) -> Self {
        let ndp_units = (0..org.pseudochannels)
            .map(|_| NdpUnit::new(ndp.imem_bytes))
            .collect();
        Self {
            clk: 0,
            org: org.clone(),
            arena: NodeArena::new(org),
            timing: TimingTable::from_config(timing),
            history: IssueHistory::default(),
            actions: ActionQueue::new(),
            ndp_units,
            n_rfc: timing.n_rfc,
        }
    }

    /// Current DRAM clock.
    #[must_use]
    pub fn clk(&self) -> u64 {
        self.clk
    }

    /// Advances the clock by one cycle: fires due deferred actions (refresh
    /// completions), then ticks every pseudo-channel's NDP unit.
    ///
    /// # Errors
    /// Propagates a [`SimError::Fatal`] if a deferred action's completion
    /// targets a bank that isn't in `Refreshing` state (an invariant this
    /// device itself is supposed to maintain, so it can only mean a bug
    /// upstream).
    pub fn tick(&mut self) -> SimResult<()> {
        self.clk += 1;
        for action in self.actions.drain_due(self.clk) {
            self.complete_refresh(action.cmd, &action.addr_vec)?;
        }
        for unit in &mut self.ndp_units {
            unit.tick();
        }
        Ok(())
    }

    fn complete_refresh(&mut self, cmd: Command, addr: &CoordVec) -> SimResult<()> {
        let group_level = cmd.scope_level();
        let siblings = self.arena.siblings_at(Level::Bank, addr, group_level);
        for idx in siblings {
            let node = self.arena.get_mut_by_index(Level::Bank, idx);
            node.state = NodeState::Closed;
            node.open_row = -1;
        }
        Ok(())
    }

    /// True iff `cmd` may legally be issued at `addr` on this tick: the
    /// timing table's next-allowed-time check, plus node-state
    /// preconditions (row open/closed, not mid-refresh).
    #[must_use]
    pub fn check_ready(&self, cmd: Command, addr: &CoordVec) -> bool {
        if !self.timing.is_timing_ready(&self.arena, cmd, addr, self.clk) {
            return false;
        }
        if cmd.is_refresh() {
            return self.rank_banks_closed(addr);
        }
        let level = cmd.scope_level();
        if level != Level::Bank {
            return true;
        }
        let node = self.arena.get(Level::Bank, addr);
        if node.state == NodeState::Refreshing {
            return false;
        }
        if cmd.is_opening() {
            return node.state == NodeState::Closed;
        }
        if matches!(
            cmd,
            Command::Rd
                | Command::Wr
                | Command::Rda
                | Command::Wra
                | Command::PreRd
                | Command::PreWr
                | Command::PreRda
                | Command::NdpDramRd
                | Command::NdpDramWr
                | Command::NdpDramRda
                | Command::NdpDramWra
        ) {
            return node.state == NodeState::Opened && node.open_row == addr.row;
        }
        if cmd.is_closing() {
            return node.state == NodeState::Opened;
        }
        true
    }

    fn rank_banks_closed(&self, addr: &CoordVec) -> bool {
        self.arena
            .siblings_at(Level::Bank, addr, Level::Rank)
            .into_iter()
            .all(|idx| self.arena.get_by_index(Level::Bank, idx).state == NodeState::Closed)
    }

    /// Issues `cmd` at `addr`: applies timing updates and the node-state
    /// transition, scheduling a deferred completion for refresh commands.
    ///
    /// # Errors
    /// Returns [`SimError::Fatal`] if `cmd` is not ready to issue.
    pub fn issue_command(&mut self, cmd: Command, addr: &CoordVec) -> SimResult<()> {
        if matches!(cmd, Command::Rfm | Command::Drfm) {
            return Err(SimError::fatal(self.clk, addr, "RFM/DRFM are reserved and unimplemented"));
        }
        if !self.check_ready(cmd, addr) {
            return Err(SimError::fatal(self.clk, addr, format!("issued not-ready command {cmd:?}")));
        }
        self.timing.update_timing(&mut self.arena, &mut self.history, cmd, addr, self.clk);
        self.apply_state_transition(cmd, addr)?;
        Ok(())
    }

    fn apply_state_transition(&mut self, cmd: Command, addr: &CoordVec) -> SimResult<()> {
        match cmd.scope_level() {
            Level::Bank if cmd.is_opening() => {
                let node = self.arena.get_mut(Level::Bank, addr);
                node.state = NodeState::Opened;
                node.open_row = addr.row;
            }
            Level::Bank if cmd.is_closing() => {
                let node = self.arena.get_mut(Level::Bank, addr);
                node.state = NodeState::Closed;
                node.open_row = -1;
            }
            Level::Rank if cmd.is_refresh() => {
                for idx in self.arena.siblings_at(Level::Bank, addr, Level::Rank) {
                    self.arena.get_mut_by_index(Level::Bank, idx).state = NodeState::Refreshing;
                }
                let completion = if cmd == Command::Refab {
                    Command::RefabEnd
                } else {
                    Command::RefsbEnd
                };
                self.actions.schedule(completion, *addr, self.clk + self.n_rfc);
            }
            _ => {}
        }
        Ok(())
    }

    /// Borrows the NDP unit for pseudo-channel `pch`.
    #[must_use]
    pub fn ndp_unit(&self, pch: usize) -> Option<&NdpUnit> {
        self.ndp_units.get(pch)
    }

    /// Mutably borrows the NDP unit for pseudo-channel `pch`.
    pub fn ndp_unit_at(&mut self, pch: usize) -> Option<&mut NdpUnit> {
        self.ndp_units.get_mut(pch)
    }

    /// True if `addr`'s bank currently has a row open matching `addr.row`.
    #[must_use]
    pub fn check_rowbuffer_hit(&self, addr: &CoordVec) -> bool {
        let node = self.arena.get(Level::Bank, addr);
        node.state == NodeState::Opened && node.open_row == addr.row
    }

    /// True if `addr`'s bank has any row open at all.
    #[must_use]
    pub fn check_node_open(&self, addr: &CoordVec) -> bool {
        self.arena.get(Level::Bank, addr).state == NodeState::Opened
    }

    /// Walks the precondition chain for `final_command` at `addr`: if the
    /// bank is closed, the next command is `ACT`; if open on a different
    /// row (a closing conflict), the next command is `PRE`; otherwise the
    /// final command itself is ready to issue.
    #[must_use]
    pub fn get_preq_command(&self, final_command: Command, addr: &CoordVec) -> Command {
        let needs_open_bank = matches!(
            final_command,
            Command::Rd
                | Command::Wr
                | Command::Rda
                | Command::Wra
                | Command::PreRd
                | Command::PreWr
                | Command::PreRda
                | Command::NdpDramRd
                | Command::NdpDramWr
                | Command::NdpDramRda
                | Command::NdpDramWra
        );
        if !needs_open_bank {
            return final_command;
        }
        let node = self.arena.get(Level::Bank, addr);
        match node.state {
            NodeState::Closed => Command::Act,
            NodeState::Opened if node.open_row != addr.row => Command::Pre,
            _ => final_command,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bank_addr(bank: i64, row: i64) -> CoordVec {
        let mut v = CoordVec::unspecified();
        v.channel = 0;
        v.pseudochannel = 0;
        v.rank = 0;
        v.bankgroup = 0;
        v.bank = bank;
        v.row = row;
        v
    }

    #[test]
    fn act_then_read_same_row_is_ready_after_nrcd() {
        let org = OrgConfig::default();
        let timing = TimingConfig::default();
        let mut dram = DramDevice::new(&org, &timing, &NdpConfig::default());
        let addr = bank_addr(0, 5);
        dram.issue_command(Command::Act, &addr).unwrap();
        for _ in 0..timing.n_rcd {
            dram.tick().unwrap();
        }
        assert!(dram.check_ready(Command::Rd, &addr));
        dram.issue_command(Command::Rd, &addr).unwrap();
        assert!(dram.check_rowbuffer_hit(&addr));
    }

    #[test]
    fn issuing_unready_command_is_fatal() {
        let org = OrgConfig::default();
        let timing = TimingConfig::default();
        let mut dram = DramDevice::new(&org, &timing, &NdpConfig::default());
        let addr = bank_addr(0, 5);
        // Bank starts closed: RD is not ready without a prior ACT.
        assert!(dram.issue_command(Command::Rd, &addr).is_err());
    }

    #[test]
    fn refresh_closes_rank_then_completes_after_nrfc() {
        let org = OrgConfig::default();
        let timing = TimingConfig::default();
        let mut dram = DramDevice::new(&org, &timing, &NdpConfig::default());
        let addr = bank_addr(-1, -1);
        dram.issue_command(Command::Refab, &addr).unwrap();
        assert_eq!(
            dram.arena.get(Level::Bank, &bank_addr(0, -1)).state,
            NodeState::Refreshing
        );
        for _ in 0..timing.n_rfc {
            dram.tick().unwrap();
        }
        assert_eq!(
            dram.arena.get(Level::Bank, &bank_addr(0, -1)).state,
            NodeState::Closed
        );
    }

    #[test]
    fn get_preq_command_inserts_act_before_first_access() {
        let org = OrgConfig::default();
        let timing = TimingConfig::default();
        let dram = DramDevice::new(&org, &timing, &NdpConfig::default());
        let addr = bank_addr(0, 5);
        assert_eq!(dram.get_preq_command(Command::Rd, &addr), Command::Act);
    }
}
