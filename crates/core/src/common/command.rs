//! DRAM and NDP command set.
//!
//! Semantics live in [`crate::dram`].

use crate::common::coord::Level;

/// Every command the simulator can issue, host-facing and NDP-facing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Activate a row (full, rank-wide addressing).
    Act,
    /// Activate a row, pseudo-channel-private variant.
    PAct,
    /// Precharge a single bank.
    Pre,
    /// Precharge all banks in a rank.
    Prea,
    /// Precharge all banks in a bank group (same-bank refresh scoping).
    Presb,
    /// Precharge, pseudo-channel-private variant.
    PPre,
    /// Host read.
    Rd,
    /// Host write.
    Wr,
    /// Host read with auto-precharge.
    Rda,
    /// Host write with auto-precharge.
    Wra,
    /// Stage 1 of a read through the data buffer: DRAM to DB.
    PreRd,
    /// Stage 1 of a write through the data buffer: host to DB.
    PreWr,
    /// `PreRd` with auto-precharge.
    PreRda,
    /// Stage 2 of a read through the data buffer: DB to host.
    PostRd,
    /// Stage 2 of a write through the data buffer: DB to DRAM.
    PostWr,
    /// `PostWr` with auto-precharge.
    PostWra,
    /// NDP-unit read of its DRAM-mapped data memory.
    NdpDramRd,
    /// NDP-unit write of its DRAM-mapped data memory.
    NdpDramWr,
    /// `NdpDramRd` with auto-precharge.
    NdpDramRda,
    /// `NdpDramWr` with auto-precharge.
    NdpDramWra,
    /// Host access to the NDP control plane (instruction memory / control register) via the DB.
    NdpDbRd,
    /// Host write to the NDP control plane via the DB.
    NdpDbWr,
    /// All-bank refresh.
    Refab,
    /// Same-bank refresh.
    Refsb,
    /// Deferred completion of [`Command::Refab`].
    RefabEnd,
    /// Deferred completion of [`Command::Refsb`].
    RefsbEnd,
    /// Refresh management (reserved; fatal if issued, see DESIGN.md).
    Rfm,
    /// Directed refresh management (reserved; fatal if issued, see DESIGN.md).
    Drfm,
}

impl Command {
    /// True for commands that open a row.
    #[must_use]
    pub fn is_opening(self) -> bool {
        matches!(self, Command::Act | Command::PAct)
    }

    /// True for commands that close a row, whether standalone or via
    /// auto-precharge.
    #[must_use]
    pub fn is_closing(self) -> bool {
        matches!(
            self,
            Command::Pre
                | Command::Prea
                | Command::Presb
                | Command::PPre
                | Command::Rda
                | Command::Wra
                | Command::PreRda
                | Command::PostWra
                | Command::NdpDramRda
                | Command::NdpDramWra
        )
    }

    /// True for the two refresh-issue commands (not their deferred `*_end`).
    #[must_use]
    pub fn is_refresh(self) -> bool {
        matches!(self, Command::Refab | Command::Refsb)
    }

    /// True for a data-buffer-stage command, i.e. one the scheduler marks
    /// with `is_db_cmd`.
    #[must_use]
    pub fn is_db_stage(self) -> bool {
        matches!(
            self,
            Command::PreRd
                | Command::PreWr
                | Command::PreRda
                | Command::PostRd
                | Command::PostWr
                | Command::PostWra
        )
    }

    /// The hierarchy level at which this command is addressed and gated by
    /// the timing table.
    #[must_use]
    pub fn scope_level(self) -> Level {
        match self {
            Command::Refab | Command::RefabEnd | Command::Rfm | Command::Drfm => Level::Rank,
            Command::Presb | Command::Refsb | Command::RefsbEnd => Level::BankGroup,
            Command::NdpDbRd | Command::NdpDbWr => Level::NarrowIo,
            Command::PostRd | Command::PostWr | Command::PostWra => Level::WideIo,
            _ => Level::Bank,
        }
    }

    /// Priority-category mask index used by
    /// [`crate::scheduler::Scheduler::get_best_request_with_priority`], one
    /// of seven categories.
    #[must_use]
    pub fn priority_category(self) -> PriorityCategory {
        match self {
            Command::Rd | Command::Rda => PriorityCategory::Rd,
            Command::Wr | Command::Wra => PriorityCategory::Wr,
            Command::NdpDbRd => PriorityCategory::NdpDbRd,
            Command::NdpDbWr => PriorityCategory::NdpDbWr,
            Command::NdpDramRd | Command::NdpDramRda => PriorityCategory::NdpDramRd,
            Command::NdpDramWr | Command::NdpDramWra => PriorityCategory::NdpDramWr,
            _ => PriorityCategory::None,
        }
    }
}

/// The command-category masks the priority-LUT scheduler variant selects
/// between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PriorityCategory {
    /// Not a prioritizable command under any LUT.
    None,
    /// `{RD}`.
    Rd,
    /// `{WR}`.
    Wr,
    /// `{NDP_DB_RD}`.
    NdpDbRd,
    /// `{NDP_DB_WR}`.
    NdpDbWr,
    /// `{NDP_DRAM_RD, NDP_DRAM_RDA}`.
    NdpDramRd,
    /// `{NDP_DRAM_WR, NDP_DRAM_WRA}`.
    NdpDramWr,
    /// `{NDP_DB_RD, NDP_DRAM_RD, NDP_DRAM_RDA}`.
    NdpDbOrDramRd,
}

impl PriorityCategory {
    /// True if `cmd`'s category matches this LUT selection, including the
    /// combined `NdpDbOrDramRd` LUT.
    #[must_use]
    pub fn matches(self, cmd: Command) -> bool {
        let cat = cmd.priority_category();
        match self {
            PriorityCategory::NdpDbOrDramRd => {
                matches!(cat, PriorityCategory::NdpDbRd | PriorityCategory::NdpDramRd)
            }
            other => cat == other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opening_and_closing_are_disjoint() {
        for cmd in [Command::Act, Command::PAct] {
            assert!(cmd.is_opening());
            assert!(!cmd.is_closing());
        }
        for cmd in [Command::Pre, Command::Rda, Command::Wra] {
            assert!(cmd.is_closing());
            assert!(!cmd.is_opening());
        }
    }

    #[test]
    fn combined_priority_category_matches_either() {
        assert!(PriorityCategory::NdpDbOrDramRd.matches(Command::NdpDbRd));
        assert!(PriorityCategory::NdpDbOrDramRd.matches(Command::NdpDramRda));
        assert!(!PriorityCategory::NdpDbOrDramRd.matches(Command::NdpDramWr));
    }
}
