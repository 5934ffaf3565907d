//! The refresh manager: one instance per channel, running at
//! DRAM clock and issuing all-bank-refresh requests through the
//! controller's priority path.

use crate::common::command::Command;
use crate::common::coord::CoordVec;
use crate::common::error::SimResult;
use crate::common::request::{ReqType, Request};
use crate::config::{OrgConfig, RfmConfig, TimingConfig};

/// Which refresh granularity the manager issues. `SameBank` is modeled but
/// never selected by default configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshScheme {
    /// Refresh every bank in a rank at once.
    AllBank,
    /// Refresh one bank per bank group, leaving the rest of the rank live.
    SameBank,
}

/// What the manager needs from its channel's controller: enqueuing a
/// priority request and failing loudly if it can't.
pub trait RefreshHost {
    /// Enqueues `req` on the priority path; `false` means the priority
    /// buffer was full.
    fn priority_send(&mut self, req: Request) -> bool;
}

/// Per-channel refresh scheduler.
pub struct RefreshManager {
    channel: i64,
    scheme: RefreshScheme,
    next_refresh_clk: u64,
    n_refi: u64,
    prefetch_window: u64,
    pseudochannels: usize,
    ranks: usize,
    /// Set while within `prefetch_window` cycles of the next refresh; an
    /// advisory the scheduler may consult but nothing in this crate
    /// currently reads; it is a hint, not a hard gate.
    pub high_priority_prefetch: bool,
}

impl RefreshManager {
    /// Builds a manager for `channel`, seeding `next_refresh_clk = nREFI`.
    #[must_use]
    pub fn new(channel: i64, org: &OrgConfig, timing: &TimingConfig, _rfm: &RfmConfig) -> Self {
        Self {
            channel,
            scheme: RefreshScheme::AllBank,
            next_refresh_clk: timing.n_refi,
            n_refi: timing.n_refi,
            prefetch_window: timing.n_rfc,
            pseudochannels: org.pseudochannels,
            ranks: org.ranks,
            high_priority_prefetch: false,
        }
    }

    /// Advances the manager by one DRAM cycle.
    ///
    /// # Errors
    /// Propagates [`SimError::Fatal`] if a constructed refresh request
    /// can't be enqueued; the priority buffer is expected to be sized so
    /// this never happens under configured parameters.
    pub fn tick(&mut self, host: &mut impl RefreshHost, clk: u64) -> SimResult<()> {
        if self.prefetch_window > 0 && clk + self.prefetch_window == self.next_refresh_clk {
            self.high_priority_prefetch = true;
        }
        if clk == self.next_refresh_clk {
            self.high_priority_prefetch = false;
            self.fire_refresh(host, clk)?;
            self.next_refresh_clk += self.n_refi;
        }
        Ok(())
    }

    fn fire_refresh(&self, host: &mut impl RefreshHost, clk: u64) -> SimResult<()> {
        let final_command = match self.scheme {
            RefreshScheme::AllBank => Command::Refab,
            RefreshScheme::SameBank => Command::Refsb,
        };
        for pch in 0..self.pseudochannels {
            for rank in 0..self.ranks {
                let mut addr = CoordVec::unspecified();
                addr.channel = self.channel;
                addr.pseudochannel = pch as i64;
                addr.rank = rank as i64;
                let req = Request::new(ReqType::Write, 0, addr, 0, clk, final_command);
                if !host.priority_send(req) {
                    return Err(crate::common::error::SimError::fatal_global(
                        clk,
                        "refresh priority buffer full, cannot enqueue REFab",
                    ));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeHost {
        received: Vec<Request>,
    }

    impl RefreshHost for FakeHost {
        fn priority_send(&mut self, req: Request) -> bool {
            self.received.push(req);
            true
        }
    }

    #[test]
    fn fires_at_configured_interval_and_reschedules() {
        let org = OrgConfig {
            pseudochannels: 1,
            ranks: 1,
            ..OrgConfig::default()
        };
        let timing = TimingConfig {
            n_refi: 100,
            ..TimingConfig::default()
        };
        let rfm = RfmConfig::default();
        let mut manager = RefreshManager::new(0, &org, &timing, &rfm);
        let mut host = FakeHost { received: Vec::new() };

        for clk in 1..100 {
            manager.tick(&mut host, clk).unwrap();
        }
        assert!(host.received.is_empty());
        manager.tick(&mut host, 100).unwrap();
        assert_eq!(host.received.len(), 1);
        assert_eq!(manager.next_refresh_clk, 200);
    }
}
