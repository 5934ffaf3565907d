//! The request scheduler: a stateless arbiter recomputing
//! ordering fresh on every call, never holding state between them.

use crate::common::command::{Command, PriorityCategory};
use crate::common::request::{Request, RequestBuffer};
use crate::dram::DramDevice;

/// The seven priority LUTs `get_best_request_with_priority` selects among,
/// one per prioritizable command family.
pub const PRIORITY_LUTS: [PriorityCategory; 7] = [
    PriorityCategory::Rd,
    PriorityCategory::Wr,
    PriorityCategory::NdpDbRd,
    PriorityCategory::NdpDbWr,
    PriorityCategory::NdpDramRd,
    PriorityCategory::NdpDramWr,
    PriorityCategory::NdpDbOrDramRd,
];

/// A stateless FR-FCFS/priority arbiter over a [`RequestBuffer`].
#[derive(Debug, Default, Clone, Copy)]
pub struct Scheduler;

impl Scheduler {
    /// FR-FCFS comparison: ready beats not-ready; among equally-ready
    /// candidates, older `arrive_clk` wins. Returns `true` if `a` is
    /// preferred over `b`.
    #[must_use]
    pub fn compare(dram: &DramDevice, a: &Request, b: &Request) -> bool {
        let a_ready = dram.check_ready(a.command, &a.addr_vec);
        let b_ready = dram.check_ready(b.command, &b.addr_vec);
        match (a_ready, b_ready) {
            (true, false) => true,
            (false, true) => false,
            _ => a.arrive_clk <= b.arrive_clk,
        }
    }

    /// Sets every request's `command` to its next outstanding precondition,
    /// then folds FR-FCFS across the buffer. Returns the winning index.
    #[must_use]
    pub fn get_best_request(dram: &DramDevice, buffer: &mut RequestBuffer) -> Option<usize> {
        for req in buffer.iter_mut() {
            req.command = dram.get_preq_command(req.final_command, &req.addr_vec);
        }
        Self::fold_best(dram, buffer, |_| true)
    }

    /// Like [`Self::get_best_request`] but rewrites `RD -> PRE_RD` /
    /// `WR -> PRE_WR` before walking preconditions, and only considers
    /// host read/write requests whose data-buffer prefetch bucket has
    /// headroom.
    #[must_use]
    pub fn get_best_pre_request(
        dram: &DramDevice,
        buffer: &mut RequestBuffer,
        read_prefetch_outstanding: usize,
        write_prefetch_outstanding: usize,
        prefetch_capacity: usize,
    ) -> Option<usize> {
        for req in buffer.iter_mut() {
            let staged = match req.final_command {
                Command::Rd => Command::PreRd,
                Command::Wr => Command::PreWr,
                other => other,
            };
            req.command = dram.get_preq_command(staged, &req.addr_vec);
        }
        Self::fold_best(dram, buffer, |req| {
            let headroom = match req.final_command {
                Command::Rd => read_prefetch_outstanding < prefetch_capacity,
                Command::Wr => write_prefetch_outstanding < prefetch_capacity,
                _ => false,
            };
            headroom && matches!(req.final_command, Command::Rd | Command::Wr)
        })
    }

    /// Restricts eligibility to requests whose final command matches
    /// `PRIORITY_LUTS[lut_index]`'s category; ties fall back to FR-FCFS.
    #[must_use]
    pub fn get_best_request_with_priority(
        dram: &DramDevice,
        buffer: &mut RequestBuffer,
        lut_index: usize,
    ) -> Option<usize> {
        let category = PRIORITY_LUTS[lut_index];
        for req in buffer.iter_mut() {
            req.command = dram.get_preq_command(req.final_command, &req.addr_vec);
        }
        Self::fold_best(dram, buffer, |req| category.matches(req.final_command))
    }

    fn fold_best(
        dram: &DramDevice,
        buffer: &RequestBuffer,
        eligible: impl Fn(&Request) -> bool,
    ) -> Option<usize> {
        let mut best: Option<(usize, &Request)> = None;
        for (idx, req) in buffer.iter().enumerate() {
            if !eligible(req) {
                continue;
            }
            best = match best {
                None => Some((idx, req)),
                Some((best_idx, current_best)) => {
                    if Self::compare(dram, req, current_best) {
                        Some((idx, req))
                    } else {
                        Some((best_idx, current_best))
                    }
                }
            };
        }
        best.map(|(idx, _)| idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::coord::CoordVec;
    use crate::common::request::ReqType;
    use crate::config::{NdpConfig, OrgConfig, TimingConfig};

    fn addr(bank: i64) -> CoordVec {
        let mut v = CoordVec::unspecified();
        v.channel = 0;
        v.pseudochannel = 0;
        v.rank = 0;
        v.bankgroup = 0;
        v.bank = bank;
        v.row = 0;
        v
    }

    #[test]
    fn older_ready_request_wins_ties() {
        let org = OrgConfig::default();
        let timing = TimingConfig::default();
        let dram = DramDevice::new(&org, &timing, &NdpConfig::default());
        let mut buffer = RequestBuffer::new(4);
        let _ = buffer.try_push(Request::new(ReqType::Read, 0, addr(0), 0, 5, Command::Rd));
        let _ = buffer.try_push(Request::new(ReqType::Read, 0, addr(1), 1, 2, Command::Rd));
        let best = Scheduler::get_best_request(&dram, &mut buffer).unwrap();
        assert_eq!(buffer.iter().nth(best).unwrap().arrive_clk, 2);
    }

    #[test]
    fn priority_lut_excludes_non_matching_commands() {
        let org = OrgConfig::default();
        let timing = TimingConfig::default();
        let dram = DramDevice::new(&org, &timing, &NdpConfig::default());
        let mut buffer = RequestBuffer::new(4);
        let _ = buffer.try_push(Request::new(ReqType::Write, 0, addr(0), 0, 0, Command::Wr));
        let rd_lut = PRIORITY_LUTS.iter().position(|&c| c == PriorityCategory::Rd).unwrap();
        assert!(Scheduler::get_best_request_with_priority(&dram, &mut buffer, rd_lut).is_none());
    }
}
