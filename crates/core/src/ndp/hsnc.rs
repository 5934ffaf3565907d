//! The Host-Side NDP Controller: one instance per pseudo-channel, draining
//! the DIMM-level launch buffer and streaming decoded NL-requests to its
//! pseudo-channel's NDP unit as ordinary DRAM-addressed requests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use crate::common::coord::CoordVec;
use crate::common::error::{SimError, SimResult};
use crate::common::request::{ReqType, Request};
use crate::common::command::Command;
use crate::config::{NdpConfig, OrgConfig};
use crate::ndp::decode::{decode_nl_request, DecodedNlRequest, NlOpcode};
use crate::ndp::launch_buffer::LaunchBuffer;
use crate::ndp::regions;

/// Sentinel [`AtomicU8`] values for `Hsnc::poll_response`: a poll's
/// completion callback runs on the controller's retire path, so the result
/// has to cross through a type the boxed [`crate::common::request::Callback`]
/// can hold (`Send`), ruling out `Rc<Cell<_>>`.
const POLL_PENDING: u8 = 2;
const POLL_NOT_ISSUABLE: u8 = 0;
const POLL_ISSUABLE: u8 = 1;

/// HSNC state machine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HsncStatus {
    /// No program started.
    Idle,
    /// Synthesizing the NDP-unit start write.
    IssueStart,
    /// Waiting for the start write to drain before the unit begins running.
    BeforeRun,
    /// Draining NL-requests and address-generator slots.
    Run,
    /// At a barrier: draining only in-flight generator slots.
    Barrier,
    /// Counting down before polling issuability.
    Wait,
    /// Reserved; fatal if entered (see DESIGN.md).
    WaitRes,
    /// Draining before returning to idle.
    Done,
}

/// A decoded RD/WR primitive awaiting dispatch to the memory controller.
struct AccInstSlot {
    id: u8,
    opcode: NlOpcode,
    addr: CoordVec,
    opsize: u32,
    cnt: u32,
}

/// What an [`Hsnc`] needs from its owning channel's controller: whether any
/// NDP request for a pseudo-channel is still outstanding, and the send path
/// itself.
pub trait NdpHost {
    /// True if any NDP request for `pch` is still outstanding.
    fn has_outstanding_ndp(&self, pch: i64) -> bool;
    /// Enqueues `req`; mirrors `MemoryController::send`.
    fn send(&mut self, req: Request) -> bool;
}

/// Per-pseudo-channel host-side NDP controller.
pub struct Hsnc {
    channel: i64,
    pch: i64,
    /// Current state.
    pub status: HsncStatus,
    nl_slot_capacity: usize,
    gen_slot_capacity: usize,
    wait_rearm_cycles: u32,
    nl_slots: VecDeque<u64>,
    gen_slots: Vec<AccInstSlot>,
    rr_index: usize,
    wait_counter: u32,
    start_requested: bool,
    poll_response: Arc<AtomicU8>,
    poll_in_flight: bool,
}

impl Hsnc {
    /// Creates an idle controller for `(channel, pch)`, sized from `ndp`.
    #[must_use]
    pub fn new(channel: i64, pch: i64, ndp: &NdpConfig) -> Self {
        Self {
            channel,
            pch,
            status: HsncStatus::Idle,
            nl_slot_capacity: ndp.nl_request_slot_capacity,
            gen_slot_capacity: ndp.addr_gen_slot_capacity,
            wait_rearm_cycles: ndp.wait_rearm_cycles as u32,
            nl_slots: VecDeque::with_capacity(ndp.nl_request_slot_capacity),
            gen_slots: Vec::with_capacity(ndp.addr_gen_slot_capacity),
            rr_index: 0,
            wait_counter: 0,
            start_requested: false,
            poll_response: Arc::new(AtomicU8::new(POLL_PENDING)),
            poll_in_flight: false,
        }
    }

    /// Called when a host write to the NDP control register sets
    /// `payload[pch] != 0` while idle.
    pub fn request_start(&mut self) {
        if self.status == HsncStatus::Idle {
            self.start_requested = true;
        }
    }

    /// Feeds words from the DIMM buffer into this controller's NL-request
    /// slot array, 8 at a time, when there is room. `lane` is the DIMM-wide
    /// lane id the memory system tagged this pseudo-channel's words with
    /// (distinct from `self.pch`, which is local to this channel and used
    /// only for addressing).
    pub fn refill_from(&mut self, buffer: &mut LaunchBuffer, lane: i64) {
        while self.nl_slot_capacity - self.nl_slots.len() >= 8 {
            match buffer.pop_chunk(lane) {
                Some(chunk) => self.nl_slots.extend(chunk),
                None => break,
            }
        }
    }

    /// Advances the state machine by one DRAM cycle.
    ///
    /// # Errors
    /// Returns [`SimError::Fatal`] on a reserved opcode (`LOOP_START`,
    /// `LOOP_END`) or on entering `WAIT_RES`.
    pub fn tick(&mut self, host: &mut impl NdpHost, org: &OrgConfig, clk: u64) -> SimResult<()> {
        match self.status {
            HsncStatus::Idle => {
                if self.start_requested {
                    self.start_requested = false;
                    self.status = HsncStatus::IssueStart;
                }
            }
            HsncStatus::IssueStart => {
                if !host.has_outstanding_ndp(self.pch) {
                    let mut addr = regions::control_register_addr(org);
                    addr.channel = self.channel;
                    addr.pseudochannel = self.pch;
                    let mut req = Request::new(ReqType::Write, 0, addr, 0, clk, Command::NdpDbWr);
                    req.is_ndp_req = true;
                    req.ndp_id = self.pch;
                    req.payload = Some([1; 8]);
                    if host.send(req) {
                        self.status = HsncStatus::BeforeRun;
                    }
                }
            }
            HsncStatus::BeforeRun => {
                if !host.has_outstanding_ndp(self.pch) {
                    self.status = HsncStatus::Run;
                }
            }
            HsncStatus::Run => {
                self.drain_generator_slots(host, clk);
                self.fetch_one_nl_request(clk, org)?;
            }
            HsncStatus::Barrier => {
                self.drain_generator_slots(host, clk);
                if self.gen_slots.is_empty() && !host.has_outstanding_ndp(self.pch) {
                    self.status = HsncStatus::Run;
                }
            }
            HsncStatus::Wait => {
                if self.poll_in_flight {
                    let response = self.poll_response.load(Ordering::Acquire);
                    if response != POLL_PENDING {
                        self.poll_in_flight = false;
                        if response == POLL_ISSUABLE {
                            self.status = HsncStatus::Run;
                        } else {
                            self.wait_counter = self.wait_rearm_cycles;
                        }
                    }
                } else if self.wait_counter == 0 {
                    self.issue_poll(host, org, clk);
                } else {
                    self.wait_counter -= 1;
                }
            }
            HsncStatus::WaitRes => {
                return Err(SimError::fatal_global(
                    clk,
                    "HSNC entered reserved WAIT_RES state",
                ));
            }
            HsncStatus::Done => {
                self.drain_generator_slots(host, clk);
                if self.gen_slots.is_empty() && !host.has_outstanding_ndp(self.pch) {
                    self.status = HsncStatus::Idle;
                }
            }
        }
        Ok(())
    }

    fn fetch_one_nl_request(&mut self, clk: u64, org: &OrgConfig) -> SimResult<()> {
        if self.gen_slots.len() >= self.gen_slot_capacity {
            return Ok(());
        }
        let Some(word) = self.nl_slots.pop_front() else {
            return Ok(());
        };
        let Some(decoded) = decode_nl_request(word) else {
            return Ok(());
        };
        self.apply_decoded(decoded, clk, org)
    }

    fn apply_decoded(&mut self, decoded: DecodedNlRequest, clk: u64, org: &OrgConfig) -> SimResult<()> {
        match decoded.opcode {
            NlOpcode::Barrier => self.status = HsncStatus::Barrier,
            NlOpcode::WaitRes => self.status = HsncStatus::WaitRes,
            NlOpcode::Done => self.status = HsncStatus::Done,
            NlOpcode::Wait => {
                self.status = HsncStatus::Wait;
                self.wait_counter = u32::from(decoded.etc);
            }
            NlOpcode::LoopStart | NlOpcode::LoopEnd => {
                return Err(SimError::fatal_global(
                    clk,
                    "HSNC decoded reserved LOOP_START/LOOP_END opcode",
                ));
            }
            NlOpcode::Rd | NlOpcode::Wr => {
                let mut addr = decoded.addr;
                addr.channel = self.channel;
                addr.pseudochannel = self.pch;
                let _ = org;
                self.gen_slots.push(AccInstSlot {
                    id: decoded.id,
                    opcode: decoded.opcode,
                    addr,
                    opsize: u32::from(decoded.opsize.max(1)),
                    cnt: 0,
                });
            }
        }
        Ok(())
    }

    /// Iterates generator slots round-robin, sending at most one request
    /// per tick.
    fn drain_generator_slots(&mut self, host: &mut impl NdpHost, clk: u64) {
        if self.gen_slots.is_empty() {
            return;
        }
        let len = self.gen_slots.len();
        for offset in 0..len {
            let idx = (self.rr_index + offset) % len;
            let slot = &mut self.gen_slots[idx];
            let mut addr = slot.addr;
            addr.column = slot.cnt as i64;
            let (kind, final_command) = match slot.opcode {
                NlOpcode::Rd => (ReqType::Read, Command::NdpDramRd),
                _ => (ReqType::Write, Command::NdpDramWr),
            };
            let mut req = Request::new(kind, 0, addr, u64::from(slot.id), clk, final_command);
            req.is_ndp_req = true;
            req.ndp_id = self.pch;
            if host.send(req) {
                slot.cnt += 1;
                let done = slot.cnt >= slot.opsize;
                self.rr_index = (idx + 1) % len;
                if done {
                    let _ = self.gen_slots.remove(idx);
                }
                break;
            }
        }
    }

    fn issue_poll(&mut self, host: &mut impl NdpHost, org: &OrgConfig, clk: u64) {
        let mut addr = regions::control_register_addr(org);
        addr.channel = self.channel;
        addr.pseudochannel = self.pch;
        let response = Arc::clone(&self.poll_response);
        let mut req = Request::new(ReqType::Read, 0, addr, 0, clk, Command::NdpDbRd);
        req.is_ndp_req = true;
        req.ndp_id = self.pch;
        req.callback = Some(Box::new(move |completed: &Request| {
            let issuable = completed.payload.is_some_and(|p| p[0] != 0);
            response.store(if issuable { POLL_ISSUABLE } else { POLL_NOT_ISSUABLE }, Ordering::Release);
        }));
        self.poll_response.store(POLL_PENDING, Ordering::Release);
        if host.send(req) {
            self.poll_in_flight = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeHost {
        outstanding: bool,
        sent: Vec<Request>,
    }

    impl NdpHost for FakeHost {
        fn has_outstanding_ndp(&self, _pch: i64) -> bool {
            self.outstanding
        }
        fn send(&mut self, req: Request) -> bool {
            self.sent.push(req);
            true
        }
    }

    #[test]
    fn idle_to_before_run_requires_no_outstanding() {
        let org = OrgConfig::default();
        let mut hsnc = Hsnc::new(0, 0, &NdpConfig::default());
        let mut host = FakeHost {
            outstanding: false,
            sent: Vec::new(),
        };
        hsnc.request_start();
        hsnc.tick(&mut host, &org, 0).unwrap();
        assert_eq!(hsnc.status, HsncStatus::IssueStart);
        hsnc.tick(&mut host, &org, 1).unwrap();
        assert_eq!(hsnc.status, HsncStatus::BeforeRun);
        assert_eq!(host.sent.len(), 1);
    }

    #[test]
    fn rd_opcode_is_queued_as_generator_slot() {
        let org = OrgConfig::default();
        let mut hsnc = Hsnc::new(0, 0, &NdpConfig::default());
        hsnc.status = HsncStatus::Run;
        let req = DecodedNlRequest {
            opcode: NlOpcode::Rd,
            opsize: 8,
            addr: CoordVec::unspecified(),
            id: 0,
            etc: 0,
        };
        hsnc.apply_decoded(req, 0, &org).unwrap();
        assert_eq!(hsnc.gen_slots.len(), 1);
    }

    #[test]
    fn loop_start_is_fatal() {
        let org = OrgConfig::default();
        let mut hsnc = Hsnc::new(0, 0, &NdpConfig::default());
        let req = DecodedNlRequest {
            opcode: NlOpcode::LoopStart,
            opsize: 0,
            addr: CoordVec::unspecified(),
            id: 0,
            etc: 0,
        };
        assert!(hsnc.apply_decoded(req, 0, &org).is_err());
    }
}
