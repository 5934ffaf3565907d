//! The memory system: orchestrates the per-channel DRAM models, memory
//! controllers, and refresh managers; owns the DIMM-level NDP launch buffer
//! and the per-pseudo-channel HSNCs that drain it; and, when enabled,
//! injects requests from a load/store trace.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::common::command::Command;
use crate::common::coord::CoordVec;
use crate::common::error::{SimError, SimResult};
use crate::common::request::{ReqType, Request};
use crate::config::Config;
use crate::controller::{MemoryController, TickOutcome};
use crate::dram::DramDevice;
use crate::mapper::AddrMapper;
use crate::ndp::hsnc::{Hsnc, HsncStatus};
use crate::ndp::launch_buffer::LaunchBuffer;
use crate::ndp::regions;
use crate::refresh::RefreshManager;
use crate::trace::TraceEntry;

/// A DIMM aggregates 2 channels and owns one launch buffer shared by both.
/// Lanes within that buffer are keyed by a DIMM-wide id combining which of
/// the two channels a pseudo-channel belongs to with its channel-local
/// index, since two channels each number their own pseudo-channels from
/// zero.
fn lane_id(pseudochannels: usize, channel: i64, pseudochannel: i64) -> i64 {
    (channel % 2) * pseudochannels as i64 + pseudochannel
}

/// Which DIMM owns `channel` (DIMM `i` owns channels `2i` and `2i + 1`).
fn dimm_of(channel: i64) -> usize {
    (channel / 2) as usize
}

/// MSHR-bounded trace-core injection state.
///
/// Legacy lines (no explicit timestamp) are assigned sequential timestamps
/// in file order, counting every line seen so far, matching
/// `loadstore_ncore_trace.cpp`'s `default_timestamp++`.
struct TraceCore {
    entries: Vec<TraceEntry>,
    due_clk: Vec<u64>,
    cursor: usize,
    mshr_size: usize,
    outstanding: Arc<AtomicUsize>,
    idle_since: Option<u64>,
    idle_rewind_cycles: u64,
}

impl TraceCore {
    fn new(entries: Vec<TraceEntry>, mshr_size: usize) -> Self {
        let mut next_default = 0u64;
        let due_clk = entries
            .iter()
            .map(|e| {
                let ts = e.clk.unwrap_or(next_default);
                next_default += 1;
                ts
            })
            .collect();
        Self {
            entries,
            due_clk,
            cursor: 0,
            mshr_size,
            outstanding: Arc::new(AtomicUsize::new(0)),
            idle_since: None,
            idle_rewind_cycles: 1000,
        }
    }

    fn is_drained(&self) -> bool {
        self.cursor >= self.entries.len() && self.outstanding.load(Ordering::Acquire) == 0
    }
}

/// What the whole system did during one [`MemorySystem::tick`] call, one
/// entry per channel in index order.
pub type SystemTickOutcome = Vec<TickOutcome>;

/// Top-level orchestrator: per-channel DRAM/controller/refresh triples,
/// DIMM-level launch buffers, per-pseudo-channel HSNCs, and the optional
/// trace core.
pub struct MemorySystem {
    config: Config,
    mapper: AddrMapper,
    clk: u64,
    dram: Vec<DramDevice>,
    controllers: Vec<MemoryController>,
    refresh: Vec<RefreshManager>,
    launch_buffers: Vec<LaunchBuffer>,
    hsncs: Vec<Vec<Hsnc>>,
    trace: Option<TraceCore>,
    next_trace_source_id: u64,
    rejected_sends: u64,
    ndp_launch_words: u64,
    ndp_starts: u64,
}

impl MemorySystem {
    /// Builds a system from resolved configuration; no trace is loaded yet
    /// even if `config.system.trace_core_enable` is set (reading and
    /// parsing the trace file is the caller's responsibility; see
    /// [`MemorySystem::load_trace`]).
    ///
    /// # Errors
    /// Propagates [`SimError::Config`] from [`Config::resolve`].
    pub fn new(config: Config) -> SimResult<Self> {
        let config = config.resolve()?;
        let mapper = AddrMapper::new(&config.org);
        let channels = config.org.channels;
        let dimms = channels.div_ceil(2);

        let mut dram = Vec::with_capacity(channels);
        let mut controllers = Vec::with_capacity(channels);
        let mut refresh = Vec::with_capacity(channels);
        let mut hsncs = Vec::with_capacity(channels);
        for ch in 0..channels {
            dram.push(DramDevice::new(&config.org, &config.timing, &config.ndp));
            controllers.push(MemoryController::new(ch as i64, &config));
            refresh.push(RefreshManager::new(ch as i64, &config.org, &config.timing, &config.rfm));
            let pchs = (0..config.org.pseudochannels)
                .map(|pch| Hsnc::new(ch as i64, pch as i64, &config.ndp))
                .collect();
            hsncs.push(pchs);
        }
        let launch_buffers = (0..dimms).map(|_| LaunchBuffer::new()).collect();

        Ok(Self {
            config,
            mapper,
            clk: 0,
            dram,
            controllers,
            refresh,
            launch_buffers,
            hsncs,
            trace: None,
            next_trace_source_id: 0,
            rejected_sends: 0,
            ndp_launch_words: 0,
            ndp_starts: 0,
        })
    }

    /// `send()` calls rejected for lack of buffer room so far, host-facing
    /// and NDP-facing combined.
    #[must_use]
    pub fn rejected_sends(&self) -> u64 {
        self.rejected_sends
    }

    /// Words accepted into a DIMM launch buffer so far.
    #[must_use]
    pub fn ndp_launch_words(&self) -> u64 {
        self.ndp_launch_words
    }

    /// NDP-unit starts (non-zero control-register writes) so far.
    #[must_use]
    pub fn ndp_starts(&self) -> u64 {
        self.ndp_starts
    }

    /// Current DRAM clock; 0 before the first [`MemorySystem::tick`].
    #[must_use]
    pub fn clk(&self) -> u64 {
        self.clk
    }

    /// Loads already-parsed trace entries (see [`crate::trace::parse_trace`])
    /// for the trace core to inject once ticking begins, replacing any
    /// previously loaded trace.
    pub fn load_trace(&mut self, entries: Vec<TraceEntry>) {
        self.trace = Some(TraceCore::new(entries, self.config.system.trace_core_mshr_size));
    }

    fn channel_index(&self, channel: i64) -> Option<usize> {
        if channel >= 0 && (channel as usize) < self.controllers.len() {
            Some(channel as usize)
        } else {
            None
        }
    }

    /// Routes `req` to its destination: the address mapper decomposes
    /// `req.addr`, then the result is diverted to the DIMM launch buffer or
    /// the NDP control register if it targets the reserved NDP-control row,
    /// or handed to the channel's controller otherwise. Returns `false` if
    /// the destination has no room; this is capacity rejection, not an
    /// error.
    ///
    /// # Errors
    /// Returns [`SimError::Fatal`] if a write to either NDP-control region
    /// arrives without an 8-word payload, or a read is aimed at one (both
    /// regions are write-only from a host's perspective: a word's value,
    /// not a reply, is the whole point of addressing them).
    pub fn send(&mut self, mut req: Request) -> SimResult<bool> {
        req.addr_vec = self.mapper.decompose(req.addr);
        let addr = req.addr_vec;

        let accepted = if regions::is_launch_region(&self.config.org, &addr) {
            self.accept_launch_write(&req, &addr)?
        } else if regions::is_control_register(&self.config.org, &addr) {
            self.accept_control_write(&req, &addr)?
        } else if let Some(ch) = self.channel_index(addr.channel) {
            self.controllers[ch].send(req)
        } else {
            false
        };

        if !accepted {
            self.rejected_sends += 1;
        }
        Ok(accepted)
    }

    fn accept_launch_write(&mut self, req: &Request, addr: &CoordVec) -> SimResult<bool> {
        if req.kind != ReqType::Write {
            return Err(SimError::fatal(self.clk, addr, "launch-request region read by a host load"));
        }
        let Some(payload) = req.payload else {
            return Err(SimError::fatal(self.clk, addr, "launch-request write carried no payload"));
        };
        let Some(ch) = self.channel_index(addr.channel) else {
            return Ok(false);
        };
        let pseudochannels = self.config.org.pseudochannels;
        if addr.pseudochannel < 0 || addr.pseudochannel as usize >= pseudochannels {
            return Ok(false);
        }
        let dimm = dimm_of(addr.channel);
        let lane = lane_id(pseudochannels, addr.channel, addr.pseudochannel);
        self.launch_buffers[dimm].push_chunk(lane, payload);
        self.ndp_launch_words += payload.len() as u64;
        let _ = ch;
        Ok(true)
    }

    fn accept_control_write(&mut self, req: &Request, addr: &CoordVec) -> SimResult<bool> {
        if req.kind != ReqType::Write {
            return Err(SimError::fatal(self.clk, addr, "NDP control register read by a host load"));
        }
        let Some(payload) = req.payload else {
            return Err(SimError::fatal(self.clk, addr, "NDP control register write carried no payload"));
        };
        let Some(ch) = self.channel_index(addr.channel) else {
            return Ok(false);
        };
        for (pch, &word) in payload.iter().enumerate() {
            if word != 0 {
                if let Some(hsnc) = self.hsncs[ch].get_mut(pch) {
                    hsnc.request_start();
                    self.ndp_starts += 1;
                }
            }
        }
        Ok(true)
    }

    /// Advances the whole system by one DRAM cycle, in fixed, deterministic
    /// order: every channel's DRAM model first, then each channel's refresh
    /// manager and controller in index order, then every HSNC (refilled
    /// from its DIMM's launch buffer), then the trace core.
    ///
    /// # Errors
    /// Propagates [`SimError::Fatal`] from any channel's DRAM model,
    /// controller, refresh manager, or HSNC.
    pub fn tick(&mut self) -> SimResult<SystemTickOutcome> {
        let clk = self.clk + 1;
        self.clk = clk;

        for dram in &mut self.dram {
            dram.tick()?;
        }

        let mut outcomes = Vec::with_capacity(self.controllers.len());
        for ch in 0..self.controllers.len() {
            self.refresh[ch].tick(&mut self.controllers[ch], clk)?;
            outcomes.push(self.controllers[ch].tick(&mut self.dram[ch], clk)?);
        }

        let org = self.config.org.clone();
        let pseudochannels = org.pseudochannels;
        for ch in 0..self.hsncs.len() {
            let dimm = dimm_of(ch as i64);
            let launch_buffers = &mut self.launch_buffers;
            let controller = &mut self.controllers[ch];
            for (pch_idx, hsnc) in self.hsncs[ch].iter_mut().enumerate() {
                let lane = lane_id(pseudochannels, ch as i64, pch_idx as i64);
                hsnc.refill_from(&mut launch_buffers[dimm], lane);
                hsnc.tick(controller, &org, clk)?;
            }
        }

        self.pump_trace(clk)?;

        Ok(outcomes)
    }

    /// Injects as many due trace entries as the MSHR budget allows, tracks
    /// outstanding reads via their completion callback, and rewinds the
    /// trace for replay after an idle interval once it and its outstanding
    /// reads have fully drained. Entries sent through a host-facing
    /// `send()` call this same tick already occupy whatever buffer room
    /// they claimed, so the trace core naturally never displaces a host
    /// request issued earlier in the tick.
    fn pump_trace(&mut self, clk: u64) -> SimResult<()> {
        let Some(mut trace) = self.trace.take() else {
            return Ok(());
        };

        loop {
            if trace.cursor >= trace.entries.len() {
                break;
            }
            if trace.outstanding.load(Ordering::Acquire) >= trace.mshr_size {
                break;
            }
            if trace.due_clk[trace.cursor] > clk {
                break;
            }

            let entry = trace.entries[trace.cursor].clone();
            let source_id = self.next_trace_source_id;
            self.next_trace_source_id += 1;

            let mut req = Request::new(entry.kind, entry.addr, CoordVec::unspecified(), source_id, clk, Command::Rd);
            req.is_trace_core_req = true;
            req.payload = entry.payload;

            let reserved = entry.kind == ReqType::Read;
            if reserved {
                let _ = trace.outstanding.fetch_add(1, Ordering::AcqRel);
                let outstanding = Arc::clone(&trace.outstanding);
                req.callback = Some(Box::new(move |_| {
                    let _ = outstanding.fetch_sub(1, Ordering::AcqRel);
                }));
            }

            if self.send(req)? {
                trace.cursor += 1;
                trace.idle_since = None;
            } else {
                if reserved {
                    let _ = trace.outstanding.fetch_sub(1, Ordering::AcqRel);
                }
                break;
            }
        }

        if trace.is_drained() {
            match trace.idle_since {
                None => trace.idle_since = Some(clk),
                Some(since) if clk.saturating_sub(since) >= trace.idle_rewind_cycles => {
                    trace.cursor = 0;
                    trace.idle_since = None;
                }
                Some(_) => {}
            }
        } else {
            trace.idle_since = None;
        }

        self.trace = Some(trace);
        Ok(())
    }

    /// True once every controller, launch buffer, and HSNC is idle and
    /// either no trace is loaded or it was loaded empty. A system driven by
    /// a non-empty trace never reports finished on its own, since the trace
    /// core loops indefinitely; bound such runs with a cycle limit instead.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        let quiescent = self.controllers.iter().all(MemoryController::is_idle)
            && self.launch_buffers.iter().all(LaunchBuffer::is_empty)
            && self.hsncs.iter().flatten().all(|h| h.status == HsncStatus::Idle);
        match &self.trace {
            Some(trace) => quiescent && trace.entries.is_empty(),
            None => quiescent,
        }
    }

    /// Per-channel controllers, for statistics reporting.
    #[must_use]
    pub fn controllers(&self) -> &[MemoryController] {
        &self.controllers
    }

    /// Resolved configuration this system was built from.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::request::ReqType;

    fn small_config() -> Config {
        let mut cfg = Config::default();
        cfg.org.channels = 2;
        cfg.org.pseudochannels = 1;
        cfg
    }

    fn read_req(addr: u64, source_id: u64) -> Request {
        Request::new(ReqType::Read, addr, CoordVec::unspecified(), source_id, 0, Command::Rd)
    }

    #[test]
    fn cold_read_completes_through_the_whole_system() {
        let mut system = MemorySystem::new(small_config()).unwrap();
        let completed = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let completed_clone = Arc::clone(&completed);
        let mut req = read_req(0, 0);
        req.callback = Some(Box::new(move |_| completed_clone.store(true, Ordering::Release)));
        assert!(system.send(req).unwrap());

        for _ in 0..2000 {
            let _ = system.tick().unwrap();
            if completed.load(Ordering::Acquire) {
                break;
            }
        }
        assert!(completed.load(Ordering::Acquire), "read never completed within 2000 cycles");
    }

    #[test]
    fn launch_write_lands_in_the_shared_dimm_lane_not_the_controller() {
        let mut system = MemorySystem::new(small_config()).unwrap();
        let org = system.config.org.clone();
        let mut addr_req = regions::launch_request_addr(&org);
        addr_req.channel = 1;
        addr_req.pseudochannel = 0;
        let linear = system.mapper.compose(&addr_req);
        let mut req = read_req(linear, 0);
        req.kind = ReqType::Write;
        req.payload = Some([1, 2, 3, 4, 5, 6, 7, 8]);
        assert!(system.send(req).unwrap());
        assert_eq!(system.launch_buffers[0].len_for(1), 8);
        assert!(system.controllers[1].is_idle());
    }

    #[test]
    fn control_register_write_starts_the_named_pseudochannel() {
        let mut system = MemorySystem::new(small_config()).unwrap();
        let org = system.config.org.clone();
        let mut addr_req = regions::control_register_addr(&org);
        addr_req.channel = 0;
        let linear = system.mapper.compose(&addr_req);
        let mut req = read_req(linear, 0);
        req.kind = ReqType::Write;
        req.payload = Some([1, 0, 0, 0, 0, 0, 0, 0]);
        assert!(system.send(req).unwrap());
        let _ = system.tick().unwrap();
        assert_ne!(system.hsncs[0][0].status, HsncStatus::Idle);
        assert_eq!(system.ndp_starts(), 1);
    }

    #[test]
    fn send_rejection_against_a_full_buffer_is_counted() {
        let cfg = small_config();
        let capacity = cfg.controller.read_buffer_capacity;
        let mut system = MemorySystem::new(cfg).unwrap();
        for i in 0..capacity {
            assert!(system.send(read_req(0, i as u64)).unwrap());
        }
        assert!(!system.send(read_req(0, 999)).unwrap());
        assert_eq!(system.rejected_sends(), 1);
    }
}
