//! The memory controller: per-channel request buffers, the
//! decoupled `mc_db_mode`/`db_dram_mode` state machines, the mode-directed
//! probe sequence that picks one command to issue per tick, and the
//! adaptive row-buffer policy.
//!
//! This module separates buffer bookkeeping, mode selection, and probe
//! dispatch into distinct concerns (`mode`, `rowpolicy`, this file's probe
//! table) under one fixed precedence: in-flight active requests first,
//! then the oldest ready priority request, then one mode-directed probe
//! per pseudo-channel round-robin.

/// `mc_db_mode`/`db_dram_mode` transition tables.
pub mod mode;
/// Adaptive row-buffer hit cap.
pub mod rowpolicy;

use std::collections::VecDeque;

use crate::common::command::Command;
use crate::common::coord::CoordVec;
use crate::common::error::{SimError, SimResult};
use crate::common::request::{PendingQueue, ReqType, Request, RequestBuffer};
use crate::config::{Config, ControllerConfig, NdpConfig, OrgConfig};
use crate::dram::ndp_unit::NdpUnitStatus;
use crate::dram::DramDevice;
use crate::ndp::hsnc::NdpHost;
use crate::ndp::regions;
use crate::refresh::RefreshHost;
use crate::scheduler::Scheduler;

pub use mode::{DbDramMode, McDbMode};
use mode::ModeInputs;
use rowpolicy::RowPolicy;

const LUT_RD: usize = 0;
const LUT_NDP_DB_RD: usize = 2;
const LUT_NDP_DB_WR: usize = 3;
const LUT_NDP_DRAM_RD: usize = 4;
const LUT_NDP_DRAM_WR: usize = 5;
const LUT_NDP_DB_OR_DRAM_RD: usize = 6;

/// Adaptive row-cap low value; unexplained in the source,
/// preserved as a literal (see DESIGN.md).
const ADAPTIVE_ROW_CAP_LOW: u32 = 16;
/// Token bucket bounds for `dram_ndp_rd_token`.
const DRAM_NDP_RD_TOKEN_MAX: u32 = 128;
const DRAM_NDP_RD_TOKEN_GRANT: u32 = 1;
const DRAM_NDP_RD_TOKEN_CONSUME: u32 = 16;

/// One issued command, reported for statistics.
#[derive(Debug, Clone, Copy)]
pub struct IssuedEvent {
    /// Originating pseudo-channel.
    pub pch: i64,
    /// The command issued.
    pub command: Command,
}

/// One request retiring this tick, reported for statistics.
#[derive(Debug, Clone, Copy)]
pub struct CompletionRecord {
    /// Originating pseudo-channel.
    pub pch: i64,
    /// Read or write.
    pub kind: ReqType,
}

/// What [`MemoryController::tick`] did this cycle.
#[derive(Debug, Default)]
pub struct TickOutcome {
    /// Requests that retired (callback invoked, or write dropped silently)
    /// this tick.
    pub completions: Vec<CompletionRecord>,
    /// The command issued this tick, if any.
    pub issued: Option<IssuedEvent>,
}

/// Identifies which buffer a scheduled candidate came from.
#[derive(Debug, Clone, Copy)]
enum Source {
    Active(usize),
    Priority,
    Read(usize),
    Write(usize),
    ReadPrefetch(usize),
    WritePrefetch(usize),
}

#[derive(Clone, Copy)]
enum ProbeKind {
    NdpDbRd,
    NdpDbWr,
    NdpDramRd,
    NdpDramWr,
    RdNormal,
    RdDbOrDram,
    RdPre,
    WrPre,
    RdPrefetch,
    WrPrefetch,
}

/// The per-cell probe sequence for each `(mc_db_mode, db_dram_mode)` pair.
/// `DRAM_NDP_WR` has no distinct sequence of its own; this reuses each row's
/// `DRAM_WR` sequence for it, since both are write-facing (see DESIGN.md).
fn probe_sequence(mc_db: McDbMode, db_dram: DbDramMode) -> &'static [ProbeKind] {
    use DbDramMode::{DramNdpWr, DramRd, DramRef, DramWr};
    use McDbMode::{DbNdpWr, DbRd, DbWr};
    use ProbeKind::{
        NdpDbRd, NdpDbWr, NdpDramRd, NdpDramWr, RdDbOrDram, RdNormal, RdPre, RdPrefetch, WrPre,
        WrPrefetch,
    };
    match (mc_db, db_dram) {
        (DbNdpWr, DramRef) => &[NdpDbWr],
        (DbNdpWr, DramRd) => &[NdpDbWr, RdPre, NdpDramRd],
        (DbNdpWr, DramWr | DramNdpWr) => &[NdpDbWr, WrPrefetch, NdpDramWr],
        (DbRd, DramRef) => &[RdPrefetch, NdpDbRd],
        (DbRd, DramRd) => &[RdPrefetch, RdNormal, RdPre, RdDbOrDram],
        (DbRd, DramWr | DramNdpWr) => &[RdPrefetch, NdpDbRd, WrPrefetch, NdpDramWr],
        (DbWr, DramRef) => &[WrPre],
        (DbWr, DramRd) => &[WrPre, RdPre, NdpDramRd],
        (DbWr, DramWr | DramNdpWr) => &[WrPre, WrPrefetch, NdpDramWr],
    }
}

fn same_bank(a: &CoordVec, b: &CoordVec) -> bool {
    a.channel == b.channel
        && a.pseudochannel == b.pseudochannel
        && a.rank == b.rank
        && a.bankgroup == b.bankgroup
        && a.bank == b.bank
}

#[derive(Default)]
struct PchCounters {
    rd_outstanding: usize,
    wr_outstanding: usize,
    ndp_db_rd_outstanding: usize,
    ndp_db_wr_outstanding: usize,
    ndp_dram_rd_outstanding: usize,
    ndp_dram_wr_outstanding: usize,
    ref_outstanding: usize,
    last_ndp_dram_wr_clk: u64,
}

struct PchState {
    read_buffer: RequestBuffer,
    write_buffer: RequestBuffer,
    priority_buffer: RequestBuffer,
    read_prefetch_buffer: RequestBuffer,
    write_prefetch_buffer: RequestBuffer,
    to_read_prefetch: VecDeque<(u64, Request)>,
    to_write_prefetch: VecDeque<(u64, Request)>,
    mc_db_mode: McDbMode,
    db_dram_mode: DbDramMode,
    mc_db_entered_clk: u64,
    db_dram_entered_clk: u64,
    counters: PchCounters,
    dram_ndp_rd_token: u32,
}

impl PchState {
    fn new(cfg: &ControllerConfig) -> Self {
        Self {
            read_buffer: RequestBuffer::new(cfg.read_buffer_capacity),
            write_buffer: RequestBuffer::new(cfg.write_buffer_capacity),
            priority_buffer: RequestBuffer::new(cfg.priority_buffer_capacity),
            read_prefetch_buffer: RequestBuffer::new(cfg.read_prefetch_buffer_capacity),
            write_prefetch_buffer: RequestBuffer::new(cfg.write_prefetch_buffer_capacity),
            to_read_prefetch: VecDeque::new(),
            to_write_prefetch: VecDeque::new(),
            mc_db_mode: McDbMode::DbRd,
            db_dram_mode: DbDramMode::DramRd,
            mc_db_entered_clk: 0,
            db_dram_entered_clk: 0,
            counters: PchCounters::default(),
            dram_ndp_rd_token: 0,
        }
    }

    fn ndp_outstanding(&self) -> usize {
        self.counters.ndp_db_rd_outstanding
            + self.counters.ndp_db_wr_outstanding
            + self.counters.ndp_dram_rd_outstanding
            + self.counters.ndp_dram_wr_outstanding
    }

    fn on_enqueue(&mut self, final_cmd: Command, clk: u64) {
        match final_cmd {
            Command::Rd => self.counters.rd_outstanding += 1,
            Command::Wr => self.counters.wr_outstanding += 1,
            Command::NdpDbRd => self.counters.ndp_db_rd_outstanding += 1,
            Command::NdpDbWr => self.counters.ndp_db_wr_outstanding += 1,
            Command::NdpDramRd => self.counters.ndp_dram_rd_outstanding += 1,
            Command::NdpDramWr => {
                self.counters.ndp_dram_wr_outstanding += 1;
                self.counters.last_ndp_dram_wr_clk = clk;
            }
            _ => {}
        }
    }

    fn on_retire(&mut self, final_cmd: Command) {
        match final_cmd {
            Command::Rd | Command::Rda => {
                self.counters.rd_outstanding = self.counters.rd_outstanding.saturating_sub(1);
            }
            Command::Wr | Command::Wra => {
                self.counters.wr_outstanding = self.counters.wr_outstanding.saturating_sub(1);
            }
            Command::NdpDbRd => {
                self.counters.ndp_db_rd_outstanding =
                    self.counters.ndp_db_rd_outstanding.saturating_sub(1);
            }
            Command::NdpDbWr => {
                self.counters.ndp_db_wr_outstanding =
                    self.counters.ndp_db_wr_outstanding.saturating_sub(1);
            }
            Command::NdpDramRd | Command::NdpDramRda => {
                self.counters.ndp_dram_rd_outstanding =
                    self.counters.ndp_dram_rd_outstanding.saturating_sub(1);
            }
            Command::NdpDramWr | Command::NdpDramWra => {
                self.counters.ndp_dram_wr_outstanding =
                    self.counters.ndp_dram_wr_outstanding.saturating_sub(1);
            }
            Command::Refab | Command::Refsb => {
                self.counters.ref_outstanding = self.counters.ref_outstanding.saturating_sub(1);
            }
            _ => {}
        }
    }

    fn request(&self, source: Source) -> Option<&Request> {
        match source {
            Source::Priority => self.priority_buffer.front(),
            Source::Read(i) => self.read_buffer.iter().nth(i),
            Source::Write(i) => self.write_buffer.iter().nth(i),
            Source::ReadPrefetch(i) => self.read_prefetch_buffer.iter().nth(i),
            Source::WritePrefetch(i) => self.write_prefetch_buffer.iter().nth(i),
            Source::Active(_) => None,
        }
    }

    fn request_mut(&mut self, source: Source) -> Option<&mut Request> {
        match source {
            Source::Priority => self.priority_buffer.iter_mut().next(),
            Source::Read(i) => self.read_buffer.iter_mut().nth(i),
            Source::Write(i) => self.write_buffer.iter_mut().nth(i),
            Source::ReadPrefetch(i) => self.read_prefetch_buffer.iter_mut().nth(i),
            Source::WritePrefetch(i) => self.write_prefetch_buffer.iter_mut().nth(i),
            Source::Active(_) => None,
        }
    }

    fn take(&mut self, source: Source) -> Request {
        match source {
            Source::Priority => self.priority_buffer.remove(0),
            Source::Read(i) => self.read_buffer.remove(i),
            Source::Write(i) => self.write_buffer.remove(i),
            Source::ReadPrefetch(i) => self.read_prefetch_buffer.remove(i),
            Source::WritePrefetch(i) => self.write_prefetch_buffer.remove(i),
            Source::Active(_) => unreachable!("active source is resolved against the channel-level buffer"),
        }
    }
}

fn row_cap_override(buffer: &RequestBuffer, winner: usize, dram: &DramDevice, row_policy: &RowPolicy) -> usize {
    let Some(win) = buffer.iter().nth(winner) else {
        return winner;
    };
    let win_addr = win.addr_vec;
    if row_policy.is_over_cap(&win_addr) && dram.check_rowbuffer_hit(&win_addr) {
        if let Some(alt) = buffer
            .iter()
            .position(|r| same_bank(&r.addr_vec, &win_addr) && r.addr_vec.row != win_addr.row)
        {
            return alt;
        }
    }
    winner
}

#[allow(clippy::too_many_arguments)]
fn run_probe(
    pch: &mut PchState,
    row_policy: &RowPolicy,
    dram: &DramDevice,
    kind: ProbeKind,
    token_consume: u32,
    db_prefetch_capacity: usize,
) -> Option<Source> {
    match kind {
        ProbeKind::NdpDbRd => {
            Scheduler::get_best_request_with_priority(dram, &mut pch.read_buffer, LUT_NDP_DB_RD).map(Source::Read)
        }
        ProbeKind::NdpDbWr => {
            Scheduler::get_best_request_with_priority(dram, &mut pch.write_buffer, LUT_NDP_DB_WR).map(Source::Write)
        }
        ProbeKind::NdpDramRd => {
            let idx = Scheduler::get_best_request_with_priority(dram, &mut pch.read_buffer, LUT_NDP_DRAM_RD)?;
            Some(Source::Read(row_cap_override(&pch.read_buffer, idx, dram, row_policy)))
        }
        ProbeKind::NdpDramWr => {
            let idx = Scheduler::get_best_request_with_priority(dram, &mut pch.write_buffer, LUT_NDP_DRAM_WR)?;
            Some(Source::Write(row_cap_override(&pch.write_buffer, idx, dram, row_policy)))
        }
        ProbeKind::RdNormal => {
            let idx = Scheduler::get_best_request_with_priority(dram, &mut pch.read_buffer, LUT_RD)?;
            Some(Source::Read(row_cap_override(&pch.read_buffer, idx, dram, row_policy)))
        }
        ProbeKind::RdDbOrDram => {
            Scheduler::get_best_request_with_priority(dram, &mut pch.read_buffer, LUT_NDP_DB_OR_DRAM_RD)
                .map(Source::Read)
        }
        ProbeKind::RdPrefetch => Scheduler::get_best_request(dram, &mut pch.read_prefetch_buffer).map(Source::ReadPrefetch),
        ProbeKind::WrPrefetch => {
            Scheduler::get_best_request(dram, &mut pch.write_prefetch_buffer).map(Source::WritePrefetch)
        }
        ProbeKind::RdPre => {
            if pch.counters.ndp_dram_rd_outstanding > 0 && pch.dram_ndp_rd_token < token_consume {
                return None;
            }
            let rd_staged = pch.read_prefetch_buffer.len() + pch.to_read_prefetch.len();
            let wr_staged = pch.write_prefetch_buffer.len() + pch.to_write_prefetch.len();
            Scheduler::get_best_pre_request(dram, &mut pch.read_buffer, rd_staged, wr_staged, db_prefetch_capacity)
                .map(Source::Read)
        }
        ProbeKind::WrPre => {
            let rd_staged = pch.read_prefetch_buffer.len() + pch.to_read_prefetch.len();
            let wr_staged = pch.write_prefetch_buffer.len() + pch.to_write_prefetch.len();
            Scheduler::get_best_pre_request(dram, &mut pch.write_buffer, rd_staged, wr_staged, db_prefetch_capacity)
                .map(Source::Write)
        }
    }
}

fn drain_staging(queue: &mut VecDeque<(u64, Request)>, target: &mut RequestBuffer, clk: u64) {
    while let Some((fire, _)) = queue.front() {
        if *fire > clk {
            break;
        }
        if let Some((_, req)) = queue.pop_front() {
            let _ = target.try_push(req);
        }
    }
}

/// Per-channel memory controller: request buffers, mode state machines, and
/// the scheduling pass that picks one command to issue per tick.
pub struct MemoryController {
    channel: i64,
    clk: u64,
    org: OrgConfig,
    controller_cfg: ControllerConfig,
    ndp_cfg: NdpConfig,
    pending: PendingQueue,
    active_buffer: RequestBuffer,
    pchs: Vec<PchState>,
    row_policy: RowPolicy,
    rr_index: usize,
    read_latency: u64,
    post_rd_transit: u64,
    post_wr_transit: u64,
}

impl MemoryController {
    /// Builds a controller for `channel` from resolved configuration.
    #[must_use]
    pub fn new(channel: i64, config: &Config) -> Self {
        let pchs = (0..config.org.pseudochannels)
            .map(|_| PchState::new(&config.controller))
            .collect();
        Self {
            channel,
            clk: 0,
            org: config.org.clone(),
            controller_cfg: config.controller.clone(),
            ndp_cfg: config.ndp.clone(),
            pending: PendingQueue::new(config.controller.pending_capacity),
            active_buffer: RequestBuffer::new(config.controller.active_buffer_capacity),
            pchs,
            row_policy: RowPolicy::new(config.controller.adaptive_row_cap, ADAPTIVE_ROW_CAP_LOW),
            rr_index: 0,
            read_latency: config.timing.n_cl + 4 * config.timing.n_bl,
            post_rd_transit: config.timing.n_bl,
            post_wr_transit: 4 * config.timing.n_bl,
        }
    }

    fn pch_index(&self, pch: i64) -> Option<usize> {
        if pch >= 0 && (pch as usize) < self.pchs.len() {
            Some(pch as usize)
        } else {
            None
        }
    }

    fn final_command_for(&self, req: &Request) -> Command {
        if req.is_ndp_req {
            if regions::is_control_register(&self.org, &req.addr_vec) {
                match req.kind {
                    ReqType::Read => Command::NdpDbRd,
                    ReqType::Write => Command::NdpDbWr,
                }
            } else {
                match req.kind {
                    ReqType::Read => Command::NdpDramRd,
                    ReqType::Write => Command::NdpDramWr,
                }
            }
        } else {
            match req.kind {
                ReqType::Read => Command::Rd,
                ReqType::Write => Command::Wr,
            }
        }
    }

    /// Enqueues a host or NDP request, rejecting it (returning `false`)
    /// without mutation if the destination buffer or NDP headroom is
    /// exhausted.
    pub fn send(&mut self, mut req: Request) -> bool {
        let final_command = self.final_command_for(&req);
        req.final_command = final_command;
        req.command = final_command;

        let Some(pch_idx) = self.pch_index(req.addr_vec.pseudochannel) else {
            return false;
        };

        if req.kind == ReqType::Read {
            let forwarded = self.pchs[pch_idx].write_buffer.position(|w| w.addr == req.addr).is_some();
            if forwarded {
                req.depart_clk = self.clk + 1;
                return self.pending.try_push(req);
            }
        }

        if req.is_ndp_req && self.pchs[pch_idx].ndp_outstanding() >= self.ndp_cfg.max_outstanding_per_pch {
            return false;
        }

        let clk = self.clk;
        let pushed = match req.kind {
            ReqType::Read => self.pchs[pch_idx].read_buffer.try_push(req),
            ReqType::Write => self.pchs[pch_idx].write_buffer.try_push(req),
        };
        if pushed {
            self.pchs[pch_idx].on_enqueue(final_command, clk);
        }
        pushed
    }

    /// Enqueues `req` on the priority path, used by
    /// [`crate::refresh::RefreshManager`].
    pub fn priority_send(&mut self, req: Request) -> bool {
        let Some(pch_idx) = self.pch_index(req.addr_vec.pseudochannel) else {
            return false;
        };
        let is_ref = req.final_command.is_refresh();
        let pushed = self.pchs[pch_idx].priority_buffer.try_push(req);
        if pushed && is_ref {
            self.pchs[pch_idx].counters.ref_outstanding += 1;
        }
        pushed
    }

    /// True if any NDP request for `pch` is still outstanding.
    #[must_use]
    pub fn has_outstanding_ndp(&self, pch: i64) -> bool {
        self.pch_index(pch).is_some_and(|idx| self.pchs[idx].ndp_outstanding() > 0)
    }

    /// Iterates `(pch, mc_db_mode, db_dram_mode)` for statistics.
    pub fn modes(&self) -> impl Iterator<Item = (i64, McDbMode, DbDramMode)> + '_ {
        self.pchs
            .iter()
            .enumerate()
            .map(|(i, p)| (i as i64, p.mc_db_mode, p.db_dram_mode))
    }

    /// True if every buffer (including staging and pending) is empty.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.pending.is_empty()
            && self.active_buffer.is_empty()
            && self.pchs.iter().all(|p| {
                p.read_buffer.is_empty()
                    && p.write_buffer.is_empty()
                    && p.priority_buffer.is_empty()
                    && p.read_prefetch_buffer.is_empty()
                    && p.write_prefetch_buffer.is_empty()
                    && p.to_read_prefetch.is_empty()
                    && p.to_write_prefetch.is_empty()
            })
    }

    fn closing_conflict(&self, addr: &CoordVec) -> bool {
        self.active_buffer.iter().any(|r| same_bank(&r.addr_vec, addr))
    }

    fn update_modes(&mut self, clk: u64) {
        let cfg = self.controller_cfg.clone();
        for pch in &mut self.pchs {
            let total_reads = pch.counters.rd_outstanding + pch.counters.ndp_dram_rd_outstanding;
            let total_writes = pch.counters.wr_outstanding + pch.counters.ndp_dram_wr_outstanding;
            let inputs = ModeInputs {
                host_writes_outstanding: pch.counters.wr_outstanding,
                write_buffer_capacity: pch.write_buffer.capacity(),
                ndp_db_wr_outstanding: pch.counters.ndp_db_wr_outstanding,
                reads_pending: !pch.read_buffer.is_empty() || !pch.read_prefetch_buffer.is_empty(),
                ref_pending: pch.counters.ref_outstanding > 0,
                ndp_dram_wr_aged_out: pch.counters.ndp_dram_wr_outstanding > 0
                    && clk.saturating_sub(pch.counters.last_ndp_dram_wr_clk) > cfg.ndp_wr_max_age,
                dram_writes_outstanding: total_writes,
                dram_reads_outstanding: total_reads,
                mc_db_dwell: clk.saturating_sub(pch.mc_db_entered_clk),
                db_dram_dwell: clk.saturating_sub(pch.db_dram_entered_clk),
            };
            let next_mc = mode::next_mc_db_mode(pch.mc_db_mode, &inputs, &cfg);
            if next_mc != pch.mc_db_mode {
                pch.mc_db_mode = next_mc;
                pch.mc_db_entered_clk = clk;
            }
            let next_db = mode::next_db_dram_mode(pch.db_dram_mode, &inputs, &cfg);
            if next_db != pch.db_dram_mode {
                pch.db_dram_mode = next_db;
                pch.db_dram_entered_clk = clk;
            }
        }
    }

    fn observe_row_conflicts(&mut self, dram: &DramDevice) {
        for pch in &self.pchs {
            for head in [pch.read_buffer.front(), pch.write_buffer.front()].into_iter().flatten() {
                if dram.check_node_open(&head.addr_vec) && !dram.check_rowbuffer_hit(&head.addr_vec) {
                    self.row_policy.observe_head_conflict(&head.addr_vec);
                }
            }
        }
    }

    fn schedule_one(&mut self, dram: &DramDevice) -> Option<(usize, Source)> {
        if let Some(idx) = Scheduler::get_best_request(dram, &mut self.active_buffer) {
            let pch_coord = self.active_buffer.iter().nth(idx)?.addr_vec.pseudochannel;
            if let Some(pch_idx) = self.pch_index(pch_coord) {
                return Some((pch_idx, Source::Active(idx)));
            }
        }

        let n = self.pchs.len();
        for offset in 0..n {
            let pch_idx = (self.rr_index + offset) % n;
            let pch = &mut self.pchs[pch_idx];
            let ready = if let Some(front) = pch.priority_buffer.iter_mut().next() {
                front.command = dram.get_preq_command(front.final_command, &front.addr_vec);
                dram.check_ready(front.command, &front.addr_vec)
            } else {
                false
            };
            if ready {
                return Some((pch_idx, Source::Priority));
            }
        }

        for offset in 0..n {
            let pch_idx = (self.rr_index + offset) % n;
            if let Some(source) = self.probe_pch(pch_idx, dram) {
                self.rr_index = (pch_idx + 1) % n;
                return Some((pch_idx, source));
            }
        }
        None
    }

    fn probe_pch(&mut self, pch_idx: usize, dram: &DramDevice) -> Option<Source> {
        let mc_db = self.pchs[pch_idx].mc_db_mode;
        let db_dram = self.pchs[pch_idx].db_dram_mode;
        let db_prefetch_capacity = self.controller_cfg.db_prefetch_capacity;
        for probe in probe_sequence(mc_db, db_dram) {
            let found = run_probe(
                &mut self.pchs[pch_idx],
                &self.row_policy,
                dram,
                *probe,
                DRAM_NDP_RD_TOKEN_CONSUME,
                db_prefetch_capacity,
            );
            let Some(source) = found else { continue };
            let Some(req) = self.pchs[pch_idx].request(source) else { continue };
            if req.command.is_closing() && self.closing_conflict(&req.addr_vec) {
                continue;
            }
            return Some(source);
        }
        None
    }

    fn request_ref(&self, pch_idx: usize, source: Source, clk: u64) -> SimResult<&Request> {
        let found = match source {
            Source::Active(i) => self.active_buffer.iter().nth(i),
            other => self.pchs[pch_idx].request(other),
        };
        found.ok_or_else(|| SimError::fatal_global(clk, "selected request vanished from its buffer before issue"))
    }

    fn request_mut_ref(&mut self, pch_idx: usize, source: Source, clk: u64) -> SimResult<&mut Request> {
        let found = match source {
            Source::Active(i) => self.active_buffer.iter_mut().nth(i),
            other => self.pchs[pch_idx].request_mut(other),
        };
        found.ok_or_else(|| SimError::fatal_global(clk, "selected request vanished from its buffer before issue"))
    }

    fn take_request(&mut self, pch_idx: usize, source: Source) -> Request {
        match source {
            Source::Active(i) => self.active_buffer.remove(i),
            other => self.pchs[pch_idx].take(other),
        }
    }

    fn issue_chosen(
        &mut self,
        dram: &mut DramDevice,
        pch_idx: usize,
        source: Source,
        clk: u64,
        completions: &mut Vec<CompletionRecord>,
    ) -> SimResult<IssuedEvent> {
        let req = self.request_ref(pch_idx, source, clk)?;
        let (cmd, addr, final_command) = (req.command, req.addr_vec, req.final_command);

        dram.issue_command(cmd, &addr)?;

        match cmd {
            Command::Act | Command::PAct => self.row_policy.on_act(&addr),
            Command::Rd
            | Command::Wr
            | Command::Rda
            | Command::Wra
            | Command::PreRd
            | Command::PreWr
            | Command::NdpDramRd
            | Command::NdpDramWr
            | Command::NdpDramRda
            | Command::NdpDramWra => self.row_policy.note_hit(&addr),
            _ => {}
        }

        if matches!(cmd, Command::NdpDramRd | Command::NdpDramRda) {
            let pch = &mut self.pchs[pch_idx];
            pch.dram_ndp_rd_token = (pch.dram_ndp_rd_token + DRAM_NDP_RD_TOKEN_GRANT).min(DRAM_NDP_RD_TOKEN_MAX);
        }
        if cmd == Command::PreRd {
            let pch = &mut self.pchs[pch_idx];
            pch.dram_ndp_rd_token = pch.dram_ndp_rd_token.saturating_sub(DRAM_NDP_RD_TOKEN_CONSUME);
        }

        if matches!(cmd, Command::NdpDbWr | Command::NdpDbRd) {
            self.service_ndp(dram, pch_idx, source, cmd, &addr, clk)?;
        }

        if cmd.is_opening() {
            let req = self.take_request(pch_idx, source);
            let _ = self.active_buffer.try_push(req);
        } else if cmd == final_command {
            self.retire(pch_idx, source, cmd, clk, completions)?;
        }

        Ok(IssuedEvent { pch: pch_idx as i64, command: cmd })
    }

    fn service_ndp(
        &mut self,
        dram: &mut DramDevice,
        pch_idx: usize,
        source: Source,
        cmd: Command,
        addr: &CoordVec,
        clk: u64,
    ) -> SimResult<()> {
        let Some(unit) = dram.ndp_unit_at(pch_idx) else {
            return Ok(());
        };
        match cmd {
            Command::NdpDbWr => {
                let Some(payload) = self.request_ref(pch_idx, source, clk)?.payload else {
                    return Err(SimError::fatal(clk, addr, "NDP_DB_WR issued without an 8-word payload"));
                };
                if regions::is_control_register(&self.org, addr) {
                    unit.write_control(&payload, clk, addr)?;
                } else {
                    let word_offset = addr.column.max(0) as usize;
                    unit.write_imem(word_offset, &payload, clk, addr)?;
                }
            }
            Command::NdpDbRd => {
                let issuable = matches!(unit.status, NdpUnitStatus::Idle | NdpUnitStatus::Done);
                self.request_mut_ref(pch_idx, source, clk)?.payload =
                    Some([u64::from(issuable), 0, 0, 0, 0, 0, 0, 0]);
            }
            _ => {}
        }
        Ok(())
    }

    fn retire(
        &mut self,
        pch_idx: usize,
        source: Source,
        cmd: Command,
        clk: u64,
        completions: &mut Vec<CompletionRecord>,
    ) -> SimResult<()> {
        let mut req = self.take_request(pch_idx, source);
        let kind = req.kind;

        match cmd {
            Command::PreRd | Command::PreRda => {
                req.final_command = Command::PostRd;
                req.command = Command::PostRd;
                let fire = clk + self.post_rd_transit;
                self.pchs[pch_idx].to_read_prefetch.push_back((fire, req));
            }
            Command::PreWr => {
                req.final_command = Command::PostWr;
                req.command = Command::PostWr;
                let fire = clk + self.post_wr_transit;
                self.pchs[pch_idx].to_write_prefetch.push_back((fire, req));
            }
            _ => {
                self.pchs[pch_idx].on_retire(cmd);
                if kind == ReqType::Read {
                    req.depart_clk = clk + self.read_latency;
                    if !self.pending.try_push(req) {
                        return Err(SimError::fatal_global(clk, "pending queue full on request completion"));
                    }
                }
                completions.push(CompletionRecord { pch: pch_idx as i64, kind });
            }
        }
        Ok(())
    }

    /// Advances the controller by one DRAM cycle: drains staged
    /// post-transfers, serves completed reads, advances the mode state
    /// machines, then issues at most one command.
    ///
    /// # Errors
    /// Propagates [`SimError::Fatal`] from the underlying DRAM device or
    /// from an NDP control-plane invariant violation.
    pub fn tick(&mut self, dram: &mut DramDevice, clk: u64) -> SimResult<TickOutcome> {
        self.clk = clk;
        let mut completions = Vec::new();

        for pch in &mut self.pchs {
            drain_staging(&mut pch.to_read_prefetch, &mut pch.read_prefetch_buffer, clk);
            drain_staging(&mut pch.to_write_prefetch, &mut pch.write_prefetch_buffer, clk);
        }

        while self.pending.front().is_some_and(|r| r.depart_clk <= clk) {
            let mut req = self.pending.remove(0);
            if let Some(mut cb) = req.callback.take() {
                cb(&req);
            }
            completions.push(CompletionRecord { pch: req.addr_vec.pseudochannel, kind: req.kind });
        }

        self.observe_row_conflicts(dram);
        self.update_modes(clk);

        let issued = match self.schedule_one(dram) {
            Some((pch_idx, source)) => Some(self.issue_chosen(dram, pch_idx, source, clk, &mut completions)?),
            None => None,
        };

        Ok(TickOutcome { completions, issued })
    }
}

impl RefreshHost for MemoryController {
    fn priority_send(&mut self, req: Request) -> bool {
        self.priority_send(req)
    }
}

impl NdpHost for MemoryController {
    fn has_outstanding_ndp(&self, pch: i64) -> bool {
        self.has_outstanding_ndp(pch)
    }

    fn send(&mut self, req: Request) -> bool {
        self.send(req)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::request::ReqType;
    use crate::config::Config;
    use crate::dram::DramDevice;

    fn addr(pch: i64, bank: i64, row: i64) -> CoordVec {
        CoordVec {
            channel: 0,
            pseudochannel: pch,
            rank: 0,
            bankgroup: 0,
            bank,
            row,
            ..CoordVec::unspecified()
        }
    }

    fn small_config() -> Config {
        let mut cfg = Config::default();
        cfg.org.pseudochannels = 1;
        cfg
    }

    #[test]
    fn send_rejects_when_buffer_is_full() {
        let cfg = small_config();
        let mut controller = MemoryController::new(0, &cfg);
        for i in 0..cfg.controller.read_buffer_capacity {
            let req = Request::new(ReqType::Read, 0, addr(0, 0, i as i64), i as u64, 0, Command::Rd);
            assert!(controller.send(req));
        }
        let overflow = Request::new(ReqType::Read, 0, addr(0, 0, 999), 999, 0, Command::Rd);
        assert!(!controller.send(overflow));
    }

    #[test]
    fn read_forwards_from_write_buffer_without_touching_dram() {
        let cfg = small_config();
        let mut controller = MemoryController::new(0, &cfg);
        let write = Request::new(ReqType::Write, 42, addr(0, 0, 0), 0, 0, Command::Wr);
        assert!(controller.send(write));
        let read = Request::new(ReqType::Read, 42, addr(0, 0, 0), 1, 0, Command::Rd);
        assert!(controller.send(read));
        assert_eq!(controller.pending.len(), 1);
        assert_eq!(controller.pchs[0].read_buffer.len(), 0);
    }

    #[test]
    fn cold_bank_read_completes_after_full_latency_chain() {
        let cfg = small_config();
        let mut controller = MemoryController::new(0, &cfg);
        let mut dram = DramDevice::new(&cfg.org, &cfg.timing, &cfg.ndp);
        let completed = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let completed_clone = std::sync::Arc::clone(&completed);
        let mut req = Request::new(ReqType::Read, 0, addr(0, 0, 5), 0, 0, Command::Rd);
        req.callback = Some(Box::new(move |_| completed_clone.store(true, std::sync::atomic::Ordering::Release)));
        assert!(controller.send(req));

        for clk in 1..2000u64 {
            dram.tick().unwrap();
            let _ = controller.tick(&mut dram, clk).unwrap();
            if completed.load(std::sync::atomic::Ordering::Acquire) {
                break;
            }
        }
        assert!(completed.load(std::sync::atomic::Ordering::Acquire), "read never completed within 2000 cycles");
    }
}
