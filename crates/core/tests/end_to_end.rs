//! End-to-end scenarios driving a whole [`MemorySystem`] through its public
//! `send`/`tick` surface: no internal field ever touched directly, since
//! these tests exercise exactly what a front-end (trace core or CLI) can
//! see.

use pch_ndp_sim_core::common::coord::CoordVec;
use pch_ndp_sim_core::common::command::Command;
use pch_ndp_sim_core::common::request::{ReqType, Request};
use pch_ndp_sim_core::config::Config;
use pch_ndp_sim_core::controller::IssuedEvent;
use pch_ndp_sim_core::mapper::AddrMapper;
use pch_ndp_sim_core::ndp::{encode_nl_request, DecodedNlRequest, NlOpcode};
use pch_ndp_sim_core::ndp::regions::{control_register_addr, launch_request_addr};
use pch_ndp_sim_core::system::MemorySystem;
use pch_ndp_sim_core::trace::TraceEntry;

use pretty_assertions::assert_eq;
use rstest::{fixture, rstest};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// One channel, one pseudo-channel, one rank, matching the preset values
/// the end-to-end latency numbers below are computed from.
#[fixture]
fn single_pch_config() -> Config {
    let mut cfg = Config::default();
    cfg.org.channels = 1;
    cfg.org.pseudochannels = 1;
    cfg.org.ranks = 1;
    cfg
}

fn read_req(addr: u64, source_id: u64) -> Request {
    Request::new(ReqType::Read, addr, CoordVec::unspecified(), source_id, 0, Command::Rd)
}

/// Ticks `system` until `stop` returns true or `budget` cycles elapse,
/// returning every issued command seen along the way.
fn run_until(system: &mut MemorySystem, budget: u64, mut stop: impl FnMut(&MemorySystem) -> bool) -> Vec<IssuedEvent> {
    let mut issued = Vec::new();
    for _ in 0..budget {
        let outcome = system.tick().unwrap();
        for channel in outcome {
            if let Some(event) = channel.issued {
                issued.push(event);
            }
        }
        if stop(system) {
            break;
        }
    }
    issued
}

#[rstest]
fn single_read_cold_bank_completes_within_the_rated_latency(single_pch_config: Config) {
    let mut system = MemorySystem::new(single_pch_config).unwrap();
    let timing = system.config().timing.clone();
    let expected = timing.n_rp + timing.n_rcd + timing.n_cl + 4 * timing.n_bl;

    let completed_at = Arc::new(AtomicU64::new(0));
    let completed_clone = Arc::clone(&completed_at);
    let mut req = read_req(0, 0);
    req.callback = Some(Box::new(move |_| {
        completed_clone.store(1, Ordering::Release);
    }));
    assert!(system.send(req).unwrap());

    let mut depart_clk = 0u64;
    for _ in 0..(expected + 50) {
        let _ = system.tick().unwrap();
        if completed_at.load(Ordering::Acquire) == 1 {
            depart_clk = system.clk();
            break;
        }
    }

    assert!(depart_clk > 0, "read never completed");
    // within 4 cycles of arbitration slack on top of the rated latency
    assert!(
        depart_clk >= expected && depart_clk <= expected + 4,
        "depart_clk {depart_clk} not within 4 cycles of rated latency {expected}"
    );
}

#[rstest]
fn two_reads_same_row_keep_the_row_open(single_pch_config: Config) {
    let mut system = MemorySystem::new(single_pch_config).unwrap();

    let first_done = Arc::new(AtomicU64::new(0));
    let second_done = Arc::new(AtomicU64::new(0));
    let first_clone = Arc::clone(&first_done);
    let second_clone = Arc::clone(&second_done);

    let mut first = read_req(0, 0);
    first.callback = Some(Box::new(move |_| {
        first_clone.store(1, Ordering::Release);
    }));
    let mut second = read_req(0x40, 1);
    second.callback = Some(Box::new(move |_| {
        second_clone.store(1, Ordering::Release);
    }));
    assert!(system.send(first).unwrap());
    assert!(system.send(second).unwrap());

    let mut first_clk = 0u64;
    let mut second_clk = 0u64;
    for _ in 0..400 {
        let _ = system.tick().unwrap();
        if first_clk == 0 && first_done.load(Ordering::Acquire) == 1 {
            first_clk = system.clk();
        }
        if second_clk == 0 && second_done.load(Ordering::Acquire) == 1 {
            second_clk = system.clk();
        }
        if first_clk > 0 && second_clk > 0 {
            break;
        }
    }

    assert!(first_clk > 0 && second_clk > 0, "both reads must complete");
    // No ACT/PRE cycle on the second access: it trails the first by far less
    // than a fresh row-open chain (nRP + nRCD) would cost.
    let gap = second_clk.saturating_sub(first_clk);
    let timing = system.config().timing.clone();
    assert!(gap < timing.n_rp + timing.n_rcd, "second read paid a row-open cost of {gap} cycles");
}

#[rstest]
fn two_reads_same_bank_different_rows_pay_a_precharge_and_activate(single_pch_config: Config) {
    let mapper = AddrMapper::new(&single_pch_config.org);
    let mut system = MemorySystem::new(single_pch_config).unwrap();
    let timing = system.config().timing.clone();

    let row_one = mapper.decompose(0);
    let mut row_two = row_one;
    row_two.row += 1;
    let second_addr = mapper.compose(&row_two);

    let first_done = Arc::new(AtomicU64::new(0));
    let second_done = Arc::new(AtomicU64::new(0));
    let first_clone = Arc::clone(&first_done);
    let second_clone = Arc::clone(&second_done);

    let mut first = read_req(0, 0);
    first.callback = Some(Box::new(move |_| {
        first_clone.store(1, Ordering::Release);
    }));
    let mut second = read_req(second_addr, 1);
    second.callback = Some(Box::new(move |_| {
        second_clone.store(1, Ordering::Release);
    }));
    assert!(system.send(first).unwrap());
    assert!(system.send(second).unwrap());

    let mut first_clk = 0u64;
    let mut second_clk = 0u64;
    for _ in 0..400 {
        let _ = system.tick().unwrap();
        if first_clk == 0 && first_done.load(Ordering::Acquire) == 1 {
            first_clk = system.clk();
        }
        if second_clk == 0 && second_done.load(Ordering::Acquire) == 1 {
            second_clk = system.clk();
        }
        if first_clk > 0 && second_clk > 0 {
            break;
        }
    }

    assert!(first_clk > 0 && second_clk > 0, "both reads must complete");
    let gap = second_clk.saturating_sub(first_clk);
    let row_conflict_cost = timing.n_rtp + timing.n_rp + timing.n_rcd;
    // The conflicting row forces a PRE/ACT cycle the first access never
    // paid; generous slack covers arbitration, not a different code path.
    assert!(gap >= row_conflict_cost, "second read's extra latency {gap} is below the row-conflict floor {row_conflict_cost}");
}

#[rstest]
fn refresh_interposed_delays_the_colliding_read_by_about_n_rfc(single_pch_config: Config) {
    let mut system = MemorySystem::new(single_pch_config).unwrap();
    let timing = system.config().timing.clone();

    // Load a single read timed to arrive exactly when all-bank refresh is
    // scheduled (RefreshManager::new seeds next_refresh_clk = n_refi).
    system.load_trace(vec![TraceEntry {
        clk: Some(timing.n_refi),
        kind: ReqType::Read,
        addr: 0,
        payload: None,
    }]);

    let mut arrive_clk = 0u64;
    let mut depart_clk = 0u64;
    for _ in 0..(timing.n_refi + timing.n_rfc + timing.n_rp + timing.n_rcd + timing.n_cl + 200) {
        let outcome = system.tick().unwrap();
        if arrive_clk == 0 && system.clk() >= timing.n_refi {
            arrive_clk = system.clk();
        }
        if outcome.iter().any(|c| c.completions.iter().any(|c| c.kind == ReqType::Read)) {
            depart_clk = system.clk();
            break;
        }
    }

    assert!(depart_clk > 0, "read delayed by refresh never completed");
    let latency = depart_clk.saturating_sub(arrive_clk);
    let baseline = timing.n_rp + timing.n_rcd + timing.n_cl + 4 * timing.n_bl;
    assert!(
        latency >= baseline + timing.n_rfc,
        "latency {latency} does not reflect the refresh-free baseline {baseline} plus nRFC {}",
        timing.n_rfc
    );
}

#[rstest]
fn write_to_read_forwarding_skips_dram_entirely(single_pch_config: Config) {
    let mut system = MemorySystem::new(single_pch_config).unwrap();

    // Legacy (untimed) lines: the write gets default timestamp 0, the read
    // default timestamp 1, so both land in the same tick's trace-core pump
    // once the clock reaches 1.
    system.load_trace(vec![
        TraceEntry {
            clk: None,
            kind: ReqType::Write,
            addr: 0x100,
            payload: Some([1, 2, 3, 4, 5, 6, 7, 8]),
        },
        TraceEntry {
            clk: None,
            kind: ReqType::Read,
            addr: 0x100,
            payload: None,
        },
    ]);

    let mut completed_at = 0u64;
    for _ in 0..10 {
        let outcome = system.tick().unwrap();
        if outcome.iter().any(|c| c.completions.iter().any(|c| c.kind == ReqType::Read)) {
            completed_at = system.clk();
            break;
        }
    }

    assert_eq!(completed_at, 2, "forwarded read should depart one cycle after both requests arrive at clk 1");
}

#[rstest]
fn ndp_start_runs_an_8_word_read_program_to_completion(single_pch_config: Config) {
    let org = single_pch_config.org.clone();
    let mapper = AddrMapper::new(&org);
    let mut system = MemorySystem::new(single_pch_config).unwrap();

    let mut control_addr = control_register_addr(&org);
    control_addr.channel = 0;
    let mut control_req = read_req(mapper.compose(&control_addr), 0);
    control_req.kind = ReqType::Write;
    control_req.payload = Some([1, 0, 0, 0, 0, 0, 0, 0]);
    assert!(system.send(control_req).unwrap());

    let rd = DecodedNlRequest {
        opcode: NlOpcode::Rd,
        opsize: 8,
        addr: {
            let mut a = CoordVec::unspecified();
            a.bankgroup = 0;
            a.bank = 0;
            a
        },
        id: 0,
        etc: 0,
    };
    let done = DecodedNlRequest { opcode: NlOpcode::Done, ..rd };
    let program = [encode_nl_request(&rd), encode_nl_request(&done), 0, 0, 0, 0, 0, 0];

    let mut launch_addr = launch_request_addr(&org);
    launch_addr.channel = 0;
    launch_addr.pseudochannel = 0;
    let mut launch_req = read_req(mapper.compose(&launch_addr), 1);
    launch_req.kind = ReqType::Write;
    launch_req.payload = Some(program);
    assert!(system.send(launch_req).unwrap());

    let issued = run_until(&mut system, 2000, |_| false);
    let ndp_rd_count = issued.iter().filter(|e| e.command == Command::NdpDramRd).count();
    assert_eq!(ndp_rd_count, 8, "an 8-column NL-request RD must fan out into exactly 8 NDP_DRAM_RD commands");
}

#[rstest]
fn ndp_start_runs_an_8_word_write_program_to_completion(single_pch_config: Config) {
    let org = single_pch_config.org.clone();
    let mapper = AddrMapper::new(&org);
    let mut system = MemorySystem::new(single_pch_config).unwrap();

    let mut control_addr = control_register_addr(&org);
    control_addr.channel = 0;
    let mut control_req = read_req(mapper.compose(&control_addr), 0);
    control_req.kind = ReqType::Write;
    control_req.payload = Some([1, 0, 0, 0, 0, 0, 0, 0]);
    assert!(system.send(control_req).unwrap());

    let wr = DecodedNlRequest {
        opcode: NlOpcode::Wr,
        opsize: 8,
        addr: {
            let mut a = CoordVec::unspecified();
            a.bankgroup = 0;
            a.bank = 0;
            a
        },
        id: 0,
        etc: 0,
    };
    let done = DecodedNlRequest { opcode: NlOpcode::Done, ..wr };
    let program = [encode_nl_request(&wr), encode_nl_request(&done), 0, 0, 0, 0, 0, 0];

    let mut launch_addr = launch_request_addr(&org);
    launch_addr.channel = 0;
    launch_addr.pseudochannel = 0;
    let mut launch_req = read_req(mapper.compose(&launch_addr), 1);
    launch_req.kind = ReqType::Write;
    launch_req.payload = Some(program);
    assert!(system.send(launch_req).unwrap());

    let issued = run_until(&mut system, 2000, |_| false);
    let ndp_wr_count = issued.iter().filter(|e| e.command == Command::NdpDramWr).count();
    let ndp_rd_count = issued.iter().filter(|e| e.command == Command::NdpDramRd).count();
    assert_eq!(ndp_wr_count, 8, "an 8-column NL-request WR must fan out into exactly 8 NDP_DRAM_WR commands");
    assert_eq!(ndp_rd_count, 0, "a WR NL-request must never be issued as an NDP_DRAM_RD");
}
