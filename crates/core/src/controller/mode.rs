//! Decoupled MC<->DB / DB<->DRAM mode selection.
//!
//! The transition tables below follow a compact state table literally; the
//! exact watermark/dwell arithmetic that table leaves implicit (what counts
//! as "aged out", which counter a watermark compares against) is
//! reconstructed rather than transliterated — see DESIGN.md's
//! engineering-decision note for this module.

use crate::config::ControllerConfig;

/// Host-link mode: which traffic class the data buffer currently serves
///.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum McDbMode {
    /// Draining outstanding `NDP_DB_WR` traffic (launch-request / control
    /// writes) to the data buffer.
    DbNdpWr,
    /// Draining host reads through the data buffer.
    DbRd,
    /// Draining host writes through the data buffer.
    DbWr,
}

/// DRAM-link mode: which traffic class currently owns the DRAM array
///.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DbDramMode {
    /// A refresh is pending or in flight; nothing else may issue.
    DramRef,
    /// Servicing DRAM reads (host data-buffer prefetch or NDP-DRAM reads).
    DramRd,
    /// Servicing DRAM writes (host data-buffer writeback or NDP-DRAM
    /// writes).
    DramWr,
    /// Draining aged-out NDP-DRAM writes ahead of ordinary write traffic.
    DramNdpWr,
}

/// The counters and dwell timers the transition functions read every tick
///, gathered from one pseudo-channel's state.
pub struct ModeInputs {
    /// Outstanding host writes in the write buffer.
    pub host_writes_outstanding: usize,
    /// Configured capacity of the write buffer (watermarks are fractions
    /// of this).
    pub write_buffer_capacity: usize,
    /// Outstanding `NDP_DB_WR` requests (launch-request / control-register
    /// writes still queued).
    pub ndp_db_wr_outstanding: usize,
    /// True if any read is queued or prefetched for this pseudo-channel.
    pub reads_pending: bool,
    /// True if an all-bank (or same-bank) refresh is queued or in flight.
    pub ref_pending: bool,
    /// True if the oldest outstanding `NDP_DRAM_WR` has waited longer than
    /// `ndp_wr_max_age`.
    pub ndp_dram_wr_aged_out: bool,
    /// Outstanding DRAM-facing writes (host write-back + NDP-DRAM writes).
    pub dram_writes_outstanding: usize,
    /// Outstanding DRAM-facing reads (host prefetch + NDP-DRAM reads).
    pub dram_reads_outstanding: usize,
    /// Cycles since `mc_db_mode` last changed.
    pub mc_db_dwell: u64,
    /// Cycles since `db_dram_mode` last changed.
    pub db_dram_dwell: u64,
}

fn watermark(capacity: usize, fraction: f64) -> usize {
    ((capacity as f64) * fraction) as usize
}

/// Advances `current` by one step of the `mc_db_mode` transition table.
#[must_use]
pub fn next_mc_db_mode(current: McDbMode, inputs: &ModeInputs, cfg: &ControllerConfig) -> McDbMode {
    let hi = watermark(inputs.write_buffer_capacity, cfg.wr_high_watermark);
    let lo = watermark(inputs.write_buffer_capacity, cfg.wr_low_watermark);
    match current {
        McDbMode::DbNdpWr => {
            if inputs.ndp_db_wr_outstanding > 0 {
                McDbMode::DbNdpWr
            } else if inputs.host_writes_outstanding > hi {
                McDbMode::DbWr
            } else {
                McDbMode::DbRd
            }
        }
        McDbMode::DbWr => {
            let aged_out_with_reads =
                inputs.mc_db_dwell >= cfg.dram_rd_mode_min_time && inputs.reads_pending;
            if inputs.host_writes_outstanding > lo && !aged_out_with_reads {
                McDbMode::DbWr
            } else if inputs.ndp_db_wr_outstanding > 0 {
                McDbMode::DbNdpWr
            } else {
                McDbMode::DbRd
            }
        }
        McDbMode::DbRd => {
            if inputs.ndp_db_wr_outstanding > 0 {
                McDbMode::DbNdpWr
            } else {
                let rd_dwell_fresh = inputs.mc_db_dwell < cfg.dram_rd_mode_min_time;
                if inputs.host_writes_outstanding > hi && !(rd_dwell_fresh && inputs.reads_pending) {
                    McDbMode::DbWr
                } else {
                    McDbMode::DbRd
                }
            }
        }
    }
}

/// Advances `current` by one step of the `db_dram_mode` transition table.
///
/// Spec §4.4.1's table only names the `DRAM_WR`/`DRAM_NDP_WR`/`DRAM_RD`
/// rows as "analogous with their specific dwell constraints"; this
/// function is the concrete reconstruction.
#[must_use]
pub fn next_db_dram_mode(current: DbDramMode, inputs: &ModeInputs, cfg: &ControllerConfig) -> DbDramMode {
    let hi = watermark(inputs.write_buffer_capacity, cfg.wr_high_watermark);
    let lo = watermark(inputs.write_buffer_capacity, cfg.wr_low_watermark);
    let writes_busy = inputs.dram_writes_outstanding > hi || inputs.dram_reads_outstanding == 0;
    match current {
        DbDramMode::DramRef => {
            if inputs.ref_pending {
                DbDramMode::DramRef
            } else if inputs.ndp_dram_wr_aged_out {
                DbDramMode::DramNdpWr
            } else if writes_busy {
                DbDramMode::DramWr
            } else {
                DbDramMode::DramRd
            }
        }
        DbDramMode::DramWr => {
            if inputs.ref_pending {
                DbDramMode::DramRef
            } else if inputs.dram_writes_outstanding > lo && inputs.db_dram_dwell < cfg.ndp_wr_mode_min_time {
                DbDramMode::DramWr
            } else if inputs.ndp_dram_wr_aged_out {
                DbDramMode::DramNdpWr
            } else {
                DbDramMode::DramRd
            }
        }
        DbDramMode::DramNdpWr => {
            if inputs.ref_pending {
                DbDramMode::DramRef
            } else if inputs.db_dram_dwell < cfg.ndp_wr_mode_min_time {
                DbDramMode::DramNdpWr
            } else if writes_busy {
                DbDramMode::DramWr
            } else {
                DbDramMode::DramRd
            }
        }
        DbDramMode::DramRd => {
            if inputs.ref_pending {
                DbDramMode::DramRef
            } else if inputs.db_dram_dwell < cfg.dram_rd_mode_min_time && inputs.dram_reads_outstanding > 0 {
                DbDramMode::DramRd
            } else if inputs.ndp_dram_wr_aged_out {
                DbDramMode::DramNdpWr
            } else if inputs.dram_writes_outstanding > hi {
                DbDramMode::DramWr
            } else {
                DbDramMode::DramRd
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> ControllerConfig {
        ControllerConfig::default()
    }

    #[test]
    fn refresh_pending_always_wins_db_dram_mode() {
        let inputs = ModeInputs {
            host_writes_outstanding: 0,
            write_buffer_capacity: 64,
            ndp_db_wr_outstanding: 0,
            reads_pending: true,
            ref_pending: true,
            ndp_dram_wr_aged_out: true,
            dram_writes_outstanding: 100,
            dram_reads_outstanding: 100,
            mc_db_dwell: 0,
            db_dram_dwell: 0,
        };
        assert_eq!(
            next_db_dram_mode(DbDramMode::DramRd, &inputs, &cfg()),
            DbDramMode::DramRef
        );
        assert_eq!(
            next_db_dram_mode(DbDramMode::DramWr, &inputs, &cfg()),
            DbDramMode::DramRef
        );
    }

    #[test]
    fn ndp_db_wr_outstanding_forces_db_ndp_wr_mode() {
        let inputs = ModeInputs {
            host_writes_outstanding: 0,
            write_buffer_capacity: 64,
            ndp_db_wr_outstanding: 1,
            reads_pending: false,
            ref_pending: false,
            ndp_dram_wr_aged_out: false,
            dram_writes_outstanding: 0,
            dram_reads_outstanding: 0,
            mc_db_dwell: 0,
            db_dram_dwell: 0,
        };
        assert_eq!(
            next_mc_db_mode(McDbMode::DbRd, &inputs, &cfg()),
            McDbMode::DbNdpWr
        );
    }

    #[test]
    fn high_watermark_switches_read_mode_to_write() {
        let cfg = cfg();
        let hi = watermark(64, cfg.wr_high_watermark);
        let inputs = ModeInputs {
            host_writes_outstanding: hi + 1,
            write_buffer_capacity: 64,
            ndp_db_wr_outstanding: 0,
            reads_pending: false,
            ref_pending: false,
            ndp_dram_wr_aged_out: false,
            dram_writes_outstanding: 0,
            dram_reads_outstanding: 0,
            mc_db_dwell: cfg.dram_rd_mode_min_time,
            db_dram_dwell: 0,
        };
        assert_eq!(next_mc_db_mode(McDbMode::DbRd, &inputs, &cfg), McDbMode::DbWr);
    }
}
