//! Configuration system for the DDR5 pCH/NDP simulator.
//!
//! This module defines the nested, `serde`-deserializable configuration
//! layout the simulator is driven from. It provides:
//! 1. **Defaults:** baseline organization, timing, and controller constants.
//! 2. **Structures:** one struct per top-level group (`org`, `timing`,
//!    `voltage`/`current`, `rfm`, `controller`, `system`).
//! 3. **Presets:** named organization and speed-bin presets, resolved at
//!    [`Config::resolve`] time rather than at parse time, since `org`/
//!    `timing` name presets that expand into full parameter sets.
//!
//! Configuration is supplied as JSON, or via `Config::default()` for quick
//! runs. There is no TOML front-end.

use serde::Deserialize;

use crate::common::error::SimError;

/// Default configuration constants for the simulator.
mod defaults {
    /// Default organization preset name.
    pub const ORG_PRESET: &str = "DDR5_16Gb_x8";

    /// Default speed-bin preset name.
    pub const TIMING_PRESET: &str = "DDR5_4800B";

    /// DRAM clock period in picoseconds for the `DDR5_4800B` speed bin
    /// (DDR5-4800, tCK = 2 / 4800 MHz).
    pub const TCK_PS_4800B: u64 = 416;

    /// Pseudo-channels per channel.
    pub const PSEUDOCHANNELS: usize = 2;
    /// Narrow-I/O paths per pseudo-channel (always 1: the host-facing link).
    pub const NARROW_IO: usize = 1;
    /// Wide-I/O paths per pseudo-channel (always 1: the DRAM-facing link).
    pub const WIDE_IO: usize = 1;
    /// Ranks per pseudo-channel.
    pub const RANKS: usize = 1;
    /// Bank groups per rank (x8/x4 density).
    pub const BANKGROUPS: usize = 8;
    /// Banks per bank group.
    pub const BANKS: usize = 4;
    /// Rows per bank for a 16 Gb x8 device.
    pub const ROWS: usize = 65536;
    /// Columns per row.
    pub const COLUMNS: usize = 1024;
    /// DQ width in bits.
    pub const DQ: usize = 8;
    /// Device density in gigabits.
    pub const DENSITY_GB: u32 = 16;

    /// `nRCD`: ACT-to-RD/WR, in cycles, for `DDR5_4800B`.
    pub const N_RCD: u64 = 39;
    /// `nRP`: PRE-to-ACT, in cycles.
    pub const N_RP: u64 = 39;
    /// `nCL`: RD-to-data, in cycles.
    pub const N_CL: u64 = 40;
    /// `nCWL`: WR-to-data, in cycles.
    pub const N_CWL: u64 = 40;
    /// `nBL`: burst length transfer time, in cycles.
    pub const N_BL: u64 = 8;
    /// `nRAS`: ACT-to-PRE, in cycles.
    pub const N_RAS: u64 = 74;
    /// `nCCD`: back-to-back column command spacing (different bank group).
    pub const N_CCD: u64 = 8;
    /// `nCCDS_WR`: back-to-back column command spacing (same bank group).
    pub const N_CCDS_WR: u64 = 4;
    /// `nFAW`: four-activation window.
    pub const N_FAW: u64 = 32;
    /// `nRRD`: ACT-to-ACT spacing.
    pub const N_RRD: u64 = 8;
    /// `nRTP`: RD-to-PRE spacing.
    pub const N_RTP: u64 = 18;
    /// `nRFC`: refresh completion latency.
    pub const N_RFC: u64 = 410;
    /// `nREFI`: average refresh interval.
    pub const N_REFI: u64 = 3904;

    /// Refresh-manager prefetch-advisory window, in cycles before `nREFI`.
    pub const REFRESH_PREFETCH_WINDOW: u64 = 8 * 24;

    /// Default BRC (bank refresh count) for the RFM policy.
    pub const RFM_BRC: u32 = 2;
    /// Default row-hammer radius for the RFM policy.
    pub const RFM_RH_RADIUS: u32 = 2;

    /// Write-buffer low watermark, as a fraction of capacity.
    pub const WR_LOW_WATERMARK: f64 = 0.2;
    /// Write-buffer high watermark, as a fraction of capacity.
    pub const WR_HIGH_WATERMARK: f64 = 0.8;
    /// Maximum age (cycles) before an outstanding NDP-DRAM write forces a
    /// mode switch into `DRAM_NDP_WR`.
    pub const NDP_WR_MAX_AGE: u64 = 512;
    /// Minimum dwell time in `DRAM_NDP_WR` once entered.
    pub const NDP_WR_MODE_MIN_TIME: u64 = 512;
    /// Minimum dwell time in `DRAM_RD` once entered.
    pub const DRAM_RD_MODE_MIN_TIME: u64 = 512;
    /// NDP read-buffer high-threshold fraction (of buffer capacity).
    pub const NDP_READ_HIGH_THRESHOLD: f64 = 0.75;
    /// NDP read-buffer low-threshold fraction.
    pub const NDP_READ_LOW_THRESHOLD: f64 = 0.25;
    /// NDP write-buffer high-threshold fraction.
    pub const NDP_WRITE_HIGH_THRESHOLD: f64 = 0.75;
    /// NDP write-buffer low-threshold fraction.
    pub const NDP_WRITE_LOW_THRESHOLD: f64 = 0.25;

    /// Adaptive row-buffer cap applied when a conflicting request is
    /// waiting behind the open row. Unexplained in the
    /// source; preserved as-is.
    pub const ADAPTIVE_ROW_CAP_LOW: u32 = 16;
    /// Row-buffer cap restored on `ACT`.
    pub const ADAPTIVE_ROW_CAP_DEFAULT: u32 = 128;

    /// Token bucket ceiling for `m_dram_ndp_rd_token`.
    pub const DRAM_NDP_RD_TOKEN_MAX: u32 = 128;
    /// Tokens granted per issued `NDP_DRAM_RD`.
    pub const DRAM_NDP_RD_TOKEN_GRANT: u32 = 1;
    /// Tokens consumed per issued `PRE_RD`.
    pub const DRAM_NDP_RD_TOKEN_CONSUME: u32 = 16;

    /// Per-pseudo-channel buffer capacities.
    pub const READ_BUFFER_CAPACITY: usize = 64;
    pub const WRITE_BUFFER_CAPACITY: usize = 64;
    pub const PRIORITY_BUFFER_CAPACITY: usize = 16;
    pub const READ_PREFETCH_BUFFER_CAPACITY: usize = 32;
    pub const WRITE_PREFETCH_BUFFER_CAPACITY: usize = 32;
    pub const ACTIVE_BUFFER_CAPACITY: usize = 32;
    pub const PENDING_CAPACITY: usize = 128;

    /// DB prefetch-counter bound.
    pub const DB_PREFETCH_CAPACITY: i64 = 32;

    /// DIMM-level launch-request buffer capacity, in 64-bit words.
    pub const DIMM_LAUNCH_BUFFER_CAPACITY: usize = 1024;
    /// Per-pseudo-channel NL-request slot array capacity.
    pub const NL_REQUEST_SLOT_CAPACITY: usize = 16;
    /// Per-pseudo-channel address-generator slot array capacity.
    pub const ADDR_GEN_SLOT_CAPACITY: usize = 8;
    /// NDP instruction memory size, in bytes.
    pub const NDP_IMEM_BYTES: usize = 8 * 1024;
    /// `WAIT` status re-arm period, in cycles (`64 * 10`).
    pub const NDP_WAIT_REARM_CYCLES: u64 = 64 * 10;

    /// Default trace-core MSHR size.
    pub const TRACE_CORE_MSHR_SIZE: usize = 32;
    /// Idle interval, in cycles, before the trace core rewinds its trace.
    pub const TRACE_CORE_REWIND_IDLE_CYCLES: u64 = 1000;
}

/// DRAM organization: preset name plus the per-level counts it expands
/// into.
#[derive(Debug, Clone, Deserialize)]
pub struct OrgConfig {
    /// Organization preset name, e.g. `DDR5_16Gb_x8`.
    #[serde(default = "OrgConfig::default_preset")]
    pub preset: String,
    /// DQ width in bits.
    #[serde(default = "OrgConfig::default_dq")]
    pub dq: usize,
    /// Device density in gigabits.
    #[serde(default = "OrgConfig::default_density_gb")]
    pub density_gb: u32,
    /// Channels in the system.
    #[serde(default = "OrgConfig::default_channels")]
    pub channels: usize,
    /// Pseudo-channels per channel.
    #[serde(default = "OrgConfig::default_pseudochannels")]
    pub pseudochannels: usize,
    /// Ranks per pseudo-channel.
    #[serde(default = "OrgConfig::default_ranks")]
    pub ranks: usize,
    /// Bank groups per rank.
    #[serde(default = "OrgConfig::default_bankgroups")]
    pub bankgroups: usize,
    /// Banks per bank group.
    #[serde(default = "OrgConfig::default_banks")]
    pub banks: usize,
    /// Rows per bank.
    #[serde(default = "OrgConfig::default_rows")]
    pub rows: usize,
    /// Columns per row.
    #[serde(default = "OrgConfig::default_columns")]
    pub columns: usize,
}

impl OrgConfig {
    fn default_preset() -> String {
        defaults::ORG_PRESET.to_string()
    }
    fn default_dq() -> usize {
        defaults::DQ
    }
    fn default_density_gb() -> u32 {
        defaults::DENSITY_GB
    }
    fn default_channels() -> usize {
        1
    }
    fn default_pseudochannels() -> usize {
        defaults::PSEUDOCHANNELS
    }
    fn default_ranks() -> usize {
        defaults::RANKS
    }
    fn default_bankgroups() -> usize {
        defaults::BANKGROUPS
    }
    fn default_banks() -> usize {
        defaults::BANKS
    }
    fn default_rows() -> usize {
        defaults::ROWS
    }
    fn default_columns() -> usize {
        defaults::COLUMNS
    }

    /// Validates that the configured density is consistent with
    /// `bankgroups * banks * rows * columns * dq` and is at least 16 Gb, the
    /// floor required for the pseudo-channel model.
    pub fn validate(&self) -> Result<(), SimError> {
        if self.density_gb < 16 {
            return Err(SimError::config(format!(
                "density {}Gb is below the 16Gb floor required for the pseudo-channel model",
                self.density_gb
            )));
        }
        let bits_per_bank = self.rows * self.columns * self.dq;
        let total_bits = bits_per_bank * self.bankgroups * self.banks;
        let expected_bits = (self.density_gb as usize) * 1024 * 1024 * 1024;
        if total_bits != expected_bits {
            return Err(SimError::config(format!(
                "density {}Gb is inconsistent with bankgroups({}) * banks({}) * rows({}) * columns({}) * dq({})",
                self.density_gb, self.bankgroups, self.banks, self.rows, self.columns, self.dq
            )));
        }
        Ok(())
    }
}

impl Default for OrgConfig {
    fn default() -> Self {
        Self {
            preset: Self::default_preset(),
            dq: Self::default_dq(),
            density_gb: Self::default_density_gb(),
            channels: Self::default_channels(),
            pseudochannels: Self::default_pseudochannels(),
            ranks: Self::default_ranks(),
            bankgroups: Self::default_bankgroups(),
            banks: Self::default_banks(),
            rows: Self::default_rows(),
            columns: Self::default_columns(),
        }
    }
}

/// JEDEC timing parameters, all in DRAM clock cycles.
///
/// Overrides may be supplied in nanoseconds via a `tXXX` field and rounded
/// up via [`TimingConfig::ns_to_cycles`]; this struct always stores the
/// resolved cycle counts.
#[derive(Debug, Clone, Deserialize)]
pub struct TimingConfig {
    /// Speed-bin preset name, e.g. `DDR5_4800B`.
    #[serde(default = "TimingConfig::default_preset")]
    pub preset: String,
    /// DRAM clock period, in picoseconds.
    #[serde(default = "TimingConfig::default_tck_ps")]
    pub tck_ps: u64,
    #[serde(default = "TimingConfig::default_n_rcd")]
    pub n_rcd: u64,
    #[serde(default = "TimingConfig::default_n_rp")]
    pub n_rp: u64,
    #[serde(default = "TimingConfig::default_n_cl")]
    pub n_cl: u64,
    #[serde(default = "TimingConfig::default_n_cwl")]
    pub n_cwl: u64,
    #[serde(default = "TimingConfig::default_n_bl")]
    pub n_bl: u64,
    #[serde(default = "TimingConfig::default_n_ras")]
    pub n_ras: u64,
    #[serde(default = "TimingConfig::default_n_ccd")]
    pub n_ccd: u64,
    #[serde(default = "TimingConfig::default_n_ccds_wr")]
    pub n_ccds_wr: u64,
    #[serde(default = "TimingConfig::default_n_faw")]
    pub n_faw: u64,
    #[serde(default = "TimingConfig::default_n_rrd")]
    pub n_rrd: u64,
    #[serde(default = "TimingConfig::default_n_rtp")]
    pub n_rtp: u64,
    #[serde(default = "TimingConfig::default_n_rfc")]
    pub n_rfc: u64,
    #[serde(default = "TimingConfig::default_n_refi")]
    pub n_refi: u64,
}

impl TimingConfig {
    fn default_preset() -> String {
        defaults::TIMING_PRESET.to_string()
    }
    fn default_tck_ps() -> u64 {
        defaults::TCK_PS_4800B
    }
    fn default_n_rcd() -> u64 {
        defaults::N_RCD
    }
    fn default_n_rp() -> u64 {
        defaults::N_RP
    }
    fn default_n_cl() -> u64 {
        defaults::N_CL
    }
    fn default_n_cwl() -> u64 {
        defaults::N_CWL
    }
    fn default_n_bl() -> u64 {
        defaults::N_BL
    }
    fn default_n_ras() -> u64 {
        defaults::N_RAS
    }
    fn default_n_ccd() -> u64 {
        defaults::N_CCD
    }
    fn default_n_ccds_wr() -> u64 {
        defaults::N_CCDS_WR
    }
    fn default_n_faw() -> u64 {
        defaults::N_FAW
    }
    fn default_n_rrd() -> u64 {
        defaults::N_RRD
    }
    fn default_n_rtp() -> u64 {
        defaults::N_RTP
    }
    fn default_n_rfc() -> u64 {
        defaults::N_RFC
    }
    fn default_n_refi() -> u64 {
        defaults::N_REFI
    }

    /// JEDEC round-up rule: `ceil(t_ns * 1000 / tCK_ps)`.
    #[must_use]
    pub fn ns_to_cycles(&self, t_ns: f64) -> u64 {
        let ps = t_ns * 1000.0;
        (ps / self.tck_ps as f64).ceil() as u64
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            preset: Self::default_preset(),
            tck_ps: Self::default_tck_ps(),
            n_rcd: Self::default_n_rcd(),
            n_rp: Self::default_n_rp(),
            n_cl: Self::default_n_cl(),
            n_cwl: Self::default_n_cwl(),
            n_bl: Self::default_n_bl(),
            n_ras: Self::default_n_ras(),
            n_ccd: Self::default_n_ccd(),
            n_ccds_wr: Self::default_n_ccds_wr(),
            n_faw: Self::default_n_faw(),
            n_rrd: Self::default_n_rrd(),
            n_rtp: Self::default_n_rtp(),
            n_rfc: Self::default_n_rfc(),
            n_refi: Self::default_n_refi(),
        }
    }
}

/// Power-stat preset names. The power model
/// is a passive accumulator keyed off issued commands; these
/// presets are carried opaquely and never inspected by the core.
#[derive(Debug, Clone, Deserialize)]
pub struct PowerConfig {
    /// Voltage preset name, if configured.
    #[serde(default)]
    pub voltage_preset: Option<String>,
    /// Current preset name, if configured.
    #[serde(default)]
    pub current_preset: Option<String>,
}

impl Default for PowerConfig {
    fn default() -> Self {
        Self {
            voltage_preset: None,
            current_preset: None,
        }
    }
}

/// Refresh-management configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RfmConfig {
    /// Bank refresh count.
    #[serde(default = "RfmConfig::default_brc")]
    pub brc: u32,
    /// Row-hammer radius.
    #[serde(default = "RfmConfig::default_rh_radius")]
    pub rh_radius: u32,
}

impl RfmConfig {
    fn default_brc() -> u32 {
        defaults::RFM_BRC
    }
    fn default_rh_radius() -> u32 {
        defaults::RFM_RH_RADIUS
    }
}

impl Default for RfmConfig {
    fn default() -> Self {
        Self {
            brc: Self::default_brc(),
            rh_radius: Self::default_rh_radius(),
        }
    }
}

/// Memory controller configuration: watermarks, dwell timers, NDP
/// thresholds, buffer capacities.
#[derive(Debug, Clone, Deserialize)]
pub struct ControllerConfig {
    #[serde(default = "ControllerConfig::default_wr_low_watermark")]
    pub wr_low_watermark: f64,
    #[serde(default = "ControllerConfig::default_wr_high_watermark")]
    pub wr_high_watermark: f64,
    #[serde(default = "ControllerConfig::default_ndp_wr_max_age")]
    pub ndp_wr_max_age: u64,
    #[serde(default = "ControllerConfig::default_ndp_wr_mode_min_time")]
    pub ndp_wr_mode_min_time: u64,
    #[serde(default = "ControllerConfig::default_dram_rd_mode_min_time")]
    pub dram_rd_mode_min_time: u64,
    #[serde(default = "ControllerConfig::default_ndp_read_high_threshold")]
    pub ndp_read_high_threshold: f64,
    #[serde(default = "ControllerConfig::default_ndp_read_low_threshold")]
    pub ndp_read_low_threshold: f64,
    #[serde(default = "ControllerConfig::default_ndp_write_high_threshold")]
    pub ndp_write_high_threshold: f64,
    #[serde(default = "ControllerConfig::default_ndp_write_low_threshold")]
    pub ndp_write_low_threshold: f64,
    #[serde(default = "ControllerConfig::default_adaptive_row_cap")]
    pub adaptive_row_cap: u32,
    #[serde(default = "ControllerConfig::default_read_buffer_capacity")]
    pub read_buffer_capacity: usize,
    #[serde(default = "ControllerConfig::default_write_buffer_capacity")]
    pub write_buffer_capacity: usize,
    #[serde(default = "ControllerConfig::default_priority_buffer_capacity")]
    pub priority_buffer_capacity: usize,
    #[serde(default = "ControllerConfig::default_read_prefetch_buffer_capacity")]
    pub read_prefetch_buffer_capacity: usize,
    #[serde(default = "ControllerConfig::default_write_prefetch_buffer_capacity")]
    pub write_prefetch_buffer_capacity: usize,
    #[serde(default = "ControllerConfig::default_active_buffer_capacity")]
    pub active_buffer_capacity: usize,
    #[serde(default = "ControllerConfig::default_pending_capacity")]
    pub pending_capacity: usize,
    /// Bound on `pending_PRE_RD + pending_PRE_WR - posted_POST_RD -
    /// posted_POST_WR`.
    #[serde(default = "ControllerConfig::default_db_prefetch_capacity")]
    pub db_prefetch_capacity: usize,
}

impl ControllerConfig {
    fn default_wr_low_watermark() -> f64 {
        defaults::WR_LOW_WATERMARK
    }
    fn default_wr_high_watermark() -> f64 {
        defaults::WR_HIGH_WATERMARK
    }
    fn default_ndp_wr_max_age() -> u64 {
        defaults::NDP_WR_MAX_AGE
    }
    fn default_ndp_wr_mode_min_time() -> u64 {
        defaults::NDP_WR_MODE_MIN_TIME
    }
    fn default_dram_rd_mode_min_time() -> u64 {
        defaults::DRAM_RD_MODE_MIN_TIME
    }
    fn default_ndp_read_high_threshold() -> f64 {
        defaults::NDP_READ_HIGH_THRESHOLD
    }
    fn default_ndp_read_low_threshold() -> f64 {
        defaults::NDP_READ_LOW_THRESHOLD
    }
    fn default_ndp_write_high_threshold() -> f64 {
        defaults::NDP_WRITE_HIGH_THRESHOLD
    }
    fn default_ndp_write_low_threshold() -> f64 {
        defaults::NDP_WRITE_LOW_THRESHOLD
    }
    fn default_adaptive_row_cap() -> u32 {
        defaults::ADAPTIVE_ROW_CAP_DEFAULT
    }
    fn default_read_buffer_capacity() -> usize {
        defaults::READ_BUFFER_CAPACITY
    }
    fn default_write_buffer_capacity() -> usize {
        defaults::WRITE_BUFFER_CAPACITY
    }
    fn default_priority_buffer_capacity() -> usize {
        defaults::PRIORITY_BUFFER_CAPACITY
    }
    fn default_read_prefetch_buffer_capacity() -> usize {
        defaults::READ_PREFETCH_BUFFER_CAPACITY
    }
    fn default_write_prefetch_buffer_capacity() -> usize {
        defaults::WRITE_PREFETCH_BUFFER_CAPACITY
    }
    fn default_active_buffer_capacity() -> usize {
        defaults::ACTIVE_BUFFER_CAPACITY
    }
    fn default_pending_capacity() -> usize {
        defaults::PENDING_CAPACITY
    }
    fn default_db_prefetch_capacity() -> usize {
        defaults::DB_PREFETCH_CAPACITY as usize
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            wr_low_watermark: Self::default_wr_low_watermark(),
            wr_high_watermark: Self::default_wr_high_watermark(),
            ndp_wr_max_age: Self::default_ndp_wr_max_age(),
            ndp_wr_mode_min_time: Self::default_ndp_wr_mode_min_time(),
            dram_rd_mode_min_time: Self::default_dram_rd_mode_min_time(),
            ndp_read_high_threshold: Self::default_ndp_read_high_threshold(),
            ndp_read_low_threshold: Self::default_ndp_read_low_threshold(),
            ndp_write_high_threshold: Self::default_ndp_write_high_threshold(),
            ndp_write_low_threshold: Self::default_ndp_write_low_threshold(),
            adaptive_row_cap: Self::default_adaptive_row_cap(),
            read_buffer_capacity: Self::default_read_buffer_capacity(),
            write_buffer_capacity: Self::default_write_buffer_capacity(),
            priority_buffer_capacity: Self::default_priority_buffer_capacity(),
            read_prefetch_buffer_capacity: Self::default_read_prefetch_buffer_capacity(),
            write_prefetch_buffer_capacity: Self::default_write_prefetch_buffer_capacity(),
            active_buffer_capacity: Self::default_active_buffer_capacity(),
            pending_capacity: Self::default_pending_capacity(),
            db_prefetch_capacity: Self::default_db_prefetch_capacity(),
        }
    }
}

/// Memory-system-level configuration: trace-core injection and NDP type
/// selection.
#[derive(Debug, Clone, Deserialize)]
pub struct SystemConfig {
    /// Enables trace-core request injection.
    #[serde(default)]
    pub trace_core_enable: bool,
    /// Outstanding-read bound for the trace core's MSHR table.
    #[serde(default = "SystemConfig::default_trace_core_mshr_size")]
    pub trace_core_mshr_size: usize,
    /// Path to the trace file.
    #[serde(default)]
    pub trace_path: Option<String>,
    /// Selects which NDP program type the trace core, if any, drives.
    #[serde(default)]
    pub trace_ndp_type: Option<String>,
}

impl SystemConfig {
    fn default_trace_core_mshr_size() -> usize {
        defaults::TRACE_CORE_MSHR_SIZE
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            trace_core_enable: false,
            trace_core_mshr_size: Self::default_trace_core_mshr_size(),
            trace_path: None,
            trace_ndp_type: None,
        }
    }
}

/// NDP control-plane capacities, separate from the main named groups but
/// required to size the launch-request buffer and slot arrays.
#[derive(Debug, Clone, Deserialize)]
pub struct NdpConfig {
    #[serde(default = "NdpConfig::default_dimm_launch_buffer_capacity")]
    pub dimm_launch_buffer_capacity: usize,
    #[serde(default = "NdpConfig::default_nl_request_slot_capacity")]
    pub nl_request_slot_capacity: usize,
    #[serde(default = "NdpConfig::default_addr_gen_slot_capacity")]
    pub addr_gen_slot_capacity: usize,
    #[serde(default = "NdpConfig::default_imem_bytes")]
    pub imem_bytes: usize,
    #[serde(default = "NdpConfig::default_wait_rearm_cycles")]
    pub wait_rearm_cycles: u64,
    /// Per-pseudo-channel cap on outstanding NDP requests the controller
    /// will admit before `send()` rejects further ones.
    #[serde(default = "NdpConfig::default_max_outstanding_per_pch")]
    pub max_outstanding_per_pch: usize,
}

impl NdpConfig {
    fn default_dimm_launch_buffer_capacity() -> usize {
        defaults::DIMM_LAUNCH_BUFFER_CAPACITY
    }
    fn default_nl_request_slot_capacity() -> usize {
        defaults::NL_REQUEST_SLOT_CAPACITY
    }
    fn default_addr_gen_slot_capacity() -> usize {
        defaults::ADDR_GEN_SLOT_CAPACITY
    }
    fn default_imem_bytes() -> usize {
        defaults::NDP_IMEM_BYTES
    }
    fn default_wait_rearm_cycles() -> u64 {
        defaults::NDP_WAIT_REARM_CYCLES
    }
    fn default_max_outstanding_per_pch() -> usize {
        defaults::DB_PREFETCH_CAPACITY as usize
    }
}

impl Default for NdpConfig {
    fn default() -> Self {
        Self {
            dimm_launch_buffer_capacity: Self::default_dimm_launch_buffer_capacity(),
            nl_request_slot_capacity: Self::default_nl_request_slot_capacity(),
            addr_gen_slot_capacity: Self::default_addr_gen_slot_capacity(),
            imem_bytes: Self::default_imem_bytes(),
            wait_rearm_cycles: Self::default_wait_rearm_cycles(),
            max_outstanding_per_pch: Self::default_max_outstanding_per_pch(),
        }
    }
}

/// Root configuration structure containing all simulator settings.
///
/// # Examples
///
/// ```
/// use pch_ndp_sim_core::config::Config;
///
/// let config = Config::default();
/// assert_eq!(config.org.pseudochannels, 2);
/// assert_eq!(config.timing.n_rcd, 39);
/// ```
///
/// Deserializing from JSON with overrides:
///
/// ```
/// use pch_ndp_sim_core::config::Config;
///
/// let json = r#"{
///     "org": { "channels": 1, "pseudochannels": 2 },
///     "timing": { "n_rcd": 40 },
///     "controller": { "wr_high_watermark": 0.9 }
/// }"#;
///
/// let config: Config = serde_json::from_str(json).unwrap();
/// assert_eq!(config.timing.n_rcd, 40);
/// assert_eq!(config.controller.wr_high_watermark, 0.9);
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// DRAM organization (preset + per-level counts).
    #[serde(default)]
    pub org: OrgConfig,
    /// JEDEC timing parameters.
    #[serde(default)]
    pub timing: TimingConfig,
    /// Power-stat presets (opaque, never inspected).
    #[serde(default)]
    pub power: PowerConfig,
    /// Refresh-management parameters.
    #[serde(default)]
    pub rfm: RfmConfig,
    /// Memory controller parameters.
    #[serde(default)]
    pub controller: ControllerConfig,
    /// Memory-system-level parameters (trace core).
    #[serde(default)]
    pub system: SystemConfig,
    /// NDP control-plane capacities.
    #[serde(default)]
    pub ndp: NdpConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            org: OrgConfig::default(),
            timing: TimingConfig::default(),
            power: PowerConfig::default(),
            rfm: RfmConfig::default(),
            controller: ControllerConfig::default(),
            system: SystemConfig::default(),
            ndp: NdpConfig::default(),
        }
    }
}

impl Config {
    /// Validates cross-field invariants and resolves preset-derived fields
    /// that a JSON document can only name, not fully expand. Call once
    /// before the first tick.
    pub fn resolve(self) -> Result<Self, SimError> {
        self.org.validate()?;
        if self.controller.wr_low_watermark >= self.controller.wr_high_watermark {
            return Err(SimError::config(
                "controller.wr_low_watermark must be below wr_high_watermark",
            ));
        }
        if self.timing.n_rcd == 0 || self.timing.n_rp == 0 || self.timing.n_cl == 0 {
            return Err(SimError::config(
                "timing parameters must be initialized to nonzero cycle counts",
            ));
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_resolves() {
        let config = Config::default().resolve();
        assert!(config.is_ok());
    }

    #[test]
    fn density_mismatch_is_rejected() {
        let mut config = Config::default();
        config.org.density_gb = 8;
        assert!(config.org.validate().is_err());
    }

    #[test]
    fn watermark_inversion_is_rejected() {
        let mut config = Config::default();
        config.controller.wr_low_watermark = 0.9;
        config.controller.wr_high_watermark = 0.1;
        assert!(config.resolve().is_err());
    }

    #[test]
    fn ns_to_cycles_rounds_up() {
        let timing = TimingConfig::default();
        // nRCD at DDR5_4800B is ~16.25ns; tCK=416ps -> ceil(16250/416) = 40.
        assert_eq!(timing.ns_to_cycles(16.25), 40);
    }

    #[test]
    fn json_overrides_apply_on_top_of_defaults() {
        let json = r#"{"timing": {"n_rcd": 99}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.timing.n_rcd, 99);
        assert_eq!(config.timing.n_rp, defaults::N_RP);
    }
}
