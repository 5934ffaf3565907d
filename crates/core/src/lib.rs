//! Cycle-accurate DDR5 pseudo-channel memory subsystem simulator, with
//! near-data processing.
//!
//! This crate implements:
//! 1. **DRAM:** per-channel hierarchy state, JEDEC timing, and refresh
//!    management.
//! 2. **Controller:** per-pseudo-channel request buffers, the decoupled
//!    MC<->DB/DB<->DRAM mode machines, and the mode-directed probe
//!    sequence.
//! 3. **NDP:** the DIMM-level launch buffer, the host-side NDP controller
//!    per pseudo-channel, and the embedded NDP compute unit.
//! 4. **System:** the top-level orchestrator tying channels, controllers,
//!    refresh managers, and NDP control plane together, plus the
//!    MSHR-bounded trace core.
//! 5. **Configuration and statistics:** `serde`-deserializable configuration
//!    and run-statistics reporting.

/// Common types and constants (coordinates, commands, errors, requests).
pub mod common;
/// Simulator configuration (organization, timing, power, refresh, controller,
/// system, and NDP groups).
pub mod config;
/// Per-channel memory controller.
pub mod controller;
/// Per-channel DRAM hierarchy model.
pub mod dram;
/// Linear-address to coordinate-vector mapping.
pub mod mapper;
/// Near-data-processing control plane: launch buffer, HSNC, NDP unit.
pub mod ndp;
/// Per-channel refresh management.
pub mod refresh;
/// Command scheduler/arbiter.
pub mod scheduler;
/// Run-statistics collection and reporting.
pub mod stats;
/// Top-level memory system orchestrator.
pub mod system;
/// Load/store trace file parsing.
pub mod trace;

/// Root configuration type; use `Config::default()` or deserialize from JSON.
pub use crate::config::Config;
/// Top-level simulator; owns every channel's DRAM, controller, refresh
/// manager, and NDP control plane.
pub use crate::system::MemorySystem;
