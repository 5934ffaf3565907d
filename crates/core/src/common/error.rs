//! Error types returned across the simulator's public API.
//!
//! Three families: configuration errors (surfaced before
//! the first tick), fatal invariant violations (surfaced at a `tick()`
//! boundary), and capacity rejection, which is not an error at all — see
//! `send`/`priority_send` returning `bool` throughout [`crate::controller`].

use thiserror::Error;

use crate::common::coord::CoordVec;

/// The simulator's error type.
#[derive(Debug, Error)]
pub enum SimError {
    /// A configuration value could not be resolved: unknown preset, a
    /// density/organization mismatch, or a rate field overridden after a
    /// preset already fixed it.
    #[error("configuration error: {reason}")]
    Config {
        /// Human-readable description of the offending field or preset.
        reason: String,
    },

    /// A fatal invariant violation. These abort the simulation at the
    /// `tick()` boundary; there is no recovery path.
    #[error("fatal invariant violation at clk={at_clk} ch={channel} pch={pseudochannel}: {reason}")]
    Fatal {
        /// Simulator clock at which the violation was detected.
        at_clk: u64,
        /// Channel coordinate, or -1 if not applicable.
        channel: i64,
        /// Pseudo-channel coordinate, or -1 if not applicable.
        pseudochannel: i64,
        /// Human-readable description of the violated invariant.
        reason: String,
    },
}

impl SimError {
    /// Builds a [`SimError::Config`].
    pub fn config(reason: impl Into<String>) -> Self {
        SimError::Config {
            reason: reason.into(),
        }
    }

    /// Builds a [`SimError::Fatal`] from the clock and the coordinate vector
    /// of the offending access.
    pub fn fatal(at_clk: u64, addr: &CoordVec, reason: impl Into<String>) -> Self {
        SimError::Fatal {
            at_clk,
            channel: addr.channel,
            pseudochannel: addr.pseudochannel,
            reason: reason.into(),
        }
    }

    /// Builds a [`SimError::Fatal`] with no associated coordinate, e.g. for
    /// DIMM-level or memory-system-wide violations.
    pub fn fatal_global(at_clk: u64, reason: impl Into<String>) -> Self {
        SimError::Fatal {
            at_clk,
            channel: -1,
            pseudochannel: -1,
            reason: reason.into(),
        }
    }
}

/// Convenience alias for the simulator's fallible operations.
pub type SimResult<T> = Result<T, SimError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_display_includes_context() {
        let addr = CoordVec {
            channel: 1,
            pseudochannel: 2,
            ..CoordVec::unspecified()
        };
        let err = SimError::fatal(42, &addr, "issued a non-ready command");
        let msg = err.to_string();
        assert!(msg.contains("clk=42"));
        assert!(msg.contains("ch=1"));
        assert!(msg.contains("pch=2"));
    }
}
