//! The embedded per-pseudo-channel NDP compute unit. Distinct from
//! [`crate::ndp::hsnc::Hsnc`], which is the
//! host-side controller that streams launch requests at it: this is the
//! device-side functional unit that owns the instruction memory and
//! fetch/execute status machine.

use crate::common::coord::CoordVec;
use crate::common::error::{SimError, SimResult};
use crate::common::request::Payload;
use crate::ndp::decode::{decode_nl_request, NlOpcode};

/// NDP unit execution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NdpUnitStatus {
    /// No program loaded / running.
    Idle,
    /// Executing.
    Run,
    /// Stopped at a barrier, draining in-flight accesses.
    Barrier,
    /// Waiting for a `WAIT_RES`/done signal from a dependent unit.
    WaitDone,
    /// Program complete.
    Done,
}

/// The embedded compute unit for one pseudo-channel.
pub struct NdpUnit {
    /// Current status.
    pub status: NdpUnitStatus,
    imem: Vec<u64>,
    pc: usize,
    /// Counts DRAM cycles since the last instruction-memory fetch; the
    /// unit fetches once every 4 cycles while running.
    fetch_divider: u8,
}

impl NdpUnit {
    /// Creates an idle unit with `imem_bytes` of instruction memory.
    #[must_use]
    pub fn new(imem_bytes: usize) -> Self {
        Self {
            status: NdpUnitStatus::Idle,
            imem: vec![0u64; imem_bytes / 8],
            pc: 0,
            fetch_divider: 0,
        }
    }

    /// Writes an 8-word payload into instruction memory at `word_offset`.
    ///
    /// # Errors
    /// Returns [`SimError::Fatal`] if the payload would run off the end of
    /// instruction memory.
    pub fn write_imem(
        &mut self,
        word_offset: usize,
        payload: &Payload,
        clk: u64,
        addr: &CoordVec,
    ) -> SimResult<()> {
        if word_offset + payload.len() > self.imem.len() {
            return Err(SimError::fatal(
                clk,
                addr,
                "NDP instruction-memory write out of bounds",
            ));
        }
        self.imem[word_offset..word_offset + payload.len()].copy_from_slice(payload);
        Ok(())
    }

    /// Handles a write to the NDP control register: `payload[0] == 1`
    /// starts the unit, which must be idle.
    ///
    /// # Errors
    /// Returns [`SimError::Fatal`] if the unit is started while not idle.
    pub fn write_control(
        &mut self,
        payload: &Payload,
        clk: u64,
        addr: &CoordVec,
    ) -> SimResult<()> {
        if payload[0] != 1 {
            return Ok(());
        }
        if self.status != NdpUnitStatus::Idle {
            return Err(SimError::fatal(
                clk,
                addr,
                "NDP unit start requested while not idle",
            ));
        }
        self.status = NdpUnitStatus::Run;
        self.pc = 0;
        Ok(())
    }

    /// Advances the fetch divider by one DRAM cycle; fetches and decodes
    /// one instruction every 4th call while running.
    pub fn tick(&mut self) {
        if self.status != NdpUnitStatus::Run {
            return;
        }
        self.fetch_divider = (self.fetch_divider + 1) % 4;
        if self.fetch_divider != 0 {
            return;
        }
        if self.pc >= self.imem.len() {
            return;
        }
        let word = self.imem[self.pc];
        self.pc += 1;
        if word == 0 {
            return;
        }
        if let Some(decoded) = decode_nl_request(word) {
            match decoded.opcode {
                NlOpcode::Barrier => self.status = NdpUnitStatus::Barrier,
                NlOpcode::WaitRes => self.status = NdpUnitStatus::WaitDone,
                NlOpcode::Done => self.status = NdpUnitStatus::Done,
                _ => {}
            }
        }
    }

    /// Debug hook: reads back
    /// `len` words of instruction memory starting at `word_offset`.
    #[must_use]
    pub fn read_imem(&self, word_offset: usize, len: usize) -> &[u64] {
        &self.imem[word_offset..word_offset + len]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starting_non_idle_unit_is_fatal() {
        let mut unit = NdpUnit::new(8 * 1024);
        let addr = CoordVec::unspecified();
        unit.write_control(&[1, 0, 0, 0, 0, 0, 0, 0], 0, &addr).unwrap();
        assert_eq!(unit.status, NdpUnitStatus::Run);
        let second = unit.write_control(&[1, 0, 0, 0, 0, 0, 0, 0], 1, &addr);
        assert!(second.is_err());
    }

    #[test]
    fn imem_write_then_read_round_trips() {
        let mut unit = NdpUnit::new(8 * 1024);
        let addr = CoordVec::unspecified();
        let payload: Payload = [1, 2, 3, 4, 5, 6, 7, 8];
        unit.write_imem(0, &payload, 0, &addr).unwrap();
        assert_eq!(unit.read_imem(0, 8), &payload);
    }
}
