//! NL-request (NDP Launch Request) opcode decoding.
//!
//! 64-bit layout, MSB to LSB: `opcode[63:60] | opsize[59:53] | ch[52:50] |
//! pch[49:48] | bg[47:45] | bk[44:43] | row[42:25] | col[24:18] | id[17:15]
//! | etc[14:0]`.

use crate::common::coord::CoordVec;

/// The primitive an NL-request word encodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NlOpcode {
    /// Read.
    Rd,
    /// Write.
    Wr,
    /// Barrier: drain in-flight accesses before continuing.
    Barrier,
    /// Wait for a result (reserved; fatal if entered, see DESIGN.md).
    WaitRes,
    /// Reserved, fatal if decoded.
    LoopStart,
    /// Reserved, fatal if decoded.
    LoopEnd,
    /// Wait a configured number of cycles before polling issuability.
    Wait,
    /// Program complete.
    Done,
}

impl NlOpcode {
    fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(Self::Rd),
            1 => Some(Self::Wr),
            2 => Some(Self::Barrier),
            3 => Some(Self::WaitRes),
            4 => Some(Self::LoopStart),
            5 => Some(Self::LoopEnd),
            6 => Some(Self::Wait),
            15 => Some(Self::Done),
            _ => None,
        }
    }
}

/// A decoded NL-request.
#[derive(Debug, Clone, Copy)]
pub struct DecodedNlRequest {
    /// The primitive this word encodes.
    pub opcode: NlOpcode,
    /// Column count for an RD/WR access.
    pub opsize: u8,
    /// Target coordinates; unpopulated fields keep [`CoordVec::unspecified`]'s
    /// sentinel.
    pub addr: CoordVec,
    /// Access-group identifier used to pair NDP-DRAM commands back to their
    /// originating slot.
    pub id: u8,
    /// Opcode-specific low bits (wait-cycle count for `WAIT`, unused
    /// otherwise).
    pub etc: u16,
}

fn field(word: u64, hi: u32, lo: u32) -> u64 {
    let width = hi - lo + 1;
    let mask = if width == 64 { u64::MAX } else { (1u64 << width) - 1 };
    (word >> lo) & mask
}

/// Decodes one 64-bit NL-request word, or `None` if its opcode field does
/// not match a known primitive.
#[must_use]
pub fn decode_nl_request(word: u64) -> Option<DecodedNlRequest> {
    let opcode = NlOpcode::from_bits(field(word, 63, 60) as u8)?;
    let mut addr = CoordVec::unspecified();
    addr.channel = field(word, 52, 50) as i64;
    addr.pseudochannel = field(word, 49, 48) as i64;
    addr.bankgroup = field(word, 47, 45) as i64;
    addr.bank = field(word, 44, 43) as i64;
    addr.row = field(word, 42, 25) as i64;
    addr.column = field(word, 24, 18) as i64;
    Some(DecodedNlRequest {
        opcode,
        opsize: field(word, 59, 53) as u8,
        addr,
        id: field(word, 17, 15) as u8,
        etc: field(word, 14, 0) as u16,
    })
}

/// Encodes an NL-request word; used by tests and by trace-driven NDP
/// program generation.
#[must_use]
pub fn encode_nl_request(req: &DecodedNlRequest) -> u64 {
    let opcode_bits: u64 = match req.opcode {
        NlOpcode::Rd => 0,
        NlOpcode::Wr => 1,
        NlOpcode::Barrier => 2,
        NlOpcode::WaitRes => 3,
        NlOpcode::LoopStart => 4,
        NlOpcode::LoopEnd => 5,
        NlOpcode::Wait => 6,
        NlOpcode::Done => 15,
    };
    (opcode_bits << 60)
        | (u64::from(req.opsize) << 53)
        | ((req.addr.channel.max(0) as u64) << 50)
        | ((req.addr.pseudochannel.max(0) as u64) << 48)
        | ((req.addr.bankgroup.max(0) as u64) << 45)
        | ((req.addr.bank.max(0) as u64) << 43)
        | ((req.addr.row.max(0) as u64) << 25)
        | ((req.addr.column.max(0) as u64) << 18)
        | (u64::from(req.id) << 15)
        | u64::from(req.etc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_read_request() {
        let req = DecodedNlRequest {
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
        let word = encode_nl_request(&req);
        let decoded = decode_nl_request(word).unwrap();
        assert_eq!(decoded.opcode, NlOpcode::Rd);
        assert_eq!(decoded.opsize, 8);
    }

    #[test]
    fn decodes_barrier_and_done() {
        let barrier = DecodedNlRequest {
            opcode: NlOpcode::Barrier,
            opsize: 0,
            addr: CoordVec::unspecified(),
            id: 0,
            etc: 0,
        };
        let done = DecodedNlRequest {
            opcode: NlOpcode::Done,
            ..barrier
        };
        assert_eq!(decode_nl_request(encode_nl_request(&barrier)).unwrap().opcode, NlOpcode::Barrier);
        assert_eq!(decode_nl_request(encode_nl_request(&done)).unwrap().opcode, NlOpcode::Done);
    }
}
