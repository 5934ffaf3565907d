//! Linear-address decomposition: turns the
//! flat `u64` address a host or trace front-end presents into a
//! [`CoordVec`].
//!
//! A row-interleaved mapping: column bits lowest, channel bits highest.
//! Narrow-I/O and wide-I/O are not part of the linear address space at all
//! — they are internal paths through the data buffer, never addressed by a
//! front-end — so `decompose` always sets both to `0`.

use crate::common::coord::{CoordVec, Level};
use crate::config::OrgConfig;

/// Number of bits needed to index `count` distinct values.
fn bits_for(count: usize) -> u32 {
    if count <= 1 {
        0
    } else {
        64 - ((count - 1) as u64).leading_zeros()
    }
}

/// Decomposes a linear address into a [`CoordVec`], LSB-to-MSB order
/// `column, row, bank, bankgroup, rank, pseudochannel, channel`.
pub struct AddrMapper {
    widths: [(Level, u32); 7],
}

impl AddrMapper {
    /// Builds a mapper sized from `org`'s per-level counts.
    #[must_use]
    pub fn new(org: &OrgConfig) -> Self {
        Self {
            widths: [
                (Level::Column, bits_for(org.columns)),
                (Level::Row, bits_for(org.rows)),
                (Level::Bank, bits_for(org.banks)),
                (Level::BankGroup, bits_for(org.bankgroups)),
                (Level::Rank, bits_for(org.ranks)),
                (Level::PseudoChannel, bits_for(org.pseudochannels)),
                (Level::Channel, bits_for(org.channels)),
            ],
        }
    }

    /// Decomposes `addr` into a fully-specified coordinate vector.
    #[must_use]
    pub fn decompose(&self, addr: u64) -> CoordVec {
        let mut v = CoordVec::unspecified();
        v.narrow_io = 0;
        v.wide_io = 0;
        let mut remaining = addr;
        for &(level, width) in &self.widths {
            let mask: u64 = if width == 0 { 0 } else { (1u64 << width) - 1 };
            v.set(level, (remaining & mask) as i64);
            remaining >>= width;
        }
        v
    }

    /// The inverse of [`AddrMapper::decompose`]: packs `v`'s per-level
    /// coordinates back into a linear address, least-significant level
    /// first. Unspecified (`-1`) fields pack as `0`.
    #[must_use]
    pub fn compose(&self, v: &CoordVec) -> u64 {
        let mut addr: u64 = 0;
        let mut shift = 0u32;
        for &(level, width) in &self.widths {
            let value = v.get(level).max(0) as u64;
            let mask: u64 = if width == 0 { 0 } else { (1u64 << width) - 1 };
            addr |= (value & mask) << shift;
            shift += width;
        }
        addr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decompose_recovers_each_level_independently() {
        let org = OrgConfig::default();
        let mapper = AddrMapper::new(&org);
        let addr: u64 = 0;
        let v = mapper.decompose(addr);
        assert_eq!(v.column, 0);
        assert_eq!(v.bank, 0);
        assert_eq!(v.channel, 0);
    }

    #[test]
    fn bank_bit_field_sits_above_row_bits() {
        let org = OrgConfig::default();
        let mapper = AddrMapper::new(&org);
        let bank_shift = bits_for(org.columns) + bits_for(org.rows);
        let one_bank_over = 1u64 << bank_shift;
        let v = mapper.decompose(one_bank_over);
        assert_eq!(v.column, 0);
        assert_eq!(v.row, 0);
        assert_eq!(v.bank, 1);
    }

    #[test]
    fn pseudochannel_bit_selects_the_right_lane() {
        let org = OrgConfig::default();
        let mapper = AddrMapper::new(&org);
        let pch_shift = bits_for(org.columns)
            + bits_for(org.rows)
            + bits_for(org.banks)
            + bits_for(org.bankgroups)
            + bits_for(org.ranks);
        let v = mapper.decompose(1u64 << pch_shift);
        assert_eq!(v.pseudochannel, 1);
    }

    #[test]
    fn row_bit_field_sits_between_column_and_bank() {
        let org = OrgConfig::default();
        let mapper = AddrMapper::new(&org);
        let row_shift = bits_for(org.columns);
        let v = mapper.decompose(1u64 << row_shift);
        assert_eq!(v.column, 0);
        assert_eq!(v.row, 1);
        assert_eq!(v.bank, 0);
    }

    #[test]
    fn compose_is_the_inverse_of_decompose() {
        let org = OrgConfig::default();
        let mapper = AddrMapper::new(&org);
        for addr in [0u64, 1, 4096, 0xdead_beef] {
            let v = mapper.decompose(addr);
            assert_eq!(mapper.compose(&v), addr);
        }
    }

    #[test]
    fn narrow_and_wide_io_are_not_addressed() {
        let org = OrgConfig::default();
        let mapper = AddrMapper::new(&org);
        let v = mapper.decompose(0xdead_beef);
        assert_eq!(v.narrow_io, 0);
        assert_eq!(v.wide_io, 0);
    }
}
