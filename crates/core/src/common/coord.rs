//! Coordinate-vector addressing.
//!
//! Every DRAM address decomposes into a fixed-length tuple indexing the
//! hierarchy `channel -> pseudochannel -> narrow-io -> wide-io -> rank ->
//! bankgroup -> bank -> row -> column`. Any coordinate may be
//! [`UNSPECIFIED`], meaning "broadcast to every child at this level" —
//! used by maintenance commands that scope above the leaf.

use serde::{Deserialize, Serialize};

/// Sentinel coordinate value meaning "unspecified / broadcast".
pub const UNSPECIFIED: i64 = -1;

/// One level of the DRAM topology, root to leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    /// DRAM channel.
    Channel,
    /// Pseudo-channel within a channel.
    PseudoChannel,
    /// Narrow (host-facing, off-PCB) I/O path through the data buffer.
    NarrowIo,
    /// Wide (DRAM-facing, on-PCB) I/O path through the data buffer.
    WideIo,
    /// Rank within a pseudo-channel.
    Rank,
    /// Bank group within a rank.
    BankGroup,
    /// Bank within a bank group.
    Bank,
    /// Row within a bank.
    Row,
    /// Column within a row.
    Column,
}

impl Level {
    /// Number of levels in the hierarchy.
    pub const COUNT: usize = 9;

    /// All levels, root to leaf.
    pub const ALL: [Level; Level::COUNT] = [
        Level::Channel,
        Level::PseudoChannel,
        Level::NarrowIo,
        Level::WideIo,
        Level::Rank,
        Level::BankGroup,
        Level::Bank,
        Level::Row,
        Level::Column,
    ];

    /// Zero-based depth of this level from the root.
    #[must_use]
    pub fn depth(self) -> usize {
        Self::ALL.iter().position(|&l| l == self).unwrap_or(0)
    }

    /// True if this level has modeled per-node state (a [`crate::dram::node::Node`]
    /// exists for it). Row and column are addressing-only: row identity lives on
    /// the owning bank node, and columns carry no state at all.
    #[must_use]
    pub fn has_node(self) -> bool {
        !matches!(self, Level::Row | Level::Column)
    }
}

/// A fixed-length coordinate tuple, one `i64` per [`Level`].
///
/// `-1` in any field means "unspecified"; see [`UNSPECIFIED`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordVec {
    /// Channel coordinate.
    pub channel: i64,
    /// Pseudo-channel coordinate.
    pub pseudochannel: i64,
    /// Narrow-I/O coordinate.
    pub narrow_io: i64,
    /// Wide-I/O coordinate.
    pub wide_io: i64,
    /// Rank coordinate.
    pub rank: i64,
    /// Bank group coordinate.
    pub bankgroup: i64,
    /// Bank coordinate.
    pub bank: i64,
    /// Row coordinate.
    pub row: i64,
    /// Column coordinate.
    pub column: i64,
}

impl Default for CoordVec {
    fn default() -> Self {
        Self::unspecified()
    }
}

impl CoordVec {
    /// A coordinate vector with every field unspecified.
    #[must_use]
    pub fn unspecified() -> Self {
        Self {
            channel: UNSPECIFIED,
            pseudochannel: UNSPECIFIED,
            narrow_io: UNSPECIFIED,
            wide_io: UNSPECIFIED,
            rank: UNSPECIFIED,
            bankgroup: UNSPECIFIED,
            bank: UNSPECIFIED,
            row: UNSPECIFIED,
            column: UNSPECIFIED,
        }
    }

    /// Reads the coordinate at `level`.
    #[must_use]
    pub fn get(&self, level: Level) -> i64 {
        match level {
            Level::Channel => self.channel,
            Level::PseudoChannel => self.pseudochannel,
            Level::NarrowIo => self.narrow_io,
            Level::WideIo => self.wide_io,
            Level::Rank => self.rank,
            Level::BankGroup => self.bankgroup,
            Level::Bank => self.bank,
            Level::Row => self.row,
            Level::Column => self.column,
        }
    }

    /// Writes the coordinate at `level`.
    pub fn set(&mut self, level: Level, value: i64) {
        match level {
            Level::Channel => self.channel = value,
            Level::PseudoChannel => self.pseudochannel = value,
            Level::NarrowIo => self.narrow_io = value,
            Level::WideIo => self.wide_io = value,
            Level::Rank => self.rank = value,
            Level::BankGroup => self.bankgroup = value,
            Level::Bank => self.bank = value,
            Level::Row => self.row = value,
            Level::Column => self.column = value,
        }
    }

    /// True if every coordinate up to and including `level` is specified.
    #[must_use]
    pub fn is_fully_specified_to(&self, level: Level) -> bool {
        Level::ALL
            .iter()
            .take(level.depth() + 1)
            .all(|&l| self.get(l) != UNSPECIFIED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unspecified_is_all_sentinel() {
        let v = CoordVec::unspecified();
        for level in Level::ALL {
            assert_eq!(v.get(level), UNSPECIFIED);
        }
    }

    #[test]
    fn get_set_roundtrip() {
        let mut v = CoordVec::unspecified();
        v.set(Level::Bank, 3);
        v.set(Level::Row, 17);
        assert_eq!(v.get(Level::Bank), 3);
        assert_eq!(v.get(Level::Row), 17);
        assert_eq!(v.get(Level::Column), UNSPECIFIED);
    }

    #[test]
    fn depth_orders_root_to_leaf() {
        assert_eq!(Level::Channel.depth(), 0);
        assert_eq!(Level::Column.depth(), Level::COUNT - 1);
    }
}
