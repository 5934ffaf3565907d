//! The DRAM hierarchy as an arena of indices: rather than nodes holding
//! parent pointers, each level's
//! nodes live in their own flat `Vec`, addressed by a mixed-radix index
//! computed from the organization's per-level counts. Row and column carry
//! no modeled state (row identity lives on the owning bank node; columns
//! are addressing-only), so only [`Level::has_node`] levels get an arena.

use std::collections::HashMap;

use crate::common::command::Command;
use crate::common::coord::{CoordVec, Level};
use crate::config::OrgConfig;

/// Per-node state, drawn from the set applicable at that level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// A bank with a row currently open.
    Opened,
    /// A bank (or higher-level node) with no row open / idle.
    Closed,
    /// Powered up but otherwise idle; unused by the levels this simulator
    /// models in detail, retained for completeness.
    PowerUp,
    /// Undergoing refresh; rejects every command until completion.
    Refreshing,
    /// State does not apply at this level (e.g. channel, pseudo-channel).
    NotApplicable,
}

/// One hierarchy node: its state plus the per-command "next allowed time"
/// table.
#[derive(Debug, Clone)]
pub struct Node {
    /// The level this node sits at.
    pub level: Level,
    /// Current state.
    pub state: NodeState,
    /// Open row identity, or -1 if closed / not a bank node.
    pub open_row: i64,
    next_allowed: HashMap<Command, u64>,
}

impl Node {
    fn new(level: Level) -> Self {
        let state = if level == Level::Bank {
            NodeState::Closed
        } else {
            NodeState::NotApplicable
        };
        Self {
            level,
            state,
            open_row: -1,
            next_allowed: HashMap::new(),
        }
    }

    /// The earliest clock at which `cmd` becomes legal on this node.
    #[must_use]
    pub fn next_allowed_time(&self, cmd: Command) -> u64 {
        self.next_allowed.get(&cmd).copied().unwrap_or(0)
    }

    /// Advances `cmd`'s next-allowed time to at least `clk`, never moving
    /// it earlier`).
    pub fn bump_next_allowed(&mut self, cmd: Command, clk: u64) {
        let entry = self.next_allowed.entry(cmd).or_insert(0);
        if clk > *entry {
            *entry = clk;
        }
    }
}

/// Flat per-level arenas, addressed by mixed-radix index.
pub struct NodeArena {
    counts: [usize; Level::COUNT],
    nodes: Vec<Vec<Node>>,
}

impl NodeArena {
    /// Builds the arena from an organization's per-level counts.
    #[must_use]
    pub fn new(org: &OrgConfig) -> Self {
        let mut counts = [1usize; Level::COUNT];
        counts[Level::Channel.depth()] = org.channels;
        counts[Level::PseudoChannel.depth()] = org.pseudochannels;
        counts[Level::NarrowIo.depth()] = 1;
        counts[Level::WideIo.depth()] = 1;
        counts[Level::Rank.depth()] = org.ranks;
        counts[Level::BankGroup.depth()] = org.bankgroups;
        counts[Level::Bank.depth()] = org.banks;

        let nodes = Level::ALL
            .iter()
            .map(|&level| {
                if !level.has_node() {
                    return Vec::new();
                }
                let total = Self::total_at(&counts, level);
                (0..total).map(|_| Node::new(level)).collect()
            })
            .collect();

        Self { counts, nodes }
    }

    fn total_at(counts: &[usize; Level::COUNT], upto: Level) -> usize {
        Level::ALL
            .iter()
            .filter(|l| l.has_node())
            .take_while(|&&l| l != upto)
            .chain(std::iter::once(&upto))
            .map(|&l| counts[l.depth()])
            .product()
    }

    /// The count of nodes the organization defines at `level`.
    #[must_use]
    pub fn count_at(&self, level: Level) -> usize {
        self.counts[level.depth()]
    }

    /// The flat index of the node at `level` addressed by `addr`'s
    /// coordinates up to and including `level`. Unspecified coordinates
    /// (-1) are treated as index 0.
    #[must_use]
    pub fn flat_index(&self, addr: &CoordVec, upto: Level) -> usize {
        let mut idx = 0usize;
        for level in Level::ALL {
            if !level.has_node() {
                continue;
            }
            let coord = addr.get(level);
            let count = self.counts[level.depth()];
            idx = idx * count + if coord < 0 { 0 } else { coord as usize };
            if level == upto {
                break;
            }
        }
        idx
    }

    /// Borrows the node addressed by `addr` at `level`.
    #[must_use]
    pub fn get(&self, level: Level, addr: &CoordVec) -> &Node {
        let idx = self.flat_index(addr, level);
        &self.nodes[level.depth()][idx]
    }

    /// Mutably borrows the node addressed by `addr` at `level`.
    pub fn get_mut(&mut self, level: Level, addr: &CoordVec) -> &mut Node {
        let idx = self.flat_index(addr, level);
        &mut self.nodes[level.depth()][idx]
    }

    /// Borrows a node by its already-computed flat index.
    #[must_use]
    pub fn get_by_index(&self, level: Level, idx: usize) -> &Node {
        &self.nodes[level.depth()][idx]
    }

    /// Mutably borrows a node by its already-computed flat index.
    pub fn get_mut_by_index(&mut self, level: Level, idx: usize) -> &mut Node {
        &mut self.nodes[level.depth()][idx]
    }

    /// Flat indices of every node at `level` that shares `addr`'s
    /// coordinates at every ancestor level up to and including
    /// `group_level` (its "siblings", inclusive of the node `addr` itself).
    #[must_use]
    pub fn siblings_at(&self, level: Level, addr: &CoordVec, group_level: Level) -> Vec<usize> {
        debug_assert!(group_level.depth() <= level.depth());
        let group_prefix = self.flat_index(addr, group_level);
        let span: usize = Level::ALL
            .iter()
            .filter(|l| l.has_node())
            .skip_while(|&&l| l != group_level)
            .skip(1)
            .take_while(|&&l| l != level)
            .chain(std::iter::once(&level))
            .map(|&l| self.counts[l.depth()])
            .product();
        let base = group_prefix * span;
        (base..base + span).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_pch_org() -> OrgConfig {
        OrgConfig {
            channels: 1,
            pseudochannels: 1,
            ranks: 1,
            bankgroups: 2,
            banks: 2,
            ..OrgConfig::default()
        }
    }

    #[test]
    fn bank_nodes_are_distinct_per_coordinate() {
        let arena = NodeArena::new(&single_pch_org());
        let mut a = CoordVec::unspecified();
        a.channel = 0;
        a.pseudochannel = 0;
        a.rank = 0;
        a.bankgroup = 0;
        a.bank = 0;
        let mut b = a;
        b.bank = 1;
        assert_ne!(
            arena.flat_index(&a, Level::Bank),
            arena.flat_index(&b, Level::Bank)
        );
    }

    #[test]
    fn siblings_at_bankgroup_cover_all_banks_in_group() {
        let arena = NodeArena::new(&single_pch_org());
        let mut addr = CoordVec::unspecified();
        addr.channel = 0;
        addr.pseudochannel = 0;
        addr.rank = 0;
        addr.bankgroup = 1;
        addr.bank = 0;
        let siblings = arena.siblings_at(Level::Bank, &addr, Level::BankGroup);
        assert_eq!(siblings.len(), 2);
    }

    #[test]
    fn new_bank_starts_closed() {
        let arena = NodeArena::new(&single_pch_org());
        let addr = CoordVec::unspecified();
        assert_eq!(arena.get(Level::Bank, &addr).state, NodeState::Closed);
    }
}
