//! The DIMM-level NL-request launch buffer, exclusively owned by the memory
//! system. Words are kept in per-pseudo-channel lanes — each write to the
//! launch-request region tags its destination pseudo-channel
//! (`dimm_lvl_req_pch_addr`), and a single
//! shared FIFO would let one pseudo-channel's [`crate::ndp::hsnc::Hsnc`]
//! steal words addressed to another. Each [`crate::ndp::hsnc::Hsnc`] drains
//! its own lane 8 words at a time once its NL-request slot array has room.

use std::collections::{HashMap, VecDeque};

/// How many words one [`LaunchBuffer::pop_chunk`] call transfers.
pub const CHUNK_WORDS: usize = 8;

/// The DIMM-level buffer of not-yet-dispatched NL-request words, partitioned
/// by destination pseudo-channel.
#[derive(Debug, Default)]
pub struct LaunchBuffer {
    lanes: HashMap<i64, VecDeque<u64>>,
}

impl LaunchBuffer {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one NL-request word to `pch`'s lane.
    pub fn push(&mut self, pch: i64, word: u64) {
        self.lanes.entry(pch).or_default().push_back(word);
    }

    /// Appends a full 8-word chunk to `pch`'s lane in one call.
    pub fn push_chunk(&mut self, pch: i64, words: [u64; CHUNK_WORDS]) {
        let lane = self.lanes.entry(pch).or_default();
        lane.extend(words);
    }

    /// Number of words buffered for `pch`.
    #[must_use]
    pub fn len_for(&self, pch: i64) -> usize {
        self.lanes.get(&pch).map_or(0, VecDeque::len)
    }

    /// True if every lane is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lanes.values().all(VecDeque::is_empty)
    }

    /// Removes and returns the next [`CHUNK_WORDS`] words from `pch`'s
    /// lane, or `None` if fewer than that are buffered for it.
    pub fn pop_chunk(&mut self, pch: i64) -> Option<[u64; CHUNK_WORDS]> {
        let lane = self.lanes.get_mut(&pch)?;
        if lane.len() < CHUNK_WORDS {
            return None;
        }
        let mut chunk = [0u64; CHUNK_WORDS];
        for slot in &mut chunk {
            let word = lane.pop_front()?;
            *slot = word;
        }
        Some(chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pop_chunk_requires_a_full_chunk_on_the_right_lane() {
        let mut buf = LaunchBuffer::new();
        for i in 0..7 {
            buf.push(1, i);
        }
        assert!(buf.pop_chunk(1).is_none());
        assert!(buf.pop_chunk(0).is_none());
        buf.push(1, 7);
        assert!(buf.pop_chunk(0).is_none());
        let chunk = buf.pop_chunk(1).unwrap();
        assert_eq!(chunk, [0, 1, 2, 3, 4, 5, 6, 7]);
        assert!(buf.is_empty());
    }

    #[test]
    fn lanes_are_independent() {
        let mut buf = LaunchBuffer::new();
        buf.push_chunk(0, [1; CHUNK_WORDS]);
        buf.push_chunk(1, [2; CHUNK_WORDS]);
        assert_eq!(buf.pop_chunk(1).unwrap(), [2; CHUNK_WORDS]);
        assert_eq!(buf.pop_chunk(0).unwrap(), [1; CHUNK_WORDS]);
    }
}
