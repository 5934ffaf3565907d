//! Adaptive row-buffer policy: caps how many consecutive
//! row-buffer hits a bank may serve once a request for a different row is
//! waiting behind it, so a long run of hits on one row can't starve that
//! conflicting request forever.
//!
//! Per-bank row-hit counters drive the override: skip the streak-holding
//! winner and pick its bank's conflicting neighbor instead, forcing an
//! earlier precharge on the hot bank.

use std::collections::HashMap;

use crate::common::coord::CoordVec;

type BankKey = (i64, i64, i64, i64, i64);

fn key(addr: &CoordVec) -> BankKey {
    (addr.channel, addr.pseudochannel, addr.rank, addr.bankgroup, addr.bank)
}

struct BankCapState {
    cap: u32,
    streak: u32,
}

/// Per-bank adaptive row-hit cap tracker.
pub struct RowPolicy {
    default_cap: u32,
    low_cap: u32,
    state: HashMap<BankKey, BankCapState>,
}

impl RowPolicy {
    /// Creates a tracker with `default_cap` (restored on `ACT`) and
    /// `low_cap` (applied when a conflicting request is observed waiting).
    #[must_use]
    pub fn new(default_cap: u32, low_cap: u32) -> Self {
        Self {
            default_cap,
            low_cap,
            state: HashMap::new(),
        }
    }

    /// Resets `addr`'s bank to the default cap with a fresh streak; call on
    /// every `ACT`/`P_ACT` issuance.
    pub fn on_act(&mut self, addr: &CoordVec) {
        let default_cap = self.default_cap;
        let entry = self
            .state
            .entry(key(addr))
            .or_insert(BankCapState { cap: default_cap, streak: 0 });
        entry.cap = default_cap;
        entry.streak = 0;
    }

    /// Lowers `addr`'s bank cap; call when a buffer's head request targets a
    /// row different from the bank's currently open row.
    pub fn observe_head_conflict(&mut self, addr: &CoordVec) {
        let low_cap = self.low_cap;
        let entry = self
            .state
            .entry(key(addr))
            .or_insert(BankCapState { cap: low_cap, streak: 0 });
        entry.cap = low_cap;
    }

    /// Records a served row-buffer hit against `addr`'s bank.
    pub fn note_hit(&mut self, addr: &CoordVec) {
        let default_cap = self.default_cap;
        let entry = self
            .state
            .entry(key(addr))
            .or_insert(BankCapState { cap: default_cap, streak: 0 });
        entry.streak += 1;
    }

    /// True if `addr`'s bank has served at least `cap` consecutive hits
    /// since its last `ACT`.
    #[must_use]
    pub fn is_over_cap(&self, addr: &CoordVec) -> bool {
        self.state.get(&key(addr)).is_some_and(|e| e.streak >= e.cap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(bank: i64, row: i64) -> CoordVec {
        CoordVec {
            bank,
            row,
            ..CoordVec::unspecified()
        }
    }

    #[test]
    fn cap_lowers_only_after_a_conflict_is_observed() {
        let mut policy = RowPolicy::new(128, 16);
        let a = addr(0, 5);
        for _ in 0..20 {
            policy.note_hit(&a);
        }
        assert!(!policy.is_over_cap(&a));
        policy.observe_head_conflict(&a);
        assert!(policy.is_over_cap(&a));
    }

    #[test]
    fn act_resets_streak_and_cap() {
        let mut policy = RowPolicy::new(128, 16);
        let a = addr(0, 5);
        policy.observe_head_conflict(&a);
        for _ in 0..16 {
            policy.note_hit(&a);
        }
        assert!(policy.is_over_cap(&a));
        policy.on_act(&a);
        assert!(!policy.is_over_cap(&a));
    }
}
