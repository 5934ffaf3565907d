//! The deferred/future-action queue.
//!
//! Used exclusively for refresh completion: `issue_command` on a refresh
//! command enqueues the matching `*_end` command to fire at `clk + nRFC`.

use crate::common::command::Command;
use crate::common::coord::CoordVec;

/// One pending deferred action.
pub struct DeferredAction {
    /// The command to apply when this action fires.
    pub cmd: Command,
    /// The address the action fires at.
    pub addr_vec: CoordVec,
    /// The clock at which this action fires.
    pub fire_clk: u64,
}

/// A flat, unordered collection of deferred actions, scanned every tick.
#[derive(Default)]
pub struct ActionQueue {
    pending: Vec<DeferredAction>,
}

impl ActionQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules `cmd` to fire at `fire_clk`.
    pub fn schedule(&mut self, cmd: Command, addr_vec: CoordVec, fire_clk: u64) {
        self.pending.push(DeferredAction {
            cmd,
            addr_vec,
            fire_clk,
        });
    }

    /// Removes and returns every action whose `fire_clk` equals `clk`.
    pub fn drain_due(&mut self, clk: u64) -> Vec<DeferredAction> {
        let mut due = Vec::new();
        let mut remaining = Vec::with_capacity(self.pending.len());
        for action in self.pending.drain(..) {
            if action.fire_clk == clk {
                due.push(action);
            } else {
                remaining.push(action);
            }
        }
        self.pending = remaining;
        due
    }

    /// Number of actions still pending.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// True if no actions are pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_due_only_removes_matching_clock() {
        let mut queue = ActionQueue::new();
        queue.schedule(Command::RefabEnd, CoordVec::unspecified(), 10);
        queue.schedule(Command::RefabEnd, CoordVec::unspecified(), 20);

        let due = queue.drain_due(10);
        assert_eq!(due.len(), 1);
        assert_eq!(queue.len(), 1);

        let due = queue.drain_due(20);
        assert_eq!(due.len(), 1);
        assert!(queue.is_empty());
    }
}
