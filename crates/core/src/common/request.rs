//! Request and request-buffer types.
//!
//! Completion callbacks are boxed closures owned by the request; ownership
//! moves into the controller's `pending` queue on final-command issue.

use crate::common::command::Command;
use crate::common::coord::CoordVec;

/// The two request kinds a host or trace front-end may submit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReqType {
    /// A load.
    Read,
    /// A store.
    Write,
}

/// Fixed-size NDP payload: exactly 8 64-bit words when present.
pub type Payload = [u64; 8];

/// A completion callback invoked exactly once when a read's data returns.
pub type Callback = Box<dyn FnMut(&Request) + Send>;

/// One in-flight memory or NDP access.
///
/// Fields above the midpoint are immutable after enqueue; the rest are
/// mutated as the request progresses through the controller pipeline.
pub struct Request {
    /// Read or write.
    pub kind: ReqType,
    /// Linear address as presented by the front-end.
    pub addr: u64,
    /// Decomposed coordinate vector, set by [`crate::mapper::AddrMapper`].
    pub addr_vec: CoordVec,
    /// Opaque front-end-assigned identifier, echoed back via `callback`.
    pub source_id: u64,
    /// True if this request originates from the NDP control plane rather
    /// than a host load/store.
    pub is_ndp_req: bool,
    /// True if this request was injected by the memory system's trace core
    /// rather than an external `send()` caller.
    pub is_trace_core_req: bool,
    /// Destination pseudo-channel id for NDP requests, -1 otherwise.
    pub ndp_id: i64,
    /// Clock at which this request was enqueued.
    pub arrive_clk: u64,
    /// Invoked once when the request completes; `None` for writes, which
    /// retire silently.
    pub callback: Option<Callback>,
    /// NDP payload words; present only for `ST`/NDP writes.
    pub payload: Option<Payload>,

    /// The next concrete DRAM command needed to progress this request.
    pub command: Command,
    /// The terminal command that, once issued, retires the request.
    pub final_command: Command,
    /// Clock at which a completed read's callback should fire.
    pub depart_clk: u64,
    /// Set once this request's statistics have been counted, to avoid
    /// double-counting across ticks.
    pub is_stat_updated: bool,
    /// Set when `command` was rewritten to a data-buffer staging command by
    /// the scheduler's pre-request path.
    pub is_db_cmd: bool,
    /// Set once an `ACT`/`P_ACT` has been issued on this request's behalf.
    pub is_actived: bool,
}

impl Request {
    /// Builds a request with `command`/`final_command` both set to
    /// `final_command`; the scheduler rewrites `command` to whatever
    /// precondition is outstanding on its first scheduling pass.
    #[must_use]
    pub fn new(
        kind: ReqType,
        addr: u64,
        addr_vec: CoordVec,
        source_id: u64,
        arrive_clk: u64,
        final_command: Command,
    ) -> Self {
        Self {
            kind,
            addr,
            addr_vec,
            source_id,
            is_ndp_req: false,
            is_trace_core_req: false,
            ndp_id: -1,
            arrive_clk,
            callback: None,
            payload: None,
            command: final_command,
            final_command,
            depart_clk: 0,
            is_stat_updated: false,
            is_db_cmd: false,
            is_actived: false,
        }
    }

    /// True once `command` has been advanced to the terminal command.
    #[must_use]
    pub fn is_at_final_command(&self) -> bool {
        self.command == self.final_command
    }
}

/// An ordered, bounded-capacity sequence of [`Request`].
///
/// Ordering is insertion order; iteration is stable; removal is by
/// position.
pub struct RequestBuffer {
    capacity: usize,
    items: Vec<Request>,
}

impl RequestBuffer {
    /// Creates an empty buffer with the given capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            items: Vec::with_capacity(capacity),
        }
    }

    /// Buffer capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of requests currently buffered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True if the buffer holds no requests.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// True if the buffer is at capacity.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    /// Appends `req`, returning `false` without mutating the buffer if it
    /// is already full.
    pub fn try_push(&mut self, req: Request) -> bool {
        if self.is_full() {
            return false;
        }
        self.items.push(req);
        true
    }

    /// Removes and returns the request at `index`, preserving the order of
    /// the remaining requests.
    pub fn remove(&mut self, index: usize) -> Request {
        self.items.remove(index)
    }

    /// Iterates requests in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Request> {
        self.items.iter()
    }

    /// Mutably iterates requests in insertion order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Request> {
        self.items.iter_mut()
    }

    /// Index of the first request matching `pred`, if any.
    pub fn position<F: FnMut(&Request) -> bool>(&self, pred: F) -> Option<usize> {
        self.items.iter().position(pred)
    }

    /// The request at the head of the buffer (oldest, by insertion order).
    #[must_use]
    pub fn front(&self) -> Option<&Request> {
        self.items.first()
    }
}

/// A FIFO of reads awaiting `depart_clk`; thin alias over [`RequestBuffer`]
/// kept distinct for readability at call sites.
pub type PendingQueue = RequestBuffer;

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy(arrive_clk: u64) -> Request {
        Request::new(
            ReqType::Read,
            0,
            CoordVec::unspecified(),
            0,
            arrive_clk,
            Command::Rd,
        )
    }

    #[test]
    fn capacity_is_enforced() {
        let mut buf = RequestBuffer::new(2);
        assert!(buf.try_push(dummy(0)));
        assert!(buf.try_push(dummy(1)));
        assert!(!buf.try_push(dummy(2)));
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn remove_preserves_order() {
        let mut buf = RequestBuffer::new(4);
        for i in 0..3 {
            assert!(buf.try_push(dummy(i)));
        }
        let removed = buf.remove(1);
        assert_eq!(removed.arrive_clk, 1);
        let remaining: Vec<u64> = buf.iter().map(|r| r.arrive_clk).collect();
        assert_eq!(remaining, vec![0, 2]);
    }

    #[test]
    fn new_request_starts_at_final_command() {
        let req = dummy(0);
        assert!(req.is_at_final_command());
    }
}
