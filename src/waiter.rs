//! The Waiter Queue: a priority+FIFO queue of pending acquisition requests
//! (§3, §4.2).
//!
//! A priority queue of waiting senders, rather than a plain FIFO deque,
//! keeping a lazy-skip-on-dropped-receiver trick so a waiter whose deadline
//! already fired is simply skipped rather than needing explicit
//! cancellation bookkeeping.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Instant;

use tokio::sync::oneshot;

use crate::connection::ConnectionId;
use crate::error::PoolError;

/// What a waiter is resolved with: a connection id to use, or a lifecycle
/// rejection (`Draining`/`Destroyed`).
pub(crate) type WaiterResolution<E> = Result<ConnectionId, PoolError<E>>;

struct WaiterEntry<E> {
    priority: i32,
    // Monotonic enqueue sequence, used to break priority ties FIFO (§4.1:
    // "higher priority first, older first on ties"). `Instant` works too,
    // but two waiters enqueued under the same mutex acquisition can share a
    // timestamp on coarse clocks, so an explicit counter is unambiguous.
    seq: u64,
    enqueued_at: Instant,
    sender: oneshot::Sender<WaiterResolution<E>>,
}

impl<E> PartialEq for WaiterEntry<E> {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}
impl<E> Eq for WaiterEntry<E> {}

impl<E> PartialOrd for WaiterEntry<E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<E> Ord for WaiterEntry<E> {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: higher priority must compare greater,
        // and among equal priorities the lower (earlier) sequence number
        // must compare greater so it pops first.
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Priority+FIFO queue of pending `Acquire` waiters.
#[derive(Default)]
pub(crate) struct WaiterQueue<E> {
    heap: BinaryHeap<WaiterEntry<E>>,
    next_seq: u64,
}

impl<E> WaiterQueue<E> {
    pub(crate) fn new() -> WaiterQueue<E> {
        WaiterQueue {
            heap: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        // Stale (already-resolved-via-timeout) entries may still be on the
        // heap; callers that need an exact "any live waiter?" check should
        // use `pop_next` in a loop instead.
        self.heap.is_empty()
    }

    /// Enqueues a waiter with the given priority, returning a receiver the
    /// caller awaits (racing it against `connectionTimeout` itself).
    pub(crate) fn push(&mut self, priority: i32) -> oneshot::Receiver<WaiterResolution<E>> {
        let (tx, rx) = oneshot::channel();
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(WaiterEntry {
            priority,
            seq,
            enqueued_at: Instant::now(),
            sender: tx,
        });
        rx
    }

    /// Pops the next live waiter (highest priority, then oldest), skipping
    /// any whose receiver has already been dropped (deadline fired, or
    /// `Drain`/`Destroy` is racing it).
    pub(crate) fn pop_next(&mut self) -> Option<oneshot::Sender<WaiterResolution<E>>> {
        while let Some(entry) = self.heap.pop() {
            if !entry.sender.is_closed() {
                return Some(entry.sender);
            }
        }
        None
    }

    /// Drains every live waiter, in priority order, rejecting each with
    /// `err`. Used by `Drain()` and `Destroy()`.
    pub(crate) fn reject_all(&mut self, err: impl Fn() -> PoolError<E>) {
        while let Some(sender) = self.pop_next() {
            let _ = sender.send(Err(err()));
        }
    }

    #[cfg(test)]
    pub(crate) fn len_including_stale(&self) -> usize {
        self.heap.len()
    }
}
