// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Unbounded blocking handoff queue.
//!
//! Capacity is unbounded: producers never block and there is no backpressure.
//! A consumer that falls behind either drains the backlog in order or calls
//! [`HandoffQueue::collapse_to_latest`], which discards every entry except the
//! newest one. Discarded entries are never delivered.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use thiserror::Error;

/// Error type for queue operations that violate the caller contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    /// `collapse_to_latest` was called on an empty queue.
    #[error("queue is empty")]
    Empty,
}

/// Thread-safe FIFO with a blocking pop and a newest-wins collapse.
///
/// All state lives behind one mutex; one condition variable signals
/// "queue non-empty".
#[derive(Debug)]
pub struct HandoffQueue<T> {
    items: Mutex<VecDeque<T>>,
    non_empty: Condvar,
}

impl<T> Default for HandoffQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> HandoffQueue<T> {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            non_empty: Condvar::new(),
        }
    }

    /// Append `value` to the tail and wake one blocked consumer.
    pub fn push(&self, value: T) {
        let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        items.push_back(value);
        drop(items);
        self.non_empty.notify_one();
    }

    /// Block until an element is available, then remove and return the oldest.
    pub fn pop_blocking(&self) -> T {
        let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            if let Some(value) = items.pop_front() {
                return value;
            }
            items = self
                .non_empty
                .wait(items)
                .unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Remove and return the oldest element without blocking.
    pub fn try_pop(&self) -> Option<T> {
        self.items
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
    }

    /// Number of queued elements. Stale as soon as it is returned when
    /// producers are active.
    pub fn size(&self) -> usize {
        self.items.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether the queue currently holds no elements.
    pub fn is_empty(&self) -> bool {
        self.items
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_empty()
    }

    /// Empty the queue in one step, returning the newest element and how many
    /// older ones were discarded with it.
    ///
    /// Unlike [`collapse_to_latest`](Self::collapse_to_latest) nothing stays
    /// queued, and the count is exact even while producers are pushing.
    pub fn take_latest(&self) -> Result<(T, usize), QueueError> {
        let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        let latest = items.pop_back().ok_or(QueueError::Empty)?;
        let discarded = items.len();
        items.clear();
        Ok((latest, discarded))
    }
}

impl<T: Clone> HandoffQueue<T> {
    /// Drop every element except the most recently pushed one and return a
    /// copy of it. The latest element stays queued, so repeated calls keep
    /// returning it with `size() == 1`.
    ///
    /// Fails with [`QueueError::Empty`] when nothing is queued.
    pub fn collapse_to_latest(&self) -> Result<T, QueueError> {
        let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        let stale = items.len().saturating_sub(1);
        items.drain(..stale);
        if stale > 0 {
            tracing::trace!(discarded = stale, "collapsed handoff queue");
        }
        items.front().cloned().ok_or(QueueError::Empty)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn pops_in_push_order() {
        let q = HandoffQueue::new();
        for i in 0..5 {
            q.push(i);
        }
        let popped: Vec<_> = (0..5).map(|_| q.pop_blocking()).collect();
        assert_eq!(popped, vec![0, 1, 2, 3, 4]);
        assert!(q.is_empty());
    }

    #[test]
    fn collapse_keeps_only_latest() {
        let q = HandoffQueue::new();
        q.push('a');
        q.push('b');
        q.push('c');
        assert_eq!(q.collapse_to_latest(), Ok('c'));
        assert_eq!(q.size(), 1);
        assert_eq!(q.collapse_to_latest(), Ok('c'));
        assert_eq!(q.size(), 1);
        assert_eq!(q.pop_blocking(), 'c');
    }

    #[test]
    fn collapse_on_empty_queue_is_an_error() {
        let q: HandoffQueue<u32> = HandoffQueue::new();
        assert_eq!(q.collapse_to_latest(), Err(QueueError::Empty));
        assert_eq!(q.size(), 0);
    }

    #[test]
    fn take_latest_empties_and_counts() {
        let q = HandoffQueue::new();
        assert_eq!(q.take_latest(), Err(QueueError::Empty));
        q.push("x");
        assert_eq!(q.take_latest(), Ok(("x", 0)));
        for s in ["a", "b", "c"] {
            q.push(s);
        }
        assert_eq!(q.take_latest(), Ok(("c", 2)));
        assert!(q.is_empty());
    }

    #[test]
    fn take_latest_accounts_for_every_push_under_contention() {
        let q = Arc::new(HandoffQueue::new());
        let producer = {
            let q = Arc::clone(&q);
            thread::spawn(move || {
                for i in 0..10_000_u32 {
                    q.push(i);
                }
            })
        };
        let mut accounted = 0;
        let mut newest = None;
        while accounted < 10_000 {
            if let Ok((latest, discarded)) = q.take_latest() {
                accounted += discarded + 1;
                assert!(newest < Some(latest));
                newest = Some(latest);
            }
        }
        producer.join().unwrap();
        assert_eq!(accounted, 10_000);
        assert_eq!(newest, Some(9_999));
        assert!(q.is_empty());
    }

    #[test]
    fn try_pop_does_not_block_when_empty() {
        let q: HandoffQueue<u32> = HandoffQueue::default();
        assert_eq!(q.try_pop(), None);
        q.push(7);
        assert_eq!(q.try_pop(), Some(7));
    }

    #[test]
    fn blocked_consumer_wakes_on_push() {
        let q = Arc::new(HandoffQueue::new());
        let consumer = {
            let q = Arc::clone(&q);
            thread::spawn(move || q.pop_blocking())
        };
        thread::sleep(Duration::from_millis(20));
        q.push(42_u64);
        assert_eq!(consumer.join().unwrap(), 42);
    }

    #[test]
    fn multiple_producers_lose_nothing() {
        let q = Arc::new(HandoffQueue::new());
        let producers: Vec<_> = (0..4)
            .map(|p| {
                let q = Arc::clone(&q);
                thread::spawn(move || {
                    for i in 0..100 {
                        q.push(p * 1000 + i);
                    }
                })
            })
            .collect();
        for handle in producers {
            handle.join().unwrap();
        }
        let mut seen: Vec<_> = (0..400).map(|_| q.pop_blocking()).collect();
        // per-producer order is preserved
        for p in 0..4 {
            let mine: Vec<_> = seen.iter().copied().filter(|v| v / 1000 == p).collect();
            assert_eq!(mine, (0..100).map(|i| p * 1000 + i).collect::<Vec<_>>());
        }
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), 400);
    }
}
