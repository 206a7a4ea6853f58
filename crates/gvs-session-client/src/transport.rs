// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Transport capability set used by [`crate::ConnectionSession`].
//!
//! A transport must let the session:
//!
//! 1. query readiness (optionally kicking off a connection attempt),
//! 2. wait for readiness up to a deadline,
//! 3. register one-shot "state changed before deadline" watches that report
//!    into a [`WatchQueue`],
//! 4. send opaque bytes and shut down.
//!
//! [`StateCell`] implements the readiness bookkeeping and watch servicing so
//! concrete transports only have to drive state transitions.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::{lock, TransportError};

/// Transport-level channel state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelState {
    /// No connection and no attempt in flight.
    Idle,
    /// A connection attempt is in flight.
    Connecting,
    /// Connected and able to send.
    Ready,
    /// The last attempt failed or the connection dropped.
    TransientFailure,
    /// Shut down for good.
    Shutdown,
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Ready => "ready",
            Self::TransientFailure => "transient-failure",
            Self::Shutdown => "shutdown",
        };
        f.write_str(name)
    }
}

/// Tag identifying one armed watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchTag(pub u64);

/// Completion of a watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchEvent {
    /// Tag given when the watch was armed.
    pub tag: WatchTag,
    /// `true` if the state changed, `false` if the deadline passed first.
    pub fired: bool,
}

/// Queue that watches report into.
///
/// After [`WatchQueue::shutdown`], [`WatchQueue::next`] returns `None`
/// immediately, pending events are discarded and new posts are ignored.
#[derive(Debug, Default)]
pub struct WatchQueue {
    inner: Mutex<WatchQueueInner>,
    ready: Condvar,
}

#[derive(Debug, Default)]
struct WatchQueueInner {
    events: VecDeque<WatchEvent>,
    shutdown: bool,
}

impl WatchQueue {
    /// Create an open, empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver an event. Returns `false` if the queue has been shut down.
    pub fn post(&self, event: WatchEvent) -> bool {
        let mut inner = lock(&self.inner);
        if inner.shutdown {
            return false;
        }
        inner.events.push_back(event);
        drop(inner);
        self.ready.notify_one();
        true
    }

    /// Block until an event arrives or the queue shuts down.
    pub fn next(&self) -> Option<WatchEvent> {
        let mut inner = lock(&self.inner);
        loop {
            if inner.shutdown {
                return None;
            }
            if let Some(event) = inner.events.pop_front() {
                return Some(event);
            }
            inner = self.ready.wait(inner).unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Wake every waiter and refuse further events.
    pub fn shutdown(&self) {
        let mut inner = lock(&self.inner);
        inner.shutdown = true;
        inner.events.clear();
        drop(inner);
        self.ready.notify_all();
    }

    /// Whether [`WatchQueue::shutdown`] has been called.
    pub fn is_shutdown(&self) -> bool {
        lock(&self.inner).shutdown
    }
}

/// Shared channel state with change notification.
///
/// [`ChannelState::Shutdown`] is terminal: once set, further updates are
/// ignored.
#[derive(Debug)]
pub struct StateCell {
    state: Mutex<ChannelState>,
    changed: Condvar,
}

impl StateCell {
    /// Create a cell holding `initial`.
    pub fn new(initial: ChannelState) -> Self {
        Self {
            state: Mutex::new(initial),
            changed: Condvar::new(),
        }
    }

    /// Current state.
    pub fn get(&self) -> ChannelState {
        *lock(&self.state)
    }

    /// Move to `next`, waking waiters on change. Returns `false` when the cell
    /// is already shut down.
    pub fn set(&self, next: ChannelState) -> bool {
        let mut state = lock(&self.state);
        if *state == ChannelState::Shutdown {
            return false;
        }
        let previous = *state;
        if previous != next {
            tracing::trace!(from = %previous, to = %next, "channel state");
            *state = next;
            drop(state);
            self.changed.notify_all();
        }
        true
    }

    /// Block until the state differs from `last_observed` (returns `true`) or
    /// `deadline` passes (returns `false`).
    pub fn wait_change(&self, last_observed: ChannelState, deadline: Instant) -> bool {
        self.wait_until(deadline, |s| s != last_observed).is_some()
    }

    /// Block up to `timeout` for shutdown. Returns `true` if shut down.
    pub fn wait_for_shutdown(&self, timeout: Duration) -> bool {
        self.wait_until(Instant::now() + timeout, |s| s == ChannelState::Shutdown)
            .is_some()
    }

    /// Block until `done(state)` holds or `deadline` passes. Returns the
    /// satisfying state.
    pub fn wait_until(
        &self,
        deadline: Instant,
        mut done: impl FnMut(ChannelState) -> bool,
    ) -> Option<ChannelState> {
        let mut state = lock(&self.state);
        loop {
            if done(*state) {
                return Some(*state);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            state = self
                .changed
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(|e| e.into_inner())
                .0;
        }
    }

    /// Arm a one-shot watch: post `WatchEvent { tag, fired }` to `queue` once
    /// the state leaves `last_observed` or `deadline` passes.
    ///
    /// The wait runs on a short-lived helper thread. If that thread cannot be
    /// spawned the wait happens on the caller's thread instead.
    pub fn watch(
        self: &Arc<Self>,
        last_observed: ChannelState,
        deadline: Instant,
        queue: &Arc<WatchQueue>,
        tag: WatchTag,
    ) {
        let cell = Arc::clone(self);
        let events = Arc::clone(queue);
        let spawned = thread::Builder::new()
            .name("gvs-watch".into())
            .spawn(move || {
                let fired = cell.wait_change(last_observed, deadline);
                events.post(WatchEvent { tag, fired });
            });
        if let Err(err) = spawned {
            tracing::warn!(%err, "watch thread unavailable; waiting inline");
            let fired = self.wait_change(last_observed, deadline);
            queue.post(WatchEvent { tag, fired });
        }
    }
}

/// Channel capability set consumed by [`crate::ConnectionSession`].
pub trait Transport: Send + Sync {
    /// Current state. With `try_to_connect`, an idle or failed channel starts
    /// (or schedules) a new connection attempt.
    fn state(&self, try_to_connect: bool) -> ChannelState;

    /// Block until the channel is ready (`true`) or `deadline` passes or the
    /// channel shuts down (`false`).
    fn wait_for_connected(&self, deadline: Instant) -> bool;

    /// One-shot notification into `queue` when the state leaves
    /// `last_observed` before `deadline`.
    fn notify_on_state_change(
        &self,
        last_observed: ChannelState,
        deadline: Instant,
        queue: &Arc<WatchQueue>,
        tag: WatchTag,
    );

    /// Write one already-framed message.
    fn send(&self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Close the channel for good, waking any pending watches.
    fn shutdown(&self);
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn watch_queue_delivers_in_order_until_shutdown() {
        let queue = WatchQueue::new();
        assert!(queue.post(WatchEvent {
            tag: WatchTag(1),
            fired: true
        }));
        assert!(queue.post(WatchEvent {
            tag: WatchTag(2),
            fired: false
        }));
        assert_eq!(queue.next().map(|e| e.tag), Some(WatchTag(1)));
        queue.shutdown();
        assert!(queue.is_shutdown());
        assert_eq!(queue.next(), None);
        assert!(!queue.post(WatchEvent {
            tag: WatchTag(3),
            fired: true
        }));
    }

    #[test]
    fn shutdown_wakes_blocked_waiter() {
        let queue = Arc::new(WatchQueue::new());
        let waiter = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.next())
        };
        thread::sleep(Duration::from_millis(20));
        queue.shutdown();
        assert_eq!(waiter.join().unwrap(), None);
    }

    #[test]
    fn shutdown_state_is_terminal() {
        let cell = StateCell::new(ChannelState::Idle);
        assert!(cell.set(ChannelState::Connecting));
        assert!(cell.set(ChannelState::Shutdown));
        assert!(!cell.set(ChannelState::Ready));
        assert_eq!(cell.get(), ChannelState::Shutdown);
    }

    #[test]
    fn wait_change_times_out_without_change() {
        let cell = StateCell::new(ChannelState::Connecting);
        let start = Instant::now();
        assert!(!cell.wait_change(
            ChannelState::Connecting,
            start + Duration::from_millis(30)
        ));
        assert!(start.elapsed() >= Duration::from_millis(30));
        assert!(cell.wait_change(ChannelState::Idle, Instant::now()));
    }

    #[test]
    fn watch_fires_on_change_and_on_deadline() {
        let cell = Arc::new(StateCell::new(ChannelState::Connecting));
        let queue = Arc::new(WatchQueue::new());

        cell.watch(
            ChannelState::Connecting,
            Instant::now() + Duration::from_secs(5),
            &queue,
            WatchTag(7),
        );
        cell.set(ChannelState::Ready);
        assert_eq!(
            queue.next(),
            Some(WatchEvent {
                tag: WatchTag(7),
                fired: true
            })
        );

        cell.watch(
            ChannelState::Ready,
            Instant::now() + Duration::from_millis(10),
            &queue,
            WatchTag(8),
        );
        assert_eq!(
            queue.next(),
            Some(WatchEvent {
                tag: WatchTag(8),
                fired: false
            })
        );
    }
}
