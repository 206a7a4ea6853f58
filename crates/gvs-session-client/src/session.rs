// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Supervised connection session.
//!
//! # State machine
//!
//! ```text
//!   NotConnected --run_supervised--> AttemptingToConnect --ready--> Connected
//!        ^                                   |                          |
//!        +------------- shutdown ------------+------ lost / stop -------+
//! ```
//!
//! The supervisor thread is the only writer of the state apart from
//! [`ConnectionSession::stop`]; both go through the same mutex. After `stop`
//! the state stays `NotConnected`.
//!
//! # Supervisor loop
//!
//! 1. read the transport state (asking it to connect if idle),
//! 2. promote `AttemptingToConnect` to `Connected` once ready, demote
//!    `Connected` to `NotConnected` once the link is gone,
//! 3. invoke the callback with the session state,
//! 4. unless `NotConnected`, arm a tagged state-change watch bounded by the
//!    watch ceiling,
//! 5. block on the watch queue, ignoring events for stale tags.
//!
//! The loop exits only when the watch queue is shut down.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use gvs_proto::wire::encode_message;
use gvs_proto::{Message, SceneItemId, SceneItemInfoSetter, SceneUpdatePayload};
use gvs_sync::ErasedCallback;
use tracing::{debug, info, trace, warn};

use crate::lock;
use crate::transport::{ChannelState, Transport, WatchQueue, WatchTag};
use crate::{SessionError, TcpChannel};

/// Default upper bound on one supervisor watch cycle.
pub const DEFAULT_WATCH_CEILING: Duration = Duration::from_secs(15);

/// Session-level connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No usable connection; terminal until supervision restarts.
    NotConnected,
    /// Waiting for the transport to become ready.
    AttemptingToConnect,
    /// The transport is ready.
    Connected,
}

/// Tunables for a [`ConnectionSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Longest the supervisor waits for a state change before re-checking.
    pub watch_ceiling: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            watch_ceiling: DEFAULT_WATCH_CEILING,
        }
    }
}

struct SessionShared {
    inner: Mutex<SessionInner>,
    watch: Arc<WatchQueue>,
    next_ts: AtomicU64,
}

struct SessionInner {
    state: ConnectionState,
    transport: Option<Arc<dyn Transport>>,
    stopped: bool,
}

impl SessionShared {
    fn state(&self) -> ConnectionState {
        lock(&self.inner).state
    }

    fn transport(&self) -> Option<Arc<dyn Transport>> {
        lock(&self.inner).transport.clone()
    }

    /// Supervision start counts as a fresh attempt for a session whose initial
    /// connect timed out.
    fn resume(&self) {
        let mut inner = lock(&self.inner);
        if !inner.stopped
            && inner.state == ConnectionState::NotConnected
            && inner.transport.is_some()
        {
            info!("resuming connection attempts");
            inner.state = ConnectionState::AttemptingToConnect;
        }
    }

    /// Fold a transport observation into the session state.
    fn observe(&self, channel: ChannelState) -> ConnectionState {
        let mut inner = lock(&self.inner);
        if inner.stopped {
            return inner.state;
        }
        let next = match (inner.state, channel) {
            (ConnectionState::AttemptingToConnect, ChannelState::Ready) => {
                ConnectionState::Connected
            }
            (ConnectionState::AttemptingToConnect, ChannelState::Shutdown) => {
                ConnectionState::NotConnected
            }
            (ConnectionState::Connected, ChannelState::Ready) => ConnectionState::Connected,
            (ConnectionState::Connected, _) => ConnectionState::NotConnected,
            (state, _) => state,
        };
        if next != inner.state {
            info!(from = ?inner.state, to = ?next, %channel, "connection state changed");
            inner.state = next;
        }
        next
    }
}

/// A client's connection to a long-lived server.
///
/// Dropping the session calls [`ConnectionSession::stop`].
pub struct ConnectionSession {
    shared: Arc<SessionShared>,
    config: SessionConfig,
    supervisor: Option<JoinHandle<()>>,
    supervisor_id: Option<ThreadId>,
}

impl ConnectionSession {
    /// Open a TCP channel to `address` and wait up to `max_wait` for it to
    /// become ready.
    ///
    /// A timeout is not an error: the session is returned with
    /// `is_connected() == false` and callers decide whether to supervise
    /// further or give up.
    pub fn connect(address: &str, max_wait: Duration) -> Self {
        Self::connect_with_config(address, max_wait, SessionConfig::default())
    }

    /// [`ConnectionSession::connect`] with explicit tunables.
    pub fn connect_with_config(address: &str, max_wait: Duration, config: SessionConfig) -> Self {
        match TcpChannel::open(address, max_wait) {
            Ok(channel) => Self::with_transport(Arc::new(channel), max_wait, config),
            Err(err) => {
                warn!(%address, %err, "could not open channel");
                Self::from_parts(ConnectionState::NotConnected, None, config)
            }
        }
    }

    /// Wrap an existing transport and wait up to `max_wait` for readiness.
    pub fn with_transport(
        transport: Arc<dyn Transport>,
        max_wait: Duration,
        config: SessionConfig,
    ) -> Self {
        let started = Instant::now();
        let state = if transport.wait_for_connected(started + max_wait) {
            info!(elapsed = ?started.elapsed(), "session connected");
            ConnectionState::Connected
        } else {
            warn!(max_wait = ?max_wait, "connect timed out");
            ConnectionState::NotConnected
        };
        Self::from_parts(state, Some(transport), config)
    }

    fn from_parts(
        state: ConnectionState,
        transport: Option<Arc<dyn Transport>>,
        config: SessionConfig,
    ) -> Self {
        Self {
            shared: Arc::new(SessionShared {
                inner: Mutex::new(SessionInner {
                    state,
                    transport,
                    stopped: false,
                }),
                watch: Arc::new(WatchQueue::new()),
                next_ts: AtomicU64::new(0),
            }),
            config,
            supervisor: None,
            supervisor_id: None,
        }
    }

    /// Point-in-time check for `Connected`.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Point-in-time session state.
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Tunables in effect.
    pub fn config(&self) -> SessionConfig {
        self.config
    }

    /// Cloneable handle for sending messages over this session.
    pub fn sender(&self) -> SessionSender {
        SessionSender {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Start the supervisor thread, invoking `callback` with the session
    /// state on every wake-up until [`ConnectionSession::stop`].
    ///
    /// A session whose initial connect timed out re-enters
    /// `AttemptingToConnect` once the supervisor thread starts.
    pub fn run_supervised<C>(&mut self, callback: C) -> Result<(), SessionError>
    where
        C: Into<ErasedCallback<ConnectionState>>,
    {
        if self.supervisor.is_some() {
            return Err(SessionError::AlreadySupervised);
        }
        if lock(&self.shared.inner).stopped {
            return Err(SessionError::Stopped);
        }

        let shared = Arc::clone(&self.shared);
        let ceiling = self.config.watch_ceiling;
        let mut callback = callback.into();
        let handle = thread::Builder::new()
            .name("gvs-session-supervisor".into())
            .spawn(move || supervise(&shared, &mut callback, ceiling))
            .map_err(SessionError::Spawn)?;
        self.supervisor_id = Some(handle.thread().id());
        self.supervisor = Some(handle);
        Ok(())
    }

    /// Stop supervision and release the transport. Idempotent.
    ///
    /// Forces `NotConnected`, shuts the transport down, shuts the watch queue
    /// down so the supervisor unblocks, then joins it. On the supervisor
    /// thread itself the join is skipped.
    pub fn stop(&mut self) {
        let transport = {
            let mut inner = lock(&self.shared.inner);
            if !inner.stopped {
                debug!(from = ?inner.state, "stopping session");
            }
            inner.stopped = true;
            inner.state = ConnectionState::NotConnected;
            inner.transport.take()
        };
        if let Some(transport) = transport {
            transport.shutdown();
        }
        self.shared.watch.shutdown();

        if let Some(handle) = self.supervisor.take() {
            if self.supervisor_id == Some(thread::current().id()) {
                debug!("stop called from supervisor; not joining");
                return;
            }
            if handle.join().is_err() {
                warn!("session supervisor panicked");
            }
        }
    }
}

impl Drop for ConnectionSession {
    fn drop(&mut self) {
        self.stop();
    }
}

fn supervise(
    shared: &SessionShared,
    callback: &mut ErasedCallback<ConnectionState>,
    ceiling: Duration,
) {
    shared.resume();
    let mut next_tag = 0u64;
    loop {
        let transport = shared.transport();
        let observed = transport.as_ref().map(|t| t.state(true));
        let state = match observed {
            Some(channel) => shared.observe(channel),
            None => shared.state(),
        };

        callback.invoke(state);

        let armed = match (&transport, observed) {
            (Some(transport), Some(channel)) if state != ConnectionState::NotConnected => {
                next_tag += 1;
                let tag = WatchTag(next_tag);
                transport.notify_on_state_change(
                    channel,
                    Instant::now() + ceiling,
                    &shared.watch,
                    tag,
                );
                Some(tag)
            }
            _ => None,
        };
        drop(transport);

        loop {
            match shared.watch.next() {
                None => {
                    debug!("watch queue shut down; supervisor exiting");
                    return;
                }
                Some(event) if Some(event.tag) == armed => {
                    trace!(tag = event.tag.0, fired = event.fired, "watch completed");
                    break;
                }
                Some(event) => {
                    trace!(tag = event.tag.0, "ignoring stale watch event");
                }
            }
        }
    }
}

/// Sending half of a session, shared by sinks and producers.
///
/// Messages are dropped (with a debug log) unless the session is
/// `Connected`; nothing is queued for later delivery.
#[derive(Clone)]
pub struct SessionSender {
    shared: Arc<SessionShared>,
}

impl SessionSender {
    /// Point-in-time check for `Connected`.
    pub fn is_connected(&self) -> bool {
        self.shared.state() == ConnectionState::Connected
    }

    /// Encode and send `message`. Returns whether it was handed to the
    /// transport.
    pub fn send(&self, message: &Message) -> bool {
        let transport = {
            let inner = lock(&self.shared.inner);
            if inner.state != ConnectionState::Connected {
                None
            } else {
                inner.transport.clone()
            }
        };
        let Some(transport) = transport else {
            debug!(op = message.op_name(), "not connected; dropping message");
            return false;
        };
        let ts = self.shared.next_ts.fetch_add(1, Ordering::Relaxed);
        let bytes = match encode_message(message, ts) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(%err, op = message.op_name(), "failed to encode message");
                return false;
            }
        };
        match transport.send(&bytes) {
            Ok(()) => true,
            Err(err) => {
                warn!(%err, op = message.op_name(), "send failed");
                false
            }
        }
    }

    /// Send a `scene_update` for `item_id` on behalf of `client_id`.
    pub fn send_scene_update(
        &self,
        client_id: &str,
        item_id: SceneItemId,
        update: SceneItemInfoSetter,
    ) -> bool {
        self.send(&Message::SceneUpdate(SceneUpdatePayload {
            client_id: client_id.to_string(),
            item_id,
            update,
        }))
    }
}

impl std::fmt::Debug for SessionSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSender")
            .field("state", &self.shared.state())
            .finish()
    }
}

impl std::fmt::Debug for ConnectionSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSession")
            .field("state", &self.state())
            .field("config", &self.config)
            .field("supervised", &self.supervisor.is_some())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::sync::mpsc;

    fn closed_port() -> u16 {
        TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    #[test]
    fn connect_to_nothing_times_out_quickly() {
        let start = Instant::now();
        let mut session = ConnectionSession::connect(
            &format!("127.0.0.1:{}", closed_port()),
            Duration::from_millis(100),
        );
        let elapsed = start.elapsed();
        assert!(!session.is_connected());
        assert_eq!(session.state(), ConnectionState::NotConnected);
        assert!(elapsed >= Duration::from_millis(90), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(500), "{elapsed:?}");
        session.stop();
    }

    #[test]
    fn stop_twice_without_connecting() {
        let mut session = ConnectionSession::connect(
            &format!("127.0.0.1:{}", closed_port()),
            Duration::from_millis(10),
        );
        session.stop();
        session.stop();
        assert!(!session.is_connected());
    }

    #[test]
    fn unresolvable_address_yields_disconnected_session() {
        let mut session = ConnectionSession::connect("definitely not:an address", Duration::ZERO);
        assert_eq!(session.state(), ConnectionState::NotConnected);
        let (tx, rx) = mpsc::channel();
        session
            .run_supervised(move |state: ConnectionState| {
                let _ = tx.send(state);
            })
            .unwrap();
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(1)).unwrap(),
            ConnectionState::NotConnected
        );
        session.stop();
    }

    #[test]
    fn supervised_connect_reports_connected() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let mut session = ConnectionSession::connect(&addr, Duration::from_secs(2));
        assert!(session.is_connected());

        let (tx, rx) = mpsc::channel();
        session
            .run_supervised(move |state: ConnectionState| {
                let _ = tx.send(state);
            })
            .unwrap();
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(1)).unwrap(),
            ConnectionState::Connected
        );
        assert!(matches!(
            session.run_supervised(|_: ConnectionState| {}),
            Err(SessionError::AlreadySupervised)
        ));
        session.stop();
        assert!(!session.is_connected());
        assert!(matches!(
            session.run_supervised(|_: ConnectionState| {}),
            Err(SessionError::Stopped)
        ));
    }
}
