// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Scripted transport fake for driving sessions without sockets.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use gvs_proto::wire::decode_message;
use gvs_proto::Message;
use gvs_session_client::{
    ChannelState, StateCell, Transport, TransportError, WatchQueue, WatchTag,
};

/// [`Transport`] whose channel state is set by the test.
///
/// Watches are serviced by the shared [`StateCell`], so moving the state with
/// [`ScriptedTransport::set_state`] wakes the session supervisor exactly like
/// a real channel would. Frames handed to `send` are recorded.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use gvs_dry_tests::ScriptedTransport;
/// use gvs_session_client::{ChannelState, ConnectionSession, SessionConfig};
///
/// let transport = ScriptedTransport::new(ChannelState::Ready);
/// let session = ConnectionSession::with_transport(
///     Arc::new(transport.clone()),
///     Duration::from_millis(10),
///     SessionConfig::default(),
/// );
/// assert!(session.is_connected());
/// ```
#[derive(Clone)]
pub struct ScriptedTransport {
    cell: Arc<StateCell>,
    inner: Arc<Mutex<ScriptedInner>>,
}

#[derive(Default)]
struct ScriptedInner {
    sent: Vec<Vec<u8>>,
    connect_requests: usize,
    shutdown_count: usize,
    fail_on_send: bool,
}

impl ScriptedTransport {
    /// Transport starting in `initial`.
    pub fn new(initial: ChannelState) -> Self {
        Self {
            cell: Arc::new(StateCell::new(initial)),
            inner: Arc::new(Mutex::new(ScriptedInner::default())),
        }
    }

    fn inner(&self) -> MutexGuard<'_, ScriptedInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Move the channel to `next`. Ignored once shut down.
    pub fn set_state(&self, next: ChannelState) {
        self.cell.set(next);
    }

    /// Current channel state.
    pub fn current(&self) -> ChannelState {
        self.cell.get()
    }

    /// Make subsequent sends fail with an I/O error.
    pub fn set_fail_on_send(&self, fail: bool) {
        self.inner().fail_on_send = fail;
    }

    /// Raw frames sent so far.
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.inner().sent.clone()
    }

    /// Decoded messages sent so far, skipping frames that fail to decode.
    pub fn sent_messages(&self) -> Vec<Message> {
        self.inner()
            .sent
            .iter()
            .filter_map(|frame| decode_message(frame).ok().map(|(msg, _, _)| msg))
            .collect()
    }

    /// How often `state(true)` found the channel idle or failed.
    pub fn connect_requests(&self) -> usize {
        self.inner().connect_requests
    }

    /// How often `shutdown` was called.
    pub fn shutdown_count(&self) -> usize {
        self.inner().shutdown_count
    }
}

impl Transport for ScriptedTransport {
    fn state(&self, try_to_connect: bool) -> ChannelState {
        let state = self.cell.get();
        if try_to_connect && matches!(state, ChannelState::Idle | ChannelState::TransientFailure)
        {
            self.inner().connect_requests += 1;
        }
        state
    }

    fn wait_for_connected(&self, deadline: Instant) -> bool {
        self.cell.wait_until(deadline, |s| {
            matches!(s, ChannelState::Ready | ChannelState::Shutdown)
        }) == Some(ChannelState::Ready)
    }

    fn notify_on_state_change(
        &self,
        last_observed: ChannelState,
        deadline: Instant,
        queue: &Arc<WatchQueue>,
        tag: WatchTag,
    ) {
        self.cell.watch(last_observed, deadline, queue, tag);
    }

    fn send(&self, bytes: &[u8]) -> Result<(), TransportError> {
        if self.cell.get() != ChannelState::Ready {
            return Err(TransportError::NotReady);
        }
        let mut inner = self.inner();
        if inner.fail_on_send {
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "simulated send failure",
            )));
        }
        inner.sent.push(bytes.to_vec());
        Ok(())
    }

    fn shutdown(&self) {
        self.inner().shutdown_count += 1;
        self.cell.set(ChannelState::Shutdown);
    }
}
