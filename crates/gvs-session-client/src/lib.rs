// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Client helper for talking to the gvs server: supervised connection
//! sessions over a pluggable [`Transport`], and a [`MessageSink`] for
//! best-effort text messages.
//!
//! Everything here runs on OS threads. The only blocking points are the
//! initial connect wait and the supervisor's bounded state-change watch.

use std::sync::{Mutex, MutexGuard};

mod error;
mod session;
mod sink;
mod tcp;
pub mod transport;

pub use error::{SessionError, TransportError};
pub use session::{ConnectionSession, ConnectionState, SessionConfig, SessionSender};
pub use sink::MessageSink;
pub use tcp::TcpChannel;
pub use transport::{ChannelState, StateCell, Transport, WatchEvent, WatchQueue, WatchTag};

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
