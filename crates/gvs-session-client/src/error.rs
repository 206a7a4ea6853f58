// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Error types for sessions and transports.

use thiserror::Error;

/// Errors raised by [`crate::Transport`] implementations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The address could not be resolved.
    #[error("cannot resolve {address}: {source}")]
    Resolve {
        /// Address as given by the caller.
        address: String,
        /// Resolver failure.
        #[source]
        source: std::io::Error,
    },
    /// The address is not `host:port`, or resolved to nothing.
    #[error("no socket address for {0}")]
    NoAddress(String),
    /// The channel has no live connection.
    #[error("channel not ready")]
    NotReady,
    /// Socket I/O failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by [`crate::ConnectionSession`] control operations.
///
/// Connection timeouts and transport failures are not errors: they surface
/// as [`crate::ConnectionState`] values.
#[derive(Debug, Error)]
pub enum SessionError {
    /// `run_supervised` called while a supervisor is already running.
    #[error("session is already supervised")]
    AlreadySupervised,
    /// The session was stopped.
    #[error("session stopped")]
    Stopped,
    /// The supervisor thread could not be spawned.
    #[error("failed to spawn supervisor: {0}")]
    Spawn(#[source] std::io::Error),
}
