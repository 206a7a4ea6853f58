// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Text accumulator bound to a session.

use std::fmt::{self, Display, Write as _};

use gvs_proto::{ClientTextPayload, Message};

use crate::{ConnectionSession, SessionSender};

/// Accumulates text and sends it as one `client_text` message.
///
/// ```no_run
/// # use std::time::Duration;
/// # use gvs_session_client::{ConnectionSession, MessageSink};
/// let session = ConnectionSession::connect("localhost:50055", Duration::from_secs(1));
/// let mut sink = MessageSink::new(&session, "viewer");
/// sink.append("frame ").append(&42);
/// let delivered = sink.send();
/// # let _ = delivered;
/// ```
#[derive(Debug, Clone)]
pub struct MessageSink {
    sender: SessionSender,
    client_id: String,
    buffer: String,
}

impl MessageSink {
    /// Sink over `session`, tagging every message with `client_id`.
    pub fn new(session: &ConnectionSession, client_id: impl Into<String>) -> Self {
        Self::from_sender(session.sender(), client_id)
    }

    /// Sink over an existing sender handle.
    pub fn from_sender(sender: SessionSender, client_id: impl Into<String>) -> Self {
        Self {
            sender,
            client_id: client_id.into(),
            buffer: String::new(),
        }
    }

    /// Append the textual rendering of `value`.
    pub fn append<T: Display + ?Sized>(&mut self, value: &T) -> &mut Self {
        // writing into a String cannot fail
        let _ = write!(self.buffer, "{value}");
        self
    }

    /// Send the buffered text and clear the buffer.
    ///
    /// Returns `false` and drops the text if the session is not connected or
    /// the write fails. The buffer is empty afterwards either way.
    pub fn send(&mut self) -> bool {
        let content = std::mem::take(&mut self.buffer);
        self.sender.send(&Message::ClientText(ClientTextPayload {
            client_id: self.client_id.clone(),
            content,
        }))
    }

    /// Text accumulated since the last send.
    pub fn buffered(&self) -> &str {
        &self.buffer
    }

    /// Identifier stamped on outgoing messages.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Underlying sender, for messages other than text.
    pub fn sender(&self) -> &SessionSender {
        &self.sender
    }
}

impl fmt::Write for MessageSink {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.buffer.push_str(s);
        Ok(())
    }
}
