// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Session wire schema for the gvs server (client text + scene updates).
//! Messages travel as CBOR `OpEnvelope`s inside checksummed packets; see
//! [`wire`].

pub use gvs_scene::{SceneItemId, SceneItemInfoSetter};
use serde::{Deserialize, Serialize};

pub mod wire;

/// Default listen address of the server.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:50055";

/// Default server address used by clients.
pub const DEFAULT_SERVER_ADDRESS: &str = "localhost:50055";

/// Envelope carried as the payload of a packet.
///
/// * `op` – operation name.
/// * `ts` – sender-local logical timestamp.
/// * `payload` – operation specific body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OpEnvelope<P> {
    /// Operation name (e.g., "client_text", "scene_update").
    pub op: String,
    /// Logical timestamp (monotonic per sender).
    pub ts: u64,
    /// Operation-specific body.
    pub payload: P,
}

/// Accumulated text flushed by a client's message sink.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientTextPayload {
    /// Name the client identifies itself with.
    pub client_id: String,
    /// Message body.
    pub content: String,
}

/// Update request for one scene item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SceneUpdatePayload {
    /// Name of the sending client.
    pub client_id: String,
    /// Target item.
    pub item_id: SceneItemId,
    /// Fields to change.
    pub update: SceneItemInfoSetter,
}

/// Wire message kinds carried inside `OpEnvelope` payloads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Message {
    /// Client text message (op = "client_text").
    ClientText(ClientTextPayload),
    /// Scene item update (op = "scene_update").
    SceneUpdate(SceneUpdatePayload),
}

impl Message {
    /// Canonical op string for this message variant.
    pub fn op_name(&self) -> &'static str {
        match self {
            Message::ClientText(_) => "client_text",
            Message::SceneUpdate(_) => "scene_update",
        }
    }

    /// Sender name carried by every message.
    pub fn client_id(&self) -> &str {
        match self {
            Message::ClientText(p) => &p.client_id,
            Message::SceneUpdate(p) => &p.client_id,
        }
    }
}
