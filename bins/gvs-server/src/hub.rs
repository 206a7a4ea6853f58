// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Per-connection framing and message dispatch.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use gvs_proto::wire::{decode_message, frame_len};
use gvs_proto::Message;
use gvs_scene::{SceneError, SceneModel, UpdatedInfo};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub(crate) struct ConnState {
    pub(crate) peer: String,
    pub(crate) client_id: Option<String>,
    pub(crate) messages: u64,
}

#[derive(Default)]
pub(crate) struct HubState {
    pub(crate) next_conn_id: u64,
    pub(crate) conns: HashMap<u64, ConnState>,
    pub(crate) scene: SceneModel,
}

impl HubState {
    pub(crate) fn register(&mut self, peer: String) -> u64 {
        let id = self.next_conn_id;
        self.next_conn_id += 1;
        self.conns.insert(
            id,
            ConnState {
                peer,
                client_id: None,
                messages: 0,
            },
        );
        id
    }
}

/// Outcome of one dispatched message.
#[derive(Debug, PartialEq)]
pub(crate) enum Handled {
    Text,
    Scene(UpdatedInfo),
}

pub(crate) async fn handle_client<S>(mut stream: S, peer: String, hub: Arc<Mutex<HubState>>)
where
    S: AsyncRead + Unpin,
{
    let conn_id = hub.lock().await.register(peer.clone());
    info!(conn_id, %peer, "client connected");

    if let Err(err) = pump(&mut stream, conn_id, &hub).await {
        warn!(conn_id, %peer, ?err, "dropping connection");
    }

    let mut h = hub.lock().await;
    if let Some(conn) = h.conns.remove(&conn_id) {
        info!(
            conn_id,
            peer = %conn.peer,
            client = conn.client_id.as_deref().unwrap_or("?"),
            messages = conn.messages,
            "client disconnected"
        );
    }
}

/// Read frames until EOF. Errors end the connection.
async fn pump<S>(stream: &mut S, conn_id: u64, hub: &Arc<Mutex<HubState>>) -> Result<()>
where
    S: AsyncRead + Unpin,
{
    let mut read_buf = vec![0u8; 16 * 1024];
    let mut acc: Vec<u8> = Vec::with_capacity(32 * 1024);
    loop {
        let n = stream.read(&mut read_buf).await?;
        if n == 0 {
            if !acc.is_empty() {
                debug!(conn_id, pending = acc.len(), "eof with partial frame");
            }
            return Ok(());
        }
        acc.extend_from_slice(&read_buf[..n]);

        // process as many frames as available
        while let Some(total) = frame_len(&acc)? {
            if acc.len() < total {
                break;
            }
            let (msg, ts, used) = decode_message(&acc[..total])?;
            acc.drain(..used);
            debug!(conn_id, ts, op = msg.op_name(), "frame");
            if let Err(err) = handle_message(msg, conn_id, hub).await {
                warn!(conn_id, %err, "scene update rejected");
            }
        }
    }
}

pub(crate) async fn handle_message(
    msg: Message,
    conn_id: u64,
    hub: &Arc<Mutex<HubState>>,
) -> Result<Handled, SceneError> {
    let mut h = hub.lock().await;
    if let Some(conn) = h.conns.get_mut(&conn_id) {
        conn.messages += 1;
        if conn.client_id.as_deref() != Some(msg.client_id()) {
            conn.client_id = Some(msg.client_id().to_string());
        }
    }
    match msg {
        Message::ClientText(p) => {
            info!("message from {}: {}", p.client_id, p.content);
            Ok(Handled::Text)
        }
        Message::SceneUpdate(p) => {
            let diff = h.scene.upsert(p.item_id, &p.update)?;
            info!(
                client = %p.client_id,
                item = %p.item_id,
                items = h.scene.len(),
                ?diff,
                "scene item updated"
            );
            Ok(Handled::Scene(diff))
        }
    }
}
