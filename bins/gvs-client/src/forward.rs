// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Consumer side of the stdin handoff: turns queued lines into messages.

use anyhow::{anyhow, Context, Result};
use gvs_scene::{SceneItemId, SceneItemInfoSetter};
use gvs_session_client::MessageSink;
use gvs_sync::{HandoffQueue, QueueError};
use tracing::{debug, warn};

/// Work item handed from the stdin reader to the forwarder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Outbound {
    Line(String),
    Quit,
}

#[derive(Debug, PartialEq)]
pub(crate) enum Command {
    Text(String),
    Scene {
        item: SceneItemId,
        update: SceneItemInfoSetter,
    },
}

/// `scene <id> <json>` becomes a scene update; anything else is text.
pub(crate) fn parse_line(line: &str) -> Result<Command> {
    let Some(rest) = line.strip_prefix("scene ") else {
        return Ok(Command::Text(line.to_string()));
    };
    let (id, json) = rest
        .trim_start()
        .split_once(char::is_whitespace)
        .ok_or_else(|| anyhow!("expected `scene <item-id> <json>`"))?;
    let item = SceneItemId(id.parse().with_context(|| format!("item id {id:?}"))?);
    let update = serde_json::from_str(json).context("scene update json")?;
    Ok(Command::Scene { item, update })
}

/// Delivery counters for one forwarder run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Forwarded {
    pub(crate) sent: usize,
    pub(crate) dropped: usize,
    pub(crate) skipped: usize,
}

/// Next item to forward. With `latest_only`, a backlog collapses to its
/// newest entry; `Quit` is always pushed last so it is never skipped.
fn next(queue: &HandoffQueue<Outbound>, latest_only: bool, stats: &mut Forwarded) -> Outbound {
    let first = queue.pop_blocking();
    if !latest_only {
        return first;
    }
    match queue.take_latest() {
        Ok((latest, discarded)) => {
            // `first` is superseded along with the discarded entries
            stats.skipped += discarded + 1;
            latest
        }
        Err(QueueError::Empty) => first,
    }
}

/// Drain `queue` into `sink` until `Outbound::Quit`.
pub(crate) fn forward(
    queue: &HandoffQueue<Outbound>,
    sink: &mut MessageSink,
    latest_only: bool,
) -> Forwarded {
    let mut stats = Forwarded::default();
    loop {
        let Outbound::Line(line) = next(queue, latest_only, &mut stats) else {
            debug!(?stats, "forwarder done");
            return stats;
        };
        let delivered = match parse_line(&line) {
            Ok(Command::Text(text)) => sink.append(text.as_str()).send(),
            Ok(Command::Scene { item, update }) => {
                let client_id = sink.client_id().to_string();
                sink.sender().send_scene_update(&client_id, item, update)
            }
            Err(err) => {
                warn!(%err, "ignoring malformed scene line");
                continue;
            }
        };
        if delivered {
            stats.sent += 1;
        } else {
            stats.dropped += 1;
        }
    }
}
