// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Line-oriented gvs client.
//!
//! stdin is the producer: every line is pushed onto a [`HandoffQueue`]. A
//! forwarder thread drains the queue through a [`MessageSink`] while the
//! session supervisor logs connection state changes.

use std::io::BufRead;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::Parser;
use gvs_app_core::config::ConfigService;
use gvs_app_core::prefs::ClientPrefs;
use gvs_config_fs::FsConfigStore;
use gvs_session_client::{ConnectionSession, ConnectionState, MessageSink, SessionConfig};
use gvs_sync::HandoffQueue;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod forward;

use forward::{forward, Outbound};

#[derive(Parser, Debug)]
#[command(author, version, about = "Forward stdin lines to a gvs hub")]
struct Args {
    /// Server address (host:port). Defaults to the saved prefs.
    server_address: Option<String>,
    /// Name sent with every message. Defaults to the saved prefs.
    client_name: Option<String>,
    /// Initial connection wait in milliseconds
    #[arg(long)]
    connect_timeout_ms: Option<u64>,
    /// Upper bound on one supervisor watch cycle in milliseconds
    #[arg(long)]
    watch_ceiling_ms: Option<u64>,
    /// Forward only the newest pending line, skipping any backlog
    #[arg(long)]
    latest_only: bool,
}

impl Args {
    /// Command-line values win over saved prefs.
    fn apply(self, prefs: ClientPrefs) -> ClientPrefs {
        ClientPrefs {
            server_address: self.server_address.unwrap_or(prefs.server_address),
            client_name: self.client_name.unwrap_or(prefs.client_name),
            connect_timeout_ms: self.connect_timeout_ms.unwrap_or(prefs.connect_timeout_ms),
            watch_ceiling_ms: self.watch_ceiling_ms.unwrap_or(prefs.watch_ceiling_ms),
            latest_only: self.latest_only || prefs.latest_only,
        }
    }
}

fn load_prefs() -> ClientPrefs {
    match FsConfigStore::new() {
        Ok(store) => {
            let (prefs, source) = ConfigService::new(store).load_or_init::<ClientPrefs>();
            info!(?source, "prefs ready");
            prefs
        }
        Err(err) => {
            warn!(%err, "config store unavailable; using defaults");
            ClientPrefs::default()
        }
    }
}

fn log_state(state: ConnectionState) {
    match state {
        ConnectionState::Connected => info!("connected"),
        ConnectionState::AttemptingToConnect => info!("connecting"),
        ConnectionState::NotConnected => warn!("not connected; lines will be dropped"),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let prefs = args.apply(load_prefs());
    let config = SessionConfig {
        watch_ceiling: Duration::from_millis(prefs.watch_ceiling_ms),
    };
    let mut session = ConnectionSession::connect_with_config(
        &prefs.server_address,
        Duration::from_millis(prefs.connect_timeout_ms),
        config,
    );
    if !session.is_connected() {
        warn!(server = %prefs.server_address, "initial connect timed out; still trying");
    }
    session.run_supervised(log_state)?;

    let queue = Arc::new(HandoffQueue::new());
    let forwarder = {
        let queue = Arc::clone(&queue);
        let mut sink = MessageSink::new(&session, prefs.client_name.clone());
        let latest_only = prefs.latest_only;
        thread::Builder::new()
            .name("gvs-forwarder".into())
            .spawn(move || forward(&queue, &mut sink, latest_only))?
    };

    for line in std::io::stdin().lock().lines() {
        match line {
            Ok(line) => queue.push(Outbound::Line(line)),
            Err(err) => {
                warn!(%err, "stdin read failed");
                break;
            }
        }
    }
    queue.push(Outbound::Quit);

    let stats = forwarder
        .join()
        .map_err(|_| anyhow!("forwarder thread panicked"))?;
    info!(
        sent = stats.sent,
        dropped = stats.dropped,
        skipped = stats.skipped,
        "done"
    );
    session.stop();
    Ok(())
}
