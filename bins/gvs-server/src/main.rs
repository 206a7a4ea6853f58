// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! TCP hub for gvs clients: logs their text messages and keeps a scene model
//! current from their scene updates.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use gvs_app_core::config::ConfigService;
use gvs_app_core::prefs::ServerPrefs;
use gvs_config_fs::FsConfigStore;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod hub;

use hub::{handle_client, HubState};

#[derive(Parser, Debug)]
#[command(author, version, about = "gvs visualization hub")]
struct Args {
    /// Address to listen on (e.g. 0.0.0.0:50055). Defaults to the saved prefs.
    bind_address: Option<String>,
}

fn load_prefs() -> ServerPrefs {
    match FsConfigStore::new() {
        Ok(store) => {
            let (prefs, source) = ConfigService::new(store).load_or_init::<ServerPrefs>();
            info!(?source, "prefs ready");
            prefs
        }
        Err(err) => {
            warn!(%err, "config store unavailable; using defaults");
            ServerPrefs::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let prefs = load_prefs();
    let bind_address = args.bind_address.unwrap_or(prefs.bind_address);

    let listener = TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("bind {bind_address}"))?;
    info!("gvs hub listening on {}", listener.local_addr()?);

    let hub = Arc::new(Mutex::new(HubState::default()));
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = accepted?;
                if let Err(err) = stream.set_nodelay(true) {
                    warn!(%peer, %err, "set_nodelay failed");
                }
                tokio::spawn(handle_client(stream, peer.to_string(), Arc::clone(&hub)));
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
        }
    }

    let h = hub.lock().await;
    info!(items = h.scene.len(), clients = h.conns.len(), "final scene");
    Ok(())
}
