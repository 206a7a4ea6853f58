// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Persisted preferences for the gvs server and client.

use gvs_proto::{DEFAULT_BIND_ADDRESS, DEFAULT_SERVER_ADDRESS};
use serde::{Deserialize, Serialize};

use crate::config::Prefs;

/// Server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerPrefs {
    /// Socket address to listen on.
    pub bind_address: String,
}

impl Prefs for ServerPrefs {
    const KEY: &'static str = "gvs_server";
}

impl Default for ServerPrefs {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
        }
    }
}

/// Client settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientPrefs {
    /// Server to connect to.
    pub server_address: String,
    /// Name sent with every message.
    pub client_name: String,
    /// Initial connection wait in milliseconds.
    pub connect_timeout_ms: u64,
    /// Upper bound on one supervisor watch cycle in milliseconds.
    pub watch_ceiling_ms: u64,
    /// Forward only the newest queued line instead of every line.
    pub latest_only: bool,
}

impl Prefs for ClientPrefs {
    const KEY: &'static str = "gvs_client";
}

impl Default for ClientPrefs {
    fn default() -> Self {
        Self {
            server_address: DEFAULT_SERVER_ADDRESS.to_string(),
            client_name: "gvs-client".to_string(),
            connect_timeout_ms: 3_000,
            watch_ceiling_ms: 15_000,
            latest_only: false,
        }
    }
}
