// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Shared test doubles for gvs crates.
#![forbid(unsafe_code)]
//!
//! # Modules
//!
//! - [`config`] - In-memory config store fake for testing without filesystem
//! - [`transport`] - Scripted transport for driving sessions without sockets

pub mod config;
pub mod transport;

pub use config::{InMemoryConfigStore, StoreCall, StoreFault};
pub use transport::ScriptedTransport;
