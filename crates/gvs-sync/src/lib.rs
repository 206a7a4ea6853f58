// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Cross-thread handoff primitives for gvs.
//!
//! Producers push into a [`HandoffQueue`]; a single consumer drains it in
//! push order or collapses the backlog to the freshest entry. Continuations
//! that cross thread boundaries travel as [`ErasedCallback`]s.

mod callback;
mod queue;

pub use callback::ErasedCallback;
pub use queue::{HandoffQueue, QueueError};
