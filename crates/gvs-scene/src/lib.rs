// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Scene item model for gvs renderers.
//!
//! Clients describe changes to a scene item with a [`SceneItemInfoSetter`];
//! [`compute_diff`] turns it into an [`UpdatedInfo`] telling caches and
//! renderers exactly what to invalidate.
//!
//! # Diff contract
//!
//! - A diff never reports `false` for data that changed. Extra `true` flags
//!   only cost redundant work.
//! - Diffs are created per update, consumed, and discarded.

use thiserror::Error;

/// Error type for scene model mutations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SceneError {
    /// The referenced item does not exist.
    #[error("unknown scene item {0}")]
    UnknownItem(SceneItemId),
    /// The root id cannot be stored, updated or removed.
    #[error("scene item id {0} is reserved")]
    ReservedId(SceneItemId),
    /// The requested parent is the item itself, does not exist, or would
    /// close a cycle.
    #[error("invalid parent {parent} for scene item {item}")]
    InvalidParent {
        /// Item being re-parented.
        item: SceneItemId,
        /// Requested parent.
        parent: SceneItemId,
    },
    /// A child list names the same item twice.
    #[error("scene item {child} listed twice under {parent}")]
    DuplicateChild {
        /// Parent whose child list was rejected.
        parent: SceneItemId,
        /// Repeated child.
        child: SceneItemId,
    },
}

mod diff;
mod model;
mod types;

pub use diff::{compute_diff, UpdatedInfo};
pub use model::SceneModel;
pub use types::{
    Color3, Coloring, DisplayInfo, DisplayInfoSetter, Geometry, GeometryFormat, GeometryInfoSetter,
    GeometryUpdate, MeshGeometry, Primitive, SceneItemId, SceneItemInfo, SceneItemInfoSetter,
    Shading, Transform, Vec2, Vec3, IDENTITY,
};
