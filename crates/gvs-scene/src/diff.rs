// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Change tracking for scene item updates.

use crate::types::{GeometryInfoSetter, SceneItemInfoSetter};

/// Which parts of a scene item an update touched.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UpdatedInfo {
    /// Geometry changed in any way.
    pub geometry: bool,
    /// Per-vertex buffers changed.
    pub geometry_vertices: bool,
    /// Index buffer changed.
    pub geometry_indices: bool,
    /// Display settings changed.
    pub display: bool,
    /// Primitive assembly mode changed.
    pub display_geometry_format: bool,
    /// Parent changed.
    pub parent: bool,
    /// Child list changed.
    pub children: bool,
}

impl UpdatedInfo {
    /// Every flag set; used for full resyncs (new item, new subscriber,
    /// reconnect after data loss).
    pub const fn everything() -> Self {
        Self {
            geometry: true,
            geometry_vertices: true,
            geometry_indices: true,
            display: true,
            display_geometry_format: true,
            parent: true,
            children: true,
        }
    }

    /// Whether no flag is set.
    pub const fn is_empty(&self) -> bool {
        !(self.geometry
            || self.geometry_vertices
            || self.geometry_indices
            || self.display
            || self.display_geometry_format
            || self.parent
            || self.children)
    }

    /// Flag-wise union, for coalescing several updates to the same item.
    pub const fn merge(self, other: Self) -> Self {
        Self {
            geometry: self.geometry || other.geometry,
            geometry_vertices: self.geometry_vertices || other.geometry_vertices,
            geometry_indices: self.geometry_indices || other.geometry_indices,
            display: self.display || other.display,
            display_geometry_format: self.display_geometry_format
                || other.display_geometry_format,
            parent: self.parent || other.parent,
            children: self.children || other.children,
        }
    }
}

/// Compute which fields `update` changes.
pub fn compute_diff(update: &SceneItemInfoSetter) -> UpdatedInfo {
    let mut info = UpdatedInfo::default();

    match &update.geometry {
        // A primitive swap re-derives display defaults, format included.
        Some(GeometryInfoSetter::Primitive(_)) => {
            info.geometry = true;
            info.geometry_vertices = true;
            info.geometry_indices = true;
            info.display = true;
            info.display_geometry_format = true;
        }
        Some(GeometryInfoSetter::Mesh(mesh)) => {
            info.geometry = true;
            info.geometry_vertices = mesh.touches_vertices();
            info.geometry_indices = mesh.indices.is_some();
        }
        None => {}
    }

    if let Some(display) = &update.display_info {
        info.display = true;
        info.display_geometry_format |= display.geometry_format.is_some();
    }

    info.parent = update.parent.is_some();
    info.children = update.children.is_some();
    info
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::{
        DisplayInfoSetter, GeometryFormat, GeometryUpdate, Primitive, SceneItemId,
    };

    fn mesh_update(update: GeometryUpdate) -> SceneItemInfoSetter {
        SceneItemInfoSetter {
            geometry: Some(GeometryInfoSetter::Mesh(update)),
            ..Default::default()
        }
    }

    #[test]
    fn empty_update_changes_nothing() {
        let diff = compute_diff(&SceneItemInfoSetter::default());
        assert!(diff.is_empty());
    }

    #[test]
    fn indices_only_update() {
        let diff = compute_diff(&mesh_update(GeometryUpdate {
            indices: Some(vec![0, 1, 2]),
            ..Default::default()
        }));
        assert_eq!(
            diff,
            UpdatedInfo {
                geometry: true,
                geometry_vertices: false,
                geometry_indices: true,
                display: false,
                display_geometry_format: false,
                parent: false,
                children: false,
            }
        );
    }

    #[test]
    fn each_vertex_buffer_marks_vertices() {
        let cases = [
            GeometryUpdate {
                positions: Some(vec![[0.0; 3]]),
                ..Default::default()
            },
            GeometryUpdate {
                normals: Some(vec![[0.0, 0.0, 1.0]]),
                ..Default::default()
            },
            GeometryUpdate {
                texture_coordinates: Some(vec![[0.5, 0.5]]),
                ..Default::default()
            },
            GeometryUpdate {
                vertex_colors: Some(vec![]),
                ..Default::default()
            },
        ];
        for update in cases {
            let diff = compute_diff(&mesh_update(update));
            assert!(diff.geometry);
            assert!(diff.geometry_vertices);
            assert!(!diff.geometry_indices);
            assert!(!diff.display);
        }
    }

    #[test]
    fn empty_mesh_edit_still_marks_geometry() {
        let diff = compute_diff(&mesh_update(GeometryUpdate::default()));
        assert!(diff.geometry);
        assert!(!diff.geometry_vertices);
        assert!(!diff.geometry_indices);
    }

    #[test]
    fn primitive_replacement_forces_full_geometry_and_display() {
        for primitive in [
            Primitive::Cube,
            Primitive::Sphere {
                divisions_u: 8,
                divisions_v: 8,
            },
        ] {
            let diff = compute_diff(&SceneItemInfoSetter {
                geometry: Some(GeometryInfoSetter::Primitive(primitive)),
                ..Default::default()
            });
            assert!(diff.geometry);
            assert!(diff.geometry_vertices);
            assert!(diff.geometry_indices);
            assert!(diff.display);
            assert!(diff.display_geometry_format);
            assert!(!diff.parent);
            assert!(!diff.children);
        }
    }

    #[test]
    fn display_update_tracks_format_separately() {
        let plain = compute_diff(&SceneItemInfoSetter {
            display_info: Some(DisplayInfoSetter {
                visible: Some(false),
                ..Default::default()
            }),
            ..Default::default()
        });
        assert!(plain.display);
        assert!(!plain.display_geometry_format);
        assert!(!plain.geometry);

        let format = compute_diff(&SceneItemInfoSetter {
            display_info: Some(DisplayInfoSetter {
                geometry_format: Some(GeometryFormat::Lines),
                ..Default::default()
            }),
            ..Default::default()
        });
        assert!(format.display);
        assert!(format.display_geometry_format);
    }

    #[test]
    fn parent_and_children_mirror_presence() {
        let diff = compute_diff(&SceneItemInfoSetter {
            parent: Some(SceneItemId(3)),
            children: Some(vec![]),
            ..Default::default()
        });
        assert!(diff.parent);
        assert!(diff.children);
        assert!(!diff.geometry);
        assert!(!diff.display);
    }

    #[test]
    fn everything_sets_every_flag() {
        let all = UpdatedInfo::everything();
        assert!(
            all.geometry
                && all.geometry_vertices
                && all.geometry_indices
                && all.display
                && all.display_geometry_format
                && all.parent
                && all.children
        );
        assert_eq!(UpdatedInfo::default().merge(all), all);
    }
}
