// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! In-memory scene state that applies update requests.

use std::collections::{HashMap, HashSet};

use crate::diff::{compute_diff, UpdatedInfo};
use crate::types::{
    DisplayInfo, DisplayInfoSetter, Geometry, GeometryInfoSetter, GeometryUpdate, MeshGeometry,
    SceneItemId, SceneItemInfo, SceneItemInfoSetter,
};
use crate::SceneError;

/// Scene items keyed by id, with parent/child links kept consistent.
#[derive(Debug, Default, Clone)]
pub struct SceneModel {
    items: HashMap<SceneItemId, SceneItemInfo>,
}

impl SceneModel {
    /// Create an empty scene.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of items (the implicit root is not counted).
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the scene holds no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Look up an item.
    pub fn item(&self, id: SceneItemId) -> Option<&SceneItemInfo> {
        self.items.get(&id)
    }

    /// Top-level items, sorted by id.
    pub fn roots(&self) -> Vec<SceneItemId> {
        let mut roots: Vec<_> = self
            .items
            .iter()
            .filter(|(_, info)| info.parent == SceneItemId::ROOT)
            .map(|(id, _)| *id)
            .collect();
        roots.sort_unstable();
        roots
    }

    /// Apply `update` to item `id`, creating it first if it does not exist.
    ///
    /// Returns the fields a renderer must refresh: everything for a newly
    /// created item, otherwise [`compute_diff`] of the update. Validation
    /// happens before any mutation, so a rejected update leaves the scene
    /// untouched.
    pub fn upsert(
        &mut self,
        id: SceneItemId,
        update: &SceneItemInfoSetter,
    ) -> Result<UpdatedInfo, SceneError> {
        if id == SceneItemId::ROOT {
            return Err(SceneError::ReservedId(id));
        }
        self.validate_links(id, update)?;

        let created = !self.items.contains_key(&id);
        if created {
            self.items.insert(id, SceneItemInfo::default());
        }
        let converted = self.apply(id, update);

        let diff = if created {
            UpdatedInfo::everything()
        } else if converted {
            // every buffer of the old primitive is gone, not only the edited ones
            compute_diff(update).merge(UpdatedInfo {
                geometry: true,
                geometry_vertices: true,
                geometry_indices: true,
                display_geometry_format: true,
                ..UpdatedInfo::default()
            })
        } else {
            compute_diff(update)
        };
        tracing::debug!(item = %id, created, ?diff, "applied scene update");
        Ok(diff)
    }

    /// Remove item `id`. Its children are moved to the root.
    pub fn remove(&mut self, id: SceneItemId) -> Result<SceneItemInfo, SceneError> {
        if id == SceneItemId::ROOT {
            return Err(SceneError::ReservedId(id));
        }
        let info = self
            .items
            .remove(&id)
            .ok_or(SceneError::UnknownItem(id))?;
        self.unlink_child(info.parent, id);
        for child in &info.children {
            if let Some(child_info) = self.items.get_mut(child) {
                child_info.parent = SceneItemId::ROOT;
            }
        }
        Ok(info)
    }

    fn validate_links(
        &self,
        id: SceneItemId,
        update: &SceneItemInfoSetter,
    ) -> Result<(), SceneError> {
        if let Some(parent) = update.parent {
            if parent == id
                || (parent != SceneItemId::ROOT && !self.items.contains_key(&parent))
                || self.is_ancestor(id, parent)
            {
                return Err(SceneError::InvalidParent { item: id, parent });
            }
        }
        if let Some(children) = &update.children {
            let mut seen = HashSet::with_capacity(children.len());
            for child in children {
                if *child == id
                    || !self.items.contains_key(child)
                    || self.is_ancestor(*child, id)
                {
                    return Err(SceneError::InvalidParent {
                        item: *child,
                        parent: id,
                    });
                }
                if !seen.insert(*child) {
                    return Err(SceneError::DuplicateChild {
                        parent: id,
                        child: *child,
                    });
                }
            }
        }
        Ok(())
    }

    /// Whether `ancestor` appears on the parent chain of `item`.
    fn is_ancestor(&self, ancestor: SceneItemId, item: SceneItemId) -> bool {
        let mut current = item;
        // bounded walk: a chain can't be longer than the item count
        for _ in 0..=self.items.len() {
            match self.items.get(&current) {
                Some(info) if info.parent == ancestor => return true,
                Some(info) if info.parent != SceneItemId::ROOT => current = info.parent,
                _ => return false,
            }
        }
        false
    }

    /// Returns whether a mesh edit replaced a primitive.
    fn apply(&mut self, id: SceneItemId, update: &SceneItemInfoSetter) -> bool {
        let mut converted = false;
        if let Some(info) = self.items.get_mut(&id) {
            match &update.geometry {
                Some(GeometryInfoSetter::Primitive(primitive)) => {
                    info.geometry = Geometry::Primitive(*primitive);
                    info.display_info = DisplayInfo::defaults_for(&info.geometry);
                }
                Some(GeometryInfoSetter::Mesh(edit)) => {
                    converted = apply_mesh_edit(&mut info.geometry, edit);
                }
                None => {}
            }
            if let Some(display) = &update.display_info {
                apply_display(&mut info.display_info, display);
            }
        }

        if let Some(parent) = update.parent {
            self.set_parent(id, parent);
        }
        if let Some(children) = &update.children {
            self.set_children(id, children);
        }
        converted
    }

    fn set_parent(&mut self, id: SceneItemId, parent: SceneItemId) {
        let Some(old) = self.items.get(&id).map(|info| info.parent) else {
            return;
        };
        self.unlink_child(old, id);
        if let Some(info) = self.items.get_mut(&id) {
            info.parent = parent;
        }
        if let Some(parent_info) = self.items.get_mut(&parent) {
            if !parent_info.children.contains(&id) {
                parent_info.children.push(id);
            }
        }
    }

    fn set_children(&mut self, id: SceneItemId, children: &[SceneItemId]) {
        let previous = self
            .items
            .get_mut(&id)
            .map(|info| std::mem::take(&mut info.children))
            .unwrap_or_default();
        for orphan in previous.iter().filter(|c| !children.contains(c)) {
            if let Some(info) = self.items.get_mut(orphan) {
                info.parent = SceneItemId::ROOT;
            }
        }
        for child in children {
            let old_parent = self.items.get(child).map(|info| info.parent);
            if let Some(old_parent) = old_parent.filter(|p| *p != id) {
                self.unlink_child(old_parent, *child);
            }
            if let Some(info) = self.items.get_mut(child) {
                info.parent = id;
            }
        }
        if let Some(info) = self.items.get_mut(&id) {
            info.children = children.to_vec();
        }
    }

    fn unlink_child(&mut self, parent: SceneItemId, child: SceneItemId) {
        if let Some(parent_info) = self.items.get_mut(&parent) {
            parent_info.children.retain(|c| *c != child);
        }
    }
}

/// Edits mesh buffers in place. A primitive is first replaced by an empty
/// mesh; returns `true` when that happened.
fn apply_mesh_edit(geometry: &mut Geometry, edit: &GeometryUpdate) -> bool {
    let converted = matches!(geometry, Geometry::Primitive(_));
    if converted {
        *geometry = Geometry::Mesh(MeshGeometry::default());
    }
    let Geometry::Mesh(mesh) = geometry else {
        return converted;
    };
    if let Some(positions) = &edit.positions {
        mesh.positions.clone_from(positions);
    }
    if let Some(normals) = &edit.normals {
        mesh.normals.clone_from(normals);
    }
    if let Some(uvs) = &edit.texture_coordinates {
        mesh.texture_coordinates.clone_from(uvs);
    }
    if let Some(colors) = &edit.vertex_colors {
        mesh.vertex_colors.clone_from(colors);
    }
    if let Some(indices) = &edit.indices {
        mesh.indices.clone_from(indices);
    }
    converted
}

fn apply_display(display: &mut DisplayInfo, edit: &DisplayInfoSetter) {
    if let Some(format) = edit.geometry_format {
        display.geometry_format = format;
    }
    if let Some(coloring) = edit.coloring {
        display.coloring = coloring;
    }
    if let Some(color) = edit.uniform_color {
        display.uniform_color = color;
    }
    if let Some(shading) = edit.shading {
        display.shading = shading;
    }
    if let Some(visible) = edit.visible {
        display.visible = visible;
    }
    if let Some(opacity) = edit.opacity {
        display.opacity = opacity.clamp(0.0, 1.0);
    }
    if let Some(wireframe) = edit.wireframe_only {
        display.wireframe_only = wireframe;
    }
    if let Some(transformation) = edit.transformation {
        display.transformation = transformation;
    }
}
