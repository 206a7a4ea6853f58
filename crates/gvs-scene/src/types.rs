// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Core scene item types.
//!
//! `Option` fields on the setter types mean "unchanged" when `None`. A
//! present-but-empty value (for example `children: Some(vec![])`) is a valid
//! request to clear that field.

use serde::{Deserialize, Serialize};
use std::fmt;

/// 2D vector (texture coordinates).
pub type Vec2 = [f32; 2];
/// 3D vector (positions, normals).
pub type Vec3 = [f32; 3];
/// Linear RGB color, components in `0.0..=1.0`.
pub type Color3 = [f32; 3];
/// Column-major 4x4 transformation matrix.
pub type Transform = [f32; 16];

/// Identity transformation.
pub const IDENTITY: Transform = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0,
];

/// Identifier of a scene item.
///
/// The default id is [`SceneItemId::ROOT`].
#[repr(transparent)]
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct SceneItemId(pub u64);

impl SceneItemId {
    /// Implicit root of every scene; never stored as an item.
    pub const ROOT: Self = Self(0);
}

impl fmt::Display for SceneItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Parametric shapes the renderer tessellates itself.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Primitive {
    /// Unit cube centered on the origin.
    Cube,
    /// Cone along +Z.
    Cone {
        /// Number of radial segments.
        divisions: u32,
    },
    /// Cylinder along +Z.
    Cylinder {
        /// Number of radial segments.
        divisions: u32,
    },
    /// Unit square in the XY plane.
    Plane,
    /// Unit sphere.
    Sphere {
        /// Longitudinal segments.
        divisions_u: u32,
        /// Latitudinal segments.
        divisions_v: u32,
    },
}

/// Explicit vertex data.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MeshGeometry {
    /// Vertex positions.
    pub positions: Vec<Vec3>,
    /// Per-vertex normals.
    pub normals: Vec<Vec3>,
    /// Per-vertex texture coordinates.
    pub texture_coordinates: Vec<Vec2>,
    /// Per-vertex colors.
    pub vertex_colors: Vec<Color3>,
    /// Index buffer; empty means draw vertices in order.
    pub indices: Vec<u32>,
}

/// Geometry of a scene item.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Geometry {
    /// Renderer-generated primitive.
    Primitive(Primitive),
    /// Explicit vertex data.
    Mesh(MeshGeometry),
}

impl Default for Geometry {
    fn default() -> Self {
        Self::Mesh(MeshGeometry::default())
    }
}

/// How vertices are assembled into primitives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeometryFormat {
    /// Individual points.
    Points,
    /// Independent line segments.
    Lines,
    /// Connected line strip.
    LineStrip,
    /// Independent triangles.
    Triangles,
    /// Triangle strip.
    TriangleStrip,
    /// Triangle fan.
    TriangleFan,
}

/// Source of surface color.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Coloring {
    /// One color for the whole item.
    UniformColor,
    /// Interpolated per-vertex colors.
    VertexColors,
    /// Normals mapped to RGB.
    Normals,
    /// Texture coordinates mapped to RG.
    TextureCoordinates,
}

/// Lighting model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Shading {
    /// Flat color, no lighting.
    UniformColor,
    /// Lambertian shading.
    Lambertian,
    /// Cook-Torrance shading.
    CookTorrance,
}

/// Display settings of a scene item.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DisplayInfo {
    /// Primitive assembly mode.
    pub geometry_format: GeometryFormat,
    /// Source of surface color.
    pub coloring: Coloring,
    /// Color used with [`Coloring::UniformColor`].
    pub uniform_color: Color3,
    /// Lighting model.
    pub shading: Shading,
    /// Whether the item is drawn.
    pub visible: bool,
    /// Opacity in `0.0..=1.0`.
    pub opacity: f32,
    /// Draw edges only.
    pub wireframe_only: bool,
    /// Local-to-parent transformation.
    pub transformation: Transform,
}

impl Default for DisplayInfo {
    fn default() -> Self {
        Self {
            geometry_format: GeometryFormat::Points,
            coloring: Coloring::UniformColor,
            uniform_color: [1.0, 0.9, 0.7],
            shading: Shading::Lambertian,
            visible: true,
            opacity: 1.0,
            wireframe_only: false,
            transformation: IDENTITY,
        }
    }
}

impl DisplayInfo {
    /// Display defaults appropriate for `geometry`.
    ///
    /// Primitives and indexed meshes render as triangles, bare point clouds
    /// as points.
    pub fn defaults_for(geometry: &Geometry) -> Self {
        let geometry_format = match geometry {
            Geometry::Primitive(_) => GeometryFormat::Triangles,
            Geometry::Mesh(mesh) if mesh.indices.is_empty() => GeometryFormat::Points,
            Geometry::Mesh(_) => GeometryFormat::Triangles,
        };
        Self {
            geometry_format,
            ..Self::default()
        }
    }
}

/// Current state of one scene item.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneItemInfo {
    /// Geometry.
    pub geometry: Geometry,
    /// Display settings.
    pub display_info: DisplayInfo,
    /// Parent item, [`SceneItemId::ROOT`] for top-level items.
    pub parent: SceneItemId,
    /// Child items in draw order.
    pub children: Vec<SceneItemId>,
}

/// Field-level edits to mesh geometry. `None` leaves a buffer unchanged.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GeometryUpdate {
    /// Replacement positions.
    pub positions: Option<Vec<Vec3>>,
    /// Replacement normals.
    pub normals: Option<Vec<Vec3>>,
    /// Replacement texture coordinates.
    pub texture_coordinates: Option<Vec<Vec2>>,
    /// Replacement vertex colors.
    pub vertex_colors: Option<Vec<Color3>>,
    /// Replacement index buffer.
    pub indices: Option<Vec<u32>>,
}

impl GeometryUpdate {
    /// Whether any per-vertex buffer is being replaced.
    pub fn touches_vertices(&self) -> bool {
        self.positions.is_some()
            || self.normals.is_some()
            || self.texture_coordinates.is_some()
            || self.vertex_colors.is_some()
    }
}

/// Geometry change request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum GeometryInfoSetter {
    /// Replace the geometry with a primitive. Display defaults are re-derived.
    Primitive(Primitive),
    /// Edit individual mesh buffers.
    Mesh(GeometryUpdate),
}

/// Display change request. `None` leaves a setting unchanged.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DisplayInfoSetter {
    /// New primitive assembly mode.
    pub geometry_format: Option<GeometryFormat>,
    /// New color source.
    pub coloring: Option<Coloring>,
    /// New uniform color.
    pub uniform_color: Option<Color3>,
    /// New lighting model.
    pub shading: Option<Shading>,
    /// New visibility.
    pub visible: Option<bool>,
    /// New opacity.
    pub opacity: Option<f32>,
    /// New wireframe flag.
    pub wireframe_only: Option<bool>,
    /// New local transformation.
    pub transformation: Option<Transform>,
}

/// Update request for one scene item.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneItemInfoSetter {
    /// Geometry change.
    pub geometry: Option<GeometryInfoSetter>,
    /// Display change.
    pub display_info: Option<DisplayInfoSetter>,
    /// New parent.
    pub parent: Option<SceneItemId>,
    /// New child list; `Some(vec![])` clears all children.
    pub children: Option<Vec<SceneItemId>>,
}
