use bytemuck::Pod;
use glam::{Mat4, Vec3};
use rustc_hash::FxHashMap;
use uuid::Uuid;

use crate::backend::{AttributeLayout, BackendRef, BufferUsage, DataType, Location};
use crate::errors::{RenderError, Result};
use crate::resources::buffer::{AttributeBuffer, IndexBuffer};

/// Vertex input semantics known to the built-in shaders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VertexAttribute {
    Position,
    Normal,
    Tangent,
    UV0,
    Color,
    BoneIndices,
    BoneWeights,
}

impl VertexAttribute {
    pub const ALL: [VertexAttribute; 7] = [
        VertexAttribute::Position,
        VertexAttribute::Normal,
        VertexAttribute::Tangent,
        VertexAttribute::UV0,
        VertexAttribute::Color,
        VertexAttribute::BoneIndices,
        VertexAttribute::BoneWeights,
    ];

    /// Name of the vertex input in shader source.
    #[must_use]
    pub fn shader_name(self) -> &'static str {
        match self {
            Self::Position => "aPosition",
            Self::Normal => "aNormal",
            Self::Tangent => "aTangent",
            Self::UV0 => "aUV0",
            Self::Color => "aColor",
            Self::BoneIndices => "aBoneIndices",
            Self::BoneWeights => "aBoneWeights",
        }
    }

    /// Default layout used by the built-in shaders.
    #[must_use]
    pub fn default_layout(self) -> AttributeLayout {
        match self {
            Self::Position | Self::Normal => AttributeLayout::float(3),
            Self::Tangent | Self::Color | Self::BoneWeights => AttributeLayout::float(4),
            Self::UV0 => AttributeLayout::float(2),
            Self::BoneIndices => AttributeLayout {
                components: 4,
                data_type: DataType::U32,
                normalize: false,
                stride: 0,
            },
        }
    }
}

/// CPU-side data of one vertex attribute stream.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    data: Vec<u8>,
    pub layout: AttributeLayout,
    pub count: u32,
}

impl Attribute {
    /// Planar (non-interleaved) attribute from typed data.
    pub fn new<T: Pod>(data: &[T], layout: AttributeLayout) -> Self {
        let raw = bytemuck::cast_slice(data).to_vec();
        let element = layout.element_size().max(1);
        let count = (raw.len() / element) as u32;
        Self {
            data: raw,
            layout,
            count,
        }
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Reads element `i` as three floats. `None` for non-float streams or out
    /// of range indices.
    #[must_use]
    pub fn read_vec3(&self, i: u32) -> Option<Vec3> {
        if self.layout.data_type != DataType::F32 || self.layout.components < 3 || i >= self.count {
            return None;
        }
        let start = i as usize * self.layout.element_size();
        let xyz: [f32; 3] = bytemuck::pod_read_unaligned(self.data.get(start..start + 12)?);
        Some(Vec3::from_array(xyz))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl BoundingBox {
    #[must_use]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    #[must_use]
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Box enclosing the eight transformed corners.
    #[must_use]
    pub fn transform(&self, matrix: &Mat4) -> Self {
        let mut min = Vec3::splat(f32::MAX);
        let mut max = Vec3::splat(f32::MIN);
        for i in 0..8 {
            let corner = Vec3::new(
                if i & 1 == 0 { self.min.x } else { self.max.x },
                if i & 2 == 0 { self.min.y } else { self.max.y },
                if i & 4 == 0 { self.min.z } else { self.max.z },
            );
            let p = matrix.transform_point3(corner);
            min = min.min(p);
            max = max.max(p);
        }
        Self { min, max }
    }
}

struct GpuGeometry {
    attributes: Vec<(VertexAttribute, AttributeBuffer)>,
    index: IndexBuffer,
}

/// Mesh data: attribute streams plus triangle indices, and their backend
/// buffers once uploaded.
pub struct Geometry {
    pub uuid: Uuid,
    attributes: FxHashMap<VertexAttribute, Attribute>,
    indices: Option<Vec<u32>>,
    gpu: Option<GpuGeometry>,
    dirty: bool,
}

impl std::fmt::Debug for Geometry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Geometry")
            .field("uuid", &self.uuid)
            .field("attributes", &self.attributes.keys().collect::<Vec<_>>())
            .field("index_count", &self.indices.as_ref().map(Vec::len))
            .field("uploaded", &self.gpu.is_some())
            .finish()
    }
}

impl Default for Geometry {
    fn default() -> Self {
        Self::new()
    }
}

impl Geometry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            uuid: Uuid::new_v4(),
            attributes: FxHashMap::default(),
            indices: None,
            gpu: None,
            dirty: true,
        }
    }

    pub fn set_attribute(&mut self, semantic: VertexAttribute, attr: Attribute) {
        self.attributes.insert(semantic, attr);
        self.dirty = true;
    }

    pub fn remove_attribute(&mut self, semantic: VertexAttribute) -> Option<Attribute> {
        self.dirty = true;
        self.attributes.remove(&semantic)
    }

    #[must_use]
    pub fn get_attribute(&self, semantic: VertexAttribute) -> Option<&Attribute> {
        self.attributes.get(&semantic)
    }

    #[must_use]
    pub fn has_attribute(&self, semantic: VertexAttribute) -> bool {
        self.attributes.contains_key(&semantic)
    }

    pub fn set_indices(&mut self, indices: &[u32]) {
        self.indices = Some(indices.to_vec());
        self.dirty = true;
    }

    #[must_use]
    pub fn indices(&self) -> Option<&[u32]> {
        self.indices.as_deref()
    }

    #[must_use]
    pub fn vertex_count(&self) -> u32 {
        self.attributes
            .get(&VertexAttribute::Position)
            .map_or(0, |a| a.count)
    }

    /// Number of indices drawn. Non-indexed geometry draws every vertex.
    #[must_use]
    pub fn draw_count(&self) -> u32 {
        self.indices
            .as_ref()
            .map_or_else(|| self.vertex_count(), |i| i.len() as u32)
    }

    #[must_use]
    pub fn compute_bounding_box(&self) -> Option<BoundingBox> {
        let positions = self.attributes.get(&VertexAttribute::Position)?;
        let mut min = Vec3::splat(f32::MAX);
        let mut max = Vec3::splat(f32::MIN);
        let mut any = false;
        for i in 0..positions.count {
            if let Some(p) = positions.read_vec3(i) {
                min = min.min(p);
                max = max.max(p);
                any = true;
            }
        }
        any.then_some(BoundingBox { min, max })
    }

    // ========================================================================
    // Backend buffers
    // ========================================================================

    #[must_use]
    pub fn is_uploaded(&self) -> bool {
        self.gpu.is_some() && !self.dirty
    }

    /// Creates (or recreates, after edits) the backend buffers.
    pub fn upload(&mut self, backend: &BackendRef) -> Result<()> {
        if self.is_uploaded() {
            return Ok(());
        }
        if !self.attributes.contains_key(&VertexAttribute::Position) {
            return Err(RenderError::Unsupported(
                "geometry has no position attribute".into(),
            ));
        }
        self.release();

        let mut semantics: Vec<VertexAttribute> = self.attributes.keys().copied().collect();
        semantics.sort();
        let mut attributes = Vec::with_capacity(semantics.len());
        for semantic in semantics {
            if let Some(attr) = self.attributes.get(&semantic) {
                let buffer =
                    AttributeBuffer::new(backend, attr.bytes(), attr.layout, BufferUsage::Static)?;
                attributes.push((semantic, buffer));
            }
        }

        let index = match &self.indices {
            Some(indices) => IndexBuffer::new(backend, indices)?,
            None => {
                let sequential: Vec<u32> = (0..self.vertex_count()).collect();
                IndexBuffer::new(backend, &sequential)?
            }
        };

        self.gpu = Some(GpuGeometry { attributes, index });
        self.dirty = false;
        Ok(())
    }

    /// Drops the backend buffers. CPU data is kept.
    pub fn release(&mut self) {
        self.gpu = None;
    }

    /// Binds every uploaded stream whose semantic `locate` resolves.
    pub fn bind(&self, mut locate: impl FnMut(VertexAttribute) -> Option<Location>) -> Result<()> {
        let gpu = self.gpu.as_ref().ok_or_else(|| {
            RenderError::NotReady(format!("geometry {} is not uploaded", self.uuid))
        })?;
        for (semantic, buffer) in &gpu.attributes {
            if let Some(location) = locate(*semantic) {
                buffer.bind(location)?;
            }
        }
        Ok(())
    }

    /// Issues the indexed draw. Returns whether anything was drawn.
    pub fn draw(&self) -> Result<bool> {
        let gpu = self.gpu.as_ref().ok_or_else(|| {
            RenderError::NotReady(format!("geometry {} is not uploaded", self.uuid))
        })?;
        Ok(gpu.index.draw())
    }

    // ========================================================================
    // Primitives
    // ========================================================================

    /// Axis-aligned plane in XY facing +Z, centered at the origin.
    #[must_use]
    pub fn new_plane(width: f32, height: f32) -> Self {
        let (hw, hh) = (width * 0.5, height * 0.5);
        let positions = [[-hw, -hh, 0.0], [hw, -hh, 0.0], [hw, hh, 0.0], [-hw, hh, 0.0]];
        let normals = [[0.0f32, 0.0, 1.0]; 4];
        let uvs = [[0.0f32, 1.0], [1.0, 1.0], [1.0, 0.0], [0.0, 0.0]];

        let mut geometry = Self::new();
        geometry.set_attribute(
            VertexAttribute::Position,
            Attribute::new(&positions, VertexAttribute::Position.default_layout()),
        );
        geometry.set_attribute(
            VertexAttribute::Normal,
            Attribute::new(&normals, VertexAttribute::Normal.default_layout()),
        );
        geometry.set_attribute(
            VertexAttribute::UV0,
            Attribute::new(&uvs, VertexAttribute::UV0.default_layout()),
        );
        geometry.set_indices(&[0, 1, 2, 0, 2, 3]);
        geometry
    }

    /// Box centered at the origin, four vertices per face.
    #[must_use]
    pub fn new_box(width: f32, height: f32, depth: f32) -> Self {
        let half = Vec3::new(width, height, depth) * 0.5;
        // (normal, u axis, v axis) per face
        let faces = [
            (Vec3::X, Vec3::NEG_Z, Vec3::Y),
            (Vec3::NEG_X, Vec3::Z, Vec3::Y),
            (Vec3::Y, Vec3::X, Vec3::NEG_Z),
            (Vec3::NEG_Y, Vec3::X, Vec3::Z),
            (Vec3::Z, Vec3::X, Vec3::Y),
            (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
        ];

        let mut positions = Vec::with_capacity(24);
        let mut normals = Vec::with_capacity(24);
        let mut uvs = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);
        for (face, (n, u, v)) in faces.iter().enumerate() {
            let base = (face * 4) as u32;
            for (su, sv) in [(-1.0f32, -1.0f32), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
                let p = (*n + *u * su + *v * sv) * half;
                positions.push(p.to_array());
                normals.push(n.to_array());
                uvs.push([(su + 1.0) * 0.5, 1.0 - (sv + 1.0) * 0.5]);
            }
            indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }

        let mut geometry = Self::new();
        geometry.set_attribute(
            VertexAttribute::Position,
            Attribute::new(&positions, VertexAttribute::Position.default_layout()),
        );
        geometry.set_attribute(
            VertexAttribute::Normal,
            Attribute::new(&normals, VertexAttribute::Normal.default_layout()),
        );
        geometry.set_attribute(
            VertexAttribute::UV0,
            Attribute::new(&uvs, VertexAttribute::UV0.default_layout()),
        );
        geometry.set_indices(&indices);
        geometry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn box_bounds() {
        let geometry = Geometry::new_box(2.0, 4.0, 6.0);
        assert_eq!(geometry.vertex_count(), 24);
        assert_eq!(geometry.draw_count(), 36);
        let bbox = geometry.compute_bounding_box().unwrap();
        assert!((bbox.min - Vec3::new(-1.0, -2.0, -3.0)).length() < 1e-5);
        assert!((bbox.max - Vec3::new(1.0, 2.0, 3.0)).length() < 1e-5);
    }

    #[test]
    fn read_vec3_out_of_range() {
        let attr = Attribute::new(&[[1.0f32, 2.0, 3.0]], AttributeLayout::float(3));
        assert_eq!(attr.read_vec3(0), Some(Vec3::new(1.0, 2.0, 3.0)));
        assert_eq!(attr.read_vec3(1), None);
    }
}
