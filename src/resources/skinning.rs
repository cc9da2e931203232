//! Vertex-to-bone mapping.
//!
//! Each vertex keeps at most [`MAX_BONE_INFLUENCES`] `(bone, weight)` pairs.
//! When a fifth influence arrives the weakest one is dropped, so the map always
//! holds the strongest four. Skinning math itself is done in shaders.

use crate::errors::{RenderError, Result};
use crate::resources::geometry::{Attribute, Geometry, VertexAttribute};

pub const MAX_BONE_INFLUENCES: usize = 4;

/// Bone influences of one vertex.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VertexBoneInfluences {
    bones: [u32; MAX_BONE_INFLUENCES],
    weights: [f32; MAX_BONE_INFLUENCES],
    count: usize,
}

impl VertexBoneInfluences {
    /// Adds an influence. Returns `false` if it was discarded because the
    /// vertex already holds four stronger ones.
    pub fn add(&mut self, bone: u32, weight: f32) -> bool {
        if self.count < MAX_BONE_INFLUENCES {
            self.bones[self.count] = bone;
            self.weights[self.count] = weight;
            self.count += 1;
            return true;
        }

        let (weakest, weakest_weight) = self
            .weights
            .iter()
            .copied()
            .enumerate()
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .unwrap_or((0, f32::MAX));
        if weight > weakest_weight {
            self.bones[weakest] = bone;
            self.weights[weakest] = weight;
            true
        } else {
            false
        }
    }

    /// Scales weights to sum to one. A vertex with no weight is left as is.
    pub fn normalize(&mut self) {
        let sum: f32 = self.weights[..self.count].iter().sum();
        if sum > f32::EPSILON {
            for w in &mut self.weights[..self.count] {
                *w /= sum;
            }
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.count
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, f32)> + '_ {
        self.bones[..self.count]
            .iter()
            .copied()
            .zip(self.weights[..self.count].iter().copied())
    }

    /// Padded arrays as uploaded to the `aBoneIndices` / `aBoneWeights` streams.
    #[must_use]
    pub fn padded(&self) -> ([u32; MAX_BONE_INFLUENCES], [f32; MAX_BONE_INFLUENCES]) {
        (self.bones, self.weights)
    }
}

/// Influences for every vertex of one mesh.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VertexBoneMap {
    vertices: Vec<VertexBoneInfluences>,
}

impl VertexBoneMap {
    #[must_use]
    pub fn new(vertex_count: usize) -> Self {
        Self {
            vertices: vec![VertexBoneInfluences::default(); vertex_count],
        }
    }

    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn add_influence(&mut self, vertex: usize, bone: u32, weight: f32) -> Result<bool> {
        let len = self.vertices.len();
        let influences = self.vertices.get_mut(vertex).ok_or(RenderError::OutOfRange {
            context: "vertex bone map",
            index: vertex,
            len,
        })?;
        Ok(influences.add(bone, weight))
    }

    pub fn get(&self, vertex: usize) -> Result<&VertexBoneInfluences> {
        self.vertices.get(vertex).ok_or(RenderError::OutOfRange {
            context: "vertex bone map",
            index: vertex,
            len: self.vertices.len(),
        })
    }

    pub fn normalize(&mut self) {
        for v in &mut self.vertices {
            v.normalize();
        }
    }

    /// Normalizes and writes the bone streams into `geometry`.
    pub fn apply_to(&mut self, geometry: &mut Geometry) -> Result<()> {
        let vertex_count = geometry.vertex_count() as usize;
        if vertex_count != self.vertices.len() {
            return Err(RenderError::Incompatible(format!(
                "bone map covers {} vertices, geometry has {vertex_count}",
                self.vertices.len()
            )));
        }
        self.normalize();
        let (bones, weights): (Vec<_>, Vec<_>) = self.vertices.iter().map(VertexBoneInfluences::padded).unzip();
        geometry.set_attribute(
            VertexAttribute::BoneIndices,
            Attribute::new(&bones, VertexAttribute::BoneIndices.default_layout()),
        );
        geometry.set_attribute(
            VertexAttribute::BoneWeights,
            Attribute::new(&weights, VertexAttribute::BoneWeights.default_layout()),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifth_influence_replaces_weakest() {
        let mut v = VertexBoneInfluences::default();
        for (bone, w) in [(0, 0.4), (1, 0.1), (2, 0.3), (3, 0.2)] {
            assert!(v.add(bone, w));
        }
        assert!(v.add(7, 0.25));
        let bones: Vec<u32> = v.iter().map(|(b, _)| b).collect();
        assert!(!bones.contains(&1));
        assert!(bones.contains(&7));
        assert!(!v.add(8, 0.05));
    }

    #[test]
    fn normalize_sums_to_one() {
        let mut v = VertexBoneInfluences::default();
        v.add(0, 2.0);
        v.add(1, 6.0);
        v.normalize();
        let sum: f32 = v.iter().map(|(_, w)| w).sum();
        assert!((sum - 1.0).abs() < 1e-6);
        assert!((v.iter().next().unwrap().1 - 0.25).abs() < 1e-6);
    }

    #[test]
    fn out_of_range_vertex() {
        let mut map = VertexBoneMap::new(2);
        assert!(matches!(
            map.add_influence(2, 0, 1.0),
            Err(RenderError::OutOfRange { index: 2, len: 2, .. })
        ));
    }
}
