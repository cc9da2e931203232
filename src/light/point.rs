//! Point Light Cube Shadows
//!
//! Six 90° perspective views, one per cube face, and the CPU mirror of the
//! percentage-closer filtering kernel used by `PointShadowSampling.frag`.

use glam::{Mat4, Vec2, Vec3};
use smallvec::SmallVec;

use crate::backend::{BackendRef, CubeFace};
use crate::errors::Result;
use crate::light::shadow::{ShadowMapLayout, ShadowSoftness, ShadowState};
use crate::resources::RenderTargetKind;

/// Default near plane of point-light shadow projections.
pub const DEFAULT_SHADOW_NEAR: f32 = 0.1;

/// Largest PCF kernel (very soft).
pub const MAX_PCF_SAMPLES: usize = 17;

pub type PcfKernel = SmallVec<[Vec2; MAX_PCF_SAMPLES]>;

#[derive(Debug)]
pub struct PointLight {
    /// Shadow far plane, also the attenuation range.
    pub range: f32,
    pub shadow_near: f32,
    pub shadow: ShadowState,
    face_view_projections: [Mat4; 6],
}

impl PointLight {
    #[must_use]
    pub fn new(range: f32, map_size: u32, bias: f32, softness: ShadowSoftness) -> Self {
        Self {
            range,
            shadow_near: DEFAULT_SHADOW_NEAR,
            shadow: ShadowState::new(
                ShadowMapLayout {
                    kind: RenderTargetKind::Cube,
                    count: 1,
                    size: map_size,
                },
                bias,
                softness,
            ),
            face_view_projections: [Mat4::IDENTITY; 6],
        }
    }

    #[must_use]
    pub fn shadow_far(&self) -> f32 {
        self.range
    }

    #[must_use]
    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh_gl(std::f32::consts::FRAC_PI_2, 1.0, self.shadow_near, self.range)
    }

    /// Recomputes the six face matrices for a light at `position`.
    pub fn update_faces(&mut self, position: Vec3) {
        let projection = self.projection_matrix();
        for face in CubeFace::ALL {
            self.face_view_projections[face.index()] = projection * face_view_matrix(position, face);
        }
    }

    #[must_use]
    pub fn face_view_projection(&self, face: CubeFace) -> Mat4 {
        self.face_view_projections[face.index()]
    }

    /// Builds the cube map when shadows are enabled.
    pub fn prepare_shadow_maps(&mut self, backend: &BackendRef, label: &str) -> Result<()> {
        if self.shadow.is_enabled() {
            self.shadow.ensure_maps(backend, label)?;
        }
        Ok(())
    }
}

/// View matrix of one cube face, looking from `position` along the face axis.
#[must_use]
pub fn face_view_matrix(position: Vec3, face: CubeFace) -> Mat4 {
    let (dir, up) = face.view_basis();
    Mat4::look_at_rh(position, position + dir, up)
}

// ============================================================================
// PCF kernel
// ============================================================================

/// Tangent-plane offsets of the kernel, in texel units.
///
/// Order: the 3x3 grid row by row (`y`, then `x`, both `-1..=1`), then for
/// [`ShadowSoftness::VerySoft`] the eight non-center grid points doubled.
#[must_use]
pub fn pcf_kernel(softness: ShadowSoftness) -> PcfKernel {
    let mut kernel = PcfKernel::new();
    if softness == ShadowSoftness::Hard {
        kernel.push(Vec2::ZERO);
        return kernel;
    }
    for y in -1..=1 {
        for x in -1..=1 {
            kernel.push(Vec2::new(x as f32, y as f32));
        }
    }
    if softness == ShadowSoftness::VerySoft {
        for y in -1..=1 {
            for x in -1..=1 {
                if x != 0 || y != 0 {
                    kernel.push(Vec2::new(x as f32, y as f32) * 2.0);
                }
            }
        }
    }
    kernel
}

/// Orthonormal tangent and bitangent of the plane perpendicular to `dir`.
#[must_use]
pub fn pcf_tangent_basis(dir: Vec3) -> (Vec3, Vec3) {
    let up = if dir.y.abs() < 0.99 { Vec3::Y } else { Vec3::X };
    let tangent = up.cross(dir).normalize();
    let bitangent = dir.cross(tangent);
    (tangent, bitangent)
}

/// Cube lookup vectors for a fragment at `light_to_frag` from the light.
///
/// One texel at the near plane spans `near * 2 / map_size`; offsets grow
/// with distance over near, so the kernel keeps a constant angular size.
#[must_use]
pub fn pcf_sample_directions(
    light_to_frag: Vec3,
    near: f32,
    map_size: u32,
    softness: ShadowSoftness,
) -> SmallVec<[Vec3; MAX_PCF_SAMPLES]> {
    let dist = light_to_frag.length();
    let mut out = SmallVec::new();
    if softness == ShadowSoftness::Hard || dist <= f32::EPSILON {
        out.push(light_to_frag);
        return out;
    }
    let dir = light_to_frag / dist;
    let (tangent, bitangent) = pcf_tangent_basis(dir);
    let texel_at_near = near * 2.0 / map_size as f32;
    let scale = texel_at_near * dist / near;

    for offset in pcf_kernel(softness) {
        out.push(light_to_frag + (tangent * offset.x + bitangent * offset.y) * scale);
    }
    out
}

/// Depth compared against the stored cube depth: `dist / far - bias`.
#[must_use]
pub fn compare_depth(light_to_frag: Vec3, far: f32, bias: f32) -> f32 {
    light_to_frag.length() / far - bias
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_sizes() {
        for softness in [ShadowSoftness::Hard, ShadowSoftness::Soft, ShadowSoftness::VerySoft] {
            assert_eq!(pcf_kernel(softness).len(), softness.sample_count());
        }
    }

    #[test]
    fn very_soft_ring_is_doubled() {
        let kernel = pcf_kernel(ShadowSoftness::VerySoft);
        assert_eq!(kernel[4], Vec2::ZERO);
        assert!(kernel[9..].iter().all(|o| o.abs().max_element() == 2.0));
    }

    #[test]
    fn tangent_basis_is_orthonormal() {
        for dir in [Vec3::X, Vec3::Y, Vec3::new(0.3, -0.8, 0.5).normalize()] {
            let (t, b) = pcf_tangent_basis(dir);
            assert!(t.dot(dir).abs() < 1e-5);
            assert!(b.dot(dir).abs() < 1e-5);
            assert!(t.dot(b).abs() < 1e-5);
            assert!((t.length() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn face_views_look_along_axes() {
        let position = Vec3::new(1.0, 2.0, 3.0);
        for face in CubeFace::ALL {
            let (dir, _) = face.view_basis();
            let view = face_view_matrix(position, face);
            let p = view.transform_point3(position + dir * 5.0);
            assert!(p.abs_diff_eq(Vec3::new(0.0, 0.0, -5.0), 1e-4), "{face:?}");
        }
    }
}
