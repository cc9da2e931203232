//! Directional Light Cascades
//!
//! Cascade split computation and per-cascade orthographic projections.
//!
//! # Split scheme
//!
//! Starting at the camera near plane with a fraction of `1 / cascade_count`,
//! each boundary advances by `fraction * (far - near)` and the fraction grows
//! by [`CASCADE_FRACTION_STEP`] per step. Splitting stops once a boundary
//! reaches the far plane, so a light may end up with fewer cascades than it
//! asked for (four requested cascades produce three). The last boundary is
//! exactly `far`. The result is back-loaded: later
//! cascades cover more depth. It is neither a uniform nor a logarithmic
//! scheme; the step is a tuning constant kept for visual compatibility.

use glam::{Mat4, Vec3};

use crate::backend::BackendRef;
use crate::errors::{RenderError, Result};
use crate::light::shadow::{ShadowMapLayout, ShadowSoftness, ShadowState};
use crate::resources::RenderTargetKind;
use crate::scene::Camera;
use crate::settings::MAX_DIRECTIONAL_CASCADES;

/// Growth of the split fraction per cascade.
pub const CASCADE_FRACTION_STEP: f32 = 0.1;

// ============================================================================
// Pure cascade math
// ============================================================================

/// Cascade boundaries for a camera depth range: at most `cascade_count + 1`
/// values, increasing, first `near`, last exactly `far`.
#[must_use]
pub fn compute_cascade_boundaries(cascade_count: u32, near: f32, far: f32) -> Vec<f32> {
    let count = cascade_count.max(1) as usize;
    let frustum_length = far - near;

    let mut boundaries = Vec::with_capacity(count + 1);
    boundaries.push(near);

    let mut current_boundary = near;
    let mut current_fraction = 1.0 / count as f32;
    while current_boundary < far && boundaries.len() <= count {
        current_boundary = (current_boundary + current_fraction * frustum_length).min(far);
        current_fraction += CASCADE_FRACTION_STEP;
        boundaries.push(current_boundary);
    }

    if boundaries.len() == 1 {
        boundaries.push(far);
    }
    if let Some(last) = boundaries.last_mut() {
        *last = far;
    }
    boundaries
}

/// Number of cascades the split scheme produces for `cascade_count`
/// requested ones. The fractions do not depend on the depth range.
#[must_use]
pub fn produced_cascade_count(cascade_count: u32) -> u32 {
    (compute_cascade_boundaries(cascade_count, 0.0, 1.0).len() - 1) as u32
}

/// Axis-aligned bounds of view-space `corners` after moving them into the
/// light's local space (camera world, then inverse light world).
#[must_use]
pub fn light_space_bounds(
    corners_view: &[Vec3; 8],
    camera_world: &Mat4,
    light_world_inverse: &Mat4,
) -> (Vec3, Vec3) {
    let to_light = *light_world_inverse * *camera_world;
    let mut min = Vec3::splat(f32::MAX);
    let mut max = Vec3::splat(f32::MIN);
    for corner in corners_view {
        let p = to_light.transform_point3(*corner);
        min = min.min(p);
        max = max.max(p);
    }
    (min, max)
}

/// Extents of an orthographic shadow projection, in light space.
///
/// `near`/`far` are distances along the light's -Z axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrthoBounds {
    pub left: f32,
    pub right: f32,
    pub bottom: f32,
    pub top: f32,
    pub near: f32,
    pub far: f32,
}

impl OrthoBounds {
    /// Box `min..max` in light-local space. The light looks down -Z, so the
    /// largest z is the nearest plane.
    #[must_use]
    pub fn from_light_space_box(min: Vec3, max: Vec3) -> Self {
        Self {
            left: min.x,
            right: max.x,
            bottom: min.y,
            top: max.y,
            near: -max.z,
            far: -min.z,
        }
    }

    #[must_use]
    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::orthographic_rh_gl(
            self.left,
            self.right,
            self.bottom,
            self.top,
            self.near,
            self.far,
        )
    }

    /// True when any extent is empty, e.g. a zero-depth trailing cascade.
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        const EPS: f32 = 1e-6;
        self.right - self.left <= EPS || self.top - self.bottom <= EPS || self.far - self.near <= EPS
    }
}

/// One depth slice of the camera frustum and its shadow projection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cascade {
    /// View depth where the slice starts.
    pub split_near: f32,
    /// View depth where the slice ends.
    pub split_far: f32,
    pub bounds: OrthoBounds,
    pub projection: Mat4,
    /// `projection * inverse(light_world)`
    pub view_projection: Mat4,
}

// ============================================================================
// DirectionalLight
// ============================================================================

#[derive(Debug)]
pub struct DirectionalLight {
    cascade_count: u32,
    boundaries: Vec<f32>,
    cascades: Vec<Cascade>,
    pub shadow: ShadowState,
}

impl DirectionalLight {
    /// `cascade_count` must be in `1..=MAX_DIRECTIONAL_CASCADES`.
    pub fn new(
        cascade_count: u32,
        map_size: u32,
        bias: f32,
        softness: ShadowSoftness,
    ) -> Result<Self> {
        check_cascade_count(cascade_count)?;
        Ok(Self {
            cascade_count,
            boundaries: Vec::new(),
            cascades: Vec::new(),
            shadow: ShadowState::new(
                ShadowMapLayout {
                    kind: RenderTargetKind::TwoD,
                    count: produced_cascade_count(cascade_count) as usize,
                    size: map_size,
                },
                bias,
                softness,
            ),
        })
    }

    /// Requested cascade count.
    #[must_use]
    pub fn cascade_count(&self) -> u32 {
        self.cascade_count
    }

    /// Cascades (and shadow maps) actually used.
    #[must_use]
    pub fn active_cascade_count(&self) -> u32 {
        produced_cascade_count(self.cascade_count)
    }

    /// Changes the cascade count. Shadow maps are rebuilt on next use.
    pub fn set_cascade_count(&mut self, cascade_count: u32) -> Result<()> {
        check_cascade_count(cascade_count)?;
        if cascade_count != self.cascade_count {
            self.cascade_count = cascade_count;
            self.boundaries.clear();
            self.cascades.clear();
            self.shadow
                .set_map_count(produced_cascade_count(cascade_count) as usize);
        }
        Ok(())
    }

    /// Boundaries from the last [`Self::update_cascades`]:
    /// `active_cascade_count() + 1` view depths.
    #[must_use]
    pub fn boundaries(&self) -> &[f32] {
        &self.boundaries
    }

    #[must_use]
    pub fn cascades(&self) -> &[Cascade] {
        &self.cascades
    }

    pub fn cascade(&self, index: usize) -> Result<&Cascade> {
        self.cascades.get(index).ok_or(RenderError::OutOfRange {
            context: "directional light cascade",
            index,
            len: self.cascades.len(),
        })
    }

    /// Light direction in world space (the owner's -Z axis).
    #[must_use]
    pub fn direction(light_world: &Mat4) -> Vec3 {
        light_world
            .transform_vector3(Vec3::NEG_Z)
            .try_normalize()
            .unwrap_or(Vec3::NEG_Z)
    }

    /// Recomputes the boundaries and every cascade projection for `camera`.
    ///
    /// Only perspective cameras are supported.
    pub fn update_cascades(
        &mut self,
        camera: &Camera,
        camera_world: &Mat4,
        light_world: &Mat4,
    ) -> Result<()> {
        if !camera.is_perspective() {
            return Err(RenderError::Unsupported(
                "cascaded shadows need a perspective camera".into(),
            ));
        }
        let det = light_world.determinant();
        if !det.is_finite() || det.abs() <= 1e-12 {
            return Err(RenderError::Unsupported(
                "directional light has a singular world transform".into(),
            ));
        }
        let light_inverse = light_world.inverse();

        let boundaries = compute_cascade_boundaries(self.cascade_count, camera.near(), camera.far());
        let mut cascades = Vec::with_capacity(self.cascade_count as usize);
        for window in boundaries.windows(2) {
            let (split_near, split_far) = (window[0], window[1]);
            let corners = camera.frustum_corners_view(split_near, split_far)?;
            let (min, max) = light_space_bounds(&corners, camera_world, &light_inverse);
            let bounds = OrthoBounds::from_light_space_box(min, max);
            if bounds.is_degenerate() {
                log::warn!("skipping empty cascade [{split_near}, {split_far}]");
                continue;
            }
            let projection = bounds.projection_matrix();
            cascades.push(Cascade {
                split_near,
                split_far,
                bounds,
                projection,
                view_projection: projection * light_inverse,
            });
        }

        self.boundaries = boundaries;
        self.cascades = cascades;
        Ok(())
    }

    /// Builds missing cascade maps when shadows are enabled.
    pub fn prepare_shadow_maps(&mut self, backend: &BackendRef, label: &str) -> Result<()> {
        if self.shadow.is_enabled() {
            self.shadow.ensure_maps(backend, label)?;
        }
        Ok(())
    }
}

fn check_cascade_count(cascade_count: u32) -> Result<()> {
    if cascade_count == 0 || cascade_count > MAX_DIRECTIONAL_CASCADES {
        return Err(RenderError::OutOfRange {
            context: "directional cascade count",
            index: cascade_count as usize,
            len: MAX_DIRECTIONAL_CASCADES as usize + 1,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundaries_for_three_cascades() {
        let b = compute_cascade_boundaries(3, 0.1, 100.0);
        assert_eq!(b.len(), 4);
        assert!((b[0] - 0.1).abs() < 1e-6);
        assert!((b[1] - 33.4).abs() < 1e-3);
        assert!((b[2] - 76.69).abs() < 1e-2);
        assert_eq!(b[3], 100.0);
    }

    #[test]
    fn boundaries_stop_at_far() {
        let b = compute_cascade_boundaries(4, 1.0, 11.0);
        assert_eq!(b.len(), 4);
        assert!(b.windows(2).all(|w| w[0] < w[1]));
        assert!(b.iter().all(|&v| v <= 11.0));
        assert_eq!(*b.last().unwrap(), 11.0);
    }

    #[test]
    fn produced_counts() {
        assert_eq!(produced_cascade_count(1), 1);
        assert_eq!(produced_cascade_count(2), 2);
        assert_eq!(produced_cascade_count(3), 3);
        assert_eq!(produced_cascade_count(4), 3);
    }

    #[test]
    fn single_cascade_covers_range() {
        assert_eq!(compute_cascade_boundaries(1, 0.5, 50.0), vec![0.5, 50.0]);
    }

    #[test]
    fn ortho_bounds_flip_z() {
        let bounds = OrthoBounds::from_light_space_box(
            Vec3::new(-1.0, -2.0, -30.0),
            Vec3::new(1.0, 2.0, -5.0),
        );
        assert_eq!(bounds.near, 5.0);
        assert_eq!(bounds.far, 30.0);
        assert!(!bounds.is_degenerate());
    }

    #[test]
    fn cascade_count_bound() {
        assert!(DirectionalLight::new(0, 256, 0.0, ShadowSoftness::Hard).is_err());
        assert!(
            DirectionalLight::new(MAX_DIRECTIONAL_CASCADES + 1, 256, 0.0, ShadowSoftness::Hard)
                .is_err()
        );
        let mut light = DirectionalLight::new(2, 256, 0.0, ShadowSoftness::Hard).unwrap();
        assert!(matches!(
            light.set_cascade_count(9),
            Err(RenderError::OutOfRange { index: 9, .. })
        ));
        assert_eq!(light.cascade_count(), 2);
    }
}
