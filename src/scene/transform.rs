use glam::{Mat4, Quat, Vec3};

use crate::errors::{RenderError, Result};

/// Determinant magnitude below which a matrix is treated as singular.
const SINGULAR_EPSILON: f32 = 1e-12;

/// A single 4x4 affine matrix (column-major, column vectors).
///
/// Composition follows the usual `parent * child` order: `transform_by(m)`
/// applies `m` in local space (`self * m`) and `pre_transform_by(m)` applies
/// it in the parent space (`m * self`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub matrix: Mat4,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl From<Mat4> for Transform {
    fn from(matrix: Mat4) -> Self {
        Self { matrix }
    }
}

impl Transform {
    pub const IDENTITY: Self = Self {
        matrix: Mat4::IDENTITY,
    };

    #[must_use]
    pub fn new() -> Self {
        Self::IDENTITY
    }

    #[must_use]
    pub fn from_translation(translation: Vec3) -> Self {
        Self::from(Mat4::from_translation(translation))
    }

    #[must_use]
    pub fn from_trs(translation: Vec3, rotation: Quat, scale: Vec3) -> Self {
        Self::from(Mat4::from_scale_rotation_translation(scale, rotation, translation))
    }

    /// `self = self * other`
    pub fn transform_by(&mut self, other: &Transform) {
        self.matrix *= other.matrix;
    }

    /// `self = other * self`
    pub fn pre_transform_by(&mut self, other: &Transform) {
        self.matrix = other.matrix * self.matrix;
    }

    /// Overwrites this transform with `other`.
    pub fn copy(&mut self, other: &Transform) {
        self.matrix = other.matrix;
    }

    #[must_use]
    pub fn is_invertible(&self) -> bool {
        let det = self.matrix.determinant();
        det.is_finite() && det.abs() > SINGULAR_EPSILON
    }

    /// Inverse matrix. Singular matrices are rejected rather than producing
    /// infinities.
    pub fn inverse(&self) -> Result<Transform> {
        if self.is_invertible() {
            Ok(Self::from(self.matrix.inverse()))
        } else {
            Err(RenderError::Unsupported(
                "cannot invert a singular transform".into(),
            ))
        }
    }

    /// Inverts in place.
    pub fn invert(&mut self) -> Result<()> {
        *self = self.inverse()?;
        Ok(())
    }

    #[must_use]
    pub fn position(&self) -> Vec3 {
        self.matrix.w_axis.truncate()
    }

    #[must_use]
    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        self.matrix.transform_point3(point)
    }

    #[must_use]
    pub fn transform_vector(&self, vector: Vec3) -> Vec3 {
        self.matrix.transform_vector3(vector)
    }

    /// Rotates and positions this transform so that its -Z axis points at
    /// `target`.
    #[must_use]
    pub fn looking_at(eye: Vec3, target: Vec3, up: Vec3) -> Self {
        Self::from(Mat4::look_at_rh(eye, target, up).inverse())
    }

    /// Approximate equality, for tests and change detection.
    #[must_use]
    pub fn abs_diff_eq(&self, other: &Transform, max_abs_diff: f32) -> bool {
        self.matrix.abs_diff_eq(other.matrix, max_abs_diff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compose_order() {
        let t = Transform::from_translation(Vec3::X);
        let s = Transform::from(Mat4::from_scale(Vec3::splat(2.0)));

        let mut a = t;
        a.transform_by(&s);
        // scale first, then translate
        assert!(a.transform_point(Vec3::X).abs_diff_eq(Vec3::new(3.0, 0.0, 0.0), 1e-6));

        let mut b = t;
        b.pre_transform_by(&s);
        // translate first, then scale
        assert!(b.transform_point(Vec3::X).abs_diff_eq(Vec3::new(4.0, 0.0, 0.0), 1e-6));
    }

    #[test]
    fn singular_inverse_is_error() {
        let t = Transform::from(Mat4::from_scale(Vec3::new(1.0, 0.0, 1.0)));
        assert!(matches!(t.inverse(), Err(RenderError::Unsupported(_))));
    }

    #[test]
    fn looking_at_forward() {
        let t = Transform::looking_at(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y);
        let forward = t.transform_vector(Vec3::NEG_Z).normalize();
        assert!(forward.abs_diff_eq(Vec3::NEG_Z, 1e-6));
        assert!(t.position().abs_diff_eq(Vec3::new(0.0, 0.0, 5.0), 1e-6));
    }
}
