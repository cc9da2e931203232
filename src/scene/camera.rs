use glam::{Mat4, Vec3};

use crate::errors::{RenderError, Result};

/// Camera projection parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    /// `fov_y` is the full vertical field of view, in radians.
    Perspective {
        fov_y: f32,
        aspect: f32,
        near: f32,
        far: f32,
    },
    Orthographic {
        left: f32,
        right: f32,
        bottom: f32,
        top: f32,
        near: f32,
        far: f32,
    },
}

/// Camera component. Its view matrix is the inverse of the owning node's
/// world transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub projection: Projection,
}

impl Camera {
    /// `fov_y_degrees` is the vertical field of view in degrees.
    #[must_use]
    pub fn new_perspective(fov_y_degrees: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            projection: Projection::Perspective {
                fov_y: fov_y_degrees.to_radians(),
                aspect,
                near,
                far,
            },
        }
    }

    /// Symmetric orthographic camera showing `half_height` above and below
    /// the view axis.
    #[must_use]
    pub fn new_orthographic(half_height: f32, aspect: f32, near: f32, far: f32) -> Self {
        let half_width = half_height * aspect;
        Self {
            projection: Projection::Orthographic {
                left: -half_width,
                right: half_width,
                bottom: -half_height,
                top: half_height,
                near,
                far,
            },
        }
    }

    #[must_use]
    pub fn near(&self) -> f32 {
        match self.projection {
            Projection::Perspective { near, .. } | Projection::Orthographic { near, .. } => near,
        }
    }

    #[must_use]
    pub fn far(&self) -> f32 {
        match self.projection {
            Projection::Perspective { far, .. } | Projection::Orthographic { far, .. } => far,
        }
    }

    #[must_use]
    pub fn is_perspective(&self) -> bool {
        matches!(self.projection, Projection::Perspective { .. })
    }

    /// Updates the aspect ratio, e.g. after a resize.
    pub fn set_aspect(&mut self, new_aspect: f32) {
        match &mut self.projection {
            Projection::Perspective { aspect, .. } => *aspect = new_aspect,
            Projection::Orthographic {
                left,
                right,
                bottom,
                top,
                ..
            } => {
                let half_height = (*top - *bottom) * 0.5;
                let center = (*left + *right) * 0.5;
                *left = center - half_height * new_aspect;
                *right = center + half_height * new_aspect;
            }
        }
    }

    /// OpenGL-style clip space (depth in -1..1).
    #[must_use]
    pub fn projection_matrix(&self) -> Mat4 {
        match self.projection {
            Projection::Perspective {
                fov_y,
                aspect,
                near,
                far,
            } => Mat4::perspective_rh_gl(fov_y, aspect, near, far),
            Projection::Orthographic {
                left,
                right,
                bottom,
                top,
                near,
                far,
            } => Mat4::orthographic_rh_gl(left, right, bottom, top, near, far),
        }
    }

    /// View matrix for a camera placed at `world`.
    #[must_use]
    pub fn view_matrix(world: &Mat4) -> Mat4 {
        world.inverse()
    }

    /// The 8 view-space corners of the frustum slice between depths
    /// `slice_near` and `slice_far` (positive distances along -Z).
    ///
    /// Order: near face `(-x,-y) (x,-y) (x,y) (-x,y)`, then the far face in
    /// the same order.
    pub fn frustum_corners_view(&self, slice_near: f32, slice_far: f32) -> Result<[Vec3; 8]> {
        let Projection::Perspective { fov_y, aspect, .. } = self.projection else {
            return Err(RenderError::Unsupported(
                "frustum slices are only defined for perspective cameras".into(),
            ));
        };
        let tan_half_fov = (fov_y * 0.5).tan();
        let h_near = tan_half_fov * slice_near;
        let w_near = h_near * aspect;
        let h_far = tan_half_fov * slice_far;
        let w_far = h_far * aspect;

        Ok([
            Vec3::new(-w_near, -h_near, -slice_near),
            Vec3::new(w_near, -h_near, -slice_near),
            Vec3::new(w_near, h_near, -slice_near),
            Vec3::new(-w_near, h_near, -slice_near),
            Vec3::new(-w_far, -h_far, -slice_far),
            Vec3::new(w_far, -h_far, -slice_far),
            Vec3::new(w_far, h_far, -slice_far),
            Vec3::new(-w_far, h_far, -slice_far),
        ])
    }
}
