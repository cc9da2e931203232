//! Node components.
//!
//! Component data lives in the [`Scene`](super::Scene) tables; nodes only hold
//! [`Component`] keys into them.

use bitflags::bitflags;

use super::{CameraKey, GeometryKey, LightKey, MaterialKey, OverrideKey, RenderableKey};

bitflags! {
    /// Layer bits. A light affects a renderable when their masks intersect.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
    pub struct CullingMask: u32 {
        const DEFAULT = 1 << 0;
        const ALL = u32::MAX;
    }
}

impl Default for CullingMask {
    fn default() -> Self {
        Self::ALL
    }
}

/// A key into one of the scene's component tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Component {
    Light(LightKey),
    Renderable(RenderableKey),
    Camera(CameraKey),
    Override(OverrideKey),
}

/// A drawable: geometry plus material.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Renderable {
    pub geometry: GeometryKey,
    pub material: MaterialKey,
    pub visible: bool,
    pub cast_shadows: bool,
    pub receive_shadows: bool,
    pub layers: CullingMask,
}

impl Renderable {
    #[must_use]
    pub fn new(geometry: GeometryKey, material: MaterialKey) -> Self {
        Self {
            geometry,
            material,
            visible: true,
            cast_shadows: true,
            receive_shadows: true,
            layers: CullingMask::DEFAULT,
        }
    }
}

/// Changes how the subtree below its node is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RendererOverride {
    /// Material used instead of each renderable's own.
    pub material: Option<MaterialKey>,
    /// Skip every renderable in the subtree.
    pub suppress: bool,
}

impl RendererOverride {
    #[must_use]
    pub fn with_material(material: MaterialKey) -> Self {
        Self {
            material: Some(material),
            suppress: false,
        }
    }

    #[must_use]
    pub fn suppressed() -> Self {
        Self {
            material: None,
            suppress: true,
        }
    }
}
