//! Lights
//!
//! A light is one [`Light`] struct with a closed set of kinds:
//!
//! - Ambient: a constant term added to every lit surface
//! - AmbientIbl: image-based ambient from irradiance and specular cube maps
//! - Directional: sun-like light with cascaded shadow maps
//! - Point: omni light with a cube shadow map
//!
//! Shadow-casting kinds embed a [`ShadowState`]; the cascade and cube-face
//! math lives in [`directional`] and [`point`] as free functions.

pub mod directional;
pub mod light_pack;
pub mod point;
pub mod shadow;

pub use directional::{
    CASCADE_FRACTION_STEP, Cascade, DirectionalLight, OrthoBounds, compute_cascade_boundaries,
    produced_cascade_count,
};
pub use light_pack::{DirectionalEntry, IblEntry, LightPack, PointEntry};
pub use point::{PointLight, pcf_kernel, pcf_sample_directions};
pub use shadow::{ShadowMapLayout, ShadowPhase, ShadowSoftness, ShadowState};

use std::rc::{Rc, Weak};

use glam::Vec3;
use uuid::Uuid;

use crate::backend::BackendRef;
use crate::errors::{RenderError, Result};
use crate::resources::Texture;
use crate::scene::{CullingMask, NodeHandle};
use crate::settings::RendererSettings;

/// Cube maps of an image-based ambient light. Held weakly; the textures are
/// owned by whoever loaded them.
#[derive(Debug, Clone)]
pub struct IblLight {
    pub irradiance: Weak<Texture>,
    pub specular: Weak<Texture>,
}

#[derive(Debug)]
pub enum LightKind {
    Ambient,
    AmbientIbl(IblLight),
    Directional(DirectionalLight),
    Point(PointLight),
}

impl LightKind {
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Ambient => "ambient",
            Self::AmbientIbl(_) => "ambient_ibl",
            Self::Directional(_) => "directional",
            Self::Point(_) => "point",
        }
    }
}

#[derive(Debug)]
pub struct Light {
    pub uuid: Uuid,
    pub name: String,
    pub color: Vec3,
    pub intensity: f32,
    /// Layers this light affects.
    pub culling_mask: CullingMask,
    pub active: bool,
    pub kind: LightKind,

    /// Node this light is attached to. Maintained by the scene.
    pub(crate) owner: Option<NodeHandle>,
}

impl Light {
    fn with_kind(name: &str, color: Vec3, intensity: f32, kind: LightKind) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            name: name.to_string(),
            color,
            intensity,
            culling_mask: CullingMask::ALL,
            active: true,
            kind,
            owner: None,
        }
    }

    #[must_use]
    pub fn new_ambient(color: Vec3, intensity: f32) -> Self {
        Self::with_kind("ambient", color, intensity, LightKind::Ambient)
    }

    #[must_use]
    pub fn new_ambient_ibl(irradiance: &Rc<Texture>, specular: &Rc<Texture>, intensity: f32) -> Self {
        Self::with_kind(
            "ambient_ibl",
            Vec3::ONE,
            intensity,
            LightKind::AmbientIbl(IblLight {
                irradiance: Rc::downgrade(irradiance),
                specular: Rc::downgrade(specular),
            }),
        )
    }

    /// Shadow parameters and cascade count come from `settings`.
    pub fn new_directional(color: Vec3, intensity: f32, settings: &RendererSettings) -> Result<Self> {
        let directional = DirectionalLight::new(
            settings.default_cascade_count,
            settings.shadow_map_size,
            settings.default_shadow_bias,
            settings.default_shadow_softness,
        )?;
        Ok(Self::with_kind(
            "directional",
            color,
            intensity,
            LightKind::Directional(directional),
        ))
    }

    #[must_use]
    pub fn new_point(color: Vec3, intensity: f32, range: f32, settings: &RendererSettings) -> Self {
        let point = PointLight::new(
            range,
            settings.point_shadow_map_size,
            settings.default_shadow_bias,
            settings.default_shadow_softness,
        );
        Self::with_kind("point", color, intensity, LightKind::Point(point))
    }

    #[must_use]
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Requests shadows before [`Self::init`]. Ignored by ambient kinds.
    #[must_use]
    pub fn with_shadows(mut self, enabled: bool) -> Self {
        if let Some(shadow) = self.shadow_mut() {
            shadow.request(enabled);
        }
        self
    }

    #[must_use]
    pub fn with_culling_mask(mut self, mask: CullingMask) -> Self {
        self.culling_mask = mask;
        self
    }

    #[must_use]
    pub fn owner(&self) -> Option<NodeHandle> {
        self.owner
    }

    /// `color * intensity`
    #[must_use]
    pub fn radiance(&self) -> Vec3 {
        self.color * self.intensity
    }

    #[must_use]
    pub fn shadow(&self) -> Option<&ShadowState> {
        match &self.kind {
            LightKind::Directional(d) => Some(&d.shadow),
            LightKind::Point(p) => Some(&p.shadow),
            LightKind::Ambient | LightKind::AmbientIbl(_) => None,
        }
    }

    pub fn shadow_mut(&mut self) -> Option<&mut ShadowState> {
        match &mut self.kind {
            LightKind::Directional(d) => Some(&mut d.shadow),
            LightKind::Point(p) => Some(&mut p.shadow),
            LightKind::Ambient | LightKind::AmbientIbl(_) => None,
        }
    }

    #[must_use]
    pub fn casts_shadows(&self) -> bool {
        self.shadow().is_some_and(ShadowState::is_enabled)
    }

    /// Leaves the uninitialized state, building shadow maps if requested.
    /// A no-op for ambient kinds and for already initialized lights.
    pub fn init(&mut self, backend: &BackendRef) -> Result<()> {
        let label = self.name.clone();
        match self.shadow_mut() {
            Some(shadow) => shadow.init(backend, &label),
            None => Ok(()),
        }
    }

    /// Turns shadows on or off. Turning them on builds missing maps.
    pub fn set_shadows_enabled(&mut self, backend: &BackendRef, enabled: bool) -> Result<()> {
        let label = self.name.clone();
        let kind = self.kind.type_name();
        match self.shadow_mut() {
            Some(shadow) => shadow.set_enabled(backend, &label, enabled),
            None => Err(RenderError::Unsupported(format!(
                "{kind} lights do not cast shadows"
            ))),
        }
    }

    /// Builds shadow maps that are enabled but missing (after a cascade count
    /// or size change).
    pub fn prepare_shadow_maps(&mut self, backend: &BackendRef) -> Result<()> {
        let label = self.name.clone();
        match &mut self.kind {
            LightKind::Directional(d) => d.prepare_shadow_maps(backend, &label),
            LightKind::Point(p) => p.prepare_shadow_maps(backend, &label),
            LightKind::Ambient | LightKind::AmbientIbl(_) => Ok(()),
        }
    }

    #[must_use]
    pub fn as_directional(&self) -> Option<&DirectionalLight> {
        match &self.kind {
            LightKind::Directional(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_directional_mut(&mut self) -> Option<&mut DirectionalLight> {
        match &mut self.kind {
            LightKind::Directional(d) => Some(d),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_point(&self) -> Option<&PointLight> {
        match &self.kind {
            LightKind::Point(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_point_mut(&mut self) -> Option<&mut PointLight> {
        match &mut self.kind {
            LightKind::Point(p) => Some(p),
            _ => None,
        }
    }
}
