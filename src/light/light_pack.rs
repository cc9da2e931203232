//! Light Pack
//!
//! Per-frame collection of the active lights, classified by kind and laid
//! out the way the `Lights` shader chunk expects:
//!
//! - ambient colors are summed into one term
//! - at most one image-based ambient light is used
//! - directional and point lights fill fixed-size arrays; extra lights are
//!   dropped with a warning
//!
//! Shadow maps are referenced weakly; the lights keep owning them.

use std::rc::{Rc, Weak};

use glam::{Mat4, Vec3};
use smallvec::SmallVec;

use crate::backend::UniformValue;
use crate::errors::{RenderError, Result};
use crate::light::directional::DirectionalLight;
use crate::light::shadow::{ShadowSoftness, ShadowState};
use crate::light::{Light, LightKind};
use crate::material::variables as v;
use crate::material::{Material, MaterialFeatures};
use crate::resources::Texture;
use crate::scene::{CullingMask, LightKey};
use crate::settings::{MAX_DIRECTIONAL_CASCADES, RendererSettings};

/// Shadow data of one directional cascade.
#[derive(Debug, Clone)]
pub struct CascadeEntry {
    pub view_projection: Mat4,
    /// View depth where the cascade ends.
    pub split_far: f32,
    pub map: Weak<Texture>,
}

#[derive(Debug, Clone)]
pub struct DirectionalEntry {
    pub key: LightKey,
    pub direction: Vec3,
    pub radiance: Vec3,
    pub culling_mask: CullingMask,
    pub casts_shadow: bool,
    pub bias: f32,
    pub softness: ShadowSoftness,
    pub cascades: SmallVec<[CascadeEntry; MAX_DIRECTIONAL_CASCADES as usize]>,
}

#[derive(Debug, Clone)]
pub struct PointEntry {
    pub key: LightKey,
    pub position: Vec3,
    pub radiance: Vec3,
    pub culling_mask: CullingMask,
    pub casts_shadow: bool,
    pub bias: f32,
    pub softness: ShadowSoftness,
    pub shadow_near: f32,
    pub shadow_far: f32,
    pub map_size: u32,
    pub map: Option<Weak<Texture>>,
}

#[derive(Debug, Clone)]
pub struct IblEntry {
    pub key: LightKey,
    pub intensity: f32,
    pub culling_mask: CullingMask,
    pub irradiance: Weak<Texture>,
    pub specular: Weak<Texture>,
}

#[derive(Debug, Clone)]
pub struct LightPack {
    max_directional: usize,
    max_point: usize,
    max_cascades: usize,
    ambient: Vec<(CullingMask, Vec3)>,
    ibl: Option<IblEntry>,
    directional: Vec<DirectionalEntry>,
    point: Vec<PointEntry>,
    dropped: usize,
}

impl LightPack {
    #[must_use]
    pub fn new(settings: &RendererSettings) -> Self {
        Self {
            max_directional: settings.max_directional_lights as usize,
            max_point: settings.max_point_lights as usize,
            max_cascades: settings.max_directional_cascades as usize,
            ambient: Vec::new(),
            ibl: None,
            directional: Vec::new(),
            point: Vec::new(),
            dropped: 0,
        }
    }

    pub fn clear(&mut self) {
        self.ambient.clear();
        self.ibl = None;
        self.directional.clear();
        self.point.clear();
        self.dropped = 0;
    }

    /// Classifies one light placed at `world`. Returns `false` if it was
    /// inactive or did not fit.
    pub fn push(&mut self, key: LightKey, light: &Light, world: &Mat4) -> bool {
        if !light.active {
            return false;
        }
        match &light.kind {
            LightKind::Ambient => {
                self.ambient.push((light.culling_mask, light.radiance()));
                true
            }
            LightKind::AmbientIbl(ibl) => {
                if self.ibl.is_some() {
                    log::warn!("more than one IBL light; {:?} ignored", light.name);
                    self.dropped += 1;
                    return false;
                }
                self.ibl = Some(IblEntry {
                    key,
                    intensity: light.intensity,
                    culling_mask: light.culling_mask,
                    irradiance: ibl.irradiance.clone(),
                    specular: ibl.specular.clone(),
                });
                true
            }
            LightKind::Directional(directional) => {
                if self.directional.len() >= self.max_directional {
                    log::warn!(
                        "directional light limit ({}) reached; {:?} ignored",
                        self.max_directional,
                        light.name
                    );
                    self.dropped += 1;
                    return false;
                }
                self.directional
                    .push(directional_entry(key, light, directional, world, self.max_cascades));
                true
            }
            LightKind::Point(point) => {
                if self.point.len() >= self.max_point {
                    log::warn!(
                        "point light limit ({}) reached; {:?} ignored",
                        self.max_point,
                        light.name
                    );
                    self.dropped += 1;
                    return false;
                }
                let casts_shadow = point.shadow.is_enabled() && point.shadow.has_maps();
                let map = if casts_shadow {
                    point
                        .shadow
                        .maps()
                        .first()
                        .and_then(|t| t.depth_texture())
                        .map(Rc::downgrade)
                } else {
                    None
                };
                self.point.push(PointEntry {
                    key,
                    position: world.w_axis.truncate(),
                    radiance: light.radiance(),
                    culling_mask: light.culling_mask,
                    casts_shadow: casts_shadow && map.is_some(),
                    bias: point.shadow.bias,
                    softness: point.shadow.softness,
                    shadow_near: point.shadow_near,
                    shadow_far: point.shadow_far(),
                    map_size: point.shadow.layout().size,
                    map,
                });
                true
            }
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Sum of the ambient lights affecting `layers`.
    #[must_use]
    pub fn ambient(&self, layers: CullingMask) -> Vec3 {
        self.ambient
            .iter()
            .filter(|(mask, _)| mask.intersects(layers))
            .map(|(_, color)| *color)
            .sum()
    }

    #[must_use]
    pub fn ibl(&self) -> Option<&IblEntry> {
        self.ibl.as_ref()
    }

    #[must_use]
    pub fn directional_count(&self) -> usize {
        self.directional.len()
    }

    #[must_use]
    pub fn point_count(&self) -> usize {
        self.point.len()
    }

    #[must_use]
    pub fn ambient_count(&self) -> usize {
        self.ambient.len()
    }

    /// Lights rejected for exceeding a limit.
    #[must_use]
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn directional(&self, index: usize) -> Result<&DirectionalEntry> {
        self.directional.get(index).ok_or(RenderError::OutOfRange {
            context: "directional light",
            index,
            len: self.directional.len(),
        })
    }

    pub fn point(&self, index: usize) -> Result<&PointEntry> {
        self.point.get(index).ok_or(RenderError::OutOfRange {
            context: "point light",
            index,
            len: self.point.len(),
        })
    }

    // ========================================================================
    // Upload
    // ========================================================================

    /// Writes the light arrays of a lit material. The material's program
    /// must be current. Lights whose culling mask misses `layers` are left
    /// out; `receive_shadows == false` clears every shadow flag.
    ///
    /// Materials without lighting are skipped.
    pub fn send_to_material(
        &self,
        material: &Material,
        layers: CullingMask,
        receive_shadows: bool,
    ) -> Result<()> {
        if !material.features().contains(MaterialFeatures::USE_LIGHTS) {
            return Ok(());
        }

        material.write_uniform(v::AMBIENT_LIGHT, 0, UniformValue::Vec3(self.ambient(layers)))?;

        let mut slot = 0;
        for entry in self.directional.iter().filter(|e| e.culling_mask.intersects(layers)) {
            let shadowed = receive_shadows && entry.casts_shadow;
            material.write_uniform(v::DIR_LIGHT_DIRECTION, slot, UniformValue::Vec3(entry.direction))?;
            material.write_uniform(v::DIR_LIGHT_COLOR, slot, UniformValue::Vec3(entry.radiance))?;
            material.write_uniform(v::DIR_LIGHT_CASTS_SHADOW, slot, UniformValue::Int(i32::from(shadowed)))?;
            material.write_uniform(
                v::DIR_LIGHT_CASCADE_COUNT,
                slot,
                UniformValue::Int(entry.cascades.len() as i32),
            )?;
            material.write_uniform(v::DIR_LIGHT_SHADOW_BIAS, slot, UniformValue::Float(entry.bias))?;
            material.write_uniform(
                v::DIR_LIGHT_SHADOW_SOFTNESS,
                slot,
                UniformValue::Int(entry.softness.shader_level()),
            )?;
            if shadowed {
                for (c, cascade) in entry.cascades.iter().enumerate() {
                    let index = slot * self.max_cascades + c;
                    material.write_uniform(v::DIR_SHADOW_MATRIX, index, UniformValue::Mat4(cascade.view_projection))?;
                    material.write_uniform(v::DIR_CASCADE_END, index, UniformValue::Float(cascade.split_far))?;
                    let map = upgrade(&cascade.map, "directional shadow map")?;
                    material.bind_texture(v::DIR_SHADOW_MAP, index, &map)?;
                }
            }
            slot += 1;
        }
        material.write_uniform(v::DIR_LIGHT_COUNT, 0, UniformValue::Int(slot as i32))?;

        let mut slot = 0;
        for entry in self.point.iter().filter(|e| e.culling_mask.intersects(layers)) {
            let shadowed = receive_shadows && entry.casts_shadow;
            material.write_uniform(v::POINT_LIGHT_POSITION, slot, UniformValue::Vec3(entry.position))?;
            material.write_uniform(v::POINT_LIGHT_COLOR, slot, UniformValue::Vec3(entry.radiance))?;
            material.write_uniform(v::POINT_LIGHT_CASTS_SHADOW, slot, UniformValue::Int(i32::from(shadowed)))?;
            material.write_uniform(v::POINT_LIGHT_SHADOW_BIAS, slot, UniformValue::Float(entry.bias))?;
            material.write_uniform(
                v::POINT_LIGHT_SHADOW_SOFTNESS,
                slot,
                UniformValue::Int(entry.softness.shader_level()),
            )?;
            material.write_uniform(v::POINT_LIGHT_SHADOW_NEAR, slot, UniformValue::Float(entry.shadow_near))?;
            material.write_uniform(v::POINT_LIGHT_SHADOW_FAR, slot, UniformValue::Float(entry.shadow_far))?;
            material.write_uniform(
                v::POINT_LIGHT_SHADOW_MAP_SIZE,
                slot,
                UniformValue::Float(entry.map_size as f32),
            )?;
            if shadowed && let Some(map) = &entry.map {
                let map = upgrade(map, "point shadow map")?;
                material.bind_texture(v::POINT_SHADOW_MAP, slot, &map)?;
            }
            slot += 1;
        }
        material.write_uniform(v::POINT_LIGHT_COUNT, 0, UniformValue::Int(slot as i32))?;

        match self.ibl.as_ref().filter(|e| e.culling_mask.intersects(layers)) {
            Some(ibl) => {
                let irradiance = upgrade(&ibl.irradiance, "IBL irradiance map")?;
                let specular = upgrade(&ibl.specular, "IBL specular map")?;
                material.write_uniform(v::HAS_IBL, 0, UniformValue::Int(1))?;
                material.write_uniform(v::IBL_INTENSITY, 0, UniformValue::Float(ibl.intensity))?;
                material.bind_texture(v::IRRADIANCE_MAP, 0, &irradiance)?;
                material.bind_texture(v::SPECULAR_MAP, 0, &specular)?;
            }
            None => {
                material.write_uniform(v::HAS_IBL, 0, UniformValue::Int(0))?;
            }
        }
        Ok(())
    }
}

fn directional_entry(
    key: LightKey,
    light: &Light,
    directional: &DirectionalLight,
    world: &Mat4,
    max_cascades: usize,
) -> DirectionalEntry {
    let shadow: &ShadowState = &directional.shadow;
    let mut cascades = SmallVec::new();
    if shadow.is_enabled() && shadow.has_maps() {
        for (cascade, target) in directional
            .cascades()
            .iter()
            .zip(shadow.maps())
            .take(max_cascades)
        {
            if let Some(depth) = target.depth_texture() {
                cascades.push(CascadeEntry {
                    view_projection: cascade.view_projection,
                    split_far: cascade.split_far,
                    map: Rc::downgrade(depth),
                });
            }
        }
    }
    DirectionalEntry {
        key,
        direction: DirectionalLight::direction(world),
        radiance: light.radiance(),
        culling_mask: light.culling_mask,
        casts_shadow: !cascades.is_empty(),
        bias: shadow.bias,
        softness: shadow.softness,
        cascades,
    }
}

fn upgrade(weak: &Weak<Texture>, what: &str) -> Result<Rc<Texture>> {
    weak.upgrade()
        .ok_or_else(|| RenderError::InvalidReference(format!("{what} was released")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    fn keys(n: usize) -> Vec<LightKey> {
        let mut map: SlotMap<LightKey, ()> = SlotMap::with_key();
        (0..n).map(|_| map.insert(())).collect()
    }

    #[test]
    fn ambient_sums_by_mask() {
        let settings = RendererSettings::default();
        let mut pack = LightPack::new(&settings);
        let k = keys(2);
        pack.push(k[0], &Light::new_ambient(Vec3::ONE, 0.25), &Mat4::IDENTITY);
        let masked = Light::new_ambient(Vec3::X, 1.0).with_culling_mask(CullingMask::from_bits_retain(2));
        pack.push(k[1], &masked, &Mat4::IDENTITY);

        assert_eq!(pack.ambient(CullingMask::DEFAULT), Vec3::splat(0.25));
        assert_eq!(pack.ambient(CullingMask::ALL), Vec3::new(1.25, 0.25, 0.25));
    }

    #[test]
    fn point_overflow_is_dropped() {
        let settings = RendererSettings {
            max_point_lights: 2,
            ..RendererSettings::default()
        };
        let mut pack = LightPack::new(&settings);
        for key in keys(3) {
            pack.push(key, &Light::new_point(Vec3::ONE, 1.0, 10.0, &settings), &Mat4::IDENTITY);
        }
        assert_eq!(pack.point_count(), 2);
        assert_eq!(pack.dropped(), 1);
        assert!(matches!(
            pack.point(2),
            Err(RenderError::OutOfRange { index: 2, len: 2, .. })
        ));
    }

    #[test]
    fn inactive_lights_are_skipped() {
        let settings = RendererSettings::default();
        let mut pack = LightPack::new(&settings);
        let mut light = Light::new_ambient(Vec3::ONE, 1.0);
        light.active = false;
        assert!(!pack.push(keys(1)[0], &light, &Mat4::IDENTITY));
        assert_eq!(pack.ambient_count(), 0);
    }
}
