//! Shader Variables
//!
//! Semantic variables a material resolves once after its program is built,
//! and the immutable location table produced from them.

use rustc_hash::FxHashMap;

use crate::backend::{Location, TextureKind};
use crate::resources::VertexAttribute;
use crate::settings::RendererSettings;
use crate::shader::ShaderProgram;

// ============================================================================
// Well-known names
// ============================================================================

pub const MODEL_MATRIX: &str = "uModelMatrix";
pub const VIEW_MATRIX: &str = "uViewMatrix";
pub const PROJECTION_MATRIX: &str = "uProjectionMatrix";
pub const NORMAL_MATRIX: &str = "uNormalMatrix";
pub const CAMERA_POSITION: &str = "uCameraPosition";

pub const BASE_COLOR: &str = "uBaseColor";
pub const OPACITY: &str = "uOpacity";
pub const ROUGHNESS: &str = "uRoughness";
pub const METALLIC: &str = "uMetallic";
pub const EMISSIVE: &str = "uEmissive";
pub const HAS_BASE_COLOR_MAP: &str = "uHasBaseColorMap";
pub const BASE_COLOR_MAP: &str = "uBaseColorMap";

pub const LIGHT_VIEW_PROJECTION: &str = "uLightViewProjection";
pub const LIGHT_POSITION: &str = "uLightPosition";
pub const SHADOW_FAR: &str = "uShadowFar";

pub const AMBIENT_LIGHT: &str = "uAmbientLight";
pub const DIR_LIGHT_COUNT: &str = "uDirLightCount";
pub const DIR_LIGHT_DIRECTION: &str = "uDirLightDirection";
pub const DIR_LIGHT_COLOR: &str = "uDirLightColor";
pub const DIR_LIGHT_CASTS_SHADOW: &str = "uDirLightCastsShadow";
pub const DIR_LIGHT_CASCADE_COUNT: &str = "uDirLightCascadeCount";
pub const DIR_LIGHT_SHADOW_BIAS: &str = "uDirLightShadowBias";
pub const DIR_LIGHT_SHADOW_SOFTNESS: &str = "uDirLightShadowSoftness";
pub const DIR_SHADOW_MATRIX: &str = "uDirShadowMatrix";
pub const DIR_CASCADE_END: &str = "uDirCascadeEnd";
pub const DIR_SHADOW_MAP: &str = "uDirShadowMap";

pub const POINT_LIGHT_COUNT: &str = "uPointLightCount";
pub const POINT_LIGHT_POSITION: &str = "uPointLightPosition";
pub const POINT_LIGHT_COLOR: &str = "uPointLightColor";
pub const POINT_LIGHT_CASTS_SHADOW: &str = "uPointLightCastsShadow";
pub const POINT_LIGHT_SHADOW_BIAS: &str = "uPointLightShadowBias";
pub const POINT_LIGHT_SHADOW_SOFTNESS: &str = "uPointLightShadowSoftness";
pub const POINT_LIGHT_SHADOW_NEAR: &str = "uPointLightShadowNear";
pub const POINT_LIGHT_SHADOW_FAR: &str = "uPointLightShadowFar";
pub const POINT_LIGHT_SHADOW_MAP_SIZE: &str = "uPointLightShadowMapSize";
pub const POINT_SHADOW_MAP: &str = "uPointShadowMap";

pub const HAS_IBL: &str = "uHasIbl";
pub const IBL_INTENSITY: &str = "uIblIntensity";
pub const IRRADIANCE_MAP: &str = "uIrradianceMap";
pub const SPECULAR_MAP: &str = "uSpecularMap";

// ============================================================================
// Declarations
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableKind {
    Attribute,
    Uniform,
    /// A sampler uniform; each element is given its own texture unit.
    Sampler(TextureKind),
}

/// One variable a material wants resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableDecl {
    pub name: String,
    pub kind: VariableKind,
    /// 1 for scalars, N for `name[N]`.
    pub len: usize,
}

impl VariableDecl {
    #[must_use]
    pub fn attribute(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: VariableKind::Attribute,
            len: 1,
        }
    }

    #[must_use]
    pub fn uniform(name: &str) -> Self {
        Self::uniform_array(name, 1)
    }

    #[must_use]
    pub fn uniform_array(name: &str, len: usize) -> Self {
        Self {
            name: name.to_string(),
            kind: VariableKind::Uniform,
            len: len.max(1),
        }
    }

    #[must_use]
    pub fn sampler(name: &str, texture_kind: TextureKind) -> Self {
        Self::sampler_array(name, texture_kind, 1)
    }

    #[must_use]
    pub fn sampler_array(name: &str, texture_kind: TextureKind, len: usize) -> Self {
        Self {
            name: name.to_string(),
            kind: VariableKind::Sampler(texture_kind),
            len: len.max(1),
        }
    }
}

/// Vertex inputs, one per geometry semantic.
#[must_use]
pub fn attribute_declarations() -> Vec<VariableDecl> {
    VertexAttribute::ALL
        .iter()
        .map(|a| VariableDecl::attribute(a.shader_name()))
        .collect()
}

#[must_use]
pub fn transform_declarations() -> Vec<VariableDecl> {
    [MODEL_MATRIX, VIEW_MATRIX, PROJECTION_MATRIX, NORMAL_MATRIX, CAMERA_POSITION]
        .into_iter()
        .map(VariableDecl::uniform)
        .collect()
}

/// Surface parameters shared by the unlit and physical materials.
#[must_use]
pub fn surface_declarations(physical: bool) -> Vec<VariableDecl> {
    let mut decls: Vec<VariableDecl> = [BASE_COLOR, OPACITY, HAS_BASE_COLOR_MAP]
        .into_iter()
        .map(VariableDecl::uniform)
        .collect();
    if physical {
        decls.extend([ROUGHNESS, METALLIC, EMISSIVE].into_iter().map(VariableDecl::uniform));
    }
    decls.push(VariableDecl::sampler(BASE_COLOR_MAP, TextureKind::D2));
    decls
}

/// Light arrays, sized from `settings`.
#[must_use]
pub fn light_declarations(settings: &RendererSettings) -> Vec<VariableDecl> {
    let dir = settings.max_directional_lights as usize;
    let point = settings.max_point_lights as usize;
    let dir_maps = dir * settings.max_directional_cascades as usize;

    let mut decls = vec![
        VariableDecl::uniform(AMBIENT_LIGHT),
        VariableDecl::uniform(DIR_LIGHT_COUNT),
        VariableDecl::uniform(POINT_LIGHT_COUNT),
        VariableDecl::uniform(HAS_IBL),
        VariableDecl::uniform(IBL_INTENSITY),
        VariableDecl::sampler(IRRADIANCE_MAP, TextureKind::Cube),
        VariableDecl::sampler(SPECULAR_MAP, TextureKind::Cube),
    ];
    decls.extend(
        [
            DIR_LIGHT_DIRECTION,
            DIR_LIGHT_COLOR,
            DIR_LIGHT_CASTS_SHADOW,
            DIR_LIGHT_CASCADE_COUNT,
            DIR_LIGHT_SHADOW_BIAS,
            DIR_LIGHT_SHADOW_SOFTNESS,
        ]
        .into_iter()
        .map(|name| VariableDecl::uniform_array(name, dir)),
    );
    decls.push(VariableDecl::uniform_array(DIR_SHADOW_MATRIX, dir_maps));
    decls.push(VariableDecl::uniform_array(DIR_CASCADE_END, dir_maps));
    decls.push(VariableDecl::sampler_array(DIR_SHADOW_MAP, TextureKind::D2, dir_maps));
    decls.extend(
        [
            POINT_LIGHT_POSITION,
            POINT_LIGHT_COLOR,
            POINT_LIGHT_CASTS_SHADOW,
            POINT_LIGHT_SHADOW_BIAS,
            POINT_LIGHT_SHADOW_SOFTNESS,
            POINT_LIGHT_SHADOW_NEAR,
            POINT_LIGHT_SHADOW_FAR,
            POINT_LIGHT_SHADOW_MAP_SIZE,
        ]
        .into_iter()
        .map(|name| VariableDecl::uniform_array(name, point)),
    );
    decls.push(VariableDecl::sampler_array(POINT_SHADOW_MAP, TextureKind::Cube, point));
    decls
}

#[must_use]
pub fn shadow_pass_declarations() -> Vec<VariableDecl> {
    [MODEL_MATRIX, LIGHT_VIEW_PROJECTION, LIGHT_POSITION, SHADOW_FAR]
        .into_iter()
        .map(VariableDecl::uniform)
        .collect()
}

// ============================================================================
// LocationTable
// ============================================================================

/// A resolved variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocationEntry {
    /// `None` when the program does not use the variable.
    pub location: Option<Location>,
    pub kind: VariableKind,
    pub len: usize,
    /// First texture unit of a sampler variable.
    pub texture_unit: Option<u32>,
}

/// Variable name to backend location, resolved once from a linked program.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocationTable {
    entries: FxHashMap<String, LocationEntry>,
    texture_units: u32,
}

impl LocationTable {
    /// Queries every declaration once. Samplers the program uses get
    /// consecutive texture units, one per array element.
    #[must_use]
    pub fn resolve(program: &ShaderProgram, decls: &[VariableDecl]) -> Self {
        let mut table = Self::default();
        for decl in decls {
            if table.entries.contains_key(&decl.name) {
                continue;
            }
            let location = match decl.kind {
                VariableKind::Attribute => program.attribute_location(&decl.name),
                VariableKind::Uniform | VariableKind::Sampler(_) => {
                    program.uniform_location(&decl.name)
                }
            };
            let texture_unit = match (decl.kind, location) {
                (VariableKind::Sampler(_), Some(_)) => {
                    let unit = table.texture_units;
                    table.texture_units += decl.len as u32;
                    Some(unit)
                }
                _ => None,
            };
            table.entries.insert(
                decl.name.clone(),
                LocationEntry {
                    location,
                    kind: decl.kind,
                    len: decl.len,
                    texture_unit,
                },
            );
        }
        table
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&LocationEntry> {
        self.entries.get(name)
    }

    /// Number of texture units handed out.
    #[must_use]
    pub fn texture_unit_count(&self) -> u32 {
        self.texture_units
    }

    /// Entries that resolved to a location.
    pub fn resolved(&self) -> impl Iterator<Item = (&str, &LocationEntry)> {
        self.entries
            .iter()
            .filter(|(_, e)| e.location.is_some())
            .map(|(n, e)| (n.as_str(), e))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
