//! Renderer Settings
//!
//! Static configuration consumed by the renderer, the light system and the
//! shader template engine.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use lumina::settings::RendererSettings;
//!
//! // Defaults
//! let settings = RendererSettings::default();
//!
//! // From a JSON document; missing fields keep their defaults
//! let settings = RendererSettings::from_json_str(r#"{ "shadow_map_size": 2048 }"#)?;
//! ```

use serde::{Deserialize, Serialize};

use crate::errors::{RenderError, Result};
use crate::light::ShadowSoftness;

/// Hard upper bound on directional-light cascades, regardless of settings.
pub const MAX_DIRECTIONAL_CASCADES: u32 = 4;

/// Renderer configuration.
///
/// Light-array sizes are baked into shader source through template parameters
/// (`@MAX_DIR_LIGHTS`, `@MAX_POINT_LIGHTS`, `@MAX_CASCADES`), so changing them
/// requires rebuilding materials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererSettings {
    /// Size of the directional-light uniform arrays.
    pub max_directional_lights: u32,
    /// Size of the point-light uniform arrays.
    pub max_point_lights: u32,
    /// Cascades allocated per directional light (at most [`MAX_DIRECTIONAL_CASCADES`]).
    pub max_directional_cascades: u32,
    /// Cascade count given to newly created directional lights.
    pub default_cascade_count: u32,
    /// Edge length of each directional cascade map, in texels.
    pub shadow_map_size: u32,
    /// Edge length of each point-light cube face, in texels.
    pub point_shadow_map_size: u32,
    /// Depth bias given to newly created shadow-casting lights.
    pub default_shadow_bias: f32,
    /// Filtering kernel given to newly created shadow-casting lights.
    pub default_shadow_softness: ShadowSoftness,
    /// Maximum `#include` nesting accepted by the shader template engine.
    pub max_include_depth: usize,
    /// Clear color of the main pass.
    pub clear_color: [f32; 4],
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            max_directional_lights: 4,
            max_point_lights: 8,
            max_directional_cascades: MAX_DIRECTIONAL_CASCADES,
            default_cascade_count: 3,
            shadow_map_size: 1024,
            point_shadow_map_size: 512,
            default_shadow_bias: 0.005,
            default_shadow_softness: ShadowSoftness::Soft,
            max_include_depth: 32,
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

impl RendererSettings {
    /// Parses settings from JSON and validates them.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Checks every bound. Called by [`Self::from_json_str`] and by the
    /// renderer on construction.
    pub fn validate(&self) -> Result<()> {
        if self.max_directional_lights == 0 || self.max_point_lights == 0 {
            return Err(RenderError::Config(
                "light array sizes must be at least 1".into(),
            ));
        }
        if self.max_directional_cascades == 0
            || self.max_directional_cascades > MAX_DIRECTIONAL_CASCADES
        {
            return Err(RenderError::Config(format!(
                "max_directional_cascades must be in 1..={MAX_DIRECTIONAL_CASCADES}, got {}",
                self.max_directional_cascades
            )));
        }
        if self.default_cascade_count == 0
            || self.default_cascade_count > self.max_directional_cascades
        {
            return Err(RenderError::Config(format!(
                "default_cascade_count must be in 1..={}, got {}",
                self.max_directional_cascades, self.default_cascade_count
            )));
        }
        if self.shadow_map_size == 0 || self.point_shadow_map_size == 0 {
            return Err(RenderError::Config("shadow map sizes must be non-zero".into()));
        }
        if self.max_include_depth == 0 {
            return Err(RenderError::Config("max_include_depth must be non-zero".into()));
        }
        Ok(())
    }

    /// Template parameters shared by every material shader.
    #[must_use]
    pub fn shader_params(&self) -> Vec<(String, String)> {
        vec![
            ("MAX_DIR_LIGHTS".into(), self.max_directional_lights.to_string()),
            ("MAX_POINT_LIGHTS".into(), self.max_point_lights.to_string()),
            ("MAX_CASCADES".into(), self.max_directional_cascades.to_string()),
            (
                "MAX_DIR_SHADOW_MAPS".into(),
                (self.max_directional_lights * self.max_directional_cascades).to_string(),
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(RendererSettings::default().validate().is_ok());
    }

    #[test]
    fn json_partial_override() {
        let s = RendererSettings::from_json_str(r#"{ "shadow_map_size": 2048 }"#).unwrap();
        assert_eq!(s.shadow_map_size, 2048);
        assert_eq!(s.max_point_lights, 8);
    }

    #[test]
    fn json_rejects_too_many_cascades() {
        let err = RendererSettings::from_json_str(r#"{ "max_directional_cascades": 9 }"#);
        assert!(matches!(err, Err(RenderError::Config(_))));
    }

    #[test]
    fn json_syntax_error_is_config_error() {
        let err = RendererSettings::from_json_str("{ not json");
        assert!(matches!(err, Err(RenderError::Config(_))));
    }
}
