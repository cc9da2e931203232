//! Built-in shader sources, embedded at compile time.
//!
//! Files under `src/shaders` are named `<Name>.<stage>`, where the stage
//! suffix is `vert`, `geom`, `frag`, or `glsl` for a base source shared by
//! every stage.

use rust_embed::RustEmbed;

use super::template::ShaderManager;
use crate::backend::ShaderStage;

#[derive(RustEmbed)]
#[folder = "src/shaders"]
struct BuiltinShaders;

/// Template of the unlit surface material.
pub const UNLIT: &str = "Unlit";
/// Template of the lit, shadow-receiving surface material.
pub const STANDARD_PHYSICAL: &str = "StandardPhysical";
/// Depth-only template used by directional shadow passes.
pub const SHADOW_DEPTH: &str = "ShadowDepth";
/// Linear-distance template used by point-light cube shadow passes.
pub const POINT_SHADOW_DEPTH: &str = "PointShadowDepth";

fn stage_for_suffix(suffix: &str) -> Option<ShaderStage> {
    ShaderStage::ALL
        .into_iter()
        .find(|stage| stage.file_suffix() == suffix)
}

/// Registers every embedded source with `manager`.
pub fn register_builtin_shaders(manager: &mut ShaderManager) {
    for path in BuiltinShaders::iter() {
        let Some((name, suffix)) = path.rsplit_once('.') else {
            log::warn!("Skipping built-in shader without stage suffix: {path}");
            continue;
        };
        let Some(stage) = stage_for_suffix(suffix) else {
            log::warn!("Skipping built-in shader with unknown suffix: {path}");
            continue;
        };
        let Some(file) = BuiltinShaders::get(&path) else {
            continue;
        };
        match std::str::from_utf8(file.data.as_ref()) {
            Ok(source) => manager.set_shader(stage, name, source),
            Err(e) => log::warn!("Built-in shader {path} is not UTF-8: {e}"),
        }
    }
}
