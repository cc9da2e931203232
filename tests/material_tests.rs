//! Material tests
//!
//! Tests for:
//! - Building materials from built-in and custom templates
//! - Cached variable locations and array offsets
//! - Failed builds leave the material unusable
//! - Staged values reaching the backend
//! - Texture references held weakly

use std::rc::Rc;

use glam::{Mat4, Vec3, Vec4};
use lumina::backend::{BackendRef, HeadlessBackend, ShaderStage, TextureKind, UniformValue};
use lumina::errors::RenderError;
use lumina::material::variables::{
    BASE_COLOR, BASE_COLOR_MAP, DIR_LIGHT_COLOR, DIR_SHADOW_MAP, MODEL_MATRIX, POINT_SHADOW_MAP,
    ROUGHNESS,
};
use lumina::material::{BuildContext, Material, MaterialKind};
use lumina::resources::Texture;
use lumina::settings::RendererSettings;
use lumina::shader::{ProgramCache, ShaderManager};

// ============================================================================
// Helper
// ============================================================================

struct Fixture {
    headless: Rc<HeadlessBackend>,
    backend: BackendRef,
    shaders: ShaderManager,
    programs: ProgramCache,
    settings: RendererSettings,
}

impl Fixture {
    fn new() -> Self {
        let headless = Rc::new(HeadlessBackend::new());
        let backend: BackendRef = headless.clone();
        Self {
            headless,
            backend,
            shaders: ShaderManager::with_builtin_library(),
            programs: ProgramCache::new(),
            settings: RendererSettings::default(),
        }
    }

    fn build(&mut self, material: &mut Material) -> Result<(), RenderError> {
        material.build(&mut BuildContext {
            backend: &self.backend,
            shaders: &self.shaders,
            programs: &mut self.programs,
            settings: &self.settings,
        })
    }
}

const TOON_VERT: &str = "#version 410 core\n\
uniform mat4 uModelMatrix;\n\
uniform mat4 uViewMatrix;\n\
uniform mat4 uProjectionMatrix;\n\
in vec3 aPosition;\n\
void main() {\n\
    gl_Position = uProjectionMatrix * uViewMatrix * uModelMatrix * vec4(aPosition, 1.0);\n\
}\n";

const TOON_FRAG: &str = "#version 410 core\n\
uniform vec4 uTint;\n\
uniform float uBands[@BANDS];\n\
uniform sampler2D uRamp;\n\
out vec4 fragColor;\n\
void main() {\n\
    fragColor = uTint * uBands[0] * texture(uRamp, vec2(0.5));\n\
}\n";

// ============================================================================
// Build
// ============================================================================

#[test]
fn standard_material_resolves_locations() {
    let mut fx = Fixture::new();
    let mut material = Material::new_standard(Vec4::ONE, 0.5, 0.0);
    assert!(!material.is_ready());

    fx.build(&mut material).unwrap();
    assert!(material.is_ready());
    assert!(material.get_shader_location(BASE_COLOR, 0).unwrap().is_some());
    assert!(material.get_shader_location(ROUGHNESS, 0).unwrap().is_some());
    assert!(material.get_shader_location(MODEL_MATRIX, 0).unwrap().is_some());
    assert!(material.get_shader_location("aPosition", 0).unwrap().is_some());

    // unknown names are not an error
    assert_eq!(material.get_shader_location("uNotThere", 0).unwrap(), None);
}

#[test]
fn array_offsets_are_bounded_by_declared_length() {
    let mut fx = Fixture::new();
    let mut material = Material::new_standard(Vec4::ONE, 0.5, 0.0);
    fx.build(&mut material).unwrap();

    let max = fx.settings.max_directional_lights as usize;
    let first = material.get_shader_location(DIR_LIGHT_COLOR, 0).unwrap().unwrap();
    let last = material
        .get_shader_location(DIR_LIGHT_COLOR, max - 1)
        .unwrap()
        .unwrap();
    assert_eq!(last.0, first.0 + (max as u32 - 1));

    assert!(matches!(
        material.get_shader_location(DIR_LIGHT_COLOR, max),
        Err(RenderError::OutOfRange { index, len, .. }) if index == max && len == max
    ));
}

#[test]
fn sampler_arrays_get_consecutive_units() {
    let mut fx = Fixture::new();
    let mut material = Material::new_standard(Vec4::ONE, 0.5, 0.0);
    fx.build(&mut material).unwrap();

    let dir_maps = (fx.settings.max_directional_lights * fx.settings.max_directional_cascades) as usize;
    let first = material.texture_unit(DIR_SHADOW_MAP, 0).unwrap().unwrap();
    let last = material.texture_unit(DIR_SHADOW_MAP, dir_maps - 1).unwrap().unwrap();
    assert_eq!(last - first, dir_maps as u32 - 1);

    let point = material.texture_unit(POINT_SHADOW_MAP, 0).unwrap().unwrap();
    assert!(point > last || point + fx.settings.max_point_lights <= first);
}

#[test]
fn invalid_source_leaves_material_not_ready() {
    let mut fx = Fixture::new();
    fx.shaders.set_shader(ShaderStage::Vertex, "Broken", TOON_VERT);
    fx.shaders
        .set_shader(ShaderStage::Fragment, "Broken", "void main() { fragColor = vec4(1.0);\n");

    let mut material = Material::new_custom("broken", "Broken", false);
    let err = fx.build(&mut material).unwrap_err();
    assert!(matches!(err, RenderError::Compile { stage: ShaderStage::Fragment, .. }));

    assert!(!material.is_ready());
    assert!(material.program().is_none());
    assert!(material.location_table().is_none());
    assert!(matches!(
        material.get_shader_location(MODEL_MATRIX, 0),
        Err(RenderError::NotReady(_))
    ));
    assert_eq!(fx.headless.live_programs(), 0);
}

#[test]
fn missing_template_fails_the_build() {
    let mut fx = Fixture::new();
    let mut material = Material::new_custom("ghost", "DoesNotExist", false);
    assert!(matches!(fx.build(&mut material), Err(RenderError::NotFound(_))));
    assert!(!material.is_ready());
}

#[test]
fn rebuilding_a_ready_material_is_a_no_op() {
    let mut fx = Fixture::new();
    let mut material = Material::new_unlit(Vec4::ONE);
    fx.build(&mut material).unwrap();
    let linked = fx.headless.stats().programs_linked;

    fx.build(&mut material).unwrap();
    assert_eq!(fx.headless.stats().programs_linked, linked);
}

#[test]
fn materials_with_identical_sources_share_a_program() {
    let mut fx = Fixture::new();
    let mut a = Material::new_standard(Vec4::ONE, 0.1, 0.0);
    let mut b = Material::new_standard(Vec4::X, 0.9, 1.0);
    fx.build(&mut a).unwrap();
    fx.build(&mut b).unwrap();

    assert!(Rc::ptr_eq(a.program().unwrap(), b.program().unwrap()));
    assert_eq!(fx.headless.stats().programs_linked, 1);
}

// ============================================================================
// Custom Templates
// ============================================================================

#[test]
fn custom_template_with_declared_variables() {
    let mut fx = Fixture::new();
    fx.shaders.set_shader(ShaderStage::Vertex, "Toon", TOON_VERT);
    fx.shaders.set_shader(ShaderStage::Fragment, "Toon", TOON_FRAG);

    let mut material = Material::new_custom("toon", "Toon", false);
    material.set_shader_param("BANDS", "4");
    material.declare_uniform("uTint", 1);
    material.declare_uniform("uBands", 4);
    material.declare_sampler("uRamp", TextureKind::D2);
    fx.build(&mut material).unwrap();

    assert!(material.get_shader_location("uBands", 3).unwrap().is_some());
    assert!(material.get_shader_location("uBands", 4).is_err());
    assert_eq!(material.texture_unit("uRamp", 0).unwrap(), Some(0));

    let ramp = Rc::new(Texture::solid_color(&fx.backend, "ramp", [255, 128, 0, 255]).unwrap());
    material.set_custom_uniform("uTint", UniformValue::Vec4(Vec4::new(1.0, 0.5, 0.5, 1.0)));
    material.set_custom_texture("uRamp", &ramp);
    material.send_custom_uniforms_to_shader().unwrap();

    let program = material.program().unwrap().handle().unwrap();
    let tint = material.get_shader_location("uTint", 0).unwrap().unwrap();
    assert_eq!(
        fx.headless.last_uniform(program, tint),
        Some(UniformValue::Vec4(Vec4::new(1.0, 0.5, 0.5, 1.0)))
    );
    let ramp_id = ramp.handle().unwrap();
    assert!(fx.headless.texture_binds().iter().any(|&(unit, id, _)| unit == 0 && id == ramp_id));
}

#[test]
fn staged_values_resolve_without_declarations() {
    let mut fx = Fixture::new();
    fx.shaders.set_shader(ShaderStage::Vertex, "Toon", TOON_VERT);
    fx.shaders.set_shader(ShaderStage::Fragment, "Toon", TOON_FRAG);

    let ramp = Rc::new(Texture::solid_color(&fx.backend, "ramp", [255; 4]).unwrap());
    let mut material = Material::new_custom("toon", "Toon", false);
    material.set_shader_param("BANDS", "2");
    material.set_custom_uniform("uTint", UniformValue::Vec4(Vec4::X));
    material.set_custom_texture("uRamp", &ramp);
    fx.build(&mut material).unwrap();

    let tint = material.get_shader_location("uTint", 0).unwrap().unwrap();
    assert_eq!(material.texture_unit("uRamp", 0).unwrap(), Some(0));
    material.send_custom_uniforms_to_shader().unwrap();

    let program = material.program().unwrap().handle().unwrap();
    assert_eq!(
        fx.headless.last_uniform(program, tint),
        Some(UniformValue::Vec4(Vec4::X))
    );
    let ramp_id = ramp.handle().unwrap();
    assert!(fx.headless.texture_binds().iter().any(|&(unit, id, _)| unit == 0 && id == ramp_id));
}

#[test]
fn values_staged_after_build_are_skipped() {
    let mut fx = Fixture::new();
    fx.shaders.set_shader(ShaderStage::Vertex, "Toon", TOON_VERT);
    fx.shaders.set_shader(ShaderStage::Fragment, "Toon", TOON_FRAG);

    let mut material = Material::new_custom("toon", "Toon", false);
    material.set_shader_param("BANDS", "2");
    fx.build(&mut material).unwrap();
    let writes = fx.headless.uniform_writes().len();

    material.set_custom_uniform("uTint", UniformValue::Vec4(Vec4::X));
    material.send_custom_uniforms_to_shader().unwrap();
    assert_eq!(material.get_shader_location("uTint", 0).unwrap(), None);
    assert_eq!(fx.headless.uniform_writes().len(), writes);
}

#[test]
fn dropped_texture_is_an_invalid_reference() {
    let mut fx = Fixture::new();
    let mut material = Material::new_unlit(Vec4::ONE);
    fx.build(&mut material).unwrap();

    let texture = Rc::new(Texture::solid_color(&fx.backend, "albedo", [255; 4]).unwrap());
    material.set_base_color_map(Some(&texture));
    material.send_custom_uniforms_to_shader().unwrap();
    assert!(material.texture_unit(BASE_COLOR_MAP, 0).unwrap().is_some());

    drop(texture);
    assert!(matches!(
        material.send_custom_uniforms_to_shader(),
        Err(RenderError::InvalidReference(_))
    ));
}

#[test]
fn send_transforms_writes_the_model_matrix() {
    let mut fx = Fixture::new();
    let mut material = Material::new_unlit(Vec4::ONE);
    fx.build(&mut material).unwrap();
    material.use_program().unwrap();

    let model = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
    material
        .send_transforms(&model, &Mat4::IDENTITY, &Mat4::IDENTITY)
        .unwrap();

    let program = material.program().unwrap().handle().unwrap();
    let location = material.get_shader_location(MODEL_MATRIX, 0).unwrap().unwrap();
    assert_eq!(
        fx.headless.last_uniform(program, location),
        Some(UniformValue::Mat4(model))
    );
}

#[test]
fn clone_shares_the_built_program() {
    let mut fx = Fixture::new();
    let mut material = Material::new_standard(Vec4::ONE, 0.3, 0.0);
    fx.build(&mut material).unwrap();

    let copy = material.clone();
    assert!(copy.is_ready());
    assert_ne!(copy.uuid, material.uuid);
    assert_eq!(copy.kind(), &MaterialKind::StandardPhysical);
    assert_eq!(fx.headless.stats().programs_linked, 1);
}
