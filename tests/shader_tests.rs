//! Shader template and program tests
//!
//! Tests for:
//! - `#include` splicing with include parameters
//! - `@param` substitution and the unresolved marker
//! - Include cycles and depth limit
//! - Base-stage fallback
//! - Built-in library sources compile and link on the headless backend
//! - Program deduplication by source hash

use std::rc::Rc;

use lumina::backend::{BackendRef, HeadlessBackend, ShaderStage};
use lumina::errors::RenderError;
use lumina::settings::RendererSettings;
use lumina::shader::library::{POINT_SHADOW_DEPTH, SHADOW_DEPTH, STANDARD_PHYSICAL, UNLIT};
use lumina::shader::{NO_PARAMS, ProgramCache, ProgramSources, ShaderManager, ShaderProgram};

fn headless() -> (Rc<HeadlessBackend>, BackendRef) {
    let headless = Rc::new(HeadlessBackend::new());
    let backend: BackendRef = headless.clone();
    (headless, backend)
}

// ============================================================================
// Template Resolution
// ============================================================================

#[test]
fn include_passes_parameters_to_the_child() {
    let mut shaders = ShaderManager::new();
    shaders.set_shader(ShaderStage::Fragment, "Child", "float v = @val;");
    shaders.set_shader(ShaderStage::Fragment, "Parent", "#include \"Child(val=1)\"\nvoid main() {}");

    let out = shaders
        .get_shader(ShaderStage::Fragment, "Parent", NO_PARAMS)
        .unwrap();
    assert!(out.contains("float v = 1;"));
    assert!(out.contains("void main() {}"));
    assert!(!out.contains("#include"));
}

#[test]
fn include_arguments_resolve_against_the_including_file() {
    let mut shaders = ShaderManager::new();
    shaders.set_shader(ShaderStage::Vertex, "Child", "const int N = @count;");
    shaders.set_shader(ShaderStage::Vertex, "Parent", "#include \"Child(count=@MAX_LIGHTS)\"");

    let out = shaders
        .get_shader(ShaderStage::Vertex, "Parent", &[("MAX_LIGHTS", "8")])
        .unwrap();
    assert!(out.contains("const int N = 8;"));
}

#[test]
fn unknown_parameter_leaves_a_marker() {
    let mut shaders = ShaderManager::new();
    shaders.set_shader(ShaderStage::Fragment, "Main", "float x = @missing;");

    let out = shaders.get_shader(ShaderStage::Fragment, "Main", NO_PARAMS).unwrap();
    assert!(out.contains("!!missing"));
}

#[test]
fn unresolved_marker_fails_compilation() {
    let (_, backend) = headless();
    let mut shaders = ShaderManager::new();
    shaders.set_shader(ShaderStage::Fragment, "Main", "float x = @missing;\nvoid main() {}");
    let source = shaders.get_shader(ShaderStage::Fragment, "Main", NO_PARAMS).unwrap();

    match backend.compile_shader_stage(ShaderStage::Fragment, &source) {
        Err(RenderError::Compile { stage, log }) => {
            assert_eq!(stage, ShaderStage::Fragment);
            assert!(log.contains("!!missing"), "{log}");
        }
        other => panic!("expected a compile error, got {other:?}"),
    }
}

#[test]
fn include_cycle_is_an_error() {
    let mut shaders = ShaderManager::new();
    shaders.set_shader(ShaderStage::Vertex, "A", "#include \"B\"");
    shaders.set_shader(ShaderStage::Vertex, "B", "#include \"A\"");

    assert!(matches!(
        shaders.get_shader(ShaderStage::Vertex, "A", NO_PARAMS),
        Err(RenderError::Template(_))
    ));
}

#[test]
fn include_depth_is_bounded() {
    let mut shaders = ShaderManager::new();
    for i in 0..10 {
        shaders.set_shader(ShaderStage::Vertex, &format!("L{i}"), format!("#include \"L{}\"", i + 1));
    }
    shaders.set_shader(ShaderStage::Vertex, "L10", "// leaf");

    assert!(shaders.get_shader(ShaderStage::Vertex, "L0", NO_PARAMS).is_ok());

    shaders.set_max_include_depth(4);
    assert!(matches!(
        shaders.get_shader(ShaderStage::Vertex, "L0", NO_PARAMS),
        Err(RenderError::Template(_))
    ));
}

#[test]
fn missing_template_is_not_found() {
    let shaders = ShaderManager::new();
    assert!(matches!(
        shaders.get_shader(ShaderStage::Vertex, "Nope", NO_PARAMS),
        Err(RenderError::NotFound(_))
    ));
}

#[test]
fn stage_falls_back_to_base_source() {
    let mut shaders = ShaderManager::new();
    shaders.set_shader(ShaderStage::Base, "Shared", "const float PI = 3.14159;");
    shaders.set_shader(ShaderStage::Fragment, "Shared", "// fragment only");

    let vert = shaders.get_shader(ShaderStage::Vertex, "Shared", NO_PARAMS).unwrap();
    let frag = shaders.get_shader(ShaderStage::Fragment, "Shared", NO_PARAMS).unwrap();
    assert!(vert.contains("PI"));
    assert!(!frag.contains("PI"));
    assert!(shaders.has_stage(ShaderStage::Vertex, "Shared"));
    assert!(!shaders.has_explicit_stage(ShaderStage::Vertex, "Shared"));
}

// ============================================================================
// Built-in Library
// ============================================================================

#[test]
fn builtin_templates_build_on_headless() {
    let (headless, backend) = headless();
    let shaders = ShaderManager::with_builtin_library();
    let params = RendererSettings::default().shader_params();

    for name in [UNLIT, STANDARD_PHYSICAL, SHADOW_DEPTH, POINT_SHADOW_DEPTH] {
        let sources = ProgramSources {
            vertex: shaders.get_shader(ShaderStage::Vertex, name, &params).unwrap(),
            geometry: None,
            fragment: shaders.get_shader(ShaderStage::Fragment, name, &params).unwrap(),
        };
        assert!(!sources.vertex.contains("!!"), "{name}: {}", sources.vertex);
        assert!(!sources.fragment.contains("!!"), "{name}: {}", sources.fragment);

        let program = ShaderProgram::build(&backend, name, &sources)
            .unwrap_or_else(|e| panic!("{name}: {e}"));
        assert!(program.handle().is_some());
        assert!(program.attribute_location("aPosition").is_some(), "{name}");
    }
    assert_eq!(headless.live_programs(), 0);
}

// ============================================================================
// Program Cache
// ============================================================================

#[test]
fn identical_sources_share_one_program() {
    let (headless, backend) = headless();
    let shaders = ShaderManager::with_builtin_library();
    let params = RendererSettings::default().shader_params();
    let sources = ProgramSources {
        vertex: shaders.get_shader(ShaderStage::Vertex, UNLIT, &params).unwrap(),
        geometry: None,
        fragment: shaders.get_shader(ShaderStage::Fragment, UNLIT, &params).unwrap(),
    };

    let mut cache = ProgramCache::new();
    let a = cache.get_or_build(&backend, UNLIT, &sources).unwrap();
    let b = cache.get_or_build(&backend, UNLIT, &sources).unwrap();
    assert!(Rc::ptr_eq(&a, &b));
    assert_eq!(headless.stats().programs_linked, 1);

    drop(a);
    drop(b);
    assert_eq!(cache.program_count(), 0);
    assert_eq!(headless.live_programs(), 0);

    cache.get_or_build(&backend, UNLIT, &sources).unwrap();
    assert_eq!(headless.stats().programs_linked, 2);
}

#[test]
fn link_failure_carries_the_backend_log() {
    let (headless, backend) = headless();
    let sources = ProgramSources {
        vertex: "void main() {}".into(),
        geometry: None,
        fragment: "void main() {".into(),
    };

    match ShaderProgram::build(&backend, "broken", &sources) {
        Err(RenderError::Compile { stage, log }) => {
            assert_eq!(stage, ShaderStage::Fragment);
            assert!(log.contains("unclosed"), "{log}");
        }
        other => panic!("expected a compile error, got {other:?}"),
    }
    // the compiled vertex stage is released on failure
    assert_eq!(headless.stats().shaders_compiled, headless.stats().shaders_destroyed);
}
