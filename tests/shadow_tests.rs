//! Shadow tests
//!
//! Tests for:
//! - Cascade boundary computation
//! - Cascade projections enclosing their frustum slice
//! - Shadow map lifecycle (lazy build, disable keeps maps, rebuild on resize)
//! - Point-light cube faces and the PCF kernel

use std::rc::Rc;

use glam::{Mat4, Vec3, Vec4};
use lumina::backend::{BackendRef, CubeFace, HeadlessBackend};
use lumina::errors::RenderError;
use lumina::light::point::compare_depth;
use lumina::light::{
    DirectionalLight, Light, ShadowPhase, ShadowSoftness, compute_cascade_boundaries,
    pcf_kernel, pcf_sample_directions, produced_cascade_count,
};
use lumina::scene::{Camera, Transform};
use lumina::settings::RendererSettings;

// ============================================================================
// Helper
// ============================================================================

fn approx(a: f32, b: f32, eps: f32) -> bool {
    (a - b).abs() < eps
}

fn headless() -> (Rc<HeadlessBackend>, BackendRef) {
    let headless = Rc::new(HeadlessBackend::new());
    let backend: BackendRef = headless.clone();
    (headless, backend)
}

/// Sun pointing down and slightly forward.
fn sun_world() -> Mat4 {
    Transform::looking_at(Vec3::new(0.0, 10.0, 5.0), Vec3::ZERO, Vec3::Y).matrix
}

// ============================================================================
// Cascade Boundaries
// ============================================================================

#[test]
fn three_cascades_end_at_far() {
    let b = compute_cascade_boundaries(3, 0.1, 100.0);
    assert_eq!(b.len(), 4);
    assert!(approx(b[0], 0.1, 1e-6));
    assert!(approx(b[1], 33.4, 1e-3));
    assert!(approx(b[2], 76.69, 1e-2));
    assert_eq!(b[3], 100.0);
}

#[test]
fn boundaries_are_increasing_and_clamped() {
    for count in 1..=4 {
        let b = compute_cascade_boundaries(count, 0.5, 250.0);
        assert_eq!(b.len(), produced_cascade_count(count) as usize + 1);
        assert!(b.windows(2).all(|w| w[0] < w[1]), "{b:?}");
        assert!(b.iter().all(|&v| v <= 250.0));
        assert_eq!(*b.last().unwrap(), 250.0);
    }
}

#[test]
fn four_cascades_stop_at_far() {
    let b = compute_cascade_boundaries(4, 0.1, 100.0);
    assert_eq!(b.len(), 4, "{b:?}");
    assert!(approx(b[1], 25.075, 1e-3));
    assert!(approx(b[2], 60.04, 1e-2));
    assert_eq!(b[3], 100.0);
}

#[test]
fn later_cascades_cover_more_depth() {
    let b = compute_cascade_boundaries(3, 0.1, 1000.0);
    let first = b[1] - b[0];
    let second = b[2] - b[1];
    assert!(second > first);
}

// ============================================================================
// Cascade Projections
// ============================================================================

#[test]
fn cascades_enclose_their_frustum_slice() {
    let camera = Camera::new_perspective(60.0, 16.0 / 9.0, 0.1, 100.0);
    let camera_world = Transform::looking_at(Vec3::new(0.0, 2.0, 10.0), Vec3::ZERO, Vec3::Y).matrix;
    let light_world = sun_world();

    let mut light = DirectionalLight::new(3, 512, 0.005, ShadowSoftness::Soft).unwrap();
    light.update_cascades(&camera, &camera_world, &light_world).unwrap();

    assert_eq!(light.cascades().len(), 3);
    assert_eq!(light.boundaries(), compute_cascade_boundaries(3, 0.1, 100.0).as_slice());

    for cascade in light.cascades() {
        let corners = camera
            .frustum_corners_view(cascade.split_near, cascade.split_far)
            .unwrap();
        for corner in corners {
            let world = camera_world.transform_point3(corner);
            let clip = cascade.view_projection * Vec4::from((world, 1.0));
            let ndc = clip.truncate() / clip.w;
            assert!(ndc.abs().max_element() <= 1.0 + 1e-3, "{ndc:?}");
        }
    }
    assert!(matches!(
        light.cascade(3),
        Err(RenderError::OutOfRange { index: 3, len: 3, .. })
    ));
}

#[test]
fn max_cascade_count_has_no_empty_cascade() {
    // light axis parallel to the camera's
    let camera = Camera::new_perspective(60.0, 1.0, 0.1, 100.0);
    let mut light = DirectionalLight::new(4, 512, 0.005, ShadowSoftness::Soft).unwrap();
    light
        .update_cascades(&camera, &Mat4::IDENTITY, &Mat4::IDENTITY)
        .unwrap();

    assert_eq!(light.active_cascade_count(), 3);
    assert_eq!(light.cascades().len(), 3);
    for cascade in light.cascades() {
        assert!(cascade.split_far > cascade.split_near);
        assert!(!cascade.bounds.is_degenerate(), "{cascade:?}");
        assert!(cascade.view_projection.is_finite(), "{cascade:?}");
    }
}

#[test]
fn shadow_maps_match_produced_cascades() {
    let (headless, backend) = headless();
    let settings = RendererSettings {
        default_cascade_count: 4,
        ..RendererSettings::default()
    };
    let mut light = Light::new_directional(Vec3::ONE, 1.0, &settings)
        .unwrap()
        .with_shadows(true);
    light.init(&backend).unwrap();

    assert_eq!(light.shadow().unwrap().maps().len(), 3);
    assert_eq!(headless.live_framebuffers(), 3);

    let camera = Camera::new_perspective(60.0, 1.0, 0.1, 100.0);
    let directional = light.as_directional_mut().unwrap();
    directional
        .update_cascades(&camera, &Mat4::IDENTITY, &sun_world())
        .unwrap();
    assert_eq!(directional.cascades().len(), 3);
}

#[test]
fn orthographic_camera_is_unsupported() {
    let camera = Camera::new_orthographic(5.0, 1.0, 0.1, 50.0);
    let mut light = DirectionalLight::new(2, 256, 0.0, ShadowSoftness::Hard).unwrap();
    assert!(matches!(
        light.update_cascades(&camera, &Mat4::IDENTITY, &sun_world()),
        Err(RenderError::Unsupported(_))
    ));
}

#[test]
fn light_direction_is_negative_z() {
    let dir = DirectionalLight::direction(&sun_world());
    let expected = (Vec3::ZERO - Vec3::new(0.0, 10.0, 5.0)).normalize();
    assert!(dir.abs_diff_eq(expected, 1e-5));
}

// ============================================================================
// Shadow Map Lifecycle
// ============================================================================

#[test]
fn shadow_maps_are_built_on_init() {
    let (headless, backend) = headless();
    let settings = RendererSettings::default();
    let mut light = Light::new_directional(Vec3::ONE, 3.0, &settings)
        .unwrap()
        .with_shadows(true);

    let shadow = light.shadow().unwrap();
    assert_eq!(shadow.phase(), ShadowPhase::Uninitialized);
    assert!(!light.casts_shadows());

    light.init(&backend).unwrap();
    assert!(light.casts_shadows());
    let shadow = light.shadow().unwrap();
    assert_eq!(shadow.maps().len(), settings.default_cascade_count as usize);
    assert_eq!(headless.live_framebuffers(), settings.default_cascade_count as usize);

    let map = shadow.map(0).unwrap();
    assert!(map.depth_texture().is_some());
    assert_eq!(map.color_attachment_count(), 0);
    assert_eq!(map.size(), (settings.shadow_map_size, settings.shadow_map_size));
}

#[test]
fn disabling_shadows_keeps_the_maps() {
    let (headless, backend) = headless();
    let settings = RendererSettings::default();
    let mut light = Light::new_point(Vec3::ONE, 5.0, 20.0, &settings);
    light.init(&backend).unwrap();
    assert_eq!(headless.live_framebuffers(), 0);

    light.set_shadows_enabled(&backend, true).unwrap();
    assert_eq!(headless.live_framebuffers(), 1);
    light.set_shadows_enabled(&backend, false).unwrap();
    assert!(!light.casts_shadows());
    assert_eq!(headless.live_framebuffers(), 1);

    light.set_shadows_enabled(&backend, true).unwrap();
    assert_eq!(headless.stats().framebuffers_created, 1);
}

#[test]
fn cascade_count_change_rebuilds_maps() {
    let (headless, backend) = headless();
    let settings = RendererSettings::default();
    let mut light = Light::new_directional(Vec3::ONE, 1.0, &settings)
        .unwrap()
        .with_shadows(true);
    light.init(&backend).unwrap();

    light.as_directional_mut().unwrap().set_cascade_count(2).unwrap();
    assert!(light.shadow().unwrap().maps().is_empty());

    light.prepare_shadow_maps(&backend).unwrap();
    assert_eq!(light.shadow().unwrap().maps().len(), 2);
    assert_eq!(headless.live_framebuffers(), 2);
}

#[test]
fn ambient_lights_cannot_cast_shadows() {
    let (_, backend) = headless();
    let mut light = Light::new_ambient(Vec3::ONE, 0.1);
    assert!(light.shadow().is_none());
    assert!(matches!(
        light.set_shadows_enabled(&backend, true),
        Err(RenderError::Unsupported(_))
    ));
}

#[test]
fn dropping_a_light_releases_its_maps() {
    let (headless, backend) = headless();
    let settings = RendererSettings::default();
    let mut light = Light::new_directional(Vec3::ONE, 1.0, &settings)
        .unwrap()
        .with_shadows(true);
    light.init(&backend).unwrap();
    drop(light);

    assert_eq!(headless.live_framebuffers(), 0);
    assert_eq!(headless.live_textures(), 0);
    assert_eq!(headless.stats().invalid_releases, 0);
}

// ============================================================================
// Point Light Cube Faces
// ============================================================================

#[test]
fn cube_faces_look_along_their_axis() {
    let settings = RendererSettings::default();
    let mut light = Light::new_point(Vec3::ONE, 1.0, 25.0, &settings);
    let point = light.as_point_mut().unwrap();
    let position = Vec3::new(1.0, 2.0, 3.0);
    point.update_faces(position);

    for face in CubeFace::ALL {
        let (dir, _) = face.view_basis();
        let clip = point.face_view_projection(face) * Vec4::from((position + dir * 5.0, 1.0));
        let ndc = clip.truncate() / clip.w;
        assert!(approx(ndc.x, 0.0, 1e-4) && approx(ndc.y, 0.0, 1e-4), "{face:?}: {ndc:?}");
        assert!(ndc.z > -1.0 && ndc.z < 1.0);
    }
    assert_eq!(point.shadow_far(), 25.0);
}

#[test]
fn pcf_sample_counts() {
    assert_eq!(pcf_kernel(ShadowSoftness::Hard).len(), 1);
    assert_eq!(pcf_kernel(ShadowSoftness::Soft).len(), 9);
    assert_eq!(pcf_kernel(ShadowSoftness::VerySoft).len(), 17);
    assert_eq!(ShadowSoftness::default(), ShadowSoftness::Soft);
}

#[test]
fn pcf_offsets_are_perpendicular_to_the_lookup() {
    let to_frag = Vec3::new(3.0, -1.0, 2.0);
    let samples = pcf_sample_directions(to_frag, 0.1, 512, ShadowSoftness::VerySoft);
    assert_eq!(samples.len(), 17);

    let dir = to_frag.normalize();
    for s in &samples {
        assert!(approx((*s - to_frag).dot(dir), 0.0, 1e-4));
    }
    // center sample of the 3x3 grid is the lookup itself
    assert!(samples[4].abs_diff_eq(to_frag, 1e-6));
}

#[test]
fn hard_shadows_sample_once() {
    let to_frag = Vec3::new(0.0, 0.0, -4.0);
    let samples = pcf_sample_directions(to_frag, 0.1, 512, ShadowSoftness::Hard);
    assert_eq!(samples.as_slice(), &[to_frag]);
}

#[test]
fn compare_depth_is_normalized_distance_minus_bias() {
    let d = compare_depth(Vec3::new(0.0, 6.0, 8.0), 20.0, 0.01);
    assert!(approx(d, 0.49, 1e-6));
}
