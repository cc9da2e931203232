//! Transform and world-matrix propagation tests
//!
//! Tests for:
//! - Transform compose / invert operations
//! - Singular matrix rejection
//! - Hierarchical propagation through `Scene::update_world_transforms`
//! - Deep hierarchies (no recursion)

use glam::{Mat4, Quat, Vec3};
use lumina::errors::RenderError;
use lumina::scene::{Scene, Transform};
use std::f32::consts::FRAC_PI_2;

// ============================================================================
// Helper
// ============================================================================

const EPSILON: f32 = 1e-4;

fn vec3_approx(a: Vec3, b: Vec3) -> bool {
    a.abs_diff_eq(b, EPSILON)
}

// ============================================================================
// Transform Unit Tests
// ============================================================================

#[test]
fn transform_default_is_identity() {
    assert_eq!(Transform::new().matrix, Mat4::IDENTITY);
    assert_eq!(Transform::default(), Transform::IDENTITY);
}

#[test]
fn transform_by_applies_in_local_space() {
    let mut t = Transform::from_translation(Vec3::new(10.0, 0.0, 0.0));
    t.transform_by(&Transform::from_trs(Vec3::ZERO, Quat::IDENTITY, Vec3::splat(2.0)));

    // scale first, then translate
    assert!(vec3_approx(t.transform_point(Vec3::X), Vec3::new(12.0, 0.0, 0.0)));
}

#[test]
fn pre_transform_by_applies_in_parent_space() {
    let mut t = Transform::from_translation(Vec3::new(10.0, 0.0, 0.0));
    t.pre_transform_by(&Transform::from_trs(Vec3::ZERO, Quat::IDENTITY, Vec3::splat(2.0)));

    assert!(vec3_approx(t.position(), Vec3::new(20.0, 0.0, 0.0)));
}

#[test]
fn inverse_round_trips_points() {
    let t = Transform::from_trs(
        Vec3::new(1.0, 2.0, 3.0),
        Quat::from_rotation_y(FRAC_PI_2),
        Vec3::new(2.0, 1.0, 0.5),
    );
    let inv = t.inverse().unwrap();
    let p = Vec3::new(-4.0, 5.0, 0.25);
    assert!(vec3_approx(inv.transform_point(t.transform_point(p)), p));
}

#[test]
fn singular_transform_is_rejected() {
    let mut t = Transform::from_trs(Vec3::ONE, Quat::IDENTITY, Vec3::new(1.0, 0.0, 1.0));
    assert!(!t.is_invertible());
    assert!(matches!(t.inverse(), Err(RenderError::Unsupported(_))));

    // a failed in-place invert leaves the transform untouched
    let before = t;
    assert!(t.invert().is_err());
    assert_eq!(t, before);
}

#[test]
fn looking_at_points_negative_z_at_target() {
    let t = Transform::looking_at(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y);
    let forward = t.transform_vector(Vec3::NEG_Z).normalize();
    assert!(vec3_approx(forward, Vec3::NEG_Z));
    assert!(vec3_approx(t.position(), Vec3::new(0.0, 0.0, 5.0)));
}

// ============================================================================
// Hierarchy Propagation
// ============================================================================

#[test]
fn world_is_parent_world_times_local() {
    let mut scene = Scene::new();
    let parent = scene.create_node("parent");
    let child = scene.create_child(parent, "child").unwrap();

    scene
        .set_local(parent, Transform::from_translation(Vec3::new(0.0, 5.0, 0.0)))
        .unwrap();
    scene
        .set_local(
            child,
            Transform::from_trs(Vec3::new(1.0, 0.0, 0.0), Quat::IDENTITY, Vec3::splat(3.0)),
        )
        .unwrap();
    scene.update_world_transforms();

    let parent_world = scene.node(parent).unwrap().world().matrix;
    let child_node = scene.node(child).unwrap();
    assert!(
        child_node
            .world()
            .matrix
            .abs_diff_eq(parent_world * child_node.local.matrix, EPSILON)
    );
    assert!(vec3_approx(child_node.world().position(), Vec3::new(1.0, 5.0, 0.0)));
}

#[test]
fn update_visits_every_reachable_node() {
    let mut scene = Scene::new();
    let a = scene.create_node("a");
    let b = scene.create_child(a, "b").unwrap();
    scene.create_child(b, "c").unwrap();
    scene.create_node("d");

    assert_eq!(scene.update_world_transforms(), 4);
}

#[test]
fn deep_hierarchy_propagates_without_recursion() {
    let mut scene = Scene::new();
    let root = scene.create_node("root");
    let mut tip = root;
    for i in 0..10_000 {
        tip = scene.create_child(tip, &format!("n{i}")).unwrap();
        scene
            .set_local(tip, Transform::from_translation(Vec3::new(0.0, 0.001, 0.0)))
            .unwrap();
    }

    assert_eq!(scene.update_world_transforms(), 10_001);
    let y = scene.node(tip).unwrap().world().position().y;
    assert!((y - 10.0).abs() < 1e-2);
}

#[test]
fn world_matrix_of_reads_the_parent_chain() {
    let mut scene = Scene::new();
    let a = scene.create_node("a");
    let b = scene.create_child(a, "b").unwrap();
    scene
        .set_local(a, Transform::from_translation(Vec3::new(2.0, 0.0, 0.0)))
        .unwrap();
    scene
        .set_local(b, Transform::from_translation(Vec3::new(0.0, 0.0, -1.0)))
        .unwrap();

    // no explicit update: the chain is composed on demand
    let world = scene.world_matrix_of(b).unwrap();
    assert!(vec3_approx(world.w_axis.truncate(), Vec3::new(2.0, 0.0, -1.0)));
}
