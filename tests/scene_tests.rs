//! Scene graph tests
//!
//! Tests for:
//! - Reparenting and orphaning preserve the world pose
//! - Cycle rejection
//! - Traversal order and idempotence
//! - Node removal and light ownership
//! - Component attachment rules

use glam::{Quat, Vec3, Vec4};
use lumina::errors::RenderError;
use lumina::light::Light;
use lumina::material::Material;
use lumina::resources::Geometry;
use lumina::scene::{Camera, Component, NodeHandle, Scene, Transform};
use lumina::settings::RendererSettings;
use std::f32::consts::FRAC_PI_4;

// ============================================================================
// Helper
// ============================================================================

const EPSILON: f32 = 1e-4;

fn world_of(scene: &Scene, h: NodeHandle) -> Transform {
    *scene.node(h).unwrap().world()
}

/// root -> (a -> (a1, a2), b)
fn sample_tree() -> (Scene, [NodeHandle; 5]) {
    let mut scene = Scene::new();
    let root = scene.create_node("root");
    let a = scene.create_child(root, "a").unwrap();
    let a1 = scene.create_child(a, "a1").unwrap();
    let a2 = scene.create_child(a, "a2").unwrap();
    let b = scene.create_child(root, "b").unwrap();
    (scene, [root, a, a1, a2, b])
}

// ============================================================================
// Reparenting
// ============================================================================

#[test]
fn reparent_preserves_world_pose() {
    let mut scene = Scene::new();
    let p1 = scene.create_node("p1");
    let p2 = scene.create_node("p2");
    let child = scene.create_child(p1, "child").unwrap();

    scene
        .set_local(
            p1,
            Transform::from_trs(Vec3::new(3.0, 0.0, 0.0), Quat::from_rotation_y(FRAC_PI_4), Vec3::ONE),
        )
        .unwrap();
    scene
        .set_local(
            p2,
            Transform::from_trs(Vec3::new(0.0, -2.0, 7.0), Quat::from_rotation_x(0.3), Vec3::splat(2.0)),
        )
        .unwrap();
    scene
        .set_local(child, Transform::from_translation(Vec3::new(0.0, 1.0, 0.0)))
        .unwrap();
    scene.update_world_transforms();
    let before = world_of(&scene, child);

    assert!(scene.add_child(p2, child).unwrap());
    assert_eq!(scene.node(child).unwrap().parent(), Some(p2));
    assert!(!scene.node(p1).unwrap().children().contains(&child));

    // cached world is refreshed by add_child itself
    assert!(world_of(&scene, child).abs_diff_eq(&before, EPSILON));
    scene.update_world_transforms();
    assert!(world_of(&scene, child).abs_diff_eq(&before, EPSILON));
}

#[test]
fn orphan_preserves_world_pose() {
    let mut scene = Scene::new();
    let parent = scene.create_node("parent");
    let child = scene.create_child(parent, "child").unwrap();
    scene
        .set_local(parent, Transform::from_trs(Vec3::new(1.0, 2.0, 3.0), Quat::IDENTITY, Vec3::splat(4.0)))
        .unwrap();
    scene
        .set_local(child, Transform::from_translation(Vec3::new(0.5, 0.0, 0.0)))
        .unwrap();
    scene.update_world_transforms();
    let before = world_of(&scene, child);

    assert!(scene.remove_child(parent, child).unwrap());
    assert!(scene.roots().contains(&child));
    assert_eq!(scene.node(child).unwrap().parent(), None);

    scene.update_world_transforms();
    assert!(world_of(&scene, child).abs_diff_eq(&before, EPSILON));
    assert!(scene.node(child).unwrap().local.abs_diff_eq(&before, EPSILON));
}

#[test]
fn remove_child_of_wrong_parent_is_a_no_op() {
    let (mut scene, [_, a, a1, _, b]) = sample_tree();
    assert!(!scene.remove_child(b, a1).unwrap());
    assert_eq!(scene.node(a1).unwrap().parent(), Some(a));
}

#[test]
fn cycles_are_rejected_without_changes() {
    let (mut scene, [root, a, a1, _, _]) = sample_tree();

    assert!(!scene.add_child(a1, root).unwrap());
    assert!(!scene.add_child(a, a).unwrap());
    assert_eq!(scene.node(root).unwrap().parent(), None);
    assert_eq!(scene.node(a1).unwrap().parent(), Some(a));
    assert!(scene.is_ancestor(root, a1));
    assert!(!scene.is_ancestor(a1, root));
}

#[test]
fn add_child_with_unknown_handle_fails() {
    let (mut scene, [root, a, ..]) = sample_tree();
    scene.remove_node(a).unwrap();
    assert!(matches!(
        scene.add_child(root, a),
        Err(RenderError::InvalidReference(_))
    ));
}

// ============================================================================
// Traversal
// ============================================================================

#[test]
fn preorder_visits_parents_before_children() {
    let (scene, [root, a, a1, a2, b]) = sample_tree();
    let order: Vec<NodeHandle> = scene.iter_preorder().collect();
    assert_eq!(order, vec![root, a, a1, a2, b]);

    let sub: Vec<NodeHandle> = scene.subtree(a).collect();
    assert_eq!(sub, vec![a, a1, a2]);
}

#[test]
fn traversal_is_idempotent() {
    let (mut scene, [root, a, a1, ..]) = sample_tree();
    scene
        .set_local(root, Transform::from_translation(Vec3::new(1.0, 0.0, 0.0)))
        .unwrap();
    scene
        .set_local(a, Transform::from_trs(Vec3::ZERO, Quat::from_rotation_z(0.7), Vec3::ONE))
        .unwrap();
    scene
        .set_local(a1, Transform::from_translation(Vec3::new(0.0, 2.0, 0.0)))
        .unwrap();

    let n1 = scene.update_world_transforms();
    let first: Vec<Transform> = scene.iter_preorder().map(|h| world_of(&scene, h)).collect();
    let n2 = scene.update_world_transforms();
    let second: Vec<Transform> = scene.iter_preorder().map(|h| world_of(&scene, h)).collect();

    assert_eq!(n1, n2);
    assert_eq!(first, second);
}

#[test]
fn find_node_by_name_uses_preorder() {
    let (mut scene, [_, _, a1, ..]) = sample_tree();
    assert_eq!(scene.find_node_by_name("a1"), Some(a1));
    assert_eq!(scene.find_node_by_name("missing"), None);

    let late = scene.create_node("a1");
    assert_ne!(scene.find_node_by_name("a1"), Some(late));
}

// ============================================================================
// Removal and Components
// ============================================================================

#[test]
fn remove_node_drops_the_subtree() {
    let (mut scene, [root, a, a1, a2, b]) = sample_tree();
    assert_eq!(scene.remove_node(a).unwrap(), 3);
    assert_eq!(scene.node_count(), 2);
    assert!(scene.node(a1).is_none() && scene.node(a2).is_none());
    assert_eq!(scene.node(root).unwrap().children(), &[b]);
}

#[test]
fn removing_the_owner_orphans_its_light() {
    let settings = RendererSettings::default();
    let (mut scene, [_, a, a1, ..]) = sample_tree();
    let key = scene
        .add_light(a1, Light::new_point(Vec3::ONE, 2.0, 10.0, &settings))
        .unwrap();
    assert_eq!(scene.lights[key].owner(), Some(a1));

    scene.remove_node(a).unwrap();
    assert_eq!(scene.lights[key].owner(), None);
    assert!(matches!(
        scene.light_world_matrix(key),
        Err(RenderError::InvalidReference(_))
    ));
}

#[test]
fn a_light_has_a_single_owner() {
    let mut scene = Scene::new();
    let n1 = scene.create_node("n1");
    let n2 = scene.create_node("n2");
    let key = scene.add_light(n1, Light::new_ambient(Vec3::ONE, 0.2)).unwrap();

    assert!(scene.add_component(n2, Component::Light(key)).unwrap());
    assert_eq!(scene.lights[key].owner(), Some(n2));
    assert!(!scene.node(n1).unwrap().has_component(Component::Light(key)));

    // attaching twice is reported, not duplicated
    assert!(!scene.add_component(n2, Component::Light(key)).unwrap());
    assert_eq!(scene.node(n2).unwrap().components().len(), 1);

    assert!(scene.remove_component(n2, Component::Light(key)).unwrap());
    assert_eq!(scene.lights[key].owner(), None);
}

#[test]
fn add_mesh_validates_keys() {
    let mut scene = Scene::new();
    let node = scene.create_node("mesh");
    let geometry = scene.add_geometry(Geometry::new_box(1.0, 1.0, 1.0));
    let material = scene.add_material(Material::new_unlit(Vec4::ONE));
    scene.add_mesh(node, geometry, material).unwrap();

    scene.geometries.remove(geometry);
    assert!(matches!(
        scene.add_mesh(node, geometry, material),
        Err(RenderError::InvalidReference(_))
    ));
}

#[test]
fn camera_lookup() {
    let mut scene = Scene::new();
    let node = scene.create_node("camera");
    assert_eq!(scene.camera_of(node), None);
    let key = scene
        .add_camera(node, Camera::new_perspective(60.0, 1.5, 0.1, 100.0))
        .unwrap();
    assert_eq!(scene.camera_of(node), Some(key));
}

#[test]
fn node_ids_are_unique_within_a_scene() {
    let (scene, handles) = sample_tree();
    let mut ids: Vec<u64> = handles.iter().map(|&h| scene.node(h).unwrap().id()).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), handles.len());
}
