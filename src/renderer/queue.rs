//! Render Queue
//!
//! Extraction of drawable items and lights from the scene graph, and their
//! ordering for submission.

use glam::{Mat4, Vec3};
use slotmap::Key;

use crate::scene::{
    Component, CullingMask, GeometryKey, LightKey, MaterialKey, NodeHandle, RenderableKey, Scene,
};

/// Sort key: material in the high bits, depth in the low bits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct RenderKey(u64);

impl RenderKey {
    /// Groups by material, then front to back.
    #[must_use]
    pub fn opaque(material: MaterialKey, depth: f32) -> Self {
        let m_bits = (material.data().as_ffi() & 0xFFFF_FFFF) << 32;
        Self(m_bits | u64::from(depth_bits(depth)))
    }

    /// Back to front.
    #[must_use]
    pub fn transparent(depth: f32) -> Self {
        Self(u64::from(u32::MAX - depth_bits(depth)))
    }
}

/// Order-preserving bits of a non-negative depth.
fn depth_bits(depth: f32) -> u32 {
    if depth.is_sign_negative() || depth.is_nan() {
        0
    } else {
        depth.to_bits()
    }
}

/// One renderable instance, resolved through overrides.
#[derive(Debug, Clone, Copy)]
pub struct RenderItem {
    pub node: NodeHandle,
    pub renderable: RenderableKey,
    pub geometry: GeometryKey,
    pub material: MaterialKey,
    pub world: Mat4,
    pub layers: CullingMask,
    pub cast_shadows: bool,
    pub receive_shadows: bool,
    pub distance_sq: f32,
    pub sort_key: RenderKey,
}

/// A light found during extraction, with its owner's world matrix.
#[derive(Debug, Clone, Copy)]
pub struct LightItem {
    pub key: LightKey,
    pub node: NodeHandle,
    pub world: Mat4,
}

#[derive(Debug, Clone, Copy, Default)]
struct OverrideState {
    material: Option<MaterialKey>,
    suppress: bool,
}

/// Items of one frame. Memory is reused across frames.
#[derive(Debug, Default)]
pub struct RenderQueue {
    pub opaque: Vec<RenderItem>,
    pub transparent: Vec<RenderItem>,
    pub lights: Vec<LightItem>,
    /// Nodes walked by the last extraction.
    pub nodes_visited: usize,
}

impl RenderQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.opaque.clear();
        self.transparent.clear();
        self.lights.clear();
        self.nodes_visited = 0;
    }

    /// Walks the scene depth-first pre-order from every root. Inactive nodes
    /// hide their subtree. Overrides apply to the subtree below their node;
    /// the nearest material override wins and suppression is inherited.
    pub fn extract(&mut self, scene: &Scene, camera_position: Vec3) {
        self.clear();

        let mut stack: Vec<(NodeHandle, OverrideState)> = scene
            .roots()
            .iter()
            .rev()
            .map(|&r| (r, OverrideState::default()))
            .collect();

        while let Some((handle, inherited)) = stack.pop() {
            let Some(node) = scene.node(handle) else {
                log::warn!("render extraction skipped dangling node {handle:?}");
                continue;
            };
            if !node.active {
                continue;
            }
            self.nodes_visited += 1;

            let mut state = inherited;
            for component in node.components() {
                if let Component::Override(key) = *component {
                    match scene.overrides.get(key) {
                        Some(o) => {
                            state.suppress |= o.suppress;
                            if o.material.is_some() {
                                state.material = o.material;
                            }
                        }
                        None => log::warn!("dangling override {key:?} on {:?}", node.name),
                    }
                }
            }

            let world = node.world().matrix;
            for component in node.components() {
                match *component {
                    Component::Light(key) => {
                        if let Some(light) = scene.lights.get(key)
                            && light.active
                            && light.owner() == Some(handle)
                        {
                            self.lights.push(LightItem { key, node: handle, world });
                        }
                    }
                    Component::Renderable(key) => {
                        if state.suppress {
                            continue;
                        }
                        let Some(renderable) = scene.renderables.get(key) else {
                            log::warn!("dangling renderable {key:?} on {:?}", node.name);
                            continue;
                        };
                        if !renderable.visible {
                            continue;
                        }
                        let material = state.material.unwrap_or(renderable.material);
                        let transparent = scene
                            .materials
                            .get(material)
                            .is_some_and(|m| m.settings.transparent);
                        let distance_sq = world.w_axis.truncate().distance_squared(camera_position);
                        let depth = distance_sq.sqrt();
                        let item = RenderItem {
                            node: handle,
                            renderable: key,
                            geometry: renderable.geometry,
                            material,
                            world,
                            layers: renderable.layers,
                            cast_shadows: renderable.cast_shadows,
                            receive_shadows: renderable.receive_shadows,
                            distance_sq,
                            sort_key: if transparent {
                                RenderKey::transparent(depth)
                            } else {
                                RenderKey::opaque(material, depth)
                            },
                        };
                        if transparent {
                            self.transparent.push(item);
                        } else {
                            self.opaque.push(item);
                        }
                    }
                    Component::Camera(_) | Component::Override(_) => {}
                }
            }

            for &child in node.children().iter().rev() {
                stack.push((child, state));
            }
        }
    }

    pub fn sort(&mut self) {
        self.opaque.sort_by_key(|i| i.sort_key);
        self.transparent.sort_by_key(|i| i.sort_key);
    }

    /// Opaque items first, then transparent ones.
    pub fn iter(&self) -> impl Iterator<Item = &RenderItem> {
        self.opaque.iter().chain(self.transparent.iter())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.opaque.len() + self.transparent.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transparent_keys_sort_back_to_front() {
        let near = RenderKey::transparent(1.0);
        let far = RenderKey::transparent(10.0);
        assert!(far < near);
    }

    #[test]
    fn negative_depth_sorts_first() {
        assert!(depth_bits(-3.0) < depth_bits(0.5));
        assert!(depth_bits(0.5) < depth_bits(2.0));
    }
}
