use glam::Mat4;
use slotmap::SlotMap;

use crate::errors::{RenderError, Result};
use crate::light::Light;
use crate::material::Material;
use crate::resources::Geometry;
use crate::scene::camera::Camera;
use crate::scene::components::{Component, Renderable, RendererOverride};
use crate::scene::node::Node;
use crate::scene::transform::Transform;
use crate::scene::transform_system;
use crate::scene::{
    CameraKey, GeometryKey, LightKey, MaterialKey, NodeHandle, OverrideKey, RenderableKey,
};

/// Scene graph container.
///
/// `Scene` is the context that owns every node and every component table.
/// Nodes refer to components by key; a light additionally records the node
/// that owns it. Node ids come from a per-scene counter, so independent scenes
/// never share an id space.
pub struct Scene {
    nodes: SlotMap<NodeHandle, Node>,
    roots: Vec<NodeHandle>,
    next_node_id: u64,

    // ==== Component tables ====
    pub lights: SlotMap<LightKey, Light>,
    pub cameras: SlotMap<CameraKey, Camera>,
    pub geometries: SlotMap<GeometryKey, Geometry>,
    pub materials: SlotMap<MaterialKey, Material>,
    pub renderables: SlotMap<RenderableKey, Renderable>,
    pub overrides: SlotMap<OverrideKey, RendererOverride>,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: SlotMap::with_key(),
            roots: Vec::new(),
            next_node_id: 1,
            lights: SlotMap::with_key(),
            cameras: SlotMap::with_key(),
            geometries: SlotMap::with_key(),
            materials: SlotMap::with_key(),
            renderables: SlotMap::with_key(),
            overrides: SlotMap::with_key(),
        }
    }

    // ========================================================================
    // Nodes
    // ========================================================================

    /// Creates a root node.
    pub fn create_node(&mut self, name: &str) -> NodeHandle {
        let id = self.next_node_id;
        self.next_node_id += 1;
        let handle = self.nodes.insert(Node::new(id, name));
        self.roots.push(handle);
        handle
    }

    /// Creates a node and attaches it under `parent` with an identity local
    /// transform.
    pub fn create_child(&mut self, parent: NodeHandle, name: &str) -> Result<NodeHandle> {
        self.node_checked(parent)?;
        let handle = self.create_node(name);
        self.roots.retain(|&r| r != handle);
        self.nodes[parent].children.push(handle);
        let parent_world = self.nodes[parent].world;
        let node = &mut self.nodes[handle];
        node.parent = Some(parent);
        node.world = parent_world;
        Ok(handle)
    }

    #[must_use]
    pub fn node(&self, handle: NodeHandle) -> Option<&Node> {
        self.nodes.get(handle)
    }

    pub fn node_mut(&mut self, handle: NodeHandle) -> Option<&mut Node> {
        self.nodes.get_mut(handle)
    }

    fn node_checked(&self, handle: NodeHandle) -> Result<&Node> {
        self.nodes
            .get(handle)
            .ok_or_else(|| RenderError::InvalidReference(format!("node {handle:?}")))
    }

    #[must_use]
    pub fn roots(&self) -> &[NodeHandle] {
        &self.roots
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeHandle, &Node)> {
        self.nodes.iter()
    }

    /// Sets a node's local transform.
    pub fn set_local(&mut self, handle: NodeHandle, local: Transform) -> Result<()> {
        self.nodes
            .get_mut(handle)
            .ok_or_else(|| RenderError::InvalidReference(format!("node {handle:?}")))?
            .local = local;
        Ok(())
    }

    // ========================================================================
    // Hierarchy
    // ========================================================================

    /// Attaches `child` under `parent`, keeping the child's world pose.
    ///
    /// A child that already has a parent is detached first. Its local matrix
    /// becomes `inverse(parent_world) * child_world`, both computed from the
    /// current local matrices. Returns `Ok(false)` without changing anything
    /// when the edge would create a cycle.
    pub fn add_child(&mut self, parent: NodeHandle, child: NodeHandle) -> Result<bool> {
        self.node_checked(parent)?;
        self.node_checked(child)?;

        if parent == child || self.is_ancestor(child, parent) {
            log::warn!(
                "add_child rejected: node {:?} would become its own ancestor",
                self.nodes[child].name
            );
            return Ok(false);
        }

        let child_world = self.world_matrix_of(child)?;
        let parent_inverse = Transform::from(self.world_matrix_of(parent)?).inverse()?;

        self.detach(child);

        let node = &mut self.nodes[child];
        node.local = Transform::from(parent_inverse.matrix * child_world);
        node.parent = Some(parent);
        self.nodes[parent].children.push(child);

        transform_system::update_subtree(&mut self.nodes, child);
        Ok(true)
    }

    /// Detaches `child` from `parent` and makes it a root, keeping its world
    /// pose. Returns `Ok(false)` if `child` is not a child of `parent`.
    pub fn remove_child(&mut self, parent: NodeHandle, child: NodeHandle) -> Result<bool> {
        self.node_checked(parent)?;
        if self.node_checked(child)?.parent != Some(parent) {
            return Ok(false);
        }

        let world = self.world_matrix_of(child)?;
        self.detach(child);

        self.nodes[child].local = Transform::from(world);
        self.roots.push(child);
        transform_system::update_subtree(&mut self.nodes, child);
        Ok(true)
    }

    /// Removes the parent edge (or root entry) of `handle` without touching
    /// its local matrix.
    fn detach(&mut self, handle: NodeHandle) {
        match self.nodes[handle].parent.take() {
            Some(old_parent) => {
                if let Some(p) = self.nodes.get_mut(old_parent) {
                    p.children.retain(|&c| c != handle);
                }
            }
            None => self.roots.retain(|&r| r != handle),
        }
    }

    /// True if `ancestor` is a strict ancestor of `node`.
    #[must_use]
    pub fn is_ancestor(&self, ancestor: NodeHandle, node: NodeHandle) -> bool {
        let mut current = self.nodes.get(node).and_then(|n| n.parent);
        while let Some(h) = current {
            if h == ancestor {
                return true;
            }
            current = self.nodes.get(h).and_then(|n| n.parent);
        }
        false
    }

    /// World matrix computed from the current local matrices of the node's
    /// ancestor chain, ignoring the traversal cache.
    pub fn world_matrix_of(&self, handle: NodeHandle) -> Result<Mat4> {
        self.node_checked(handle)?;
        Ok(transform_system::chain_world_matrix(&self.nodes, handle))
    }

    /// Full-tree world transform pass. Returns the number of nodes visited.
    pub fn update_world_transforms(&mut self) -> usize {
        transform_system::update_hierarchy(&mut self.nodes, &self.roots)
    }

    /// Depth-first pre-order walk of `root` and its descendants.
    #[must_use]
    pub fn subtree(&self, root: NodeHandle) -> SubtreeIter<'_> {
        let stack = if self.nodes.contains_key(root) {
            vec![root]
        } else {
            Vec::new()
        };
        SubtreeIter {
            nodes: &self.nodes,
            stack,
        }
    }

    /// Every node of the scene, depth-first pre-order from each root in turn.
    pub fn iter_preorder(&self) -> impl Iterator<Item = NodeHandle> + '_ {
        self.roots.iter().flat_map(move |&r| self.subtree(r))
    }

    /// First node named `name` in pre-order.
    #[must_use]
    pub fn find_node_by_name(&self, name: &str) -> Option<NodeHandle> {
        self.iter_preorder().find(|&h| self.nodes[h].name == name)
    }

    /// Removes `handle` and its whole subtree. Lights owned by removed nodes
    /// lose their owner; component data itself stays in the tables.
    pub fn remove_node(&mut self, handle: NodeHandle) -> Result<usize> {
        self.node_checked(handle)?;
        self.detach(handle);

        let doomed: Vec<NodeHandle> = self.subtree(handle).collect();
        for &h in &doomed {
            if let Some(node) = self.nodes.remove(h) {
                for component in &node.components {
                    if let Component::Light(key) = *component
                        && let Some(light) = self.lights.get_mut(key)
                        && light.owner == Some(h)
                    {
                        light.owner = None;
                    }
                }
            }
        }
        log::debug!("removed {} node(s) from scene", doomed.len());
        Ok(doomed.len())
    }

    // ========================================================================
    // Components
    // ========================================================================

    fn component_exists(&self, component: Component) -> bool {
        match component {
            Component::Light(k) => self.lights.contains_key(k),
            Component::Renderable(k) => self.renderables.contains_key(k),
            Component::Camera(k) => self.cameras.contains_key(k),
            Component::Override(k) => self.overrides.contains_key(k),
        }
    }

    /// Attaches a component to a node. Returns `Ok(false)` if this node
    /// already holds the same component.
    ///
    /// A light has exactly one owner: attaching it elsewhere moves it.
    pub fn add_component(&mut self, handle: NodeHandle, component: Component) -> Result<bool> {
        self.node_checked(handle)?;
        if !self.component_exists(component) {
            return Err(RenderError::InvalidReference(format!(
                "component {component:?} is not in the scene tables"
            )));
        }
        if self.nodes[handle].has_component(component) {
            return Ok(false);
        }

        if let Component::Light(key) = component {
            let previous = self.lights[key].owner.replace(handle);
            if let Some(prev) = previous
                && let Some(node) = self.nodes.get_mut(prev)
            {
                node.components.retain(|c| *c != component);
            }
        }

        self.nodes[handle].components.push(component);
        Ok(true)
    }

    /// Detaches a component from a node. Returns `Ok(false)` if the node did
    /// not hold it.
    pub fn remove_component(&mut self, handle: NodeHandle, component: Component) -> Result<bool> {
        let node = self
            .nodes
            .get_mut(handle)
            .ok_or_else(|| RenderError::InvalidReference(format!("node {handle:?}")))?;
        let before = node.components.len();
        node.components.retain(|c| *c != component);
        if node.components.len() == before {
            return Ok(false);
        }

        if let Component::Light(key) = component
            && let Some(light) = self.lights.get_mut(key)
            && light.owner == Some(handle)
        {
            light.owner = None;
        }
        Ok(true)
    }

    pub fn add_light(&mut self, handle: NodeHandle, light: Light) -> Result<LightKey> {
        self.node_checked(handle)?;
        let key = self.lights.insert(light);
        self.add_component(handle, Component::Light(key))?;
        Ok(key)
    }

    pub fn add_camera(&mut self, handle: NodeHandle, camera: Camera) -> Result<CameraKey> {
        self.node_checked(handle)?;
        let key = self.cameras.insert(camera);
        self.add_component(handle, Component::Camera(key))?;
        Ok(key)
    }

    pub fn add_geometry(&mut self, geometry: Geometry) -> GeometryKey {
        self.geometries.insert(geometry)
    }

    pub fn add_material(&mut self, material: Material) -> MaterialKey {
        self.materials.insert(material)
    }

    /// Attaches a renderable drawing `geometry` with `material`.
    pub fn add_mesh(
        &mut self,
        handle: NodeHandle,
        geometry: GeometryKey,
        material: MaterialKey,
    ) -> Result<RenderableKey> {
        self.node_checked(handle)?;
        if !self.geometries.contains_key(geometry) {
            return Err(RenderError::InvalidReference(format!(
                "geometry {geometry:?}"
            )));
        }
        if !self.materials.contains_key(material) {
            return Err(RenderError::InvalidReference(format!(
                "material {material:?}"
            )));
        }
        let key = self.renderables.insert(Renderable::new(geometry, material));
        self.add_component(handle, Component::Renderable(key))?;
        Ok(key)
    }

    pub fn add_override(
        &mut self,
        handle: NodeHandle,
        renderer_override: RendererOverride,
    ) -> Result<OverrideKey> {
        self.node_checked(handle)?;
        let key = self.overrides.insert(renderer_override);
        self.add_component(handle, Component::Override(key))?;
        Ok(key)
    }

    /// First camera attached to `handle`.
    #[must_use]
    pub fn camera_of(&self, handle: NodeHandle) -> Option<CameraKey> {
        self.nodes.get(handle)?.components.iter().find_map(|c| match c {
            Component::Camera(k) => Some(*k),
            _ => None,
        })
    }

    /// Cached world matrix of the node owning `key`.
    pub fn light_world_matrix(&self, key: LightKey) -> Result<Mat4> {
        let light = self
            .lights
            .get(key)
            .ok_or_else(|| RenderError::InvalidReference(format!("light {key:?}")))?;
        let owner = light.owner.ok_or_else(|| {
            RenderError::InvalidReference(format!("light {key:?} is not attached to a node"))
        })?;
        Ok(self.node_checked(owner)?.world.matrix)
    }
}

/// Pre-order iterator over a subtree. See [`Scene::subtree`].
pub struct SubtreeIter<'a> {
    nodes: &'a SlotMap<NodeHandle, Node>,
    stack: Vec<NodeHandle>,
}

impl Iterator for SubtreeIter<'_> {
    type Item = NodeHandle;

    fn next(&mut self) -> Option<NodeHandle> {
        let handle = self.stack.pop()?;
        if let Some(node) = self.nodes.get(handle) {
            self.stack.extend(node.children.iter().rev().copied());
        }
        Some(handle)
    }
}
