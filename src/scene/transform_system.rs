//! Transform System
//!
//! World-matrix propagation over the node tree. Only the node table and the
//! root list are borrowed, so callers can hold other scene tables at the same
//! time.

use glam::Mat4;
use slotmap::SlotMap;

use crate::scene::NodeHandle;
use crate::scene::node::Node;

/// Recomputes `world = parent_world * local` for every node reachable from
/// `roots`, depth-first pre-order.
///
/// Uses an explicit stack, so deep hierarchies cannot overflow the call stack.
/// Returns the number of nodes visited.
pub fn update_hierarchy(nodes: &mut SlotMap<NodeHandle, Node>, roots: &[NodeHandle]) -> usize {
    // (node, parent world matrix)
    let mut stack: Vec<(NodeHandle, Mat4)> = Vec::with_capacity(64);
    for &root in roots.iter().rev() {
        stack.push((root, Mat4::IDENTITY));
    }

    let mut visited = 0;
    while let Some((handle, parent_world)) = stack.pop() {
        let Some(node) = nodes.get_mut(handle) else {
            log::warn!("transform update skipped a dangling node handle {handle:?}");
            continue;
        };
        visited += 1;

        let world = parent_world * node.local.matrix;
        node.world.matrix = world;

        // reverse push keeps children in declaration order
        for &child in node.children.iter().rev() {
            stack.push((child, world));
        }
    }
    visited
}

/// Updates `root` and its subtree using the parent's cached world matrix.
pub fn update_subtree(nodes: &mut SlotMap<NodeHandle, Node>, root: NodeHandle) -> usize {
    let parent_world = nodes
        .get(root)
        .and_then(|n| n.parent)
        .and_then(|p| nodes.get(p))
        .map_or(Mat4::IDENTITY, |p| p.world.matrix);

    let mut stack = vec![(root, parent_world)];
    let mut visited = 0;
    while let Some((handle, parent_world)) = stack.pop() {
        let Some(node) = nodes.get_mut(handle) else {
            continue;
        };
        visited += 1;
        let world = parent_world * node.local.matrix;
        node.world.matrix = world;
        for &child in node.children.iter().rev() {
            stack.push((child, world));
        }
    }
    visited
}

/// Fresh world matrix of one node, computed from the ancestor chain without
/// touching any cache.
#[must_use]
pub fn chain_world_matrix(nodes: &SlotMap<NodeHandle, Node>, handle: NodeHandle) -> Mat4 {
    let mut world = Mat4::IDENTITY;
    let mut current = Some(handle);
    while let Some(h) = current {
        let Some(node) = nodes.get(h) else {
            break;
        };
        world = node.local.matrix * world;
        current = node.parent;
    }
    world
}
