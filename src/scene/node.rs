use smallvec::SmallVec;

use crate::scene::NodeHandle;
use crate::scene::components::Component;
use crate::scene::transform::Transform;

/// A scene-graph node.
///
/// # Hierarchy
///
/// - `parent`: non-owning handle to the parent (None for root nodes)
/// - `children`: ordered child handles; the parent owns its children
///
/// Both are kept in sync by [`Scene`](super::Scene); there are no public
/// setters.
///
/// # Transform
///
/// `local` is relative to the parent. `world` is the cached product of every
/// ancestor's local matrix with `local`, refreshed by the transform system.
#[derive(Debug, Clone)]
pub struct Node {
    id: u64,
    pub name: String,
    pub active: bool,
    pub is_static: bool,

    pub(crate) parent: Option<NodeHandle>,
    pub(crate) children: Vec<NodeHandle>,
    pub(crate) components: SmallVec<[Component; 4]>,

    pub local: Transform,
    pub(crate) world: Transform,
}

impl Node {
    pub(crate) fn new(id: u64, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            active: true,
            is_static: false,
            parent: None,
            children: Vec::new(),
            components: SmallVec::new(),
            local: Transform::IDENTITY,
            world: Transform::IDENTITY,
        }
    }

    /// Identity unique within the owning scene, increasing in creation order.
    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn parent(&self) -> Option<NodeHandle> {
        self.parent
    }

    #[inline]
    #[must_use]
    pub fn children(&self) -> &[NodeHandle] {
        &self.children
    }

    #[inline]
    #[must_use]
    pub fn components(&self) -> &[Component] {
        &self.components
    }

    /// World transform as of the last traversal.
    #[inline]
    #[must_use]
    pub fn world(&self) -> &Transform {
        &self.world
    }

    #[inline]
    #[must_use]
    pub fn has_component(&self, component: Component) -> bool {
        self.components.contains(&component)
    }
}
