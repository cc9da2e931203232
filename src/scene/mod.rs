//! Scene graph
//!
//! - [`Node`]: a tree node with a local and a cached world transform
//! - [`Transform`]: a single 4x4 matrix with compose and invert operations
//! - [`Scene`]: the node tree plus every component table (lights, cameras,
//!   geometries, materials, renderables, overrides)
//! - [`Camera`]: perspective / orthographic projection component
//! - `transform_system`: world-matrix propagation, decoupled from `Scene`

pub mod camera;
pub mod components;
pub mod node;
#[allow(clippy::module_inception)]
pub mod scene;
pub mod transform;
pub mod transform_system;

pub use camera::{Camera, Projection};
pub use components::{Component, CullingMask, Renderable, RendererOverride};
pub use node::Node;
pub use scene::{Scene, SubtreeIter};
pub use transform::Transform;

use slotmap::new_key_type;

new_key_type! {
    pub struct NodeHandle;
    pub struct LightKey;
    pub struct CameraKey;
    pub struct GeometryKey;
    pub struct MaterialKey;
    pub struct RenderableKey;
    pub struct OverrideKey;
}
