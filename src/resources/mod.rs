//! Resource Handle Layer
//!
//! CPU-side wrappers paired 1:1 with backend objects:
//! - Buffer: index and vertex attribute buffers
//! - Texture: sampled images, plus the external image decoder seam
//! - RenderTarget: framebuffers with color/depth attachments
//! - Geometry: attribute streams and indices of a mesh
//! - Skinning: per-vertex bone influences
//!
//! Every wrapper releases its backend object exactly once, on `destroy()` or
//! on drop.

pub mod buffer;
pub mod geometry;
pub mod render_target;
pub mod skinning;
pub mod texture;

pub use buffer::{AttributeBuffer, IndexBuffer, IndexElement};
pub use geometry::{Attribute, BoundingBox, Geometry, VertexAttribute};
pub use render_target::{
    ColorAttachment, DepthAttachment, MAX_RENDER_TARGET_OUTPUT_TARGETS, RenderTarget,
    RenderTargetDescriptor, RenderTargetKind,
};
pub use skinning::{MAX_BONE_INFLUENCES, VertexBoneInfluences, VertexBoneMap};
pub use texture::{ImageDecoder, RawImage, Texture};
