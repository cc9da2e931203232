//! Graphics Backend Contract
//!
//! The rendering core never talks to a graphics API directly. Every backend
//! object (buffer, texture, renderbuffer, framebuffer, shader stage, program)
//! is created and destroyed through [`GraphicsBackend`], and the core's
//! resource wrappers own the returned handles.
//!
//! Handles are non-zero ids. A backend that fails to create an object returns
//! [`RenderError::Allocation`](crate::errors::RenderError::Allocation) instead
//! of a null handle.
//!
//! [`HeadlessBackend`] is an in-memory implementation that records every call.
//! It is used by the test suite and by tools that only need the CPU side of
//! the pipeline.

pub mod headless;
pub mod types;

use std::rc::Rc;

pub use headless::{HeadlessBackend, HeadlessStats};
pub use types::{
    AttachmentRef, AttributeLayout, BackendTag, BufferId, BufferKind, BufferUsage, CubeFace,
    DataType, FramebufferId, IndexType, Location, ProgramId, RenderbufferDescriptor,
    RenderbufferId, ShaderId, ShaderStage, TextureDescriptor, TextureFormat, TextureId,
    TextureKind, UniformValue, Viewport,
};

use crate::errors::Result;

/// Shared, single-threaded handle to the active backend.
pub type BackendRef = Rc<dyn GraphicsBackend>;

/// The contract between the rendering core and a graphics API.
///
/// All methods take `&self`; implementations keep their own interior state.
/// Destroying an unknown handle must not panic.
pub trait GraphicsBackend {
    /// Identity of this backend implementation.
    fn tag(&self) -> BackendTag;

    // ========================================================================
    // Buffers
    // ========================================================================

    fn create_buffer(&self, size_bytes: usize, kind: BufferKind) -> Result<BufferId>;

    fn upload_buffer_data(&self, buffer: BufferId, bytes: &[u8], usage: BufferUsage);

    fn destroy_buffer(&self, buffer: BufferId);

    /// Binds `buffer` as the source of the vertex input at `location`.
    fn bind_vertex_attribute(&self, buffer: BufferId, location: Location, layout: AttributeLayout);

    // ========================================================================
    // Textures & Framebuffers
    // ========================================================================

    fn create_texture(&self, desc: &TextureDescriptor) -> Result<TextureId>;

    /// Uploads the pixels of one mip level (and one face for cube textures).
    fn upload_texture_data(
        &self,
        texture: TextureId,
        face: Option<CubeFace>,
        mip_level: u32,
        bytes: &[u8],
    );

    fn destroy_texture(&self, texture: TextureId);

    fn create_renderbuffer(&self, desc: &RenderbufferDescriptor) -> Result<RenderbufferId>;

    fn destroy_renderbuffer(&self, renderbuffer: RenderbufferId);

    fn create_framebuffer(&self) -> Result<FramebufferId>;

    fn destroy_framebuffer(&self, framebuffer: FramebufferId);

    /// Attaches a color target to output `slot` of `framebuffer`.
    fn attach_color(&self, framebuffer: FramebufferId, slot: u32, attachment: AttachmentRef);

    /// Attaches the depth target. `with_stencil` is set for combined
    /// depth-stencil renderbuffers.
    fn attach_depth(&self, framebuffer: FramebufferId, attachment: AttachmentRef, with_stencil: bool);

    /// Clears output `slot` of `framebuffer`.
    fn detach_color(&self, framebuffer: FramebufferId, slot: u32);

    fn detach_depth(&self, framebuffer: FramebufferId);

    /// Makes `framebuffer` (or the default framebuffer for `None`) the current
    /// destination and sets the viewport.
    fn bind_framebuffer(&self, framebuffer: Option<FramebufferId>, viewport: Viewport);

    fn clear(&self, color: Option<[f32; 4]>, depth: bool);

    // ========================================================================
    // Shaders
    // ========================================================================

    /// Compiles one stage. Fails with `RenderError::Compile` carrying the
    /// backend log.
    fn compile_shader_stage(&self, stage: ShaderStage, source: &str) -> Result<ShaderId>;

    fn destroy_shader_stage(&self, shader: ShaderId);

    /// Links compiled stages. Fails with `RenderError::Link` carrying the
    /// backend log.
    fn link_program(&self, stages: &[ShaderId]) -> Result<ProgramId>;

    fn destroy_program(&self, program: ProgramId);

    fn use_program(&self, program: ProgramId);

    /// `None` when the program has no active uniform of that name.
    fn get_uniform_location(&self, program: ProgramId, name: &str) -> Option<Location>;

    /// `None` when the program has no active vertex input of that name.
    fn get_attribute_location(&self, program: ProgramId, name: &str) -> Option<Location>;

    /// Writes a uniform of the program currently in use.
    fn set_uniform(&self, location: Location, value: &UniformValue);

    fn bind_texture(&self, unit: u32, texture: TextureId, kind: TextureKind);

    // ========================================================================
    // Drawing
    // ========================================================================

    fn draw_indexed(&self, index_buffer: BufferId, index_type: IndexType, count: u32);
}
