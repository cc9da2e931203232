//! Render Targets
//!
//! A [`RenderTarget`] owns one backend framebuffer plus its attachments:
//! up to [`MAX_RENDER_TARGET_OUTPUT_TARGETS`] color textures and at most one
//! depth attachment. 2D and cube targets share the same struct and differ
//! only in [`RenderTargetKind`].
//!
//! Attachment backing follows a fixed rule:
//! - color is always a texture
//! - depth without stencil is a texture (so it can be sampled, e.g. shadow maps)
//! - depth with stencil is one combined renderbuffer, never separate textures

use std::rc::Rc;

use crate::backend::{
    AttachmentRef, BackendRef, BackendTag, CubeFace, FramebufferId, RenderbufferDescriptor,
    RenderbufferId, TextureDescriptor, TextureFormat, TextureId, TextureKind, Viewport,
};
use crate::errors::{RenderError, Result};
use crate::resources::texture::Texture;

/// Maximum number of color outputs of one render target.
pub const MAX_RENDER_TARGET_OUTPUT_TARGETS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RenderTargetKind {
    #[default]
    TwoD,
    Cube,
}

impl RenderTargetKind {
    #[must_use]
    pub fn texture_kind(self) -> TextureKind {
        match self {
            Self::TwoD => TextureKind::D2,
            Self::Cube => TextureKind::Cube,
        }
    }
}

/// Creation parameters of a [`RenderTarget`].
#[derive(Debug, Clone, PartialEq)]
pub struct RenderTargetDescriptor {
    pub label: String,
    pub kind: RenderTargetKind,
    pub width: u32,
    pub height: u32,
    pub has_color: bool,
    pub has_depth: bool,
    pub enable_stencil: bool,
    pub color_format: TextureFormat,
    pub depth_format: TextureFormat,
    pub mip_levels: u32,
}

impl RenderTargetDescriptor {
    /// A 2D target with one RGBA8 color attachment and a depth texture.
    #[must_use]
    pub fn new_2d(label: &str, width: u32, height: u32) -> Self {
        Self {
            label: label.to_string(),
            kind: RenderTargetKind::TwoD,
            width,
            height,
            has_color: true,
            has_depth: true,
            enable_stencil: false,
            color_format: TextureFormat::Rgba8,
            depth_format: TextureFormat::Depth24,
            mip_levels: 1,
        }
    }

    /// A cube target with `size` x `size` faces.
    #[must_use]
    pub fn new_cube(label: &str, size: u32) -> Self {
        Self {
            kind: RenderTargetKind::Cube,
            ..Self::new_2d(label, size, size)
        }
    }

    #[must_use]
    pub fn with_color(mut self, has_color: bool) -> Self {
        self.has_color = has_color;
        self
    }

    #[must_use]
    pub fn with_depth(mut self, has_depth: bool) -> Self {
        self.has_depth = has_depth;
        self
    }

    #[must_use]
    pub fn with_stencil(mut self, enable_stencil: bool) -> Self {
        self.enable_stencil = enable_stencil;
        self
    }

    #[must_use]
    pub fn with_color_format(mut self, format: TextureFormat) -> Self {
        self.color_format = format;
        self
    }

    #[must_use]
    pub fn with_depth_format(mut self, format: TextureFormat) -> Self {
        self.depth_format = format;
        self
    }

    #[must_use]
    pub fn with_mip_levels(mut self, mip_levels: u32) -> Self {
        self.mip_levels = mip_levels.max(1);
        self
    }
}

/// A color output and its mip bookkeeping.
#[derive(Debug)]
pub struct ColorAttachment {
    texture: Rc<Texture>,
    current_mip_level: u32,
}

impl ColorAttachment {
    #[must_use]
    pub fn texture(&self) -> &Rc<Texture> {
        &self.texture
    }

    #[must_use]
    pub fn current_mip_level(&self) -> u32 {
        self.current_mip_level
    }

    #[must_use]
    pub fn max_mip_level(&self) -> u32 {
        self.texture.mip_levels().saturating_sub(1)
    }
}

/// The depth output.
#[derive(Debug)]
pub enum DepthAttachment {
    Texture(Rc<Texture>),
    /// Combined depth-stencil storage.
    Renderbuffer {
        handle: RenderbufferId,
        format: TextureFormat,
    },
}

/// Owner of one backend framebuffer and its attachments.
pub struct RenderTarget {
    label: String,
    kind: RenderTargetKind,
    tag: BackendTag,
    backend: BackendRef,
    framebuffer: Option<FramebufferId>,
    width: u32,
    height: u32,
    viewport: Viewport,
    colors: [Option<ColorAttachment>; MAX_RENDER_TARGET_OUTPUT_TARGETS],
    depth: Option<DepthAttachment>,
}

impl std::fmt::Debug for RenderTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderTarget")
            .field("label", &self.label)
            .field("kind", &self.kind)
            .field("tag", &self.tag)
            .field("framebuffer", &self.framebuffer)
            .field("size", &(self.width, self.height))
            .field("viewport", &self.viewport)
            .field("colors", &self.colors)
            .field("depth", &self.depth)
            .finish()
    }
}

impl RenderTarget {
    /// Creates the framebuffer and the attachments requested by `desc`.
    pub fn new(backend: &BackendRef, desc: &RenderTargetDescriptor) -> Result<Self> {
        let framebuffer = backend.create_framebuffer()?;
        let mut target = Self {
            label: desc.label.clone(),
            kind: desc.kind,
            tag: backend.tag(),
            backend: backend.clone(),
            framebuffer: Some(framebuffer),
            width: desc.width,
            height: desc.height,
            viewport: Viewport::from_size(desc.width, desc.height),
            colors: [None, None, None],
            depth: None,
        };

        if desc.has_color {
            target.add_color_texture(desc.color_format, desc.mip_levels)?;
        }
        if desc.has_depth {
            if desc.enable_stencil {
                target.create_depth_stencil_renderbuffer()?;
            } else {
                target.create_depth_texture(desc.depth_format)?;
            }
        }

        log::debug!(
            "RenderTarget {:?} created ({}x{}, {:?}, {} color, depth: {})",
            target.label,
            target.width,
            target.height,
            target.kind,
            target.color_attachment_count(),
            target.depth.is_some()
        );
        Ok(target)
    }

    fn framebuffer(&self) -> Result<FramebufferId> {
        self.framebuffer.ok_or_else(|| {
            RenderError::InvalidReference(format!("render target {:?} was destroyed", self.label))
        })
    }

    fn create_depth_texture(&mut self, format: TextureFormat) -> Result<()> {
        if !format.is_depth() || format.has_stencil() {
            return Err(RenderError::Unsupported(format!(
                "{format:?} is not a depth-only texture format"
            )));
        }
        let texture = Texture::new(&self.backend, self.texture_descriptor("depth", format, 1))?;
        let handle = texture.handle().ok_or_else(|| {
            RenderError::Allocation(format!("depth texture of {:?}", self.label))
        })?;
        let framebuffer = self.framebuffer()?;
        self.backend.attach_depth(framebuffer, self.attachment_for(handle, 0), false);
        self.depth = Some(DepthAttachment::Texture(Rc::new(texture)));
        Ok(())
    }

    fn create_depth_stencil_renderbuffer(&mut self) -> Result<()> {
        let format = TextureFormat::Depth24Stencil8;
        let handle = self.backend.create_renderbuffer(&RenderbufferDescriptor {
            width: self.width,
            height: self.height,
            format,
        })?;
        let framebuffer = self.framebuffer()?;
        self.backend
            .attach_depth(framebuffer, AttachmentRef::Renderbuffer(handle), true);
        self.depth = Some(DepthAttachment::Renderbuffer { handle, format });
        Ok(())
    }

    fn texture_descriptor(&self, suffix: &str, format: TextureFormat, mip_levels: u32) -> TextureDescriptor {
        let label = format!("{}.{suffix}", self.label);
        match self.kind {
            RenderTargetKind::TwoD => TextureDescriptor::new_2d(&label, self.width, self.height, format),
            RenderTargetKind::Cube => TextureDescriptor::new_cube(&label, self.width, format),
        }
        .with_mip_levels(mip_levels)
    }

    fn attachment_for(&self, texture: TextureId, mip_level: u32) -> AttachmentRef {
        match self.kind {
            RenderTargetKind::TwoD => AttachmentRef::Texture { texture, mip_level },
            RenderTargetKind::Cube => AttachmentRef::CubeFace {
                texture,
                face: CubeFace::PositiveX,
                mip_level,
            },
        }
    }

    // ========================================================================
    // Attachments
    // ========================================================================

    /// Adds a color texture in the first free output slot and returns that
    /// slot. Fails with `OutOfRange` when every slot is taken.
    pub fn add_color_texture(&mut self, format: TextureFormat, mip_levels: u32) -> Result<usize> {
        let slot = self
            .colors
            .iter()
            .position(Option::is_none)
            .ok_or(RenderError::OutOfRange {
                context: "render target color attachment",
                index: MAX_RENDER_TARGET_OUTPUT_TARGETS,
                len: MAX_RENDER_TARGET_OUTPUT_TARGETS,
            })?;
        if format.is_depth() {
            return Err(RenderError::Unsupported(format!(
                "{format:?} cannot be used as a color attachment"
            )));
        }

        let texture = Texture::new(
            &self.backend,
            self.texture_descriptor(&format!("color{slot}"), format, mip_levels),
        )?;
        let handle = texture.handle().ok_or_else(|| {
            RenderError::Allocation(format!("color texture of {:?}", self.label))
        })?;
        let framebuffer = self.framebuffer()?;
        self.backend
            .attach_color(framebuffer, slot as u32, self.attachment_for(handle, 0));
        self.colors[slot] = Some(ColorAttachment {
            texture: Rc::new(texture),
            current_mip_level: 0,
        });
        Ok(slot)
    }

    fn color_slot(&self, index: usize) -> Result<&ColorAttachment> {
        if index >= MAX_RENDER_TARGET_OUTPUT_TARGETS {
            return Err(RenderError::OutOfRange {
                context: "render target color attachment",
                index,
                len: MAX_RENDER_TARGET_OUTPUT_TARGETS,
            });
        }
        self.colors[index].as_ref().ok_or(RenderError::OutOfRange {
            context: "render target active color attachment",
            index,
            len: self.color_attachment_count(),
        })
    }

    fn color_slot_mut(&mut self, index: usize) -> Result<&mut ColorAttachment> {
        let len = self.color_attachment_count();
        match self.colors.get_mut(index) {
            Some(Some(attachment)) => Ok(attachment),
            Some(None) => Err(RenderError::OutOfRange {
                context: "render target active color attachment",
                index,
                len,
            }),
            None => Err(RenderError::OutOfRange {
                context: "render target color attachment",
                index,
                len: MAX_RENDER_TARGET_OUTPUT_TARGETS,
            }),
        }
    }

    /// The color texture in output slot `index`.
    pub fn get_color_texture(&self, index: usize) -> Result<&Rc<Texture>> {
        self.color_slot(index).map(ColorAttachment::texture)
    }

    /// The depth texture, if depth is texture-backed.
    #[must_use]
    pub fn depth_texture(&self) -> Option<&Rc<Texture>> {
        match &self.depth {
            Some(DepthAttachment::Texture(texture)) => Some(texture),
            _ => None,
        }
    }

    #[must_use]
    pub fn depth_attachment(&self) -> Option<&DepthAttachment> {
        self.depth.as_ref()
    }

    #[must_use]
    pub fn has_stencil(&self) -> bool {
        matches!(self.depth, Some(DepthAttachment::Renderbuffer { .. }))
    }

    /// Releases the color texture in slot `index`; the slot becomes free.
    pub fn destroy_color_buffer(&mut self, index: usize) -> Result<()> {
        if index >= MAX_RENDER_TARGET_OUTPUT_TARGETS {
            return Err(RenderError::OutOfRange {
                context: "render target color attachment",
                index,
                len: MAX_RENDER_TARGET_OUTPUT_TARGETS,
            });
        }
        if let Some(attachment) = self.colors[index].take() {
            if let Some(framebuffer) = self.framebuffer {
                self.backend.detach_color(framebuffer, index as u32);
            }
            log::debug!("RenderTarget {:?}: color{index} destroyed", self.label);
            drop(attachment);
        }
        Ok(())
    }

    /// Releases the depth attachment, texture or renderbuffer.
    pub fn destroy_depth_buffer(&mut self) {
        if self.depth.is_some()
            && let Some(framebuffer) = self.framebuffer
        {
            self.backend.detach_depth(framebuffer);
        }
        match self.depth.take() {
            Some(DepthAttachment::Renderbuffer { handle, .. }) => {
                self.backend.destroy_renderbuffer(handle);
            }
            Some(DepthAttachment::Texture(texture)) => drop(texture),
            None => {}
        }
    }

    #[must_use]
    pub fn color_attachment_count(&self) -> usize {
        self.colors.iter().filter(|c| c.is_some()).count()
    }

    // ========================================================================
    // Mip levels & viewport
    // ========================================================================

    /// Selects the mip level rendered into for color slot `index`.
    pub fn set_current_mip_level(&mut self, index: usize, level: u32) -> Result<()> {
        let attachment = self.color_slot_mut(index)?;
        let max = attachment.max_mip_level();
        if level > max {
            return Err(RenderError::OutOfRange {
                context: "render target mip level",
                index: level as usize,
                len: max as usize + 1,
            });
        }
        attachment.current_mip_level = level;
        Ok(())
    }

    pub fn current_mip_level(&self, index: usize) -> Result<u32> {
        self.color_slot(index).map(ColorAttachment::current_mip_level)
    }

    pub fn max_mip_level(&self, index: usize) -> Result<u32> {
        self.color_slot(index).map(ColorAttachment::max_mip_level)
    }

    #[must_use]
    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// Overrides the base viewport. It may differ from the attachment size.
    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    /// The base viewport scaled by `1 / 2^level`, truncated to integers.
    #[must_use]
    pub fn get_viewport_for_mip_level(&self, level: u32) -> Viewport {
        let Viewport { x, y, width, height } = self.viewport;
        let scale_i = |v: i32| if level >= 31 { 0 } else { v / (1 << level) };
        let scale_u = |v: u32| v.checked_shr(level).unwrap_or(0);
        Viewport::new(scale_i(x), scale_i(y), scale_u(width), scale_u(height))
    }

    #[must_use]
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[must_use]
    pub fn kind(&self) -> RenderTargetKind {
        self.kind
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub fn backend_tag(&self) -> BackendTag {
        self.tag
    }

    /// True only if there is at least one color attachment and every one of
    /// them has a floating-point format.
    #[must_use]
    pub fn is_hdr_capable(&self) -> bool {
        let mut active = self.colors.iter().flatten().peekable();
        active.peek().is_some() && active.all(|c| c.texture.format().is_float())
    }

    // ========================================================================
    // Activation
    // ========================================================================

    fn check_backend(&self, backend: &BackendRef) -> Result<()> {
        if backend.tag() == self.tag {
            Ok(())
        } else {
            Err(RenderError::Incompatible(format!(
                "render target {:?} belongs to backend {:?}, not {:?}",
                self.label,
                self.tag,
                backend.tag()
            )))
        }
    }

    /// Makes this 2D target the current destination, at the current mip
    /// level of color slot 0.
    pub fn activate(&self, backend: &BackendRef) -> Result<()> {
        match self.kind {
            RenderTargetKind::TwoD => self.bind(backend, None),
            RenderTargetKind::Cube => self.bind(backend, Some(CubeFace::PositiveX)),
        }
    }

    /// Makes one face of this cube target the current destination.
    pub fn activate_face(&self, backend: &BackendRef, face: CubeFace) -> Result<()> {
        if self.kind != RenderTargetKind::Cube {
            return Err(RenderError::Unsupported(format!(
                "render target {:?} is not a cube target",
                self.label
            )));
        }
        self.bind(backend, Some(face))
    }

    fn bind(&self, backend: &BackendRef, face: Option<CubeFace>) -> Result<()> {
        self.check_backend(backend)?;
        let framebuffer = self.framebuffer()?;

        let attach = |texture: TextureId, mip_level: u32| match face {
            Some(face) => AttachmentRef::CubeFace { texture, face, mip_level },
            None => AttachmentRef::Texture { texture, mip_level },
        };

        for (slot, attachment) in self.colors.iter().enumerate() {
            if let Some(attachment) = attachment
                && let Some(handle) = attachment.texture.handle()
            {
                backend.attach_color(framebuffer, slot as u32, attach(handle, attachment.current_mip_level));
            }
        }
        if face.is_some()
            && let Some(DepthAttachment::Texture(depth)) = &self.depth
            && let Some(handle) = depth.handle()
        {
            backend.attach_depth(framebuffer, attach(handle, 0), false);
        }

        let level = self.colors.iter().flatten().next().map_or(0, ColorAttachment::current_mip_level);
        backend.bind_framebuffer(Some(framebuffer), self.get_viewport_for_mip_level(level));
        Ok(())
    }
}

impl Drop for RenderTarget {
    fn drop(&mut self) {
        for slot in &mut self.colors {
            slot.take();
        }
        self.destroy_depth_buffer();
        if let Some(framebuffer) = self.framebuffer.take() {
            log::debug!("RenderTarget {:?} destroyed", self.label);
            self.backend.destroy_framebuffer(framebuffer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HeadlessBackend;

    fn backend() -> BackendRef {
        Rc::new(HeadlessBackend::new())
    }

    #[test]
    fn mip_viewport_truncates() {
        let backend = backend();
        let mut rt = RenderTarget::new(&backend, &RenderTargetDescriptor::new_2d("rt", 100, 75)).unwrap();
        rt.set_viewport(Viewport::new(3, 5, 101, 75));
        assert_eq!(rt.get_viewport_for_mip_level(0), Viewport::new(3, 5, 101, 75));
        assert_eq!(rt.get_viewport_for_mip_level(1), Viewport::new(1, 2, 50, 37));
        assert_eq!(rt.get_viewport_for_mip_level(3), Viewport::new(0, 0, 12, 9));
    }

    #[test]
    fn hdr_requires_every_color_float() {
        let backend = backend();
        let desc = RenderTargetDescriptor::new_2d("hdr", 8, 8).with_color_format(TextureFormat::Rgba16Float);
        let mut rt = RenderTarget::new(&backend, &desc).unwrap();
        assert!(rt.is_hdr_capable());
        rt.add_color_texture(TextureFormat::Rgba8, 1).unwrap();
        assert!(!rt.is_hdr_capable());
        rt.destroy_color_buffer(1).unwrap();
        assert!(rt.is_hdr_capable());
        rt.destroy_color_buffer(0).unwrap();
        assert!(!rt.is_hdr_capable());
    }
}
