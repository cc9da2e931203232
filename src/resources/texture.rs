use std::path::Path;

use uuid::Uuid;

use crate::backend::{BackendRef, CubeFace, TextureDescriptor, TextureFormat, TextureId, TextureKind};
use crate::errors::{RenderError, Result};

/// Decoded pixels handed over by an [`ImageDecoder`].
#[derive(Debug, Clone, PartialEq)]
pub struct RawImage {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub pixels: Vec<u8>,
}

impl RawImage {
    /// A `width` x `height` RGBA8 image filled with `color`.
    #[must_use]
    pub fn solid(width: u32, height: u32, color: [u8; 4]) -> Self {
        let pixels = color
            .iter()
            .copied()
            .cycle()
            .take((width * height * 4) as usize)
            .collect();
        Self {
            width,
            height,
            format: TextureFormat::Rgba8,
            pixels,
        }
    }
}

/// External image decoding. The core only consumes decoded pixels; failures
/// are reported as `RenderError::Asset`.
pub trait ImageDecoder {
    fn decode(&self, path: &Path) -> Result<RawImage>;
}

/// Owner of one backend texture.
pub struct Texture {
    pub uuid: Uuid,
    backend: BackendRef,
    handle: Option<TextureId>,
    desc: TextureDescriptor,
}

impl std::fmt::Debug for Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("uuid", &self.uuid)
            .field("handle", &self.handle)
            .field("desc", &self.desc)
            .finish()
    }
}

impl Texture {
    /// Allocates an empty backend texture.
    pub fn new(backend: &BackendRef, desc: TextureDescriptor) -> Result<Self> {
        let handle = backend.create_texture(&desc)?;
        log::debug!(
            "Texture {:?} created ({}x{}, {:?})",
            desc.label,
            desc.width,
            desc.height,
            desc.format
        );
        Ok(Self {
            uuid: Uuid::new_v4(),
            backend: backend.clone(),
            handle: Some(handle),
            desc,
        })
    }

    /// Creates a 2D texture from decoded pixels.
    pub fn from_image(backend: &BackendRef, name: &str, image: &RawImage) -> Result<Self> {
        let desc = TextureDescriptor::new_2d(name, image.width, image.height, image.format);
        let texture = Self::new(backend, desc)?;
        texture.upload(None, 0, &image.pixels)?;
        Ok(texture)
    }

    /// Decodes `path` with `decoder` and uploads the result.
    pub fn load(backend: &BackendRef, decoder: &dyn ImageDecoder, path: &Path) -> Result<Self> {
        let image = decoder.decode(path)?;
        let name = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
        Self::from_image(backend, &name, &image)
    }

    /// 1x1 texture of a single color.
    pub fn solid_color(backend: &BackendRef, name: &str, color: [u8; 4]) -> Result<Self> {
        Self::from_image(backend, name, &RawImage::solid(1, 1, color))
    }

    /// Uploads one mip level. `face` selects the cube face for cube textures
    /// and must be `None` for 2D textures.
    pub fn upload(&self, face: Option<CubeFace>, mip_level: u32, bytes: &[u8]) -> Result<()> {
        let handle = self.handle.ok_or_else(|| {
            RenderError::InvalidReference(format!("texture {:?} was destroyed", self.desc.label))
        })?;
        if mip_level >= self.desc.mip_levels {
            return Err(RenderError::OutOfRange {
                context: "texture mip level",
                index: mip_level as usize,
                len: self.desc.mip_levels as usize,
            });
        }
        if (self.desc.kind == TextureKind::Cube) != face.is_some() {
            return Err(RenderError::Unsupported(format!(
                "face selection {face:?} does not match {:?} texture {:?}",
                self.desc.kind, self.desc.label
            )));
        }
        let (w, h) = self.mip_size(mip_level);
        let expected = (w * h * self.desc.format.bytes_per_pixel()) as usize;
        if bytes.len() != expected {
            return Err(RenderError::Asset(format!(
                "texture {:?} mip {mip_level}: expected {expected} bytes, got {}",
                self.desc.label,
                bytes.len()
            )));
        }
        self.backend.upload_texture_data(handle, face, mip_level, bytes);
        Ok(())
    }

    /// Binds this texture to sampler `unit`.
    pub fn bind(&self, unit: u32) -> Result<()> {
        let handle = self.handle.ok_or_else(|| {
            RenderError::InvalidReference(format!("texture {:?} was destroyed", self.desc.label))
        })?;
        self.backend.bind_texture(unit, handle, self.desc.kind);
        Ok(())
    }

    /// Releases the backend texture. Calling it again does nothing.
    pub fn destroy(&mut self) {
        if let Some(handle) = self.handle.take() {
            log::debug!("Texture {:?} destroyed", self.desc.label);
            self.backend.destroy_texture(handle);
        }
    }

    #[inline]
    #[must_use]
    pub fn handle(&self) -> Option<TextureId> {
        self.handle
    }

    #[inline]
    #[must_use]
    pub fn descriptor(&self) -> &TextureDescriptor {
        &self.desc
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.desc.label
    }

    #[inline]
    #[must_use]
    pub fn format(&self) -> TextureFormat {
        self.desc.format
    }

    #[inline]
    #[must_use]
    pub fn kind(&self) -> TextureKind {
        self.desc.kind
    }

    #[inline]
    #[must_use]
    pub fn width(&self) -> u32 {
        self.desc.width
    }

    #[inline]
    #[must_use]
    pub fn height(&self) -> u32 {
        self.desc.height
    }

    #[inline]
    #[must_use]
    pub fn mip_levels(&self) -> u32 {
        self.desc.mip_levels
    }

    /// Size of `mip_level`, never smaller than 1x1.
    #[must_use]
    pub fn mip_size(&self, mip_level: u32) -> (u32, u32) {
        (
            self.desc.width.checked_shr(mip_level).unwrap_or(0).max(1),
            self.desc.height.checked_shr(mip_level).unwrap_or(0).max(1),
        )
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        self.destroy();
    }
}
