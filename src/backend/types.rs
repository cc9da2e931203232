//! Value types exchanged across the backend contract.

use glam::{Mat3, Mat4, Vec2, Vec3, Vec4};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;

macro_rules! backend_handle {
    ($($(#[$meta:meta])* $name:ident;)*) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
            pub struct $name(NonZeroU32);

            impl $name {
                /// Wraps a raw backend id. Zero is the "no object" sentinel and yields `None`.
                #[inline]
                #[must_use]
                pub fn new(raw: u32) -> Option<Self> {
                    NonZeroU32::new(raw).map(Self)
                }

                /// The raw backend id.
                #[inline]
                #[must_use]
                pub fn raw(self) -> u32 {
                    self.0.get()
                }
            }
        )*
    };
}

backend_handle! {
    /// Backend buffer object.
    BufferId;
    /// Backend texture object.
    TextureId;
    /// Backend renderbuffer object.
    RenderbufferId;
    /// Backend framebuffer object.
    FramebufferId;
    /// Backend shader-stage object.
    ShaderId;
    /// Backend program object.
    ProgramId;
}

/// Identifies a backend implementation. Objects record the tag of the backend
/// that created them and are only activated on a backend with the same tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BackendTag(pub &'static str);

/// A resolved attribute or uniform location inside one program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Location(pub u32);

impl Location {
    /// Location of element `offset` of an array uniform.
    #[inline]
    #[must_use]
    pub fn offset(self, offset: usize) -> Self {
        Self(self.0 + offset as u32)
    }
}

// ============================================================================
// Shaders
// ============================================================================

/// Shader stage. `Base` is the stage-independent source shared by all stages
/// of a template entry; it is never compiled directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShaderStage {
    Vertex,
    Geometry,
    Fragment,
    Base,
}

impl ShaderStage {
    /// All stages, in storage order.
    pub const ALL: [ShaderStage; 4] = [
        ShaderStage::Vertex,
        ShaderStage::Geometry,
        ShaderStage::Fragment,
        ShaderStage::Base,
    ];

    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        match self {
            Self::Vertex => 0,
            Self::Geometry => 1,
            Self::Fragment => 2,
            Self::Base => 3,
        }
    }

    /// Whether a backend can compile this stage.
    #[inline]
    #[must_use]
    pub fn is_compilable(self) -> bool {
        !matches!(self, Self::Base)
    }

    /// File-name suffix used by the embedded shader library.
    #[must_use]
    pub fn file_suffix(self) -> &'static str {
        match self {
            Self::Vertex => "vert",
            Self::Geometry => "geom",
            Self::Fragment => "frag",
            Self::Base => "glsl",
        }
    }
}

/// A value pushed to a uniform location.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Int(i32),
    Float(f32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat3(Mat3),
    Mat4(Mat4),
}

// ============================================================================
// Buffers
// ============================================================================

/// What a buffer is bound as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKind {
    Vertex,
    Index,
}

/// Upload frequency hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BufferUsage {
    #[default]
    Static,
    Dynamic,
    Stream,
}

/// Component type of vertex data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    F32,
    U8,
    U16,
    U32,
    I32,
}

impl DataType {
    #[must_use]
    pub fn size_bytes(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::U16 => 2,
            Self::F32 | Self::U32 | Self::I32 => 4,
        }
    }
}

/// Layout of one vertex attribute inside its buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttributeLayout {
    pub components: u8,
    pub data_type: DataType,
    pub normalize: bool,
    /// Byte stride between consecutive elements; `0` means tightly packed.
    pub stride: u32,
}

impl AttributeLayout {
    #[must_use]
    pub fn float(components: u8) -> Self {
        Self {
            components,
            data_type: DataType::F32,
            normalize: false,
            stride: 0,
        }
    }

    /// Byte size of one element.
    #[must_use]
    pub fn element_size(&self) -> usize {
        self.components as usize * self.data_type.size_bytes()
    }
}

/// Index element width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexType {
    U16,
    U32,
}

// ============================================================================
// Textures & Attachments
// ============================================================================

/// Texel formats understood by the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextureFormat {
    R8,
    Rg8,
    Rgba8,
    Rgba8Srgb,
    R16Float,
    Rgba16Float,
    R32Float,
    Rgba32Float,
    Depth16,
    Depth24,
    Depth32Float,
    Depth24Stencil8,
}

impl TextureFormat {
    /// 16- or 32-bit-per-channel floating point color format.
    #[must_use]
    pub fn is_float(self) -> bool {
        matches!(
            self,
            Self::R16Float | Self::Rgba16Float | Self::R32Float | Self::Rgba32Float
        )
    }

    #[must_use]
    pub fn is_depth(self) -> bool {
        matches!(
            self,
            Self::Depth16 | Self::Depth24 | Self::Depth32Float | Self::Depth24Stencil8
        )
    }

    #[must_use]
    pub fn has_stencil(self) -> bool {
        matches!(self, Self::Depth24Stencil8)
    }

    #[must_use]
    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            Self::R8 => 1,
            Self::Rg8 | Self::Depth16 | Self::R16Float => 2,
            Self::Depth24 => 3,
            Self::Rgba8
            | Self::Rgba8Srgb
            | Self::R32Float
            | Self::Depth32Float
            | Self::Depth24Stencil8 => 4,
            Self::Rgba16Float => 8,
            Self::Rgba32Float => 16,
        }
    }
}

/// Texture dimensionality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureKind {
    #[default]
    D2,
    Cube,
}

/// One face of a cube texture, in the conventional +X, -X, +Y, -Y, +Z, -Z order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CubeFace {
    PositiveX,
    NegativeX,
    PositiveY,
    NegativeY,
    PositiveZ,
    NegativeZ,
}

impl CubeFace {
    pub const ALL: [CubeFace; 6] = [
        CubeFace::PositiveX,
        CubeFace::NegativeX,
        CubeFace::PositiveY,
        CubeFace::NegativeY,
        CubeFace::PositiveZ,
        CubeFace::NegativeZ,
    ];

    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Look direction and up vector used to render this face.
    #[must_use]
    pub fn view_basis(self) -> (Vec3, Vec3) {
        match self {
            Self::PositiveX => (Vec3::X, Vec3::NEG_Y),
            Self::NegativeX => (Vec3::NEG_X, Vec3::NEG_Y),
            Self::PositiveY => (Vec3::Y, Vec3::Z),
            Self::NegativeY => (Vec3::NEG_Y, Vec3::NEG_Z),
            Self::PositiveZ => (Vec3::Z, Vec3::NEG_Y),
            Self::NegativeZ => (Vec3::NEG_Z, Vec3::NEG_Y),
        }
    }
}

/// Creation parameters of a texture.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureDescriptor {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub kind: TextureKind,
    pub mip_levels: u32,
}

impl TextureDescriptor {
    #[must_use]
    pub fn new_2d(label: &str, width: u32, height: u32, format: TextureFormat) -> Self {
        Self {
            label: label.to_string(),
            width,
            height,
            format,
            kind: TextureKind::D2,
            mip_levels: 1,
        }
    }

    #[must_use]
    pub fn new_cube(label: &str, size: u32, format: TextureFormat) -> Self {
        Self {
            label: label.to_string(),
            width: size,
            height: size,
            format,
            kind: TextureKind::Cube,
            mip_levels: 1,
        }
    }

    #[must_use]
    pub fn with_mip_levels(mut self, mip_levels: u32) -> Self {
        self.mip_levels = mip_levels.max(1);
        self
    }
}

/// Creation parameters of a renderbuffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderbufferDescriptor {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
}

/// What gets attached to a framebuffer slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentRef {
    Texture { texture: TextureId, mip_level: u32 },
    CubeFace { texture: TextureId, face: CubeFace, mip_level: u32 },
    Renderbuffer(RenderbufferId),
}

/// Pixel rectangle rendered into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Viewport {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    #[must_use]
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    #[must_use]
    pub fn from_size(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }
}
