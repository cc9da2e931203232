//! Lumina
//!
//! A scene-graph rendering core over a pluggable graphics backend:
//!
//! - [`scene`]: node tree, world-transform propagation and component tables
//! - [`shader`]: template storage with `#include` / `@param` resolution and
//!   hash-deduplicated programs
//! - [`material`]: shader template + program + resolved variable locations
//! - [`light`]: ambient, IBL, directional (cascaded shadows) and point (cube
//!   shadows) lights, packed per frame into a [`light::LightPack`]
//! - [`resources`]: buffers, textures, render targets and geometry, each
//!   owning exactly one backend object
//! - [`renderer`]: per-frame extraction, shadow passes and the main pass
//! - [`backend`]: the graphics API contract and an in-memory implementation

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

pub mod backend;
pub mod errors;
pub mod light;
pub mod material;
pub mod renderer;
pub mod resources;
pub mod scene;
pub mod settings;
pub mod shader;

pub use backend::{BackendRef, GraphicsBackend, HeadlessBackend};
pub use errors::{RenderError, Result};
pub use light::{Light, LightKind, LightPack, ShadowSoftness};
pub use material::{Material, MaterialKind};
pub use renderer::{FrameStats, Renderer};
pub use resources::{Geometry, IndexBuffer, RenderTarget, RenderTargetDescriptor, Texture};
pub use scene::{Camera, Node, NodeHandle, Scene, Transform};
pub use settings::RendererSettings;
pub use shader::{ShaderManager, ShaderProgram};
