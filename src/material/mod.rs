//! Materials
//!
//! A [`Material`] binds a shader template to a compiled program and caches
//! the backend locations of its semantic variables after a successful build.
//! Values are staged on the CPU and pushed with
//! [`Material::send_custom_uniforms_to_shader`].

#[allow(clippy::module_inception)]
pub mod material;
pub mod variables;

pub use material::{
    BuildContext, Material, MaterialFeatures, MaterialKind, MaterialSettings, MaterialValues,
};
pub use variables::{LocationEntry, LocationTable, VariableDecl, VariableKind};
