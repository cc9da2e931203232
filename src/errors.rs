//! Error Types
//!
//! This module defines the error type used throughout the rendering core.
//!
//! # Overview
//!
//! [`RenderError`] covers every failure mode of the core:
//! - Backend object allocation failures
//! - Shader stage compilation and program link failures (with the backend log)
//! - Out-of-range access into bounded collections
//! - Dangling non-owning references
//! - Shader template lookup and resolution failures
//! - Configuration errors
//!
//! Errors are raised where they are detected and propagated to the caller.
//! A frame that hits one of them is aborted rather than partially rendered.
//!
//! ```rust,ignore
//! use lumina::errors::{RenderError, Result};
//!
//! fn build() -> Result<()> {
//!     Err(RenderError::NotFound("Skybox".into()))
//! }
//! ```

use thiserror::Error;

use crate::backend::ShaderStage;

/// The main error type for the rendering core.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    // ========================================================================
    // Backend Errors
    // ========================================================================
    /// The backend failed to create an object (buffer, texture, framebuffer,
    /// shader or program).
    #[error("Allocation failed: {0}")]
    Allocation(String),

    /// A shader stage failed to compile. `log` is the backend diagnostic, verbatim.
    #[error("Failed to compile {stage:?} shader:\n{log}")]
    Compile {
        /// Stage that failed.
        stage: ShaderStage,
        /// Backend compiler output.
        log: String,
    },

    /// A shader program failed to link. `log` is the backend diagnostic, verbatim.
    #[error("Failed to link shader program:\n{log}")]
    Link {
        /// Backend linker output.
        log: String,
    },

    // ========================================================================
    // Contract Errors
    // ========================================================================
    /// Index or offset past the end of a bounded collection.
    #[error("Index out of range: {context} (index: {index}, len: {len})")]
    OutOfRange {
        /// Description of what was being accessed
        context: &'static str,
        /// The invalid index
        index: usize,
        /// Number of valid entries
        len: usize,
    },

    /// A non-owning reference whose target no longer exists.
    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    /// A shader template name with no registered entry.
    #[error("Shader not found: {0}")]
    NotFound(String),

    /// Shader template resolution failed (include cycle, nesting too deep,
    /// malformed directive).
    #[error("Shader template error: {0}")]
    Template(String),

    /// A material was used before a successful build.
    #[error("Material not ready: {0}")]
    NotReady(String),

    /// Two objects that must agree on layout do not.
    #[error("Incompatible: {0}")]
    Incompatible(String),

    /// The requested operation is not supported for this input.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    // ========================================================================
    // Configuration & Assets
    // ========================================================================
    /// Invalid renderer configuration.
    #[error("Config error: {0}")]
    Config(String),

    /// An external decoder or importer failed.
    #[error("Asset error: {0}")]
    Asset(String),
}

impl From<serde_json::Error> for RenderError {
    fn from(err: serde_json::Error) -> Self {
        RenderError::Config(err.to_string())
    }
}

/// Alias for `Result<T, RenderError>`.
pub type Result<T> = std::result::Result<T, RenderError>;
