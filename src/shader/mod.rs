//! Shader Templates and Programs
//!
//! - [`ShaderManager`]: named, per-stage source storage with `#include` and
//!   `@param` resolution
//! - [`library`]: built-in sources embedded at compile time
//! - [`ShaderProgram`] / [`ProgramCache`]: linked backend programs,
//!   deduplicated by source hash

pub mod library;
pub mod program;
pub mod template;

pub use program::{ProgramCache, ProgramSources, ShaderProgram};
pub use template::{DEFAULT_MAX_INCLUDE_DEPTH, NO_PARAMS, ShaderManager, UNRESOLVED_MARKER};
