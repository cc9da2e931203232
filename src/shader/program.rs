use std::rc::{Rc, Weak};

use rustc_hash::FxHashMap;
use xxhash_rust::xxh3::xxh3_128;

use crate::backend::{BackendRef, Location, ProgramId, ShaderId, ShaderStage};
use crate::errors::{RenderError, Result};

/// Final, fully resolved sources of one program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramSources {
    pub vertex: String,
    pub geometry: Option<String>,
    pub fragment: String,
}

impl ProgramSources {
    /// xxh3-128 of the three sources. Stage boundaries are part of the hash.
    #[must_use]
    pub fn hash(&self) -> u128 {
        let geometry = self.geometry.as_deref().unwrap_or("");
        let mut joined =
            String::with_capacity(self.vertex.len() + geometry.len() + self.fragment.len() + 8);
        joined.push_str(&self.vertex);
        joined.push_str("\0geom\0");
        joined.push_str(geometry);
        joined.push('\0');
        joined.push_str(&self.fragment);
        xxh3_128(joined.as_bytes())
    }
}

/// Owner of one linked backend program.
pub struct ShaderProgram {
    backend: BackendRef,
    handle: Option<ProgramId>,
    label: String,
    hash: u128,
}

impl std::fmt::Debug for ShaderProgram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShaderProgram")
            .field("label", &self.label)
            .field("handle", &self.handle)
            .field("hash", &format_args!("{:032x}", self.hash))
            .finish()
    }
}

impl ShaderProgram {
    /// Compiles every stage and links them. Intermediate stage objects are
    /// released whether or not linking succeeds.
    pub fn build(backend: &BackendRef, label: &str, sources: &ProgramSources) -> Result<Self> {
        let mut stages: Vec<(ShaderStage, &str)> = vec![(ShaderStage::Vertex, sources.vertex.as_str())];
        if let Some(geometry) = &sources.geometry {
            stages.push((ShaderStage::Geometry, geometry.as_str()));
        }
        stages.push((ShaderStage::Fragment, sources.fragment.as_str()));

        let mut compiled: Vec<ShaderId> = Vec::with_capacity(stages.len());
        let mut result = Ok(());
        for (stage, source) in stages {
            match backend.compile_shader_stage(stage, source) {
                Ok(id) => compiled.push(id),
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }

        let linked = result.and_then(|()| backend.link_program(&compiled));
        for id in compiled {
            backend.destroy_shader_stage(id);
        }
        let handle = linked?;

        log::debug!("ShaderProgram {label:?} linked (program {})", handle.raw());
        Ok(Self {
            backend: backend.clone(),
            handle: Some(handle),
            label: label.to_string(),
            hash: sources.hash(),
        })
    }

    fn program(&self) -> Result<ProgramId> {
        self.handle.ok_or_else(|| {
            RenderError::InvalidReference(format!("program {:?} was destroyed", self.label))
        })
    }

    pub fn use_program(&self) -> Result<()> {
        self.backend.use_program(self.program()?);
        Ok(())
    }

    #[must_use]
    pub fn uniform_location(&self, name: &str) -> Option<Location> {
        self.handle
            .and_then(|p| self.backend.get_uniform_location(p, name))
    }

    #[must_use]
    pub fn attribute_location(&self, name: &str) -> Option<Location> {
        self.handle
            .and_then(|p| self.backend.get_attribute_location(p, name))
    }

    #[must_use]
    pub fn backend(&self) -> &BackendRef {
        &self.backend
    }

    #[must_use]
    pub fn handle(&self) -> Option<ProgramId> {
        self.handle
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub fn source_hash(&self) -> u128 {
        self.hash
    }
}

impl Drop for ShaderProgram {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            log::debug!("ShaderProgram {:?} destroyed", self.label);
            self.backend.destroy_program(handle);
        }
    }
}

// ─── ProgramCache ─────────────────────────────────────────────────────────────

/// Deduplicates linked programs by the xxh3-128 of their final sources.
///
/// The cache holds weak references only; a program is destroyed when the last
/// material using it is dropped.
#[derive(Debug, Default)]
pub struct ProgramCache {
    programs: FxHashMap<u128, Weak<ShaderProgram>>,
}

impl ProgramCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the live program built from identical sources, or builds one.
    pub fn get_or_build(
        &mut self,
        backend: &BackendRef,
        label: &str,
        sources: &ProgramSources,
    ) -> Result<Rc<ShaderProgram>> {
        let hash = sources.hash();
        if let Some(program) = self.programs.get(&hash).and_then(Weak::upgrade) {
            return Ok(program);
        }
        let program = Rc::new(ShaderProgram::build(backend, label, sources)?);
        self.programs.insert(hash, Rc::downgrade(&program));
        Ok(program)
    }

    /// Forgets entries whose program has been destroyed.
    pub fn purge(&mut self) {
        self.programs.retain(|_, p| p.strong_count() > 0);
    }

    /// Number of live cached programs.
    #[must_use]
    pub fn program_count(&self) -> usize {
        self.programs.values().filter(|p| p.strong_count() > 0).count()
    }
}
