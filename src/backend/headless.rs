//! Headless backend for testing and offline tooling.
//!
//! This backend doesn't touch a GPU. It hands out sequential non-zero handles,
//! tracks which objects are alive, runs a lightweight syntax check in place of
//! a real shader compiler and records every state change and draw so callers
//! can inspect what a frame would have done.

use std::cell::RefCell;

use rustc_hash::FxHashMap;

use super::GraphicsBackend;
use super::types::{
    AttachmentRef, AttributeLayout, BackendTag, BufferId, BufferKind, BufferUsage, CubeFace,
    FramebufferId, IndexType, Location, ProgramId, RenderbufferDescriptor, RenderbufferId,
    ShaderId, ShaderStage, TextureDescriptor, TextureId, TextureKind, UniformValue, Viewport,
};
use crate::errors::{RenderError, Result};

/// Counters of every create/destroy call seen by a [`HeadlessBackend`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeadlessStats {
    pub buffers_created: u32,
    pub buffers_destroyed: u32,
    pub textures_created: u32,
    pub textures_destroyed: u32,
    pub renderbuffers_created: u32,
    pub renderbuffers_destroyed: u32,
    pub framebuffers_created: u32,
    pub framebuffers_destroyed: u32,
    pub shaders_compiled: u32,
    pub shaders_destroyed: u32,
    pub programs_linked: u32,
    pub programs_destroyed: u32,
    /// Destroy calls on handles that were never created or already released.
    pub invalid_releases: u32,
    pub draw_calls: u32,
    pub clears: u32,
}

/// A recorded `set_uniform` call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UniformWrite {
    pub program: Option<ProgramId>,
    pub location: Location,
    pub value: UniformValue,
}

/// A recorded `draw_indexed` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawRecord {
    pub program: Option<ProgramId>,
    pub framebuffer: Option<FramebufferId>,
    pub index_buffer: BufferId,
    pub index_type: IndexType,
    pub count: u32,
}

/// Attachments currently bound to a headless framebuffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FramebufferRecord {
    pub colors: FxHashMap<u32, AttachmentRef>,
    pub depth: Option<AttachmentRef>,
    pub stencil: bool,
}

#[derive(Debug, Clone)]
struct BufferRecord {
    size: usize,
    kind: BufferKind,
}

#[derive(Debug, Clone)]
struct StageRecord {
    stage: ShaderStage,
    /// `(name, array length)` of every declared uniform.
    uniforms: Vec<(String, u32)>,
    /// Vertex inputs, in declaration order.
    inputs: Vec<(String, u32)>,
}

#[derive(Debug, Clone, Default)]
struct ProgramRecord {
    uniforms: FxHashMap<String, Location>,
    attributes: FxHashMap<String, Location>,
}

#[derive(Debug, Default)]
struct HeadlessState {
    next_id: u32,
    fail_allocations: bool,

    buffers: FxHashMap<BufferId, BufferRecord>,
    textures: FxHashMap<TextureId, TextureDescriptor>,
    renderbuffers: FxHashMap<RenderbufferId, RenderbufferDescriptor>,
    framebuffers: FxHashMap<FramebufferId, FramebufferRecord>,
    shaders: FxHashMap<ShaderId, StageRecord>,
    programs: FxHashMap<ProgramId, ProgramRecord>,

    current_program: Option<ProgramId>,
    bound_framebuffer: Option<FramebufferId>,
    viewport: Viewport,

    uniform_writes: Vec<UniformWrite>,
    texture_binds: Vec<(u32, TextureId, TextureKind)>,
    attribute_binds: Vec<(BufferId, Location)>,
    draws: Vec<DrawRecord>,

    stats: HeadlessStats,
}

impl HeadlessState {
    fn allocate_raw(&mut self, what: &str) -> Result<u32> {
        if self.fail_allocations {
            return Err(RenderError::Allocation(format!(
                "headless backend refused to create {what}"
            )));
        }
        self.next_id += 1;
        Ok(self.next_id)
    }
}

/// In-memory [`GraphicsBackend`].
#[derive(Debug)]
pub struct HeadlessBackend {
    tag: BackendTag,
    state: RefCell<HeadlessState>,
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessBackend {
    pub const TAG: BackendTag = BackendTag("headless");

    #[must_use]
    pub fn new() -> Self {
        Self::with_tag(Self::TAG)
    }

    /// A headless backend reporting a different tag, for exercising
    /// cross-backend checks.
    #[must_use]
    pub fn with_tag(tag: BackendTag) -> Self {
        Self {
            tag,
            state: RefCell::new(HeadlessState::default()),
        }
    }

    /// When set, every create call fails with `RenderError::Allocation`.
    pub fn set_fail_allocations(&self, fail: bool) {
        self.state.borrow_mut().fail_allocations = fail;
    }

    #[must_use]
    pub fn stats(&self) -> HeadlessStats {
        self.state.borrow().stats
    }

    #[must_use]
    pub fn live_buffers(&self) -> usize {
        self.state.borrow().buffers.len()
    }

    #[must_use]
    pub fn live_textures(&self) -> usize {
        self.state.borrow().textures.len()
    }

    #[must_use]
    pub fn live_renderbuffers(&self) -> usize {
        self.state.borrow().renderbuffers.len()
    }

    #[must_use]
    pub fn live_framebuffers(&self) -> usize {
        self.state.borrow().framebuffers.len()
    }

    #[must_use]
    pub fn live_programs(&self) -> usize {
        self.state.borrow().programs.len()
    }

    #[must_use]
    pub fn is_buffer_alive(&self, buffer: BufferId) -> bool {
        self.state.borrow().buffers.contains_key(&buffer)
    }

    #[must_use]
    pub fn is_texture_alive(&self, texture: TextureId) -> bool {
        self.state.borrow().textures.contains_key(&texture)
    }

    #[must_use]
    pub fn buffer_size(&self, buffer: BufferId) -> Option<usize> {
        self.state.borrow().buffers.get(&buffer).map(|b| b.size)
    }

    #[must_use]
    pub fn texture_descriptor(&self, texture: TextureId) -> Option<TextureDescriptor> {
        self.state.borrow().textures.get(&texture).cloned()
    }

    #[must_use]
    pub fn framebuffer(&self, framebuffer: FramebufferId) -> Option<FramebufferRecord> {
        self.state.borrow().framebuffers.get(&framebuffer).cloned()
    }

    /// Currently bound framebuffer and viewport.
    #[must_use]
    pub fn bound_framebuffer(&self) -> (Option<FramebufferId>, Viewport) {
        let state = self.state.borrow();
        (state.bound_framebuffer, state.viewport)
    }

    #[must_use]
    pub fn uniform_writes(&self) -> Vec<UniformWrite> {
        self.state.borrow().uniform_writes.clone()
    }

    /// Most recent value written to `location` while `program` was in use.
    #[must_use]
    pub fn last_uniform(&self, program: ProgramId, location: Location) -> Option<UniformValue> {
        self.state
            .borrow()
            .uniform_writes
            .iter()
            .rev()
            .find(|w| w.program == Some(program) && w.location == location)
            .map(|w| w.value)
    }

    #[must_use]
    pub fn texture_binds(&self) -> Vec<(u32, TextureId, TextureKind)> {
        self.state.borrow().texture_binds.clone()
    }

    #[must_use]
    pub fn attribute_binds(&self) -> Vec<(BufferId, Location)> {
        self.state.borrow().attribute_binds.clone()
    }

    #[must_use]
    pub fn draws(&self) -> Vec<DrawRecord> {
        self.state.borrow().draws.clone()
    }

    /// Forgets recorded uniform writes, binds and draws. Live objects and
    /// counters are kept.
    pub fn clear_records(&self) {
        let mut state = self.state.borrow_mut();
        state.uniform_writes.clear();
        state.texture_binds.clear();
        state.attribute_binds.clear();
        state.draws.clear();
    }

    fn next_handle<T>(&self, what: &str, wrap: impl FnOnce(u32) -> Option<T>) -> Result<T> {
        let raw = self.state.borrow_mut().allocate_raw(what)?;
        wrap(raw).ok_or_else(|| RenderError::Allocation(format!("null handle for {what}")))
    }
}

impl GraphicsBackend for HeadlessBackend {
    fn tag(&self) -> BackendTag {
        self.tag
    }

    fn create_buffer(&self, size_bytes: usize, kind: BufferKind) -> Result<BufferId> {
        let id = self.next_handle("buffer", BufferId::new)?;
        log::trace!("HeadlessBackend: creating {kind:?} buffer {} ({size_bytes} bytes)", id.raw());
        let mut state = self.state.borrow_mut();
        state.buffers.insert(id, BufferRecord { size: size_bytes, kind });
        state.stats.buffers_created += 1;
        Ok(id)
    }

    fn upload_buffer_data(&self, buffer: BufferId, bytes: &[u8], usage: BufferUsage) {
        let mut state = self.state.borrow_mut();
        match state.buffers.get_mut(&buffer) {
            Some(record) => {
                log::trace!(
                    "HeadlessBackend: upload {} bytes to {:?} buffer {} ({usage:?})",
                    bytes.len(),
                    record.kind,
                    buffer.raw()
                );
                record.size = bytes.len();
            }
            None => log::warn!("HeadlessBackend: upload to unknown buffer {}", buffer.raw()),
        }
    }

    fn destroy_buffer(&self, buffer: BufferId) {
        let mut state = self.state.borrow_mut();
        if state.buffers.remove(&buffer).is_some() {
            state.stats.buffers_destroyed += 1;
        } else {
            log::warn!("HeadlessBackend: release of unknown buffer {}", buffer.raw());
            state.stats.invalid_releases += 1;
        }
    }

    fn bind_vertex_attribute(&self, buffer: BufferId, location: Location, layout: AttributeLayout) {
        log::trace!(
            "HeadlessBackend: attribute {} <- buffer {} ({}x{:?})",
            location.0,
            buffer.raw(),
            layout.components,
            layout.data_type
        );
        self.state.borrow_mut().attribute_binds.push((buffer, location));
    }

    fn create_texture(&self, desc: &TextureDescriptor) -> Result<TextureId> {
        if desc.width == 0 || desc.height == 0 {
            return Err(RenderError::Allocation(format!(
                "texture '{}' has zero size ({}x{})",
                desc.label, desc.width, desc.height
            )));
        }
        let id = self.next_handle("texture", TextureId::new)?;
        log::trace!(
            "HeadlessBackend: creating texture {:?} ({}x{}, {:?}, {} mips)",
            desc.label,
            desc.width,
            desc.height,
            desc.format,
            desc.mip_levels
        );
        let mut state = self.state.borrow_mut();
        state.textures.insert(id, desc.clone());
        state.stats.textures_created += 1;
        Ok(id)
    }

    fn upload_texture_data(
        &self,
        texture: TextureId,
        face: Option<CubeFace>,
        mip_level: u32,
        bytes: &[u8],
    ) {
        let state = self.state.borrow();
        match state.textures.get(&texture) {
            Some(desc) if mip_level < desc.mip_levels => {
                log::trace!(
                    "HeadlessBackend: upload {} bytes to texture {:?} face {face:?} mip {mip_level}",
                    bytes.len(),
                    desc.label
                );
            }
            Some(desc) => log::warn!(
                "HeadlessBackend: texture {:?} has no mip level {mip_level}",
                desc.label
            ),
            None => log::warn!("HeadlessBackend: upload to unknown texture {}", texture.raw()),
        }
    }

    fn destroy_texture(&self, texture: TextureId) {
        let mut state = self.state.borrow_mut();
        if state.textures.remove(&texture).is_some() {
            state.stats.textures_destroyed += 1;
        } else {
            log::warn!("HeadlessBackend: release of unknown texture {}", texture.raw());
            state.stats.invalid_releases += 1;
        }
    }

    fn create_renderbuffer(&self, desc: &RenderbufferDescriptor) -> Result<RenderbufferId> {
        let id = self.next_handle("renderbuffer", RenderbufferId::new)?;
        log::trace!(
            "HeadlessBackend: creating renderbuffer {} ({}x{}, {:?})",
            id.raw(),
            desc.width,
            desc.height,
            desc.format
        );
        let mut state = self.state.borrow_mut();
        state.renderbuffers.insert(id, *desc);
        state.stats.renderbuffers_created += 1;
        Ok(id)
    }

    fn destroy_renderbuffer(&self, renderbuffer: RenderbufferId) {
        let mut state = self.state.borrow_mut();
        if state.renderbuffers.remove(&renderbuffer).is_some() {
            state.stats.renderbuffers_destroyed += 1;
        } else {
            log::warn!("HeadlessBackend: release of unknown renderbuffer {}", renderbuffer.raw());
            state.stats.invalid_releases += 1;
        }
    }

    fn create_framebuffer(&self) -> Result<FramebufferId> {
        let id = self.next_handle("framebuffer", FramebufferId::new)?;
        log::trace!("HeadlessBackend: creating framebuffer {}", id.raw());
        let mut state = self.state.borrow_mut();
        state.framebuffers.insert(id, FramebufferRecord::default());
        state.stats.framebuffers_created += 1;
        Ok(id)
    }

    fn destroy_framebuffer(&self, framebuffer: FramebufferId) {
        let mut state = self.state.borrow_mut();
        if state.framebuffers.remove(&framebuffer).is_some() {
            state.stats.framebuffers_destroyed += 1;
            if state.bound_framebuffer == Some(framebuffer) {
                state.bound_framebuffer = None;
            }
        } else {
            log::warn!("HeadlessBackend: release of unknown framebuffer {}", framebuffer.raw());
            state.stats.invalid_releases += 1;
        }
    }

    fn attach_color(&self, framebuffer: FramebufferId, slot: u32, attachment: AttachmentRef) {
        let mut state = self.state.borrow_mut();
        match state.framebuffers.get_mut(&framebuffer) {
            Some(record) => {
                record.colors.insert(slot, attachment);
            }
            None => log::warn!("HeadlessBackend: attach to unknown framebuffer {}", framebuffer.raw()),
        }
    }

    fn attach_depth(&self, framebuffer: FramebufferId, attachment: AttachmentRef, with_stencil: bool) {
        let mut state = self.state.borrow_mut();
        match state.framebuffers.get_mut(&framebuffer) {
            Some(record) => {
                record.depth = Some(attachment);
                record.stencil = with_stencil;
            }
            None => log::warn!("HeadlessBackend: attach to unknown framebuffer {}", framebuffer.raw()),
        }
    }

    fn detach_color(&self, framebuffer: FramebufferId, slot: u32) {
        let mut state = self.state.borrow_mut();
        match state.framebuffers.get_mut(&framebuffer) {
            Some(record) => {
                record.colors.remove(&slot);
            }
            None => log::warn!("HeadlessBackend: detach from unknown framebuffer {}", framebuffer.raw()),
        }
    }

    fn detach_depth(&self, framebuffer: FramebufferId) {
        let mut state = self.state.borrow_mut();
        match state.framebuffers.get_mut(&framebuffer) {
            Some(record) => {
                record.depth = None;
                record.stencil = false;
            }
            None => log::warn!("HeadlessBackend: detach from unknown framebuffer {}", framebuffer.raw()),
        }
    }

    fn bind_framebuffer(&self, framebuffer: Option<FramebufferId>, viewport: Viewport) {
        let mut state = self.state.borrow_mut();
        state.bound_framebuffer = framebuffer;
        state.viewport = viewport;
    }

    fn clear(&self, _color: Option<[f32; 4]>, _depth: bool) {
        self.state.borrow_mut().stats.clears += 1;
    }

    fn compile_shader_stage(&self, stage: ShaderStage, source: &str) -> Result<ShaderId> {
        if !stage.is_compilable() {
            return Err(RenderError::Compile {
                stage,
                log: "0:0: error: base sources cannot be compiled directly".into(),
            });
        }
        check_syntax(source).map_err(|log| RenderError::Compile { stage, log })?;

        let id = self.next_handle("shader", ShaderId::new)?;
        let record = scan_declarations(stage, source);
        log::trace!(
            "HeadlessBackend: compiled {stage:?} stage {} ({} uniforms, {} inputs)",
            id.raw(),
            record.uniforms.len(),
            record.inputs.len()
        );
        let mut state = self.state.borrow_mut();
        state.shaders.insert(id, record);
        state.stats.shaders_compiled += 1;
        Ok(id)
    }

    fn destroy_shader_stage(&self, shader: ShaderId) {
        let mut state = self.state.borrow_mut();
        if state.shaders.remove(&shader).is_some() {
            state.stats.shaders_destroyed += 1;
        } else {
            state.stats.invalid_releases += 1;
        }
    }

    fn link_program(&self, stages: &[ShaderId]) -> Result<ProgramId> {
        let record = {
            let state = self.state.borrow();
            let mut records = Vec::with_capacity(stages.len());
            for id in stages {
                let stage = state.shaders.get(id).ok_or_else(|| RenderError::Link {
                    log: format!("error: shader object {} does not exist", id.raw()),
                })?;
                records.push(stage);
            }
            let has = |s: ShaderStage| records.iter().any(|r| r.stage == s);
            if !has(ShaderStage::Vertex) || !has(ShaderStage::Fragment) {
                return Err(RenderError::Link {
                    log: "error: program needs both a vertex and a fragment stage".into(),
                });
            }

            let mut program = ProgramRecord::default();
            let mut next_uniform = 0u32;
            let mut next_attribute = 0u32;
            for stage in &records {
                for (name, len) in &stage.uniforms {
                    if !program.uniforms.contains_key(name) {
                        program.uniforms.insert(name.clone(), Location(next_uniform));
                        next_uniform += len;
                    }
                }
                if stage.stage == ShaderStage::Vertex {
                    for (name, len) in &stage.inputs {
                        program.attributes.insert(name.clone(), Location(next_attribute));
                        next_attribute += len;
                    }
                }
            }
            program
        };

        let id = self.next_handle("program", ProgramId::new)?;
        log::trace!(
            "HeadlessBackend: linked program {} ({} uniforms, {} attributes)",
            id.raw(),
            record.uniforms.len(),
            record.attributes.len()
        );
        let mut state = self.state.borrow_mut();
        state.programs.insert(id, record);
        state.stats.programs_linked += 1;
        Ok(id)
    }

    fn destroy_program(&self, program: ProgramId) {
        let mut state = self.state.borrow_mut();
        if state.programs.remove(&program).is_some() {
            state.stats.programs_destroyed += 1;
            if state.current_program == Some(program) {
                state.current_program = None;
            }
        } else {
            log::warn!("HeadlessBackend: release of unknown program {}", program.raw());
            state.stats.invalid_releases += 1;
        }
    }

    fn use_program(&self, program: ProgramId) {
        self.state.borrow_mut().current_program = Some(program);
    }

    fn get_uniform_location(&self, program: ProgramId, name: &str) -> Option<Location> {
        self.state
            .borrow()
            .programs
            .get(&program)
            .and_then(|p| p.uniforms.get(name).copied())
    }

    fn get_attribute_location(&self, program: ProgramId, name: &str) -> Option<Location> {
        self.state
            .borrow()
            .programs
            .get(&program)
            .and_then(|p| p.attributes.get(name).copied())
    }

    fn set_uniform(&self, location: Location, value: &UniformValue) {
        let mut state = self.state.borrow_mut();
        let program = state.current_program;
        state.uniform_writes.push(UniformWrite {
            program,
            location,
            value: *value,
        });
    }

    fn bind_texture(&self, unit: u32, texture: TextureId, kind: TextureKind) {
        self.state.borrow_mut().texture_binds.push((unit, texture, kind));
    }

    fn draw_indexed(&self, index_buffer: BufferId, index_type: IndexType, count: u32) {
        let mut state = self.state.borrow_mut();
        let record = DrawRecord {
            program: state.current_program,
            framebuffer: state.bound_framebuffer,
            index_buffer,
            index_type,
            count,
        };
        state.draws.push(record);
        state.stats.draw_calls += 1;
    }
}

// ============================================================================
// Source checks
// ============================================================================

/// Minimal stand-in for a compiler front end: the source must be non-empty,
/// brackets must balance and no unresolved template marker may remain.
/// Errors are formatted like a GLSL info log (`0:<line>: error: ...`).
fn check_syntax(source: &str) -> std::result::Result<(), String> {
    if source.trim().is_empty() {
        return Err("0:0: error: empty shader source".into());
    }

    let mut open: Vec<(char, usize)> = Vec::new();
    for (index, raw_line) in source.lines().enumerate() {
        let line_no = index + 1;
        let line = raw_line.split("//").next().unwrap_or("");

        if let Some(pos) = line.find("!!") {
            let ident: String = line[pos + 2..]
                .chars()
                .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
                .collect();
            return Err(format!(
                "0:{line_no}: error: '!!{ident}' : unresolved template parameter"
            ));
        }

        for c in line.chars() {
            match c {
                '{' | '(' | '[' => open.push((c, line_no)),
                '}' | ')' | ']' => {
                    let expected = match c {
                        '}' => '{',
                        ')' => '(',
                        _ => '[',
                    };
                    match open.pop() {
                        Some((o, _)) if o == expected => {}
                        Some((o, opened)) => {
                            return Err(format!(
                                "0:{line_no}: error: '{c}' does not match '{o}' opened on line {opened}"
                            ));
                        }
                        None => {
                            return Err(format!("0:{line_no}: error: unexpected '{c}'"));
                        }
                    }
                }
                _ => {}
            }
        }
    }

    match open.last() {
        Some((c, line_no)) => Err(format!("0:{line_no}: error: unclosed '{c}'")),
        None => Ok(()),
    }
}

/// Collects uniform and vertex-input declarations. Array uniforms record
/// their length so they occupy consecutive locations after linking.
fn scan_declarations(stage: ShaderStage, source: &str) -> StageRecord {
    let mut record = StageRecord {
        stage,
        uniforms: Vec::new(),
        inputs: Vec::new(),
    };

    for raw_line in source.lines() {
        let mut line = raw_line.split("//").next().unwrap_or("").trim();
        if let Some(rest) = line.strip_prefix("layout")
            && let Some(close) = rest.find(')')
        {
            line = rest[close + 1..].trim();
        }
        let Some(decl) = line.strip_suffix(';') else {
            continue;
        };
        let tokens: Vec<&str> = decl.split_whitespace().collect();
        let Some(&qualifier) = tokens.first() else {
            continue;
        };
        let is_uniform = qualifier == "uniform";
        let is_input = stage == ShaderStage::Vertex && (qualifier == "in" || qualifier == "attribute");
        if !(is_uniform || is_input) || tokens.len() < 3 {
            continue;
        }
        let Some(&name_token) = tokens.last() else {
            continue;
        };
        let (name, len) = parse_array_name(name_token);
        if name.is_empty() {
            continue;
        }
        if is_uniform {
            record.uniforms.push((name.to_string(), len));
        } else {
            record.inputs.push((name.to_string(), len));
        }
    }
    record
}

fn parse_array_name(token: &str) -> (&str, u32) {
    match token.split_once('[') {
        Some((name, rest)) => {
            let len = rest
                .trim_end_matches(']')
                .trim()
                .parse::<u32>()
                .unwrap_or(1)
                .max(1);
            (name, len)
        }
        None => (token, 1),
    }
}
