use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use bitflags::bitflags;
use glam::{Mat3, Mat4, Vec3, Vec4};
use uuid::Uuid;

use crate::backend::{BackendRef, Location, ShaderStage, TextureKind, UniformValue};
use crate::errors::{RenderError, Result};
use crate::material::variables::{self, LocationTable, VariableDecl, VariableKind};
use crate::resources::Texture;
use crate::settings::RendererSettings;
use crate::shader::{ProgramCache, ProgramSources, ShaderManager, ShaderProgram, library};

bitflags! {
    /// Inputs a material's shader consumes.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct MaterialFeatures: u32 {
        const USE_LIGHTS      = 1 << 0;
        const USE_SURFACE     = 1 << 1;
        const USE_PHYSICAL    = 1 << 2;
        const USE_SHADOW_PASS = 1 << 3;
    }
}

/// Which template a material renders with.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MaterialKind {
    Unlit,
    StandardPhysical,
    /// Depth-only pass into a directional cascade.
    ShadowDepth,
    /// Distance-to-light pass into a point-light cube face.
    PointShadowDepth,
    /// A user template registered in the [`ShaderManager`]. Lit custom
    /// shaders receive the light arrays.
    Custom { template: String, lit: bool },
}

impl MaterialKind {
    #[must_use]
    pub fn template_name(&self) -> &str {
        match self {
            Self::Unlit => library::UNLIT,
            Self::StandardPhysical => library::STANDARD_PHYSICAL,
            Self::ShadowDepth => library::SHADOW_DEPTH,
            Self::PointShadowDepth => library::POINT_SHADOW_DEPTH,
            Self::Custom { template, .. } => template,
        }
    }

    #[must_use]
    pub fn features(&self) -> MaterialFeatures {
        match self {
            Self::Unlit => MaterialFeatures::USE_SURFACE,
            Self::StandardPhysical => {
                MaterialFeatures::USE_SURFACE
                    | MaterialFeatures::USE_PHYSICAL
                    | MaterialFeatures::USE_LIGHTS
            }
            Self::ShadowDepth | Self::PointShadowDepth => MaterialFeatures::USE_SHADOW_PASS,
            Self::Custom { lit, .. } => {
                let mut f = MaterialFeatures::USE_SURFACE | MaterialFeatures::USE_PHYSICAL;
                if *lit {
                    f |= MaterialFeatures::USE_LIGHTS;
                }
                f
            }
        }
    }
}

/// Fixed-function state consumed by the render queue.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaterialSettings {
    pub transparent: bool,
    pub depth_write: bool,
    pub double_sided: bool,
}

impl Default for MaterialSettings {
    fn default() -> Self {
        Self {
            transparent: false,
            depth_write: true,
            double_sided: false,
        }
    }
}

/// CPU-side values staged until [`Material::send_custom_uniforms_to_shader`].
#[derive(Debug, Clone)]
pub struct MaterialValues {
    pub base_color: Vec4,
    pub opacity: f32,
    pub roughness: f32,
    pub metallic: f32,
    pub emissive: Vec3,
    pub base_color_map: Option<Weak<Texture>>,
    /// Extra uniforms, sent in name order.
    pub custom: BTreeMap<String, UniformValue>,
    /// Extra sampler bindings, by sampler name.
    pub custom_textures: BTreeMap<String, Weak<Texture>>,
}

impl Default for MaterialValues {
    fn default() -> Self {
        Self {
            base_color: Vec4::ONE,
            opacity: 1.0,
            roughness: 1.0,
            metallic: 0.0,
            emissive: Vec3::ZERO,
            base_color_map: None,
            custom: BTreeMap::new(),
            custom_textures: BTreeMap::new(),
        }
    }
}

/// Everything a material build needs.
pub struct BuildContext<'a> {
    pub backend: &'a BackendRef,
    pub shaders: &'a ShaderManager,
    pub programs: &'a mut ProgramCache,
    pub settings: &'a RendererSettings,
}

/// A shader program plus the locations of its semantic variables.
///
/// Locations are resolved once, right after a successful build, and never
/// change afterwards. Before that the material is not ready and every
/// location query fails with `NotReady`.
pub struct Material {
    pub uuid: Uuid,
    pub name: String,
    kind: MaterialKind,
    pub settings: MaterialSettings,
    values: MaterialValues,

    /// Template parameters on top of the renderer's light-array sizes.
    shader_params: Vec<(String, String)>,
    /// Variables of custom templates.
    custom_declarations: Vec<VariableDecl>,

    program: Option<Rc<ShaderProgram>>,
    locations: Option<Rc<LocationTable>>,
}

impl std::fmt::Debug for Material {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Material")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("ready", &self.is_ready())
            .finish_non_exhaustive()
    }
}

impl Clone for Material {
    /// Shares the program and location table; values are copied and evolve
    /// independently. The clone gets a fresh uuid.
    fn clone(&self) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            name: self.name.clone(),
            kind: self.kind.clone(),
            settings: self.settings,
            values: self.values.clone(),
            shader_params: self.shader_params.clone(),
            custom_declarations: self.custom_declarations.clone(),
            program: self.program.clone(),
            locations: self.locations.clone(),
        }
    }
}

impl Material {
    #[must_use]
    pub fn new(name: &str, kind: MaterialKind) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            name: name.to_string(),
            kind,
            settings: MaterialSettings::default(),
            values: MaterialValues::default(),
            shader_params: Vec::new(),
            custom_declarations: Vec::new(),
            program: None,
            locations: None,
        }
    }

    #[must_use]
    pub fn new_unlit(color: Vec4) -> Self {
        let mut m = Self::new("Unlit", MaterialKind::Unlit);
        m.values.base_color = color;
        m
    }

    #[must_use]
    pub fn new_standard(color: Vec4, roughness: f32, metallic: f32) -> Self {
        let mut m = Self::new("StandardPhysical", MaterialKind::StandardPhysical);
        m.values.base_color = color;
        m.values.roughness = roughness;
        m.values.metallic = metallic;
        m
    }

    /// A material over a user template registered in the shader manager.
    #[must_use]
    pub fn new_custom(name: &str, template: &str, lit: bool) -> Self {
        Self::new(
            name,
            MaterialKind::Custom {
                template: template.to_string(),
                lit,
            },
        )
    }

    #[must_use]
    pub fn kind(&self) -> &MaterialKind {
        &self.kind
    }

    #[must_use]
    pub fn features(&self) -> MaterialFeatures {
        self.kind.features()
    }

    #[must_use]
    pub fn values(&self) -> &MaterialValues {
        &self.values
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.program.is_some() && self.locations.is_some()
    }

    #[must_use]
    pub fn program(&self) -> Option<&Rc<ShaderProgram>> {
        self.program.as_ref()
    }

    #[must_use]
    pub fn location_table(&self) -> Option<&LocationTable> {
        self.locations.as_deref()
    }

    // ========================================================================
    // Staged values
    // ========================================================================

    pub fn set_base_color(&mut self, color: Vec4) {
        self.values.base_color = color;
    }

    pub fn set_opacity(&mut self, opacity: f32) {
        self.values.opacity = opacity;
        self.settings.transparent = opacity < 1.0;
    }

    pub fn set_roughness(&mut self, roughness: f32) {
        self.values.roughness = roughness.clamp(0.0, 1.0);
    }

    pub fn set_metallic(&mut self, metallic: f32) {
        self.values.metallic = metallic.clamp(0.0, 1.0);
    }

    pub fn set_emissive(&mut self, emissive: Vec3) {
        self.values.emissive = emissive;
    }

    /// Holds the texture weakly; a texture dropped before the next send is
    /// reported as `InvalidReference`.
    pub fn set_base_color_map(&mut self, texture: Option<&Rc<Texture>>) {
        self.values.base_color_map = texture.map(Rc::downgrade);
    }

    /// Stages a uniform value. Names staged before build are resolved even
    /// without [`Self::declare_uniform`].
    pub fn set_custom_uniform(&mut self, name: &str, value: UniformValue) {
        self.values.custom.insert(name.to_string(), value);
    }

    pub fn set_custom_texture(&mut self, name: &str, texture: &Rc<Texture>) {
        self.values
            .custom_textures
            .insert(name.to_string(), Rc::downgrade(texture));
    }

    /// Declares a uniform of a custom template. Only effective before build.
    pub fn declare_uniform(&mut self, name: &str, len: usize) {
        self.custom_declarations.push(VariableDecl::uniform_array(name, len));
    }

    /// Declares a 2D or cube sampler of a custom template. Only effective
    /// before build.
    pub fn declare_sampler(&mut self, name: &str, kind: TextureKind) {
        self.custom_declarations.push(VariableDecl::sampler(name, kind));
    }

    /// Adds a template parameter. Only effective before build.
    pub fn set_shader_param(&mut self, key: &str, value: &str) {
        match self.shader_params.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value.to_string(),
            None => self.shader_params.push((key.to_string(), value.to_string())),
        }
    }

    /// Copies the staged values onto `target`, which must render with the
    /// same template. Program and locations of `target` are untouched.
    pub fn copy_to(&self, target: &mut Material) -> Result<()> {
        if self.kind.template_name() != target.kind.template_name() {
            return Err(RenderError::Incompatible(format!(
                "cannot copy {:?} values onto {:?}",
                self.kind.template_name(),
                target.kind.template_name()
            )));
        }
        target.values = self.values.clone();
        target.settings = self.settings;
        Ok(())
    }

    // ========================================================================
    // Build
    // ========================================================================

    fn declarations(&self, settings: &RendererSettings) -> Vec<VariableDecl> {
        let features = self.features();
        let mut decls = variables::attribute_declarations();
        if features.contains(MaterialFeatures::USE_SHADOW_PASS) {
            decls.extend(variables::shadow_pass_declarations());
        } else {
            decls.extend(variables::transform_declarations());
        }
        if features.contains(MaterialFeatures::USE_SURFACE) {
            decls.extend(variables::surface_declarations(
                features.contains(MaterialFeatures::USE_PHYSICAL),
            ));
        }
        if features.contains(MaterialFeatures::USE_LIGHTS) {
            decls.extend(variables::light_declarations(settings));
        }
        decls.extend(self.custom_declarations.iter().cloned());

        // staged values without an explicit declaration resolve as scalars
        for name in self.values.custom.keys() {
            decls.push(VariableDecl::uniform(name));
        }
        for (name, weak) in &self.values.custom_textures {
            let kind = weak.upgrade().map_or(TextureKind::D2, |t| t.kind());
            decls.push(VariableDecl::sampler(name, kind));
        }
        decls
    }

    fn resolve_sources(&self, ctx: &BuildContext<'_>) -> Result<ProgramSources> {
        let mut params = ctx.settings.shader_params();
        for (key, value) in &self.shader_params {
            match params.iter_mut().find(|(k, _)| k == key) {
                Some(entry) => entry.1.clone_from(value),
                None => params.push((key.clone(), value.clone())),
            }
        }

        let name = self.kind.template_name();
        let geometry = if ctx.shaders.has_explicit_stage(ShaderStage::Geometry, name) {
            Some(ctx.shaders.get_shader(ShaderStage::Geometry, name, &params)?)
        } else {
            None
        };
        Ok(ProgramSources {
            vertex: ctx.shaders.get_shader(ShaderStage::Vertex, name, &params)?,
            geometry,
            fragment: ctx.shaders.get_shader(ShaderStage::Fragment, name, &params)?,
        })
    }

    /// Resolves the template, compiles and links the program, then caches
    /// every variable location. Building a ready material is a no-op.
    ///
    /// On failure the material stays not ready with no cached locations and
    /// the backend log is carried in the error.
    pub fn build(&mut self, ctx: &mut BuildContext<'_>) -> Result<()> {
        if self.is_ready() {
            return Ok(());
        }

        let linked = self.resolve_sources(ctx).and_then(|sources| {
            ctx.programs
                .get_or_build(ctx.backend, self.kind.template_name(), &sources)
        });
        let program = match linked {
            Ok(program) => program,
            Err(e) => {
                log::error!("Material {:?} failed to build: {e}", self.name);
                return Err(e);
            }
        };

        let table = LocationTable::resolve(&program, &self.declarations(ctx.settings));
        bind_sampler_units(&program, &table)?;

        log::debug!(
            "Material {:?} ready ({} of {} variables resolved)",
            self.name,
            table.resolved().count(),
            table.len()
        );
        self.program = Some(program);
        self.locations = Some(Rc::new(table));
        Ok(())
    }

    // ========================================================================
    // Locations
    // ========================================================================

    fn table(&self) -> Result<&LocationTable> {
        self.locations
            .as_deref()
            .ok_or_else(|| RenderError::NotReady(self.name.clone()))
    }

    /// Cached location of `name[offset]`.
    ///
    /// `Ok(None)` when the program does not use the variable or the material
    /// never declared it. `offset` must be below the declared array length.
    pub fn get_shader_location(&self, name: &str, offset: usize) -> Result<Option<Location>> {
        let table = self.table()?;
        let Some(entry) = table.get(name) else {
            return Ok(None);
        };
        if offset >= entry.len {
            return Err(RenderError::OutOfRange {
                context: "shader variable offset",
                index: offset,
                len: entry.len,
            });
        }
        Ok(entry.location.map(|l| l.offset(offset)))
    }

    /// Texture unit of sampler `name[offset]`.
    pub fn texture_unit(&self, name: &str, offset: usize) -> Result<Option<u32>> {
        let table = self.table()?;
        let Some(entry) = table.get(name) else {
            return Ok(None);
        };
        if offset >= entry.len {
            return Err(RenderError::OutOfRange {
                context: "sampler offset",
                index: offset,
                len: entry.len,
            });
        }
        Ok(entry.texture_unit.map(|u| u + offset as u32))
    }

    fn program_checked(&self) -> Result<&ShaderProgram> {
        self.program
            .as_deref()
            .ok_or_else(|| RenderError::NotReady(self.name.clone()))
    }

    /// Makes this material's program current.
    pub fn use_program(&self) -> Result<()> {
        self.program_checked()?.use_program()
    }

    /// Writes `name[offset]` if the program uses it. Returns whether a write
    /// happened. The program must be current.
    pub fn write_uniform(&self, name: &str, offset: usize, value: UniformValue) -> Result<bool> {
        match self.get_shader_location(name, offset)? {
            Some(location) => {
                self.program_checked()?.backend().set_uniform(location, &value);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Binds `texture` to the unit of sampler `name[offset]`.
    pub fn bind_texture(&self, name: &str, offset: usize, texture: &Texture) -> Result<bool> {
        match self.texture_unit(name, offset)? {
            Some(unit) => {
                texture.bind(unit)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Writes model, view, projection and normal matrices plus the camera
    /// position.
    pub fn send_transforms(&self, model: &Mat4, view: &Mat4, projection: &Mat4) -> Result<()> {
        use variables::{CAMERA_POSITION, MODEL_MATRIX, NORMAL_MATRIX, PROJECTION_MATRIX, VIEW_MATRIX};

        let normal = Mat3::from_mat4(*model).inverse().transpose();
        let camera_position = view.inverse().w_axis.truncate();
        self.write_uniform(MODEL_MATRIX, 0, UniformValue::Mat4(*model))?;
        self.write_uniform(VIEW_MATRIX, 0, UniformValue::Mat4(*view))?;
        self.write_uniform(PROJECTION_MATRIX, 0, UniformValue::Mat4(*projection))?;
        self.write_uniform(NORMAL_MATRIX, 0, UniformValue::Mat3(normal))?;
        self.write_uniform(CAMERA_POSITION, 0, UniformValue::Vec3(camera_position))?;
        Ok(())
    }

    /// Pushes every staged value through the cached locations and binds the
    /// staged textures. Makes the program current first.
    pub fn send_custom_uniforms_to_shader(&self) -> Result<()> {
        use variables::{
            BASE_COLOR, BASE_COLOR_MAP, EMISSIVE, HAS_BASE_COLOR_MAP, METALLIC, OPACITY, ROUGHNESS,
        };

        self.use_program()?;
        let features = self.features();
        let v = &self.values;

        if features.contains(MaterialFeatures::USE_SURFACE) {
            self.write_uniform(BASE_COLOR, 0, UniformValue::Vec4(v.base_color))?;
            self.write_uniform(OPACITY, 0, UniformValue::Float(v.opacity))?;

            let map = v
                .base_color_map
                .as_ref()
                .map(|weak| upgrade(weak, BASE_COLOR_MAP))
                .transpose()?;
            self.write_uniform(HAS_BASE_COLOR_MAP, 0, UniformValue::Int(i32::from(map.is_some())))?;
            if let Some(texture) = map {
                self.bind_texture(BASE_COLOR_MAP, 0, &texture)?;
            }
        }
        if features.contains(MaterialFeatures::USE_PHYSICAL) {
            self.write_uniform(ROUGHNESS, 0, UniformValue::Float(v.roughness))?;
            self.write_uniform(METALLIC, 0, UniformValue::Float(v.metallic))?;
            self.write_uniform(EMISSIVE, 0, UniformValue::Vec3(v.emissive))?;
        }

        let table = self.table()?;
        for (name, value) in &v.custom {
            if table.get(name).is_none() {
                log::warn!(
                    "Material {:?}: uniform {name:?} was staged after build and is not sent",
                    self.name
                );
                continue;
            }
            self.write_uniform(name, 0, *value)?;
        }
        for (name, weak) in &v.custom_textures {
            let texture = upgrade(weak, name)?;
            if table.get(name).is_none() {
                log::warn!(
                    "Material {:?}: texture {name:?} was staged after build and is not bound",
                    self.name
                );
                continue;
            }
            self.bind_texture(name, 0, &texture)?;
        }
        Ok(())
    }
}

fn upgrade(weak: &Weak<Texture>, what: &str) -> Result<Rc<Texture>> {
    weak.upgrade()
        .ok_or_else(|| RenderError::InvalidReference(format!("texture bound to {what} was dropped")))
}

/// Points every sampler element at its texture unit. Runs once per build.
fn bind_sampler_units(program: &ShaderProgram, table: &LocationTable) -> Result<()> {
    let samplers: Vec<_> = table
        .resolved()
        .filter(|(_, e)| matches!(e.kind, VariableKind::Sampler(_)))
        .collect();
    if samplers.is_empty() {
        return Ok(());
    }
    program.use_program()?;
    for (_, entry) in samplers {
        if let (Some(location), Some(unit)) = (entry.location, entry.texture_unit) {
            for i in 0..entry.len {
                program
                    .backend()
                    .set_uniform(location.offset(i), &UniformValue::Int((unit as usize + i) as i32));
            }
        }
    }
    Ok(())
}
