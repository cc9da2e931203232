//! Renderer
//!
//! One `render` call draws one frame:
//!
//! 1. world transforms are propagated over the whole tree
//! 2. the scene is extracted into a sorted [`RenderQueue`] and a light list
//! 3. shadow-casting lights update their cascades / cube faces and render
//!    their shadow maps
//! 4. lights are packed into a [`LightPack`]
//! 5. every queued item is drawn by the [`ObjectRenderer`]
//!
//! Any error aborts the frame and is returned to the caller.

pub mod object_renderer;
pub mod queue;

pub use object_renderer::{DrawContext, MeshRenderer, ObjectRenderer};
pub use queue::{LightItem, RenderItem, RenderKey, RenderQueue};

use glam::Mat4;

use crate::backend::{BackendRef, CubeFace, UniformValue, Viewport};
use crate::errors::{RenderError, Result};
use crate::light::{LightKind, LightPack};
use crate::material::variables::{LIGHT_POSITION, LIGHT_VIEW_PROJECTION, MODEL_MATRIX, SHADOW_FAR};
use crate::material::{BuildContext, Material, MaterialKind};
use crate::resources::{Geometry, RenderTarget};
use crate::scene::{Camera, GeometryKey, MaterialKey, NodeHandle, Scene};
use crate::settings::RendererSettings;
use crate::shader::{ProgramCache, ShaderManager};

/// Counters of one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub nodes_visited: usize,
    pub items_queued: usize,
    pub draw_calls: usize,
    pub shadow_draw_calls: usize,
    /// Cascades plus cube faces rendered.
    pub shadow_views: usize,
    pub ambient_lights: usize,
    pub directional_lights: usize,
    pub point_lights: usize,
    pub lights_dropped: usize,
}

pub struct Renderer {
    backend: BackendRef,
    settings: RendererSettings,
    shaders: ShaderManager,
    programs: ProgramCache,
    queue: RenderQueue,
    light_pack: LightPack,
    object_renderer: Box<dyn ObjectRenderer>,
    shadow_material: Material,
    point_shadow_material: Material,
    viewport: Viewport,
}

impl Renderer {
    /// Validates `settings` and loads the built-in shader library.
    pub fn new(backend: &BackendRef, settings: RendererSettings) -> Result<Self> {
        settings.validate()?;
        let mut shaders = ShaderManager::with_builtin_library();
        shaders.set_max_include_depth(settings.max_include_depth);

        log::debug!(
            "Renderer created on backend {:?} ({} shader templates)",
            backend.tag().0,
            shaders.names().len()
        );
        Ok(Self {
            backend: backend.clone(),
            light_pack: LightPack::new(&settings),
            settings,
            shaders,
            programs: ProgramCache::new(),
            queue: RenderQueue::new(),
            object_renderer: Box::new(MeshRenderer),
            shadow_material: Material::new("ShadowDepth", MaterialKind::ShadowDepth),
            point_shadow_material: Material::new("PointShadowDepth", MaterialKind::PointShadowDepth),
            viewport: Viewport::from_size(1, 1),
        })
    }

    #[must_use]
    pub fn with_object_renderer(mut self, object_renderer: Box<dyn ObjectRenderer>) -> Self {
        self.object_renderer = object_renderer;
        self
    }

    pub fn set_object_renderer(&mut self, object_renderer: Box<dyn ObjectRenderer>) {
        self.object_renderer = object_renderer;
    }

    #[must_use]
    pub fn backend(&self) -> &BackendRef {
        &self.backend
    }

    #[must_use]
    pub fn settings(&self) -> &RendererSettings {
        &self.settings
    }

    #[must_use]
    pub fn shaders(&self) -> &ShaderManager {
        &self.shaders
    }

    /// Register custom templates here before building materials that use them.
    pub fn shaders_mut(&mut self) -> &mut ShaderManager {
        &mut self.shaders
    }

    #[must_use]
    pub fn program_cache(&self) -> &ProgramCache {
        &self.programs
    }

    /// Light pack of the last frame.
    #[must_use]
    pub fn light_pack(&self) -> &LightPack {
        &self.light_pack
    }

    /// Viewport of the default framebuffer.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.viewport = Viewport::from_size(width, height);
    }

    #[must_use]
    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// Builds `material` against this renderer's templates and program cache.
    pub fn build_material(&mut self, material: &mut Material) -> Result<()> {
        material.build(&mut BuildContext {
            backend: &self.backend,
            shaders: &self.shaders,
            programs: &mut self.programs,
            settings: &self.settings,
        })
    }

    /// Renders the scene seen from `camera_node` into `target`, or into the
    /// default framebuffer when `target` is `None`.
    pub fn render(
        &mut self,
        scene: &mut Scene,
        camera_node: NodeHandle,
        target: Option<&RenderTarget>,
    ) -> Result<FrameStats> {
        let mut stats = FrameStats {
            nodes_visited: scene.update_world_transforms(),
            ..FrameStats::default()
        };

        let camera_key = scene.camera_of(camera_node).ok_or_else(|| {
            RenderError::InvalidReference(format!("node {camera_node:?} has no camera"))
        })?;
        let camera = *scene
            .cameras
            .get(camera_key)
            .ok_or_else(|| RenderError::InvalidReference(format!("camera {camera_key:?}")))?;
        let camera_world = scene.world_matrix_of(camera_node)?;
        let view = Camera::view_matrix(&camera_world);
        let projection = camera.projection_matrix();

        self.queue.extract(scene, camera_world.w_axis.truncate());
        self.queue.sort();
        stats.items_queued = self.queue.len();

        self.prepare_lights(scene, &camera, &camera_world)?;
        let (views, draws) = self.render_shadow_maps(scene)?;
        stats.shadow_views = views;
        stats.shadow_draw_calls = draws;

        self.light_pack.clear();
        for item in &self.queue.lights {
            if let Some(light) = scene.lights.get(item.key) {
                self.light_pack.push(item.key, light, &item.world);
            }
        }
        stats.ambient_lights = self.light_pack.ambient_count();
        stats.directional_lights = self.light_pack.directional_count();
        stats.point_lights = self.light_pack.point_count();
        stats.lights_dropped = self.light_pack.dropped();

        // ==== Main pass ====
        let keys: Vec<MaterialKey> = self.queue.iter().map(|i| i.material).collect();
        for key in keys {
            let material = scene
                .materials
                .get_mut(key)
                .ok_or_else(|| RenderError::InvalidReference(format!("material {key:?}")))?;
            material.build(&mut BuildContext {
                backend: &self.backend,
                shaders: &self.shaders,
                programs: &mut self.programs,
                settings: &self.settings,
            })?;
        }

        match target {
            Some(target) => target.activate(&self.backend)?,
            None => self.backend.bind_framebuffer(None, self.viewport),
        }
        self.backend.clear(Some(self.settings.clear_color), true);

        let ctx = DrawContext {
            backend: &self.backend,
            view: &view,
            projection: &projection,
            light_pack: &self.light_pack,
        };
        for item in self.queue.iter() {
            let geometry = geometry_mut_in(&mut scene.geometries, item.geometry)?;
            let material = scene
                .materials
                .get(item.material)
                .ok_or_else(|| RenderError::InvalidReference(format!("material {:?}", item.material)))?;
            if self.object_renderer.render_object(&ctx, item, geometry, material)? {
                stats.draw_calls += 1;
            }
        }

        log::trace!("frame: {stats:?}");
        Ok(stats)
    }

    /// Initializes lights, builds missing shadow maps and updates the
    /// cascade / cube-face matrices of shadow casters.
    fn prepare_lights(&mut self, scene: &mut Scene, camera: &Camera, camera_world: &Mat4) -> Result<()> {
        for item in &self.queue.lights {
            let Some(light) = scene.lights.get_mut(item.key) else {
                continue;
            };
            light.init(&self.backend)?;
            light.prepare_shadow_maps(&self.backend)?;
            if !light.casts_shadows() {
                continue;
            }
            match &mut light.kind {
                LightKind::Directional(directional) => {
                    directional.update_cascades(camera, camera_world, &item.world)?;
                }
                LightKind::Point(point) => point.update_faces(item.world.w_axis.truncate()),
                LightKind::Ambient | LightKind::AmbientIbl(_) => {}
            }
        }
        Ok(())
    }

    /// Renders every shadow map. Returns (views rendered, draw calls).
    fn render_shadow_maps(&mut self, scene: &mut Scene) -> Result<(usize, usize)> {
        let needs_shadows = self
            .queue
            .lights
            .iter()
            .any(|i| scene.lights.get(i.key).is_some_and(|l| l.casts_shadows()));
        if !needs_shadows {
            return Ok((0, 0));
        }

        let mut ctx = BuildContext {
            backend: &self.backend,
            shaders: &self.shaders,
            programs: &mut self.programs,
            settings: &self.settings,
        };
        self.shadow_material.build(&mut ctx)?;
        self.point_shadow_material.build(&mut ctx)?;

        let mut views = 0;
        let mut draws = 0;
        for light_item in &self.queue.lights {
            let Some(light) = scene.lights.get(light_item.key) else {
                continue;
            };
            if !light.casts_shadows() {
                continue;
            }
            let casters: Vec<(GeometryKey, Mat4)> = self
                .queue
                .iter()
                .filter(|i| i.cast_shadows && light.culling_mask.intersects(i.layers))
                .map(|i| (i.geometry, i.world))
                .collect();

            match &light.kind {
                LightKind::Directional(directional) => {
                    let material = &self.shadow_material;
                    for (index, cascade) in directional.cascades().iter().enumerate() {
                        let map = directional.shadow.map(index)?;
                        map.activate(&self.backend)?;
                        self.backend.clear(None, true);
                        material.use_program()?;
                        material.write_uniform(
                            LIGHT_VIEW_PROJECTION,
                            0,
                            UniformValue::Mat4(cascade.view_projection),
                        )?;
                        for (geometry, world) in &casters {
                            let geometry = geometry_mut_in(&mut scene.geometries, *geometry)?;
                            if draw_shadow_caster(&self.backend, material, geometry, world)? {
                                draws += 1;
                            }
                        }
                        views += 1;
                    }
                }
                LightKind::Point(point) => {
                    let material = &self.point_shadow_material;
                    let map = point.shadow.map(0)?;
                    let position = light_item.world.w_axis.truncate();
                    for face in CubeFace::ALL {
                        map.activate_face(&self.backend, face)?;
                        self.backend.clear(None, true);
                        material.use_program()?;
                        material.write_uniform(
                            LIGHT_VIEW_PROJECTION,
                            0,
                            UniformValue::Mat4(point.face_view_projection(face)),
                        )?;
                        material.write_uniform(LIGHT_POSITION, 0, UniformValue::Vec3(position))?;
                        material.write_uniform(SHADOW_FAR, 0, UniformValue::Float(point.shadow_far()))?;
                        for (geometry, world) in &casters {
                            let geometry = geometry_mut_in(&mut scene.geometries, *geometry)?;
                            if draw_shadow_caster(&self.backend, material, geometry, world)? {
                                draws += 1;
                            }
                        }
                        views += 1;
                    }
                }
                LightKind::Ambient | LightKind::AmbientIbl(_) => {}
            }
        }
        Ok((views, draws))
    }
}

fn geometry_mut_in(
    geometries: &mut slotmap::SlotMap<GeometryKey, Geometry>,
    key: GeometryKey,
) -> Result<&mut Geometry> {
    geometries
        .get_mut(key)
        .ok_or_else(|| RenderError::InvalidReference(format!("geometry {key:?}")))
}

/// Depth-only draw of one caster with a shadow material whose program is
/// current.
fn draw_shadow_caster(
    backend: &BackendRef,
    material: &Material,
    geometry: &mut Geometry,
    world: &Mat4,
) -> Result<bool> {
    geometry.upload(backend)?;
    material.write_uniform(MODEL_MATRIX, 0, UniformValue::Mat4(*world))?;
    geometry.bind(|semantic| {
        material
            .get_shader_location(semantic.shader_name(), 0)
            .ok()
            .flatten()
    })?;
    geometry.draw()
}
