//! Object Renderers
//!
//! Per-item draw dispatch. The renderer owns one [`ObjectRenderer`] and hands
//! it every queued item of the main pass.

use glam::Mat4;

use crate::backend::BackendRef;
use crate::errors::Result;
use crate::light::LightPack;
use crate::material::Material;
use crate::renderer::queue::RenderItem;
use crate::resources::Geometry;

/// Frame-constant state shared by every draw of the main pass.
pub struct DrawContext<'a> {
    pub backend: &'a BackendRef,
    pub view: &'a Mat4,
    pub projection: &'a Mat4,
    pub light_pack: &'a LightPack,
}

pub trait ObjectRenderer {
    /// Draws one item. `material` is built. Returns whether a draw call was
    /// issued.
    fn render_object(
        &mut self,
        ctx: &DrawContext<'_>,
        item: &RenderItem,
        geometry: &mut Geometry,
        material: &Material,
    ) -> Result<bool>;
}

/// Default renderer for indexed meshes.
#[derive(Debug, Default)]
pub struct MeshRenderer;

impl ObjectRenderer for MeshRenderer {
    fn render_object(
        &mut self,
        ctx: &DrawContext<'_>,
        item: &RenderItem,
        geometry: &mut Geometry,
        material: &Material,
    ) -> Result<bool> {
        geometry.upload(ctx.backend)?;

        material.send_custom_uniforms_to_shader()?;
        material.send_transforms(&item.world, ctx.view, ctx.projection)?;
        ctx.light_pack
            .send_to_material(material, item.layers, item.receive_shadows)?;

        geometry.bind(|semantic| {
            material
                .get_shader_location(semantic.shader_name(), 0)
                .ok()
                .flatten()
        })?;

        log::trace!("draw {:?} with {:?}", item.node, material.name);
        geometry.draw()
    }
}
