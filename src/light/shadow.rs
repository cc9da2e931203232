//! Shadow State
//!
//! Shadow-map ownership shared by every shadow-casting light kind.
//!
//! Lifecycle:
//!
//! ```text
//! Uninitialized --init()--> Enabled (maps built) <--> Disabled (maps kept)
//!               \-init()--> Disabled (no maps) --enable--> Enabled (maps built)
//! ```
//!
//! Maps are built the first time shadows are enabled and kept for the life of
//! the light, so toggling shadows off and on again never reallocates.

use serde::{Deserialize, Serialize};

use crate::backend::{BackendRef, TextureFormat};
use crate::errors::{RenderError, Result};
use crate::resources::{RenderTarget, RenderTargetDescriptor, RenderTargetKind};

/// Depth format of every shadow map.
pub const SHADOW_MAP_FORMAT: TextureFormat = TextureFormat::Depth32Float;

/// Percentage-closer filtering kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ShadowSoftness {
    /// 1 sample.
    Hard,
    /// 3x3 grid, 9 samples.
    #[default]
    Soft,
    /// 3x3 grid plus a ring of 8 at twice the distance, 17 samples.
    VerySoft,
}

impl ShadowSoftness {
    /// Value of the `softness` shader uniform.
    #[must_use]
    pub fn shader_level(self) -> i32 {
        match self {
            Self::Hard => 0,
            Self::Soft => 1,
            Self::VerySoft => 2,
        }
    }

    #[must_use]
    pub fn sample_count(self) -> usize {
        match self {
            Self::Hard => 1,
            Self::Soft => 9,
            Self::VerySoft => 17,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadowPhase {
    Uninitialized,
    Disabled,
    Enabled,
}

/// What maps a light needs: `count` targets of `kind`, `size` texels square.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShadowMapLayout {
    pub kind: RenderTargetKind,
    pub count: usize,
    pub size: u32,
}

#[derive(Debug)]
pub struct ShadowState {
    phase: ShadowPhase,
    requested: bool,
    layout: ShadowMapLayout,
    maps: Vec<RenderTarget>,
    pub bias: f32,
    pub softness: ShadowSoftness,
}

impl ShadowState {
    #[must_use]
    pub fn new(layout: ShadowMapLayout, bias: f32, softness: ShadowSoftness) -> Self {
        Self {
            phase: ShadowPhase::Uninitialized,
            requested: false,
            layout,
            maps: Vec::new(),
            bias,
            softness,
        }
    }

    #[must_use]
    pub fn phase(&self) -> ShadowPhase {
        self.phase
    }

    /// True once `init` ran with shadows requested, or shadows were enabled
    /// after it.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.phase == ShadowPhase::Enabled
    }

    /// Whether shadows were requested, regardless of phase.
    #[must_use]
    pub fn is_requested(&self) -> bool {
        self.requested
    }

    #[must_use]
    pub fn layout(&self) -> ShadowMapLayout {
        self.layout
    }

    /// Records whether shadows are wanted at `init` time. Has no effect on
    /// the phase of an initialized state; use [`Self::set_enabled`] there.
    pub fn request(&mut self, enabled: bool) {
        self.requested = enabled;
    }

    /// Leaves `Uninitialized`, building the maps if shadows are requested.
    /// Calling it again is a no-op.
    pub fn init(&mut self, backend: &BackendRef, label: &str) -> Result<()> {
        if self.phase != ShadowPhase::Uninitialized {
            return Ok(());
        }
        if self.requested {
            self.build_maps(backend, label)?;
            self.phase = ShadowPhase::Enabled;
        } else {
            self.phase = ShadowPhase::Disabled;
        }
        Ok(())
    }

    /// Enables or disables shadows. Enabling a light without maps builds them
    /// (initializing the light if needed); disabling keeps them.
    pub fn set_enabled(&mut self, backend: &BackendRef, label: &str, enabled: bool) -> Result<()> {
        self.requested = enabled;
        if self.phase == ShadowPhase::Uninitialized {
            return self.init(backend, label);
        }
        if enabled {
            self.ensure_maps(backend, label)?;
            self.phase = ShadowPhase::Enabled;
        } else {
            self.phase = ShadowPhase::Disabled;
        }
        Ok(())
    }

    /// Builds any missing maps. Returns `true` if maps were built.
    pub fn ensure_maps(&mut self, backend: &BackendRef, label: &str) -> Result<bool> {
        if self.maps.len() == self.layout.count {
            return Ok(false);
        }
        self.build_maps(backend, label)?;
        Ok(true)
    }

    fn build_maps(&mut self, backend: &BackendRef, label: &str) -> Result<()> {
        let mut maps = Vec::with_capacity(self.layout.count);
        for i in 0..self.layout.count {
            let name = format!("{label}.shadow{i}");
            let desc = match self.layout.kind {
                RenderTargetKind::TwoD => {
                    RenderTargetDescriptor::new_2d(&name, self.layout.size, self.layout.size)
                }
                RenderTargetKind::Cube => RenderTargetDescriptor::new_cube(&name, self.layout.size),
            }
            .with_color(false)
            .with_depth_format(SHADOW_MAP_FORMAT);
            maps.push(RenderTarget::new(backend, &desc)?);
        }
        log::debug!(
            "built {} {:?} shadow map(s) of {} for {label:?}",
            maps.len(),
            self.layout.kind,
            self.layout.size
        );
        self.maps = maps;
        Ok(())
    }

    /// Changes the number of maps. Existing maps are released; the next
    /// [`Self::ensure_maps`] rebuilds them.
    pub fn set_map_count(&mut self, count: usize) {
        if count != self.layout.count {
            self.layout.count = count;
            self.maps.clear();
        }
    }

    /// Changes the map resolution. Existing maps are released.
    pub fn set_map_size(&mut self, size: u32) {
        if size != self.layout.size {
            self.layout.size = size;
            self.maps.clear();
        }
    }

    #[must_use]
    pub fn has_maps(&self) -> bool {
        !self.maps.is_empty() && self.maps.len() == self.layout.count
    }

    #[must_use]
    pub fn maps(&self) -> &[RenderTarget] {
        &self.maps
    }

    pub fn map(&self, index: usize) -> Result<&RenderTarget> {
        self.maps.get(index).ok_or(RenderError::OutOfRange {
            context: "shadow map",
            index,
            len: self.maps.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    use crate::backend::HeadlessBackend;

    fn layout(count: usize) -> ShadowMapLayout {
        ShadowMapLayout {
            kind: RenderTargetKind::TwoD,
            count,
            size: 64,
        }
    }

    #[test]
    fn init_without_request_builds_nothing() {
        let headless = Rc::new(HeadlessBackend::new());
        let backend: BackendRef = headless.clone();
        let mut state = ShadowState::new(layout(2), 0.005, ShadowSoftness::Soft);
        state.init(&backend, "sun").unwrap();
        assert_eq!(state.phase(), ShadowPhase::Disabled);
        assert!(!state.has_maps());
        assert_eq!(headless.live_framebuffers(), 0);
    }

    #[test]
    fn enable_builds_lazily_and_disable_keeps_maps() {
        let headless = Rc::new(HeadlessBackend::new());
        let backend: BackendRef = headless.clone();
        let mut state = ShadowState::new(layout(2), 0.005, ShadowSoftness::Soft);
        state.init(&backend, "sun").unwrap();

        state.set_enabled(&backend, "sun", true).unwrap();
        assert_eq!(state.phase(), ShadowPhase::Enabled);
        assert_eq!(state.maps().len(), 2);
        assert_eq!(headless.live_framebuffers(), 2);

        state.set_enabled(&backend, "sun", false).unwrap();
        assert_eq!(state.phase(), ShadowPhase::Disabled);
        assert_eq!(state.maps().len(), 2);

        state.set_enabled(&backend, "sun", true).unwrap();
        assert_eq!(headless.stats().framebuffers_created, 2);
    }

    #[test]
    fn map_index_out_of_range() {
        let state = ShadowState::new(layout(1), 0.0, ShadowSoftness::Hard);
        assert!(matches!(
            state.map(3),
            Err(RenderError::OutOfRange { index: 3, len: 0, .. })
        ));
    }
}
