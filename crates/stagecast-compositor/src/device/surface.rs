use std::sync::Arc;

use winit::window::Window;

use crate::surface::ElementId;

use super::context::{GraphicsContext, PlatformSurface};
use super::gpu::WgpuContext;
use super::init::WgpuInit;
use super::share::SharedTextureRegistry;

/// Platform surface backed by a winit window.
///
/// Each acquired context owns its own wgpu device and swapchain; shared textures
/// are published in `registry`.
#[derive(Clone)]
pub struct WgpuSurface {
    window: Arc<Window>,
    init: WgpuInit,
    registry: SharedTextureRegistry,
}

impl WgpuSurface {
    pub fn new(window: Arc<Window>, init: WgpuInit, registry: SharedTextureRegistry) -> Self {
        Self {
            window,
            init,
            registry,
        }
    }

    pub fn window(&self) -> &Window {
        &self.window
    }
}

impl PlatformSurface for WgpuSurface {
    fn element_id(&self) -> ElementId {
        ElementId(u64::from(self.window.id()))
    }

    fn pixel_size(&self) -> (u32, u32) {
        let size = self.window.inner_size();
        (size.width, size.height)
    }

    fn acquire_context(&self) -> Option<Box<dyn GraphicsContext>> {
        let ctx = pollster::block_on(WgpuContext::new(
            Arc::clone(&self.window),
            &self.init,
            self.registry.clone(),
        ));
        match ctx {
            Ok(ctx) => Some(Box::new(ctx)),
            Err(e) => {
                log::warn!("wgpu context unavailable: {e:#}");
                None
            }
        }
    }
}

/// High-level response after a swapchain error.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) enum SurfaceErrorAction {
    /// Surface must be reconfigured; the frame is skipped.
    Reconfigure,
    /// Transient error; skip the current frame.
    SkipFrame,
    /// Out of memory; nothing will be drawn until the surface is recreated.
    Fatal,
}

pub(crate) fn map_surface_error(err: &wgpu::SurfaceError) -> SurfaceErrorAction {
    match err {
        wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => SurfaceErrorAction::Reconfigure,
        wgpu::SurfaceError::OutOfMemory => SurfaceErrorAction::Fatal,
        wgpu::SurfaceError::Timeout | wgpu::SurfaceError::Other => SurfaceErrorAction::SkipFrame,
    }
}

pub(crate) fn choose_surface_format(
    caps: &wgpu::SurfaceCapabilities,
    prefer_srgb: bool,
) -> Option<wgpu::TextureFormat> {
    let preferred: &[wgpu::TextureFormat] = if prefer_srgb {
        &[
            wgpu::TextureFormat::Bgra8UnormSrgb,
            wgpu::TextureFormat::Rgba8UnormSrgb,
        ]
    } else {
        &[wgpu::TextureFormat::Bgra8Unorm, wgpu::TextureFormat::Rgba8Unorm]
    };

    preferred
        .iter()
        .copied()
        .find(|f| caps.formats.contains(f))
        .or_else(|| caps.formats.first().copied())
}
