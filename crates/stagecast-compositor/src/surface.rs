use std::fmt;

use crate::device::{BufferId, GraphicsContext, PlatformSurface, ProgramId, ShaderId, TextureId};
use crate::scheduler::FrameGate;
use crate::target::ResolvedTarget;

/// Stable handle of a surface; never reused by a manager.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct SurfaceHandle(pub u32);

impl fmt::Display for SurfaceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "surface #{}", self.0)
    }
}

/// Identity of a platform element (canvas/window).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct ElementId(pub u64);

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "element {:#x}", self.0)
    }
}

/// Lookup key accepted wherever a surface is addressed.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SurfaceKey {
    Element(ElementId),
    Handle(SurfaceHandle),
}

impl From<ElementId> for SurfaceKey {
    fn from(element: ElementId) -> Self {
        SurfaceKey::Element(element)
    }
}

impl From<SurfaceHandle> for SurfaceKey {
    fn from(handle: SurfaceHandle) -> Self {
        SurfaceKey::Handle(handle)
    }
}

impl fmt::Display for SurfaceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SurfaceKey::Element(e) => write!(f, "{e}"),
            SurfaceKey::Handle(h) => write!(f, "{h}"),
        }
    }
}

/// Read-only snapshot of a surface.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceInfo {
    pub handle: SurfaceHandle,
    pub element: ElementId,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub frame_interval_ms: f64,
    /// Rendering was requested (the loop is armed).
    pub scheduled: bool,
    /// Armed and able to draw: context and shared texture both exist.
    pub is_rendering: bool,
    pub has_shared_texture: bool,
    pub current_target: Option<ResolvedTarget>,
    /// Registered in the pool (false for clean replacements).
    pub pooled: bool,
}

/// GPU objects owned by one surface's context.
#[derive(Debug)]
pub(crate) struct GpuResources {
    pub(crate) vertex_shader: ShaderId,
    pub(crate) fragment_shader: ShaderId,
    pub(crate) program: ProgramId,
    pub(crate) positions: BufferId,
    pub(crate) uvs: BufferId,
    /// Absent until the first successful recreate, and while the surface is 0x0.
    pub(crate) texture: Option<TextureId>,
}

/// Compositing state of one platform element.
pub(crate) struct Surface {
    pub(crate) handle: SurfaceHandle,
    pub(crate) element: ElementId,
    pub(crate) platform: Box<dyn PlatformSurface>,
    pub(crate) ctx: Box<dyn GraphicsContext>,
    pub(crate) gpu: GpuResources,
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) fps: f64,
    pub(crate) gate: FrameGate,
    pub(crate) render_requested: bool,
    pub(crate) current_target: Option<ResolvedTarget>,
}

impl Surface {
    pub(crate) fn is_rendering(&self) -> bool {
        self.render_requested && self.gpu.texture.is_some()
    }

    pub(crate) fn info(&self, pooled: bool) -> SurfaceInfo {
        SurfaceInfo {
            handle: self.handle,
            element: self.element,
            width: self.width,
            height: self.height,
            fps: self.fps,
            frame_interval_ms: self.gate.interval_ms(),
            scheduled: self.render_requested,
            is_rendering: self.is_rendering(),
            has_shared_texture: self.gpu.texture.is_some(),
            current_target: self.current_target.clone(),
            pooled,
        }
    }

    /// Stops rendering, deletes every GPU object and drops the context.
    ///
    /// Hands back the platform element so a replacement can be bound to it.
    pub(crate) fn release(mut self) -> Box<dyn PlatformSurface> {
        self.render_requested = false;
        release_gpu(self.ctx.as_mut(), &mut self.gpu);
        log::debug!("{} released", self.handle);
        self.platform
    }
}

pub(crate) fn release_gpu(ctx: &mut dyn GraphicsContext, gpu: &mut GpuResources) {
    if let Some(texture) = gpu.texture.take() {
        ctx.delete_texture(texture);
    }
    ctx.delete_buffer(gpu.positions);
    ctx.delete_buffer(gpu.uvs);
    ctx.delete_program(gpu.program);
    ctx.delete_shader(gpu.vertex_shader);
    ctx.delete_shader(gpu.fragment_shader);
}
