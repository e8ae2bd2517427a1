//! Shared texture bridge.
//!
//! Each surface owns one texture allocated through the context's sharing
//! extension. Its cross-process handle is what the host streams frames into;
//! the surface only ever samples it.

use crate::config::CompositorConfig;
use crate::device::{TextureDesc, TextureFilter, TextureWrap};
use crate::error::{CompositorError, Result};
use crate::host::{Host, NEW_WINDOW};
use crate::init;
use crate::pool::CompositorManager;
use crate::surface::{Surface, SurfaceHandle, SurfaceKey};
use crate::target::ResolvedTarget;

/// Texture coordinates of the quad, bottom-left origin, in strip order
/// (top-left, bottom-left, top-right, bottom-right).
pub(crate) const MODEL_UVS: [f32; 8] = [0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 1.0, 0.0];

/// Quad corners in pixels, centred on the origin, in strip order.
pub(crate) fn model_positions(width: u32, height: u32) -> [f32; 12] {
    let x = width as f32 / 2.0;
    let y = height as f32 / 2.0;
    [
        -x, y, 0.0, //
        -x, -y, 0.0, //
        x, y, 0.0, //
        x, -y, 0.0,
    ]
}

/// Name of the host-side window that streams into `handle`'s texture.
pub fn window_name(prefix: &str, handle: SurfaceHandle) -> String {
    format!("{prefix}{}", handle.0)
}

/// Content descriptor sent with [`NEW_WINDOW`].
///
/// `{kind}:{id},1,1&d3dhandle:{shared_handle}`; the two `1`s are fixed flags
/// the host expects.
pub fn wire_content(target: &ResolvedTarget, shared_handle: u64) -> String {
    format!(
        "{}:{},1,1&d3dhandle:{}",
        target.kind.wire_name(),
        target.id,
        shared_handle
    )
}

impl Surface {
    /// Replaces the shared texture with a fresh one sized to the surface.
    ///
    /// A 0x0 surface keeps no texture until it is resized. The old handle is
    /// invalid afterwards; the host has to be re-bound.
    pub(crate) fn recreate_shared_texture(&mut self, config: &CompositorConfig) -> Result<()> {
        if let Some(old) = self.gpu.texture.take() {
            self.ctx.delete_texture(old);
        }
        if self.width == 0 || self.height == 0 {
            log::debug!("{}: 0x0, shared texture deferred", self.handle);
            return Ok(());
        }

        let max = self.ctx.max_texture_size();
        if self.width > max || self.height > max {
            return Err(CompositorError::TextureAllocation(format!(
                "{}x{} exceeds the maximum texture size {max}",
                self.width, self.height
            )));
        }
        let texels = (self.width as usize)
            .checked_mul(self.height as usize)
            .filter(|n| n.checked_mul(4).is_some())
            .ok_or_else(|| {
                CompositorError::TextureAllocation(format!(
                    "{}x{} does not fit in memory",
                    self.width, self.height
                ))
            })?;

        let desc = TextureDesc {
            width: self.width,
            height: self.height,
            filter: TextureFilter::Nearest,
            wrap: TextureWrap::ClampToEdge,
        };
        let pixels = config.placeholder_rgba.repeat(texels);

        let Some(share) = self.ctx.sharing() else {
            return Err(CompositorError::ContextUnavailable(self.element));
        };
        share.set_share_next(true);

        let created = self.ctx.create_texture(&desc, &pixels);
        if let Ok(texture) = &created {
            self.gpu.texture = Some(*texture);
            // The texture only becomes shareable once a pass has used it.
            self.draw();
        }

        if let Some(share) = self.ctx.sharing() {
            share.set_share_next(false);
        }

        let texture = created.map_err(CompositorError::TextureAllocation)?;
        let shared = self.shared_handle();
        log::debug!(
            "{}: shared texture {:?} {}x{} handle {:#x}",
            self.handle,
            texture,
            self.width,
            self.height,
            shared
        );
        Ok(())
    }

    /// Cross-process handle of the current texture, 0 when there is none.
    pub(crate) fn shared_handle(&mut self) -> u64 {
        let Some(texture) = self.gpu.texture else {
            return 0;
        };
        self.ctx
            .sharing()
            .and_then(|share| share.shared_handle(texture))
            .unwrap_or(0)
    }

    /// Rewrites the quad corners for a `width`x`height` surface.
    pub(crate) fn recreate_model(&mut self, width: u32, height: u32) {
        self.ctx
            .update_buffer(self.gpu.positions, &model_positions(width, height));
    }
}

impl<H: Host> CompositorManager<H> {
    /// Shared handle of the surface's current texture (0 when it has none).
    pub fn shared_handle(&mut self, key: impl Into<SurfaceKey>) -> Result<u64> {
        let key = key.into();
        let surface = self
            .find_mut(key)
            .ok_or(CompositorError::SurfaceNotFound(key))?;
        Ok(surface.shared_handle())
    }

    /// Allocates a new shared texture for the surface and returns its handle.
    ///
    /// The previous handle dies with its texture; the host keeps streaming into
    /// nothing until [`set_target`](Self::set_target) is issued again.
    /// [`resize_surface`](Self::resize_surface) does that re-bind itself.
    pub fn recreate_shared_texture(&mut self, key: impl Into<SurfaceKey>) -> Result<u64> {
        let key = key.into();
        let config = self.config().clone();
        let surface = self
            .find_mut(key)
            .ok_or(CompositorError::SurfaceNotFound(key))?;
        surface.recreate_shared_texture(&config)?;
        Ok(surface.shared_handle())
    }

    /// Asks the host to stream `target` into the surface's shared texture.
    ///
    /// The surface's recorded target only changes once the host accepts.
    pub async fn set_target(
        &mut self,
        key: impl Into<SurfaceKey>,
        target: ResolvedTarget,
    ) -> Result<()> {
        let key = key.into();
        let prefix = self.config().window_prefix.clone();
        let surface = self
            .find_mut(key)
            .ok_or(CompositorError::SurfaceNotFound(key))?;

        let shared = surface.shared_handle();
        if shared == 0 {
            log::warn!("{}: binding {target} without a shared texture", surface.handle);
        }
        let args = [window_name(&prefix, surface.handle), wire_content(&target, shared)];
        log::debug!("{NEW_WINDOW}({}, {})", args[0], args[1]);

        self.host().invoke(NEW_WINDOW, &args).await?;

        if let Some(surface) = self.find_mut(key) {
            surface.current_target = Some(target);
        }
        Ok(())
    }

    /// Applies a new element size: viewport, camera, quad and shared texture.
    ///
    /// When the surface already streams a target, the host is re-bound to the
    /// new texture. Returns the new shared handle.
    pub async fn resize_surface(
        &mut self,
        key: impl Into<SurfaceKey>,
        width: u32,
        height: u32,
    ) -> Result<u64> {
        let key = key.into();
        let config = self.config().clone();
        let surface = self
            .find_mut(key)
            .ok_or(CompositorError::SurfaceNotFound(key))?;

        if (surface.width, surface.height) == (width, height) && surface.gpu.texture.is_some() {
            return Ok(surface.shared_handle());
        }
        log::debug!(
            "{}: resize {}x{} -> {width}x{height}",
            surface.handle,
            surface.width,
            surface.height
        );

        surface.width = width;
        surface.height = height;
        surface.ctx.set_viewport(width, height);
        init::upload_camera(surface.ctx.as_mut(), surface.gpu.program, width, height, &config);
        surface.recreate_model(width, height);
        surface.recreate_shared_texture(&config)?;

        let shared = surface.shared_handle();
        if let Some(target) = surface.current_target.clone() {
            if shared != 0 {
                self.set_target(key, target).await?;
            }
        }
        Ok(shared)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{Call, HeadlessFaults, HeadlessSurface, HEADLESS_MAX_TEXTURE_SIZE};
    use crate::host::HostError;
    use crate::surface::ElementId;
    use crate::target::TargetKind;
    use crate::testing::manager;
    use crate::SurfaceOptions;
    use pollster::block_on;

    fn scene(id: &str) -> ResolvedTarget {
        ResolvedTarget {
            kind: TargetKind::Scene,
            id: id.to_string(),
        }
    }

    // ── wire format ───────────────────────────────────────────────────────

    #[test]
    fn window_name_uses_handle_index() {
        assert_eq!(window_name("texture_", SurfaceHandle(0)), "texture_0");
        assert_eq!(window_name("canvas-", SurfaceHandle(12)), "canvas-12");
    }

    #[test]
    fn wire_content_layout() {
        let item = ResolvedTarget {
            kind: TargetKind::Item,
            id: "42".into(),
        };
        assert_eq!(wire_content(&item, 77), "dupvideoitem:42,1,1&d3dhandle:77");
        assert_eq!(
            wire_content(&scene("{abc}"), 5),
            "dupscene:{abc},1,1&d3dhandle:5"
        );
    }

    #[test]
    fn quad_is_centred() {
        let p = model_positions(4, 2);
        assert_eq!(&p[0..3], &[-2.0, 1.0, 0.0]);
        assert_eq!(&p[9..12], &[2.0, -1.0, 0.0]);
    }

    // ── bridge ────────────────────────────────────────────────────────────

    #[test]
    fn prepared_surface_has_a_shared_handle() {
        let (mut mgr, _) = manager();
        let canvas = HeadlessSurface::new(1, 64, 64);
        let handle = mgr
            .prepare_surface(Box::new(canvas), SurfaceOptions::default())
            .unwrap();
        assert_ne!(mgr.shared_handle(handle).unwrap(), 0);
    }

    #[test]
    fn set_target_sends_new_window() {
        let (mut mgr, host) = manager();
        let canvas = HeadlessSurface::new(1, 64, 64);
        let handle = mgr
            .prepare_surface(Box::new(canvas), SurfaceOptions::default())
            .unwrap();
        let shared = mgr.shared_handle(handle).unwrap();

        block_on(mgr.set_target(handle, scene("{s}"))).unwrap();

        let calls = host.calls_to(NEW_WINDOW);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0][0], "texture_0");
        assert_eq!(calls[0][1], format!("dupscene:{{s}},1,1&d3dhandle:{shared}"));
        assert_eq!(
            mgr.surface(handle).unwrap().current_target,
            Some(scene("{s}"))
        );
    }

    #[test]
    fn rejected_set_target_keeps_previous_target() {
        let (mut mgr, host) = manager();
        let canvas = HeadlessSurface::new(1, 8, 8);
        let handle = mgr
            .prepare_surface(Box::new(canvas), SurfaceOptions::default())
            .unwrap();
        block_on(mgr.set_target(handle, scene("a"))).unwrap();

        host.reply(
            NEW_WINDOW,
            Err(HostError::Rejected {
                function: NEW_WINDOW.into(),
                reason: "busy".into(),
            }),
        );
        let err = block_on(mgr.set_target(handle, scene("b"))).unwrap_err();
        assert!(matches!(err, CompositorError::Host(HostError::Rejected { .. })));
        assert_eq!(mgr.surface(handle).unwrap().current_target, Some(scene("a")));
    }

    #[test]
    fn set_target_on_unknown_surface() {
        let (mut mgr, host) = manager();
        let err = block_on(mgr.set_target(ElementId(5), scene("x"))).unwrap_err();
        assert!(matches!(err, CompositorError::SurfaceNotFound(_)));
        assert!(host.calls().is_empty());
    }

    #[test]
    fn recreate_issues_a_new_handle() {
        let (mut mgr, _) = manager();
        let canvas = HeadlessSurface::new(1, 16, 16);
        let log = canvas.log();
        let handle = mgr
            .prepare_surface(Box::new(canvas), SurfaceOptions::default())
            .unwrap();
        let before = mgr.shared_handle(handle).unwrap();

        let after = mgr.recreate_shared_texture(handle).unwrap();
        assert_ne!(after, 0);
        assert_ne!(after, before);
        assert_eq!(log.count(|c| matches!(c, Call::DeleteTexture(_))), 1);
    }

    #[test]
    fn failed_recreate_leaves_no_texture() {
        let (mut mgr, _) = manager();
        let canvas = HeadlessSurface::new(1, 16, 16);
        let faults = canvas.clone();
        let handle = mgr
            .prepare_surface(Box::new(canvas), SurfaceOptions::default())
            .unwrap();

        faults.set_faults(HeadlessFaults {
            texture: true,
            ..Default::default()
        });
        assert!(matches!(
            mgr.recreate_shared_texture(handle),
            Err(CompositorError::TextureAllocation(_))
        ));
        let info = mgr.surface(handle).unwrap();
        assert!(!info.has_shared_texture);
        assert_eq!(mgr.shared_handle(handle).unwrap(), 0);
    }

    #[test]
    fn resize_rebinds_current_target() {
        let (mut mgr, host) = manager();
        let canvas = HeadlessSurface::new(1, 32, 32);
        let log = canvas.log();
        let handle = mgr
            .prepare_surface(Box::new(canvas), SurfaceOptions::default())
            .unwrap();
        block_on(mgr.set_target(handle, scene("{s}"))).unwrap();

        let shared = block_on(mgr.resize_surface(handle, 64, 48)).unwrap();

        let calls = host.calls_to(NEW_WINDOW);
        assert_eq!(calls.len(), 2);
        assert!(calls[1][1].ends_with(&format!("d3dhandle:{shared}")));
        assert!(log.calls().contains(&Call::SetViewport {
            width: 64,
            height: 48
        }));
        let info = mgr.surface(handle).unwrap();
        assert_eq!((info.width, info.height), (64, 48));
    }

    #[test]
    fn resize_without_target_does_not_call_host() {
        let (mut mgr, host) = manager();
        let canvas = HeadlessSurface::new(1, 32, 32);
        let handle = mgr
            .prepare_surface(Box::new(canvas), SurfaceOptions::default())
            .unwrap();
        block_on(mgr.resize_surface(handle, 10, 10)).unwrap();
        assert!(host.calls().is_empty());
    }

    #[test]
    fn resize_to_zero_drops_the_texture() {
        let (mut mgr, _) = manager();
        let canvas = HeadlessSurface::new(1, 32, 32);
        let handle = mgr
            .prepare_surface(Box::new(canvas), SurfaceOptions::default())
            .unwrap();
        assert_eq!(block_on(mgr.resize_surface(handle, 0, 0)).unwrap(), 0);
        assert!(!mgr.surface(handle).unwrap().has_shared_texture);

        assert_ne!(block_on(mgr.resize_surface(handle, 8, 8)).unwrap(), 0);
    }

    #[test]
    fn oversized_resize_is_an_allocation_error() {
        let (mut mgr, _) = manager();
        let canvas = HeadlessSurface::new(1, 32, 32);
        let log = canvas.log();
        let handle = mgr
            .prepare_surface(Box::new(canvas), SurfaceOptions::default())
            .unwrap();
        log.clear();

        let err = block_on(mgr.resize_surface(handle, u32::MAX, u32::MAX)).unwrap_err();
        assert!(matches!(err, CompositorError::TextureAllocation(_)));
        assert!(!mgr.surface(handle).unwrap().has_shared_texture);
        assert_eq!(log.count(|c| matches!(c, Call::CreateTexture { .. })), 0);
        assert_eq!(log.count(|c| matches!(c, Call::SetShareNext(_))), 0);

        // The surface recovers once it is given a size the context supports.
        assert_ne!(block_on(mgr.resize_surface(handle, 32, 32)).unwrap(), 0);
    }

    #[test]
    fn texture_size_limit_is_per_axis() {
        let (mut mgr, _) = manager();
        let canvas = HeadlessSurface::new(1, 8, 8);
        let handle = mgr
            .prepare_surface(Box::new(canvas), SurfaceOptions::default())
            .unwrap();

        let over = HEADLESS_MAX_TEXTURE_SIZE + 1;
        assert!(matches!(
            block_on(mgr.resize_surface(handle, over, 1)),
            Err(CompositorError::TextureAllocation(_))
        ));
        assert_ne!(
            block_on(mgr.resize_surface(handle, HEADLESS_MAX_TEXTURE_SIZE, 1)).unwrap(),
            0
        );
    }
}
