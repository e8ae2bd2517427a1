//! Surface pool.
//!
//! [`CompositorManager`] owns every live surface. Pooled surfaces are the ones a
//! caller asked to keep track of; detached ones (clean replacements, or surfaces
//! prepared with [`SurfaceOptions::detached`]) are still driven and addressable,
//! they just do not show up in [`CompositorManager::list_prepared_surfaces`].

use std::collections::BTreeMap;

use crate::config::CompositorConfig;
use crate::device::PlatformSurface;
use crate::error::{CompositorError, Result};
use crate::host::Host;
use crate::init;
use crate::scheduler::sanitize_fps;
use crate::surface::{ElementId, Surface, SurfaceHandle, SurfaceInfo, SurfaceKey};

/// Per-call options of [`CompositorManager::prepare_surface`].
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceOptions {
    /// Target frame rate; `None` uses [`CompositorConfig::default_fps`].
    pub fps: Option<f64>,
    pub add_to_pool: bool,
}

impl Default for SurfaceOptions {
    fn default() -> Self {
        Self {
            fps: None,
            add_to_pool: true,
        }
    }
}

impl SurfaceOptions {
    pub fn fps(mut self, fps: f64) -> Self {
        self.fps = Some(fps);
        self
    }

    /// Keep the surface out of the pool listing.
    pub fn detached(mut self) -> Self {
        self.add_to_pool = false;
        self
    }
}

/// Owner of all surfaces and of the host connection.
///
/// Dropping the manager releases every surface, like [`shutdown`](Self::shutdown).
pub struct CompositorManager<H: Host> {
    host: H,
    config: CompositorConfig,
    pool: BTreeMap<SurfaceHandle, Surface>,
    detached: BTreeMap<SurfaceHandle, Surface>,
    next_index: u32,
}

impl<H: Host> CompositorManager<H> {
    pub fn new(host: H, config: CompositorConfig) -> Self {
        Self {
            host,
            config,
            pool: BTreeMap::new(),
            detached: BTreeMap::new(),
            next_index: 0,
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn config(&self) -> &CompositorConfig {
        &self.config
    }

    /// Binds a compositing surface to `platform` and returns its handle.
    ///
    /// An element that already has a live surface gets that surface's handle
    /// back (a detached one joins the pool when `add_to_pool` is set). A failed
    /// initialization leaves the manager exactly as it was.
    pub fn prepare_surface(
        &mut self,
        platform: Box<dyn PlatformSurface>,
        opts: SurfaceOptions,
    ) -> Result<SurfaceHandle> {
        let element = platform.element_id();

        if let Some(handle) = Self::handle_in(&self.pool, element) {
            log::debug!("{element} already prepared as {handle}");
            return Ok(handle);
        }
        if let Some(handle) = Self::handle_in(&self.detached, element) {
            if opts.add_to_pool {
                if let Some(surface) = self.detached.remove(&handle) {
                    self.pool.insert(handle, surface);
                    log::debug!("{handle} joined the pool");
                }
            }
            return Ok(handle);
        }

        let fps = sanitize_fps(
            opts.fps.unwrap_or(self.config.default_fps),
            self.config.default_fps,
        );
        let handle = SurfaceHandle(self.next_index);
        let surface = init::prepare(handle, platform, fps, &self.config)?;
        self.next_index += 1;

        if opts.add_to_pool {
            self.pool.insert(handle, surface);
        } else {
            self.detached.insert(handle, surface);
        }
        Ok(handle)
    }

    /// Snapshots of pooled surfaces in handle order.
    pub fn list_prepared_surfaces(&self) -> Vec<SurfaceInfo> {
        self.pool.values().map(|s| s.info(true)).collect()
    }

    /// Snapshot of any live surface, pooled or detached.
    pub fn surface(&self, key: impl Into<SurfaceKey>) -> Option<SurfaceInfo> {
        let key = key.into();
        if let Some(surface) = Self::lookup(&self.pool, key) {
            return Some(surface.info(true));
        }
        Self::lookup(&self.detached, key).map(|s| s.info(false))
    }

    /// Tears down the surface bound to `element` and prepares a detached
    /// replacement on the same element.
    ///
    /// The replacement has a new handle, context and texture and is not
    /// rendering. Exactly one live surface must be bound to `element`.
    ///
    /// [`prepare_surface`](Self::prepare_surface) never binds a second surface
    /// to an element, so [`CompositorError::AmbiguousClean`] only reports a
    /// broken pool invariant; callers going through this API never see it.
    pub fn clean_surface(&mut self, element: ElementId) -> Result<SurfaceHandle> {
        let matches: Vec<SurfaceHandle> = self
            .surfaces()
            .filter(|s| s.element == element)
            .map(|s| s.handle)
            .collect();

        let old = match matches.as_slice() {
            [] => return Err(CompositorError::SurfaceNotFound(element.into())),
            [handle] => *handle,
            _ => {
                return Err(CompositorError::AmbiguousClean {
                    element,
                    matches: matches.len(),
                })
            }
        };

        let surface = self
            .pool
            .remove(&old)
            .or_else(|| self.detached.remove(&old))
            .ok_or(CompositorError::SurfaceNotFound(old.into()))?;
        let fps = surface.fps;
        let platform = surface.release();

        let handle = SurfaceHandle(self.next_index);
        let replacement = init::prepare(handle, platform, fps, &self.config)?;
        self.next_index += 1;
        self.detached.insert(handle, replacement);

        log::info!("{old} cleaned, {element} now served by {handle}");
        Ok(handle)
    }

    /// Stops and releases every surface. The manager stays usable.
    pub fn shutdown(&mut self) {
        let pool = std::mem::take(&mut self.pool);
        let detached = std::mem::take(&mut self.detached);
        let count = pool.len() + detached.len();
        for surface in pool.into_values().chain(detached.into_values()) {
            surface.release();
        }
        if count > 0 {
            log::info!("compositor shut down, {count} surface(s) released");
        }
    }

    pub(crate) fn find_mut(&mut self, key: SurfaceKey) -> Option<&mut Surface> {
        if Self::lookup(&self.pool, key).is_some() {
            return Self::lookup_mut(&mut self.pool, key);
        }
        Self::lookup_mut(&mut self.detached, key)
    }

    pub(crate) fn surfaces(&self) -> impl Iterator<Item = &Surface> {
        self.pool.values().chain(self.detached.values())
    }

    pub(crate) fn surfaces_mut(&mut self) -> impl Iterator<Item = &mut Surface> {
        self.pool.values_mut().chain(self.detached.values_mut())
    }

    fn handle_in(map: &BTreeMap<SurfaceHandle, Surface>, element: ElementId) -> Option<SurfaceHandle> {
        Self::lookup(map, element.into()).map(|s| s.handle)
    }

    fn lookup(map: &BTreeMap<SurfaceHandle, Surface>, key: SurfaceKey) -> Option<&Surface> {
        match key {
            SurfaceKey::Handle(handle) => map.get(&handle),
            SurfaceKey::Element(element) => map.values().find(|s| s.element == element),
        }
    }

    fn lookup_mut(
        map: &mut BTreeMap<SurfaceHandle, Surface>,
        key: SurfaceKey,
    ) -> Option<&mut Surface> {
        match key {
            SurfaceKey::Handle(handle) => map.get_mut(&handle),
            SurfaceKey::Element(element) => map.values_mut().find(|s| s.element == element),
        }
    }
}

impl<H: Host> Drop for CompositorManager<H> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{Call, HeadlessFaults, HeadlessSurface, ShaderStage};
    use crate::scheduler::Scheduler;
    use crate::testing::manager;

    fn canvas(element: u64) -> HeadlessSurface {
        HeadlessSurface::new(element, 64, 48)
    }

    // ── prepare ───────────────────────────────────────────────────────────

    #[test]
    fn pooled_surfaces_are_listed_in_order() {
        let (mut mgr, _) = manager();
        let a = mgr.prepare_surface(Box::new(canvas(1)), SurfaceOptions::default()).unwrap();
        let b = mgr.prepare_surface(Box::new(canvas(2)), SurfaceOptions::default()).unwrap();
        let c = mgr
            .prepare_surface(Box::new(canvas(3)), SurfaceOptions::default().detached())
            .unwrap();

        assert_eq!((a, b, c), (SurfaceHandle(0), SurfaceHandle(1), SurfaceHandle(2)));
        let listed: Vec<SurfaceHandle> =
            mgr.list_prepared_surfaces().iter().map(|s| s.handle).collect();
        assert_eq!(listed, vec![a, b]);
        assert!(!mgr.surface(c).unwrap().pooled);
    }

    #[test]
    fn preparing_twice_returns_existing_handle() {
        let (mut mgr, _) = manager();
        let first = canvas(1);
        let log = first.log();
        let handle = mgr.prepare_surface(Box::new(first), SurfaceOptions::default()).unwrap();
        assert_ne!(mgr.shared_handle(handle).unwrap(), 0);
        let calls = log.calls().len();

        let again = mgr.prepare_surface(Box::new(canvas(1)), SurfaceOptions::default()).unwrap();
        assert_eq!(again, handle);
        assert_eq!(mgr.list_prepared_surfaces().len(), 1);
        assert_eq!(log.calls().len(), calls);
    }

    #[test]
    fn detached_surface_joins_pool_on_request() {
        let (mut mgr, _) = manager();
        let handle = mgr
            .prepare_surface(Box::new(canvas(1)), SurfaceOptions::default().detached())
            .unwrap();
        assert!(mgr.list_prepared_surfaces().is_empty());

        let again = mgr.prepare_surface(Box::new(canvas(1)), SurfaceOptions::default()).unwrap();
        assert_eq!(again, handle);
        assert_eq!(mgr.list_prepared_surfaces()[0].handle, handle);
    }

    #[test]
    fn failed_prepare_leaves_no_trace() {
        let (mut mgr, _) = manager();
        let broken = canvas(1).with_faults(HeadlessFaults {
            compile: Some(ShaderStage::Vertex),
            ..Default::default()
        });
        let err = mgr.prepare_surface(Box::new(broken), SurfaceOptions::default()).unwrap_err();
        assert!(matches!(err, CompositorError::ShaderCompile { .. }));
        assert!(mgr.list_prepared_surfaces().is_empty());
        assert!(mgr.surface(ElementId(1)).is_none());

        let handle = mgr.prepare_surface(Box::new(canvas(1)), SurfaceOptions::default()).unwrap();
        assert_eq!(handle, SurfaceHandle(0));
    }

    #[test]
    fn fps_option_sets_interval() {
        let (mut mgr, _) = manager();
        let fast = mgr
            .prepare_surface(Box::new(canvas(1)), SurfaceOptions::default().fps(50.0))
            .unwrap();
        let default = mgr.prepare_surface(Box::new(canvas(2)), SurfaceOptions::default()).unwrap();
        let bogus = mgr
            .prepare_surface(Box::new(canvas(3)), SurfaceOptions::default().fps(0.0))
            .unwrap();

        assert_eq!(mgr.surface(fast).unwrap().frame_interval_ms, 20.0);
        assert_eq!(mgr.surface(default).unwrap().fps, 30.0);
        assert_eq!(mgr.surface(bogus).unwrap().fps, 30.0);
    }

    // ── clean ─────────────────────────────────────────────────────────────

    #[test]
    fn clean_replaces_surface_with_fresh_detached_one() {
        let (mut mgr, _) = manager();
        let platform = canvas(1);
        let log = platform.log();
        let old = mgr.prepare_surface(Box::new(platform), SurfaceOptions::default()).unwrap();
        mgr.toggle_rendering(old, true).unwrap();
        let old_shared = mgr.shared_handle(old).unwrap();
        log.clear();

        let new = mgr.clean_surface(ElementId(1)).unwrap();

        assert_ne!(new, old);
        assert!(new > old);
        assert_eq!(log.count(|c| matches!(c, Call::DeleteTexture(_))), 1);
        assert_eq!(log.count(|c| matches!(c, Call::DeleteBuffer(_))), 2);
        assert_eq!(log.count(|c| matches!(c, Call::DeleteProgram(_))), 1);
        assert_eq!(log.count(|c| matches!(c, Call::DeleteShader(_))), 2);

        assert!(mgr.list_prepared_surfaces().is_empty());
        assert!(mgr.surface(old).is_none());
        let info = mgr.surface(ElementId(1)).unwrap();
        assert_eq!(info.handle, new);
        assert!(!info.pooled);
        assert!(!info.scheduled);
        assert_ne!(mgr.shared_handle(new).unwrap(), old_shared);
    }

    #[test]
    fn repeated_prepares_keep_clean_unambiguous() {
        let (mut mgr, _) = manager();
        let first = mgr
            .prepare_surface(Box::new(canvas(1)), SurfaceOptions::default().detached())
            .unwrap();
        mgr.prepare_surface(Box::new(canvas(1)), SurfaceOptions::default()).unwrap();
        mgr.prepare_surface(Box::new(canvas(1)), SurfaceOptions::default().detached())
            .unwrap();

        let live = mgr.surfaces().filter(|s| s.element == ElementId(1)).count();
        assert_eq!(live, 1);
        let replacement = mgr.clean_surface(ElementId(1)).unwrap();
        assert!(replacement > first);
    }

    #[test]
    fn clean_unknown_element_is_not_found() {
        let (mut mgr, _) = manager();
        assert!(matches!(
            mgr.clean_surface(ElementId(42)),
            Err(CompositorError::SurfaceNotFound(_))
        ));
    }

    #[test]
    fn handles_are_never_reused() {
        let (mut mgr, _) = manager();
        mgr.prepare_surface(Box::new(canvas(1)), SurfaceOptions::default()).unwrap();
        let replacement = mgr.clean_surface(ElementId(1)).unwrap();
        let next = mgr.prepare_surface(Box::new(canvas(2)), SurfaceOptions::default()).unwrap();
        assert_eq!(replacement, SurfaceHandle(1));
        assert_eq!(next, SurfaceHandle(2));
    }

    // ── shutdown ──────────────────────────────────────────────────────────

    #[test]
    fn shutdown_releases_everything() {
        let (mut mgr, _) = manager();
        let a = canvas(1);
        let b = canvas(2);
        let (log_a, log_b) = (a.log(), b.log());
        let handle = mgr.prepare_surface(Box::new(a), SurfaceOptions::default()).unwrap();
        mgr.prepare_surface(Box::new(b), SurfaceOptions::default().detached()).unwrap();
        mgr.toggle_rendering(handle, true).unwrap();

        mgr.shutdown();

        assert!(mgr.surface(handle).is_none());
        assert!(!mgr.is_any_rendering());
        assert_eq!(mgr.tick(1_000.0), 0);
        for log in [log_a, log_b] {
            assert_eq!(log.count(|c| matches!(c, Call::DeleteProgram(_))), 1);
        }
    }

    #[test]
    fn drop_releases_surfaces() {
        let platform = canvas(1);
        let log = platform.log();
        {
            let (mut mgr, _) = manager();
            mgr.prepare_surface(Box::new(platform), SurfaceOptions::default()).unwrap();
        }
        assert_eq!(log.count(|c| matches!(c, Call::DeleteTexture(_))), 1);
    }
}
