//! Frame-rate limited rendering.
//!
//! Nothing here owns a loop. The embedder calls [`Scheduler::tick`] from its
//! display-refresh callback (winit `RedrawRequested`, a vsync timer, a test
//! clock) and every armed surface whose frame is due draws once.

use crate::device::QuadDraw;
use crate::error::{CompositorError, Result};
use crate::host::Host;
use crate::pool::CompositorManager;
use crate::surface::{Surface, SurfaceKey};

/// Drives per-surface frame gates from an external clock.
pub trait Scheduler {
    /// Draws every armed surface whose frame is due at `now_ms`.
    ///
    /// Returns the number of draws committed.
    fn tick(&mut self, now_ms: f64) -> usize;
}

/// Phase-preserving frame gate.
///
/// A frame is due once `interval_ms` has elapsed since the last one. The anchor
/// then moves by whole intervals so late ticks do not drift the cadence.
#[derive(Debug, Clone)]
pub(crate) struct FrameGate {
    interval_ms: f64,
    last_ms: Option<f64>,
}

impl FrameGate {
    pub(crate) fn new(fps: f64) -> Self {
        Self {
            interval_ms: 1000.0 / fps,
            last_ms: None,
        }
    }

    pub(crate) fn interval_ms(&self) -> f64 {
        self.interval_ms
    }

    /// Forgets the anchor; the next poll only re-anchors.
    pub(crate) fn reset(&mut self) {
        self.last_ms = None;
    }

    /// Milliseconds until [`poll`](Self::poll) would fire; 0 when unanchored
    /// or overdue.
    pub(crate) fn due_in_ms(&self, now_ms: f64) -> f64 {
        match self.last_ms {
            None => 0.0,
            Some(last) => (last + self.interval_ms - now_ms).max(0.0),
        }
    }

    pub(crate) fn poll(&mut self, now_ms: f64) -> bool {
        let Some(last) = self.last_ms else {
            self.last_ms = Some(now_ms);
            return false;
        };

        let elapsed = now_ms - last;
        if elapsed < self.interval_ms {
            return false;
        }
        self.last_ms = Some(now_ms - elapsed % self.interval_ms);
        true
    }
}

/// Clamps a requested frame rate to something the gate can use.
pub(crate) fn sanitize_fps(fps: f64, default_fps: f64) -> f64 {
    if fps.is_finite() && fps > 0.0 {
        fps
    } else {
        log::warn!("unusable fps {fps}, using {default_fps}");
        default_fps
    }
}

impl Surface {
    /// Draws the quad with the current shared texture.
    ///
    /// A no-op returning `false` while there is no texture.
    pub(crate) fn draw(&mut self) -> bool {
        let Some(texture) = self.gpu.texture else {
            return false;
        };
        self.ctx.draw_quad(&QuadDraw {
            program: self.gpu.program,
            positions: self.gpu.positions,
            uvs: self.gpu.uvs,
            texture,
            vertex_count: 4,
        });
        true
    }
}

impl<H: Host> CompositorManager<H> {
    /// Arms or disarms the surface's render loop.
    ///
    /// Stopping is advisory: it takes effect on the next [`Scheduler::tick`].
    pub fn toggle_rendering(&mut self, key: impl Into<SurfaceKey>, on: bool) -> Result<()> {
        let key = key.into();
        let surface = self
            .find_mut(key)
            .ok_or(CompositorError::SurfaceNotFound(key))?;

        if on && !surface.render_requested {
            surface.gate.reset();
        }
        if on != surface.render_requested {
            log::debug!(
                "{}: rendering {}",
                surface.handle,
                if on { "started" } else { "stopped" }
            );
        }
        surface.render_requested = on;
        Ok(())
    }

    /// True while at least one surface is armed and able to draw.
    pub fn is_any_rendering(&self) -> bool {
        self.surfaces().any(Surface::is_rendering)
    }

    /// Milliseconds from `now_ms` until the next tick that would draw.
    ///
    /// `None` while nothing is rendering, so the embedder can sleep until
    /// woken instead of polling.
    pub fn next_frame_in_ms(&self, now_ms: f64) -> Option<f64> {
        self.surfaces()
            .filter(|s| s.is_rendering())
            .map(|s| s.gate.due_in_ms(now_ms))
            .min_by(f64::total_cmp)
    }
}

impl<H: Host> Scheduler for CompositorManager<H> {
    fn tick(&mut self, now_ms: f64) -> usize {
        let mut drawn = 0;
        for surface in self.surfaces_mut() {
            if !surface.is_rendering() || !surface.gate.poll(now_ms) {
                continue;
            }
            if surface.draw() {
                drawn += 1;
            }
        }
        drawn
    }
}
