//! Stagecast canvas compositor.
//!
//! Each platform element (canvas/window) gets a [`CompositorManager`] surface:
//! its own graphics context, a textured quad and a shared texture the host
//! application renders a scene, item, source or workspace view into. The
//! embedder drives drawing through [`Scheduler::tick`].
//!
//! ```no_run
//! # use stagecast_compositor::*;
//! # async fn demo<H: Host>(host: H, canvas: Box<dyn PlatformSurface>) -> Result<()> {
//! let mut mgr = CompositorManager::new(host, CompositorConfig::default());
//! let handle = mgr.prepare_surface(canvas, SurfaceOptions::default().fps(60.0))?;
//! mgr.draw_target(handle, &Target::Scene(SceneRef::Index(0))).await?;
//! mgr.toggle_rendering(handle, true)?;
//! mgr.tick(0.0);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod device;
pub mod error;
pub mod host;
pub mod logging;
pub mod math;
pub mod target;
pub mod time;

mod bridge;
mod init;
mod pool;
mod scheduler;
mod surface;

#[cfg(test)]
mod testing;

pub use bridge::{window_name, wire_content};
pub use config::CompositorConfig;
pub use device::{GraphicsContext, PlatformSurface};
pub use error::{CompositorError, Result};
pub use host::{CallbackHost, Host, HostError};
pub use pool::{CompositorManager, SurfaceOptions};
pub use scheduler::Scheduler;
pub use surface::{ElementId, SurfaceHandle, SurfaceInfo, SurfaceKey};
pub use target::{ResolvedTarget, SceneRef, Target, TargetKind, WorkspaceView};
