//! Stagecast studio: one window, one compositor surface, fed by an in-process
//! host that streams a test pattern.
//!
//! Usage: `stagecast-studio [fps]`

mod app;
mod loopback;

use anyhow::{Context, Result};
use winit::event_loop::EventLoop;

use stagecast_compositor::logging::{init_logging, LoggingConfig};

use crate::app::{Studio, StudioConfig};

fn main() -> Result<()> {
    init_logging(LoggingConfig::default());

    let mut config = StudioConfig::default();
    if let Some(arg) = std::env::args().nth(1) {
        config.fps = arg
            .parse()
            .with_context(|| format!("fps must be a number, got `{arg}`"))?;
    }
    log::info!("starting studio at {} fps", config.fps);

    let event_loop = EventLoop::new().context("failed to create winit EventLoop")?;
    let mut studio = Studio::new(config);
    event_loop
        .run_app(&mut studio)
        .context("winit event loop terminated with error")?;

    Ok(())
}
