use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow};
use winit::window::{Window, WindowId};

use stagecast_compositor::device::{SharedTextureRegistry, WgpuInit, WgpuSurface};
use stagecast_compositor::time::{Clock, SystemClock};
use stagecast_compositor::{
    CompositorConfig, CompositorManager, Scheduler, SceneRef, SurfaceHandle, SurfaceOptions, Target,
};

use crate::loopback::{Bindings, LoopbackHost};

/// Window and compositor settings of the studio.
#[derive(Debug, Clone)]
pub struct StudioConfig {
    pub title: String,
    pub initial_size: LogicalSize<f64>,
    pub fps: f64,
    pub target: Target,
    pub wgpu: WgpuInit,
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            title: "stagecast studio".to_string(),
            initial_size: LogicalSize::new(960.0, 540.0),
            fps: 30.0,
            target: Target::Scene(SceneRef::Index(0)),
            wgpu: WgpuInit::default(),
        }
    }
}

/// One window, one surface, fed by the loopback host.
pub struct Studio {
    config: StudioConfig,
    compositor: CompositorManager<LoopbackHost>,
    bindings: Bindings,
    registry: SharedTextureRegistry,
    clock: SystemClock,

    window: Option<Arc<Window>>,
    surface: Option<SurfaceHandle>,
    frame: u32,
    /// When the next frame is due; `None` while nothing renders.
    wake_at: Option<Instant>,
}

impl Studio {
    pub fn new(config: StudioConfig) -> Self {
        let host = LoopbackHost::new();
        let bindings = host.bindings();
        Self {
            config,
            compositor: CompositorManager::new(host, CompositorConfig::default()),
            bindings,
            registry: SharedTextureRegistry::new(),
            clock: SystemClock::new(),
            window: None,
            surface: None,
            frame: 0,
            wake_at: None,
        }
    }

    fn start(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let attrs = Window::default_attributes()
            .with_title(self.config.title.clone())
            .with_inner_size(self.config.initial_size);
        let window = Arc::new(
            event_loop
                .create_window(attrs)
                .context("failed to create window")?,
        );

        let platform = WgpuSurface::new(
            Arc::clone(&window),
            self.config.wgpu.clone(),
            self.registry.clone(),
        );
        let handle = self
            .compositor
            .prepare_surface(
                Box::new(platform),
                SurfaceOptions::default().fps(self.config.fps),
            )
            .context("failed to prepare compositor surface")?;

        pollster::block_on(self.compositor.draw_target(handle, &self.config.target))
            .context("host refused the initial target")?;
        self.compositor
            .toggle_rendering(handle, true)
            .context("failed to start rendering")?;

        self.clock.reset();
        self.wake_at = Some(Instant::now());
        self.window = Some(window);
        self.surface = Some(handle);
        Ok(())
    }

    /// Plays the host's part: writes the next test-pattern frame into every
    /// bound shared texture.
    fn stream_frame(&mut self) {
        self.frame = self.frame.wrapping_add(1);
        for (name, binding) in self.bindings.borrow().iter() {
            let Some((width, height)) = self.registry.size(binding.shared_handle) else {
                continue;
            };
            let pixels = test_pattern(width, height, self.frame);
            if !self.registry.write(binding.shared_handle, &pixels) {
                log::debug!("{name}: stale handle {}", binding.shared_handle);
            }
        }
    }

    fn resize(&mut self, width: u32, height: u32) {
        let Some(handle) = self.surface else { return };
        match pollster::block_on(self.compositor.resize_surface(handle, width, height)) {
            Ok(shared) => {
                log::debug!("{handle}: {width}x{height}, shared handle {shared}");
                self.wake_at = Some(Instant::now());
            }
            Err(e) => log::error!("{handle}: resize failed: {e}"),
        }
    }
}

impl ApplicationHandler for Studio {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(e) = self.start(event_loop) {
            log::error!("studio failed to start: {e:#}");
            event_loop.exit();
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        match plan_wake(Instant::now(), self.wake_at) {
            Wake::RedrawNow => {
                self.wake_at = None;
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
                event_loop.set_control_flow(ControlFlow::Wait);
            }
            Wake::At(at) => event_loop.set_control_flow(ControlFlow::WaitUntil(at)),
            Wake::Idle => event_loop.set_control_flow(ControlFlow::Wait),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                self.compositor.shutdown();
                self.surface = None;
                self.window = None;
                event_loop.exit();
            }

            WindowEvent::Resized(size) => self.resize(size.width, size.height),

            WindowEvent::ScaleFactorChanged { .. } => {
                if let Some(size) = self.window.as_ref().map(|w| w.inner_size()) {
                    self.resize(size.width, size.height);
                }
            }

            WindowEvent::RedrawRequested => {
                self.stream_frame();
                let drawn = self.compositor.tick(self.clock.now_ms());
                log::trace!("tick drew {drawn} surface(s)");

                let due = self.compositor.next_frame_in_ms(self.clock.now_ms());
                self.wake_at = wake_after(Instant::now(), due);
            }

            _ => {}
        }
    }
}

/// What the event loop does before waiting for the next event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Wake {
    RedrawNow,
    At(Instant),
    Idle,
}

fn plan_wake(now: Instant, wake_at: Option<Instant>) -> Wake {
    match wake_at {
        Some(at) if at <= now => Wake::RedrawNow,
        Some(at) => Wake::At(at),
        None => Wake::Idle,
    }
}

/// Instant the scheduler's next frame falls due, `due_in_ms` from `now`.
fn wake_after(now: Instant, due_in_ms: Option<f64>) -> Option<Instant> {
    due_in_ms.map(|ms| now + Duration::from_secs_f64(ms.max(0.0) / 1000.0))
}

/// Scrolling RGB gradient, top row first.
fn test_pattern(width: u32, height: u32, frame: u32) -> Vec<u8> {
    let (w, h) = (width.max(1), height.max(1));
    let mut pixels = Vec::with_capacity(width as usize * height as usize * 4);
    for y in 0..height {
        for x in 0..width {
            let r = (x.wrapping_add(frame) % w * 255 / w) as u8;
            let g = (y * 255 / h) as u8;
            let b = if (x / 32 + y / 32) % 2 == 0 { 64 } else { 192 };
            pixels.extend_from_slice(&[r, g, b, 255]);
        }
    }
    pixels
}
