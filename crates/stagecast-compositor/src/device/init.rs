/// Initialization parameters for the wgpu backend.
///
/// Keep this structure small. Add flags only when a concrete platform needs one.
#[derive(Debug, Clone)]
pub struct WgpuInit {
    /// Prefer an sRGB surface format when available.
    ///
    /// Host frames arrive already encoded, so the default is a linear (non-sRGB)
    /// format that passes texels through untouched.
    pub prefer_srgb: bool,

    /// Present mode (swap behavior). FIFO paces presentation to the display.
    pub present_mode: wgpu::PresentMode,

    pub power_preference: wgpu::PowerPreference,

    /// Limits requested from the adapter/device.
    pub required_limits: wgpu::Limits,

    /// Desired maximum frame latency for the surface (a hint).
    pub desired_maximum_frame_latency: u32,
}

impl Default for WgpuInit {
    fn default() -> Self {
        Self {
            prefer_srgb: false,
            present_mode: wgpu::PresentMode::Fifo,
            power_preference: wgpu::PowerPreference::HighPerformance,
            required_limits: wgpu::Limits::default(),
            desired_maximum_frame_latency: 2,
        }
    }
}
