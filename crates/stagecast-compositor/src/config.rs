/// Compositor-wide settings.
///
/// Defaults reproduce the stock look: 30 fps, opaque black clear colour and
/// placeholder, camera one unit in front of the quad.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositorConfig {
    /// Frame rate used when a caller passes none (or an unusable one).
    pub default_fps: f64,

    /// Host window names are `{window_prefix}{index}`.
    pub window_prefix: String,

    /// Clear colour of every surface (linear RGBA).
    pub clear_color: [f32; 4],

    /// Solid RGBA8 texel used to seed a freshly allocated shared texture.
    ///
    /// Must be opaque: a texture without backing pixels has no shared handle.
    pub placeholder_rgba: [u8; 4],

    /// Near/far planes of the orthographic projection.
    pub near: f32,
    pub far: f32,

    /// Distance of the look-at eye from the quad plane, on +Z.
    pub eye_distance: f32,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            default_fps: 30.0,
            window_prefix: "texture_".to_string(),
            clear_color: [0.0, 0.0, 0.0, 1.0],
            placeholder_rgba: [0, 0, 0, 255],
            near: 0.1,
            far: 1000.0,
            eye_distance: 1.0,
        }
    }
}
