use std::fmt;

use crate::math::ColumnMajor;
use crate::surface::ElementId;

macro_rules! gpu_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);
    };
}

gpu_id!(
    /// Compiled shader stage owned by a context.
    ShaderId
);
gpu_id!(
    /// Linked vertex + fragment program owned by a context.
    ProgramId
);
gpu_id!(
    /// Vertex buffer owned by a context.
    BufferId
);
gpu_id!(
    /// 2D texture owned by a context.
    TextureId
);

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Fragment => f.write_str("fragment"),
        }
    }
}

/// Matrix uniforms of the quad program.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Uniform {
    Projection,
    View,
}

/// Fixed input bindings of the quad program.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ProgramLayout {
    /// Attribute location of the `vec3` position.
    pub position_location: u32,
    /// Attribute location of the `vec2` texture coordinate.
    pub uv_location: u32,
    /// Texture unit the sampler reads from.
    pub sampler_unit: u32,
}

impl ProgramLayout {
    pub const QUAD: Self = Self {
        position_location: 0,
        uv_location: 1,
        sampler_unit: 0,
    };
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum TextureFilter {
    Nearest,
    Linear,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum TextureWrap {
    ClampToEdge,
    Repeat,
}

/// RGBA8 2D texture description.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    pub filter: TextureFilter,
    pub wrap: TextureWrap,
}

/// One triangle-strip draw of the textured quad.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct QuadDraw {
    pub program: ProgramId,
    pub positions: BufferId,
    pub uvs: BufferId,
    pub texture: TextureId,
    pub vertex_count: u32,
}

/// Vendor extension that exposes textures across the process boundary.
pub trait SharedTextureExt {
    /// While set, newly created textures are allocated as shared resources.
    fn set_share_next(&mut self, on: bool);

    /// Cross-process handle of `texture`; `None` if it was not created shared.
    fn shared_handle(&mut self, texture: TextureId) -> Option<u64>;
}

/// Graphics context bound to exactly one platform surface.
///
/// Object ids are only meaningful to the context that issued them.
pub trait GraphicsContext {
    fn set_viewport(&mut self, width: u32, height: u32);
    fn set_clear_color(&mut self, rgba: [f32; 4]);

    /// Compiles one stage; `Err` carries the compiler log.
    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> Result<ShaderId, String>;

    /// Links two stages with the given attribute/sampler bindings; `Err` carries
    /// the linker log.
    fn link_program(
        &mut self,
        vertex: ShaderId,
        fragment: ShaderId,
        layout: &ProgramLayout,
    ) -> Result<ProgramId, String>;

    fn set_uniform_matrix(&mut self, program: ProgramId, uniform: Uniform, value: &ColumnMajor);

    fn create_buffer(&mut self, data: &[f32]) -> BufferId;
    fn update_buffer(&mut self, buffer: BufferId, data: &[f32]);

    /// Largest width or height `create_texture` accepts.
    fn max_texture_size(&self) -> u32;

    /// Allocates a texture seeded with tightly packed RGBA8 rows.
    fn create_texture(&mut self, desc: &TextureDesc, rgba: &[u8]) -> Result<TextureId, String>;

    /// Clears the target with the clear colour and draws `draw`, then presents.
    fn draw_quad(&mut self, draw: &QuadDraw);

    fn delete_texture(&mut self, texture: TextureId);
    fn delete_buffer(&mut self, buffer: BufferId);
    fn delete_program(&mut self, program: ProgramId);
    fn delete_shader(&mut self, shader: ShaderId);

    /// Texture sharing extension, if the context exposes one.
    fn sharing(&mut self) -> Option<&mut dyn SharedTextureExt>;
}

/// Platform element (canvas/window) a surface renders into.
pub trait PlatformSurface {
    /// Stable identity of the element.
    fn element_id(&self) -> ElementId;

    /// Current drawable size in physical pixels.
    fn pixel_size(&self) -> (u32, u32);

    /// Creates a graphics context for the element; `None` when the platform
    /// refuses.
    fn acquire_context(&self) -> Option<Box<dyn GraphicsContext>>;
}
