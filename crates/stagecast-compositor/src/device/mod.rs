//! Platform graphics boundary.
//!
//! The compositor reaches the GPU only through [`GraphicsContext`], acquired from a
//! [`PlatformSurface`]. Two backends ship with the crate:
//! - headless: no GPU; records calls and issues synthetic shared handles
//! - wgpu: presents into a winit window and publishes shared textures in an
//!   in-process [`SharedTextureRegistry`]

mod context;
mod gpu;
mod headless;
mod init;
mod share;
mod surface;

pub use context::{
    BufferId, GraphicsContext, PlatformSurface, ProgramId, ProgramLayout, QuadDraw, ShaderId,
    ShaderStage, SharedTextureExt, TextureDesc, TextureFilter, TextureId, TextureWrap, Uniform,
};
pub use gpu::WgpuContext;
pub use headless::{
    Call, CallLog, HeadlessContext, HeadlessFaults, HeadlessSurface, HEADLESS_MAX_TEXTURE_SIZE,
};
pub use init::WgpuInit;
pub use share::SharedTextureRegistry;
pub use surface::WgpuSurface;
