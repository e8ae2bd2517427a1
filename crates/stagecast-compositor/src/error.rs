use crate::device::ShaderStage;
use crate::host::HostError;
use crate::surface::{ElementId, SurfaceKey};

/// Convenience result type used across the compositor.
pub type Result<T> = std::result::Result<T, CompositorError>;

/// Failures surfaced to callers of the compositor.
///
/// GPU errors are fatal for the affected surface only; nothing here is retried.
#[derive(thiserror::Error, Debug)]
pub enum CompositorError {
    /// The platform refused to hand out a graphics context (or one without
    /// texture sharing).
    #[error("graphics context unavailable for {0}")]
    ContextUnavailable(ElementId),

    /// A fixed shader failed to compile; carries the compiler log.
    #[error("{stage} shader failed to compile: {log}")]
    ShaderCompile { stage: ShaderStage, log: String },

    /// The quad program failed to link; carries the linker log.
    #[error("quad program failed to link: {log}")]
    ProgramLink { log: String },

    /// The shared texture could not be allocated.
    #[error("shared texture allocation failed: {0}")]
    TextureAllocation(String),

    #[error("no surface for {0}")]
    SurfaceNotFound(SurfaceKey),

    /// A scene/item/source/workspace reference could not be interpreted.
    #[error("invalid reference: {0}")]
    InvalidReference(String),

    /// More than one live surface claims the same element. The pool keeps one
    /// surface per element, so this marks a broken invariant.
    #[error("{matches} surfaces bound to {element}")]
    AmbiguousClean { element: ElementId, matches: usize },

    #[error(transparent)]
    Host(#[from] HostError),
}

impl CompositorError {
    /// Build a [`CompositorError::InvalidReference`] value.
    pub fn invalid_reference(msg: impl Into<String>) -> Self {
        Self::InvalidReference(msg.into())
    }
}
