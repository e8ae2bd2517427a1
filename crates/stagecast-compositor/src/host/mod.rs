//! Host application boundary.
//!
//! Everything the compositor asks of the host goes through [`Host::invoke`]: a
//! named function, string arguments, one string reply. [`CallbackHost`] adapts
//! transports that answer out of band, keyed by a call id.

mod callback;

use std::future::Future;

pub use callback::{CallbackHost, HostRequest};

/// Binds a window name to a render target and a shared texture handle.
pub const NEW_WINDOW: &str = "NewWindow";

/// Scene uid for a numeric scene index.
pub const GET_SCENE_UID: &str = "GetSceneUid";

/// Comma-separated ids of the items showing a source.
pub const GET_SOURCE_ITEM_IDS: &str = "GetSourceItemIds";

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    #[error("unknown host function `{0}`")]
    UnknownFunction(String),

    #[error("host rejected `{function}`: {reason}")]
    Rejected { function: String, reason: String },

    /// The transport went away before answering.
    #[error("host transport closed before answering")]
    Disconnected,
}

/// Asynchronous host function invocation.
///
/// There is no timeout: a call the host never answers stays pending.
pub trait Host {
    fn invoke(
        &self,
        function: &str,
        args: &[String],
    ) -> impl Future<Output = Result<String, HostError>>;
}
