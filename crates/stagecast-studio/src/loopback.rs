//! In-process host used by the studio.
//!
//! Answers the compositor's host calls itself and remembers which shared
//! texture each window name is bound to, so the studio can stream frames into
//! it.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use stagecast_compositor::host::{GET_SCENE_UID, GET_SOURCE_ITEM_IDS, NEW_WINDOW};
use stagecast_compositor::{Host, HostError};

/// The only scene the loopback host knows.
pub const SCENE_UID: &str = "{5C0FE1D2-8B3A-4E6F-A1C7-0D9E2B4F6A18}";

/// Item that shows the loopback host's only source.
pub const SOURCE_ITEM: &str = "3F9A2C61-74D8-4B05-9E1A-6C2D8F0B5E47";

/// What a host window currently streams, and where to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    /// `{kind}:{id}` part of the content descriptor.
    pub target: String,
    pub shared_handle: u64,
}

/// Window name to binding; clones share the same table.
pub type Bindings = Rc<RefCell<BTreeMap<String, Binding>>>;

#[derive(Clone, Default)]
pub struct LoopbackHost {
    bindings: Bindings,
}

impl LoopbackHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bindings(&self) -> Bindings {
        Rc::clone(&self.bindings)
    }

    fn new_window(&self, args: &[String]) -> Result<String, HostError> {
        let rejected = |reason: &str| HostError::Rejected {
            function: NEW_WINDOW.to_string(),
            reason: reason.to_string(),
        };

        let [name, content] = args else {
            return Err(rejected("expected a window name and a content descriptor"));
        };
        let (target, shared_handle) =
            parse_content(content).ok_or_else(|| rejected("malformed content descriptor"))?;

        log::info!("{name} now streams {target} into handle {shared_handle}");
        self.bindings.borrow_mut().insert(
            name.clone(),
            Binding {
                target,
                shared_handle,
            },
        );
        Ok(String::new())
    }
}

impl Host for LoopbackHost {
    async fn invoke(&self, function: &str, args: &[String]) -> Result<String, HostError> {
        log::debug!("host call {function}({})", args.join(", "));
        match function {
            NEW_WINDOW => self.new_window(args),
            GET_SCENE_UID => match args.first().map(String::as_str) {
                Some("0") => Ok(SCENE_UID.to_string()),
                _ => Ok(String::new()),
            },
            GET_SOURCE_ITEM_IDS => Ok(SOURCE_ITEM.to_string()),
            other => Err(HostError::UnknownFunction(other.to_string())),
        }
    }
}

/// Splits `{kind}:{id},1,1&d3dhandle:{handle}` into `({kind}:{id}, handle)`.
fn parse_content(content: &str) -> Option<(String, u64)> {
    let (target, handle) = content.split_once("&d3dhandle:")?;
    let target = target.strip_suffix(",1,1")?;
    Some((target.to_string(), handle.parse().ok()?))
}
