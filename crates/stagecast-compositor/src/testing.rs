//! Test doubles shared by the unit tests.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::config::CompositorConfig;
use crate::host::{Host, HostError, NEW_WINDOW};
use crate::pool::CompositorManager;

pub(crate) const SCENE_UID: &str = "{D5AE7C3B-6F0A-4A63-9C1E-2B7A1E4F9C10}";

type Recorded = Vec<(String, Vec<String>)>;

/// Host that records every call and answers from a script.
///
/// `NewWindow` succeeds unless scripted otherwise; any other unscripted
/// function is unknown. Clones share state.
#[derive(Clone, Default)]
pub(crate) struct ScriptedHost {
    calls: Rc<RefCell<Recorded>>,
    replies: Rc<RefCell<HashMap<String, Result<String, HostError>>>>,
}

impl ScriptedHost {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Answer every later call to `function` with `result`.
    pub(crate) fn reply(&self, function: &str, result: Result<String, HostError>) {
        self.replies.borrow_mut().insert(function.to_string(), result);
    }

    pub(crate) fn calls(&self) -> Recorded {
        self.calls.borrow().clone()
    }

    /// Argument lists of every call to `function`, in order.
    pub(crate) fn calls_to(&self, function: &str) -> Vec<Vec<String>> {
        self.calls
            .borrow()
            .iter()
            .filter(|(f, _)| f == function)
            .map(|(_, args)| args.clone())
            .collect()
    }
}

impl Host for ScriptedHost {
    async fn invoke(&self, function: &str, args: &[String]) -> Result<String, HostError> {
        self.calls
            .borrow_mut()
            .push((function.to_string(), args.to_vec()));

        if let Some(reply) = self.replies.borrow().get(function) {
            return reply.clone();
        }
        if function == NEW_WINDOW {
            Ok(String::new())
        } else {
            Err(HostError::UnknownFunction(function.to_string()))
        }
    }
}

/// Manager with default config over a fresh [`ScriptedHost`], plus a handle
/// on that host.
pub(crate) fn manager() -> (CompositorManager<ScriptedHost>, ScriptedHost) {
    let host = ScriptedHost::new();
    (
        CompositorManager::new(host.clone(), CompositorConfig::default()),
        host,
    )
}
