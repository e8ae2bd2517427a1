use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use tokio::sync::oneshot;

use super::{Host, HostError};

/// Outgoing call handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostRequest {
    /// Correlation id; the answer must be reported with the same id.
    pub id: u64,
    pub function: String,
    pub args: Vec<String>,
}

/// [`Host`] over a fire-and-forget transport that answers later by call id.
///
/// `transport` posts the request (e.g. as an `exec` message); whoever receives the
/// host's reply calls [`CallbackHost::complete`]. Callers only see a plain future.
pub struct CallbackHost<T> {
    transport: T,
    next_id: Cell<u64>,
    pending: RefCell<HashMap<u64, oneshot::Sender<Result<String, HostError>>>>,
}

impl<T> CallbackHost<T>
where
    T: Fn(HostRequest) -> Result<(), HostError>,
{
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            next_id: Cell::new(1),
            pending: RefCell::new(HashMap::new()),
        }
    }

    /// Resolves call `id` with the host's answer.
    ///
    /// Returns `false` when the id is unknown, already resolved, or its caller
    /// stopped waiting.
    pub fn complete(&self, id: u64, result: Result<String, HostError>) -> bool {
        let Some(tx) = self.pending.borrow_mut().remove(&id) else {
            log::debug!("host answer for unknown call {id} dropped");
            return false;
        };
        tx.send(result).is_ok()
    }

    /// Number of calls still waiting for an answer.
    pub fn pending(&self) -> usize {
        self.pending.borrow().len()
    }

    /// Fails every pending call with [`HostError::Disconnected`].
    pub fn disconnect(&self) {
        self.pending.borrow_mut().clear();
    }
}

impl<T> Host for CallbackHost<T>
where
    T: Fn(HostRequest) -> Result<(), HostError>,
{
    async fn invoke(&self, function: &str, args: &[String]) -> Result<String, HostError> {
        let id = self.next_id.get();
        self.next_id.set(id + 1);

        let (tx, rx) = oneshot::channel();
        self.pending.borrow_mut().insert(id, tx);

        let request = HostRequest {
            id,
            function: function.to_string(),
            args: args.to_vec(),
        };
        if let Err(e) = (self.transport)(request) {
            self.pending.borrow_mut().remove(&id);
            return Err(e);
        }

        rx.await.map_err(|_| HostError::Disconnected)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::pin::pin;
    use std::rc::Rc;
    use std::task::{Context, Poll, Waker};

    fn recording_host() -> (
        CallbackHost<impl Fn(HostRequest) -> Result<(), HostError>>,
        Rc<RefCell<Vec<HostRequest>>>,
    ) {
        let sent = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&sent);
        let host = CallbackHost::new(move |req: HostRequest| {
            sink.borrow_mut().push(req);
            Ok(())
        });
        (host, sent)
    }

    fn poll_once<F: Future>(fut: std::pin::Pin<&mut F>) -> Poll<F::Output> {
        let mut cx = Context::from_waker(Waker::noop());
        fut.poll(&mut cx)
    }

    #[test]
    fn answer_resolves_matching_call() {
        let (host, sent) = recording_host();
        let args = vec!["texture_0".to_string()];
        let mut fut = pin!(host.invoke("NewWindow", &args));

        assert!(poll_once(fut.as_mut()).is_pending());
        assert_eq!(host.pending(), 1);

        let id = sent.borrow()[0].id;
        assert_eq!(sent.borrow()[0].function, "NewWindow");
        assert!(host.complete(id, Ok("done".to_string())));

        assert_eq!(poll_once(fut.as_mut()), Poll::Ready(Ok("done".to_string())));
        assert_eq!(host.pending(), 0);
    }

    #[test]
    fn calls_get_distinct_ids() {
        let (host, sent) = recording_host();
        let mut a = pin!(host.invoke("A", &[]));
        let mut b = pin!(host.invoke("B", &[]));
        assert!(poll_once(a.as_mut()).is_pending());
        assert!(poll_once(b.as_mut()).is_pending());

        let ids: Vec<u64> = sent.borrow().iter().map(|r| r.id).collect();
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);

        // Out-of-order answers still land on the right caller.
        host.complete(ids[1], Ok("b".to_string()));
        host.complete(ids[0], Ok("a".to_string()));
        assert_eq!(poll_once(a.as_mut()), Poll::Ready(Ok("a".to_string())));
        assert_eq!(poll_once(b.as_mut()), Poll::Ready(Ok("b".to_string())));
    }

    #[test]
    fn unknown_id_is_ignored() {
        let (host, _) = recording_host();
        assert!(!host.complete(99, Ok(String::new())));
    }

    #[test]
    fn disconnect_fails_pending_calls() {
        let (host, _) = recording_host();
        let mut fut = pin!(host.invoke("NewWindow", &[]));
        assert!(poll_once(fut.as_mut()).is_pending());
        host.disconnect();
        assert_eq!(poll_once(fut.as_mut()), Poll::Ready(Err(HostError::Disconnected)));
    }

    #[test]
    fn transport_failure_is_returned() {
        let host = CallbackHost::new(|req: HostRequest| Err(HostError::UnknownFunction(req.function)));
        let result = pollster::block_on(host.invoke("Nope", &[]));
        assert_eq!(result, Err(HostError::UnknownFunction("Nope".to_string())));
        assert_eq!(host.pending(), 0);
    }
}
