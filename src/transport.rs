use crate::error::{FetchError, Verb};
use crate::tree::NodeId;
use reqwest::Url;
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

#[derive(Debug)]
pub(crate) enum SignalKind {
    Response(Result<Vec<u8>, FetchError>),
    Tick,
    Abandoned,
}

#[derive(Debug)]
pub(crate) struct Signal {
    pub(crate) node: NodeId,
    pub(crate) kind: SignalKind,
}

/// Return path for one effect. Dropping it unanswered tells the engine the
/// effect is gone.
pub struct Reply {
    node: NodeId,
    tx: UnboundedSender<Signal>,
    settled: bool,
}

impl Reply {
    pub(crate) fn new(node: NodeId, tx: UnboundedSender<Signal>) -> Self {
        Self {
            node,
            tx,
            settled: false,
        }
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    fn send(&self, kind: SignalKind) {
        if self.tx.send(Signal { node: self.node, kind }).is_err() {
            log::debug!("engine gone; dropping signal for {}", self.node);
        }
    }

    pub fn respond(mut self, result: Result<Vec<u8>, FetchError>) {
        self.settled = true;
        self.send(SignalKind::Response(result));
    }

    /// Fires a repeating timer. The reply stays usable.
    pub fn tick(&self) {
        self.send(SignalKind::Tick);
    }

    pub fn fire(mut self) {
        self.settled = true;
        self.send(SignalKind::Tick);
    }
}

impl Drop for Reply {
    fn drop(&mut self) {
        if !self.settled {
            self.send(SignalKind::Abandoned);
        }
    }
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reply")
            .field("node", &self.node)
            .field("settled", &self.settled)
            .finish()
    }
}

#[derive(Default)]
pub struct Pending {
    abort: Option<Box<dyn FnOnce() + Send>>,
}

impl Pending {
    pub fn detached() -> Self {
        Self::default()
    }

    pub fn abortable(abort: impl FnOnce() + Send + 'static) -> Self {
        Self {
            abort: Some(Box::new(abort)),
        }
    }

    pub(crate) fn abort(self) {
        if let Some(abort) = self.abort {
            abort();
        }
    }
}

impl fmt::Debug for Pending {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pending")
            .field("abortable", &self.abort.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub verb: Verb,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    pub bypass_cache: bool,
}

/// Fetches resources. Implementations must answer through `reply` exactly once
/// or drop it.
pub trait Transport {
    fn fetch(&self, request: Request, reply: Reply) -> Pending;
}

/// Schedules timer fires. One-shot schedules call [`Reply::fire`]; repeating
/// ones call [`Reply::tick`] until aborted.
pub trait Clock {
    fn schedule(&self, delay: Duration, repeats: bool, reply: Reply) -> Pending;
}
