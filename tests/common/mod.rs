#![allow(dead_code)]

use sceneweave::transport::{Clock, Pending, Reply, Request, Transport};
use sceneweave::{Delivery, Engine, Map, NodeId, Tree, Value, document};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Transport that holds every request until the test answers it.
#[derive(Clone, Default)]
pub struct ManualTransport {
    requests: Rc<RefCell<Vec<(Request, Reply)>>>,
    pub aborted: Arc<AtomicUsize>,
}

impl ManualTransport {
    pub fn count(&self) -> usize {
        self.requests.borrow().len()
    }

    pub fn take(&self) -> Option<(Request, Reply)> {
        let mut requests = self.requests.borrow_mut();
        if requests.is_empty() {
            None
        } else {
            Some(requests.remove(0))
        }
    }

    /// Answers the oldest request with `body`.
    pub fn respond(&self, body: &str) -> Request {
        let (request, reply) = self.take().expect("no request to answer");
        reply.respond(Ok(body.as_bytes().to_vec()));
        request
    }
}

impl Transport for ManualTransport {
    fn fetch(&self, request: Request, reply: Reply) -> Pending {
        self.requests.borrow_mut().push((request, reply));
        let aborted = self.aborted.clone();
        Pending::abortable(move || {
            aborted.fetch_add(1, Ordering::SeqCst);
        })
    }
}

/// Clock whose timers only fire when the test says so.
#[derive(Clone, Default)]
pub struct ManualClock {
    timers: Rc<RefCell<Vec<(Duration, bool, Option<Reply>)>>>,
}

impl ManualClock {
    pub fn count(&self) -> usize {
        self.timers.borrow().len()
    }

    pub fn schedule_of(&self, index: usize) -> (Duration, bool) {
        let timers = self.timers.borrow();
        (timers[index].0, timers[index].1)
    }

    /// Fires timer `index`. One-shot timers give up their reply.
    pub fn fire(&self, index: usize) {
        let mut timers = self.timers.borrow_mut();
        let (_, repeats, reply) = &mut timers[index];
        if *repeats {
            if let Some(reply) = reply.as_ref() {
                reply.tick();
            }
        } else if let Some(reply) = reply.take() {
            reply.fire();
        }
    }

    /// Drops the reply for timer `index`, as an aborted timer task would.
    pub fn drop_reply(&self, index: usize) {
        self.timers.borrow_mut()[index].2 = None;
    }
}

impl Clock for ManualClock {
    fn schedule(&self, delay: Duration, repeats: bool, reply: Reply) -> Pending {
        self.timers.borrow_mut().push((delay, repeats, Some(reply)));
        Pending::detached()
    }
}

/// Engine over a parsed document, recording every delivered action.
pub struct Harness {
    pub engine: Engine,
    pub root: NodeId,
    pub transport: ManualTransport,
    pub clock: ManualClock,
    pub delivered: Rc<RefCell<Vec<(Delivery, Map)>>>,
}

impl Harness {
    pub fn new(json: serde_json::Value) -> Self {
        let (tree, root) = document::from_value(&Value::from(json)).expect("valid document");
        let transport = ManualTransport::default();
        let clock = ManualClock::default();
        let mut engine = Engine::new(tree, transport.clone(), clock.clone());

        let delivered: Rc<RefCell<Vec<(Delivery, Map)>>> = Rc::default();
        let sink = delivered.clone();
        engine.set_handler(move |tree: &Tree, delivery: &Delivery| {
            // Materialize the action's arguments the way a container would.
            let args = delivery
                .action
                .info()
                .values()
                .next()
                .and_then(Value::as_map)
                .map(|args| tree.evaluate(delivery.originator, args))
                .unwrap_or_default();
            sink.borrow_mut().push((delivery.clone(), args));
        });

        Self {
            engine,
            root,
            transport,
            clock,
            delivered,
        }
    }

    pub fn node(&self, name: &str) -> NodeId {
        self.engine.tree().find(name).expect("named node")
    }

    pub fn delivered_keys(&self) -> Vec<String> {
        self.delivered
            .borrow()
            .iter()
            .filter_map(|(d, _)| d.action.info().keys().next().cloned())
            .collect()
    }

    pub fn args(&self, index: usize) -> Map {
        self.delivered.borrow()[index].1.clone()
    }
}

pub fn map(json: serde_json::Value) -> Map {
    Value::from(json).as_map().cloned().unwrap_or_default()
}
