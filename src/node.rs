use crate::error::Verb;
use crate::event::{Action, EventHandler};
use crate::tree::NodeId;
use crate::value::{Map, Value};
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Delegate,
    Resolved(Option<Value>),
}

/// Hooks for node variants defined outside the engine (pages, text, images...).
pub trait NodeBehavior: fmt::Debug {
    fn property(&self, _originator: NodeId, _name: &str) -> Lookup {
        Lookup::Delegate
    }

    fn properties(&self, _originator: NodeId, _info: &Map) -> Lookup {
        Lookup::Delegate
    }

    /// Claims an application action that is bubbling through this node.
    fn accepts(&self, _action: &Action) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Created,
    Pending,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RequestState {
    pub verb: Verb,
    pub url: Option<String>,
    pub phase: Phase,
    pub outstanding: bool,
    pub data: Option<Map>,
    pub params: Option<Map>,
}

impl RequestState {
    pub fn new(verb: Verb) -> Self {
        Self {
            verb,
            url: None,
            phase: Phase::Created,
            outstanding: false,
            data: None,
            params: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimerState {
    pub delay: Duration,
    pub repeats: bool,
    pub phase: Phase,
    pub outstanding: bool,
    pub fired: u64,
}

impl TimerState {
    pub fn new(delay: Duration, repeats: bool) -> Self {
        Self {
            delay,
            repeats,
            phase: Phase::Created,
            outstanding: false,
            fired: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Element(Map),
    Request(RequestState),
    Timer(TimerState),
}

impl NodeKind {
    pub fn phase(&self) -> Option<Phase> {
        match self {
            NodeKind::Element(_) => None,
            NodeKind::Request(r) => Some(r.phase),
            NodeKind::Timer(t) => Some(t.phase),
        }
    }

    pub fn outstanding(&self) -> bool {
        match self {
            NodeKind::Element(_) => false,
            NodeKind::Request(r) => r.outstanding,
            NodeKind::Timer(t) => t.outstanding,
        }
    }

    pub fn is_executor(&self) -> bool {
        !matches!(self, NodeKind::Element(_))
    }
}

#[derive(Debug)]
pub struct Node {
    pub id: NodeId,
    pub name: Option<String>,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub events: EventHandler,
    pub kind: NodeKind,
    pub behavior: Option<Box<dyn NodeBehavior>>,
    /// Live executor nodes whose parent is this node.
    pub dependents: usize,
}

impl Node {
    pub fn fields(&self) -> Option<&Map> {
        match &self.kind {
            NodeKind::Element(fields) => Some(fields),
            _ => None,
        }
    }

    pub fn request(&self) -> Option<&RequestState> {
        match &self.kind {
            NodeKind::Request(r) => Some(r),
            _ => None,
        }
    }

    pub fn timer(&self) -> Option<&TimerState> {
        match &self.kind {
            NodeKind::Timer(t) => Some(t),
            _ => None,
        }
    }
}
