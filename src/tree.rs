use crate::event::EventHandler;
use crate::node::{Node, NodeBehavior, NodeKind};
use std::fmt;

/// Stable handle into a [`Tree`]. A handle outlives its node; lookups through a
/// stale handle return `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.index, self.generation)
    }
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    node: Option<Node>,
}

#[derive(Debug, Default)]
pub struct Tree {
    slots: Vec<Slot>,
    free: Vec<u32>,
    root: Option<NodeId>,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate(&mut self) -> NodeId {
        if let Some(index) = self.free.pop() {
            NodeId {
                index,
                generation: self.slots[index as usize].generation,
            }
        } else {
            let index = u32::try_from(self.slots.len()).unwrap_or(u32::MAX);
            self.slots.push(Slot::default());
            NodeId {
                index,
                generation: 0,
            }
        }
    }

    fn place(
        &mut self,
        parent: Option<NodeId>,
        name: Option<String>,
        events: EventHandler,
        kind: NodeKind,
    ) -> NodeId {
        let id = self.allocate();
        self.slots[id.index as usize].node = Some(Node {
            id,
            name,
            parent,
            children: Vec::new(),
            events,
            kind,
            behavior: None,
            dependents: 0,
        });
        id
    }

    /// Adds a document node, appended to `parent`'s children. The first
    /// parentless node becomes the root.
    pub fn insert(
        &mut self,
        parent: Option<NodeId>,
        name: Option<String>,
        events: EventHandler,
        kind: NodeKind,
    ) -> NodeId {
        let parent = parent.filter(|p| self.contains(*p));
        let id = self.place(parent, name, events, kind);
        match parent {
            Some(p) => {
                if let Some(node) = self.get_mut(p) {
                    node.children.push(id);
                }
            }
            None => {
                if self.root.is_none() {
                    self.root = Some(id);
                }
            }
        }
        id
    }

    /// Adds an executor node owned by `owner`. It is not one of `owner`'s
    /// children, so downward searches never reach it.
    pub fn spawn(&mut self, owner: NodeId, events: EventHandler, kind: NodeKind) -> NodeId {
        let owner = Some(owner).filter(|o| self.contains(*o));
        let id = self.place(owner, None, events, kind);
        if let Some(node) = owner.and_then(|o| self.get_mut(o)) {
            node.dependents += 1;
        }
        id
    }

    pub fn set_behavior(&mut self, id: NodeId, behavior: Box<dyn NodeBehavior>) -> bool {
        match self.get_mut(id) {
            Some(node) => {
                node.behavior = Some(behavior);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.slots
            .get(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.node.as_ref())
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.node.as_mut())
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.get(id)
            .and_then(|n| n.parent)
            .filter(|p| self.contains(*p))
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.get(id).map(|n| n.children.as_slice()).unwrap_or_default()
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root.filter(|r| self.contains(*r))
    }

    pub fn find(&self, name: &str) -> Option<NodeId> {
        let mut stack: Vec<NodeId> = self.root().into_iter().collect();
        while let Some(id) = stack.pop() {
            let node = self.get(id)?;
            if node.name.as_deref() == Some(name) {
                return Some(id);
            }
            stack.extend(node.children.iter().rev().copied());
        }
        None
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.node.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn release(&mut self, id: NodeId) -> Option<Node> {
        let slot = self
            .slots
            .get_mut(id.index as usize)
            .filter(|s| s.generation == id.generation)?;
        let node = slot.node.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);

        if let Some(parent) = node.parent.and_then(|p| self.get_mut(p)) {
            if node.kind.is_executor() {
                parent.dependents = parent.dependents.saturating_sub(1);
            } else {
                parent.children.retain(|c| *c != id);
            }
        }
        if self.root == Some(id) {
            self.root = None;
        }
        Some(node)
    }

    /// Detaches a document subtree. Executors spawned below it keep running;
    /// their parent lookups yield `None` from now on. Executor nodes belong to
    /// the engine and are never removed here.
    pub fn remove_subtree(&mut self, id: NodeId) -> usize {
        if self.get(id).is_none_or(|n| n.kind.is_executor()) {
            return 0;
        }
        let mut stack = vec![id];
        let mut removed = 0;
        while let Some(current) = stack.pop() {
            if let Some(node) = self.release(current) {
                stack.extend(node.children);
                removed += 1;
            }
        }
        removed
    }
}
