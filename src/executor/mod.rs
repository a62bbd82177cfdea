pub mod request;
pub mod timer;

use crate::tree::NodeId;
use crate::transport::Pending;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Get,
    Post,
    Timer,
}

#[derive(Debug)]
pub(crate) struct Entry {
    pub(crate) node: NodeId,
    pub(crate) pending: Pending,
}

#[derive(Debug, Default)]
pub struct Registry {
    entries: Vec<Entry>,
}

impl Registry {
    pub(crate) fn push(&mut self, node: NodeId, pending: Pending) {
        self.entries.push(Entry { node, pending });
    }

    pub(crate) fn remove(&mut self, node: NodeId) -> Option<Entry> {
        let index = self.entries.iter().position(|e| e.node == node)?;
        Some(self.entries.remove(index))
    }

    pub(crate) fn drain(&mut self) -> Vec<Entry> {
        std::mem::take(&mut self.entries)
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.entries.iter().any(|e| e.node == node)
    }

    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.entries.iter().map(|e| e.node)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct Registries {
    get: Registry,
    post: Registry,
    timer: Registry,
}

impl Registries {
    pub fn of(&self, kind: Kind) -> &Registry {
        match kind {
            Kind::Get => &self.get,
            Kind::Post => &self.post,
            Kind::Timer => &self.timer,
        }
    }

    pub(crate) fn of_mut(&mut self, kind: Kind) -> &mut Registry {
        match kind {
            Kind::Get => &mut self.get,
            Kind::Post => &mut self.post,
            Kind::Timer => &mut self.timer,
        }
    }
}
