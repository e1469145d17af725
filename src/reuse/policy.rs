use std::collections::BTreeMap;

use crate::math;

use super::NodeId;

/// How the reuse tree reacts when an edge is traversed again and yields a different output than
/// the one recorded for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Invalidation {
    /// Record the new output and keep reusing states below the edge.
    Overwrite,
    /// Disable reuse for the target node of the conflicting edge.
    Node,
    /// Disable reuse for the target node and everything reachable from it.
    Subtree,
}

impl Invalidation {
    pub fn disables_reuse(&self) -> bool {
        !matches!(self, Invalidation::Overwrite)
    }
}

/// Orders the nodes that currently hold a state handle by the time they were last used, so that
/// the least recently used one can be evicted first.
#[derive(Debug, Clone, Default)]
pub(crate) struct LruIndex {
    clock: u64,
    by_age: BTreeMap<u64, NodeId>,
    ages: math::Map<NodeId, u64>,
}

impl LruIndex {
    /// Marks `node` as used just now, inserting it if it was not tracked yet.
    pub fn touch(&mut self, node: NodeId) {
        self.clock += 1;
        if let Some(previous) = self.ages.insert(node, self.clock) {
            self.by_age.remove(&previous);
        }
        self.by_age.insert(self.clock, node);
    }

    /// Marks `node` as used if it is tracked, otherwise does nothing.
    pub fn refresh(&mut self, node: NodeId) {
        if self.ages.contains_key(&node) {
            self.touch(node);
        }
    }

    pub fn remove(&mut self, node: NodeId) -> bool {
        match self.ages.remove(&node) {
            Some(age) => {
                self.by_age.remove(&age);
                true
            }
            None => false,
        }
    }

    /// Removes and returns the least recently used node.
    pub fn pop_oldest(&mut self) -> Option<NodeId> {
        let (_, node) = self.by_age.pop_first()?;
        self.ages.remove(&node);
        Some(node)
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.ages.contains_key(&node)
    }

    pub fn len(&self) -> usize {
        debug_assert_eq!(self.ages.len(), self.by_age.len());
        self.ages.len()
    }
}
