use itertools::Itertools;
use tracing::{debug, trace, warn};

use super::{
    policy::{Invalidation, LruIndex},
    ReuseConfig,
};
use crate::{error::Conflict, math, sut::StateHandle, word::Symbol};

/// Stable identifier of a node in a [`ReuseTree`]. Nodes are never removed, so an id stays valid
/// for the lifetime of its tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    /// The root, which corresponds to the initial state of the system.
    pub const ROOT: NodeId = NodeId(0);

    pub(crate) fn new(index: usize) -> Self {
        NodeId(u32::try_from(index).expect("reuse tree outgrew its id space"))
    }

    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

struct ReuseNode<H> {
    depth: usize,
    children: Vec<NodeId>,
    handle: Option<H>,
    reuse_disabled: bool,
}

impl<H> ReuseNode<H> {
    fn new(depth: usize) -> Self {
        Self {
            depth,
            children: vec![],
            handle: None,
            reuse_disabled: false,
        }
    }

    fn yields_state(&self) -> bool {
        !self.reuse_disabled && self.handle.is_some()
    }
}

#[derive(Debug, Clone)]
struct ReuseEdge<O> {
    target: NodeId,
    output: O,
}

/// What a read-only lookup of a word in the tree found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lookup<O> {
    /// The node reached by the longest prefix of the word that is present in the tree.
    pub node: NodeId,
    /// The recorded outputs along that prefix, one per matched input symbol.
    pub outputs: Vec<O>,
    /// The deepest node along the matched prefix that currently offers a state to resume from.
    pub resume: Option<NodeId>,
}

impl<O> Lookup<O> {
    /// Length of the matched prefix.
    pub fn matched(&self) -> usize {
        self.outputs.len()
    }
}

/// The result of [`ReuseTree::lookup`]. If a state was found, it has been taken out of the tree
/// and is now owned by the caller, together with the depth at which it has to be resumed.
pub struct ReuseLookup<O, H> {
    pub node: NodeId,
    pub outputs: Vec<O>,
    pub resume: Option<(usize, H)>,
}

/// Summary of what [`ReuseTree::record_trace`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceReport<I, O> {
    /// The node the recorded word leads to.
    pub node: NodeId,
    /// Number of nodes that were created.
    pub created: usize,
    /// Whether the final state was saved in the tree.
    pub cached: bool,
    /// Edges whose recorded output disagreed with the fresh observation.
    pub conflicts: Vec<Conflict<I, O>>,
}

/// A prefix tree over input words that doubles as a cache for output traces and for saved states
/// of the system under test.
///
/// All nodes live in an arena and are addressed by [`NodeId`]. Edges are keyed by their source
/// node and input symbol and carry the output that was observed when the edge was first taken.
/// The tree owns every state handle stored in it and releases each of them exactly once, at the
/// latest when the tree is dropped.
pub struct ReuseTree<I: Symbol, O: Symbol, H: StateHandle> {
    nodes: Vec<ReuseNode<H>>,
    edges: math::Map<(NodeId, I), ReuseEdge<O>>,
    lru: LruIndex,
    evictions: usize,
    released: usize,
    conflicts: usize,
}

impl<I: Symbol, O: Symbol, H: StateHandle> Default for ReuseTree<I, O, H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: Symbol, O: Symbol, H: StateHandle> ReuseTree<I, O, H> {
    /// Creates a tree that only consists of the root.
    pub fn new() -> Self {
        Self {
            nodes: vec![ReuseNode::new(0)],
            edges: math::Map::default(),
            lru: LruIndex::default(),
            evictions: 0,
            released: 0,
            conflicts: 0,
        }
    }

    /// Number of nodes, including the root.
    pub fn size(&self) -> usize {
        self.nodes.len()
    }

    /// Number of saved states currently owned by the tree.
    pub fn cached_states(&self) -> usize {
        self.lru.len()
    }

    /// Number of states that were evicted to respect the capacity bound or on request.
    pub fn evictions(&self) -> usize {
        self.evictions
    }

    /// Number of states the tree has released, for whatever reason.
    pub fn released(&self) -> usize {
        self.released
    }

    /// Number of conflicting observations seen so far.
    pub fn conflicts(&self) -> usize {
        self.conflicts
    }

    pub fn depth(&self, node: NodeId) -> usize {
        self.node(node).depth
    }

    pub fn is_reuse_disabled(&self, node: NodeId) -> bool {
        self.node(node).reuse_disabled
    }

    /// Whether `node` physically holds a state, regardless of whether it may be used.
    pub fn has_state(&self, node: NodeId) -> bool {
        self.node(node).handle.is_some()
    }

    /// Returns the node that `word` leads to, if the whole word is present.
    pub fn node_at(&self, word: &[I]) -> Option<NodeId> {
        let lookup = self.peek(word);
        (lookup.matched() == word.len()).then_some(lookup.node)
    }

    /// Returns the recorded outputs for `word`, if the whole word is present.
    pub fn outputs(&self, word: &[I]) -> Option<Vec<O>> {
        let lookup = self.peek(word);
        (lookup.matched() == word.len()).then_some(lookup.outputs)
    }

    fn node(&self, node: NodeId) -> &ReuseNode<H> {
        self.nodes
            .get(node.index())
            .unwrap_or_else(|| panic!("{node:?} does not exist in the reuse tree"))
    }

    fn node_mut(&mut self, node: NodeId) -> &mut ReuseNode<H> {
        self.nodes
            .get_mut(node.index())
            .unwrap_or_else(|| panic!("{node:?} does not exist in the reuse tree"))
    }

    /// Follows `word` from the root for as long as edges exist, collecting their outputs. Does not
    /// modify the tree.
    pub fn peek(&self, word: &[I]) -> Lookup<O> {
        let mut node = NodeId::ROOT;
        let mut outputs = Vec::with_capacity(word.len());
        let mut resume = None;
        for symbol in word {
            let Some(edge) = self.edges.get(&(node, symbol.clone())) else {
                break;
            };
            outputs.push(edge.output.clone());
            node = edge.target;
            if self.node(node).yields_state() {
                resume = Some(node);
            }
        }
        trace!(
            "lookup of {word:?} matched {} symbols, resumable at {resume:?}",
            outputs.len()
        );
        Lookup {
            node,
            outputs,
            resume,
        }
    }

    /// Like [`Self::peek`], but if `word` is not completely known and a state to resume from
    /// exists along the matched prefix, the state is taken out of the tree and handed to the
    /// caller. The node it was taken from no longer holds a state afterwards.
    pub fn lookup(&mut self, word: &[I]) -> ReuseLookup<O, H> {
        let Lookup {
            node,
            outputs,
            resume,
        } = self.peek(word);
        let resume = match resume {
            Some(from) if outputs.len() < word.len() => self
                .claim(from)
                .map(|handle| (self.depth(from), handle)),
            _ => None,
        };
        ReuseLookup {
            node,
            outputs,
            resume,
        }
    }

    /// Takes the state out of `node`, provided reuse is not disabled for it.
    pub fn claim(&mut self, node: NodeId) -> Option<H> {
        if self.node(node).reuse_disabled {
            debug_assert!(!self.has_state(node), "disabled {node:?} still owns a state");
            return None;
        }
        let handle = self.node_mut(node).handle.take()?;
        self.lru.remove(node);
        trace!("claimed state of {node:?}");
        Some(handle)
    }

    fn add_node(&mut self, parent: NodeId, depth: usize) -> NodeId {
        let id = NodeId::new(self.nodes.len());
        self.nodes.push(ReuseNode::new(depth));
        self.node_mut(parent).children.push(id);
        id
    }

    /// Records that executing `word` produced `outputs` and, optionally, led to the state `state`.
    ///
    /// Missing nodes and edges are created. Existing edges are checked against the new
    /// observation; a mismatch is a conflict and is handled according to the invalidation policy
    /// of `config`. In every case the fresh observation replaces the recorded one. The state is
    /// saved in the node `word` leads to if the configuration allows it, otherwise it is released
    /// right away.
    pub fn record_trace(
        &mut self,
        word: &[I],
        outputs: &[O],
        state: Option<H>,
        config: &ReuseConfig<O>,
    ) -> TraceReport<I, O> {
        assert_eq!(
            word.len(),
            outputs.len(),
            "every input symbol must produce exactly one output"
        );
        let invalidation = config.invalidation();
        let mut current = NodeId::ROOT;
        let mut created = 0;
        let mut conflicts = vec![];

        for (position, (symbol, output)) in word.iter().zip(outputs).enumerate() {
            let key = (current, symbol.clone());
            let next = match self.edges.get_mut(&key) {
                Some(edge) if edge.output == *output => edge.target,
                Some(edge) => {
                    let recorded = std::mem::replace(&mut edge.output, output.clone());
                    let target = edge.target;
                    let conflict =
                        Conflict::new(word[..=position].to_vec(), recorded, output.clone());
                    warn!("nondeterministic behaviour, {conflict}");
                    self.conflicts += 1;
                    self.invalidate(target, invalidation);
                    conflicts.push(conflict);
                    target
                }
                None => {
                    let target = self.add_node(current, position + 1);
                    trace!("created {target:?} for {:?}", &word[..=position]);
                    self.edges.insert(
                        key,
                        ReuseEdge {
                            target,
                            output: output.clone(),
                        },
                    );
                    created += 1;
                    target
                }
            };
            self.lru.refresh(next);
            current = next;
        }

        let cached = match state {
            Some(handle) => self.admit(current, handle, outputs.last(), config),
            None => false,
        };

        if cfg!(debug_assertions) {
            self.check_invariants();
        }

        TraceReport {
            node: current,
            created,
            cached,
            conflicts,
        }
    }

    /// Saves `handle` in `node` if allowed, evicting the least recently used states if the
    /// capacity bound requires it. Returns whether the handle was saved.
    fn admit(
        &mut self,
        node: NodeId,
        handle: H,
        last_output: Option<&O>,
        config: &ReuseConfig<O>,
    ) -> bool {
        let refusal = if node == NodeId::ROOT {
            Some("states of the root are never saved")
        } else if self.is_reuse_disabled(node) {
            Some("reuse is disabled")
        } else if last_output.is_some_and(|output| !config.is_reusable(output)) {
            Some("last output is not reusable")
        } else if config.max_cached_states == Some(0) {
            Some("capacity is zero")
        } else if self.has_state(node) {
            self.lru.refresh(node);
            Some("a state is already saved")
        } else {
            None
        };
        if let Some(reason) = refusal {
            debug!("not saving state for {node:?}: {reason}");
            self.release(handle);
            return false;
        }

        if let Some(bound) = config.max_cached_states {
            while self.lru.len() >= bound {
                let Some(victim) = self.lru.pop_oldest() else {
                    break;
                };
                self.evict(victim);
            }
        }

        trace!("saving state for {node:?}");
        self.node_mut(node).handle = Some(handle);
        self.lru.touch(node);
        true
    }

    fn release(&mut self, handle: H) {
        self.released += 1;
        handle.release();
    }

    fn drop_state(&mut self, node: NodeId) -> bool {
        let Some(handle) = self.node_mut(node).handle.take() else {
            return false;
        };
        self.lru.remove(node);
        self.release(handle);
        true
    }

    /// Releases the state held by `node`, if any. The node and all recorded outputs remain, so
    /// the tree still answers for words through it. Returns whether a state was released.
    pub fn evict(&mut self, node: NodeId) -> bool {
        let evicted = self.drop_state(node);
        if evicted {
            debug!("evicted state of {node:?}");
            self.evictions += 1;
        }
        evicted
    }

    /// Disables reuse for `node`, and depending on `invalidation` also for all of its
    /// descendants, releasing any states they hold.
    pub fn invalidate(&mut self, node: NodeId, invalidation: Invalidation) {
        match invalidation {
            Invalidation::Overwrite => {}
            Invalidation::Node => self.disable(node),
            Invalidation::Subtree => {
                let mut stack = vec![node];
                while let Some(current) = stack.pop() {
                    self.disable(current);
                    stack.extend(self.node(current).children.iter().copied());
                }
            }
        }
    }

    fn disable(&mut self, node: NodeId) {
        self.node_mut(node).reuse_disabled = true;
        if self.drop_state(node) {
            debug!("released state of invalidated {node:?}");
        }
    }

    /// Releases every saved state while keeping all recorded outputs. Returns how many states
    /// were released.
    pub fn release_all(&mut self) -> usize {
        let holders = (0..self.nodes.len())
            .map(NodeId::new)
            .filter(|&node| self.has_state(node))
            .collect_vec();
        let count = holders.len();
        for node in holders {
            self.drop_state(node);
        }
        debug_assert_eq!(self.lru.len(), 0);
        count
    }

    fn check_invariants(&self) {
        let mut holders = 0;
        for (index, node) in self.nodes.iter().enumerate() {
            let id = NodeId::new(index);
            if node.handle.is_some() {
                holders += 1;
                assert!(!node.reuse_disabled, "{id:?} is disabled but holds a state");
                assert!(self.lru.contains(id), "{id:?} holds an untracked state");
            }
        }
        assert_eq!(holders, self.lru.len(), "state bookkeeping drifted");
    }
}

impl<I: Symbol, O: Symbol, H: StateHandle> Drop for ReuseTree<I, O, H> {
    fn drop(&mut self) {
        let released = self.release_all();
        if released > 0 {
            debug!("released {released} states when tearing down the reuse tree");
        }
    }
}
