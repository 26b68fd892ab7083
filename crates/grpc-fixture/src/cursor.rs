//! Per-call traversal state over a shared [`MethodTrie`].
//!
//! The trie never records progress. Everything a call learns while walking it
//! (where it is, how it got there, which branches it already took) lives here
//! and is dropped with the call, so any number of calls can walk the same trie
//! at once.

use std::collections::HashSet;

use serde_json::Value;

use crate::error::CorrelationError;
use crate::message::{Origin, RecordedMessage};
use crate::trie::{MethodTrie, NodeId, ROOT};

pub struct ReplayCursor<'t> {
    trie: &'t MethodTrie,
    node: NodeId,
    /// Nodes this call descended from, innermost last.
    ancestors: Vec<NodeId>,
    /// Node ids already taken this call. Every node id names exactly one path
    /// from the root, so this doubles as a per-path visitation record.
    consumed: HashSet<NodeId>,
    pending_extract: Option<Result<Value, CorrelationError>>,
}

impl<'t> ReplayCursor<'t> {
    pub fn new(trie: &'t MethodTrie) -> Self {
        Self {
            trie,
            node: ROOT,
            ancestors: Vec::new(),
            consumed: HashSet::new(),
            pending_extract: None,
        }
    }

    pub fn current(&self) -> NodeId {
        self.node
    }

    /// Message at the current node; `None` at the root.
    pub fn message(&self) -> Option<&'t RecordedMessage> {
        self.trie.message(self.node)
    }

    /// Message recorded at `child`; `None` only for the root.
    pub fn child_message(&self, child: NodeId) -> Option<&'t RecordedMessage> {
        self.trie.message(child)
    }

    pub fn depth(&self) -> usize {
        self.ancestors.len()
    }

    pub fn is_leaf(&self) -> bool {
        self.trie.children(self.node).is_empty()
    }

    pub fn is_consumed(&self, node: NodeId) -> bool {
        self.consumed.contains(&node)
    }

    /// True when the current node has children and every one of them was
    /// sent by the server, meaning the server has to speak next.
    pub fn children_all_server(&self) -> bool {
        let children = self.trie.children(self.node);
        !children.is_empty()
            && children
                .iter()
                .all(|&child| self.origin_of(child) == Some(Origin::Server))
    }

    /// Server-origin children not yet taken this call, in recorded order.
    pub fn uncalled_server_children(&self) -> Vec<NodeId> {
        self.uncalled_children(Origin::Server).collect()
    }

    /// First client-origin child not yet taken this call.
    pub fn uncalled_client_child(&self) -> Option<NodeId> {
        self.uncalled_children(Origin::Client).next()
    }

    /// Client child to follow for a received payload: an untaken child
    /// recorded with exactly these bytes, else the first untaken client child.
    pub fn uncalled_client_child_for(&self, received: &[u8]) -> Option<NodeId> {
        self.uncalled_children(Origin::Client)
            .find(|&child| {
                self.trie
                    .message(child)
                    .map(|m| m.matches(Origin::Client, received))
                    .unwrap_or(false)
            })
            .or_else(|| self.uncalled_client_child())
    }

    /// Move into `child`, remembering where we came from.
    pub fn descend(&mut self, child: NodeId) {
        debug_assert!(self.trie.children(self.node).contains(&child));
        self.ancestors.push(self.node);
        self.consumed.insert(child);
        self.node = child;
    }

    /// Step back to the node this level was entered from. Returns `false`
    /// at the root, where there is nowhere left to go.
    pub fn ascend(&mut self) -> bool {
        match self.ancestors.pop() {
            Some(parent) => {
                self.consumed.insert(self.node);
                self.node = parent;
                true
            }
            None => false,
        }
    }

    pub fn set_pending_extract(&mut self, extracted: Result<Value, CorrelationError>) {
        self.pending_extract = Some(extracted);
    }

    /// Outcome of the last extraction this call, if a client message has been seen.
    pub fn pending_extract(&self) -> Option<&Result<Value, CorrelationError>> {
        self.pending_extract.as_ref()
    }

    fn origin_of(&self, node: NodeId) -> Option<Origin> {
        self.trie.message(node).map(|m| m.origin)
    }

    fn uncalled_children(&self, origin: Origin) -> impl Iterator<Item = NodeId> + '_ {
        self.trie
            .children(self.node)
            .iter()
            .copied()
            .filter(move |&child| {
                self.origin_of(child) == Some(origin) && !self.consumed.contains(&child)
            })
    }
}
