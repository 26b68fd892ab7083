//! # Exchange Trie
//!
//! Recorded calls to the same method frequently open with the same messages.
//! The trie merges those shared prefixes into a single path so a live call can
//! follow the common opening and only pick a branch where the recordings
//! actually diverge.
//!
//! Each method owns a [`MethodTrie`]: an arena of [`TrieNode`]s addressed by
//! [`NodeId`], with node `0` being a synthetic root that carries no message.
//! Once built the structure is never mutated, so it can be shared by every
//! concurrent call through an `Arc` without locking. Progress through the tree
//! lives in a per-call [`ReplayCursor`](crate::cursor::ReplayCursor).

use std::collections::BTreeMap;
use std::io::Read;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info};

use crate::codec::MessageCodec;
use crate::dump::DumpReader;
use crate::error::LoadError;
use crate::message::{Origin, RecordedMessage, RpcRecord};

/// Index of a node within its method's arena.
pub type NodeId = usize;

/// The synthetic root of every method trie.
pub const ROOT: NodeId = 0;

#[derive(Debug, Clone)]
pub struct TrieNode {
    /// `None` only for the root.
    message: Option<Arc<RecordedMessage>>,
    /// Codec encoding of the message, compared when merging recordings.
    key: Bytes,
    /// First-recorded order.
    children: Vec<NodeId>,
}

impl TrieNode {
    fn root() -> Self {
        Self {
            message: None,
            key: Bytes::new(),
            children: Vec::new(),
        }
    }

    pub fn message(&self) -> Option<&RecordedMessage> {
        self.message.as_deref()
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn origin(&self) -> Option<Origin> {
        self.message.as_ref().map(|m| m.origin)
    }
}

/// The recorded choreography of one method.
#[derive(Debug, Clone)]
pub struct MethodTrie {
    nodes: Vec<TrieNode>,
}

impl MethodTrie {
    fn new() -> Self {
        Self {
            nodes: vec![TrieNode::root()],
        }
    }

    pub fn root(&self) -> &TrieNode {
        &self.nodes[ROOT]
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(id)
            .map(|node| node.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn message(&self, id: NodeId) -> Option<&RecordedMessage> {
        self.nodes.get(id).and_then(|node| node.message())
    }

    /// Number of nodes, root included.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Every root-to-leaf path, as message sequences.
    pub fn paths(&self) -> Vec<Vec<&RecordedMessage>> {
        let mut paths = Vec::new();
        let mut stack = vec![(ROOT, Vec::new())];
        while let Some((id, prefix)) = stack.pop() {
            let node = &self.nodes[id];
            let mut path: Vec<&RecordedMessage> = prefix;
            if let Some(message) = node.message() {
                path.push(message);
            }
            if node.children.is_empty() {
                paths.push(path);
                continue;
            }
            for &child in node.children.iter().rev() {
                stack.push((child, path.clone()));
            }
        }
        paths
    }

    /// Find the child of `parent` recorded with this origin and encoding.
    fn find_child(&self, parent: NodeId, origin: Origin, key: &[u8]) -> Option<NodeId> {
        self.nodes[parent].children.iter().copied().find(|&child| {
            let node = &self.nodes[child];
            node.origin() == Some(origin) && node.key.as_ref() == key
        })
    }

    fn push_child(&mut self, parent: NodeId, message: RecordedMessage, key: Bytes) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(TrieNode {
            message: Some(Arc::new(message)),
            key,
            children: Vec::new(),
        });
        self.nodes[parent].children.push(id);
        id
    }
}

/// Read-only mapping from full method name to its recorded choreography.
#[derive(Debug, Clone, Default)]
pub struct ExchangeTrie {
    methods: BTreeMap<String, Arc<MethodTrie>>,
}

impl ExchangeTrie {
    pub fn get(&self, method: &str) -> Option<Arc<MethodTrie>> {
        self.methods.get(method).cloned()
    }

    pub fn contains(&self, method: &str) -> bool {
        self.methods.contains_key(method)
    }

    pub fn methods(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

/// Incrementally merges recorded calls into per-method tries.
pub struct ExchangeTrieBuilder<'c> {
    codec: &'c dyn MessageCodec,
    methods: BTreeMap<String, MethodTrie>,
    records: usize,
}

impl<'c> ExchangeTrieBuilder<'c> {
    pub fn new(codec: &'c dyn MessageCodec) -> Self {
        Self {
            codec,
            methods: BTreeMap::new(),
            records: 0,
        }
    }

    /// Merge one recorded call into the trie of its method.
    ///
    /// Each message is compared by origin and encoded bytes against the
    /// children of the current node; a match is followed, anything else
    /// starts a new branch in recorded order. New nodes keep the captured
    /// wire bytes, or the encoding when the dump has none.
    pub fn ingest(&mut self, record: &RpcRecord) -> Result<(), LoadError> {
        let method = record.stream_name();
        let mut encoded = Vec::with_capacity(record.messages.len());
        for (sequence, msg) in record.messages.iter().enumerate() {
            let raw = self
                .codec
                .encode_recorded(&method, msg.message.as_ref(), &msg.raw_message)
                .map_err(|source| LoadError::Codec {
                    method: method.clone(),
                    sequence,
                    source,
                })?;
            encoded.push(raw);
        }

        let trie = self
            .methods
            .entry(method.clone())
            .or_insert_with(MethodTrie::new);

        let mut node = ROOT;
        let mut shared = 0;
        for (sequence, (msg, key)) in record.messages.iter().zip(encoded).enumerate() {
            node = match trie.find_child(node, msg.message_origin, &key) {
                Some(existing) => {
                    shared += 1;
                    existing
                }
                None => {
                    let key = Bytes::from(key);
                    let raw_bytes = if msg.raw_message.is_empty() {
                        key.clone()
                    } else {
                        Bytes::from(msg.raw_message.clone())
                    };
                    let recorded = RecordedMessage::new(msg.message_origin, raw_bytes, sequence)
                        .with_decoded(msg.message.clone());
                    trie.push_child(node, recorded, key)
                }
            };
        }

        self.records += 1;
        debug!(
            "Ingested record for {} ({} messages, {} shared with earlier recordings)",
            method,
            record.messages.len(),
            shared
        );
        Ok(())
    }

    /// Number of records ingested so far.
    pub fn records(&self) -> usize {
        self.records
    }

    pub fn build(self) -> ExchangeTrie {
        ExchangeTrie {
            methods: self
                .methods
                .into_iter()
                .map(|(method, trie)| (method, Arc::new(trie)))
                .collect(),
        }
    }
}

/// Build an [`ExchangeTrie`] from a whole dump.
///
/// The first malformed record aborts the load; nothing built so far escapes.
pub fn load_fixture<R: Read>(
    reader: DumpReader<R>,
    codec: &dyn MessageCodec,
) -> Result<ExchangeTrie, LoadError> {
    let mut builder = ExchangeTrieBuilder::new(codec);
    for record in reader {
        builder.ingest(&record?)?;
    }
    let records = builder.records();
    let trie = builder.build();
    info!(
        "Loaded {} recorded calls across {} methods",
        records,
        trie.len()
    );
    Ok(trie)
}
