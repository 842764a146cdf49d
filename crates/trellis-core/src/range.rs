//! Streaming scan over the rightward leaf chain

use crate::error::{Result, TreeError};
use crate::node::{Key, LeafNode, Node, ValueRef};
use std::sync::Arc;
use trellis_nodestore::{BinaryNodeStore, Codec, KvStore};

/// A lazy scan yielding `(key, value_ref)` pairs from a starting slot to the
/// end of the leaf chain.
///
/// The scan is pulled with [`next`](RangeScan::next); dropping it cancels
/// the stream. Sibling leaves are fetched outside the tree's mutator permit,
/// so a long-running scan can observe a mixture of pre- and post-write
/// states; verifying each fetched leaf against the merkle root stays the
/// client's job.
pub struct RangeScan<S, C> {
    store: Arc<BinaryNodeStore<Node, S, C>>,
    current: Option<LeafNode>,
    pos: usize,
}

impl<S, C> RangeScan<S, C>
where
    S: KvStore,
    C: Codec<Node>,
{
    pub(crate) fn new(
        store: Arc<BinaryNodeStore<Node, S, C>>,
        leaf: LeafNode,
        start: usize,
    ) -> Self {
        Self {
            store,
            current: Some(leaf),
            pos: start,
        }
    }

    pub(crate) fn empty(store: Arc<BinaryNodeStore<Node, S, C>>) -> Self {
        Self {
            store,
            current: None,
            pos: 0,
        }
    }

    /// Next entry, or `None` once the leaf chain is exhausted
    pub async fn next(&mut self) -> Result<Option<(Key, ValueRef)>> {
        loop {
            let Some(leaf) = &self.current else {
                return Ok(None);
            };

            if self.pos < leaf.size() {
                let item = (leaf.keys()[self.pos].clone(), leaf.value_refs()[self.pos]);
                self.pos += 1;
                return Ok(Some(item));
            }

            match leaf.right_sibling() {
                None => {
                    self.current = None;
                    return Ok(None);
                }
                Some(id) => match self.store.get(id).await? {
                    Node::Leaf(next) => {
                        self.current = Some(next);
                        self.pos = 0;
                    }
                    Node::Branch(_) => {
                        return Err(TreeError::UnexpectedNodeKind {
                            id,
                            expected: "leaf",
                        })
                    }
                },
            }
        }
    }

    /// Drain the remaining entries into a vector
    pub async fn collect(mut self) -> Result<Vec<(Key, ValueRef)>> {
        let mut out = Vec::new();
        while let Some(item) = self.next().await? {
            out.push(item);
        }
        Ok(out)
    }
}
