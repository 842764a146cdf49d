//! Client-side oracles consulted during traversal
//!
//! The engine never orders or authenticates keys itself. At every branch it
//! asks the command which child to descend into, and at the leaf it asks the
//! command what it found. Commands typically sit on the far side of an RPC
//! boundary, so every method is async and fallible.

use crate::error::CommandError;
use crate::hash::Digest;
use crate::node::{BranchNode, Key, LeafNode, ValueRef};
use crate::proof::MerklePath;
use async_trait::async_trait;

/// Where the client found (or would insert) its key in a leaf
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchResult {
    /// The key exists at this slot
    Found(usize),
    /// The key is absent; this is where it would go
    InsertionPoint(usize),
}

impl SearchResult {
    /// The slot, regardless of variant
    pub fn idx(&self) -> usize {
        match self {
            SearchResult::Found(idx) | SearchResult::InsertionPoint(idx) => *idx,
        }
    }

    /// Check if the key was found
    pub fn is_found(&self) -> bool {
        matches!(self, SearchResult::Found(_))
    }
}

/// What a write command tells the engine once the target leaf is reached
#[derive(Clone, Debug)]
pub struct PutDetails {
    /// The key being written
    pub key: Key,
    /// Checksum of the value, computed by the client
    pub value_hash: Digest,
    /// Whether the key already exists in the leaf
    pub search: SearchResult,
}

/// Descent oracle: picks the child slot at every branch hop
#[async_trait]
pub trait TreeCommand: Send + Sync {
    /// Pick a child slot in `[0, branch.size())`
    async fn next_child_index(&self, branch: &BranchNode) -> Result<usize, CommandError>;
}

/// Oracle for `get` and `range`
#[async_trait]
pub trait SearchCommand: TreeCommand {
    /// Inspect the target leaf and locate the key; `None` when the tree is
    /// empty
    async fn submit_leaf(&self, leaf: Option<&LeafNode>) -> Result<SearchResult, CommandError>;
}

/// Oracle for `put`
#[async_trait]
pub trait PutCommand: TreeCommand {
    /// Inspect the target leaf and describe the write; `None` when the tree
    /// is empty
    async fn put_details(&self, leaf: Option<&LeafNode>) -> Result<PutDetails, CommandError>;

    /// Fresh monotonic reference for a newly inserted value
    async fn next_value_ref(&self) -> Result<ValueRef, CommandError>;

    /// Review the merkle path of a pending mutation. The engine commits
    /// nothing until this resolves successfully.
    async fn verify_changes(
        &self,
        path: &MerklePath,
        was_splitting: bool,
    ) -> Result<(), CommandError>;
}
