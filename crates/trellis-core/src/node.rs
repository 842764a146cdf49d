//! Tree node model
//!
//! Nodes are immutable values: every operation returns a fresh node with a
//! recomputed checksum, and sharing happens through node ids in the store,
//! never through pointers. A leaf keeps parallel arrays of keys, value
//! references, and per-entry checksums; a branch keeps parallel arrays of
//! keys, child ids, and child checksums, one key per child. Keys are opaque
//! to the engine; their order is whatever the client maintains.

use crate::error::TreeError;
use crate::hash::{digest_concat, Digest, NodeHasher};
use crate::proof::NodeProof;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use trellis_nodestore::NodeId;

/// An opaque key. The engine stores keys and hands them back; it never
/// decides how they are ordered.
#[derive(Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Key(Bytes);

impl Key {
    /// Create a key from raw bytes
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    /// Key bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Length in bytes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the key is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({})", hex::encode(&self.0))
    }
}

impl AsRef<[u8]> for Key {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for Key {
    fn from(bytes: Vec<u8>) -> Self {
        Self(Bytes::from(bytes))
    }
}

impl From<&[u8]> for Key {
    fn from(bytes: &[u8]) -> Self {
        Self(Bytes::copy_from_slice(bytes))
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Self(Bytes::copy_from_slice(s.as_bytes()))
    }
}

/// Monotonic reference to a value stored outside the tree
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ValueRef(u64);

impl ValueRef {
    /// Create a reference from its raw value
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw reference value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Debug for ValueRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ValueRef({})", self.0)
    }
}

impl fmt::Display for ValueRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reference to a child node: its id and the checksum it is expected to carry
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChildRef {
    /// Child node id
    pub id: NodeId,
    /// Checksum of the child node
    pub checksum: Digest,
}

/// Leaf node: parallel entries of key, value reference, and kv-checksum,
/// linked rightward to the next leaf for range scans
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeafNode {
    keys: Vec<Key>,
    value_refs: Vec<ValueRef>,
    kv_digests: Vec<Digest>,
    right_sibling: Option<NodeId>,
    checksum: Digest,
}

impl LeafNode {
    /// Create an empty leaf
    pub fn empty() -> Self {
        Self {
            keys: Vec::new(),
            value_refs: Vec::new(),
            kv_digests: Vec::new(),
            right_sibling: None,
            checksum: Digest::EMPTY,
        }
    }

    /// Create a one-entry leaf
    pub(crate) fn new_single<H: NodeHasher>(
        key: Key,
        value_ref: ValueRef,
        kv: Digest,
        hasher: &H,
    ) -> Self {
        let checksum = digest_concat(hasher, std::slice::from_ref(&kv));
        Self {
            keys: vec![key],
            value_refs: vec![value_ref],
            kv_digests: vec![kv],
            right_sibling: None,
            checksum,
        }
    }

    /// Number of entries
    pub fn size(&self) -> usize {
        self.keys.len()
    }

    /// Keys, in client order
    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    /// Value references, parallel to `keys`
    pub fn value_refs(&self) -> &[ValueRef] {
        &self.value_refs
    }

    /// Per-entry kv-checksums, parallel to `keys`
    pub fn kv_digests(&self) -> &[Digest] {
        &self.kv_digests
    }

    /// Id of the next leaf to the right, if any
    pub fn right_sibling(&self) -> Option<NodeId> {
        self.right_sibling
    }

    /// Checksum over the kv-checksums
    pub fn checksum(&self) -> &Digest {
        &self.checksum
    }

    /// Last key, if the leaf is non-empty
    pub fn last_key(&self) -> Option<&Key> {
        self.keys.last()
    }

    /// New leaf with `(key, value_ref, kv)` inserted at `idx`
    pub(crate) fn insert<H: NodeHasher>(
        &self,
        key: Key,
        value_ref: ValueRef,
        kv: Digest,
        idx: usize,
        hasher: &H,
    ) -> Self {
        debug_assert!(idx <= self.size());
        let mut next = self.clone();
        next.keys.insert(idx, key);
        next.value_refs.insert(idx, value_ref);
        next.kv_digests.insert(idx, kv);
        next.checksum = digest_concat(hasher, &next.kv_digests);
        next
    }

    /// New leaf with the entry at `idx` replaced.
    ///
    /// Updates keep the value reference of the entry they replace; a caller
    /// passing a different reference is a protocol violation.
    pub(crate) fn rewrite<H: NodeHasher>(
        &self,
        key: Key,
        value_ref: ValueRef,
        kv: Digest,
        idx: usize,
        hasher: &H,
    ) -> Result<Self, TreeError> {
        debug_assert!(idx < self.size());
        if self.value_refs[idx] != value_ref {
            return Err(TreeError::ValueRefMismatch {
                idx,
                existing: self.value_refs[idx],
            });
        }
        let mut next = self.clone();
        next.keys[idx] = key;
        next.kv_digests[idx] = kv;
        next.checksum = digest_concat(hasher, &next.kv_digests);
        Ok(next)
    }

    /// Split into `(left, right)` halves.
    ///
    /// The left half keeps the larger share (`ceil(size / 2)`), points its
    /// sibling link at `new_right_id`, and the right half inherits the old
    /// sibling link, keeping the leaf chain intact.
    pub(crate) fn split<H: NodeHasher>(&self, new_right_id: NodeId, hasher: &H) -> (Self, Self) {
        let right_len = self.size() / 2;
        let left_len = self.size() - right_len;

        let left = Self {
            keys: self.keys[..left_len].to_vec(),
            value_refs: self.value_refs[..left_len].to_vec(),
            kv_digests: self.kv_digests[..left_len].to_vec(),
            right_sibling: Some(new_right_id),
            checksum: digest_concat(hasher, &self.kv_digests[..left_len]),
        };
        let right = Self {
            keys: self.keys[left_len..].to_vec(),
            value_refs: self.value_refs[left_len..].to_vec(),
            kv_digests: self.kv_digests[left_len..].to_vec(),
            right_sibling: self.right_sibling,
            checksum: digest_concat(hasher, &self.kv_digests[left_len..]),
        };
        (left, right)
    }

    /// Proof level for this leaf with the entry at `affected_idx` marked
    pub(crate) fn to_proof(&self, affected_idx: usize) -> NodeProof {
        NodeProof::new(Digest::EMPTY, self.kv_digests.clone(), affected_idx)
    }
}

impl fmt::Debug for LeafNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeafNode")
            .field("size", &self.size())
            .field("right_sibling", &self.right_sibling)
            .field("checksum", &self.checksum)
            .finish()
    }
}

/// Branch node: one key per child, each key covering the subtree under the
/// child at the same slot
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchNode {
    keys: Vec<Key>,
    child_ids: Vec<NodeId>,
    child_hashes: Vec<Digest>,
    checksum: Digest,
}

impl BranchNode {
    /// Create the two-child branch that replaces a freshly split root
    pub(crate) fn parent_of<H: NodeHasher>(
        left_key: Key,
        left: ChildRef,
        right_key: Key,
        right: ChildRef,
        hasher: &H,
    ) -> Self {
        let child_hashes = vec![left.checksum, right.checksum];
        let checksum = digest_concat(hasher, &child_hashes);
        Self {
            keys: vec![left_key, right_key],
            child_ids: vec![left.id, right.id],
            child_hashes,
            checksum,
        }
    }

    /// Number of children (and keys)
    pub fn size(&self) -> usize {
        self.keys.len()
    }

    /// Keys, in client order
    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    /// Child node ids, parallel to `keys`
    pub fn child_ids(&self) -> &[NodeId] {
        &self.child_ids
    }

    /// Child checksums, parallel to `keys`
    pub fn child_hashes(&self) -> &[Digest] {
        &self.child_hashes
    }

    /// Checksum over the child checksums
    pub fn checksum(&self) -> &Digest {
        &self.checksum
    }

    /// Last key, if the branch is non-empty
    pub fn last_key(&self) -> Option<&Key> {
        self.keys.last()
    }

    /// New branch with `(key, child)` inserted at `idx`
    pub(crate) fn insert_child<H: NodeHasher>(
        &self,
        key: Key,
        child: ChildRef,
        idx: usize,
        hasher: &H,
    ) -> Self {
        debug_assert!(idx <= self.size());
        let mut next = self.clone();
        next.keys.insert(idx, key);
        next.child_ids.insert(idx, child.id);
        next.child_hashes.insert(idx, child.checksum);
        next.checksum = digest_concat(hasher, &next.child_hashes);
        next
    }

    /// New branch with the child at `idx` re-pointed, key unchanged
    pub(crate) fn update_child_ref<H: NodeHasher>(
        &self,
        child: ChildRef,
        idx: usize,
        hasher: &H,
    ) -> Self {
        debug_assert!(idx < self.size());
        let mut next = self.clone();
        next.child_ids[idx] = child.id;
        next.child_hashes[idx] = child.checksum;
        next.checksum = digest_concat(hasher, &next.child_hashes);
        next
    }

    /// New branch with only the checksum of the child at `idx` replaced
    pub(crate) fn update_child_checksum<H: NodeHasher>(
        &self,
        checksum: Digest,
        idx: usize,
        hasher: &H,
    ) -> Self {
        debug_assert!(idx < self.size());
        let mut next = self.clone();
        next.child_hashes[idx] = checksum;
        next.checksum = digest_concat(hasher, &next.child_hashes);
        next
    }

    /// Split into `(left, right)` halves at the median, left keeping the
    /// larger share
    pub(crate) fn split<H: NodeHasher>(&self, hasher: &H) -> (Self, Self) {
        let right_len = self.size() / 2;
        let left_len = self.size() - right_len;

        let left = Self {
            keys: self.keys[..left_len].to_vec(),
            child_ids: self.child_ids[..left_len].to_vec(),
            child_hashes: self.child_hashes[..left_len].to_vec(),
            checksum: digest_concat(hasher, &self.child_hashes[..left_len]),
        };
        let right = Self {
            keys: self.keys[left_len..].to_vec(),
            child_ids: self.child_ids[left_len..].to_vec(),
            child_hashes: self.child_hashes[left_len..].to_vec(),
            checksum: digest_concat(hasher, &self.child_hashes[left_len..]),
        };
        (left, right)
    }

    /// Proof level for this branch with the child at `affected_idx` marked
    pub(crate) fn to_proof(&self, affected_idx: usize) -> NodeProof {
        NodeProof::new(Digest::EMPTY, self.child_hashes.clone(), affected_idx)
    }
}

impl fmt::Debug for BranchNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BranchNode")
            .field("size", &self.size())
            .field("child_ids", &self.child_ids)
            .field("checksum", &self.checksum)
            .finish()
    }
}

/// A tree node
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Node {
    /// Leaf node holding entries
    Leaf(LeafNode),
    /// Branch node holding children
    Branch(BranchNode),
}

impl Node {
    /// Checksum of the node
    pub fn checksum(&self) -> &Digest {
        match self {
            Node::Leaf(leaf) => leaf.checksum(),
            Node::Branch(branch) => branch.checksum(),
        }
    }

    /// Number of entries or children
    pub fn size(&self) -> usize {
        match self {
            Node::Leaf(leaf) => leaf.size(),
            Node::Branch(branch) => branch.size(),
        }
    }

    /// Check if this is a leaf
    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf(_))
    }

    /// Byte-order sanity check used when key-order assertions are enabled
    pub(crate) fn keys_strictly_ascending(&self) -> bool {
        let keys = match self {
            Node::Leaf(leaf) => leaf.keys(),
            Node::Branch(branch) => branch.keys(),
        };
        keys.windows(2).all(|w| w[0].as_bytes() < w[1].as_bytes())
    }
}
