//! Merkle paths returned to the client after a mutation
//!
//! Every `put` produces one proof level per node on the root-to-leaf path of
//! the new tree state. The client rebuilds the expected root checksum by
//! substituting its own kv-checksum at the deepest level and folding upward,
//! then compares against the root checksum it tracks.

use crate::hash::{digest_concat, Digest, NodeHasher};
use serde::{Deserialize, Serialize};

/// One level of a merkle path
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeProof {
    /// Checksum of node state not covered by the child checksums. Empty
    /// while node checksums cover child checksums only.
    state_hash: Digest,
    /// Checksums of all slots at this level (kv-checksums for a leaf, child
    /// checksums for a branch)
    children_hashes: Vec<Digest>,
    /// Slot the mutation passed through
    substitution_idx: usize,
}

impl NodeProof {
    pub(crate) fn new(state_hash: Digest, children_hashes: Vec<Digest>, substitution_idx: usize) -> Self {
        Self {
            state_hash,
            children_hashes,
            substitution_idx,
        }
    }

    /// Checksums of all slots at this level
    pub fn children_hashes(&self) -> &[Digest] {
        &self.children_hashes
    }

    /// Slot the mutation passed through
    pub fn substitution_idx(&self) -> usize {
        self.substitution_idx
    }

    /// Checksum of this level with `substituted` standing in for the
    /// affected slot
    pub fn checksum_with<H: NodeHasher + ?Sized>(
        &self,
        substituted: Option<&Digest>,
        hasher: &H,
    ) -> Digest {
        let mut hashes = self.children_hashes.clone();
        if let Some(digest) = substituted {
            if let Some(slot) = hashes.get_mut(self.substitution_idx) {
                *slot = digest.clone();
            }
        }
        if self.state_hash.is_empty() {
            digest_concat(hasher, &hashes)
        } else {
            let mut parts = Vec::with_capacity(hashes.len() + 1);
            parts.push(self.state_hash.clone());
            parts.extend(hashes);
            digest_concat(hasher, &parts)
        }
    }
}

/// Merkle path from the root down to the affected leaf
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerklePath(Vec<NodeProof>);

impl MerklePath {
    /// Path with a single (leaf) level
    pub(crate) fn single(proof: NodeProof) -> Self {
        Self(vec![proof])
    }

    /// Prepend a parent level above the current top
    pub(crate) fn push_parent(&mut self, proof: NodeProof) {
        self.0.insert(0, proof);
    }

    /// Proof levels, root first
    pub fn proofs(&self) -> &[NodeProof] {
        &self.0
    }

    /// Number of levels
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the path is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Root checksum implied by this path with `leaf_entry` substituted at
    /// the deepest level.
    ///
    /// This is the client-side half of verification: compute the expected
    /// root from the kv-checksum of the entry just written and compare it
    /// against the tracked merkle root.
    pub fn expected_root<H: NodeHasher + ?Sized>(&self, leaf_entry: &Digest, hasher: &H) -> Digest {
        let mut acc: Option<Digest> = Some(leaf_entry.clone());
        for proof in self.0.iter().rev() {
            acc = Some(proof.checksum_with(acc.as_ref(), hasher));
        }
        acc.unwrap_or(Digest::EMPTY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::Blake3Hasher;

    fn d(data: &[u8]) -> Digest {
        Blake3Hasher.digest(data)
    }

    #[test]
    fn test_checksum_substitutes_affected_slot() {
        let proof = NodeProof::new(Digest::EMPTY, vec![d(b"a"), d(b"stale"), d(b"c")], 1);

        let substituted = proof.checksum_with(Some(&d(b"fresh")), &Blake3Hasher);
        let expected = digest_concat(&Blake3Hasher, &[d(b"a"), d(b"fresh"), d(b"c")]);
        assert_eq!(substituted, expected);

        let untouched = proof.checksum_with(None, &Blake3Hasher);
        let expected = digest_concat(&Blake3Hasher, &[d(b"a"), d(b"stale"), d(b"c")]);
        assert_eq!(untouched, expected);
    }

    #[test]
    fn test_expected_root_folds_leaf_to_root() {
        // two levels: root branch over [leaf_checksum, other], leaf over
        // [kv0, kv1] with kv1 affected
        let leaf_proof = NodeProof::new(Digest::EMPTY, vec![d(b"kv0"), d(b"kv1-stale")], 1);
        let leaf_checksum = digest_concat(&Blake3Hasher, &[d(b"kv0"), d(b"kv1")]);
        let root_proof = NodeProof::new(Digest::EMPTY, vec![Digest::EMPTY, d(b"other")], 0);

        let mut path = MerklePath::single(leaf_proof);
        path.push_parent(root_proof);

        let expected = digest_concat(&Blake3Hasher, &[leaf_checksum, d(b"other")]);
        assert_eq!(path.expected_root(&d(b"kv1"), &Blake3Hasher), expected);
    }

    #[test]
    fn test_empty_path_returns_substituted_entry() {
        let path = MerklePath::default();
        assert_eq!(
            path.expected_root(&d(b"kv"), &Blake3Hasher),
            d(b"kv")
        );
        assert!(path.is_empty());
    }
}
