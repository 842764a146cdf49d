//! # Trellis Core
//!
//! An authenticated, order-preserving search tree for servers that must not
//! learn what they index.
//!
//! This crate provides:
//! - **Tree engine**: `get`, `range`, and `put` over a hybrid B+Tree /
//!   Merkle tree persisted in a pluggable node store
//! - **Command protocol**: the client-side oracle that supplies key ordering
//!   and verifies every mutation
//! - **Merkle paths**: per-level proofs a client folds back into the
//!   expected root checksum
//! - **Node model**: immutable leaf and branch values with split, rewrite,
//!   and checksum operations
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │           Client (ordering,             │
//! │        verification, values)            │
//! ├─────────────────────────────────────────┤
//! │      Command Protocol (async RPC)       │
//! ├─────────────────────────────────────────┤
//! │   TrellisTree: traversal, logical put   │
//! ├─────────────────────────────────────────┤
//! │     Node model    │    Merkle paths     │
//! ├───────────────────┴─────────────────────┤
//! │      trellis-nodestore (KvStore)        │
//! └─────────────────────────────────────────┘
//! ```
//!
//! The engine never compares keys: at every branch hop it asks the command
//! for the child slot, and at the leaf it asks where the key sits. What it
//! does own is structure — splits, sibling links, checksums, persistence —
//! and the discipline that nothing is committed until the client has
//! verified the merkle path of the pending change.

pub mod command;
pub mod config;
pub mod error;
pub mod hash;
pub mod node;
pub mod proof;
mod put;
pub mod range;
pub mod tree;

pub use command::{PutCommand, PutDetails, SearchCommand, SearchResult, TreeCommand};
pub use config::TreeConfig;
pub use error::{CommandError, Result, TreeError};
pub use hash::{Blake3Hasher, Digest, NodeHasher};
pub use node::{BranchNode, ChildRef, Key, LeafNode, Node, ValueRef};
pub use proof::{MerklePath, NodeProof};
pub use range::RangeScan;
pub use tree::TrellisTree;

pub use trellis_nodestore::{
    BinaryNodeStore, CborCodec, Codec, KvStore, MemoryKvStore, NodeId, ROOT_ID,
};
