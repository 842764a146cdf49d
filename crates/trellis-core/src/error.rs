//! Error types for the trellis-core crate

use crate::node::ValueRef;
use thiserror::Error;
use trellis_nodestore::{NodeId, StoreError};

/// Result type alias using `TreeError`
pub type Result<T> = std::result::Result<T, TreeError>;

/// Errors that can occur during tree operations.
///
/// Any error aborts the current operation before commit, so persisted state
/// is left untouched.
#[derive(Error, Debug)]
pub enum TreeError {
    /// Node store error
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Client command failed or rejected the operation
    #[error("command error: {0}")]
    Command(#[from] CommandError),

    /// Client returned an index outside the node it was shown
    #[error("index {idx} out of bounds for node of size {size}")]
    IndexOutOfBounds { idx: usize, size: usize },

    /// Decoded a different node kind than the structure requires
    #[error("expected a {expected} node under id {id}")]
    UnexpectedNodeKind { id: NodeId, expected: &'static str },

    /// An update tried to change the value reference of an existing entry
    #[error("value ref mismatch at slot {idx}: update must keep {existing:?}")]
    ValueRefMismatch { idx: usize, existing: ValueRef },

    /// Keys not strictly ascending while key-order assertions are enabled
    #[error("keys out of order in node {id}")]
    KeysOutOfOrder { id: NodeId },

    /// Structural invariant broken in stored or computed state
    #[error("tree corruption: {0}")]
    Corrupted(String),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Errors surfaced by a client command
#[derive(Error, Debug)]
pub enum CommandError {
    /// The command round-trip failed
    #[error("command failed: {0}")]
    Failed(String),

    /// The client rejected the proposed changes
    #[error("changes rejected by client: {0}")]
    Rejected(String),
}
