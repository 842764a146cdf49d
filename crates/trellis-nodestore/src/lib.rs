//! # Trellis Nodestore
//!
//! Persistence layer for the Trellis tree engine.
//!
//! This crate provides:
//! - **KvStore trait**: the seam towards the raw key-value backend
//! - **Typed node store**: id-addressed storage of codec-encoded nodes
//! - **Id allocation**: a monotonic node-id provider seeded from the backend
//! - **Memory backend**: an in-memory store for tests and embedding
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              Tree Engine                │
//! ├─────────────────────────────────────────┤
//! │        BinaryNodeStore<T, S, C>         │
//! ├─────────────────────┬───────────────────┤
//! │      Codec<T>       │   KvStore trait   │
//! ├─────────────────────┴───────────────────┤
//! │        Backend (memory, LSM, ...)       │
//! └─────────────────────────────────────────┘
//! ```

pub mod binary;
pub mod codec;
pub mod error;
pub mod memory;

pub use binary::{BinaryNodeStore, NodeId, ROOT_ID};
pub use codec::{CborCodec, Codec};
pub use error::{CodecError, Result, StoreError};
pub use memory::MemoryKvStore;

use async_trait::async_trait;
use bytes::Bytes;

/// Trait for raw key-value backends.
///
/// Implementations are expected to provide durable point reads and writes;
/// anything beyond that (batching, WAL, compaction) is the backend's own
/// concern and stays invisible at this seam.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Retrieve the value stored under `key`
    async fn get(&self, key: &[u8]) -> Result<Bytes>;

    /// Store `value` under `key`, overwriting any previous value
    async fn put(&self, key: &[u8], value: Bytes) -> Result<()>;

    /// Check whether `key` is present
    async fn contains(&self, key: &[u8]) -> Result<bool>;
}
