//! Typed node store with a monotonic id allocator

use crate::codec::Codec;
use crate::error::Result;
use crate::KvStore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifier of a stored node.
///
/// Ids are allocated monotonically and never reused. The backend key for a
/// node is the fixed 8-byte big-endian encoding of its id.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(u64);

/// The id the tree root always lives under
pub const ROOT_ID: NodeId = NodeId(0);

impl NodeId {
    /// Create an id from its raw value
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw id value
    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// Big-endian key bytes for the backend
    pub fn to_bytes(&self) -> [u8; 8] {
        self.0.to_be_bytes()
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Typed node store over a raw key-value backend.
///
/// Values are encoded with the configured [`Codec`] and addressed by
/// [`NodeId`]. The store also owns id allocation: `next_id` hands out fresh
/// ids from an atomic counter seeded at open time.
pub struct BinaryNodeStore<T, S, C> {
    kv: S,
    codec: C,
    next_id: AtomicU64,
    _marker: PhantomData<fn() -> T>,
}

impl<T, S, C> BinaryNodeStore<T, S, C>
where
    S: KvStore,
    C: Codec<T>,
{
    /// Open a store over `kv`, seeding the id allocator past the highest id
    /// already present.
    ///
    /// Ids are allocated contiguously, so the first absent id bounds
    /// everything the backend holds. Id 0 is reserved for the tree root and
    /// is never handed out by `next_id`.
    pub async fn open(kv: S, codec: C) -> Result<Self> {
        let mut candidate = ROOT_ID.as_u64();
        while kv.contains(&NodeId::new(candidate).to_bytes()).await? {
            candidate += 1;
        }
        Ok(Self {
            kv,
            codec,
            next_id: AtomicU64::new(candidate.max(1)),
            _marker: PhantomData,
        })
    }

    /// Retrieve and decode the node stored under `id`
    pub async fn get(&self, id: NodeId) -> Result<T> {
        let bytes = self.kv.get(&id.to_bytes()).await?;
        Ok(self.codec.decode(&bytes)?)
    }

    /// Encode and store `node` under `id`, overwriting any previous node
    pub async fn put(&self, id: NodeId, node: &T) -> Result<()> {
        let bytes = self.codec.encode(node)?;
        self.kv.put(&id.to_bytes(), bytes).await
    }

    /// Check whether a node is stored under `id`
    pub async fn contains(&self, id: NodeId) -> Result<bool> {
        self.kv.contains(&id.to_bytes()).await
    }

    /// Allocate the next unused id
    pub fn next_id(&self) -> NodeId {
        NodeId::new(self.next_id.fetch_add(1, Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::CborCodec;
    use crate::memory::MemoryKvStore;

    type TestStore = BinaryNodeStore<String, MemoryKvStore, CborCodec>;

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let store: TestStore = BinaryNodeStore::open(MemoryKvStore::new(), CborCodec)
            .await
            .unwrap();

        let id = store.next_id();
        store.put(id, &"payload".to_string()).await.unwrap();

        assert!(store.contains(id).await.unwrap());
        assert_eq!(store.get(id).await.unwrap(), "payload");
    }

    #[tokio::test]
    async fn test_fresh_store_skips_root_id() {
        let store: TestStore = BinaryNodeStore::open(MemoryKvStore::new(), CborCodec)
            .await
            .unwrap();

        assert_eq!(store.next_id(), NodeId::new(1));
        assert_eq!(store.next_id(), NodeId::new(2));
    }

    #[tokio::test]
    async fn test_allocator_seeds_past_existing_ids() {
        let kv = MemoryKvStore::new();
        {
            let store: TestStore = BinaryNodeStore::open(kv.clone(), CborCodec).await.unwrap();
            for raw in 0..3 {
                store
                    .put(NodeId::new(raw), &format!("node-{raw}"))
                    .await
                    .unwrap();
            }
        }

        let reopened: TestStore = BinaryNodeStore::open(kv, CborCodec).await.unwrap();
        assert_eq!(reopened.next_id(), NodeId::new(3));
        assert_eq!(reopened.get(NodeId::new(1)).await.unwrap(), "node-1");
    }

    #[test]
    fn test_node_id_key_encoding() {
        assert_eq!(NodeId::new(1).to_bytes(), [0, 0, 0, 0, 0, 0, 0, 1]);
        assert_eq!(ROOT_ID.to_bytes(), [0; 8]);
    }
}
