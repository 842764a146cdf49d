//! End-to-end scenarios driven by a lexicographic test client
//!
//! The engine never orders keys, so these tests stand in for the client: a
//! command that orders raw key bytes lexicographically, allocates monotonic
//! value references, and folds every merkle path it is shown into the root
//! checksum it expects the tree to have afterwards.

use async_trait::async_trait;
use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use trellis_core::{
    Blake3Hasher, BranchNode, CommandError, Digest, Key, LeafNode, MemoryKvStore, MerklePath,
    NodeHasher, PutCommand, PutDetails, SearchCommand, SearchResult, TreeCommand, TreeConfig,
    TreeError, TrellisTree, ValueRef,
};

/// Shared client state: the value-ref allocator and the verified root
struct TestClient {
    refs: Arc<AtomicU64>,
    verified_root: Arc<Mutex<Digest>>,
    observed_splits: Arc<Mutex<Vec<bool>>>,
}

impl TestClient {
    fn new() -> Self {
        Self {
            refs: Arc::new(AtomicU64::new(1)),
            verified_root: Arc::new(Mutex::new(Digest::EMPTY)),
            observed_splits: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn search(&self, key: &str) -> LexCommand {
        self.command(key, "", false, false)
    }

    fn write(&self, key: &str, value: &str) -> LexCommand {
        self.command(key, value, false, false)
    }

    fn rejecting(&self, key: &str, value: &str) -> LexCommand {
        self.command(key, value, true, false)
    }

    /// A faulty client that appends its key regardless of order
    fn misordered(&self, key: &str, value: &str) -> LexCommand {
        self.command(key, value, false, true)
    }

    fn command(&self, key: &str, value: &str, reject: bool, force_append: bool) -> LexCommand {
        LexCommand {
            key: key.as_bytes().to_vec(),
            value_hash: Blake3Hasher.digest(value.as_bytes()),
            refs: self.refs.clone(),
            verified_root: self.verified_root.clone(),
            observed_splits: self.observed_splits.clone(),
            reject,
            force_append,
        }
    }

    fn last_verified_root(&self) -> Digest {
        self.verified_root.lock().unwrap().clone()
    }

    fn splits(&self) -> Vec<bool> {
        self.observed_splits.lock().unwrap().clone()
    }
}

/// A command that orders keys by their raw bytes
struct LexCommand {
    key: Vec<u8>,
    value_hash: Digest,
    refs: Arc<AtomicU64>,
    verified_root: Arc<Mutex<Digest>>,
    observed_splits: Arc<Mutex<Vec<bool>>>,
    reject: bool,
    force_append: bool,
}

impl LexCommand {
    fn locate(&self, leaf: &LeafNode) -> SearchResult {
        for (i, key) in leaf.keys().iter().enumerate() {
            match self.key.as_slice().cmp(key.as_bytes()) {
                CmpOrdering::Equal => return SearchResult::Found(i),
                CmpOrdering::Less => return SearchResult::InsertionPoint(i),
                CmpOrdering::Greater => {}
            }
        }
        SearchResult::InsertionPoint(leaf.size())
    }
}

#[async_trait]
impl TreeCommand for LexCommand {
    async fn next_child_index(&self, branch: &BranchNode) -> Result<usize, CommandError> {
        let idx = branch
            .keys()
            .iter()
            .position(|key| self.key.as_slice() <= key.as_bytes())
            .unwrap_or(branch.size() - 1);
        Ok(idx)
    }
}

#[async_trait]
impl SearchCommand for LexCommand {
    async fn submit_leaf(&self, leaf: Option<&LeafNode>) -> Result<SearchResult, CommandError> {
        match leaf {
            None => Ok(SearchResult::InsertionPoint(0)),
            Some(leaf) => Ok(self.locate(leaf)),
        }
    }
}

#[async_trait]
impl PutCommand for LexCommand {
    async fn put_details(&self, leaf: Option<&LeafNode>) -> Result<PutDetails, CommandError> {
        let search = match leaf {
            None => SearchResult::InsertionPoint(0),
            Some(leaf) if self.force_append => SearchResult::InsertionPoint(leaf.size()),
            Some(leaf) => self.locate(leaf),
        };
        Ok(PutDetails {
            key: Key::from(self.key.as_slice()),
            value_hash: self.value_hash.clone(),
            search,
        })
    }

    async fn next_value_ref(&self) -> Result<ValueRef, CommandError> {
        Ok(ValueRef::new(self.refs.fetch_add(1, Ordering::SeqCst)))
    }

    async fn verify_changes(
        &self,
        path: &MerklePath,
        was_splitting: bool,
    ) -> Result<(), CommandError> {
        if self.reject {
            return Err(CommandError::Rejected("verification failed".into()));
        }
        // fold the proof exactly the way a remote client would and remember
        // the root we are agreeing to
        let kv = trellis_core::hash::kv_digest(&Blake3Hasher, &self.key, &self.value_hash);
        let expected = path.expected_root(&kv, &Blake3Hasher);
        *self.verified_root.lock().unwrap() = expected;
        self.observed_splits.lock().unwrap().push(was_splitting);
        Ok(())
    }
}

fn small_config() -> TreeConfig {
    TreeConfig {
        arity: 4,
        alpha: 0.25,
        assert_key_order: true,
    }
}

async fn tree_over(kv: MemoryKvStore) -> TrellisTree<MemoryKvStore> {
    TrellisTree::with_defaults(kv, small_config())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_empty_tree_reads() {
    let tree = tree_over(MemoryKvStore::new()).await;
    let client = TestClient::new();

    assert_eq!(tree.depth(), 0);
    assert_eq!(tree.get(&client.search("a")).await.unwrap(), None);

    let scan = tree.range(&client.search("a")).await.unwrap();
    assert!(scan.collect().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_fresh_put_creates_root_leaf() {
    let tree = tree_over(MemoryKvStore::new()).await;
    let client = TestClient::new();

    let value_ref = tree.put(&client.write("b", "vb")).await.unwrap();
    assert_eq!(value_ref, ValueRef::new(1));
    assert_eq!(tree.depth(), 1);

    // root checksum is the digest over the single kv-checksum
    let kv = trellis_core::hash::kv_digest(
        &Blake3Hasher,
        b"b",
        &Blake3Hasher.digest(b"vb"),
    );
    let expected = trellis_core::hash::digest_concat(&Blake3Hasher, std::slice::from_ref(&kv));
    assert_eq!(tree.merkle_root().await.unwrap(), expected);
    assert_eq!(client.last_verified_root(), expected);
}

#[tokio::test]
async fn test_update_reuses_value_ref() {
    let kv = MemoryKvStore::new();
    let tree = tree_over(kv.clone()).await;
    let client = TestClient::new();

    let first = tree.put(&client.write("b", "vb")).await.unwrap();
    let nodes_before = kv.len();

    let second = tree.put(&client.write("b", "vb2")).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(kv.len(), nodes_before);
    assert_eq!(tree.depth(), 1);

    // root now reflects the new value hash
    assert_eq!(
        tree.merkle_root().await.unwrap(),
        client.last_verified_root()
    );
    assert_eq!(tree.get(&client.search("b")).await.unwrap(), Some(first));
}

#[tokio::test]
async fn test_round_trip_after_put() {
    let tree = tree_over(MemoryKvStore::new()).await;
    let client = TestClient::new();

    let value_ref = tree.put(&client.write("k", "v")).await.unwrap();
    assert_eq!(
        tree.get(&client.search("k")).await.unwrap(),
        Some(value_ref)
    );
    assert_eq!(tree.get(&client.search("other")).await.unwrap(), None);
}

#[tokio::test]
async fn test_leaf_split_promotes_root_branch() {
    let kv = MemoryKvStore::new();
    let tree = tree_over(kv.clone()).await;
    let client = TestClient::new();

    for key in ["a", "b", "c", "d"] {
        tree.put(&client.write(key, "v")).await.unwrap();
    }
    assert_eq!(tree.depth(), 1);
    assert_eq!(kv.len(), 1);

    tree.put(&client.write("e", "v")).await.unwrap();

    assert_eq!(tree.depth(), 2);
    // left half, right half, and the new root branch
    assert_eq!(kv.len(), 3);
    assert_eq!(client.splits().last(), Some(&true));
    assert_eq!(
        tree.merkle_root().await.unwrap(),
        client.last_verified_root()
    );

    // every key is still reachable
    for (i, key) in ["a", "b", "c", "d", "e"].iter().enumerate() {
        assert_eq!(
            tree.get(&client.search(key)).await.unwrap(),
            Some(ValueRef::new(i as u64 + 1)),
        );
    }
}

#[tokio::test]
async fn test_range_scan_across_siblings() {
    let tree = tree_over(MemoryKvStore::new()).await;
    let client = TestClient::new();

    for key in ["a", "b", "c", "d", "e"] {
        tree.put(&client.write(key, "v")).await.unwrap();
    }
    assert_eq!(tree.depth(), 2);

    let scan = tree.range(&client.search("a")).await.unwrap();
    let entries = scan.collect().await.unwrap();
    let keys: Vec<&[u8]> = entries.iter().map(|(k, _)| k.as_bytes()).collect();
    assert_eq!(keys, vec![b"a", b"b", b"c", b"d", b"e"]);
    let refs: Vec<u64> = entries.iter().map(|(_, r)| r.as_u64()).collect();
    assert_eq!(refs, vec![1, 2, 3, 4, 5]);

    // start mid-tree, crossing from the left leaf into its sibling
    let scan = tree.range(&client.search("c")).await.unwrap();
    let entries = scan.collect().await.unwrap();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].0, Key::from("c"));

    // past the last key: an empty stream
    let scan = tree.range(&client.search("z")).await.unwrap();
    assert!(scan.collect().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_deep_tree_stays_consistent() {
    let tree = tree_over(MemoryKvStore::new()).await;
    let client = TestClient::new();

    // enough keys to split branches, not just leaves
    let keys: Vec<String> = (0..40).map(|i| format!("key-{i:02}")).collect();
    for key in &keys {
        tree.put(&client.write(key, "v")).await.unwrap();
        assert_eq!(
            tree.merkle_root().await.unwrap(),
            client.last_verified_root()
        );
    }
    assert!(tree.depth() >= 3);

    for (i, key) in keys.iter().enumerate() {
        assert_eq!(
            tree.get(&client.search(key)).await.unwrap(),
            Some(ValueRef::new(i as u64 + 1)),
        );
    }

    let scan = tree.range(&client.search("key-00")).await.unwrap();
    let entries = scan.collect().await.unwrap();
    assert_eq!(entries.len(), keys.len());
    let scanned: Vec<&[u8]> = entries.iter().map(|(k, _)| k.as_bytes()).collect();
    let expected: Vec<&[u8]> = keys.iter().map(|k| k.as_bytes()).collect();
    assert_eq!(scanned, expected);
}

#[tokio::test]
async fn test_rejected_verification_leaves_state_untouched() {
    let kv = MemoryKvStore::new();
    let tree = tree_over(kv.clone()).await;
    let client = TestClient::new();

    tree.put(&client.write("a", "va")).await.unwrap();
    let root_before = tree.merkle_root().await.unwrap();
    let nodes_before = kv.len();

    let err = tree.put(&client.rejecting("b", "vb")).await.unwrap_err();
    assert!(matches!(
        err,
        TreeError::Command(CommandError::Rejected(_))
    ));

    assert_eq!(kv.len(), nodes_before);
    assert_eq!(tree.merkle_root().await.unwrap(), root_before);
    assert_eq!(tree.get(&client.search("b")).await.unwrap(), None);
    assert_eq!(
        tree.get(&client.search("a")).await.unwrap(),
        Some(ValueRef::new(1))
    );
}

#[tokio::test]
async fn test_key_order_assertion_rejects_misordered_write() {
    let kv = MemoryKvStore::new();
    let tree = tree_over(kv.clone()).await;
    let client = TestClient::new();

    tree.put(&client.write("b", "vb")).await.unwrap();
    let root_before = tree.merkle_root().await.unwrap();
    let nodes_before = kv.len();

    // appending "a" after "b" yields a leaf the engine must refuse to
    // persist while assert_key_order is on
    let err = tree.put(&client.misordered("a", "va")).await.unwrap_err();
    assert!(matches!(err, TreeError::KeysOutOfOrder { .. }));

    assert_eq!(kv.len(), nodes_before);
    assert_eq!(tree.merkle_root().await.unwrap(), root_before);
    assert_eq!(tree.get(&client.search("a")).await.unwrap(), None);
    assert_eq!(
        tree.get(&client.search("b")).await.unwrap(),
        Some(ValueRef::new(1))
    );
}

#[tokio::test]
async fn test_reopen_recovers_depth() {
    let kv = MemoryKvStore::new();
    let client = TestClient::new();

    {
        let tree = tree_over(kv.clone()).await;
        for key in ["a", "b", "c", "d", "e"] {
            tree.put(&client.write(key, "v")).await.unwrap();
        }
        assert_eq!(tree.depth(), 2);
    }

    let reopened = tree_over(kv).await;
    assert_eq!(reopened.depth(), 2);
    assert_eq!(
        reopened.get(&client.search("d")).await.unwrap(),
        Some(ValueRef::new(4))
    );
}
