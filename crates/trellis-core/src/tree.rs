//! The tree engine: traversal, mutation, and commit
//!
//! The engine owns structure only. Every ordering decision is delegated to
//! the caller-supplied command, every value lives outside the tree behind a
//! [`ValueRef`], and every mutation is computed on immutable node values
//! before anything is persisted. A single mutator permit serializes `get`
//! and `put`; `range` holds it only for the initial root fetch.

use crate::command::{PutCommand, SearchCommand, SearchResult, TreeCommand};
use crate::config::TreeConfig;
use crate::error::{Result, TreeError};
use crate::hash::{kv_digest, Blake3Hasher, Digest, NodeHasher};
use crate::node::{BranchNode, LeafNode, Node, ValueRef};
use crate::proof::MerklePath;
use crate::put::{logical_put, PathElem, PutTask};
use crate::range::RangeScan;
use futures::future::try_join_all;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, instrument};
use trellis_nodestore::{BinaryNodeStore, CborCodec, Codec, KvStore, NodeId, ROOT_ID};

/// An authenticated, order-preserving search tree over an untrusted store.
///
/// Structure lives here; meaning lives with the client. Keys are opaque
/// byte strings whose order only the command knows, values are reachable
/// only through [`ValueRef`]s, and every mutation is answered with a
/// [`MerklePath`] the client verifies before the engine commits.
pub struct TrellisTree<S, C = CborCodec, H = Blake3Hasher> {
    store: Arc<BinaryNodeStore<Node, S, C>>,
    hasher: H,
    config: TreeConfig,
    depth: AtomicUsize,
    mutator: Mutex<()>,
}

impl<S> TrellisTree<S>
where
    S: KvStore,
{
    /// Open a tree over `kv` with the default CBOR codec and BLAKE3 hasher
    pub async fn with_defaults(kv: S, config: TreeConfig) -> Result<Self> {
        let store = BinaryNodeStore::open(kv, CborCodec).await?;
        Self::open(store, Blake3Hasher, config).await
    }
}

impl<S, C, H> TrellisTree<S, C, H>
where
    S: KvStore,
    C: Codec<Node>,
    H: NodeHasher,
{
    /// Open a tree over an existing node store, re-deriving the depth from
    /// whatever root is already persisted.
    pub async fn open(store: BinaryNodeStore<Node, S, C>, hasher: H, config: TreeConfig) -> Result<Self> {
        config.validate()?;
        let tree = Self {
            store: Arc::new(store),
            hasher,
            config,
            depth: AtomicUsize::new(0),
            mutator: Mutex::new(()),
        };
        tree.recover_depth().await?;
        Ok(tree)
    }

    /// Current tree depth: 0 when empty, 1 for a root-only leaf
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }

    /// Checksum of the current root node, or the empty digest before the
    /// first write
    pub async fn merkle_root(&self) -> Result<Digest> {
        let _permit = self.mutator.lock().await;
        if !self.store.contains(ROOT_ID).await? {
            return Ok(Digest::EMPTY);
        }
        Ok(self.store.get(ROOT_ID).await?.checksum().clone())
    }

    /// Look up a value reference.
    ///
    /// Descends under the mutator permit, asking `cmd` for the child slot at
    /// every branch and for the final position in the leaf.
    #[instrument(skip(self, cmd))]
    pub async fn get<Cmd>(&self, cmd: &Cmd) -> Result<Option<ValueRef>>
    where
        Cmd: SearchCommand + ?Sized,
    {
        let _permit = self.mutator.lock().await;
        let mut node = self.load_root().await?;

        loop {
            match node {
                Node::Leaf(leaf) => {
                    if leaf.size() == 0 {
                        return Ok(None);
                    }
                    return match cmd.submit_leaf(Some(&leaf)).await? {
                        SearchResult::Found(idx) => {
                            if idx >= leaf.size() {
                                return Err(TreeError::IndexOutOfBounds {
                                    idx,
                                    size: leaf.size(),
                                });
                            }
                            Ok(Some(leaf.value_refs()[idx]))
                        }
                        SearchResult::InsertionPoint(_) => Ok(None),
                    };
                }
                Node::Branch(branch) => {
                    let idx = self.next_child(cmd, &branch).await?;
                    node = self.store.get(branch.child_ids()[idx]).await?;
                }
            }
        }
    }

    /// Start a range scan.
    ///
    /// The mutator permit covers only the root fetch; the descent and the
    /// subsequent walk along `right_sibling` links run concurrently with
    /// writers. Isolation of a long-running scan is the client's concern.
    #[instrument(skip(self, cmd))]
    pub async fn range<Cmd>(&self, cmd: &Cmd) -> Result<RangeScan<S, C>>
    where
        Cmd: SearchCommand + ?Sized,
    {
        let mut node = {
            let _permit = self.mutator.lock().await;
            self.load_root().await?
        };

        loop {
            match node {
                Node::Leaf(leaf) => {
                    if leaf.size() == 0 {
                        return Ok(RangeScan::empty(self.store.clone()));
                    }
                    let result = cmd.submit_leaf(Some(&leaf)).await?;
                    let start = result.idx();
                    let limit = match result {
                        SearchResult::Found(_) => leaf.size() - 1,
                        SearchResult::InsertionPoint(_) => leaf.size(),
                    };
                    if start > limit {
                        return Err(TreeError::IndexOutOfBounds {
                            idx: start,
                            size: leaf.size(),
                        });
                    }
                    return Ok(RangeScan::new(self.store.clone(), leaf, start));
                }
                Node::Branch(branch) => {
                    let idx = self.next_child(cmd, &branch).await?;
                    node = self.store.get(branch.child_ids()[idx]).await?;
                }
            }
        }
    }

    /// Insert or update a single entry.
    ///
    /// Descends under the mutator permit recording the visited branches,
    /// applies the client's details at the leaf, folds the trail into a new
    /// tree state, and commits only after `cmd.verify_changes` accepts the
    /// resulting merkle path. Any failure before commit leaves persisted
    /// state untouched.
    #[instrument(skip(self, cmd))]
    pub async fn put<Cmd>(&self, cmd: &Cmd) -> Result<ValueRef>
    where
        Cmd: PutCommand + ?Sized,
    {
        let _permit = self.mutator.lock().await;
        let root = self.load_root().await?;

        if let Node::Leaf(leaf) = &root {
            if leaf.size() == 0 {
                return self.put_first_entry(cmd).await;
            }
        }

        let mut trail: Vec<PathElem> = Vec::new();
        let mut node_id = ROOT_ID;
        let mut node = root;
        loop {
            match node {
                Node::Branch(branch) => {
                    let idx = self.next_child(cmd, &branch).await?;
                    let child_id = branch.child_ids()[idx];
                    trail.push(PathElem {
                        branch_id: node_id,
                        branch,
                        next_child_idx: idx,
                    });
                    node_id = child_id;
                    node = self.store.get(child_id).await?;
                }
                Node::Leaf(leaf) => {
                    return self.put_into_leaf(cmd, node_id, leaf, trail).await;
                }
            }
        }
    }

    /// First write into an empty tree: a one-entry leaf becomes the root
    async fn put_first_entry<Cmd>(&self, cmd: &Cmd) -> Result<ValueRef>
    where
        Cmd: PutCommand + ?Sized,
    {
        let details = cmd.put_details(None).await?;
        if let SearchResult::Found(idx) = details.search {
            return Err(TreeError::IndexOutOfBounds { idx, size: 0 });
        }
        let value_ref = cmd.next_value_ref().await?;
        let kv = kv_digest(&self.hasher, details.key.as_bytes(), &details.value_hash);
        let leaf = LeafNode::new_single(details.key, value_ref, kv, &self.hasher);

        let path = MerklePath::single(leaf.to_proof(0));
        cmd.verify_changes(&path, false).await?;

        self.commit(PutTask {
            nodes_to_save: vec![(ROOT_ID, Node::Leaf(leaf))],
            increase_depth: true,
            was_splitting: false,
        })
        .await?;
        Ok(value_ref)
    }

    async fn put_into_leaf<Cmd>(
        &self,
        cmd: &Cmd,
        leaf_id: NodeId,
        leaf: LeafNode,
        trail: Vec<PathElem>,
    ) -> Result<ValueRef>
    where
        Cmd: PutCommand + ?Sized,
    {
        let details = cmd.put_details(Some(&leaf)).await?;
        let kv = kv_digest(&self.hasher, details.key.as_bytes(), &details.value_hash);

        let (new_leaf, value_ref, insertion_idx) = match details.search {
            SearchResult::Found(idx) => {
                if idx >= leaf.size() {
                    return Err(TreeError::IndexOutOfBounds {
                        idx,
                        size: leaf.size(),
                    });
                }
                let existing = leaf.value_refs()[idx];
                let updated = leaf.rewrite(details.key, existing, kv, idx, &self.hasher)?;
                (updated, existing, idx)
            }
            SearchResult::InsertionPoint(idx) => {
                if idx > leaf.size() {
                    return Err(TreeError::IndexOutOfBounds {
                        idx,
                        size: leaf.size(),
                    });
                }
                let value_ref = cmd.next_value_ref().await?;
                let inserted = leaf.insert(details.key, value_ref, kv, idx, &self.hasher);
                (inserted, value_ref, idx)
            }
        };

        let mut alloc = || self.store.next_id();
        let (path, task) = logical_put(
            &self.hasher,
            self.config.max_degree(),
            &mut alloc,
            leaf_id,
            new_leaf,
            insertion_idx,
            trail,
        )?;

        cmd.verify_changes(&path, task.was_splitting).await?;
        self.commit(task).await?;
        Ok(value_ref)
    }

    /// Ask the command for a child slot and bounds-check the answer
    async fn next_child<Cmd>(&self, cmd: &Cmd, branch: &BranchNode) -> Result<usize>
    where
        Cmd: TreeCommand + ?Sized,
    {
        let idx = cmd.next_child_index(branch).await?;
        if idx >= branch.size() {
            return Err(TreeError::IndexOutOfBounds {
                idx,
                size: branch.size(),
            });
        }
        Ok(idx)
    }

    /// Load the root, initializing an empty root leaf on first access
    async fn load_root(&self) -> Result<Node> {
        if self.store.contains(ROOT_ID).await? {
            self.store.get(ROOT_ID).await.map_err(TreeError::from)
        } else {
            debug!("initializing empty root leaf");
            let root = Node::Leaf(LeafNode::empty());
            self.save_node(ROOT_ID, &root).await?;
            Ok(root)
        }
    }

    /// Persist one node, enforcing key-order assertions when enabled
    async fn save_node(&self, id: NodeId, node: &Node) -> Result<()> {
        if self.config.assert_key_order && !node.keys_strictly_ascending() {
            return Err(TreeError::KeysOutOfOrder { id });
        }
        self.store.put(id, node).await?;
        Ok(())
    }

    /// Persist a put task. Node writes are unordered; the depth bump happens
    /// strictly after all of them have landed.
    async fn commit(&self, task: PutTask) -> Result<()> {
        debug!(
            nodes = task.nodes_to_save.len(),
            was_splitting = task.was_splitting,
            "committing put task"
        );
        try_join_all(
            task.nodes_to_save
                .iter()
                .map(|(id, node)| self.save_node(*id, node)),
        )
        .await?;
        if task.increase_depth {
            self.depth.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    /// Walk the leftmost spine to re-derive the depth of a reopened tree
    async fn recover_depth(&self) -> Result<()> {
        if !self.store.contains(ROOT_ID).await? {
            return Ok(());
        }
        let mut node = self.store.get(ROOT_ID).await?;
        if let Node::Leaf(leaf) = &node {
            if leaf.size() == 0 {
                return Ok(());
            }
        }
        let mut depth = 1;
        while let Node::Branch(branch) = node {
            let child_id = *branch.child_ids().first().ok_or_else(|| {
                TreeError::Corrupted("branch without children on the leftmost spine".into())
            })?;
            node = self.store.get(child_id).await?;
            depth += 1;
        }
        self.depth.store(depth, Ordering::SeqCst);
        Ok(())
    }
}
