//! Logical put: computing a mutation's nodes and merkle path
//!
//! A `put` descends to a leaf recording every visited branch, applies the
//! client's details to the leaf, and then folds the recorded trail from the
//! nearest ancestor up to the root. The fold works on node values only; its
//! single outside effect is id allocation for split halves. Nothing touches
//! the store until the resulting [`PutTask`] is committed.

use crate::error::{Result, TreeError};
use crate::hash::{Digest, NodeHasher};
use crate::node::{BranchNode, ChildRef, Key, LeafNode, Node};
use crate::proof::MerklePath;
use trellis_nodestore::{NodeId, ROOT_ID};

/// One visited branch on the way down to the target leaf
#[derive(Clone, Debug)]
pub(crate) struct PathElem {
    pub branch_id: NodeId,
    pub branch: BranchNode,
    pub next_child_idx: usize,
}

/// Batch of nodes a single mutation persists
#[derive(Clone, Debug)]
pub(crate) struct PutTask {
    pub nodes_to_save: Vec<(NodeId, Node)>,
    pub increase_depth: bool,
    pub was_splitting: bool,
}

/// How the next ancestor must be revised to account for the level below it
enum ParentUpdate {
    /// Child changed in place: replace its checksum in the parent slot
    ReplaceChecksum(Digest),
    /// Child split: insert the left half before the slot and re-point the
    /// slot at the right half
    InsertSplit {
        pop_up: Key,
        left: ChildRef,
        right: ChildRef,
        insert_to_left: bool,
    },
    /// The root was rebuilt below this point; the trail must be exhausted
    Rebuilt,
}

/// Compute the merkle path and persistence task for a leaf update.
///
/// `new_leaf` is the already-updated leaf, `insertion_idx` the slot the
/// write landed in, and `trail` the branches visited on the way down,
/// root first.
pub(crate) fn logical_put<H: NodeHasher>(
    hasher: &H,
    max_degree: usize,
    alloc_id: &mut dyn FnMut() -> NodeId,
    leaf_id: NodeId,
    new_leaf: LeafNode,
    insertion_idx: usize,
    trail: Vec<PathElem>,
) -> Result<(MerklePath, PutTask)> {
    let (mut path, mut task, mut update) =
        leaf_context(hasher, max_degree, alloc_id, leaf_id, new_leaf, insertion_idx)?;

    for elem in trail.into_iter().rev() {
        (path, task, update) =
            fold_branch(hasher, max_degree, alloc_id, path, task, update, elem)?;
    }

    Ok((path, task))
}

fn pop_up_key(node_kind: &str, last: Option<&Key>) -> Result<Key> {
    last.cloned()
        .ok_or_else(|| TreeError::Corrupted(format!("split produced an empty {node_kind} half")))
}

fn leaf_context<H: NodeHasher>(
    hasher: &H,
    max_degree: usize,
    alloc_id: &mut dyn FnMut() -> NodeId,
    leaf_id: NodeId,
    new_leaf: LeafNode,
    insertion_idx: usize,
) -> Result<(MerklePath, PutTask, ParentUpdate)> {
    if new_leaf.size() <= max_degree {
        let path = MerklePath::single(new_leaf.to_proof(insertion_idx));
        let update = ParentUpdate::ReplaceChecksum(new_leaf.checksum().clone());
        let task = PutTask {
            nodes_to_save: vec![(leaf_id, Node::Leaf(new_leaf))],
            increase_depth: false,
            was_splitting: false,
        };
        return Ok((path, task, update));
    }

    // Overflow. The right half moves to a fresh id; the left half keeps the
    // leaf's id unless the leaf is the root, which must stay at ROOT_ID for
    // the new parent.
    let right_id = alloc_id();
    let left_id = if leaf_id == ROOT_ID { alloc_id() } else { leaf_id };
    let (left, right) = new_leaf.split(right_id, hasher);

    let insert_to_left = insertion_idx < left.size();
    let (affected, affected_idx) = if insert_to_left {
        (&left, insertion_idx)
    } else {
        (&right, insertion_idx - left.size())
    };
    let mut path = MerklePath::single(affected.to_proof(affected_idx));

    let pop_up = pop_up_key("left leaf", left.last_key())?;
    let left_ref = ChildRef {
        id: left_id,
        checksum: left.checksum().clone(),
    };
    let right_ref = ChildRef {
        id: right_id,
        checksum: right.checksum().clone(),
    };

    if leaf_id == ROOT_ID {
        let right_key = pop_up_key("right leaf", right.last_key())?;
        let parent = BranchNode::parent_of(pop_up, left_ref, right_key, right_ref, hasher);
        path.push_parent(parent.to_proof(usize::from(!insert_to_left)));
        let task = PutTask {
            nodes_to_save: vec![
                (left_id, Node::Leaf(left)),
                (right_id, Node::Leaf(right)),
                (ROOT_ID, Node::Branch(parent)),
            ],
            increase_depth: true,
            was_splitting: true,
        };
        Ok((path, task, ParentUpdate::Rebuilt))
    } else {
        let task = PutTask {
            nodes_to_save: vec![(left_id, Node::Leaf(left)), (right_id, Node::Leaf(right))],
            increase_depth: false,
            was_splitting: true,
        };
        let update = ParentUpdate::InsertSplit {
            pop_up,
            left: left_ref,
            right: right_ref,
            insert_to_left,
        };
        Ok((path, task, update))
    }
}

/// Revise one visited branch with the update coming from the level below,
/// returning the revised branch and the child slot the mutation now sits in.
fn apply_update<H: NodeHasher>(
    hasher: &H,
    update: ParentUpdate,
    elem: &PathElem,
) -> Result<(BranchNode, usize)> {
    match update {
        ParentUpdate::ReplaceChecksum(digest) => Ok((
            elem.branch
                .update_child_checksum(digest, elem.next_child_idx, hasher),
            elem.next_child_idx,
        )),
        ParentUpdate::InsertSplit {
            pop_up,
            left,
            right,
            insert_to_left,
        } => {
            let branch = elem
                .branch
                .insert_child(pop_up, left, elem.next_child_idx, hasher)
                .update_child_ref(right, elem.next_child_idx + 1, hasher);
            let idx = if insert_to_left {
                elem.next_child_idx
            } else {
                elem.next_child_idx + 1
            };
            Ok((branch, idx))
        }
        ParentUpdate::Rebuilt => Err(TreeError::Corrupted(
            "descent trail continues past a rebuilt root".into(),
        )),
    }
}

fn fold_branch<H: NodeHasher>(
    hasher: &H,
    max_degree: usize,
    alloc_id: &mut dyn FnMut() -> NodeId,
    mut path: MerklePath,
    mut task: PutTask,
    update: ParentUpdate,
    elem: PathElem,
) -> Result<(MerklePath, PutTask, ParentUpdate)> {
    let (revised, child_idx) = apply_update(hasher, update, &elem)?;

    if revised.size() <= max_degree {
        path.push_parent(revised.to_proof(child_idx));
        let next = ParentUpdate::ReplaceChecksum(revised.checksum().clone());
        task.nodes_to_save.push((elem.branch_id, Node::Branch(revised)));
        return Ok((path, task, next));
    }

    // Overflow. Unlike a leaf, the left half moves to a fresh id and the
    // right half keeps the branch's id, so sibling links never come into it.
    let left_id = alloc_id();
    let (left, right) = revised.split(hasher);

    let insert_to_left = child_idx < left.size();
    let (affected, affected_idx) = if insert_to_left {
        (&left, child_idx)
    } else {
        (&right, child_idx - left.size())
    };
    path.push_parent(affected.to_proof(affected_idx));

    let pop_up = pop_up_key("left branch", left.last_key())?;
    task.was_splitting = true;

    if elem.branch_id == ROOT_ID {
        let right_id = alloc_id();
        let left_ref = ChildRef {
            id: left_id,
            checksum: left.checksum().clone(),
        };
        let right_ref = ChildRef {
            id: right_id,
            checksum: right.checksum().clone(),
        };
        let right_key = pop_up_key("right branch", right.last_key())?;
        let parent = BranchNode::parent_of(pop_up, left_ref, right_key, right_ref, hasher);
        path.push_parent(parent.to_proof(usize::from(!insert_to_left)));
        task.nodes_to_save.push((left_id, Node::Branch(left)));
        task.nodes_to_save.push((right_id, Node::Branch(right)));
        task.nodes_to_save.push((ROOT_ID, Node::Branch(parent)));
        task.increase_depth = true;
        Ok((path, task, ParentUpdate::Rebuilt))
    } else {
        let right_id = elem.branch_id;
        let left_ref = ChildRef {
            id: left_id,
            checksum: left.checksum().clone(),
        };
        let right_ref = ChildRef {
            id: right_id,
            checksum: right.checksum().clone(),
        };
        task.nodes_to_save.push((left_id, Node::Branch(left)));
        task.nodes_to_save.push((right_id, Node::Branch(right)));
        let update = ParentUpdate::InsertSplit {
            pop_up,
            left: left_ref,
            right: right_ref,
            insert_to_left,
        };
        Ok((path, task, update))
    }
}
