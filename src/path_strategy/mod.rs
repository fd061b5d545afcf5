//! # Path Strategy
//!
//! Pluggable algorithms for computing the path a new subscriber joins a tree by, grounded in the
//! teacher's `Pathfinding` trait: a single `join` entry point, generic over anything implementing
//! [`crate::topology::TopologyOracle`], with the concrete algorithm swapped out behind the trait
//! object the same way the teacher swaps `Cgr`/`SprayAndWait`/`Contact` pathfinding strategies.

mod dst;
mod spt;

pub use dst::DstStrategy;
pub use spt::SptStrategy;

use std::collections::HashSet;

use crate::topology::TopologyOracle;
use crate::tree::TreeNode;
use crate::types::{NodeId, UndirectedEdge};

/// A pluggable tree-join path computation strategy (§4.1).
///
/// Implementations must never route through an edge present in `exclude`, and must return an
/// empty vector if no admissible path exists (callers treat that as [`crate::error::BuilderError::NoPath`]).
pub trait PathStrategy {
    /// Computes the path a new leaf `v` should join `tree` by, given the live `topology`.
    ///
    /// Returns the full path from the tree's root (for [`DstStrategy`]) or from the entry point
    /// already in the tree (for [`SptStrategy`]) to `v`, inclusive of both endpoints. An empty
    /// vector means no path was found.
    fn join(
        &self,
        topology: &dyn TopologyOracle,
        exclude: &HashSet<UndirectedEdge>,
        tree: &TreeNode,
        v: NodeId,
    ) -> Vec<NodeId>;
}

/// Edge weight assigned to a candidate hop during Dijkstra search. Wrapped in its own type (as
/// opposed to a bare `f32`) because `f32` does not implement `Ord`, which a `BinaryHeap` requires;
/// NaN never arises here since weights are always one of a small set of positive constants.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Weight(pub f32);

impl Eq for Weight {}

impl PartialOrd for Weight {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Weight {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.partial_cmp(&other.0).unwrap_or(std::cmp::Ordering::Equal)
    }
}


use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::collections::HashMap;

/// An edge `(u, w)` is admissible for a join search iff it is already part of `tree` or `w` is not
/// yet in `tree` — per §4.1's contract, a search must never propose reattaching an already-present
/// tree node through some other edge, which would give it two parents.
fn edge_admissible(tree: &TreeNode, u: NodeId, w: NodeId) -> bool {
    tree.has_edge(u, w) || !tree.contains(w)
}

/// Multi-source Dijkstra shared by [`DstStrategy`] (and, for nodes not reachable from the root
/// alone, by the entry-point search [`SptStrategy`] relies on being reconstructable from a
/// single-source run): starts relaxation from every node already in `tree` with distance `0`,
/// stops as soon as `v` is popped, and returns the full join path (root-to-entry tree prefix,
/// followed by the newly discovered entry-to-`v` path).
///
/// Grounded in the teacher's `BinaryHeap<Reverse<_>>` priority-queue idiom for Dijkstra over its
/// `Multigraph`, generalized from single-source to multi-source since a DST join may legally
/// attach anywhere in the existing tree rather than only at its root.
pub(crate) fn multi_source_join(
    topology: &dyn TopologyOracle,
    exclude: &HashSet<UndirectedEdge>,
    tree: &TreeNode,
    v: NodeId,
    edge_weight: impl Fn(NodeId, NodeId) -> Weight,
) -> Vec<NodeId> {
    if tree.contains(v) {
        return tree.path_from_root_to(v);
    }

    let mut dist: HashMap<NodeId, Weight> = HashMap::new();
    let mut prev: HashMap<NodeId, NodeId> = HashMap::new();
    let mut heap: BinaryHeap<Reverse<(Weight, NodeId)>> = BinaryHeap::new();

    for node in tree.nodes() {
        dist.insert(node, Weight(0.0));
        heap.push(Reverse((Weight(0.0), node)));
    }

    while let Some(Reverse((d, u))) = heap.pop() {
        if let Some(&best) = dist.get(&u) {
            if d.0 > best.0 {
                continue;
            }
        }
        if u == v {
            break;
        }
        for (w, info) in topology.edges(u) {
            if !info.live || exclude.contains(&(u, w)) || !edge_admissible(tree, u, w) {
                continue;
            }
            let next = Weight(d.0 + edge_weight(u, w).0);
            let better = dist.get(&w).map(|cur| next.0 < cur.0).unwrap_or(true);
            if better {
                dist.insert(w, next);
                prev.insert(w, u);
                heap.push(Reverse((next, w)));
            }
        }
    }

    if !dist.contains_key(&v) {
        return Vec::new();
    }

    let mut suffix = vec![v];
    let mut cur = v;
    while let Some(&p) = prev.get(&cur) {
        suffix.push(p);
        cur = p;
    }
    suffix.reverse();

    let entry = suffix[0];
    if tree.contains(entry) && entry != tree.root() {
        let mut path = tree.path_from_root_to(entry);
        path.extend(suffix.into_iter().skip(1));
        path
    } else {
        suffix
    }
}

/// Single-source Dijkstra from `source` (always the tree's root, per §4.1's "standard
/// single-source shortest-path from the root" for [`SptStrategy`]), returning the full path from
/// `source` to `v` inclusive, or empty if `v` is unreachable. Unlike [`multi_source_join`], this
/// never seeds the search from every tree node — SPT's reduced tree-edge weight is what pulls the
/// search back onto the tree when that is cheaper, not multi-source seeding.
pub(crate) fn single_source_join(
    topology: &dyn TopologyOracle,
    exclude: &HashSet<UndirectedEdge>,
    tree: &TreeNode,
    source: NodeId,
    v: NodeId,
    edge_weight: impl Fn(NodeId, NodeId) -> Weight,
) -> Vec<NodeId> {
    let mut dist: HashMap<NodeId, Weight> = HashMap::new();
    let mut prev: HashMap<NodeId, NodeId> = HashMap::new();
    let mut heap: BinaryHeap<Reverse<(Weight, NodeId)>> = BinaryHeap::new();

    dist.insert(source, Weight(0.0));
    heap.push(Reverse((Weight(0.0), source)));

    while let Some(Reverse((d, u))) = heap.pop() {
        if let Some(&best) = dist.get(&u) {
            if d.0 > best.0 {
                continue;
            }
        }
        if u == v {
            break;
        }
        for (w, info) in topology.edges(u) {
            if !info.live || exclude.contains(&(u, w)) || !edge_admissible(tree, u, w) {
                continue;
            }
            let next = Weight(d.0 + edge_weight(u, w).0);
            let better = dist.get(&w).map(|cur| next.0 < cur.0).unwrap_or(true);
            if better {
                dist.insert(w, next);
                prev.insert(w, u);
                heap.push(Reverse((next, w)));
            }
        }
    }

    if !dist.contains_key(&v) {
        return Vec::new();
    }

    let mut path = vec![v];
    let mut cur = v;
    while let Some(&p) = prev.get(&cur) {
        path.push(p);
        cur = p;
    }
    path.reverse();
    path
}

/// Trims a root-anchored path down to the suffix starting at its last tree-contained node: once a
/// single-source search leaves the tree it can never admissibly re-enter it (see
/// [`edge_admissible`]), so the tree-contained prefix is always contiguous from the start.
pub(crate) fn trim_to_tree_entry(tree: &TreeNode, path: Vec<NodeId>) -> Vec<NodeId> {
    let entry_idx = path.iter().rposition(|n| tree.contains(*n)).unwrap_or(0);
    path[entry_idx..].to_vec()
}
