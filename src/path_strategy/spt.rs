//! Shortest-Path-Tree join strategy: biases the search toward reusing edges already present in
//! the tree, so a tree grown incrementally stays close to a true SPT rather than degenerating
//! into a long chain of private paths.

use std::collections::HashSet;

use crate::path_strategy::{single_source_join, trim_to_tree_entry, PathStrategy, Weight};
use crate::topology::TopologyOracle;
use crate::tree::TreeNode;
use crate::types::{NodeId, UndirectedEdge};

/// Join strategy described in §4.1: standard single-source shortest-path search rooted at the
/// tree's root, with non-tree edges costing `1.0` and edges already in the tree costing
/// `1.0 - epsilon` where `epsilon = 1 / (|E(T)| + 1)`, so Dijkstra prefers walking down an
/// existing branch over opening a new one when both reach `v` in the same number of hops. The
/// root-anchored result is then trimmed to the suffix starting at the tree's entry point.
#[derive(Debug, Default, Clone, Copy)]
pub struct SptStrategy;

impl PathStrategy for SptStrategy {
    fn join(
        &self,
        topology: &dyn TopologyOracle,
        exclude: &HashSet<UndirectedEdge>,
        tree: &TreeNode,
        v: NodeId,
    ) -> Vec<NodeId> {
        if tree.contains(v) {
            return tree.path_from_root_to(v);
        }

        let edge_count = tree.edges().count();
        let epsilon = 1.0 / (edge_count as f32 + 1.0);

        let full_path = single_source_join(topology, exclude, tree, tree.root(), v, |u, w| {
            if tree.has_edge(u, w) {
                Weight(1.0 - epsilon)
            } else {
                Weight(1.0)
            }
        });

        if full_path.len() < 2 {
            return Vec::new();
        }
        trim_to_tree_entry(tree, full_path)
    }
}
