//! Destination-Steiner-Tree join strategy: plain unit-weight multi-source shortest path from the
//! whole tree, with no bias toward reusing existing branches.

use std::collections::HashSet;

use crate::path_strategy::{multi_source_join, PathStrategy, Weight};
use crate::topology::TopologyOracle;
use crate::tree::TreeNode;
use crate::types::{NodeId, UndirectedEdge};

/// Join strategy described in §4.1: every live edge costs `1.0` regardless of tree membership, so
/// the new subscriber always attaches via the globally shortest path to any node already in the
/// tree.
#[derive(Debug, Default, Clone, Copy)]
pub struct DstStrategy;

impl PathStrategy for DstStrategy {
    fn join(
        &self,
        topology: &dyn TopologyOracle,
        exclude: &HashSet<UndirectedEdge>,
        tree: &TreeNode,
        v: NodeId,
    ) -> Vec<NodeId> {
        multi_source_join(topology, exclude, tree, v, |_, _| Weight(1.0))
    }
}
