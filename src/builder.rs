//! # Tree Builder / Per-Link Protector
//!
//! Owns the join/leave/repair algorithms (§4.3): grows and shrinks primary trees as subscribers
//! come and go, and maintains up to `protection_level` nested backup trees per primary edge. Sits
//! between the Membership Source and the Forwarding Compiler, the way the teacher's `routing`
//! module sits between a `NodeManager`'s scheduling decisions and `route_storage`'s on-disk
//! tables.

use std::collections::HashSet;

use crate::compiler::Compiler;
use crate::config::Config;
use crate::error::{BuilderError, CompilerError};
use crate::path_strategy::PathStrategy;
use crate::switch_driver::SwitchDriver;
use crate::topology::TopologyOracle;
use crate::tree::{TreeId, TreeRegistry};
use crate::types::{GroupIp, NodeId, SourceIp, UndirectedEdge};

/// Grows and shrinks delivery trees, and maintains their backup-tree protection, for every
/// `(group, source)` the controller is asked to manage.
pub struct TreeBuilder<S: PathStrategy> {
    trees: TreeRegistry,
    strategy: S,
    config: Config,
}

impl<S: PathStrategy> TreeBuilder<S> {
    /// Creates a builder using `strategy` for path computation and `config` for the protection
    /// level.
    pub fn new(strategy: S, config: Config) -> Self {
        Self {
            trees: TreeRegistry::new(),
            strategy,
            config,
        }
    }

    /// Read-only access to the underlying tree registry, e.g. for inspection in tests or a
    /// management API.
    pub fn trees(&self) -> &TreeRegistry {
        &self.trees
    }

    /// §4.3.1 — attaches `subscriber` to the delivery tree for `(group, source)`, creating the
    /// primary tree rooted at `root_switch` if this is the first subscriber, then recursively
    /// building up to `protection_level` nested backup trees protecting every edge of the newly
    /// added path.
    pub fn add_subscriber(
        &mut self,
        topology: &dyn TopologyOracle,
        compiler: &mut Compiler,
        driver: &mut dyn SwitchDriver,
        group: GroupIp,
        source: SourceIp,
        root_switch: NodeId,
        subscriber: NodeId,
    ) -> Result<(), BuilderError> {
        let primary = self.trees.create(group, source, root_switch);

        if self.trees.get(primary).unwrap().contains(subscriber) {
            return Err(BuilderError::DuplicateRequest {
                group,
                source_ip: source,
                subscriber,
            });
        }

        let path = self
            .strategy
            .join(topology, &HashSet::new(), self.trees.get(primary).unwrap(), subscriber);
        if path.len() < 2 {
            return Err(BuilderError::NoPath {
                group,
                source_ip: source,
                subscriber,
            });
        }

        let mut new_edges = Vec::new();
        for window in path.windows(2) {
            let (u, v) = (window[0], window[1]);
            if !self.trees.get(primary).unwrap().has_edge(u, v) {
                self.trees.get_mut(primary).unwrap().add_edge(u, v);
                new_edges.push((u, v));
                if u.is_switch() {
                    let inbound = self.trees.get(primary).unwrap().tree_parent(u);
                    compiler
                        .add_flow(driver, u, group, source, self.out_ports(topology, primary, u), inbound)
                        .map_err(BuilderError::Compiler)?;
                }
            }
        }

        for (u, v) in new_edges {
            if u.is_switch() {
                self.protect_edge(
                    topology,
                    compiler,
                    driver,
                    primary,
                    group,
                    source,
                    u,
                    v,
                    1,
                    &HashSet::new(),
                )?;
            }
        }

        Ok(())
    }

    /// Resolves the physical output ports `node` forwards this tree's traffic through, by
    /// looking up each tree-child's edge in the Topology Oracle.
    fn out_ports(
        &self,
        topology: &dyn TopologyOracle,
        tree: TreeId,
        node: NodeId,
    ) -> Vec<crate::types::PortNumber> {
        self.trees
            .get(tree)
            .unwrap()
            .children(node)
            .into_iter()
            .filter_map(|child| topology.edge(node, child).map(|info| info.src_port))
            .collect()
    }

    /// Recursively attaches up to `protection_level` nested backup trees to edge `(u, v)` of
    /// `parent_tree`, per the repeated-protection structure in §3 and §4.3.1. `ancestor_exclude`
    /// is the accumulated `downSet` from every shallower protection level still in effect at this
    /// depth — step 4's `L = downSet ∪ {(x,y),(y,x)}` — so a level-2 backup can never route back
    /// through the level-1 edge it is meant to be simultaneously protecting against.
    #[allow(clippy::too_many_arguments)]
    fn protect_edge(
        &mut self,
        topology: &dyn TopologyOracle,
        compiler: &mut Compiler,
        driver: &mut dyn SwitchDriver,
        parent_tree: TreeId,
        group: GroupIp,
        source: SourceIp,
        u: NodeId,
        v: NodeId,
        depth: u32,
        ancestor_exclude: &HashSet<UndirectedEdge>,
    ) -> Result<(), BuilderError> {
        if depth > self.config.protection_level {
            return Ok(());
        }

        let protected_port = match topology.edge(u, v) {
            Some(info) => info.src_port,
            None => return Ok(()),
        };

        // The backup reconnects at the first node downstream of `v` that still branches or
        // terminates: `v` itself is a single-purpose relay for the edge being protected, so
        // skipping straight to its one child avoids needing a (generally nonexistent) alternate
        // route into `v` specifically.
        let rejoin = match self.trees.get(parent_tree).unwrap().children(v).as_slice() {
            [only] => *only,
            _ => v,
        };

        let mut exclude: HashSet<UndirectedEdge> = ancestor_exclude.clone();
        exclude.insert((u, v));
        exclude.insert((v, u));

        let needs_more = depth < self.config.protection_level;

        let backup_id = self.trees.new_backup(parent_tree, u, u);
        let path = self.strategy.join(topology, &exclude, self.trees.get(backup_id).unwrap(), rejoin);

        if path.len() < 2 {
            self.trees.undo_backup(backup_id);
            log::warn!("no backup path protecting edge {:?}->{:?} at depth {}", u, v, depth);
            return Ok(());
        }

        let reroute_port = match topology.edge(path[0], path[1]) {
            Some(info) => info.src_port,
            None => {
                self.trees.undo_backup(backup_id);
                return Ok(());
            }
        };

        for window in path.windows(2) {
            let (a, b) = (window[0], window[1]);
            if !self.trees.get(backup_id).unwrap().has_edge(a, b) {
                self.trees.get_mut(backup_id).unwrap().add_edge(a, b);
                if a.is_switch() {
                    self.protect_edge(
                        topology, compiler, driver, backup_id, group, source, a, b, depth + 1, &exclude,
                    )?;
                }
            }
        }

        let origin_tag = self.trees.get(parent_tree).unwrap().tag();
        let new_tag = self.trees.get(backup_id).unwrap().tag().expect("backup tree always tagged");
        let inbound_port = self
            .trees
            .get(parent_tree)
            .unwrap()
            .tree_parent(u)
            .and_then(|predecessor| topology.edge(predecessor, u))
            .map(|info| info.dst_port);

        // `u` is always a switch here: both call sites (`add_subscriber` and this function's own
        // recursion) only reach `protect_edge` after checking `is_switch()` on the would-be `u`.
        compiler
            .add_backup(
                driver,
                u,
                group,
                source,
                origin_tag,
                protected_port,
                reroute_port,
                new_tag,
                needs_more,
                inbound_port,
            )
            .map_err(BuilderError::Compiler)?;

        let rejoin_index = path.len() - 1;
        for i in 1..rejoin_index {
            let hop = path[i];
            let next = path[i + 1];
            if !hop.is_switch() {
                continue;
            }
            if let Some(info) = topology.edge(hop, next) {
                compiler
                    .add_relay(driver, u, hop, group, source, origin_tag, protected_port, new_tag, info.src_port)
                    .map_err(BuilderError::Compiler)?;
            }
        }

        if rejoin.is_switch() {
            let rejoin_ports = self.out_ports(topology, parent_tree, rejoin);
            compiler
                .add_rejoin(driver, u, rejoin, group, source, origin_tag, protected_port, new_tag, rejoin_ports)
                .map_err(BuilderError::Compiler)?;
        }

        self.trees.get_mut(parent_tree).unwrap().set_backup(u, v, Some(backup_id));

        Ok(())
    }

    /// §4.3.2 — detaches `subscriber` from the delivery tree, walking upward and pruning every
    /// node left with no remaining children (and no longer a subscriber itself), tearing down the
    /// flows and any backups that protected the edges removed along the way. Frees the whole
    /// `(group, source)` tree hierarchy once the last subscriber leaves.
    pub fn remove_subscriber(
        &mut self,
        topology: &dyn TopologyOracle,
        compiler: &mut Compiler,
        driver: &mut dyn SwitchDriver,
        group: GroupIp,
        source: SourceIp,
        subscriber: NodeId,
    ) -> Result<(), BuilderError> {
        let primary = self
            .trees
            .lookup(group, source)
            .ok_or(BuilderError::UnknownGroup(group, source))?;

        if !self.trees.get(primary).unwrap().contains(subscriber) {
            return Err(BuilderError::UnknownGroup(group, source));
        }

        self.leave(topology, compiler, driver, group, source, primary, subscriber)?;

        let root = self.trees.get(primary).unwrap().root();
        if self.trees.get(primary).unwrap().out_degree(root) == 0 {
            self.trees.remove(group, source);
        }

        Ok(())
    }

    /// Leave (§4.3.2) for the primary tree `tree_id`, starting from `target`. Three independent
    /// walks, each completing before the next starts:
    ///
    /// 1. Prune the forward-only chain of out-degree-`<=1` nodes starting at `target`, removing
    ///    each pruned edge's untagged flow and, where ports remain, reinstalling it with the
    ///    reduced output set.
    /// 2. For every edge walk 1 actually removed that had a backup attached, tear that whole
    ///    backup down — its own nested backups' flows first, then its own bucket, groups and
    ///    relay/rejoin rules — since nothing in the topology still depends on it once its
    ///    protected edge is gone.
    /// 3. Garbage-collect anything walk 1 left at out-degree 0 without reaching the root (a
    ///    defensive pass: walk 1 already only removes zero-out-degree nodes as it goes, so this
    ///    is normally a no-op, but it keeps the algorithm honest if that ever changes).
    fn leave(
        &mut self,
        topology: &dyn TopologyOracle,
        compiler: &mut Compiler,
        driver: &mut dyn SwitchDriver,
        group: GroupIp,
        source: SourceIp,
        tree_id: TreeId,
        target: NodeId,
    ) -> Result<(), BuilderError> {
        let mut node = target;
        let mut pruned_backups: Vec<TreeId> = Vec::new();

        loop {
            let tree = self.trees.get(tree_id).unwrap();
            if !tree.contains(node) || node == tree.root() || tree.out_degree(node) > 0 {
                break;
            }
            let Some(parent) = tree.tree_parent(node) else { break };
            let backup = tree.backup_of(parent, node);

            self.trees.get_mut(tree_id).unwrap().remove_leaf(node);
            if let Some(b) = backup {
                pruned_backups.push(b);
            }

            compiler
                .remove_flow_tagged(driver, parent, group, source, None)
                .or_else(|e| if matches!(e, CompilerError::NoSuchFlow(_)) { Ok(()) } else { Err(e) })
                .map_err(BuilderError::Compiler)?;
            let remaining = self.out_ports(topology, tree_id, parent);
            if !remaining.is_empty() {
                let inbound = self.trees.get(tree_id).unwrap().tree_parent(parent);
                compiler
                    .add_flow_tagged(driver, parent, group, source, remaining, inbound, None)
                    .map_err(BuilderError::Compiler)?;
            }

            node = parent;
        }

        for backup_id in pruned_backups {
            self.teardown_backup(topology, compiler, driver, group, source, backup_id)?;
        }

        loop {
            let tree = self.trees.get(tree_id).unwrap();
            if !tree.contains(node) || node == tree.root() || tree.out_degree(node) > 0 {
                break;
            }
            let Some(parent) = tree.tree_parent(node) else { break };
            self.trees.get_mut(tree_id).unwrap().remove_leaf(node);
            node = parent;
        }

        Ok(())
    }

    /// Recursively deletes every flow installed to protect `tree_id`'s own edges — i.e. every
    /// nested backup hanging off any edge of `tree_id`, however many levels deep — without
    /// touching `tree_id`'s own bucket in its parent. A nested backup's flow lives on the node
    /// where the protection was installed, keyed by the *protecting* tree's own tag (the
    /// `origin_tag` a nested `add_backup` call used), so once the whole subtree under `tree_id`
    /// is going away those entries are deleted outright via [`Compiler::remove_flow_tagged`]
    /// rather than demoted via [`Compiler::remove_backup`] — there is no surviving sibling bucket
    /// left to preserve.
    fn purge_protection_flows(
        &mut self,
        compiler: &mut Compiler,
        driver: &mut dyn SwitchDriver,
        group: GroupIp,
        source: SourceIp,
        tree_id: TreeId,
    ) -> Result<(), BuilderError> {
        let children: Vec<TreeId> = {
            let tree = self.trees.get(tree_id).unwrap();
            let mut ids: Vec<TreeId> = tree.edges().filter_map(|(_, _, b)| b).collect();
            ids.sort_unstable();
            ids.dedup();
            ids
        };
        for child in children {
            self.purge_protection_flows(compiler, driver, group, source, child)?;
        }

        let tag = self.trees.get(tree_id).unwrap().tag();
        let nodes: Vec<NodeId> = self
            .trees
            .get(tree_id)
            .unwrap()
            .nodes()
            .filter(NodeId::is_switch)
            .collect();
        for node in nodes {
            if compiler.has_flow(node, group, source, tag) {
                compiler
                    .remove_flow_tagged(driver, node, group, source, tag)
                    .or_else(|e| if matches!(e, CompilerError::NoSuchFlow(_)) { Ok(()) } else { Err(e) })
                    .map_err(BuilderError::Compiler)?;
            }
        }
        Ok(())
    }

    /// Fully tears down `backup_id`: every flow its own subtree installed first (via
    /// [`Self::purge_protection_flows`]), then the `add_backup` bucket it occupies on its
    /// parent's switch (the mechanism a leaking protection level would otherwise never
    /// uninstall), then frees its arena slot. Unlike [`TreeRegistry::remove`], this leaves
    /// `backup_id`'s own parent/primary tree untouched — the edge this backup protected is gone,
    /// but the rest of the tree survives.
    fn teardown_backup(
        &mut self,
        topology: &dyn TopologyOracle,
        compiler: &mut Compiler,
        driver: &mut dyn SwitchDriver,
        group: GroupIp,
        source: SourceIp,
        backup_id: TreeId,
    ) -> Result<(), BuilderError> {
        self.purge_protection_flows(compiler, driver, group, source, backup_id)?;

        let backup = self.trees.get(backup_id).unwrap();
        let parent_tree = backup.parent().expect("teardown_backup only called on backups");

        let parent = self.trees.get(parent_tree).unwrap();
        let edge = parent.edges().find(|(_, _, b)| *b == Some(backup_id)).map(|(u, v, _)| (u, v));

        if let Some((u, v)) = edge {
            let origin_tag = parent.tag();
            if let Some(info) = topology.edge(u, v) {
                compiler
                    .remove_backup(driver, u, group, source, origin_tag, info.src_port)
                    .or_else(|e| {
                        if matches!(e, CompilerError::NoSuchFlow(_)) || e.is_switch_absent() {
                            Ok(())
                        } else {
                            Err(e)
                        }
                    })
                    .map_err(BuilderError::Compiler)?;
            }
            self.trees.get_mut(parent_tree).unwrap().set_backup(u, v, None);
        }

        self.trees.free_backup_subtree(backup_id);
        Ok(())
    }

    /// §4.3.3 — repair hook invoked when the Topology Oracle reports a link down. The spec leaves
    /// re-optimization of existing trees unimplemented; this control plane instead relies
    /// entirely on the pre-computed backup trees already installed by `add_subscriber`; this hook
    /// exists so the Controller has a single place to log the event for operators.
    pub fn on_link_down(&mut self, u: NodeId, v: NodeId) {
        log::info!("link {:?}->{:?} reported down; relying on pre-installed backups", u, v);
    }
}
