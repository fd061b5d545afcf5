//! Module containing the Tree Registry: arena-allocated primary/backup delivery trees.
//!
//! Trees reference each other recursively (a backup's `parent`, and every tree's `primary`), so
//! they are stored in a flat arena and referenced by [`TreeId`] handle rather than by `Rc`
//! pointer, per the representation note in §3 of the specification: an `Rc` graph of trees that
//! reference their own parent would be a reference cycle. This mirrors the teacher's own
//! `NodeID`-as-index idiom (`type NodeID = u16`, looked up in a `Vec`) rather than its
//! `Rc<RefCell<..>>` multigraph idiom, which is reserved here for the (acyclic, externally owned)
//! network graph in [`crate::topology`].

use std::collections::HashMap;

use crate::types::{GroupIp, NodeId, SourceIp, Tag, TAG_MAX, TAG_MIN};

/// Handle to a tree (primary or backup) stored in a [`TreeRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TreeId(u32);

/// A single tree: a rooted out-arborescence over [`NodeId`]s, with a backup pointer attached to
/// each outgoing edge.
#[derive(Debug, Clone)]
pub struct TreeNode {
    id: TreeId,
    root: NodeId,
    parent: Option<TreeId>,
    primary: TreeId,
    predecessor_switch: Option<NodeId>,
    tag: Tag,
    /// Next tag to hand out to a child backup. Only meaningful when `self.primary == self.id`
    /// (i.e. this is a primary tree).
    tag_cursor: u16,
    /// The most recently allocated backup under this primary, to make `undo_backup` safe
    /// immediately after `new_backup` and a no-op (with a log line) otherwise.
    last_backup_alloc: Option<TreeId>,
    out_edges: HashMap<NodeId, Vec<(NodeId, Option<TreeId>)>>,
    in_edge: HashMap<NodeId, NodeId>,
}

impl TreeNode {
    fn new(id: TreeId, root: NodeId, parent: Option<TreeId>, predecessor_switch: Option<NodeId>, tag: Tag) -> Self {
        Self {
            id,
            root,
            parent,
            primary: id,
            predecessor_switch,
            tag,
            tag_cursor: TAG_MIN,
            last_backup_alloc: None,
            out_edges: HashMap::new(),
            in_edge: HashMap::new(),
        }
    }

    /// Handle of this tree.
    pub fn id(&self) -> TreeId {
        self.id
    }

    /// Root node of this tree (the source switch for a primary, the upstream switch of the
    /// protected edge for a backup).
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// `None` for a primary tree; the parent tree owning the edge this tree protects otherwise.
    pub fn parent(&self) -> Option<TreeId> {
        self.parent
    }

    /// The top-most primary tree. Self-referential for primary trees.
    pub fn primary(&self) -> TreeId {
        self.primary
    }

    /// `true` if this tree is itself a primary tree (as opposed to a backup).
    pub fn is_primary(&self) -> bool {
        self.parent.is_none()
    }

    /// The upstream switch in the packet's path at the point this backup begins. `None` for
    /// primary trees.
    pub fn predecessor_switch(&self) -> Option<NodeId> {
        self.predecessor_switch
    }

    /// VLAN tag carried by traffic on this tree. `None` (untagged) for primary trees.
    pub fn tag(&self) -> Tag {
        self.tag
    }

    /// `true` if `node` is the root or reachable from the root.
    pub fn contains(&self, node: NodeId) -> bool {
        node == self.root || self.in_edge.contains_key(&node)
    }

    /// Out-degree of `node` within this tree (0 if `node` is not present).
    pub fn out_degree(&self, node: NodeId) -> usize {
        self.out_edges.get(&node).map(Vec::len).unwrap_or(0)
    }

    /// The tree-parent of `node` (the upstream node along the unique root-to-`node` path), or
    /// `None` if `node` is the root or absent.
    pub fn tree_parent(&self, node: NodeId) -> Option<NodeId> {
        self.in_edge.get(&node).copied()
    }

    /// `true` if the directed edge `(u, v)` is part of this tree.
    pub fn has_edge(&self, u: NodeId, v: NodeId) -> bool {
        self.out_edges
            .get(&u)
            .map(|children| children.iter().any(|(c, _)| *c == v))
            .unwrap_or(false)
    }

    /// The tree-children of `node` (the nodes it forwards to within this tree).
    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.out_edges
            .get(&node)
            .map(|cs| cs.iter().map(|(c, _)| *c).collect())
            .unwrap_or_default()
    }

    /// The backup tree attached to edge `(u, v)`, if any.
    pub fn backup_of(&self, u: NodeId, v: NodeId) -> Option<TreeId> {
        self.out_edges.get(&u).and_then(|children| {
            children
                .iter()
                .find(|(c, _)| *c == v)
                .and_then(|(_, b)| *b)
        })
    }

    /// Sets (or clears) the backup pointer on edge `(u, v)`.
    pub fn set_backup(&mut self, u: NodeId, v: NodeId, backup: Option<TreeId>) {
        if let Some(children) = self.out_edges.get_mut(&u) {
            if let Some(entry) = children.iter_mut().find(|(c, _)| *c == v) {
                entry.1 = backup;
            }
        }
    }

    /// Adds edge `(u, v)` to the tree, with no backup attached. `u` must already be in the tree.
    pub fn add_edge(&mut self, u: NodeId, v: NodeId) {
        debug_assert!(self.contains(u), "tree edge source must already be attached");
        self.out_edges.entry(u).or_default().push((v, None));
        self.out_edges.entry(v).or_default();
        self.in_edge.insert(v, u);
    }

    /// Removes node `v` (and the edge leading to it) from the tree. `v` must currently be a leaf
    /// (out-degree 0); the caller (the leave algorithm) is responsible for walking bottom-up.
    pub fn remove_leaf(&mut self, v: NodeId) {
        debug_assert_eq!(self.out_degree(v), 0, "remove_leaf called on a non-leaf");
        if let Some(parent) = self.in_edge.remove(&v) {
            if let Some(children) = self.out_edges.get_mut(&parent) {
                children.retain(|(c, _)| *c != v);
            }
        }
        self.out_edges.remove(&v);
    }

    /// Iterates all nodes currently in the tree (root included).
    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::once(self.root).chain(self.in_edge.keys().copied())
    }

    /// Iterates all directed edges currently in the tree, as `(u, v, backup)`.
    pub fn edges(&self) -> impl Iterator<Item = (NodeId, NodeId, Option<TreeId>)> + '_ {
        self.out_edges
            .iter()
            .flat_map(|(u, children)| children.iter().map(move |(v, b)| (*u, *v, *b)))
    }

    /// Reconstructs the unique root-to-`w` path by walking parent pointers upward.
    pub fn path_from_root_to(&self, w: NodeId) -> Vec<NodeId> {
        let mut path = vec![w];
        let mut cur = w;
        while let Some(parent) = self.in_edge.get(&cur).copied() {
            path.push(parent);
            cur = parent;
        }
        path.reverse();
        path
    }
}

/// Arena owning every primary and backup tree, keyed by [`TreeId`] and, for primaries, by
/// `(group_ip, source_ip)`.
#[derive(Debug, Default)]
pub struct TreeRegistry {
    arena: Vec<Option<TreeNode>>,
    primaries: HashMap<(GroupIp, SourceIp), TreeId>,
}

impl TreeRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            arena: Vec::new(),
            primaries: HashMap::new(),
        }
    }

    fn alloc(&mut self, node: TreeNode) -> TreeId {
        let id = TreeId(self.arena.len() as u32);
        self.arena.push(Some(TreeNode { id, ..node }));
        id
    }

    /// Creates a primary tree for `(group_ip, source_ip)` rooted at `root_switch`, or is a no-op
    /// returning the existing tree id if one is already registered.
    pub fn create(&mut self, group_ip: GroupIp, source_ip: SourceIp, root_switch: NodeId) -> TreeId {
        if let Some(existing) = self.primaries.get(&(group_ip, source_ip)) {
            return *existing;
        }
        let id = TreeId(self.arena.len() as u32);
        let node = TreeNode::new(id, root_switch, None, None, None);
        self.arena.push(Some(node));
        self.primaries.insert((group_ip, source_ip), id);
        id
    }

    /// Looks up the primary tree for `(group_ip, source_ip)`.
    pub fn lookup(&self, group_ip: GroupIp, source_ip: SourceIp) -> Option<TreeId> {
        self.primaries.get(&(group_ip, source_ip)).copied()
    }

    /// Tears down a primary tree and every backup in its hierarchy, discarding all state.
    /// Returns the set of tree ids that were freed, in post-order (backups before the primary),
    /// so the caller (the Tree Builder) can walk them to uninstall flows before the registry
    /// state disappears.
    pub fn remove(&mut self, group_ip: GroupIp, source_ip: SourceIp) -> Vec<TreeId> {
        let Some(primary_id) = self.primaries.remove(&(group_ip, source_ip)) else {
            return Vec::new();
        };
        let mut order = Vec::new();
        self.collect_post_order(primary_id, &mut order);
        for id in &order {
            self.arena[id.0 as usize] = None;
        }
        order
    }

    /// Tears down a single backup subtree (and every nested backup underneath it) without
    /// touching the primary it hangs off of. Used by the leave algorithm (§4.3.2) when an edge
    /// with a backup is pruned from a primary tree that otherwise survives — unlike [`Self::remove`],
    /// which only applies when the whole primary is going away. Returns the freed ids in
    /// post-order (nested backups before `backup_id` itself).
    pub fn free_backup_subtree(&mut self, backup_id: TreeId) -> Vec<TreeId> {
        let mut order = Vec::new();
        self.collect_post_order(backup_id, &mut order);
        for id in &order {
            self.arena[id.0 as usize] = None;
        }
        order
    }

    fn collect_post_order(&self, id: TreeId, out: &mut Vec<TreeId>) {
        let Some(node) = self.get(id) else { return };
        let mut backups: Vec<TreeId> = node.edges().filter_map(|(_, _, b)| b).collect();
        backups.sort_unstable();
        backups.dedup();
        for b in backups {
            self.collect_post_order(b, out);
        }
        out.push(id);
    }

    /// Allocates a new backup tree rooted at `root_switch`, protecting an edge of `parent_tree`,
    /// consuming the next tag from the primary's tag cursor (wrapping `4094` back to `1` with no
    /// collision check, per the spec's documented, accepted limitation).
    pub fn new_backup(
        &mut self,
        parent_tree: TreeId,
        root_switch: NodeId,
        predecessor_switch: NodeId,
    ) -> TreeId {
        let primary_id = self.get(parent_tree).expect("parent_tree must exist").primary();
        let tag = {
            let primary = self.arena[primary_id.0 as usize]
                .as_mut()
                .expect("primary tree must exist");
            let t = primary.tag_cursor;
            primary.tag_cursor = if t >= TAG_MAX { TAG_MIN } else { t + 1 };
            t
        };
        let backup_id = TreeId(self.arena.len() as u32);
        let node = TreeNode::new(backup_id, root_switch, Some(parent_tree), Some(predecessor_switch), Some(tag));
        let mut node = node;
        node.primary = primary_id;
        self.arena.push(Some(node));

        if let Some(primary) = self.arena[primary_id.0 as usize].as_mut() {
            primary.last_backup_alloc = Some(backup_id);
        }
        backup_id
    }

    /// Releases a backup tree and its tag, provided it is the most recently allocated backup
    /// under its primary and nothing has installed flows against it yet. Safe to call only
    /// immediately after `new_backup`; otherwise this is a logged no-op that still frees the
    /// arena slot but leaves the tag consumed (the spec explicitly tolerates this drift).
    pub fn undo_backup(&mut self, backup_tree: TreeId) {
        let Some(backup) = self.get(backup_tree) else { return };
        let primary_id = backup.primary();

        let safe = self.arena[primary_id.0 as usize]
            .as_ref()
            .map(|p| p.last_backup_alloc == Some(backup_tree))
            .unwrap_or(false);

        if safe {
            if let Some(primary) = self.arena[primary_id.0 as usize].as_mut() {
                primary.tag_cursor = if primary.tag_cursor <= TAG_MIN {
                    TAG_MAX
                } else {
                    primary.tag_cursor - 1
                };
                primary.last_backup_alloc = None;
            }
        } else {
            log::warn!(
                "undo_backup called on {:?} after other allocations; tag will not be reclaimed",
                backup_tree
            );
        }
        self.arena[backup_tree.0 as usize] = None;
    }

    /// Borrows a tree by handle.
    pub fn get(&self, id: TreeId) -> Option<&TreeNode> {
        self.arena.get(id.0 as usize).and_then(|s| s.as_ref())
    }

    /// Mutably borrows a tree by handle.
    pub fn get_mut(&mut self, id: TreeId) -> Option<&mut TreeNode> {
        self.arena.get_mut(id.0 as usize).and_then(|s| s.as_mut())
    }
}
