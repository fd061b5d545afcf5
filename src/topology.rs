//! # Topology Oracle
//!
//! This module defines the narrow read interface the Path Strategy and Forwarding Compiler use
//! to query the live network graph, plus [`Topology`], a concrete adjacency-list graph that
//! implements it. Discovery of switches, links and hosts, and the wire protocol used to learn
//! about them, are out of scope for this crate: [`Topology`] is simply the data structure the
//! embedding controller mutates as it receives [`TopologyEvent`]s from whatever transport it
//! uses, the same way the teacher's `Multigraph` is the concrete graph a `Pathfinding`
//! implementation is handed, regardless of how its contact plan was obtained.

use std::collections::HashMap;

use crate::types::{EdgeInfo, Mac, NodeId, SwitchId};

/// Read-only accessors over a live network graph, as required by the Path Strategy (§4.1) and
/// the Forwarding Compiler (§4.4) to resolve destination nodes into output ports.
pub trait TopologyOracle {
    /// All nodes currently known to the oracle.
    fn nodes(&self) -> Vec<NodeId>;

    /// Returns `true` if `n` is a host rather than a switch.
    fn is_host(&self, n: NodeId) -> bool;

    /// Outgoing edges from `u`, as `(v, edge_info)` pairs.
    fn edges(&self, u: NodeId) -> Vec<(NodeId, EdgeInfo)>;

    /// Returns the edge metadata for the directed edge `(u, v)`, if it exists.
    fn edge(&self, u: NodeId, v: NodeId) -> Option<EdgeInfo>;
}

/// An event describing a change to the live network graph.
#[derive(Debug, Clone, Copy)]
pub enum TopologyEvent {
    /// A new switch connected to the controller.
    SwitchEnter(SwitchId),
    /// A switch disconnected. All of its edges are marked dead; existing tree state referencing
    /// it is left for the Tree Builder's repair hook, per §4.3.3.
    SwitchLeave(SwitchId),
    /// A bidirectional-capable link was discovered or came back up.
    LinkAdd {
        /// Source node.
        u: NodeId,
        /// Destination node.
        v: NodeId,
        /// Edge metadata (ports, liveness).
        info: EdgeInfo,
    },
    /// A link was torn down or declared permanently gone (distinct from a transient liveness
    /// flip, which uses [`Topology::set_live`] instead).
    LinkDelete {
        /// Source node.
        u: NodeId,
        /// Destination node.
        v: NodeId,
    },
    /// A host was discovered attached to a switch.
    HostFound {
        /// The host's MAC address.
        host: Mac,
        /// The switch it is attached to.
        switch: SwitchId,
        /// The switch-local port the host is attached to.
        port: i32,
    },
}

/// A concrete, mutable, directed adjacency-list network graph.
///
/// Grounded in the teacher's `Multigraph`: nodes are looked up in a flat table and edges are
/// grouped per source node, except here the table is a `HashMap` keyed by [`NodeId`] rather than
/// a `Vec` indexed by a dense integer handle, because switches and hosts can appear and disappear
/// at arbitrary points in the network's lifetime (unlike the teacher's static contact plan).
#[derive(Debug, Clone, Default)]
pub struct Topology {
    adjacency: HashMap<NodeId, Vec<(NodeId, EdgeInfo)>>,
    hosts: HashMap<Mac, (SwitchId, i32)>,
}

impl Topology {
    /// Creates an empty topology.
    pub fn new() -> Self {
        Self {
            adjacency: HashMap::new(),
            hosts: HashMap::new(),
        }
    }

    /// Applies a single topology event, mutating the graph in place.
    pub fn apply_event(&mut self, event: TopologyEvent) {
        match event {
            TopologyEvent::SwitchEnter(id) => {
                self.adjacency.entry(NodeId::Switch(id)).or_default();
            }
            TopologyEvent::SwitchLeave(id) => {
                let node = NodeId::Switch(id);
                self.adjacency.remove(&node);
                for edges in self.adjacency.values_mut() {
                    for (_, info) in edges.iter_mut() {
                        info.live = false;
                    }
                    edges.retain(|(peer, _)| *peer != node);
                }
            }
            TopologyEvent::LinkAdd { u, v, info } => {
                self.set_edge(u, v, info);
            }
            TopologyEvent::LinkDelete { u, v } => {
                if let Some(edges) = self.adjacency.get_mut(&u) {
                    edges.retain(|(peer, _)| *peer != v);
                }
            }
            TopologyEvent::HostFound { host, switch, port } => {
                self.hosts.insert(host, (switch, port));
                self.adjacency.entry(NodeId::Host(host)).or_default();
                self.set_edge(
                    NodeId::Host(host),
                    NodeId::Switch(switch),
                    EdgeInfo {
                        src_port: crate::types::LOCAL_PORT,
                        dst_port: port,
                        live: true,
                    },
                );
                self.set_edge(
                    NodeId::Switch(switch),
                    NodeId::Host(host),
                    EdgeInfo {
                        src_port: port,
                        dst_port: crate::types::LOCAL_PORT,
                        live: true,
                    },
                );
            }
        }
    }

    /// Inserts or replaces a single directed edge.
    pub fn set_edge(&mut self, u: NodeId, v: NodeId, info: EdgeInfo) {
        let edges = self.adjacency.entry(u).or_default();
        if let Some(entry) = edges.iter_mut().find(|(peer, _)| *peer == v) {
            entry.1 = info;
        } else {
            edges.push((v, info));
        }
        self.adjacency.entry(v).or_default();
    }

    /// Flips the liveness flag of the directed edge `(u, v)`, if present.
    pub fn set_live(&mut self, u: NodeId, v: NodeId, live: bool) {
        if let Some(edges) = self.adjacency.get_mut(&u) {
            if let Some(entry) = edges.iter_mut().find(|(peer, _)| *peer == v) {
                entry.1.live = live;
            }
        }
    }
}

impl TopologyOracle for Topology {
    fn nodes(&self) -> Vec<NodeId> {
        self.adjacency.keys().copied().collect()
    }

    fn is_host(&self, n: NodeId) -> bool {
        n.is_host()
    }

    fn edges(&self, u: NodeId) -> Vec<(NodeId, EdgeInfo)> {
        self.adjacency.get(&u).cloned().unwrap_or_default()
    }

    fn edge(&self, u: NodeId, v: NodeId) -> Option<EdgeInfo> {
        self.adjacency
            .get(&u)
            .and_then(|edges| edges.iter().find(|(peer, _)| *peer == v))
            .map(|(_, info)| *info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sw(id: u64) -> NodeId {
        NodeId::Switch(id)
    }

    fn live_edge(src_port: i32, dst_port: i32) -> EdgeInfo {
        EdgeInfo {
            src_port,
            dst_port,
            live: true,
        }
    }

    #[test]
    fn link_add_is_visible_from_both_accessors() {
        let mut topo = Topology::new();
        topo.apply_event(TopologyEvent::SwitchEnter(1));
        topo.apply_event(TopologyEvent::SwitchEnter(2));
        topo.apply_event(TopologyEvent::LinkAdd {
            u: sw(1),
            v: sw(2),
            info: live_edge(1, 1),
        });

        assert_eq!(topo.edge(sw(1), sw(2)).unwrap().live, true);
        assert_eq!(topo.edges(sw(1)).len(), 1);
    }

    #[test]
    fn switch_leave_drops_its_edges_and_deadens_incoming_ones() {
        let mut topo = Topology::new();
        topo.apply_event(TopologyEvent::SwitchEnter(1));
        topo.apply_event(TopologyEvent::SwitchEnter(2));
        topo.apply_event(TopologyEvent::LinkAdd {
            u: sw(1),
            v: sw(2),
            info: live_edge(1, 1),
        });
        topo.apply_event(TopologyEvent::LinkAdd {
            u: sw(2),
            v: sw(1),
            info: live_edge(1, 1),
        });

        topo.apply_event(TopologyEvent::SwitchLeave(2));

        assert!(topo.edges(sw(2)).is_empty());
        assert_eq!(topo.edge(sw(1), sw(2)), None);
    }

    #[test]
    fn host_found_creates_symmetric_local_edges() {
        let mut topo = Topology::new();
        topo.apply_event(TopologyEvent::SwitchEnter(1));
        let mac = Mac(0x0000_0000_0001);
        topo.apply_event(TopologyEvent::HostFound {
            host: mac,
            switch: 1,
            port: 5,
        });

        let to_host = topo.edge(sw(1), NodeId::Host(mac)).unwrap();
        assert_eq!(to_host.src_port, 5);
        let from_host = topo.edge(NodeId::Host(mac), sw(1)).unwrap();
        assert_eq!(from_host.dst_port, 5);
    }
}
