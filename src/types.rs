//! Module containing the library primitive types.

use std::fmt;

/// Datapath identifier of a switch, as reported by the Topology Oracle.
pub type SwitchId = u64;

/// MAC address of a host, as a 48-bit value packed into a `u64`.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy)]
pub struct Mac(pub u64);

impl fmt::Display for Mac {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.0.to_be_bytes();
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[2], b[3], b[4], b[5], b[6], b[7]
        )
    }
}

/// IPv4 multicast group address.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy)]
pub struct GroupIp(pub u32);

/// IPv4 address of a multicast source.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy)]
pub struct SourceIp(pub u32);

/// A switch-local physical port number. `-1` denotes "attached locally" (a host edge) and is
/// never used as a real output port.
pub type PortNumber = i32;

/// Marker port number meaning "no physical port" (used on host-attached edges).
pub const LOCAL_PORT: PortNumber = -1;

/// VLAN tag identifying a backup tree's traffic on the wire. Valid range is `[1, 4094]`.
/// `None` means untagged, i.e. primary traffic.
pub type Tag = Option<u16>;

/// Lowest valid VLAN tag value.
pub const TAG_MIN: u16 = 1;
/// Highest valid VLAN tag value.
pub const TAG_MAX: u16 = 4094;

/// A node in the network graph: either a switch or a host.
#[derive(PartialEq, Eq, Hash, Debug, Clone, Copy, PartialOrd, Ord)]
pub enum NodeId {
    /// An OpenFlow-programmable switch, identified by its datapath id.
    Switch(SwitchId),
    /// A host, identified by its MAC address.
    Host(Mac),
}

impl NodeId {
    /// Returns `true` if this node is a switch.
    pub fn is_switch(&self) -> bool {
        matches!(self, NodeId::Switch(_))
    }

    /// Returns `true` if this node is a host.
    pub fn is_host(&self) -> bool {
        matches!(self, NodeId::Host(_))
    }

    /// Returns the switch id, panicking if this is not a switch.
    pub fn unwrap_switch(&self) -> SwitchId {
        match self {
            NodeId::Switch(id) => *id,
            NodeId::Host(_) => panic!("`unwrap_switch()` called on a `NodeId::Host`"),
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeId::Switch(id) => write!(f, "switch:{:#x}", id),
            NodeId::Host(mac) => write!(f, "host:{}", mac),
        }
    }
}

/// A directed link in the network graph, together with its forwarding-relevant metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeInfo {
    /// Output port on the source node, or [`LOCAL_PORT`] if the source is a host.
    pub src_port: PortNumber,
    /// Input port on the destination node, or [`LOCAL_PORT`] if the destination is a host.
    pub dst_port: PortNumber,
    /// Whether the underlying link is currently usable.
    pub live: bool,
}

/// An undirected pair of nodes, used to represent a link excluded from a path search
/// regardless of traversal direction.
pub type UndirectedEdge = (NodeId, NodeId);

/// Builds the canonical (both directions) exclusion pair for a directed edge.
pub fn both_directions(u: NodeId, v: NodeId) -> [UndirectedEdge; 2] {
    [(u, v), (v, u)]
}
