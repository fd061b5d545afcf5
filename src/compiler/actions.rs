//! Abstract switch actions and matches, independent of any particular `SwitchDriver`'s wire
//! encoding (OpenFlow, P4Runtime, ...).

use crate::types::{GroupIp, NodeId, PortNumber, SourceIp};

/// A single action in a switch's apply-actions list. Mirrors the subset of OpenFlow's action set
/// the compiler needs: plain output, output to a fast-failover group, and the three VLAN
/// operations required to carry backup traffic on its own tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Send the packet out a concrete physical port.
    Output(PortNumber),
    /// Send the packet back out the port it arrived on. Substituted for `Output(p)` whenever a
    /// bucket's computed output port equals the flow's own inbound port (§4.4.4).
    InPort,
    /// Send the packet through a fast-failover group (the group itself picks the live bucket).
    OutputGroup(GroupId),
    /// Push a new 802.1Q VLAN header.
    PushVlan,
    /// Set the VLAN id of the outermost 802.1Q header.
    SetVlanVid(u16),
    /// Pop the outermost 802.1Q header.
    PopVlan,
}

/// Identifier of a fast-failover group on a given switch.
pub type GroupId = u32;

/// Packet-header match criteria for a single flow entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlowMatch {
    /// Multicast destination group.
    pub group: GroupIp,
    /// Multicast source.
    pub source: SourceIp,
    /// VLAN tag carried by the packet. `None` matches untagged (primary) traffic.
    pub vlan: Option<u16>,
    /// Upstream switch this traffic entered from, completing the `(group_ip, source_ip, tag,
    /// inbound_switch)` flow key from §3. Optional: only populated when the compiler was told a
    /// real predecessor, matching §4.4.6's "optionally also matches `in_port`".
    pub inbound_switch: Option<NodeId>,
}

/// Relative priority band for a flow entry. Higher variants win ties within the same table, per
/// §4.4.1: backup-tagged traffic must always be matched ahead of primary traffic so a switch that
/// is simultaneously on a primary and a backup path prefers the tagged rule while the backup is
/// active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    /// Table-miss / drop rules.
    Low,
    /// Primary (untagged) delivery rules.
    Medium,
    /// Backup (tagged) delivery rules.
    High,
    /// Nested backup-of-backup rules, one band above `High` per nesting level.
    HigherBy(u32),
}

impl Priority {
    /// Numeric value suitable for a driver's `priority` field.
    pub fn as_u16(&self) -> u16 {
        match self {
            Priority::Low => 0,
            Priority::Medium => 100,
            Priority::High => 200,
            Priority::HigherBy(n) => 200 + (*n as u16).saturating_mul(10),
        }
    }
}

/// One compiled flow table entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowEntry {
    /// Table this entry belongs to (table 0 matches primary traffic, table 1 matches
    /// VLAN-tagged backup traffic, per §4.4.1).
    pub table: u8,
    /// Match criteria.
    pub matching: FlowMatch,
    /// Relative priority.
    pub priority: Priority,
    /// Actions applied, in order.
    pub actions: Vec<Action>,
}
